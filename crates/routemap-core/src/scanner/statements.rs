//! Reassembly of classified lines into logical statements.
//!
//! Bracket depth is tracked only inside code segments, so brackets, commas
//! and semicolons inside literals or comments never affect statement
//! boundaries. Physical lines are joined with a single space.

use std::ops::Range;

use crate::models::{Diagnostic, Issue, Language, SourceLocation};
use crate::scanner::classifier::{ClassifiedLine, ClassifiedUnit, LineTag, SegmentKind};

/// Source text reassembled across line breaks into one semantic unit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogicalStatement {
    pub start_line: usize,
    pub end_line: usize,
    /// Indentation width of the first line (tabs count as four columns).
    pub indent: usize,
    pub text: String,
    /// `text` with literal interiors replaced by `_`; byte offsets match `text`.
    pub masked: String,
    /// Byte ranges of literals in `text`, delimiters included.
    pub literals: Vec<Range<usize>>,
    pub max_depth: usize,
    line_offsets: Vec<(usize, usize)>,
}

impl LogicalStatement {
    /// Physical line holding the byte at `offset` of `text`.
    pub fn line_at(&self, offset: usize) -> usize {
        let idx = self.line_offsets.partition_point(|(start, _)| *start <= offset);
        match idx {
            0 => self.start_line,
            n => self.line_offsets[n - 1].1,
        }
    }

    pub fn in_literal(&self, offset: usize) -> bool {
        self.literals.iter().any(|r| r.contains(&offset))
    }

    /// Build a single-line statement; used by interpreters' tests and benches.
    pub fn from_line(line: usize, text: &str, language: Language) -> Option<LogicalStatement> {
        let unit = crate::scanner::classifier::classify(text, language);
        let (statements, _) = reconstruct(&unit, "", language);
        let mut stmt = statements.into_iter().next()?;
        stmt.start_line += line.saturating_sub(1);
        stmt.end_line += line.saturating_sub(1);
        for entry in &mut stmt.line_offsets {
            entry.1 += line.saturating_sub(1);
        }
        Some(stmt)
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Builder {
    start_line: usize,
    end_line: usize,
    indent: usize,
    text: String,
    literals: Vec<Range<usize>>,
    line_offsets: Vec<(usize, usize)>,
    depth: usize,
    max_depth: usize,
    open_literal: Option<usize>,
}

impl Builder {
    fn new(line: &ClassifiedLine<'_>) -> Self {
        Self {
            start_line: line.number,
            end_line: line.number,
            indent: indent_width(line.text),
            text: String::new(),
            literals: Vec::new(),
            line_offsets: Vec::new(),
            depth: 0,
            max_depth: 0,
            open_literal: None,
        }
    }

    fn code_tail(&self) -> usize {
        self.literals.last().map_or(0, |r| r.end)
    }

    /// Start a new physical line inside the statement if `line` differs from the last one.
    fn enter_line(&mut self, line: usize) {
        if self.line_offsets.last().map(|(_, l)| *l) == Some(line) {
            return;
        }
        if !self.text.is_empty() {
            if self.open_literal.is_none() {
                let keep = self.text.trim_end().len().max(self.code_tail());
                self.text.truncate(keep);
            }
            self.text.push(' ');
        }
        self.line_offsets.push((self.text.len(), line));
        self.end_line = line;
    }

    fn push_code(&mut self, chunk: &str, line: usize) {
        let fresh_line = self.line_offsets.last().map(|(_, l)| *l) != Some(line);
        self.enter_line(line);
        let chunk = if fresh_line { chunk.trim_start() } else { chunk };
        self.text.push_str(chunk);
    }

    fn push_literal(&mut self, chunk: &str, line: usize, continues: bool) {
        self.enter_line(line);
        let start = self.open_literal.take().unwrap_or(self.text.len());
        self.text.push_str(chunk);
        if continues {
            self.open_literal = Some(start);
        } else {
            self.literals.push(start..self.text.len());
        }
    }

    fn open_bracket(&mut self) {
        self.depth += 1;
        self.max_depth = self.max_depth.max(self.depth);
    }

    fn close_bracket(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    fn is_open(&self) -> bool {
        self.depth > 0 || self.open_literal.is_some()
    }

    /// Drop a trailing `\` line continuation, reporting whether one was present.
    fn strip_continuation(&mut self) -> bool {
        let trimmed = self.text.trim_end().len();
        if trimmed > self.code_tail() && self.text[..trimmed].ends_with('\\') {
            self.text.truncate(trimmed - 1);
            return true;
        }
        false
    }

    fn finish(mut self) -> Option<LogicalStatement> {
        let keep = self.text.trim_end().len().max(self.code_tail());
        self.text.truncate(keep);
        if self.text.trim().is_empty() {
            return None;
        }
        let masked = mask_literals(&self.text, &self.literals);
        Some(LogicalStatement {
            start_line: self.start_line,
            end_line: self.end_line,
            indent: self.indent,
            text: self.text,
            masked,
            literals: self.literals,
            max_depth: self.max_depth,
            line_offsets: self.line_offsets,
        })
    }
}

// ---------------------------------------------------------------------------
// Reconstruction
// ---------------------------------------------------------------------------

struct Reconstructor<'a> {
    identity: &'a str,
    language: Language,
    statements: Vec<LogicalStatement>,
    diagnostics: Vec<Diagnostic>,
    current: Option<Builder>,
    /// A closed statement that a leading-`.` line may still continue.
    pending: Option<Builder>,
}

impl Reconstructor<'_> {
    fn emit(&mut self, builder: Builder) {
        if let Some(stmt) = builder.finish() {
            self.statements.push(stmt);
        }
    }

    fn flush_pending(&mut self) {
        if let Some(pending) = self.pending.take() {
            self.emit(pending);
        }
    }

    /// Make sure a statement is open before appending `chunk` from `line`.
    fn ensure_current(&mut self, line: &ClassifiedLine<'_>, chunk: &str) -> &mut Builder {
        if self.current.is_none() {
            if let Some(pending) = self.pending.take() {
                if self.language == Language::Script && chunk.trim_start().starts_with('.') {
                    self.current = Some(pending);
                } else {
                    self.emit(pending);
                }
            }
        }
        self.current.get_or_insert_with(|| Builder::new(line))
    }

    fn feed(&mut self, line: &ClassifiedLine<'_>) {
        let last_literal = line
            .segments
            .iter()
            .rposition(|s| s.kind == SegmentKind::Literal);
        for (idx, seg) in line.segments.iter().enumerate() {
            let chunk = &line.text[seg.start..seg.end];
            match seg.kind {
                SegmentKind::Comment => {}
                SegmentKind::Literal => {
                    let continues = line.literal_open && Some(idx) == last_literal;
                    self.ensure_current(line, chunk)
                        .push_literal(chunk, line.number, continues);
                }
                SegmentKind::Code => self.feed_code(line, chunk),
            }
        }
        self.end_line();
    }

    fn feed_code(&mut self, line: &ClassifiedLine<'_>, chunk: &str) {
        let mut from = 0usize;
        for (i, ch) in chunk.char_indices() {
            match ch {
                '(' | '[' | '{' => self.ensure_current(line, &chunk[from..]).open_bracket(),
                ')' | ']' | '}' => {
                    if let Some(current) = self.current.as_mut() {
                        current.close_bracket();
                    }
                }
                ';' if self.current.as_ref().map_or(0, |c| c.depth) == 0 => {
                    let piece = &chunk[from..i];
                    if !piece.trim().is_empty() {
                        self.ensure_current(line, piece)
                            .push_code(piece, line.number);
                    } else if let Some(current) = self.current.as_mut() {
                        current.push_code(piece, line.number);
                    }
                    if let Some(current) = self.current.take() {
                        self.flush_pending();
                        self.emit(current);
                    }
                    from = i + 1;
                }
                _ => {}
            }
        }
        let rest = &chunk[from..];
        if !rest.trim().is_empty() {
            self.ensure_current(line, rest).push_code(rest, line.number);
        } else if let Some(current) = self.current.as_mut() {
            current.push_code(rest, line.number);
        }
    }

    fn end_line(&mut self) {
        let Some(mut current) = self.current.take() else {
            return;
        };
        if current.is_open() || current.strip_continuation() {
            self.current = Some(current);
            return;
        }
        match self.language {
            Language::Script => {
                self.flush_pending();
                self.pending = Some(current);
            }
            Language::Python => self.emit(current),
        }
    }

    fn finish_unit(&mut self) {
        self.flush_pending();
        if let Some(open) = self.current.take() {
            self.diagnostics.push(Diagnostic::new(
                SourceLocation::new(self.identity, open.start_line),
                Issue::UnterminatedConstruct,
            ));
        }
    }
}

/// Group the classified lines of one unit into logical statements.
///
/// Lines at or after an unterminated literal or block comment are excluded.
/// A statement still open at the end is discarded and reported.
pub fn reconstruct(
    unit: &ClassifiedUnit<'_>,
    identity: &str,
    language: Language,
) -> (Vec<LogicalStatement>, Vec<Diagnostic>) {
    let limit = unit.unterminated.as_ref().map_or(usize::MAX, |(l, _)| *l);
    let mut r = Reconstructor {
        identity,
        language,
        statements: Vec::new(),
        diagnostics: Vec::new(),
        current: None,
        pending: None,
    };
    for line in &unit.lines {
        if line.number >= limit {
            break;
        }
        if line.tag == LineTag::Comment {
            continue;
        }
        if r.current.is_none() && !line.has_content() {
            continue;
        }
        r.feed(line);
    }
    r.finish_unit();
    (r.statements, r.diagnostics)
}

// ---------------------------------------------------------------------------
// Helper functions
// ---------------------------------------------------------------------------

fn indent_width(text: &str) -> usize {
    text.chars()
        .take_while(|c| c.is_whitespace())
        .map(|c| if c == '\t' { 4 } else { 1 })
        .sum()
}

fn delimiter_len(literal: &str) -> usize {
    if literal.starts_with("\"\"\"") || literal.starts_with("'''") {
        3
    } else {
        1
    }
}

/// Replace literal interiors with `_`, keeping delimiters and byte offsets.
fn mask_literals(text: &str, literals: &[Range<usize>]) -> String {
    let interiors: Vec<Range<usize>> = literals
        .iter()
        .map(|r| {
            let d = delimiter_len(&text[r.clone()]);
            let start = r.start + d;
            let end = r.end.saturating_sub(d).max(start);
            start..end
        })
        .collect();
    let mut masked = String::with_capacity(text.len());
    for (idx, ch) in text.char_indices() {
        if interiors.iter().any(|r| r.contains(&idx)) {
            for _ in 0..ch.len_utf8() {
                masked.push('_');
            }
        } else {
            masked.push(ch);
        }
    }
    masked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::classifier::classify;

    fn statements(text: &str, language: Language) -> (Vec<LogicalStatement>, Vec<Diagnostic>) {
        let unit = classify(text, language);
        reconstruct(&unit, "unit.py", language)
    }

    #[test]
    fn test_multiline_call_joined_with_single_spaces() {
        let text = "@router.get(\n    \"/users/{id}\",\n    status_code=200,\n)\ndef get_user(id): pass";
        let (stmts, diags) = statements(text, Language::Python);
        assert!(diags.is_empty());
        assert_eq!(stmts.len(), 2);
        assert_eq!(stmts[0].text, "@router.get( \"/users/{id}\", status_code=200, )");
        assert_eq!((stmts[0].start_line, stmts[0].end_line), (1, 4));
        assert_eq!(stmts[0].max_depth, 1);
        assert_eq!(stmts[1].start_line, 5);
    }

    #[test]
    fn test_comment_lines_inside_statement_are_skipped() {
        let text = "urlpatterns = [\n    # path('old/', old_view),\n    path('new/', new_view),  # live\n]";
        let (stmts, _) = statements(text, Language::Python);
        assert_eq!(stmts.len(), 1);
        assert_eq!(stmts[0].text, "urlpatterns = [ path('new/', new_view), ]");
        assert!(!stmts[0].text.contains("old"));
    }

    #[test]
    fn test_literal_ranges_and_masking() {
        let (stmts, _) = statements("x = call('a,(b', \"c\")", Language::Python);
        let stmt = &stmts[0];
        assert_eq!(stmt.literals.len(), 2);
        assert_eq!(&stmt.text[stmt.literals[0].clone()], "'a,(b'");
        assert_eq!(stmt.masked, "x = call('____', \"_\")");
        assert_eq!(stmt.masked.len(), stmt.text.len());
        assert!(stmt.in_literal(10));
        assert!(!stmt.in_literal(2));
    }

    #[test]
    fn test_semicolon_splits_at_depth_zero() {
        let (stmts, _) = statements(
            "app.get('/a', (req, res) => { res.send(1); });app.post('/b', h);",
            Language::Script,
        );
        assert_eq!(stmts.len(), 2);
        assert!(stmts[0].text.starts_with("app.get('/a'"));
        assert_eq!(stmts[1].text, "app.post('/b', h)");
    }

    #[test]
    fn test_script_method_chain_continues() {
        let text = "app.route('/items')\n  // fetch\n  .get(list)\n  .post(create);\nconst x = 1;";
        let (stmts, _) = statements(text, Language::Script);
        assert_eq!(stmts.len(), 2);
        assert_eq!(stmts[0].text, "app.route('/items') .get(list) .post(create)");
        assert_eq!(stmts[0].line_at(stmts[0].text.find(".post").unwrap_or(0)), 4);
    }

    #[test]
    fn test_backslash_continuation() {
        let (stmts, _) = statements("x = a + \\\n    b\ny = 2", Language::Python);
        assert_eq!(stmts.len(), 2);
        assert_eq!(stmts[0].text, "x = a + b");
    }

    #[test]
    fn test_unterminated_construct_discarded() {
        let (stmts, diags) = statements("ok = 1\nbroken = call(\n    1,\n", Language::Python);
        assert_eq!(stmts.len(), 1);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].issue, Issue::UnterminatedConstruct);
        assert_eq!(diags[0].location.line, 2);
    }

    #[test]
    fn test_lines_after_unterminated_literal_excluded() {
        let (stmts, _) = statements("a = 1\ns = '''\n@app.get('/x')\n", Language::Python);
        assert_eq!(stmts.len(), 1);
        assert_eq!(stmts[0].text, "a = 1");
    }

    #[test]
    fn test_multiline_docstring_is_one_statement() {
        let text = "def f():\n    \"\"\"\n    @app.get('/x')\n    \"\"\"\n    return 1";
        let (stmts, _) = statements(text, Language::Python);
        assert_eq!(stmts.len(), 3);
        assert_eq!(stmts[1].literals.len(), 1);
        assert!(stmts[1].masked.chars().all(|c| c == '"' || c == '_' || c == ' '));
    }

    #[test]
    fn test_indent_recorded() {
        let (stmts, _) = statements("class A:\n    def get(self):\n\treturn 1", Language::Python);
        assert_eq!(stmts[0].indent, 0);
        assert_eq!(stmts[1].indent, 4);
        assert_eq!(stmts[2].indent, 4);
    }

    #[test]
    fn test_from_line_offsets_line_numbers() {
        let stmt = LogicalStatement::from_line(7, "@app.get('/x')", Language::Python)
            .expect("statement");
        assert_eq!(stmt.start_line, 7);
        assert_eq!(stmt.line_at(3), 7);
    }
}
