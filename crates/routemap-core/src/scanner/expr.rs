//! Literal-aware decoding of call arguments and simple expressions.
//!
//! Structure (brackets, commas, `=`) is always read from the masked text so
//! that nothing inside a string literal can split or end an argument. Values
//! are read back from the original text at the same byte offsets.

use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;

use crate::scanner::statements::LogicalStatement;

static IDENT_PATH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_$][\w$]*(?:\.[A-Za-z_$][\w$]*)*$").expect("valid ident path regex")
});

static CALL_HEAD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:new\s+)?([A-Za-z_$][\w$]*(?:\.[A-Za-z_$][\w$]*)*)\s*\(")
        .expect("valid call head regex")
});

static STATUS_CONST_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"HTTP_(\d{3})").expect("valid status constant regex"));

/// A slice of a statement: original text plus its masked twin.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Expr<'a> {
    pub text: &'a str,
    pub masked: &'a str,
    /// Byte offset of `text` within the statement.
    pub offset: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Arg<'a> {
    pub keyword: Option<&'a str>,
    pub value: Expr<'a>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Args<'a> {
    pub items: Vec<Arg<'a>>,
    /// Offset just past the closing parenthesis, relative to the parsed expression.
    pub end: usize,
}

impl<'a> Args<'a> {
    pub fn positionals(&self) -> impl Iterator<Item = Expr<'a>> + '_ {
        self.items
            .iter()
            .filter(|a| a.keyword.is_none())
            .map(|a| a.value)
    }

    pub fn positional(&self, n: usize) -> Option<Expr<'a>> {
        self.positionals().nth(n)
    }

    pub fn keyword(&self, name: &str) -> Option<Expr<'a>> {
        self.items
            .iter()
            .find(|a| a.keyword == Some(name))
            .map(|a| a.value)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<'a> Expr<'a> {
    pub fn of_statement(stmt: &'a LogicalStatement) -> Expr<'a> {
        Expr {
            text: &stmt.text,
            masked: &stmt.masked,
            offset: 0,
        }
    }

    /// Sub-expression for `range` (relative to this expression), trimmed.
    pub fn slice(&self, range: Range<usize>) -> Expr<'a> {
        let raw = &self.masked[range.clone()];
        let lead = raw.len() - raw.trim_start().len();
        let trail = raw.len() - raw.trim_end().len();
        let start = range.start + lead;
        let end = (range.end - trail).max(start);
        Expr {
            text: &self.text[start..end],
            masked: &self.masked[start..end],
            offset: self.offset + start,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Decoded content of a single string literal, prefixes (`r`, `f`, `b`, `u`) dropped.
    pub fn string_value(&self) -> Option<String> {
        let prefix = self
            .text
            .bytes()
            .take(2)
            .take_while(|b| matches!(b, b'r' | b'R' | b'b' | b'B' | b'u' | b'U' | b'f' | b'F'))
            .count();
        let body = &self.text[prefix..];
        let delim = ["\"\"\"", "'''", "\"", "'", "`"]
            .into_iter()
            .find(|d| body.starts_with(d))?;
        if body.len() < delim.len() * 2 || !body.ends_with(delim) {
            return None;
        }
        let inner = &body[delim.len()..body.len() - delim.len()];
        // A second literal in the same expression means concatenation or worse.
        if inner.contains(delim) && !inner.contains('\\') {
            return None;
        }
        Some(inner.to_string())
    }

    /// Items of a list, tuple, or set literal.
    pub fn items(&self) -> Option<Vec<Expr<'a>>> {
        let open = self.masked.bytes().next()?;
        let close = match open {
            b'[' => b']',
            b'(' => b')',
            b'{' => b'}',
            _ => return None,
        };
        let end = find_matching(self.masked, 0)?;
        if end + 1 != self.masked.len() || self.masked.as_bytes()[end] != close {
            return None;
        }
        Some(
            split_top_level(self.masked, 1, end, b',')
                .into_iter()
                .map(|r| self.slice(r))
                .filter(|e| !e.is_empty())
                .collect(),
        )
    }

    /// String values of a list literal; non-literal items are skipped.
    pub fn string_items(&self) -> Vec<String> {
        self.items()
            .unwrap_or_default()
            .iter()
            .filter_map(|e| e.string_value())
            .collect()
    }

    /// `{key: value, ...}` pairs.
    pub fn dict_items(&self) -> Option<Vec<(Expr<'a>, Expr<'a>)>> {
        if !self.masked.starts_with('{') {
            return None;
        }
        let items = self.items()?;
        Some(
            items
                .into_iter()
                .filter_map(|item| {
                    let colon = split_top_level(item.masked, 0, item.masked.len(), b':');
                    match colon.as_slice() {
                        [k, v] => Some((item.slice(k.clone()), item.slice(v.clone()))),
                        _ => None,
                    }
                })
                .collect(),
        )
    }

    /// The expression as a dotted identifier (`views.user_detail`).
    pub fn ident_path(&self) -> Option<&'a str> {
        IDENT_PATH_RE.is_match(self.text).then_some(self.text)
    }

    pub fn int_value(&self) -> Option<i64> {
        self.text.parse().ok()
    }

    /// Integer literal or a `status.HTTP_201_CREATED` style constant.
    pub fn status_code(&self) -> Option<u16> {
        if let Some(v) = self.int_value() {
            return u16::try_from(v).ok();
        }
        self.ident_path()?;
        let caps = STATUS_CONST_RE.captures(self.text)?;
        caps[1].parse().ok()
    }

    pub fn bool_value(&self) -> Option<bool> {
        match self.text {
            "True" | "true" => Some(true),
            "False" | "false" => Some(false),
            _ => None,
        }
    }

    /// `callee(args)` spanning the whole expression.
    pub fn call(&self) -> Option<(&'a str, Args<'a>)> {
        let (callee, args) = self.call_prefix()?;
        (args.end == self.masked.len()).then_some((callee, args))
    }

    /// A leading `callee(args)`; anything may follow the closing parenthesis.
    pub fn call_prefix(&self) -> Option<(&'a str, Args<'a>)> {
        let caps = CALL_HEAD_RE.captures(self.masked)?;
        let head = caps.get(0)?;
        let callee = caps.get(1)?;
        let args = self.args_at(head.end() - 1)?;
        Some((&self.text[callee.range()], args))
    }

    /// Parse the argument list whose `(` sits at `open` (relative offset).
    pub fn args_at(&self, open: usize) -> Option<Args<'a>> {
        if self.masked.as_bytes().get(open) != Some(&b'(') {
            return None;
        }
        let close = find_matching(self.masked, open)?;
        let items = split_top_level(self.masked, open + 1, close, b',')
            .into_iter()
            .map(|r| self.slice(r))
            .filter(|e| !e.is_empty())
            .map(split_keyword)
            .collect();
        Some(Args {
            items,
            end: close + 1,
        })
    }

    /// The remainder of this expression after `offset` (relative), trimmed.
    pub fn tail(&self, offset: usize) -> Expr<'a> {
        self.slice(offset.min(self.masked.len())..self.masked.len())
    }

    /// Offset of the `(` of a call whose callee ends at `at`, stepping over
    /// a TypeScript type-argument list such as `<{}, ApiResponse<User>>`.
    pub fn call_open(&self, at: usize) -> Option<usize> {
        let bytes = self.masked.as_bytes();
        let mut i = skip_whitespace(bytes, at);
        if bytes.get(i) == Some(&b'<') {
            i = skip_whitespace(bytes, skip_type_args(self.masked, i)?);
        }
        (bytes.get(i) == Some(&b'(')).then_some(i)
    }
}

// ---------------------------------------------------------------------------
// Helper functions
// ---------------------------------------------------------------------------

fn split_keyword(e: Expr<'_>) -> Arg<'_> {
    let bytes = e.masked.as_bytes();
    let ident_len = bytes
        .iter()
        .take_while(|b| b.is_ascii_alphanumeric() || **b == b'_')
        .count();
    if ident_len > 0 && !bytes[0].is_ascii_digit() {
        let mut i = ident_len;
        while i < bytes.len() && bytes[i] == b' ' {
            i += 1;
        }
        if bytes.get(i) == Some(&b'=') && bytes.get(i + 1) != Some(&b'=') {
            return Arg {
                keyword: Some(&e.text[..ident_len]),
                value: e.slice(i + 1..bytes.len()),
            };
        }
    }
    Arg {
        keyword: None,
        value: e,
    }
}

/// Offset of the bracket closing the one at `open`.
pub fn find_matching(masked: &str, open: usize) -> Option<usize> {
    let bytes = masked.as_bytes();
    let mut depth = 0usize;
    for (i, b) in bytes.iter().enumerate().skip(open) {
        match b {
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

fn skip_whitespace(bytes: &[u8], mut i: usize) -> usize {
    while bytes.get(i).is_some_and(u8::is_ascii_whitespace) {
        i += 1;
    }
    i
}

/// Offset just past the `>` closing the angle bracket at `open`.
///
/// Brackets inside the list are skipped whole; `=>` never closes it.
pub fn skip_type_args(masked: &str, open: usize) -> Option<usize> {
    let bytes = masked.as_bytes();
    let mut depth = 0usize;
    let mut i = open;
    while i < bytes.len() {
        match bytes[i] {
            b'<' => depth += 1,
            b'>' if i > 0 && bytes[i - 1] == b'=' => {}
            b'>' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            b'(' | b'[' | b'{' => i = find_matching(masked, i)?,
            b')' | b']' | b'}' | b';' => return None,
            _ => {}
        }
        i += 1;
    }
    None
}

/// Split `masked[start..end]` on `sep` at bracket depth zero.
pub fn split_top_level(masked: &str, start: usize, end: usize, sep: u8) -> Vec<Range<usize>> {
    let bytes = masked.as_bytes();
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut from = start;
    for i in start..end {
        match bytes[i] {
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => depth = depth.saturating_sub(1),
            b if b == sep && depth == 0 => {
                parts.push(from..i);
                from = i + 1;
            }
            _ => {}
        }
    }
    parts.push(from..end);
    parts
}
