//! Per-line lexical classification: live code, comments, and string-literal bodies.
//!
//! The scanner is a small state machine over bytes. Every delimiter it cares
//! about is ASCII, so multi-byte UTF-8 sequences pass through untouched and
//! all segment offsets stay on character boundaries.

use crate::models::{Issue, Language};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LineTag {
    Code,
    Comment,
    /// The line starts inside a multi-line literal opened on an earlier line.
    StringLiteralBody,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SegmentKind {
    Code,
    Literal,
    Comment,
}

/// A byte range of one line with a single lexical kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Segment {
    pub kind: SegmentKind,
    pub start: usize,
    pub end: usize,
}

#[derive(Clone, Debug)]
pub struct ClassifiedLine<'a> {
    /// 1-based line number.
    pub number: usize,
    pub text: &'a str,
    pub tag: LineTag,
    pub segments: Vec<Segment>,
    /// A multi-line literal is still open when this line ends.
    pub literal_open: bool,
}

impl ClassifiedLine<'_> {
    /// True when the line has code or literal content other than whitespace.
    pub fn has_content(&self) -> bool {
        self.segments.iter().any(|s| {
            s.kind != SegmentKind::Comment && !self.text[s.start..s.end].trim().is_empty()
        })
    }
}

#[derive(Clone, Debug)]
pub struct ClassifiedUnit<'a> {
    pub lines: Vec<ClassifiedLine<'a>>,
    /// Line where a literal or block comment opened and never closed.
    pub unterminated: Option<(usize, Issue)>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Carry {
    None,
    Triple(u8),
    Template,
    Block,
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Classify every physical line of `text`.
pub fn classify(text: &str, language: Language) -> ClassifiedUnit<'_> {
    let mut carry = Carry::None;
    let mut opened_at = 0usize;
    let mut lines = Vec::new();

    for (idx, line) in text.lines().enumerate() {
        let number = idx + 1;
        let started_in = carry;
        let segments = scan_line(line, language, &mut carry, &mut opened_at, number);
        let mut classified = ClassifiedLine {
            number,
            text: line,
            tag: LineTag::Code,
            segments,
            literal_open: matches!(carry, Carry::Triple(_) | Carry::Template),
        };
        classified.tag = match started_in {
            Carry::Triple(_) | Carry::Template => LineTag::StringLiteralBody,
            _ if !classified.has_content()
                && classified
                    .segments
                    .iter()
                    .any(|s| s.kind == SegmentKind::Comment) =>
            {
                LineTag::Comment
            }
            _ => LineTag::Code,
        };
        lines.push(classified);
    }

    let unterminated = match carry {
        Carry::None => None,
        Carry::Triple(_) | Carry::Template => Some((opened_at, Issue::UnterminatedLiteral)),
        Carry::Block => Some((opened_at, Issue::UnterminatedComment)),
    };
    ClassifiedUnit {
        lines,
        unterminated,
    }
}

fn scan_line(
    line: &str,
    language: Language,
    carry: &mut Carry,
    opened_at: &mut usize,
    number: usize,
) -> Vec<Segment> {
    let b = line.as_bytes();
    let len = b.len();
    let mut segments = Vec::new();
    let mut start = 0usize;
    let mut i = 0usize;

    let mut push = |kind: SegmentKind, from: usize, to: usize| {
        if to > from {
            segments.push(Segment {
                kind,
                start: from,
                end: to,
            });
        }
    };

    while i < len {
        match *carry {
            Carry::Triple(q) => {
                if b[i] == b'\\' {
                    i += 2;
                } else if b[i..].starts_with(&[q, q, q]) {
                    i += 3;
                    push(SegmentKind::Literal, start, i);
                    start = i;
                    *carry = Carry::None;
                } else {
                    i += 1;
                }
            }
            Carry::Template => {
                if b[i] == b'\\' {
                    i += 2;
                } else if b[i] == b'`' {
                    i += 1;
                    push(SegmentKind::Literal, start, i);
                    start = i;
                    *carry = Carry::None;
                } else {
                    i += 1;
                }
            }
            Carry::Block => {
                if b[i..].starts_with(b"*/") {
                    i += 2;
                    push(SegmentKind::Comment, start, i);
                    start = i;
                    *carry = Carry::None;
                } else {
                    i += 1;
                }
            }
            Carry::None => {
                let c = b[i];
                let line_comment = match language {
                    Language::Python => c == b'#',
                    Language::Script => b[i..].starts_with(b"//"),
                };
                if line_comment {
                    push(SegmentKind::Code, start, i);
                    push(SegmentKind::Comment, i, len);
                    return segments;
                }
                if language == Language::Script && b[i..].starts_with(b"/*") {
                    push(SegmentKind::Code, start, i);
                    start = i;
                    i += 2;
                    *carry = Carry::Block;
                    *opened_at = number;
                } else if c == b'\'' || c == b'"' {
                    push(SegmentKind::Code, start, i);
                    start = i;
                    if language == Language::Python && b[i..].starts_with(&[c, c, c]) {
                        i += 3;
                        *carry = Carry::Triple(c);
                        *opened_at = number;
                    } else {
                        i = skip_single_literal(b, i + 1, c);
                        push(SegmentKind::Literal, start, i);
                        start = i;
                    }
                } else if c == b'`' && language == Language::Script {
                    push(SegmentKind::Code, start, i);
                    start = i;
                    i += 1;
                    *carry = Carry::Template;
                    *opened_at = number;
                } else {
                    i += 1;
                }
            }
        }
    }

    let i = i.min(len);
    let tail = match *carry {
        Carry::None => SegmentKind::Code,
        Carry::Triple(_) | Carry::Template => SegmentKind::Literal,
        Carry::Block => SegmentKind::Comment,
    };
    push(tail, start, i);
    segments
}

/// Advance past a single-line literal; an unclosed one ends with the line.
fn skip_single_literal(b: &[u8], mut i: usize, quote: u8) -> usize {
    while i < b.len() {
        match b[i] {
            b'\\' => i += 2,
            c if c == quote => return i + 1,
            _ => i += 1,
        }
    }
    b.len()
}
