//! Path composition and placeholder normalization.

use std::sync::LazyLock;

use regex::Regex;

use crate::models::PathParam;

static NAMED_GROUP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\(\?P<([A-Za-z_]\w*)>").expect("valid named group regex"));

static ANGLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^<(?:([A-Za-z_][\w.]*):)?([A-Za-z_]\w*)>").expect("valid angle param regex")
});

static BRACE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\{([A-Za-z_]\w*)(?::([^{}]+))?\}").expect("valid brace param regex")
});

static COLON_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^:([A-Za-z_]\w*)(?:\(([^)]*)\))?\??").expect("valid colon param regex")
});

/// Rewrite every placeholder style to `{name}`, collecting constraints.
///
/// `<int:id>` -> `{id}` (int), `(?P<id>\d+)` -> `{id}` (`\d+`),
/// `:id` -> `{id}`, `{path:path}` -> `{path}` (path).
pub fn normalize_pattern(raw: &str) -> (String, Vec<PathParam>) {
    let mut out = String::with_capacity(raw.len());
    let mut params = Vec::new();
    let mut i = 0usize;
    while i < raw.len() {
        let rest = &raw[i..];
        if let Some(caps) = NAMED_GROUP_RE.captures(rest) {
            if let Some(close) = group_end(raw, i) {
                let body = &raw[i + caps[0].len()..close];
                push_param(&mut out, &mut params, &caps[1], Some(body));
                i = close + 1;
                continue;
            }
        }
        if let Some(caps) = ANGLE_RE.captures(rest) {
            push_param(&mut out, &mut params, &caps[2], caps.get(1).map(|m| m.as_str()));
            i += caps[0].len();
            continue;
        }
        if let Some(caps) = BRACE_RE.captures(rest) {
            push_param(&mut out, &mut params, &caps[1], caps.get(2).map(|m| m.as_str()));
            i += caps[0].len();
            continue;
        }
        let at_segment_start = i == 0 || raw.as_bytes()[i - 1] == b'/';
        if at_segment_start {
            if let Some(caps) = COLON_RE.captures(rest) {
                push_param(&mut out, &mut params, &caps[1], caps.get(2).map(|m| m.as_str()));
                i += caps[0].len();
                continue;
            }
        }
        let Some(ch) = rest.chars().next() else {
            break;
        };
        out.push(ch);
        i += ch.len_utf8();
    }
    (out, params)
}

fn push_param(out: &mut String, params: &mut Vec<PathParam>, name: &str, constraint: Option<&str>) {
    out.push('{');
    out.push_str(name);
    out.push('}');
    params.push(PathParam {
        name: name.to_string(),
        constraint: constraint.filter(|c| !c.is_empty()).map(str::to_string),
    });
}

/// Offset of the `)` closing the regex group opened at `open`.
fn group_end(raw: &str, open: usize) -> Option<usize> {
    let bytes = raw.as_bytes();
    let mut depth = 0usize;
    let mut in_class = false;
    let mut i = open;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 1,
            b'[' if !in_class => in_class = true,
            b']' if in_class => in_class = false,
            b'(' if !in_class => depth += 1,
            b')' if !in_class => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// Join already-normalized pieces with exactly one `/` between segments.
///
/// Empty segments collapse, so `["a", "/b/", "item/"]` gives `a/b/item`.
pub fn join_segments<'a>(pieces: impl IntoIterator<Item = &'a str>) -> String {
    pieces
        .into_iter()
        .flat_map(|p| p.split('/'))
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

pub fn to_absolute(relative: &str) -> String {
    format!("/{relative}")
}
