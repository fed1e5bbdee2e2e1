//! Decorator-call registration (FastAPI, Flask, Quart, Django function views).
//!
//! Besides the `@recv.verb(path, ...)` decorators themselves this interpreter
//! owns the statements that compose the same family of routers: router
//! constructors, `include_router` / `register_blueprint` / `mount`, and the
//! call form `recv.verb(path)(handler)`.
//!
//! In JavaScript/TypeScript units the same idiom covers NestJS controllers:
//! an `@Controller(prefix)` class whose methods carry `@Get(path)` and
//! friends.

use std::sync::LazyLock;

use regex::Regex;

use crate::idioms::{
    assignment_call, child_target, decorated_target, last_segment, parse_methods, path_value,
    Emission, MatchContext, Target, HTTP_VERBS,
};
use crate::models::{Binding, HttpMethod, Language, Metadata, NodeKind};
use crate::scanner::{Args, Expr, LogicalStatement};

static INCLUDE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z_][\w.]*)\.(include_router|register_blueprint|mount)\s*\(")
        .expect("valid include regex")
});

static CALL_FORM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z_][\w.]*)\.(get|post|put|patch|delete|head|options|trace|route|api_route)\s*\(")
        .expect("valid call form regex")
});

static CONTROLLER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^@Controller\s*\(").expect("valid controller regex"));

static SCRIPT_CLASS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:export\s+)?(?:default\s+)?(?:abstract\s+)?class\s+([A-Za-z_$][\w$]*)[^{]*\{")
        .expect("valid class declaration regex")
});

static MEMBER_ROUTE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"@(Get|Post|Put|Patch|Delete|Head|Options|All)\s*\(")
        .expect("valid member route regex")
});

static MEMBER_DECORATOR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^@([A-Za-z_$][\w$.]*)\s*").expect("valid member decorator regex")
});

static SCRIPT_METHOD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:(?:public|private|protected|static|async|override)\s+)*([A-Za-z_$][\w$]*)\s*[(<]")
        .expect("valid method declaration regex")
});

const ROUTER_CONSTRUCTORS: &[&str] = &[
    "FastAPI",
    "APIRouter",
    "Flask",
    "Quart",
    "Blueprint",
    "APIBlueprint",
];

pub fn try_match(ctx: &MatchContext<'_>) -> Option<Vec<Emission>> {
    if ctx.language == Language::Script {
        return controller(ctx);
    }
    let expr = ctx.expr();
    if expr.masked.starts_with('@') {
        return decorator(ctx, expr.tail(1));
    }
    constructor(ctx, &expr)
        .or_else(|| inclusion(ctx, &expr))
        .or_else(|| call_form(ctx, &expr))
}

// ---------------------------------------------------------------------------
// Decorators
// ---------------------------------------------------------------------------

enum Decorator<'a> {
    Route {
        receiver: &'a str,
        methods: Vec<HttpMethod>,
        args: Option<Args<'a>>,
    },
    Hint(Vec<HttpMethod>),
}

fn classify_decorator<'a>(body: &Expr<'a>) -> Option<Decorator<'a>> {
    let (callee, args) = match body.call() {
        Some((callee, args)) => (callee, Some(args)),
        None => (body.ident_path()?, None),
    };
    let last = last_segment(callee);
    if let Some((receiver, _)) = callee.rsplit_once('.') {
        if HTTP_VERBS.contains(&last) {
            let methods = HttpMethod::parse(last).into_iter().collect();
            return Some(Decorator::Route {
                receiver,
                methods,
                args,
            });
        }
        if matches!(last, "route" | "api_route") {
            let mut methods = parse_methods(args.as_ref().and_then(|a| a.keyword("methods")));
            if methods.is_empty() {
                methods.push(HttpMethod::Get);
            }
            return Some(Decorator::Route {
                receiver,
                methods,
                args,
            });
        }
    }
    let hinted = match last {
        "api_view" => {
            let list = args
                .as_ref()
                .and_then(|a| a.positional(0).or_else(|| a.keyword("http_method_names")));
            let mut methods = parse_methods(list);
            if methods.is_empty() {
                methods.push(HttpMethod::Get);
            }
            methods
        }
        "require_http_methods" => parse_methods(args.as_ref().and_then(|a| a.positional(0))),
        "require_GET" => vec![HttpMethod::Get],
        "require_POST" => vec![HttpMethod::Post],
        "require_safe" => vec![HttpMethod::Get, HttpMethod::Head],
        _ => return None,
    };
    (!hinted.is_empty()).then_some(Decorator::Hint(hinted))
}

fn decorator(ctx: &MatchContext<'_>, body: Expr<'_>) -> Option<Vec<Emission>> {
    let decorator = classify_decorator(&body)?;
    let target = decorated_target(ctx)?;
    let line = ctx.stmt.start_line;
    match decorator {
        Decorator::Route {
            receiver,
            methods,
            args,
        } => {
            let path = path_value(
                args.as_ref()
                    .and_then(|a| a.positional(0).or_else(|| a.keyword("path")).or_else(|| a.keyword("rule"))),
            );
            let metadata = args.as_ref().map(route_metadata).unwrap_or_default();
            if target.is_class {
                return Some(vec![Emission::Link {
                    parent: receiver.to_string(),
                    target: Target::Name(target.name),
                    binding: Binding::View {
                        method_map: Vec::new(),
                    },
                    prefix: path,
                    metadata,
                    line,
                }]);
            }
            let symbol = ctx.qualify(&target.name);
            Some(
                methods
                    .into_iter()
                    .map(|method| Emission::Fragment {
                        receiver: Some(receiver.to_string()),
                        method,
                        path: path.clone(),
                        symbol: symbol.clone(),
                        action: Some(target.name.clone()),
                        line,
                        metadata: metadata.clone(),
                    })
                    .collect(),
            )
        }
        Decorator::Hint(methods) => {
            if target.is_class {
                return None;
            }
            let mut out = vec![Emission::Node {
                name: target.name.clone(),
                kind: NodeKind::ViewFunction,
                prefix: String::new(),
                metadata: Metadata::default(),
                bases: Vec::new(),
                line,
            }];
            out.extend(methods.into_iter().map(|method| Emission::Fragment {
                receiver: Some(target.name.clone()),
                method,
                path: String::new(),
                symbol: target.name.clone(),
                action: Some(target.name.clone()),
                line,
                metadata: Metadata::default(),
            }));
            Some(out)
        }
    }
}

/// Status code, tags, summary, name, deprecation and dependency markers.
pub(crate) fn route_metadata(args: &Args<'_>) -> Metadata {
    let mut metadata = Metadata {
        status_code: args.keyword("status_code").and_then(|e| e.status_code()),
        summary: args.keyword("summary").and_then(|e| e.string_value()),
        name: args
            .keyword("name")
            .or_else(|| args.keyword("endpoint"))
            .and_then(|e| e.string_value()),
        deprecated: args
            .keyword("deprecated")
            .and_then(|e| e.bool_value())
            .unwrap_or(false),
        ..Metadata::default()
    };
    if let Some(tags) = args.keyword("tags") {
        for tag in tags.string_items() {
            metadata.add_tag(&tag);
        }
    }
    metadata.dependencies = dependency_markers(args.keyword("dependencies"));
    metadata
}

/// `[Depends(verify_token), Security(scopes)]` becomes `["verify_token", "scopes"]`.
fn dependency_markers(list: Option<Expr<'_>>) -> Vec<String> {
    let Some(items) = list.and_then(|e| e.items()) else {
        return Vec::new();
    };
    items
        .iter()
        .map(|item| match item.call() {
            Some((callee, args)) if matches!(last_segment(callee), "Depends" | "Security") => args
                .positional(0)
                .or_else(|| args.keyword("dependency"))
                .map_or_else(|| item.text.to_string(), |e| e.text.to_string()),
            _ => item.text.to_string(),
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Controller classes
// ---------------------------------------------------------------------------

/// `@Controller(prefix)` on the class declared by the next non-decorator
/// statement. The class becomes a router; each routed method a fragment.
fn controller(ctx: &MatchContext<'_>) -> Option<Vec<Emission>> {
    let expr = ctx.expr();
    let head = CONTROLLER_RE.find(expr.masked)?;
    let args = expr.args_at(head.end() - 1)?;
    if !expr.tail(args.end).is_empty() {
        return None;
    }
    let class_stmt = ctx.following.iter().find(|s| !s.masked.starts_with('@'))?;
    let caps = SCRIPT_CLASS_RE.captures(&class_stmt.masked)?;
    let class = &class_stmt.text[caps.get(1)?.range()];
    let body = Expr::of_statement(class_stmt).tail(caps.get(0)?.end() - 1);

    let mut out = vec![Emission::Node {
        name: class.to_string(),
        kind: NodeKind::Router,
        prefix: controller_prefix(&args),
        metadata: Metadata::default(),
        bases: Vec::new(),
        line: ctx.stmt.start_line,
    }];
    out.extend(controller_routes(class, class_stmt, body));
    Some(out)
}

/// `'users'`, `{ path: 'users' }`, or nothing.
fn controller_prefix(args: &Args<'_>) -> String {
    let Some(first) = args.positional(0) else {
        return String::new();
    };
    if let Some(prefix) = first.string_value() {
        return prefix;
    }
    first
        .dict_items()
        .unwrap_or_default()
        .into_iter()
        .find(|(key, _)| key.text == "path" || key.string_value().as_deref() == Some("path"))
        .and_then(|(_, value)| value.string_value())
        .unwrap_or_default()
}

fn controller_routes(class: &str, stmt: &LogicalStatement, body: Expr<'_>) -> Vec<Emission> {
    let mut out = Vec::new();
    for found in MEMBER_ROUTE_RE.captures_iter(body.masked) {
        let (Some(whole), Some(verb)) = (found.get(0), found.get(1)) else {
            continue;
        };
        let standalone = body.masked[..whole.start()]
            .chars()
            .next_back()
            .map_or(true, |c| c.is_whitespace() || matches!(c, '{' | '}' | ';'));
        let Some(method) = HttpMethod::parse(verb.as_str()).filter(|_| standalone) else {
            continue;
        };
        let Some(args) = body.args_at(whole.end() - 1) else {
            continue;
        };
        let Some((name, metadata)) = routed_method(body.tail(args.end)) else {
            continue;
        };
        out.push(Emission::Fragment {
            receiver: Some(class.to_string()),
            method,
            path: args
                .positional(0)
                .and_then(|p| p.string_value())
                .unwrap_or_default(),
            symbol: format!("{class}.{name}"),
            action: Some(name.to_string()),
            line: stmt.line_at(body.offset + whole.start()),
            metadata,
        });
    }
    out
}

/// Skip the remaining decorators of a member and name the method they decorate.
fn routed_method(mut rest: Expr<'_>) -> Option<(&str, Metadata)> {
    let mut metadata = Metadata::default();
    while let Some(caps) = MEMBER_DECORATOR_RE.captures(rest.masked) {
        let decorator = caps.get(1)?.as_str();
        let after = caps.get(0)?.end();
        if rest.masked.as_bytes().get(after) != Some(&b'(') {
            rest = rest.tail(after);
            continue;
        }
        let args = rest.args_at(after)?;
        if decorator == "HttpCode" {
            metadata.status_code = args.positional(0).and_then(|e| e.status_code());
        }
        rest = rest.tail(args.end);
    }
    let caps = SCRIPT_METHOD_RE.captures(rest.masked)?;
    Some((&rest.text[caps.get(1)?.range()], metadata))
}

// ---------------------------------------------------------------------------
// Composition statements
// ---------------------------------------------------------------------------

fn constructor(ctx: &MatchContext<'_>, expr: &Expr<'_>) -> Option<Vec<Emission>> {
    let (var, callee, args) = assignment_call(expr)?;
    if !ROUTER_CONSTRUCTORS.contains(&last_segment(callee)) {
        return None;
    }
    let prefix = path_value(args.keyword("prefix").or_else(|| args.keyword("url_prefix")));
    let mut metadata = Metadata::default();
    if let Some(tags) = args.keyword("tags") {
        for tag in tags.string_items() {
            metadata.add_tag(&tag);
        }
    }
    metadata.dependencies = dependency_markers(args.keyword("dependencies"));
    Some(vec![Emission::Node {
        name: var.to_string(),
        kind: NodeKind::Router,
        prefix,
        metadata,
        bases: Vec::new(),
        line: ctx.stmt.start_line,
    }])
}

fn inclusion(ctx: &MatchContext<'_>, expr: &Expr<'_>) -> Option<Vec<Emission>> {
    let caps = INCLUDE_RE.captures(expr.masked)?;
    let parent = &expr.text[caps.get(1)?.range()];
    let verb = caps.get(2)?.as_str();
    let args = expr.args_at(caps.get(0)?.end() - 1)?;
    if !expr.tail(args.end).is_empty() {
        return None;
    }
    let (child, prefix) = match verb {
        "include_router" => (
            args.positional(0).or_else(|| args.keyword("router"))?,
            path_value(args.keyword("prefix")),
        ),
        "register_blueprint" => (
            args.positional(0).or_else(|| args.keyword("blueprint"))?,
            path_value(args.keyword("url_prefix")),
        ),
        _ => (
            args.positional(1).or_else(|| args.keyword("app"))?,
            path_value(args.positional(0).or_else(|| args.keyword("path"))),
        ),
    };
    let target = if verb == "mount" {
        Target::Name(child.ident_path()?.to_string())
    } else {
        child_target(child)?
    };
    let mut metadata = Metadata::default();
    if let Some(tags) = args.keyword("tags") {
        for tag in tags.string_items() {
            metadata.add_tag(&tag);
        }
    }
    metadata.dependencies = dependency_markers(args.keyword("dependencies"));
    Some(vec![Emission::Link {
        parent: parent.to_string(),
        target,
        binding: Binding::Include,
        prefix,
        metadata,
        line: ctx.stmt.start_line,
    }])
}

/// `app.get("/x")(handler)`: a decorator applied by hand.
fn call_form(ctx: &MatchContext<'_>, expr: &Expr<'_>) -> Option<Vec<Emission>> {
    let caps = CALL_FORM_RE.captures(expr.masked)?;
    let receiver = &expr.text[caps.get(1)?.range()];
    let verb = caps.get(2)?.as_str();
    let args = expr.args_at(caps.get(0)?.end() - 1)?;
    let applied = expr.tail(args.end);
    let handler_args = applied.args_at(0)?;
    if !applied.tail(handler_args.end).is_empty() || handler_args.len() != 1 {
        return None;
    }
    let handler = handler_args.positional(0)?.ident_path()?;
    let methods = match HttpMethod::parse(verb) {
        Some(m) => vec![m],
        None => {
            let mut m = parse_methods(args.keyword("methods"));
            if m.is_empty() {
                m.push(HttpMethod::Get);
            }
            m
        }
    };
    let path = path_value(args.positional(0).or_else(|| args.keyword("path")));
    let metadata = route_metadata(&args);
    Some(
        methods
            .into_iter()
            .map(|method| Emission::Fragment {
                receiver: Some(receiver.to_string()),
                method,
                path: path.clone(),
                symbol: handler.to_string(),
                action: Some(last_segment(handler).to_string()),
                line: ctx.stmt.start_line,
                metadata: metadata.clone(),
            })
            .collect(),
    )
}
