//! Idiom interpreters: one pure function per route-declaration style.
//!
//! Every applicable interpreter is offered each logical statement. Each
//! either declines (`None`) or returns emissions: fragments, composition
//! nodes, links between nodes, and export aliases. Emissions still use the
//! names written in the unit; [`crate::extract`] qualifies them afterwards.

pub mod call_registration;
pub mod class_methods;
pub mod decorator;
pub mod resource;
pub mod url_patterns;

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;

use crate::extract::imports::ImportTable;
use crate::models::{Binding, HttpMethod, Idiom, Language, Metadata, NodeKind};
use crate::scanner::{Args, Expr, LogicalStatement};

static DEF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:async\s+)?def\s+([A-Za-z_]\w*)\s*\(").expect("valid def regex")
});

static CLASS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^class\s+([A-Za-z_]\w*)\s*(\(|:)").expect("valid class regex")
});

static ASSIGN_CALL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:export\s+)?(?:(?:const|let|var)\s+)?([A-Za-z_$][\w$]*)\s*(?::\s*[\w.\[\], ]+)?=\s*(?:new\s+)?([A-Za-z_$][\w$]*(?:\.[A-Za-z_$][\w$]*)*)\s*\(",
    )
    .expect("valid assignment call regex")
});

/// Lowercase HTTP verbs usable as member or call names.
pub const HTTP_VERBS: &[&str] = &[
    "get", "post", "put", "patch", "delete", "head", "options", "trace",
];

// ---------------------------------------------------------------------------
// Emissions
// ---------------------------------------------------------------------------

/// A reference exactly as written in the unit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Target {
    /// Dotted expression: `users_router`, `views.detail`, `viewsets.UserViewSet`.
    Name(String),
    /// Call of a function returning a router: `create_router()`.
    Factory(String),
    /// A URL table referenced by name: a local list or an imported urls module.
    Table(String),
    /// Fully spelled module reference: `include("api.urls")`, `'app.views.fn'`.
    Module { module: String, name: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Emission {
    Fragment {
        receiver: Option<String>,
        method: HttpMethod,
        path: String,
        symbol: String,
        action: Option<String>,
        line: usize,
        metadata: Metadata,
    },
    Node {
        name: String,
        kind: NodeKind,
        prefix: String,
        metadata: Metadata,
        bases: Vec<String>,
        line: usize,
    },
    Link {
        parent: String,
        target: Target,
        binding: Binding,
        prefix: String,
        metadata: Metadata,
        line: usize,
    },
    /// `module.exports = name` / `export default name`.
    Export { name: String, alias: String },
    /// `alias` is the `verb` method of `receiver`, pulled out by destructuring.
    VerbAlias {
        alias: String,
        receiver: String,
        verb: String,
    },
}

// ---------------------------------------------------------------------------
// Match context
// ---------------------------------------------------------------------------

pub struct MatchContext<'a> {
    pub language: Language,
    pub stmt: &'a LogicalStatement,
    /// Statements after `stmt`, for decorator lookahead.
    pub following: &'a [LogicalStatement],
    /// Class `stmt` is a direct member of.
    pub class: Option<&'a str>,
    /// Router-like names declared earlier in the unit.
    pub routers: &'a HashSet<String>,
    /// Destructured verb functions: alias to (receiver, verb).
    pub verb_aliases: &'a HashMap<String, (String, String)>,
    pub imports: &'a ImportTable,
}

impl MatchContext<'_> {
    pub fn expr(&self) -> Expr<'_> {
        Expr::of_statement(self.stmt)
    }

    /// `Class.member` inside a class, otherwise the bare name.
    pub fn qualify(&self, name: &str) -> String {
        match self.class {
            Some(class) => format!("{class}.{name}"),
            None => name.to_string(),
        }
    }
}

/// The function or class a decorator stack applies to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Decorated {
    pub name: String,
    pub is_class: bool,
}

/// Walk past stacked decorators to the decorated `def` or `class`.
pub fn decorated_target(ctx: &MatchContext<'_>) -> Option<Decorated> {
    for next in ctx.following {
        if next.indent != ctx.stmt.indent {
            return None;
        }
        if next.masked.starts_with('@') {
            continue;
        }
        if let Some(name) = def_name(next) {
            return Some(Decorated {
                name: name.to_string(),
                is_class: false,
            });
        }
        return class_name(next).map(|name| Decorated {
            name: name.to_string(),
            is_class: true,
        });
    }
    None
}

pub fn def_name(stmt: &LogicalStatement) -> Option<&str> {
    let caps = DEF_RE.captures(&stmt.masked)?;
    caps.get(1).map(|m| &stmt.text[m.range()])
}

pub fn class_name(stmt: &LogicalStatement) -> Option<&str> {
    let caps = CLASS_RE.captures(&stmt.masked)?;
    caps.get(1).map(|m| &stmt.text[m.range()])
}

/// `name = callee(args)` with the call spanning the rest of the statement.
pub fn assignment_call<'a>(expr: &Expr<'a>) -> Option<(&'a str, &'a str, Args<'a>)> {
    let caps = ASSIGN_CALL_RE.captures(expr.masked)?;
    let var = caps.get(1)?;
    let callee = caps.get(2)?;
    let rhs = expr.tail(callee.start());
    let (_, args) = rhs.call_prefix()?;
    if rhs.tail(args.end).is_empty() {
        Some((&expr.text[var.range()], &expr.text[callee.range()], args))
    } else {
        None
    }
}

/// Last segment of a dotted name.
pub fn last_segment(dotted: &str) -> &str {
    dotted.rsplit('.').next().unwrap_or(dotted)
}

/// Methods from a `methods=[...]` style list; unknown names are skipped.
pub fn parse_methods(expr: Option<Expr<'_>>) -> Vec<HttpMethod> {
    expr.map(|e| {
        e.string_items()
            .iter()
            .filter_map(|m| HttpMethod::parse(m))
            .collect()
    })
    .unwrap_or_default()
}

/// A path argument: literal content, or the raw expression when it is not a literal.
pub fn path_value(expr: Option<Expr<'_>>) -> String {
    match expr {
        Some(e) => e.string_value().unwrap_or_else(|| e.text.to_string()),
        None => String::new(),
    }
}

/// Reference to a router-like child: a name or a zero-context factory call.
pub fn child_target(expr: Expr<'_>) -> Option<Target> {
    if let Some(name) = expr.ident_path() {
        return Some(Target::Name(name.to_string()));
    }
    let (callee, args) = expr.call()?;
    args.is_empty().then(|| Target::Factory(callee.to_string()))
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

impl Idiom {
    /// Interpreters in match priority order.
    pub const PRIORITY: [Idiom; 5] = [
        Idiom::DecoratorCall,
        Idiom::UrlPattern,
        Idiom::ResourceRegistration,
        Idiom::ClassMethods,
        Idiom::CallRegistration,
    ];

    pub fn applies_to(self, language: Language) -> bool {
        match self {
            Idiom::CallRegistration | Idiom::DecoratorCall => true,
            _ => language == Language::Python,
        }
    }

    pub fn try_match(self, ctx: &MatchContext<'_>) -> Option<Vec<Emission>> {
        let emissions = match self {
            Idiom::DecoratorCall => decorator::try_match(ctx),
            Idiom::UrlPattern => url_patterns::try_match(ctx),
            Idiom::ResourceRegistration => resource::try_match(ctx),
            Idiom::ClassMethods => class_methods::try_match(ctx),
            Idiom::CallRegistration => call_registration::try_match(ctx),
        }?;
        (!emissions.is_empty()).then_some(emissions)
    }
}

/// Offer a statement to every applicable interpreter, in priority order.
pub fn match_statement(ctx: &MatchContext<'_>) -> Vec<(Idiom, Vec<Emission>)> {
    Idiom::PRIORITY
        .into_iter()
        .filter(|idiom| idiom.applies_to(ctx.language))
        .filter_map(|idiom| idiom.try_match(ctx).map(|e| (idiom, e)))
        .collect()
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decorated_target_skips_stacked_decorators() {
        let text = "@router.get('/x')\n@cache(ttl=5)\nasync def handler():\n    pass";
        let unit = crate::scanner::classify(text, Language::Python);
        let (stmts, _) = crate::scanner::reconstruct(&unit, "m.py", Language::Python);
        let routers = HashSet::new();
        let imports = ImportTable::new("m.py", Language::Python);
        let verb_aliases = HashMap::new();
        let ctx = MatchContext {
            language: Language::Python,
            stmt: &stmts[0],
            following: &stmts[1..],
            class: None,
            routers: &routers,
            verb_aliases: &verb_aliases,
            imports: &imports,
        };
        assert_eq!(
            decorated_target(&ctx),
            Some(Decorated {
                name: "handler".into(),
                is_class: false
            })
        );
    }

    #[test]
    fn test_assignment_call() {
        let stmt = LogicalStatement::from_line(
            1,
            "router: APIRouter = APIRouter(prefix='/v1')",
            Language::Python,
        )
        .expect("statement");
        let expr = Expr::of_statement(&stmt);
        let (var, callee, args) = assignment_call(&expr).expect("assignment");
        assert_eq!((var, callee), ("router", "APIRouter"));
        assert_eq!(args.keyword("prefix").and_then(|e| e.string_value()), Some("/v1".into()));

        let chained =
            LogicalStatement::from_line(1, "x = make().build()", Language::Python).expect("stmt");
        assert!(assignment_call(&Expr::of_statement(&chained)).is_none());
    }

    #[test]
    fn test_priority_order_matches_variant_order() {
        let mut sorted = Idiom::PRIORITY;
        sorted.sort();
        assert_eq!(sorted, Idiom::PRIORITY);
        assert!(!Idiom::UrlPattern.applies_to(Language::Script));
        assert!(Idiom::CallRegistration.applies_to(Language::Python));
        assert!(Idiom::DecoratorCall.applies_to(Language::Script));
    }
}
