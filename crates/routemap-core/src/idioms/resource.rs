//! Resource routers (`DefaultRouter().register(prefix, ViewSet)`) and the
//! ViewSet members they expand into.

use std::sync::LazyLock;

use regex::Regex;

use crate::idioms::{
    assignment_call, decorated_target, def_name, last_segment, parse_methods, Emission,
    MatchContext, Target,
};
use crate::models::{Binding, HttpMethod, Metadata, NodeKind};
use crate::scanner::Expr;

static REGISTER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z_][\w.]*)\.register\s*\(").expect("valid register regex")
});

/// Path segment of a single-object action.
pub const DETAIL_PLACEHOLDER: &str = "{id}";

/// Standard ViewSet members: name, method, and whether it addresses one object.
pub const STANDARD_ACTIONS: &[(&str, HttpMethod, bool)] = &[
    ("list", HttpMethod::Get, false),
    ("create", HttpMethod::Post, false),
    ("retrieve", HttpMethod::Get, true),
    ("update", HttpMethod::Put, true),
    ("partial_update", HttpMethod::Patch, true),
    ("destroy", HttpMethod::Delete, true),
];

const RESOURCE_ROUTERS: &[&str] = &["DefaultRouter", "SimpleRouter"];

/// Standard actions a well-known ViewSet base provides without declaring them.
pub fn implied_actions(base: &str) -> &'static [&'static str] {
    match last_segment(base) {
        "ModelViewSet" => &[
            "list",
            "create",
            "retrieve",
            "update",
            "partial_update",
            "destroy",
        ],
        "ReadOnlyModelViewSet" => &["list", "retrieve"],
        "ListModelMixin" => &["list"],
        "CreateModelMixin" => &["create"],
        "RetrieveModelMixin" => &["retrieve"],
        "UpdateModelMixin" => &["update", "partial_update"],
        "DestroyModelMixin" => &["destroy"],
        _ => &[],
    }
}

/// Fragment path of a standard action, if `name` is one.
pub fn standard_action(name: &str) -> Option<(HttpMethod, &'static str)> {
    STANDARD_ACTIONS
        .iter()
        .find(|(action, _, _)| *action == name)
        .map(|(_, method, detail)| (*method, if *detail { DETAIL_PLACEHOLDER } else { "" }))
}

pub fn try_match(ctx: &MatchContext<'_>) -> Option<Vec<Emission>> {
    let expr = ctx.expr();
    if let Some(class) = ctx.class {
        return member(ctx, class, &expr);
    }
    constructor(ctx, &expr).or_else(|| registration(ctx, &expr))
}

fn constructor(ctx: &MatchContext<'_>, expr: &Expr<'_>) -> Option<Vec<Emission>> {
    let (var, callee, _) = assignment_call(expr)?;
    if !RESOURCE_ROUTERS.contains(&last_segment(callee)) {
        return None;
    }
    Some(vec![Emission::Node {
        name: var.to_string(),
        kind: NodeKind::ResourceRouter,
        prefix: String::new(),
        metadata: Metadata::default(),
        bases: Vec::new(),
        line: ctx.stmt.start_line,
    }])
}

fn registration(ctx: &MatchContext<'_>, expr: &Expr<'_>) -> Option<Vec<Emission>> {
    let caps = REGISTER_RE.captures(expr.masked)?;
    let router = &expr.text[caps.get(1)?.range()];
    let args = expr.args_at(caps.get(0)?.end() - 1)?;
    if !expr.tail(args.end).is_empty() {
        return None;
    }
    // A computed prefix cannot be routed.
    let prefix = args
        .positional(0)
        .or_else(|| args.keyword("prefix"))?
        .string_value()?;
    let viewset = args
        .positional(1)
        .or_else(|| args.keyword("viewset"))?
        .ident_path()?;
    let prefix = prefix.trim_start_matches('^').trim_end_matches('$').to_string();
    let metadata = Metadata {
        name: args
            .keyword("basename")
            .or_else(|| args.keyword("base_name"))
            .and_then(|e| e.string_value()),
        ..Metadata::default()
    };
    Some(vec![Emission::Link {
        parent: router.to_string(),
        target: Target::Name(viewset.to_string()),
        binding: Binding::Resource,
        prefix,
        metadata,
        line: ctx.stmt.start_line,
    }])
}

/// Standard actions and `@action` extras declared directly in a class body.
fn member(ctx: &MatchContext<'_>, class: &str, expr: &Expr<'_>) -> Option<Vec<Emission>> {
    let line = ctx.stmt.start_line;
    if let Some(body) = expr.masked.strip_prefix('@').map(|_| expr.tail(1)) {
        let (callee, args) = match body.call() {
            Some((callee, args)) => (callee, Some(args)),
            None => (body.ident_path()?, None),
        };
        let detail = match last_segment(callee) {
            "action" => args
                .as_ref()
                .and_then(|a| a.keyword("detail"))
                .and_then(|e| e.bool_value())
                .unwrap_or(false),
            "detail_route" => true,
            "list_route" => false,
            _ => return None,
        };
        let target = decorated_target(ctx)?;
        if target.is_class {
            return None;
        }
        let mut methods = parse_methods(args.as_ref().and_then(|a| a.keyword("methods")));
        if methods.is_empty() {
            methods.push(HttpMethod::Get);
        }
        let segment = args
            .as_ref()
            .and_then(|a| a.keyword("url_path"))
            .and_then(|e| e.string_value())
            .unwrap_or_else(|| target.name.clone());
        let path = if detail {
            format!("{DETAIL_PLACEHOLDER}/{segment}")
        } else {
            segment
        };
        let metadata = Metadata {
            name: args
                .as_ref()
                .and_then(|a| a.keyword("url_name"))
                .and_then(|e| e.string_value()),
            ..Metadata::default()
        };
        return Some(
            methods
                .into_iter()
                .map(|method| Emission::Fragment {
                    receiver: Some(class.to_string()),
                    method,
                    path: path.clone(),
                    symbol: ctx.qualify(&target.name),
                    action: Some(target.name.clone()),
                    line,
                    metadata: metadata.clone(),
                })
                .collect(),
        );
    }

    let name = def_name(ctx.stmt)?;
    let (method, path) = standard_action(name)?;
    Some(vec![Emission::Fragment {
        receiver: Some(class.to_string()),
        method,
        path: path.to_string(),
        symbol: ctx.qualify(name),
        action: Some(name.to_string()),
        line,
        metadata: Metadata::default(),
    }])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::idioms::testing::run;
    use crate::models::{Idiom, Language};

    fn run_py(text: &str, line: usize, class: Option<&str>) -> Option<Vec<Emission>> {
        run(
            Idiom::ResourceRegistration,
            text,
            Language::Python,
            line,
            class,
            &[],
        )
    }

    #[test]
    fn test_router_and_registration() {
        let node = run_py("router = DefaultRouter()", 1, None).expect("constructor");
        assert!(matches!(
            &node[0],
            Emission::Node { kind: NodeKind::ResourceRouter, name, .. } if name == "router"
        ));
        let link = run_py(
            "router.register(r'users', UserViewSet, basename='user')",
            1,
            None,
        )
        .expect("registration");
        assert!(matches!(
            &link[0],
            Emission::Link { parent, target: Target::Name(v), binding: Binding::Resource, prefix, metadata, .. }
                if parent == "router" && v == "UserViewSet" && prefix == "users"
                    && metadata.name.as_deref() == Some("user")
        ));
    }

    #[test]
    fn test_computed_prefix_is_declined() {
        assert!(run_py("router.register(PREFIX, UserViewSet)", 1, None).is_none());
        assert!(run_py("admin.site.register(User)", 1, None).is_none());
    }

    #[test]
    fn test_standard_members_only_inside_class() {
        let text = "class UserViewSet(viewsets.ViewSet):\n    def list(self, request):\n        pass\n    def retrieve(self, request, pk=None):\n        pass";
        let list = run_py(text, 2, Some("UserViewSet")).expect("list");
        assert!(matches!(
            &list[0],
            Emission::Fragment { method: HttpMethod::Get, path, symbol, .. }
                if path.is_empty() && symbol == "UserViewSet.list"
        ));
        let retrieve = run_py(text, 4, Some("UserViewSet")).expect("retrieve");
        assert!(matches!(&retrieve[0], Emission::Fragment { path, .. } if path == "{id}"));
        assert!(run_py("def list(request):\n    pass", 1, None).is_none());
    }

    #[test]
    fn test_action_extras() {
        let text = "class UserViewSet(viewsets.ViewSet):\n    @action(detail=True, methods=['post'])\n    def activate(self, request, pk=None):\n        pass\n    @action(detail=False, url_path='recent-users')\n    def recent(self, request):\n        pass";
        let activate = run_py(text, 2, Some("UserViewSet")).expect("detail action");
        assert!(matches!(
            &activate[0],
            Emission::Fragment { method: HttpMethod::Post, path, action, .. }
                if path == "{id}/activate" && action.as_deref() == Some("activate")
        ));
        let recent = run_py(text, 5, Some("UserViewSet")).expect("list action");
        assert!(matches!(
            &recent[0],
            Emission::Fragment { method: HttpMethod::Get, path, .. } if path == "recent-users"
        ));
    }

    #[test]
    fn test_implied_actions() {
        assert_eq!(implied_actions("viewsets.ModelViewSet").len(), 6);
        assert_eq!(implied_actions("ReadOnlyModelViewSet"), &["list", "retrieve"]);
        assert!(implied_actions("GenericViewSet").is_empty());
        assert_eq!(standard_action("destroy"), Some((HttpMethod::Delete, "{id}")));
    }
}
