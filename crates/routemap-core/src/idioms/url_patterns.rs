//! URL-pattern tables (`urlpatterns = [path(...), re_path(...), ...]`).
//!
//! A table is a composition node. Each entry either binds a view to a path,
//! or includes another table (`include("app.urls")`, `include(router.urls)`,
//! an inline list) under the entry's route.

use std::sync::LazyLock;

use regex::Regex;

use crate::idioms::{last_segment, Emission, MatchContext, Target};
use crate::models::{Binding, HttpMethod, Metadata, NodeKind};
use crate::scanner::{expr::split_top_level, Expr};

static TABLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z_]\w*patterns)\s*(?::[^=]*)?(\+?=)").expect("valid url table regex")
});

pub fn try_match(ctx: &MatchContext<'_>) -> Option<Vec<Emission>> {
    let expr = ctx.expr();
    let caps = TABLE_RE.captures(expr.masked)?;
    let table = &expr.text[caps.get(1)?.range()];
    let rhs = expr.tail(caps.get(0)?.end());
    if rhs.is_empty() || rhs.masked.starts_with('=') {
        return None;
    }

    let mut out = vec![Emission::Node {
        name: table.to_string(),
        kind: NodeKind::UrlTable,
        prefix: String::new(),
        metadata: Metadata::default(),
        bases: Vec::new(),
        line: ctx.stmt.start_line,
    }];
    let emitter = TableEmitter { ctx, table };
    for range in split_top_level(rhs.masked, 0, rhs.masked.len(), b'+') {
        let operand = rhs.slice(range);
        emitter.operand(operand, &mut out);
    }
    Some(out)
}

struct TableEmitter<'c, 'a> {
    ctx: &'c MatchContext<'a>,
    table: &'c str,
}

impl TableEmitter<'_, '_> {
    fn line(&self, expr: &Expr<'_>) -> usize {
        self.ctx.stmt.line_at(expr.offset)
    }

    fn include(&self, target: Target, prefix: String, line: usize, out: &mut Vec<Emission>) {
        out.push(Emission::Link {
            parent: self.table.to_string(),
            target,
            binding: Binding::Include,
            prefix,
            metadata: Metadata::default(),
            line,
        });
    }

    /// One `+`-separated operand of the table assignment.
    fn operand(&self, operand: Expr<'_>, out: &mut Vec<Emission>) {
        if let Some(items) = operand.items() {
            for item in items {
                self.entry(item, "", out);
            }
            return;
        }
        if let Some(name) = operand.ident_path() {
            let target = match name.strip_suffix(".urls") {
                Some(router) => Target::Name(router.to_string()),
                None => Target::Table(name.to_string()),
            };
            self.include(target, String::new(), self.line(&operand), out);
            return;
        }
        // Legacy `patterns('', url(...), ...)`.
        if let Some((callee, args)) = operand.call() {
            if last_segment(callee) == "patterns" {
                for item in args.positionals().skip(1) {
                    self.entry(item, "", out);
                }
            }
        }
    }

    /// A `path(route, view, name=...)` entry, with `outer` prepended to its route.
    fn entry(&self, item: Expr<'_>, outer: &str, out: &mut Vec<Emission>) {
        let Some((callee, args)) = item.call() else {
            return;
        };
        let kind = last_segment(callee);
        if !matches!(kind, "path" | "re_path" | "url") {
            return;
        }
        let Some(view) = args.positional(1).or_else(|| args.keyword("view")) else {
            return;
        };
        let mut route = args
            .positional(0)
            .or_else(|| args.keyword("route"))
            .and_then(|e| e.string_value())
            .unwrap_or_default();
        if kind != "path" {
            route = strip_anchors(&route).to_string();
        }
        let route = format!("{outer}{route}");
        let line = self.line(&item);
        let metadata = Metadata {
            name: args.keyword("name").and_then(|e| e.string_value()),
            ..Metadata::default()
        };

        if let Some((include_callee, include_args)) = view.call() {
            if last_segment(include_callee) == "include" {
                if let Some(first) = include_args.positional(0) {
                    self.included(first, route, line, out);
                }
                return;
            }
            if let Some(class) = include_callee.strip_suffix(".as_view") {
                let method_map = include_args
                    .positional(0)
                    .or_else(|| include_args.keyword("actions"))
                    .and_then(|e| e.dict_items())
                    .map(|pairs| {
                        pairs
                            .iter()
                            .filter_map(|(k, v)| {
                                Some((HttpMethod::parse(&k.string_value()?)?, v.string_value()?))
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                out.push(Emission::Link {
                    parent: self.table.to_string(),
                    target: Target::Name(class.to_string()),
                    binding: Binding::View { method_map },
                    prefix: route,
                    metadata,
                    line,
                });
                return;
            }
        }

        let target = if let Some(dotted) = view.string_value() {
            match dotted.rsplit_once('.') {
                Some((module, name)) => Some(Target::Module {
                    module: module.to_string(),
                    name: name.to_string(),
                }),
                None => Some(Target::Name(dotted)),
            }
        } else {
            view.ident_path().map(|name| Target::Name(name.to_string()))
        };
        match target {
            Some(target) => out.push(Emission::Link {
                parent: self.table.to_string(),
                target,
                binding: Binding::Handler,
                prefix: route,
                metadata,
                line,
            }),
            None => out.push(Emission::Fragment {
                receiver: Some(self.table.to_string()),
                method: HttpMethod::Any,
                path: route,
                symbol: view.text.to_string(),
                action: None,
                line,
                metadata,
            }),
        }
    }

    /// The argument of `include(...)` under `route`.
    fn included(&self, first: Expr<'_>, route: String, line: usize, out: &mut Vec<Emission>) {
        if let Some(module) = first.string_value() {
            let target = Target::Module {
                module,
                name: "urlpatterns".to_string(),
            };
            self.include(target, route, line, out);
            return;
        }
        if let Some(items) = first.items() {
            // `include((patterns, "app_name"))` or an inline list of entries.
            if first.masked.starts_with('(') {
                if let Some(inner) = items.first() {
                    self.included(*inner, route, line, out);
                }
            } else {
                for item in items {
                    self.entry(item, &route, out);
                }
            }
            return;
        }
        if let Some(name) = first.ident_path() {
            let target = match name.strip_suffix(".urls") {
                Some(router) => Target::Name(router.to_string()),
                None => Target::Table(name.to_string()),
            };
            self.include(target, route, line, out);
        }
    }
}

/// `^users/(?P<pk>\d+)/$` -> `users/(?P<pk>\d+)/`
fn strip_anchors(route: &str) -> &str {
    let route = route.strip_prefix('^').unwrap_or(route);
    route.strip_suffix('$').unwrap_or(route)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::idioms::testing::run;
    use crate::models::{Idiom, Language};

    fn run_py(text: &str) -> Vec<Emission> {
        run(Idiom::UrlPattern, text, Language::Python, 1, None, &[]).expect("url table match")
    }

    fn links(emissions: &[Emission]) -> Vec<(Target, String, usize)> {
        emissions
            .iter()
            .filter_map(|e| match e {
                Emission::Link {
                    target,
                    prefix,
                    line,
                    ..
                } => Some((target.clone(), prefix.clone(), *line)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_table_entries_carry_their_own_lines() {
        let emissions = run_py(
            "urlpatterns = [\n    path('users/', views.user_list, name='user-list'),\n    path('users/<int:pk>/', views.user_detail),\n]",
        );
        assert!(matches!(
            &emissions[0],
            Emission::Node { name, kind: NodeKind::UrlTable, .. } if name == "urlpatterns"
        ));
        assert_eq!(
            links(&emissions),
            vec![
                (Target::Name("views.user_list".into()), "users/".into(), 2),
                (Target::Name("views.user_detail".into()), "users/<int:pk>/".into(), 3),
            ]
        );
        assert!(matches!(
            &emissions[1],
            Emission::Link { metadata, binding: Binding::Handler, .. }
                if metadata.name.as_deref() == Some("user-list")
        ));
    }

    #[test]
    fn test_includes() {
        let emissions = run_py(
            "urlpatterns = [path('api/', include('api.urls')), path('r/', include(router.urls)), re_path(r'^legacy/', include(legacy_patterns))]",
        );
        assert_eq!(
            links(&emissions),
            vec![
                (
                    Target::Module {
                        module: "api.urls".into(),
                        name: "urlpatterns".into()
                    },
                    "api/".into(),
                    1
                ),
                (Target::Name("router".into()), "r/".into(), 1),
                (Target::Table("legacy_patterns".into()), "legacy/".into(), 1),
            ]
        );
    }

    #[test]
    fn test_inline_include_expands_with_prefix() {
        let emissions = run_py(
            "urlpatterns = [path('shop/', include([path('cart/', views.cart), path('pay/', views.pay)]))]",
        );
        let prefixes: Vec<String> = links(&emissions).into_iter().map(|l| l.1).collect();
        assert_eq!(prefixes, vec!["shop/cart/", "shop/pay/"]);
    }

    #[test]
    fn test_as_view_with_action_map() {
        let emissions = run_py(
            "urlpatterns = [path('items/', ItemViewSet.as_view({'get': 'list', 'post': 'create'}))]",
        );
        let Emission::Link {
            target, binding, ..
        } = &emissions[1]
        else {
            panic!("expected link");
        };
        assert_eq!(target, &Target::Name("ItemViewSet".into()));
        assert_eq!(
            binding,
            &Binding::View {
                method_map: vec![
                    (HttpMethod::Get, "list".into()),
                    (HttpMethod::Post, "create".into())
                ]
            }
        );
    }

    #[test]
    fn test_concatenation_and_augmented_assignment() {
        let emissions = run_py("urlpatterns = router.urls + [path('ping/', ping)]");
        assert_eq!(links(&emissions).len(), 2);
        let extra = run_py("urlpatterns += [url(r'^about/$', 'pages.views.about')]");
        assert_eq!(
            links(&extra),
            vec![(
                Target::Module {
                    module: "pages.views".into(),
                    name: "about".into()
                },
                "about/".into(),
                1
            )]
        );
    }

    #[test]
    fn test_unrecognized_view_becomes_any_fragment() {
        let emissions = run_py("urlpatterns = [path('health/', lambda r: HttpResponse('ok'))]");
        assert!(matches!(
            &emissions[1],
            Emission::Fragment { method: HttpMethod::Any, path, .. } if path == "health/"
        ));
    }

    #[test]
    fn test_other_assignments_declined() {
        assert!(run(Idiom::UrlPattern, "patterns_count = 3", Language::Python, 1, None, &[]).is_none());
        assert!(run(Idiom::UrlPattern, "routes = [path('a/', b)]", Language::Python, 1, None, &[]).is_none());
        assert!(run(Idiom::UrlPattern, "urlpatterns == []", Language::Python, 1, None, &[]).is_none());
    }
}
