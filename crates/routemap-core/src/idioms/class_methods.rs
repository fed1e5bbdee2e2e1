//! Class-based views: HTTP-method members of a class, bound wherever the
//! class is routed (`as_view()`, a decorated class, a resource registration).

use crate::idioms::{class_name, def_name, last_segment, Emission, MatchContext, HTTP_VERBS};
use crate::models::{HttpMethod, Metadata, NodeKind};

/// Methods a well-known generic base class handles without declaring them.
pub fn implied_methods(base: &str) -> &'static [HttpMethod] {
    use HttpMethod::{Delete, Get, Patch, Post, Put};
    match last_segment(base) {
        "ListAPIView" | "RetrieveAPIView" | "ListView" | "DetailView" | "TemplateView"
        | "RedirectView" | "ArchiveIndexView" => &[Get],
        "CreateAPIView" => &[Post],
        "DestroyAPIView" => &[Delete],
        "UpdateAPIView" => &[Put, Patch],
        "ListCreateAPIView" => &[Get, Post],
        "RetrieveUpdateAPIView" => &[Get, Put, Patch],
        "RetrieveDestroyAPIView" => &[Get, Delete],
        "RetrieveUpdateDestroyAPIView" => &[Get, Put, Patch, Delete],
        "FormView" | "CreateView" | "UpdateView" | "DeleteView" => &[Get, Post],
        _ => &[],
    }
}

pub fn try_match(ctx: &MatchContext<'_>) -> Option<Vec<Emission>> {
    if let Some(name) = class_name(ctx.stmt) {
        return Some(vec![Emission::Node {
            name: name.to_string(),
            kind: NodeKind::ViewClass,
            prefix: String::new(),
            metadata: Metadata::default(),
            bases: bases(ctx),
            line: ctx.stmt.start_line,
        }]);
    }
    let class = ctx.class?;
    let member = def_name(ctx.stmt)?;
    if !HTTP_VERBS.contains(&member) {
        return None;
    }
    let method = HttpMethod::parse(member)?;
    Some(vec![Emission::Fragment {
        receiver: Some(class.to_string()),
        method,
        path: String::new(),
        symbol: ctx.qualify(member),
        action: Some(member.to_string()),
        line: ctx.stmt.start_line,
        metadata: Metadata::default(),
    }])
}

/// Positional base classes; `metaclass=` and other keywords are skipped.
fn bases(ctx: &MatchContext<'_>) -> Vec<String> {
    let expr = ctx.expr();
    let Some(open) = expr.masked.find('(') else {
        return Vec::new();
    };
    if expr.masked[..open].contains(':') {
        return Vec::new();
    }
    expr.args_at(open)
        .map(|args| {
            args.positionals()
                .filter_map(|e| e.ident_path())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::idioms::testing::run;
    use crate::models::{Idiom, Language};

    const VIEW: &str = "class OrderView(mixins.AuthMixin, generics.GenericAPIView, metaclass=Meta):\n    def get(self, request):\n        pass\n    async def delete(self, request):\n        pass\n    def get_queryset(self):\n        pass";

    fn run_py(line: usize, class: Option<&str>) -> Option<Vec<Emission>> {
        run(Idiom::ClassMethods, VIEW, Language::Python, line, class, &[])
    }

    #[test]
    fn test_class_declares_view_node_with_bases() {
        let emissions = run_py(1, None).expect("class");
        assert!(matches!(
            &emissions[0],
            Emission::Node { name, kind: NodeKind::ViewClass, bases, .. }
                if name == "OrderView"
                    && bases == &vec!["mixins.AuthMixin".to_string(), "generics.GenericAPIView".to_string()]
        ));
    }

    #[test]
    fn test_verb_members() {
        let get = run_py(2, Some("OrderView")).expect("get");
        assert!(matches!(
            &get[0],
            Emission::Fragment { method: HttpMethod::Get, symbol, receiver, .. }
                if symbol == "OrderView.get" && receiver.as_deref() == Some("OrderView")
        ));
        let delete = run_py(4, Some("OrderView")).expect("delete");
        assert!(matches!(&delete[0], Emission::Fragment { method: HttpMethod::Delete, .. }));
        assert!(run_py(6, Some("OrderView")).is_none());
    }

    #[test]
    fn test_module_level_verb_function_is_not_a_member() {
        let emissions = run(
            Idiom::ClassMethods,
            "def get(request):\n    pass",
            Language::Python,
            1,
            None,
            &[],
        );
        assert!(emissions.is_none());
    }

    #[test]
    fn test_generic_base_methods() {
        assert_eq!(
            implied_methods("generics.ListCreateAPIView"),
            &[HttpMethod::Get, HttpMethod::Post]
        );
        assert!(implied_methods("APIView").is_empty());
    }

    #[test]
    fn test_bare_class() {
        let emissions = run(
            Idiom::ClassMethods,
            "class Health:\n    pass",
            Language::Python,
            1,
            None,
            &[],
        )
        .expect("class");
        assert!(matches!(&emissions[0], Emission::Node { bases, .. } if bases.is_empty()));
    }
}
