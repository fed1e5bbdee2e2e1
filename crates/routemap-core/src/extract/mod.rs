//! Per-unit extraction: classify, reconstruct, match idioms, and lower the
//! emissions into fragments and composition nodes.
//!
//! Lowering rewrites every name written in the unit into a [`NodeRef`], so
//! that the resolver works from fragments and nodes alone. Names declared
//! inside a function are scoped (`create_router.router`) and the node records
//! the function as its factory.

pub mod imports;

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::idioms::{class_name, def_name, match_statement, Emission, MatchContext, Target};
use crate::models::{
    ChildLink, CompositionNode, Diagnostic, EndpointFragment, Idiom, Issue, Language, NodeKind,
    NodeRef, SourceLocation, SourceUnit,
};
use crate::scanner::{classify, reconstruct, LogicalStatement};

use self::imports::ImportTable;

/// Everything one unit contributes to the corpus.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitAnalysis {
    pub identity: String,
    pub fragments: Vec<EndpointFragment>,
    pub nodes: Vec<CompositionNode>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Run the per-unit stages over `unit`. Never fails: problems become diagnostics.
pub fn extract_unit(unit: &SourceUnit, flag_ambiguous: bool) -> UnitAnalysis {
    let identity = unit.identity.as_str();
    let mut diagnostics = Vec::new();

    let classified = classify(&unit.text, unit.language);
    if let Some((line, issue)) = &classified.unterminated {
        diagnostics.push(Diagnostic::new(
            SourceLocation::new(identity, *line),
            issue.clone(),
        ));
    }
    let (statements, statement_diagnostics) = reconstruct(&classified, identity, unit.language);
    diagnostics.extend(statement_diagnostics);

    let mut imports = ImportTable::new(identity, unit.language);
    let drafts = scan(
        unit,
        &statements,
        &mut imports,
        flag_ambiguous,
        &mut diagnostics,
    );

    let mut lowering = Lowering {
        identity,
        module: unit.module_name(),
        imports: &imports,
        nodes: IndexMap::new(),
    };
    let fragments = lowering.lower(drafts);
    let nodes: Vec<CompositionNode> = lowering.nodes.into_values().collect();

    debug!(
        unit = identity,
        statements = statements.len(),
        fragments = fragments.len(),
        nodes = nodes.len(),
        diagnostics = diagnostics.len(),
        "extracted unit"
    );
    UnitAnalysis {
        identity: identity.to_string(),
        fragments,
        nodes,
        diagnostics,
    }
}

// ---------------------------------------------------------------------------
// Matching
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ScopeKind {
    Class,
    Function,
}

#[derive(Clone, Debug)]
struct Scope {
    indent: usize,
    name: String,
    kind: ScopeKind,
}

/// An emission together with the scope it was written in.
#[derive(Debug)]
struct Draft {
    idiom: Idiom,
    emission: Emission,
    scope: Vec<String>,
    factory: Option<String>,
}

fn scan(
    unit: &SourceUnit,
    statements: &[LogicalStatement],
    imports: &mut ImportTable,
    flag_ambiguous: bool,
    diagnostics: &mut Vec<Diagnostic>,
) -> Vec<Draft> {
    let mut scopes: Vec<Scope> = Vec::new();
    let mut routers: HashSet<String> = HashSet::new();
    let mut verb_aliases: HashMap<String, (String, String)> = HashMap::new();
    let mut drafts = Vec::new();

    for (idx, stmt) in statements.iter().enumerate() {
        if unit.language == Language::Python {
            while scopes.last().is_some_and(|s| stmt.indent <= s.indent) {
                scopes.pop();
            }
        }
        if imports.scan(stmt) {
            continue;
        }

        let class = match scopes.last() {
            Some(scope) if scope.kind == ScopeKind::Class => Some(scope.name.as_str()),
            _ => None,
        };
        let ctx = MatchContext {
            language: unit.language,
            stmt,
            following: &statements[idx + 1..],
            class,
            routers: &routers,
            verb_aliases: &verb_aliases,
            imports,
        };
        let matches = match_statement(&ctx);
        if matches.len() > 1 && flag_ambiguous {
            diagnostics.push(Diagnostic::new(
                SourceLocation::new(&unit.identity, stmt.start_line),
                Issue::AmbiguousMatch {
                    idioms: matches.iter().map(|(idiom, _)| *idiom).collect(),
                },
            ));
        }

        let scope_names: Vec<String> = scopes.iter().map(|s| s.name.clone()).collect();
        let factory = scopes
            .first()
            .filter(|s| s.kind == ScopeKind::Function)
            .map(|s| s.name.clone());
        if let Some((idiom, emissions)) = matches.into_iter().next() {
            for emission in emissions {
                match &emission {
                    Emission::Node { name, kind, .. } if kind.is_container() => {
                        routers.insert(name.clone());
                    }
                    Emission::VerbAlias {
                        alias,
                        receiver,
                        verb,
                    } => {
                        verb_aliases.insert(alias.clone(), (receiver.clone(), verb.clone()));
                        continue;
                    }
                    _ => {}
                }
                drafts.push(Draft {
                    idiom,
                    emission,
                    scope: scope_names.clone(),
                    factory: factory.clone(),
                });
            }
        }

        if unit.language == Language::Python {
            let opened = def_name(stmt)
                .map(|n| (n, ScopeKind::Function))
                .or_else(|| class_name(stmt).map(|n| (n, ScopeKind::Class)));
            if let Some((name, kind)) = opened {
                scopes.push(Scope {
                    indent: stmt.indent,
                    name: name.to_string(),
                    kind,
                });
            }
        }
    }
    drafts
}

// ---------------------------------------------------------------------------
// Lowering
// ---------------------------------------------------------------------------

struct Lowering<'a> {
    identity: &'a str,
    module: String,
    imports: &'a ImportTable,
    nodes: IndexMap<String, CompositionNode>,
}

fn scoped(scope: &[String], name: &str) -> String {
    if scope.is_empty() {
        name.to_string()
    } else {
        format!("{}.{name}", scope.join("."))
    }
}

fn split_dotted(dotted: &str) -> NodeRef {
    match dotted.rsplit_once('.') {
        Some((module, name)) => NodeRef::external(module, name),
        None => NodeRef::external("", dotted),
    }
}

fn written(target: &Target) -> String {
    match target {
        Target::Name(n) | Target::Table(n) => n.clone(),
        Target::Factory(f) => format!("{f}()"),
        Target::Module { module, name } => format!("{module}.{name}"),
    }
}

impl Lowering<'_> {
    fn lower(&mut self, drafts: Vec<Draft>) -> Vec<EndpointFragment> {
        let mut bases = Vec::new();
        let mut rest = Vec::new();
        for draft in drafts {
            match draft.emission {
                Emission::Node {
                    name,
                    kind,
                    prefix,
                    metadata,
                    bases: written_bases,
                    line,
                } => {
                    let key = scoped(&draft.scope, &name);
                    let node = self.nodes.entry(key.clone()).or_insert_with(|| {
                        let mut node =
                            CompositionNode::new(self.identity, &self.module, &key, kind, line);
                        node.factory = draft.factory.clone();
                        node
                    });
                    if node.prefix.is_empty() {
                        node.prefix = prefix;
                    }
                    node.metadata = node.metadata.merged_with(&metadata);
                    if !written_bases.is_empty() {
                        bases.push((key, draft.scope, written_bases));
                    }
                }
                emission => rest.push(Draft { emission, ..draft }),
            }
        }

        for (key, scope, written_bases) in bases {
            let refs: Vec<NodeRef> = written_bases
                .iter()
                .map(|b| self.target_ref(&scope, &Target::Name(b.clone())))
                .collect();
            if let Some(node) = self.nodes.get_mut(&key) {
                node.bases.extend(refs);
            }
        }

        let mut fragments = Vec::new();
        for draft in rest {
            match draft.emission {
                Emission::Fragment {
                    receiver,
                    method,
                    path,
                    symbol,
                    action,
                    line,
                    metadata,
                } => {
                    let key = receiver.map(|r| self.receiver_ref(&draft.scope, &r, line));
                    fragments.push(EndpointFragment {
                        method,
                        path,
                        symbol,
                        action,
                        idiom: draft.idiom,
                        location: SourceLocation::new(self.identity, line),
                        metadata,
                        key,
                    });
                }
                Emission::Link {
                    parent,
                    target,
                    binding,
                    prefix,
                    metadata,
                    line,
                } => {
                    let target_ref = self.target_ref(&draft.scope, &target);
                    let parent_key = self.parent_key(&draft.scope, &parent, line);
                    let link = ChildLink {
                        target: target_ref,
                        symbol: written(&target),
                        binding,
                        prefix,
                        metadata,
                        location: SourceLocation::new(self.identity, line),
                    };
                    if let Some(node) = self.nodes.get_mut(&parent_key) {
                        node.links.push(link);
                    }
                }
                Emission::Export { name, alias } => {
                    if let Some(key) = self.find_local(&draft.scope, &name) {
                        if let Some(node) = self.nodes.get_mut(&key) {
                            if !node.answers_to(&alias) {
                                node.aliases.push(alias);
                            }
                        }
                    }
                }
                Emission::Node { .. } | Emission::VerbAlias { .. } => {}
            }
        }
        fragments
    }

    /// Innermost declared node visible from `scope` under `name`.
    fn find_local(&self, scope: &[String], name: &str) -> Option<String> {
        (0..=scope.len())
            .rev()
            .map(|k| scoped(&scope[..k], name))
            .find(|key| self.nodes.contains_key(key))
    }

    fn local_ref(&self, name: &str) -> NodeRef {
        NodeRef::local(self.identity, &self.module, name)
    }

    fn imported(&self, name: &str) -> Option<NodeRef> {
        let (module, member) = self.imports.resolve(name)?;
        Some(match member {
            Some(member) => NodeRef::external(&module, &member),
            None => split_dotted(&module),
        })
    }

    /// A receiver nobody declared: an application object built elsewhere at runtime.
    fn implicit(&mut self, scope: &[String], name: &str, line: usize) -> String {
        let key = scoped(scope, name);
        self.nodes.entry(key.clone()).or_insert_with(|| {
            CompositionNode::new(self.identity, &self.module, &key, NodeKind::Router, line)
        });
        key
    }

    fn receiver_ref(&mut self, scope: &[String], name: &str, line: usize) -> NodeRef {
        if let Some(key) = self.find_local(scope, name) {
            return match self.nodes.get(&key).and_then(|n| n.extends.clone()) {
                Some(extended) => extended,
                None => self.local_ref(&key),
            };
        }
        if let Some(imported) = self.imported(name) {
            return imported;
        }
        let key = self.implicit(scope, name, line);
        self.local_ref(&key)
    }

    /// Node that owns links registered on `name`; imported parents get a stand-in.
    fn parent_key(&mut self, scope: &[String], name: &str, line: usize) -> String {
        if let Some(key) = self.find_local(scope, name) {
            return key;
        }
        let key = self.implicit(scope, name, line);
        if let Some(imported) = self.imported(name) {
            if let Some(node) = self.nodes.get_mut(&key) {
                node.extends = Some(imported);
            }
        }
        key
    }

    fn target_ref(&self, scope: &[String], target: &Target) -> NodeRef {
        match target {
            Target::Name(name) => {
                if let Some(key) = self.find_local(scope, name) {
                    return self.local_ref(&key);
                }
                if let Some(imported) = self.imported(name) {
                    return imported;
                }
                if name.contains('.') {
                    return split_dotted(name);
                }
                self.local_ref(name)
            }
            Target::Factory(function) => {
                let declared_here = self
                    .nodes
                    .values()
                    .any(|n| n.factory.as_deref() == Some(function.as_str()));
                let mut r = if declared_here {
                    self.local_ref(function)
                } else if let Some(imported) = self.imported(function) {
                    imported
                } else if function.contains('.') {
                    split_dotted(function)
                } else {
                    self.local_ref(function)
                };
                r.factory = true;
                r
            }
            Target::Table(name) => {
                if let Some(key) = self.find_local(scope, name) {
                    return self.local_ref(&key);
                }
                match self.imports.resolve(name) {
                    Some((module, Some(member))) if member.ends_with("patterns") => {
                        NodeRef::external(&module, &member)
                    }
                    Some((module, Some(member))) => {
                        NodeRef::external(&format!("{module}.{member}"), "urlpatterns")
                    }
                    Some((module, None)) => NodeRef::external(&module, "urlpatterns"),
                    None if name.contains('.') => split_dotted(name),
                    None => self.local_ref(name),
                }
            }
            Target::Module { module, name } => NodeRef::external(module, name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Binding, HttpMethod};

    fn extract(identity: &str, text: &str) -> UnitAnalysis {
        extract_unit(&SourceUnit::new(identity, text), true)
    }

    fn node<'a>(analysis: &'a UnitAnalysis, name: &str) -> &'a CompositionNode {
        analysis
            .nodes
            .iter()
            .find(|n| n.name == name)
            .unwrap_or_else(|| panic!("node {name} missing"))
    }

    #[test]
    fn test_commented_decorator_yields_nothing() {
        let analysis = extract(
            "app/main.py",
            "# @app.get(\"/hidden\")\ndef hidden():\n    pass\n",
        );
        assert!(analysis.fragments.is_empty());
    }

    #[test]
    fn test_docstring_decorator_yields_nothing() {
        let text = "def helper():\n    \"\"\"\n    @app.get(\"/users/{id}\")\n    def get_user(id): ...\n    \"\"\"\n    return 1\n";
        let analysis = extract("app/main.py", text);
        assert!(analysis.fragments.is_empty());
        assert!(analysis.diagnostics.is_empty());
    }

    #[test]
    fn test_factory_scoped_router() {
        let text = "from fastapi import APIRouter\n\ndef create_items_router():\n    router = APIRouter(prefix='/items')\n\n    @router.get('/')\n    def list_items():\n        pass\n\n    return router\n\nrouter = APIRouter()\n";
        let analysis = extract("app/items.py", text);
        let scoped = node(&analysis, "create_items_router.router");
        assert_eq!(scoped.factory.as_deref(), Some("create_items_router"));
        assert_eq!(scoped.prefix, "/items");
        assert_eq!(node(&analysis, "router").factory, None);
        let key = analysis.fragments[0].key.as_ref().expect("keyed");
        assert_eq!(key.name, "create_items_router.router");
        assert_eq!(key.unit.as_deref(), Some("app/items.py"));
    }

    #[test]
    fn test_imported_receiver_and_parent() {
        let text = "from app.main import app\nfrom app.routers import users\n\n@app.get('/health')\ndef health():\n    pass\n\napp.include_router(users.router, prefix='/users')\n";
        let analysis = extract("app/extra.py", text);
        let key = analysis.fragments[0].key.as_ref().expect("keyed");
        assert_eq!((key.module.as_str(), key.name.as_str()), ("app.main", "app"));
        assert_eq!(key.unit, None);

        let stand_in = node(&analysis, "app");
        assert_eq!(
            stand_in.extends,
            Some(NodeRef::external("app.main", "app"))
        );
        let link = &stand_in.links[0];
        assert_eq!(link.target, NodeRef::external("app.routers.users", "router"));
        assert_eq!(link.symbol, "users.router");
        assert_eq!(link.prefix, "/users");
        assert_eq!(link.location.line, 8);
    }

    #[test]
    fn test_class_members_and_bases() {
        let text = "from rest_framework import generics\n\nclass Base(generics.ListAPIView):\n    pass\n\nclass OrderView(Base):\n    def post(self, request):\n        pass\n";
        let analysis = extract("shop/views.py", text);
        let order = node(&analysis, "OrderView");
        assert_eq!(order.kind, NodeKind::ViewClass);
        assert_eq!(order.bases, vec![NodeRef::local("shop/views.py", "shop.views", "Base")]);
        assert_eq!(
            node(&analysis, "Base").bases,
            vec![NodeRef::external("rest_framework.generics", "ListAPIView")]
        );
        let fragment = &analysis.fragments[0];
        assert_eq!(fragment.method, HttpMethod::Post);
        assert_eq!(fragment.symbol, "OrderView.post");
        assert_eq!(fragment.idiom, Idiom::ClassMethods);
    }

    #[test]
    fn test_ambiguous_call_form_keeps_first_match() {
        let analysis = extract("app/main.py", "app.post('/hooks')(receive_hook)\n");
        assert_eq!(analysis.fragments.len(), 1);
        assert_eq!(analysis.fragments[0].idiom, Idiom::DecoratorCall);
        assert_eq!(
            analysis.diagnostics[0].issue,
            Issue::AmbiguousMatch {
                idioms: vec![Idiom::DecoratorCall, Idiom::CallRegistration]
            }
        );
        let quiet = extract_unit(
            &SourceUnit::new("app/main.py", "app.post('/hooks')(receive_hook)\n"),
            false,
        );
        assert!(quiet.diagnostics.is_empty());
    }

    #[test]
    fn test_script_export_alias_and_local_links() {
        let text = "const express = require('express');\nconst router = express.Router();\nconst auth = require('./auth');\n\nrouter.get('/me', auth.required, showProfile);\nrouter.use('/auth', auth);\n\nmodule.exports = router;\n";
        let analysis = extract("src/routes/users.js", text);
        let router = node(&analysis, "router");
        assert_eq!(router.aliases, vec!["default"]);
        assert_eq!(router.links[0].target, NodeRef::external("src.routes.auth", "default"));
        assert_eq!(router.links[0].binding, Binding::Include);
        assert_eq!(analysis.fragments[0].symbol, "showProfile");
    }

    #[test]
    fn test_url_table_targets() {
        let text = "from django.urls import include, path\nfrom . import views\n\nurlpatterns = [\n    path('', views.index),\n    path('api/', include('shop.api.urls')),\n]\nurlpatterns += [path('about/', views.AboutView.as_view())]\n";
        let analysis = extract("shop/urls.py", text);
        assert_eq!(analysis.nodes.len(), 1);
        let table = node(&analysis, "urlpatterns");
        let targets: Vec<NodeRef> = table.links.iter().map(|l| l.target.clone()).collect();
        assert_eq!(
            targets,
            vec![
                NodeRef::external("shop.views", "index"),
                NodeRef::external("shop.api.urls", "urlpatterns"),
                NodeRef::external("shop.views", "AboutView"),
            ]
        );
    }

    #[test]
    fn test_unterminated_literal_keeps_earlier_statements() {
        let text = "@app.get('/ok')\ndef ok():\n    pass\n\nbroken = \"\"\"never closed\n@app.get('/lost')\ndef lost():\n    pass\n";
        let analysis = extract("app/main.py", text);
        assert_eq!(analysis.fragments.len(), 1);
        assert_eq!(analysis.fragments[0].path, "/ok");
        assert_eq!(analysis.diagnostics[0].issue, Issue::UnterminatedLiteral);
        assert_eq!(analysis.diagnostics[0].location.line, 5);
    }
}
