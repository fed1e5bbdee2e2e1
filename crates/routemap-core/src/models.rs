//! Shared typed models used across extraction, composition, and inventory layers.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::extract::imports::to_module_name;

// ---------------------------------------------------------------------------
// 1. Language
// ---------------------------------------------------------------------------

/// Source language family, which decides the lexical rules and the idioms
/// offered to each statement.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// `#` comments, triple-quoted strings, indentation scoping.
    Python,
    /// JavaScript and TypeScript: `//` and `/* */` comments, template literals.
    Script,
}

const LANGUAGE_BY_EXTENSION: &[(&str, Language)] = &[
    (".py", Language::Python),
    (".js", Language::Script),
    (".jsx", Language::Script),
    (".mjs", Language::Script),
    (".cjs", Language::Script),
    (".ts", Language::Script),
    (".tsx", Language::Script),
];

impl Language {
    /// Detect the language from a path's extension.
    pub fn from_path(path: &str) -> Option<Language> {
        let ext = Path::new(path)
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))?;
        LANGUAGE_BY_EXTENSION
            .iter()
            .find(|(e, _)| *e == ext.as_str())
            .map(|(_, lang)| *lang)
    }
}

// ---------------------------------------------------------------------------
// 2. SourceUnit
// ---------------------------------------------------------------------------

/// One source text plus its stable identity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceUnit {
    pub identity: String,
    pub language: Language,
    pub text: String,
}

impl SourceUnit {
    /// Build a unit, inferring the language from the identity's extension.
    /// Unknown extensions are treated as Python.
    pub fn new(identity: impl Into<String>, text: impl Into<String>) -> Self {
        let identity = identity.into();
        let language = Language::from_path(&identity).unwrap_or(Language::Python);
        Self {
            identity,
            language,
            text: text.into(),
        }
    }

    pub fn with_language(
        identity: impl Into<String>,
        language: Language,
        text: impl Into<String>,
    ) -> Self {
        Self {
            identity: identity.into(),
            language,
            text: text.into(),
        }
    }

    /// Dotted module name derived from the identity (`api/urls.py` -> `api.urls`).
    pub fn module_name(&self) -> String {
        to_module_name(&self.identity)
    }
}

// ---------------------------------------------------------------------------
// 3. HttpMethod
// ---------------------------------------------------------------------------

/// HTTP method enumeration. Declaration order is the inventory's method order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
    Trace,
    Any,
}

impl HttpMethod {
    /// Parse a method name case-insensitively. `all` (Express) maps to ANY.
    pub fn parse(raw: &str) -> Option<HttpMethod> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "get" => Some(HttpMethod::Get),
            "post" => Some(HttpMethod::Post),
            "put" => Some(HttpMethod::Put),
            "patch" => Some(HttpMethod::Patch),
            "delete" => Some(HttpMethod::Delete),
            "head" => Some(HttpMethod::Head),
            "options" => Some(HttpMethod::Options),
            "trace" => Some(HttpMethod::Trace),
            "any" | "all" => Some(HttpMethod::Any),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Head => "HEAD",
            HttpMethod::Options => "OPTIONS",
            HttpMethod::Trace => "TRACE",
            HttpMethod::Any => "ANY",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// 4. SourceLocation
// ---------------------------------------------------------------------------

/// A position in the corpus: unit identity plus 1-based line number.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceLocation {
    pub unit: String,
    pub line: usize,
}

impl SourceLocation {
    pub fn new(unit: impl Into<String>, line: usize) -> Self {
        Self {
            unit: unit.into(),
            line,
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.unit, self.line)
    }
}

// ---------------------------------------------------------------------------
// 5. Metadata
// ---------------------------------------------------------------------------

/// Declared metadata attached to a fragment, a node, or an inclusion edge.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub deprecated: bool,
}

impl Metadata {
    pub fn is_empty(&self) -> bool {
        *self == Metadata::default()
    }

    /// Add a tag unless it is already present.
    pub fn add_tag(&mut self, tag: &str) {
        if !self.tags.iter().any(|t| t == tag) {
            self.tags.push(tag.to_string());
        }
    }

    /// Merge `inner` (the more specific declaration) beneath `self`.
    ///
    /// Tags are a set union with outer tags first, dependencies accumulate,
    /// and the scalar fields of `inner` override when present.
    pub fn merged_with(&self, inner: &Metadata) -> Metadata {
        let mut out = self.clone();
        for tag in &inner.tags {
            out.add_tag(tag);
        }
        out.dependencies.extend(inner.dependencies.iter().cloned());
        if inner.status_code.is_some() {
            out.status_code = inner.status_code;
        }
        if inner.summary.is_some() {
            out.summary.clone_from(&inner.summary);
        }
        if inner.name.is_some() {
            out.name.clone_from(&inner.name);
        }
        out.deprecated |= inner.deprecated;
        out
    }
}

// ---------------------------------------------------------------------------
// 6. Idioms
// ---------------------------------------------------------------------------

/// A recognized route-declaration style. Variant order is the match priority.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Idiom {
    DecoratorCall,
    UrlPattern,
    ResourceRegistration,
    ClassMethods,
    CallRegistration,
}

impl fmt::Display for Idiom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Idiom::DecoratorCall => "decorator-call",
            Idiom::UrlPattern => "url-pattern",
            Idiom::ResourceRegistration => "resource-registration",
            Idiom::ClassMethods => "class-methods",
            Idiom::CallRegistration => "call-registration",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// 7. Composition graph
// ---------------------------------------------------------------------------

/// Reference to a composition node, rewritten through the declaring unit's
/// imports at extraction time.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeRef {
    /// Set when the target is declared in the referencing unit itself.
    pub unit: Option<String>,
    /// Dotted module expected to declare the target.
    pub module: String,
    /// Symbol name, export alias, or factory function name.
    pub name: String,
    /// The reference is a call to a function that returns the node.
    pub factory: bool,
}

impl NodeRef {
    pub fn local(unit: &str, module: &str, name: &str) -> Self {
        Self {
            unit: Some(unit.to_string()),
            module: module.to_string(),
            name: name.to_string(),
            factory: false,
        }
    }

    pub fn external(module: &str, name: &str) -> Self {
        Self {
            unit: None,
            module: module.to_string(),
            name: name.to_string(),
            factory: false,
        }
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.module.is_empty() {
            write!(f, "{}.", self.module)?;
        }
        f.write_str(&self.name)?;
        if self.factory {
            f.write_str("()")?;
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// Application or sub-router object (FastAPI, Flask, Blueprint, Express).
    Router,
    /// A URL-pattern list.
    UrlTable,
    /// A ViewSet router that registers resource classes.
    ResourceRouter,
    /// A class whose members become handlers once the class is bound.
    ViewClass,
    /// A function view carrying explicit method hints.
    ViewFunction,
}

impl NodeKind {
    /// Kinds that may start a traversal when nothing includes them.
    pub fn is_container(&self) -> bool {
        matches!(
            self,
            NodeKind::Router | NodeKind::UrlTable | NodeKind::ResourceRouter
        )
    }
}

/// How a child is attached to its parent.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Binding {
    /// The child's own fragments and links are nested under the edge prefix.
    Include,
    /// A function handler bound to a path.
    Handler,
    /// A class view bound to a path, optionally with an explicit method map.
    View { method_map: Vec<(HttpMethod, String)> },
    /// A resource class registered under a collection prefix.
    Resource,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildLink {
    pub target: NodeRef,
    /// The reference as written at the registration site.
    pub symbol: String,
    pub binding: Binding,
    pub prefix: String,
    pub metadata: Metadata,
    pub location: SourceLocation,
}

/// A router or registration context.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositionNode {
    pub unit: String,
    pub module: String,
    pub name: String,
    pub kind: NodeKind,
    pub prefix: String,
    pub metadata: Metadata,
    /// Base classes of a `ViewClass`.
    pub bases: Vec<NodeRef>,
    /// Extra names the node is exported under (`default`).
    pub aliases: Vec<String>,
    /// Function whose call returns this node.
    pub factory: Option<String>,
    /// Set on a stand-in for an imported node: its links belong to that node.
    pub extends: Option<NodeRef>,
    pub links: Vec<ChildLink>,
    pub location: SourceLocation,
}

impl CompositionNode {
    pub fn new(unit: &str, module: &str, name: &str, kind: NodeKind, line: usize) -> Self {
        Self {
            unit: unit.to_string(),
            module: module.to_string(),
            name: name.to_string(),
            kind,
            prefix: String::new(),
            metadata: Metadata::default(),
            bases: Vec::new(),
            aliases: Vec::new(),
            factory: None,
            extends: None,
            links: Vec::new(),
            location: SourceLocation::new(unit, line),
        }
    }

    pub fn answers_to(&self, name: &str) -> bool {
        self.name == name || self.aliases.iter().any(|a| a == name)
    }
}

/// A candidate endpoint, still relative to its composition context.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointFragment {
    pub method: HttpMethod,
    pub path: String,
    pub symbol: String,
    /// Member or action name the fragment was derived from.
    pub action: Option<String>,
    pub idiom: Idiom,
    pub location: SourceLocation,
    pub metadata: Metadata,
    pub key: Option<NodeRef>,
}

// ---------------------------------------------------------------------------
// 8. Endpoint
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathParam {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub constraint: Option<String>,
}

/// A fully resolved endpoint record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub method: HttpMethod,
    /// Absolute path, or a relative path when `unresolved` is set.
    pub path: String,
    pub symbol: String,
    pub location: SourceLocation,
    pub metadata: Metadata,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<PathParam>,
    /// The reference that could not be matched while composing this endpoint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unresolved: Option<String>,
}

impl Endpoint {
    pub fn sort_key(&self) -> (&str, HttpMethod, &SourceLocation) {
        (&self.path, self.method, &self.location)
    }
}

// ---------------------------------------------------------------------------
// 9. Diagnostics
// ---------------------------------------------------------------------------

/// Coarse diagnostic family.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Lexical,
    Statement,
    Composition,
    Duplicate,
    Ambiguity,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Issue {
    #[error("unterminated string literal")]
    UnterminatedLiteral,

    #[error("unterminated block comment")]
    UnterminatedComment,

    #[error("statement never closes before the end of the unit")]
    UnterminatedConstruct,

    #[error("unresolved reference `{reference}`")]
    UnresolvedReference { reference: String },

    #[error("cyclic inclusion through `{reference}`")]
    CyclicInclusion { reference: String },

    #[error("{method} {path} is also declared at {other}")]
    DuplicateRegistration {
        method: HttpMethod,
        path: String,
        other: SourceLocation,
    },

    #[error("{method} {path} is reached through multiple inclusion paths")]
    RepeatedInclusion { method: HttpMethod, path: String },

    #[error("statement matched by several idioms: {idioms:?}")]
    AmbiguousMatch { idioms: Vec<Idiom> },
}

impl Issue {
    pub fn category(&self) -> Category {
        match self {
            Issue::UnterminatedLiteral | Issue::UnterminatedComment => Category::Lexical,
            Issue::UnterminatedConstruct => Category::Statement,
            Issue::UnresolvedReference { .. } | Issue::CyclicInclusion { .. } => {
                Category::Composition
            }
            Issue::DuplicateRegistration { .. } | Issue::RepeatedInclusion { .. } => {
                Category::Duplicate
            }
            Issue::AmbiguousMatch { .. } => Category::Ambiguity,
        }
    }
}

/// A non-fatal finding tied to a source location.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub location: SourceLocation,
    pub issue: Issue,
}

impl Diagnostic {
    pub fn new(location: SourceLocation, issue: Issue) -> Self {
        Self { location, issue }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.location, self.issue)
    }
}
