//! Import bindings: which module a local name in a unit refers to.
//!
//! References are rewritten into dotted module paths at extraction time so
//! the composition resolver can match them against other units without
//! re-reading any source.

use std::collections::HashMap;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use crate::models::Language;
use crate::scanner::{Expr, LogicalStatement};

static PY_FROM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^from\s+(\.*)([\w.]*)\s+import\s+(.+)$").expect("valid from-import regex")
});

static PY_IMPORT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^import\s+(.+)$").expect("valid import regex"));

static JS_REQUIRE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:export\s+)?(?:const|let|var)\s+(\{[^}]*\}|[A-Za-z_$][\w$]*)\s*=\s*require\s*\(([^)]*)\)",
    )
    .expect("valid require regex")
});

static JS_IMPORT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^import\s+(.+?)\s+from\s+\S+$").expect("valid es import regex")
});

static AS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([\w.*$]+)(?:\s+as\s+([\w$]+))?$").expect("valid alias regex")
});

const SCRIPT_EXTENSIONS: &[&str] = &[".js", ".jsx", ".mjs", ".cjs", ".ts", ".tsx"];

/// Dotted module name for a unit identity.
///
/// `app/routers/users.py` becomes `app.routers.users`; package markers
/// (`__init__`, `index`) name their directory.
pub fn to_module_name(path: &str) -> String {
    let p = Path::new(path);
    let without_ext = p.with_extension("");
    let mut parts: Vec<&str> = without_ext
        .components()
        .filter_map(|c| match c {
            std::path::Component::Normal(os) => os.to_str(),
            _ => None,
        })
        .filter(|s| !s.is_empty() && *s != ".")
        .collect();
    if matches!(parts.last(), Some(&"__init__") | Some(&"index")) {
        parts.pop();
    }
    parts.join(".")
}

fn is_package_marker(path: &str) -> bool {
    matches!(
        Path::new(path).file_stem().and_then(|s| s.to_str()),
        Some("__init__") | Some("index")
    )
}

fn normalize_posix_path(path: &str) -> String {
    let mut stack: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                stack.pop();
            }
            _ => stack.push(part),
        }
    }
    stack.join("/")
}

/// Where a local name points.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImportBinding {
    pub module: String,
    /// Imported member; `None` when the name is the module itself.
    pub name: Option<String>,
    /// Bound from a package outside the corpus (`express`, `cors`).
    pub external: bool,
}

#[derive(Clone, Debug)]
pub struct ImportTable {
    identity: String,
    package: Vec<String>,
    language: Language,
    bindings: HashMap<String, ImportBinding>,
}

impl ImportTable {
    pub fn new(identity: &str, language: Language) -> Self {
        let module = to_module_name(identity);
        let mut package: Vec<String> = module
            .split('.')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        if !is_package_marker(identity) {
            package.pop();
        }
        Self {
            identity: identity.to_string(),
            package,
            language,
            bindings: HashMap::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ImportBinding> {
        self.bindings.get(name)
    }

    /// True when `name` was imported from a file in the corpus.
    pub fn is_local_import(&self, name: &str) -> bool {
        self.bindings.get(name).is_some_and(|b| !b.external)
    }

    /// Record the bindings of an import statement. Returns false for other statements.
    pub fn scan(&mut self, stmt: &LogicalStatement) -> bool {
        match self.language {
            Language::Python => self.scan_python(stmt),
            Language::Script => self.scan_script(stmt),
        }
    }

    /// Resolve a dotted local expression to `(module, member)`.
    ///
    /// `views.user_detail` with `from . import views` in `api/urls.py`
    /// resolves to `("api.views", Some("user_detail"))`.
    pub fn resolve(&self, dotted: &str) -> Option<(String, Option<String>)> {
        let (head, rest) = match dotted.split_once('.') {
            Some((h, r)) => (h, Some(r)),
            None => (dotted, None),
        };
        let binding = self.bindings.get(head)?;
        let base = match &binding.name {
            Some(n) if rest.is_some() => join_module(&binding.module, n),
            _ => binding.module.clone(),
        };
        match rest {
            None => Some((base, binding.name.clone())),
            Some(rest) => match rest.rsplit_once('.') {
                Some((mid, last)) => Some((join_module(&base, mid), Some(last.to_string()))),
                None => Some((base, Some(rest.to_string()))),
            },
        }
    }

    /// Module named by a Script import specifier; `None` for packages.
    pub fn resolve_specifier(&self, spec: &str) -> Option<String> {
        if !spec.starts_with('.') {
            return None;
        }
        let dir = Path::new(&self.identity)
            .parent()
            .map(|p| p.to_string_lossy().replace('\\', "/"))
            .unwrap_or_default();
        let mut joined = normalize_posix_path(&format!("{dir}/{spec}"));
        if let Some(ext) = SCRIPT_EXTENSIONS.iter().find(|e| joined.ends_with(*e)) {
            joined.truncate(joined.len() - ext.len());
        }
        Some(to_module_name(&joined))
    }

    fn bind(&mut self, local: &str, module: String, name: Option<String>, external: bool) {
        self.bindings.insert(
            local.to_string(),
            ImportBinding {
                module,
                name,
                external,
            },
        );
    }

    // -----------------------------------------------------------------------
    // Python
    // -----------------------------------------------------------------------

    fn relative_module(&self, dots: usize, suffix: &str) -> String {
        let keep = self.package.len().saturating_sub(dots.saturating_sub(1));
        let mut parts: Vec<&str> = self.package[..keep].iter().map(String::as_str).collect();
        parts.extend(suffix.split('.').filter(|s| !s.is_empty()));
        parts.join(".")
    }

    fn scan_python(&mut self, stmt: &LogicalStatement) -> bool {
        let masked = stmt.masked.trim();
        if let Some(caps) = PY_FROM_RE.captures(masked) {
            let dots = caps[1].len();
            let module = if dots > 0 {
                self.relative_module(dots, &caps[2])
            } else {
                caps[2].to_string()
            };
            let names = caps[3].trim().trim_start_matches('(').trim_end_matches(')');
            for item in names.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                if let Some(alias) = AS_RE.captures(item) {
                    let name = alias[1].to_string();
                    if name == "*" {
                        continue;
                    }
                    let local = alias.get(2).map_or(name.as_str(), |m| m.as_str()).to_string();
                    self.bind(&local, module.clone(), Some(name), false);
                }
            }
            return true;
        }
        if let Some(caps) = PY_IMPORT_RE.captures(masked) {
            for item in caps[1].split(',').map(str::trim) {
                if let Some(alias) = AS_RE.captures(item) {
                    let module = alias[1].to_string();
                    match alias.get(2) {
                        Some(local) => self.bind(local.as_str(), module, None, false),
                        None => {
                            let head = module.split('.').next().unwrap_or_default().to_string();
                            self.bind(&head, head.clone(), None, false);
                        }
                    }
                }
            }
            return true;
        }
        false
    }

    // -----------------------------------------------------------------------
    // Script
    // -----------------------------------------------------------------------

    fn specifier_binding(&self, spec: &str) -> (String, bool) {
        match self.resolve_specifier(spec) {
            Some(module) => (module, false),
            None => (spec.to_string(), true),
        }
    }

    fn scan_script(&mut self, stmt: &LogicalStatement) -> bool {
        let expr = Expr::of_statement(stmt);
        if let Some(caps) = JS_REQUIRE_RE.captures(&stmt.masked) {
            let Some(spec_match) = caps.get(2) else {
                return false;
            };
            let Some(spec) = expr.slice(spec_match.range()).string_value() else {
                return false;
            };
            let (module, external) = self.specifier_binding(&spec);
            let target = &caps[1];
            if target.starts_with('{') {
                self.bind_named(target, &module, external, ':');
            } else {
                self.bind(target, module, Some("default".to_string()), external);
            }
            return true;
        }
        if let Some(caps) = JS_IMPORT_RE.captures(&stmt.masked) {
            let Some(spec) = stmt
                .literals
                .last()
                .and_then(|r| expr.slice(r.clone()).string_value())
            else {
                return false;
            };
            let (module, external) = self.specifier_binding(&spec);
            let clause = caps[1].trim();
            let (default, named) = match clause.find('{') {
                Some(i) => (clause[..i].trim().trim_end_matches(','), &clause[i..]),
                None => (clause, ""),
            };
            if let Some(ns) = default.strip_prefix("* as ") {
                self.bind(ns.trim(), module.clone(), None, external);
            } else if !default.is_empty() {
                self.bind(default, module.clone(), Some("default".into()), external);
            }
            if !named.is_empty() {
                self.bind_named(named, &module, external, ' ');
            }
            return true;
        }
        false
    }

    /// Bind `{ a, b as c }` (ES) or `{ a, b: c }` (destructured require).
    fn bind_named(&mut self, clause: &str, module: &str, external: bool, sep: char) {
        let inner = clause.trim().trim_start_matches('{').trim_end_matches('}');
        for item in inner.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let (name, local) = if sep == ':' {
                match item.split_once(':') {
                    Some((n, l)) => (n.trim(), l.trim()),
                    None => (item, item),
                }
            } else {
                match item.split_once(" as ") {
                    Some((n, l)) => (n.trim(), l.trim()),
                    None => (item, item),
                }
            };
            self.bind(local, module.to_string(), Some(name.to_string()), external);
        }
    }
}

fn join_module(base: &str, tail: &str) -> String {
    if base.is_empty() {
        tail.to_string()
    } else {
        format!("{base}.{tail}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan_all(identity: &str, language: Language, lines: &[&str]) -> ImportTable {
        let mut table = ImportTable::new(identity, language);
        for line in lines {
            let stmt = LogicalStatement::from_line(1, line, language).expect("statement");
            assert!(table.scan(&stmt), "not recognized as import: {line}");
        }
        table
    }

    #[test]
    fn test_to_module_name() {
        assert_eq!(to_module_name("app/routers/users.py"), "app.routers.users");
        assert_eq!(to_module_name("./api/__init__.py"), "api");
        assert_eq!(to_module_name("src/routes/index.ts"), "src.routes");
    }

    #[test]
    fn test_python_relative_and_aliased_imports() {
        let table = scan_all(
            "shop/api/urls.py",
            Language::Python,
            &[
                "from . import views",
                "from ..core.routers import router as core_router",
                "import shop.legacy.urls as legacy",
            ],
        );
        assert_eq!(
            table.resolve("views.user_detail"),
            Some(("shop.api.views".into(), Some("user_detail".into())))
        );
        assert_eq!(
            table.resolve("core_router"),
            Some(("shop.core.routers".into(), Some("router".into())))
        );
        assert_eq!(table.resolve("legacy"), Some(("shop.legacy.urls".into(), None)));
        assert_eq!(table.resolve("unknown"), None);
    }

    #[test]
    fn test_python_parenthesized_import() {
        let mut table = ImportTable::new("app/main.py", Language::Python);
        let text = "from app.routers import (\n    users,\n    items as item_routes,\n)";
        let unit = crate::scanner::classify(text, Language::Python);
        let (stmts, _) = crate::scanner::reconstruct(&unit, "app/main.py", Language::Python);
        assert!(table.scan(&stmts[0]));
        assert_eq!(
            table.resolve("item_routes.router"),
            Some(("app.routers.items".into(), Some("router".into())))
        );
    }

    #[test]
    fn test_non_import_statement_declined() {
        let mut table = ImportTable::new("app/main.py", Language::Python);
        let stmt = LogicalStatement::from_line(1, "app = FastAPI()", Language::Python)
            .expect("statement");
        assert!(!table.scan(&stmt));
    }

    #[test]
    fn test_script_require_and_imports() {
        let table = scan_all(
            "server/app.js",
            Language::Script,
            &[
                "const express = require('express');",
                "const userRoutes = require('./routes/users');",
                "const { adminRouter, legacy: oldRoutes } = require('../admin/index.js');",
                "import itemRoutes, { helper as h } from './routes/items';",
            ],
        );
        assert!(!table.is_local_import("express"));
        assert!(table.is_local_import("userRoutes"));
        assert_eq!(
            table.resolve("userRoutes"),
            Some(("server.routes.users".into(), Some("default".into())))
        );
        assert_eq!(
            table.resolve("oldRoutes"),
            Some(("admin".into(), Some("legacy".into())))
        );
        assert_eq!(
            table.resolve("itemRoutes"),
            Some(("server.routes.items".into(), Some("default".into())))
        );
        assert_eq!(table.get("h").and_then(|b| b.name.clone()), Some("helper".into()));
    }
}
