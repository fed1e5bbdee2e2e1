//! Method-call registration: Express-style `app.get(path, ...handlers)` and
//! friends, plus the Python call APIs (`add_api_route`, `add_url_rule`,
//! aiohttp's `router.add_get`).

use std::sync::LazyLock;

use regex::Regex;

use crate::idioms::{
    assignment_call, last_segment, parse_methods, path_value, Emission, MatchContext, Target,
    HTTP_VERBS,
};
use crate::models::{Binding, HttpMethod, Language, Metadata, NodeKind};
use crate::scanner::{Args, Expr};

/// `recv.member(` or `recv.member<T>(`; the argument list is located by [`Expr::call_open`].
static MEMBER_CALL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z_$][\w$]*(?:\.[A-Za-z_$][\w$]*)*)\.([A-Za-z_$][\w$]*)\s*[(<]")
        .expect("valid member call regex")
});

static CHAIN_LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\.\s*([A-Za-z_$][\w$]*)\s*[(<]").expect("valid chain regex")
});

static BARE_CALL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z_$][\w$]*)\s*[(<]").expect("valid bare call regex")
});

/// `const { get, delete: del } = app`
static DESTRUCTURE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:const|let|var)\s*\{([^{}]*)\}\s*=\s*([A-Za-z_$][\w$]*(?:\.[A-Za-z_$][\w$]*)*)\s*;?$",
    )
    .expect("valid destructuring regex")
});

static EXPORT_DEFAULT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:module\.exports|export\s+default)\s*=?\s*([A-Za-z_$][\w$]*)$")
        .expect("valid default export regex")
});

static EXPORT_NAMED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:module\.)?exports\.([A-Za-z_$][\w$]*)\s*=\s*([A-Za-z_$][\w$]*)$")
        .expect("valid named export regex")
});

static EXPORT_OBJECT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^module\.exports\s*=\s*\{").expect("valid export object regex"));

/// Receivers accepted without a visible declaration.
const CONVENTIONAL_RECEIVERS: &[&str] = &["app", "router", "api", "server", "routes"];

const AIOHTTP_VERBS: &[(&str, HttpMethod)] = &[
    ("add_get", HttpMethod::Get),
    ("add_post", HttpMethod::Post),
    ("add_put", HttpMethod::Put),
    ("add_patch", HttpMethod::Patch),
    ("add_delete", HttpMethod::Delete),
    ("add_head", HttpMethod::Head),
    ("add_options", HttpMethod::Options),
];

pub fn try_match(ctx: &MatchContext<'_>) -> Option<Vec<Emission>> {
    let expr = ctx.expr();
    if let Some(node) = constructor(ctx, &expr) {
        return Some(node);
    }
    if ctx.language == Language::Script {
        if let Some(exports) = export(&expr) {
            return Some(exports);
        }
        if let Some(aliases) = destructured_verbs(ctx, &expr) {
            return Some(aliases);
        }
    }

    let Some(caps) = MEMBER_CALL_RE.captures(expr.masked) else {
        return alias_call(ctx, &expr);
    };
    let receiver = &expr.text[caps.get(1)?.range()];
    let member_at = caps.get(2)?;
    let member = &expr.text[member_at.range()];
    if !accepts_receiver(ctx, receiver) {
        return None;
    }
    let args = expr.args_at(expr.call_open(member_at.end())?)?;
    let call = MemberCall {
        ctx,
        receiver: owner(ctx, receiver),
        tail: expr.tail(args.end),
        args,
    };
    match (ctx.language, member) {
        (Language::Script, "route") => call.chain(),
        (Language::Script, "use") => call.mount(),
        (Language::Python, "add_api_route") => call.add_api_route(),
        (Language::Python, "add_url_rule") => call.add_url_rule(),
        (Language::Python, "add_route") => call.aiohttp_route(),
        (Language::Python, _) if AIOHTTP_VERBS.iter().any(|(m, _)| *m == member) => {
            let method = AIOHTTP_VERBS.iter().find(|(m, _)| *m == member)?.1;
            call.handler_call(vec![method], 0)
        }
        (_, verb) => call.verb(verb_method(verb)?, verb),
    }
}

/// `get` → GET; `all` answers every method.
fn verb_method(verb: &str) -> Option<HttpMethod> {
    match verb {
        "all" => Some(HttpMethod::Any),
        v if HTTP_VERBS.contains(&v) => HttpMethod::parse(v),
        _ => None,
    }
}

/// Verb functions pulled off a router by destructuring become local aliases.
fn destructured_verbs(ctx: &MatchContext<'_>, expr: &Expr<'_>) -> Option<Vec<Emission>> {
    let caps = DESTRUCTURE_RE.captures(expr.masked)?;
    let fields = &expr.text[caps.get(1)?.range()];
    let receiver = &expr.text[caps.get(2)?.range()];
    if !accepts_receiver(ctx, receiver) {
        return None;
    }
    let aliases: Vec<Emission> = fields
        .split(',')
        .filter_map(|field| {
            let (verb, alias) = match field.split_once(':') {
                Some((verb, alias)) => (verb.trim(), alias.trim()),
                None => (field.trim(), field.trim()),
            };
            verb_method(verb)?;
            is_ident(alias).then(|| Emission::VerbAlias {
                alias: alias.to_string(),
                receiver: owner(ctx, receiver).to_string(),
                verb: verb.to_string(),
            })
        })
        .collect();
    (!aliases.is_empty()).then_some(aliases)
}

/// `del(path, ...handlers)` where `del` was destructured from a router.
fn alias_call(ctx: &MatchContext<'_>, expr: &Expr<'_>) -> Option<Vec<Emission>> {
    let caps = BARE_CALL_RE.captures(expr.masked)?;
    let name = caps.get(1)?;
    let (receiver, verb) = ctx.verb_aliases.get(&expr.text[name.range()])?;
    let args = expr.args_at(expr.call_open(name.end())?)?;
    let call = MemberCall {
        ctx,
        receiver,
        tail: expr.tail(args.end),
        args,
    };
    call.verb(verb_method(verb)?, verb)
}

fn accepts_receiver(ctx: &MatchContext<'_>, receiver: &str) -> bool {
    ctx.routers.contains(receiver)
        || CONVENTIONAL_RECEIVERS.contains(&receiver)
        || last_segment(receiver) == "router"
}

/// `app.router` registers on `app` when `app` is a declared application.
fn owner<'a>(ctx: &MatchContext<'_>, receiver: &'a str) -> &'a str {
    match receiver.strip_suffix(".router") {
        Some(base) if ctx.routers.contains(base) => base,
        _ => receiver,
    }
}

fn constructor(ctx: &MatchContext<'_>, expr: &Expr<'_>) -> Option<Vec<Emission>> {
    let (var, callee, _) = assignment_call(expr)?;
    let is_router = match ctx.language {
        Language::Script => callee == "express" || last_segment(callee) == "Router",
        Language::Python => callee == "web.Application" || callee == "Application",
    };
    is_router.then(|| {
        vec![Emission::Node {
            name: var.to_string(),
            kind: NodeKind::Router,
            prefix: String::new(),
            metadata: Metadata::default(),
            bases: Vec::new(),
            line: ctx.stmt.start_line,
        }]
    })
}

fn export(expr: &Expr<'_>) -> Option<Vec<Emission>> {
    if let Some(caps) = EXPORT_DEFAULT_RE.captures(expr.masked) {
        return Some(vec![Emission::Export {
            name: caps[1].to_string(),
            alias: "default".to_string(),
        }]);
    }
    if let Some(caps) = EXPORT_NAMED_RE.captures(expr.masked) {
        return Some(vec![Emission::Export {
            name: caps[2].to_string(),
            alias: caps[1].to_string(),
        }]);
    }
    // `module.exports = { router, admin: adminRouter }`
    let open = EXPORT_OBJECT_RE.find(expr.masked)?.end() - 1;
    let object = expr.tail(open);
    let exports: Vec<Emission> = object
        .items()?
        .into_iter()
        .filter_map(|item| {
            let (alias, name) = match item.masked.split_once(':') {
                Some((alias, name)) => (alias.trim(), name.trim()),
                None => (item.text, item.text),
            };
            (is_ident(alias) && is_ident(name)).then(|| Emission::Export {
                name: name.to_string(),
                alias: alias.to_string(),
            })
        })
        .collect();
    (!exports.is_empty()).then_some(exports)
}

fn is_ident(s: &str) -> bool {
    let mut chars = s.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || c == '$')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

struct MemberCall<'c, 'a> {
    ctx: &'c MatchContext<'a>,
    receiver: &'c str,
    args: Args<'c>,
    /// Whatever follows the argument list.
    tail: Expr<'c>,
}

impl MemberCall<'_, '_> {
    fn line(&self) -> usize {
        self.ctx.stmt.start_line
    }

    fn fragments(
        &self,
        methods: Vec<HttpMethod>,
        path: String,
        symbol: String,
        line: usize,
        metadata: Metadata,
    ) -> Option<Vec<Emission>> {
        let action = Some(last_segment(&symbol).to_string());
        let out: Vec<Emission> = methods
            .into_iter()
            .map(|method| Emission::Fragment {
                receiver: Some(self.receiver.to_string()),
                method,
                path: path.clone(),
                symbol: symbol.clone(),
                action: action.clone(),
                line,
                metadata: metadata.clone(),
            })
            .collect();
        (!out.is_empty()).then_some(out)
    }

    /// Symbol of the last handler in `handlers`, or `recv.verb` when it is inline.
    fn symbol<'e>(&self, handlers: impl Iterator<Item = Expr<'e>>, verb: &str) -> String {
        handlers
            .last()
            .and_then(|h| h.ident_path().map(str::to_string))
            .unwrap_or_else(|| format!("{}.{verb}", self.receiver))
    }

    /// `app.get(path, ...handlers)` or `app.post(path)(handler)`.
    fn verb(&self, method: HttpMethod, verb: &str) -> Option<Vec<Emission>> {
        let path = self.args.positional(0)?;
        let applied = if self.tail.is_empty() {
            None
        } else {
            let inner = self.tail.args_at(0)?;
            if !self.tail.tail(inner.end).is_empty() || inner.len() != 1 {
                return None;
            }
            Some(inner)
        };
        let handler_count = self.args.positionals().count() - 1;
        let needs_handler = self.ctx.language == Language::Python || method == HttpMethod::Get;
        if needs_handler && handler_count == 0 && applied.is_none() {
            return None;
        }
        let symbol = match &applied {
            Some(inner) => self.symbol(inner.positionals(), verb),
            None => self.symbol(self.args.positionals().skip(1), verb),
        };
        self.fragments(
            vec![method],
            path_value(Some(path)),
            symbol,
            self.line(),
            Metadata::default(),
        )
    }

    /// `router.route(path).get(h).post(h)...`
    fn chain(&self) -> Option<Vec<Emission>> {
        let path = path_value(Some(self.args.positional(0)?));
        let mut rest = self.tail;
        let mut out = Vec::new();
        while !rest.is_empty() {
            let caps = CHAIN_LINK_RE.captures(rest.masked)?;
            let verb_at = caps.get(1)?;
            let verb = &rest.text[verb_at.range()];
            let args = rest.args_at(rest.call_open(verb_at.end())?)?;
            let method = verb_method(verb)?;
            let line = self.ctx.stmt.line_at(rest.offset);
            let symbol = self.symbol(args.positionals(), verb);
            out.extend(self.fragments(vec![method], path.clone(), symbol, line, Metadata::default())?);
            rest = rest.tail(args.end);
        }
        (!out.is_empty()).then_some(out)
    }

    /// `app.use([path,] ...middleware, child)`; only router-like children link.
    fn mount(&self) -> Option<Vec<Emission>> {
        if !self.tail.is_empty() {
            return None;
        }
        let first = self.args.positional(0)?;
        let (prefix, rest) = match first.string_value() {
            Some(p) => (p, 1),
            None => (String::new(), 0),
        };
        let child = self.args.positionals().skip(rest).last()?;
        let target = self.child(child)?;
        Some(vec![Emission::Link {
            parent: self.receiver.to_string(),
            target,
            binding: Binding::Include,
            prefix,
            metadata: Metadata::default(),
            line: self.line(),
        }])
    }

    fn child(&self, child: Expr<'_>) -> Option<Target> {
        if let Some(name) = child.ident_path() {
            let head = name.split('.').next().unwrap_or(name);
            let known = self.ctx.routers.contains(name) || self.ctx.imports.is_local_import(head);
            return known.then(|| Target::Name(name.to_string()));
        }
        let (callee, args) = child.call()?;
        if callee == "require" {
            let spec = args.positional(0)?.string_value()?;
            let module = self.ctx.imports.resolve_specifier(&spec)?;
            return Some(Target::Module {
                module,
                name: "default".to_string(),
            });
        }
        let head = callee.split('.').next().unwrap_or(callee);
        (args.is_empty() && self.ctx.imports.is_local_import(head))
            .then(|| Target::Factory(callee.to_string()))
    }

    fn handler_call(&self, methods: Vec<HttpMethod>, path_at: usize) -> Option<Vec<Emission>> {
        if !self.tail.is_empty() {
            return None;
        }
        let path = path_value(Some(self.args.positional(path_at)?));
        let handler = self
            .args
            .positional(path_at + 1)
            .or_else(|| self.args.keyword("handler"))?;
        let symbol = self.symbol(std::iter::once(handler), "handler");
        self.fragments(methods, path, symbol, self.line(), Metadata::default())
    }

    /// `app.add_api_route(path, endpoint, methods=[...], ...)`
    fn add_api_route(&self) -> Option<Vec<Emission>> {
        if !self.tail.is_empty() {
            return None;
        }
        let path = path_value(Some(
            self.args.positional(0).or_else(|| self.args.keyword("path"))?,
        ));
        let endpoint = self
            .args
            .positional(1)
            .or_else(|| self.args.keyword("endpoint"))?;
        let mut methods = parse_methods(self.args.keyword("methods"));
        if methods.is_empty() {
            methods.push(HttpMethod::Get);
        }
        let metadata = crate::idioms::decorator::route_metadata(&self.args);
        let symbol = self.symbol(std::iter::once(endpoint), "add_api_route");
        self.fragments(methods, path, symbol, self.line(), metadata)
    }

    /// `app.add_url_rule(rule, endpoint=None, view_func=None, methods=None)`
    fn add_url_rule(&self) -> Option<Vec<Emission>> {
        if !self.tail.is_empty() {
            return None;
        }
        let rule = path_value(Some(
            self.args.positional(0).or_else(|| self.args.keyword("rule"))?,
        ));
        let endpoint = self
            .args
            .positional(1)
            .or_else(|| self.args.keyword("endpoint"));
        let view = self
            .args
            .positional(2)
            .or_else(|| self.args.keyword("view_func"));
        let metadata = Metadata {
            name: endpoint.and_then(|e| e.string_value()),
            ..Metadata::default()
        };
        if let Some((callee, _)) = view.and_then(|v| v.call()) {
            let class = callee.strip_suffix(".as_view")?;
            return Some(vec![Emission::Link {
                parent: self.receiver.to_string(),
                target: Target::Name(class.to_string()),
                binding: Binding::View {
                    method_map: Vec::new(),
                },
                prefix: rule,
                metadata,
                line: self.line(),
            }]);
        }
        let mut methods = parse_methods(self.args.keyword("methods"));
        if methods.is_empty() {
            methods.push(HttpMethod::Get);
        }
        let symbol = match view.and_then(|v| v.ident_path()) {
            Some(name) => name.to_string(),
            None => metadata.name.clone()?,
        };
        self.fragments(methods, rule, symbol, self.line(), metadata)
    }

    /// aiohttp `router.add_route("GET", path, handler)`; `*` is any method.
    fn aiohttp_route(&self) -> Option<Vec<Emission>> {
        let method = self.args.positional(0)?.string_value()?;
        let method = match method.as_str() {
            "*" => HttpMethod::Any,
            m => HttpMethod::parse(m)?,
        };
        self.handler_call(vec![method], 1)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};

    use super::*;
    use crate::extract::imports::ImportTable;
    use crate::idioms::testing::run;
    use crate::models::Idiom;

    fn run_js(text: &str, line: usize, routers: &[&str]) -> Option<Vec<Emission>> {
        run(Idiom::CallRegistration, text, Language::Script, line, None, routers)
    }

    fn run_py(text: &str) -> Option<Vec<Emission>> {
        run(Idiom::CallRegistration, text, Language::Python, 1, None, &["app", "bp"])
    }

    fn fragments(emissions: &[Emission]) -> Vec<(HttpMethod, String, String, usize)> {
        emissions
            .iter()
            .filter_map(|e| match e {
                Emission::Fragment {
                    method,
                    path,
                    symbol,
                    line,
                    ..
                } => Some((*method, path.clone(), symbol.clone(), *line)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_express_verbs() {
        let emissions = run_js(
            "router.get('/users/:id', auth, getUser);",
            1,
            &[],
        )
        .expect("match");
        assert_eq!(
            fragments(&emissions),
            vec![(HttpMethod::Get, "/users/:id".into(), "getUser".into(), 1)]
        );
        let inline = run_js(
            "app.post('/login', (req, res) => {\n  res.send('ok');\n});",
            1,
            &[],
        )
        .expect("match");
        assert_eq!(
            fragments(&inline),
            vec![(HttpMethod::Post, "/login".into(), "app.post".into(), 1)]
        );
        let all = run_js("api.all('*', notFound)", 1, &[]).expect("match");
        assert_eq!(fragments(&all)[0].0, HttpMethod::Any);

        let typed = run_js(
            "app.get<{}, MessageResponse>('/health', (_req, res) => {\n  res.json({ ok: true });\n});",
            1,
            &["app"],
        )
        .expect("type arguments");
        assert_eq!(
            fragments(&typed),
            vec![(HttpMethod::Get, "/health".into(), "app.get".into(), 1)]
        );
        let nested = run_js(
            "app.post<{ id: string }, ApiResponse<{ version: string }>>('/users/:id', save)",
            1,
            &["app"],
        )
        .expect("nested type arguments");
        assert_eq!(
            fragments(&nested),
            vec![(HttpMethod::Post, "/users/:id".into(), "save".into(), 1)]
        );
        let chained = run_js("router.route('/book')\n  .get<{}, Book[]>(listBooks);", 1, &[])
            .expect("typed chain");
        assert_eq!(
            fragments(&chained),
            vec![(HttpMethod::Get, "/book".into(), "listBooks".into(), 2)]
        );
    }

    fn scoped_aliases(text: &str, line: usize) -> Option<Vec<Emission>> {
        let unit = crate::scanner::classify(text, Language::Script);
        let (stmts, _) = crate::scanner::reconstruct(&unit, "src/app.js", Language::Script);
        let idx = stmts.iter().position(|s| s.start_line == line)?;
        let imports = ImportTable::new("src/app.js", Language::Script);
        let routers: HashSet<String> = ["app".to_string()].into();
        let verb_aliases: HashMap<String, (String, String)> = [
            ("get".to_string(), ("app".to_string(), "get".to_string())),
            ("del".to_string(), ("app".to_string(), "delete".to_string())),
        ]
        .into();
        let ctx = MatchContext {
            language: Language::Script,
            stmt: &stmts[idx],
            following: &stmts[idx + 1..],
            class: None,
            routers: &routers,
            verb_aliases: &verb_aliases,
            imports: &imports,
        };
        Idiom::CallRegistration.try_match(&ctx)
    }

    #[test]
    fn test_destructured_verbs() {
        let aliases = run_js(
            "const { get, post, delete: del, listen } = app;",
            1,
            &["app"],
        )
        .expect("destructuring");
        let bound: Vec<(String, String, String)> = aliases
            .iter()
            .filter_map(|e| match e {
                Emission::VerbAlias {
                    alias,
                    receiver,
                    verb,
                } => Some((alias.clone(), receiver.clone(), verb.clone())),
                _ => None,
            })
            .collect();
        assert_eq!(
            bound,
            vec![
                ("get".into(), "app".into(), "get".into()),
                ("post".into(), "app".into(), "post".into()),
                ("del".into(), "app".into(), "delete".into()),
            ]
        );
        assert!(run_js("const { name, email } = req.body;", 1, &[]).is_none());

        let get = scoped_aliases("get('/a', (req, res) => {\n  res.send('a');\n});", 1)
            .expect("aliased get");
        assert_eq!(
            fragments(&get),
            vec![(HttpMethod::Get, "/a".into(), "app.get".into(), 1)]
        );
        let del = scoped_aliases("del('/b/:id', removeB);", 1).expect("aliased delete");
        assert_eq!(
            fragments(&del),
            vec![(HttpMethod::Delete, "/b/:id".into(), "removeB".into(), 1)]
        );
        assert!(scoped_aliases("post('/c', h);", 1).is_none());
    }

    #[test]
    fn test_settings_getter_and_clients_declined() {
        assert!(run_js("const title = app.get('title');", 1, &[]).is_none());
        assert!(run_js("app.get('title')", 1, &[]).is_none());
        assert!(run_js("axios.get('/users', config)", 1, &[]).is_none());
        assert!(run_js("requests.post('/x', data)", 1, &[]).is_none());
    }

    #[test]
    fn test_declared_router_receiver() {
        assert!(run_js("adminRoutes.delete('/x/:id', remove)", 1, &[]).is_none());
        let emissions = run_js("adminRoutes.delete('/x/:id', remove)", 1, &["adminRoutes"])
            .expect("declared router");
        assert_eq!(fragments(&emissions)[0].0, HttpMethod::Delete);
    }

    #[test]
    fn test_route_chain_lines() {
        let emissions = run_js(
            "router.route('/book')\n  .get(listBooks)\n  .post(addBook);",
            1,
            &[],
        )
        .expect("chain");
        assert_eq!(
            fragments(&emissions),
            vec![
                (HttpMethod::Get, "/book".into(), "listBooks".into(), 2),
                (HttpMethod::Post, "/book".into(), "addBook".into(), 3),
            ]
        );
    }

    #[test]
    fn test_constructors_and_exports() {
        let app = run_js("const app = express();", 1, &[]).expect("app");
        assert!(matches!(&app[0], Emission::Node { name, kind: NodeKind::Router, .. } if name == "app"));
        let router = run_js("const users = express.Router({ mergeParams: true });", 1, &[])
            .expect("router");
        assert!(matches!(&router[0], Emission::Node { name, .. } if name == "users"));

        let default = run_js("module.exports = users;", 1, &[]).expect("export");
        assert_eq!(
            default,
            vec![Emission::Export {
                name: "users".into(),
                alias: "default".into()
            }]
        );
        let es = run_js("export default users", 1, &[]).expect("export");
        assert_eq!(es, default);
        let named = run_js("exports.admin = adminRouter;", 1, &[]).expect("named");
        assert!(matches!(&named[0], Emission::Export { name, alias } if name == "adminRouter" && alias == "admin"));
        let object = run_js("module.exports = { users, admin: adminRouter };", 1, &[]).expect("object");
        assert_eq!(object.len(), 2);
    }

    #[test]
    fn test_use_links_only_router_children() {
        let text = "const usersRouter = require('./routes/users');\napp.use('/users', usersRouter);";
        let unit = crate::scanner::classify(text, Language::Script);
        let (stmts, _) = crate::scanner::reconstruct(&unit, "src/app.js", Language::Script);
        let mut imports = ImportTable::new("src/app.js", Language::Script);
        imports.scan(&stmts[0]);
        let routers = HashSet::new();
        let verb_aliases = HashMap::new();
        let ctx = MatchContext {
            language: Language::Script,
            stmt: &stmts[1],
            following: &[],
            class: None,
            routers: &routers,
            verb_aliases: &verb_aliases,
            imports: &imports,
        };
        let emissions = Idiom::CallRegistration.try_match(&ctx).expect("use");
        assert!(matches!(
            &emissions[0],
            Emission::Link { parent, target: Target::Name(n), prefix, .. }
                if parent == "app" && n == "usersRouter" && prefix == "/users"
        ));

        assert!(run_js("app.use(express.json())", 1, &[]).is_none());
        assert!(run_js("app.use(cors)", 1, &[]).is_none());
        let required = run_js("app.use('/api', require('./api'))", 1, &[]).expect("require");
        assert!(matches!(
            &required[0],
            Emission::Link { target: Target::Module { module, name }, .. }
                if module == "src.api" && name == "default"
        ));
        let local = run_js("app.use('/v2', auth, v2)", 1, &["v2"]).expect("declared child");
        assert_eq!(required.len(), local.len());
    }

    #[test]
    fn test_python_call_apis() {
        let api = run_py("app.add_api_route('/items', list_items, methods=['GET', 'HEAD'])")
            .expect("add_api_route");
        assert_eq!(fragments(&api).len(), 2);

        let rule = run_py("bp.add_url_rule('/users', view_func=UserAPI.as_view('users'))")
            .expect("add_url_rule view");
        assert!(matches!(
            &rule[0],
            Emission::Link { target: Target::Name(n), binding: Binding::View { .. }, .. } if n == "UserAPI"
        ));
        let func = run_py("app.add_url_rule('/', 'index', index, methods=['POST'])")
            .expect("add_url_rule function");
        assert_eq!(
            fragments(&func),
            vec![(HttpMethod::Post, "/".into(), "index".into(), 1)]
        );

        let aio = run(
            Idiom::CallRegistration,
            "app = web.Application()\napp.router.add_get('/health', health)\napp.router.add_route('*', '/echo', echo)",
            Language::Python,
            2,
            None,
            &["app"],
        )
        .expect("aiohttp");
        assert!(matches!(&aio[0], Emission::Fragment { receiver, .. } if receiver.as_deref() == Some("app")));
    }

    #[test]
    fn test_python_call_form_is_shared_with_decorators() {
        let emissions = run_py("app.post('/hooks')(receive_hook)").expect("call form");
        assert_eq!(
            fragments(&emissions),
            vec![(HttpMethod::Post, "/hooks".into(), "receive_hook".into(), 1)]
        );
        assert!(run_py("app.post('/hooks')").is_none());
    }
}
