//! Composition resolver.
//!
//! Nodes live in an arena keyed by `(unit, name)`. Every container node that
//! no resolved inclusion targets is a root; a depth-first walk from each root
//! composes prefixes and metadata along the way. Each usage path is resolved
//! on its own, so a router included twice yields its endpoints twice, and a
//! link back onto the current path is reported as a cycle and skipped.

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;
use tracing::{debug, warn};

use crate::compose::paths::{join_segments, normalize_pattern, to_absolute};
use crate::idioms::class_methods::implied_methods;
use crate::idioms::resource::{implied_actions, standard_action};
use crate::models::{
    Binding, ChildLink, CompositionNode, Diagnostic, Endpoint, EndpointFragment, HttpMethod, Idiom,
    Issue, Metadata, NodeKind, NodeRef, PathParam, SourceLocation,
};

/// Endpoints and composition diagnostics for a whole corpus.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Composition {
    pub endpoints: Vec<Endpoint>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Compose fragments through the node graph into endpoints.
pub fn compose(fragments: &[EndpointFragment], nodes: &[CompositionNode]) -> Composition {
    let mut resolver = Resolver::new(nodes);
    resolver.absorb_stand_ins();
    resolver.assign(fragments);
    let roots = resolver.roots();
    debug!(
        nodes = resolver.nodes.len(),
        fragments = fragments.len(),
        roots = roots.len(),
        "composing corpus"
    );
    for root in roots {
        let mut stack = Vec::new();
        resolver.visit(root, &Frame::default(), &mut stack);
    }
    resolver.report_unreachable();
    Composition {
        endpoints: resolver.endpoints,
        diagnostics: resolver.diagnostics,
    }
}

// ---------------------------------------------------------------------------
// Traversal state
// ---------------------------------------------------------------------------

/// Prefix pieces, parameters, and metadata accumulated down one usage path.
#[derive(Clone, Debug, Default)]
struct Frame {
    pieces: Vec<String>,
    params: Vec<PathParam>,
    metadata: Metadata,
}

impl Frame {
    fn nested(&self, raw: &str, metadata: &Metadata) -> Frame {
        let (normalized, params) = normalize_pattern(raw);
        let mut next = self.clone();
        next.pieces.push(normalized);
        next.params.extend(params);
        next.metadata = self.metadata.merged_with(metadata);
        next
    }

    fn joined(&self) -> String {
        join_segments(self.pieces.iter().map(String::as_str))
    }
}

/// A handler a class exposes once it is bound.
#[derive(Clone, Debug)]
struct Member {
    method: HttpMethod,
    path: String,
    symbol: String,
    action: String,
    location: SourceLocation,
    metadata: Metadata,
}

struct Resolver<'a> {
    nodes: Vec<CompositionNode>,
    keys: HashMap<(String, String), usize>,
    modules: IndexMap<String, Vec<usize>>,
    owned: Vec<Vec<&'a EndpointFragment>>,
    absorbed_into: Vec<Option<usize>>,
    visited: Vec<bool>,
    endpoints: Vec<Endpoint>,
    diagnostics: Vec<Diagnostic>,
    reported: HashSet<(SourceLocation, String)>,
}

impl<'a> Resolver<'a> {
    fn new(input: &[CompositionNode]) -> Self {
        let mut nodes: Vec<CompositionNode> = Vec::with_capacity(input.len());
        let mut keys: HashMap<(String, String), usize> = HashMap::new();
        for node in input {
            let key = (node.unit.clone(), node.name.clone());
            match keys.get(&key) {
                Some(&idx) => {
                    let existing = &mut nodes[idx];
                    existing.links.extend(node.links.iter().cloned());
                    existing.bases.extend(node.bases.iter().cloned());
                    for alias in &node.aliases {
                        if !existing.answers_to(alias) {
                            existing.aliases.push(alias.clone());
                        }
                    }
                }
                None => {
                    keys.insert(key, nodes.len());
                    nodes.push(node.clone());
                }
            }
        }
        let mut modules: IndexMap<String, Vec<usize>> = IndexMap::new();
        for (idx, node) in nodes.iter().enumerate() {
            modules.entry(node.module.clone()).or_default().push(idx);
        }
        let count = nodes.len();
        Self {
            nodes,
            keys,
            modules,
            owned: vec![Vec::new(); count],
            absorbed_into: vec![None; count],
            visited: vec![false; count],
            endpoints: Vec::new(),
            diagnostics: Vec::new(),
            reported: HashSet::new(),
        }
    }

    // -----------------------------------------------------------------------
    // Lookup
    // -----------------------------------------------------------------------

    /// Find the node a reference names.
    ///
    /// Tries the declaring unit first, then units whose module equals or ends
    /// with the reference module. With `unique_fallback`, a class or function
    /// whose bare name is unique across the corpus also matches.
    fn lookup(&self, r: &NodeRef, unique_fallback: bool) -> Option<usize> {
        let found = self.lookup_exact(r).or_else(|| {
            unique_fallback
                .then(|| self.lookup_unique(r))
                .flatten()
        })?;
        Some(self.settle(found))
    }

    fn lookup_exact(&self, r: &NodeRef) -> Option<usize> {
        if let Some(unit) = &r.unit {
            let hit = if r.factory {
                self.pick(
                    (0..self.nodes.len()).filter(|&i| self.nodes[i].unit == *unit),
                    r,
                )
            } else {
                self.keys.get(&(unit.clone(), r.name.clone())).copied()
            };
            if hit.is_some() {
                return hit;
            }
        }
        if r.module.is_empty() {
            return None;
        }

        // Exact module first
        if let Some(idxs) = self.modules.get(&r.module) {
            if let Some(hit) = self.pick(idxs.iter().copied(), r) {
                return Some(hit);
            }
        }

        // Fallback: modules ending with the reference module
        let suffix = format!(".{}", r.module);
        self.modules
            .iter()
            .filter(|(module, _)| module.ends_with(&suffix))
            .find_map(|(_, idxs)| self.pick(idxs.iter().copied(), r))
    }

    fn lookup_unique(&self, r: &NodeRef) -> Option<usize> {
        if r.factory {
            return None;
        }
        let mut hits = self.nodes.iter().enumerate().filter(|(_, n)| {
            matches!(n.kind, NodeKind::ViewClass | NodeKind::ViewFunction) && n.name == r.name
        });
        match (hits.next(), hits.next()) {
            (Some((idx, _)), None) => Some(idx),
            _ => None,
        }
    }

    /// First candidate answering to `r`; factory calls prefer containers.
    fn pick(&self, candidates: impl Iterator<Item = usize>, r: &NodeRef) -> Option<usize> {
        let matching: Vec<usize> = candidates
            .filter(|&i| {
                let node = &self.nodes[i];
                if r.factory {
                    node.factory.as_deref() == Some(r.name.as_str())
                } else {
                    node.answers_to(&r.name)
                }
            })
            .collect();
        if r.factory {
            if let Some(&hit) = matching.iter().find(|&&i| self.nodes[i].kind.is_container()) {
                return Some(hit);
            }
        }
        matching.first().copied()
    }

    /// Follow stand-ins to the node that now owns their links.
    fn settle(&self, mut idx: usize) -> usize {
        for _ in 0..self.nodes.len() {
            match self.absorbed_into[idx] {
                Some(next) => idx = next,
                None => break,
            }
        }
        idx
    }

    // -----------------------------------------------------------------------
    // Preparation
    // -----------------------------------------------------------------------

    /// Move links registered on imported objects onto the objects themselves.
    fn absorb_stand_ins(&mut self) {
        for idx in 0..self.nodes.len() {
            let Some(extends) = self.nodes[idx].extends.clone() else {
                continue;
            };
            match self.lookup(&extends, false) {
                Some(target) if target != idx => {
                    let links = std::mem::take(&mut self.nodes[idx].links);
                    self.nodes[target].links.extend(links);
                    self.absorbed_into[idx] = Some(target);
                }
                _ => {
                    let location = self.nodes[idx].location.clone();
                    self.unresolved(location, extends.to_string());
                }
            }
        }
    }

    /// Attach fragments to their nodes; keyless fragments are already absolute.
    fn assign(&mut self, fragments: &'a [EndpointFragment]) {
        for fragment in fragments {
            let Some(key) = &fragment.key else {
                self.emit(
                    &Frame::default(),
                    fragment.method,
                    &fragment.path,
                    fragment.symbol.clone(),
                    fragment.location.clone(),
                    &fragment.metadata,
                    None,
                );
                continue;
            };
            match self.lookup(key, false) {
                Some(idx) => self.owned[idx].push(fragment),
                None => {
                    let reference = key.to_string();
                    self.unresolved(fragment.location.clone(), reference.clone());
                    let (path, params) = normalize_pattern(&fragment.path);
                    self.endpoints.push(Endpoint {
                        method: fragment.method,
                        path: join_segments([path.as_str()]),
                        symbol: fragment.symbol.clone(),
                        location: fragment.location.clone(),
                        metadata: fragment.metadata.clone(),
                        params,
                        unresolved: Some(reference),
                    });
                }
            }
        }
    }

    fn included(&self) -> Vec<bool> {
        let mut included = vec![false; self.nodes.len()];
        for (idx, node) in self.nodes.iter().enumerate() {
            if self.absorbed_into[idx].is_some() {
                continue;
            }
            for link in node.links.iter().filter(|l| l.binding == Binding::Include) {
                if let Some(target) = self.lookup(&link.target, false) {
                    if target != idx {
                        included[target] = true;
                    }
                }
            }
        }
        included
    }

    fn roots(&self) -> Vec<usize> {
        let included = self.included();
        (0..self.nodes.len())
            .filter(|&i| {
                self.absorbed_into[i].is_none() && self.nodes[i].kind.is_container() && !included[i]
            })
            .collect()
    }

    // -----------------------------------------------------------------------
    // Walk
    // -----------------------------------------------------------------------

    fn visit(&mut self, idx: usize, frame: &Frame, stack: &mut Vec<usize>) {
        self.visited[idx] = true;
        stack.push(idx);
        let node = &self.nodes[idx];
        let frame = frame.nested(&node.prefix, &node.metadata);
        let links = node.links.clone();
        for fragment in self.owned[idx].clone() {
            self.emit_fragment(&frame, fragment);
        }
        for link in &links {
            self.follow(link, &frame, stack);
        }
        stack.pop();
    }

    fn follow(&mut self, link: &ChildLink, frame: &Frame, stack: &mut Vec<usize>) {
        let unique_fallback = link.binding != Binding::Include;
        let target = self.lookup(&link.target, unique_fallback);
        let inner = frame.nested(&link.prefix, &link.metadata);
        match &link.binding {
            Binding::Include => match target {
                Some(child) if stack.contains(&child) => {
                    warn!(reference = %link.target, location = %link.location, "cyclic inclusion");
                    self.report(
                        link.location.clone(),
                        Issue::CyclicInclusion {
                            reference: link.target.to_string(),
                        },
                    );
                }
                Some(child) => self.visit(child, &inner, stack),
                None => self.unresolved(link.location.clone(), link.target.to_string()),
            },
            Binding::Handler => {
                match target.filter(|&t| self.nodes[t].kind == NodeKind::ViewFunction) {
                    Some(function) => {
                        for fragment in self.owned[function].clone() {
                            self.emit_fragment(&inner, fragment);
                        }
                    }
                    None => self.emit(
                        &inner,
                        HttpMethod::Any,
                        "",
                        link.symbol.clone(),
                        link.location.clone(),
                        &Metadata::default(),
                        None,
                    ),
                }
            }
            Binding::View { method_map } => {
                match target.filter(|&t| self.nodes[t].kind == NodeKind::ViewClass) {
                    Some(class) => self.bind_view(class, link, &inner, method_map),
                    None => self.unresolved_class(link, &inner),
                }
            }
            Binding::Resource => {
                match target.filter(|&t| self.nodes[t].kind == NodeKind::ViewClass) {
                    Some(class) => self.bind_resource(class, link, &inner),
                    None => self.unresolved_class(link, &inner),
                }
            }
        }
    }

    fn bind_view(
        &mut self,
        class: usize,
        link: &ChildLink,
        frame: &Frame,
        method_map: &[(HttpMethod, String)],
    ) {
        let class_name = self.nodes[class].name.clone();
        if !method_map.is_empty() {
            let mut members = self.members(class, true);
            members.extend(self.members(class, false));
            for (method, action) in method_map {
                let found = members.iter().find(|m| m.action == *action);
                let symbol = found.map_or_else(|| format!("{class_name}.{action}"), |m| m.symbol.clone());
                let location = found.map_or_else(|| link.location.clone(), |m| m.location.clone());
                let metadata = found.map(|m| m.metadata.clone()).unwrap_or_default();
                self.emit(frame, *method, "", symbol, location, &metadata, None);
            }
            return;
        }
        let members = self.members(class, false);
        if members.is_empty() {
            self.emit(
                frame,
                HttpMethod::Any,
                "",
                class_name,
                link.location.clone(),
                &Metadata::default(),
                None,
            );
            return;
        }
        for m in members {
            self.emit(frame, m.method, &m.path, m.symbol, m.location, &m.metadata, None);
        }
    }

    fn bind_resource(&mut self, class: usize, link: &ChildLink, frame: &Frame) {
        let members = self.members(class, true);
        if members.is_empty() {
            let class_name = self.nodes[class].name.clone();
            self.emit(
                frame,
                HttpMethod::Any,
                "",
                class_name,
                link.location.clone(),
                &Metadata::default(),
                None,
            );
            return;
        }
        for m in members {
            self.emit(frame, m.method, &m.path, m.symbol, m.location, &m.metadata, None);
        }
    }

    fn unresolved_class(&mut self, link: &ChildLink, frame: &Frame) {
        let reference = link.target.to_string();
        self.unresolved(link.location.clone(), reference.clone());
        self.emit(
            frame,
            HttpMethod::Any,
            "",
            link.symbol.clone(),
            link.location.clone(),
            &Metadata::default(),
            Some(reference),
        );
    }

    // -----------------------------------------------------------------------
    // Class members
    // -----------------------------------------------------------------------

    /// Members of `class`, own declarations first, then in-corpus ancestors,
    /// then handlers implied by well-known framework bases.
    fn members(&self, class: usize, resource: bool) -> Vec<Member> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        let mut visited = HashSet::new();
        self.collect_members(class, class, resource, &mut out, &mut seen, &mut visited);
        out
    }

    fn collect_members(
        &self,
        root: usize,
        idx: usize,
        resource: bool,
        out: &mut Vec<Member>,
        seen: &mut HashSet<String>,
        visited: &mut HashSet<usize>,
    ) {
        if !visited.insert(idx) {
            return;
        }
        let idiom = if resource {
            Idiom::ResourceRegistration
        } else {
            Idiom::ClassMethods
        };
        let own: Vec<Member> = self.owned[idx]
            .iter()
            .filter(|f| f.idiom == idiom)
            .map(|f| Member {
                method: f.method,
                path: f.path.clone(),
                symbol: f.symbol.clone(),
                action: f
                    .action
                    .clone()
                    .unwrap_or_else(|| f.method.as_str().to_ascii_lowercase()),
                location: f.location.clone(),
                metadata: f.metadata.clone(),
            })
            .filter(|m| !seen.contains(&m.action))
            .collect();
        seen.extend(own.iter().map(|m| m.action.clone()));
        out.extend(own);

        let root_name = &self.nodes[root].name;
        let root_location = &self.nodes[root].location;
        for base in &self.nodes[idx].bases {
            let parent = self
                .lookup(base, true)
                .filter(|&b| self.nodes[b].kind == NodeKind::ViewClass);
            if let Some(parent) = parent {
                self.collect_members(root, parent, resource, out, seen, visited);
                continue;
            }
            if resource {
                for action in implied_actions(&base.name) {
                    let Some((method, path)) = standard_action(action) else {
                        continue;
                    };
                    if seen.insert(action.to_string()) {
                        out.push(Member {
                            method,
                            path: path.to_string(),
                            symbol: format!("{root_name}.{action}"),
                            action: action.to_string(),
                            location: root_location.clone(),
                            metadata: Metadata::default(),
                        });
                    }
                }
            } else {
                for method in implied_methods(&base.name) {
                    let action = method.as_str().to_ascii_lowercase();
                    if seen.insert(action.clone()) {
                        out.push(Member {
                            method: *method,
                            path: String::new(),
                            symbol: format!("{root_name}.{action}"),
                            action,
                            location: root_location.clone(),
                            metadata: Metadata::default(),
                        });
                    }
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Output
    // -----------------------------------------------------------------------

    fn emit_fragment(&mut self, frame: &Frame, fragment: &EndpointFragment) {
        self.emit(
            frame,
            fragment.method,
            &fragment.path,
            fragment.symbol.clone(),
            fragment.location.clone(),
            &fragment.metadata,
            None,
        );
    }

    #[allow(clippy::too_many_arguments)]
    fn emit(
        &mut self,
        frame: &Frame,
        method: HttpMethod,
        path: &str,
        symbol: String,
        location: SourceLocation,
        metadata: &Metadata,
        unresolved: Option<String>,
    ) {
        let full = frame.nested(path, metadata);
        self.endpoints.push(Endpoint {
            method,
            path: to_absolute(&full.joined()),
            symbol,
            location,
            metadata: full.metadata,
            params: full.params,
            unresolved,
        });
    }

    fn report(&mut self, location: SourceLocation, issue: Issue) {
        let key = (location.clone(), issue.to_string());
        if self.reported.insert(key) {
            self.diagnostics.push(Diagnostic::new(location, issue));
        }
    }

    fn unresolved(&mut self, location: SourceLocation, reference: String) {
        self.report(location, Issue::UnresolvedReference { reference });
    }

    /// Included containers no root reaches only include each other.
    fn report_unreachable(&mut self) {
        let included = self.included();
        for idx in 0..self.nodes.len() {
            let node = &self.nodes[idx];
            if self.visited[idx]
                || self.absorbed_into[idx].is_some()
                || !node.kind.is_container()
                || !included[idx]
            {
                continue;
            }
            let reference = NodeRef::external(&node.module, &node.name).to_string();
            let location = node.location.clone();
            warn!(reference = %reference, "inclusion cycle unreachable from any root");
            self.report(location, Issue::CyclicInclusion { reference });
        }
    }
}
