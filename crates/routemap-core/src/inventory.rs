//! Final endpoint inventory: ordering, duplicate handling, and validation.

use std::cmp::Ordering;

use serde::Serialize;
use tracing::debug;

use crate::errors::{RouteMapError, RouteMapResult};
use crate::models::{Diagnostic, Endpoint, HttpMethod, Issue, SourceLocation};

/// Endpoints ordered by (path, method, location), each triple present once.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Inventory {
    endpoints: Vec<Endpoint>,
}

impl Inventory {
    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Endpoint> {
        self.endpoints.iter()
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// All endpoints answering `method` on `path`.
    pub fn lookup<'a>(
        &'a self,
        method: HttpMethod,
        path: &'a str,
    ) -> impl Iterator<Item = &'a Endpoint> + 'a {
        self.endpoints
            .iter()
            .filter(move |e| e.method == method && e.path == path)
    }

    pub fn to_json(&self) -> RouteMapResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl<'a> IntoIterator for &'a Inventory {
    type Item = &'a Endpoint;
    type IntoIter = std::slice::Iter<'a, Endpoint>;

    fn into_iter(self) -> Self::IntoIter {
        self.endpoints.iter()
    }
}

fn compare(a: &Endpoint, b: &Endpoint) -> Ordering {
    a.sort_key().cmp(&b.sort_key())
}

/// Order, deduplicate, and validate resolved endpoints.
///
/// An exact repeat of (method, path, location) collapses into the first
/// entry and is reported as a repeated inclusion. The same (method, path) declared at another location is kept and
/// the later declaration is flagged against the first one.
pub fn build(
    mut endpoints: Vec<Endpoint>,
    diagnostics: &mut Vec<Diagnostic>,
) -> RouteMapResult<Inventory> {
    endpoints.sort_by(compare);

    let mut kept: Vec<Endpoint> = Vec::with_capacity(endpoints.len());
    let mut first_seen: Option<(HttpMethod, String, SourceLocation)> = None;
    for endpoint in endpoints {
        let same_route = first_seen
            .as_ref()
            .is_some_and(|(m, p, _)| *m == endpoint.method && *p == endpoint.path);
        if !same_route {
            first_seen = Some((
                endpoint.method,
                endpoint.path.clone(),
                endpoint.location.clone(),
            ));
            kept.push(endpoint);
            continue;
        }
        let other = first_seen
            .as_ref()
            .map(|(_, _, loc)| loc.clone())
            .unwrap_or_else(|| endpoint.location.clone());
        let issue = if other == endpoint.location {
            Issue::RepeatedInclusion {
                method: endpoint.method,
                path: endpoint.path.clone(),
            }
        } else {
            Issue::DuplicateRegistration {
                method: endpoint.method,
                path: endpoint.path.clone(),
                other,
            }
        };
        diagnostics.push(Diagnostic::new(endpoint.location.clone(), issue));
        let exact = kept
            .last()
            .is_some_and(|last| compare(last, &endpoint) == Ordering::Equal);
        if !exact {
            kept.push(endpoint);
        }
    }

    verify_order(&kept)?;
    debug!(endpoints = kept.len(), "inventory built");
    Ok(Inventory { endpoints: kept })
}

fn verify_order(endpoints: &[Endpoint]) -> RouteMapResult<()> {
    for pair in endpoints.windows(2) {
        if compare(&pair[0], &pair[1]) != Ordering::Less {
            return Err(RouteMapError::Invariant(format!(
                "inventory out of order at {} {} ({})",
                pair[1].method, pair[1].path, pair[1].location
            )));
        }
    }
    Ok(())
}
