//! Build-order graph construction
//!
//! Expands each package's build requirements through the resolver and
//! reduces the answers to "build-after" edges within the batch. The
//! full explanation chain behind every edge is retained for cycle
//! reporting.

use std::collections::{BTreeMap, BTreeSet};

use futures::future::try_join_all;

use crate::error::GraphError;
use crate::infra::resolver::{Provider, ResolverClient};

/// The build-after relation for one batch.
///
/// `build_after[p]` is the set of batch packages that must reach `Done`
/// before `p` may start. `details[p][q]` records which providers forced
/// the `p` -> `q` edge. Both maps are immutable once constructed.
#[derive(Debug, Clone, Default)]
pub struct BuildOrder {
    /// package -> packages it must build after
    pub build_after: BTreeMap<String, BTreeSet<String>>,
    /// package -> dependency -> providers that forced the edge
    pub details: BTreeMap<String, BTreeMap<String, Vec<Provider>>>,
}

impl BuildOrder {
    /// Number of packages in the batch
    pub fn len(&self) -> usize {
        self.build_after.len()
    }

    /// Whether the batch is empty
    pub fn is_empty(&self) -> bool {
        self.build_after.is_empty()
    }
}

/// Resolve the build order for a batch.
///
/// `requirements` maps every package in the batch to its raw build
/// requirement expressions. Packages are resolved concurrently; the
/// resulting graph does not depend on completion order. Any resolver
/// failure aborts the whole step.
pub async fn resolve_build_order<R: ResolverClient + ?Sized>(
    resolver: &R,
    requirements: &BTreeMap<String, Vec<String>>,
) -> Result<BuildOrder, GraphError> {
    let batch: BTreeSet<String> = requirements.keys().cloned().collect();

    let lookups = requirements.iter().map(|(package, reqs)| {
        let batch = &batch;
        async move {
            if reqs.is_empty() {
                return Ok::<_, GraphError>((package.as_str(), BTreeMap::new()));
            }
            tracing::debug!(package = %package, "expanding build requirements");
            let resolution = resolver.resolve(reqs, batch).await?;
            Ok((package.as_str(), resolution))
        }
    });
    let resolved = try_join_all(lookups).await?;

    let mut order = BuildOrder::default();
    for (package, resolution) in resolved {
        let mut after = BTreeSet::new();
        let mut details = BTreeMap::new();
        for (provider_pkg, providers) in resolution {
            // A requirement satisfied by one's own prior build is not a
            // same-batch ordering constraint.
            if provider_pkg == package || !batch.contains(&provider_pkg) {
                continue;
            }
            after.insert(provider_pkg.clone());
            details.insert(provider_pkg, providers);
        }
        order.build_after.insert(package.to_string(), after);
        order.details.insert(package.to_string(), details);
    }
    Ok(order)
}

/// Render an explanation chain as human-readable lines.
///
/// `None` marks a package that was in the input set. An even-length
/// chain opens with the build requirement itself; the remaining triples
/// are runtime requirement hops.
pub fn explanation_lines(explanation: Option<&[String]>, buildrequiring: &str) -> Vec<String> {
    let Some(chain) = explanation else {
        return vec!["<in input>".to_string()];
    };

    let mut lines = Vec::new();
    let start = if chain.len() % 2 == 0 {
        if chain.len() >= 2 {
            lines.push(format!(
                "{buildrequiring} build-requires {}, provided by {}",
                chain[0], chain[1]
            ));
        }
        1
    } else {
        0
    };

    let mut i = start;
    while i + 2 < chain.len() {
        lines.push(format!(
            "{} requires {}, provided by {}",
            chain[i],
            chain[i + 1],
            chain[i + 2]
        ));
        i += 2;
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ResolverError;
    use crate::infra::resolver::Resolution;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Resolver answering from a fixed table keyed by the first
    /// requirement expression.
    struct TableResolver {
        table: BTreeMap<String, Resolution>,
        calls: AtomicUsize,
        fail: bool,
    }

    impl TableResolver {
        fn new(table: BTreeMap<String, Resolution>) -> Self {
            Self {
                table,
                calls: AtomicUsize::new(0),
                fail: false,
            }
        }
    }

    #[async_trait]
    impl ResolverClient for TableResolver {
        async fn resolve(
            &self,
            requirements: &[String],
            restrict_to: &BTreeSet<String>,
        ) -> Result<Resolution, ResolverError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ResolverError::InvalidOutput("scripted failure".into()));
            }
            let mut resolution = self
                .table
                .get(&requirements[0])
                .cloned()
                .unwrap_or_default();
            resolution.retain(|name, _| restrict_to.contains(name));
            Ok(resolution)
        }
    }

    fn provider(name: &str, explanation: Option<&[&str]>) -> Provider {
        Provider {
            name: name.to_string(),
            explanation: explanation.map(|c| c.iter().map(|s| (*s).to_string()).collect()),
        }
    }

    fn requirements(pairs: &[(&str, &[&str])]) -> BTreeMap<String, Vec<String>> {
        pairs
            .iter()
            .map(|(name, reqs)| {
                (
                    (*name).to_string(),
                    reqs.iter().map(|r| (*r).to_string()).collect(),
                )
            })
            .collect()
    }

    #[tokio::test]
    async fn test_edges_restricted_to_batch_and_self_dropped() {
        let mut table = BTreeMap::new();
        // libfoo's requirements resolve to libbar (in batch), glibc
        // (outside) and libfoo itself.
        table.insert(
            "libbar-devel".to_string(),
            Resolution::from([
                (
                    "libbar".to_string(),
                    vec![provider("libbar-1.0-1", Some(&["libbar-devel", "libbar-1.0-1"]))],
                ),
                ("glibc".to_string(), vec![provider("glibc-2.38-1", None)]),
                ("libfoo".to_string(), vec![provider("libfoo-0.9-1", None)]),
            ]),
        );
        let resolver = TableResolver::new(table);

        let reqs = requirements(&[("libfoo", &["libbar-devel"]), ("libbar", &[])]);
        let order = resolve_build_order(&resolver, &reqs).await.unwrap();

        assert_eq!(order.len(), 2);
        assert_eq!(
            order.build_after["libfoo"],
            BTreeSet::from(["libbar".to_string()])
        );
        assert!(order.build_after["libbar"].is_empty());
        assert!(order.details["libfoo"].contains_key("libbar"));
    }

    #[tokio::test]
    async fn test_empty_requirements_skip_the_resolver() {
        let resolver = TableResolver::new(BTreeMap::new());
        let reqs = requirements(&[("a", &[]), ("b", &[])]);
        let order = resolve_build_order(&resolver, &reqs).await.unwrap();

        assert_eq!(resolver.calls.load(Ordering::SeqCst), 0);
        assert!(order.build_after.values().all(BTreeSet::is_empty));
    }

    #[tokio::test]
    async fn test_resolver_failure_aborts_the_graph() {
        let mut resolver = TableResolver::new(BTreeMap::new());
        resolver.fail = true;
        let reqs = requirements(&[("a", &["x"]), ("b", &["y"])]);
        assert!(resolve_build_order(&resolver, &reqs).await.is_err());
    }

    #[test]
    fn test_explanation_lines_in_input() {
        assert_eq!(explanation_lines(None, "libfoo"), vec!["<in input>"]);
    }

    #[test]
    fn test_explanation_lines_even_chain() {
        let chain: Vec<String> = ["cmake", "cmake-3.27-1", "libuv", "libuv-1.46-1"]
            .iter()
            .map(|s| (*s).to_string())
            .collect();
        let lines = explanation_lines(Some(&chain), "libfoo");
        assert_eq!(
            lines,
            vec![
                "libfoo build-requires cmake, provided by cmake-3.27-1",
                "cmake-3.27-1 requires libuv, provided by libuv-1.46-1",
            ]
        );
    }

    #[test]
    fn test_explanation_lines_odd_chain() {
        let chain: Vec<String> = ["pkg-a", "libx", "pkg-b"]
            .iter()
            .map(|s| (*s).to_string())
            .collect();
        let lines = explanation_lines(Some(&chain), "ignored");
        assert_eq!(lines, vec!["pkg-a requires libx, provided by pkg-b"]);
    }
}
