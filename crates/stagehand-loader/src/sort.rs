//! Dependency sorting and validation.
//!
//! Packages are ordered so every package comes after its dependencies, then
//! validated in that order: host requirement, presence and version of each
//! dependency, and whether a dependency was itself disabled. A package that
//! fails any check is disabled, and disablement propagates to everything that
//! depends on it.

use std::collections::{BTreeMap, HashMap, HashSet};

use semver::Version;
use tracing::{debug, info, warn};

use crate::error::DependencyError;
use crate::package::{Diagnostic, Package};

/// Whether `candidate` satisfies `requirement`: same major version and a
/// minor version at least as high. Patch components are ignored.
#[must_use]
pub fn satisfies(candidate: &Version, requirement: &Version) -> bool {
    candidate.major == requirement.major && candidate.minor >= requirement.minor
}

/// Sort `packages` and disable those that cannot load.
///
/// Returns indices into `packages` of the enabled packages in dependency
/// order. Disabled packages keep their diagnostics.
pub fn sort_packages(packages: &mut [Package], host: &Version) -> Vec<usize> {
    let lookup = build_lookup(packages);
    let order = topological_order(packages, &lookup);

    for &index in &order {
        validate(packages, &lookup, index, host);
    }

    let enabled: Vec<usize> = order
        .into_iter()
        .filter(|&i| packages[i].is_enabled())
        .collect();
    info!(
        total = packages.len(),
        enabled = enabled.len(),
        disabled = packages.len().saturating_sub(enabled.len()),
        "Sorted packages"
    );
    enabled
}

/// Guid to package index. Guids claimed more than once are left out and
/// every claimant is disabled.
fn build_lookup(packages: &mut [Package]) -> HashMap<String, usize> {
    let mut claims: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for (index, package) in packages.iter().enumerate() {
        claims.entry(package.guid().to_owned()).or_default().push(index);
    }

    let mut lookup = HashMap::new();
    for (guid, indices) in claims {
        if let [index] = indices.as_slice() {
            lookup.insert(guid, *index);
            continue;
        }
        warn!(
            package = %guid,
            sources = ?indices.iter().map(|&i| packages[i].source().display().to_string()).collect::<Vec<_>>(),
            "Conflicting packages share a guid"
        );
        for &index in &indices {
            packages[index].disable(Diagnostic::Dependency(DependencyError::Conflict {
                guid: guid.clone(),
                count: indices.len(),
            }));
        }
    }
    lookup
}

/// Depth-first post-order over declared dependencies, starting from each
/// package in discovery order. Conflicted packages are left out.
fn topological_order(packages: &[Package], lookup: &HashMap<String, usize>) -> Vec<usize> {
    let mut order = Vec::with_capacity(packages.len());
    let mut visited = HashSet::new();
    let mut in_progress = HashSet::new();

    for (index, package) in packages.iter().enumerate() {
        if lookup.get(package.guid()) == Some(&index) {
            visit(packages, lookup, index, &mut visited, &mut in_progress, &mut order);
        }
    }
    order
}

fn visit(
    packages: &[Package],
    lookup: &HashMap<String, usize>,
    index: usize,
    visited: &mut HashSet<usize>,
    in_progress: &mut HashSet<usize>,
    order: &mut Vec<usize>,
) {
    if !visited.insert(index) {
        if in_progress.contains(&index) {
            warn!(package = %packages[index].guid(), "Dependency cycle detected");
        }
        return;
    }
    in_progress.insert(index);
    for guid in packages[index].manifest().dependencies.keys() {
        if let Some(&dep) = lookup.get(guid) {
            visit(packages, lookup, dep, visited, in_progress, order);
        }
    }
    in_progress.remove(&index);
    order.push(index);
}

fn validate(
    packages: &mut [Package],
    lookup: &HashMap<String, usize>,
    index: usize,
    host: &Version,
) {
    let mut failures = Vec::new();
    let manifest = packages[index].manifest();

    if !satisfies(host, &manifest.require) {
        failures.push(DependencyError::UnsupportedHost {
            required: manifest.require.clone(),
            host: host.clone(),
        });
    }

    for (guid, required) in &manifest.dependencies {
        let Some(&dep) = lookup.get(guid) else {
            failures.push(DependencyError::Missing { guid: guid.clone() });
            continue;
        };
        let dependency = &packages[dep];
        if !satisfies(dependency.version(), required) {
            failures.push(DependencyError::Unsatisfied {
                guid: guid.clone(),
                required: required.clone(),
                found: dependency.version().clone(),
            });
        } else if !dependency.is_enabled() {
            failures.push(DependencyError::Disabled { guid: guid.clone() });
        }
    }

    let package = &mut packages[index];
    if failures.is_empty() {
        debug!(package = %package.guid(), "Dependencies satisfied");
    }
    for failure in failures {
        package.disable(Diagnostic::Dependency(failure));
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use stagehand_vfs::{Directory, DiskDirectory};

    use super::*;
    use crate::manifest::Manifest;

    struct Fixture {
        dir: tempfile::TempDir,
        root: Arc<dyn Directory>,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let root = DiskDirectory::open(dir.path()).unwrap() as Arc<dyn Directory>;
            Self { dir, root }
        }

        fn package(&self, guid: &str, version: &str, deps: &[(&str, &str)]) -> Package {
            let deps: serde_json::Map<String, serde_json::Value> = deps
                .iter()
                .map(|(g, v)| ((*g).to_owned(), serde_json::Value::from(*v)))
                .collect();
            let json = serde_json::json!({
                "guid": guid,
                "version": version,
                "require": "1.0",
                "dependencies": deps,
            });
            let manifest = Manifest::from_json(json.to_string().as_bytes(), guid).unwrap();
            Package::new(manifest, Arc::clone(&self.root), self.dir.path().join(guid))
        }
    }

    fn guids(packages: &[Package], order: &[usize]) -> Vec<String> {
        order.iter().map(|&i| packages[i].guid().to_owned()).collect()
    }

    fn host() -> Version {
        Version::new(1, 2, 0)
    }

    #[test]
    fn version_rule() {
        let v = |s: &str| Version::parse(s).unwrap();
        assert!(satisfies(&v("1.0.0"), &v("1.0.0")));
        assert!(satisfies(&v("1.3.0"), &v("1.2.9")));
        assert!(satisfies(&v("1.2.0"), &v("1.2.7")));
        assert!(!satisfies(&v("1.1.9"), &v("1.2.0")));
        assert!(!satisfies(&v("2.0.0"), &v("1.0.0")));
        assert!(!satisfies(&v("0.9.0"), &v("1.0.0")));
    }

    #[test]
    fn dependencies_come_first() {
        let fx = Fixture::new();
        let mut packages = vec![
            fx.package("c", "1.0.0", &[("b", "1.0")]),
            fx.package("b", "1.0.0", &[("a", "1.0")]),
            fx.package("a", "1.0.0", &[]),
        ];
        let order = sort_packages(&mut packages, &host());
        assert_eq!(guids(&packages, &order), ["a", "b", "c"]);
    }

    #[test]
    fn old_dependency_disables_the_chain() {
        let fx = Fixture::new();
        let mut packages = vec![
            fx.package("a", "0.9.0", &[]),
            fx.package("b", "1.0.0", &[("a", "1.0")]),
            fx.package("c", "1.0.0", &[("b", "1.0")]),
        ];
        let order = sort_packages(&mut packages, &host());
        assert_eq!(guids(&packages, &order), ["a"]);

        assert!(matches!(
            packages[1].diagnostics(),
            [Diagnostic::Dependency(DependencyError::Unsatisfied { guid, .. })] if guid == "a"
        ));
        assert!(matches!(
            packages[2].diagnostics(),
            [Diagnostic::Dependency(DependencyError::Disabled { guid })] if guid == "b"
        ));
    }

    #[test]
    fn duplicate_guids_load_neither() {
        let fx = Fixture::new();
        let mut packages = vec![
            fx.package("x.y", "1.0.0", &[]),
            fx.package("other", "1.0.0", &[]),
            fx.package("x.y", "1.1.0", &[]),
            fx.package("needs.xy", "1.0.0", &[("x.y", "1.0")]),
        ];
        let order = sort_packages(&mut packages, &host());
        assert_eq!(guids(&packages, &order), ["other"]);
        for index in [0, 2] {
            assert!(matches!(
                packages[index].diagnostics(),
                [Diagnostic::Dependency(DependencyError::Conflict { count: 2, .. })]
            ));
        }
        assert!(matches!(
            packages[3].diagnostics(),
            [Diagnostic::Dependency(DependencyError::Missing { .. })]
        ));
    }

    #[test]
    fn host_requirement_is_checked() {
        let fx = Fixture::new();
        let mut packages = vec![fx.package("a", "1.0.0", &[])];
        let order = sort_packages(&mut packages, &Version::new(2, 0, 0));
        assert!(order.is_empty());
        assert!(matches!(
            packages[0].diagnostics(),
            [Diagnostic::Dependency(DependencyError::UnsupportedHost { .. })]
        ));
    }

    #[test]
    fn cycles_terminate() {
        let fx = Fixture::new();
        let mut packages = vec![
            fx.package("a", "1.0.0", &[("b", "1.0")]),
            fx.package("b", "1.0.0", &[("a", "1.0")]),
        ];
        let order = sort_packages(&mut packages, &host());
        assert_eq!(order.len(), 2);
        assert_eq!(guids(&packages, &order), ["b", "a"]);
    }
}
