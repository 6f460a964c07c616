// src/resolver/mod.rs

//! Dependency resolution
//!
//! Given a batch of package descriptors, the resolver computes the closure
//! over declared dependencies, classifying each dependency as installed,
//! already in the batch, resolvable from a repository (in which case the
//! batch grows), or missing. Directly mutual pairs (A depends on B, B
//! depends on A) are reported and the edge broken rather than failing the
//! batch. Owned-file clashes across the batch fail resolution. Problems are
//! collected cumulatively so the operator sees every missing dependency and
//! clash in one pass.
//!
//! When anything changed the implied order, the batch is topologically
//! sorted: dependencies precede their dependents.

use crate::error::{Error, FileClash, MissingDependency, ResolutionFailure, Result};
use crate::index::InstalledIndex;
use crate::packages::PackageDescriptor;
use crate::repository::RepositoryEngine;
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Resolves one batch against the installed state and configured
/// repositories. Stateless between calls; the dependency graph lives only
/// for the duration of one [`Resolver::resolve`].
pub struct Resolver<'a> {
    index: &'a InstalledIndex,
    repos: &'a RepositoryEngine,
}

impl<'a> Resolver<'a> {
    pub fn new(index: &'a InstalledIndex, repos: &'a RepositoryEngine) -> Self {
        Self { index, repos }
    }

    /// Validate and order a batch. On success the returned batch contains
    /// the input descriptors plus any repository packages pulled in to
    /// satisfy dependencies, in a valid installation order. On failure every
    /// collected problem is carried in the error.
    pub fn resolve(&self, mut batch: Vec<PackageDescriptor>) -> Result<Vec<PackageDescriptor>> {
        let mut problems = ResolutionFailure::default();
        let mut sort_required = false;

        // The clash check runs over the batch as requested, before
        // repository expansion appends anything.
        let requested_len = batch.len();

        let mut i = 0;
        while i < batch.len() {
            let dependencies = batch[i].dependencies.clone();
            for dep in dependencies {
                if dep.is_empty() || self.index.is_installed(&dep) {
                    continue;
                }

                if let Some(j) = batch.iter().position(|p| p.name == dep) {
                    let depends_back = batch[j]
                        .dependencies
                        .iter()
                        .any(|back| *back == batch[i].name);
                    if depends_back {
                        info!(
                            "packages {} and {} have a circular dependency, breaking",
                            batch[i].name, dep
                        );
                        continue;
                    }
                    sort_required = true;
                    continue;
                }

                // Neither installed nor in the batch: try the repositories
                match self.repos.package_data(&dep) {
                    Some(descriptor) => {
                        debug!(
                            "pulling {} from repository {} to satisfy {}",
                            dep,
                            match &descriptor.origin {
                                crate::packages::PackageOrigin::Repository(name) => name.as_str(),
                                _ => "?",
                            },
                            batch[i].name
                        );
                        batch.push(descriptor);
                        sort_required = true;
                    }
                    None => {
                        warn!("package {} is missing dependency {}", batch[i].name, dep);
                        problems.missing.push(MissingDependency {
                            package: batch[i].name.clone(),
                            dependency: dep,
                        });
                    }
                }
            }
            i += 1;
        }

        // Owned-file clash check, in batch order. A clashing package's
        // files are not added to the claim set, so later packages clash
        // against the original claimant, not the rejected one.
        let mut claimed: HashMap<String, String> = HashMap::new();
        for package in &batch[..requested_len] {
            let mut clashed = false;
            for file in &package.owned_files {
                if let Some(owner) = claimed.get(file) {
                    warn!(
                        "package {} has file clashes with package {}: {}",
                        package.name, owner, file
                    );
                    problems.clashes.push(FileClash {
                        first: owner.clone(),
                        second: package.name.clone(),
                        path: file.clone(),
                    });
                    clashed = true;
                }
            }
            if !clashed {
                for file in &package.owned_files {
                    claimed.insert(file.clone(), package.name.clone());
                }
            }
        }

        if !problems.is_empty() {
            return Err(Error::Resolution(problems));
        }

        if sort_required {
            debug!("sorting dependencies");
            batch = sort_batch(batch);
        }
        Ok(batch)
    }
}

/// Topological sort: iterative post-order over the dependency edges, using
/// an index arena and a visited set. Children (dependencies) are emitted
/// before their parents, dependency names outside the batch are skipped,
/// and the visited set makes the traversal terminate on any cycle. Stable
/// for acyclic inputs: packages are taken in batch order.
fn sort_batch(batch: Vec<PackageDescriptor>) -> Vec<PackageDescriptor> {
    let index_of: HashMap<String, usize> = batch
        .iter()
        .enumerate()
        .map(|(i, p)| (p.name.clone(), i))
        .collect();

    let mut visited = vec![false; batch.len()];
    let mut order = Vec::with_capacity(batch.len());

    for start in 0..batch.len() {
        if visited[start] {
            continue;
        }
        visited[start] = true;
        // (package index, position of the next dependency to visit)
        let mut stack: Vec<(usize, usize)> = vec![(start, 0)];
        while let Some(frame) = stack.last_mut() {
            let (node, next_dep) = *frame;
            frame.1 += 1;
            if next_dep < batch[node].dependencies.len() {
                if let Some(&dep_index) = index_of.get(&batch[node].dependencies[next_dep]) {
                    if !visited[dep_index] {
                        visited[dep_index] = true;
                        stack.push((dep_index, 0));
                    }
                }
            } else {
                stack.pop();
                order.push(node);
            }
        }
    }

    let mut slots: Vec<Option<PackageDescriptor>> = batch.into_iter().map(Some).collect();
    order
        .into_iter()
        .filter_map(|i| slots[i].take())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packages::PackageOrigin;
    use crate::repository::{Repository, RepositoryEngine};
    use std::path::{Path, PathBuf};

    fn descriptor(name: &str, deps: &[&str], owned: &[&str]) -> PackageDescriptor {
        PackageDescriptor {
            name: name.to_string(),
            version: "1.0".to_string(),
            dependencies: deps.iter().map(|s| s.to_string()).collect(),
            owned_files: owned.iter().map(|s| s.to_string()).collect(),
            origin: PackageOrigin::ArchiveFile(PathBuf::from(format!("{}.tar", name))),
            installed_size: 0,
            archive_size: 0,
        }
    }

    fn empty_index() -> InstalledIndex {
        InstalledIndex::load(Path::new("/nonexistent/fresh-root"))
    }

    struct FakeRepo {
        packages: Vec<(String, Vec<String>)>,
    }

    impl FakeRepo {
        fn new(packages: &[(&str, &[&str])]) -> Self {
            Self {
                packages: packages
                    .iter()
                    .map(|(n, deps)| {
                        (
                            n.to_string(),
                            deps.iter().map(|d| d.to_string()).collect(),
                        )
                    })
                    .collect(),
            }
        }
    }

    impl Repository for FakeRepo {
        fn name(&self) -> &str {
            "fake"
        }
        fn good(&self) -> bool {
            true
        }
        fn is_available(&self, package: &str) -> bool {
            self.packages.iter().any(|(n, _)| n == package)
        }
        fn version(&self, _package: &str) -> Option<String> {
            Some("9.9".to_string())
        }
        fn dependencies(&self, package: &str) -> Vec<String> {
            self.packages
                .iter()
                .find(|(n, _)| n == package)
                .map(|(_, deps)| deps.clone())
                .unwrap_or_default()
        }
        fn installed_size(&self, _package: &str) -> u64 {
            0
        }
        fn file_size(&self, _package: &str) -> u64 {
            0
        }
        fn prepare_package(&self, _package: &str) -> bool {
            true
        }
        fn payload_path(&self, _package: &str) -> Option<PathBuf> {
            None
        }
    }

    fn engine_with(packages: &[(&str, &[&str])]) -> RepositoryEngine {
        let mut engine = RepositoryEngine::new();
        engine.register(Box::new(FakeRepo::new(packages)));
        engine
    }

    fn names(batch: &[PackageDescriptor]) -> Vec<&str> {
        batch.iter().map(|p| p.name.as_str()).collect()
    }

    #[test]
    fn test_no_dependencies_batch_unchanged() {
        let index = empty_index();
        let repos = RepositoryEngine::new();
        let resolver = Resolver::new(&index, &repos);

        let batch = vec![
            descriptor("a", &[], &["/usr/bin/a"]),
            descriptor("b", &[], &["/usr/bin/b"]),
        ];
        let resolved = resolver.resolve(batch).unwrap();
        assert_eq!(names(&resolved), vec!["a", "b"]);
    }

    #[test]
    fn test_topological_order() {
        let index = empty_index();
        let repos = RepositoryEngine::new();
        let resolver = Resolver::new(&index, &repos);

        // app depends on lib, listed app-first
        let batch = vec![
            descriptor("app", &["lib"], &["/usr/bin/app"]),
            descriptor("lib", &[], &["/usr/lib/lib.so"]),
        ];
        let resolved = resolver.resolve(batch).unwrap();
        assert_eq!(names(&resolved), vec!["lib", "app"]);
    }

    #[test]
    fn test_chain_order() {
        let index = empty_index();
        let repos = RepositoryEngine::new();
        let resolver = Resolver::new(&index, &repos);

        let batch = vec![
            descriptor("top", &["mid"], &[]),
            descriptor("mid", &["base"], &[]),
            descriptor("base", &[], &[]),
        ];
        let resolved = resolver.resolve(batch).unwrap();
        assert_eq!(names(&resolved), vec!["base", "mid", "top"]);
    }

    #[test]
    fn test_installed_dependency_is_satisfied() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join(crate::PACKAGE_DB_DIR).join("lib");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("manifest"), "PACKAGE=lib\nVERSION=1\n").unwrap();
        let index = InstalledIndex::load(root.path());
        let repos = RepositoryEngine::new();
        let resolver = Resolver::new(&index, &repos);

        let batch = vec![descriptor("app", &["lib"], &[])];
        let resolved = resolver.resolve(batch).unwrap();
        assert_eq!(names(&resolved), vec!["app"]);
    }

    #[test]
    fn test_missing_dependency_fails_and_reports() {
        let index = empty_index();
        let repos = RepositoryEngine::new();
        let resolver = Resolver::new(&index, &repos);

        let batch = vec![descriptor("app", &["ghost"], &[])];
        let err = resolver.resolve(batch).unwrap_err();
        match err {
            Error::Resolution(failure) => {
                assert_eq!(
                    failure.missing,
                    vec![MissingDependency {
                        package: "app".to_string(),
                        dependency: "ghost".to_string(),
                    }]
                );
            }
            other => panic!("expected resolution failure, got {:?}", other),
        }
    }

    #[test]
    fn test_all_missing_dependencies_collected() {
        let index = empty_index();
        let repos = RepositoryEngine::new();
        let resolver = Resolver::new(&index, &repos);

        let batch = vec![
            descriptor("a", &["ghost1"], &[]),
            descriptor("b", &["ghost2"], &[]),
        ];
        let err = resolver.resolve(batch).unwrap_err();
        match err {
            Error::Resolution(failure) => assert_eq!(failure.missing.len(), 2),
            other => panic!("expected resolution failure, got {:?}", other),
        }
    }

    #[test]
    fn test_pair_cycle_is_broken_not_fatal() {
        let index = empty_index();
        let repos = RepositoryEngine::new();
        let resolver = Resolver::new(&index, &repos);

        let batch = vec![
            descriptor("a", &["b"], &[]),
            descriptor("b", &["a"], &[]),
        ];
        let resolved = resolver.resolve(batch).unwrap();
        let mut sorted_names = names(&resolved);
        assert_eq!(resolved.len(), 2);
        sorted_names.sort();
        assert_eq!(sorted_names, vec!["a", "b"]);
    }

    #[test]
    fn test_longer_cycle_terminates() {
        let index = empty_index();
        let repos = RepositoryEngine::new();
        let resolver = Resolver::new(&index, &repos);

        let batch = vec![
            descriptor("a", &["b"], &[]),
            descriptor("b", &["c"], &[]),
            descriptor("c", &["a"], &[]),
        ];
        let resolved = resolver.resolve(batch).unwrap();
        assert_eq!(resolved.len(), 3);
    }

    #[test]
    fn test_repository_expansion() {
        let index = empty_index();
        let repos = engine_with(&[("lib", &[])]);
        let resolver = Resolver::new(&index, &repos);

        let batch = vec![descriptor("app", &["lib"], &[])];
        let resolved = resolver.resolve(batch).unwrap();
        assert_eq!(names(&resolved), vec!["lib", "app"]);
        assert_eq!(
            resolved[0].origin,
            PackageOrigin::Repository("fake".to_string())
        );
    }

    #[test]
    fn test_transitive_repository_expansion() {
        let index = empty_index();
        // lib itself depends on base, also only in the repository
        let repos = engine_with(&[("lib", &["base"]), ("base", &[])]);
        let resolver = Resolver::new(&index, &repos);

        let batch = vec![descriptor("app", &["lib"], &[])];
        let resolved = resolver.resolve(batch).unwrap();
        assert_eq!(resolved.len(), 3);
        let position = |n: &str| names(&resolved).iter().position(|x| *x == n).unwrap();
        assert!(position("base") < position("lib"));
        assert!(position("lib") < position("app"));
    }

    #[test]
    fn test_file_clash_fails_with_first_claim_retained() {
        let index = empty_index();
        let repos = RepositoryEngine::new();
        let resolver = Resolver::new(&index, &repos);

        let batch = vec![
            descriptor("a", &[], &["/etc/conf"]),
            descriptor("b", &[], &["/etc/conf", "/usr/bin/b"]),
            // c clashes against a (the retained claimant), not b
            descriptor("c", &[], &["/usr/bin/b", "/etc/conf"]),
        ];
        let err = resolver.resolve(batch).unwrap_err();
        match err {
            Error::Resolution(failure) => {
                assert_eq!(
                    failure.clashes,
                    vec![
                        FileClash {
                            first: "a".to_string(),
                            second: "b".to_string(),
                            path: "/etc/conf".to_string(),
                        },
                        FileClash {
                            first: "a".to_string(),
                            second: "c".to_string(),
                            path: "/etc/conf".to_string(),
                        },
                    ]
                );
            }
            other => panic!("expected resolution failure, got {:?}", other),
        }
    }

    #[test]
    fn test_sort_stable_without_reorder_trigger() {
        let index = empty_index();
        let repos = RepositoryEngine::new();
        let resolver = Resolver::new(&index, &repos);

        let batch = vec![
            descriptor("z", &[], &[]),
            descriptor("m", &[], &[]),
            descriptor("a", &[], &[]),
        ];
        let resolved = resolver.resolve(batch).unwrap();
        assert_eq!(names(&resolved), vec!["z", "m", "a"]);
    }
}
