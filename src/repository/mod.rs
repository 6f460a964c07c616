// src/repository/mod.rs

//! Package repositories
//!
//! A repository is a named source that can answer "do you have package X"
//! and produce its payload on demand. Concrete sources implement the
//! [`Repository`] trait; the [`RepositoryEngine`] composite holds them in
//! registration order and resolves every query against the first source
//! that carries the package. Metadata is never merged across sources.

pub mod local;

pub use local::LocalFolderRepository;

use crate::config::ConfigFile;
use crate::error::{Error, Result};
use crate::packages::{PackageDescriptor, PackageOrigin};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Configuration keys with this prefix name repository paths. The suffix is
/// only for humans; the repository's own manifest names it.
pub const REPOSITORY_KEY_PREFIX: &str = "REPOSITORY_";

/// Common interface for all repository kinds (local folder, future network).
///
/// `prepare_package` must succeed before `payload_path` is consulted; for
/// the local-folder variant it is a no-op, a network variant would fetch
/// here. Write operations default to refusing, the contract for sources
/// that cannot accept uploads.
pub trait Repository {
    /// Display name of this repository.
    fn name(&self) -> &str;

    /// Whether the repository itself is usable (not corrupt or unreachable).
    fn good(&self) -> bool;

    /// Whether this repository can provide the named package.
    fn is_available(&self, package: &str) -> bool;

    /// Newest version of the named package, if available.
    fn version(&self, package: &str) -> Option<String>;

    /// Declared dependencies of the named package.
    fn dependencies(&self, package: &str) -> Vec<String>;

    /// Decompressed size of the named package's contents.
    fn installed_size(&self, package: &str) -> u64;

    /// Size of the named package's archive file.
    fn file_size(&self, package: &str) -> u64;

    /// Make the payload available locally. Must be called before
    /// [`Repository::payload_path`].
    fn prepare_package(&self, package: &str) -> bool;

    /// Absolute path to the prepared package archive.
    fn payload_path(&self, package: &str) -> Option<PathBuf>;

    /// Add a package archive to the repository. Sources that cannot accept
    /// uploads keep this default.
    fn add_package_file(&self, _package_file: &Path) -> Result<()> {
        Err(Error::Repository(format!(
            "repository {} does not accept package uploads",
            self.name()
        )))
    }

    /// Remove a package from the repository. Returns false when the package
    /// was not present or the source is read-only; never panics.
    fn remove_package(&self, _package: &str) -> bool {
        false
    }
}

/// Ordered collection of repositories; first match wins.
#[derive(Default)]
pub struct RepositoryEngine {
    repositories: Vec<Box<dyn Repository>>,
}

impl RepositoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the engine from global configuration: every `REPOSITORY_*`
    /// value is a local folder path. Repositories that fail to open are
    /// logged and skipped.
    pub fn from_config(config: &ConfigFile) -> Self {
        let mut engine = Self::new();
        for (key, path) in config_repository_entries(config) {
            let repo = LocalFolderRepository::open(Path::new(&path));
            if !repo.good() {
                warn!("skipping unusable repository {} at {}", key, path);
                continue;
            }
            info!("registered repository {} at {}", repo.name(), path);
            engine.register(Box::new(repo));
        }
        engine
    }

    pub fn register(&mut self, repository: Box<dyn Repository>) {
        self.repositories.push(repository);
    }

    pub fn is_empty(&self) -> bool {
        self.repositories.is_empty()
    }

    /// First repository, in registration order, carrying the package.
    fn find(&self, package: &str) -> Option<&dyn Repository> {
        self.repositories
            .iter()
            .find(|repo| repo.is_available(package))
            .map(|repo| repo.as_ref())
    }

    pub fn is_available(&self, package: &str) -> bool {
        self.find(package).is_some()
    }

    pub fn version(&self, package: &str) -> Option<String> {
        self.find(package)?.version(package)
    }

    pub fn dependencies(&self, package: &str) -> Vec<String> {
        self.find(package)
            .map(|repo| repo.dependencies(package))
            .unwrap_or_default()
    }

    pub fn installed_size(&self, package: &str) -> u64 {
        self.find(package)
            .map(|repo| repo.installed_size(package))
            .unwrap_or(0)
    }

    pub fn file_size(&self, package: &str) -> u64 {
        self.find(package)
            .map(|repo| repo.file_size(package))
            .unwrap_or(0)
    }

    pub fn prepare_package(&self, package: &str) -> bool {
        match self.find(package) {
            Some(repo) => repo.prepare_package(package),
            None => false,
        }
    }

    pub fn payload_path(&self, package: &str) -> Option<PathBuf> {
        self.find(package)?.payload_path(package)
    }

    /// Assemble a resolver descriptor from repository metadata. The owned
    /// file list is unknown until the payload is read, so it stays empty.
    pub fn package_data(&self, package: &str) -> Option<PackageDescriptor> {
        let repo = self.find(package)?;
        Some(PackageDescriptor {
            name: package.to_string(),
            version: repo.version(package).unwrap_or_default(),
            dependencies: repo.dependencies(package),
            owned_files: Vec::new(),
            origin: PackageOrigin::Repository(repo.name().to_string()),
            installed_size: repo.installed_size(package),
            archive_size: repo.file_size(package),
        })
    }
}

fn config_repository_entries(config: &ConfigFile) -> Vec<(String, String)> {
    config
        .iter()
        .filter(|(key, _)| key.starts_with(REPOSITORY_KEY_PREFIX))
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}
