// src/index/mod.rs

//! Installed-state index
//!
//! One scan of `etc/parcel/packages` under the install root at construction
//! builds the name -> version map every other component consults. Derived
//! per-package data (parsed manifest, owned-file list) is loaded lazily and
//! memoized for the lifetime of the index. There is no cache invalidation:
//! the tool is a short-lived process and the install root is assumed to
//! have a single writer.

use crate::config::ConfigFile;
use crate::PACKAGE_DB_DIR;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// In-memory view of which packages are installed under one install root.
#[derive(Debug)]
pub struct InstalledIndex {
    install_root: PathBuf,
    packages: BTreeMap<String, String>,
    manifests: HashMap<String, ConfigFile>,
    owned_files: HashMap<String, Vec<String>>,
}

impl InstalledIndex {
    /// Scan the install root's package-record directory. Unreadable or
    /// corrupt manifests are logged and skipped; a missing directory yields
    /// an empty index (fresh install root). This never fails as a whole.
    pub fn load(install_root: &Path) -> Self {
        let mut index = Self {
            install_root: install_root.to_path_buf(),
            packages: BTreeMap::new(),
            manifests: HashMap::new(),
            owned_files: HashMap::new(),
        };

        let db_dir = index.package_db_dir();
        let entries = match std::fs::read_dir(&db_dir) {
            Ok(entries) => entries,
            Err(_) => {
                debug!(
                    "no package records at {}; treating as empty install root",
                    db_dir.display()
                );
                return index;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let manifest_path = path.join("manifest");
            let manifest = ConfigFile::read(&manifest_path);
            if !manifest.ok() {
                warn!("couldnt open manifest file {}", manifest_path.display());
                continue;
            }
            let Some(name) = manifest.get("PACKAGE") else {
                warn!(
                    "package folder {} has corrupted manifest: no package name",
                    manifest_path.display()
                );
                continue;
            };
            let version = manifest.get("VERSION").unwrap_or_default();
            debug!("installed package: {}, version: {}", name, version);
            index
                .packages
                .insert(name.to_string(), version.to_string());
        }

        info!("{} installed packages", index.packages.len());
        index
    }

    pub fn install_root(&self) -> &Path {
        &self.install_root
    }

    fn package_db_dir(&self) -> PathBuf {
        self.install_root.join(PACKAGE_DB_DIR)
    }

    fn package_dir(&self, name: &str) -> PathBuf {
        self.package_db_dir().join(name)
    }

    pub fn is_installed(&self, name: &str) -> bool {
        self.packages.contains_key(name)
    }

    /// Installed version, empty string when the package is unversioned.
    pub fn version_of(&self, name: &str) -> Option<&str> {
        self.packages.get(name).map(String::as_str)
    }

    /// All installed packages, name -> version, in name order.
    pub fn packages(&self) -> &BTreeMap<String, String> {
        &self.packages
    }

    /// Parsed installed manifest for a package, cached. A package without a
    /// record yields a failed config; check [`ConfigFile::ok`].
    pub fn manifest(&mut self, name: &str) -> ConfigFile {
        if let Some(cached) = self.manifests.get(name) {
            return cached.clone();
        }
        let config = ConfigFile::read(&self.package_dir(name).join("manifest"));
        self.manifests.insert(name.to_string(), config.clone());
        config
    }

    /// Paths a package declared it owns, cached. Missing record yields an
    /// empty list.
    pub fn owned_files(&mut self, name: &str) -> Vec<String> {
        if let Some(cached) = self.owned_files.get(name) {
            return cached.clone();
        }
        let path = self.package_dir(name).join("owned-files");
        let lines = match std::fs::read_to_string(&path) {
            Ok(content) => content
                .lines()
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect(),
            Err(_) => Vec::new(),
        };
        self.owned_files.insert(name.to_string(), lines.clone());
        lines
    }

    /// Installed packages whose manifest lists `name` as a dependency.
    /// Scans every installed manifest; acceptable at expected install-base
    /// sizes.
    pub fn dependents(&mut self, name: &str) -> Vec<String> {
        let installed: Vec<String> = self.packages.keys().cloned().collect();
        let mut dependents = Vec::new();
        for candidate in installed {
            let manifest = self.manifest(&candidate);
            if manifest
                .get_list("DEPENDENCY")
                .iter()
                .any(|dep| dep == name)
            {
                dependents.push(candidate);
            }
        }
        dependents
    }

    /// Total on-disk size of a package's owned files. Symbolic links are
    /// skipped; a failed size lookup is reported and that file's
    /// contribution omitted.
    pub fn disk_size(&mut self, name: &str) -> u64 {
        let mut size = 0u64;
        for file in self.owned_files(name) {
            let path = self
                .install_root
                .join(file.trim_start_matches('/'));
            match std::fs::symlink_metadata(&path) {
                Ok(metadata) => {
                    if !metadata.file_type().is_symlink() {
                        size += metadata.len();
                    }
                }
                Err(e) => {
                    warn!("error getting size of file {}: {}", path.display(), e);
                }
            }
        }
        size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record_package(root: &Path, name: &str, manifest: &str, owned: Option<&str>) {
        let dir = root.join(PACKAGE_DB_DIR).join(name);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("manifest"), manifest).unwrap();
        if let Some(owned) = owned {
            std::fs::write(dir.join("owned-files"), owned).unwrap();
        }
    }

    #[test]
    fn test_load_empty_root() {
        let root = tempfile::tempdir().unwrap();
        let index = InstalledIndex::load(root.path());
        assert!(index.packages().is_empty());
        assert!(!index.is_installed("anything"));
    }

    #[test]
    fn test_load_installed_packages() {
        let root = tempfile::tempdir().unwrap();
        record_package(root.path(), "hello", "PACKAGE=hello\nVERSION=1.0\n", None);
        record_package(root.path(), "nover", "PACKAGE=nover\n", None);

        let index = InstalledIndex::load(root.path());
        assert_eq!(index.version_of("hello"), Some("1.0"));
        assert_eq!(index.version_of("nover"), Some(""));
        assert!(index.is_installed("hello"));
        assert!(!index.is_installed("absent"));
    }

    #[test]
    fn test_corrupt_manifest_skipped() {
        let root = tempfile::tempdir().unwrap();
        record_package(root.path(), "good", "PACKAGE=good\nVERSION=2\n", None);
        // No PACKAGE key: the folder is skipped, not fatal
        record_package(root.path(), "bad", "VERSION=1\n", None);

        let index = InstalledIndex::load(root.path());
        assert_eq!(index.packages().len(), 1);
        assert!(index.is_installed("good"));
    }

    #[test]
    fn test_owned_files_and_missing_record() {
        let root = tempfile::tempdir().unwrap();
        record_package(
            root.path(),
            "tool",
            "PACKAGE=tool\nVERSION=1\n",
            Some("/usr/bin/tool\n/etc/tool.conf\n"),
        );

        let mut index = InstalledIndex::load(root.path());
        assert_eq!(
            index.owned_files("tool"),
            vec!["/usr/bin/tool", "/etc/tool.conf"]
        );
        assert!(index.owned_files("ghost").is_empty());
        // Cached second call
        assert_eq!(index.owned_files("tool").len(), 2);
    }

    #[test]
    fn test_dependents_reverse_lookup() {
        let root = tempfile::tempdir().unwrap();
        record_package(root.path(), "libc", "PACKAGE=libc\nVERSION=1\n", None);
        record_package(
            root.path(),
            "app",
            "PACKAGE=app\nVERSION=1\nDEPENDENCY=libc\n",
            None,
        );
        record_package(
            root.path(),
            "tool",
            "PACKAGE=tool\nVERSION=1\nDEPENDENCY=libc,app\n",
            None,
        );

        let mut index = InstalledIndex::load(root.path());
        let mut dependents = index.dependents("libc");
        dependents.sort();
        assert_eq!(dependents, vec!["app", "tool"]);
        assert_eq!(index.dependents("app"), vec!["tool"]);
        assert!(index.dependents("tool").is_empty());
    }

    #[test]
    fn test_disk_size_skips_symlinks_and_missing() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("usr/bin")).unwrap();
        std::fs::write(root.path().join("usr/bin/tool"), b"12345678").unwrap();
        std::os::unix::fs::symlink(
            root.path().join("usr/bin/tool"),
            root.path().join("usr/bin/tool-link"),
        )
        .unwrap();
        record_package(
            root.path(),
            "tool",
            "PACKAGE=tool\nVERSION=1\n",
            Some("/usr/bin/tool\n/usr/bin/tool-link\n/usr/bin/gone\n"),
        );

        let mut index = InstalledIndex::load(root.path());
        assert_eq!(index.disk_size("tool"), 8);
    }

    #[test]
    fn test_manifest_cache_returns_failed_for_missing() {
        let root = tempfile::tempdir().unwrap();
        let mut index = InstalledIndex::load(root.path());
        assert!(!index.manifest("ghost").ok());
    }
}
