// src/repository/local.rs

//! Local folder repository
//!
//! Layout under the repository root:
//!
//! ```text
//! repo.manifest                    required for the repository to be usable
//! manifests/<name>/manifest       key=value package metadata
//! packages/<name>/<archive file>  package payloads
//! ```
//!
//! A package is available iff its metadata record exists. Only the newest
//! version of a package is retained; adding a package replaces any existing
//! entry for the same declared name.

use crate::config::ConfigFile;
use crate::error::{Error, Result};
use crate::packages::PackageFile;
use crate::repository::Repository;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

const DEFAULT_NAME: &str = "local-folder-repo";

pub struct LocalFolderRepository {
    name: String,
    root: PathBuf,
    good: bool,
}

impl LocalFolderRepository {
    /// Open a repository rooted at `path`. The repository is unusable
    /// (`good() == false`) when `repo.manifest` is missing; a `NAME` key in
    /// that manifest overrides the display name.
    pub fn open(path: &Path) -> Self {
        let root = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        debug!("repo path: {}", root.display());

        let repo_manifest_path = root.join("repo.manifest");
        if !repo_manifest_path.exists() {
            error!(
                "error reading local folder repository {}: missing manifest file",
                root.display()
            );
            return Self {
                name: DEFAULT_NAME.to_string(),
                root,
                good: false,
            };
        }

        let repo_manifest = ConfigFile::read(&repo_manifest_path);
        let name = repo_manifest
            .get("NAME")
            .unwrap_or(DEFAULT_NAME)
            .to_string();

        Self {
            name,
            root,
            good: true,
        }
    }

    fn manifest_dir(&self, package: &str) -> PathBuf {
        self.root.join("manifests").join(package)
    }

    fn payload_dir(&self, package: &str) -> PathBuf {
        self.root.join("packages").join(package)
    }

    fn package_manifest(&self, package: &str) -> ConfigFile {
        ConfigFile::read(&self.manifest_dir(package).join("manifest"))
    }

    fn size_field(&self, package: &str, key: &str) -> u64 {
        if !self.good || !self.is_available(package) {
            return 0;
        }
        self.package_manifest(package)
            .get(key)
            .and_then(|value| value.parse().ok())
            .unwrap_or(0)
    }
}

impl Repository for LocalFolderRepository {
    fn name(&self) -> &str {
        &self.name
    }

    fn good(&self) -> bool {
        self.good
    }

    fn is_available(&self, package: &str) -> bool {
        self.good && self.manifest_dir(package).join("manifest").exists()
    }

    fn version(&self, package: &str) -> Option<String> {
        if !self.good || !self.is_available(package) {
            return None;
        }
        self.package_manifest(package)
            .get("NEWEST_VERSION")
            .map(str::to_string)
    }

    fn dependencies(&self, package: &str) -> Vec<String> {
        if !self.good || !self.is_available(package) {
            return Vec::new();
        }
        self.package_manifest(package).get_list("DEPENDENCIES")
    }

    fn installed_size(&self, package: &str) -> u64 {
        self.size_field(package, "INSTALLED_SIZE")
    }

    fn file_size(&self, package: &str) -> u64 {
        self.size_field(package, "FILE_SIZE")
    }

    /// Payloads are already local files; nothing to fetch.
    fn prepare_package(&self, package: &str) -> bool {
        self.good && self.is_available(package)
    }

    fn payload_path(&self, package: &str) -> Option<PathBuf> {
        if !self.good || !self.is_available(package) {
            return None;
        }
        let manifest = self.package_manifest(package);
        let version = manifest.get("NEWEST_VERSION")?;
        let filename = manifest.get(&format!("FILENAME_{}", version))?;
        Some(self.payload_dir(package).join(filename))
    }

    fn add_package_file(&self, package_file: &Path) -> Result<()> {
        if !self.good {
            return Err(Error::Repository(format!(
                "repository {} is not usable",
                self.name
            )));
        }

        // The archive's declared name keys the entry, not the file name the
        // caller happened to supply.
        let file = PackageFile::read(package_file)?;

        if self.is_available(&file.name) {
            debug!("removing old package files for {} first", file.name);
            self.remove_package(&file.name);
        }

        let manifest_dir = self.manifest_dir(&file.name);
        let payload_dir = self.payload_dir(&file.name);
        std::fs::create_dir_all(&manifest_dir)?;
        std::fs::create_dir_all(&payload_dir)?;

        let archive_filename = package_file
            .file_name()
            .ok_or_else(|| {
                Error::Repository(format!(
                    "package file path {} has no file name",
                    package_file.display()
                ))
            })?
            .to_string_lossy()
            .into_owned();

        let dependencies = file.dependencies.join(",");
        let record = ConfigFile::from_pairs([
            ("NAME".to_string(), file.name.clone()),
            ("NEWEST_VERSION".to_string(), file.version.clone()),
            (
                "INSTALLED_SIZE".to_string(),
                file.installed_size.to_string(),
            ),
            ("FILE_SIZE".to_string(), file.archive_size.to_string()),
            ("ARCH".to_string(), "any".to_string()),
            ("DEPENDENCIES".to_string(), dependencies),
            (
                format!("FILENAME_{}", file.version),
                archive_filename.clone(),
            ),
        ]);
        std::fs::write(manifest_dir.join("manifest"), record.to_text())?;

        let destination = payload_dir.join(&archive_filename);
        info!("copying package file to {}", destination.display());
        if destination.exists() {
            std::fs::remove_file(&destination)?;
        }
        std::fs::copy(package_file, &destination)?;

        Ok(())
    }

    fn remove_package(&self, package: &str) -> bool {
        if !self.good || !self.is_available(package) {
            return false;
        }

        for dir in [self.manifest_dir(package), self.payload_dir(package)] {
            if dir.exists() {
                let result = if dir.is_dir() {
                    std::fs::remove_dir_all(&dir)
                } else {
                    std::fs::remove_file(&dir)
                };
                if let Err(e) = result {
                    error!("failed to remove {}: {}", dir.display(), e);
                }
            }
        }

        true
    }
}
