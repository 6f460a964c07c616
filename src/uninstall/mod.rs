// src/uninstall/mod.rs

//! Uninstall transaction engine
//!
//! Staging a package first stages every installed package that depends on
//! it (the reverse closure), so nothing is removed out from under a
//! dependent unless that dependent goes too. Execution is best-effort:
//! individual file removals that fail are reported and the batch keeps
//! going. The remaining installed set is not re-validated afterwards.

use crate::error::{Error, Result};
use crate::index::InstalledIndex;
use crate::PACKAGE_DB_DIR;
use indicatif::HumanBytes;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

pub struct UninstallEngine {
    install_root: PathBuf,
    index: InstalledIndex,
    /// Staged packages with their owned files, in name order.
    list: BTreeMap<String, Vec<String>>,
}

impl UninstallEngine {
    pub fn new(install_root: &Path) -> Self {
        Self {
            install_root: install_root.to_path_buf(),
            index: InstalledIndex::load(install_root),
            list: BTreeMap::new(),
        }
    }

    pub fn index(&self) -> &InstalledIndex {
        &self.index
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    /// Names currently staged for removal.
    pub fn staged(&self) -> Vec<&str> {
        self.list.keys().map(String::as_str).collect()
    }

    /// Stage a package and, before it, every installed package that lists
    /// it as a dependency. Re-staging is a no-op success. Fails when the
    /// package has no installed record or an empty owned-files list, or
    /// when any dependent fails to stage.
    pub fn add_to_list(&mut self, name: &str) -> Result<()> {
        if self.list.contains_key(name) {
            return Ok(());
        }

        let manifest = self.index.manifest(name);
        if !manifest.ok() {
            warn!("no package called {} found", name);
            return Err(Error::PackageNotFound(name.to_string()));
        }

        let owned_files = self.index.owned_files(name);
        if owned_files.is_empty() {
            warn!("package {} has no files", name);
            return Err(Error::NoOwnedFiles(name.to_string()));
        }

        for dependent in self.index.dependents(name) {
            debug!("trying to add {} to list", dependent);
            if let Err(e) = self.add_to_list(&dependent) {
                error!(
                    "failed to add depended package {} (package {}) to uninstall list",
                    dependent, name
                );
                return Err(e);
            }
        }

        self.list.insert(name.to_string(), owned_files);
        Ok(())
    }

    /// Human-readable listing of the staged packages with on-disk sizes.
    pub fn removal_summary(&mut self) -> String {
        let names: Vec<String> = self.list.keys().cloned().collect();
        let mut out = String::from("The following packages will be uninstalled:\n");
        let mut total = 0u64;
        for name in names {
            let size = self.index.disk_size(&name);
            total += size;
            let _ = writeln!(out, "\t{} (size: {})", name, HumanBytes(size));
        }
        let _ = write!(out, "Total size of packages: {}", HumanBytes(total));
        out
    }

    /// Print the staged packages and ask for an explicit yes.
    pub fn request_permission(&mut self, input: &mut dyn BufRead) -> Result<bool> {
        if self.list.is_empty() {
            return Ok(false);
        }
        println!("{}", self.removal_summary());
        println!("Are you sure? [y/N] ");
        let mut response = String::new();
        input.read_line(&mut response)?;
        Ok(matches!(response.trim(), "y" | "Y"))
    }

    /// Remove every staged package's owned files and record directory.
    /// Each removal is best-effort; failures are reported per item.
    pub fn execute(&mut self) -> Result<()> {
        for (name, files) in &self.list {
            info!("operating on {}", name);
            for file in files {
                let path = self.install_root.join(file.trim_start_matches('/'));
                if let Err(e) = std::fs::remove_file(&path) {
                    warn!("failed to remove file {}: {}", path.display(), e);
                }
            }

            let record_dir = self.install_root.join(PACKAGE_DB_DIR).join(name);
            if let Err(e) = std::fs::remove_dir_all(&record_dir) {
                warn!(
                    "failed to remove package folder {}: {}",
                    record_dir.display(),
                    e
                );
            }
            info!("done operating on {}", name);
        }
        self.list.clear();
        Ok(())
    }
}
