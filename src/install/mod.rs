// src/install/mod.rs

//! Install transaction engine
//!
//! Linear state machine with no backward transitions:
//!
//! ```text
//! empty -> populated -> verified -> confirmed -> executed
//! ```
//!
//! Packages are staged from archive files (read in full immediately) or by
//! name (deferred to repository resolution). All validation (dependency
//! resolution, file clashes, pre-existing targets, free space) happens
//! strictly before the first filesystem mutation. Once extraction starts,
//! per-package failures are reported and the batch continues; there is no
//! rollback of files already written.

pub mod hooks;

pub use hooks::{ChrootHookRunner, HookRunner};

use crate::error::{Error, Result};
use crate::index::InstalledIndex;
use crate::packages::{classify, EntryKind, PackageArchive, PackageDescriptor, PackageFile, PackageOrigin};
use crate::repository::RepositoryEngine;
use crate::resolver::Resolver;
use crate::PACKAGE_DB_DIR;
use indicatif::HumanBytes;
use std::fmt::Write as _;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// What staging a package actually did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// The package was added to the pending batch.
    Added,
    /// Same version already installed; nothing staged, not an error.
    AlreadyInstalled,
}

pub struct InstallEngine {
    install_root: PathBuf,
    index: InstalledIndex,
    /// File-backed packages, in the order the operator supplied them.
    files: Vec<PackageFile>,
    /// Name-backed packages awaiting repository resolution.
    requested_names: Vec<String>,
    /// Resolver output, set by [`InstallEngine::verify_possible`].
    batch: Vec<PackageDescriptor>,
    verified: bool,
}

impl InstallEngine {
    pub fn new(install_root: &Path) -> Self {
        Self {
            install_root: install_root.to_path_buf(),
            index: InstalledIndex::load(install_root),
            files: Vec::new(),
            requested_names: Vec::new(),
            batch: Vec::new(),
            verified: false,
        }
    }

    pub fn index(&self) -> &InstalledIndex {
        &self.index
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.requested_names.is_empty()
    }

    fn package_file(&self, name: &str) -> Option<&PackageFile> {
        self.files.iter().find(|file| file.name == name)
    }

    fn is_staged(&self, name: &str) -> bool {
        self.package_file(name).is_some() || self.requested_names.iter().any(|n| n == name)
    }

    /// Stage a package from an archive file. The archive is read in full;
    /// an unreadable archive or a manifest without a package name is a hard
    /// error. Re-installing the same version is a no-op success.
    pub fn add_package_file(&mut self, path: &Path) -> Result<AddOutcome> {
        debug!("adding package {} to install list", path.display());
        let file = PackageFile::read(path)?;

        if let Some(installed) = self.index.version_of(&file.name) {
            // An empty installed version means "unversioned"; those never
            // skip, matching the record format's semantics.
            if !installed.is_empty() && installed == file.version {
                info!(
                    "package {} of same version is already installed, skipping",
                    file.name
                );
                return Ok(AddOutcome::AlreadyInstalled);
            }
        }

        if self.is_staged(&file.name) {
            return Err(Error::DuplicateInBatch(file.name));
        }

        self.files.push(file);
        self.verified = false;
        Ok(AddOutcome::Added)
    }

    /// Stage a package by name, to be resolved from the configured
    /// repositories. A name no repository carries is a hard error.
    pub fn add_package_name(&mut self, name: &str, repos: &RepositoryEngine) -> Result<AddOutcome> {
        if !repos.is_available(name) {
            return Err(Error::PackageNotFound(name.to_string()));
        }

        if let Some(installed) = self.index.version_of(name) {
            if !installed.is_empty() && Some(installed) == repos.version(name).as_deref() {
                info!(
                    "package {} of same version is already installed, skipping",
                    name
                );
                return Ok(AddOutcome::AlreadyInstalled);
            }
        }

        if self.is_staged(name) {
            return Err(Error::DuplicateInBatch(name.to_string()));
        }

        self.requested_names.push(name.to_string());
        self.verified = false;
        Ok(AddOutcome::Added)
    }

    /// Re-open every staged archive and stream its headers. All failures
    /// are reported; any failure fails the call.
    pub fn verify_integrity(&self) -> Result<()> {
        let mut first_error = None;
        for file in &self.files {
            if let Err(e) = PackageArchive::new(&file.path).verify() {
                error!("error verifying package {}: {}", file.name, e);
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Resolve the staged batch: dependency closure, clash detection,
    /// installation ordering, then the last-mile check that no file-backed
    /// package's payload already exists on the install root.
    pub fn verify_possible(&mut self, repos: &RepositoryEngine) -> Result<()> {
        let mut batch: Vec<PackageDescriptor> =
            self.files.iter().map(PackageFile::descriptor).collect();
        for name in &self.requested_names {
            let descriptor = repos
                .package_data(name)
                .ok_or_else(|| Error::PackageNotFound(name.clone()))?;
            batch.push(descriptor);
        }

        let batch = Resolver::new(&self.index, repos).resolve(batch)?;

        let mut existing = Vec::new();
        for descriptor in &batch {
            let Some(file) = self.package_file(&descriptor.name) else {
                continue;
            };
            for relative in &file.files {
                let target = self.install_root.join(relative);
                if target.exists() {
                    error!(
                        "file {} (part of package {}) already exists",
                        target.display(),
                        file.name
                    );
                    existing.push(target.display().to_string());
                }
            }
        }
        if !existing.is_empty() {
            return Err(Error::TargetFilesExist(existing));
        }

        self.batch = batch;
        self.verified = true;
        Ok(())
    }

    /// The verified batch, in installation order.
    pub fn batch(&self) -> &[PackageDescriptor] {
        &self.batch
    }

    /// Sum of (installed size, archive file size) over the verified batch.
    pub fn total_sizes(&self) -> (u64, u64) {
        self.batch.iter().fold((0, 0), |(total, files), p| {
            (total + p.installed_size, files + p.archive_size)
        })
    }

    /// Human-readable listing of the verified batch with sizes.
    pub fn installation_summary(&self) -> String {
        let mut out = String::from("The following packages will be installed:\n");
        for package in &self.batch {
            let _ = writeln!(
                out,
                "\t{} (size: {}, file size: {})",
                package.name,
                HumanBytes(package.installed_size),
                HumanBytes(package.archive_size)
            );
        }
        let (total, files) = self.total_sizes();
        let _ = writeln!(out, "Total size of packages: {}", HumanBytes(total));
        let _ = write!(out, "Total file size of packages: {}", HumanBytes(files));
        out
    }

    /// Fail closed when the install-root filesystem lacks room for the
    /// batch's total installed size.
    pub fn check_free_space(&self) -> Result<()> {
        let (required, _) = self.total_sizes();
        let available = fs2::available_space(&self.install_root)?;
        if available <= required {
            return Err(Error::InsufficientSpace {
                required,
                available,
            });
        }
        Ok(())
    }

    /// Print the batch, check free space, and ask for an explicit yes.
    /// Skipped entirely when the operator passed the assume-yes flag.
    pub fn request_permission(&self, input: &mut dyn BufRead) -> Result<bool> {
        if self.batch.is_empty() {
            return Ok(false);
        }
        println!("{}", self.installation_summary());
        self.check_free_space()?;
        println!("Are you sure? [y/N] ");
        let mut response = String::new();
        input.read_line(&mut response)?;
        Ok(matches!(response.trim(), "y" | "Y"))
    }

    /// Materialize and extract every package in the verified order, then
    /// run post-install hooks in batch order. A package that fails to
    /// extract is reported and the loop continues; nothing already written
    /// is undone.
    pub fn execute(&mut self, repos: &RepositoryEngine, hooks: &dyn HookRunner) -> Result<()> {
        if !self.verified {
            return Err(Error::InvalidState(
                "execute called before successful verification".to_string(),
            ));
        }

        let batch = std::mem::take(&mut self.batch);
        self.verified = false;

        let mut hook_packages = Vec::new();
        for descriptor in &batch {
            let file = match &descriptor.origin {
                PackageOrigin::ArchiveFile(_) => self.package_file(&descriptor.name).cloned(),
                PackageOrigin::Repository(repo_name) => {
                    if !repos.prepare_package(&descriptor.name) {
                        error!(
                            "error installing package {}: repository {} could not prepare it",
                            descriptor.name, repo_name
                        );
                        continue;
                    }
                    let Some(path) = repos.payload_path(&descriptor.name) else {
                        error!(
                            "error installing package {}: no payload in repository {}",
                            descriptor.name, repo_name
                        );
                        continue;
                    };
                    match PackageFile::read(&path) {
                        Ok(file) => Some(file),
                        Err(e) => {
                            error!("error installing package {}: {}", descriptor.name, e);
                            continue;
                        }
                    }
                }
            };
            let Some(file) = file else {
                error!(
                    "error installing package {}: not in the staged file list",
                    descriptor.name
                );
                continue;
            };

            info!("operating on {}", file.name);
            if let Err(e) = self.extract_package(&file) {
                error!("error installing package {}: {}", file.name, e);
                continue;
            }
            info!("done operating on {}", file.name);

            if file.has_hook {
                hook_packages.push(file.name.clone());
            }
        }

        for name in hook_packages {
            info!("running after install script for {}", name);
            match hooks.run(&self.install_root, &name) {
                Ok(status) if !status.success() => {
                    warn!("after install script for {} exited with {}", name, status);
                }
                Ok(_) => info!("done running after install for {}", name),
                Err(e) => {
                    error!("couldnt execute after install script for {}: {}", name, e);
                }
            }
        }

        Ok(())
    }

    /// Stream one archive to disk: payload under the install root, metadata
    /// entries into the package's record directory.
    fn extract_package(&self, file: &PackageFile) -> Result<()> {
        for folder in &file.folders {
            let path = self.install_root.join(folder);
            if !path.exists() {
                std::fs::create_dir_all(&path)?;
            }
        }

        let record_dir = self.install_root.join(PACKAGE_DB_DIR).join(&file.name);
        std::fs::create_dir_all(&record_dir)?;

        let archive = PackageArchive::new(&file.path);
        let mut reader = archive.reader()?;
        reader.set_preserve_permissions(true);
        reader.set_unpack_xattrs(true);

        let archive_error = |e: std::io::Error| Error::Archive {
            path: file.path.display().to_string(),
            reason: e.to_string(),
        };

        for entry in reader.entries().map_err(archive_error)? {
            let mut entry = entry.map_err(archive_error)?;
            let mut entry_path = entry
                .path()
                .map_err(archive_error)?
                .to_string_lossy()
                .into_owned();
            if entry.header().entry_type().is_dir() && !entry_path.ends_with('/') {
                entry_path.push('/');
            }

            match classify(&entry_path) {
                EntryKind::Manifest | EntryKind::OwnedFiles | EntryKind::Sums | EntryKind::Hook => {
                    let target = record_dir.join(&entry_path);
                    debug!("recording metadata entry {}", target.display());
                    entry.unpack(&target).map_err(archive_error)?;
                }
                EntryKind::PayloadFile(relative) => {
                    let target = self.install_root.join(&relative);
                    if let Some(parent) = target.parent() {
                        std::fs::create_dir_all(parent)?;
                    }
                    debug!("extracting in root: {}", relative);
                    entry.unpack(&target).map_err(archive_error)?;
                }
                EntryKind::PayloadDir(_) | EntryKind::Ignored => {}
            }
        }

        Ok(())
    }
}
