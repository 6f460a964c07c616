// src/error.rs

use std::fmt;
use thiserror::Error;

/// Core error types for Parcel
#[derive(Error, Debug)]
pub enum Error {
    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Package archive could not be opened or read
    #[error("Failed to read package archive {path}: {reason}")]
    Archive { path: String, reason: String },

    /// Package manifest is present but unusable
    #[error("Invalid package manifest: {0}")]
    Manifest(String),

    /// Package not found where it was expected (repositories, install root)
    #[error("Package '{0}' not found")]
    PackageNotFound(String),

    /// A package with this name is already staged in the pending batch
    #[error("Package '{0}' is already in the pending batch")]
    DuplicateInBatch(String),

    /// Package record exists but declares no owned files
    #[error("Package '{0}' has no files")]
    NoOwnedFiles(String),

    /// Dependency resolution failed; carries every collected problem
    #[error("{0}")]
    Resolution(ResolutionFailure),

    /// Files a package wants to create already exist on the install root
    #[error("Target files already exist: {}", .0.join(", "))]
    TargetFilesExist(Vec<String>),

    /// Not enough free space on the install-root filesystem
    #[error("Not enough space on filesystem: {required} bytes required, {available} available")]
    InsufficientSpace { required: u64, available: u64 },

    /// Operator declined the confirmation prompt
    #[error("Operation declined")]
    Declined,

    /// Repository errors (unusable repository, refused write operation)
    #[error("Repository error: {0}")]
    Repository(String),

    /// Engine used out of order (e.g. execute before verify)
    #[error("Invalid transaction state: {0}")]
    InvalidState(String),
}

/// Result type alias using Parcel's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// A dependency that could not be satisfied from any source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingDependency {
    /// Package that declared the dependency
    pub package: String,
    /// Dependency name that is not installed, in the batch, or in any repository
    pub dependency: String,
}

/// Two packages in one batch claiming the same owned file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileClash {
    /// Package that claimed the path first (its claim is retained)
    pub first: String,
    /// Package whose claim was rejected
    pub second: String,
    /// The contested path
    pub path: String,
}

/// Accumulated resolution problems. The resolver never fails fast: every
/// missing dependency and file clash across the batch is collected so the
/// operator sees all of them in one pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolutionFailure {
    pub missing: Vec<MissingDependency>,
    pub clashes: Vec<FileClash>,
}

impl ResolutionFailure {
    pub fn is_empty(&self) -> bool {
        self.missing.is_empty() && self.clashes.is_empty()
    }
}

impl fmt::Display for ResolutionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Dependency resolution failed:")?;
        for m in &self.missing {
            write!(
                f,
                "\n  package {} is missing dependency {}",
                m.package, m.dependency
            )?;
        }
        for c in &self.clashes {
            write!(
                f,
                "\n  package {} has file clashes with package {}: {}",
                c.second, c.first, c.path
            )?;
        }
        Ok(())
    }
}
