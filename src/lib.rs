// src/lib.rs

//! Parcel Package Manager
//!
//! Simple local package manager: installs, removes, and queries packages
//! described as self-contained tar archives with flat key=value metadata.
//!
//! # Architecture
//!
//! - Filesystem-first: installed state is a directory of per-package
//!   manifests under `etc/parcel/packages` inside the install root
//! - Batch transactions: add -> verify -> confirm -> execute, with all
//!   validation performed before any filesystem mutation
//! - Repositories: ordered, polymorphic package sources resolved
//!   first-match-wins; one local-folder implementation
//! - Dependency resolution: closure over declared dependencies with
//!   pair-cycle breaking, file-clash detection, and topological ordering

pub mod config;
mod error;
pub mod index;
pub mod install;
pub mod packages;
pub mod repository;
pub mod resolver;
pub mod uninstall;

pub use error::{Error, Result};

/// Directory, relative to the install root, holding per-package records.
pub const PACKAGE_DB_DIR: &str = "etc/parcel/packages";
