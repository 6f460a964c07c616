// src/packages/file.rs

//! Full in-memory read of a package archive
//!
//! One streaming pass collects the manifest, owned-file list, content
//! hashes, payload inventory, and sizes. The payload itself is not held in
//! memory; extraction re-streams the archive at execute time.

use crate::config::ConfigFile;
use crate::error::{Error, Result};
use crate::packages::entry::{classify, EntryKind};
use crate::packages::{PackageArchive, PackageDescriptor, PackageOrigin};
use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Everything known about one package archive after a full metadata read.
#[derive(Debug, Clone)]
pub struct PackageFile {
    pub path: PathBuf,
    pub name: String,
    /// Empty when the manifest declares no VERSION ("unversioned").
    pub version: String,
    pub dependencies: Vec<String>,
    pub owned_files: Vec<String>,
    /// Path -> hash, parsed from the `sums` entry. Not enforced.
    pub file_hashes: BTreeMap<String, String>,
    /// Payload files, install-relative (no leading slash).
    pub files: Vec<String>,
    /// Payload directories, install-relative.
    pub folders: Vec<String>,
    pub manifest: ConfigFile,
    pub has_hook: bool,
    /// Sum of all entry sizes (decompressed).
    pub installed_size: u64,
    /// Size of the archive file on disk.
    pub archive_size: u64,
}

impl PackageFile {
    /// Read a package archive's metadata. Fails on an unreadable archive,
    /// a missing `manifest` or `owned-files` entry, or a manifest without
    /// a package name. A missing `sums` entry is only warned about.
    pub fn read(path: &Path) -> Result<Self> {
        debug!("reading package archive {}", path.display());

        let archive = PackageArchive::new(path);
        let archive_size = archive.file_size()?;
        let mut reader = archive.reader()?;

        let archive_error = |e: std::io::Error| Error::Archive {
            path: path.display().to_string(),
            reason: e.to_string(),
        };

        let mut manifest = None;
        let mut owned_files = None;
        let mut file_hashes = BTreeMap::new();
        let mut has_sums = false;
        let mut has_hook = false;
        let mut files = Vec::new();
        let mut folders = Vec::new();
        let mut installed_size = 0u64;

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
            installed_size += entry.header().size().map_err(archive_error)?;

            match classify(&entry_path) {
                EntryKind::Manifest => {
                    let mut data = Vec::new();
                    entry.read_to_end(&mut data).map_err(archive_error)?;
                    manifest = Some(ConfigFile::from_bytes(&data));
                }
                EntryKind::OwnedFiles => {
                    let mut data = Vec::new();
                    entry.read_to_end(&mut data).map_err(archive_error)?;
                    owned_files = Some(parse_owned_files(&data));
                }
                EntryKind::Sums => {
                    has_sums = true;
                    let mut data = Vec::new();
                    entry.read_to_end(&mut data).map_err(archive_error)?;
                    file_hashes = parse_sums(&data);
                }
                EntryKind::Hook => has_hook = true,
                EntryKind::PayloadFile(relative) => files.push(relative),
                EntryKind::PayloadDir(relative) => folders.push(relative),
                EntryKind::Ignored => {}
            }
        }

        let (manifest, owned_files) = match (manifest, owned_files) {
            (Some(m), Some(o)) => (m, o),
            _ => {
                return Err(Error::Archive {
                    path: path.display().to_string(),
                    reason: "archive is missing required files".to_string(),
                })
            }
        };

        let name = manifest
            .get("PACKAGE")
            .map(str::to_string)
            .ok_or_else(|| Error::Manifest("manifest is missing package name".to_string()))?;
        let version = manifest.get("VERSION").unwrap_or_default().to_string();
        let dependencies = manifest.get_list("DEPENDENCY");

        if !has_sums {
            warn!("package {} is missing hashes", name);
        }

        debug!(
            "read package {} version {} ({} payload files, {} dependencies)",
            name,
            version,
            files.len(),
            dependencies.len()
        );

        Ok(Self {
            path: path.to_path_buf(),
            name,
            version,
            dependencies,
            owned_files,
            file_hashes,
            files,
            folders,
            manifest,
            has_hook,
            installed_size,
            archive_size,
        })
    }

    /// The resolver-facing view of this archive.
    pub fn descriptor(&self) -> PackageDescriptor {
        PackageDescriptor {
            name: self.name.clone(),
            version: self.version.clone(),
            dependencies: self.dependencies.clone(),
            owned_files: self.owned_files.clone(),
            origin: PackageOrigin::ArchiveFile(self.path.clone()),
            installed_size: self.installed_size,
            archive_size: self.archive_size,
        }
    }
}

fn parse_owned_files(data: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(data)
        .lines()
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse `<hash> <path>` lines as produced by the sha-family sum tools.
/// Leading spaces, the binary-mode `*` marker, and a leading `.` are
/// stripped from the path.
fn parse_sums(data: &[u8]) -> BTreeMap<String, String> {
    let mut hashes = BTreeMap::new();
    for line in String::from_utf8_lossy(data).lines() {
        let Some(space) = line.find(' ') else {
            continue;
        };
        let hash = &line[..space];
        let mut file = line[space..].trim_start_matches(' ');
        file = file.strip_prefix('*').unwrap_or(file);
        file = file.strip_prefix('.').unwrap_or(file);
        if hash.is_empty() || file.is_empty() {
            continue;
        }
        hashes.insert(file.to_string(), hash.to_string());
    }
    hashes
}
