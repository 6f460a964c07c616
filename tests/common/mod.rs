// tests/common/mod.rs

//! Shared helpers for integration tests: package archive construction and
//! a hook runner that records instead of forking.

use parcel::install::HookRunner;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Description of one package archive to build.
pub struct PackageSpec<'a> {
    pub name: &'a str,
    pub version: &'a str,
    pub dependencies: &'a [&'a str],
    /// Install-relative payload paths (no leading slash) with contents.
    pub payload: &'a [(&'a str, &'a [u8])],
    pub with_hook: bool,
}

/// Build a plain-tar package archive in `dir` and return its path.
pub fn build_package(dir: &Path, spec: &PackageSpec) -> PathBuf {
    let mut builder = tar::Builder::new(Vec::new());

    let mut manifest = format!("PACKAGE={}\nVERSION={}\n", spec.name, spec.version);
    if !spec.dependencies.is_empty() {
        manifest.push_str(&format!("DEPENDENCY={}\n", spec.dependencies.join(",")));
    }
    let owned: String = spec
        .payload
        .iter()
        .map(|(path, _)| format!("/{}\n", path))
        .collect();
    let sums: String = spec
        .payload
        .iter()
        .map(|(path, _)| format!("0000000000000000 /{}\n", path))
        .collect();

    let mut append = |path: &str, data: &[u8], mode: u32| {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(mode);
        header.set_cksum();
        builder.append_data(&mut header, path, data).unwrap();
    };

    append("manifest", manifest.as_bytes(), 0o644);
    append("owned-files", owned.as_bytes(), 0o644);
    append("sums", sums.as_bytes(), 0o644);
    if spec.with_hook {
        append("afterinstall.sh", b"#!/bin/sh\nexit 0\n", 0o755);
    }
    for (path, data) in spec.payload {
        append(&format!("root/{}", path), data, 0o755);
    }

    let bytes = builder.into_inner().unwrap();
    let archive_path = dir.join(format!("{}-{}.tar", spec.name, spec.version));
    let mut file = std::fs::File::create(&archive_path).unwrap();
    file.write_all(&bytes).unwrap();
    archive_path
}

/// Hook runner that records package names instead of spawning children.
pub struct RecordingHookRunner {
    pub ran: Mutex<Vec<String>>,
}

impl RecordingHookRunner {
    pub fn new() -> Self {
        Self {
            ran: Mutex::new(Vec::new()),
        }
    }
}

impl HookRunner for RecordingHookRunner {
    fn run(&self, _install_root: &Path, package: &str) -> parcel::Result<std::process::ExitStatus> {
        use std::os::unix::process::ExitStatusExt;
        self.ran.lock().unwrap().push(package.to_string());
        Ok(std::process::ExitStatus::from_raw(0))
    }
}
