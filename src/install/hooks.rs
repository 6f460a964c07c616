// src/install/hooks.rs

//! Post-install hook execution
//!
//! A package's `afterinstall.sh` runs once, after every package in the
//! batch has its files on disk. The contract: one child process, working
//! directory reset to `/`, a chroot into the install root when it is not
//! the real root, a single argv of the hook path, synchronous wait, exit
//! status handed back to the caller. Kept behind a trait so transaction
//! tests can observe hook order without forking anything.

use crate::error::Result;
use crate::PACKAGE_DB_DIR;
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::{Command, ExitStatus};
use tracing::debug;

/// Runs one package's post-install hook.
pub trait HookRunner {
    fn run(&self, install_root: &Path, package: &str) -> Result<ExitStatus>;
}

/// Absolute hook path as seen from inside the install root.
pub(crate) fn hook_path(package: &str) -> String {
    format!("/{}/{}/afterinstall.sh", PACKAGE_DB_DIR, package)
}

/// Real hook runner: forks, optionally chroots, execs, waits.
pub struct ChrootHookRunner;

impl HookRunner for ChrootHookRunner {
    fn run(&self, install_root: &Path, package: &str) -> Result<ExitStatus> {
        let path = hook_path(package);
        debug!(
            "trying to execute {} as after install script (root {})",
            path,
            install_root.display()
        );

        let mut command = Command::new(&path);
        if install_root == Path::new("/") {
            command.current_dir("/");
        } else {
            let root = install_root.to_path_buf();
            // Runs in the forked child between fork and exec.
            unsafe {
                command.pre_exec(move || {
                    nix::unistd::chroot(root.as_path())
                        .map_err(|errno| std::io::Error::from_raw_os_error(errno as i32))?;
                    std::env::set_current_dir("/")
                });
            }
        }

        let status = command.status()?;
        Ok(status)
    }
}
