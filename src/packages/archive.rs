// src/packages/archive.rs

//! Package archive container access
//!
//! Packages are tar archives, optionally compressed with gzip, xz, or
//! zstandard. Compression is detected from the file extension first and the
//! leading magic bytes as a fallback, so repositories can store archives
//! under any name.

use crate::error::{Error, Result};
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tar::Archive;
use xz2::read::XzDecoder;

/// Compression wrapping the tar container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Compression {
    Gzip,
    Xz,
    Zstd,
    Plain,
}

/// Handle on a package archive file. Opening is cheap; each call to
/// [`PackageArchive::reader`] restarts a streaming pass over the entries.
#[derive(Debug, Clone)]
pub struct PackageArchive {
    path: PathBuf,
}

impl PackageArchive {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Size of the archive file on disk.
    pub fn file_size(&self) -> Result<u64> {
        let metadata = std::fs::metadata(&self.path).map_err(|e| Error::Archive {
            path: self.path.display().to_string(),
            reason: e.to_string(),
        })?;
        Ok(metadata.len())
    }

    /// Open a fresh streaming reader over the archive entries.
    pub fn reader(&self) -> Result<Archive<Box<dyn Read>>> {
        let file = File::open(&self.path).map_err(|e| Error::Archive {
            path: self.path.display().to_string(),
            reason: format!("failed to open: {}", e),
        })?;

        let reader: Box<dyn Read> = match self.compression()? {
            Compression::Gzip => Box::new(GzDecoder::new(file)),
            Compression::Xz => Box::new(XzDecoder::new(file)),
            Compression::Zstd => {
                let decoder = zstd::Decoder::new(file).map_err(|e| Error::Archive {
                    path: self.path.display().to_string(),
                    reason: format!("failed to create zstd decoder: {}", e),
                })?;
                Box::new(decoder)
            }
            Compression::Plain => Box::new(file),
        };

        Ok(Archive::new(reader))
    }

    /// Check the archive opens and its headers stream cleanly end to end.
    pub fn verify(&self) -> Result<()> {
        let mut archive = self.reader()?;
        let entries = archive.entries().map_err(|e| Error::Archive {
            path: self.path.display().to_string(),
            reason: e.to_string(),
        })?;
        for entry in entries {
            entry.map_err(|e| Error::Archive {
                path: self.path.display().to_string(),
                reason: e.to_string(),
            })?;
        }
        Ok(())
    }

    fn compression(&self) -> Result<Compression> {
        let name = self.path.to_string_lossy();
        if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            return Ok(Compression::Gzip);
        }
        if name.ends_with(".tar.xz") {
            return Ok(Compression::Xz);
        }
        if name.ends_with(".tar.zst") {
            return Ok(Compression::Zstd);
        }
        if name.ends_with(".tar") {
            return Ok(Compression::Plain);
        }

        // Unrecognized extension: sniff magic bytes
        let mut file = File::open(&self.path).map_err(|e| Error::Archive {
            path: self.path.display().to_string(),
            reason: e.to_string(),
        })?;
        let mut magic = [0u8; 6];
        let read = file.read(&mut magic).map_err(|e| Error::Archive {
            path: self.path.display().to_string(),
            reason: e.to_string(),
        })?;

        if read >= 2 && magic[0..2] == [0x1F, 0x8B] {
            return Ok(Compression::Gzip);
        }
        if read >= 6 && magic[0..6] == [0xFD, 0x37, 0x7A, 0x58, 0x5A, 0x00] {
            return Ok(Compression::Xz);
        }
        if read >= 4 && magic[0..4] == [0x28, 0xB5, 0x2F, 0xFD] {
            return Ok(Compression::Zstd);
        }

        Ok(Compression::Plain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_compression_from_extension() {
        assert_eq!(
            PackageArchive::new(Path::new("p.tar.gz"))
                .compression()
                .unwrap(),
            Compression::Gzip
        );
        assert_eq!(
            PackageArchive::new(Path::new("p.tar.xz"))
                .compression()
                .unwrap(),
            Compression::Xz
        );
        assert_eq!(
            PackageArchive::new(Path::new("p.tar.zst"))
                .compression()
                .unwrap(),
            Compression::Zstd
        );
        assert_eq!(
            PackageArchive::new(Path::new("p.tar"))
                .compression()
                .unwrap(),
            Compression::Plain
        );
    }

    #[test]
    fn test_compression_from_magic_bytes() {
        let mut file = tempfile::NamedTempFile::with_suffix(".pkg").unwrap();
        file.write_all(&[0x1F, 0x8B, 0x08, 0x00, 0x00, 0x00]).unwrap();
        file.flush().unwrap();
        assert_eq!(
            PackageArchive::new(file.path()).compression().unwrap(),
            Compression::Gzip
        );

        let mut file = tempfile::NamedTempFile::with_suffix(".pkg").unwrap();
        file.write_all(&[0x28, 0xB5, 0x2F, 0xFD, 0x00, 0x00]).unwrap();
        file.flush().unwrap();
        assert_eq!(
            PackageArchive::new(file.path()).compression().unwrap(),
            Compression::Zstd
        );
    }

    #[test]
    fn test_missing_file_errors() {
        let archive = PackageArchive::new(Path::new("/nonexistent/p.tar"));
        assert!(archive.reader().is_err());
        assert!(archive.verify().is_err());
    }

    #[test]
    fn test_verify_plain_tar() {
        let mut builder = tar::Builder::new(Vec::new());
        let data = b"hello";
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, "manifest", &data[..]).unwrap();
        let bytes = builder.into_inner().unwrap();

        let mut file = tempfile::NamedTempFile::with_suffix(".tar").unwrap();
        file.write_all(&bytes).unwrap();
        file.flush().unwrap();

        PackageArchive::new(file.path()).verify().unwrap();
    }
}
