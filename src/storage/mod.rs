//! Backend-agnostic storage port.
//!
//! Every piece of the reconciliation engine talks to storage through the
//! [`Storage`] trait: enumerate entries under a prefix, read, write, delete,
//! and check existence. The engine never touches the filesystem directly, so
//! the same sync logic runs against a local directory, an in-memory tree, a
//! remote drive or a blob container.
//!
//! | Adapter | Backing store | Fingerprint |
//! |---|---|---|
//! | [`LocalStorage`] | a directory on disk | `<size>-<mtime nanos>` |
//! | [`MemoryStorage`] | a map in process memory | SHA-256 of the content |
//! | [`DriveStorage`] | a Graph-style drive REST API | drive content hash or eTag |
//! | [`BlobStorage`] | a blob container behind a SAS URL | `Content-MD5` or `Etag` |
//!
//! ## Paths
//!
//! All paths are relative to the adapter's root and use `/` as separator,
//! regardless of platform. [`normalize_path`] is the single place that turns
//! caller input into that form; it rejects `..` so no path can escape the
//! root. Listings always return root-relative paths, never prefix-relative
//! ones, and listing a prefix that does not exist yields an empty list.
//!
//! ## Fingerprints
//!
//! A fingerprint is an opaque string. The engine only ever compares two
//! fingerprints for equality, so each adapter is free to pick whatever its
//! backend can provide cheaply, as long as a content change changes it.

pub mod blob;
pub mod drive;
pub mod local;
pub mod memory;

pub use blob::BlobStorage;
pub use drive::DriveStorage;
pub use local::LocalStorage;
pub use memory::MemoryStorage;

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error at '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("HTTP error: {message}")]
    Http {
        status: Option<u16>,
        message: String,
    },
    #[error("Invalid path: {0}")]
    InvalidPath(String),
    #[error("Storage backend error: {0}")]
    Backend(String),
    #[error("Source root '{source_root}' and output root '{output_root}' overlap")]
    OverlappingRoots {
        source_root: String,
        output_root: String,
    },
}

impl StorageError {
    /// Wrap an IO error, mapping `NotFound` to [`StorageError::NotFound`].
    pub fn io(path: &str, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::NotFound {
            Self::NotFound(path.to_string())
        } else {
            Self::Io {
                path: path.to_string(),
                source,
            }
        }
    }

    /// Whether the same call might succeed if repeated later.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Io { .. } => true,
            Self::Http { status, .. } => match status {
                Some(code) => *code == 408 || *code == 429 || *code >= 500,
                None => true,
            },
            Self::NotFound(_)
            | Self::InvalidPath(_)
            | Self::Backend(_)
            | Self::OverlappingRoots { .. } => false,
        }
    }
}

/// One file-like entry found by [`Storage::list`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StorageEntry {
    /// Root-relative, `/`-separated path.
    pub path: String,
    pub size: u64,
    pub fingerprint: String,
}

/// Uniform capability interface over a storage backend.
///
/// Implementations must be `Sync`: the reconciler shares one reference
/// across its worker pool.
pub trait Storage: Sync {
    /// Enumerate all files under `prefix`, recursively, sorted by path.
    fn list(&self, prefix: &str) -> Result<Vec<StorageEntry>, StorageError>;

    fn read(&self, path: &str) -> Result<Vec<u8>, StorageError>;

    /// Write `data` to `path`, creating intermediate folders. A reader never
    /// observes a partially written file.
    fn write(&self, path: &str, data: &[u8]) -> Result<(), StorageError>;

    /// Delete `path`. Deleting something that is already gone succeeds.
    fn delete(&self, path: &str) -> Result<(), StorageError>;

    /// Check whether `path` exists. The empty path is the adapter root.
    fn exists(&self, path: &str) -> Result<bool, StorageError>;

    /// Short human-readable location, for CLI output.
    fn describe(&self) -> String;
}

/// Storage backends selectable at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StorageKind {
    Local,
    Drive,
    Blob,
}

/// Open a storage adapter of the given kind rooted at `root`.
///
/// `credential` is the bearer token for the drive adapter and the container
/// SAS URL for the blob adapter; both fail without one. Local storage
/// ignores it.
pub fn open(
    kind: StorageKind,
    root: &str,
    credential: Option<&str>,
) -> Result<Box<dyn Storage>, StorageError> {
    match kind {
        StorageKind::Local => Ok(Box::new(LocalStorage::new(root))),
        StorageKind::Drive => {
            let token = credential.ok_or_else(|| {
                StorageError::Backend("drive storage requires an access token".into())
            })?;
            Ok(Box::new(DriveStorage::new(token, root)?))
        }
        StorageKind::Blob => {
            let url = credential.ok_or_else(|| {
                StorageError::Backend("blob storage requires a container SAS URL".into())
            })?;
            Ok(Box::new(BlobStorage::new(url, root)?))
        }
    }
}

/// Reject a source and output root where one contains the other.
///
/// An output root inside the source root would feed every run's artifacts
/// back in as new sources; a source root inside the output root would have
/// its images deleted as orphans. Both roots use the same backend `kind`.
pub fn check_roots(kind: StorageKind, source: &str, output: &str) -> Result<(), StorageError> {
    let overlap = match kind {
        StorageKind::Local => {
            let (src, out) = (resolve_local(Path::new(source)), resolve_local(Path::new(output)));
            out.starts_with(&src) || src.starts_with(&out)
        }
        StorageKind::Drive | StorageKind::Blob => {
            let (src, out) = (normalize_path(source)?, normalize_path(output)?);
            is_under(&out, &src) || is_under(&src, &out)
        }
    };
    if overlap {
        return Err(StorageError::OverlappingRoots {
            source_root: source.to_string(),
            output_root: output.to_string(),
        });
    }
    Ok(())
}

/// Absolute, symlink-free form of a local path that may not exist yet: the
/// deepest existing ancestor is canonicalized and the rest appended.
fn resolve_local(path: &Path) -> PathBuf {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let mut missing = Vec::new();
    let mut current = absolute.as_path();
    loop {
        if let Ok(real) = fs::canonicalize(current) {
            return missing.iter().rev().fold(real, |acc, part| acc.join(part));
        }
        match (current.file_name(), current.parent()) {
            (Some(name), Some(parent)) => {
                missing.push(name.to_os_string());
                current = parent;
            }
            _ => return absolute,
        }
    }
}

/// Normalize a caller-supplied path to the root-relative `a/b/c` form.
///
/// Backslashes are treated as separators, empty and `.` segments are
/// dropped, and `..` is rejected. The root itself normalizes to `""`.
pub fn normalize_path(path: &str) -> Result<String, StorageError> {
    let mut parts = Vec::new();
    for part in path.split(['/', '\\']) {
        match part {
            "" | "." => {}
            ".." => return Err(StorageError::InvalidPath(path.to_string())),
            other => parts.push(other),
        }
    }
    Ok(parts.join("/"))
}

/// Join a normalized prefix and a relative path.
pub fn join_path(prefix: &str, path: &str) -> String {
    match (prefix.is_empty(), path.is_empty()) {
        (true, _) => path.to_string(),
        (false, true) => prefix.to_string(),
        (false, false) => format!("{}/{}", prefix, path),
    }
}

/// Whether `path` equals `prefix` or lies underneath it.
pub fn is_under(path: &str, prefix: &str) -> bool {
    prefix.is_empty()
        || path == prefix
        || (path.starts_with(prefix) && path.as_bytes().get(prefix.len()) == Some(&b'/'))
}

fn http_error(path: &str, err: ureq::Error) -> StorageError {
    match err {
        ureq::Error::StatusCode(404) => StorageError::NotFound(path.to_string()),
        ureq::Error::StatusCode(code) => StorageError::Http {
            status: Some(code),
            message: format!("HTTP {} for '{}'", code, path),
        },
        other => StorageError::Http {
            status: None,
            message: format!("{} for '{}'", other, path),
        },
    }
}

/// Percent-encode each path segment, keeping `/` separators.
fn encode_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for byte in path.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'/' => {
                out.push(byte as char)
            }
            other => out.push_str(&format!("%{:02X}", other)),
        }
    }
    out
}
