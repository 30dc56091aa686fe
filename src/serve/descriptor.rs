//! Per-request filesystem metadata and entity tags

use std::fs::Metadata;
use std::io;
use std::path::{Path, PathBuf};

use crate::http::date::system_time_to_millis;

/// What a path points at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    File,
    Directory,
    Other,
}

/// Snapshot of one filesystem entry, taken fresh for every request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceDescriptor {
    pub canonical_path: PathBuf,
    pub kind: ResourceKind,
    pub size: u64,
    pub inode: u64,
    pub modified_at_ms: i64,
}

impl ResourceDescriptor {
    /// Stat `path` asynchronously
    pub async fn stat(path: &Path) -> io::Result<Self> {
        let metadata = tokio::fs::metadata(path).await?;
        Ok(Self::from_metadata(path, &metadata))
    }

    /// Stat `path` on the current thread, for use inside blocking workers
    pub fn stat_blocking(path: &Path) -> io::Result<Self> {
        let metadata = std::fs::metadata(path)?;
        Ok(Self::from_metadata(path, &metadata))
    }

    fn from_metadata(path: &Path, metadata: &Metadata) -> Self {
        let kind = if metadata.is_file() {
            ResourceKind::File
        } else if metadata.is_dir() {
            ResourceKind::Directory
        } else {
            ResourceKind::Other
        };

        Self {
            canonical_path: path.to_path_buf(),
            kind,
            size: metadata.len(),
            inode: inode_of(metadata),
            modified_at_ms: metadata
                .modified()
                .ok()
                .and_then(system_time_to_millis)
                .unwrap_or(0),
        }
    }

    pub fn is_file(&self) -> bool {
        self.kind == ResourceKind::File
    }

    pub fn is_dir(&self) -> bool {
        self.kind == ResourceKind::Directory
    }

    /// Strong entity tag: `"<inode>-<size>-<mtime ms>"`
    pub fn entity_tag(&self) -> String {
        format!("\"{}-{}-{}\"", self.inode, self.size, self.modified_at_ms)
    }

    /// File name used in `Content-Disposition`
    pub fn basename(&self) -> String {
        self.canonical_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

#[cfg(unix)]
fn inode_of(metadata: &Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;
    metadata.ino()
}

#[cfg(not(unix))]
const fn inode_of(_metadata: &Metadata) -> u64 {
    0
}
