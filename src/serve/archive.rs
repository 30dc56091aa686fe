//! On-demand zip archives for directories without an index file
//!
//! The directory's `index.json` lists the files to pack. The archive is
//! written to a uniquely named temporary file on a blocking worker and then
//! streamed like any other file.

use serde::Deserialize;
use std::fs::File;
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};
use uuid::Uuid;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter, ZIP64_BYTES_THR};

use super::descriptor::ResourceDescriptor;
use super::path_guard::{is_outside, resolve};
use crate::error::ServeError;
use crate::http::HeaderSet;
use crate::logger;

/// Name of the manifest inside a served directory
pub const MANIFEST_NAME: &str = "index.json";

const TEMP_PREFIX: &str = "temp_archive.zip.";
const COMPRESSION_LEVEL: i64 = 9;

/// Files to pack, relative to the directory holding the manifest
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ArchiveManifest {
    pub files: Vec<String>,
}

impl ArchiveManifest {
    /// Parse manifest JSON. A missing or mistyped `files` field is malformed.
    pub fn parse(contents: &[u8]) -> Result<Self, ServeError> {
        serde_json::from_slice(contents).map_err(|e| ServeError::MalformedManifest(e.to_string()))
    }
}

/// Read the raw manifest of `directory`
pub async fn read_manifest(directory: &Path) -> Result<Vec<u8>, ServeError> {
    let path = directory.join(MANIFEST_NAME);
    tokio::fs::read(&path).await.map_err(|e| {
        logger::log_warning(&format!("Cannot read {}: {e}", path.display()));
        ServeError::NotFound(path)
    })
}

/// Apply the headers every archive response carries.
///
/// `Vary` gains `Accept-Encoding`, since the archive is only offered to
/// clients that accept deflate.
pub fn apply_archive_headers(headers: &mut HeaderSet, download_name: Option<&str>) {
    if let Some(name) = download_name.filter(|name| !name.is_empty()) {
        headers.insert("Content-Disposition", format!("attachment; filename={name}"));
    }

    let vary = match headers.get("Vary") {
        None => "Accept-Encoding".to_string(),
        Some(existing) if existing.to_ascii_lowercase().contains("accept-encoding") => {
            existing.to_string()
        }
        Some(existing) => format!("{existing}, Accept-Encoding"),
    };
    headers.insert("Vary", vary);
}

/// A finished archive in the temporary directory, deleted on drop
#[derive(Debug)]
pub struct TempArchive {
    path: PathBuf,
}

impl TempArchive {
    pub(crate) fn create_in(dir: &Path) -> io::Result<(Self, File)> {
        let path = dir.join(format!("{TEMP_PREFIX}{}", Uuid::new_v4().simple()));
        let file = File::options().write(true).create_new(true).open(&path)?;
        Ok((Self { path }, file))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempArchive {
    fn drop(&mut self) {
        remove_temp_archive(&self.path);
    }
}

/// Whether `path` follows the temporary archive naming scheme
pub fn is_temp_archive(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .and_then(|name| name.strip_prefix(TEMP_PREFIX))
        .is_some_and(|suffix| suffix.len() == 32 && suffix.bytes().all(|b| b.is_ascii_hexdigit()))
}

/// Delete a temporary archive. Anything not named like one is left alone.
pub fn remove_temp_archive(path: &Path) {
    if !is_temp_archive(path) {
        logger::log_warning(&format!(
            "Refusing to delete {}: not a temporary archive",
            path.display()
        ));
        return;
    }
    match std::fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => logger::log_error(&format!(
            "Failed to delete temporary archive {}: {e}",
            path.display()
        )),
    }
}

/// Build the archive for `directory` inside `temp_dir`.
///
/// Returns the archive with its metadata. On any error the partial file is
/// already gone.
pub async fn build_archive(
    directory: PathBuf,
    manifest: ArchiveManifest,
    temp_dir: PathBuf,
) -> Result<(TempArchive, ResourceDescriptor), ServeError> {
    tokio::task::spawn_blocking(move || build_in(&directory, &manifest, &temp_dir))
        .await
        .map_err(|e| ServeError::StreamFailure(io::Error::other(e)))?
}

fn build_in(
    directory: &Path,
    manifest: &ArchiveManifest,
    temp_dir: &Path,
) -> Result<(TempArchive, ResourceDescriptor), ServeError> {
    let (temp, file) = TempArchive::create_in(temp_dir).map_err(ServeError::StreamFailure)?;
    let mut zip = ZipWriter::new(BufWriter::new(file));

    for entry in &manifest.files {
        let path = resolve(directory, entry);
        if is_outside(&path, directory) {
            logger::log_warning(&format!(
                "Manifest entry '{entry}' escapes {}",
                directory.display()
            ));
            return Err(ServeError::PathViolation(path));
        }

        let source_size = match ResourceDescriptor::stat_blocking(&path) {
            Ok(found) if found.is_file() => found.size,
            _ => {
                logger::log_warning(&format!("Manifest entry '{entry}' not found"));
                return Err(ServeError::NotFound(path));
            }
        };

        let mut source = File::open(&path).map_err(|_| ServeError::NotFound(path.clone()))?;
        zip.start_file(entry_name(&path, directory), entry_options(source_size))
            .map_err(zip_failure)?;
        io::copy(&mut source, &mut zip).map_err(ServeError::StreamFailure)?;
    }

    let writer = zip.finish().map_err(zip_failure)?;
    writer
        .into_inner()
        .map_err(|e| ServeError::StreamFailure(e.into_error()))?
        .sync_all()
        .map_err(ServeError::StreamFailure)?;

    let descriptor = ResourceDescriptor::stat_blocking(temp.path()).map_err(ServeError::StreamFailure)?;
    if descriptor.size == 0 {
        return Err(ServeError::StreamFailure(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "archive closed empty",
        )));
    }
    Ok((temp, descriptor))
}

/// Entries past the 32-bit size limit are written with zip64 headers
fn entry_options(size: u64) -> SimpleFileOptions {
    SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .compression_level(Some(COMPRESSION_LEVEL))
        .large_file(size >= ZIP64_BYTES_THR)
}

/// Entry name inside the zip: the normalized path below `directory`, `/`-separated
fn entry_name(path: &Path, directory: &Path) -> String {
    path.strip_prefix(directory)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn zip_failure(error: zip::result::ZipError) -> ServeError {
    ServeError::StreamFailure(io::Error::other(error))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Read;

    fn manifest(files: &[&str]) -> ArchiveManifest {
        ArchiveManifest {
            files: files.iter().map(ToString::to_string).collect(),
        }
    }

    fn temp_archives(dir: &Path) -> usize {
        fs::read_dir(dir)
            .unwrap()
            .filter(|e| is_temp_archive(&e.as_ref().unwrap().path()))
            .count()
    }

    #[test]
    fn test_parse_manifest() {
        let m = ArchiveManifest::parse(br#"{"files": ["a.txt", "sub/b.txt"]}"#).unwrap();
        assert_eq!(m.files, vec!["a.txt", "sub/b.txt"]);

        assert!(matches!(
            ArchiveManifest::parse(b"{not json"),
            Err(ServeError::MalformedManifest(_))
        ));
        assert!(matches!(
            ArchiveManifest::parse(br#"{"other": []}"#),
            Err(ServeError::MalformedManifest(_))
        ));
    }

    #[test]
    fn test_archive_headers() {
        let mut headers = HeaderSet::new();
        apply_archive_headers(&mut headers, Some("bundle.zip"));
        assert_eq!(headers.get("content-disposition"), Some("attachment; filename=bundle.zip"));
        assert_eq!(headers.get("vary"), Some("Accept-Encoding"));

        let mut headers = HeaderSet::new();
        headers.insert("Vary", "Origin");
        apply_archive_headers(&mut headers, None);
        assert_eq!(headers.get("vary"), Some("Origin, Accept-Encoding"));
        assert!(!headers.contains("content-disposition"));

        apply_archive_headers(&mut headers, None);
        assert_eq!(headers.get("vary"), Some("Origin, Accept-Encoding"));
    }

    #[test]
    fn test_large_entries_use_zip64() {
        // Pin the timestamp so options built at different instants compare equal
        let options = |size| entry_options(size).last_modified_time(zip::DateTime::default());
        let plain = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .compression_level(Some(COMPRESSION_LEVEL))
            .last_modified_time(zip::DateTime::default());

        assert_eq!(options(1024), plain);
        assert_eq!(options(ZIP64_BYTES_THR - 1), plain);
        assert_eq!(options(ZIP64_BYTES_THR), plain.large_file(true));
        assert_eq!(options(5 * 1024 * 1024 * 1024), plain.large_file(true));
    }

    #[test]
    fn test_temp_archive_naming() {
        let name = format!("{TEMP_PREFIX}{}", Uuid::new_v4().simple());
        assert!(is_temp_archive(&std::env::temp_dir().join(name)));
        assert!(!is_temp_archive(Path::new("/etc/passwd")));
        assert!(!is_temp_archive(Path::new("/tmp/temp_archive.zip.")));
        assert!(!is_temp_archive(Path::new("/tmp/temp_archive.zip.../../x")));
    }

    #[test]
    fn test_refuses_to_delete_other_files() {
        let dir = tempfile::tempdir().unwrap();
        let keep = dir.path().join("keep.txt");
        fs::write(&keep, b"data").unwrap();
        remove_temp_archive(&keep);
        assert!(keep.exists());
    }

    #[test]
    fn test_build_in_order() {
        let site = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        fs::create_dir(site.path().join("sub")).unwrap();
        fs::write(site.path().join("a.txt"), b"alpha").unwrap();
        fs::write(site.path().join("sub/b.txt"), b"beta").unwrap();

        let (temp, descriptor) =
            build_in(site.path(), &manifest(&["sub/b.txt", "./a.txt"]), scratch.path()).unwrap();
        assert!(descriptor.size > 0);
        assert!(temp.path().starts_with(scratch.path()));

        let mut zip = zip::ZipArchive::new(File::open(temp.path()).unwrap()).unwrap();
        assert_eq!(zip.len(), 2);
        assert_eq!(zip.by_index(0).unwrap().name(), "sub/b.txt");
        let mut contents = String::new();
        zip.by_index(1).unwrap().read_to_string(&mut contents).unwrap();
        assert_eq!(contents, "alpha");

        let path = temp.path().to_path_buf();
        drop(temp);
        assert!(!path.exists());
    }

    #[test]
    fn test_escaping_entry_aborts_and_cleans_up() {
        let site = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        fs::write(site.path().join("a.txt"), b"alpha").unwrap();

        let result = build_in(site.path(), &manifest(&["a.txt", "../outside.txt"]), scratch.path());
        assert!(matches!(result, Err(ServeError::PathViolation(_))));
        assert_eq!(temp_archives(scratch.path()), 0);
    }

    #[test]
    fn test_missing_entry_aborts_and_cleans_up() {
        let site = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();

        let result = build_in(site.path(), &manifest(&["nope.txt"]), scratch.path());
        assert!(matches!(result, Err(ServeError::NotFound(_))));
        assert_eq!(temp_archives(scratch.path()), 0);
    }
}
