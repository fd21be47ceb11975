//! Artifact packaging
//!
//! Zips the function app source tree, leaving out bytecode caches, test caches
//! and the local-only settings file.

use std::fs::File;
use std::io::{Seek, Write};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::{DeployError, Result};

/// Directory names skipped with everything below them
pub const EXCLUDED_DIRS: [&str; 2] = ["__pycache__", ".pytest_cache"];

/// File extensions never packaged
pub const EXCLUDED_EXTENSIONS: [&str; 2] = ["pyc", "pyo"];

/// File names never packaged
pub const EXCLUDED_FILES: [&str; 1] = ["local.settings.json"];

const ARCHIVE_NAME: &str = "app.zip";

/// Whether an entry is left out of the archive
pub fn is_excluded(path: &Path, is_dir: bool) -> bool {
    let name = match path.file_name().and_then(|n| n.to_str()) {
        Some(name) => name,
        None => return false,
    };

    if is_dir {
        return EXCLUDED_DIRS.contains(&name);
    }

    EXCLUDED_FILES.contains(&name)
        || path
            .extension()
            .and_then(|e| e.to_str())
            .map(|ext| EXCLUDED_EXTENSIONS.contains(&ext))
            .unwrap_or(false)
}

/// Counts for a written archive
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArchiveStats {
    pub files: usize,
    pub bytes: u64,
}

/// A freshly built archive living in its own temporary directory.
///
/// The directory is removed when the artifact is dropped or discarded, so an
/// artifact is used for exactly one upload.
#[derive(Debug)]
pub struct DeploymentArtifact {
    dir: TempDir,
    path: PathBuf,
    stats: ArchiveStats,
}

impl DeploymentArtifact {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn stats(&self) -> ArchiveStats {
        self.stats
    }

    /// Delete the archive and its directory now
    pub fn discard(self) -> std::io::Result<()> {
        self.dir.close()
    }
}

fn check_source(source: &Path) -> Result<()> {
    if !source.exists() {
        return Err(DeployError::SourceMissing(source.to_path_buf()));
    }
    if !source.is_dir() {
        return Err(DeployError::Packaging(format!(
            "{} is not a directory",
            source.display()
        )));
    }
    Ok(())
}

fn zip_err(e: zip::result::ZipError) -> DeployError {
    DeployError::Packaging(e.to_string())
}

/// IO failure on `path` while packaging
fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> DeployError + '_ {
    move |e| DeployError::Packaging(format!("{}: {}", path.display(), e))
}

/// Archive entry name: relative path with `/` separators
fn entry_name(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Write `source` into a zip stream. `skip` names a file that must not be
/// packaged even if it lies inside the tree (the archive being written).
pub fn write_archive<W: Write + Seek>(
    source: &Path,
    writer: W,
    skip: Option<&Path>,
) -> Result<ArchiveStats> {
    check_source(source)?;

    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut zip = ZipWriter::new(writer);
    let mut stats = ArchiveStats::default();

    let walker = WalkDir::new(source)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !(e.depth() > 0 && is_excluded(e.path(), e.file_type().is_dir())));

    for entry in walker {
        let entry = entry.map_err(|e| DeployError::Packaging(e.to_string()))?;
        if entry.depth() == 0 {
            continue;
        }
        if skip.map(|s| s == entry.path()).unwrap_or(false) {
            continue;
        }

        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(|e| DeployError::Packaging(e.to_string()))?;
        let name = entry_name(relative);

        if entry.file_type().is_dir() {
            zip.add_directory(name, options).map_err(zip_err)?;
            continue;
        }

        debug!("Adding {}", name);
        zip.start_file(name, options).map_err(zip_err)?;
        let mut file = File::open(entry.path()).map_err(io_err(entry.path()))?;
        stats.bytes += std::io::copy(&mut file, &mut zip).map_err(io_err(entry.path()))?;
        stats.files += 1;
    }

    zip.finish().map_err(zip_err)?;
    Ok(stats)
}

/// Build an archive of `source` in a fresh temporary directory
pub fn package(source: &Path) -> Result<DeploymentArtifact> {
    check_source(source)?;

    let dir = tempfile::Builder::new()
        .prefix("azfn-deploy-")
        .tempdir()
        .map_err(io_err(&std::env::temp_dir()))?;
    let path = dir.path().join(ARCHIVE_NAME);
    let file = File::create(&path).map_err(io_err(&path))?;
    let stats = write_archive(source, file, None)?;

    info!(
        "Packaged {} files ({} bytes) from {}",
        stats.files,
        stats.bytes,
        source.display()
    );
    Ok(DeploymentArtifact { dir, path, stats })
}

/// Build an archive of `source` at `output`
pub fn package_to(source: &Path, output: &Path) -> Result<ArchiveStats> {
    check_source(source)?;

    let file = File::create(output).map_err(io_err(output))?;
    // Compare canonical paths so an output inside the tree is never packaged into itself
    let skip = output.canonicalize().map_err(io_err(output))?;
    let source = source.canonicalize().map_err(io_err(source))?;
    write_archive(&source, file, Some(&skip))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::fs;
    use std::io::Read;

    fn write(root: &Path, relative: &str, content: &[u8]) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn read_archive(path: &Path) -> BTreeMap<String, Vec<u8>> {
        let mut archive = zip::ZipArchive::new(File::open(path).unwrap()).unwrap();
        let mut files = BTreeMap::new();
        for i in 0..archive.len() {
            let mut entry = archive.by_index(i).unwrap();
            if entry.is_dir() {
                continue;
            }
            let mut content = Vec::new();
            entry.read_to_end(&mut content).unwrap();
            files.insert(entry.name().to_string(), content);
        }
        files
    }

    fn sample_tree() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(root, "function_app.py", b"import azure.functions as func\n");
        write(root, "requirements.txt", b"azure-functions\nopenai\n");
        write(root, "host.json", br#"{"version": "2.0"}"#);
        write(root, "agents/basic_agent.py", b"class BasicAgent: pass\n");
        write(root, "agents/__pycache__/basic_agent.cpython-311.pyc", &[0x42, 0x0d, 0x0d, 0x0a]);
        write(root, "__pycache__/x.pyc", &[0xde, 0xad]);
        write(root, ".pytest_cache/v/cache/lastfailed", b"{}");
        write(root, "utils/stale.pyo", b"old");
        write(root, "local.settings.json", br#"{"Values": {"AZURE_OPENAI_API_KEY": "secret"}}"#);
        write(root, "data/blob.bin", &(0..=255u8).collect::<Vec<_>>());
        dir
    }

    #[test]
    fn test_is_excluded() {
        assert!(is_excluded(Path::new("a/__pycache__"), true));
        assert!(is_excluded(Path::new(".pytest_cache"), true));
        assert!(is_excluded(Path::new("x.pyc"), false));
        assert!(is_excluded(Path::new("local.settings.json"), false));
        assert!(!is_excluded(Path::new("__pycache__"), false));
        assert!(!is_excluded(Path::new("function_app.py"), false));
        assert!(!is_excluded(Path::new("settings.json"), false));
    }

    #[test]
    fn test_package_excludes_and_preserves_bytes() {
        let tree = sample_tree();
        let artifact = package(tree.path()).unwrap();
        let files = read_archive(artifact.path());

        let names: Vec<&str> = files.keys().map(String::as_str).collect();
        assert_eq!(
            names,
            vec![
                "agents/basic_agent.py",
                "data/blob.bin",
                "function_app.py",
                "host.json",
                "requirements.txt",
            ]
        );
        for (name, content) in &files {
            assert_eq!(content, &fs::read(tree.path().join(name)).unwrap(), "{}", name);
        }
        assert_eq!(artifact.stats().files, 5);
    }

    #[test]
    fn test_artifact_is_discarded() {
        let tree = sample_tree();
        let artifact = package(tree.path()).unwrap();
        let path = artifact.path().to_path_buf();
        assert!(path.exists());

        artifact.discard().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_each_run_gets_its_own_directory() {
        let tree = sample_tree();
        let first = package(tree.path()).unwrap();
        let second = package(tree.path()).unwrap();
        assert_ne!(first.path(), second.path());
    }

    #[test]
    fn test_missing_source_is_actionable() {
        let dir = tempfile::tempdir().unwrap();
        let err = package(&dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, DeployError::SourceMissing(_)));
        assert!(err.to_string().contains("project root"));
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_entry_is_a_packaging_failure() {
        use std::os::unix::net::UnixListener;

        let tree = sample_tree();
        let socket = tree.path().join("sock");
        let _listener = UnixListener::bind(&socket).unwrap();

        let err = package(tree.path()).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::PackagingFailure);
        assert_eq!(err.exit_code(), 6);
        assert!(err.to_string().contains("sock"), "{}", err);
    }

    #[test]
    fn test_package_to_unwritable_output() {
        let tree = sample_tree();
        let output = tree.path().join("missing-dir").join("app.zip");

        let err = package_to(tree.path(), &output).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::PackagingFailure);
        assert!(err.to_string().contains("missing-dir"), "{}", err);
    }

    #[test]
    fn test_package_to_inside_tree_skips_itself() {
        let tree = sample_tree();
        let output = tree.path().join("release.zip");
        let stats = package_to(tree.path(), &output).unwrap();

        let files = read_archive(&output);
        assert!(!files.contains_key("release.zip"));
        assert_eq!(stats.files, files.len());
    }
}
