//! Archive packing and extraction.
//!
//! Bundles are zip archives whose entry names are paths relative to the
//! packed directory. Tar archives (optionally gzip-compressed) are accepted
//! as template sources but never produced.

use crate::filters::ExclusionSet;
use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tar::Archive as TarArchive;
use tempfile::TempPath;
use tfkit_core::Error;
use tracing::{debug, warn};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Archive formats recognized by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Zip,
    Tar,
    TarGz,
}

impl ArchiveKind {
    /// Detect the archive format from a file name.
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_string_lossy().to_lowercase();
        if name.ends_with(".zip") {
            Some(Self::Zip)
        } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(Self::TarGz)
        } else if name.ends_with(".tar") {
            Some(Self::Tar)
        } else {
            None
        }
    }
}

fn io_error(path: &Path, source: io::Error) -> anyhow::Error {
    Error::from_io(path, source).into()
}

/// Pack `root` into a temporary zip file, leaving out `exclusions`.
///
/// The returned path is deleted when dropped.
pub fn pack_directory(root: &Path, exclusions: &ExclusionSet) -> Result<TempPath> {
    let temp = tempfile::Builder::new()
        .prefix("tfkit-bundle-")
        .suffix(".zip")
        .tempfile()
        .context("Failed to create temporary archive")?;
    let (file, archive_path) = temp.into_parts();

    let mut writer = ZipWriter::new(BufWriter::new(file));
    let mut file_count = 0usize;

    let walker = WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .filter_entry(|entry| !exclusions.is_excluded(entry.path()));

    for entry in walker {
        let entry = entry.with_context(|| format!("Failed to walk {}", root.display()))?;
        let path = entry.path();

        // Symlinks to directories are not descended into
        if !path.is_file() {
            continue;
        }

        let relative = path
            .strip_prefix(root)
            .with_context(|| format!("{} is not under {}", path.display(), root.display()))?;
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        let mut options =
            SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(path)
                .map_err(|e| io_error(path, e))?
                .permissions()
                .mode();
            options = options.unix_permissions(mode);
        }

        writer
            .start_file(name, options)
            .with_context(|| format!("Failed to add {} to archive", path.display()))?;
        let mut source = File::open(path).map_err(|e| io_error(path, e))?;
        io::copy(&mut source, &mut writer)
            .with_context(|| format!("Failed to compress {}", path.display()))?;
        file_count += 1;
    }

    let mut inner = writer.finish().context("Failed to finish archive")?;
    inner.flush().context("Failed to flush archive")?;

    debug!(
        "Packed {} files from {} into {}",
        file_count,
        root.display(),
        archive_path.display()
    );
    Ok(archive_path)
}

/// Extract a zip archive into `target`.
///
/// When `rebase` names a sub-path present in the archive, only entries under
/// it are extracted and the prefix is stripped, so its contents land at the
/// root of `target`. Otherwise the whole archive is extracted verbatim.
pub fn unpack_archive(archive: &Path, target: &Path, rebase: Option<&Path>) -> Result<PathBuf> {
    let file = File::open(archive).map_err(|e| io_error(archive, e))?;
    let mut zip = ZipArchive::new(BufReader::new(file))
        .with_context(|| format!("Failed to read zip archive {}", archive.display()))?;

    let prefix = rebase
        .filter(|prefix| !prefix.as_os_str().is_empty())
        .filter(|prefix| zip.file_names().any(|name| Path::new(name).starts_with(prefix)));
    match (rebase, prefix) {
        (Some(requested), None) => debug!(
            "Sub-path {} not found in archive, extracting everything",
            requested.display()
        ),
        (_, Some(prefix)) => debug!("Rebasing archive contents from {}", prefix.display()),
        _ => {}
    }

    std::fs::create_dir_all(target).map_err(|e| io_error(target, e))?;

    for index in 0..zip.len() {
        let mut entry = zip
            .by_index(index)
            .with_context(|| format!("Failed to read entry {} of {}", index, archive.display()))?;

        let Some(name) = entry.enclosed_name() else {
            warn!("Skipping archive entry with unsafe name: {}", entry.name());
            continue;
        };
        let relative = match prefix {
            Some(prefix) => match name.strip_prefix(prefix) {
                Ok(stripped) => stripped.to_path_buf(),
                Err(_) => continue,
            },
            None => name,
        };
        if relative.as_os_str().is_empty() {
            continue;
        }

        let out_path = target.join(&relative);
        if entry.is_dir() {
            std::fs::create_dir_all(&out_path).map_err(|e| io_error(&out_path, e))?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
        }
        let mut out_file = File::create(&out_path).map_err(|e| io_error(&out_path, e))?;
        io::copy(&mut entry, &mut out_file)
            .with_context(|| format!("Failed to extract {}", out_path.display()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = entry.unix_mode() {
                std::fs::set_permissions(&out_path, std::fs::Permissions::from_mode(mode))
                    .map_err(|e| io_error(&out_path, e))?;
            }
        }
    }

    Ok(target.to_path_buf())
}

/// Relative paths of the files stored in a zip archive
pub fn list_entries(archive: &Path) -> Result<Vec<PathBuf>> {
    let file = File::open(archive).map_err(|e| io_error(archive, e))?;
    let mut zip = ZipArchive::new(BufReader::new(file))
        .with_context(|| format!("Failed to read zip archive {}", archive.display()))?;

    let mut entries = Vec::with_capacity(zip.len());
    for index in 0..zip.len() {
        let entry = zip.by_index(index)?;
        if entry.is_dir() {
            continue;
        }
        if let Some(name) = entry.enclosed_name() {
            entries.push(name);
        }
    }
    Ok(entries)
}

/// Extract a tar archive, gzip-compressed when `compressed`.
pub fn unpack_tar(archive: &Path, target: &Path, compressed: bool) -> Result<PathBuf> {
    let file = File::open(archive).map_err(|e| io_error(archive, e))?;
    std::fs::create_dir_all(target).map_err(|e| io_error(target, e))?;

    let result = if compressed {
        TarArchive::new(GzDecoder::new(BufReader::new(file))).unpack(target)
    } else {
        TarArchive::new(BufReader::new(file)).unpack(target)
    };
    result.map_err(|e| {
        io_error(target, e).context(format!("Failed to extract {}", archive.display()))
    })?;

    Ok(target.to_path_buf())
}

/// Extract any recognized archive into `target`.
pub fn unpack_any(archive: &Path, target: &Path) -> Result<PathBuf> {
    match ArchiveKind::from_path(archive) {
        Some(ArchiveKind::Zip) => unpack_archive(archive, target, None),
        Some(ArchiveKind::Tar) => unpack_tar(archive, target, false),
        Some(ArchiveKind::TarGz) => unpack_tar(archive, target, true),
        None => Err(Error::invalid_config(format!(
            "Unsupported archive format: {}. Expected .zip, .tar, .tar.gz or .tgz",
            archive.display()
        ))
        .into()),
    }
}
