//! Filtered extraction of image archives.
//!
//! Archives may carry character or block device members; those are never
//! created on disk. Members whose path would land outside the target are
//! rejected outright.
//!
//! Modes are restored in full, including setuid, setgid and sticky bits.
//! Owners and extended attributes are restored only when running as root.

use std::fs::File;
use std::io::Read;
use std::path::{Component, Path};

use pocker_common::error::{PockerError, Result};

/// Compression of an image archive, derived from its file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    /// Plain tar.
    None,
    /// Gzip-compressed tar.
    Gzip,
}

impl Compression {
    /// Detects the compression of `path` from its extension.
    #[must_use]
    pub fn detect(path: &Path) -> Self {
        let gzip = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("gz") || ext.eq_ignore_ascii_case("tgz"));
        if gzip { Self::Gzip } else { Self::None }
    }
}

/// Counters of one extraction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractStats {
    /// Members written to disk.
    pub unpacked: u64,
    /// Device members dropped.
    pub skipped_devices: u64,
}

/// Extracts `archive_path` into the existing directory `target`.
///
/// # Errors
///
/// Returns [`PockerError::Io`] if the archive cannot be opened and
/// [`PockerError::Archive`] if it is corrupt, a member escapes `target`,
/// or a member cannot be written.
pub fn extract_archive(archive_path: &Path, target: &Path) -> Result<ExtractStats> {
    tracing::info!(
        archive = %archive_path.display(),
        target = %target.display(),
        "extracting image"
    );
    let file = File::open(archive_path).map_err(|e| PockerError::Io {
        path: archive_path.to_path_buf(),
        source: e,
    })?;

    let stats = match Compression::detect(archive_path) {
        Compression::Gzip => unpack(
            tar::Archive::new(flate2::read::GzDecoder::new(file)),
            archive_path,
            target,
        )?,
        Compression::None => unpack(tar::Archive::new(file), archive_path, target)?,
    };

    tracing::info!(
        unpacked = stats.unpacked,
        skipped_devices = stats.skipped_devices,
        "image extracted"
    );
    Ok(stats)
}

fn unpack<R: Read>(
    mut archive: tar::Archive<R>,
    archive_path: &Path,
    target: &Path,
) -> Result<ExtractStats> {
    let archive_error = |message: String| PockerError::Archive {
        path: archive_path.to_path_buf(),
        message,
    };

    let privileged = nix::unistd::geteuid().is_root();
    archive.set_preserve_permissions(true);
    archive.set_preserve_ownerships(privileged);
    archive.set_unpack_xattrs(privileged);

    let mut stats = ExtractStats::default();
    let mut directories = Vec::new();
    let entries = archive
        .entries()
        .map_err(|e| archive_error(format!("unreadable archive: {e}")))?;

    for entry in entries {
        let mut entry = entry.map_err(|e| archive_error(format!("corrupt member: {e}")))?;
        let member = entry
            .path()
            .map_err(|e| archive_error(format!("invalid member path: {e}")))?
            .into_owned();

        let kind = entry.header().entry_type();
        if kind.is_character_special() || kind.is_block_special() {
            tracing::debug!(member = %member.display(), "skipping device member");
            stats.skipped_devices += 1;
            continue;
        }

        if member.components().any(|c| c == Component::ParentDir) {
            return Err(archive_error(format!(
                "member {} escapes the extraction root",
                member.display()
            )));
        }

        // Directory modes are applied last so a read-only directory does
        // not block its own members.
        if kind.is_dir() {
            directories.push((member, entry));
            continue;
        }
        unpack_member(&mut entry, &member, target).map_err(archive_error)?;
        stats.unpacked += 1;
    }

    directories.sort_by(|(a, _), (b, _)| b.cmp(a));
    for (member, mut entry) in directories {
        unpack_member(&mut entry, &member, target).map_err(archive_error)?;
        stats.unpacked += 1;
    }
    Ok(stats)
}

fn unpack_member<R: Read>(
    entry: &mut tar::Entry<'_, R>,
    member: &Path,
    target: &Path,
) -> std::result::Result<(), String> {
    let written = entry
        .unpack_in(target)
        .map_err(|e| format!("cannot extract {}: {e}", member.display()))?;
    if written {
        Ok(())
    } else {
        Err(format!("member {} escapes the extraction root", member.display()))
    }
}
