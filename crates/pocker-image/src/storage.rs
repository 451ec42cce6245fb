//! Local image store.
//!
//! Layout under the image directory:
//!
//! ```text
//! <image_dir>/<name>.tar        archive (or .tar.gz / .tgz)
//! <image_dir>/<name>/rootfs     cached extraction, shared read-only
//! ```
//!
//! The cache is published with a single `rename(2)` from a staging
//! directory next to it, so a reader either sees a complete `rootfs` or
//! none at all, and concurrent first launches of the same image never
//! extract into the same directory.

use std::fs::Permissions;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use pocker_common::constants::{COMPRESSED_IMAGE_SUFFIXES, IMAGE_SUFFIX, ROOTFS_DIR};
use pocker_common::error::{PockerError, Result};
use pocker_common::types::validate_image_name;

use crate::layer;

/// Prefix of staging directories inside an image's cache directory.
const STAGING_PREFIX: &str = ".rootfs-staging-";

/// Mode of a published rootfs; staging directories start out as 0700.
const ROOTFS_MODE: u32 = 0o755;

/// Image archives and their cached extractions.
#[derive(Debug, Clone)]
pub struct ImageStore {
    root: PathBuf,
}

impl ImageStore {
    /// Opens the store rooted at `image_dir`. Nothing is touched on disk.
    pub fn open(image_dir: impl Into<PathBuf>) -> Self {
        let root = image_dir.into();
        tracing::debug!(path = %root.display(), "opening image store");
        Self { root }
    }

    /// Image directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Archive paths probed for `name`, in order.
    #[must_use]
    pub fn archive_candidates(&self, name: &str) -> Vec<PathBuf> {
        std::iter::once(IMAGE_SUFFIX)
            .chain(COMPRESSED_IMAGE_SUFFIXES)
            .map(|suffix| self.root.join(format!("{name}.{suffix}")))
            .collect()
    }

    /// Cached extraction of `name`.
    #[must_use]
    pub fn rootfs_path(&self, name: &str) -> PathBuf {
        self.root.join(name).join(ROOTFS_DIR)
    }

    /// Whether `name` has already been extracted.
    #[must_use]
    pub fn is_cached(&self, name: &str) -> bool {
        self.rootfs_path(name).is_dir()
    }

    /// Returns the archive of image `name`.
    ///
    /// # Errors
    ///
    /// Returns [`PockerError::Config`] for an unusable name and
    /// [`PockerError::ImageNotFound`] if no archive exists.
    pub fn resolve(&self, name: &str) -> Result<PathBuf> {
        validate_image_name(name)?;
        let candidates = self.archive_candidates(name);
        if let Some(found) = candidates.iter().find(|path| path.is_file()) {
            return Ok(found.clone());
        }
        Err(PockerError::ImageNotFound {
            name: name.to_string(),
            path: candidates
                .into_iter()
                .next()
                .unwrap_or_else(|| self.root.join(name)),
        })
    }

    /// Returns the cached rootfs of `name`, extracting it on first use.
    ///
    /// An existing cache is reused as is. Otherwise the archive is
    /// extracted into a staging directory which is then renamed into place;
    /// if another launch published first, the staging copy is discarded and
    /// the winner reused. A failed extraction leaves no `rootfs` behind.
    ///
    /// # Errors
    ///
    /// Returns [`PockerError::ImageNotFound`] if the archive is missing,
    /// [`PockerError::Archive`] if extraction fails and
    /// [`PockerError::Io`] if the cache cannot be written.
    pub fn materialize(&self, name: &str) -> Result<PathBuf> {
        let archive = self.resolve(name)?;
        let rootfs = self.rootfs_path(name);
        if rootfs.is_dir() {
            tracing::debug!(image = name, rootfs = %rootfs.display(), "reusing cached image");
            return Ok(rootfs);
        }

        let cache_dir = self.root.join(name);
        std::fs::create_dir_all(&cache_dir).map_err(|e| PockerError::Io {
            path: cache_dir.clone(),
            source: e,
        })?;
        let staging = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempdir_in(&cache_dir)
            .map_err(|e| PockerError::Io {
                path: cache_dir.clone(),
                source: e,
            })?;

        let _ = layer::extract_archive(&archive, staging.path())?;
        std::fs::set_permissions(staging.path(), Permissions::from_mode(ROOTFS_MODE)).map_err(
            |e| PockerError::Io {
                path: staging.path().to_path_buf(),
                source: e,
            },
        )?;

        match std::fs::rename(staging.path(), &rootfs) {
            Ok(()) => {
                tracing::info!(image = name, rootfs = %rootfs.display(), "image cache published");
                Ok(rootfs)
            }
            Err(e) if rootfs.is_dir() && is_lost_race(&e) => {
                tracing::warn!(image = name, "image cache published concurrently, discarding own copy");
                Ok(rootfs)
            }
            Err(e) => Err(PockerError::Io {
                path: rootfs,
                source: e,
            }),
        }
    }
}

fn is_lost_race(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::AlreadyExists | io::ErrorKind::DirectoryNotEmpty
    )
}
