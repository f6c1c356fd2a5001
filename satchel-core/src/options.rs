//! Save options and their three-tier cascade.
//!
//! Options resolve in three steps, lowest precedence first:
//!
//! 1. [`UploadOptions::default()`] - fixed global defaults.
//! 2. Owner overrides - a [`PartialOptions`] merged onto the defaults by
//!    [`UploadHandler::set_options`](crate::UploadHandler::set_options). The
//!    result is snapshotted into every [`UploadedFile`](crate::UploadedFile)
//!    at classification time.
//! 3. Call overrides - a [`PartialOptions`] passed to
//!    [`UploadedFile::save_with`](crate::UploadedFile::save_with), applied for
//!    that call only.

use serde::{Deserialize, Deserializer};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

type DirFn = dyn Fn() -> PathBuf + Send + Sync;

/// Destination directory used when a save names no explicit path.
#[derive(Clone)]
pub enum UploadDir {
    /// A fixed directory.
    Path(PathBuf),
    /// A directory computed when the save happens.
    Deferred(Arc<DirFn>),
}

impl UploadDir {
    /// A fixed directory.
    pub fn path(path: impl Into<PathBuf>) -> Self {
        Self::Path(path.into())
    }

    /// A directory computed at save time, e.g. from per-request state.
    ///
    /// The closure runs once per implicit save, never at construction.
    pub fn deferred<F, P>(f: F) -> Self
    where
        F: Fn() -> P + Send + Sync + 'static,
        P: Into<PathBuf>,
    {
        Self::Deferred(Arc::new(move || f().into()))
    }

    /// Resolve the directory now.
    pub fn resolve(&self) -> PathBuf {
        match self {
            Self::Path(path) => path.clone(),
            Self::Deferred(f) => f(),
        }
    }

    /// Check if this directory is computed at save time.
    pub fn is_deferred(&self) -> bool {
        matches!(self, Self::Deferred(_))
    }
}

impl fmt::Debug for UploadDir {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(path) => f.debug_tuple("Path").field(path).finish(),
            Self::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}

impl From<PathBuf> for UploadDir {
    fn from(path: PathBuf) -> Self {
        Self::Path(path)
    }
}

impl From<&str> for UploadDir {
    fn from(path: &str) -> Self {
        Self::Path(PathBuf::from(path))
    }
}

impl From<String> for UploadDir {
    fn from(path: String) -> Self {
        Self::Path(PathBuf::from(path))
    }
}

impl<'de> Deserialize<'de> for UploadDir {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        PathBuf::deserialize(deserializer).map(Self::Path)
    }
}

/// Fully resolved save options.
#[derive(Debug, Clone, Default)]
pub struct UploadOptions {
    /// Replace an existing destination file.
    pub allow_overwrite: bool,
    /// Save every classified file right after an automatic classification.
    pub autosave: bool,
    /// Directory for saves without an explicit path.
    pub default_upload_dir: Option<UploadDir>,
    /// Delete the temporary source once a save succeeds.
    pub unlink_tempfile: bool,
}

impl UploadOptions {
    /// Global defaults: everything off, no upload directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge overrides key by key; only keys set in `overrides` replace values.
    pub fn merge(&self, overrides: &PartialOptions) -> Self {
        Self {
            allow_overwrite: overrides.allow_overwrite.unwrap_or(self.allow_overwrite),
            autosave: overrides.autosave.unwrap_or(self.autosave),
            default_upload_dir: overrides
                .default_upload_dir
                .clone()
                .or_else(|| self.default_upload_dir.clone()),
            unlink_tempfile: overrides.unlink_tempfile.unwrap_or(self.unlink_tempfile),
        }
    }
}

/// A sparse set of option overrides.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PartialOptions {
    /// Override for [`UploadOptions::allow_overwrite`].
    pub allow_overwrite: Option<bool>,
    /// Override for [`UploadOptions::autosave`].
    pub autosave: Option<bool>,
    /// Override for [`UploadOptions::default_upload_dir`].
    pub default_upload_dir: Option<UploadDir>,
    /// Override for [`UploadOptions::unlink_tempfile`].
    pub unlink_tempfile: Option<bool>,
}

impl PartialOptions {
    /// No overrides.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the overwrite override.
    pub fn allow_overwrite(mut self, allow: bool) -> Self {
        self.allow_overwrite = Some(allow);
        self
    }

    /// Set the autosave override.
    pub fn autosave(mut self, autosave: bool) -> Self {
        self.autosave = Some(autosave);
        self
    }

    /// Set the upload directory override.
    pub fn upload_dir(mut self, dir: impl Into<UploadDir>) -> Self {
        self.default_upload_dir = Some(dir.into());
        self
    }

    /// Set the temp-unlink override.
    pub fn unlink_tempfile(mut self, unlink: bool) -> Self {
        self.unlink_tempfile = Some(unlink);
        self
    }

    /// Layer `other` on top of `self`; keys set in `other` win.
    pub fn layer(mut self, other: PartialOptions) -> Self {
        if other.allow_overwrite.is_some() {
            self.allow_overwrite = other.allow_overwrite;
        }
        if other.autosave.is_some() {
            self.autosave = other.autosave;
        }
        if other.default_upload_dir.is_some() {
            self.default_upload_dir = other.default_upload_dir;
        }
        if other.unlink_tempfile.is_some() {
            self.unlink_tempfile = other.unlink_tempfile;
        }
        self
    }

    /// Check if no key is overridden.
    pub fn is_empty(&self) -> bool {
        self.allow_overwrite.is_none()
            && self.autosave.is_none()
            && self.default_upload_dir.is_none()
            && self.unlink_tempfile.is_none()
    }
}
