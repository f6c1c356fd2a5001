//! Classified upload handles and the save engine.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufReader};
use tracing::{debug, warn};

use crate::{PartialOptions, Result, TempSource, UploadDescriptor, UploadError, UploadOptions};

/// Read buffer used when streaming a temp source to its destination.
const COPY_BUFFER_SIZE: usize = 64 * 1024;

/// A file written to its final destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedFile {
    /// Absolute destination path.
    pub path: PathBuf,
    /// Bytes written.
    pub size: u64,
}

/// An upload extracted from a parameter bag.
///
/// Created by classification only. Owns its temp source exclusively and
/// carries the owner options that were in effect when it was created.
#[derive(Debug)]
pub struct UploadedFile {
    filename: String,
    mime_type: String,
    temp_path: PathBuf,
    temp_source: Option<TempSource>,
    real_file: Option<SavedFile>,
    options: UploadOptions,
}

impl UploadedFile {
    pub(crate) fn from_descriptor(descriptor: UploadDescriptor, options: UploadOptions) -> Self {
        let UploadDescriptor {
            filename,
            mime_type,
            temp_source,
            ..
        } = descriptor;

        Self {
            filename: basename(&filename),
            mime_type,
            temp_path: temp_source.path().to_path_buf(),
            temp_source: Some(temp_source),
            real_file: None,
            options,
        }
    }

    /// Sanitized file name; never contains a directory component.
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Replace the file name. Only the last path segment is kept.
    pub fn set_filename(&mut self, name: &str) {
        self.filename = basename(name);
    }

    /// Get the file extension.
    pub fn extension(&self) -> Option<&str> {
        Path::new(&self.filename)
            .extension()
            .and_then(|ext| ext.to_str())
    }

    /// Declared MIME type.
    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// Options snapshot taken at classification time.
    pub fn options(&self) -> &UploadOptions {
        &self.options
    }

    /// Location of the temp source, while this file still holds it.
    pub fn temp_path(&self) -> Option<&Path> {
        self.temp_source.as_ref().map(TempSource::path)
    }

    /// Check if the file has been written to its destination.
    pub fn saved(&self) -> bool {
        self.real_file.is_some()
    }

    /// Destination path, once saved.
    pub fn path(&self) -> Option<&Path> {
        self.real_file.as_ref().map(|f| f.path.as_path())
    }

    /// Bytes written, once saved.
    pub fn size(&self) -> Option<u64> {
        self.real_file.as_ref().map(|f| f.size)
    }

    /// The written file, once saved.
    pub fn saved_file(&self) -> Option<&SavedFile> {
        self.real_file.as_ref()
    }

    /// Save into the configured upload directory.
    pub async fn save(&mut self) -> Result<PathBuf> {
        self.save_with(None, &PartialOptions::default()).await
    }

    /// Save to an explicit destination.
    pub async fn save_to(&mut self, path: impl AsRef<Path>) -> Result<PathBuf> {
        self.save_with(Some(path.as_ref()), &PartialOptions::default())
            .await
    }

    /// Save with per-call option overrides.
    ///
    /// Without `path` the destination is `default_upload_dir/filename`; a
    /// deferred directory is resolved here. Checks run in order and the
    /// first failure is returned: existing destination without
    /// `allow_overwrite`, unreadable temp source, unwritable destination.
    ///
    /// Bytes are streamed, never buffered whole. A failure mid-copy leaves
    /// the partially written destination in place.
    pub async fn save_with(
        &mut self,
        path: Option<&Path>,
        overrides: &PartialOptions,
    ) -> Result<PathBuf> {
        let options = self.options.merge(overrides);

        let target = match path {
            Some(path) => path.to_path_buf(),
            None => self.implicit_path(&options)?,
        };
        let target = absolutize(&target)?;

        self.validate(&target, &options).await?;

        let size = self.stream_to(&target, &options).await?;
        debug!(path = ?target, size, mime = %self.mime_type, "Saved upload");

        self.real_file = Some(SavedFile {
            path: target.clone(),
            size,
        });

        if options.unlink_tempfile {
            self.unlink_temp().await;
        }

        Ok(target)
    }

    fn implicit_path(&self, options: &UploadOptions) -> Result<PathBuf> {
        let dir = options
            .default_upload_dir
            .as_ref()
            .ok_or(UploadError::MissingConfig)?;

        if self.filename.is_empty() {
            return Err(UploadError::MissingFilename);
        }

        Ok(dir.resolve().join(&self.filename))
    }

    async fn validate(&self, target: &Path, options: &UploadOptions) -> Result<()> {
        let exists = fs::metadata(target).await.is_ok();

        if exists && !options.allow_overwrite {
            return Err(UploadError::OverwriteDenied(target.to_path_buf()));
        }

        if !self.source_readable().await {
            return Err(UploadError::SourceUnreadable(self.temp_path.clone()));
        }

        let writable = (exists && file_writable(target).await)
            || match target.parent() {
                Some(parent) => dir_writable(parent).await,
                None => false,
            };
        if !writable {
            return Err(UploadError::DestinationUnwritable(target.to_path_buf()));
        }

        Ok(())
    }

    async fn source_readable(&self) -> bool {
        match &self.temp_source {
            Some(source) => {
                fs::metadata(source.path())
                    .await
                    .is_ok_and(|m| m.is_file())
                    && File::open(source.path()).await.is_ok()
            }
            None => false,
        }
    }

    /// Without `allow_overwrite` the destination is created exclusively, so
    /// two saves racing for one path cannot both write it.
    async fn stream_to(&self, target: &Path, options: &UploadOptions) -> Result<u64> {
        let source = self
            .temp_source
            .as_ref()
            .ok_or_else(|| UploadError::SourceUnreadable(self.temp_path.clone()))?;

        let input = File::open(source.path()).await?;
        let mut reader = BufReader::with_capacity(COPY_BUFFER_SIZE, input);
        let mut writer = if options.allow_overwrite {
            File::create(target).await?
        } else {
            OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(target)
                .await
                .map_err(|e| match e.kind() {
                    ErrorKind::AlreadyExists => {
                        UploadError::OverwriteDenied(target.to_path_buf())
                    }
                    _ => UploadError::Io(e),
                })?
        };
        let size = tokio::io::copy_buf(&mut reader, &mut writer).await?;
        writer.flush().await?;

        Ok(size)
    }

    async fn unlink_temp(&mut self) {
        if let Some(source) = self.temp_source.take() {
            if let Err(e) = source.remove().await {
                warn!(path = ?self.temp_path, error = %e, "Failed to remove temp source");
            } else {
                debug!(path = ?self.temp_path, "Removed temp source");
            }
        }
    }
}

/// Keep only the last path segment; `/` and `\` both separate.
fn basename(name: &str) -> String {
    match name.rsplit(['/', '\\']).next().unwrap_or_default() {
        "." | ".." => String::new(),
        base => base.to_string(),
    }
}

/// Make `path` absolute and fold `.` and `..` lexically.
fn absolutize(path: &Path) -> Result<PathBuf> {
    let absolute = std::path::absolute(path)?;

    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other),
        }
    }

    Ok(normalized)
}

async fn file_writable(path: &Path) -> bool {
    OpenOptions::new().write(true).open(path).await.is_ok()
}

async fn dir_writable(dir: &Path) -> bool {
    if !fs::metadata(dir).await.is_ok_and(|m| m.is_dir()) {
        return false;
    }

    let dir = dir.to_path_buf();
    tokio::task::spawn_blocking(move || {
        tempfile::Builder::new()
            .prefix(".satchel-probe-")
            .tempfile_in(&dir)
            .is_ok()
    })
    .await
    .unwrap_or(false)
}
