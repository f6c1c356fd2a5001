//! Upload extraction and persistence for Satchel
//!
//! This crate provides:
//! - A typed parameter bag model with explicit upload entries
//! - Classification of uploads out of a parameter bag
//! - Upload handles that stream their bytes to disk
//! - A three-tier save options cascade (defaults, owner, call)
//! - Before-action hooks with optional autosave
//!
//! # Quick Start
//!
//! ```no_run
//! use satchel_core::*;
//!
//! # async fn example() -> Result<()> {
//! let source = TempSource::from_bytes(b"file data")?;
//! let mut params = ParamBag::new()
//!     .with("avatar", UploadDescriptor::new("me.png", "image/png", source))
//!     .with("name", "alice");
//!
//! let options = UploadOptions::default()
//!     .merge(&PartialOptions::new().upload_dir("/var/uploads"));
//! let mut uploads = ParamClassifier::new(options).classify(&mut params);
//!
//! if let Some(avatar) = uploads.file_mut("avatar") {
//!     let path = avatar.save().await?;
//!     println!("Saved: {}", path.display());
//! }
//! # Ok(())
//! # }
//! ```

pub mod classifier;
pub mod error;
pub mod file;
pub mod options;
pub mod params;
pub mod trigger;

pub use classifier::*;
pub use error::*;
pub use file::*;
pub use options::*;
pub use params::*;
pub use trigger::*;
