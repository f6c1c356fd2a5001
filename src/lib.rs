// Satchel - request-scoped upload extraction and persistence
//
// Pulls file uploads out of an already-parsed parameter bag and saves them
// to disk under a cascading options policy.

// Re-export core functionality
pub use satchel_core::*;

// Re-export optional crates
#[cfg(feature = "config")]
pub use satchel_config;

// Prelude for common imports
pub mod prelude {
    pub use crate::{
        BeforeAction,
        FieldPattern,
        ParamBag,
        ParamValue,
        PartialOptions,
        TempSource,
        UploadDescriptor,
        UploadDir,
        UploadError,
        UploadHandler,
        UploadOptions,
        UploadScope,
        UploadedFile,
        Uploads,
    };
}
