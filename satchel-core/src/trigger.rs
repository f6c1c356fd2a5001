//! Owner-level configuration and automatic classification hooks.
//!
//! An [`UploadHandler`] belongs to one controller (the "owner"). It holds the
//! owner option overrides and a list of hook registrations. The host
//! framework creates one [`UploadScope`] per call and hands it to
//! [`BeforeAction::before_action`] before running the action body.
//!
//! ```
//! use satchel_core::*;
//!
//! # async fn example(params: ParamBag) -> Result<()> {
//! let mut handler = UploadHandler::new();
//! handler.set_options(PartialOptions::new().upload_dir("/var/uploads").autosave(true));
//! handler.before_actions([("create", Some(FieldPattern::new("^avatar$")?))]);
//!
//! let mut scope = UploadScope::for_action("create", params);
//! handler.before_action(&mut scope).await?;
//!
//! if let Some(avatar) = scope.uploads().file("avatar") {
//!     println!("stored at {:?}", avatar.path());
//! }
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::{
    FieldPattern, ParamBag, ParamClassifier, PartialOptions, Result, UploadError, UploadOptions,
    Uploads,
};

/// State of one inbound call: its parameters and the uploads extracted
/// from them.
#[derive(Debug, Default)]
pub struct UploadScope {
    action: Option<String>,
    params: ParamBag,
    uploads: Uploads,
}

impl UploadScope {
    /// Scope for a call whose action name is unknown.
    pub fn new(params: ParamBag) -> Self {
        Self {
            action: None,
            params,
            uploads: Uploads::new(),
        }
    }

    /// Scope for a named action.
    pub fn for_action(action: impl Into<String>, params: ParamBag) -> Self {
        Self {
            action: Some(action.into()),
            ..Self::new(params)
        }
    }

    /// Name of the action being handled.
    pub fn action(&self) -> Option<&str> {
        self.action.as_deref()
    }

    /// Remaining parameters; uploads are gone once classified.
    pub fn params(&self) -> &ParamBag {
        &self.params
    }

    /// Remaining parameters, mutably.
    pub fn params_mut(&mut self) -> &mut ParamBag {
        &mut self.params
    }

    /// Every upload classified during this call.
    ///
    /// Empty when nothing has been classified yet or nothing matched.
    pub fn uploads(&self) -> &Uploads {
        &self.uploads
    }

    /// Uploads, mutably (e.g. to save them).
    pub fn uploads_mut(&mut self) -> &mut Uploads {
        &mut self.uploads
    }

    /// Split into parameters and uploads.
    pub fn into_parts(self) -> (ParamBag, Uploads) {
        (self.params, self.uploads)
    }

    /// Add `uploads` to the call's result. Earlier passes are kept; their
    /// files are no longer in the bag.
    fn record(&mut self, uploads: Uploads) {
        self.uploads.absorb(uploads);
    }
}

/// A hook the host framework runs before an action body.
#[async_trait]
pub trait BeforeAction: Send + Sync {
    /// Prepare the call scope.
    async fn before_action(&self, scope: &mut UploadScope) -> Result<()>;
}

#[derive(Debug, Clone)]
struct Registration {
    /// `None` fires for every action.
    action: Option<String>,
    pattern: Option<FieldPattern>,
}

impl Registration {
    fn applies_to(&self, action: Option<&str>) -> bool {
        match &self.action {
            None => true,
            Some(name) => action == Some(name.as_str()),
        }
    }
}

/// Owner of upload handling for one controller.
#[derive(Debug, Clone, Default)]
pub struct UploadHandler {
    options: UploadOptions,
    registrations: Vec<Registration>,
}

impl UploadHandler {
    /// Handler with global default options and no hooks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`set_options`](Self::set_options).
    pub fn with_options(mut self, options: PartialOptions) -> Self {
        self.set_options(options);
        self
    }

    /// Set the owner overrides, merged onto the global defaults.
    ///
    /// Files already classified keep the options they were created with.
    pub fn set_options(&mut self, options: PartialOptions) -> &mut Self {
        self.options = UploadOptions::default().merge(&options);
        self
    }

    /// Owner options in effect.
    pub fn options(&self) -> &UploadOptions {
        &self.options
    }

    /// Classifier carrying the current owner options.
    pub fn classifier(&self, pattern: Option<&FieldPattern>) -> ParamClassifier {
        ParamClassifier::new(self.options.clone()).with_pattern(pattern.cloned())
    }

    /// Classify the scope's parameters right now.
    pub fn classify_now<'s>(
        &self,
        scope: &'s mut UploadScope,
        pattern: Option<&FieldPattern>,
    ) -> &'s Uploads {
        let uploads = self.classifier(pattern).classify(&mut scope.params);
        scope.record(uploads);
        scope.uploads()
    }

    /// Classify before every action.
    pub fn before_all_actions(&mut self, pattern: Option<FieldPattern>) -> &mut Self {
        self.registrations.push(Registration {
            action: None,
            pattern,
        });
        self
    }

    /// Classify before the named actions, each with its own pattern.
    pub fn before_actions<I, S>(&mut self, actions: I) -> &mut Self
    where
        I: IntoIterator<Item = (S, Option<FieldPattern>)>,
        S: Into<String>,
    {
        self.registrations
            .extend(actions.into_iter().map(|(action, pattern)| Registration {
                action: Some(action.into()),
                pattern,
            }));
        self
    }

    /// Check if any hook fires for `action`.
    pub fn hooks_action(&self, action: Option<&str>) -> bool {
        self.registrations.iter().any(|r| r.applies_to(action))
    }
}

#[async_trait]
impl BeforeAction for UploadHandler {
    /// Run every registration that applies to the scope's action, then, with
    /// `autosave` on, save each file just extracted. Files from earlier
    /// passes are left alone. Every save is attempted;
    /// failures come back together as [`UploadError::Autosave`].
    async fn before_action(&self, scope: &mut UploadScope) -> Result<()> {
        let mut extracted = Uploads::new();
        for registration in &self.registrations {
            if registration.applies_to(scope.action()) {
                let classifier = self.classifier(registration.pattern.as_ref());
                extracted.absorb(classifier.classify(&mut scope.params));
            }
        }

        if extracted.is_empty() || !self.options.autosave {
            scope.record(extracted);
            return Ok(());
        }

        debug!(
            action = ?scope.action(),
            files = extracted.file_count(),
            "Autosaving uploads"
        );

        let failures = extracted.save_all().await;
        scope.record(extracted);
        if failures.is_empty() {
            return Ok(());
        }

        for (field, error) in &failures {
            warn!(field = %field, error = %error, "Autosave failed");
        }
        Err(UploadError::Autosave(failures))
    }
}
