//! Upload classification.
//!
//! Scans a [`ParamBag`] for upload entries, turns them into
//! [`UploadedFile`]s and removes them from the bag. Everything that is not
//! an upload keeps its place and shape.

use futures::future::join_all;
use regex::Regex;
use std::collections::BTreeMap;
use std::str::FromStr;
use tracing::debug;

use crate::{ParamBag, ParamValue, Result, UploadError, UploadOptions, UploadedFile};

/// Restricts classification to field names matching a regular expression.
///
/// Matching is a search, not a full match: `avatar` matches `user[avatar]`.
#[derive(Debug, Clone)]
pub struct FieldPattern(Regex);

impl FieldPattern {
    /// Compile a pattern.
    pub fn new(pattern: &str) -> Result<Self> {
        Ok(Self(Regex::new(pattern)?))
    }

    /// Check if a field name matches.
    pub fn is_match(&self, name: &str) -> bool {
        self.0.is_match(name)
    }

    /// The source pattern.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<Regex> for FieldPattern {
    fn from(regex: Regex) -> Self {
        Self(regex)
    }
}

impl FromStr for FieldPattern {
    type Err = UploadError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

/// Uploads extracted from one field.
#[derive(Debug)]
pub enum UploadEntry {
    /// The field held a single upload.
    Single(UploadedFile),
    /// The field was multi-valued; files keep their original relative order.
    Many(Vec<UploadedFile>),
}

impl UploadEntry {
    /// All files of this entry.
    pub fn files(&self) -> &[UploadedFile] {
        match self {
            Self::Single(file) => std::slice::from_ref(file),
            Self::Many(files) => files,
        }
    }

    /// All files of this entry, mutably.
    pub fn files_mut(&mut self) -> &mut [UploadedFile] {
        match self {
            Self::Single(file) => std::slice::from_mut(file),
            Self::Many(files) => files,
        }
    }

    /// The file, if this entry came from a single-valued field.
    pub fn as_single(&self) -> Option<&UploadedFile> {
        match self {
            Self::Single(file) => Some(file),
            Self::Many(_) => None,
        }
    }

    /// The files, if this entry came from a multi-valued field.
    pub fn as_many(&self) -> Option<&[UploadedFile]> {
        match self {
            Self::Single(_) => None,
            Self::Many(files) => Some(files),
        }
    }

    /// Number of files.
    pub fn len(&self) -> usize {
        self.files().len()
    }

    /// Always false; entries are only created for fields with uploads.
    pub fn is_empty(&self) -> bool {
        self.files().is_empty()
    }

    fn into_files(self) -> Vec<UploadedFile> {
        match self {
            Self::Single(file) => vec![file],
            Self::Many(files) => files,
        }
    }

    /// Append the files of `other` after this entry's own.
    fn join(self, other: UploadEntry) -> UploadEntry {
        let mut files = self.into_files();
        files.extend(other.into_files());
        Self::Many(files)
    }
}

/// Result of a classification pass, keyed by field name.
///
/// Only fields that yielded at least one upload are present.
#[derive(Debug, Default)]
pub struct Uploads {
    entries: BTreeMap<String, UploadEntry>,
}

impl Uploads {
    /// Create an empty result.
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&mut self, name: String, entry: UploadEntry) {
        self.entries.insert(name, entry);
    }

    /// Move every entry of `other` into `self`. Files under a name that is
    /// already present are appended to it.
    pub(crate) fn absorb(&mut self, other: Uploads) {
        for (name, entry) in other.entries {
            let entry = match self.entries.remove(&name) {
                Some(existing) => existing.join(entry),
                None => entry,
            };
            self.entries.insert(name, entry);
        }
    }

    /// Get the entry for a field.
    pub fn get(&self, name: &str) -> Option<&UploadEntry> {
        self.entries.get(name)
    }

    /// Get the entry for a field mutably.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut UploadEntry> {
        self.entries.get_mut(name)
    }

    /// First file of a field.
    pub fn file(&self, name: &str) -> Option<&UploadedFile> {
        self.get(name).and_then(|entry| entry.files().first())
    }

    /// First file of a field, mutably.
    pub fn file_mut(&mut self, name: &str) -> Option<&mut UploadedFile> {
        self.get_mut(name)
            .and_then(|entry| entry.files_mut().first_mut())
    }

    /// Take an entry out of the result.
    pub fn take(&mut self, name: &str) -> Option<UploadEntry> {
        self.entries.remove(name)
    }

    /// Check if a field produced uploads.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Field names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Iterate over entries, sorted by field name.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &UploadEntry)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Iterate over every file with its field name.
    pub fn files(&self) -> impl Iterator<Item = (&str, &UploadedFile)> {
        self.iter()
            .flat_map(|(name, entry)| entry.files().iter().map(move |file| (name, file)))
    }

    /// Number of fields with uploads.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if nothing was extracted.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total number of files across all fields.
    pub fn file_count(&self) -> usize {
        self.entries.values().map(UploadEntry::len).sum()
    }

    /// Save every file not yet saved, into its configured upload directory.
    ///
    /// Saves run concurrently and independently: one failure neither stops
    /// nor rolls back the others. Returns the failures, labelled by field
    /// name (with the element index for multi-valued fields).
    pub async fn save_all(&mut self) -> Vec<(String, UploadError)> {
        let saves = self.entries.iter_mut().flat_map(|(name, entry)| {
            let many = matches!(entry, UploadEntry::Many(_));
            entry
                .files_mut()
                .iter_mut()
                .enumerate()
                .filter(|(_, file)| !file.saved())
                .map(move |(index, file)| async move {
                    let label = if many {
                        format!("{name}[{index}]")
                    } else {
                        name.clone()
                    };
                    (label, file.save().await)
                })
        });

        join_all(saves)
            .await
            .into_iter()
            .filter_map(|(label, result)| result.err().map(|e| (label, e)))
            .collect()
    }
}

impl IntoIterator for Uploads {
    type Item = (String, UploadEntry);
    type IntoIter = std::collections::btree_map::IntoIter<String, UploadEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// Extracts uploads from parameter bags.
#[derive(Debug, Clone, Default)]
pub struct ParamClassifier {
    options: UploadOptions,
    pattern: Option<FieldPattern>,
}

impl ParamClassifier {
    /// Create a classifier; `options` is snapshotted into every file.
    pub fn new(options: UploadOptions) -> Self {
        Self {
            options,
            pattern: None,
        }
    }

    /// Only look at fields matching `pattern`.
    pub fn with_pattern(mut self, pattern: Option<FieldPattern>) -> Self {
        self.pattern = pattern;
        self
    }

    /// Extract every upload from `bag`.
    ///
    /// Single-valued upload fields are removed. Multi-valued fields lose
    /// their upload elements and are removed only when nothing else is left.
    /// Fields without uploads, or not matching the pattern, are untouched.
    pub fn classify(&self, bag: &mut ParamBag) -> Uploads {
        let mut uploads = Uploads::new();

        let names: Vec<String> = bag
            .keys()
            .filter(|name| self.pattern.as_ref().is_none_or(|p| p.is_match(name)))
            .map(String::from)
            .collect();

        for name in names {
            let Some(value) = bag.get_mut(&name) else {
                continue;
            };

            match value {
                ParamValue::List(items) => {
                    let files = self.take_uploads(items);
                    if files.is_empty() {
                        continue;
                    }
                    if items.is_empty() {
                        bag.remove(&name);
                    }
                    debug!(field = %name, count = files.len(), "Extracted uploads");
                    uploads.insert(name, UploadEntry::Many(files));
                }
                ParamValue::Upload(_) => {
                    if let Some(ParamValue::Upload(descriptor)) = bag.remove(&name) {
                        debug!(field = %name, "Extracted upload");
                        let file = UploadedFile::from_descriptor(descriptor, self.options.clone());
                        uploads.insert(name, UploadEntry::Single(file));
                    }
                }
                _ => {}
            }
        }

        uploads
    }

    /// Remove upload elements from `items`, highest index first so earlier
    /// indices stay valid. Files come back in ascending index order.
    fn take_uploads(&self, items: &mut Vec<ParamValue>) -> Vec<UploadedFile> {
        let indices: Vec<usize> = items
            .iter()
            .enumerate()
            .filter(|(_, item)| item.is_upload())
            .map(|(i, _)| i)
            .collect();

        let mut files: Vec<UploadedFile> = indices
            .into_iter()
            .rev()
            .filter_map(|i| match items.remove(i) {
                ParamValue::Upload(descriptor) => Some(UploadedFile::from_descriptor(
                    descriptor,
                    self.options.clone(),
                )),
                _ => None,
            })
            .collect();

        files.reverse();
        files
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{PartialOptions, TempSource, UploadDescriptor};

    fn descriptor(name: &str) -> ParamValue {
        UploadDescriptor::new(name, "application/pdf", TempSource::from_path(format!("/tmp/{name}")))
            .with_field_name("docs[]")
            .into()
    }

    #[test]
    fn test_mixed_list_keeps_non_uploads() {
        let mut bag = ParamBag::new().with(
            "docs[]",
            vec![descriptor("a.pdf"), "notes".into(), descriptor("b.pdf")],
        );

        let uploads = ParamClassifier::default().classify(&mut bag);

        assert_eq!(
            bag.get("docs[]"),
            Some(&ParamValue::List(vec![ParamValue::scalar("notes")]))
        );
        let files = uploads.get("docs[]").and_then(UploadEntry::as_many).unwrap();
        let names: Vec<_> = files.iter().map(UploadedFile::filename).collect();
        assert_eq!(names, ["a.pdf", "b.pdf"]);
    }

    #[test]
    fn test_all_upload_list_removes_key() {
        let mut bag = ParamBag::new().with("docs[]", vec![descriptor("a.pdf"), descriptor("b.pdf")]);

        let uploads = ParamClassifier::default().classify(&mut bag);

        assert!(!bag.contains_key("docs[]"));
        assert_eq!(uploads.get("docs[]").map(UploadEntry::len), Some(2));
    }

    #[test]
    fn test_list_without_uploads_untouched() {
        let mut bag = ParamBag::new().with("tags[]", vec![ParamValue::scalar("a"), ParamValue::scalar("b")]);

        let uploads = ParamClassifier::default().classify(&mut bag);

        assert!(uploads.is_empty());
        assert!(!uploads.contains("tags[]"));
        assert_eq!(bag.get("tags[]").and_then(ParamValue::as_list).map(<[_]>::len), Some(2));
    }

    #[test]
    fn test_scalar_upload_removed() {
        let mut bag = ParamBag::new()
            .with("avatar", descriptor("me.png"))
            .with("name", "alice");

        let uploads = ParamClassifier::default().classify(&mut bag);

        assert!(!bag.contains_key("avatar"));
        assert_eq!(bag.get("name").and_then(ParamValue::as_scalar), Some("alice"));
        assert_eq!(uploads.file("avatar").map(UploadedFile::filename), Some("me.png"));
        assert!(uploads.get("avatar").and_then(UploadEntry::as_single).is_some());
        assert_eq!(uploads.file_count(), 1);
    }

    #[test]
    fn test_pattern_skips_non_matching() {
        let mut bag = ParamBag::new()
            .with("avatar", descriptor("me.png"))
            .with("resume", descriptor("cv.pdf"));

        let classifier =
            ParamClassifier::default().with_pattern(Some(FieldPattern::new("^av").unwrap()));
        let uploads = classifier.classify(&mut bag);

        assert_eq!(uploads.names().collect::<Vec<_>>(), ["avatar"]);
        assert!(bag.get("resume").is_some_and(ParamValue::is_upload));
    }

    #[test]
    fn test_second_pass_finds_nothing() {
        let mut bag = ParamBag::new()
            .with("avatar", descriptor("me.png"))
            .with("docs[]", vec![descriptor("a.pdf"), "keep".into()]);

        let classifier = ParamClassifier::default();
        assert_eq!(classifier.classify(&mut bag).len(), 2);
        assert!(classifier.classify(&mut bag).is_empty());
    }

    #[test]
    fn test_nested_maps_are_not_scanned() {
        let mut nested = std::collections::HashMap::new();
        nested.insert("photo".to_string(), descriptor("deep.png"));
        let mut bag = ParamBag::new().with("user", ParamValue::Map(nested));

        let uploads = ParamClassifier::default().classify(&mut bag);

        assert!(uploads.is_empty());
        assert!(matches!(bag.get("user"), Some(ParamValue::Map(_))));
    }

    #[test]
    fn test_options_snapshot() {
        let options = UploadOptions::default().merge(&PartialOptions::new().allow_overwrite(true));
        let mut bag = ParamBag::new().with("avatar", descriptor("me.png"));

        let uploads = ParamClassifier::new(options).classify(&mut bag);

        assert!(uploads.file("avatar").unwrap().options().allow_overwrite);
    }

    #[test]
    fn test_filename_sanitized_on_extract() {
        let mut bag = ParamBag::new().with("avatar", descriptor("../../etc/me.png"));
        let uploads = ParamClassifier::default().classify(&mut bag);
        assert_eq!(uploads.file("avatar").map(UploadedFile::filename), Some("me.png"));
    }

    #[test]
    fn test_invalid_pattern() {
        assert!(matches!(
            "(".parse::<FieldPattern>(),
            Err(UploadError::InvalidPattern(_))
        ));
    }

    #[tokio::test]
    async fn test_save_all_reports_each_failure() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("taken.txt"), b"old").unwrap();

        let ok = TempSource::from_bytes(b"one").unwrap();
        let clash = TempSource::from_bytes(b"two").unwrap();
        let mut bag = ParamBag::new().with(
            "files[]",
            vec![
                UploadDescriptor::new("fresh.txt", "text/plain", ok).into(),
                UploadDescriptor::new("taken.txt", "text/plain", clash).into(),
            ],
        );

        let options =
            UploadOptions::default().merge(&PartialOptions::new().upload_dir(dir.path().to_path_buf()));
        let mut uploads = ParamClassifier::new(options).classify(&mut bag);
        let failures = uploads.save_all().await;

        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, "files[][1]");
        assert!(failures[0].1.is_overwrite_denied());

        let files = uploads.get("files[]").unwrap().files();
        assert!(files[0].saved());
        assert!(!files[1].saved());
        assert_eq!(std::fs::read(dir.path().join("fresh.txt")).unwrap(), b"one");
    }
}
