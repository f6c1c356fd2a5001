//! Parameter bag model.
//!
//! A [`ParamBag`] holds already-parsed request parameters. Upload entries are
//! an explicit [`ParamValue::Upload`] variant, so classification never has to
//! probe record shapes. Loosely typed input (JSON) is converted at the
//! boundary by [`ParamBag::from_json`], which is the only place the five-field
//! descriptor fingerprint is checked.

use serde_json::Value;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::{Result, UploadError};

/// Owned handle to the materialized bytes of one upload.
///
/// Never cloned: exactly one [`UploadDescriptor`] (and later one
/// [`UploadedFile`](crate::UploadedFile)) owns it.
#[derive(Debug)]
pub enum TempSource {
    /// A file owned by the caller, e.g. spooled by the HTTP layer.
    Path(PathBuf),
    /// A temporary file removed when the handle is dropped.
    Temp(tempfile::TempPath),
}

impl TempSource {
    /// Wrap an existing file.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self::Path(path.into())
    }

    /// Spool bytes into a fresh temporary file.
    pub fn from_bytes(data: impl AsRef<[u8]>) -> Result<Self> {
        let mut file = tempfile::Builder::new().prefix(".satchel-").tempfile()?;
        file.write_all(data.as_ref())?;
        file.flush()?;
        Ok(Self::Temp(file.into_temp_path()))
    }

    /// Location of the bytes on disk.
    pub fn path(&self) -> &Path {
        match self {
            Self::Path(path) => path,
            Self::Temp(temp) => temp,
        }
    }

    /// Delete the underlying file.
    pub async fn remove(self) -> std::io::Result<()> {
        match self {
            Self::Path(path) => tokio::fs::remove_file(path).await,
            Self::Temp(temp) => temp.close(),
        }
    }
}

impl PartialEq for TempSource {
    fn eq(&self, other: &Self) -> bool {
        self.path() == other.path()
    }
}

/// One raw uploaded file, before classification.
#[derive(Debug, PartialEq)]
pub struct UploadDescriptor {
    /// Client-supplied file name, possibly with directory components.
    pub filename: String,
    /// Declared MIME type.
    pub mime_type: String,
    /// Name of the form field the file arrived in.
    pub field_name: String,
    /// The uploaded bytes.
    pub temp_source: TempSource,
    /// Raw part headers.
    pub headers: String,
}

impl UploadDescriptor {
    /// Create a descriptor with empty field name and headers.
    pub fn new(
        filename: impl Into<String>,
        mime_type: impl Into<String>,
        temp_source: TempSource,
    ) -> Self {
        Self {
            filename: filename.into(),
            mime_type: mime_type.into(),
            field_name: String::new(),
            temp_source,
            headers: String::new(),
        }
    }

    /// Set the originating field name.
    pub fn with_field_name(mut self, name: impl Into<String>) -> Self {
        self.field_name = name.into();
        self
    }

    /// Set the raw header block.
    pub fn with_headers(mut self, headers: impl Into<String>) -> Self {
        self.headers = headers.into();
        self
    }

    /// Build a descriptor from a JSON object carrying exactly the five
    /// descriptor fields. Returns `Ok(None)` when the fingerprint does not
    /// match, so the object can be kept as an ordinary record.
    pub fn from_json(object: &serde_json::Map<String, Value>) -> Result<Option<Self>> {
        if object.len() != DESCRIPTOR_FIELDS.len() {
            return Ok(None);
        }

        let mut found: [Option<&Value>; 5] = [None; 5];
        for (key, value) in object {
            let Some(slot) = DESCRIPTOR_FIELDS
                .iter()
                .position(|aliases| aliases.contains(&key.as_str()))
            else {
                return Ok(None);
            };
            if found[slot].replace(value).is_some() {
                return Ok(None);
            }
        }

        let [Some(filename), Some(mime_type), Some(field_name), Some(temp), Some(headers)] = found
        else {
            return Ok(None);
        };

        let temp = temp
            .as_str()
            .ok_or_else(|| UploadError::InvalidParams("tempfile must be a path".to_string()))?;

        Ok(Some(Self {
            filename: required_str(filename, "filename")?,
            mime_type: required_str(mime_type, "content_type")?,
            field_name: opaque_str(field_name),
            temp_source: TempSource::from_path(temp),
            headers: opaque_str(headers),
        }))
    }
}

/// Accepted spellings for each descriptor field, in slot order.
const DESCRIPTOR_FIELDS: [&[&str]; 5] = [
    &["filename"],
    &["content_type", "mime_type", "mimeType"],
    &["original_field_name", "originalFieldName"],
    &["tempfile", "temp_source", "tempSource"],
    &["headers", "header_block", "headerBlock"],
];

fn required_str(value: &Value, name: &str) -> Result<String> {
    value
        .as_str()
        .map(String::from)
        .ok_or_else(|| UploadError::InvalidParams(format!("{name} must be a string")))
}

fn opaque_str(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// A single parameter value.
#[derive(Debug, PartialEq)]
pub enum ParamValue {
    /// Plain value.
    Scalar(String),
    /// An uploaded file.
    Upload(UploadDescriptor),
    /// Multi-valued field; element order follows the wire order.
    List(Vec<ParamValue>),
    /// Nested record that is not an upload.
    Map(HashMap<String, ParamValue>),
}

impl ParamValue {
    /// Create a scalar value.
    pub fn scalar(value: impl Into<String>) -> Self {
        Self::Scalar(value.into())
    }

    /// Check if this value is an upload.
    pub fn is_upload(&self) -> bool {
        matches!(self, Self::Upload(_))
    }

    /// Get the scalar string, if any.
    pub fn as_scalar(&self) -> Option<&str> {
        match self {
            Self::Scalar(s) => Some(s),
            _ => None,
        }
    }

    /// Get the list elements, if any.
    pub fn as_list(&self) -> Option<&[ParamValue]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Convert loosely typed JSON into a parameter value.
    ///
    /// Numbers and booleans become their textual form, `null` an empty
    /// scalar. Objects matching the descriptor fingerprint become uploads.
    pub fn from_json(value: Value) -> Result<Self> {
        Ok(match value {
            Value::Null => Self::Scalar(String::new()),
            Value::Bool(b) => Self::Scalar(b.to_string()),
            Value::Number(n) => Self::Scalar(n.to_string()),
            Value::String(s) => Self::Scalar(s),
            Value::Array(items) => Self::List(
                items
                    .into_iter()
                    .map(Self::from_json)
                    .collect::<Result<_>>()?,
            ),
            Value::Object(object) => match UploadDescriptor::from_json(&object)? {
                Some(descriptor) => Self::Upload(descriptor),
                None => Self::Map(
                    object
                        .into_iter()
                        .map(|(k, v)| Ok((k, Self::from_json(v)?)))
                        .collect::<Result<_>>()?,
                ),
            },
        })
    }
}

impl From<UploadDescriptor> for ParamValue {
    fn from(descriptor: UploadDescriptor) -> Self {
        Self::Upload(descriptor)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::Scalar(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        Self::Scalar(value)
    }
}

impl From<Vec<ParamValue>> for ParamValue {
    fn from(items: Vec<ParamValue>) -> Self {
        Self::List(items)
    }
}

/// Request parameters keyed by field name.
#[derive(Debug, Default, PartialEq)]
pub struct ParamBag {
    fields: HashMap<String, ParamValue>,
}

impl ParamBag {
    /// Create an empty bag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field (builder style).
    pub fn with(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.insert(name, value);
        self
    }

    /// Insert a field, returning the previous value.
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        value: impl Into<ParamValue>,
    ) -> Option<ParamValue> {
        self.fields.insert(name.into(), value.into())
    }

    /// Get a field.
    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.fields.get(name)
    }

    /// Get a field mutably.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut ParamValue> {
        self.fields.get_mut(name)
    }

    /// Remove a field.
    pub fn remove(&mut self, name: &str) -> Option<ParamValue> {
        self.fields.remove(name)
    }

    /// Check if a field exists.
    pub fn contains_key(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Field names, in no particular order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Iterate over fields.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Check if the bag is empty.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Build a bag from a JSON object.
    pub fn from_json(value: Value) -> Result<Self> {
        let Value::Object(object) = value else {
            return Err(UploadError::InvalidParams(
                "parameters must be a JSON object".to_string(),
            ));
        };

        let fields = object
            .into_iter()
            .map(|(k, v)| Ok((k, ParamValue::from_json(v)?)))
            .collect::<Result<_>>()?;

        Ok(Self { fields })
    }
}

impl From<HashMap<String, ParamValue>> for ParamBag {
    fn from(fields: HashMap<String, ParamValue>) -> Self {
        Self { fields }
    }
}

impl FromIterator<(String, ParamValue)> for ParamBag {
    fn from_iter<I: IntoIterator<Item = (String, ParamValue)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_detects_descriptor() {
        let bag = ParamBag::from_json(json!({
            "title": "Holiday",
            "photo": {
                "filename": "beach.jpg",
                "content_type": "image/jpeg",
                "original_field_name": "photo",
                "tempfile": "/tmp/upload-1",
                "headers": "Content-Disposition: form-data; name=\"photo\""
            }
        }))
        .unwrap();

        assert_eq!(bag.get("title").and_then(ParamValue::as_scalar), Some("Holiday"));
        match bag.get("photo") {
            Some(ParamValue::Upload(d)) => {
                assert_eq!(d.filename, "beach.jpg");
                assert_eq!(d.mime_type, "image/jpeg");
                assert_eq!(d.temp_source.path(), Path::new("/tmp/upload-1"));
            }
            other => panic!("expected upload, got {other:?}"),
        }
    }

    #[test]
    fn test_from_json_camel_case_fields() {
        let value = ParamValue::from_json(json!({
            "filename": "a.txt",
            "mimeType": "text/plain",
            "originalFieldName": "doc",
            "tempSource": "/tmp/a",
            "headerBlock": null
        }))
        .unwrap();

        assert!(value.is_upload());
    }

    #[test]
    fn test_from_json_partial_fingerprint_is_a_map() {
        // Only four of the five fields.
        let value = ParamValue::from_json(json!({
            "filename": "a.txt",
            "content_type": "text/plain",
            "tempfile": "/tmp/a",
            "headers": ""
        }))
        .unwrap();
        assert!(matches!(value, ParamValue::Map(_)));

        // Five fields plus an extra one.
        let value = ParamValue::from_json(json!({
            "filename": "a.txt",
            "content_type": "text/plain",
            "original_field_name": "doc",
            "tempfile": "/tmp/a",
            "headers": "",
            "extra": 1
        }))
        .unwrap();
        assert!(matches!(value, ParamValue::Map(_)));
    }

    #[test]
    fn test_from_json_rejects_bad_tempfile() {
        let result = ParamValue::from_json(json!({
            "filename": "a.txt",
            "content_type": "text/plain",
            "original_field_name": "doc",
            "tempfile": 42,
            "headers": ""
        }));

        assert!(matches!(result, Err(UploadError::InvalidParams(_))));
    }

    #[test]
    fn test_from_json_scalars_and_lists() {
        let bag = ParamBag::from_json(json!({"n": 3, "flag": true, "tags": ["a", "b"]})).unwrap();

        assert_eq!(bag.get("n").and_then(ParamValue::as_scalar), Some("3"));
        assert_eq!(bag.get("flag").and_then(ParamValue::as_scalar), Some("true"));
        assert_eq!(bag.get("tags").and_then(ParamValue::as_list).map(<[_]>::len), Some(2));
        assert!(ParamBag::from_json(json!([1, 2])).is_err());
    }

    #[test]
    fn test_temp_source_from_bytes() {
        let source = TempSource::from_bytes(b"payload").unwrap();
        let path = source.path().to_path_buf();

        assert_eq!(std::fs::read(&path).unwrap(), b"payload");
        drop(source);
        assert!(!path.exists());
    }
}
