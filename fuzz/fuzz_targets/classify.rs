//! Fuzz target for upload classification.
//!
//! Builds arbitrary bags of scalar, upload and list fields and checks the
//! shape of the bag and the result after classification.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use satchel_core::{FieldPattern, ParamBag, ParamClassifier, ParamValue, TempSource, UploadDescriptor};

#[derive(Debug, Arbitrary)]
enum FuzzValue {
    Scalar(String),
    Upload(String),
    List(Vec<Option<String>>),
}

#[derive(Debug, Arbitrary)]
struct FuzzBag {
    fields: Vec<(String, FuzzValue)>,
    pattern: Option<String>,
}

fn upload(name: &str) -> ParamValue {
    UploadDescriptor::new(name, "application/octet-stream", TempSource::from_path("/dev/null")).into()
}

fuzz_target!(|data: FuzzBag| {
    let mut bag = ParamBag::new();
    for (name, value) in &data.fields {
        let value = match value {
            FuzzValue::Scalar(s) => ParamValue::scalar(s.clone()),
            FuzzValue::Upload(filename) => upload(filename),
            FuzzValue::List(items) => ParamValue::List(
                items
                    .iter()
                    .map(|item| match item {
                        Some(filename) => upload(filename),
                        None => ParamValue::scalar("plain"),
                    })
                    .collect(),
            ),
        };
        bag.insert(name.clone(), value);
    }

    let pattern = data.pattern.as_deref().and_then(|p| FieldPattern::new(p).ok());
    let matches = |name: &str| pattern.as_ref().is_none_or(|p| p.is_match(name));

    let before: Vec<(String, usize, usize)> = bag
        .iter()
        .map(|(name, value)| match value {
            ParamValue::List(items) => (
                name.to_string(),
                items.len(),
                items.iter().filter(|i| i.is_upload()).count(),
            ),
            other => (name.to_string(), 1, usize::from(other.is_upload())),
        })
        .collect();

    let classifier = ParamClassifier::default().with_pattern(pattern.clone());
    let uploads = classifier.classify(&mut bag);

    for (name, total, upload_count) in before {
        if !matches(&name) || upload_count == 0 {
            assert!(!uploads.contains(&name));
            assert!(bag.contains_key(&name));
            continue;
        }

        assert_eq!(uploads.get(&name).map(|e| e.len()), Some(upload_count));
        match bag.get(&name) {
            None => assert_eq!(total, upload_count),
            Some(ParamValue::List(items)) => {
                assert_eq!(items.len(), total - upload_count);
                assert!(items.iter().all(|i| !i.is_upload()));
            }
            Some(other) => panic!("unexpected remainder {other:?}"),
        }
    }

    // Nothing left to extract.
    assert!(classifier.classify(&mut bag).is_empty());
});
