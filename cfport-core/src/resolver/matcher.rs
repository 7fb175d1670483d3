//! Matcher - Find state leaves holding the value of an intrinsic
//!
//! The attribute tree is walked depth-first in document order. String leaves
//! that contain a JSON object or array (policy documents and the like) are
//! parsed and searched as well; matches inside them carry the path of the
//! string property so the document can be rewritten as a whole.

use log::debug;
use serde_json::Value;

use super::extract::IntrinsicReference;
use crate::path::AttributePath;
use crate::template::{Literal, format_number};
use crate::traits::ResourceTraits;

/// Largest difference at which two numbers are considered equal
pub const NUMERIC_TOLERANCE: f64 = 0.001;

/// A leaf and the intrinsic whose value it holds
#[derive(Debug)]
pub struct LeafMatch<'r, 'a> {
    /// Leaf path, relative to the embedded document when `containing` is set
    pub location: AttributePath,
    /// String property holding the embedded JSON document
    pub containing: Option<AttributePath>,
    pub intrinsic: &'r IntrinsicReference<'a>,
}

/// Parse a string leaf that holds a JSON object or array
pub fn embedded_document(text: &str) -> Option<Value> {
    let trimmed = text.trim_start();
    if !(trimmed.starts_with('{') || trimmed.starts_with('[')) {
        return None;
    }
    serde_json::from_str::<Value>(text)
        .ok()
        .filter(|v| v.is_object() || v.is_array())
}

/// Whether a scalar leaf holds the evaluated value
pub fn leaf_matches(leaf: &Value, evaluation: &Literal) -> bool {
    match (leaf, evaluation) {
        (Value::Bool(b), Literal::Bool(e)) => b == e,
        (Value::Number(n), Literal::Number(e)) => {
            n.as_f64().is_some_and(|n| (n - e).abs() <= NUMERIC_TOLERANCE)
        }
        // Parameter values are strings even when the property is numeric
        (Value::Number(n), Literal::String(e)) => n
            .as_f64()
            .zip(e.trim().parse::<f64>().ok())
            .is_some_and(|(n, e)| (n - e).abs() <= NUMERIC_TOLERANCE),
        (Value::String(s), Literal::String(e)) => s == e,
        (Value::String(s), Literal::Number(e)) => *s == format_number(*e),
        _ => false,
    }
}

fn list_matches(items: &[Value], evaluation: &Literal) -> bool {
    match evaluation {
        Literal::List(expected) => {
            !items.is_empty()
                && items.len() == expected.len()
                && items.iter().zip(expected).all(|(leaf, e)| leaf_matches(leaf, e))
        }
        _ => false,
    }
}

/// Match every leaf of `attributes` against `intrinsics`, first match wins
pub fn find_matches<'r, 'a>(
    attributes: &Value,
    intrinsics: &'r [IntrinsicReference<'a>],
    traits: &ResourceTraits,
) -> Vec<LeafMatch<'r, 'a>> {
    let mut matcher = Matcher {
        intrinsics,
        traits,
        containing: None,
        matches: Vec::new(),
    };
    matcher.visit(attributes, &AttributePath::root());
    matcher.matches
}

struct Matcher<'r, 'a, 't> {
    intrinsics: &'r [IntrinsicReference<'a>],
    traits: &'t ResourceTraits,
    containing: Option<AttributePath>,
    matches: Vec<LeafMatch<'r, 'a>>,
}

impl<'r, 'a> Matcher<'r, 'a, '_> {
    /// Schema rules only apply to the resource's own attributes, not to embedded documents
    fn excluded(&self, path: &AttributePath, value: &Value) -> bool {
        self.containing.is_none() && !path.is_root() && self.traits.excludes(path, value)
    }

    fn record(&mut self, path: &AttributePath, intrinsic: &'r IntrinsicReference<'a>) {
        debug!("Matched {} at {} with {}", intrinsic.evaluation, path, intrinsic.intrinsic);
        self.matches.push(LeafMatch {
            location: path.clone(),
            containing: self.containing.clone(),
            intrinsic,
        });
    }

    fn visit(&mut self, node: &Value, path: &AttributePath) {
        match node {
            Value::Object(map) => {
                for (key, child) in map {
                    self.visit(child, &path.key(key));
                }
            }
            Value::Array(items) => {
                let scalars = items.iter().all(|i| !(i.is_object() || i.is_array()));
                let nested_root = self.containing.is_some() && path.is_root();
                if scalars && !nested_root && !self.excluded(path, node) {
                    let intrinsics = self.intrinsics;
                    if let Some(intrinsic) = intrinsics.iter().find(|r| list_matches(items, &r.evaluation)) {
                        self.record(path, intrinsic);
                        return;
                    }
                }
                for (i, child) in items.iter().enumerate() {
                    self.visit(child, &path.index(i));
                }
            }
            Value::Null => {}
            Value::String(text) if self.containing.is_none() => match embedded_document(text) {
                Some(document) => {
                    if self.traits.is_computed(path) {
                        return;
                    }
                    self.containing = Some(path.clone());
                    self.visit(&document, &AttributePath::root());
                    self.containing = None;
                }
                None => self.visit_scalar(node, path),
            },
            _ => self.visit_scalar(node, path),
        }
    }

    fn visit_scalar(&mut self, leaf: &Value, path: &AttributePath) {
        if self.excluded(path, leaf) {
            return;
        }
        let intrinsics = self.intrinsics;
        if let Some(intrinsic) = intrinsics.iter().find(|r| leaf_matches(leaf, &r.evaluation)) {
            self.record(path, intrinsic);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::extract::ReferenceKind;
    use crate::template::Intrinsic;
    use crate::traits::PathGlob;
    use serde_json::json;
    use std::borrow::Cow;

    fn intrinsic(name: &str, evaluation: Literal) -> IntrinsicReference<'static> {
        IntrinsicReference {
            path: AttributePath::root().key(name),
            intrinsic: Cow::Owned(Intrinsic::Ref(name.to_string())),
            evaluation,
            target: None,
            target_attribute: None,
            kind: ReferenceKind::DirectReference,
            nested: vec![],
            substitution_key: None,
        }
    }

    fn locations(matches: &[LeafMatch]) -> Vec<String> {
        matches
            .iter()
            .map(|m| match &m.containing {
                Some(c) => format!("{}#{}", c, m.location),
                None => m.location.to_string(),
            })
            .collect()
    }

    #[test]
    fn test_numeric_tolerance() {
        let intrinsics = vec![intrinsic("Size", Literal::Number(5.0))];
        let traits = ResourceTraits::default();

        let close = json!({"size": 5.0005});
        assert_eq!(find_matches(&close, &intrinsics, &traits).len(), 1);

        let far = json!({"size": 5.01});
        assert!(find_matches(&far, &intrinsics, &traits).is_empty());
    }

    #[test]
    fn test_string_parameter_matches_number_leaf() {
        let intrinsics = vec![intrinsic("Port", Literal::string("8080"))];
        let attributes = json!({"port": 8080});
        let matches = find_matches(&attributes, &intrinsics, &ResourceTraits::default());
        assert_eq!(locations(&matches), vec!["port"]);
    }

    #[test]
    fn test_bool_matches_exactly() {
        let intrinsics = vec![intrinsic("Flag", Literal::Bool(true))];
        let attributes = json!({"a": true, "b": false, "c": "true"});
        let matches = find_matches(&attributes, &intrinsics, &ResourceTraits::default());
        assert_eq!(locations(&matches), vec!["a"]);
    }

    #[test]
    fn test_computed_attributes_are_skipped() {
        let intrinsics = vec![intrinsic("Bucket", Literal::string("my-bucket"))];
        let traits = ResourceTraits::default().with_computed(PathGlob::new("id").unwrap());
        let attributes = json!({"id": "my-bucket", "bucket": "my-bucket"});
        let matches = find_matches(&attributes, &intrinsics, &traits);
        assert_eq!(locations(&matches), vec!["bucket"]);
    }

    #[test]
    fn test_first_intrinsic_in_extraction_order_wins() {
        let intrinsics = vec![
            intrinsic("First", Literal::string("same")),
            intrinsic("Second", Literal::string("same")),
        ];
        let attributes = json!({"name": "same"});
        let matches = find_matches(&attributes, &intrinsics, &ResourceTraits::default());
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].intrinsic.path, AttributePath::root().key("First"));
    }

    #[test]
    fn test_embedded_document_is_searched() {
        let intrinsics = vec![intrinsic("Bucket", Literal::string("arn:aws:s3:::my-bucket"))];
        let policy = json!({
            "Version": "2012-10-17",
            "Statement": [{"Resource": ["arn:aws:s3:::my-bucket", "other"]}]
        });
        let attributes = json!({"policy": policy.to_string(), "bucket": "my-bucket"});
        let matches = find_matches(&attributes, &intrinsics, &ResourceTraits::default());
        assert_eq!(locations(&matches), vec!["policy#Statement[0].Resource[0]"]);
    }

    #[test]
    fn test_whole_list_match() {
        let subnets = Literal::List(vec![Literal::string("subnet-a"), Literal::string("subnet-b")]);
        let intrinsics = vec![intrinsic("Subnets", subnets)];
        let attributes = json!({"subnet_ids": ["subnet-a", "subnet-b"], "other": ["subnet-a"]});
        let matches = find_matches(&attributes, &intrinsics, &ResourceTraits::default());
        assert_eq!(locations(&matches), vec!["subnet_ids"]);
    }

    #[test]
    fn test_embedded_document_detection() {
        assert!(embedded_document(r#" {"a": 1}"#).is_some());
        assert!(embedded_document("[1, 2]").is_some());
        assert!(embedded_document("{not json").is_none());
        assert!(embedded_document("42").is_none());
    }
}
