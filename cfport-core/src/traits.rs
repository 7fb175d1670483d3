//! Traits - Per resource-type knowledge of the Terraform schema
//!
//! Which attributes are computed, how CloudFormation attribute names map to
//! Terraform ones, and which arguments conflict with each other. Traits for
//! the pseudo type `all` apply to every resource type.

use std::collections::HashMap;
use std::fmt;

use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::path::AttributePath;

/// Resource type name whose traits are shared by every type
pub const SHARED_TRAITS: &str = "all";

#[derive(Debug, Error)]
pub enum TraitsError {
    #[error("Invalid attribute pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Attribute path pattern
///
/// Segments are separated by `.`. `*` matches any single segment (or any
/// run of characters within one), `#` matches an array index. A pattern
/// without a `.` matches the innermost property name of a path; a dotted
/// pattern must match the whole property path.
#[derive(Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PathGlob {
    pattern: String,
    regex: Regex,
}

impl PathGlob {
    pub fn new(pattern: impl Into<String>) -> Result<Self, TraitsError> {
        let pattern = pattern.into();
        let body = pattern
            .split('.')
            .map(|segment| match segment {
                "*" => "[^.]+".to_string(),
                "#" => r"\d+".to_string(),
                s => s.split('*').map(regex::escape).collect::<Vec<_>>().join("[^.]*"),
            })
            .collect::<Vec<_>>()
            .join(r"\.");
        let regex = Regex::new(&format!("^{}$", body)).map_err(|source| TraitsError::InvalidPattern {
            pattern: pattern.clone(),
            source,
        })?;
        Ok(Self { pattern, regex })
    }

    pub fn as_str(&self) -> &str {
        &self.pattern
    }

    /// Match against the property holding the leaf at `path`
    pub fn matches(&self, path: &AttributePath) -> bool {
        if self.pattern.contains('.') {
            self.regex.is_match(&path.property_path().dotted())
        } else {
            path.property_name().is_some_and(|name| self.regex.is_match(name))
        }
    }
}

impl TryFrom<String> for PathGlob {
    type Error = TraitsError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        PathGlob::new(value)
    }
}

impl From<PathGlob> for String {
    fn from(glob: PathGlob) -> Self {
        glob.pattern
    }
}

impl PartialEq for PathGlob {
    fn eq(&self, other: &Self) -> bool {
        self.pattern == other.pattern
    }
}

impl fmt::Debug for PathGlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PathGlob({:?})", self.pattern)
    }
}

/// Attribute that Terraform omits when it holds a particular value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionalAttribute {
    pub name: PathGlob,
    pub value: String,
}

/// Schema knowledge for one Terraform resource type
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceTraits {
    pub resource: String,
    /// CloudFormation `Fn::GetAtt` attribute name to Terraform attribute path
    #[serde(default)]
    pub attribute_map: IndexMap<String, String>,
    #[serde(default)]
    pub computed_attributes: Vec<PathGlob>,
    #[serde(default)]
    pub conflicting_arguments: Vec<Vec<PathGlob>>,
    #[serde(default)]
    pub conditional_attributes: Vec<ConditionalAttribute>,
    #[serde(default)]
    pub default_values: IndexMap<String, serde_json::Value>,
}

impl ResourceTraits {
    pub fn new(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            ..Default::default()
        }
    }

    pub fn with_attribute_map(mut self, cloudformation: impl Into<String>, terraform: impl Into<String>) -> Self {
        self.attribute_map.insert(cloudformation.into(), terraform.into());
        self
    }

    pub fn with_computed(mut self, pattern: PathGlob) -> Self {
        self.computed_attributes.push(pattern);
        self
    }

    /// Combine the shared traits with type-specific ones; specific entries win
    pub fn merged(shared: &ResourceTraits, specific: &ResourceTraits) -> Self {
        let mut attribute_map = shared.attribute_map.clone();
        attribute_map.extend(specific.attribute_map.clone());
        let mut default_values = shared.default_values.clone();
        default_values.extend(specific.default_values.clone());

        let mut computed_attributes = shared.computed_attributes.clone();
        for glob in &specific.computed_attributes {
            if !computed_attributes.contains(glob) {
                computed_attributes.push(glob.clone());
            }
        }

        Self {
            resource: specific.resource.clone(),
            attribute_map,
            computed_attributes,
            conflicting_arguments: shared
                .conflicting_arguments
                .iter()
                .chain(&specific.conflicting_arguments)
                .cloned()
                .collect(),
            conditional_attributes: shared
                .conditional_attributes
                .iter()
                .chain(&specific.conditional_attributes)
                .cloned()
                .collect(),
            default_values,
        }
    }

    pub fn map_attribute(&self, cloudformation_name: &str) -> Option<&str> {
        self.attribute_map.get(cloudformation_name).map(String::as_str)
    }

    pub fn is_computed(&self, path: &AttributePath) -> bool {
        self.computed_attributes.iter().any(|g| g.matches(path))
    }

    /// Member of a conflict group other than the group's first entry
    pub fn is_conflicting_argument(&self, path: &AttributePath) -> bool {
        self.conflicting_arguments
            .iter()
            .any(|group| group.iter().skip(1).any(|g| g.matches(path)))
    }

    /// Attribute omitted from configuration because it holds its skip value
    pub fn is_omitted_conditional(&self, path: &AttributePath, value: &serde_json::Value) -> bool {
        self.conditional_attributes.iter().any(|c| {
            c.name.matches(path)
                && match value {
                    serde_json::Value::String(s) => *s == c.value,
                    other => other.to_string() == c.value,
                }
        })
    }

    pub fn default_value(&self, path: &AttributePath) -> Option<&serde_json::Value> {
        let name = path.property_name()?;
        self.default_values.get(name)
    }

    /// Leaf that never receives a reference
    pub fn excludes(&self, path: &AttributePath, value: &serde_json::Value) -> bool {
        self.is_computed(path)
            || self.is_conflicting_argument(path)
            || self.is_omitted_conditional(path, value)
    }
}

/// Traits for every known resource type
#[derive(Debug, Clone, Default)]
pub struct TraitsCollection {
    shared: ResourceTraits,
    merged: HashMap<String, ResourceTraits>,
}

impl TraitsCollection {
    pub fn new(traits: Vec<ResourceTraits>) -> Self {
        let shared = traits
            .iter()
            .find(|t| t.resource == SHARED_TRAITS)
            .cloned()
            .unwrap_or_else(|| ResourceTraits::new(SHARED_TRAITS));

        let merged = traits
            .iter()
            .filter(|t| t.resource != SHARED_TRAITS)
            .map(|t| (t.resource.clone(), ResourceTraits::merged(&shared, t)))
            .collect();

        Self { shared, merged }
    }

    /// Traits for a Terraform type, falling back to the shared set
    pub fn get(&self, target_type: &str) -> &ResourceTraits {
        self.merged.get(target_type).unwrap_or(&self.shared)
    }

    pub fn len(&self) -> usize {
        self.merged.len()
    }

    pub fn is_empty(&self) -> bool {
        self.merged.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn glob(pattern: &str) -> PathGlob {
        PathGlob::new(pattern).unwrap()
    }

    #[test]
    fn test_bare_pattern_matches_property_name() {
        let arn = glob("arn");
        assert!(arn.matches(&AttributePath::parse("arn")));
        assert!(arn.matches(&AttributePath::parse("logging.0.arn")));
        assert!(!arn.matches(&AttributePath::parse("role_arn")));

        let tags = glob("tags_*");
        assert!(tags.matches(&AttributePath::parse("tags_all")));
    }

    #[test]
    fn test_bare_pattern_matches_list_elements() {
        let blocks = glob("cidr_blocks");
        assert!(blocks.matches(&AttributePath::parse("ingress.0.cidr_blocks.1")));
    }

    #[test]
    fn test_dotted_pattern_with_wildcards() {
        let pattern = glob("ingress.#.self");
        assert!(pattern.matches(&AttributePath::parse("ingress.3.self")));
        assert!(!pattern.matches(&AttributePath::parse("egress.3.self")));
        assert!(!pattern.matches(&AttributePath::parse("ingress.x.self")));

        let any = glob("versioning.*.enabled");
        assert!(any.matches(&AttributePath::parse("versioning.0.enabled")));

        let exact = glob("rule.0.id");
        assert!(exact.matches(&AttributePath::parse("rule.0.id")));
        assert!(!exact.matches(&AttributePath::parse("rule.1.id")));
    }

    #[test]
    fn test_conflicting_arguments_exclude_non_first_members() {
        let mut traits = ResourceTraits::new("aws_s3_bucket");
        traits.conflicting_arguments = vec![vec![glob("acl"), glob("grant")]];
        assert!(!traits.is_conflicting_argument(&AttributePath::parse("acl")));
        assert!(traits.is_conflicting_argument(&AttributePath::parse("grant.0.id")));
    }

    #[test]
    fn test_conditional_attribute() {
        let mut traits = ResourceTraits::new("aws_instance");
        traits.conditional_attributes = vec![ConditionalAttribute {
            name: glob("tenancy"),
            value: "default".to_string(),
        }];
        let path = AttributePath::parse("tenancy");
        assert!(traits.is_omitted_conditional(&path, &json!("default")));
        assert!(!traits.is_omitted_conditional(&path, &json!("dedicated")));
    }

    #[test]
    fn test_collection_merges_shared_traits() {
        let shared = ResourceTraits::new(SHARED_TRAITS)
            .with_computed(glob("arn"))
            .with_attribute_map("Arn", "arn");
        let bucket = ResourceTraits::new("aws_s3_bucket")
            .with_computed(glob("bucket_domain_name"))
            .with_attribute_map("DomainName", "bucket_domain_name");
        let collection = TraitsCollection::new(vec![shared, bucket]);

        let traits = collection.get("aws_s3_bucket");
        assert!(traits.is_computed(&AttributePath::parse("arn")));
        assert!(traits.is_computed(&AttributePath::parse("bucket_domain_name")));
        assert_eq!(traits.map_attribute("DomainName"), Some("bucket_domain_name"));
        assert_eq!(traits.map_attribute("Arn"), Some("arn"));

        let other = collection.get("aws_sqs_queue");
        assert!(other.is_computed(&AttributePath::parse("arn")));
        assert!(!other.is_computed(&AttributePath::parse("bucket_domain_name")));
    }

    #[test]
    fn test_deserialize_traits() {
        let traits: ResourceTraits = serde_json::from_value(json!({
            "resource": "aws_lambda_function",
            "attribute_map": {"Arn": "arn"},
            "computed_attributes": ["version", "environment.#.variables"],
            "default_values": {"publish": false}
        }))
        .unwrap();
        assert_eq!(traits.computed_attributes.len(), 2);
        assert_eq!(traits.default_value(&AttributePath::parse("publish")), Some(&json!(false)));
        assert!(traits.is_computed(&AttributePath::parse("environment.0.variables")));
    }

    #[test]
    fn test_pattern_metacharacters_are_literal() {
        let glob = glob("a(b)");
        assert!(glob.matches(&AttributePath::parse("a(b)")));
        assert!(!glob.matches(&AttributePath::parse("ab")));
    }
}
