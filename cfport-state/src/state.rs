//! Terraform state file structures
//!
//! Only the parts of the state format cfport reads are modelled; every other
//! key is carried through untouched so a rewritten state differs from the
//! original only where references were written.

use cfport_core::path::AttributePath;
use cfport_core::reference::{Reference, ReferenceError};
use cfport_core::resolver::matcher::embedded_document;
use cfport_core::resolver::{AttributeSnapshot, InstanceAttributes};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("Invalid reference token at {location}: {source}")]
    InvalidToken {
        location: String,
        #[source]
        source: ReferenceError,
    },
}

/// A `terraform.tfstate` document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateFile {
    pub version: u32,
    pub terraform_version: String,
    pub serial: u64,
    pub lineage: String,
    #[serde(default)]
    pub outputs: Map<String, Value>,
    #[serde(default)]
    pub resources: Vec<StateResource>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl StateFile {
    /// State format version written by current Terraform releases
    pub const CURRENT_VERSION: u32 = 4;

    pub fn new(terraform_version: impl Into<String>, lineage: impl Into<String>) -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            terraform_version: terraform_version.into(),
            serial: 0,
            lineage: lineage.into(),
            outputs: Map::new(),
            resources: Vec::new(),
            extra: Map::new(),
        }
    }

    pub fn with_resource(mut self, resource: StateResource) -> Self {
        self.resources.push(resource);
        self
    }

    /// Bump the serial before writing a modified state
    pub fn increment_serial(&mut self) {
        self.serial += 1;
    }

    /// Find a resource by type and name
    pub fn find_resource(&self, resource_type: &str, name: &str) -> Option<&StateResource> {
        self.resources
            .iter()
            .find(|r| r.resource_type == resource_type && r.name == name)
    }

    /// Managed resource imported under a CloudFormation logical id
    pub fn find_by_logical_id(&self, logical_id: &str) -> Option<&StateResource> {
        self.managed_resources().find(|r| r.name == logical_id)
    }

    pub fn managed_resources(&self) -> impl Iterator<Item = &StateResource> {
        self.resources.iter().filter(|r| r.is_managed())
    }

    /// Attributes of every single-instance managed resource, keyed by name
    pub fn attribute_snapshot(&self) -> AttributeSnapshot {
        self.managed_resources()
            .filter_map(|r| match r.instances.as_slice() {
                [instance] => Some((r.name.clone(), instance.attributes.clone())),
                _ => None,
            })
            .collect()
    }

    /// Every reference token written into the state, in document order
    pub fn references(&self) -> Result<Vec<TokenLocation>, StateError> {
        let mut found = Vec::new();
        for resource in self.managed_resources() {
            for (i, instance) in resource.instances.iter().enumerate() {
                let address = match resource.instances.len() {
                    1 => resource.address(),
                    _ => format!("{}[{}]", resource.address(), i),
                };
                collect_tokens(&instance.attributes, &address, &AttributePath::root(), None, &mut found)?;
            }
        }
        Ok(found)
    }
}

/// A reference token and where it was found
#[derive(Debug, Clone, PartialEq)]
pub struct TokenLocation {
    /// Resource address, e.g. `aws_s3_bucket_policy.Policy`
    pub address: String,
    /// Attribute path; `policy#Statement[0].Resource` inside an embedded document
    pub path: String,
    pub reference: Reference,
}

fn collect_tokens(
    node: &Value,
    address: &str,
    path: &AttributePath,
    containing: Option<&AttributePath>,
    found: &mut Vec<TokenLocation>,
) -> Result<(), StateError> {
    match node {
        Value::Object(map) => {
            for (key, child) in map {
                collect_tokens(child, address, &path.key(key), containing, found)?;
            }
        }
        Value::Array(items) => {
            for (i, child) in items.iter().enumerate() {
                collect_tokens(child, address, &path.index(i), containing, found)?;
            }
        }
        Value::String(text) => {
            let location = match containing {
                Some(c) => format!("{}#{}", c, path),
                None => path.to_string(),
            };
            match Reference::decode(text) {
                Ok(reference) => found.push(TokenLocation {
                    address: address.to_string(),
                    path: location,
                    reference,
                }),
                Err(ReferenceError::NotAToken(_)) | Err(ReferenceError::UnknownTag(_)) => {
                    if containing.is_none()
                        && let Some(document) = embedded_document(text)
                    {
                        collect_tokens(&document, address, &AttributePath::root(), Some(path), found)?;
                    }
                }
                Err(source) => {
                    return Err(StateError::InvalidToken {
                        location: format!("{}.{}", address, location),
                        source,
                    });
                }
            }
        }
        _ => {}
    }
    Ok(())
}

/// One `resources[]` entry of the state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateResource {
    /// `managed` or `data`
    pub mode: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    #[serde(rename = "type")]
    pub resource_type: String,
    pub name: String,
    pub provider: String,
    #[serde(default)]
    pub instances: Vec<ResourceInstance>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl StateResource {
    pub fn managed(resource_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            mode: "managed".to_string(),
            module: None,
            resource_type: resource_type.into(),
            name: name.into(),
            provider: "provider[\"registry.terraform.io/hashicorp/aws\"]".to_string(),
            instances: Vec::new(),
            extra: Map::new(),
        }
    }

    pub fn with_instance(mut self, attributes: Value) -> Self {
        self.instances.push(ResourceInstance::new(attributes));
        self
    }

    pub fn is_managed(&self) -> bool {
        self.mode == "managed"
    }

    /// `type.name`, prefixed with the module path when inside a module
    pub fn address(&self) -> String {
        match &self.module {
            Some(module) => format!("{}.{}.{}", module, self.resource_type, self.name),
            None => format!("{}.{}", self.resource_type, self.name),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceInstance {
    #[serde(default)]
    pub schema_version: u64,
    pub attributes: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sensitive_attributes: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<Vec<String>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ResourceInstance {
    pub fn new(attributes: Value) -> Self {
        Self {
            schema_version: 0,
            attributes,
            sensitive_attributes: Some(Vec::new()),
            private: None,
            dependencies: None,
            extra: Map::new(),
        }
    }
}

impl InstanceAttributes for ResourceInstance {
    fn attributes(&self) -> &Value {
        &self.attributes
    }

    fn attributes_mut(&mut self) -> &mut Value {
        &mut self.attributes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const STATE: &str = r#"{
  "version": 4,
  "terraform_version": "1.5.7",
  "serial": 3,
  "lineage": "0c2d4f0e",
  "outputs": {},
  "resources": [
    {
      "mode": "data",
      "type": "aws_region",
      "name": "current",
      "provider": "provider[\"registry.terraform.io/hashicorp/aws\"]",
      "instances": [{"schema_version": 0, "attributes": {"name": "eu-west-1"}}]
    },
    {
      "mode": "managed",
      "type": "aws_s3_bucket",
      "name": "MyBucket",
      "provider": "provider[\"registry.terraform.io/hashicorp/aws\"]",
      "instances": [
        {
          "schema_version": 0,
          "attributes": {"bucket": "my-bucket-123", "id": "my-bucket-123"},
          "sensitive_attributes": [],
          "private": "eyJzY2hlbWFfdmVyc2lvbiI6IjAifQ=="
        }
      ]
    }
  ],
  "check_results": null
}"#;

    #[test]
    fn test_parse_state() {
        let state: StateFile = serde_json::from_str(STATE).unwrap();
        assert_eq!(state.version, 4);
        assert_eq!(state.resources.len(), 2);
        assert_eq!(state.managed_resources().count(), 1);
        let bucket = state.find_by_logical_id("MyBucket").unwrap();
        assert_eq!(bucket.address(), "aws_s3_bucket.MyBucket");
        assert!(state.find_by_logical_id("current").is_none());
        assert!(state.find_resource("aws_region", "current").is_some());
    }

    #[test]
    fn test_unknown_keys_survive_round_trip() {
        let state: StateFile = serde_json::from_str(STATE).unwrap();
        let text = serde_json::to_string(&state).unwrap();
        let original: Value = serde_json::from_str(STATE).unwrap();
        let written: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(written, original);
    }

    #[test]
    fn test_attribute_snapshot_skips_data_sources() {
        let state: StateFile = serde_json::from_str(STATE).unwrap();
        let snapshot = state.attribute_snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot["MyBucket"]["bucket"], "my-bucket-123");
    }

    #[test]
    fn test_references_include_embedded_documents() {
        let policy = json!({
            "Statement": [{"Resource": "IndirectReference:aws_s3_bucket.MyBucket.arn"}]
        });
        let state = StateFile::new("1.5.7", "abc").with_resource(
            StateResource::managed("aws_s3_bucket_policy", "Policy").with_instance(json!({
                "bucket": "DirectReference:aws_s3_bucket.MyBucket",
                "policy": policy.to_string(),
                "id": "arn:aws:s3:::my-bucket-123"
            })),
        );

        let tokens = state.references().unwrap();
        let found: Vec<_> = tokens
            .iter()
            .map(|t| format!("{}.{} = {}", t.address, t.path, t.reference))
            .collect();
        assert_eq!(
            found,
            vec![
                "aws_s3_bucket_policy.Policy.bucket = aws_s3_bucket.MyBucket.id",
                "aws_s3_bucket_policy.Policy.policy#Statement[0].Resource = aws_s3_bucket.MyBucket.arn",
            ]
        );
    }

    #[test]
    fn test_malformed_token_is_an_error() {
        let state = StateFile::new("1.5.7", "abc").with_resource(
            StateResource::managed("aws_sqs_queue", "Queue")
                .with_instance(json!({"name": "FunctionReference:split"})),
        );
        assert!(matches!(state.references(), Err(StateError::InvalidToken { .. })));
    }
}
