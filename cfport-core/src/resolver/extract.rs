//! Extract - Collect the intrinsics used by a resource's properties
//!
//! Every top-level intrinsic of the property tree yields one
//! [`IntrinsicReference`] carrying its deploy-time value. Members of
//! composite intrinsics (`Fn::Sub` placeholders, `Fn::Join` items, operands
//! of other functions) are recorded as nested references of their parent.

use std::borrow::Cow;
use std::collections::HashSet;

use log::{debug, warn};

use super::DependencyResolver;
use super::classify::{Classification, Unclassified};
use super::warning::{DependencyResolutionWarning, WarningKind};
use crate::catalog::ResourceMapping;
use crate::path::AttributePath;
use crate::template::evaluate::implicit_sub_reference;
use crate::template::{
    Intrinsic, IntrinsicKind, Literal, SubSegment, TemplateResource, TemplateValue, parse_sub,
};

/// What an intrinsic's value stands for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceKind {
    /// Identity of a resource, or a value with no referenced resource
    DirectReference,
    /// Attribute of another resource
    AttributeReference,
    /// Template parameter or pseudo parameter input
    ParameterReference,
    /// Target could not be determined
    Unresolved,
}

/// Intrinsic found in a resource's properties, with its evaluated value
#[derive(Debug, Clone)]
pub struct IntrinsicReference<'a> {
    /// Property path within the source resource
    pub path: AttributePath,
    pub intrinsic: Cow<'a, Intrinsic>,
    pub evaluation: Literal,
    pub target: Option<&'a ResourceMapping>,
    /// Terraform attribute path read on the target, for `Fn::GetAtt`
    pub target_attribute: Option<String>,
    pub kind: ReferenceKind,
    pub nested: Vec<IntrinsicReference<'a>>,
    /// Placeholder name when this is a member of an `Fn::Sub`
    pub substitution_key: Option<String>,
}

impl IntrinsicReference<'_> {
    pub fn intrinsic_kind(&self) -> IntrinsicKind {
        self.intrinsic.kind()
    }

    /// Neither this reference nor any nested member is unresolved
    pub fn is_resolvable(&self) -> bool {
        self.kind != ReferenceKind::Unresolved && self.nested.iter().all(|n| n.is_resolvable())
    }
}

/// Output of extracting one resource
#[derive(Debug, Default)]
pub(crate) struct Extraction<'a> {
    pub references: Vec<IntrinsicReference<'a>>,
    pub warnings: Vec<DependencyResolutionWarning>,
}

pub(crate) fn extract<'a>(
    resolver: &DependencyResolver<'a>,
    resource: &'a TemplateResource,
) -> Extraction<'a> {
    let mut extractor = Extractor {
        resolver,
        resource,
        extraction: Extraction::default(),
        warned: false,
    };
    for (key, value) in &resource.properties {
        extractor.walk(value, AttributePath::root().key(key));
    }
    extractor.extraction
}

struct Extractor<'r, 'a> {
    resolver: &'r DependencyResolver<'a>,
    resource: &'a TemplateResource,
    extraction: Extraction<'a>,
    /// A warning was already recorded for the current top-level intrinsic
    warned: bool,
}

/// Intrinsic nodes inside a value, without descending into them
fn collect_intrinsics<'v>(value: &'v TemplateValue, out: &mut Vec<&'v Intrinsic>) {
    match value {
        TemplateValue::Intrinsic(i) => out.push(i),
        TemplateValue::List(items) => items.iter().for_each(|v| collect_intrinsics(v, out)),
        TemplateValue::Map(map) => map.values().for_each(|v| collect_intrinsics(v, out)),
        _ => {}
    }
}

impl<'r, 'a> Extractor<'r, 'a> {
    fn walk(&mut self, value: &'a TemplateValue, path: AttributePath) {
        match value {
            TemplateValue::Map(map) => {
                for (key, child) in map {
                    self.walk(child, path.key(key));
                }
            }
            TemplateValue::List(items) => {
                for (i, child) in items.iter().enumerate() {
                    self.walk(child, path.index(i));
                }
            }
            TemplateValue::Intrinsic(intrinsic) => self.visit(intrinsic, &path),
            _ => {}
        }
    }

    /// Handle an intrinsic attached directly to a property
    fn visit(&mut self, intrinsic: &'a Intrinsic, path: &AttributePath) {
        if let Intrinsic::If {
            condition,
            value_if_true,
            value_if_false,
        } = intrinsic
        {
            match self.resolver.template.condition(condition) {
                Some(true) => self.walk(value_if_true, path.clone()),
                Some(false) => self.walk(value_if_false, path.clone()),
                None => debug!(
                    "{}: condition '{}' has no deployed value, skipping {}",
                    self.resource.name, condition, path
                ),
            }
            return;
        }

        self.warned = false;
        let reference = match self.function_arn_reference(intrinsic, path) {
            Some(get_att) => self.target_reference(Cow::Owned(get_att), path, None),
            None => self.reference(intrinsic, path, None),
        };

        if reference.is_resolvable() {
            debug!(
                "{}: {} at {} evaluates to {}",
                self.resource.name, reference.intrinsic, path, reference.evaluation
            );
            self.extraction.references.push(reference);
        } else {
            debug!("{}: dropping {} at {}", self.resource.name, intrinsic, path);
        }
    }

    /// Terraform wants a function ARN where `AWS::Lambda::Permission` takes `Ref` to the function
    fn function_arn_reference(&self, intrinsic: &Intrinsic, path: &AttributePath) -> Option<Intrinsic> {
        let Intrinsic::Ref(name) = intrinsic else {
            return None;
        };
        (self.resource.resource_type == "AWS::Lambda::Permission"
            && *path == AttributePath::root().key("FunctionName")
            && self.resolver.catalog.get(name).is_some())
        .then(|| Intrinsic::get_att(name, "Arn"))
    }

    fn reference(
        &mut self,
        intrinsic: &'a Intrinsic,
        path: &AttributePath,
        substitution_key: Option<String>,
    ) -> IntrinsicReference<'a> {
        match intrinsic {
            Intrinsic::Ref(_) | Intrinsic::GetAtt { .. } => {
                self.target_reference(Cow::Borrowed(intrinsic), path, substitution_key)
            }
            _ => self.composite_reference(intrinsic, path, substitution_key),
        }
    }

    fn target_reference(
        &mut self,
        intrinsic: Cow<'a, Intrinsic>,
        path: &AttributePath,
        substitution_key: Option<String>,
    ) -> IntrinsicReference<'a> {
        let resolver = self.resolver;
        let outcome = match intrinsic.as_ref() {
            Intrinsic::Ref(name) => resolver.classify_ref(name),
            Intrinsic::GetAtt {
                logical_id,
                attribute,
            } => resolver
                .attribute_name(attribute)
                .and_then(|attribute| resolver.classify_get_att(logical_id, &attribute)),
            other => Err(Unclassified::Unreferenceable(format!(
                "{} is not a reference",
                other.kind().tag_name()
            ))),
        };
        self.finish(intrinsic, path, substitution_key, outcome, Vec::new())
    }

    fn composite_reference(
        &mut self,
        intrinsic: &'a Intrinsic,
        path: &AttributePath,
        substitution_key: Option<String>,
    ) -> IntrinsicReference<'a> {
        let mut nested = Vec::new();
        match intrinsic {
            Intrinsic::Sub {
                expression,
                variables,
            } => {
                let mut seen = HashSet::new();
                for segment in parse_sub(expression) {
                    let SubSegment::Placeholder(name) = segment else {
                        continue;
                    };
                    if !seen.insert(name.clone()) {
                        continue;
                    }
                    match variables.get(&name) {
                        Some(TemplateValue::Intrinsic(member)) => {
                            nested.push(self.reference(member, path, Some(name)));
                        }
                        Some(_) => {}
                        None => {
                            let implicit = implicit_sub_reference(&name);
                            nested.push(self.target_reference(Cow::Owned(implicit), path, Some(name)));
                        }
                    }
                }
            }
            Intrinsic::If {
                condition,
                value_if_true,
                value_if_false,
            } => {
                let mut members = Vec::new();
                match self.resolver.template.condition(condition) {
                    Some(true) => collect_intrinsics(value_if_true, &mut members),
                    Some(false) => collect_intrinsics(value_if_false, &mut members),
                    None => {}
                }
                for member in members {
                    nested.push(self.reference(member, path, None));
                }
            }
            other => {
                let mut members = Vec::new();
                for operand in other.operands() {
                    collect_intrinsics(operand, &mut members);
                }
                for member in members {
                    nested.push(self.reference(member, path, None));
                }
            }
        }

        let outcome = if nested.iter().all(|n| n.is_resolvable()) {
            intrinsic
                .evaluate(self.resolver)
                .map(Classification::untargeted)
                .map_err(|e| Unclassified::Unreferenceable(e.to_string()))
        } else {
            Err(Unclassified::NestedUnresolved)
        };
        self.finish(Cow::Borrowed(intrinsic), path, substitution_key, outcome, nested)
    }

    fn finish(
        &mut self,
        intrinsic: Cow<'a, Intrinsic>,
        path: &AttributePath,
        substitution_key: Option<String>,
        outcome: Result<Classification<'a>, Unclassified>,
        nested: Vec<IntrinsicReference<'a>>,
    ) -> IntrinsicReference<'a> {
        match outcome {
            Ok(classification) => IntrinsicReference {
                path: path.clone(),
                intrinsic,
                evaluation: classification.value,
                target: classification.target,
                target_attribute: classification.target_attribute,
                kind: classification.kind,
                nested,
                substitution_key,
            },
            Err(reason) => {
                self.warn(reason, &intrinsic, path);
                IntrinsicReference {
                    path: path.clone(),
                    intrinsic,
                    evaluation: Literal::Null,
                    target: None,
                    target_attribute: None,
                    kind: ReferenceKind::Unresolved,
                    nested,
                    substitution_key,
                }
            }
        }
    }

    fn warn(&mut self, reason: Unclassified, intrinsic: &Intrinsic, path: &AttributePath) {
        let kind = match reason {
            Unclassified::NestedUnresolved => return,
            Unclassified::UnsupportedResource => WarningKind::UnsupportedResource,
            Unclassified::UnsupportedPseudoParameter(parameter) => {
                WarningKind::UnsupportedPseudoParameter { parameter }
            }
            Unclassified::Unreferenceable(reason) => WarningKind::UnreferenceableIntrinsic { reason },
        };
        if self.warned {
            return;
        }
        self.warned = true;

        let warning = DependencyResolutionWarning::new(
            kind,
            &self.resource.name,
            &self.resource.resource_type,
            intrinsic.to_string(),
            path.clone(),
        );
        warn!("{}", warning);
        self.extraction.warnings.push(warning);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ResourceCatalog, ResourceMapping};
    use crate::input::InputVariable;
    use crate::resolver::AttributeSnapshot;
    use crate::template::Template;
    use crate::traits::TraitsCollection;
    use indexmap::IndexMap;
    use serde_json::json;

    fn reference(name: &str) -> TemplateValue {
        TemplateValue::intrinsic(Intrinsic::Ref(name.to_string()))
    }

    fn fixture() -> (Template, ResourceCatalog, TraitsCollection, Vec<InputVariable>, AttributeSnapshot) {
        let template = Template::new()
            .with_resource(TemplateResource::new("Bucket", "AWS::S3::Bucket"))
            .with_resource(TemplateResource::new("Seeder", "Custom::Seeder"))
            .with_resource(TemplateResource::new("Handler", "AWS::Lambda::Function"))
            .with_condition("IsProd", false);
        let catalog = ResourceCatalog::new(vec![
            ResourceMapping::new("Bucket", "my-bucket", "AWS::S3::Bucket", "aws_s3_bucket"),
            ResourceMapping::new("Seeder", "seed-1", "Custom::Seeder", ""),
            ResourceMapping::new("Handler", "handler-fn", "AWS::Lambda::Function", "aws_lambda_function"),
        ]);
        let inputs = vec![InputVariable::variable("Env", Literal::string("dev"))];
        let mut snapshot = AttributeSnapshot::new();
        snapshot.insert("Bucket".to_string(), json!({"id": "my-bucket", "arn": "arn:aws:s3:::my-bucket"}));
        snapshot.insert(
            "Handler".to_string(),
            json!({"function_name": "handler-fn", "arn": "arn:aws:lambda:eu-west-1:123:function:handler-fn"}),
        );
        (template, catalog, TraitsCollection::default(), inputs, snapshot)
    }

    #[test]
    fn test_ref_and_get_att_are_classified() {
        let (template, catalog, traits, inputs, snapshot) = fixture();
        let resolver = DependencyResolver::new(&template, &catalog, &traits, &inputs, &snapshot);
        let resource = TemplateResource::new("Policy", "AWS::S3::BucketPolicy")
            .with_property("Bucket", reference("Bucket"))
            .with_property("Arn", TemplateValue::intrinsic(Intrinsic::get_att("Bucket", "Arn")))
            .with_property("Stage", reference("Env"));

        let extraction = extract(&resolver, &resource);
        assert!(extraction.warnings.is_empty());
        let kinds: Vec<_> = extraction.references.iter().map(|r| r.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ReferenceKind::DirectReference,
                ReferenceKind::AttributeReference,
                ReferenceKind::ParameterReference
            ]
        );
        assert_eq!(extraction.references[0].evaluation, Literal::string("my-bucket"));
        assert_eq!(extraction.references[1].target_attribute.as_deref(), Some("arn"));
        assert_eq!(extraction.references[2].evaluation, Literal::string("dev"));
    }

    #[test]
    fn test_unsupported_targets_are_dropped_with_warning() {
        let (template, catalog, traits, inputs, snapshot) = fixture();
        let resolver = DependencyResolver::new(&template, &catalog, &traits, &inputs, &snapshot);
        let resource = TemplateResource::new("Queue", "AWS::SQS::Queue")
            .with_property("Name", reference("Seeder"))
            .with_property("Stack", reference("AWS::StackName"));

        let extraction = extract(&resolver, &resource);
        assert!(extraction.references.is_empty());
        assert_eq!(extraction.warnings.len(), 2);
        assert_eq!(extraction.warnings[0].kind, WarningKind::UnsupportedResource);
        assert_eq!(
            extraction.warnings[1].kind,
            WarningKind::UnsupportedPseudoParameter {
                parameter: "AWS::StackName".to_string()
            }
        );
    }

    #[test]
    fn test_sub_records_nested_placeholders() {
        let (template, catalog, traits, inputs, snapshot) = fixture();
        let resolver = DependencyResolver::new(&template, &catalog, &traits, &inputs, &snapshot);
        let mut variables = IndexMap::new();
        variables.insert("Stage".to_string(), reference("Env"));
        let sub = Intrinsic::Sub {
            expression: "${Bucket.Arn}/${Stage}/${Bucket.Arn}".to_string(),
            variables,
        };
        let resource = TemplateResource::new("Policy", "AWS::IAM::Policy")
            .with_property("Resource", TemplateValue::intrinsic(sub));

        let extraction = extract(&resolver, &resource);
        let sub = &extraction.references[0];
        assert_eq!(sub.evaluation, Literal::string("arn:aws:s3:::my-bucket/dev/arn:aws:s3:::my-bucket"));
        let keys: Vec<_> = sub.nested.iter().map(|n| n.substitution_key.as_deref()).collect();
        assert_eq!(keys, vec![Some("Bucket.Arn"), Some("Stage")]);
        assert_eq!(sub.nested[0].kind, ReferenceKind::AttributeReference);
    }

    #[test]
    fn test_join_with_unsupported_member_warns_once() {
        let (template, catalog, traits, inputs, snapshot) = fixture();
        let resolver = DependencyResolver::new(&template, &catalog, &traits, &inputs, &snapshot);
        let join = Intrinsic::Join {
            separator: "-".to_string(),
            items: TemplateValue::List(vec![reference("Seeder"), reference("Bucket")]),
        };
        let resource = TemplateResource::new("Queue", "AWS::SQS::Queue")
            .with_property("Name", TemplateValue::intrinsic(join));

        let extraction = extract(&resolver, &resource);
        assert!(extraction.references.is_empty());
        assert_eq!(extraction.warnings.len(), 1);
        assert_eq!(extraction.warnings[0].intrinsic, "!Ref Seeder");
    }

    #[test]
    fn test_if_descends_into_selected_branch() {
        let (template, catalog, traits, inputs, snapshot) = fixture();
        let resolver = DependencyResolver::new(&template, &catalog, &traits, &inputs, &snapshot);
        let choice = Intrinsic::If {
            condition: "IsProd".to_string(),
            value_if_true: reference("Seeder"),
            value_if_false: reference("Bucket"),
        };
        let resource = TemplateResource::new("Queue", "AWS::SQS::Queue")
            .with_property("Name", TemplateValue::intrinsic(choice));

        let extraction = extract(&resolver, &resource);
        assert!(extraction.warnings.is_empty());
        assert_eq!(extraction.references.len(), 1);
        assert_eq!(extraction.references[0].intrinsic_kind(), IntrinsicKind::Ref);
        assert_eq!(extraction.references[0].evaluation, Literal::string("my-bucket"));
    }

    #[test]
    fn test_lambda_permission_function_name_uses_arn() {
        let (template, catalog, traits, inputs, snapshot) = fixture();
        let resolver = DependencyResolver::new(&template, &catalog, &traits, &inputs, &snapshot);
        let resource = TemplateResource::new("Permission", "AWS::Lambda::Permission")
            .with_property("FunctionName", reference("Handler"));

        let extraction = extract(&resolver, &resource);
        let reference = &extraction.references[0];
        assert_eq!(reference.intrinsic_kind(), IntrinsicKind::GetAtt);
        assert_eq!(
            reference.evaluation,
            Literal::string("arn:aws:lambda:eu-west-1:123:function:handler-fn")
        );
    }

    #[test]
    fn test_get_att_without_imported_state_is_unreferenceable() {
        let (template, _, traits, inputs, snapshot) = fixture();
        let catalog = ResourceCatalog::new(vec![ResourceMapping::new(
            "Table",
            "orders",
            "AWS::DynamoDB::Table",
            "aws_dynamodb_table",
        )]);
        let resolver = DependencyResolver::new(&template, &catalog, &traits, &inputs, &snapshot);
        let resource = TemplateResource::new("Queue", "AWS::SQS::Queue")
            .with_property("Source", TemplateValue::intrinsic(Intrinsic::get_att("Table", "Arn")));

        let extraction = extract(&resolver, &resource);
        assert!(extraction.references.is_empty());
        assert_eq!(
            extraction.warnings[0].kind,
            WarningKind::UnreferenceableIntrinsic {
                reason: "aws_dynamodb_table.Table has no imported state".to_string()
            }
        );
    }
}
