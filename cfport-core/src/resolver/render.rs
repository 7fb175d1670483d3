//! Render - Express an intrinsic as a Terraform [`Reference`]
//!
//! Rendering works from the template AST. `Ref` and `Fn::GetAtt` targets are
//! classified again on demand, so operands at any depth render the same way
//! as top-level intrinsics. Data blocks a rendering depends on are pushed to
//! the caller's declaration list.

use heck::ToSnakeCase;

use super::DependencyResolver;
use super::classify::terraform_attribute_name;
use crate::input::{DataSourceDeclaration, InputKind};
use crate::reference::{FunctionArgument, FunctionReference, Reference};
use crate::template::evaluate::{evaluate_value, implicit_sub_reference};
use crate::template::{Intrinsic, SubSegment, TemplateValue, format_number, parse_sub};

/// Upper bound on `Fn::Cidr` subnet counts
const MAX_CIDR_COUNT: usize = 256;

fn indexed(address: String, index: Option<usize>) -> String {
    match index {
        Some(i) => format!("{}[{}]", address, i),
        None => address,
    }
}

/// Terraform block label for an export name
fn block_label(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect()
}

impl<'a> DependencyResolver<'a> {
    /// Render `intrinsic`, selecting element `index` of a list-valued result
    pub(crate) fn render(
        &self,
        intrinsic: &Intrinsic,
        index: Option<usize>,
        declarations: &mut Vec<DataSourceDeclaration>,
    ) -> Option<Reference> {
        match intrinsic {
            Intrinsic::Ref(name) => self.render_ref(name, index, declarations),

            Intrinsic::GetAtt {
                logical_id,
                attribute,
            } => self.render_get_att(logical_id, attribute, index),

            Intrinsic::FindInMap {
                map_name,
                top_level_key,
                second_level_key,
            } => {
                let mut address = String::new();
                for key in [map_name, top_level_key, second_level_key] {
                    match self.argument(key, declarations)? {
                        FunctionArgument::Reference(lookup) => {
                            address.push_str(&format!("[{}]", lookup.expression()));
                        }
                        FunctionArgument::String(text) => address.push_str(&format!(".{}", text)),
                        FunctionArgument::Number(n) => {
                            address.push_str(&format!(".{}", format_number(n)));
                        }
                        FunctionArgument::Bool(_) | FunctionArgument::List(_) => return None,
                    }
                }
                Some(Reference::Map { address, index })
            }

            Intrinsic::Select {
                index: selector,
                items,
            } => {
                let selected = evaluate_value(selector, self).ok()?.as_number()?;
                if selected < 0.0 || selected.fract() != 0.0 {
                    return None;
                }
                let selected = selected as usize;
                match items {
                    TemplateValue::Intrinsic(inner) => self.render(inner, Some(selected), declarations),
                    TemplateValue::List(list) => match list.get(selected)? {
                        TemplateValue::Intrinsic(inner) => self.render(inner, index, declarations),
                        _ => None,
                    },
                    _ => None,
                }
            }

            Intrinsic::Split { delimiter, source } => {
                let source = self.argument(source, declarations)?;
                Some(Reference::Function(
                    FunctionReference::new(
                        "split",
                        vec![FunctionArgument::String(delimiter.clone()), source],
                    )
                    .with_index(index),
                ))
            }

            Intrinsic::Base64(value) => {
                let value = self.argument(value, declarations)?;
                Some(Reference::Function(FunctionReference::new(
                    "base64encode",
                    vec![value],
                )))
            }

            Intrinsic::Cidr {
                ip_block,
                count,
                cidr_bits,
            } => {
                let ip_block = self.argument(ip_block, declarations)?;
                let count = evaluate_value(count, self).ok()?.as_number()?;
                let cidr_bits = evaluate_value(cidr_bits, self).ok()?.as_number()?;
                if !(1.0..=MAX_CIDR_COUNT as f64).contains(&count) || count.fract() != 0.0 {
                    return None;
                }
                let mut arguments = vec![ip_block];
                arguments.extend(std::iter::repeat_n(
                    FunctionArgument::Number(cidr_bits),
                    count as usize,
                ));
                Some(Reference::Function(
                    FunctionReference::new("cidrsubnets", arguments).with_index(index),
                ))
            }

            Intrinsic::GetAZs(_) => {
                declarations.push(
                    DataSourceDeclaration::new("aws_availability_zones", "available")
                        .with_argument("state", "available"),
                );
                Some(Reference::data_source(indexed(
                    "data.aws_availability_zones.available.names".to_string(),
                    index,
                )))
            }

            Intrinsic::ImportValue(name) => {
                let name = evaluate_value(name, self).ok()?.to_interpolated()?;
                let label = block_label(&name);
                declarations.push(
                    DataSourceDeclaration::new("aws_cloudformation_export", &label)
                        .with_argument("name", name),
                );
                Some(Reference::data_source(indexed(
                    format!("data.aws_cloudformation_export.{}.value", label),
                    index,
                )))
            }

            Intrinsic::Join { separator, items } => {
                let items = match self.argument(items, declarations)? {
                    FunctionArgument::List(items) => items,
                    reference @ FunctionArgument::Reference(_) => vec![reference],
                    _ => return None,
                };
                if !items.iter().any(FunctionArgument::has_reference) {
                    return None;
                }
                Some(Reference::JoinFunction(FunctionReference::join(separator.clone(), items)))
            }

            Intrinsic::Sub {
                expression,
                variables,
            } => {
                let mut parts: Vec<FunctionArgument> = Vec::new();
                for segment in parse_sub(expression) {
                    let part = match segment {
                        SubSegment::Literal(text) => FunctionArgument::String(text),
                        SubSegment::Placeholder(name) => match variables.get(&name) {
                            Some(value) => self.argument(value, declarations)?,
                            None => FunctionArgument::reference(self.render(
                                &implicit_sub_reference(&name),
                                None,
                                declarations,
                            )?),
                        },
                    };
                    if let (Some(FunctionArgument::String(previous)), FunctionArgument::String(text)) =
                        (parts.last_mut(), &part)
                    {
                        previous.push_str(text);
                        continue;
                    }
                    parts.push(part);
                }

                match parts.as_slice() {
                    [FunctionArgument::Reference(only)] => Some((**only).clone()),
                    _ if parts.iter().any(FunctionArgument::has_reference) => {
                        Some(Reference::JoinFunction(FunctionReference::join("", parts)))
                    }
                    _ => None,
                }
            }

            Intrinsic::If {
                condition,
                value_if_true,
                value_if_false,
            } => {
                let branch = self.selected_branch(condition, value_if_true, value_if_false)?;
                self.render(branch.as_intrinsic()?, index, declarations)
            }
        }
    }

    /// Branch of `Fn::If` picked by the deployed condition value
    fn selected_branch<'v>(
        &self,
        condition: &str,
        value_if_true: &'v TemplateValue,
        value_if_false: &'v TemplateValue,
    ) -> Option<&'v TemplateValue> {
        let selected = self.template.condition(condition)?;
        Some(if selected { value_if_true } else { value_if_false })
    }

    fn render_ref(
        &self,
        name: &str,
        index: Option<usize>,
        declarations: &mut Vec<DataSourceDeclaration>,
    ) -> Option<Reference> {
        if let Some(input) = self.input(name) {
            declarations.extend(input.declaration.iter().cloned());
            return Some(match &input.kind {
                InputKind::DataSource { address } => {
                    Reference::data_source(indexed(address.clone(), index))
                }
                InputKind::Variable => Reference::parameter(input.address(), index),
            });
        }
        if name.starts_with("AWS::") {
            return None;
        }
        let target = self.catalog.get_supported(name)?;
        Some(Reference::direct(target.address()))
    }

    fn render_get_att(
        &self,
        logical_id: &str,
        attribute: &TemplateValue,
        index: Option<usize>,
    ) -> Option<Reference> {
        let attribute = self.attribute_name(attribute).ok()?;
        let target = self.catalog.get_supported(logical_id)?;

        if let Some(output) = attribute.strip_prefix("Outputs.")
            && let Some(module) = &target.module
        {
            return Some(Reference::Module {
                address: format!("{}.{}", module, output),
                index,
            });
        }

        let attribute_path = match self.classify_get_att(logical_id, &attribute) {
            Ok(classification) => classification.target_attribute,
            Err(_) => None,
        }
        .filter(|path| !path.is_empty())
        .or_else(|| {
            self.traits
                .get(&target.target_type)
                .map_attribute(&attribute)
                .map(str::to_string)
        })
        .unwrap_or_else(|| {
            if attribute.contains('.') {
                terraform_attribute_name(&attribute)
            } else {
                attribute.to_snake_case()
            }
        });

        Some(Reference::indirect(indexed(
            format!("{}.{}", target.address(), attribute_path),
            index,
        )))
    }

    /// Function argument for an operand value
    fn argument(
        &self,
        value: &TemplateValue,
        declarations: &mut Vec<DataSourceDeclaration>,
    ) -> Option<FunctionArgument> {
        match value {
            TemplateValue::String(s) => Some(FunctionArgument::String(s.clone())),
            TemplateValue::Int(i) => Some(FunctionArgument::Number(*i as f64)),
            TemplateValue::Float(f) => Some(FunctionArgument::Number(*f)),
            TemplateValue::Bool(b) => Some(FunctionArgument::Bool(*b)),
            TemplateValue::List(items) => items
                .iter()
                .map(|item| self.argument(item, declarations))
                .collect::<Option<Vec<_>>>()
                .map(FunctionArgument::List),
            TemplateValue::Intrinsic(inner) => match inner.as_ref() {
                // A literal branch stays a literal operand
                Intrinsic::If {
                    condition,
                    value_if_true,
                    value_if_false,
                } => {
                    let branch = self.selected_branch(condition, value_if_true, value_if_false)?;
                    self.argument(branch, declarations)
                }
                other => self
                    .render(other, None, declarations)
                    .map(FunctionArgument::reference),
            },
            TemplateValue::Null | TemplateValue::Map(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ResourceCatalog, ResourceMapping};
    use crate::input::InputVariable;
    use crate::resolver::{AttributeSnapshot, StackFacts};
    use crate::template::{Literal, Mapping, Template};
    use crate::traits::TraitsCollection;
    use indexmap::IndexMap;
    use serde_json::json;

    struct Fixture {
        template: Template,
        catalog: ResourceCatalog,
        traits: TraitsCollection,
        inputs: Vec<InputVariable>,
        snapshot: AttributeSnapshot,
    }

    impl Fixture {
        fn new() -> Self {
            let mut mapping = Mapping::new();
            let mut eu = IndexMap::new();
            eu.insert("ami".to_string(), Literal::string("ami-eu"));
            mapping.insert("eu-west-1".to_string(), eu);

            let mut snapshot = AttributeSnapshot::new();
            snapshot.insert(
                "Db".to_string(),
                json!({"endpoint": {"address": "db.example", "port": 5432}}),
            );
            Self {
                template: Template::new().with_mapping("RegionMap", mapping),
                catalog: ResourceCatalog::new(vec![
                    ResourceMapping::new("Bucket", "my-bucket", "AWS::S3::Bucket", "aws_s3_bucket"),
                    ResourceMapping::new("Db", "db-1", "AWS::RDS::DBInstance", "aws_db_instance"),
                    ResourceMapping::new("Network", "arn:stack/net", "AWS::CloudFormation::Stack", "aws_cloudformation_stack")
                        .with_module("network"),
                ]),
                traits: TraitsCollection::default(),
                inputs: vec![
                    InputVariable::variable("Env", Literal::string("dev")),
                    InputVariable::variable(
                        "Subnets",
                        Literal::List(vec![Literal::string("a"), Literal::string("b")]),
                    ),
                    InputVariable::data_source(
                        "AWS::Region",
                        Literal::string("eu-west-1"),
                        "data.aws_region.current.name",
                    ),
                ],
                snapshot,
            }
        }

        fn render(&self, intrinsic: Intrinsic) -> (Option<String>, Vec<DataSourceDeclaration>) {
            let facts = StackFacts::default().with_export("shared-vpc", "vpc-1");
            let resolver = DependencyResolver::new(
                &self.template,
                &self.catalog,
                &self.traits,
                &self.inputs,
                &self.snapshot,
            )
            .with_facts(facts);
            let mut declarations = Vec::new();
            let reference = resolver.render(&intrinsic, None, &mut declarations);
            (reference.map(|r| r.expression()), declarations)
        }
    }

    fn reference(name: &str) -> TemplateValue {
        TemplateValue::intrinsic(Intrinsic::Ref(name.to_string()))
    }

    #[test]
    fn test_ref_renders() {
        let fixture = Fixture::new();
        assert_eq!(
            fixture.render(Intrinsic::Ref("Bucket".to_string())).0.as_deref(),
            Some("aws_s3_bucket.Bucket.id")
        );
        assert_eq!(
            fixture.render(Intrinsic::Ref("Env".to_string())).0.as_deref(),
            Some("var.Env")
        );
        assert_eq!(
            fixture.render(Intrinsic::Ref("AWS::Region".to_string())).0.as_deref(),
            Some("data.aws_region.current.name")
        );
        assert_eq!(fixture.render(Intrinsic::Ref("AWS::StackName".to_string())).0, None);
    }

    #[test]
    fn test_get_att_uses_located_attribute() {
        let fixture = Fixture::new();
        assert_eq!(
            fixture.render(Intrinsic::get_att("Db", "Endpoint.Address")).0.as_deref(),
            Some("aws_db_instance.Db.endpoint.address")
        );
        assert_eq!(
            fixture.render(Intrinsic::get_att("Bucket", "DomainName")).0.as_deref(),
            Some("aws_s3_bucket.Bucket.domain_name")
        );
    }

    #[test]
    fn test_get_att_stack_output() {
        let fixture = Fixture::new();
        assert_eq!(
            fixture.render(Intrinsic::get_att("Network", "Outputs.VpcId")).0.as_deref(),
            Some("module.network.VpcId")
        );
    }

    #[test]
    fn test_select_indexes_inner_rendering() {
        let fixture = Fixture::new();
        let select = Intrinsic::Select {
            index: TemplateValue::Int(1),
            items: reference("Subnets"),
        };
        assert_eq!(fixture.render(select).0.as_deref(), Some("var.Subnets[1]"));
    }

    #[test]
    fn test_find_in_map_with_ref_key() {
        let fixture = Fixture::new();
        let find = Intrinsic::FindInMap {
            map_name: TemplateValue::string("RegionMap"),
            top_level_key: reference("AWS::Region"),
            second_level_key: TemplateValue::string("ami"),
        };
        assert_eq!(
            fixture.render(find).0.as_deref(),
            Some("local.mappings.RegionMap[data.aws_region.current.name].ami")
        );
    }

    #[test]
    fn test_sub_interleaves_literals_and_references() {
        let fixture = Fixture::new();
        let sub = Intrinsic::Sub {
            expression: "${Env}-${Bucket}-logs".to_string(),
            variables: IndexMap::new(),
        };
        assert_eq!(
            fixture.render(sub).0.as_deref(),
            Some(r#"join("", [var.Env, "-", aws_s3_bucket.Bucket.id, "-logs"])"#)
        );

        let single = Intrinsic::Sub {
            expression: "${Bucket}".to_string(),
            variables: IndexMap::new(),
        };
        assert_eq!(fixture.render(single).0.as_deref(), Some("aws_s3_bucket.Bucket.id"));

        let literal = Intrinsic::Sub {
            expression: "plain".to_string(),
            variables: IndexMap::new(),
        };
        assert_eq!(fixture.render(literal).0, None);
    }

    #[test]
    fn test_functions() {
        let fixture = Fixture::new();
        let split = Intrinsic::Split {
            delimiter: ",".to_string(),
            source: reference("Env"),
        };
        assert_eq!(fixture.render(split).0.as_deref(), Some(r#"split(",", var.Env)"#));

        let cidr = Intrinsic::Select {
            index: TemplateValue::Int(0),
            items: TemplateValue::intrinsic(Intrinsic::Cidr {
                ip_block: TemplateValue::string("10.0.0.0/16"),
                count: TemplateValue::Int(2),
                cidr_bits: TemplateValue::Int(8),
            }),
        };
        assert_eq!(
            fixture.render(cidr).0.as_deref(),
            Some(r#"cidrsubnets("10.0.0.0/16", 8, 8)[0]"#)
        );

        let b64 = Intrinsic::Base64(reference("Env"));
        assert_eq!(fixture.render(b64).0.as_deref(), Some("base64encode(var.Env)"));
    }

    #[test]
    fn test_cidr_count_out_of_range() {
        let fixture = Fixture::new();
        let cidr = |count: i64| Intrinsic::Cidr {
            ip_block: reference("Env"),
            count: TemplateValue::Int(count),
            cidr_bits: TemplateValue::Int(8),
        };
        assert_eq!(
            fixture.render(cidr(256)).0.map(|e| e.matches(", 8").count()),
            Some(256)
        );
        assert_eq!(fixture.render(cidr(257)).0, None);
        assert_eq!(fixture.render(cidr(0)).0, None);
        assert_eq!(fixture.render(cidr(-1)).0, None);
    }

    #[test]
    fn test_find_in_map_key_from_literal_if_branch() {
        let fixture = Fixture::new();
        let find = Intrinsic::FindInMap {
            map_name: TemplateValue::string("RegionMap"),
            top_level_key: reference("AWS::Region"),
            second_level_key: TemplateValue::intrinsic(Intrinsic::If {
                condition: "UseAmi".to_string(),
                value_if_true: TemplateValue::string("ami"),
                value_if_false: TemplateValue::string("kernel"),
            }),
        };
        let template = fixture.template.clone().with_condition("UseAmi", true);
        let fixture = Fixture { template, ..fixture };
        assert_eq!(
            fixture.render(find).0.as_deref(),
            Some("local.mappings.RegionMap[data.aws_region.current.name].ami")
        );
    }

    #[test]
    fn test_data_source_declarations() {
        let fixture = Fixture::new();
        let azs = Intrinsic::Select {
            index: TemplateValue::Int(1),
            items: TemplateValue::intrinsic(Intrinsic::GetAZs(TemplateValue::string(""))),
        };
        let (expression, declarations) = fixture.render(azs);
        assert_eq!(
            expression.as_deref(),
            Some("data.aws_availability_zones.available.names[1]")
        );
        assert_eq!(declarations[0].address(), "aws_availability_zones.available");
        assert_eq!(declarations[0].arguments["state"], "available");

        let import = Intrinsic::ImportValue(TemplateValue::string("shared-vpc"));
        let (expression, declarations) = fixture.render(import);
        assert_eq!(
            expression.as_deref(),
            Some("data.aws_cloudformation_export.shared-vpc.value")
        );
        assert_eq!(declarations[0].arguments["name"], "shared-vpc");
    }
}
