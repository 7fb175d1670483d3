//! Intrinsic - Intrinsic function AST

use std::fmt;

use indexmap::IndexMap;

use super::TemplateValue;

/// Intrinsic function node
#[derive(Debug, Clone, PartialEq)]
pub enum Intrinsic {
    /// `Ref`: parameter, pseudo parameter or resource physical id
    Ref(String),
    GetAtt {
        logical_id: String,
        /// Attribute name; a literal string or a `Ref` to a parameter
        attribute: TemplateValue,
    },
    Sub {
        expression: String,
        variables: IndexMap<String, TemplateValue>,
    },
    Join {
        separator: String,
        items: TemplateValue,
    },
    FindInMap {
        map_name: TemplateValue,
        top_level_key: TemplateValue,
        second_level_key: TemplateValue,
    },
    Select {
        index: TemplateValue,
        items: TemplateValue,
    },
    Split {
        delimiter: String,
        source: TemplateValue,
    },
    Base64(TemplateValue),
    Cidr {
        ip_block: TemplateValue,
        count: TemplateValue,
        cidr_bits: TemplateValue,
    },
    GetAZs(TemplateValue),
    ImportValue(TemplateValue),
    If {
        condition: String,
        value_if_true: TemplateValue,
        value_if_false: TemplateValue,
    },
}

/// Discriminant of [`Intrinsic`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntrinsicKind {
    Ref,
    GetAtt,
    Sub,
    Join,
    FindInMap,
    Select,
    Split,
    Base64,
    Cidr,
    GetAZs,
    ImportValue,
    If,
}

impl IntrinsicKind {
    pub fn tag_name(&self) -> &'static str {
        match self {
            IntrinsicKind::Ref => "Ref",
            IntrinsicKind::GetAtt => "Fn::GetAtt",
            IntrinsicKind::Sub => "Fn::Sub",
            IntrinsicKind::Join => "Fn::Join",
            IntrinsicKind::FindInMap => "Fn::FindInMap",
            IntrinsicKind::Select => "Fn::Select",
            IntrinsicKind::Split => "Fn::Split",
            IntrinsicKind::Base64 => "Fn::Base64",
            IntrinsicKind::Cidr => "Fn::Cidr",
            IntrinsicKind::GetAZs => "Fn::GetAZs",
            IntrinsicKind::ImportValue => "Fn::ImportValue",
            IntrinsicKind::If => "Fn::If",
        }
    }
}

impl Intrinsic {
    pub fn get_att(logical_id: impl Into<String>, attribute: impl Into<String>) -> Self {
        Intrinsic::GetAtt {
            logical_id: logical_id.into(),
            attribute: TemplateValue::String(attribute.into()),
        }
    }

    pub fn kind(&self) -> IntrinsicKind {
        match self {
            Intrinsic::Ref(_) => IntrinsicKind::Ref,
            Intrinsic::GetAtt { .. } => IntrinsicKind::GetAtt,
            Intrinsic::Sub { .. } => IntrinsicKind::Sub,
            Intrinsic::Join { .. } => IntrinsicKind::Join,
            Intrinsic::FindInMap { .. } => IntrinsicKind::FindInMap,
            Intrinsic::Select { .. } => IntrinsicKind::Select,
            Intrinsic::Split { .. } => IntrinsicKind::Split,
            Intrinsic::Base64(_) => IntrinsicKind::Base64,
            Intrinsic::Cidr { .. } => IntrinsicKind::Cidr,
            Intrinsic::GetAZs(_) => IntrinsicKind::GetAZs,
            Intrinsic::ImportValue(_) => IntrinsicKind::ImportValue,
            Intrinsic::If { .. } => IntrinsicKind::If,
        }
    }

    /// Operand values in argument order
    pub fn operands(&self) -> Vec<&TemplateValue> {
        match self {
            Intrinsic::Ref(_) => vec![],
            Intrinsic::GetAtt { attribute, .. } => vec![attribute],
            Intrinsic::Sub { variables, .. } => variables.values().collect(),
            Intrinsic::Join { items, .. } => vec![items],
            Intrinsic::FindInMap {
                map_name,
                top_level_key,
                second_level_key,
            } => vec![map_name, top_level_key, second_level_key],
            Intrinsic::Select { index, items } => vec![index, items],
            Intrinsic::Split { source, .. } => vec![source],
            Intrinsic::Base64(v) | Intrinsic::GetAZs(v) | Intrinsic::ImportValue(v) => vec![v],
            Intrinsic::Cidr {
                ip_block,
                count,
                cidr_bits,
            } => vec![ip_block, count, cidr_bits],
            Intrinsic::If {
                value_if_true,
                value_if_false,
                ..
            } => vec![value_if_true, value_if_false],
        }
    }
}

impl fmt::Display for Intrinsic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Intrinsic::Ref(name) => write!(f, "!Ref {}", name),
            Intrinsic::GetAtt {
                logical_id,
                attribute: TemplateValue::String(attr),
            } => write!(f, "!GetAtt {}.{}", logical_id, attr),
            Intrinsic::GetAtt { logical_id, .. } => write!(f, "!GetAtt {}.<computed>", logical_id),
            Intrinsic::Sub { expression, .. } => write!(f, "!Sub \"{}\"", expression),
            Intrinsic::If { condition, .. } => write!(f, "!If {}", condition),
            other => write!(f, "!{}", other.kind().tag_name().trim_start_matches("Fn::")),
        }
    }
}

/// Piece of an `Fn::Sub` expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubSegment {
    Literal(String),
    Placeholder(String),
}

/// Split an `Fn::Sub` expression into literal text and `${...}` placeholders
///
/// `${!Name}` is an escape for the literal text `${Name}`. Adjacent literal
/// text is merged into one segment.
pub fn parse_sub(expression: &str) -> Vec<SubSegment> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut rest = expression;

    while let Some(start) = rest.find("${") {
        literal.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            literal.push_str(&rest[start..]);
            rest = "";
            break;
        };
        let name = &after[..end];
        if let Some(escaped) = name.strip_prefix('!') {
            literal.push_str("${");
            literal.push_str(escaped);
            literal.push('}');
        } else {
            if !literal.is_empty() {
                segments.push(SubSegment::Literal(std::mem::take(&mut literal)));
            }
            segments.push(SubSegment::Placeholder(name.trim().to_string()));
        }
        rest = &after[end + 1..];
    }

    literal.push_str(rest);
    if !literal.is_empty() {
        segments.push(SubSegment::Literal(literal));
    }
    segments
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sub_placeholders() {
        let segments = parse_sub("arn:${AWS::Partition}:s3:::${Bucket}/*");
        assert_eq!(
            segments,
            vec![
                SubSegment::Literal("arn:".to_string()),
                SubSegment::Placeholder("AWS::Partition".to_string()),
                SubSegment::Literal(":s3:::".to_string()),
                SubSegment::Placeholder("Bucket".to_string()),
                SubSegment::Literal("/*".to_string()),
            ]
        );
    }

    #[test]
    fn test_parse_sub_escape_merges_with_literal() {
        let segments = parse_sub("echo ${!HOME} is ${Home}");
        assert_eq!(
            segments,
            vec![
                SubSegment::Literal("echo ${HOME} is ".to_string()),
                SubSegment::Placeholder("Home".to_string()),
            ]
        );
    }

    #[test]
    fn test_parse_sub_unterminated() {
        assert_eq!(
            parse_sub("a ${b"),
            vec![SubSegment::Literal("a ${b".to_string())]
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(Intrinsic::Ref("Bucket".to_string()).to_string(), "!Ref Bucket");
        assert_eq!(Intrinsic::get_att("Role", "Arn").to_string(), "!GetAtt Role.Arn");
        assert_eq!(
            Intrinsic::Base64(TemplateValue::string("x")).to_string(),
            "!Base64"
        );
    }
}
