//! Path - Locations inside property and attribute trees
//!
//! The same path type addresses a property in a template resource and a leaf in
//! a Terraform state attribute tree (or in a JSON document embedded in one).

use std::fmt;

use serde_json::Value;

/// One step of an [`AttributePath`]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

/// Ordered list of object keys and array indices from a tree root
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct AttributePath {
    segments: Vec<PathSegment>,
}

impl AttributePath {
    pub fn root() -> Self {
        Self::default()
    }

    /// Parse a dotted path such as `statement.0.resource`
    ///
    /// Purely numeric segments become array indices.
    pub fn parse(dotted: &str) -> Self {
        let segments = dotted
            .split('.')
            .filter(|s| !s.is_empty())
            .map(|s| match s.parse::<usize>() {
                Ok(i) => PathSegment::Index(i),
                Err(_) => PathSegment::Key(s.to_string()),
            })
            .collect();
        Self { segments }
    }

    pub fn key(&self, key: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(PathSegment::Key(key.into()));
        Self { segments }
    }

    pub fn index(&self, index: usize) -> Self {
        let mut segments = self.segments.clone();
        segments.push(PathSegment::Index(index));
        Self { segments }
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Name of the innermost object key, skipping trailing array indices
    pub fn property_name(&self) -> Option<&str> {
        self.segments.iter().rev().find_map(|s| match s {
            PathSegment::Key(k) => Some(k.as_str()),
            PathSegment::Index(_) => None,
        })
    }

    /// Path of the attribute holding this location, without trailing array indices
    pub fn property_path(&self) -> AttributePath {
        let mut segments = self.segments.clone();
        while matches!(segments.last(), Some(PathSegment::Index(_))) {
            segments.pop();
        }
        Self { segments }
    }

    /// Dotted form used for glob matching, e.g. `ingress.0.cidr_blocks`
    pub fn dotted(&self) -> String {
        self.segments
            .iter()
            .map(|s| match s {
                PathSegment::Key(k) => k.clone(),
                PathSegment::Index(i) => i.to_string(),
            })
            .collect::<Vec<_>>()
            .join(".")
    }

    pub fn get<'v>(&self, root: &'v Value) -> Option<&'v Value> {
        self.segments.iter().try_fold(root, |node, segment| match segment {
            PathSegment::Key(k) => node.as_object()?.get(k),
            PathSegment::Index(i) => node.as_array()?.get(*i),
        })
    }

    pub fn get_mut<'v>(&self, root: &'v mut Value) -> Option<&'v mut Value> {
        self.segments
            .iter()
            .try_fold(root, |node, segment| match segment {
                PathSegment::Key(k) => node.as_object_mut()?.get_mut(k),
                PathSegment::Index(i) => node.as_array_mut()?.get_mut(*i),
            })
    }
}

impl fmt::Display for AttributePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                PathSegment::Key(k) if i == 0 => write!(f, "{}", k)?,
                PathSegment::Key(k) => write!(f, ".{}", k)?,
                PathSegment::Index(idx) => write!(f, "[{}]", idx)?,
            }
        }
        Ok(())
    }
}
