//! Apply - Write reference tokens into a state attribute tree

use indexmap::IndexMap;
use log::{debug, warn};
use serde_json::Value;

use crate::path::AttributePath;
use crate::reference::Reference;

/// Replacement of one leaf by a reference token
#[derive(Debug, Clone, PartialEq)]
pub struct Modification {
    /// Leaf path, relative to the embedded document when `containing` is set
    pub location: AttributePath,
    /// String property holding an embedded JSON document
    pub containing: Option<AttributePath>,
    /// `None` when the intrinsic matched but could not be rendered
    pub reference: Option<Reference>,
}

/// Apply `modifications` to `attributes`, returning how many leaves changed
///
/// Modifications inside an embedded document are grouped so each document is
/// parsed and serialized once. A document nothing changed in is left as is.
pub fn apply_modifications(attributes: &mut Value, modifications: &[Modification]) -> usize {
    let mut applied = 0;
    let mut documents: IndexMap<&AttributePath, Vec<(&AttributePath, &Reference)>> = IndexMap::new();

    for modification in modifications {
        let Some(reference) = &modification.reference else {
            continue;
        };
        match &modification.containing {
            Some(containing) => documents
                .entry(containing)
                .or_default()
                .push((&modification.location, reference)),
            None => {
                if replace(attributes, &modification.location, reference) {
                    applied += 1;
                }
            }
        }
    }

    for (containing, replacements) in documents {
        let Some(Value::String(text)) = containing.get(attributes) else {
            warn!("Embedded document at {} is no longer a string", containing);
            continue;
        };
        let Ok(mut document) = serde_json::from_str::<Value>(text) else {
            warn!("Embedded document at {} no longer parses", containing);
            continue;
        };

        let changed = replacements
            .into_iter()
            .filter(|(location, reference)| replace(&mut document, location, reference))
            .count();
        if changed == 0 {
            continue;
        }
        if let Some(slot) = containing.get_mut(attributes) {
            *slot = Value::String(document.to_string());
            applied += changed;
        }
    }

    applied
}

fn replace(root: &mut Value, location: &AttributePath, reference: &Reference) -> bool {
    match location.get_mut(root) {
        Some(leaf) => {
            debug!("{} -> {}", location, reference);
            *leaf = Value::String(reference.encode());
            true
        }
        None => {
            warn!("No attribute at {} to replace with {}", location, reference);
            false
        }
    }
}
