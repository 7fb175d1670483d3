//! Synthesize - Turn matched intrinsics into references
//!
//! Collects the data blocks the rendered references need so the configuration
//! writer can declare each one once.

use indexmap::IndexSet;
use log::debug;

use super::DependencyResolver;
use super::extract::IntrinsicReference;
use crate::input::{DataSourceDeclaration, data_block_address};
use crate::reference::Reference;
use crate::template::IntrinsicKind;

pub(crate) struct Synthesizer<'r, 'a> {
    resolver: &'r DependencyResolver<'a>,
    declarations: Vec<DataSourceDeclaration>,
    /// `type.name` of every data block read by a synthesized reference
    data_blocks: IndexSet<String>,
}

impl<'r, 'a> Synthesizer<'r, 'a> {
    pub fn new(resolver: &'r DependencyResolver<'a>) -> Self {
        Self {
            resolver,
            declarations: Vec::new(),
            data_blocks: IndexSet::new(),
        }
    }

    /// Reference for a matched top-level intrinsic, if it can be expressed
    pub fn synthesize(&mut self, reference: &IntrinsicReference<'_>) -> Option<Reference> {
        match reference.intrinsic_kind() {
            IntrinsicKind::GetAZs | IntrinsicKind::ImportValue | IntrinsicKind::If => {
                debug!("Not rewriting top-level {}", reference.intrinsic);
                return None;
            }
            _ => {}
        }

        let mut requested = Vec::new();
        let rendered = self.resolver.render(&reference.intrinsic, None, &mut requested)?;
        for declaration in requested {
            self.register(declaration);
        }
        for address in rendered.data_source_addresses() {
            if let Some(block) = data_block_address(address) {
                self.data_blocks.insert(block);
            }
        }
        Some(rendered)
    }

    /// Keep `declaration` unless it is already known or an input without a
    /// declaration of its own reads the same block
    fn register(&mut self, declaration: DataSourceDeclaration) {
        let address = declaration.address();
        let provided = self.resolver.inputs.iter().any(|input| {
            input.declaration.is_none() && input.block_address().as_deref() == Some(address.as_str())
        });
        if provided || self.declarations.iter().any(|d| d.address() == address) {
            return;
        }
        self.declarations.push(declaration);
    }

    pub fn into_parts(self) -> (Vec<DataSourceDeclaration>, Vec<String>) {
        (self.declarations, self.data_blocks.into_iter().collect())
    }
}
