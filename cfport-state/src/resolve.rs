//! Resolve - Run dependency resolution over a whole state

use cfport_core::resolver::{DependencyResolver, ResolutionReport};
use cfport_core::template::EvaluationContext;
use log::{debug, info};

use crate::state::StateFile;

/// Resolve every managed resource that has a template counterpart
///
/// The resolver's attribute snapshot must be taken from `state` before this
/// call so values are read as deployed. A resource whose instances break the
/// single-instance rule is reported and skipped; the others still resolve.
pub fn resolve_dependencies(state: &mut StateFile, resolver: &DependencyResolver<'_>) -> ResolutionReport {
    let mut report = ResolutionReport::default();

    for resource in state.resources.iter_mut().filter(|r| r.is_managed()) {
        if resolver.template().resource(&resource.name).is_none() {
            debug!("{} has no template resource, skipping", resource.address());
            continue;
        }
        report.record(resolver.resolve(&resource.name, &mut resource.instances));
    }

    info!(
        "Resolved {} resources: {} references written, {} warnings, {} errors",
        report.resolutions.len(),
        report.modification_count(),
        report.warnings().count(),
        report.errors.len()
    );
    report
}
