//! CLI command implementations

pub mod driver;
pub mod module;
pub mod show;
pub mod validate;
pub mod workflow;

use crate::cli::SourceArgs;
use tfkit_core::types::SourceDescriptor;

/// Template source given on the command line, if any
pub(crate) fn source_descriptor(args: &SourceArgs) -> Option<SourceDescriptor> {
    args.source.as_ref().map(|location| SourceDescriptor {
        location: location.clone(),
        username: args.username.clone(),
        password: args.password.clone(),
    })
}
