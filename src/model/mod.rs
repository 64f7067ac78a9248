//! Core value types shared by the batch pipeline.

mod description;
mod snapshot;
mod unit;

pub use description::CommandDescription;
pub use snapshot::{SnapshotError, StateSnapshot};
pub use unit::{BinaryDescriptor, WorkUnit, WorkUnitParseError};
