//! Library entry for helpsweep exposing the batch pipeline for the binary and integration tests.

pub mod args;
pub mod batch;
pub mod command;
pub mod config;
pub mod discovery;
pub mod introspect;
pub mod isolation;
pub mod logging;
pub mod metadata;
pub mod model;
pub mod processor;
pub mod registry;
pub mod util;
pub mod wrappers;
