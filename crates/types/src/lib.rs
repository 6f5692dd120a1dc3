//! Shared value types for Taskrun.
//!
//! This crate holds the pieces every other crate agrees on: parameter kinds and
//! their string parsing contract, parameter descriptors, and the identity and
//! provenance tokens that the definition registry hands out.

pub mod date_interval;
pub mod definition;
pub mod parameter;
pub mod value;

pub use date_interval::DateInterval;
pub use definition::{DefinitionId, DefinitionKind, Provenance};
pub use parameter::{ParamSpec, ParameterDescriptor, is_valid_identifier};
pub use value::{ParamKind, ParamValue, ParseValueError};
