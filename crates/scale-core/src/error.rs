//! Error types for core model conversions

use thiserror::Error;

/// A unit token that is not one of the supported weight units
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown weight unit: {0}")]
pub struct UnitParseError(pub String);
