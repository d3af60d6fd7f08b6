//! Shared types for the spawner workspace.
//!
//! Keep Marathon wire types here so the library and the operator CLI agree on
//! one definition.

#![warn(missing_docs)]

/// Marathon v2 REST DTOs.
pub mod api;
