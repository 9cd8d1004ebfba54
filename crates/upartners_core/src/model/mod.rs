//! Domain records for partners, labels, groups, cases and exports.
//!
//! # Responsibility
//! - Define plain data structures shared by repositories and services.
//! - Own JSON projections (`as_json`) consumed by outer surfaces.
//!
//! # Invariants
//! - Local ids are SQLite row ids and never reused.
//! - Remote platform objects are referenced by their uuid strings.
//! - Timestamps are Unix epoch milliseconds (UTC).

pub mod case;
pub mod export;
pub mod group;
pub mod label;
pub mod org;
pub mod partner;
pub mod text;
