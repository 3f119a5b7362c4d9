//! Channel selection and result aggregation
//!
//! - Channel arbitration
//! - Result types
//! - Archival metadata

pub mod arbiter;
pub mod metadata;
pub mod result;
