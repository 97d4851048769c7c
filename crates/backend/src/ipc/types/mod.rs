//! IPC types - request and reply payloads with conversions from domain types
//!
//! Each area has its own module containing:
//! - Request types (input parameters)
//! - Reply types (output data)
//! - Conversions from domain types

pub mod instance;
pub mod registry;
pub mod system;
