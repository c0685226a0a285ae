//! GAP-level identity types
//!
//! This module holds the peer-device identity used to key all per-device
//! state in the stack. Discovery and connection establishment live in
//! external collaborators; only the address type itself is modeled here.

pub mod types;
#[cfg(test)]
mod tests;

// Re-export the public API
pub use self::types::{AddrParseError, BdAddr};
