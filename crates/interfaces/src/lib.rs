#![warn(missing_docs, unreachable_pub)]
#![deny(unused_must_use, rust_2018_idioms)]
#![doc(test(
    no_crate_inject,
    attr(deny(warnings, rust_2018_idioms), allow(dead_code, unused_variables))
))]

//! Quarry interface bindings
//!
//! Boundary contracts between the retrying fetch engine and the networking
//! layer it rides on, plus the shared data model and error taxonomy.
//!
//! ## Feature Flags
//!
//! - `test-utils`: Export utilities for testing

/// Peer identifiers.
pub mod peers;

/// P2P traits.
pub mod p2p;

/// Common test helpers for mocking out the networking layer.
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
