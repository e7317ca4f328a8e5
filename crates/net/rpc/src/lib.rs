#![warn(missing_docs, unreachable_pub)]
#![deny(unused_must_use, rust_2018_idioms)]
#![doc(test(
    no_crate_inject,
    attr(deny(warnings, rust_2018_idioms), allow(dead_code, unused_variables))
))]

//! Quarry RPC implementation
//!
//! Read-only JSON-RPC projection over the in-memory vote proposal set.

/// The `vote_` namespace.
pub mod vote;

pub use vote::{VoteApiServer, VoteProposer, VoteRpc, VoteType};
