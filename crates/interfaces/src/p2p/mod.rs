/// Traits describing the request capability the networking layer must supply.
pub mod client;

/// Error variants shared between the transport boundary and task callers.
pub mod error;

/// Attempt outcomes and the merge-policy contract.
pub mod response;
