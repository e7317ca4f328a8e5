use alloy_primitives::Address;
use jsonrpsee::{core::RpcResult, proc_macros::rpc};
use std::collections::HashMap;

/// The type of a pending validator vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteType {
    /// Proposal to add the validator.
    Add,
    /// Proposal to remove the validator.
    Drop,
}

/// Read-only source of the pending vote proposals.
///
/// Supplied by the consensus layer; the RPC surface only projects it.
pub trait VoteProposer: Send + Sync + 'static {
    /// Returns the pending proposals keyed by validator address.
    fn get_proposals(&self) -> HashMap<Address, VoteType>;
}

/// Vote namespace rpc interface.
#[rpc(server, namespace = "vote")]
pub trait VoteApi {
    /// Returns the pending vote proposals keyed by the validator address in
    /// its canonical string form, with `true` for addition proposals and
    /// `false` for removal proposals.
    #[method(name = "proposals")]
    fn proposals(&self) -> RpcResult<HashMap<String, bool>>;
}

/// `vote_` API implementation.
#[derive(Debug, Clone)]
pub struct VoteRpc<P> {
    /// The proposal set this endpoint reports on.
    proposer: P,
}

impl<P> VoteRpc<P> {
    /// Creates a new endpoint over the given proposal source.
    pub const fn new(proposer: P) -> Self {
        Self { proposer }
    }
}

impl<P: VoteProposer> VoteApiServer for VoteRpc<P> {
    fn proposals(&self) -> RpcResult<HashMap<String, bool>> {
        Ok(self
            .proposer
            .get_proposals()
            .into_iter()
            .map(|(address, vote)| (address.to_string(), vote == VoteType::Add))
            .collect())
    }
}
