use alloy_primitives::B512;

/// The identifier of a remote peer.
///
/// This is the compressed secp256k1 public key of the peer's enode identity,
/// which is stable across reconnects and is what the peer registry is keyed by.
pub type PeerId = B512;
