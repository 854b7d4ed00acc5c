//! Error types for the forking blockchain core.

use alloy_primitives::{BlockHash, BlockNumber};
use alloy_transport::TransportError;
use thiserror::Error;

/// Errors produced while talking to the upstream JSON-RPC node.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// The configured endpoint is not a valid HTTP(S) URL.
    #[error("invalid upstream endpoint {endpoint}: {source}")]
    InvalidEndpoint {
        /// The endpoint string as supplied.
        endpoint: String,
        /// The underlying URL parse failure.
        #[source]
        source: url::ParseError,
    },

    /// Transport-level or decode failure from the upstream request.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The upstream answered, but the response contradicts the request.
    #[error("inconsistent upstream response: {0}")]
    InconsistentResponse(String),
}

/// Errors produced by the forked blockchain store.
#[derive(Debug, Error)]
pub enum BlockchainError {
    /// The referenced block is unknown to the store.
    #[error("block {0} not found")]
    BlockNotFound(BlockHash),

    /// An appended block must extend the chain tip by exactly one height.
    #[error("invalid block number: expected {expected}, got {actual}")]
    InvalidBlockNumber {
        /// The height the chain tip requires next.
        expected: BlockNumber,
        /// The height the rejected block carries.
        actual: BlockNumber,
    },

    /// An appended block must name the current chain tip as its parent.
    #[error("invalid parent hash: expected {expected}, got {actual}")]
    InvalidParentHash {
        /// The hash of the current chain tip.
        expected: BlockHash,
        /// The parent hash the rejected block carries.
        actual: BlockHash,
    },

    /// The reference block is not the one currently stored at its height.
    #[error("block {hash} is not the block stored at height {number}")]
    InvalidBlock {
        /// Height claimed by the reference block.
        number: BlockNumber,
        /// Hash of the reference block.
        hash: BlockHash,
    },

    /// Blocks at or below the fork height belong to the upstream chain and
    /// cannot be removed from the local view.
    #[error("cannot delete block {number} at or below the fork height {fork_height}")]
    CannotDeleteRemote {
        /// Height of the block the caller tried to remove.
        number: BlockNumber,
        /// The immutable fork height of this chain.
        fork_height: BlockNumber,
    },

    /// The operation is intentionally unimplemented.
    #[error("operation not supported: {0}")]
    NotSupported(&'static str),

    /// The upstream node failed or misbehaved during a demand-load.
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}
