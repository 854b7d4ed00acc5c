//! Configuration for forking from a remote chain.

use alloy_primitives::BlockNumber;
use serde::{Deserialize, Serialize};

/// Settings describing the upstream chain to fork from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForkConfig {
    /// HTTP(S) URL of the upstream JSON-RPC endpoint.
    pub endpoint: String,

    /// Block number at which local history starts to diverge.
    ///
    /// When unset, the remote latest block number at construction time is
    /// used as the fork point.
    #[serde(default)]
    pub fork_block_number: Option<BlockNumber>,
}

impl ForkConfig {
    /// Creates a config forking from the latest remote block.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            fork_block_number: None,
        }
    }

    /// Pins the fork point to a specific block number.
    pub fn with_fork_block(mut self, number: BlockNumber) -> Self {
        self.fork_block_number = Some(number);
        self
    }
}
