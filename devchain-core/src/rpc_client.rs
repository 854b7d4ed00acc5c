//! RPC client for fetching blocks and transactions from the upstream node.
//!
//! The forked blockchain store uses this client to demand-load the immutable
//! region of the chain. The client holds a single HTTP provider that is
//! reused across all calls; it performs no caching of its own.

use alloy_primitives::{BlockNumber, TxHash};
use alloy_provider::{Provider, ProviderBuilder, RootProvider};
use alloy_rpc_types_eth::{Block, BlockId, BlockNumberOrTag, Transaction};
use url::Url;

use crate::error::UpstreamError;

/// JSON-RPC client for the upstream archive node.
///
/// Responses are cross-checked against the request before they are handed to
/// callers: a block returned for a number or hash lookup must actually carry
/// that number or hash.
#[derive(Debug, Clone)]
pub struct RpcClient {
    /// Upstream node providing historical blocks and transactions.
    provider: RootProvider,
}

impl RpcClient {
    /// Creates a new client for the given HTTP(S) JSON-RPC endpoint.
    pub fn new(endpoint: &str) -> Result<Self, UpstreamError> {
        let url = endpoint
            .parse::<Url>()
            .map_err(|source| UpstreamError::InvalidEndpoint {
                endpoint: endpoint.to_string(),
                source,
            })?;

        Ok(Self {
            provider: ProviderBuilder::default().connect_http(url),
        })
    }

    /// Gets a block by its identifier with optional full transaction bodies.
    ///
    /// Returns `Ok(None)` when the upstream explicitly reports the block as
    /// unknown.
    pub async fn get_block(
        &self,
        block_id: BlockId,
        full_txs: bool,
    ) -> Result<Option<Block<Transaction>>, UpstreamError> {
        let block = if full_txs {
            self.provider.get_block(block_id).full().await?
        } else {
            self.provider.get_block(block_id).await?
        };

        let Some(block) = block else {
            return Ok(None);
        };

        // Verify block_id matches the returned block
        match block_id {
            BlockId::Number(BlockNumberOrTag::Number(number))
                if block.header.number != number =>
            {
                Err(UpstreamError::InconsistentResponse(format!(
                    "block number mismatch: requested {number}, got {}",
                    block.header.number
                )))
            }
            BlockId::Hash(hash) if block.header.hash != hash.block_hash => {
                Err(UpstreamError::InconsistentResponse(format!(
                    "block hash mismatch: requested {:?}, got {:?}",
                    hash.block_hash, block.header.hash
                )))
            }
            _ => Ok(Some(block)),
        }
    }

    /// Gets a transaction by hash.
    ///
    /// The returned record carries its own block coordinates; they are absent
    /// while the upstream still considers the transaction pending.
    pub async fn get_transaction_by_hash(
        &self,
        tx_hash: TxHash,
    ) -> Result<Option<Transaction>, UpstreamError> {
        Ok(self.provider.get_transaction_by_hash(tx_hash).await?)
    }

    /// Gets the current latest block number from the upstream node.
    pub async fn get_latest_block_number(&self) -> Result<BlockNumber, UpstreamError> {
        Ok(self.provider.get_block_number().await?)
    }
}
