//! Forked blockchain store - the hybrid block index behind a local dev chain.
//!
//! The store presents one continuous chain that is backed by two regions:
//!
//! - **Remote region** `[0 .. fork_height]`: immutable history owned by the
//!   upstream node. Blocks are fetched on demand through [`RpcClient`] and
//!   cached; once cached they are never evicted or replaced.
//! - **Local suffix** `(fork_height .. latest_height]`: blocks mined by the
//!   local node and appended one at a time. Only these blocks can be removed
//!   again, when a reorg drops part of the suffix.
//!
//! ## Indexes
//!
//! The store owns five indexes that are always updated as one group under a
//! single lock:
//!
//! - `blocks_by_number`: block height → block
//! - `blocks_by_hash`: block hash → block
//! - `td_by_hash`: block hash → cumulative difficulty
//! - `tx_by_hash`: transaction hash → transaction
//! - `tx_to_block_hash`: transaction hash → containing block hash
//!
//! A reader that observes a block in `blocks_by_hash` is therefore
//! guaranteed to also observe its cumulative difficulty and, for embedded
//! transactions, their block bindings.
//!
//! The lock is never held across an upstream call: a demand-load fetches
//! first and installs after the response has arrived, so a cancelled lookup
//! leaves no partial state behind.

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use alloy_network_primitives::TransactionResponse;
use alloy_primitives::{BlockHash, BlockNumber, TxHash, U256};
use alloy_rpc_types_eth::{Block, BlockId, BlockNumberOrTag, BlockTransactions, Transaction};
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::{
    config::ForkConfig,
    error::{BlockchainError, UpstreamError},
    rpc_client::RpcClient,
};

/// A block as stored and served by the chain: RPC shape with full
/// transaction bodies.
pub type ChainBlock = Block<Transaction>;

/// The index group owned by the store.
///
/// All five maps plus the tip height are mutated together under the write
/// lock, so readers always observe a consistent group.
#[derive(Debug, Default)]
struct ChainIndexes {
    /// Height of the current chain tip.
    latest_height: BlockNumber,
    /// Block height → block, for the cached remote region and the whole
    /// local suffix.
    blocks_by_number: BTreeMap<BlockNumber, Arc<ChainBlock>>,
    /// Block hash → block.
    blocks_by_hash: HashMap<BlockHash, Arc<ChainBlock>>,
    /// Block hash → cumulative difficulty up to and including that block.
    td_by_hash: HashMap<BlockHash, U256>,
    /// Transaction hash → transaction, for embedded transactions of known
    /// blocks and for transactions fetched individually from upstream.
    tx_by_hash: HashMap<TxHash, Arc<Transaction>>,
    /// Transaction hash → hash of the block it was observed in.
    tx_to_block_hash: HashMap<TxHash, BlockHash>,
}

impl ChainIndexes {
    /// Installs a block into every index as one group and returns the shared
    /// handle.
    fn install(&mut self, block: ChainBlock, total_difficulty: U256) -> Arc<ChainBlock> {
        let block = Arc::new(block);
        let block_hash = block.header.hash;

        self.blocks_by_number
            .insert(block.header.number, Arc::clone(&block));
        self.blocks_by_hash.insert(block_hash, Arc::clone(&block));
        self.td_by_hash.insert(block_hash, total_difficulty);

        if let BlockTransactions::Full(txs) = &block.transactions {
            for tx in txs {
                let tx_hash = tx.tx_hash();
                self.tx_by_hash.insert(tx_hash, Arc::new(tx.clone()));
                self.tx_to_block_hash.insert(tx_hash, block_hash);
            }
        }

        block
    }

    /// Removes the block at `height` from every index, including the entries
    /// of its embedded transactions.
    fn remove_height(&mut self, height: BlockNumber) {
        let Some(block) = self.blocks_by_number.remove(&height) else {
            return;
        };

        let block_hash = block.header.hash;
        self.blocks_by_hash.remove(&block_hash);
        self.td_by_hash.remove(&block_hash);

        if let BlockTransactions::Full(txs) = &block.transactions {
            for tx in txs {
                let tx_hash = tx.tx_hash();
                self.tx_by_hash.remove(&tx_hash);
                self.tx_to_block_hash.remove(&tx_hash);
            }
        }
    }
}

/// Blockchain store that forks off an upstream chain at a fixed height.
///
/// Reads below the fork height are resolved through the upstream node and
/// cached; everything above it lives only in process memory. The block at
/// the fork height (the fork base) is the last upstream block and the parent
/// of the first locally appended block.
#[derive(Debug)]
pub struct ForkedBlockchain {
    /// Client for the upstream archive node.
    client: RpcClient,
    /// Height at which local history starts to diverge. Fixed for the
    /// lifetime of the store.
    fork_height: BlockNumber,
    /// The lock-guarded index group.
    indexes: RwLock<ChainIndexes>,
}

impl ForkedBlockchain {
    /// Creates a store forking off the upstream chain at `fork_height`.
    ///
    /// No upstream call is made here; the fork base is loaded on first use.
    pub fn new(client: RpcClient, fork_height: BlockNumber) -> Self {
        Self {
            client,
            fork_height,
            indexes: RwLock::new(ChainIndexes {
                latest_height: fork_height,
                ..ChainIndexes::default()
            }),
        }
    }

    /// Creates a store from a [`ForkConfig`], resolving an unset fork block
    /// number to the remote latest height.
    pub async fn from_config(config: &ForkConfig) -> Result<Self, BlockchainError> {
        let client = RpcClient::new(&config.endpoint)?;
        let fork_height = match config.fork_block_number {
            Some(number) => number,
            None => client.get_latest_block_number().await?,
        };

        debug!("[Fork] forking off upstream chain at height {fork_height}");
        Ok(Self::new(client, fork_height))
    }

    /// The height at which local history starts to diverge.
    pub fn fork_height(&self) -> BlockNumber {
        self.fork_height
    }

    /// The height of the current chain tip.
    pub fn latest_height(&self) -> BlockNumber {
        self.indexes.read().latest_height
    }

    /// Gets a block by number, hash, or tag.
    ///
    /// `latest` resolves to the current tip and `earliest` to the genesis
    /// block. The `pending`, `safe`, and `finalized` tags have no meaning on
    /// a dev chain and are rejected.
    pub async fn get_block(
        &self,
        block_id: BlockId,
    ) -> Result<Option<Arc<ChainBlock>>, BlockchainError> {
        match block_id {
            BlockId::Hash(hash) => self.get_block_by_hash(hash.block_hash).await,
            BlockId::Number(BlockNumberOrTag::Number(number)) => {
                self.get_block_by_number(number).await
            }
            BlockId::Number(BlockNumberOrTag::Latest) => self.get_latest_block().await.map(Some),
            BlockId::Number(BlockNumberOrTag::Earliest) => self.get_block_by_number(0).await,
            BlockId::Number(_) => Err(BlockchainError::NotSupported(
                "pending, safe, and finalized block tags",
            )),
        }
    }

    /// Gets a block by height.
    ///
    /// Heights above the current tip are absent without consulting the
    /// upstream: the local suffix is fully resident, so anything the store
    /// does not hold at or below the tip can only live in the remote region.
    pub async fn get_block_by_number(
        &self,
        number: BlockNumber,
    ) -> Result<Option<Arc<ChainBlock>>, BlockchainError> {
        {
            let indexes = self.indexes.read();
            if number > indexes.latest_height {
                return Ok(None);
            }
            if let Some(block) = indexes.blocks_by_number.get(&number) {
                return Ok(Some(Arc::clone(block)));
            }
        }

        let Some(block) = self
            .client
            .get_block(BlockId::Number(number.into()), true)
            .await?
        else {
            return Ok(None);
        };

        self.ingest_remote_block(block)
    }

    /// Gets a block by hash, falling back to the upstream on a cache miss.
    pub async fn get_block_by_hash(
        &self,
        hash: BlockHash,
    ) -> Result<Option<Arc<ChainBlock>>, BlockchainError> {
        if let Some(block) = self.indexes.read().blocks_by_hash.get(&hash) {
            return Ok(Some(Arc::clone(block)));
        }

        let Some(block) = self.client.get_block(BlockId::Hash(hash.into()), true).await? else {
            return Ok(None);
        };

        self.ingest_remote_block(block)
    }

    /// Gets the block at the current chain tip.
    pub async fn get_latest_block(&self) -> Result<Arc<ChainBlock>, BlockchainError> {
        let latest = self.latest_height();
        match self.get_block_by_number(latest).await? {
            Some(block) => Ok(block),
            // The tip is either a local block, which is always resident, or
            // the fork base, which must exist upstream.
            None => Err(UpstreamError::InconsistentResponse(format!(
                "upstream has no block at fork height {latest}"
            ))
            .into()),
        }
    }

    /// Appends a locally mined block on top of the current tip.
    ///
    /// The block must carry height `latest_height + 1` and name the current
    /// tip as its parent. Its cumulative difficulty is derived from the
    /// parent's, which is resident by the time the checks pass: the parent
    /// is either a prior local block or the fork base, and reading the tip
    /// below demand-loads the latter together with its difficulty.
    pub async fn append_block(&self, block: ChainBlock) -> Result<Arc<ChainBlock>, BlockchainError> {
        {
            let indexes = self.indexes.read();
            let expected = indexes.latest_height + 1;
            if block.header.number != expected {
                return Err(BlockchainError::InvalidBlockNumber {
                    expected,
                    actual: block.header.number,
                });
            }
        }

        let parent = self.get_latest_block().await?;

        let mut indexes = self.indexes.write();
        let expected = indexes.latest_height + 1;
        if block.header.number != expected {
            return Err(BlockchainError::InvalidBlockNumber {
                expected,
                actual: block.header.number,
            });
        }
        if block.header.parent_hash != parent.header.hash {
            return Err(BlockchainError::InvalidParentHash {
                expected: parent.header.hash,
                actual: block.header.parent_hash,
            });
        }

        let parent_td = indexes
            .td_by_hash
            .get(&parent.header.hash)
            .copied()
            .ok_or(BlockchainError::BlockNotFound(parent.header.hash))?;
        let total_difficulty = parent_td + block.header.difficulty;

        debug!(
            "[Fork] appending local block {} ({})",
            block.header.number, block.header.hash
        );
        let block = indexes.install(block, total_difficulty);
        indexes.latest_height += 1;
        Ok(block)
    }

    /// Removes a locally appended block and every block above it.
    ///
    /// The hash must refer to a block the store currently holds; the
    /// upstream is not consulted. Blocks at or below the fork height cannot
    /// be removed.
    pub fn delete_block(&self, hash: BlockHash) -> Result<(), BlockchainError> {
        let mut indexes = self.indexes.write();

        let number = match indexes.blocks_by_hash.get(&hash) {
            Some(block) => block.header.number,
            None => return Err(BlockchainError::BlockNotFound(hash)),
        };
        if number <= self.fork_height {
            return Err(BlockchainError::CannotDeleteRemote {
                number,
                fork_height: self.fork_height,
            });
        }

        let latest = indexes.latest_height;
        for height in number..=latest {
            indexes.remove_height(height);
        }
        indexes.latest_height = number - 1;

        warn!(
            "[Fork] dropped local blocks {number}..={latest}, tip is now {}",
            number - 1
        );
        Ok(())
    }

    /// Removes every block above the given reference block.
    ///
    /// The reference must be the block currently stored at its height.
    /// Succeeds as a no-op when nothing follows it; rejects when the blocks
    /// that follow belong to the remote region.
    pub fn delete_following_blocks(&self, block: &ChainBlock) -> Result<(), BlockchainError> {
        let number = block.header.number;

        let next_hash = {
            let indexes = self.indexes.read();
            match indexes.blocks_by_number.get(&number) {
                Some(stored) if stored.header.hash == block.header.hash => {}
                _ => {
                    return Err(BlockchainError::InvalidBlock {
                        number,
                        hash: block.header.hash,
                    });
                }
            }
            if number + 1 <= self.fork_height {
                return Err(BlockchainError::CannotDeleteRemote {
                    number: number + 1,
                    fork_height: self.fork_height,
                });
            }
            match indexes.blocks_by_number.get(&(number + 1)) {
                Some(next) => next.header.hash,
                None => return Ok(()),
            }
        };

        self.delete_block(next_hash)
    }

    /// Gets the cumulative difficulty up to and including the given block.
    ///
    /// Falls back to a demand-load of the block when the difficulty is not
    /// cached yet; a hash that is unknown both locally and upstream is an
    /// error, not an absence.
    pub async fn get_total_difficulty(&self, hash: BlockHash) -> Result<U256, BlockchainError> {
        if let Some(td) = self.indexes.read().td_by_hash.get(&hash).copied() {
            return Ok(td);
        }

        // Ingestion populates the difficulty alongside the block itself.
        self.get_block_by_hash(hash).await?;

        self.indexes
            .read()
            .td_by_hash
            .get(&hash)
            .copied()
            .ok_or(BlockchainError::BlockNotFound(hash))
    }

    /// Gets a transaction by hash.
    ///
    /// Upstream transactions that are still pending, or that were mined
    /// beyond the fork height, are not part of this chain's view and come
    /// back absent. A transaction fetched this way is cached without a block
    /// binding: its containing block may not have been ingested.
    pub async fn get_transaction(
        &self,
        tx_hash: TxHash,
    ) -> Result<Option<Arc<Transaction>>, BlockchainError> {
        if let Some(tx) = self.indexes.read().tx_by_hash.get(&tx_hash) {
            return Ok(Some(Arc::clone(tx)));
        }

        let Some(tx) = self.client.get_transaction_by_hash(tx_hash).await? else {
            return Ok(None);
        };

        match tx.block_number {
            None => Ok(None),
            Some(number) if number > self.fork_height => Ok(None),
            Some(_) => {
                let mut indexes = self.indexes.write();
                let tx = Arc::clone(
                    indexes
                        .tx_by_hash
                        .entry(tx_hash)
                        .or_insert_with(|| Arc::new(tx)),
                );
                Ok(Some(tx))
            }
        }
    }

    /// Gets the block containing the given transaction.
    ///
    /// When the binding is not known yet, the transaction is resolved
    /// upstream and its containing block is ingested, which installs the
    /// binding for every transaction embedded in that block.
    pub async fn get_block_by_transaction_hash(
        &self,
        tx_hash: TxHash,
    ) -> Result<Option<Arc<ChainBlock>>, BlockchainError> {
        if let Some(block) = self.block_for_transaction(tx_hash) {
            return Ok(Some(block));
        }

        let Some(tx) = self.get_transaction(tx_hash).await? else {
            return Ok(None);
        };
        let Some(block_hash) = tx.block_hash else {
            return Ok(None);
        };

        self.get_block_by_hash(block_hash).await?;
        Ok(self.block_for_transaction(tx_hash))
    }

    /// Applies the ingestion rule to a block fetched from upstream.
    ///
    /// Upstream blocks beyond the fork height are not part of this chain's
    /// view; they come back absent and are not cached.
    fn ingest_remote_block(
        &self,
        block: ChainBlock,
    ) -> Result<Option<Arc<ChainBlock>>, BlockchainError> {
        if block.header.number > self.fork_height {
            return Ok(None);
        }

        let Some(total_difficulty) = block.header.total_difficulty else {
            return Err(UpstreamError::InconsistentResponse(format!(
                "block {} is missing totalDifficulty",
                block.header.hash
            ))
            .into());
        };

        let mut indexes = self.indexes.write();
        // Another lookup may have installed the same block while this
        // request was in flight.
        if let Some(existing) = indexes.blocks_by_hash.get(&block.header.hash) {
            return Ok(Some(Arc::clone(existing)));
        }

        debug!(
            "[Fork] caching remote block {} ({})",
            block.header.number, block.header.hash
        );
        Ok(Some(indexes.install(block, total_difficulty)))
    }

    /// Resolves a transaction hash to its containing block, local view only.
    fn block_for_transaction(&self, tx_hash: TxHash) -> Option<Arc<ChainBlock>> {
        let indexes = self.indexes.read();
        let block_hash = indexes.tx_to_block_hash.get(&tx_hash)?;
        indexes.blocks_by_hash.get(block_hash).map(Arc::clone)
    }
}
