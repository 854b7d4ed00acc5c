//! Snapshot and revert support for the forked chain.
//!
//! A snapshot records the chain tip at the moment it is taken. Reverting to
//! a snapshot drops every block mined after that tip and invalidates the
//! snapshot itself along with all later ones, so an id can be used at most
//! once. Blocks in the remote region are never affected: a snapshot taken at
//! the fork base reverts to an empty local suffix and no further.

use std::sync::Arc;

use alloy_primitives::{BlockHash, BlockNumber};
use parking_lot::RwLock;
use tracing::debug;

use crate::{blockchain::ForkedBlockchain, error::BlockchainError};

/// Identifier handed out for a taken snapshot.
pub type SnapshotId = u64;

/// A recorded chain tip.
#[derive(Debug, Clone, Copy)]
struct SnapshotEntry {
    id: SnapshotId,
    block_hash: BlockHash,
    block_number: BlockNumber,
}

/// Registry of chain-tip snapshots over a [`ForkedBlockchain`].
///
/// Entries are kept in id order; reverting truncates the registry at the
/// reverted entry, so the remaining ids always reference tips at or below
/// the current one.
#[derive(Debug)]
pub struct Snapshots {
    chain: Arc<ForkedBlockchain>,
    inner: RwLock<SnapshotState>,
}

#[derive(Debug, Default)]
struct SnapshotState {
    next_id: SnapshotId,
    entries: Vec<SnapshotEntry>,
}

impl Snapshots {
    /// Creates an empty registry over the given chain.
    pub fn new(chain: Arc<ForkedBlockchain>) -> Self {
        Self {
            chain,
            inner: RwLock::new(SnapshotState::default()),
        }
    }

    /// Records the current chain tip and returns the snapshot id.
    pub async fn take(&self) -> Result<SnapshotId, BlockchainError> {
        let tip = self.chain.get_latest_block().await?;

        let mut state = self.inner.write();
        let id = state.next_id;
        state.next_id += 1;
        state.entries.push(SnapshotEntry {
            id,
            block_hash: tip.header.hash,
            block_number: tip.header.number,
        });

        debug!(
            "[Snapshots] snapshot {id} at block {} ({})",
            tip.header.number, tip.header.hash
        );
        Ok(id)
    }

    /// Reverts the chain to the tip recorded under `id`.
    ///
    /// Drops every block above the recorded tip and discards the snapshot
    /// together with all snapshots taken after it. Returns `false` when the
    /// id is unknown or already consumed.
    pub async fn revert(&self, id: SnapshotId) -> Result<bool, BlockchainError> {
        let entry = {
            let state = self.inner.read();
            match state.entries.iter().find(|entry| entry.id == id) {
                Some(entry) => *entry,
                None => return Ok(false),
            }
        };

        let Some(block) = self.chain.get_block_by_hash(entry.block_hash).await? else {
            // The recorded tip fell out of the chain through a deeper revert
            // or reorg; the snapshot is no longer restorable.
            self.inner.write().entries.retain(|e| e.id < entry.id);
            return Ok(false);
        };
        self.chain.delete_following_blocks(&block)?;

        self.inner.write().entries.retain(|e| e.id < entry.id);
        debug!(
            "[Snapshots] reverted to snapshot {id}, tip is block {} again",
            entry.block_number
        );
        Ok(true)
    }

    /// Number of live snapshots.
    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    /// Whether the registry holds no live snapshots.
    pub fn is_empty(&self) -> bool {
        self.inner.read().entries.is_empty()
    }
}
