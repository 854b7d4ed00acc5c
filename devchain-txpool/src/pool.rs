//! Per-sender transaction pool keyed on signer nonce.
//!
//! Incoming signed transactions are partitioned by sender into two sets: a
//! **pending** run of immediately executable transactions (contiguous nonces
//! starting at the sender's on-chain nonce) and a **queued** set of future
//! transactions whose nonce gap has not closed yet. Admitting a transaction
//! that fills the gap promotes the now-contiguous queued entries in one
//! step.
//!
//! The mining loop drains [`TransactionPool::pending_transactions`] to form
//! the next block; replacement and eviction policies live outside this pool.

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use alloy_consensus::Transaction as TransactionTrait;
use alloy_network_primitives::TransactionResponse;
use alloy_primitives::Address;
use alloy_rpc_types_eth::Transaction;
use parking_lot::RwLock;
use thiserror::Error;
use tracing::debug;

use crate::oracle::NonceOracle;

/// Errors produced by the transaction pool.
#[derive(Debug, Error)]
pub enum PoolError {
    /// The transaction's nonce is below the sender's on-chain nonce and can
    /// never become executable.
    #[error(
        "nonce too low for sender {sender}: transaction carries {nonce}, chain expects at least {chain_nonce}"
    )]
    NonceTooLow {
        /// The recovered signer of the rejected transaction.
        sender: Address,
        /// The nonce the rejected transaction carries.
        nonce: u64,
        /// The sender's current on-chain nonce.
        chain_nonce: u64,
    },
}

/// Pending and queued transactions for a single sender.
#[derive(Debug)]
struct SenderQueues {
    /// Contiguous run of executable transactions, nonce-ascending.
    pending: Vec<Arc<Transaction>>,
    /// Future transactions waiting for their nonce gap to close.
    queued: BTreeMap<u64, Arc<Transaction>>,
    /// The nonce that would extend the pending run next.
    executable_nonce: u64,
}

impl SenderQueues {
    fn new(base_nonce: u64) -> Self {
        Self {
            pending: Vec::new(),
            queued: BTreeMap::new(),
            executable_nonce: base_nonce,
        }
    }
}

/// Transaction mempool partitioned by sender.
///
/// Within a sender, pending transactions are nonce-ascending. Across
/// senders, [`pending_transactions`](Self::pending_transactions) concatenates
/// senders in ascending address order, which keeps the drain order
/// deterministic for the miner.
#[derive(Debug)]
pub struct TransactionPool<O> {
    /// Account-state oracle answering on-chain nonce reads.
    oracle: O,
    /// Per-sender pending/queued state.
    senders: RwLock<HashMap<Address, SenderQueues>>,
}

impl<O: NonceOracle> TransactionPool<O> {
    /// Creates an empty pool over the given nonce oracle.
    pub fn new(oracle: O) -> Self {
        Self {
            oracle,
            senders: RwLock::new(HashMap::new()),
        }
    }

    /// Admits a signed transaction into the pool.
    ///
    /// The sender is the recovered signer. A nonce below the sender's
    /// on-chain nonce is rejected outright; a nonce that extends the pending
    /// run is admitted as executable and promotes any queued transactions
    /// that become contiguous; everything else is parked in the queued set.
    pub fn add_transaction(&self, tx: Transaction) -> Result<(), PoolError> {
        let sender = tx.from();
        let nonce = tx.nonce();

        let chain_nonce = self.oracle.nonce(sender);
        if nonce < chain_nonce {
            return Err(PoolError::NonceTooLow {
                sender,
                nonce,
                chain_nonce,
            });
        }

        let mut senders = self.senders.write();
        let queues = senders
            .entry(sender)
            .or_insert_with(|| SenderQueues::new(chain_nonce));

        if nonce == queues.executable_nonce {
            queues.pending.push(Arc::new(tx));
            queues.executable_nonce += 1;

            // Promote queued transactions that have become contiguous.
            while let Some(tx) = queues.queued.remove(&queues.executable_nonce) {
                queues.pending.push(tx);
                queues.executable_nonce += 1;
            }

            debug!(
                "[TxPool] sender {sender} executable nonce advanced to {}",
                queues.executable_nonce
            );
        } else {
            debug!("[TxPool] queueing transaction with future nonce {nonce} for sender {sender}");
            queues.queued.insert(nonce, Arc::new(tx));
        }

        Ok(())
    }

    /// Returns every executable transaction.
    ///
    /// Nonce-ascending within a sender; senders in ascending address order.
    pub fn pending_transactions(&self) -> Vec<Arc<Transaction>> {
        let senders = self.senders.read();

        let mut addresses: Vec<Address> = senders.keys().copied().collect();
        addresses.sort_unstable();

        addresses
            .into_iter()
            .flat_map(|address| senders[&address].pending.iter().cloned())
            .collect()
    }

    /// Returns the next nonce with which `sender` can submit an immediately
    /// executable transaction.
    ///
    /// Falls back to the on-chain nonce for senders the pool has not seen.
    pub fn executable_nonce(&self, sender: Address) -> u64 {
        match self.senders.read().get(&sender) {
            Some(queues) => queues.executable_nonce,
            None => self.oracle.nonce(sender),
        }
    }

    /// Number of executable transactions across all senders.
    pub fn pending_len(&self) -> usize {
        self.senders.read().values().map(|q| q.pending.len()).sum()
    }

    /// Number of gapped future transactions across all senders.
    pub fn queued_len(&self) -> usize {
        self.senders.read().values().map(|q| q.queued.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use alloy_consensus::{Signed, TxEnvelope, TxLegacy, transaction::Recovered};
    use alloy_primitives::{Address, B256, Signature, TxKind, U256};

    use super::*;
    use crate::oracle::FixedNonces;

    fn sender(byte: u8) -> Address {
        Address::repeat_byte(byte)
    }

    /// Builds a signed transaction with a placeholder signature; the hash is
    /// derived from sender and nonce so fixtures stay distinct.
    fn tx(sender: Address, nonce: u64) -> Transaction {
        let inner = TxLegacy {
            chain_id: Some(1),
            nonce,
            gas_price: 1,
            gas_limit: 21_000,
            to: TxKind::Call(Address::ZERO),
            value: U256::ZERO,
            input: Default::default(),
        };
        let signature = Signature::new(U256::from(1), U256::from(1), false);

        let mut hash = B256::ZERO;
        hash.0[..20].copy_from_slice(sender.as_slice());
        hash.0[24..].copy_from_slice(&nonce.to_be_bytes());

        Transaction {
            inner: Recovered::new_unchecked(
                TxEnvelope::Legacy(Signed::new_unchecked(inner, signature, hash)),
                sender,
            ),
            block_hash: None,
            block_number: None,
            transaction_index: None,
            effective_gas_price: None,
        }
    }

    fn pool_with_nonce(address: Address, nonce: u64) -> TransactionPool<FixedNonces> {
        let mut oracle = FixedNonces::new();
        oracle.set(address, nonce);
        TransactionPool::new(oracle)
    }

    #[test]
    fn test_rejects_nonce_below_chain_nonce() {
        let a = sender(0xaa);
        let pool = pool_with_nonce(a, 3);

        let err = pool.add_transaction(tx(a, 2)).unwrap_err();
        assert!(matches!(
            err,
            PoolError::NonceTooLow {
                nonce: 2,
                chain_nonce: 3,
                ..
            }
        ));
        assert_eq!(pool.pending_len(), 0);
        assert_eq!(pool.queued_len(), 0);
    }

    #[test]
    fn test_gapped_nonce_is_queued_until_contiguous() {
        let a = sender(0xaa);
        let pool = pool_with_nonce(a, 0);

        pool.add_transaction(tx(a, 0)).unwrap();
        pool.add_transaction(tx(a, 4)).unwrap();

        assert_eq!(pool.executable_nonce(a), 1);
        assert_eq!(pool.pending_len(), 1);
        assert_eq!(pool.queued_len(), 1);

        pool.add_transaction(tx(a, 1)).unwrap();
        pool.add_transaction(tx(a, 2)).unwrap();
        pool.add_transaction(tx(a, 3)).unwrap();

        // Filling the gap promotes the queued nonce-4 transaction as well.
        assert_eq!(pool.executable_nonce(a), 5);
        assert_eq!(pool.pending_len(), 5);
        assert_eq!(pool.queued_len(), 0);

        let nonces: Vec<u64> = pool
            .pending_transactions()
            .iter()
            .map(|tx| tx.nonce())
            .collect();
        assert_eq!(nonces, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_promotion_stops_at_next_gap() {
        let a = sender(0xaa);
        let pool = pool_with_nonce(a, 0);

        pool.add_transaction(tx(a, 1)).unwrap();
        pool.add_transaction(tx(a, 3)).unwrap();
        pool.add_transaction(tx(a, 0)).unwrap();

        // Nonce 1 is promoted, nonce 3 still waits for nonce 2.
        assert_eq!(pool.executable_nonce(a), 2);
        assert_eq!(pool.pending_len(), 2);
        assert_eq!(pool.queued_len(), 1);
    }

    #[test]
    fn test_executable_nonce_falls_back_to_oracle() {
        let a = sender(0xaa);
        let b = sender(0xbb);
        let mut oracle = FixedNonces::new();
        oracle.set(a, 7);
        let pool = TransactionPool::new(oracle);

        assert_eq!(pool.executable_nonce(a), 7);
        assert_eq!(pool.executable_nonce(b), 0);
    }

    #[test]
    fn test_pending_order_is_deterministic_across_senders() {
        let a = sender(0x11);
        let b = sender(0x22);
        let mut oracle = FixedNonces::new();
        oracle.set(a, 0);
        oracle.set(b, 5);
        let pool = TransactionPool::new(oracle);

        // Admission order deliberately interleaves the two senders.
        pool.add_transaction(tx(b, 5)).unwrap();
        pool.add_transaction(tx(a, 0)).unwrap();
        pool.add_transaction(tx(b, 6)).unwrap();
        pool.add_transaction(tx(a, 1)).unwrap();

        let order: Vec<(Address, u64)> = pool
            .pending_transactions()
            .iter()
            .map(|tx| (tx.from(), tx.nonce()))
            .collect();
        assert_eq!(order, vec![(a, 0), (a, 1), (b, 5), (b, 6)]);
    }
}
