//! Account-state oracle consumed by the transaction pool.

use std::{collections::HashMap, sync::Arc};

use alloy_primitives::Address;

/// Source of on-chain account nonces.
///
/// The pool treats nonce reads as infallible; implementations resolve them
/// against whatever account state backs the node.
pub trait NonceOracle {
    /// Returns the on-chain nonce for `address`.
    fn nonce(&self, address: Address) -> u64;
}

impl<T: NonceOracle + ?Sized> NonceOracle for Arc<T> {
    fn nonce(&self, address: Address) -> u64 {
        (**self).nonce(address)
    }
}

impl<T: NonceOracle + ?Sized> NonceOracle for &T {
    fn nonce(&self, address: Address) -> u64 {
        (**self).nonce(address)
    }
}

/// Fixed nonce table.
///
/// Useful for tests and offline tooling; unknown addresses read as nonce 0.
#[derive(Debug, Default, Clone)]
pub struct FixedNonces {
    nonces: HashMap<Address, u64>,
}

impl FixedNonces {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the nonce reported for `address`.
    pub fn set(&mut self, address: Address, nonce: u64) {
        self.nonces.insert(address, nonce);
    }
}

impl NonceOracle for FixedNonces {
    fn nonce(&self, address: Address) -> u64 {
        self.nonces.get(&address).copied().unwrap_or_default()
    }
}
