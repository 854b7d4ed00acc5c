//! Nonce-tracking transaction mempool for a local Ethereum development node.
//!
//! Holds signed transactions submitted to the node until the mining loop
//! drains them into a block. Transactions are partitioned per sender into an
//! executable (pending) run and a gapped (queued) set, validated against the
//! sender's on-chain nonce.
//!
//! ## Modules
//!
//! - [`pool`]: the per-sender transaction pool
//! - [`oracle`]: the account-state seam answering on-chain nonce reads

pub mod oracle;
pub mod pool;

pub use oracle::{FixedNonces, NonceOracle};
pub use pool::{PoolError, TransactionPool};
