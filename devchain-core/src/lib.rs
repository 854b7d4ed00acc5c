//! Forking blockchain core for a local Ethereum development node.
//!
//! This library provides the in-memory chain view of a dev node that forks
//! off a remote mainnet-compatible chain: blocks at or below the fork height
//! are demand-loaded from an upstream archive node, blocks above it are
//! mined locally and live only in process memory.
//!
//! ## Key Components
//!
//! - **ForkedBlockchain**: hybrid block store over the remote region and the
//!   local suffix, with consistent by-number / by-hash / by-transaction /
//!   cumulative-difficulty indexes (in `blockchain` module)
//! - **RpcClient**: typed adapter over the upstream JSON-RPC endpoint (in
//!   `rpc_client` module)
//! - **ForkConfig**: upstream endpoint and fork point settings (in `config`
//!   module)
//!
//! ## Modules
//!
//! - [`blockchain`]: the forked block store and its reorg handling
//! - [`rpc_client`]: upstream block and transaction fetching
//! - [`snapshots`]: chain-tip snapshots and revert on top of the store
//! - [`config`]: fork settings
//! - [`error`]: typed errors for the store and the upstream adapter
//!
//! The surrounding node wires this core to its RPC server and miner: RPC
//! handlers read and append through [`ForkedBlockchain`], which in turn
//! reaches upstream through [`RpcClient`] on cache misses.

pub mod blockchain;
pub mod config;
pub mod error;
pub mod rpc_client;
pub mod snapshots;

pub use blockchain::{ChainBlock, ForkedBlockchain};
pub use config::ForkConfig;
pub use error::{BlockchainError, UpstreamError};
pub use rpc_client::RpcClient;
pub use snapshots::{SnapshotId, Snapshots};
