#![forbid(unsafe_code)]
#![deny(missing_docs)]
//! powless: chain sync for wallets that trust a block-explorer API.
//!
//! A couple of steps below a filter-based light client: no proof-of-work
//! checking, no peer-to-peer network. The adapter just asks a remote
//! indexing service whether money moved on the addresses and outpoints a
//! wallet registered, and streams the answers back.
//!
//! ## What you implement
//! - [`ChainSource`]: fetch unspent outputs for addresses, raw transactions
//!   with confirmation heights, and submit broadcasts. [`HttpChainSource`]
//!   is the ready-made implementation for smartbit-style JSON APIs.
//!
//! ## What the engine does
//! - Keeps a thread-safe **watch set** of addresses and outpoints; any
//!   registration marks it dirty and triggers an early poll.
//! - Polls the service, converts results into deduplicated
//!   [`TxAndHeight`] notifications, and pushes them onto a single-slot
//!   stream (a slow consumer throttles the poller, nothing is dropped).
//! - Streams monotone chain-height updates alongside.
//! - Broadcasts locally built transactions on demand.
//!
//! ## Minimal usage
//! ```rust,ignore
//! use powless::prelude::*;
//! use bitcoin::Network;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let source = HttpChainSource::new(
//!         "testnet-api.smartbit.com.au",
//!         "/v1/blockchain",
//!         Network::Testnet,
//!     );
//!     let link = ApiLink::new(source);
//!     let (mut txs, mut heights) = link.start(0);
//!
//!     link.register_address([0x1e; 20])?;
//!
//!     tokio::spawn(async move {
//!         while let Some(h) = heights.recv().await {
//!             println!("chain height {h}");
//!         }
//!     });
//!     while let Some(note) = txs.recv().await {
//!         println!("tx {} at height {}", note.tx.compute_txid(), note.height);
//!     }
//!     Ok(())
//! }
//! ```
/// Engine that schedules polls, runs query cycles, and streams results.
pub mod engine;

/// Remote indexing service boundary (trait and record types).
pub mod chain_source;

/// Reqwest-backed [`ChainSource`] for explorer-style JSON APIs.
pub mod http_source;

/// Error taxonomy and crate-wide `Result`.
pub mod error;

/// Tracked addresses/outpoints and the dirty flag driving the scheduler.
pub mod watch;

// Internal helpers:
mod deliver;
mod height;

// Public re-exports
pub use chain_source::{ChainSource, TxAndHeight, TxRecord, Unspent};
pub use engine::ApiLink;
pub use error::{Error, Result};
pub use http_source::HttpChainSource;
pub use watch::{WatchRegistry, WatchSnapshot};

/// Convenience prelude for end users.
pub mod prelude {
    pub use crate::{ApiLink, ChainSource, Error, HttpChainSource, TxAndHeight};
}
