//! Abstraction over the remote indexing service (trait + record types).
use async_trait::async_trait;
use bitcoin::{PubkeyHash, Transaction, Txid};

use crate::error::Result;

/// One unspent output the service reports for a watched address.
#[derive(Debug, Clone)]
pub struct Unspent {
    /// Transaction that created the output.
    pub txid: Txid,
    /// Output index within that transaction.
    pub vout: u32,
    /// Output value in satoshis.
    pub value: i64,
}

/// Raw transaction bytes plus the confirmation height the service reports.
#[derive(Debug, Clone)]
pub struct TxRecord {
    /// Transaction id.
    pub txid: Txid,
    /// Consensus-serialized transaction bytes.
    pub raw: Vec<u8>,
    /// Confirmation height; `None` while unconfirmed or unknown to the
    /// service.
    pub height: Option<i32>,
}

/// The notification unit pushed to the wallet: a decoded transaction and the
/// height it was found confirmed at (0 while unconfirmed).
#[derive(Debug, Clone)]
pub struct TxAndHeight {
    /// The decoded transaction.
    pub tx: Transaction,
    /// Confirmation height, 0 while unconfirmed.
    pub height: i32,
}

/// Remote indexing service boundary. Implementations batch ids per call; the
/// adapter guarantees it never asks for an empty batch, and implementations
/// must short-circuit an empty input to an empty result regardless.
#[async_trait]
pub trait ChainSource: Send + Sync {
    /// Unspent outputs currently known for `addrs`, each carrying its owning
    /// txid. Empty input returns empty with no remote call.
    async fn unspent(&self, addrs: &[PubkeyHash]) -> Result<Vec<Unspent>>;

    /// Raw bytes and confirmation height for each of `txids`. The service
    /// reports height and hex through separate endpoints, and the two
    /// responses may disagree on membership: a txid with bytes but no height
    /// is returned with `height: None`, never treated as fatal.
    async fn transactions(&self, txids: &[Txid]) -> Result<Vec<TxRecord>>;

    /// Submit a consensus-serialized transaction. Returns the service's
    /// textual status on acceptance.
    async fn broadcast(&self, raw_tx: &[u8]) -> Result<String>;
}
