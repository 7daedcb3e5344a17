//! Turns query results into wallet notifications: decode, dedupe, deliver.
use std::collections::HashMap;

use bitcoin::{consensus, Transaction, Txid};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::chain_source::{TxAndHeight, TxRecord};

/// Height recorded for transactions the service has not confirmed yet.
pub const UNCONFIRMED: i32 = 0;

/// Pushes wallet-relevant transactions onto the notification stream at most
/// once per observed height, remembering everything already delivered.
///
/// The stream has capacity 1 and delivery awaits a free slot: a slow wallet
/// consumer throttles the poll loop instead of losing notifications.
pub struct Deliverer {
    seen: HashMap<Txid, i32>,
    out: mpsc::Sender<TxAndHeight>,
}

impl Deliverer {
    pub fn new(out: mpsc::Sender<TxAndHeight>) -> Self {
        Self {
            seen: HashMap::new(),
            out,
        }
    }

    /// Deliver each record the wallet has not yet seen at its reported
    /// height. A txid delivered earlier is redelivered only when it gains a
    /// strictly greater height (e.g. it confirmed since the last cycle).
    /// A record whose bytes do not decode is skipped on its own; the rest of
    /// the batch proceeds. Returns `false` once the consumer is gone.
    pub async fn deliver(&mut self, records: Vec<TxRecord>) -> bool {
        for rec in records {
            let height = rec.height.unwrap_or(UNCONFIRMED);
            if let Some(&delivered) = self.seen.get(&rec.txid) {
                if delivered >= height {
                    continue;
                }
            }
            let tx: Transaction = match consensus::encode::deserialize(&rec.raw) {
                Ok(tx) => tx,
                Err(e) => {
                    warn!(txid = %rec.txid, error = %e, "skipping undecodable transaction");
                    continue;
                }
            };
            if self.out.send(TxAndHeight { tx, height }).await.is_err() {
                return false;
            }
            debug!(txid = %rec.txid, height, "notified wallet");
            self.seen.insert(rec.txid, height);
        }
        true
    }
}
