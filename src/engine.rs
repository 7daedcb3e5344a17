//! Orchestrator for the explorer-backed sync flow:
//! 1) registrations mark the watch registry dirty,
//! 2) a background loop polls the remote service when dirty or on a timer,
//! 3) results are matched, deduplicated, and streamed to the wallet.
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bitcoin::{consensus, Block, OutPoint, Transaction, Txid};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::chain_source::{ChainSource, TxAndHeight};
use crate::deliver::Deliverer;
use crate::error::{Error, Result};
use crate::height::HeightTracker;
use crate::watch::{WatchRegistry, WatchSnapshot};

/// Idle sleep between poll cycles while the watch set is unchanged.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// The adapter: registers wallet interest, polls the remote indexer, and
/// streams wallet-relevant transactions plus chain-height updates.
///
/// `S` is the remote service boundary; [`HttpChainSource`] for production,
/// an in-memory stub in tests.
///
/// [`HttpChainSource`]: crate::http_source::HttpChainSource
pub struct ApiLink<S> {
    source: Arc<S>,
    registry: Arc<WatchRegistry>,
    poll_interval: Duration,
    cancel: CancellationToken,
    // Parked senders keep the interface-parity raw-block streams open; the
    // remote service cannot serve full blocks, so nothing ever writes them.
    raw_block_parks: Mutex<Vec<mpsc::Sender<Block>>>,
}

impl<S> ApiLink<S>
where
    S: ChainSource + 'static,
{
    /// Create an adapter over `source` with the default poll interval.
    pub fn new(source: S) -> Self {
        Self {
            source: Arc::new(source),
            registry: Arc::new(WatchRegistry::new()),
            poll_interval: DEFAULT_POLL_INTERVAL,
            cancel: CancellationToken::new(),
            raw_block_parks: Mutex::new(Vec::new()),
        }
    }

    /// Override the idle poll interval. Call before [`start`](Self::start).
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Begin polling from `start_height`. Returns the wallet-facing streams:
    /// transaction notifications and chain-height updates. Both are
    /// single-slot; a slow consumer throttles the poll loop rather than
    /// losing events.
    pub fn start(&self, start_height: i32) -> (mpsc::Receiver<TxAndHeight>, mpsc::Receiver<i32>) {
        let (tx_out, tx_rx) = mpsc::channel(1);
        let (height_out, height_rx) = mpsc::channel(1);
        let deliverer = Deliverer::new(tx_out);
        let tracker = HeightTracker::new(start_height, height_out);
        tokio::spawn(poll_loop(
            Arc::clone(&self.source),
            Arc::clone(&self.registry),
            self.poll_interval,
            self.cancel.clone(),
            deliverer,
            tracker,
        ));
        (tx_rx, height_rx)
    }

    /// Watch a 20-byte pubkey hash. Idempotent; triggers a poll soon after.
    pub fn register_address(&self, adr160: [u8; 20]) -> Result<()> {
        self.registry.register_address(adr160)
    }

    /// Watch a specific outpoint. Idempotent; triggers a poll soon after.
    pub fn register_outpoint(&self, op: OutPoint) -> Result<()> {
        self.registry.register_outpoint(op)
    }

    /// Consistent view of everything currently watched.
    pub fn watch_snapshot(&self) -> WatchSnapshot {
        self.registry.snapshot()
    }

    /// Serialize and submit a locally built transaction, surfacing the
    /// remote service's textual status. An empty transaction (no inputs, no
    /// outputs) is rejected without a network call. Broadcasts are never
    /// retried here; retry policy belongs to the wallet.
    pub async fn push_tx(&self, tx: &Transaction) -> Result<String> {
        if tx.input.is_empty() && tx.output.is_empty() {
            return Err(Error::InvalidInput(
                "refusing to broadcast an empty transaction".into(),
            ));
        }
        let raw = consensus::encode::serialize(tx);
        self.source.broadcast(&raw).await
    }

    /// Full raw blocks are not available from the remote service; this
    /// stream exists for interface parity with block-capable backends and
    /// never yields. It stays open for the adapter's lifetime.
    pub fn raw_blocks(&self) -> mpsc::Receiver<Block> {
        let (tx, rx) = mpsc::channel(1);
        self.raw_block_parks
            .lock()
            .expect("raw block lock poisoned")
            .push(tx);
        rx
    }

    /// Signal the poll loop to exit at its next safe point. The wallet
    /// streams close once the loop drops its senders. Idempotent.
    pub fn stop(&self) {
        self.cancel.cancel();
    }
}

/// One background task per adapter. A dirty registry polls immediately;
/// otherwise sleep one interval and poll anyway so confirmation heights keep
/// advancing while the watch set is unchanged. No error below ever stops the
/// loop; only cancellation (or a departed consumer) does.
async fn poll_loop<S: ChainSource>(
    source: Arc<S>,
    registry: Arc<WatchRegistry>,
    interval: Duration,
    cancel: CancellationToken,
    mut deliverer: Deliverer,
    mut tracker: HeightTracker,
) {
    info!("poll loop started");
    loop {
        if !registry.take_dirty() {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
            // Anything registered during the sleep is covered by the cycle
            // we are about to run.
            registry.take_dirty();
        }
        if cancel.is_cancelled() {
            break;
        }
        let snapshot = registry.snapshot();
        if snapshot.is_empty() {
            continue;
        }
        let alive = tokio::select! {
            _ = cancel.cancelled() => break,
            res = poll_once(source.as_ref(), &snapshot, &mut deliverer, &mut tracker) => {
                match res {
                    Ok(alive) => alive,
                    Err(e) => {
                        warn!(error = %e, "query cycle failed, retrying next tick");
                        true
                    }
                }
            }
        };
        if !alive {
            info!("consumer streams closed, stopping poll loop");
            break;
        }
    }
    info!("poll loop stopped");
}

/// One query cycle over a watch snapshot. Returns `Ok(false)` when a
/// consumer stream has been dropped.
async fn poll_once<S: ChainSource>(
    source: &S,
    snapshot: &WatchSnapshot,
    deliverer: &mut Deliverer,
    tracker: &mut HeightTracker,
) -> Result<bool> {
    let utxos = source.unspent(&snapshot.addresses).await?;

    // Wallet-relevant txids: creators of unspent outputs on watched
    // addresses, plus the funding txs of watched outpoints.
    let mut txids: BTreeSet<Txid> = utxos.iter().map(|u| u.txid).collect();
    txids.extend(snapshot.outpoints.iter().map(|op| op.txid));
    if txids.is_empty() {
        return Ok(true);
    }
    let txids: Vec<Txid> = txids.into_iter().collect();

    let records = source.transactions(&txids).await?;

    if let Some(best) = records.iter().filter_map(|r| r.height).max() {
        if !tracker.observe(best).await {
            return Ok(false);
        }
    }
    Ok(deliverer.deliver(records).await)
}
