use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bitcoin::hashes::Hash as _;
use bitcoin::{consensus, Amount, OutPoint, PubkeyHash, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Txid, Witness};
use powless::prelude::*;
use powless::{TxRecord, Unspent};
use tokio::time::{sleep, timeout};

const TICK: Duration = Duration::from_millis(10);
const WAIT: Duration = Duration::from_secs(2);

/// Source whose unspent endpoint can be made to fail, service-side.
#[derive(Clone, Default)]
struct FlakySource {
    state: Arc<Mutex<State>>,
}

#[derive(Default)]
struct State {
    utxos: Vec<Unspent>,
    records: Vec<TxRecord>,
    reject_unspent: bool,
}

#[async_trait]
impl ChainSource for FlakySource {
    async fn unspent(&self, _addrs: &[PubkeyHash]) -> powless::Result<Vec<Unspent>> {
        let st = self.state.lock().unwrap();
        if st.reject_unspent {
            return Err(Error::RemoteRejected(
                "unspent lookup reported success=false".into(),
            ));
        }
        Ok(st.utxos.clone())
    }
    async fn transactions(&self, txids: &[Txid]) -> powless::Result<Vec<TxRecord>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .records
            .iter()
            .filter(|r| txids.contains(&r.txid))
            .cloned()
            .collect())
    }
    async fn broadcast(&self, _raw_tx: &[u8]) -> powless::Result<String> {
        Ok("ok".into())
    }
}

fn make_tx(tag: u8) -> Transaction {
    Transaction {
        version: bitcoin::transaction::Version::TWO,
        lock_time: bitcoin::absolute::LockTime::ZERO,
        input: vec![TxIn {
            previous_output: OutPoint {
                txid: Txid::from_byte_array([tag; 32]),
                vout: 0,
            },
            script_sig: ScriptBuf::new(),
            sequence: Sequence::MAX,
            witness: Witness::new(),
        }],
        output: vec![TxOut {
            value: Amount::from_sat(25_000),
            script_pubkey: ScriptBuf::new(),
        }],
    }
}

fn record_for(tx: &Transaction, height: Option<i32>) -> TxRecord {
    TxRecord {
        txid: tx.compute_txid(),
        raw: consensus::encode::serialize(tx),
        height,
    }
}

fn utxo_for(tx: &Transaction) -> Unspent {
    Unspent {
        txid: tx.compute_txid(),
        vout: 0,
        value: 25_000,
    }
}

#[tokio::test]
async fn rejected_cycle_produces_nothing_and_loop_survives() -> anyhow::Result<()> {
    let source = FlakySource::default();
    source.state.lock().unwrap().reject_unspent = true;

    let link = ApiLink::new(source.clone()).with_poll_interval(TICK);
    let (mut txs, mut heights) = link.start(0);
    link.register_address([4u8; 20])?;

    // Cycles keep failing; no notifications leak out.
    sleep(TICK * 10).await;
    assert!(txs.try_recv().is_err());
    assert!(heights.try_recv().is_err());

    // Service recovers; the loop is still alive and delivers.
    let tx = make_tx(4);
    {
        let mut st = source.state.lock().unwrap();
        st.reject_unspent = false;
        st.utxos = vec![utxo_for(&tx)];
        st.records = vec![record_for(&tx, Some(42))];
    }
    let note = timeout(WAIT, txs.recv()).await?.expect("delivered after recovery");
    assert_eq!(note.height, 42);

    link.stop();
    Ok(())
}

#[tokio::test]
async fn malformed_record_is_skipped_rest_of_batch_delivered() -> anyhow::Result<()> {
    let source = FlakySource::default();
    let good = make_tx(5);
    let bad_txid = Txid::from_byte_array([6u8; 32]);
    {
        let mut st = source.state.lock().unwrap();
        st.utxos = vec![
            utxo_for(&good),
            Unspent {
                txid: bad_txid,
                vout: 0,
                value: 1,
            },
        ];
        st.records = vec![
            record_for(&good, Some(100)),
            TxRecord {
                txid: bad_txid,
                raw: vec![0xde, 0xad],
                height: Some(100),
            },
        ];
    }

    let link = ApiLink::new(source.clone()).with_poll_interval(TICK);
    let (mut txs, _heights) = link.start(0);
    link.register_address([5u8; 20])?;

    let note = timeout(WAIT, txs.recv()).await?.expect("good record delivered");
    assert_eq!(note.tx.compute_txid(), good.compute_txid());

    // The malformed one never shows up, and nothing else is delivered twice.
    sleep(TICK * 10).await;
    assert!(txs.try_recv().is_err());

    link.stop();
    Ok(())
}
