//! Reqwest-backed [`ChainSource`] for explorer-style JSON APIs
//! (smartbit-compatible paths: `/address/{csv}/unspent`, `/tx/{csv}`,
//! `/tx/{csv}/hex`, `/pushtx`).
use std::collections::HashMap;
use std::str::FromStr;

use async_trait::async_trait;
use bitcoin::{Address, Network, PubkeyHash, Txid};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::chain_source::{ChainSource, TxRecord, Unspent};
use crate::error::{Error, Result};

// Wire records, one validated type per endpoint. A `success: false` field is
// an application-level failure for the whole call, independent of the HTTP
// status.

#[derive(Debug, Deserialize)]
struct UnspentResponse {
    success: bool,
    #[serde(default)]
    unspent: Vec<UnspentEntry>,
}

#[derive(Debug, Deserialize)]
struct UnspentEntry {
    txid: String,
    n: u32,
    value_int: i64,
}

#[derive(Debug, Deserialize)]
struct TxLookupResponse {
    success: bool,
    #[serde(default)]
    transaction: Vec<TxLookupEntry>,
}

#[derive(Debug, Deserialize)]
struct TxLookupEntry {
    txid: String,
    block: Option<i32>,
}

#[derive(Debug, Deserialize)]
struct TxHexResponse {
    success: bool,
    #[serde(default)]
    hex: Vec<TxHexEntry>,
}

#[derive(Debug, Deserialize)]
struct TxHexEntry {
    txid: String,
    hex: String,
}

#[derive(Debug, Deserialize)]
struct PushTxAck {
    success: bool,
}

/// [`ChainSource`] over a remote indexing HTTP API.
///
/// The service's calling convention batches ids as one comma-separated path
/// segment to keep round trips down; building a batch from an empty set
/// would produce a malformed URL, so every fetch short-circuits on empty
/// input before any network activity.
pub struct HttpChainSource {
    http: reqwest::Client,
    base: String,
    network: Network,
}

impl HttpChainSource {
    /// `host` and `path` name the service root, e.g.
    /// (`"testnet-api.smartbit.com.au"`, `"/v1/blockchain"`). `network`
    /// selects the base58 version bytes for address display.
    pub fn new(host: &str, path: &str, network: Network) -> Self {
        let base = format!(
            "https://{}/{}",
            host.trim_end_matches('/'),
            path.trim_matches('/')
        );
        Self {
            http: reqwest::Client::new(),
            base,
            network,
        }
    }

    fn address_csv(&self, addrs: &[PubkeyHash]) -> String {
        addrs
            .iter()
            .map(|pkh| Address::p2pkh(*pkh, self.network).to_string())
            .collect::<Vec<_>>()
            .join(",")
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        debug!(url, "GET");
        let resp = self.http.get(url).send().await.map_err(transport_err)?;
        resp.json::<T>()
            .await
            .map_err(|e| Error::Decode(e.to_string()))
    }
}

fn transport_err(e: reqwest::Error) -> Error {
    Error::RemoteUnavailable(e.to_string())
}

fn txid_csv(txids: &[Txid]) -> String {
    txids
        .iter()
        .map(Txid::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

#[async_trait]
impl ChainSource for HttpChainSource {
    async fn unspent(&self, addrs: &[PubkeyHash]) -> Result<Vec<Unspent>> {
        if addrs.is_empty() {
            return Ok(Vec::new());
        }
        let url = format!("{}/address/{}/unspent", self.base, self.address_csv(addrs));
        let resp: UnspentResponse = self.get_json(&url).await?;
        if !resp.success {
            return Err(Error::RemoteRejected(
                "unspent lookup reported success=false".into(),
            ));
        }
        let mut out = Vec::with_capacity(resp.unspent.len());
        for entry in resp.unspent {
            match Txid::from_str(&entry.txid) {
                Ok(txid) => out.push(Unspent {
                    txid,
                    vout: entry.n,
                    value: entry.value_int,
                }),
                Err(e) => {
                    warn!(txid = %entry.txid, error = %e, "skipping unspent entry with malformed txid")
                }
            }
        }
        Ok(out)
    }

    async fn transactions(&self, txids: &[Txid]) -> Result<Vec<TxRecord>> {
        if txids.is_empty() {
            return Ok(Vec::new());
        }
        let ids = txid_csv(txids);

        // The service does not return height and hex together; two calls,
        // whose responses may disagree on membership. A txid missing from
        // the height response just has no height yet.
        let url = format!("{}/tx/{}", self.base, ids);
        let lookup: TxLookupResponse = self.get_json(&url).await?;
        if !lookup.success {
            return Err(Error::RemoteRejected(
                "tx lookup reported success=false".into(),
            ));
        }

        let mut heights: HashMap<Txid, i32> = HashMap::new();
        for entry in lookup.transaction {
            if let (Ok(txid), Some(block)) = (Txid::from_str(&entry.txid), entry.block) {
                if block > 0 {
                    heights.insert(txid, block);
                }
            }
        }

        let url = format!("{}/tx/{}/hex", self.base, ids);
        let hexes: TxHexResponse = self.get_json(&url).await?;
        if !hexes.success {
            return Err(Error::RemoteRejected(
                "tx hex lookup reported success=false".into(),
            ));
        }

        let mut out = Vec::with_capacity(hexes.hex.len());
        for entry in hexes.hex {
            let txid = match Txid::from_str(&entry.txid) {
                Ok(txid) => txid,
                Err(e) => {
                    warn!(txid = %entry.txid, error = %e, "skipping hex entry with malformed txid");
                    continue;
                }
            };
            let raw = match hex::decode(&entry.hex) {
                Ok(raw) => raw,
                Err(e) => {
                    warn!(txid = %txid, error = %e, "skipping malformed tx hex");
                    continue;
                }
            };
            out.push(TxRecord {
                txid,
                raw,
                height: heights.get(&txid).copied(),
            });
        }
        Ok(out)
    }

    async fn broadcast(&self, raw_tx: &[u8]) -> Result<String> {
        let url = format!("{}/pushtx", self.base);
        let body = serde_json::json!({ "hex": hex::encode(raw_tx) });
        debug!(url, "POST");
        let resp = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(transport_err)?;
        let status = resp.status();
        let text = resp.text().await.map_err(transport_err)?;
        if !status.is_success() {
            return Err(Error::RemoteRejected(format!("pushtx HTTP {status}: {text}")));
        }
        // Body shape is service-defined; an explicit success=false inside it
        // is still a rejection.
        if let Ok(ack) = serde_json::from_str::<PushTxAck>(&text) {
            if !ack.success {
                return Err(Error::RemoteRejected(text));
            }
        }
        Ok(text)
    }
}
