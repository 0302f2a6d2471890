//! HTTP implementation of [`LedgerClient`].
//!
//! Account, bank, staking and tx queries go to the ledger's REST API
//! (`api_url`). The gas price comes from the JSON-RPC endpoint (`rpc_url`)
//! via `eth_gasPrice`.

use async_trait::async_trait;
use serde::de::{self, Deserializer};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;
use txbot_types::{Address, Amount, BroadcastOutcome, SignedTx, TxHash, TxResponse};

use crate::error::ClientError;
use crate::ledger::{AccountInfo, LedgerClient};

/// Default timeout for ledger requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default connection timeout.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

const BROADCAST_MODE: &str = "BROADCAST_MODE_SYNC";

/// Event attribute carrying the address of a freshly deployed contract.
const CONTRACT_ADDRESS_ATTRIBUTE: &str = "contract_address";

pub struct RestLedgerClient {
    http_client: reqwest::Client,
    api_url: String,
    rpc_url: String,
    denom: String,
}

/// `GET /cosmos/auth/v1beta1/accounts/{address}`.
///
/// Plain accounts report the fields at the top level; EVM accounts nest them
/// under `base_account`.
#[derive(Debug, Deserialize)]
struct AccountEnvelope {
    account: RawAccount,
}

#[derive(Debug, Deserialize)]
struct RawAccount {
    #[serde(default)]
    base_account: Option<RawBaseAccount>,
    #[serde(default, deserialize_with = "lenient_u64")]
    sequence: u64,
    #[serde(default, deserialize_with = "lenient_u64")]
    account_number: u64,
}

#[derive(Debug, Deserialize)]
struct RawBaseAccount {
    #[serde(default, deserialize_with = "lenient_u64")]
    sequence: u64,
    #[serde(default, deserialize_with = "lenient_u64")]
    account_number: u64,
}

#[derive(Debug, Deserialize)]
struct BalanceEnvelope {
    balance: RawCoin,
}

#[derive(Debug, Deserialize)]
struct RawCoin {
    amount: String,
}

#[derive(Debug, Deserialize)]
struct ValidatorsEnvelope {
    #[serde(default)]
    validators: Vec<RawValidator>,
}

#[derive(Debug, Deserialize)]
struct RawValidator {
    operator_address: String,
}

/// Either `{"tx_response": {...}}` or an error payload `{"code": n, "message": ".."}`.
#[derive(Debug, Deserialize)]
struct TxEnvelope {
    #[serde(default)]
    tx_response: Option<RawTxResponse>,
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawTxResponse {
    #[serde(default)]
    txhash: String,
    #[serde(default)]
    code: u32,
    #[serde(default)]
    raw_log: String,
    #[serde(default, deserialize_with = "lenient_u64")]
    height: u64,
    #[serde(default, deserialize_with = "lenient_u64")]
    gas_used: u64,
    #[serde(default)]
    events: Vec<RawEvent>,
}

#[derive(Debug, Deserialize)]
struct RawEvent {
    #[serde(default)]
    attributes: Vec<RawAttribute>,
}

#[derive(Debug, Deserialize)]
struct RawAttribute {
    key: String,
    #[serde(default)]
    value: String,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: Option<String>,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    message: String,
}

/// The REST API encodes 64-bit integers as strings; accept both forms.
fn lenient_u64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumOrString {
        Num(u64),
        Str(String),
    }
    match NumOrString::deserialize(deserializer)? {
        NumOrString::Num(n) => Ok(n),
        NumOrString::Str(s) if s.is_empty() => Ok(0),
        NumOrString::Str(s) => s.parse().map_err(de::Error::custom),
    }
}

impl RawTxResponse {
    fn into_response(self) -> TxResponse {
        let contract_address = self
            .events
            .iter()
            .flat_map(|e| e.attributes.iter())
            .find(|a| a.key == CONTRACT_ADDRESS_ATTRIBUTE)
            .and_then(|a| Address::parse(&a.value).ok());
        TxResponse {
            hash: TxHash::new(self.txhash),
            code: self.code,
            raw_log: self.raw_log,
            height: self.height,
            gas_used: self.gas_used,
            contract_address,
        }
    }
}

impl TxEnvelope {
    fn into_outcome(self) -> BroadcastOutcome {
        match self.tx_response {
            Some(raw) => BroadcastOutcome::Response(raw.into_response()),
            None => BroadcastOutcome::NoResponse {
                code: self.code,
                message: self
                    .message
                    .unwrap_or_else(|| "broadcast returned no tx_response".to_string()),
            },
        }
    }
}

/// Parse a `0x`-prefixed hex quantity as returned by JSON-RPC.
fn parse_hex_quantity(raw: &str) -> Result<Amount, ClientError> {
    let digits = raw.strip_prefix("0x").unwrap_or(raw);
    if digits.is_empty() {
        return Ok(Amount::ZERO);
    }
    u128::from_str_radix(digits, 16)
        .map(Amount::new)
        .map_err(|e| ClientError::InvalidResponse(format!("bad hex quantity {raw:?}: {e}")))
}

impl RestLedgerClient {
    pub fn new(
        api_url: impl Into<String>,
        rpc_url: impl Into<String>,
        denom: impl Into<String>,
    ) -> Self {
        Self::with_timeout(api_url, rpc_url, denom, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(
        api_url: impl Into<String>,
        rpc_url: impl Into<String>,
        denom: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            http_client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            rpc_url: rpc_url.into(),
            denom: denom.into(),
        }
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, path: &str) -> Result<T, ClientError> {
        let url = format!("{}{}", self.api_url, path);
        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(ClientError::from_transport)?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(ClientError::NotFound(path.to_string()));
        }
        if !response.status().is_success() {
            return Err(ClientError::RequestFailed(format!(
                "HTTP status {} for {path}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| ClientError::InvalidResponse(format!("failed to parse {path}: {e}")))
    }

    async fn post_tx(&self, tx: &SignedTx) -> Result<BroadcastOutcome, ClientError> {
        let url = format!("{}/cosmos/tx/v1beta1/txs", self.api_url);
        let body = serde_json::json!({ "tx": tx, "mode": BROADCAST_MODE });
        let response = self
            .http_client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(ClientError::from_transport)?;

        // Rejections arrive as non-2xx with an error payload; keep the payload.
        let status = response.status();
        let text = response.text().await.map_err(ClientError::from_transport)?;
        match serde_json::from_str::<TxEnvelope>(&text) {
            Ok(envelope) => Ok(envelope.into_outcome()),
            Err(_) => Ok(BroadcastOutcome::NoResponse {
                code: Some(i64::from(status.as_u16())),
                message: text,
            }),
        }
    }
}

#[async_trait]
impl LedgerClient for RestLedgerClient {
    async fn get_sequence(&self, address: &Address) -> Result<AccountInfo, ClientError> {
        let envelope: AccountEnvelope = self
            .get_json(&format!("/cosmos/auth/v1beta1/accounts/{address}"))
            .await?;
        let account = envelope.account;
        let info = match account.base_account {
            Some(base) => AccountInfo {
                sequence: base.sequence,
                account_number: base.account_number,
            },
            None => AccountInfo {
                sequence: account.sequence,
                account_number: account.account_number,
            },
        };
        debug!(%address, sequence = info.sequence, "fetched account sequence");
        Ok(info)
    }

    async fn get_balance(&self, address: &Address) -> Result<Amount, ClientError> {
        let envelope: BalanceEnvelope = self
            .get_json(&format!(
                "/cosmos/bank/v1beta1/balances/{address}/by_denom?denom={}",
                self.denom
            ))
            .await?;
        Amount::parse(&envelope.balance.amount)
            .map_err(|e| ClientError::InvalidResponse(format!("bad balance amount: {e}")))
    }

    async fn broadcast(&self, tx: &SignedTx) -> Result<BroadcastOutcome, ClientError> {
        self.post_tx(tx).await
    }

    async fn get_tx_by_hash(&self, hash: &TxHash) -> Result<Option<TxResponse>, ClientError> {
        match self
            .get_json::<TxEnvelope>(&format!("/cosmos/tx/v1beta1/txs/{hash}"))
            .await
        {
            Ok(envelope) => Ok(envelope.tx_response.map(RawTxResponse::into_response)),
            Err(ClientError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn deploy_contract(&self, tx: &SignedTx) -> Result<BroadcastOutcome, ClientError> {
        self.post_tx(tx).await
    }

    async fn get_validators(&self) -> Result<Vec<String>, ClientError> {
        let envelope: ValidatorsEnvelope = self
            .get_json("/cosmos/staking/v1beta1/validators")
            .await?;
        Ok(envelope
            .validators
            .into_iter()
            .map(|v| v.operator_address)
            .collect())
    }

    async fn gas_price(&self) -> Result<Amount, ClientError> {
        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "eth_gasPrice",
            "params": [],
        });
        let response = self
            .http_client
            .post(&self.rpc_url)
            .json(&body)
            .send()
            .await
            .map_err(ClientError::from_transport)?;
        if !response.status().is_success() {
            return Err(ClientError::RequestFailed(format!(
                "HTTP status {}",
                response.status()
            )));
        }
        let rpc: JsonRpcResponse = response
            .json()
            .await
            .map_err(|e| ClientError::InvalidResponse(format!("failed to parse eth_gasPrice: {e}")))?;
        match (rpc.result, rpc.error) {
            (Some(result), _) => parse_hex_quantity(&result),
            (None, Some(err)) => Err(ClientError::RequestFailed(err.message)),
            (None, None) => Err(ClientError::InvalidResponse(
                "eth_gasPrice returned neither result nor error".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_parses_both_layouts() {
        let plain = r#"{"account":{"sequence":"7","account_number":"3"}}"#;
        let env: AccountEnvelope = serde_json::from_str(plain).unwrap();
        assert!(env.account.base_account.is_none());
        assert_eq!(env.account.sequence, 7);
        assert_eq!(env.account.account_number, 3);

        let nested = r#"{"account":{"@type":"/ethermint.types.v1.EthAccount","base_account":{"sequence":"12","account_number":"9"},"code_hash":"0x"}}"#;
        let env: AccountEnvelope = serde_json::from_str(nested).unwrap();
        let base = env.account.base_account.unwrap();
        assert_eq!(base.sequence, 12);
        assert_eq!(base.account_number, 9);
    }

    #[test]
    fn tx_envelope_with_response() {
        let json = r#"{"tx_response":{"txhash":"AB12","code":32,"raw_log":"account sequence mismatch, expected 4, got 2","height":"0","gas_used":"0"}}"#;
        let env: TxEnvelope = serde_json::from_str(json).unwrap();
        match env.into_outcome() {
            BroadcastOutcome::Response(resp) => {
                assert_eq!(resp.hash.as_str(), "AB12");
                assert_eq!(resp.code, 32);
                assert_eq!(resp.height, 0);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn tx_envelope_error_payload_is_no_response() {
        let json = r#"{"code":2,"message":"tx parse error","details":[]}"#;
        let env: TxEnvelope = serde_json::from_str(json).unwrap();
        assert_eq!(
            env.into_outcome(),
            BroadcastOutcome::NoResponse {
                code: Some(2),
                message: "tx parse error".to_string()
            }
        );
    }

    #[test]
    fn contract_address_comes_from_events() {
        let json = r#"{"txhash":"FF","height":"10","events":[{"type":"deploy","attributes":[{"key":"contract_address","value":"0x00000000000000000000000000000000000000aa"}]}]}"#;
        let raw: RawTxResponse = serde_json::from_str(json).unwrap();
        let resp = raw.into_response();
        assert_eq!(
            resp.contract_address.as_ref().unwrap().as_str(),
            "0x00000000000000000000000000000000000000aa"
        );
        assert!(resp.is_included());
    }

    #[test]
    fn hex_quantities() {
        assert_eq!(parse_hex_quantity("0x64").unwrap(), Amount::new(100));
        assert_eq!(parse_hex_quantity("0x").unwrap(), Amount::ZERO);
        assert!(parse_hex_quantity("0xzz").is_err());
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_an_error() {
        let client = RestLedgerClient::with_timeout(
            "http://127.0.0.1:1",
            "http://127.0.0.1:1",
            "aevmos",
            Duration::from_millis(200),
        );
        let addr = Address::from_bytes([1u8; Address::BYTE_LEN]);
        assert!(client.get_balance(&addr).await.is_err());
    }
}
