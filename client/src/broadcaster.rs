//! Broadcast with bounded retry, re-query, and inclusion waiting.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use txbot_types::{BroadcastOutcome, SignedTx, TxHash, TxResponse};

use crate::error::ClientError;
use crate::ledger::LedgerClient;

/// Retry and polling knobs for [`TxBroadcaster`].
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    /// Broadcast attempts before giving up on getting a hash back.
    pub retries: u32,
    /// Pause between broadcast attempts that returned no hash.
    pub retry_delay: Duration,
    /// Pause before re-querying a hashed-but-failed response.
    pub requery_delay: Duration,
    /// Polls of `get_tx_by_hash` while waiting for inclusion.
    pub confirmation_attempts: u32,
    /// Pause between inclusion polls.
    pub confirmation_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 5,
            retry_delay: Duration::from_millis(2000),
            requery_delay: Duration::from_millis(2000),
            confirmation_attempts: 30,
            confirmation_delay: Duration::from_millis(1000),
        }
    }
}

/// Submits signed transactions through a [`LedgerClient`].
#[derive(Clone)]
pub struct TxBroadcaster {
    client: Arc<dyn LedgerClient>,
    policy: RetryPolicy,
}

impl TxBroadcaster {
    pub fn new(client: Arc<dyn LedgerClient>, policy: RetryPolicy) -> Self {
        Self { client, policy }
    }

    pub fn client(&self) -> &Arc<dyn LedgerClient> {
        &self.client
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Broadcast `tx`, retrying while the ledger returns no recognisable hash.
    ///
    /// Once a hash is seen the loop stops. A hashed response with a failure
    /// code but no diagnostic is re-queried once after `requery_delay`, since
    /// the query layer may lag the broadcast. Transport errors never escape;
    /// they become [`BroadcastOutcome::NoResponse`]. Always returns the last
    /// outcome observed.
    pub async fn broadcast_with_retry(&self, tx: &SignedTx) -> BroadcastOutcome {
        let attempts = self.policy.retries.max(1);
        let mut last = BroadcastOutcome::NoResponse {
            code: None,
            message: "no broadcast attempted".to_string(),
        };

        for attempt in 1..=attempts {
            let outcome = match self.client.broadcast(tx).await {
                Ok(outcome) => outcome,
                Err(e) => BroadcastOutcome::NoResponse {
                    code: None,
                    message: e.to_string(),
                },
            };

            if let BroadcastOutcome::Response(resp) = &outcome {
                if !resp.hash.is_empty() {
                    if !resp.is_success() && resp.raw_log.trim().is_empty() {
                        return self.requery(resp).await;
                    }
                    return outcome;
                }
            }

            debug!(attempt, attempts, ?outcome, "broadcast returned no hash");
            last = outcome;
            if attempt < attempts {
                tokio::time::sleep(self.policy.retry_delay).await;
            }
        }

        warn!(attempts, "broadcast gave up without a transaction hash");
        last
    }

    /// Single-attempt contract deployment; callers own the retry loop.
    pub async fn deploy(&self, tx: &SignedTx) -> BroadcastOutcome {
        match self.client.deploy_contract(tx).await {
            Ok(outcome) => outcome,
            Err(e) => BroadcastOutcome::NoResponse {
                code: None,
                message: e.to_string(),
            },
        }
    }

    /// Poll until `hash` is included in a block, bounded by
    /// `confirmation_attempts`.
    pub async fn wait_for_inclusion(&self, hash: &TxHash) -> Result<TxResponse, ClientError> {
        let attempts = self.policy.confirmation_attempts.max(1);
        for attempt in 1..=attempts {
            match self.client.get_tx_by_hash(hash).await {
                Ok(Some(resp)) if resp.is_included() => return Ok(resp),
                Ok(_) => debug!(%hash, attempt, "transaction not yet included"),
                Err(e) => debug!(%hash, attempt, error = %e, "inclusion query failed"),
            }
            if attempt < attempts {
                tokio::time::sleep(self.policy.confirmation_delay).await;
            }
        }
        Err(ClientError::NotIncluded {
            hash: hash.to_string(),
            attempts,
        })
    }

    async fn requery(&self, resp: &TxResponse) -> BroadcastOutcome {
        tokio::time::sleep(self.policy.requery_delay).await;
        match self.client.get_tx_by_hash(&resp.hash).await {
            Ok(Some(fresh)) => BroadcastOutcome::Response(fresh),
            Ok(None) => BroadcastOutcome::Response(resp.clone()),
            Err(e) => {
                debug!(hash = %resp.hash, error = %e, "re-query after failed broadcast failed");
                BroadcastOutcome::Response(resp.clone())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::AccountInfo;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use txbot_types::{Address, Amount, Fee, PublicKey, Signature, TxBody};

    /// Replays a fixed script of broadcast results.
    struct Scripted {
        broadcasts: Mutex<VecDeque<Result<BroadcastOutcome, ClientError>>>,
        lookups: Mutex<VecDeque<Option<TxResponse>>>,
        broadcast_calls: AtomicU32,
        lookup_calls: AtomicU32,
    }

    impl Scripted {
        fn new(
            broadcasts: Vec<Result<BroadcastOutcome, ClientError>>,
            lookups: Vec<Option<TxResponse>>,
        ) -> Arc<Self> {
            Arc::new(Self {
                broadcasts: Mutex::new(broadcasts.into()),
                lookups: Mutex::new(lookups.into()),
                broadcast_calls: AtomicU32::new(0),
                lookup_calls: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl LedgerClient for Scripted {
        async fn get_sequence(&self, _: &Address) -> Result<AccountInfo, ClientError> {
            Ok(AccountInfo {
                sequence: 0,
                account_number: 0,
            })
        }
        async fn get_balance(&self, _: &Address) -> Result<Amount, ClientError> {
            Ok(Amount::ZERO)
        }
        async fn broadcast(&self, _: &SignedTx) -> Result<BroadcastOutcome, ClientError> {
            self.broadcast_calls.fetch_add(1, Ordering::SeqCst);
            self.broadcasts
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ClientError::Other("script exhausted".into())))
        }
        async fn get_tx_by_hash(&self, _: &TxHash) -> Result<Option<TxResponse>, ClientError> {
            self.lookup_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.lookups.lock().unwrap().pop_front().flatten())
        }
        async fn deploy_contract(&self, tx: &SignedTx) -> Result<BroadcastOutcome, ClientError> {
            self.broadcast(tx).await
        }
        async fn get_validators(&self) -> Result<Vec<String>, ClientError> {
            Ok(Vec::new())
        }
        async fn gas_price(&self) -> Result<Amount, ClientError> {
            Ok(Amount::ZERO)
        }
    }

    fn fast_policy(retries: u32) -> RetryPolicy {
        RetryPolicy {
            retries,
            retry_delay: Duration::from_millis(1),
            requery_delay: Duration::from_millis(1),
            confirmation_attempts: 3,
            confirmation_delay: Duration::from_millis(1),
        }
    }

    fn dummy_tx() -> SignedTx {
        SignedTx {
            body: TxBody {
                chain_id: 9000,
                cosmos_chain_id: "evmos_9000-1".into(),
                signer: Address::from_bytes([1; 20]),
                account_number: 0,
                sequence: 0,
                fee: Fee::new(Amount::new(1), "aevmos", 200_000),
                memo: String::new(),
                messages: Vec::new(),
            },
            public_key: PublicKey([0; 32]),
            signature: Signature([0; 64]),
        }
    }

    fn response(hash: &str, code: u32, log: &str, height: u64) -> TxResponse {
        TxResponse {
            hash: TxHash::new(hash),
            code,
            raw_log: log.to_string(),
            height,
            gas_used: 0,
            contract_address: None,
        }
    }

    #[tokio::test]
    async fn retries_until_a_hash_appears() {
        let ledger = Scripted::new(
            vec![
                Err(ClientError::Unreachable("down".into())),
                Ok(BroadcastOutcome::NoResponse {
                    code: Some(503),
                    message: "busy".into(),
                }),
                Ok(BroadcastOutcome::Response(response("AA", 0, "", 0))),
            ],
            vec![],
        );
        let broadcaster = TxBroadcaster::new(ledger.clone(), fast_policy(5));
        let outcome = broadcaster.broadcast_with_retry(&dummy_tx()).await;
        assert!(outcome.is_success());
        assert_eq!(ledger.broadcast_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_retry_budget() {
        let ledger = Scripted::new(vec![], vec![]);
        let broadcaster = TxBroadcaster::new(ledger.clone(), fast_policy(3));
        let outcome = broadcaster.broadcast_with_retry(&dummy_tx()).await;
        assert!(outcome.hash().is_none());
        assert!(matches!(outcome, BroadcastOutcome::NoResponse { code: None, .. }));
        assert_eq!(ledger.broadcast_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn failed_response_with_log_is_returned_without_requery() {
        let ledger = Scripted::new(
            vec![Ok(BroadcastOutcome::Response(response(
                "BB",
                32,
                "account sequence mismatch, expected 4, got 2",
                0,
            )))],
            vec![],
        );
        let broadcaster = TxBroadcaster::new(ledger.clone(), fast_policy(5));
        let outcome = broadcaster.broadcast_with_retry(&dummy_tx()).await;
        assert_eq!(ledger.broadcast_calls.load(Ordering::SeqCst), 1);
        assert_eq!(ledger.lookup_calls.load(Ordering::SeqCst), 0);
        match outcome {
            BroadcastOutcome::Response(resp) => assert_eq!(resp.code, 32),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn silent_failure_is_requeried_by_hash() {
        let ledger = Scripted::new(
            vec![Ok(BroadcastOutcome::Response(response("CC", 1, "", 0)))],
            vec![Some(response("CC", 0, "", 12))],
        );
        let broadcaster = TxBroadcaster::new(ledger.clone(), fast_policy(5));
        let outcome = broadcaster.broadcast_with_retry(&dummy_tx()).await;
        assert_eq!(ledger.lookup_calls.load(Ordering::SeqCst), 1);
        assert!(outcome.is_success());
    }

    #[tokio::test]
    async fn inclusion_wait_is_bounded() {
        let ledger = Scripted::new(
            vec![],
            vec![None, Some(response("DD", 0, "", 0)), Some(response("DD", 0, "", 7))],
        );
        let broadcaster = TxBroadcaster::new(ledger.clone(), fast_policy(1));
        let included = broadcaster
            .wait_for_inclusion(&TxHash::new("DD"))
            .await
            .unwrap();
        assert_eq!(included.height, 7);

        let never = Scripted::new(vec![], vec![]);
        let broadcaster = TxBroadcaster::new(never.clone(), fast_policy(1));
        let err = broadcaster
            .wait_for_inclusion(&TxHash::new("EE"))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::NotIncluded { attempts: 3, .. }));
        assert_eq!(never.lookup_calls.load(Ordering::SeqCst), 3);
    }
}
