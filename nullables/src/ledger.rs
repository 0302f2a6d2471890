//! Nullable ledger: an in-memory ledger with real admission rules.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use txbot_client::{AccountInfo, ClientError, LedgerClient};
use txbot_types::{
    Address, Amount, BroadcastOutcome, Message, SignedTx, TxHash, TxResponse,
};
use txbot_utils::CallCounter;

/// Ledger code for a signer that does not exist yet.
pub const CODE_UNKNOWN_ADDRESS: u32 = 9;
/// Ledger code for a bad signature.
pub const CODE_UNAUTHORIZED: u32 = 4;
/// Ledger code for a message that failed during execution.
pub const CODE_EXECUTION_FAILED: u32 = 1;
/// Ledger code reported for a contract creation that ran out of gas.
pub const CODE_OUT_OF_GAS: u32 = 11;

const CALL_NAMES: &[&str] = &[
    "get_sequence",
    "get_balance",
    "broadcast",
    "get_tx_by_hash",
    "deploy_contract",
    "get_validators",
    "gas_price",
];

/// One on-ledger account.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NullAccount {
    pub balance: Amount,
    pub sequence: u64,
    pub account_number: u64,
}

/// A canned result for the next broadcast, bypassing ledger rules.
#[derive(Clone, Debug)]
pub enum ScriptedBroadcast {
    Outcome(BroadcastOutcome),
    TransportError(String),
}

#[derive(Clone, Default)]
struct World {
    accounts: HashMap<Address, NullAccount>,
    token_balances: HashMap<(Address, Address), Amount>,
    delegations: HashMap<String, Amount>,
    contracts: HashMap<Address, String>,
    gas_consumed: u64,
}

#[derive(Default)]
struct LedgerState {
    world: World,
    next_account_number: u64,
    next_contract: u64,
    height: u64,
    txs: HashMap<TxHash, TxResponse>,
    committed: Vec<Message>,
    validators: Vec<String>,
    scripted: VecDeque<ScriptedBroadcast>,
    failing_deploys: u32,
    offline: bool,
    min_fee: Amount,
    min_gas_price: Amount,
    latency: Option<Duration>,
}

/// In-memory ledger implementing [`LedgerClient`].
///
/// Admission follows the real ledger: a transaction is rejected without side
/// effects when its signature is bad, its sequence is stale, its fee is too
/// low, or its signer cannot cover value plus fee. Admitted transactions bump
/// the signer's sequence and pay the fee even when a message then fails.
pub struct NullLedger {
    state: Mutex<LedgerState>,
    calls: CallCounter,
}

impl NullLedger {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LedgerState::default()),
            calls: CallCounter::new(CALL_NAMES),
        }
    }

    /// Credit `amount` to `address`, creating the account if needed.
    pub fn fund(&self, address: &Address, amount: Amount) {
        let mut state = self.state.lock().unwrap();
        let number = state.next_account_number;
        let account = state
            .world
            .accounts
            .entry(address.clone())
            .or_insert_with(|| NullAccount {
                account_number: number,
                ..NullAccount::default()
            });
        account.balance = account.balance.saturating_add(amount);
        if account.account_number == number {
            state.next_account_number += 1;
        }
    }

    pub fn set_balance(&self, address: &Address, amount: Amount) {
        self.fund(address, Amount::ZERO);
        let mut state = self.state.lock().unwrap();
        if let Some(account) = state.world.accounts.get_mut(address) {
            account.balance = amount;
        }
    }

    /// Force an account's sequence, as if another client had used the key.
    pub fn set_sequence(&self, address: &Address, sequence: u64) {
        self.fund(address, Amount::ZERO);
        let mut state = self.state.lock().unwrap();
        if let Some(account) = state.world.accounts.get_mut(address) {
            account.sequence = sequence;
        }
    }

    pub fn account(&self, address: &Address) -> Option<NullAccount> {
        self.state.lock().unwrap().world.accounts.get(address).cloned()
    }

    pub fn balance_of(&self, address: &Address) -> Amount {
        self.account(address).map(|a| a.balance).unwrap_or(Amount::ZERO)
    }

    pub fn sequence_of(&self, address: &Address) -> u64 {
        self.account(address).map(|a| a.sequence).unwrap_or(0)
    }

    pub fn token_balance(&self, contract: &Address, holder: &Address) -> Amount {
        self.state
            .lock()
            .unwrap()
            .world
            .token_balances
            .get(&(contract.clone(), holder.clone()))
            .copied()
            .unwrap_or(Amount::ZERO)
    }

    pub fn delegated_to(&self, validator: &str) -> Amount {
        self.state
            .lock()
            .unwrap()
            .world
            .delegations
            .get(validator)
            .copied()
            .unwrap_or(Amount::ZERO)
    }

    pub fn gas_consumed(&self) -> u64 {
        self.state.lock().unwrap().world.gas_consumed
    }

    /// Names of deployed contracts.
    pub fn contracts(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .world
            .contracts
            .values()
            .cloned()
            .collect()
    }

    /// Every message committed so far, in commit order.
    pub fn committed_messages(&self) -> Vec<Message> {
        self.state.lock().unwrap().committed.clone()
    }

    pub fn set_validators(&self, validators: Vec<String>) {
        self.state.lock().unwrap().validators = validators;
    }

    /// Make the next `n` contract deployments fail.
    pub fn fail_next_deploys(&self, n: u32) {
        self.state.lock().unwrap().failing_deploys = n;
    }

    /// Queue a canned result for a future broadcast.
    pub fn push_broadcast(&self, scripted: ScriptedBroadcast) {
        self.state.lock().unwrap().scripted.push_back(scripted);
    }

    /// Make a hash known to `get_tx_by_hash`.
    pub fn record_tx(&self, response: TxResponse) {
        self.state
            .lock()
            .unwrap()
            .txs
            .insert(response.hash.clone(), response);
    }

    /// While offline every call fails with [`ClientError::Unreachable`].
    pub fn set_offline(&self, offline: bool) {
        self.state.lock().unwrap().offline = offline;
    }

    pub fn set_min_fee(&self, fee: Amount) {
        self.state.lock().unwrap().min_fee = fee;
    }

    /// Minimum gas price for raw transfers; also what `gas_price` reports.
    pub fn set_min_gas_price(&self, price: Amount) {
        self.state.lock().unwrap().min_gas_price = price;
    }

    /// Delay applied to every call.
    pub fn set_latency(&self, latency: Duration) {
        self.state.lock().unwrap().latency = Some(latency);
    }

    /// Number of calls made to a `LedgerClient` method, by method name.
    pub fn calls(&self, name: &str) -> u64 {
        self.calls.count(name)
    }

    async fn enter(&self, call: &'static str) -> Result<(), ClientError> {
        self.calls.record(call);
        let (latency, offline) = {
            let state = self.state.lock().unwrap();
            (state.latency, state.offline)
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if offline {
            return Err(ClientError::Unreachable(format!("{call}: ledger offline")));
        }
        Ok(())
    }

    fn submit(&self, tx: &SignedTx) -> Result<BroadcastOutcome, ClientError> {
        let hash = txbot_crypto::hash_transaction(tx)
            .map_err(|e| ClientError::Other(e.to_string()))?;
        let mut state = self.state.lock().unwrap();

        if let Some(scripted) = state.scripted.pop_front() {
            return match scripted {
                ScriptedBroadcast::Outcome(outcome) => Ok(outcome),
                ScriptedBroadcast::TransportError(msg) => Err(ClientError::Unreachable(msg)),
            };
        }

        let reject = |code: u32, log: String| {
            Ok(BroadcastOutcome::Response(TxResponse {
                hash: hash.clone(),
                code,
                raw_log: log,
                height: 0,
                gas_used: 0,
                contract_address: None,
            }))
        };

        let body = &tx.body;
        if !txbot_crypto::verify_tx(tx) || txbot_crypto::derive_address(&tx.public_key) != body.signer
        {
            return reject(CODE_UNAUTHORIZED, "signature verification failed; unauthorized".into());
        }
        let Some(account) = state.world.accounts.get(&body.signer).cloned() else {
            return reject(
                CODE_UNKNOWN_ADDRESS,
                format!("account {} not found: unknown address", body.signer),
            );
        };
        if body.sequence != account.sequence {
            return reject(
                txbot_client::failure::CODE_SEQUENCE_MISMATCH,
                format!(
                    "account sequence mismatch, expected {}, got {}: incorrect account sequence",
                    account.sequence, body.sequence
                ),
            );
        }
        for msg in &body.messages {
            if let Message::RawTransfer { nonce, gas_price, .. } = msg {
                if *nonce != account.sequence {
                    return reject(
                        txbot_client::failure::CODE_SEQUENCE_MISMATCH,
                        format!("invalid nonce; got {nonce}, expected {}", account.sequence),
                    );
                }
                if *gas_price < state.min_gas_price {
                    return reject(
                        txbot_client::failure::CODE_INSUFFICIENT_FEE,
                        format!(
                            "insufficient fee; got: {gas_price} required: {}",
                            state.min_gas_price
                        ),
                    );
                }
            }
        }
        if body.fee.amount < state.min_fee {
            return reject(
                txbot_client::failure::CODE_INSUFFICIENT_FEE,
                format!(
                    "insufficient fee; got: {}{} required: {}{}",
                    body.fee.amount, body.fee.denom, state.min_fee, body.fee.denom
                ),
            );
        }
        let cost = body.total_cost();
        if cost > account.balance {
            return reject(
                txbot_client::failure::CODE_INSUFFICIENT_FUNDS,
                format!(
                    "spendable balance {}{} is smaller than {}{}: insufficient funds",
                    account.balance, body.fee.denom, cost, body.fee.denom
                ),
            );
        }

        // Admitted: fee and sequence are consumed whatever the messages do.
        if let Some(signer) = state.world.accounts.get_mut(&body.signer) {
            signer.balance = signer.balance.saturating_sub(body.fee.amount);
            signer.sequence += 1;
        }
        state.height += 1;
        let height = state.height;

        let mut working = state.world.clone();
        let mut contract_address = None;
        let mut gas_used = body.fee.gas;
        let mut failure = None;
        for msg in &body.messages {
            match apply_message(&mut working, &mut state.next_contract, msg) {
                Ok(effect) => {
                    contract_address = effect.contract.or(contract_address);
                    gas_used = gas_used.max(effect.gas);
                }
                Err(log) => {
                    failure = Some(log);
                    break;
                }
            }
        }

        let response = match failure {
            None => {
                state.world = working;
                state.committed.extend(body.messages.iter().cloned());
                TxResponse {
                    hash: hash.clone(),
                    code: 0,
                    raw_log: String::new(),
                    height,
                    gas_used,
                    contract_address,
                }
            }
            Some(log) => TxResponse {
                hash: hash.clone(),
                code: CODE_EXECUTION_FAILED,
                raw_log: log,
                height,
                gas_used,
                contract_address: None,
            },
        };
        state.txs.insert(hash, response.clone());

        // Sync broadcast mode: the caller sees the hash before inclusion.
        Ok(BroadcastOutcome::Response(TxResponse {
            height: 0,
            ..response
        }))
    }
}

impl Default for NullLedger {
    fn default() -> Self {
        Self::new()
    }
}

struct Effect {
    contract: Option<Address>,
    gas: u64,
}

fn debit(world: &mut World, from: &Address, amount: Amount) -> Result<(), String> {
    let account = world
        .accounts
        .get_mut(from)
        .ok_or_else(|| format!("account {from} not found"))?;
    account.balance = account
        .balance
        .checked_sub(amount)
        .ok_or_else(|| format!("insufficient funds: {} < {amount}", account.balance))?;
    Ok(())
}

fn credit(world: &mut World, to: &Address, amount: Amount) {
    let account = world.accounts.entry(to.clone()).or_default();
    account.balance = account.balance.saturating_add(amount);
}

fn apply_message(world: &mut World, next_contract: &mut u64, msg: &Message) -> Result<Effect, String> {
    let mut effect = Effect {
        contract: None,
        gas: 0,
    };
    match msg {
        Message::Send { from, to, amount, .. } => {
            debit(world, from, *amount)?;
            credit(world, to, *amount);
        }
        Message::RawTransfer { from, to, value, .. } => {
            debit(world, from, *value)?;
            credit(world, to, *value);
        }
        Message::Delegate {
            delegator,
            validator,
            amount,
            ..
        } => {
            debit(world, delegator, *amount)?;
            let entry = world.delegations.entry(validator.clone()).or_default();
            *entry = entry.saturating_add(*amount);
        }
        Message::ConvertToken {
            contract,
            sender,
            amount,
            ..
        } => {
            if !world.contracts.contains_key(contract) {
                return Err(format!("contract {contract} not found"));
            }
            let balance = world
                .token_balances
                .entry((contract.clone(), sender.clone()))
                .or_default();
            *balance = balance
                .checked_sub(*amount)
                .ok_or_else(|| format!("ERC20: transfer amount exceeds balance: {amount}"))?;
        }
        Message::ContractCall {
            contract,
            entrypoint,
            args,
            value,
            caller,
        } => {
            if !world.contracts.contains_key(contract) {
                return Err(format!("contract {contract} not found"));
            }
            debit(world, caller, *value)?;
            match entrypoint.as_str() {
                "mint" => {
                    let (to, amount) = match args.as_slice() {
                        [to, amount] => (
                            Address::parse(to).map_err(|e| e.to_string())?,
                            Amount::parse(amount).map_err(|e| e.to_string())?,
                        ),
                        _ => return Err("mint expects (to, amount)".into()),
                    };
                    let balance = world.token_balances.entry((contract.clone(), to)).or_default();
                    *balance = balance.saturating_add(amount);
                }
                "go" => {
                    let gas: u64 = args
                        .first()
                        .and_then(|g| g.parse().ok())
                        .ok_or_else(|| "go expects a gas amount".to_string())?;
                    world.gas_consumed += gas;
                    effect.gas = gas;
                }
                _ => {}
            }
        }
        Message::Deploy { contract, .. } => {
            *next_contract += 1;
            let mut bytes = [0u8; Address::BYTE_LEN];
            bytes[0] = 0xc0;
            bytes[Address::BYTE_LEN - 8..].copy_from_slice(&next_contract.to_be_bytes());
            let address = Address::from_bytes(bytes);
            world.contracts.insert(address.clone(), contract.clone());
            effect.contract = Some(address);
        }
    }
    Ok(effect)
}

#[async_trait]
impl LedgerClient for NullLedger {
    async fn get_sequence(&self, address: &Address) -> Result<AccountInfo, ClientError> {
        self.enter("get_sequence").await?;
        self.account(address)
            .map(|a| AccountInfo {
                sequence: a.sequence,
                account_number: a.account_number,
            })
            .ok_or_else(|| ClientError::NotFound(format!("account {address}")))
    }

    async fn get_balance(&self, address: &Address) -> Result<Amount, ClientError> {
        self.enter("get_balance").await?;
        Ok(self.balance_of(address))
    }

    async fn broadcast(&self, tx: &SignedTx) -> Result<BroadcastOutcome, ClientError> {
        self.enter("broadcast").await?;
        self.submit(tx)
    }

    async fn get_tx_by_hash(&self, hash: &TxHash) -> Result<Option<TxResponse>, ClientError> {
        self.enter("get_tx_by_hash").await?;
        Ok(self.state.lock().unwrap().txs.get(hash).cloned())
    }

    async fn deploy_contract(&self, tx: &SignedTx) -> Result<BroadcastOutcome, ClientError> {
        self.enter("deploy_contract").await?;
        {
            let mut state = self.state.lock().unwrap();
            if state.failing_deploys > 0 {
                state.failing_deploys -= 1;
                return Ok(BroadcastOutcome::NoResponse {
                    code: Some(i64::from(CODE_OUT_OF_GAS)),
                    message: "contract creation code storage out of gas".into(),
                });
            }
        }
        self.submit(tx)
    }

    async fn get_validators(&self) -> Result<Vec<String>, ClientError> {
        self.enter("get_validators").await?;
        Ok(self.state.lock().unwrap().validators.clone())
    }

    async fn gas_price(&self) -> Result<Amount, ClientError> {
        self.enter("gas_price").await?;
        Ok(self.state.lock().unwrap().min_gas_price)
    }
}
