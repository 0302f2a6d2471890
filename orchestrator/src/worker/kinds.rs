//! Per-kind message construction.
//!
//! Kinds differ only in what they put into a transaction; the loop, failure
//! handling and funding are shared in [`super::Worker`].

use tracing::warn;

use txbot_types::{Address, Amount, Fee, Message, WorkerKind};

use super::{WorkerParams, WorkerSettings};
use crate::contracts::{ContractKind, ContractRegistry};
use crate::OrchestratorError;

/// Gas limit for raw value transfers.
pub const RAW_GAS_LIMIT: u64 = 0x21000;
/// Gas price a raw-send worker starts from before any escalation.
pub const RAW_INITIAL_GAS_PRICE: u128 = 100;
/// Fee attached to token conversions.
pub const CONVERT_FEE_AMOUNT: u128 = 2000;
pub const CONVERT_FEE_GAS: u64 = 2_000_000;

/// Mutable per-kind state carried by a worker between cycles.
#[derive(Clone, Debug, PartialEq)]
pub enum KindState {
    Transfer {
        receiver: Address,
        amount: Amount,
    },
    Delegate {
        validator: String,
    },
    Convert {
        token: Address,
        amount: Amount,
        minted: bool,
    },
    GasConsume {
        contract: Address,
        gas: u64,
    },
    RawSend {
        receiver: Address,
        gas_price: Amount,
        gas_limit: u64,
    },
}

fn param_str<'a>(params: &'a WorkerParams, key: &str) -> Option<&'a str> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn param_u64(params: &WorkerParams, key: &str) -> Option<u64> {
    let value = params.get(key)?;
    value
        .as_u64()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
}

/// Parse an optional address param. `Err(())` means present but malformed.
fn param_address(params: &WorkerParams, key: &str) -> Result<Option<Address>, ()> {
    match param_str(params, key) {
        None => Ok(None),
        Some(raw) => Address::parse(raw).map(Some).map_err(|e| {
            warn!(param = key, value = raw, error = %e, "ignoring worker: bad address param");
        }),
    }
}

impl KindState {
    /// Build the state for `kind`. `Ok(None)` means the worker cannot be
    /// constructed with what is available (no validator known, malformed
    /// param) and must not be created.
    pub fn build(
        kind: WorkerKind,
        params: &WorkerParams,
        settings: &WorkerSettings,
        validators: &[String],
        contracts: &ContractRegistry,
    ) -> Result<Option<Self>, OrchestratorError> {
        let contract = |kind: ContractKind| {
            contracts
                .get(kind)
                .ok_or_else(|| OrchestratorError::ContractMissing(kind.name().to_string()))
        };

        let state = match kind {
            WorkerKind::Transfer => {
                let Ok(receiver) = param_address(params, "receiver") else {
                    return Ok(None);
                };
                KindState::Transfer {
                    receiver: receiver.unwrap_or_else(|| settings.transfer_receiver.clone()),
                    amount: Amount::new(1),
                }
            }
            WorkerKind::Delegate => {
                let validator = match param_str(params, "validator") {
                    Some(v) => v.to_string(),
                    None if !validators.is_empty() => {
                        validators[rand::random_range(0..validators.len())].clone()
                    }
                    None => {
                        warn!("no validator supplied and none known; delegate worker not created");
                        return Ok(None);
                    }
                };
                KindState::Delegate { validator }
            }
            WorkerKind::Convert => KindState::Convert {
                token: contract(ContractKind::Token)?,
                amount: Amount::new(1),
                minted: false,
            },
            WorkerKind::GasConsume => KindState::GasConsume {
                contract: contract(ContractKind::GasConsumer)?,
                gas: param_u64(params, "gas").unwrap_or(settings.gas_to_consume),
            },
            WorkerKind::RawSend => {
                let Ok(receiver) = param_address(params, "receiver") else {
                    return Ok(None);
                };
                KindState::RawSend {
                    receiver: receiver.unwrap_or_else(|| settings.raw_receiver.clone()),
                    gas_price: Amount::new(RAW_INITIAL_GAS_PRICE),
                    gas_limit: RAW_GAS_LIMIT,
                }
            }
        };
        Ok(Some(state))
    }

    pub fn kind(&self) -> WorkerKind {
        match self {
            KindState::Transfer { .. } => WorkerKind::Transfer,
            KindState::Delegate { .. } => WorkerKind::Delegate,
            KindState::Convert { .. } => WorkerKind::Convert,
            KindState::GasConsume { .. } => WorkerKind::GasConsume,
            KindState::RawSend { .. } => WorkerKind::RawSend,
        }
    }

    /// Messages for the next transaction from `sender` at `sequence`.
    pub fn create_messages(&mut self, sender: &Address, sequence: u64, denom: &str) -> Vec<Message> {
        let message = match self {
            KindState::Transfer { receiver, amount } => {
                let msg = Message::Send {
                    from: sender.clone(),
                    to: receiver.clone(),
                    amount: *amount,
                    denom: denom.to_string(),
                };
                *amount = amount.saturating_add(Amount::new(1));
                msg
            }
            KindState::Delegate { validator } => Message::Delegate {
                delegator: sender.clone(),
                validator: validator.clone(),
                amount: Amount::new(1),
                denom: denom.to_string(),
            },
            KindState::Convert { token, amount, .. } => {
                let msg = Message::ConvertToken {
                    contract: token.clone(),
                    sender: sender.clone(),
                    receiver: sender.clone(),
                    amount: *amount,
                };
                *amount = amount.saturating_add(Amount::new(1));
                msg
            }
            KindState::GasConsume { contract, gas } => Message::ContractCall {
                contract: contract.clone(),
                caller: sender.clone(),
                entrypoint: "go".into(),
                args: vec![gas.to_string()],
                value: Amount::ZERO,
            },
            KindState::RawSend {
                receiver,
                gas_price,
                gas_limit,
            } => Message::RawTransfer {
                from: sender.clone(),
                to: receiver.clone(),
                value: Amount::new(1),
                nonce: sequence,
                gas_limit: *gas_limit,
                gas_price: *gas_price,
            },
        };
        vec![message]
    }

    /// Fee the next transaction pays. Raw sends pay `gas_price * gas_limit`.
    /// Fee actually charged for an accepted transaction. Raw sends pay for
    /// the gas they used; every other kind pays the attached fee.
    pub fn paid_fee(&self, attached: &Fee, gas_used: u64) -> Amount {
        match self {
            KindState::RawSend { gas_price, .. } if gas_used > 0 => {
                gas_price.saturating_mul(u128::from(gas_used))
            }
            _ => attached.amount,
        }
    }

    pub fn fee(&self, settings: &WorkerSettings) -> Fee {
        match self {
            KindState::Convert { .. } => Fee::new(
                Amount::new(CONVERT_FEE_AMOUNT),
                settings.denom.clone(),
                CONVERT_FEE_GAS,
            ),
            KindState::RawSend {
                gas_price,
                gas_limit,
                ..
            } => Fee::new(
                gas_price.saturating_mul(u128::from(*gas_limit)),
                settings.denom.clone(),
                *gas_limit,
            ),
            _ => settings.fee.clone(),
        }
    }
}

/// Next gas price after a fee rejection: ten percent plus one above the
/// current price, or the ledger's price if that is higher.
pub fn escalate_gas_price(current: Amount, ledger: Amount) -> Amount {
    let raw = current.raw();
    let bumped = Amount::new(raw.saturating_add(raw / 10).saturating_add(1));
    if ledger > bumped {
        ledger
    } else {
        bumped
    }
}
