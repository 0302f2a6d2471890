//! Transaction bodies, messages and signed envelopes.
//!
//! A [`TxBody`] is what gets signed: chain identifiers, the signer's account
//! number and sequence, the fee, and one or more [`Message`]s. The signed
//! envelope ([`SignedTx`]) is what gets broadcast.

use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::amount::Amount;
use crate::keys::{PublicKey, Signature};

/// Fee attached to a transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fee {
    pub amount: Amount,
    pub denom: String,
    pub gas: u64,
}

impl Fee {
    pub fn new(amount: Amount, denom: impl Into<String>, gas: u64) -> Self {
        Self {
            amount,
            denom: denom.into(),
            gas,
        }
    }
}

/// A single ledger message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    /// Native bank transfer.
    Send {
        from: Address,
        to: Address,
        amount: Amount,
        denom: String,
    },
    /// Staking delegation to a validator operator address.
    Delegate {
        delegator: Address,
        validator: String,
        amount: Amount,
        denom: String,
    },
    /// Convert an amount of a token contract's balance into native coin.
    ConvertToken {
        contract: Address,
        sender: Address,
        receiver: Address,
        amount: Amount,
    },
    /// Call a contract entrypoint.
    ContractCall {
        contract: Address,
        caller: Address,
        entrypoint: String,
        args: Vec<String>,
        value: Amount,
    },
    /// Ledger-native value transfer that carries its own nonce and gas price.
    RawTransfer {
        from: Address,
        to: Address,
        value: Amount,
        nonce: u64,
        gas_limit: u64,
        gas_price: Amount,
    },
    /// Deploy a contract from bytecode.
    Deploy {
        deployer: Address,
        contract: String,
        /// Hex-encoded bytecode.
        bytecode: String,
        args: Vec<String>,
    },
}

impl Message {
    /// Short type label used in logs.
    pub fn type_name(&self) -> &'static str {
        match self {
            Message::Send { .. } => "send",
            Message::Delegate { .. } => "delegate",
            Message::ConvertToken { .. } => "convert_token",
            Message::ContractCall { .. } => "contract_call",
            Message::RawTransfer { .. } => "raw_transfer",
            Message::Deploy { .. } => "deploy",
        }
    }

    /// Native value moved out of the signer's account by this message,
    /// excluding fees.
    pub fn native_value(&self) -> Amount {
        match self {
            Message::Send { amount, .. } | Message::Delegate { amount, .. } => *amount,
            Message::ContractCall { value, .. } | Message::RawTransfer { value, .. } => *value,
            Message::ConvertToken { .. } | Message::Deploy { .. } => Amount::ZERO,
        }
    }
}

/// The signable body of a transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxBody {
    pub chain_id: u64,
    pub cosmos_chain_id: String,
    pub signer: Address,
    pub account_number: u64,
    pub sequence: u64,
    pub fee: Fee,
    #[serde(default)]
    pub memo: String,
    pub messages: Vec<Message>,
}

impl TxBody {
    /// Total native value this transaction can debit: message values plus fee.
    pub fn total_cost(&self) -> Amount {
        self.messages
            .iter()
            .fold(self.fee.amount, |acc, m| acc.saturating_add(m.native_value()))
    }
}

/// A signed transaction ready for broadcast.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTx {
    pub body: TxBody,
    pub public_key: PublicKey,
    pub signature: Signature,
}
