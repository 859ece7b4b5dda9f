use bitcoin::absolute::LockTime;
use bitcoin::transaction::Version;
use bitcoin::{Address, Amount, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Witness};
use serde::{Deserialize, Serialize};

/// A spendable output from the account's output cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnspentOutput {
    pub outpoint: OutPoint,
    pub value: Amount,
    pub confirmations: u32,
    pub script_pubkey: ScriptBuf,
}

/// A payment destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receiver {
    pub script_pubkey: ScriptBuf,
    pub amount: Amount,
}

impl Receiver {
    pub fn new(script_pubkey: ScriptBuf, amount: Amount) -> Self {
        Self {
            script_pubkey,
            amount,
        }
    }

    pub fn to_address(address: &Address, amount: Amount) -> Self {
        Self::new(address.script_pubkey(), amount)
    }

    fn to_txout(&self) -> TxOut {
        TxOut {
            value: self.amount,
            script_pubkey: self.script_pubkey.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpendRequest {
    pub receivers: Vec<Receiver>,
    pub fee_per_kb: Amount,
}

impl SpendRequest {
    pub fn new(receivers: Vec<Receiver>, fee_per_kb: Amount) -> Self {
        Self {
            receivers,
            fee_per_kb,
        }
    }

    pub fn single(receiver: Receiver, fee_per_kb: Amount) -> Self {
        Self::new(vec![receiver], fee_per_kb)
    }
}

/// Fee for `size` bytes at `fee_per_kb`, pro rata per byte.
pub fn fee_for_size(size: u64, fee_per_kb: Amount) -> Amount {
    Amount::from_sat(size.saturating_mul(fee_per_kb.to_sat()) / 1000)
}

/// Selected inputs and outputs without signatures.
///
/// Always satisfies `sum(inputs) == sum(outputs) + change + fee`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsignedTransaction {
    pub inputs: Vec<UnspentOutput>,
    pub outputs: Vec<Receiver>,
    pub change: Option<Receiver>,
    pub fee: Amount,
}

impl UnsignedTransaction {
    pub fn total_input(&self) -> u64 {
        self.inputs
            .iter()
            .fold(0u64, |acc, u| acc.saturating_add(u.value.to_sat()))
    }

    /// Receivers plus change.
    pub fn total_output(&self) -> u64 {
        self.outputs
            .iter()
            .chain(self.change.iter())
            .fold(0u64, |acc, r| acc.saturating_add(r.amount.to_sat()))
    }

    pub fn is_balanced(&self) -> bool {
        self.total_output()
            .checked_add(self.fee.to_sat())
            .is_some_and(|spent| spent == self.total_input())
    }

    pub fn outpoints(&self) -> impl Iterator<Item = &OutPoint> + '_ {
        self.inputs.iter().map(|u| &u.outpoint)
    }

    /// Transaction skeleton with empty script sigs and witnesses, receivers
    /// first and change last.
    pub fn to_transaction(&self) -> Transaction {
        let input = self
            .inputs
            .iter()
            .map(|u| TxIn {
                previous_output: u.outpoint,
                script_sig: ScriptBuf::new(),
                sequence: Sequence::MAX,
                witness: Witness::new(),
            })
            .collect();

        let output = self
            .outputs
            .iter()
            .chain(self.change.iter())
            .map(Receiver::to_txout)
            .collect();

        Transaction {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            input,
            output,
        }
    }
}
