use bitcoin::{Amount, ScriptBuf};

use crate::config::NetworkParams;
use crate::error::ConstructionError;
use crate::tx::selector::{CoinSelector, Selection, SelectionOrder};
use crate::tx::types::{Receiver, SpendRequest, UnsignedTransaction, UnspentOutput};

/// Turns a spend request and an output snapshot into an unsigned transaction.
///
/// Has no side effects: reserving, signing and broadcasting are up to the caller.
#[derive(Debug, Clone)]
pub struct UnsignedTransactionBuilder {
    params: NetworkParams,
    order: SelectionOrder,
    min_confirmations: u32,
}

impl UnsignedTransactionBuilder {
    pub fn new(params: NetworkParams) -> Self {
        Self {
            params,
            order: SelectionOrder::default(),
            min_confirmations: 1,
        }
    }

    pub fn with_order(mut self, order: SelectionOrder) -> Self {
        self.order = order;
        self
    }

    pub fn with_min_confirmations(mut self, min_confirmations: u32) -> Self {
        self.min_confirmations = min_confirmations;
        self
    }

    pub fn params(&self) -> &NetworkParams {
        &self.params
    }

    fn selector(&self) -> CoinSelector<'_> {
        CoinSelector::new(&self.params, self.order)
    }

    fn confirmed_enough(&self, utxo: &UnspentOutput) -> bool {
        utxo.confirmations >= self.min_confirmations
    }

    pub fn validate(&self, request: &SpendRequest) -> Result<(), ConstructionError> {
        if request.receivers.is_empty() {
            return Err(ConstructionError::InvalidArgument("no receivers".to_string()));
        }
        if request.fee_per_kb == Amount::ZERO {
            return Err(ConstructionError::InvalidArgument(
                "fee rate must be positive".to_string(),
            ));
        }

        for (i, receiver) in request.receivers.iter().enumerate() {
            if receiver.amount == Amount::ZERO {
                return Err(ConstructionError::InvalidArgument(format!(
                    "receiver {} has a zero amount",
                    i
                )));
            }
            if receiver.script_pubkey.is_empty() {
                return Err(ConstructionError::InvalidArgument(format!(
                    "receiver {} has an empty script",
                    i
                )));
            }
            if receiver.amount < self.params.dust_threshold {
                return Err(ConstructionError::OutputTooSmall {
                    value: receiver.amount,
                    dust_threshold: self.params.dust_threshold,
                });
            }
        }
        Ok(())
    }

    pub fn build(
        &self,
        available: &[UnspentOutput],
        request: &SpendRequest,
        change_script: &ScriptBuf,
    ) -> Result<UnsignedTransaction, ConstructionError> {
        self.build_with(available, request, change_script, |_| true)
    }

    /// Like [`build`](Self::build) with an extra account-specific spendability
    /// filter (reserved or colored outputs).
    pub fn build_with<P>(
        &self,
        available: &[UnspentOutput],
        request: &SpendRequest,
        change_script: &ScriptBuf,
        is_spendable: P,
    ) -> Result<UnsignedTransaction, ConstructionError>
    where
        P: Fn(&UnspentOutput) -> bool,
    {
        self.validate(request)?;

        let selection = self.selector().select(available, request, |u| {
            self.confirmed_enough(u) && is_spendable(u)
        })?;

        let Selection { inputs, change, fee } = selection;
        let tx = UnsignedTransaction {
            inputs,
            outputs: request.receivers.clone(),
            change: change.map(|amount| Receiver::new(change_script.clone(), amount)),
            fee,
        };

        assert_balanced(&tx);
        log::debug!(
            "[BUILDER] built tx: {} inputs, {} outputs, change={:?}, fee={}",
            tx.inputs.len(),
            tx.outputs.len(),
            tx.change.as_ref().map(|c| c.amount),
            tx.fee
        );
        Ok(tx)
    }

    /// Sends everything spendable to `destination`, fee deducted from it.
    pub fn build_sweep<P>(
        &self,
        available: &[UnspentOutput],
        destination: &ScriptBuf,
        fee_per_kb: Amount,
        is_spendable: P,
    ) -> Result<UnsignedTransaction, ConstructionError>
    where
        P: Fn(&UnspentOutput) -> bool,
    {
        if fee_per_kb == Amount::ZERO {
            return Err(ConstructionError::InvalidArgument(
                "fee rate must be positive".to_string(),
            ));
        }
        if destination.is_empty() {
            return Err(ConstructionError::InvalidArgument(
                "empty destination script".to_string(),
            ));
        }

        let (selection, amount) = self.selector().select_all(available, fee_per_kb, |u| {
            self.confirmed_enough(u) && is_spendable(u)
        })?;

        let tx = UnsignedTransaction {
            inputs: selection.inputs,
            outputs: vec![Receiver::new(destination.clone(), amount)],
            change: None,
            fee: selection.fee,
        };

        assert_balanced(&tx);
        Ok(tx)
    }

    pub fn max_spendable<P>(
        &self,
        available: &[UnspentOutput],
        fee_per_kb: Amount,
        is_spendable: P,
    ) -> Amount
    where
        P: Fn(&UnspentOutput) -> bool,
    {
        self.selector()
            .max_spendable(available, fee_per_kb, |u| self.confirmed_enough(u) && is_spendable(u))
    }
}

/// Inputs must equal outputs plus change plus fee. A mismatch is a logic bug
/// in selection, never a user error.
pub(crate) fn assert_balanced(tx: &UnsignedTransaction) {
    if !tx.is_balanced() {
        log::error!(
            "[BUILDER] balance invariant violated: inputs={} outputs={} fee={}",
            tx.total_input(),
            tx.total_output(),
            tx.fee
        );
    }
    assert!(
        tx.is_balanced(),
        "unsigned transaction does not balance: inputs={} outputs+change={} fee={}",
        tx.total_input(),
        tx.total_output(),
        tx.fee
    );
}
