//! Coin selection.
//!
//! Accumulates spendable outputs in a deterministic order until they cover
//! the receivers plus the fee of the transaction they would produce. The fee
//! depends on the input and output count, so it is re-estimated after every
//! added input; selection stops at the first input count that covers it.

use bitcoin::Amount;

use crate::config::NetworkParams;
use crate::error::ConstructionError;
use crate::tx::types::{fee_for_size, SpendRequest, UnspentOutput};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SelectionOrder {
    /// Keep the order the output source supplied.
    #[default]
    AsGiven,
    /// Highest value first; ties keep source order.
    LargestFirst,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub inputs: Vec<UnspentOutput>,
    /// Excess returned to the spender. `None` when the excess was below dust
    /// and went to the fee instead.
    pub change: Option<Amount>,
    pub fee: Amount,
}

#[derive(Debug, Clone, Copy)]
pub struct CoinSelector<'a> {
    params: &'a NetworkParams,
    order: SelectionOrder,
}

impl<'a> CoinSelector<'a> {
    pub fn new(params: &'a NetworkParams, order: SelectionOrder) -> Self {
        Self { params, order }
    }

    fn fee(&self, inputs: usize, outputs: usize, fee_per_kb: Amount) -> u64 {
        let size = self.params.size_model.estimate(inputs, outputs);
        fee_for_size(size, fee_per_kb).to_sat()
    }

    /// Spendable outputs in selection order. Values outside
    /// `(0, MAX_MONEY]` cannot exist on chain and are ignored.
    fn candidates<'u, P>(
        &self,
        available: &'u [UnspentOutput],
        is_spendable: P,
    ) -> Vec<&'u UnspentOutput>
    where
        P: Fn(&UnspentOutput) -> bool,
    {
        let mut candidates: Vec<&UnspentOutput> = available
            .iter()
            .filter(|u| u.value > Amount::ZERO && u.value <= Amount::MAX_MONEY)
            .filter(|u| is_spendable(*u))
            .collect();

        if self.order == SelectionOrder::LargestFirst {
            // Stable, so equal values keep their source order.
            candidates.sort_by(|a, b| b.value.cmp(&a.value));
        }
        candidates
    }

    /// Picks inputs for `request`. Receivers are assumed validated.
    pub fn select<P>(
        &self,
        available: &[UnspentOutput],
        request: &SpendRequest,
        is_spendable: P,
    ) -> Result<Selection, ConstructionError>
    where
        P: Fn(&UnspentOutput) -> bool,
    {
        let target = sum_receivers(request)?;
        let outputs = request.receivers.len();
        let dust = self.params.dust_threshold.to_sat();
        let candidates = self.candidates(available, is_spendable);

        let mut selected = Vec::new();
        let mut total: u64 = 0;

        for utxo in candidates {
            selected.push(utxo.clone());
            total = total.saturating_add(utxo.value.to_sat());

            let fee_without_change = self.fee(selected.len(), outputs, request.fee_per_kb);
            let needed = target.saturating_add(fee_without_change);
            log::trace!(
                "[SELECT] {} inputs, total={} needed={}",
                selected.len(),
                total,
                needed
            );
            if total < needed {
                continue;
            }

            let fee_with_change = self.fee(selected.len(), outputs + 1, request.fee_per_kb);
            if let Some(change) = total.checked_sub(target.saturating_add(fee_with_change)) {
                if change >= dust {
                    log::debug!(
                        "[SELECT] {} inputs, change={} fee={}",
                        selected.len(),
                        change,
                        fee_with_change
                    );
                    return Ok(Selection {
                        inputs: selected,
                        change: Some(Amount::from_sat(change)),
                        fee: Amount::from_sat(fee_with_change),
                    });
                }
            }

            // Excess below dust is folded into the fee.
            let fee = total - target;
            log::debug!("[SELECT] {} inputs, no change, fee={}", selected.len(), fee);
            return Ok(Selection {
                inputs: selected,
                change: None,
                fee: Amount::from_sat(fee),
            });
        }

        let required =
            target.saturating_add(self.fee(selected.len().max(1), outputs, request.fee_per_kb));
        log::debug!("[SELECT] insufficient funds: required={} available={}", required, total);
        Err(ConstructionError::InsufficientFunds {
            required: Amount::from_sat(required),
            available: Amount::from_sat(total),
        })
    }

    /// Spends every spendable output to a single destination; the fee is
    /// taken out of that destination's value.
    pub fn select_all<P>(
        &self,
        available: &[UnspentOutput],
        fee_per_kb: Amount,
        is_spendable: P,
    ) -> Result<(Selection, Amount), ConstructionError>
    where
        P: Fn(&UnspentOutput) -> bool,
    {
        let inputs: Vec<UnspentOutput> = self
            .candidates(available, is_spendable)
            .into_iter()
            .cloned()
            .collect();

        if inputs.is_empty() {
            return Err(ConstructionError::InsufficientFunds {
                required: self.params.dust_threshold,
                available: Amount::ZERO,
            });
        }

        let total = inputs
            .iter()
            .fold(0u64, |acc, u| acc.saturating_add(u.value.to_sat()));
        let fee = self.fee(inputs.len(), 1, fee_per_kb);
        let remaining = total.saturating_sub(fee);

        if remaining < self.params.dust_threshold.to_sat() {
            return Err(ConstructionError::OutputTooSmall {
                value: Amount::from_sat(remaining),
                dust_threshold: self.params.dust_threshold,
            });
        }

        let selection = Selection {
            inputs,
            change: None,
            fee: Amount::from_sat(fee),
        };
        Ok((selection, Amount::from_sat(remaining)))
    }

    /// Largest amount a single receiver could get, or zero if that would be dust.
    pub fn max_spendable<P>(
        &self,
        available: &[UnspentOutput],
        fee_per_kb: Amount,
        is_spendable: P,
    ) -> Amount
    where
        P: Fn(&UnspentOutput) -> bool,
    {
        match self.select_all(available, fee_per_kb, is_spendable) {
            Ok((_, amount)) => amount,
            Err(_) => Amount::ZERO,
        }
    }
}

fn sum_receivers(request: &SpendRequest) -> Result<u64, ConstructionError> {
    request
        .receivers
        .iter()
        .try_fold(0u64, |acc, r| acc.checked_add(r.amount.to_sat()))
        .ok_or_else(|| ConstructionError::InvalidArgument("receiver total overflows".to_string()))
}
