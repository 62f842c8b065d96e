//! Fraud checks for accepting a payment on an unconfirmed transfer.
//!
//! A candidate transfer moves through the checks in cost order: the amount gate, the backing balance of every bundle
//! input, the aggregate bundle signature, and finally a search for a competing spend from the same inputs. The first
//! failing check discards the transfer. Nothing here touches the payment store; the push monitor persists the
//! acceptance once [`ZeroConfValidator::validate`] succeeds.
use std::collections::{HashMap, HashSet};

use log::*;
use lpg_common::Amount;

use crate::{
    ledger_types::{LedgerTransaction, PendingTransfer},
    monitor::errors::{ValidationFailure, ZeroConfError},
    traits::{LedgerClient, LedgerError},
};

/// The stages a candidate transfer passes through. Used for logging where a transfer was discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZeroConfStage {
    Observed,
    InputBalanceChecked,
    SignatureChecked,
    Accepted,
}

#[derive(Clone)]
pub struct ZeroConfValidator<L> {
    ledger: L,
    debug: bool,
}

impl<L: LedgerClient> ZeroConfValidator<L> {
    pub fn new(ledger: L, debug: bool) -> Self {
        Self { ledger, debug }
    }

    /// Runs every fraud check against `transfer`. On success, returns the reconstructed bundle, head first.
    pub async fn validate(
        &self,
        required: Amount,
        transfer: &PendingTransfer,
    ) -> Result<Vec<LedgerTransaction>, ZeroConfError> {
        let mut stage = ZeroConfStage::Observed;
        let result = self.run_checks(required, transfer, &mut stage).await;
        match &result {
            Ok(_) => debug!("⚡️ Transfer {} passed every zero-confirmation check", transfer.tx_hash),
            Err(e) => diagnostic!(self.debug, "⚡️ Transfer {} discarded after stage {stage:?}. {e}", transfer.tx_hash),
        }
        result
    }

    async fn run_checks(
        &self,
        required: Amount,
        transfer: &PendingTransfer,
        stage: &mut ZeroConfStage,
    ) -> Result<Vec<LedgerTransaction>, ZeroConfError> {
        if transfer.amount < required {
            return Err(ValidationFailure::InsufficientAmount { required, received: transfer.amount }.into());
        }
        let entries = self.ledger.find_transactions_by_bundle(&transfer.bundle).await?;
        let entries = entries.into_iter().filter(|tx| tx.bundle == transfer.bundle).collect::<Vec<_>>();
        let inputs = debited_inputs(&entries)?;
        if inputs.is_empty() {
            return Err(ValidationFailure::NoInputs(transfer.bundle.clone()).into());
        }
        self.check_input_balances(&inputs).await?;
        *stage = ZeroConfStage::InputBalanceChecked;

        let bundle = assemble_bundle(&entries, &transfer.bundle)?;
        if !self.ledger.validate_bundle_signature(&bundle).await? {
            return Err(ValidationFailure::InvalidSignature(transfer.bundle.clone()).into());
        }
        *stage = ZeroConfStage::SignatureChecked;

        self.check_for_competing_spends(&inputs, &transfer.bundle).await?;
        *stage = ZeroConfStage::Accepted;
        Ok(bundle)
    }

    async fn check_input_balances(&self, inputs: &[(String, Amount)]) -> Result<(), ZeroConfError> {
        let addresses = inputs.iter().map(|(a, _)| a.clone()).collect::<Vec<_>>();
        let balances = self.ledger.get_balances(&addresses).await?;
        if balances.len() != inputs.len() {
            return Err(ZeroConfError::Query(LedgerError::MalformedResponse(format!(
                "Asked for {} balances but received {}",
                inputs.len(),
                balances.len()
            ))));
        }
        for ((address, debited), balance) in inputs.iter().zip(balances) {
            if balance.abs() < *debited {
                diagnostic!(self.debug, "⚡️ Input {address} debits {debited}, but only {balance} is available");
                return Err(ValidationFailure::InsufficientInputBalance {
                    address: address.clone(),
                    balance,
                    debited: *debited,
                }
                .into());
            }
        }
        Ok(())
    }

    async fn check_for_competing_spends(&self, inputs: &[(String, Amount)], bundle: &str) -> Result<(), ZeroConfError> {
        let addresses = inputs.iter().map(|(a, _)| a.clone()).collect::<Vec<_>>();
        let history = self.ledger.find_transactions_by_address(&addresses).await?;
        let inputs = addresses.iter().map(String::as_str).collect::<HashSet<&str>>();
        let competing =
            history.into_iter().find(|tx| tx.is_debit() && tx.bundle != bundle && inputs.contains(tx.address.as_str()));
        match competing {
            Some(tx) => Err(ValidationFailure::CompetingSpend { address: tx.address, bundle: tx.bundle }.into()),
            None => Ok(()),
        }
    }
}

/// The total debited from each input address of a bundle, in order of first appearance. Reattached copies of the same
/// entry share a hash and are only counted once. Debits that do not fit in an [`Amount`] are a malformed response.
pub fn debited_inputs(entries: &[LedgerTransaction]) -> Result<Vec<(String, Amount)>, LedgerError> {
    let mut seen = HashSet::new();
    let mut order = Vec::new();
    let mut totals = HashMap::<String, Amount>::new();
    for tx in entries.iter().filter(|tx| tx.is_debit()) {
        if !seen.insert(tx.hash.as_str()) {
            continue;
        }
        let total = totals.entry(tx.address.clone()).or_insert_with(|| {
            order.push(tx.address.clone());
            Amount::zero()
        });
        let overflow =
            || LedgerError::MalformedResponse(format!("Debits from {} in bundle {} overflow", tx.address, tx.bundle));
        let magnitude = tx.value.checked_abs().ok_or_else(overflow)?;
        *total = total.checked_add(magnitude).ok_or_else(overflow)?;
    }
    let inputs = order
        .into_iter()
        .map(|address| {
            let total = totals.get(&address).copied().unwrap_or_default();
            (address, total)
        })
        .collect();
    Ok(inputs)
}

/// Rebuilds a bundle from its loose entries by following the trunk links from the head entry (index 0) to the tail.
pub fn assemble_bundle(entries: &[LedgerTransaction], bundle: &str) -> Result<Vec<LedgerTransaction>, ValidationFailure> {
    let incomplete = || ValidationFailure::IncompleteBundle(bundle.to_string());
    let by_hash = entries.iter().map(|tx| (tx.hash.as_str(), tx)).collect::<HashMap<_, _>>();
    let head = entries.iter().find(|tx| tx.current_index == 0).ok_or_else(incomplete)?;
    let mut result = Vec::with_capacity(head.last_index as usize + 1);
    result.push(head.clone());
    let mut current = head;
    while current.current_index < head.last_index {
        let next = by_hash.get(current.trunk_transaction.as_str()).copied().ok_or_else(incomplete)?;
        if next.current_index != current.current_index + 1 || next.last_index != head.last_index {
            return Err(incomplete());
        }
        result.push(next.clone());
        current = next;
    }
    Ok(result)
}

#[cfg(test)]
mod test {
    use chrono::Utc;

    use super::*;

    fn entry(hash: &str, address: &str, value: i64, index: u64, last: u64, trunk: &str) -> LedgerTransaction {
        LedgerTransaction {
            hash: hash.into(),
            address: address.into(),
            value: Amount::from(value),
            bundle: "B1".into(),
            current_index: index,
            last_index: last,
            trunk_transaction: trunk.into(),
            message: String::new(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn bundle_is_assembled_head_first() {
        let entries = vec![
            entry("T2", "IN", 0, 2, 2, "X"),
            entry("T0", "OUT", 5, 0, 2, "T1"),
            entry("T1", "IN", -5, 1, 2, "T2"),
        ];
        let bundle = assemble_bundle(&entries, "B1").unwrap();
        let hashes = bundle.iter().map(|tx| tx.hash.as_str()).collect::<Vec<_>>();
        assert_eq!(hashes, vec!["T0", "T1", "T2"]);
    }

    #[test]
    fn broken_trunk_is_incomplete() {
        let entries = vec![entry("T0", "OUT", 5, 0, 2, "T1"), entry("T1", "IN", -5, 1, 2, "T9")];
        let err = assemble_bundle(&entries, "B1").unwrap_err();
        assert_eq!(err, ValidationFailure::IncompleteBundle("B1".into()));
        let err = assemble_bundle(&entries[1..], "B1").unwrap_err();
        assert_eq!(err, ValidationFailure::IncompleteBundle("B1".into()));
    }

    #[test]
    fn debits_are_totalled_per_address() {
        let entries = vec![
            entry("T0", "OUT", 8, 0, 3, "T1"),
            entry("T1", "IN_A", -5, 1, 3, "T2"),
            entry("T2", "IN_B", -1, 2, 3, "T3"),
            entry("T3", "IN_A", -2, 3, 3, "X"),
            entry("T3", "IN_A", -2, 3, 3, "X"),
        ];
        let inputs = debited_inputs(&entries).unwrap();
        assert_eq!(inputs, vec![("IN_A".to_string(), Amount::from(7)), ("IN_B".to_string(), Amount::from(1))]);
    }

    #[test]
    fn overflowing_debits_are_malformed() {
        let entries = vec![entry("T1", "IN_A", i64::MIN, 1, 2, "T2")];
        assert!(matches!(debited_inputs(&entries), Err(LedgerError::MalformedResponse(_))));
        let entries = vec![entry("T1", "IN_A", -i64::MAX, 1, 2, "T2"), entry("T2", "IN_A", -2, 2, 2, "X")];
        assert!(matches!(debited_inputs(&entries), Err(LedgerError::MalformedResponse(_))));
    }
}
