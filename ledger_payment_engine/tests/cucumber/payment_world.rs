use std::{collections::HashMap, fmt::Debug};

use cucumber::World;
use ledger_payment_engine::db_types::Payment;

use crate::support::TestSystem;

#[derive(Default, World)]
pub struct PaymentWorld {
    pub system: Option<TestSystem>,
    /// Payments created in the scenario, by the label the scenario gave them.
    pub payments: HashMap<String, Payment>,
}

impl Debug for PaymentWorld {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PaymentWorld ({} payments)", self.payments.len())
    }
}

impl PaymentWorld {
    pub fn system(&self) -> &TestSystem {
        self.system.as_ref().expect("Confirmation engine not initialised")
    }

    pub fn payment(&self, label: &str) -> &Payment {
        self.payments.get(label).unwrap_or_else(|| panic!("No payment labelled '{label}'"))
    }
}
