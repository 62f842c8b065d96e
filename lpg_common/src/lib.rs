mod amount;
pub mod helpers;

pub mod op;

pub use amount::{Amount, AmountConversionError, LEDGER_UNIT};
