use async_trait::async_trait;
use thiserror::Error;

use crate::ledger_types::AddressInfo;

/// Issues deterministic, monotonically indexed receiving addresses.
#[async_trait]
pub trait AddressAllocator: Clone + Send + Sync + 'static {
    /// A fresh address. Implementations must never hand out an index that an open payment still uses.
    async fn allocate_address(&self) -> Result<AddressInfo, AllocationError>;

    /// The highest address index already spent for payouts.
    async fn current_disbursement_cursor(&self) -> Result<u64, AllocationError>;
}

#[derive(Debug, Clone, Error)]
pub enum AllocationError {
    #[error("No address could be allocated. {0}")]
    Exhausted(String),
    #[error("Address allocator backend error. {0}")]
    Backend(String),
}
