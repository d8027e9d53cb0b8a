//! Shared test fixtures and mocks for the Hindsight workspace.

mod clock;
mod ledger;
mod store;

pub use clock::FixedClock;
pub use ledger::{
    ACCOUNT_OPENED_EVENT_NAME, ACCOUNT_RENAMED_EVENT_NAME, AccountOpened, AccountRenamed,
    FUNDS_DEPOSITED_EVENT_NAME, FundsDeposited, LedgerAccount, LedgerEvent, ledger_registry,
};
pub use store::FailingEventStore;
