//! Ledger account fixture — a small event-sourced aggregate used across
//! the workspace's tests.

use hindsight_core::aggregate::AggregateRoot;
use hindsight_core::event::DomainEvent;
use hindsight_core::registry::EventRegistry;
use hindsight_core::snapshot::{Snapshot, SnapshotAware};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Emitted when an account is opened.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountOpened {
    /// The account holder's name.
    pub owner: String,
}

/// Emitted when the account holder is renamed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountRenamed {
    /// The new account holder name.
    pub new_owner: String,
}

/// Emitted when funds are deposited.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundsDeposited {
    /// The deposited amount, in cents.
    pub amount_cents: i64,
}

/// Event name for [`AccountOpened`].
pub const ACCOUNT_OPENED_EVENT_NAME: &str = "ledger.account_opened";

/// Event name for [`AccountRenamed`].
pub const ACCOUNT_RENAMED_EVENT_NAME: &str = "ledger.account_renamed";

/// Event name for [`FundsDeposited`].
pub const FUNDS_DEPOSITED_EVENT_NAME: &str = "ledger.funds_deposited";

/// Domain events for the ledger account fixture.
#[derive(Debug, Clone)]
pub enum LedgerEvent {
    /// An account has been opened.
    AccountOpened(AccountOpened),
    /// The account holder has been renamed.
    AccountRenamed(AccountRenamed),
    /// Funds have been deposited.
    FundsDeposited(FundsDeposited),
}

impl DomainEvent for LedgerEvent {
    fn event_name(&self) -> &'static str {
        match self {
            Self::AccountOpened(_) => ACCOUNT_OPENED_EVENT_NAME,
            Self::AccountRenamed(_) => ACCOUNT_RENAMED_EVENT_NAME,
            Self::FundsDeposited(_) => FUNDS_DEPOSITED_EVENT_NAME,
        }
    }

    fn to_payload(&self) -> serde_json::Value {
        // Serialization of derived Serialize types to Value is infallible.
        match self {
            Self::AccountOpened(payload) => serde_json::to_value(payload),
            Self::AccountRenamed(payload) => serde_json::to_value(payload),
            Self::FundsDeposited(payload) => serde_json::to_value(payload),
        }
        .expect("ledger event payload serialization is infallible")
    }
}

/// Builds the decoder registry covering every ledger event.
#[must_use]
pub fn ledger_registry() -> EventRegistry<LedgerEvent> {
    let mut registry = EventRegistry::new();
    registry
        .register(ACCOUNT_OPENED_EVENT_NAME, |payload| {
            serde_json::from_value::<AccountOpened>(payload.clone())
                .map(LedgerEvent::AccountOpened)
        })
        .expect("ledger event names are distinct");
    registry
        .register(ACCOUNT_RENAMED_EVENT_NAME, |payload| {
            serde_json::from_value::<AccountRenamed>(payload.clone())
                .map(LedgerEvent::AccountRenamed)
        })
        .expect("ledger event names are distinct");
    registry
        .register(FUNDS_DEPOSITED_EVENT_NAME, |payload| {
            serde_json::from_value::<FundsDeposited>(payload.clone())
                .map(LedgerEvent::FundsDeposited)
        })
        .expect("ledger event names are distinct");
    registry
}

/// Snapshot state for [`LedgerAccount`].
#[derive(Debug, Serialize, Deserialize)]
struct LedgerState {
    owner: String,
    balance_cents: i64,
}

/// An event-sourced ledger account.
#[derive(Debug)]
pub struct LedgerAccount {
    /// Aggregate identifier.
    pub id: Uuid,
    /// Last committed version.
    pub version: i64,
    /// The account holder's name, empty until the account is opened.
    pub owner: String,
    /// Current balance, in cents.
    pub balance_cents: i64,
    uncommitted_events: Vec<LedgerEvent>,
}

impl LedgerAccount {
    /// Opens the account for the given holder.
    pub fn open(&mut self, owner: &str) {
        self.record(LedgerEvent::AccountOpened(AccountOpened {
            owner: owner.to_string(),
        }));
    }

    /// Renames the account holder.
    pub fn rename(&mut self, new_owner: &str) {
        self.record(LedgerEvent::AccountRenamed(AccountRenamed {
            new_owner: new_owner.to_string(),
        }));
    }

    /// Deposits funds into the account.
    pub fn deposit(&mut self, amount_cents: i64) {
        self.record(LedgerEvent::FundsDeposited(FundsDeposited { amount_cents }));
    }
}

impl AggregateRoot for LedgerAccount {
    type Event = LedgerEvent;

    fn new(aggregate_id: Uuid) -> Self {
        Self {
            id: aggregate_id,
            version: 0,
            owner: String::new(),
            balance_cents: 0,
            uncommitted_events: Vec::new(),
        }
    }

    fn aggregate_id(&self) -> Uuid {
        self.id
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn set_version(&mut self, version: i64) {
        self.version = version;
    }

    fn apply(&mut self, event: &Self::Event) {
        match event {
            LedgerEvent::AccountOpened(payload) => self.owner = payload.owner.clone(),
            LedgerEvent::AccountRenamed(payload) => self.owner = payload.new_owner.clone(),
            LedgerEvent::FundsDeposited(payload) => self.balance_cents += payload.amount_cents,
        }
    }

    fn uncommitted_events(&self) -> &[Self::Event] {
        &self.uncommitted_events
    }

    fn uncommitted_events_mut(&mut self) -> &mut Vec<Self::Event> {
        &mut self.uncommitted_events
    }
}

impl SnapshotAware for LedgerAccount {
    fn snapshot_state(&self) -> serde_json::Value {
        // Serialization of derived Serialize types to Value is infallible.
        serde_json::to_value(LedgerState {
            owner: self.owner.clone(),
            balance_cents: self.balance_cents,
        })
        .expect("ledger state serialization is infallible")
    }

    fn restore(&mut self, snapshot: &Snapshot) -> Result<(), serde_json::Error> {
        let state: LedgerState = serde_json::from_value(snapshot.state.clone())?;
        self.owner = state.owner;
        self.balance_cents = state.balance_cents;
        self.version = snapshot.version;
        Ok(())
    }
}
