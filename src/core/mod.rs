//! Core types shared by the ledger, the service and the storage backends

pub mod auth;
pub mod clock;
pub mod error;
pub mod events;
pub mod month;
pub mod store;

pub use auth::{AuthContext, AuthPolicy, Role};
pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{LedgerError, LedgerResult};
pub use events::{EventBus, EventEnvelope, LedgerEvent};
pub use month::{MonthError, YearMonth};
pub use store::{ClaimOutcome, LedgerStore, ListingStore, PaymentPatch, PaymentStore, RentalStore};
