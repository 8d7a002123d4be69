//! Domain records persisted by the ledger: listings, rentals and payments

pub mod listing;
pub mod payment;
pub mod rental;

pub use listing::Listing;
pub use payment::{MonthCharge, Payment, PaymentStatus};
pub use rental::{MoveOutNotice, Rental, RentalStatus};
