//! HTTP server for the ledger API
//!
//! [`ServerBuilder`] wires a store, a payment gateway and a clock into a
//! [`LedgerService`](crate::service::LedgerService), mounts the routes from
//! [`router`] and runs the background reconciler while serving.

pub mod builder;
pub mod handlers;
pub mod reconciler;
pub mod router;

pub use builder::ServerBuilder;
pub use handlers::AppState;
pub use reconciler::spawn_reconciler;
pub use router::build_routes;
