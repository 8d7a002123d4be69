//! Background sweep over processing payments

use crate::service::LedgerService;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Run [`LedgerService::reconcile_processing`] every `interval`
///
/// Returns `None` when the interval is zero, which disables the sweep.
pub fn spawn_reconciler(service: LedgerService, interval: Duration) -> Option<JoinHandle<()>> {
    if interval.is_zero() {
        tracing::info!("payment reconciler disabled");
        return None;
    }

    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;
            if let Err(err) = service.reconcile_processing().await {
                tracing::error!(error = %err, "payment reconciliation failed");
            }
        }
    }))
}
