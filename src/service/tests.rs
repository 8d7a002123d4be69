use super::*;
use crate::core::clock::FixedClock;
use crate::core::error::{LedgerError, PaymentError, WebhookError};
use crate::core::events::EventEnvelope;
use crate::core::store::{ClaimOutcome, ListingStore, PaymentPatch, PaymentStore, RentalStore};
use crate::entities::{MoveOutNotice, Payment, PaymentStatus};
use crate::gateway::{IntentStatus, MockGateway};
use crate::ledger::MonthStatus;
use crate::storage::InMemoryStore;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::atomic::{AtomicBool, Ordering};

const SECRET: &str = "whsec_service_tests";
const RENT: i64 = 100_000;

struct Harness {
    service: LedgerService,
    gateway: MockGateway,
    clock: FixedClock,
    verifier: WebhookVerifier,
    tenant: AuthContext,
    landlord: AuthContext,
    rental: Rental,
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn ym(s: &str) -> YearMonth {
    YearMonth::parse(s).unwrap()
}

fn months(tokens: &[&str]) -> Vec<YearMonth> {
    tokens.iter().map(|t| ym(t)).collect()
}

/// Today is 2024-03-15; the rental started 2024-03-01
async fn harness() -> Harness {
    harness_with(Arc::new(InMemoryStore::new())).await
}

async fn harness_with(store: Arc<dyn LedgerStore>) -> Harness {
    let mut config = AppConfig::default();
    config.payments.webhook_secret = SECRET.to_string();

    let gateway = MockGateway::new();
    let clock = FixedClock::at_date(date(2024, 3, 15));
    let service = LedgerService::new(
        store,
        Arc::new(gateway.clone()),
        Arc::new(clock.clone()),
        EventBus::default(),
        &config,
    );

    let tenant_id = Uuid::new_v4();
    let landlord_id = Uuid::new_v4();
    let tenant = AuthContext::Tenant { user_id: tenant_id };
    let landlord = AuthContext::Landlord { user_id: landlord_id };

    let listing = service
        .create_listing(
            &landlord,
            NewListing {
                title: "Two-bed by the park".to_string(),
                monthly_rent_cents: RENT,
                currency: None,
                landlord_id: None,
            },
        )
        .await
        .unwrap();

    let rental = service
        .create_rental(
            &tenant,
            NewRental {
                listing_id: listing.id,
                tenant_id: None,
                start_date: date(2024, 3, 1),
                monthly_rent_cents: None,
            },
        )
        .await
        .unwrap();

    Harness {
        service,
        gateway,
        clock,
        verifier: WebhookVerifier::new(SECRET, 300),
        tenant,
        landlord,
        rental,
    }
}

impl Harness {
    async fn checkout(&self, tokens: &[&str]) -> LedgerResult<CheckoutReceipt> {
        self.service
            .checkout(&self.tenant, self.rental.id, &months(tokens))
            .await
    }

    async fn status_of(&self, month: &str) -> MonthStatus {
        let ledger = self.service.ledger(&self.tenant, self.rental.id).await.unwrap();
        ledger.status_of(ym(month)).unwrap()
    }

    async fn deliver(&self, event_id: &str, kind: &str, intent_id: &str) -> LedgerResult<WebhookAck> {
        let payload = serde_json::to_vec(&serde_json::json!({
            "id": event_id,
            "object": "event",
            "type": kind,
            "data": { "object": {
                "id": intent_id,
                "object": "payment_intent",
                "last_payment_error": { "code": "card_declined", "message": "Your card was declined." }
            }}
        }))
        .unwrap();
        let signature = self.verifier.sign(&payload, self.clock.now().timestamp());
        self.service.handle_webhook(&payload, &signature).await
    }
}

fn intent_of(receipt: &CheckoutReceipt) -> String {
    receipt.payment.intent_id.clone().unwrap()
}

fn settled_events(events: &mut tokio::sync::broadcast::Receiver<EventEnvelope>) -> usize {
    let mut settled = 0;
    while let Ok(envelope) = events.try_recv() {
        if envelope.event.kind() == "payment_settled" {
            settled += 1;
        }
    }
    settled
}

/// In-memory store whose next `transition_payment` fails
#[derive(Clone, Default)]
struct FlakyStore {
    inner: InMemoryStore,
    fail_next_transition: Arc<AtomicBool>,
}

impl FlakyStore {
    fn fail_next_transition(&self) {
        self.fail_next_transition.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl ListingStore for FlakyStore {
    async fn create_listing(&self, listing: Listing) -> anyhow::Result<Listing> {
        self.inner.create_listing(listing).await
    }

    async fn get_listing(&self, id: &Uuid) -> anyhow::Result<Option<Listing>> {
        self.inner.get_listing(id).await
    }
}

#[async_trait]
impl RentalStore for FlakyStore {
    async fn create_rental(&self, rental: Rental) -> anyhow::Result<Option<Rental>> {
        self.inner.create_rental(rental).await
    }

    async fn get_rental(&self, id: &Uuid) -> anyhow::Result<Option<Rental>> {
        self.inner.get_rental(id).await
    }

    async fn list_rentals_by_tenant(&self, tenant_id: &Uuid) -> anyhow::Result<Vec<Rental>> {
        self.inner.list_rentals_by_tenant(tenant_id).await
    }

    async fn list_rentals_by_landlord(&self, landlord_id: &Uuid) -> anyhow::Result<Vec<Rental>> {
        self.inner.list_rentals_by_landlord(landlord_id).await
    }

    async fn set_move_out(
        &self,
        id: &Uuid,
        notice: MoveOutNotice,
        at: DateTime<Utc>,
    ) -> anyhow::Result<Option<Rental>> {
        self.inner.set_move_out(id, notice, at).await
    }

    async fn end_rental(&self, id: &Uuid, at: DateTime<Utc>) -> anyhow::Result<Option<Rental>> {
        self.inner.end_rental(id, at).await
    }
}

#[async_trait]
impl PaymentStore for FlakyStore {
    async fn insert_payment_claiming(&self, payment: Payment) -> anyhow::Result<ClaimOutcome> {
        self.inner.insert_payment_claiming(payment).await
    }

    async fn get_payment(&self, id: &Uuid) -> anyhow::Result<Option<Payment>> {
        self.inner.get_payment(id).await
    }

    async fn get_payment_by_intent(&self, intent_id: &str) -> anyhow::Result<Option<Payment>> {
        self.inner.get_payment_by_intent(intent_id).await
    }

    async fn list_payments_by_rental(&self, rental_id: &Uuid) -> anyhow::Result<Vec<Payment>> {
        self.inner.list_payments_by_rental(rental_id).await
    }

    async fn list_payments_by_landlord(&self, landlord_id: &Uuid) -> anyhow::Result<Vec<Payment>> {
        self.inner.list_payments_by_landlord(landlord_id).await
    }

    async fn list_payments_by_tenant(&self, tenant_id: &Uuid) -> anyhow::Result<Vec<Payment>> {
        self.inner.list_payments_by_tenant(tenant_id).await
    }

    async fn list_processing(&self, created_before: DateTime<Utc>) -> anyhow::Result<Vec<Payment>> {
        self.inner.list_processing(created_before).await
    }

    async fn attach_intent(
        &self,
        id: &Uuid,
        intent_id: &str,
        client_secret: Option<String>,
    ) -> anyhow::Result<Option<Payment>> {
        self.inner.attach_intent(id, intent_id, client_secret).await
    }

    async fn transition_payment(
        &self,
        id: &Uuid,
        expected: PaymentStatus,
        patch: PaymentPatch,
    ) -> anyhow::Result<Option<Payment>> {
        if self.fail_next_transition.swap(false, Ordering::SeqCst) {
            anyhow::bail!("connection reset by peer");
        }
        self.inner.transition_payment(id, expected, patch).await
    }

    async fn reclaim_and_settle(
        &self,
        id: &Uuid,
        at: DateTime<Utc>,
    ) -> anyhow::Result<Option<ClaimOutcome>> {
        self.inner.reclaim_and_settle(id, at).await
    }

    async fn record_event(&self, event_id: &str) -> anyhow::Result<bool> {
        self.inner.record_event(event_id).await
    }

    async fn forget_event(&self, event_id: &str) -> anyhow::Result<()> {
        self.inner.forget_event(event_id).await
    }
}

// ---------------------------------------------------------------------------
// Checkout
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_checkout_claims_months_and_opens_intent() {
    let h = harness().await;
    let receipt = h.checkout(&["2024-03", "2024-04"]).await.unwrap();

    assert_eq!(receipt.payment.status, PaymentStatus::Processing);
    assert_eq!(receipt.payment.amount_cents, 2 * RENT);
    assert_eq!(receipt.provider, "mock");
    assert!(receipt.client_secret.is_some());
    assert_eq!(h.gateway.intent_count(), 1);

    assert_eq!(h.status_of("2024-03").await, MonthStatus::Processing);
    assert_eq!(h.status_of("2024-04").await, MonthStatus::Processing);
    assert_eq!(h.status_of("2024-05").await, MonthStatus::Upcoming);
}

#[tokio::test]
async fn test_checkout_must_start_at_earliest_unpaid_month() {
    let h = harness().await;
    let err = h.checkout(&["2024-04"]).await.unwrap_err();
    assert!(matches!(
        err,
        LedgerError::Payment(PaymentError::MustStartAt { .. })
    ));
}

#[tokio::test]
async fn test_checkout_rejects_months_held_by_another_payment() {
    let h = harness().await;
    h.checkout(&["2024-03"]).await.unwrap();

    let err = h.checkout(&["2024-03", "2024-04"]).await.unwrap_err();
    assert!(matches!(
        err,
        LedgerError::Payment(PaymentError::MonthUnavailable {
            status: MonthStatus::Processing,
            ..
        })
    ));
}

#[tokio::test]
async fn test_checkout_beyond_prepay_horizon_is_rejected() {
    let h = harness().await;
    let tokens: Vec<String> = YearMonth::range_inclusive(ym("2024-03"), ym("2024-10"))
        .iter()
        .map(|m| m.to_string())
        .collect();
    let tokens: Vec<&str> = tokens.iter().map(String::as_str).collect();

    let err = h.checkout(&tokens).await.unwrap_err();
    assert_eq!(err.error_code(), "MONTH_OUT_OF_RANGE");
}

#[tokio::test]
async fn test_gateway_failure_releases_months() {
    let h = harness().await;
    h.gateway.fail_next_create("card_declined").unwrap();

    let err = h.checkout(&["2024-03"]).await.unwrap_err();
    assert_eq!(err.status_code(), axum::http::StatusCode::BAD_GATEWAY);

    let payments = h.service.rental_payments(&h.tenant, h.rental.id).await.unwrap();
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].status, PaymentStatus::Failed);
    assert_eq!(h.status_of("2024-03").await, MonthStatus::Due);

    // The months can be paid again right away
    assert!(h.checkout(&["2024-03"]).await.is_ok());
}

#[tokio::test]
async fn test_landlord_cannot_checkout() {
    let h = harness().await;
    let err = h
        .service
        .checkout(&h.landlord, h.rental.id, &months(&["2024-03"]))
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "FORBIDDEN");

    let err = h
        .service
        .checkout(&AuthContext::Anonymous, h.rental.id, &months(&["2024-03"]))
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "UNAUTHORIZED");
}

#[tokio::test]
async fn test_checkout_publishes_initiated_event() {
    let h = harness().await;
    let mut events = h.service.events().subscribe();

    h.checkout(&["2024-03"]).await.unwrap();

    let envelope = events.recv().await.unwrap();
    assert_eq!(envelope.event.kind(), "payment_initiated");
    assert_eq!(envelope.event.rental_id(), h.rental.id);
}

// ---------------------------------------------------------------------------
// Webhooks
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_webhook_success_settles_payment() {
    let h = harness().await;
    let receipt = h.checkout(&["2024-03", "2024-04"]).await.unwrap();

    let ack = h
        .deliver("evt_1", "payment_intent.succeeded", &intent_of(&receipt))
        .await
        .unwrap();
    assert_eq!(ack.action, WebhookAction::Settled);
    assert_eq!(h.status_of("2024-03").await, MonthStatus::Paid);
    assert_eq!(h.status_of("2024-04").await, MonthStatus::Paid);

    let ledger = h.service.ledger(&h.tenant, h.rental.id).await.unwrap();
    assert_eq!(ledger.next_payable, Some(ym("2024-05")));
    assert_eq!(ledger.paid_cents, 2 * RENT);
}

#[tokio::test]
async fn test_duplicate_webhook_is_acknowledged_once() {
    let h = harness().await;
    let receipt = h.checkout(&["2024-03"]).await.unwrap();
    let intent = intent_of(&receipt);

    let first = h.deliver("evt_1", "payment_intent.succeeded", &intent).await.unwrap();
    let second = h.deliver("evt_1", "payment_intent.succeeded", &intent).await.unwrap();

    assert_eq!(first.action, WebhookAction::Settled);
    assert_eq!(second.action, WebhookAction::Duplicate);
}

#[tokio::test]
async fn test_success_redelivered_under_new_event_id_settles_once() {
    let h = harness().await;
    let receipt = h.checkout(&["2024-03"]).await.unwrap();
    let intent = intent_of(&receipt);
    let mut events = h.service.events().subscribe();

    let first = h.deliver("evt_1", "payment_intent.succeeded", &intent).await.unwrap();
    let second = h.deliver("evt_2", "payment_intent.succeeded", &intent).await.unwrap();

    assert_eq!(first.action, WebhookAction::Settled);
    assert_eq!(second.action, WebhookAction::Unchanged);
    assert_eq!(settled_events(&mut events), 1);
    assert_eq!(h.status_of("2024-03").await, MonthStatus::Paid);
}

#[tokio::test]
async fn test_concurrent_success_deliveries_settle_once() {
    let h = harness().await;
    let receipt = h.checkout(&["2024-03"]).await.unwrap();
    let intent = intent_of(&receipt);
    let mut events = h.service.events().subscribe();

    let (a, b) = tokio::join!(
        h.deliver("evt_1", "payment_intent.succeeded", &intent),
        h.deliver("evt_2", "payment_intent.succeeded", &intent),
    );
    let mut actions = vec![a.unwrap().action, b.unwrap().action];
    actions.sort_by_key(|action| *action == WebhookAction::Unchanged);

    assert_eq!(actions, vec![WebhookAction::Settled, WebhookAction::Unchanged]);
    assert_eq!(settled_events(&mut events), 1);
}

#[tokio::test]
async fn test_poll_after_webhook_does_not_settle_again() {
    let h = harness().await;
    let receipt = h.checkout(&["2024-03"]).await.unwrap();
    let intent = intent_of(&receipt);
    h.gateway.set_status(&intent, IntentStatus::Succeeded).unwrap();
    let mut events = h.service.events().subscribe();

    h.deliver("evt_1", "payment_intent.succeeded", &intent).await.unwrap();
    let polled = h.service.poll_payment(&h.tenant, receipt.payment.id).await.unwrap();

    assert_eq!(polled.status, PaymentStatus::Succeeded);
    assert_eq!(settled_events(&mut events), 1);
}

#[tokio::test]
async fn test_webhook_after_poll_is_unchanged() {
    let h = harness().await;
    let receipt = h.checkout(&["2024-03"]).await.unwrap();
    let intent = intent_of(&receipt);
    h.gateway.set_status(&intent, IntentStatus::Succeeded).unwrap();
    let mut events = h.service.events().subscribe();

    h.service.poll_payment(&h.tenant, receipt.payment.id).await.unwrap();
    let ack = h.deliver("evt_1", "payment_intent.succeeded", &intent).await.unwrap();

    assert_eq!(ack.action, WebhookAction::Unchanged);
    assert_eq!(settled_events(&mut events), 1);
}

#[tokio::test]
async fn test_failed_webhook_apply_can_be_redelivered() {
    let store = FlakyStore::default();
    let h = harness_with(Arc::new(store.clone())).await;
    let receipt = h.checkout(&["2024-03"]).await.unwrap();
    let intent = intent_of(&receipt);

    store.fail_next_transition();
    let err = h
        .deliver("evt_1", "payment_intent.succeeded", &intent)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::Storage(_)));
    assert_eq!(h.status_of("2024-03").await, MonthStatus::Processing);

    // The event id was forgotten, so the provider's retry is applied
    let ack = h.deliver("evt_1", "payment_intent.succeeded", &intent).await.unwrap();
    assert_eq!(ack.action, WebhookAction::Settled);
    assert_eq!(h.status_of("2024-03").await, MonthStatus::Paid);

    let ack = h.deliver("evt_1", "payment_intent.succeeded", &intent).await.unwrap();
    assert_eq!(ack.action, WebhookAction::Duplicate);
}

#[tokio::test]
async fn test_webhook_failure_releases_months() {
    let h = harness().await;
    let receipt = h.checkout(&["2024-03"]).await.unwrap();

    let ack = h
        .deliver("evt_1", "payment_intent.payment_failed", &intent_of(&receipt))
        .await
        .unwrap();
    assert_eq!(ack.action, WebhookAction::Released);
    assert_eq!(h.status_of("2024-03").await, MonthStatus::Due);

    let payments = h.service.rental_payments(&h.tenant, h.rental.id).await.unwrap();
    assert_eq!(payments[0].failure_reason.as_deref(), Some("Your card was declined."));
}

#[tokio::test]
async fn test_webhook_with_bad_signature_is_rejected() {
    let h = harness().await;
    let payload = br#"{"id":"evt_1","type":"payment_intent.succeeded","data":{"object":{}}}"#;
    let err = h
        .service
        .handle_webhook(payload, "t=1710460800,v1=deadbeef")
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::Webhook(_)));

    let err = h.service.handle_webhook(payload, "").await.unwrap_err();
    assert!(matches!(
        err,
        LedgerError::Webhook(WebhookError::MissingSignature)
    ));
}

#[tokio::test]
async fn test_webhook_for_unknown_intent_and_other_events() {
    let h = harness().await;

    let ack = h
        .deliver("evt_1", "payment_intent.succeeded", "pi_unknown")
        .await
        .unwrap();
    assert_eq!(ack.action, WebhookAction::UnknownIntent);

    let ack = h.deliver("evt_2", "charge.refunded", "ch_1").await.unwrap();
    assert_eq!(ack.action, WebhookAction::Ignored);
}

#[tokio::test]
async fn test_late_success_after_failure_is_honoured() {
    let h = harness().await;
    let receipt = h.checkout(&["2024-03"]).await.unwrap();
    let intent = intent_of(&receipt);

    h.deliver("evt_1", "payment_intent.payment_failed", &intent).await.unwrap();
    let ack = h.deliver("evt_2", "payment_intent.succeeded", &intent).await.unwrap();

    assert_eq!(ack.action, WebhookAction::LateSettled);
    assert_eq!(h.status_of("2024-03").await, MonthStatus::Paid);
}

#[tokio::test]
async fn test_late_success_is_not_applied_over_a_newer_payment() {
    let h = harness().await;
    let first = h.checkout(&["2024-03"]).await.unwrap();
    h.deliver("evt_1", "payment_intent.payment_failed", &intent_of(&first))
        .await
        .unwrap();

    let second = h.checkout(&["2024-03"]).await.unwrap();
    let ack = h
        .deliver("evt_2", "payment_intent.succeeded", &intent_of(&first))
        .await
        .unwrap();
    assert_eq!(ack.action, WebhookAction::Ignored);

    let payments = h.service.rental_payments(&h.tenant, h.rental.id).await.unwrap();
    let first_now = payments.iter().find(|p| p.id == first.payment.id).unwrap();
    assert_eq!(first_now.status, PaymentStatus::Failed);
    let ledger = h.service.ledger(&h.tenant, h.rental.id).await.unwrap();
    assert_eq!(ledger.entry(ym("2024-03")).unwrap().payment_id, Some(second.payment.id));
}

#[tokio::test]
async fn test_failure_for_settled_payment_is_ignored() {
    let h = harness().await;
    let receipt = h.checkout(&["2024-03"]).await.unwrap();
    let intent = intent_of(&receipt);

    h.deliver("evt_1", "payment_intent.succeeded", &intent).await.unwrap();
    let ack = h.deliver("evt_2", "payment_intent.canceled", &intent).await.unwrap();

    assert_eq!(ack.action, WebhookAction::Ignored);
    assert_eq!(h.status_of("2024-03").await, MonthStatus::Paid);
}

// ---------------------------------------------------------------------------
// Polling and reconciliation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_poll_applies_provider_status() {
    let h = harness().await;
    let receipt = h.checkout(&["2024-03"]).await.unwrap();
    h.gateway.set_status(&intent_of(&receipt), IntentStatus::Succeeded).unwrap();

    let payment = h.service.poll_payment(&h.tenant, receipt.payment.id).await.unwrap();
    assert_eq!(payment.status, PaymentStatus::Succeeded);
    assert!(payment.settled_at.is_some());
}

#[tokio::test]
async fn test_poll_hides_client_secret_from_landlord() {
    let h = harness().await;
    let receipt = h.checkout(&["2024-03"]).await.unwrap();

    let as_tenant = h.service.poll_payment(&h.tenant, receipt.payment.id).await.unwrap();
    let as_landlord = h.service.poll_payment(&h.landlord, receipt.payment.id).await.unwrap();

    assert!(as_tenant.client_secret.is_some());
    assert!(as_landlord.client_secret.is_none());
}

#[tokio::test]
async fn test_reconcile_skips_young_payments() {
    let h = harness().await;
    let receipt = h.checkout(&["2024-03"]).await.unwrap();
    h.gateway.set_status(&intent_of(&receipt), IntentStatus::Succeeded).unwrap();

    let report = h.service.reconcile_processing().await.unwrap();
    assert_eq!(report.checked, 0);
}

#[tokio::test]
async fn test_reconcile_settles_and_releases() {
    let h = harness().await;
    let paid = h.checkout(&["2024-03"]).await.unwrap();
    h.gateway.set_status(&intent_of(&paid), IntentStatus::Succeeded).unwrap();

    h.clock.advance(Duration::minutes(10));
    let report = h.service.reconcile_processing().await.unwrap();
    assert_eq!(report.checked, 1);
    assert_eq!(report.settled, 1);

    let failed = h.checkout(&["2024-04"]).await.unwrap();
    h.gateway
        .set_status(
            &intent_of(&failed),
            IntentStatus::Failed {
                reason: "insufficient_funds".to_string(),
            },
        )
        .unwrap();

    h.clock.advance(Duration::minutes(10));
    let report = h.service.reconcile_processing().await.unwrap();
    assert_eq!(report.released, 1);
    assert_eq!(h.status_of("2024-03").await, MonthStatus::Paid);
    assert_eq!(h.status_of("2024-04").await, MonthStatus::Upcoming);
}

#[tokio::test]
async fn test_reconcile_cancels_abandoned_checkout() {
    let h = harness().await;
    let receipt = h.checkout(&["2024-03"]).await.unwrap();

    h.clock.advance(Duration::hours(2));
    let report = h.service.reconcile_processing().await.unwrap();
    assert_eq!(report.unchanged, 1);
    assert_eq!(h.status_of("2024-03").await, MonthStatus::Processing);

    h.clock.advance(Duration::days(2));
    let report = h.service.reconcile_processing().await.unwrap();
    assert_eq!(report.abandoned, 1);

    let intent = h.gateway.retrieve_intent(&intent_of(&receipt)).await.unwrap();
    assert_eq!(intent.status, IntentStatus::Canceled);
    assert_eq!(h.status_of("2024-03").await, MonthStatus::Due);
}

// ---------------------------------------------------------------------------
// Move-out
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_short_notice_penalty_rides_on_final_payment() {
    let h = harness().await;
    let rental = h
        .service
        .submit_move_out(
            &h.tenant,
            h.rental.id,
            MoveOutRequest {
                notice_date: None,
                move_out_date: date(2024, 4, 10),
            },
        )
        .await
        .unwrap();
    let notice = rental.move_out.unwrap();
    assert!(notice.short_notice);
    assert_eq!(notice.penalty_cents, RENT);

    let quote = h
        .service
        .quote(&h.tenant, h.rental.id, &months(&["2024-03", "2024-04"]))
        .await
        .unwrap();
    // April is prorated to 10 of 30 days
    assert_eq!(quote.rent_cents, RENT + 33_333);
    assert_eq!(quote.penalty_cents, RENT);
    assert_eq!(quote.total_cents, 2 * RENT + 33_333);

    assert_eq!(h.status_of("2024-05").await, MonthStatus::Blocked);
}

#[tokio::test]
async fn test_penalty_is_collected_after_end_month_was_paid() {
    let h = harness().await;
    let prepaid = h.checkout(&["2024-03", "2024-04"]).await.unwrap();
    h.deliver("evt_1", "payment_intent.succeeded", &intent_of(&prepaid))
        .await
        .unwrap();

    h.service
        .submit_move_out(
            &h.tenant,
            h.rental.id,
            MoveOutRequest {
                notice_date: None,
                move_out_date: date(2024, 4, 10),
            },
        )
        .await
        .unwrap();

    let ledger = h.service.ledger(&h.tenant, h.rental.id).await.unwrap();
    assert_eq!(ledger.next_payable, None);
    assert_eq!(ledger.paid_cents, 2 * RENT);
    assert_eq!(ledger.pending_penalty_cents, RENT);
    assert_eq!(ledger.outstanding_cents, RENT);

    let receipt = h.checkout(&[]).await.unwrap();
    assert!(receipt.payment.months.is_empty());
    assert_eq!(receipt.payment.penalty_cents, RENT);
    assert_eq!(receipt.payment.amount_cents, RENT);

    // A second penalty-only checkout has nothing left to charge
    let err = h.checkout(&[]).await.unwrap_err();
    assert_eq!(err.error_code(), "EMPTY_MONTH_SELECTION");

    let ack = h
        .deliver("evt_2", "payment_intent.succeeded", &intent_of(&receipt))
        .await
        .unwrap();
    assert_eq!(ack.action, WebhookAction::Settled);

    let ledger = h.service.ledger(&h.tenant, h.rental.id).await.unwrap();
    assert_eq!(ledger.pending_penalty_cents, 0);
    assert_eq!(ledger.outstanding_cents, 0);
    assert_eq!(ledger.paid_cents, 2 * RENT);
}

#[tokio::test]
async fn test_tenant_cannot_backdate_notice() {
    let h = harness().await;
    let err = h
        .service
        .submit_move_out(
            &h.tenant,
            h.rental.id,
            MoveOutRequest {
                notice_date: Some(date(2024, 1, 1)),
                move_out_date: date(2024, 4, 30),
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "INVALID_MOVE_OUT");
}

#[tokio::test]
async fn test_second_move_out_is_rejected() {
    let h = harness().await;
    let request = MoveOutRequest {
        notice_date: None,
        move_out_date: date(2024, 6, 30),
    };
    h.service
        .submit_move_out(&h.tenant, h.rental.id, request.clone())
        .await
        .unwrap();
    let err = h
        .service
        .submit_move_out(&h.tenant, h.rental.id, request)
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "MOVE_OUT_ALREADY_SUBMITTED");
}

#[tokio::test]
async fn test_move_out_before_paid_months_is_rejected() {
    let h = harness().await;
    h.checkout(&["2024-03", "2024-04", "2024-05"]).await.unwrap();

    let err = h
        .service
        .submit_move_out(
            &h.tenant,
            h.rental.id,
            MoveOutRequest {
                notice_date: None,
                move_out_date: date(2024, 4, 30),
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "PAID_BEYOND_MOVE_OUT");
}

// ---------------------------------------------------------------------------
// Rentals, access and summaries
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_rent_above_the_cap_is_rejected() {
    let h = harness().await;
    let err = h
        .service
        .create_listing(
            &h.landlord,
            NewListing {
                title: "Penthouse".to_string(),
                monthly_rent_cents: i64::MAX,
                currency: None,
                landlord_id: None,
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "VALIDATION_ERROR");

    let err = h
        .service
        .create_rental(
            &AuthContext::Tenant {
                user_id: Uuid::new_v4(),
            },
            NewRental {
                listing_id: h.rental.listing_id,
                tenant_id: None,
                start_date: date(2024, 5, 1),
                monthly_rent_cents: Some(1_000_000_001),
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_duplicate_active_rental_conflicts() {
    let h = harness().await;
    let err = h
        .service
        .create_rental(
            &h.tenant,
            NewRental {
                listing_id: h.rental.listing_id,
                tenant_id: None,
                start_date: date(2024, 5, 1),
                monthly_rent_cents: None,
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "RENTAL_ALREADY_ACTIVE");
}

#[tokio::test]
async fn test_stranger_cannot_read_ledger() {
    let h = harness().await;
    let stranger = AuthContext::Tenant {
        user_id: Uuid::new_v4(),
    };
    let err = h.service.ledger(&stranger, h.rental.id).await.unwrap_err();
    assert_eq!(err.error_code(), "FORBIDDEN");

    let admin = AuthContext::Admin {
        admin_id: Uuid::new_v4(),
    };
    assert!(h.service.ledger(&admin, h.rental.id).await.is_ok());
}

#[tokio::test]
async fn test_ended_rental_blocks_future_months() {
    let h = harness().await;
    h.service.end_rental(&h.landlord, h.rental.id).await.unwrap();

    assert_eq!(h.status_of("2024-03").await, MonthStatus::Due);
    assert_eq!(h.status_of("2024-04").await, MonthStatus::Blocked);

    let err = h.service.end_rental(&h.landlord, h.rental.id).await.unwrap_err();
    assert_eq!(err.error_code(), "RENTAL_NOT_ACTIVE");
}

#[tokio::test]
async fn test_landlord_summary_totals() {
    let h = harness().await;
    let paid = h.checkout(&["2024-03"]).await.unwrap();
    h.deliver("evt_1", "payment_intent.succeeded", &intent_of(&paid))
        .await
        .unwrap();
    h.checkout(&["2024-04"]).await.unwrap();

    let landlord_id = h.landlord.user_id().unwrap();
    let summary = h.service.landlord_summary(&h.landlord, landlord_id).await.unwrap();

    assert_eq!(summary.active_rentals, 1);
    assert_eq!(summary.received_cents, RENT);
    assert_eq!(summary.processing_cents, RENT);
    assert_eq!(summary.outstanding_cents, 0);
    assert_eq!(summary.by_month.get(&ym("2024-03")), Some(&RENT));

    let err = h
        .service
        .landlord_summary(&h.tenant, landlord_id)
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "FORBIDDEN");
}

#[tokio::test]
async fn test_tenant_payments_across_rentals() {
    let h = harness().await;
    h.checkout(&["2024-03"]).await.unwrap();

    let tenant_id = h.tenant.user_id().unwrap();
    let payments = h.service.tenant_payments(&h.tenant, tenant_id).await.unwrap();
    assert_eq!(payments.len(), 1);
    assert!(payments[0].client_secret.is_some());

    let admin = AuthContext::Admin {
        admin_id: Uuid::new_v4(),
    };
    let payments = h.service.tenant_payments(&admin, tenant_id).await.unwrap();
    assert!(payments[0].client_secret.is_none());
}
