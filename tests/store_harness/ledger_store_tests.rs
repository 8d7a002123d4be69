//! Macro-generated conformance suite for `LedgerStore` backends
//!
//! # Generated Tests
//!
//! ## Listings and rentals
//! - `test_listing_round_trip`
//! - `test_one_active_rental_per_tenant_and_listing`
//! - `test_ended_rental_allows_new_booking`
//! - `test_move_out_is_set_once`
//! - `test_list_rentals_by_party`
//!
//! ## Month claims
//! - `test_claim_conflict_reports_overlap`
//! - `test_claims_are_per_rental`
//! - `test_release_frees_months`
//! - `test_transition_is_conditional`
//! - `test_reclaim_and_settle`
//! - `test_reclaim_conflict_leaves_payment_failed`
//! - `test_concurrent_claims_have_one_winner`
//!
//! ## Payments and events
//! - `test_attach_intent_and_lookup`
//! - `test_list_processing_respects_age`
//! - `test_event_ids_are_recorded_once`

/// Generate the `LedgerStore` conformance suite.
///
/// `$factory` is re-evaluated for every test and must produce a fresh store
/// implementing `LedgerStore + Clone + 'static`.
#[macro_export]
macro_rules! ledger_store_tests {
    ($factory:expr) => {
        mod ledger_store_tests {
            use super::*;
            use chrono::{Duration, Utc};
            use rentledger::core::store::{
                ClaimOutcome, ListingStore, PaymentPatch, PaymentStore, RentalStore,
            };
            use rentledger::entities::{MoveOutNotice, PaymentStatus, RentalStatus};
            use uuid::Uuid;

            fn claimed(outcome: ClaimOutcome) -> rentledger::entities::Payment {
                match outcome {
                    ClaimOutcome::Claimed(payment) => payment,
                    ClaimOutcome::Conflict(months) => panic!("unexpected conflict on {:?}", months),
                }
            }

            // ==============================================================
            // Listings and rentals
            // ==============================================================

            #[tokio::test]
            async fn test_listing_round_trip() {
                let store = $factory;
                let listing = listing();
                store.create_listing(listing.clone()).await.unwrap();

                let fetched = store.get_listing(&listing.id).await.unwrap().unwrap();
                assert_eq!(fetched.title, listing.title);
                assert_eq!(fetched.monthly_rent_cents, RENT);
                assert!(store.get_listing(&Uuid::new_v4()).await.unwrap().is_none());
            }

            #[tokio::test]
            async fn test_one_active_rental_per_tenant_and_listing() {
                let store = $factory;
                let first = rental();
                assert!(store.create_rental(first.clone()).await.unwrap().is_some());

                let mut again = rental();
                again.tenant_id = first.tenant_id;
                again.listing_id = first.listing_id;
                assert!(store.create_rental(again).await.unwrap().is_none());

                // Another tenant on the same listing is fine
                let mut other = rental();
                other.listing_id = first.listing_id;
                assert!(store.create_rental(other).await.unwrap().is_some());
            }

            #[tokio::test]
            async fn test_ended_rental_allows_new_booking() {
                let store = $factory;
                let first = rental();
                store.create_rental(first.clone()).await.unwrap();

                let ended = store.end_rental(&first.id, Utc::now()).await.unwrap().unwrap();
                assert_eq!(ended.status, RentalStatus::Ended);
                assert!(store.end_rental(&first.id, Utc::now()).await.unwrap().is_none());

                let mut again = rental();
                again.tenant_id = first.tenant_id;
                again.listing_id = first.listing_id;
                assert!(store.create_rental(again).await.unwrap().is_some());
            }

            #[tokio::test]
            async fn test_move_out_is_set_once() {
                let store = $factory;
                let rental = rental();
                store.create_rental(rental.clone()).await.unwrap();

                let notice = MoveOutNotice {
                    notice_date: date(2024, 3, 1),
                    move_out_date: date(2024, 4, 30),
                    penalty_cents: 0,
                    short_notice: false,
                };
                let updated = store
                    .set_move_out(&rental.id, notice.clone(), Utc::now())
                    .await
                    .unwrap()
                    .unwrap();
                assert_eq!(updated.move_out, Some(notice.clone()));
                assert!(
                    store
                        .set_move_out(&rental.id, notice, Utc::now())
                        .await
                        .unwrap()
                        .is_none()
                );
            }

            #[tokio::test]
            async fn test_list_rentals_by_party() {
                let store = $factory;
                let a = rental();
                let mut b = rental();
                b.tenant_id = a.tenant_id;
                store.create_rental(a.clone()).await.unwrap();
                store.create_rental(b.clone()).await.unwrap();

                assert_eq!(store.list_rentals_by_tenant(&a.tenant_id).await.unwrap().len(), 2);
                let by_landlord = store.list_rentals_by_landlord(&b.landlord_id).await.unwrap();
                assert_eq!(by_landlord.len(), 1);
                assert_eq!(by_landlord[0].id, b.id);
            }

            // ==============================================================
            // Month claims
            // ==============================================================

            #[tokio::test]
            async fn test_claim_conflict_reports_overlap() {
                let store = $factory;
                let rental = rental();
                claimed(
                    store
                        .insert_payment_claiming(payment(&rental, &["2024-01", "2024-02"]))
                        .await
                        .unwrap(),
                );

                let outcome = store
                    .insert_payment_claiming(payment(&rental, &["2024-02", "2024-03"]))
                    .await
                    .unwrap();
                assert_eq!(outcome, ClaimOutcome::Conflict(vec![ym("2024-02")]));

                // The losing payment left nothing behind
                let stored = store.list_payments_by_rental(&rental.id).await.unwrap();
                assert_eq!(stored.len(), 1);
                claimed(
                    store
                        .insert_payment_claiming(payment(&rental, &["2024-03"]))
                        .await
                        .unwrap(),
                );
            }

            #[tokio::test]
            async fn test_claims_are_per_rental() {
                let store = $factory;
                let a = rental();
                let b = rental();
                claimed(store.insert_payment_claiming(payment(&a, &["2024-01"])).await.unwrap());
                claimed(store.insert_payment_claiming(payment(&b, &["2024-01"])).await.unwrap());
            }

            #[tokio::test]
            async fn test_release_frees_months() {
                let store = $factory;
                let rental = rental();
                let first = claimed(
                    store
                        .insert_payment_claiming(payment(&rental, &["2024-01"]))
                        .await
                        .unwrap(),
                );

                let released = store
                    .transition_payment(
                        &first.id,
                        PaymentStatus::Processing,
                        PaymentPatch::release(
                            PaymentStatus::Failed,
                            Some("card_declined".to_string()),
                            Utc::now(),
                        ),
                    )
                    .await
                    .unwrap()
                    .unwrap();
                assert_eq!(released.status, PaymentStatus::Failed);
                assert_eq!(released.failure_reason.as_deref(), Some("card_declined"));

                claimed(
                    store
                        .insert_payment_claiming(payment(&rental, &["2024-01"]))
                        .await
                        .unwrap(),
                );
            }

            #[tokio::test]
            async fn test_transition_is_conditional() {
                let store = $factory;
                let rental = rental();
                let payment = claimed(
                    store
                        .insert_payment_claiming(payment(&rental, &["2024-01"]))
                        .await
                        .unwrap(),
                );

                let settled = store
                    .transition_payment(
                        &payment.id,
                        PaymentStatus::Processing,
                        PaymentPatch::settle(Utc::now()),
                    )
                    .await
                    .unwrap()
                    .unwrap();
                assert_eq!(settled.status, PaymentStatus::Succeeded);
                assert!(settled.settled_at.is_some());

                // A late failure planned against Processing must not apply
                let stale = store
                    .transition_payment(
                        &payment.id,
                        PaymentStatus::Processing,
                        PaymentPatch::release(PaymentStatus::Failed, None, Utc::now()),
                    )
                    .await
                    .unwrap();
                assert!(stale.is_none());

                let current = store.get_payment(&payment.id).await.unwrap().unwrap();
                assert_eq!(current.status, PaymentStatus::Succeeded);
            }

            #[tokio::test]
            async fn test_reclaim_and_settle() {
                let store = $factory;
                let rental = rental();
                let payment = claimed(
                    store
                        .insert_payment_claiming(payment(&rental, &["2024-01", "2024-02"]))
                        .await
                        .unwrap(),
                );
                store
                    .transition_payment(
                        &payment.id,
                        PaymentStatus::Processing,
                        PaymentPatch::release(PaymentStatus::Failed, None, Utc::now()),
                    )
                    .await
                    .unwrap()
                    .unwrap();

                let outcome = store
                    .reclaim_and_settle(&payment.id, Utc::now())
                    .await
                    .unwrap()
                    .unwrap();
                assert_eq!(claimed(outcome).status, PaymentStatus::Succeeded);

                // Months are held again
                let outcome = store
                    .insert_payment_claiming(super::payment(&rental, &["2024-02"]))
                    .await
                    .unwrap();
                assert!(matches!(outcome, ClaimOutcome::Conflict(_)));

                // Only failed payments can be re-claimed
                assert!(
                    store
                        .reclaim_and_settle(&payment.id, Utc::now())
                        .await
                        .unwrap()
                        .is_none()
                );
            }

            #[tokio::test]
            async fn test_reclaim_conflict_leaves_payment_failed() {
                let store = $factory;
                let rental = rental();
                let first = claimed(
                    store
                        .insert_payment_claiming(payment(&rental, &["2024-01"]))
                        .await
                        .unwrap(),
                );
                store
                    .transition_payment(
                        &first.id,
                        PaymentStatus::Processing,
                        PaymentPatch::release(PaymentStatus::Failed, None, Utc::now()),
                    )
                    .await
                    .unwrap();
                claimed(
                    store
                        .insert_payment_claiming(payment(&rental, &["2024-01"]))
                        .await
                        .unwrap(),
                );

                let outcome = store
                    .reclaim_and_settle(&first.id, Utc::now())
                    .await
                    .unwrap()
                    .unwrap();
                assert_eq!(outcome, ClaimOutcome::Conflict(vec![ym("2024-01")]));
                let current = store.get_payment(&first.id).await.unwrap().unwrap();
                assert_eq!(current.status, PaymentStatus::Failed);
            }

            #[tokio::test]
            async fn test_concurrent_claims_have_one_winner() {
                let store = $factory;
                let rental = rental();

                let mut handles = Vec::new();
                for _ in 0..8 {
                    let store = store.clone();
                    let payment = payment(&rental, &["2024-01", "2024-02"]);
                    handles.push(tokio::spawn(async move {
                        store.insert_payment_claiming(payment).await.unwrap()
                    }));
                }

                let mut winners = 0;
                for handle in handles {
                    if matches!(handle.await.unwrap(), ClaimOutcome::Claimed(_)) {
                        winners += 1;
                    }
                }
                assert_eq!(winners, 1);
                assert_eq!(store.list_payments_by_rental(&rental.id).await.unwrap().len(), 1);
            }

            // ==============================================================
            // Payments and events
            // ==============================================================

            #[tokio::test]
            async fn test_attach_intent_and_lookup() {
                let store = $factory;
                let rental = rental();
                let payment = claimed(
                    store
                        .insert_payment_claiming(payment(&rental, &["2024-01"]))
                        .await
                        .unwrap(),
                );

                let attached = store
                    .attach_intent(&payment.id, "pi_123", Some("pi_123_secret".to_string()))
                    .await
                    .unwrap()
                    .unwrap();
                assert_eq!(attached.intent_id.as_deref(), Some("pi_123"));

                let found = store.get_payment_by_intent("pi_123").await.unwrap().unwrap();
                assert_eq!(found.id, payment.id);
                assert!(store.get_payment_by_intent("pi_other").await.unwrap().is_none());

                assert_eq!(store.list_payments_by_tenant(&rental.tenant_id).await.unwrap().len(), 1);
                assert_eq!(
                    store.list_payments_by_landlord(&rental.landlord_id).await.unwrap().len(),
                    1
                );
            }

            #[tokio::test]
            async fn test_list_processing_respects_age() {
                let store = $factory;
                let rental = rental();
                let mut old = payment(&rental, &["2024-01"]);
                old.created_at = Utc::now() - Duration::hours(1);
                claimed(store.insert_payment_claiming(old.clone()).await.unwrap());
                claimed(
                    store
                        .insert_payment_claiming(payment(&rental, &["2024-02"]))
                        .await
                        .unwrap(),
                );

                let stuck = store
                    .list_processing(Utc::now() - Duration::minutes(5))
                    .await
                    .unwrap();
                assert_eq!(stuck.len(), 1);
                assert_eq!(stuck[0].id, old.id);
            }

            #[tokio::test]
            async fn test_event_ids_are_recorded_once() {
                let store = $factory;
                assert!(store.record_event("evt_1").await.unwrap());
                assert!(!store.record_event("evt_1").await.unwrap());

                store.forget_event("evt_1").await.unwrap();
                assert!(store.record_event("evt_1").await.unwrap());
            }
        }
    };
}
