//! MongoDB storage backend using the official MongoDB async driver.
//!
//! # Feature flag
//!
//! This module is gated behind the `mongodb_backend` feature flag.
//!
//! # Storage model
//!
//! | collection       | `_id`                  | purpose                               |
//! |------------------|------------------------|---------------------------------------|
//! | `listings`       | listing id             |                                       |
//! | `rentals`        | rental id              | partial unique index: one active      |
//! |                  |                        | rental per tenant and listing         |
//! | `payments`       | payment id             |                                       |
//! | `month_claims`   | `"{rental_id}:{YYYY-MM}"` | at most one holder per month       |
//! | `webhook_events` | provider event id      | de-duplication of deliveries          |
//!
//! A month is claimed by inserting its `month_claims` document; the unique
//! `_id` makes concurrent claims for the same month fail with a duplicate key
//! error instead of double-booking. Status changes use `find_one_and_update`
//! filtered on the expected current status.
//!
//! # Serialization strategy
//!
//! Records are serialized via `serde_json::Value` as an intermediate format,
//! then converted to BSON documents. UUIDs, dates and months are stored as
//! strings and `id` is mapped to MongoDB's `_id`.

use crate::core::error::StorageError;
use crate::core::month::YearMonth;
use crate::core::store::{ClaimOutcome, ListingStore, PaymentPatch, PaymentStore, RentalStore};
use crate::entities::{Listing, MoveOutNotice, Payment, PaymentStatus, Rental, RentalStatus};
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::bson::{Bson, Document, doc};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::{IndexOptions, ReturnDocument};
use mongodb::{Collection, Database, IndexModel};
use serde::Serialize;
use serde::de::DeserializeOwned;
use uuid::Uuid;

const DUPLICATE_KEY: i32 = 11000;

// ---------------------------------------------------------------------------
// Conversion helpers
// ---------------------------------------------------------------------------

/// Convert a serde_json::Value (expected to be an Object) into a BSON Document,
/// renaming `id` → `_id` for MongoDB convention.
fn json_to_document(json: serde_json::Value) -> Result<Document> {
    let bson_val = mongodb::bson::to_bson(&json)
        .map_err(|e| anyhow!("Failed to convert JSON to BSON: {}", e))?;

    let mut doc = match bson_val {
        Bson::Document(d) => d,
        _ => return Err(anyhow!("Expected BSON document, got non-object")),
    };

    if let Some(id) = doc.remove("id") {
        doc.insert("_id", id);
    }

    Ok(doc)
}

/// Convert a BSON Document back into a serde_json::Value,
/// renaming `_id` → `id`.
fn document_to_json(mut doc: Document) -> serde_json::Value {
    if let Some(id) = doc.remove("_id") {
        doc.insert("id", id);
    }

    Bson::Document(doc).into_relaxed_extjson()
}

fn to_document<T: Serialize>(record: &T) -> Result<Document> {
    let json =
        serde_json::to_value(record).map_err(|e| anyhow!("Failed to serialize record: {}", e))?;
    json_to_document(json)
}

fn from_document<T: DeserializeOwned>(doc: Document) -> Result<T> {
    serde_json::from_value(document_to_json(doc))
        .map_err(|e| anyhow!("Failed to deserialize record from document: {}", e))
}

/// Any serializable value in the same representation `to_document` uses
fn to_bson_value<T: Serialize>(value: &T) -> Result<Bson> {
    let json =
        serde_json::to_value(value).map_err(|e| anyhow!("Failed to serialize value: {}", e))?;
    mongodb::bson::to_bson(&json).map_err(|e| anyhow!("Failed to convert JSON to BSON: {}", e))
}

fn uuid_bson(id: &Uuid) -> Bson {
    Bson::String(id.to_string())
}

fn claim_key(rental_id: &Uuid, month: YearMonth) -> String {
    format!("{}:{}", rental_id, month)
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(write_error)) if write_error.code == DUPLICATE_KEY
    )
}

async fn collect_records<T: DeserializeOwned>(
    cursor: mongodb::Cursor<Document>,
    what: &str,
) -> Result<Vec<T>> {
    let docs: Vec<Document> = cursor
        .try_collect()
        .await
        .map_err(|e| anyhow!("Failed to collect {}: {}", what, e))?;
    docs.into_iter().map(from_document).collect()
}

// ---------------------------------------------------------------------------
// MongoStore
// ---------------------------------------------------------------------------

/// Ledger store backed by MongoDB
///
/// ```rust,ignore
/// let client = mongodb::Client::with_uri_str("mongodb://localhost:27017").await?;
/// let store = MongoStore::new(client.database("rentledger"));
/// store.ensure_indexes().await?;
/// ```
#[derive(Clone, Debug)]
pub struct MongoStore {
    database: Database,
}

impl MongoStore {
    pub fn new(database: Database) -> Self {
        Self { database }
    }

    /// Connect to `uri` and use database `name`
    pub async fn connect(uri: &str, name: &str) -> Result<Self> {
        let client = mongodb::Client::with_uri_str(uri)
            .await
            .map_err(|e| StorageError::ConnectionError {
                backend: "MongoDB".to_string(),
                message: e.to_string(),
            })?;
        Ok(Self::new(client.database(name)))
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    fn listings(&self) -> Collection<Document> {
        self.database.collection("listings")
    }

    fn rentals(&self) -> Collection<Document> {
        self.database.collection("rentals")
    }

    fn payments(&self) -> Collection<Document> {
        self.database.collection("payments")
    }

    fn claims(&self) -> Collection<Document> {
        self.database.collection("month_claims")
    }

    fn events(&self) -> Collection<Document> {
        self.database.collection("webhook_events")
    }

    /// Create the indexes the store relies on. Idempotent.
    pub async fn ensure_indexes(&self) -> Result<()> {
        let one_active_rental = IndexModel::builder()
            .keys(doc! { "tenant_id": 1, "listing_id": 1 })
            .options(
                IndexOptions::builder()
                    .name("one_active_rental".to_string())
                    .unique(true)
                    .partial_filter_expression(doc! { "status": RentalStatus::Active.as_str() })
                    .build(),
            )
            .build();

        self.rentals()
            .create_indexes(vec![
                one_active_rental,
                IndexModel::builder().keys(doc! { "landlord_id": 1 }).build(),
            ])
            .await
            .map_err(|e| anyhow!("Failed to create indexes on rentals collection: {}", e))?;

        self.payments()
            .create_indexes(vec![
                IndexModel::builder()
                    .keys(doc! { "rental_id": 1, "created_at": 1 })
                    .build(),
                IndexModel::builder().keys(doc! { "landlord_id": 1 }).build(),
                IndexModel::builder().keys(doc! { "tenant_id": 1 }).build(),
                IndexModel::builder().keys(doc! { "intent_id": 1 }).build(),
                IndexModel::builder().keys(doc! { "status": 1 }).build(),
            ])
            .await
            .map_err(|e| anyhow!("Failed to create indexes on payments collection: {}", e))?;

        self.claims()
            .create_index(IndexModel::builder().keys(doc! { "payment_id": 1 }).build())
            .await
            .map_err(|e| anyhow!("Failed to create indexes on month_claims collection: {}", e))?;

        Ok(())
    }

    /// Insert one claim document per month, stopping at the first taken month
    ///
    /// On conflict the claims inserted by this call are removed again and the
    /// months held by other payments are returned.
    async fn claim_months(&self, payment: &Payment) -> Result<Vec<YearMonth>> {
        let mut inserted: Vec<String> = Vec::with_capacity(payment.months.len());

        for month in &payment.months {
            let key = claim_key(&payment.rental_id, *month);
            let claim = doc! {
                "_id": &key,
                "rental_id": uuid_bson(&payment.rental_id),
                "month": month.to_string(),
                "payment_id": uuid_bson(&payment.id),
            };
            match self.claims().insert_one(claim).await {
                Ok(_) => inserted.push(key),
                Err(e) if is_duplicate_key(&e) => {
                    self.drop_claims(&inserted).await?;
                    return self.foreign_claims(payment).await;
                }
                Err(e) => {
                    self.drop_claims(&inserted).await?;
                    return Err(anyhow!("Failed to claim month {}: {}", month, e));
                }
            }
        }

        Ok(Vec::new())
    }

    /// Months of `payment` held by some other payment
    async fn foreign_claims(&self, payment: &Payment) -> Result<Vec<YearMonth>> {
        let keys: Vec<String> = payment
            .months
            .iter()
            .map(|m| claim_key(&payment.rental_id, *m))
            .collect();
        let cursor = self
            .claims()
            .find(doc! {
                "_id": { "$in": keys },
                "payment_id": { "$ne": uuid_bson(&payment.id) },
            })
            .await
            .map_err(|e| anyhow!("Failed to read month claims: {}", e))?;
        let docs: Vec<Document> = cursor
            .try_collect()
            .await
            .map_err(|e| anyhow!("Failed to collect month claims: {}", e))?;

        let mut months = docs
            .iter()
            .filter_map(|d| d.get_str("month").ok())
            .map(YearMonth::parse)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| anyhow!("Corrupt month claim: {}", e))?;
        months.sort();
        Ok(months)
    }

    async fn drop_claims(&self, keys: &[String]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }
        self.claims()
            .delete_many(doc! { "_id": { "$in": keys } })
            .await
            .map_err(|e| anyhow!("Failed to release month claims: {}", e))?;
        Ok(())
    }

    async fn release_claims_of(&self, payment_id: &Uuid) -> Result<()> {
        self.claims()
            .delete_many(doc! { "payment_id": uuid_bson(payment_id) })
            .await
            .map_err(|e| anyhow!("Failed to release month claims: {}", e))?;
        Ok(())
    }

    async fn update_one_returning<T: DeserializeOwned>(
        &self,
        collection: Collection<Document>,
        filter: Document,
        update: Document,
    ) -> Result<Option<T>> {
        let updated = collection
            .find_one_and_update(filter, update)
            .return_document(ReturnDocument::After)
            .await
            .map_err(|e| anyhow!("Failed to update document: {}", e))?;
        updated.map(from_document).transpose()
    }

    async fn find_payments(&self, filter: Document) -> Result<Vec<Payment>> {
        let cursor = self
            .payments()
            .find(filter)
            .sort(doc! { "created_at": 1 })
            .await
            .map_err(|e| anyhow!("Failed to list payments: {}", e))?;
        let mut payments: Vec<Payment> = collect_records(cursor, "payments").await?;
        payments.sort_by_key(|p| p.created_at);
        Ok(payments)
    }

    async fn find_rentals(&self, filter: Document) -> Result<Vec<Rental>> {
        let cursor = self
            .rentals()
            .find(filter)
            .await
            .map_err(|e| anyhow!("Failed to list rentals: {}", e))?;
        let mut rentals: Vec<Rental> = collect_records(cursor, "rentals").await?;
        rentals.sort_by_key(|r| r.created_at);
        Ok(rentals)
    }
}

#[async_trait]
impl ListingStore for MongoStore {
    async fn create_listing(&self, listing: Listing) -> Result<Listing> {
        self.listings()
            .insert_one(to_document(&listing)?)
            .await
            .map_err(|e| anyhow!("Failed to create listing: {}", e))?;
        Ok(listing)
    }

    async fn get_listing(&self, id: &Uuid) -> Result<Option<Listing>> {
        self.listings()
            .find_one(doc! { "_id": uuid_bson(id) })
            .await
            .map_err(|e| anyhow!("Failed to get listing: {}", e))?
            .map(from_document)
            .transpose()
    }
}

#[async_trait]
impl RentalStore for MongoStore {
    async fn create_rental(&self, rental: Rental) -> Result<Option<Rental>> {
        match self.rentals().insert_one(to_document(&rental)?).await {
            Ok(_) => Ok(Some(rental)),
            Err(e) if is_duplicate_key(&e) => Ok(None),
            Err(e) => Err(anyhow!("Failed to create rental: {}", e)),
        }
    }

    async fn get_rental(&self, id: &Uuid) -> Result<Option<Rental>> {
        self.rentals()
            .find_one(doc! { "_id": uuid_bson(id) })
            .await
            .map_err(|e| anyhow!("Failed to get rental: {}", e))?
            .map(from_document)
            .transpose()
    }

    async fn list_rentals_by_tenant(&self, tenant_id: &Uuid) -> Result<Vec<Rental>> {
        self.find_rentals(doc! { "tenant_id": uuid_bson(tenant_id) })
            .await
    }

    async fn list_rentals_by_landlord(&self, landlord_id: &Uuid) -> Result<Vec<Rental>> {
        self.find_rentals(doc! { "landlord_id": uuid_bson(landlord_id) })
            .await
    }

    async fn set_move_out(
        &self,
        id: &Uuid,
        notice: MoveOutNotice,
        at: DateTime<Utc>,
    ) -> Result<Option<Rental>> {
        let filter = doc! {
            "_id": uuid_bson(id),
            "status": RentalStatus::Active.as_str(),
            "move_out": Bson::Null,
        };
        let update = doc! {
            "$set": {
                "move_out": to_bson_value(&notice)?,
                "updated_at": to_bson_value(&at)?,
            }
        };
        self.update_one_returning(self.rentals(), filter, update)
            .await
    }

    async fn end_rental(&self, id: &Uuid, at: DateTime<Utc>) -> Result<Option<Rental>> {
        let filter = doc! {
            "_id": uuid_bson(id),
            "status": RentalStatus::Active.as_str(),
        };
        let update = doc! {
            "$set": {
                "status": RentalStatus::Ended.as_str(),
                "updated_at": to_bson_value(&at)?,
            }
        };
        self.update_one_returning(self.rentals(), filter, update)
            .await
    }
}

#[async_trait]
impl PaymentStore for MongoStore {
    async fn insert_payment_claiming(&self, payment: Payment) -> Result<ClaimOutcome> {
        if payment.status.holds_months() {
            let conflicts = self.claim_months(&payment).await?;
            if !conflicts.is_empty() {
                return Ok(ClaimOutcome::Conflict(conflicts));
            }
        }

        if let Err(e) = self.payments().insert_one(to_document(&payment)?).await {
            self.release_claims_of(&payment.id).await?;
            return Err(anyhow!("Failed to create payment: {}", e));
        }
        Ok(ClaimOutcome::Claimed(payment))
    }

    async fn get_payment(&self, id: &Uuid) -> Result<Option<Payment>> {
        self.payments()
            .find_one(doc! { "_id": uuid_bson(id) })
            .await
            .map_err(|e| anyhow!("Failed to get payment: {}", e))?
            .map(from_document)
            .transpose()
    }

    async fn get_payment_by_intent(&self, intent_id: &str) -> Result<Option<Payment>> {
        self.payments()
            .find_one(doc! { "intent_id": intent_id })
            .await
            .map_err(|e| anyhow!("Failed to get payment by intent: {}", e))?
            .map(from_document)
            .transpose()
    }

    async fn list_payments_by_rental(&self, rental_id: &Uuid) -> Result<Vec<Payment>> {
        self.find_payments(doc! { "rental_id": uuid_bson(rental_id) })
            .await
    }

    async fn list_payments_by_landlord(&self, landlord_id: &Uuid) -> Result<Vec<Payment>> {
        self.find_payments(doc! { "landlord_id": uuid_bson(landlord_id) })
            .await
    }

    async fn list_payments_by_tenant(&self, tenant_id: &Uuid) -> Result<Vec<Payment>> {
        self.find_payments(doc! { "tenant_id": uuid_bson(tenant_id) })
            .await
    }

    async fn list_processing(&self, created_before: DateTime<Utc>) -> Result<Vec<Payment>> {
        // Timestamps are RFC 3339 strings of varying precision; compare after decoding
        let payments = self
            .find_payments(doc! { "status": PaymentStatus::Processing.as_str() })
            .await?;
        Ok(payments
            .into_iter()
            .filter(|p| p.created_at < created_before)
            .collect())
    }

    async fn attach_intent(
        &self,
        id: &Uuid,
        intent_id: &str,
        client_secret: Option<String>,
    ) -> Result<Option<Payment>> {
        let secret = match client_secret {
            Some(secret) => Bson::String(secret),
            None => Bson::Null,
        };
        let update = doc! {
            "$set": {
                "intent_id": intent_id,
                "client_secret": secret,
            }
        };
        self.update_one_returning(self.payments(), doc! { "_id": uuid_bson(id) }, update)
            .await
    }

    async fn transition_payment(
        &self,
        id: &Uuid,
        expected: PaymentStatus,
        patch: PaymentPatch,
    ) -> Result<Option<Payment>> {
        let filter = doc! {
            "_id": uuid_bson(id),
            "status": expected.as_str(),
        };
        let update = doc! {
            "$set": {
                "status": patch.status.as_str(),
                "failure_reason": to_bson_value(&patch.failure_reason)?,
                "settled_at": to_bson_value(&patch.settled_at)?,
                "updated_at": to_bson_value(&patch.updated_at)?,
            }
        };
        let updated: Option<Payment> = self
            .update_one_returning(self.payments(), filter, update)
            .await?;

        if let Some(payment) = &updated
            && !payment.status.holds_months()
        {
            self.release_claims_of(&payment.id).await?;
        }
        Ok(updated)
    }

    async fn reclaim_and_settle(&self, id: &Uuid, at: DateTime<Utc>) -> Result<Option<ClaimOutcome>> {
        let Some(payment) = self.get_payment(id).await? else {
            return Ok(None);
        };
        if payment.status != PaymentStatus::Failed {
            return Ok(None);
        }

        let conflicts = self.claim_months(&payment).await?;
        if !conflicts.is_empty() {
            return Ok(Some(ClaimOutcome::Conflict(conflicts)));
        }

        let settled: Option<Payment> = self
            .update_one_returning(
                self.payments(),
                doc! { "_id": uuid_bson(id), "status": PaymentStatus::Failed.as_str() },
                doc! {
                    "$set": {
                        "status": PaymentStatus::Succeeded.as_str(),
                        "settled_at": to_bson_value(&at)?,
                        "updated_at": to_bson_value(&at)?,
                    }
                },
            )
            .await?;

        match settled {
            Some(payment) => Ok(Some(ClaimOutcome::Claimed(payment))),
            // Someone else moved it first; only undo our claims if it no longer holds months
            None => {
                if let Some(current) = self.get_payment(id).await?
                    && !current.status.holds_months()
                {
                    self.release_claims_of(id).await?;
                }
                Ok(None)
            }
        }
    }

    async fn record_event(&self, event_id: &str) -> Result<bool> {
        let event = doc! {
            "_id": event_id,
            "received_at": to_bson_value(&Utc::now())?,
        };
        match self.events().insert_one(event).await {
            Ok(_) => Ok(true),
            Err(e) if is_duplicate_key(&e) => Ok(false),
            Err(e) => Err(anyhow!("Failed to record webhook event: {}", e)),
        }
    }

    async fn forget_event(&self, event_id: &str) -> Result<()> {
        self.events()
            .delete_one(doc! { "_id": event_id })
            .await
            .map_err(|e| anyhow!("Failed to forget webhook event: {}", e))?;
        Ok(())
    }
}
