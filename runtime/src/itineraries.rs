//! Itinerary store operations.
//!
//! Itineraries are created by (or on behalf of) a customer, patched in place
//! and soft-deleted. Every consultant change is appended to the itinerary's
//! change log, which [`Engine::itinerary_history`] exposes.

use serde::{Deserialize, Serialize};
use tripdesk_core::types::{
    Actor, Itinerary, ItineraryChange, ItineraryPatch, Money, NewItinerary, OrderStatus,
    validate_date_range,
};
use tripdesk_core::{EngineError, NaiveDate, OrderStore, Result, StoreTransaction};

use crate::engine::{Engine, activity, require_self_or_staff};

/// Request to create an itinerary.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CreateItinerary {
    /// Owning customer
    pub customer_code: String,
    /// Short title
    pub title: String,
    /// Estimated price
    #[serde(default)]
    pub estimated_price: Money,
    /// First day of travel
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    /// Last day of travel
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    /// Free-form structured detail
    #[serde(default)]
    pub detail: serde_json::Value,
}

/// Load a live itinerary by code and lock its aggregate.
///
/// The itinerary is re-read after the lock is held so a concurrent soft
/// delete is observed.
pub(crate) async fn lock_itinerary<Tx: StoreTransaction>(
    tx: &mut Tx,
    code: &str,
) -> Result<Itinerary> {
    let not_found = || EngineError::ItineraryNotFound {
        code: code.to_string(),
    };
    let itinerary = tx.itinerary_by_code(code).await?.ok_or_else(not_found)?;
    tx.lock_aggregate(itinerary.id).await?;
    tx.itinerary_by_id(itinerary.id)
        .await?
        .filter(|locked| !locked.is_deleted())
        .ok_or_else(not_found)
}

/// Code of the customer owning an itinerary.
pub(crate) async fn owner_code<Tx: StoreTransaction>(
    tx: &mut Tx,
    itinerary: &Itinerary,
) -> Result<String> {
    tx.customer_by_id(itinerary.customer_id)
        .await?
        .map(|customer| customer.code)
        .ok_or_else(|| {
            EngineError::Internal(format!(
                "itinerary {} references missing customer {}",
                itinerary.code, itinerary.customer_id
            ))
        })
}

impl<S: OrderStore> Engine<S> {
    /// Create an itinerary for a customer.
    ///
    /// # Errors
    ///
    /// Returns `PayerNotFound` for an unknown customer, `NotPermitted` when a
    /// customer creates for someone else, or a validation error.
    pub async fn create_itinerary(
        &self,
        actor: &Actor,
        request: CreateItinerary,
    ) -> Result<Itinerary> {
        require_self_or_staff(actor, &request.customer_code)?;
        validate_date_range(request.start_date, request.end_date)?;
        if request.estimated_price.cents() < 0 {
            return Err(EngineError::InvalidAmount {
                cents: request.estimated_price.cents(),
            });
        }
        if request.title.trim().is_empty() {
            return Err(EngineError::InvalidInput("title must not be empty".into()));
        }

        let now = self.now();
        let code = self.env.codes.itinerary_code();
        let itinerary = self
            .transaction("create_itinerary", |mut tx| async move {
                let result: Result<_> = async {
                    let customer = tx
                        .customer_by_code(&request.customer_code)
                        .await?
                        .ok_or_else(|| EngineError::PayerNotFound {
                            code: request.customer_code.clone(),
                        })?;
                    let itinerary = tx
                        .insert_itinerary(NewItinerary {
                            code,
                            customer_id: customer.id,
                            title: request.title,
                            estimated_price: request.estimated_price,
                            start_date: request.start_date,
                            end_date: request.end_date,
                            detail: request.detail,
                            created_at: now,
                        })
                        .await?;
                    tx.record_activity(&activity(
                        actor,
                        &customer.code,
                        "itinerary.created",
                        &itinerary.code,
                        now,
                    ))
                    .await?;
                    Ok(itinerary)
                }
                .await;
                (tx, result)
            })
            .await?;

        tracing::info!(itinerary = %itinerary.code, actor = %actor.code, "Itinerary created");
        Ok(itinerary)
    }

    /// Apply a partial update to an itinerary.
    ///
    /// # Errors
    ///
    /// Returns `ItineraryNotFound`, `NotPermitted` for a customer editing
    /// someone else's itinerary, or a validation error.
    pub async fn update_itinerary(
        &self,
        actor: &Actor,
        code: &str,
        patch: ItineraryPatch,
    ) -> Result<Itinerary> {
        let now = self.now();
        let itinerary = self
            .transaction("update_itinerary", |mut tx| async move {
                let result: Result<_> = async {
                    let mut itinerary = lock_itinerary(&mut tx, code).await?;
                    let owner = owner_code(&mut tx, &itinerary).await?;
                    require_self_or_staff(actor, &owner)?;
                    if patch.is_empty() {
                        return Ok(itinerary);
                    }
                    patch.apply(&mut itinerary, now)?;
                    tx.update_itinerary(&itinerary).await?;
                    tx.record_activity(&activity(actor, &owner, "itinerary.updated", code, now))
                        .await?;
                    Ok(itinerary)
                }
                .await;
                (tx, result)
            })
            .await?;

        tracing::info!(itinerary = %code, actor = %actor.code, "Itinerary updated");
        Ok(itinerary)
    }

    /// Soft-delete an itinerary.
    ///
    /// # Errors
    ///
    /// Returns `ItineraryNotFound`, `NotPermitted`, or
    /// `ItineraryHasPendingOrder` while its order still awaits payment.
    pub async fn soft_delete_itinerary(&self, actor: &Actor, code: &str) -> Result<()> {
        let now = self.now();
        self.transaction("soft_delete_itinerary", |mut tx| async move {
            let result: Result<_> = async {
                let mut itinerary = lock_itinerary(&mut tx, code).await?;
                let owner = owner_code(&mut tx, &itinerary).await?;
                require_self_or_staff(actor, &owner)?;
                if let Some(order) = tx.order_by_itinerary(itinerary.id).await? {
                    if order.status == OrderStatus::Pending {
                        return Err(EngineError::ItineraryHasPendingOrder {
                            code: code.to_string(),
                        });
                    }
                }
                itinerary.deleted_at = Some(now);
                itinerary.updated_at = now;
                tx.update_itinerary(&itinerary).await?;
                tx.record_activity(&activity(actor, &owner, "itinerary.deleted", code, now))
                    .await?;
                Ok(())
            }
            .await;
            (tx, result)
        })
        .await?;

        tracing::info!(itinerary = %code, actor = %actor.code, "Itinerary soft-deleted");
        Ok(())
    }

    /// A live itinerary by code.
    ///
    /// # Errors
    ///
    /// Returns `ItineraryNotFound` for unknown or deleted itineraries.
    pub async fn itinerary(&self, code: &str) -> Result<Itinerary> {
        self.transaction("itinerary", |mut tx| async move {
            let result = tx
                .itinerary_by_code(code)
                .await
                .map_err(EngineError::from)
                .and_then(|found| {
                    found.ok_or_else(|| EngineError::ItineraryNotFound {
                        code: code.to_string(),
                    })
                });
            (tx, result)
        })
        .await
    }

    /// Consultant change log of an itinerary, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `ItineraryNotFound` for unknown or deleted itineraries.
    pub async fn itinerary_history(&self, code: &str) -> Result<Vec<ItineraryChange>> {
        self.transaction("itinerary_history", |mut tx| async move {
            let result: Result<_> = async {
                let itinerary = tx.itinerary_by_code(code).await?.ok_or_else(|| {
                    EngineError::ItineraryNotFound {
                        code: code.to_string(),
                    }
                })?;
                Ok(tx.itinerary_changes(itinerary.id).await?)
            }
            .await;
            (tx, result)
        })
        .await
    }
}
