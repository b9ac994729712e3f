//! Least-loaded consultant selection.
//!
//! Load is derived on demand as the number of `pending` orders per
//! consultant. The count is read without locks, so two concurrent placements
//! may both pick the same consultant; the resulting imbalance is bounded by
//! the number of concurrent placements and corrects itself on the next pick.

use tripdesk_core::assignment::pick_least_loaded;
use tripdesk_core::types::{CandidateFilter, Consultant, ConsultantId};
use tripdesk_core::{EngineError, OrderStore, Result, StoreTransaction};

use crate::engine::Engine;

/// Pick the least-loaded consultant admitted by `filter` inside `tx`.
///
/// Ties go to the lowest consultant id. The pick is share-locked and
/// re-checked; a candidate deactivated in the meantime is passed over.
///
/// # Errors
///
/// Returns [`EngineError::NoEligibleConsultant`] when no consultant passes
/// the filter, or a storage error.
pub(crate) async fn select_consultant<Tx: StoreTransaction>(
    tx: &mut Tx,
    filter: &CandidateFilter,
) -> Result<Consultant> {
    let mut loads = tx.consultant_loads(filter).await?;
    let candidates = loads.len();
    while let Some(chosen) = pick_least_loaded(&loads).cloned() {
        match tx.share_lock_consultant(chosen.consultant.id).await? {
            Some(locked) if filter.admits(&locked) => {
                tracing::debug!(
                    consultant = %locked.code,
                    pending_orders = chosen.pending_orders,
                    candidates,
                    "Selected least-loaded consultant"
                );
                return Ok(locked);
            }
            _ => {
                tracing::debug!(consultant = %chosen.consultant.code, "Candidate left the pool");
                loads.retain(|load| load.consultant.id != chosen.consultant.id);
            }
        }
    }
    Err(EngineError::NoEligibleConsultant)
}

/// Share-lock a consultant an order is about to be bound to.
///
/// Returns the committed row, or `None` when it no longer takes work.
pub(crate) async fn bind_consultant<Tx: StoreTransaction>(
    tx: &mut Tx,
    id: ConsultantId,
) -> Result<Option<Consultant>> {
    Ok(tx
        .share_lock_consultant(id)
        .await?
        .filter(Consultant::is_assignable))
}

impl<S: OrderStore> Engine<S> {
    /// Preview which consultant the next assignment would go to.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NoEligibleConsultant`] when nobody qualifies.
    pub async fn assign_least_loaded(&self, excluding: Vec<ConsultantId>) -> Result<Consultant> {
        let filter = self.candidate_filter(excluding)?;
        self.transaction("assign_least_loaded", |mut tx| async move {
            let result = select_consultant(&mut tx, &filter).await;
            (tx, result)
        })
        .await
    }
}
