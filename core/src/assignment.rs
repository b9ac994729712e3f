//! Least-loaded consultant selection.
//!
//! Pure decision used by the scheduler once the candidate set and workloads
//! have been read: minimum pending-order count, ties broken by the lowest
//! consultant id. The tie-break is stable, not fair.

use crate::types::ConsultantLoad;

/// Pick the candidate with the fewest pending orders.
///
/// Returns `None` when there are no candidates.
///
/// # Example
///
/// ```
/// use tripdesk_core::assignment::pick_least_loaded;
///
/// assert!(pick_least_loaded(&[]).is_none());
/// ```
#[must_use]
pub fn pick_least_loaded(candidates: &[ConsultantLoad]) -> Option<&ConsultantLoad> {
    candidates
        .iter()
        .min_by_key(|load| (load.pending_orders, load.consultant.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Consultant, ConsultantId, Role};
    use proptest::prelude::*;

    fn load(id: i64, pending_orders: u64) -> ConsultantLoad {
        ConsultantLoad {
            consultant: Consultant {
                id: ConsultantId::new(id),
                code: format!("TC-{id}"),
                name: format!("Consultant {id}"),
                email: format!("tc{id}@example.com"),
                role: Role::Tc,
                active: true,
                last_seen_at: None,
            },
            pending_orders,
        }
    }

    #[test]
    fn picks_minimum_with_lowest_id_on_tie() {
        let loads: Vec<_> = [3, 1, 4, 1, 5]
            .into_iter()
            .enumerate()
            .map(|(i, count)| load(i as i64 + 1, count))
            .collect();

        let chosen = pick_least_loaded(&loads).map(|l| l.consultant.id);
        assert_eq!(chosen, Some(ConsultantId::new(2)));
    }

    #[test]
    fn input_order_does_not_matter() {
        let loads = vec![load(9, 0), load(4, 0), load(6, 2)];
        let chosen = pick_least_loaded(&loads).map(|l| l.consultant.id);
        assert_eq!(chosen, Some(ConsultantId::new(4)));
    }

    proptest! {
        #[test]
        fn chosen_has_minimum_count_and_lowest_id(counts in prop::collection::vec(0u64..20, 1..30)) {
            let loads: Vec<_> = counts
                .iter()
                .enumerate()
                .map(|(i, &count)| load(i as i64 + 1, count))
                .collect();

            let Some(chosen) = pick_least_loaded(&loads) else {
                return Err(TestCaseError::fail("no consultant picked from a non-empty set"));
            };

            let min = counts.iter().copied().min().unwrap_or_default();
            prop_assert_eq!(chosen.pending_orders, min);
            for other in &loads {
                if other.pending_orders == min {
                    prop_assert!(chosen.consultant.id <= other.consultant.id);
                }
            }
        }
    }
}
