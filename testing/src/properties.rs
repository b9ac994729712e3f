//! proptest strategies for domain types.

use proptest::collection::vec;
use proptest::prelude::*;
use tripdesk_core::status_map::GatewayReport;
use tripdesk_core::types::{Consultant, ConsultantId, ConsultantLoad, Money, Role};

/// Strictly positive amounts up to one million in major units.
pub fn positive_money() -> impl Strategy<Value = Money> {
    (1_i64..=100_000_000).prop_map(Money::from_cents)
}

/// Gateway reports drawn from the real vocabulary plus some noise.
pub fn gateway_report() -> impl Strategy<Value = GatewayReport> {
    let payment_type = prop_oneof![
        Just("credit_card"),
        Just("bank_transfer"),
        Just("gopay"),
        Just("qris"),
    ];
    let transaction_status = prop_oneof![
        Just("capture"),
        Just("settlement"),
        Just("pending"),
        Just("deny"),
        Just("expire"),
        Just("cancel"),
        Just("authorize"),
    ];
    let fraud_status = prop_oneof![Just(""), Just("accept"), Just("challenge"), Just("deny")];

    (payment_type, transaction_status, fraud_status)
        .prop_map(|(pt, ts, fs)| GatewayReport::new(pt, ts, fs))
}

/// Non-empty candidate lists with distinct ids and arbitrary loads.
pub fn consultant_loads() -> impl Strategy<Value = Vec<ConsultantLoad>> {
    vec(0_u64..20, 1..12).prop_map(|loads| {
        loads
            .into_iter()
            .zip(1_i64..)
            .map(|(pending_orders, id)| ConsultantLoad {
                consultant: Consultant {
                    id: ConsultantId::new(id),
                    code: format!("TC-{id}"),
                    name: format!("Consultant {id}"),
                    email: format!("tc-{id}@staff.test"),
                    role: Role::Tc,
                    active: true,
                    last_seen_at: None,
                },
                pending_orders,
            })
            .collect()
    })
}
