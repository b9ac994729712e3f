//! Row decoding.
//!
//! Column lists are macros so they can be spliced into static SQL with
//! `concat!`.

use sqlx::postgres::PgRow;
use sqlx::{Postgres, Row};
use tripdesk_core::StoreError;
use tripdesk_core::error::StoreResult;
use tripdesk_core::types::{
    ChangeReason, Consultant, ConsultantId, ConsultantLoad, Customer, CustomerId, Itinerary,
    ItineraryChange, ItineraryChangeId, ItineraryId, Money, Order, OrderId, OrderPayment,
    OrderStatus, OrderType, PaymentId, PaymentStatus, Role,
};

macro_rules! itinerary_columns {
    () => {
        "id, code, customer_id, title, estimated_price, start_date, end_date, detail, \
         created_at, updated_at, deleted_at"
    };
}

macro_rules! customer_columns {
    () => {
        "id, code, name, email"
    };
}

macro_rules! consultant_columns {
    () => {
        "id, code, name, email, role, active, last_seen_at"
    };
}

macro_rules! order_columns {
    () => {
        "id, code, itinerary_id, payer_id, consultant_id, total_price, order_type, status, \
         created_at, updated_at"
    };
}

macro_rules! payment_columns {
    () => {
        "id, order_id, payment_type, amount, status, payment_url, expired_at, raw_payload, \
         created_at, updated_at"
    };
}

macro_rules! change_columns {
    () => {
        "id, itinerary_id, previous_consultant_id, new_consultant_id, reason, created_at"
    };
}

pub(crate) use {
    change_columns, consultant_columns, customer_columns, itinerary_columns, order_columns,
    payment_columns,
};

fn get<'r, T>(row: &'r PgRow, column: &str) -> StoreResult<T>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(column)
        .map_err(|e| StoreError::Corrupt(format!("column {column}: {e}")))
}

fn parse<T>(row: &PgRow, column: &str, parse: fn(&str) -> Option<T>) -> StoreResult<T> {
    let raw: String = get(row, column)?;
    parse(&raw).ok_or_else(|| StoreError::Corrupt(format!("column {column}: unknown value {raw}")))
}

pub(crate) fn itinerary(row: &PgRow) -> StoreResult<Itinerary> {
    Ok(Itinerary {
        id: ItineraryId::new(get(row, "id")?),
        code: get(row, "code")?,
        customer_id: CustomerId::new(get(row, "customer_id")?),
        title: get(row, "title")?,
        estimated_price: Money::from_cents(get(row, "estimated_price")?),
        start_date: get(row, "start_date")?,
        end_date: get(row, "end_date")?,
        detail: get(row, "detail")?,
        created_at: get(row, "created_at")?,
        updated_at: get(row, "updated_at")?,
        deleted_at: get(row, "deleted_at")?,
    })
}

pub(crate) fn customer(row: &PgRow) -> StoreResult<Customer> {
    Ok(Customer {
        id: CustomerId::new(get(row, "id")?),
        code: get(row, "code")?,
        name: get(row, "name")?,
        email: get(row, "email")?,
    })
}

pub(crate) fn consultant(row: &PgRow) -> StoreResult<Consultant> {
    Ok(Consultant {
        id: ConsultantId::new(get(row, "id")?),
        code: get(row, "code")?,
        name: get(row, "name")?,
        email: get(row, "email")?,
        role: parse(row, "role", Role::parse)?,
        active: get(row, "active")?,
        last_seen_at: get(row, "last_seen_at")?,
    })
}

pub(crate) fn consultant_load(row: &PgRow) -> StoreResult<ConsultantLoad> {
    let count: i64 = get(row, "pending_orders")?;
    Ok(ConsultantLoad {
        consultant: consultant(row)?,
        pending_orders: u64::try_from(count)
            .map_err(|_| StoreError::Corrupt(format!("negative pending count {count}")))?,
    })
}

pub(crate) fn order(row: &PgRow) -> StoreResult<Order> {
    Ok(Order {
        id: OrderId::new(get(row, "id")?),
        code: get(row, "code")?,
        itinerary_id: ItineraryId::new(get(row, "itinerary_id")?),
        payer_id: CustomerId::new(get(row, "payer_id")?),
        consultant_id: ConsultantId::new(get(row, "consultant_id")?),
        total_price: Money::from_cents(get(row, "total_price")?),
        order_type: parse(row, "order_type", OrderType::parse)?,
        status: parse(row, "status", OrderStatus::parse)?,
        created_at: get(row, "created_at")?,
        updated_at: get(row, "updated_at")?,
    })
}

pub(crate) fn payment(row: &PgRow) -> StoreResult<OrderPayment> {
    Ok(OrderPayment {
        id: PaymentId::new(get(row, "id")?),
        order_id: OrderId::new(get(row, "order_id")?),
        payment_type: get(row, "payment_type")?,
        amount: Money::from_cents(get(row, "amount")?),
        status: parse(row, "status", PaymentStatus::parse)?,
        payment_url: get(row, "payment_url")?,
        expired_at: get(row, "expired_at")?,
        raw_payload: get(row, "raw_payload")?,
        created_at: get(row, "created_at")?,
        updated_at: get(row, "updated_at")?,
    })
}

pub(crate) fn change(row: &PgRow) -> StoreResult<ItineraryChange> {
    let previous: Option<i64> = get(row, "previous_consultant_id")?;
    Ok(ItineraryChange {
        id: ItineraryChangeId::new(get(row, "id")?),
        itinerary_id: ItineraryId::new(get(row, "itinerary_id")?),
        previous_consultant_id: previous.map(ConsultantId::new),
        new_consultant_id: ConsultantId::new(get(row, "new_consultant_id")?),
        reason: parse(row, "reason", ChangeReason::parse)?,
        created_at: get(row, "created_at")?,
    })
}
