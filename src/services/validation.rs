//! Cross-entity checks shared by the services: required fields, uniqueness,
//! ownership and the delete guards.

use crate::entities::{
    customer, invoice, technician, vehicle, work_order, InvoiceStatus, WorkOrderStatus,
};
use crate::errors::ServiceError;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ColumnTrait, Condition, ConnectionTrait, EntityTrait, QueryFilter, QuerySelect,
};
use uuid::Uuid;

pub const VEHICLE_OWNERSHIP_MESSAGE: &str =
    "Vehicle not found or does not belong to this customer";

/// Values that can be present yet still count as missing.
pub trait Blank {
    fn is_blank(&self) -> bool {
        false
    }
}

impl Blank for String {
    fn is_blank(&self) -> bool {
        self.trim().is_empty()
    }
}

impl Blank for Uuid {}
impl Blank for i32 {}
impl Blank for Decimal {}
impl Blank for DateTime<Utc> {}
impl Blank for NaiveDate {}

/// Unwraps a required request field, failing with `"<field> is required"`.
/// Callers check fields in declaration order so the first missing one is
/// the one reported.
pub fn required<T: Blank>(field: &str, value: Option<T>) -> Result<T, ServiceError> {
    match value {
        Some(v) if !v.is_blank() => Ok(v),
        _ => Err(ServiceError::ValidationError(format!("{} is required", field))),
    }
}

/// Treats an empty or whitespace-only optional string as absent.
pub fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Fails with `message` when another row of `E` already has `value` in
/// `column`. `exclude` skips the row being updated.
pub async fn ensure_unique<E, C>(
    db: &C,
    column: E::Column,
    value: &str,
    id_column: E::Column,
    exclude: Option<Uuid>,
    message: &str,
) -> Result<(), ServiceError>
where
    E: EntityTrait,
    C: ConnectionTrait,
{
    let mut query = E::find().filter(column.eq(value));
    if let Some(id) = exclude {
        query = query.filter(id_column.ne(id));
    }
    let existing = query.limit(1).one(db).await?;
    if existing.is_some() {
        return Err(ServiceError::ValidationError(message.to_string()));
    }
    Ok(())
}

pub async fn find_customer<C: ConnectionTrait>(
    db: &C,
    customer_id: Uuid,
) -> Result<customer::Model, ServiceError> {
    customer::Entity::find_by_id(customer_id)
        .one(db)
        .await?
        .ok_or_else(|| ServiceError::not_found("Customer"))
}

/// Loads a vehicle only if it belongs to `customer_id`.
pub async fn find_customer_vehicle<C: ConnectionTrait>(
    db: &C,
    vehicle_id: Uuid,
    customer_id: Uuid,
) -> Result<vehicle::Model, ServiceError> {
    vehicle::Entity::find_by_id(vehicle_id)
        .filter(vehicle::Column::CustomerId.eq(customer_id))
        .one(db)
        .await?
        .ok_or_else(|| ServiceError::NotFound(VEHICLE_OWNERSHIP_MESSAGE.to_string()))
}

pub async fn find_technician<C: ConnectionTrait>(
    db: &C,
    technician_id: Uuid,
) -> Result<technician::Model, ServiceError> {
    technician::Entity::find_by_id(technician_id)
        .one(db)
        .await?
        .ok_or_else(|| ServiceError::not_found("Technician"))
}

/// Whether any work order matching `scope` is still open.
pub async fn has_active_work_orders<C: ConnectionTrait>(
    db: &C,
    scope: Condition,
) -> Result<bool, ServiceError> {
    let found = work_order::Entity::find()
        .filter(scope)
        .filter(work_order::Column::Status.is_not_in(WorkOrderStatus::INACTIVE))
        .limit(1)
        .one(db)
        .await?;
    Ok(found.is_some())
}

pub async fn has_unpaid_invoices<C: ConnectionTrait>(
    db: &C,
    customer_id: Uuid,
) -> Result<bool, ServiceError> {
    let found = invoice::Entity::find()
        .filter(invoice::Column::CustomerId.eq(customer_id))
        .filter(invoice::Column::Status.is_not_in(InvoiceStatus::SETTLED))
        .limit(1)
        .one(db)
        .await?;
    Ok(found.is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn required_reports_the_field_name() {
        let err = required::<String>("firstName", None).unwrap_err();
        assert_matches!(err, ServiceError::ValidationError(msg) if msg == "firstName is required");
    }

    #[test]
    fn whitespace_counts_as_missing() {
        assert!(required("email", Some("   ".to_string())).is_err());
        assert_eq!(required("email", Some("a@b.co".to_string())).unwrap(), "a@b.co");
    }

    #[test]
    fn first_missing_field_wins() {
        let check = || -> Result<(), ServiceError> {
            required("description", Some("Brakes".to_string()))?;
            required::<DateTime<Utc>>("startDate", None)?;
            required::<Uuid>("customerId", None)?;
            Ok(())
        };
        assert_matches!(check(), Err(ServiceError::ValidationError(msg)) if msg == "startDate is required");
    }

    #[test]
    fn non_blank_drops_empty_strings() {
        assert_eq!(non_blank(Some(" ".into())), None);
        assert_eq!(non_blank(Some("x".into())), Some("x".into()));
        assert_eq!(non_blank(None), None);
    }
}
