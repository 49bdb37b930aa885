use crate::{
    db::{self, DbPool},
    entities::{
        appointment, customer, invoice, payment, vehicle, work_order, work_order_line_item,
    },
    errors::{DeleteGuards, ServiceError},
    events::{Event, EventSender},
    services::{
        count_grouped,
        customers::CustomerRef,
        validation::{ensure_unique, find_customer, has_active_work_orders, non_blank, required},
    },
};
use chrono::{Datelike, Utc};
use sea_orm::{
    sea_query::{Expr, Func},
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, LoaderTrait, QueryFilter, QueryOrder,
    Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

const VIN_TAKEN: &str = "A vehicle with this VIN already exists";
const DELETE_BLOCKED: &str = "Cannot delete vehicle with active work orders";
const EARLIEST_MODEL_YEAR: i32 = 1886;

#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct VehicleFilters {
    /// Matches make, model, VIN or license plate
    pub query: Option<String>,
    pub customer_id: Option<Uuid>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VehicleInput {
    pub make: Option<String>,
    pub model: Option<String>,
    pub year: Option<i32>,
    pub vin: Option<String>,
    pub customer_id: Option<Uuid>,
    pub license_plate: Option<String>,
    pub color: Option<String>,
    pub mileage: Option<i32>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VehicleRef {
    pub id: Uuid,
    pub make: String,
    pub model: String,
    pub year: i32,
    pub vin: String,
    pub license_plate: Option<String>,
}

impl From<&vehicle::Model> for VehicleRef {
    fn from(v: &vehicle::Model) -> Self {
        Self {
            id: v.id,
            make: v.make.clone(),
            model: v.model.clone(),
            year: v.year,
            vin: v.vin.clone(),
            license_plate: v.license_plate.clone(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VehicleCounts {
    pub work_orders: i64,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VehicleSummary {
    #[serde(flatten)]
    pub vehicle: vehicle::Model,
    pub display_name: String,
    pub customer: Option<CustomerRef>,
    #[serde(rename = "_count")]
    pub counts: VehicleCounts,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VehicleWorkOrder {
    #[serde(flatten)]
    pub work_order: work_order::Model,
    pub line_items: Vec<work_order_line_item::Model>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VehicleDetail {
    #[serde(flatten)]
    pub vehicle: vehicle::Model,
    pub display_name: String,
    pub customer: customer::Model,
    pub work_orders: Vec<VehicleWorkOrder>,
    pub appointments: Vec<appointment::Model>,
}

#[derive(Clone)]
pub struct VehicleService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
}

impl VehicleService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Arc<EventSender>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    /// Lists vehicles, most recently updated first.
    #[instrument(skip(self))]
    pub async fn list_vehicles(
        &self,
        filters: VehicleFilters,
    ) -> Result<Vec<VehicleSummary>, ServiceError> {
        let db = &*self.db_pool;
        let mut query = vehicle::Entity::find();

        if let Some(customer_id) = filters.customer_id {
            query = query.filter(vehicle::Column::CustomerId.eq(customer_id));
        }
        if let Some(term) = non_blank(filters.query) {
            let pattern = format!("%{}%", term.trim().to_lowercase());
            let mut any = Condition::any();
            for column in [
                vehicle::Column::Make,
                vehicle::Column::Model,
                vehicle::Column::Vin,
                vehicle::Column::LicensePlate,
            ] {
                any = any.add(Expr::expr(Func::lower(Expr::col(column))).like(pattern.as_str()));
            }
            query = query.filter(any);
        }

        let vehicles = query
            .order_by_desc(vehicle::Column::UpdatedAt)
            .all(db)
            .await?;
        let owners = vehicles.load_one(customer::Entity, db).await?;
        let ids: Vec<Uuid> = vehicles.iter().map(|v| v.id).collect();
        let work_order_counts = count_grouped::<work_order::Entity, _>(
            db,
            work_order::Column::VehicleId,
            work_order::Column::Id,
            &ids,
        )
        .await?;

        Ok(vehicles
            .into_iter()
            .zip(owners)
            .map(|(vehicle, owner)| VehicleSummary {
                display_name: vehicle.display_name(),
                customer: owner.as_ref().map(CustomerRef::from),
                counts: VehicleCounts {
                    work_orders: work_order_counts.get(&vehicle.id).copied().unwrap_or(0),
                },
                vehicle,
            })
            .collect())
    }

    #[instrument(skip(self))]
    pub async fn get_vehicle(&self, id: Uuid) -> Result<VehicleDetail, ServiceError> {
        let db = &*self.db_pool;
        let vehicle = vehicle::Entity::find_by_id(id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Vehicle"))?;
        let customer = find_customer(db, vehicle.customer_id).await?;

        let work_orders = work_order::Entity::find()
            .filter(work_order::Column::VehicleId.eq(id))
            .order_by_desc(work_order::Column::CreatedAt)
            .all(db)
            .await?;
        let lines = work_orders
            .load_many(
                work_order_line_item::Entity::find()
                    .order_by_asc(work_order_line_item::Column::Position),
                db,
            )
            .await?;
        let work_orders = work_orders
            .into_iter()
            .zip(lines)
            .map(|(work_order, line_items)| VehicleWorkOrder {
                work_order,
                line_items,
            })
            .collect();

        let appointments = appointment::Entity::find()
            .filter(appointment::Column::VehicleId.eq(id))
            .order_by_desc(appointment::Column::StartTime)
            .all(db)
            .await?;

        Ok(VehicleDetail {
            display_name: vehicle.display_name(),
            vehicle,
            customer,
            work_orders,
            appointments,
        })
    }

    #[instrument(skip(self, input))]
    pub async fn create_vehicle(&self, input: VehicleInput) -> Result<vehicle::Model, ServiceError> {
        let make = required("make", input.make)?;
        let model = required("model", input.model)?;
        let year = required("year", input.year)?;
        let vin = normalize_vin(&required("vin", input.vin)?);
        let customer_id = required("customerId", input.customer_id)?;
        check_year(year)?;
        check_mileage(input.mileage)?;

        let started = Instant::now();
        let txn = db::begin(&self.db_pool).await?;
        find_customer(&txn, customer_id).await?;
        ensure_unique::<vehicle::Entity, _>(
            &txn,
            vehicle::Column::Vin,
            &vin,
            vehicle::Column::Id,
            None,
            VIN_TAKEN,
        )
        .await?;

        let vehicle = vehicle::ActiveModel {
            id: Set(Uuid::new_v4()),
            customer_id: Set(customer_id),
            make: Set(make),
            model: Set(model),
            year: Set(year),
            vin: Set(vin),
            license_plate: Set(non_blank(input.license_plate)),
            color: Set(non_blank(input.color)),
            mileage: Set(input.mileage),
            notes: Set(non_blank(input.notes)),
            ..Default::default()
        }
        .insert(&txn)
        .await
        .map_err(|e| ServiceError::unique_violation_or_db(e, VIN_TAKEN))?;
        db::commit(txn, started).await?;

        info!(vehicle_id = %vehicle.id, vin = %vehicle.vin, "vehicle created");
        self.event_sender
            .publish([Event::VehicleCreated(vehicle.id)])
            .await;
        Ok(vehicle)
    }

    #[instrument(skip(self, input))]
    pub async fn update_vehicle(
        &self,
        id: Uuid,
        input: VehicleInput,
    ) -> Result<vehicle::Model, ServiceError> {
        if let Some(year) = input.year {
            check_year(year)?;
        }
        check_mileage(input.mileage)?;

        let started = Instant::now();
        let txn = db::begin(&self.db_pool).await?;
        let existing = vehicle::Entity::find_by_id(id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::not_found("Vehicle"))?;

        let mut active: vehicle::ActiveModel = existing.clone().into();
        if let Some(vin) = non_blank(input.vin) {
            let vin = normalize_vin(&vin);
            if vin != existing.vin {
                ensure_unique::<vehicle::Entity, _>(
                    &txn,
                    vehicle::Column::Vin,
                    &vin,
                    vehicle::Column::Id,
                    Some(id),
                    VIN_TAKEN,
                )
                .await?;
            }
            active.vin = Set(vin);
        }
        if let Some(customer_id) = input.customer_id {
            if customer_id != existing.customer_id {
                find_customer(&txn, customer_id).await?;
            }
            active.customer_id = Set(customer_id);
        }
        if let Some(make) = non_blank(input.make) {
            active.make = Set(make);
        }
        if let Some(model) = non_blank(input.model) {
            active.model = Set(model);
        }
        if let Some(year) = input.year {
            active.year = Set(year);
        }
        if let Some(license_plate) = input.license_plate {
            active.license_plate = Set(non_blank(Some(license_plate)));
        }
        if let Some(color) = input.color {
            active.color = Set(non_blank(Some(color)));
        }
        if let Some(mileage) = input.mileage {
            active.mileage = Set(Some(mileage));
        }
        if let Some(notes) = input.notes {
            active.notes = Set(non_blank(Some(notes)));
        }

        let vehicle = active
            .update(&txn)
            .await
            .map_err(|e| ServiceError::unique_violation_or_db(e, VIN_TAKEN))?;
        db::commit(txn, started).await?;

        self.event_sender
            .publish([Event::VehicleUpdated(vehicle.id)])
            .await;
        Ok(vehicle)
    }

    #[instrument(skip(self))]
    pub async fn delete_vehicle(&self, id: Uuid) -> Result<(), ServiceError> {
        let started = Instant::now();
        let txn = db::begin(&self.db_pool).await?;
        vehicle::Entity::find_by_id(id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::not_found("Vehicle"))?;

        if has_active_work_orders(
            &txn,
            Condition::all().add(work_order::Column::VehicleId.eq(id)),
        )
        .await?
        {
            return Err(ServiceError::DeleteBlocked {
                message: DELETE_BLOCKED.to_string(),
                guards: DeleteGuards {
                    has_active_work_orders: Some(true),
                    has_unpaid_invoices: None,
                },
            });
        }

        // Closed work orders and their invoices go with the vehicle.
        let work_order_ids: Vec<Uuid> = work_order::Entity::find()
            .filter(work_order::Column::VehicleId.eq(id))
            .all(&txn)
            .await?
            .into_iter()
            .map(|w| w.id)
            .collect();
        if !work_order_ids.is_empty() {
            let invoice_ids: Vec<Uuid> = invoice::Entity::find()
                .filter(invoice::Column::WorkOrderId.is_in(work_order_ids.clone()))
                .all(&txn)
                .await?
                .into_iter()
                .map(|i| i.id)
                .collect();
            payment::Entity::delete_many()
                .filter(payment::Column::InvoiceId.is_in(invoice_ids.clone()))
                .exec(&txn)
                .await?;
            invoice::Entity::delete_many()
                .filter(invoice::Column::Id.is_in(invoice_ids))
                .exec(&txn)
                .await?;
            work_order_line_item::Entity::delete_many()
                .filter(work_order_line_item::Column::WorkOrderId.is_in(work_order_ids.clone()))
                .exec(&txn)
                .await?;
            work_order::Entity::delete_many()
                .filter(work_order::Column::Id.is_in(work_order_ids))
                .exec(&txn)
                .await?;
        }
        appointment::Entity::delete_many()
            .filter(appointment::Column::VehicleId.eq(id))
            .exec(&txn)
            .await?;
        vehicle::Entity::delete_by_id(id).exec(&txn).await?;
        db::commit(txn, started).await?;

        info!(vehicle_id = %id, "vehicle deleted");
        self.event_sender.publish([Event::VehicleDeleted(id)]).await;
        Ok(())
    }
}

fn normalize_vin(vin: &str) -> String {
    vin.trim().to_uppercase()
}

fn check_year(year: i32) -> Result<(), ServiceError> {
    let latest = Utc::now().year() + 2;
    if !(EARLIEST_MODEL_YEAR..=latest).contains(&year) {
        return Err(ServiceError::ValidationError(format!(
            "year must be between {} and {}",
            EARLIEST_MODEL_YEAR, latest
        )));
    }
    Ok(())
}

fn check_mileage(mileage: Option<i32>) -> Result<(), ServiceError> {
    if mileage.is_some_and(|m| m < 0) {
        return Err(ServiceError::ValidationError(
            "mileage must not be negative".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vins_are_trimmed_and_uppercased() {
        assert_eq!(normalize_vin(" 1hgcm82633a004352 "), "1HGCM82633A004352");
    }

    #[test]
    fn model_year_bounds() {
        assert!(check_year(2019).is_ok());
        assert!(check_year(1700).is_err());
        assert!(check_year(Utc::now().year() + 10).is_err());
    }

    #[test]
    fn negative_mileage_is_rejected() {
        assert!(check_mileage(Some(-1)).is_err());
        assert!(check_mileage(None).is_ok());
        assert!(check_mileage(Some(120_000)).is_ok());
    }
}
