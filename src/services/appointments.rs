use crate::{
    db::DbPool,
    entities::{appointment, customer, vehicle, AppointmentStatus},
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        customers::CustomerRef,
        validation::{find_customer, find_customer_vehicle, non_blank, required},
        vehicles::VehicleRef,
    },
};
use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, LoaderTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct AppointmentFilters {
    pub customer_id: Option<Uuid>,
    pub vehicle_id: Option<Uuid>,
    #[param(value_type = Option<String>)]
    pub status: Option<AppointmentStatus>,
    /// Calendar day, `YYYY-MM-DD`
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentInput {
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub customer_id: Option<Uuid>,
    pub vehicle_id: Option<Uuid>,
    pub status: Option<AppointmentStatus>,
    pub notes: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentSummary {
    #[serde(flatten)]
    pub appointment: appointment::Model,
    pub customer: Option<CustomerRef>,
    pub vehicle: Option<VehicleRef>,
}

fn check_window(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<(), ServiceError> {
    if end <= start {
        return Err(ServiceError::ValidationError(
            "endTime must be after startTime".to_string(),
        ));
    }
    Ok(())
}

/// Pairs each appointment with its customer and vehicle.
pub(crate) async fn summarize<C: ConnectionTrait>(
    db: &C,
    appointments: Vec<appointment::Model>,
) -> Result<Vec<AppointmentSummary>, ServiceError> {
    let customers = appointments.load_one(customer::Entity, db).await?;
    let vehicles = appointments.load_one(vehicle::Entity, db).await?;

    Ok(appointments
        .into_iter()
        .zip(customers)
        .zip(vehicles)
        .map(|((appointment, customer), vehicle)| AppointmentSummary {
            appointment,
            customer: customer.as_ref().map(CustomerRef::from),
            vehicle: vehicle.as_ref().map(VehicleRef::from),
        })
        .collect())
}

#[derive(Clone)]
pub struct AppointmentService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
}

impl AppointmentService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Arc<EventSender>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    /// Lists appointments in start order.
    #[instrument(skip(self))]
    pub async fn list_appointments(
        &self,
        filters: AppointmentFilters,
    ) -> Result<Vec<AppointmentSummary>, ServiceError> {
        let db = &*self.db_pool;
        let mut query = appointment::Entity::find();
        if let Some(customer_id) = filters.customer_id {
            query = query.filter(appointment::Column::CustomerId.eq(customer_id));
        }
        if let Some(vehicle_id) = filters.vehicle_id {
            query = query.filter(appointment::Column::VehicleId.eq(vehicle_id));
        }
        if let Some(status) = filters.status {
            query = query.filter(appointment::Column::Status.eq(status));
        }
        if let Some(date) = filters.date {
            query = query.filter(appointment::Column::Date.eq(date));
        }

        let appointments = query
            .order_by_asc(appointment::Column::StartTime)
            .all(db)
            .await?;
        summarize(db, appointments).await
    }

    #[instrument(skip(self))]
    pub async fn get_appointment(&self, id: Uuid) -> Result<AppointmentSummary, ServiceError> {
        let db = &*self.db_pool;
        let appointment = find_appointment(db, id).await?;
        let customer = customer::Entity::find_by_id(appointment.customer_id)
            .one(db)
            .await?;
        let vehicle = vehicle::Entity::find_by_id(appointment.vehicle_id)
            .one(db)
            .await?;
        Ok(AppointmentSummary {
            customer: customer.as_ref().map(CustomerRef::from),
            vehicle: vehicle.as_ref().map(VehicleRef::from),
            appointment,
        })
    }

    #[instrument(skip(self, input))]
    pub async fn create_appointment(
        &self,
        input: AppointmentInput,
    ) -> Result<AppointmentSummary, ServiceError> {
        let start_time = required("startTime", input.start_time)?;
        let end_time = required("endTime", input.end_time)?;
        let customer_id = required("customerId", input.customer_id)?;
        let vehicle_id = required("vehicleId", input.vehicle_id)?;
        check_window(start_time, end_time)?;

        let db = &*self.db_pool;
        find_customer(db, customer_id).await?;
        find_customer_vehicle(db, vehicle_id, customer_id).await?;

        let appointment = appointment::ActiveModel {
            id: Set(Uuid::new_v4()),
            start_time: Set(start_time),
            end_time: Set(end_time),
            status: Set(input.status.unwrap_or(AppointmentStatus::Scheduled)),
            notes: Set(non_blank(input.notes)),
            customer_id: Set(customer_id),
            vehicle_id: Set(vehicle_id),
            ..Default::default()
        }
        .insert(db)
        .await?;

        info!(appointment_id = %appointment.id, %customer_id, %vehicle_id, "appointment scheduled");
        self.event_sender
            .publish([Event::AppointmentScheduled(appointment.id)])
            .await;
        self.get_appointment(appointment.id).await
    }

    #[instrument(skip(self, input))]
    pub async fn update_appointment(
        &self,
        id: Uuid,
        input: AppointmentInput,
    ) -> Result<AppointmentSummary, ServiceError> {
        let db = &*self.db_pool;
        let existing = find_appointment(db, id).await?;

        let start_time = input.start_time.unwrap_or(existing.start_time);
        let end_time = input.end_time.unwrap_or(existing.end_time);
        check_window(start_time, end_time)?;

        let customer_id = input.customer_id.unwrap_or(existing.customer_id);
        let vehicle_id = input.vehicle_id.unwrap_or(existing.vehicle_id);
        if customer_id != existing.customer_id || vehicle_id != existing.vehicle_id {
            find_customer(db, customer_id).await?;
            find_customer_vehicle(db, vehicle_id, customer_id).await?;
        }

        let mut active: appointment::ActiveModel = existing.into();
        active.start_time = Set(start_time);
        active.end_time = Set(end_time);
        active.customer_id = Set(customer_id);
        active.vehicle_id = Set(vehicle_id);
        if let Some(status) = input.status {
            active.status = Set(status);
        }
        if let Some(notes) = input.notes {
            active.notes = Set(non_blank(Some(notes)));
        }
        active.update(db).await?;

        info!(appointment_id = %id, "appointment updated");
        self.event_sender
            .publish([Event::AppointmentUpdated(id)])
            .await;
        self.get_appointment(id).await
    }

    #[instrument(skip(self))]
    pub async fn delete_appointment(&self, id: Uuid) -> Result<(), ServiceError> {
        let db = &*self.db_pool;
        find_appointment(db, id).await?;
        appointment::Entity::delete_by_id(id).exec(db).await?;

        info!(appointment_id = %id, "appointment deleted");
        self.event_sender
            .publish([Event::AppointmentDeleted(id)])
            .await;
        Ok(())
    }
}

async fn find_appointment(db: &DbPool, id: Uuid) -> Result<appointment::Model, ServiceError> {
    appointment::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| ServiceError::not_found("Appointment"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn end_must_follow_start() {
        let start = Utc::now();
        assert!(check_window(start, start + Duration::minutes(30)).is_ok());
        assert!(check_window(start, start).is_err());
        assert!(check_window(start, start - Duration::minutes(1)).is_err());
    }
}
