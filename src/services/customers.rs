use crate::{
    db::{self, DbPool},
    entities::{
        appointment, customer, invoice, payment, vehicle, work_order, work_order_line_item,
    },
    errors::{DeleteGuards, ServiceError},
    events::{Event, EventSender},
    services::{
        count_grouped,
        validation::{
            ensure_unique, has_active_work_orders, has_unpaid_invoices, non_blank, required,
        },
    },
};
use sea_orm::{
    sea_query::{Expr, Func},
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, LoaderTrait, QueryFilter, QueryOrder,
    Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

const EMAIL_TAKEN: &str = "A customer with this email already exists";
const DELETE_BLOCKED: &str = "Cannot delete customer with active work orders or unpaid invoices";

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CustomerFilters {
    /// Matches first name, last name, email or phone
    pub query: Option<String>,
}

/// Body for both create and update. On create the name, email and phone
/// fields are required.
#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CustomerInput {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    #[validate(email(message = "email must be a valid email address"))]
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<String>,
}

/// Short customer reference embedded in other resources.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CustomerRef {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
}

impl From<&customer::Model> for CustomerRef {
    fn from(c: &customer::Model) -> Self {
        Self {
            id: c.id,
            first_name: c.first_name.clone(),
            last_name: c.last_name.clone(),
            email: c.email.clone(),
            phone: c.phone.clone(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CustomerCounts {
    pub vehicles: i64,
    pub work_orders: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CustomerSummary {
    #[serde(flatten)]
    pub customer: customer::Model,
    #[serde(rename = "_count")]
    pub counts: CustomerCounts,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CustomerWorkOrder {
    #[serde(flatten)]
    pub work_order: work_order::Model,
    pub vehicle: Option<vehicle::Model>,
    pub line_items: Vec<work_order_line_item::Model>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CustomerAppointment {
    #[serde(flatten)]
    pub appointment: appointment::Model,
    pub vehicle: Option<vehicle::Model>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CustomerInvoice {
    #[serde(flatten)]
    pub invoice: invoice::Model,
    pub work_order: Option<work_order::Model>,
    pub payments: Vec<payment::Model>,
}

/// A customer with everything hanging off it, newest first.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CustomerDetail {
    #[serde(flatten)]
    pub customer: customer::Model,
    pub vehicles: Vec<vehicle::Model>,
    pub work_orders: Vec<CustomerWorkOrder>,
    pub appointments: Vec<CustomerAppointment>,
    pub invoices: Vec<CustomerInvoice>,
}

/// Service for managing customers
#[derive(Clone)]
pub struct CustomerService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
}

impl CustomerService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Arc<EventSender>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    /// Lists customers by last name with vehicle and work-order counts.
    #[instrument(skip(self))]
    pub async fn list_customers(
        &self,
        filters: CustomerFilters,
    ) -> Result<Vec<CustomerSummary>, ServiceError> {
        let db = &*self.db_pool;
        let mut query = customer::Entity::find();

        if let Some(term) = non_blank(filters.query) {
            let pattern = format!("%{}%", term.trim().to_lowercase());
            let mut any = Condition::any();
            for column in [
                customer::Column::FirstName,
                customer::Column::LastName,
                customer::Column::Email,
                customer::Column::Phone,
            ] {
                any = any.add(Expr::expr(Func::lower(Expr::col(column))).like(pattern.as_str()));
            }
            query = query.filter(any);
        }

        let customers = query
            .order_by_asc(customer::Column::LastName)
            .order_by_asc(customer::Column::FirstName)
            .all(db)
            .await?;

        let ids: Vec<Uuid> = customers.iter().map(|c| c.id).collect();
        let vehicle_counts = count_grouped::<vehicle::Entity, _>(
            db,
            vehicle::Column::CustomerId,
            vehicle::Column::Id,
            &ids,
        )
        .await?;
        let work_order_counts = count_grouped::<work_order::Entity, _>(
            db,
            work_order::Column::CustomerId,
            work_order::Column::Id,
            &ids,
        )
        .await?;

        Ok(customers
            .into_iter()
            .map(|customer| CustomerSummary {
                counts: CustomerCounts {
                    vehicles: vehicle_counts.get(&customer.id).copied().unwrap_or(0),
                    work_orders: work_order_counts.get(&customer.id).copied().unwrap_or(0),
                },
                customer,
            })
            .collect())
    }

    #[instrument(skip(self))]
    pub async fn get_customer(&self, id: Uuid) -> Result<CustomerDetail, ServiceError> {
        let db = &*self.db_pool;
        let customer = customer::Entity::find_by_id(id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Customer"))?;

        let vehicles = vehicle::Entity::find()
            .filter(vehicle::Column::CustomerId.eq(id))
            .order_by_desc(vehicle::Column::UpdatedAt)
            .all(db)
            .await?;

        let work_orders = work_order::Entity::find()
            .filter(work_order::Column::CustomerId.eq(id))
            .order_by_desc(work_order::Column::CreatedAt)
            .all(db)
            .await?;
        let work_order_vehicles = work_orders.load_one(vehicle::Entity, db).await?;
        let work_order_lines = work_orders
            .load_many(
                work_order_line_item::Entity::find()
                    .order_by_asc(work_order_line_item::Column::Position),
                db,
            )
            .await?;
        let work_orders = work_orders
            .into_iter()
            .zip(work_order_vehicles)
            .zip(work_order_lines)
            .map(|((work_order, vehicle), line_items)| CustomerWorkOrder {
                work_order,
                vehicle,
                line_items,
            })
            .collect();

        let appointments = appointment::Entity::find()
            .filter(appointment::Column::CustomerId.eq(id))
            .order_by_desc(appointment::Column::StartTime)
            .all(db)
            .await?;
        let appointment_vehicles = appointments.load_one(vehicle::Entity, db).await?;
        let appointments = appointments
            .into_iter()
            .zip(appointment_vehicles)
            .map(|(appointment, vehicle)| CustomerAppointment {
                appointment,
                vehicle,
            })
            .collect();

        let invoices = invoice::Entity::find()
            .filter(invoice::Column::CustomerId.eq(id))
            .order_by_desc(invoice::Column::Date)
            .all(db)
            .await?;
        let invoice_work_orders = invoices.load_one(work_order::Entity, db).await?;
        let invoice_payments = invoices.load_many(payment::Entity, db).await?;
        let invoices = invoices
            .into_iter()
            .zip(invoice_work_orders)
            .zip(invoice_payments)
            .map(|((invoice, work_order), payments)| CustomerInvoice {
                invoice,
                work_order,
                payments,
            })
            .collect();

        Ok(CustomerDetail {
            customer,
            vehicles,
            work_orders,
            appointments,
            invoices,
        })
    }

    #[instrument(skip(self, input))]
    pub async fn create_customer(
        &self,
        input: CustomerInput,
    ) -> Result<customer::Model, ServiceError> {
        let first_name = required("firstName", input.first_name.clone())?;
        let last_name = required("lastName", input.last_name.clone())?;
        let email = required("email", input.email.clone())?.trim().to_string();
        let phone = required("phone", input.phone.clone())?;
        input.validate()?;

        let model = customer::ActiveModel {
            id: Set(Uuid::new_v4()),
            first_name: Set(first_name),
            last_name: Set(last_name),
            email: Set(email.clone()),
            phone: Set(phone),
            address: Set(non_blank(input.address)),
            city: Set(non_blank(input.city)),
            state: Set(non_blank(input.state)),
            zip_code: Set(non_blank(input.zip_code)),
            ..Default::default()
        };

        let customer = self
            .db_pool
            .transaction::<_, customer::Model, ServiceError>(move |txn| {
                Box::pin(async move {
                    ensure_unique::<customer::Entity, _>(
                        txn,
                        customer::Column::Email,
                        &email,
                        customer::Column::Id,
                        None,
                        EMAIL_TAKEN,
                    )
                    .await?;
                    model
                        .insert(txn)
                        .await
                        .map_err(|e| ServiceError::unique_violation_or_db(e, EMAIL_TAKEN))
                })
            })
            .await?;

        info!(customer_id = %customer.id, "customer created");
        self.event_sender
            .publish([Event::CustomerCreated(customer.id)])
            .await;
        Ok(customer)
    }

    #[instrument(skip(self, input))]
    pub async fn update_customer(
        &self,
        id: Uuid,
        input: CustomerInput,
    ) -> Result<customer::Model, ServiceError> {
        input.validate()?;

        let customer = self
            .db_pool
            .transaction::<_, customer::Model, ServiceError>(move |txn| {
                Box::pin(async move {
                    let existing = customer::Entity::find_by_id(id)
                        .one(txn)
                        .await?
                        .ok_or_else(|| ServiceError::not_found("Customer"))?;

                    let mut active: customer::ActiveModel = existing.clone().into();
                    if let Some(email) = non_blank(input.email) {
                        let email = email.trim().to_string();
                        if email != existing.email {
                            ensure_unique::<customer::Entity, _>(
                                txn,
                                customer::Column::Email,
                                &email,
                                customer::Column::Id,
                                Some(id),
                                EMAIL_TAKEN,
                            )
                            .await?;
                        }
                        active.email = Set(email);
                    }
                    if let Some(first_name) = non_blank(input.first_name) {
                        active.first_name = Set(first_name);
                    }
                    if let Some(last_name) = non_blank(input.last_name) {
                        active.last_name = Set(last_name);
                    }
                    if let Some(phone) = non_blank(input.phone) {
                        active.phone = Set(phone);
                    }
                    if let Some(address) = input.address {
                        active.address = Set(non_blank(Some(address)));
                    }
                    if let Some(city) = input.city {
                        active.city = Set(non_blank(Some(city)));
                    }
                    if let Some(state) = input.state {
                        active.state = Set(non_blank(Some(state)));
                    }
                    if let Some(zip_code) = input.zip_code {
                        active.zip_code = Set(non_blank(Some(zip_code)));
                    }

                    active
                        .update(txn)
                        .await
                        .map_err(|e| ServiceError::unique_violation_or_db(e, EMAIL_TAKEN))
                })
            })
            .await?;

        self.event_sender
            .publish([Event::CustomerUpdated(customer.id)])
            .await;
        Ok(customer)
    }

    /// Deletes a customer and everything it owns, unless it still has open
    /// work or money owed.
    #[instrument(skip(self))]
    pub async fn delete_customer(&self, id: Uuid) -> Result<(), ServiceError> {
        let started = Instant::now();
        let txn = db::begin(&self.db_pool).await?;

        customer::Entity::find_by_id(id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::not_found("Customer"))?;

        let active = has_active_work_orders(
            &txn,
            Condition::all().add(work_order::Column::CustomerId.eq(id)),
        )
        .await?;
        let unpaid = has_unpaid_invoices(&txn, id).await?;
        if active || unpaid {
            return Err(ServiceError::DeleteBlocked {
                message: DELETE_BLOCKED.to_string(),
                guards: DeleteGuards {
                    has_active_work_orders: Some(active),
                    has_unpaid_invoices: Some(unpaid),
                },
            });
        }

        let invoice_ids: Vec<Uuid> = invoice::Entity::find()
            .filter(invoice::Column::CustomerId.eq(id))
            .all(&txn)
            .await?
            .into_iter()
            .map(|i| i.id)
            .collect();
        let work_order_ids: Vec<Uuid> = work_order::Entity::find()
            .filter(work_order::Column::CustomerId.eq(id))
            .all(&txn)
            .await?
            .into_iter()
            .map(|w| w.id)
            .collect();

        payment::Entity::delete_many()
            .filter(payment::Column::InvoiceId.is_in(invoice_ids))
            .exec(&txn)
            .await?;
        invoice::Entity::delete_many()
            .filter(invoice::Column::CustomerId.eq(id))
            .exec(&txn)
            .await?;
        work_order_line_item::Entity::delete_many()
            .filter(work_order_line_item::Column::WorkOrderId.is_in(work_order_ids))
            .exec(&txn)
            .await?;
        work_order::Entity::delete_many()
            .filter(work_order::Column::CustomerId.eq(id))
            .exec(&txn)
            .await?;
        appointment::Entity::delete_many()
            .filter(appointment::Column::CustomerId.eq(id))
            .exec(&txn)
            .await?;
        vehicle::Entity::delete_many()
            .filter(vehicle::Column::CustomerId.eq(id))
            .exec(&txn)
            .await?;
        customer::Entity::delete_by_id(id).exec(&txn).await?;

        db::commit(txn, started).await?;
        info!(customer_id = %id, "customer deleted");
        self.event_sender.publish([Event::CustomerDeleted(id)]).await;
        Ok(())
    }
}
