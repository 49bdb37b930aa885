//! Work-order lifecycle: creation with parts consumption, edits that diff
//! line items against stock, status transitions and deletion.

use crate::{
    db::{self, DbPool},
    entities::{
        customer, inventory_item, invoice, technician, vehicle, work_order, work_order_line_item,
        TransactionType, WorkOrderStatus,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        customers::CustomerRef,
        double_option,
        inventory::{apply_movement, StockMovement},
        pricing::{self, Billable, Totals},
        validation::{
            find_customer, find_customer_vehicle, find_technician, non_blank, required,
        },
        vehicles::VehicleRef,
    },
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::{Expr, Func},
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, LoaderTrait,
    QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

const ORDER_NUMBER_ATTEMPTS: usize = 5;
const LOCKED_UPDATE: &str = "Cannot update a work order that is already invoiced or paid";
const LOCKED_DELETE: &str = "Cannot delete a work order that is already invoiced or paid";
const INVOICED_DELETE: &str = "Cannot delete a work order that has an invoice";
const PART_QUANTITY_TOO_LARGE: &str = "Total quantity for a part is too large";
const MAX_LINE_ITEMS: usize = 500;

#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct WorkOrderFilters {
    /// Matches order number, description or diagnostic notes
    pub query: Option<String>,
    #[param(value_type = Option<String>)]
    pub status: Option<WorkOrderStatus>,
    pub customer_id: Option<Uuid>,
    pub vehicle_id: Option<Uuid>,
    pub technician_id: Option<Uuid>,
}

/// A line item as submitted. `id` is only honoured on update, where it
/// keeps an existing line in place.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LineItemInput {
    pub id: Option<Uuid>,
    pub description: Option<String>,
    pub quantity: Option<i32>,
    pub unit_price: Option<Decimal>,
    pub labor_hours: Option<Decimal>,
    pub labor_rate: Option<Decimal>,
    pub part_id: Option<Uuid>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateWorkOrderInput {
    pub description: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub customer_id: Option<Uuid>,
    pub vehicle_id: Option<Uuid>,
    pub technician_id: Option<Uuid>,
    pub status: Option<WorkOrderStatus>,
    pub diagnostic_notes: Option<String>,
    pub completion_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub line_items: Vec<LineItemInput>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateWorkOrderInput {
    pub description: Option<String>,
    pub diagnostic_notes: Option<String>,
    pub status: Option<WorkOrderStatus>,
    pub start_date: Option<DateTime<Utc>>,
    pub completion_date: Option<DateTime<Utc>>,
    pub customer_id: Option<Uuid>,
    pub vehicle_id: Option<Uuid>,
    /// `null` unassigns the technician
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<Uuid>)]
    pub technician_id: Option<Option<Uuid>>,
    /// Replaces the full set of line items when present
    pub line_items: Option<Vec<LineItemInput>>,
}

/// A validated line, ready to persist.
#[derive(Debug, Clone, PartialEq)]
struct LineDraft {
    id: Option<Uuid>,
    description: String,
    quantity: i32,
    unit_price: Decimal,
    labor_hours: Option<Decimal>,
    labor_rate: Option<Decimal>,
    part_id: Option<Uuid>,
}

impl Billable for LineDraft {
    fn quantity(&self) -> i32 {
        self.quantity
    }
    fn unit_price(&self) -> Decimal {
        self.unit_price
    }
    fn labor_hours(&self) -> Option<Decimal> {
        self.labor_hours
    }
    fn labor_rate(&self) -> Option<Decimal> {
        self.labor_rate
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PartRef {
    pub id: Uuid,
    pub part_number: String,
    pub name: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LineItemDetail {
    #[serde(flatten)]
    pub line_item: work_order_line_item::Model,
    pub cost: Decimal,
    pub part: Option<PartRef>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WorkOrderSummary {
    #[serde(flatten)]
    pub work_order: work_order::Model,
    pub customer: Option<CustomerRef>,
    pub vehicle: Option<VehicleRef>,
    pub technician_name: Option<String>,
    pub line_item_count: usize,
    pub subtotal: Decimal,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WorkOrderDetail {
    #[serde(flatten)]
    pub work_order: work_order::Model,
    pub customer: customer::Model,
    pub vehicle: vehicle::Model,
    pub technician: Option<technician::Model>,
    pub line_items: Vec<LineItemDetail>,
    pub totals: Totals,
    pub invoice: Option<invoice::Model>,
}

#[derive(Clone)]
pub struct WorkOrderService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    tax_rate: Decimal,
    allow_negative_stock: bool,
}

impl WorkOrderService {
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        tax_rate: Decimal,
        allow_negative_stock: bool,
    ) -> Self {
        Self {
            db_pool,
            event_sender,
            tax_rate,
            allow_negative_stock,
        }
    }

    /// Lists work orders, newest first.
    #[instrument(skip(self))]
    pub async fn list_work_orders(
        &self,
        filters: WorkOrderFilters,
    ) -> Result<Vec<WorkOrderSummary>, ServiceError> {
        let db = &*self.db_pool;
        let mut query = work_order::Entity::find();

        if let Some(status) = filters.status {
            query = query.filter(work_order::Column::Status.eq(status));
        }
        if let Some(customer_id) = filters.customer_id {
            query = query.filter(work_order::Column::CustomerId.eq(customer_id));
        }
        if let Some(vehicle_id) = filters.vehicle_id {
            query = query.filter(work_order::Column::VehicleId.eq(vehicle_id));
        }
        if let Some(technician_id) = filters.technician_id {
            query = query.filter(work_order::Column::TechnicianId.eq(technician_id));
        }
        if let Some(term) = non_blank(filters.query) {
            let pattern = format!("%{}%", term.trim().to_lowercase());
            let mut any = Condition::any();
            for column in [
                work_order::Column::OrderNumber,
                work_order::Column::Description,
                work_order::Column::DiagnosticNotes,
            ] {
                any = any.add(Expr::expr(Func::lower(Expr::col(column))).like(pattern.as_str()));
            }
            query = query.filter(any);
        }

        let work_orders = query
            .order_by_desc(work_order::Column::CreatedAt)
            .all(db)
            .await?;
        summarize(db, work_orders).await
    }

    #[instrument(skip(self))]
    pub async fn get_work_order(&self, id: Uuid) -> Result<WorkOrderDetail, ServiceError> {
        load_detail(&*self.db_pool, id, self.tax_rate).await
    }

    /// Creates a work order and consumes stock for every line that
    /// references a part. Nothing is persisted if any step fails.
    #[instrument(skip(self, input))]
    pub async fn create_work_order(
        &self,
        input: CreateWorkOrderInput,
    ) -> Result<WorkOrderDetail, ServiceError> {
        let description = required("description", input.description)?;
        let start_date = required("startDate", input.start_date)?;
        let customer_id = required("customerId", input.customer_id)?;
        let vehicle_id = required("vehicleId", input.vehicle_id)?;
        let status = input.status.unwrap_or(WorkOrderStatus::Pending);
        if !status.is_client_settable() {
            return Err(ServiceError::ValidationError(format!(
                "A work order cannot be created with status {}",
                status.as_ref()
            )));
        }
        let drafts = validate_line_items(&input.line_items, self.tax_rate)?;

        let started = Instant::now();
        let txn = db::begin(&self.db_pool).await?;

        find_customer(&txn, customer_id).await?;
        find_customer_vehicle(&txn, vehicle_id, customer_id).await?;
        if let Some(technician_id) = input.technician_id {
            find_technician(&txn, technician_id).await?;
        }

        let order_number = allocate_order_number(&txn).await?;
        let completion_date = match (status, input.completion_date) {
            (_, Some(date)) => Some(date),
            (WorkOrderStatus::Completed, None) => Some(Utc::now()),
            _ => None,
        };

        let work_order = work_order::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_number: Set(order_number.clone()),
            status: Set(status),
            description: Set(description),
            diagnostic_notes: Set(non_blank(input.diagnostic_notes)),
            start_date: Set(start_date),
            completion_date: Set(completion_date),
            customer_id: Set(customer_id),
            vehicle_id: Set(vehicle_id),
            technician_id: Set(input.technician_id),
            ..Default::default()
        }
        .insert(&txn)
        .await
        .map_err(|e| {
            ServiceError::unique_violation_or_db(e, "Order number collision, please retry")
        })?;

        let mut events = vec![Event::WorkOrderCreated {
            work_order_id: work_order.id,
            order_number: order_number.clone(),
        }];

        ensure_parts_exist(&txn, &drafts).await?;
        for (position, draft) in drafts.iter().enumerate() {
            insert_line(&txn, work_order.id, position, draft).await?;
        }

        let note = format!("Used in Work Order {}", order_number);
        for draft in &drafts {
            if let Some(part_id) = draft.part_id {
                let movement = StockMovement {
                    item_id: part_id,
                    change: -draft.quantity,
                    transaction_type: TransactionType::Sale,
                    work_order_id: Some(work_order.id),
                    notes: Some(note.clone()),
                };
                apply_movement(&txn, &movement, self.allow_negative_stock).await?;
                events.push(movement.event());
            }
        }

        db::commit(txn, started).await?;
        info!(work_order_id = %work_order.id, %order_number, lines = drafts.len(), "work order created");
        self.event_sender.publish(events).await;

        self.get_work_order(work_order.id).await
    }

    /// Updates scalar fields, validates status changes and, when line
    /// items are supplied, replaces them and settles the per-part stock
    /// difference.
    #[instrument(skip(self, input))]
    pub async fn update_work_order(
        &self,
        id: Uuid,
        input: UpdateWorkOrderInput,
    ) -> Result<WorkOrderDetail, ServiceError> {
        let drafts = match &input.line_items {
            Some(items) => Some(validate_line_items(items, self.tax_rate)?),
            None => None,
        };

        let started = Instant::now();
        let txn = db::begin(&self.db_pool).await?;
        let existing = work_order::Entity::find_by_id(id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::not_found("Work order"))?;

        if existing.status.is_locked() {
            return Err(ServiceError::ValidationError(LOCKED_UPDATE.to_string()));
        }

        let old_status = existing.status;
        let new_status = input.status.unwrap_or(old_status);
        check_transition(old_status, new_status)?;

        let customer_id = input.customer_id.unwrap_or(existing.customer_id);
        let vehicle_id = input.vehicle_id.unwrap_or(existing.vehicle_id);
        if customer_id != existing.customer_id || vehicle_id != existing.vehicle_id {
            find_customer(&txn, customer_id).await?;
            find_customer_vehicle(&txn, vehicle_id, customer_id).await?;
        }
        if let Some(Some(technician_id)) = input.technician_id {
            find_technician(&txn, technician_id).await?;
        }

        let mut active: work_order::ActiveModel = existing.clone().into();
        if let Some(description) = non_blank(input.description) {
            active.description = Set(description);
        }
        if let Some(notes) = input.diagnostic_notes {
            active.diagnostic_notes = Set(non_blank(Some(notes)));
        }
        if let Some(start_date) = input.start_date {
            active.start_date = Set(start_date);
        }
        if let Some(technician_id) = input.technician_id {
            active.technician_id = Set(technician_id);
        }
        active.customer_id = Set(customer_id);
        active.vehicle_id = Set(vehicle_id);
        active.status = Set(new_status);
        active.completion_date = Set(match input.completion_date {
            Some(date) => Some(date),
            None if new_status == WorkOrderStatus::Completed => {
                existing.completion_date.or_else(|| Some(Utc::now()))
            }
            None => existing.completion_date,
        });
        let work_order = active.update(&txn).await?;

        let mut events = vec![Event::WorkOrderUpdated {
            work_order_id: id,
            status: new_status,
        }];
        if new_status != old_status {
            events.push(Event::WorkOrderStatusChanged {
                work_order_id: id,
                old_status,
                new_status,
            });
        }

        if let Some(drafts) = drafts {
            let previous = work_order_line_item::Entity::find()
                .filter(work_order_line_item::Column::WorkOrderId.eq(id))
                .all(&txn)
                .await?;
            ensure_parts_exist(&txn, &drafts).await?;
            replace_lines(&txn, id, &previous, &drafts).await?;

            let before = part_quantities(previous.iter().map(|l| (l.part_id, l.quantity)))?;
            let after = part_quantities(drafts.iter().map(|d| (d.part_id, d.quantity)))?;
            let note = format!("Adjusted in Work Order {}", work_order.order_number);
            for (part_id, delta) in stock_deltas(&before, &after) {
                let moved = i32::try_from(delta.unsigned_abs()).map_err(|_| {
                    ServiceError::ValidationError(PART_QUANTITY_TOO_LARGE.to_string())
                })?;
                let (change, transaction_type) = if delta > 0 {
                    (-moved, TransactionType::Sale)
                } else {
                    (moved, TransactionType::Return)
                };
                let movement = StockMovement {
                    item_id: part_id,
                    change,
                    transaction_type,
                    work_order_id: Some(id),
                    notes: Some(note.clone()),
                };
                apply_movement(&txn, &movement, self.allow_negative_stock).await?;
                events.push(movement.event());
            }
        }

        db::commit(txn, started).await?;
        info!(work_order_id = %id, status = new_status.as_ref(), "work order updated");
        self.event_sender.publish(events).await;

        self.get_work_order(id).await
    }

    /// Deletes an uninvoiced work order, returning every consumed part.
    #[instrument(skip(self))]
    pub async fn delete_work_order(&self, id: Uuid) -> Result<(), ServiceError> {
        let started = Instant::now();
        let txn = db::begin(&self.db_pool).await?;
        let existing = work_order::Entity::find_by_id(id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::not_found("Work order"))?;

        if existing.status.is_locked() {
            return Err(ServiceError::ValidationError(LOCKED_DELETE.to_string()));
        }
        let invoiced = invoice::Entity::find()
            .filter(invoice::Column::WorkOrderId.eq(id))
            .one(&txn)
            .await?;
        if invoiced.is_some() {
            return Err(ServiceError::ValidationError(INVOICED_DELETE.to_string()));
        }

        let lines = work_order_line_item::Entity::find()
            .filter(work_order_line_item::Column::WorkOrderId.eq(id))
            .order_by_asc(work_order_line_item::Column::Position)
            .all(&txn)
            .await?;

        let mut events = Vec::new();
        let note = format!("Returned from deleted Work Order {}", existing.order_number);
        for line in &lines {
            if let Some(part_id) = line.part_id {
                let movement = StockMovement {
                    item_id: part_id,
                    change: line.quantity,
                    transaction_type: TransactionType::Return,
                    work_order_id: Some(id),
                    notes: Some(note.clone()),
                };
                apply_movement(&txn, &movement, self.allow_negative_stock).await?;
                events.push(movement.event());
            }
        }

        work_order_line_item::Entity::delete_many()
            .filter(work_order_line_item::Column::WorkOrderId.eq(id))
            .exec(&txn)
            .await?;
        work_order::Entity::delete_by_id(id).exec(&txn).await?;
        db::commit(txn, started).await?;

        info!(work_order_id = %id, order_number = %existing.order_number, "work order deleted");
        events.push(Event::WorkOrderDeleted {
            work_order_id: id,
            order_number: existing.order_number,
        });
        self.event_sender.publish(events).await;
        Ok(())
    }
}

/// Attaches customer, vehicle, technician name and priced line count to
/// each work order, keeping the given order.
pub(crate) async fn summarize<C: ConnectionTrait>(
    db: &C,
    work_orders: Vec<work_order::Model>,
) -> Result<Vec<WorkOrderSummary>, ServiceError> {
    let customers = work_orders.load_one(customer::Entity, db).await?;
    let vehicles = work_orders.load_one(vehicle::Entity, db).await?;
    let technicians = work_orders.load_one(technician::Entity, db).await?;
    let lines = work_orders
        .load_many(work_order_line_item::Entity, db)
        .await?;

    let mut summaries = Vec::with_capacity(work_orders.len());
    for ((((work_order, customer), vehicle), technician), lines) in work_orders
        .into_iter()
        .zip(customers)
        .zip(vehicles)
        .zip(technicians)
        .zip(lines)
    {
        summaries.push(WorkOrderSummary {
            work_order,
            customer: customer.as_ref().map(CustomerRef::from),
            vehicle: vehicle.as_ref().map(VehicleRef::from),
            technician_name: technician.map(|t| t.name),
            line_item_count: lines.len(),
            subtotal: pricing::calculate_subtotal(&lines)?,
        });
    }
    Ok(summaries)
}

/// Loads a work order with its customer, vehicle, technician, priced lines
/// and invoice.
pub(crate) async fn load_detail<C: ConnectionTrait>(
    db: &C,
    id: Uuid,
    tax_rate: Decimal,
) -> Result<WorkOrderDetail, ServiceError> {
    let work_order = work_order::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| ServiceError::not_found("Work order"))?;

    let customer = find_customer(db, work_order.customer_id).await?;
    let vehicle = vehicle::Entity::find_by_id(work_order.vehicle_id)
        .one(db)
        .await?
        .ok_or_else(|| ServiceError::not_found("Vehicle"))?;
    let technician = match work_order.technician_id {
        Some(technician_id) => technician::Entity::find_by_id(technician_id).one(db).await?,
        None => None,
    };

    let lines = work_order_line_item::Entity::find()
        .filter(work_order_line_item::Column::WorkOrderId.eq(id))
        .order_by_asc(work_order_line_item::Column::Position)
        .all(db)
        .await?;
    let totals = Totals::compute(&lines, tax_rate)?;

    let part_ids: Vec<Uuid> = lines.iter().filter_map(|l| l.part_id).collect();
    let parts: HashMap<Uuid, inventory_item::Model> = if part_ids.is_empty() {
        HashMap::new()
    } else {
        inventory_item::Entity::find()
            .filter(inventory_item::Column::Id.is_in(part_ids))
            .all(db)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect()
    };

    let line_items = lines
        .into_iter()
        .map(|line| {
            Ok(LineItemDetail {
                cost: line.cost()?,
                part: line
                    .part_id
                    .and_then(|pid| parts.get(&pid))
                    .map(|p| PartRef {
                        id: p.id,
                        part_number: p.part_number.clone(),
                        name: p.name.clone(),
                    }),
                line_item: line,
            })
        })
        .collect::<Result<Vec<_>, ServiceError>>()?;

    let invoice = invoice::Entity::find()
        .filter(invoice::Column::WorkOrderId.eq(id))
        .one(db)
        .await?;

    Ok(WorkOrderDetail {
        work_order,
        customer,
        vehicle,
        technician,
        line_items,
        totals,
        invoice,
    })
}

/// Picks an order number not yet in use, retrying on collision.
async fn allocate_order_number<C: ConnectionTrait>(db: &C) -> Result<String, ServiceError> {
    for attempt in 1..=ORDER_NUMBER_ATTEMPTS {
        let candidate = pricing::generate_order_number();
        let taken = work_order::Entity::find()
            .filter(work_order::Column::OrderNumber.eq(candidate.as_str()))
            .one(db)
            .await?
            .is_some();
        if !taken {
            return Ok(candidate);
        }
        warn!(attempt, %candidate, "order number collision");
    }
    Err(ServiceError::InternalError(
        "could not allocate a unique order number".to_string(),
    ))
}

fn check_transition(from: WorkOrderStatus, to: WorkOrderStatus) -> Result<(), ServiceError> {
    if from == to {
        return Ok(());
    }
    if !to.is_client_settable() {
        return Err(ServiceError::ValidationError(format!(
            "Status {} is set by invoicing and payments",
            to.as_ref()
        )));
    }
    if !from.can_transition_to(to) {
        return Err(ServiceError::ValidationError(format!(
            "Cannot change status from {} to {}",
            from.as_ref(),
            to.as_ref()
        )));
    }
    Ok(())
}

/// Checks each submitted line and prices the whole set, so amounts that
/// cannot be represented are rejected before anything is written.
fn validate_line_items(
    items: &[LineItemInput],
    tax_rate: Decimal,
) -> Result<Vec<LineDraft>, ServiceError> {
    if items.len() > MAX_LINE_ITEMS {
        return Err(ServiceError::ValidationError(format!(
            "A work order can have at most {} line items",
            MAX_LINE_ITEMS
        )));
    }
    let drafts = items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let field = |name: &str| format!("lineItems[{}].{}", i, name);
            let description = required(&field("description"), item.description.clone())?;
            let quantity = required(&field("quantity"), item.quantity)?;
            let unit_price = required(&field("unitPrice"), item.unit_price)?;
            if quantity <= 0 {
                return Err(ServiceError::ValidationError(format!(
                    "{} must be greater than zero",
                    field("quantity")
                )));
            }
            for (name, value) in [
                ("unitPrice", Some(unit_price)),
                ("laborHours", item.labor_hours),
                ("laborRate", item.labor_rate),
            ] {
                if value.is_some_and(|v| v.is_sign_negative() && !v.is_zero()) {
                    return Err(ServiceError::ValidationError(format!(
                        "{} must not be negative",
                        field(name)
                    )));
                }
            }
            Ok(LineDraft {
                id: item.id,
                description,
                quantity,
                unit_price,
                labor_hours: item.labor_hours,
                labor_rate: item.labor_rate,
                part_id: item.part_id,
            })
        })
        .collect::<Result<Vec<_>, ServiceError>>()?;

    Totals::compute(&drafts, tax_rate)?.to_cents()?;
    part_quantities(drafts.iter().map(|d| (d.part_id, d.quantity)))?
        .values()
        .try_for_each(|&total| {
            i32::try_from(total)
                .map(|_| ())
                .map_err(|_| ServiceError::ValidationError(PART_QUANTITY_TOO_LARGE.to_string()))
        })?;
    Ok(drafts)
}

fn line_position(position: usize) -> Result<i32, ServiceError> {
    i32::try_from(position)
        .map_err(|_| ServiceError::ValidationError("Too many line items".to_string()))
}

async fn ensure_parts_exist<C: ConnectionTrait>(
    db: &C,
    drafts: &[LineDraft],
) -> Result<(), ServiceError> {
    for part_id in drafts.iter().filter_map(|d| d.part_id) {
        inventory_item::Entity::find_by_id(part_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Part"))?;
    }
    Ok(())
}

async fn insert_line<C: ConnectionTrait>(
    db: &C,
    work_order_id: Uuid,
    position: usize,
    draft: &LineDraft,
) -> Result<work_order_line_item::Model, ServiceError> {
    let line = work_order_line_item::ActiveModel {
        id: Set(Uuid::new_v4()),
        work_order_id: Set(work_order_id),
        position: Set(line_position(position)?),
        description: Set(draft.description.clone()),
        quantity: Set(draft.quantity),
        unit_price: Set(draft.unit_price),
        labor_hours: Set(draft.labor_hours),
        labor_rate: Set(draft.labor_rate),
        part_id: Set(draft.part_id),
        ..Default::default()
    }
    .insert(db)
    .await?;
    Ok(line)
}

/// Replaces the stored lines with `drafts`. Drafts carrying the id of an
/// existing line update it in place; the remaining old lines are deleted.
async fn replace_lines<C: ConnectionTrait>(
    db: &C,
    work_order_id: Uuid,
    previous: &[work_order_line_item::Model],
    drafts: &[LineDraft],
) -> Result<(), ServiceError> {
    let mut remaining: HashMap<Uuid, &work_order_line_item::Model> =
        previous.iter().map(|l| (l.id, l)).collect();

    for (position, draft) in drafts.iter().enumerate() {
        match draft.id.and_then(|id| remaining.remove(&id)) {
            Some(existing) => {
                let mut active: work_order_line_item::ActiveModel = existing.clone().into();
                active.position = Set(line_position(position)?);
                active.description = Set(draft.description.clone());
                active.quantity = Set(draft.quantity);
                active.unit_price = Set(draft.unit_price);
                active.labor_hours = Set(draft.labor_hours);
                active.labor_rate = Set(draft.labor_rate);
                active.part_id = Set(draft.part_id);
                active.update(db).await?;
            }
            None => {
                insert_line(db, work_order_id, position, draft).await?;
            }
        }
    }

    if !remaining.is_empty() {
        debug!(removed = remaining.len(), "dropping replaced line items");
        work_order_line_item::Entity::delete_many()
            .filter(work_order_line_item::Column::Id.is_in(remaining.into_keys()))
            .exec(db)
            .await?;
    }
    Ok(())
}

/// Total quantity per referenced part.
fn part_quantities(
    lines: impl Iterator<Item = (Option<Uuid>, i32)>,
) -> Result<BTreeMap<Uuid, i64>, ServiceError> {
    let mut totals: BTreeMap<Uuid, i64> = BTreeMap::new();
    for (part_id, quantity) in lines {
        if let Some(part_id) = part_id {
            let total = totals.entry(part_id).or_insert(0);
            *total = total
                .checked_add(i64::from(quantity))
                .ok_or_else(|| ServiceError::ValidationError(PART_QUANTITY_TOO_LARGE.to_string()))?;
        }
    }
    Ok(totals)
}

/// Net change in consumed quantity per part, `after - before`, omitting
/// parts whose total did not move.
fn stock_deltas(before: &BTreeMap<Uuid, i64>, after: &BTreeMap<Uuid, i64>) -> Vec<(Uuid, i64)> {
    let mut parts: Vec<Uuid> = before.keys().chain(after.keys()).copied().collect();
    parts.sort();
    parts.dedup();
    parts
        .into_iter()
        .filter_map(|part| {
            let delta = after.get(&part).copied().unwrap_or(0)
                - before.get(&part).copied().unwrap_or(0);
            (delta != 0).then_some((part, delta))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;

    fn line(quantity: i32, part_id: Option<Uuid>) -> LineItemInput {
        LineItemInput {
            description: Some("Brake pads".into()),
            quantity: Some(quantity),
            unit_price: Some(dec!(40)),
            part_id,
            ..Default::default()
        }
    }

    #[test]
    fn deltas_cover_growth_shrink_and_removal() {
        let kept = Uuid::new_v4();
        let removed = Uuid::new_v4();
        let added = Uuid::new_v4();

        let before = part_quantities(
            [(Some(kept), 3), (Some(removed), 2), (None, 7)].into_iter(),
        )
        .unwrap();
        let after = part_quantities([(Some(kept), 5), (Some(added), 1)].into_iter()).unwrap();

        let deltas: HashMap<Uuid, i64> = stock_deltas(&before, &after).into_iter().collect();
        assert_eq!(deltas.len(), 3);
        assert_eq!(deltas[&kept], 2);
        assert_eq!(deltas[&removed], -2);
        assert_eq!(deltas[&added], 1);
    }

    #[test]
    fn lines_for_the_same_part_are_netted() {
        let part = Uuid::new_v4();
        let before = part_quantities([(Some(part), 4)].into_iter()).unwrap();
        let after = part_quantities([(Some(part), 1), (Some(part), 3)].into_iter()).unwrap();
        assert!(stock_deltas(&before, &after).is_empty());
    }

    #[test]
    fn part_totals_sum_past_i32() {
        let part = Uuid::new_v4();
        let totals =
            part_quantities([(Some(part), 2_000_000_000), (Some(part), 2_000_000_000)].into_iter())
                .unwrap();
        assert_eq!(totals[&part], 4_000_000_000);
    }

    #[test]
    fn oversized_lines_are_rejected_before_persisting() {
        let mut pricey = line(i32::MAX, None);
        pricey.unit_price = Some(dec!(40000000000000000000));
        assert_matches!(
            validate_line_items(&[pricey], dec!(0.0875)),
            Err(ServiceError::ValidationError(msg)) if msg == "Line item amounts are too large"
        );

        let part = Some(Uuid::new_v4());
        let mut bulk = line(2_000_000_000, part);
        bulk.unit_price = Some(dec!(0.01));
        assert_matches!(
            validate_line_items(&[bulk.clone(), bulk], dec!(0.0875)),
            Err(ServiceError::ValidationError(msg)) if msg == "Total quantity for a part is too large"
        );

        let too_many = vec![line(1, None); MAX_LINE_ITEMS + 1];
        assert_matches!(
            validate_line_items(&too_many, dec!(0.0875)),
            Err(ServiceError::ValidationError(msg)) if msg.contains("at most")
        );
    }

    #[test]
    fn positions_beyond_i32_are_rejected() {
        assert_eq!(line_position(3).unwrap(), 3);
        assert_matches!(
            line_position(i32::MAX as usize + 1),
            Err(ServiceError::ValidationError(_))
        );
    }

    #[test]
    fn line_validation_names_the_offending_field() {
        let mut missing = line(1, None);
        missing.description = None;
        assert_matches!(
            validate_line_items(&[line(1, None), missing], dec!(0.0875)),
            Err(ServiceError::ValidationError(msg)) if msg == "lineItems[1].description is required"
        );

        assert_matches!(
            validate_line_items(&[line(0, None)], dec!(0.0875)),
            Err(ServiceError::ValidationError(msg)) if msg == "lineItems[0].quantity must be greater than zero"
        );

        let mut negative = line(1, None);
        negative.labor_rate = Some(dec!(-10));
        assert_matches!(
            validate_line_items(&[negative], dec!(0.0875)),
            Err(ServiceError::ValidationError(msg)) if msg.contains("laborRate")
        );
    }

    #[test]
    fn drafts_price_like_stored_lines() {
        let mut labor = line(2, None);
        labor.labor_hours = Some(dec!(1.5));
        labor.labor_rate = Some(dec!(100));
        let drafts = validate_line_items(&[labor], dec!(0.0875)).unwrap();
        assert_eq!(pricing::calculate_subtotal(&drafts).unwrap(), dec!(230));
    }

    #[test]
    fn invoicing_statuses_cannot_be_requested() {
        assert_matches!(
            check_transition(WorkOrderStatus::Completed, WorkOrderStatus::Invoiced),
            Err(ServiceError::ValidationError(msg)) if msg.contains("set by invoicing")
        );
        assert_matches!(
            check_transition(WorkOrderStatus::Canceled, WorkOrderStatus::InProgress),
            Err(ServiceError::ValidationError(msg)) if msg == "Cannot change status from CANCELED to IN_PROGRESS"
        );
        assert!(check_transition(WorkOrderStatus::Pending, WorkOrderStatus::Completed).is_ok());
        assert!(check_transition(WorkOrderStatus::Canceled, WorkOrderStatus::Canceled).is_ok());
    }
}
