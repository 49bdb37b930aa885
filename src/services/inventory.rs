use crate::{
    db::{self, DbPool},
    entities::{inventory_item, inventory_transaction, work_order_line_item, TransactionType},
    errors::ServiceError,
    events::{Event, EventSender},
    services::validation::{ensure_unique, non_blank, required},
};
use chrono::Utc;
use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::{Expr, Func},
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument, warn};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

const RECENT_TRANSACTION_LIMIT: u64 = 50;
const PART_NUMBER_TAKEN: &str = "A part with this part number already exists";

/// One change to an item's on-hand quantity. `change` is signed and never
/// `i32::MIN`; the recorded transaction quantity is its magnitude except for
/// `ADJUSTMENT`, which keeps the sign.
#[derive(Debug, Clone)]
pub struct StockMovement {
    pub item_id: Uuid,
    pub change: i32,
    pub transaction_type: TransactionType,
    pub work_order_id: Option<Uuid>,
    pub notes: Option<String>,
}

impl StockMovement {
    fn recorded_quantity(&self) -> i32 {
        match self.transaction_type {
            TransactionType::Adjustment => self.change,
            _ => self.change.abs(),
        }
    }

    pub fn event(&self) -> Event {
        Event::InventoryAdjusted {
            item_id: self.item_id,
            transaction_type: self.transaction_type,
            quantity: self.recorded_quantity(),
            work_order_id: self.work_order_id,
        }
    }
}

/// Applies `movement` with a single conditional update and appends the
/// ledger row. Removals fail with "Insufficient stock" when they would
/// take the quantity below zero, unless `allow_negative` is set. The
/// on-hand quantity always stays within `i32`.
pub async fn apply_movement<C: ConnectionTrait>(
    db: &C,
    movement: &StockMovement,
    allow_negative: bool,
) -> Result<inventory_transaction::Model, ServiceError> {
    let item = inventory_item::Entity::find_by_id(movement.item_id)
        .one(db)
        .await?
        .ok_or_else(|| ServiceError::not_found("Part"))?;

    let change = i64::from(movement.change);
    let (floor, ceiling) = stock_bounds(allow_negative);

    let mut update = inventory_item::Entity::update_many()
        .col_expr(
            inventory_item::Column::Quantity,
            Expr::col(inventory_item::Column::Quantity).add(movement.change),
        )
        .col_expr(inventory_item::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(inventory_item::Column::Id.eq(movement.item_id));
    if change < 0 {
        update = update.filter(inventory_item::Column::Quantity.gte(floor - change));
    } else {
        update = update.filter(inventory_item::Column::Quantity.lte(ceiling - change));
    }

    let result = update.exec(db).await?;
    if result.rows_affected == 0 {
        warn!(
            part_number = %item.part_number,
            change,
            on_hand = item.quantity,
            "stock movement rejected"
        );
        if change < 0 {
            counter!("garage_inventory.insufficient_stock", 1);
            return Err(ServiceError::ValidationError(format!(
                "Insufficient stock for part {}",
                item.part_number
            )));
        }
        return Err(ServiceError::ValidationError(format!(
            "Stock for part {} would exceed the maximum quantity",
            item.part_number
        )));
    }

    let entry = inventory_transaction::ActiveModel {
        id: Set(Uuid::new_v4()),
        inventory_item_id: Set(movement.item_id),
        work_order_id: Set(movement.work_order_id),
        transaction_type: Set(movement.transaction_type),
        quantity: Set(movement.recorded_quantity()),
        notes: Set(movement.notes.clone()),
        ..Default::default()
    }
    .insert(db)
    .await?;

    counter!("garage_inventory.movements", 1, "type" => movement.transaction_type.as_ref().to_string());
    Ok(entry)
}

/// Lowest and highest on-hand quantity a movement may leave behind.
fn stock_bounds(allow_negative: bool) -> (i64, i64) {
    let floor = if allow_negative { i64::from(i32::MIN) } else { 0 };
    (floor, i64::from(i32::MAX))
}

#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct InventoryFilters {
    /// Matches part number, name, category or manufacturer
    pub query: Option<String>,
    pub category: Option<String>,
    /// Only items at or below their minimum quantity
    pub low_stock: Option<bool>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateInventoryItemInput {
    pub part_number: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub manufacturer: Option<String>,
    pub location: Option<String>,
    pub quantity: Option<i32>,
    pub min_quantity: Option<i32>,
    pub cost_price: Option<Decimal>,
    pub selling_price: Option<Decimal>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateInventoryItemInput {
    pub part_number: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub manufacturer: Option<String>,
    pub location: Option<String>,
    pub min_quantity: Option<i32>,
    pub cost_price: Option<Decimal>,
    pub selling_price: Option<Decimal>,
}

/// Manual stock correction. `SALE` is reserved for work orders.
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AdjustStockInput {
    #[serde(rename = "type")]
    pub transaction_type: Option<TransactionType>,
    pub quantity: Option<i32>,
    pub notes: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InventoryItemSummary {
    #[serde(flatten)]
    pub item: inventory_item::Model,
    pub low_stock: bool,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InventoryItemDetail {
    #[serde(flatten)]
    pub item: inventory_item::Model,
    pub low_stock: bool,
    pub transactions: Vec<inventory_transaction::Model>,
}

/// Parts catalogue and stock ledger.
#[derive(Clone)]
pub struct InventoryService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    allow_negative_stock: bool,
}

impl InventoryService {
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        allow_negative_stock: bool,
    ) -> Self {
        Self {
            db_pool,
            event_sender,
            allow_negative_stock,
        }
    }

    #[instrument(skip(self))]
    pub async fn list_items(
        &self,
        filters: InventoryFilters,
    ) -> Result<Vec<InventoryItemSummary>, ServiceError> {
        let mut query = inventory_item::Entity::find();

        if let Some(term) = non_blank(filters.query) {
            let pattern = format!("%{}%", term.trim().to_lowercase());
            let mut any = Condition::any();
            for column in [
                inventory_item::Column::PartNumber,
                inventory_item::Column::Name,
                inventory_item::Column::Category,
                inventory_item::Column::Manufacturer,
            ] {
                any = any.add(Expr::expr(Func::lower(Expr::col(column))).like(pattern.as_str()));
            }
            query = query.filter(any);
        }
        if let Some(category) = non_blank(filters.category) {
            query = query.filter(inventory_item::Column::Category.eq(category));
        }
        if filters.low_stock.unwrap_or(false) {
            query = query.filter(
                Expr::col(inventory_item::Column::Quantity)
                    .lte(Expr::col(inventory_item::Column::MinQuantity)),
            );
        }

        let items = query
            .order_by_asc(inventory_item::Column::Name)
            .all(&*self.db_pool)
            .await?;

        Ok(items
            .into_iter()
            .map(|item| InventoryItemSummary {
                low_stock: item.is_low_stock(),
                item,
            })
            .collect())
    }

    #[instrument(skip(self))]
    pub async fn get_item(&self, id: Uuid) -> Result<InventoryItemDetail, ServiceError> {
        let db = &*self.db_pool;
        let item = inventory_item::Entity::find_by_id(id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Inventory item"))?;

        let transactions = inventory_transaction::Entity::find()
            .filter(inventory_transaction::Column::InventoryItemId.eq(id))
            .order_by_desc(inventory_transaction::Column::CreatedAt)
            .limit(RECENT_TRANSACTION_LIMIT)
            .all(db)
            .await?;

        Ok(InventoryItemDetail {
            low_stock: item.is_low_stock(),
            item,
            transactions,
        })
    }

    /// Creates a part; any opening quantity is booked as a `PURCHASE`.
    #[instrument(skip(self, input))]
    pub async fn create_item(
        &self,
        input: CreateInventoryItemInput,
    ) -> Result<inventory_item::Model, ServiceError> {
        let part_number = required("partNumber", input.part_number)?.trim().to_string();
        let name = required("name", input.name)?;
        let cost_price = required("costPrice", input.cost_price)?;
        let selling_price = required("sellingPrice", input.selling_price)?;
        let quantity = input.quantity.unwrap_or(0);
        let min_quantity = input.min_quantity.unwrap_or(0);
        check_stock_fields(Some(quantity), Some(min_quantity), Some(cost_price), Some(selling_price))?;

        let started = Instant::now();
        let txn = db::begin(&self.db_pool).await?;

        ensure_unique::<inventory_item::Entity, _>(
            &txn,
            inventory_item::Column::PartNumber,
            &part_number,
            inventory_item::Column::Id,
            None,
            PART_NUMBER_TAKEN,
        )
        .await?;

        let item = inventory_item::ActiveModel {
            id: Set(Uuid::new_v4()),
            part_number: Set(part_number),
            name: Set(name),
            description: Set(non_blank(input.description)),
            category: Set(non_blank(input.category)),
            manufacturer: Set(non_blank(input.manufacturer)),
            location: Set(non_blank(input.location)),
            quantity: Set(0),
            min_quantity: Set(min_quantity),
            cost_price: Set(cost_price),
            selling_price: Set(selling_price),
            ..Default::default()
        }
        .insert(&txn)
        .await
        .map_err(|e| ServiceError::unique_violation_or_db(e, PART_NUMBER_TAKEN))?;

        let mut events = vec![Event::InventoryItemCreated(item.id)];
        let item = if quantity > 0 {
            let movement = StockMovement {
                item_id: item.id,
                change: quantity,
                transaction_type: TransactionType::Purchase,
                work_order_id: None,
                notes: Some("Initial stock".to_string()),
            };
            apply_movement(&txn, &movement, self.allow_negative_stock).await?;
            events.push(movement.event());
            inventory_item::Entity::find_by_id(item.id)
                .one(&txn)
                .await?
                .ok_or_else(|| ServiceError::not_found("Inventory item"))?
        } else {
            item
        };

        db::commit(txn, started).await?;
        info!(item_id = %item.id, part_number = %item.part_number, "inventory item created");
        self.event_sender.publish(events).await;
        Ok(item)
    }

    /// Updates descriptive and pricing fields. Quantity only moves through
    /// [`InventoryService::adjust_stock`] and work orders.
    #[instrument(skip(self, input))]
    pub async fn update_item(
        &self,
        id: Uuid,
        input: UpdateInventoryItemInput,
    ) -> Result<inventory_item::Model, ServiceError> {
        check_stock_fields(None, input.min_quantity, input.cost_price, input.selling_price)?;

        let started = Instant::now();
        let txn = db::begin(&self.db_pool).await?;
        let existing = inventory_item::Entity::find_by_id(id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::not_found("Inventory item"))?;

        let mut active: inventory_item::ActiveModel = existing.into();
        if let Some(part_number) = non_blank(input.part_number) {
            let part_number = part_number.trim().to_string();
            ensure_unique::<inventory_item::Entity, _>(
                &txn,
                inventory_item::Column::PartNumber,
                &part_number,
                inventory_item::Column::Id,
                Some(id),
                PART_NUMBER_TAKEN,
            )
            .await?;
            active.part_number = Set(part_number);
        }
        if let Some(name) = non_blank(input.name) {
            active.name = Set(name);
        }
        if let Some(description) = input.description {
            active.description = Set(non_blank(Some(description)));
        }
        if let Some(category) = input.category {
            active.category = Set(non_blank(Some(category)));
        }
        if let Some(manufacturer) = input.manufacturer {
            active.manufacturer = Set(non_blank(Some(manufacturer)));
        }
        if let Some(location) = input.location {
            active.location = Set(non_blank(Some(location)));
        }
        if let Some(min_quantity) = input.min_quantity {
            active.min_quantity = Set(min_quantity);
        }
        if let Some(cost_price) = input.cost_price {
            active.cost_price = Set(cost_price);
        }
        if let Some(selling_price) = input.selling_price {
            active.selling_price = Set(selling_price);
        }

        let item = active
            .update(&txn)
            .await
            .map_err(|e| ServiceError::unique_violation_or_db(e, PART_NUMBER_TAKEN))?;
        db::commit(txn, started).await?;

        self.event_sender
            .publish([Event::InventoryItemUpdated(item.id)])
            .await;
        Ok(item)
    }

    /// Books a manual `PURCHASE`, `RETURN` or `ADJUSTMENT`.
    #[instrument(skip(self, input))]
    pub async fn adjust_stock(
        &self,
        id: Uuid,
        input: AdjustStockInput,
    ) -> Result<InventoryItemDetail, ServiceError> {
        let transaction_type = required_type(input.transaction_type)?;
        let quantity = required("quantity", input.quantity)?;
        let change = match transaction_type {
            TransactionType::Sale => {
                return Err(ServiceError::ValidationError(
                    "SALE transactions are recorded through work orders".to_string(),
                ))
            }
            TransactionType::Adjustment if quantity == 0 => {
                return Err(ServiceError::ValidationError(
                    "quantity must not be zero".to_string(),
                ))
            }
            TransactionType::Adjustment if quantity == i32::MIN => {
                return Err(ServiceError::ValidationError(
                    "quantity is out of range".to_string(),
                ))
            }
            TransactionType::Adjustment => quantity,
            _ if quantity <= 0 => {
                return Err(ServiceError::ValidationError(
                    "quantity must be greater than zero".to_string(),
                ))
            }
            _ => quantity,
        };

        let movement = StockMovement {
            item_id: id,
            change,
            transaction_type,
            work_order_id: None,
            notes: non_blank(input.notes),
        };

        let started = Instant::now();
        let txn = db::begin(&self.db_pool).await?;
        inventory_item::Entity::find_by_id(id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::not_found("Inventory item"))?;
        apply_movement(&txn, &movement, self.allow_negative_stock).await?;
        db::commit(txn, started).await?;

        self.event_sender.publish([movement.event()]).await;
        self.get_item(id).await
    }

    /// Deletes a part that no work order has ever used.
    #[instrument(skip(self))]
    pub async fn delete_item(&self, id: Uuid) -> Result<(), ServiceError> {
        let started = Instant::now();
        let txn = db::begin(&self.db_pool).await?;
        inventory_item::Entity::find_by_id(id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::not_found("Inventory item"))?;

        let referenced = work_order_line_item::Entity::find()
            .filter(work_order_line_item::Column::PartId.eq(id))
            .limit(1)
            .one(&txn)
            .await?;
        if referenced.is_some() {
            return Err(ServiceError::InvalidOperation(
                "Cannot delete a part that is used on work orders".to_string(),
            ));
        }

        inventory_transaction::Entity::delete_many()
            .filter(inventory_transaction::Column::InventoryItemId.eq(id))
            .exec(&txn)
            .await?;
        inventory_item::Entity::delete_by_id(id).exec(&txn).await?;
        db::commit(txn, started).await?;

        self.event_sender
            .publish([Event::InventoryItemDeleted(id)])
            .await;
        Ok(())
    }
}

fn required_type(value: Option<TransactionType>) -> Result<TransactionType, ServiceError> {
    value.ok_or_else(|| ServiceError::ValidationError("type is required".to_string()))
}

fn check_stock_fields(
    quantity: Option<i32>,
    min_quantity: Option<i32>,
    cost_price: Option<Decimal>,
    selling_price: Option<Decimal>,
) -> Result<(), ServiceError> {
    if quantity.is_some_and(|q| q < 0) {
        return Err(ServiceError::ValidationError(
            "quantity must not be negative".to_string(),
        ));
    }
    if min_quantity.is_some_and(|q| q < 0) {
        return Err(ServiceError::ValidationError(
            "minQuantity must not be negative".to_string(),
        ));
    }
    if cost_price.is_some_and(|p| p.is_sign_negative()) {
        return Err(ServiceError::ValidationError(
            "costPrice must not be negative".to_string(),
        ));
    }
    if selling_price.is_some_and(|p| p.is_sign_negative()) {
        return Err(ServiceError::ValidationError(
            "sellingPrice must not be negative".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;

    fn movement(change: i32, transaction_type: TransactionType) -> StockMovement {
        StockMovement {
            item_id: Uuid::new_v4(),
            change,
            transaction_type,
            work_order_id: None,
            notes: None,
        }
    }

    #[test]
    fn recorded_quantity_is_positive_except_adjustments() {
        assert_eq!(movement(-3, TransactionType::Sale).recorded_quantity(), 3);
        assert_eq!(movement(2, TransactionType::Return).recorded_quantity(), 2);
        assert_eq!(movement(-4, TransactionType::Adjustment).recorded_quantity(), -4);
    }

    #[test]
    fn stock_stays_within_i32() {
        assert_eq!(stock_bounds(false), (0, i64::from(i32::MAX)));
        assert_eq!(stock_bounds(true), (i64::from(i32::MIN), i64::from(i32::MAX)));
    }

    #[test]
    fn stock_fields_reject_negatives() {
        assert!(check_stock_fields(Some(0), Some(0), Some(dec!(0)), Some(dec!(1))).is_ok());
        assert_matches!(
            check_stock_fields(None, Some(-1), None, None),
            Err(ServiceError::ValidationError(msg)) if msg.starts_with("minQuantity")
        );
        assert_matches!(
            check_stock_fields(None, None, None, Some(dec!(-0.01))),
            Err(ServiceError::ValidationError(msg)) if msg.starts_with("sellingPrice")
        );
    }
}
