use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveModelBehavior, ActiveValue, Set};
use serde::{Deserialize, Serialize};
use strum::AsRefStr;
use utoipa::ToSchema;

/// Types of inventory movements
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    EnumIter,
    DeriveActiveEnum,
    AsRefStr,
    ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    /// Stock received from a supplier
    #[sea_orm(string_value = "PURCHASE")]
    Purchase,
    /// Stock consumed by a work order
    #[sea_orm(string_value = "SALE")]
    Sale,
    /// Manual correction; the quantity carries the sign
    #[sea_orm(string_value = "ADJUSTMENT")]
    Adjustment,
    /// Stock given back, e.g. from an edited or deleted work order
    #[sea_orm(string_value = "RETURN")]
    Return,
}

/// Append-only ledger row. Quantities are positive except for
/// `ADJUSTMENT`, which may be negative.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "inventory_transactions")]
#[serde(rename_all = "camelCase")]
#[schema(as = InventoryTransaction)]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub inventory_item_id: Uuid,
    #[sea_orm(nullable)]
    pub work_order_id: Option<Uuid>,
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    pub quantity: i32,
    #[sea_orm(nullable)]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::inventory_item::Entity",
        from = "Column::InventoryItemId",
        to = "super::inventory_item::Column::Id",
        on_delete = "Cascade"
    )]
    InventoryItem,
}

impl Related<super::inventory_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::InventoryItem.def()
    }
}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C>(self, _db: &C, _insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let mut active_model = self;
        if let ActiveValue::NotSet = active_model.created_at {
            active_model.created_at = Set(Utc::now());
        }
        Ok(active_model)
    }
}
