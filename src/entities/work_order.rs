use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, Set};
use serde::{Deserialize, Serialize};
use strum::AsRefStr;
use utoipa::ToSchema;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
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
pub enum WorkOrderStatus {
    #[sea_orm(string_value = "PENDING")]
    Pending,
    #[sea_orm(string_value = "IN_PROGRESS")]
    InProgress,
    #[sea_orm(string_value = "WAITING_FOR_PARTS")]
    WaitingForParts,
    #[sea_orm(string_value = "COMPLETED")]
    Completed,
    #[sea_orm(string_value = "INVOICED")]
    Invoiced,
    #[sea_orm(string_value = "PAID")]
    Paid,
    #[sea_orm(string_value = "CANCELED")]
    Canceled,
}

impl WorkOrderStatus {
    /// Statuses that no longer count as open work for delete guards.
    pub const INACTIVE: [WorkOrderStatus; 3] = [
        WorkOrderStatus::Completed,
        WorkOrderStatus::Canceled,
        WorkOrderStatus::Paid,
    ];

    /// A work order is active until it is completed, canceled or paid.
    pub fn is_active(self) -> bool {
        !Self::INACTIVE.contains(&self)
    }

    /// Invoiced and paid orders, and their line items, are frozen.
    pub fn is_locked(self) -> bool {
        matches!(self, WorkOrderStatus::Invoiced | WorkOrderStatus::Paid)
    }

    /// Whether the lifecycle allows moving from `self` to `next`.
    ///
    /// `INVOICED` and `PAID` are only reachable through invoicing and
    /// payment, and `VOID`ing an invoice is the only way back from
    /// `INVOICED` to `COMPLETED`. Setting the current status again is a no-op
    /// and always allowed.
    pub fn can_transition_to(self, next: WorkOrderStatus) -> bool {
        use WorkOrderStatus::*;
        if self == next {
            return true;
        }
        match (self, next) {
            (Pending, InProgress | WaitingForParts | Completed | Canceled) => true,
            (InProgress, Pending | WaitingForParts | Completed | Canceled) => true,
            (WaitingForParts, InProgress | Completed | Canceled) => true,
            (Completed, InProgress | Invoiced | Canceled) => true,
            (Invoiced, Paid | Completed) => true,
            _ => false,
        }
    }

    /// Statuses a client may request directly through the update endpoint.
    pub fn is_client_settable(self) -> bool {
        !self.is_locked()
    }
}

/// A repair job for one vehicle of one customer.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "work_orders")]
#[serde(rename_all = "camelCase")]
#[schema(as = WorkOrder)]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub order_number: String,
    pub status: WorkOrderStatus,
    pub description: String,
    #[sea_orm(nullable)]
    pub diagnostic_notes: Option<String>,
    pub start_date: DateTime<Utc>,
    #[sea_orm(nullable)]
    pub completion_date: Option<DateTime<Utc>>,
    pub customer_id: Uuid,
    pub vehicle_id: Uuid,
    #[sea_orm(nullable)]
    pub technician_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::customer::Entity",
        from = "Column::CustomerId",
        to = "super::customer::Column::Id",
        on_delete = "Cascade"
    )]
    Customer,
    #[sea_orm(
        belongs_to = "super::vehicle::Entity",
        from = "Column::VehicleId",
        to = "super::vehicle::Column::Id",
        on_delete = "Cascade"
    )]
    Vehicle,
    #[sea_orm(
        belongs_to = "super::technician::Entity",
        from = "Column::TechnicianId",
        to = "super::technician::Column::Id",
        on_delete = "SetNull"
    )]
    Technician,
    #[sea_orm(has_many = "super::work_order_line_item::Entity")]
    LineItems,
    #[sea_orm(has_one = "super::invoice::Entity")]
    Invoice,
}

impl Related<super::customer::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Customer.def()
    }
}

impl Related<super::vehicle::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Vehicle.def()
    }
}

impl Related<super::technician::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Technician.def()
    }
}

impl Related<super::work_order_line_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::LineItems.def()
    }
}

impl Related<super::invoice::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Invoice.def()
    }
}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C>(self, _db: &C, _insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let mut active_model = self;
        let now = Utc::now();
        if let ActiveValue::NotSet = active_model.created_at {
            active_model.created_at = Set(now);
        }
        active_model.updated_at = Set(now);
        Ok(active_model)
    }
}

#[cfg(test)]
mod tests {
    use super::WorkOrderStatus::{self, *};
    use rstest::rstest;

    #[rstest]
    #[case(Pending, InProgress, true)]
    #[case(InProgress, WaitingForParts, true)]
    #[case(WaitingForParts, Completed, true)]
    #[case(Completed, Invoiced, true)]
    #[case(Invoiced, Paid, true)]
    #[case(Invoiced, Completed, true)]
    #[case(Pending, Canceled, true)]
    #[case(Canceled, Pending, false)]
    #[case(Paid, Completed, false)]
    #[case(Pending, Paid, false)]
    #[case(WaitingForParts, Pending, false)]
    #[case(Completed, Completed, true)]
    fn transition_table(
        #[case] from: WorkOrderStatus,
        #[case] to: WorkOrderStatus,
        #[case] allowed: bool,
    ) {
        assert_eq!(from.can_transition_to(to), allowed);
    }

    #[test]
    fn activity_and_locking() {
        assert!(Pending.is_active());
        assert!(Invoiced.is_active());
        assert!(!Completed.is_active());
        assert!(!Canceled.is_active());
        assert!(!Paid.is_active());

        assert!(Invoiced.is_locked());
        assert!(Paid.is_locked());
        assert!(!Completed.is_locked());
    }

    #[test]
    fn status_strings_match_wire_format() {
        assert_eq!(WaitingForParts.as_ref(), "WAITING_FOR_PARTS");
        assert_eq!(
            serde_json::from_value::<WorkOrderStatus>(serde_json::json!("IN_PROGRESS")).unwrap(),
            InProgress
        );
        assert_eq!(
            serde_json::to_value(Canceled).unwrap(),
            serde_json::json!("CANCELED")
        );
    }
}
