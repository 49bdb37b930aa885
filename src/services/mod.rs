pub mod appointments;
pub mod customers;
pub mod dashboard;
pub mod inventory;
pub mod invoices;
pub mod pricing;
pub mod technicians;
pub mod validation;
pub mod vehicles;
pub mod work_orders;

use crate::errors::ServiceError;
use sea_orm::{
    sea_query::Expr, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QuerySelect,
};
use serde::{Deserialize, Deserializer};
use std::collections::HashMap;
use uuid::Uuid;

/// Counts rows of `E` per value of `group_column`, limited to `ids`.
pub(crate) async fn count_grouped<E, C>(
    db: &C,
    group_column: E::Column,
    id_column: E::Column,
    ids: &[Uuid],
) -> Result<HashMap<Uuid, i64>, ServiceError>
where
    E: EntityTrait,
    C: ConnectionTrait,
{
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    let rows: Vec<(Uuid, i64)> = E::find()
        .select_only()
        .column(group_column)
        .column_as(Expr::col(id_column).count(), "count")
        .filter(group_column.is_in(ids.iter().copied()))
        .group_by(group_column)
        .into_tuple()
        .all(db)
        .await?;
    Ok(rows.into_iter().collect())
}

/// Distinguishes an absent field (`None`) from an explicit `null`
/// (`Some(None)`) so updates can clear optional references.
pub(crate) fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
