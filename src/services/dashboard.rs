//! Shop overview: headline counts, today's bookings, recent and stalled
//! work, and six months of invoiced sales.

use crate::{
    db::DbPool,
    entities::{
        appointment, customer, inventory_item, invoice, vehicle, work_order, AppointmentStatus,
        InvoiceStatus, WorkOrderStatus,
    },
    errors::ServiceError,
    services::{
        appointments::{self, AppointmentSummary},
        pricing::AmountOverflow,
        work_orders::{self, WorkOrderSummary},
    },
};
use chrono::{DateTime, Datelike, Months, NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, instrument};
use utoipa::ToSchema;

const LIST_LIMIT: u64 = 5;
const SALES_MONTHS: u32 = 6;

const OPEN_WORK: [WorkOrderStatus; 3] = [
    WorkOrderStatus::Pending,
    WorkOrderStatus::InProgress,
    WorkOrderStatus::WaitingForParts,
];
const UNDERWAY_WORK: [WorkOrderStatus; 2] =
    [WorkOrderStatus::InProgress, WorkOrderStatus::WaitingForParts];
const BOOKED: [AppointmentStatus; 2] = [AppointmentStatus::Scheduled, AppointmentStatus::Confirmed];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DashboardCounts {
    pub customers: u64,
    pub vehicles: u64,
    pub work_orders: u64,
    /// PENDING, IN_PROGRESS or WAITING_FOR_PARTS
    pub active_work_orders: u64,
    pub appointments: u64,
    /// SCHEDULED or CONFIRMED, starting from now on
    pub upcoming_appointments: u64,
    pub inventory_items: u64,
    /// On hand at or below the minimum quantity
    pub low_stock_items: u64,
}

/// Invoiced sales for one calendar month, VOID invoices excluded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MonthlySales {
    /// `YYYY-MM`
    pub month: String,
    pub total: Decimal,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSummary {
    pub counts: DashboardCounts,
    pub todays_appointments: Vec<AppointmentSummary>,
    /// Most recently touched work orders that are not canceled
    pub recent_work_orders: Vec<WorkOrderSummary>,
    pub recent_work_orders_total: Decimal,
    /// In progress or waiting for parts, oldest start first
    pub incomplete_work_orders: Vec<WorkOrderSummary>,
    /// Oldest month first, months without sales reported as zero
    pub monthly_sales: Vec<MonthlySales>,
    pub generated_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct DashboardService {
    db_pool: Arc<DbPool>,
}

impl DashboardService {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    #[instrument(skip(self))]
    pub async fn summary(&self) -> Result<DashboardSummary, ServiceError> {
        let started = Instant::now();
        let now = Utc::now();
        let today = now.date_naive();

        let counts = self.counts(now).await?;
        let todays_appointments = self.todays_appointments(today).await?;

        let recent_work_orders = self.recent_work_orders().await?;
        let recent_work_orders_total = recent_work_orders
            .iter()
            .try_fold(Decimal::ZERO, |acc, wo| acc.checked_add(wo.subtotal))
            .ok_or(AmountOverflow)?;
        let incomplete_work_orders = self.incomplete_work_orders().await?;
        let monthly_sales = self.monthly_sales(today).await?;

        debug!(elapsed_ms = started.elapsed().as_millis() as u64, "dashboard built");
        Ok(DashboardSummary {
            counts,
            todays_appointments,
            recent_work_orders,
            recent_work_orders_total,
            incomplete_work_orders,
            monthly_sales,
            generated_at: now,
        })
    }

    async fn counts(&self, now: DateTime<Utc>) -> Result<DashboardCounts, ServiceError> {
        let db = &*self.db_pool;
        Ok(DashboardCounts {
            customers: customer::Entity::find().count(db).await?,
            vehicles: vehicle::Entity::find().count(db).await?,
            work_orders: work_order::Entity::find().count(db).await?,
            active_work_orders: work_order::Entity::find()
                .filter(work_order::Column::Status.is_in(OPEN_WORK))
                .count(db)
                .await?,
            appointments: appointment::Entity::find().count(db).await?,
            upcoming_appointments: appointment::Entity::find()
                .filter(appointment::Column::StartTime.gte(now))
                .filter(appointment::Column::Status.is_in(BOOKED))
                .count(db)
                .await?,
            inventory_items: inventory_item::Entity::find().count(db).await?,
            low_stock_items: inventory_item::Entity::find()
                .filter(
                    Expr::col(inventory_item::Column::Quantity)
                        .lte(Expr::col(inventory_item::Column::MinQuantity)),
                )
                .count(db)
                .await?,
        })
    }

    async fn todays_appointments(
        &self,
        today: NaiveDate,
    ) -> Result<Vec<AppointmentSummary>, ServiceError> {
        let db = &*self.db_pool;
        let rows = appointment::Entity::find()
            .filter(appointment::Column::Date.eq(today))
            .order_by_asc(appointment::Column::StartTime)
            .limit(LIST_LIMIT)
            .all(db)
            .await?;
        appointments::summarize(db, rows).await
    }

    async fn recent_work_orders(&self) -> Result<Vec<WorkOrderSummary>, ServiceError> {
        let db = &*self.db_pool;
        let rows = work_order::Entity::find()
            .filter(work_order::Column::Status.ne(WorkOrderStatus::Canceled))
            .order_by_desc(work_order::Column::UpdatedAt)
            .limit(LIST_LIMIT)
            .all(db)
            .await?;
        work_orders::summarize(db, rows).await
    }

    async fn incomplete_work_orders(&self) -> Result<Vec<WorkOrderSummary>, ServiceError> {
        let db = &*self.db_pool;
        let rows = work_order::Entity::find()
            .filter(work_order::Column::Status.is_in(UNDERWAY_WORK))
            .order_by_asc(work_order::Column::StartDate)
            .limit(LIST_LIMIT)
            .all(db)
            .await?;
        work_orders::summarize(db, rows).await
    }

    async fn monthly_sales(&self, today: NaiveDate) -> Result<Vec<MonthlySales>, ServiceError> {
        let first_month = sales_window_start(today)?;
        let since = first_month
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| ServiceError::InternalError("invalid sales window".to_string()))?
            .and_utc();

        let invoices: Vec<(DateTime<Utc>, Decimal)> = invoice::Entity::find()
            .select_only()
            .column(invoice::Column::Date)
            .column(invoice::Column::Total)
            .filter(invoice::Column::Status.ne(InvoiceStatus::Void))
            .filter(invoice::Column::Date.gte(since))
            .into_tuple()
            .all(&*self.db_pool)
            .await?;

        Ok(bucket_by_month(first_month, &invoices)?)
    }
}

/// First day of the month `SALES_MONTHS - 1` months before `today`.
fn sales_window_start(today: NaiveDate) -> Result<NaiveDate, ServiceError> {
    today
        .with_day(1)
        .and_then(|first| first.checked_sub_months(Months::new(SALES_MONTHS - 1)))
        .ok_or_else(|| ServiceError::InternalError("invalid sales window".to_string()))
}

/// Sums invoice totals into `SALES_MONTHS` consecutive months starting at
/// `first_month`. Invoices outside the window are ignored.
fn bucket_by_month(
    first_month: NaiveDate,
    invoices: &[(DateTime<Utc>, Decimal)],
) -> Result<Vec<MonthlySales>, AmountOverflow> {
    let mut months: BTreeMap<(i32, u32), Decimal> = (0..SALES_MONTHS)
        .filter_map(|offset| first_month.checked_add_months(Months::new(offset)))
        .map(|m| ((m.year(), m.month()), Decimal::ZERO))
        .collect();

    for (date, total) in invoices {
        if let Some(bucket) = months.get_mut(&(date.year(), date.month())) {
            *bucket = bucket.checked_add(*total).ok_or(AmountOverflow)?;
        }
    }

    Ok(months
        .into_iter()
        .map(|((year, month), total)| MonthlySales {
            month: format!("{:04}-{:02}", year, month),
            total,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn at(year: i32, month: u32, day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(year, month, day, 12, 0, 0).unwrap()
    }

    #[test]
    fn window_spans_six_months_across_new_year() {
        let start = sales_window_start(NaiveDate::from_ymd_opt(2026, 3, 17).unwrap()).unwrap();
        assert_eq!(start, NaiveDate::from_ymd_opt(2025, 10, 1).unwrap());
    }

    #[test]
    fn sales_are_bucketed_per_month_with_gaps_as_zero() {
        let first = NaiveDate::from_ymd_opt(2025, 10, 1).unwrap();
        let invoices = vec![
            (at(2025, 10, 3), dec!(100.00)),
            (at(2025, 10, 28), dec!(50.50)),
            (at(2026, 1, 9), dec!(253.00)),
            (at(2025, 9, 30), dec!(999.00)),
        ];

        let sales = bucket_by_month(first, &invoices).unwrap();
        let months: Vec<&str> = sales.iter().map(|s| s.month.as_str()).collect();
        assert_eq!(
            months,
            ["2025-10", "2025-11", "2025-12", "2026-01", "2026-02", "2026-03"]
        );
        assert_eq!(sales[0].total, dec!(150.50));
        assert_eq!(sales[1].total, Decimal::ZERO);
        assert_eq!(sales[3].total, dec!(253.00));
    }

    #[test]
    fn monthly_overflow_is_an_error() {
        let first = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let invoices = vec![(at(2026, 1, 2), Decimal::MAX), (at(2026, 1, 3), Decimal::MAX)];
        assert_eq!(bucket_by_month(first, &invoices), Err(AmountOverflow));
    }
}
