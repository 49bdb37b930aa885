//! Invoicing and payments.
//!
//! An invoice snapshots the work order's totals at generation time. Every
//! write here also moves the owning work order along its lifecycle, so each
//! operation runs in one transaction.

use crate::{
    db::{self, DbPool},
    entities::{
        customer, invoice, payment, work_order, work_order_line_item, InvoiceStatus,
        PaymentMethod, WorkOrderStatus,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        customers::CustomerRef,
        pricing::{self, Totals},
        validation::{non_blank, required},
    },
};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, LoaderTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument, warn};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

const INVOICE_NUMBER_ATTEMPTS: usize = 5;

#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct InvoiceFilters {
    #[param(value_type = Option<String>)]
    pub status: Option<InvoiceStatus>,
    pub customer_id: Option<Uuid>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GenerateInvoiceInput {
    pub notes: Option<String>,
    /// Defaults to the configured payment terms
    pub due_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateInvoiceInput {
    /// Only `SENT` and `OVERDUE` may be set directly
    pub status: Option<InvoiceStatus>,
    pub notes: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaymentInput {
    pub amount: Option<Decimal>,
    pub method: Option<PaymentMethod>,
    pub reference: Option<String>,
    pub date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceSummary {
    #[serde(flatten)]
    pub invoice: invoice::Model,
    pub customer: Option<CustomerRef>,
    pub order_number: Option<String>,
    pub amount_paid: Decimal,
    pub balance_due: Decimal,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceDetail {
    #[serde(flatten)]
    pub invoice: invoice::Model,
    pub customer: customer::Model,
    pub work_order: work_order::Model,
    pub line_items: Vec<work_order_line_item::Model>,
    pub payments: Vec<payment::Model>,
    pub amount_paid: Decimal,
    pub balance_due: Decimal,
    /// False when the work order's lines no longer add up to the snapshot
    pub totals_match_line_items: bool,
}

fn amount_paid(payments: &[payment::Model]) -> Decimal {
    payments.iter().map(|p| p.amount).sum()
}

/// Status after the paid amount reaches `paid` against `total`.
fn status_after_payment(paid: Decimal, total: Decimal) -> InvoiceStatus {
    if paid >= total {
        InvoiceStatus::Paid
    } else {
        InvoiceStatus::PartiallyPaid
    }
}

#[derive(Clone)]
pub struct InvoiceService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    tax_rate: Decimal,
    payment_terms_days: i64,
}

impl InvoiceService {
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        tax_rate: Decimal,
        payment_terms_days: i64,
    ) -> Self {
        Self {
            db_pool,
            event_sender,
            tax_rate,
            payment_terms_days,
        }
    }

    #[instrument(skip(self))]
    pub async fn list_invoices(
        &self,
        filters: InvoiceFilters,
    ) -> Result<Vec<InvoiceSummary>, ServiceError> {
        let db = &*self.db_pool;
        let mut query = invoice::Entity::find();
        if let Some(status) = filters.status {
            query = query.filter(invoice::Column::Status.eq(status));
        }
        if let Some(customer_id) = filters.customer_id {
            query = query.filter(invoice::Column::CustomerId.eq(customer_id));
        }

        let invoices = query.order_by_desc(invoice::Column::Date).all(db).await?;
        let customers = invoices.load_one(customer::Entity, db).await?;
        let work_orders = invoices.load_one(work_order::Entity, db).await?;
        let payments = invoices.load_many(payment::Entity, db).await?;

        Ok(invoices
            .into_iter()
            .zip(customers)
            .zip(work_orders)
            .zip(payments)
            .map(|(((invoice, customer), work_order), payments)| {
                let paid = amount_paid(&payments);
                InvoiceSummary {
                    balance_due: invoice.total - paid,
                    amount_paid: paid,
                    customer: customer.as_ref().map(CustomerRef::from),
                    order_number: work_order.map(|wo| wo.order_number),
                    invoice,
                }
            })
            .collect())
    }

    #[instrument(skip(self))]
    pub async fn get_invoice(&self, id: Uuid) -> Result<InvoiceDetail, ServiceError> {
        let db = &*self.db_pool;
        let invoice = find_invoice(db, id).await?;

        let customer = customer::Entity::find_by_id(invoice.customer_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Customer"))?;
        let work_order = work_order::Entity::find_by_id(invoice.work_order_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Work order"))?;
        let line_items = work_order_line_item::Entity::find()
            .filter(work_order_line_item::Column::WorkOrderId.eq(work_order.id))
            .order_by_asc(work_order_line_item::Column::Position)
            .all(db)
            .await?;
        let payments = payment::Entity::find()
            .filter(payment::Column::InvoiceId.eq(id))
            .order_by_asc(payment::Column::Date)
            .all(db)
            .await?;

        let recomputed = Totals::compute(&line_items, self.tax_rate).and_then(Totals::to_cents);
        let snapshot = Totals {
            subtotal: invoice.subtotal,
            tax: invoice.tax,
            total: invoice.total,
        };
        let paid = amount_paid(&payments);

        Ok(InvoiceDetail {
            totals_match_line_items: recomputed == Ok(snapshot),
            amount_paid: paid,
            balance_due: invoice.total - paid,
            invoice,
            customer,
            work_order,
            line_items,
            payments,
        })
    }

    /// Invoices a completed work order and moves it to `INVOICED`. A voided
    /// invoice left from an earlier attempt is replaced.
    #[instrument(skip(self, input))]
    pub async fn generate_invoice(
        &self,
        work_order_id: Uuid,
        input: GenerateInvoiceInput,
    ) -> Result<invoice::Model, ServiceError> {
        let started = Instant::now();
        let txn = db::begin(&self.db_pool).await?;

        let work_order = work_order::Entity::find_by_id(work_order_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::not_found("Work order"))?;
        if work_order.status != WorkOrderStatus::Completed {
            return Err(ServiceError::ValidationError(
                "Only completed work orders can be invoiced".to_string(),
            ));
        }

        if let Some(previous) = invoice::Entity::find()
            .filter(invoice::Column::WorkOrderId.eq(work_order_id))
            .one(&txn)
            .await?
        {
            if previous.status != InvoiceStatus::Void {
                return Err(ServiceError::ValidationError(
                    "This work order already has an invoice".to_string(),
                ));
            }
            invoice::Entity::delete_by_id(previous.id).exec(&txn).await?;
        }

        let lines = work_order_line_item::Entity::find()
            .filter(work_order_line_item::Column::WorkOrderId.eq(work_order_id))
            .all(&txn)
            .await?;
        let totals = Totals::compute(&lines, self.tax_rate)?.to_cents()?;

        let invoice_number = allocate_invoice_number(&txn).await?;
        let now = Utc::now();
        let invoice = invoice::ActiveModel {
            id: Set(Uuid::new_v4()),
            invoice_number: Set(invoice_number.clone()),
            status: Set(InvoiceStatus::Pending),
            date: Set(now),
            due_date: Set(input
                .due_date
                .unwrap_or_else(|| now + Duration::days(self.payment_terms_days))),
            subtotal: Set(totals.subtotal),
            tax: Set(totals.tax),
            total: Set(totals.total),
            notes: Set(non_blank(input.notes)),
            customer_id: Set(work_order.customer_id),
            work_order_id: Set(work_order_id),
            ..Default::default()
        }
        .insert(&txn)
        .await
        .map_err(|e| {
            ServiceError::unique_violation_or_db(e, "This work order already has an invoice")
        })?;

        set_work_order_status(&txn, work_order, WorkOrderStatus::Invoiced).await?;
        db::commit(txn, started).await?;

        info!(invoice_id = %invoice.id, %invoice_number, %work_order_id, total = %invoice.total, "invoice generated");
        self.event_sender
            .publish([
                Event::InvoiceGenerated {
                    invoice_id: invoice.id,
                    work_order_id,
                    total: invoice.total,
                },
                Event::WorkOrderStatusChanged {
                    work_order_id,
                    old_status: WorkOrderStatus::Completed,
                    new_status: WorkOrderStatus::Invoiced,
                },
            ])
            .await;
        Ok(invoice)
    }

    /// Records a payment. Paying the balance in full marks both the invoice
    /// and its work order as paid.
    #[instrument(skip(self, input))]
    pub async fn record_payment(
        &self,
        invoice_id: Uuid,
        input: PaymentInput,
    ) -> Result<payment::Model, ServiceError> {
        let amount = required("amount", input.amount)?;
        let method = input
            .method
            .ok_or_else(|| ServiceError::ValidationError("method is required".to_string()))?;
        if amount <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Payment amount must be greater than zero".to_string(),
            ));
        }

        let started = Instant::now();
        let txn = db::begin(&self.db_pool).await?;
        let invoice = find_invoice(&txn, invoice_id).await?;
        if !invoice.status.is_unpaid() {
            return Err(ServiceError::ValidationError(format!(
                "Cannot record a payment on a {} invoice",
                invoice.status.as_ref()
            )));
        }

        let payments = payment::Entity::find()
            .filter(payment::Column::InvoiceId.eq(invoice_id))
            .all(&txn)
            .await?;
        let paid = amount_paid(&payments);
        let balance = invoice.total - paid;
        if amount > balance {
            return Err(ServiceError::ValidationError(format!(
                "Payment of {} exceeds the outstanding balance of {}",
                pricing::format_currency(amount),
                pricing::format_currency(balance)
            )));
        }

        let payment = payment::ActiveModel {
            id: Set(Uuid::new_v4()),
            invoice_id: Set(invoice_id),
            amount: Set(amount),
            method: Set(method),
            reference: Set(non_blank(input.reference)),
            date: Set(input.date.unwrap_or_else(Utc::now)),
            notes: Set(non_blank(input.notes)),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        let new_status = status_after_payment(paid + amount, invoice.total);
        let work_order_id = invoice.work_order_id;
        let mut active: invoice::ActiveModel = invoice.into();
        active.status = Set(new_status);
        active.update(&txn).await?;

        let mut events = vec![Event::PaymentRecorded {
            invoice_id,
            payment_id: payment.id,
            amount,
            invoice_status: new_status,
        }];
        if new_status == InvoiceStatus::Paid {
            let work_order = work_order::Entity::find_by_id(work_order_id)
                .one(&txn)
                .await?
                .ok_or_else(|| ServiceError::not_found("Work order"))?;
            let old_status = work_order.status;
            set_work_order_status(&txn, work_order, WorkOrderStatus::Paid).await?;
            events.push(Event::WorkOrderStatusChanged {
                work_order_id,
                old_status,
                new_status: WorkOrderStatus::Paid,
            });
        }

        db::commit(txn, started).await?;
        info!(%invoice_id, payment_id = %payment.id, %amount, status = new_status.as_ref(), "payment recorded");
        self.event_sender.publish(events).await;
        Ok(payment)
    }

    /// Voids an invoice with no payments and reopens its work order as
    /// `COMPLETED`.
    #[instrument(skip(self))]
    pub async fn void_invoice(&self, id: Uuid) -> Result<invoice::Model, ServiceError> {
        let started = Instant::now();
        let txn = db::begin(&self.db_pool).await?;
        let invoice = find_invoice(&txn, id).await?;

        if invoice.status == InvoiceStatus::Void {
            return Err(ServiceError::ValidationError(
                "Invoice is already void".to_string(),
            ));
        }
        let has_payments = payment::Entity::find()
            .filter(payment::Column::InvoiceId.eq(id))
            .one(&txn)
            .await?
            .is_some();
        if has_payments {
            return Err(ServiceError::ValidationError(
                "Cannot void an invoice that has payments".to_string(),
            ));
        }

        let work_order_id = invoice.work_order_id;
        let mut active: invoice::ActiveModel = invoice.into();
        active.status = Set(InvoiceStatus::Void);
        let invoice = active.update(&txn).await?;

        let mut events = vec![Event::InvoiceVoided(id)];
        if let Some(work_order) = work_order::Entity::find_by_id(work_order_id)
            .one(&txn)
            .await?
        {
            let old_status = work_order.status;
            if old_status != WorkOrderStatus::Completed {
                set_work_order_status(&txn, work_order, WorkOrderStatus::Completed).await?;
                events.push(Event::WorkOrderStatusChanged {
                    work_order_id,
                    old_status,
                    new_status: WorkOrderStatus::Completed,
                });
            }
        } else {
            warn!(invoice_id = %id, %work_order_id, "voided invoice has no work order");
        }

        db::commit(txn, started).await?;
        info!(invoice_id = %id, "invoice voided");
        self.event_sender.publish(events).await;
        Ok(invoice)
    }

    #[instrument(skip(self, input))]
    pub async fn update_invoice(
        &self,
        id: Uuid,
        input: UpdateInvoiceInput,
    ) -> Result<invoice::Model, ServiceError> {
        let db = &*self.db_pool;
        let invoice = find_invoice(db, id).await?;
        if !invoice.status.is_unpaid() {
            return Err(ServiceError::ValidationError(format!(
                "Cannot update a {} invoice",
                invoice.status.as_ref()
            )));
        }

        let mut active: invoice::ActiveModel = invoice.clone().into();
        if let Some(status) = input.status {
            check_manual_status(invoice.status, status)?;
            active.status = Set(status);
        }
        if let Some(notes) = input.notes {
            active.notes = Set(non_blank(Some(notes)));
        }
        if let Some(due_date) = input.due_date {
            active.due_date = Set(due_date);
        }
        let invoice = active.update(db).await?;

        info!(invoice_id = %id, status = invoice.status.as_ref(), "invoice updated");
        self.event_sender.publish([Event::InvoiceUpdated(id)]).await;
        Ok(invoice)
    }
}

/// Only delivery state may be set by hand; payment states follow payments.
fn check_manual_status(current: InvoiceStatus, next: InvoiceStatus) -> Result<(), ServiceError> {
    if current == next {
        return Ok(());
    }
    match (current, next) {
        (InvoiceStatus::PartiallyPaid, InvoiceStatus::Overdue) => Ok(()),
        (InvoiceStatus::PartiallyPaid, _) => Err(ServiceError::ValidationError(
            "A partially paid invoice can only be marked OVERDUE".to_string(),
        )),
        (_, InvoiceStatus::Sent | InvoiceStatus::Overdue) => Ok(()),
        (_, other) => Err(ServiceError::ValidationError(format!(
            "Invoice status cannot be set to {}",
            other.as_ref()
        ))),
    }
}

async fn find_invoice<C: ConnectionTrait>(db: &C, id: Uuid) -> Result<invoice::Model, ServiceError> {
    invoice::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| ServiceError::not_found("Invoice"))
}

async fn set_work_order_status<C: ConnectionTrait>(
    db: &C,
    work_order: work_order::Model,
    status: WorkOrderStatus,
) -> Result<work_order::Model, ServiceError> {
    let mut active: work_order::ActiveModel = work_order.into();
    active.status = Set(status);
    Ok(active.update(db).await?)
}

async fn allocate_invoice_number<C: ConnectionTrait>(db: &C) -> Result<String, ServiceError> {
    for attempt in 1..=INVOICE_NUMBER_ATTEMPTS {
        let candidate = pricing::generate_invoice_number();
        let taken = invoice::Entity::find()
            .filter(invoice::Column::InvoiceNumber.eq(candidate.as_str()))
            .one(db)
            .await?
            .is_some();
        if !taken {
            return Ok(candidate);
        }
        warn!(attempt, %candidate, "invoice number collision");
    }
    Err(ServiceError::InternalError(
        "could not allocate a unique invoice number".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;

    #[test]
    fn payment_status_follows_balance() {
        assert_eq!(
            status_after_payment(dec!(50), dec!(108.75)),
            InvoiceStatus::PartiallyPaid
        );
        assert_eq!(
            status_after_payment(dec!(108.75), dec!(108.75)),
            InvoiceStatus::Paid
        );
    }

    #[test]
    fn manual_status_changes_are_limited_to_delivery_states() {
        assert!(check_manual_status(InvoiceStatus::Pending, InvoiceStatus::Sent).is_ok());
        assert!(check_manual_status(InvoiceStatus::Sent, InvoiceStatus::Overdue).is_ok());
        assert!(check_manual_status(InvoiceStatus::PartiallyPaid, InvoiceStatus::Overdue).is_ok());
        assert_matches!(
            check_manual_status(InvoiceStatus::Pending, InvoiceStatus::Paid),
            Err(ServiceError::ValidationError(msg)) if msg == "Invoice status cannot be set to PAID"
        );
        assert_matches!(
            check_manual_status(InvoiceStatus::PartiallyPaid, InvoiceStatus::Sent),
            Err(ServiceError::ValidationError(_))
        );
    }
}
