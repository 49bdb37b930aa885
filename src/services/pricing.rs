//! Pure money and display helpers shared by work orders and invoices.

use crate::entities::work_order_line_item;
use chrono::{Datelike, Utc};
use rand::Rng;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::Serialize;
use utoipa::ToSchema;

/// Default sales tax applied to work-order subtotals.
pub const DEFAULT_TAX_RATE: Decimal = dec!(0.0875);

/// A line or total that does not fit in a `Decimal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Line item amounts are too large")]
pub struct AmountOverflow;

/// Anything that can be billed as a work-order line.
pub trait Billable {
    fn quantity(&self) -> i32;
    fn unit_price(&self) -> Decimal;
    fn labor_hours(&self) -> Option<Decimal>;
    fn labor_rate(&self) -> Option<Decimal>;

    fn cost(&self) -> Result<Decimal, AmountOverflow> {
        line_item_cost(
            self.quantity(),
            self.unit_price(),
            self.labor_hours(),
            self.labor_rate(),
        )
    }
}

impl Billable for work_order_line_item::Model {
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

/// Parts plus labor. Labor only counts when both hours and rate are present.
pub fn line_item_cost(
    quantity: i32,
    unit_price: Decimal,
    labor_hours: Option<Decimal>,
    labor_rate: Option<Decimal>,
) -> Result<Decimal, AmountOverflow> {
    let parts = Decimal::from(quantity)
        .checked_mul(unit_price)
        .ok_or(AmountOverflow)?;
    let labor = match (labor_hours, labor_rate) {
        (Some(hours), Some(rate)) => hours.checked_mul(rate).ok_or(AmountOverflow)?,
        _ => Decimal::ZERO,
    };
    parts.checked_add(labor).ok_or(AmountOverflow)
}

pub fn calculate_subtotal<'a, B, I>(items: I) -> Result<Decimal, AmountOverflow>
where
    B: Billable + 'a,
    I: IntoIterator<Item = &'a B>,
{
    items.into_iter().try_fold(Decimal::ZERO, |acc, item| {
        acc.checked_add(item.cost()?).ok_or(AmountOverflow)
    })
}

pub fn calculate_tax(subtotal: Decimal, tax_rate: Decimal) -> Result<Decimal, AmountOverflow> {
    subtotal.checked_mul(tax_rate).ok_or(AmountOverflow)
}

pub fn calculate_total(subtotal: Decimal, tax: Decimal) -> Result<Decimal, AmountOverflow> {
    subtotal.checked_add(tax).ok_or(AmountOverflow)
}

/// Subtotal, tax and total for a set of lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Totals {
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
}

impl Totals {
    pub fn compute<'a, B, I>(items: I, tax_rate: Decimal) -> Result<Self, AmountOverflow>
    where
        B: Billable + 'a,
        I: IntoIterator<Item = &'a B>,
    {
        let subtotal = calculate_subtotal(items)?;
        let tax = calculate_tax(subtotal, tax_rate)?;
        Ok(Self {
            subtotal,
            tax,
            total: calculate_total(subtotal, tax)?,
        })
    }

    /// Rounds each figure to cents, as stored on an invoice.
    pub fn to_cents(self) -> Result<Self, AmountOverflow> {
        let round = |d: Decimal| d.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        let subtotal = round(self.subtotal);
        let tax = round(self.tax);
        Ok(Self {
            subtotal,
            tax,
            total: calculate_total(subtotal, tax)?,
        })
    }
}

/// US dollar formatting: `$1,234.50`, negatives as `-$5.00`.
pub fn format_currency(amount: Decimal) -> String {
    let rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    let sign = if rounded.is_sign_negative() && !rounded.is_zero() {
        "-"
    } else {
        ""
    };
    let text = format!("{:.2}", rounded.abs());
    let (whole, cents) = text.split_once('.').unwrap_or((text.as_str(), "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    format!("{sign}${grouped}.{cents}")
}

/// Decimal hours as `1h 30m`.
pub fn format_hours(hours: Decimal) -> String {
    let mut h = hours.trunc();
    let mut m = ((hours - h) * dec!(60))
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
    if m >= dec!(60) {
        h += Decimal::ONE;
        m -= dec!(60);
    }
    format!("{}h {}m", h.normalize(), m.normalize())
}

/// `WO-` followed by the last six digits of the epoch millis and a
/// three-digit random suffix.
pub fn generate_order_number() -> String {
    let millis = Utc::now().timestamp_millis().unsigned_abs() % 1_000_000;
    let random: u16 = rand::thread_rng().gen_range(0..1000);
    format!("WO-{:06}{:03}", millis, random)
}

/// `INV-<YY><MM>-<NNNN>`.
pub fn generate_invoice_number() -> String {
    let now = Utc::now();
    let random: u16 = rand::thread_rng().gen_range(0..10_000);
    format!(
        "INV-{:02}{:02}-{:04}",
        now.year() % 100,
        now.month(),
        random
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    struct Line(i32, Decimal, Option<Decimal>, Option<Decimal>);

    impl Billable for Line {
        fn quantity(&self) -> i32 {
            self.0
        }
        fn unit_price(&self) -> Decimal {
            self.1
        }
        fn labor_hours(&self) -> Option<Decimal> {
            self.2
        }
        fn labor_rate(&self) -> Option<Decimal> {
            self.3
        }
    }

    #[test]
    fn labor_requires_hours_and_rate() {
        assert_eq!(line_item_cost(2, dec!(10), Some(dec!(1.5)), None), Ok(dec!(20)));
        assert_eq!(line_item_cost(2, dec!(10), None, Some(dec!(90))), Ok(dec!(20)));
        assert_eq!(
            line_item_cost(2, dec!(10), Some(dec!(1.5)), Some(dec!(90))),
            Ok(dec!(155))
        );
    }

    #[test]
    fn oversized_amounts_are_reported_not_panicked() {
        assert_eq!(
            line_item_cost(i32::MAX, dec!(40000000000000000000), None, None),
            Err(AmountOverflow)
        );
        assert_eq!(
            line_item_cost(1, dec!(1), Some(Decimal::MAX), Some(dec!(2))),
            Err(AmountOverflow)
        );

        let lines = vec![
            Line(1, Decimal::MAX, None, None),
            Line(1, Decimal::MAX, None, None),
        ];
        assert_eq!(calculate_subtotal(&lines), Err(AmountOverflow));
        assert_eq!(Totals::compute(&lines, DEFAULT_TAX_RATE), Err(AmountOverflow));
    }

    #[test]
    fn totals_for_mixed_lines() {
        let lines = vec![
            Line(4, dec!(12.50), None, None),
            Line(1, dec!(0), Some(dec!(2)), Some(dec!(100))),
        ];
        let totals = Totals::compute(&lines, DEFAULT_TAX_RATE).unwrap();
        assert_eq!(totals.subtotal, dec!(250));
        assert_eq!(totals.tax, dec!(21.875));
        assert_eq!(totals.total, dec!(271.875));

        let cents = totals.to_cents().unwrap();
        assert_eq!(cents.tax, dec!(21.88));
        assert_eq!(cents.total, dec!(271.88));
    }

    #[test]
    fn empty_lines_cost_nothing() {
        let lines: Vec<Line> = Vec::new();
        let totals = Totals::compute(&lines, DEFAULT_TAX_RATE).unwrap();
        assert_eq!(totals.total, Decimal::ZERO);
    }

    #[rstest]
    #[case(dec!(1234.5), "$1,234.50")]
    #[case(dec!(0), "$0.00")]
    #[case(dec!(-5), "-$5.00")]
    #[case(dec!(999.999), "$1,000.00")]
    #[case(dec!(1234567.891), "$1,234,567.89")]
    #[case(dec!(12), "$12.00")]
    fn currency_formatting(#[case] amount: Decimal, #[case] expected: &str) {
        assert_eq!(format_currency(amount), expected);
    }

    #[rstest]
    #[case(dec!(1.5), "1h 30m")]
    #[case(dec!(2), "2h 0m")]
    #[case(dec!(0.25), "0h 15m")]
    #[case(dec!(1.999), "2h 0m")]
    fn hours_formatting(#[case] hours: Decimal, #[case] expected: &str) {
        assert_eq!(format_hours(hours), expected);
    }

    #[test]
    fn order_number_shape() {
        let number = generate_order_number();
        assert!(number.starts_with("WO-"));
        let digits = &number[3..];
        assert_eq!(digits.len(), 9);
        assert!(digits.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn invoice_number_shape() {
        let number = generate_invoice_number();
        let parts: Vec<&str> = number.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "INV");
        assert_eq!(parts[1].len(), 4);
        assert_eq!(parts[2].len(), 4);
        let month: u32 = parts[1][2..].parse().unwrap();
        assert!((1..=12).contains(&month));
    }

    proptest! {
        #[test]
        fn total_never_below_subtotal(
            qty in 1i32..500,
            cents in 0i64..1_000_000,
            hours in proptest::option::of(0i64..4000),
        ) {
            let price = Decimal::new(cents, 2);
            let labor = hours.map(|h| Decimal::new(h, 2));
            let lines = vec![Line(qty, price, labor, labor.map(|_| dec!(95)))];
            let totals = Totals::compute(&lines, DEFAULT_TAX_RATE).unwrap();
            prop_assert!(totals.total >= totals.subtotal);
            prop_assert_eq!(totals.tax, totals.subtotal * DEFAULT_TAX_RATE);
        }
    }
}
