use rust_decimal::{Decimal, RoundingStrategy};

/// How a coupon's `discount_value` is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscountType {
    Percentage,
    Flat,
}

impl DiscountType {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "percentage" => Some(DiscountType::Percentage),
            "flat" => Some(DiscountType::Flat),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DiscountType::Percentage => "percentage",
            DiscountType::Flat => "flat",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrderTotals {
    pub subtotal: Decimal,
    pub discount_amount: Decimal,
    pub total: Decimal,
    /// Set when the requested discount exceeded the subtotal and was capped.
    pub discount_capped: bool,
}

pub fn line_subtotal(quantity: i32, unit_price: Decimal) -> Decimal {
    Decimal::from(quantity) * unit_price
}

/// Monetary discount for a coupon against a subtotal. Percentage values are
/// rounded to cents, midpoint away from zero.
pub fn discount_amount(
    discount_type: DiscountType,
    discount_value: Decimal,
    subtotal: Decimal,
) -> Decimal {
    match discount_type {
        DiscountType::Flat => discount_value,
        DiscountType::Percentage => (subtotal * discount_value / Decimal::ONE_HUNDRED)
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero),
    }
}

/// Derive subtotal, discount and total from order lines of
/// `(quantity, price_at_time)`. The discount is clamped into
/// `[0, subtotal]` so `total = subtotal - discount_amount` never goes
/// negative.
pub fn order_totals<I>(lines: I, discount: Decimal) -> OrderTotals
where
    I: IntoIterator<Item = (i32, Decimal)>,
{
    let subtotal: Decimal = lines
        .into_iter()
        .map(|(quantity, price)| line_subtotal(quantity, price))
        .sum();

    let requested = discount.max(Decimal::ZERO);
    let discount_amount = requested.min(subtotal);

    OrderTotals {
        subtotal,
        discount_amount,
        total: subtotal - discount_amount,
        discount_capped: requested > discount_amount,
    }
}
