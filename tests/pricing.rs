use axum_storefront_api::pricing::{
    DiscountType, discount_amount, line_subtotal, order_totals,
};
use axum_storefront_api::slug::slugify;
use rust_decimal::Decimal;

fn dec(value: &str) -> Decimal {
    value.parse().expect("decimal literal")
}

#[test]
fn line_subtotal_multiplies_quantity_and_price() {
    assert_eq!(line_subtotal(2, dec("10.00")), dec("20.00"));
    assert_eq!(line_subtotal(1, dec("5.00")), dec("5.00"));
}

#[test]
fn totals_without_coupon() {
    let totals = order_totals([(2, dec("10.00")), (1, dec("5.00"))], Decimal::ZERO);
    assert_eq!(totals.subtotal, dec("25.00"));
    assert_eq!(totals.discount_amount, Decimal::ZERO);
    assert_eq!(totals.total, dec("25.00"));
    assert!(!totals.discount_capped);
}

#[test]
fn totals_with_flat_coupon() {
    let subtotal_lines = [(2, dec("10.00")), (1, dec("5.00"))];
    let discount = discount_amount(DiscountType::Flat, dec("5.00"), dec("25.00"));
    let totals = order_totals(subtotal_lines, discount);
    assert_eq!(totals.discount_amount, dec("5.00"));
    assert_eq!(totals.total, dec("20.00"));
}

#[test]
fn totals_with_percentage_coupon() {
    let discount = discount_amount(DiscountType::Percentage, dec("10"), dec("25.00"));
    assert_eq!(discount, dec("2.50"));

    let totals = order_totals([(2, dec("10.00")), (1, dec("5.00"))], discount);
    assert_eq!(totals.discount_amount, dec("2.50"));
    assert_eq!(totals.total, dec("22.50"));
}

#[test]
fn percentage_discount_rounds_to_cents() {
    // 15% of 9.99 = 1.4985 -> 1.50
    let discount = discount_amount(DiscountType::Percentage, dec("15"), dec("9.99"));
    assert_eq!(discount, dec("1.50"));
}

#[test]
fn total_never_goes_negative() {
    let totals = order_totals([(1, dec("5.00"))], dec("30.00"));
    assert_eq!(totals.subtotal, dec("5.00"));
    assert_eq!(totals.discount_amount, dec("5.00"));
    assert_eq!(totals.total, Decimal::ZERO);
    assert!(totals.discount_capped);
    // The derived-field invariant holds even when capped.
    assert_eq!(totals.total, totals.subtotal - totals.discount_amount);
}

#[test]
fn negative_discount_is_ignored() {
    let totals = order_totals([(1, dec("5.00"))], dec("-3.00"));
    assert_eq!(totals.discount_amount, Decimal::ZERO);
    assert_eq!(totals.total, dec("5.00"));
}

#[test]
fn empty_order_totals_to_zero() {
    let totals = order_totals(std::iter::empty::<(i32, Decimal)>(), Decimal::ZERO);
    assert_eq!(totals.subtotal, Decimal::ZERO);
    assert_eq!(totals.total, Decimal::ZERO);
}

#[test]
fn slugify_lowercases_and_dashes() {
    assert_eq!(slugify("Winter Sale 2025"), "winter-sale-2025");
    assert_eq!(slugify("  Crab   Hoodie! "), "crab-hoodie");
    assert_eq!(slugify("Ferris"), "ferris");
}
