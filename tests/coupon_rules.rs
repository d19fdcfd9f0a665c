use axum_storefront_api::entity::coupons;
use axum_storefront_api::services::coupon_service::is_valid;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

fn coupon(
    active: bool,
    valid_from: DateTime<Utc>,
    valid_until: DateTime<Utc>,
    usage_limit: Option<i32>,
    used_count: i32,
) -> coupons::Model {
    coupons::Model {
        id: Uuid::new_v4(),
        code: "TEST".into(),
        discount_type: "flat".into(),
        discount_value: Decimal::new(500, 2),
        min_cart_value: Decimal::ZERO,
        valid_from: valid_from.into(),
        valid_until: valid_until.into(),
        active,
        usage_limit,
        used_count,
        applicable_to_all: true,
    }
}

#[test]
fn inactive_coupon_is_invalid_even_inside_window() {
    let now = Utc::now();
    let c = coupon(false, now - Duration::days(1), now + Duration::days(1), None, 0);
    assert!(!is_valid(&c, now));
}

#[test]
fn coupon_outside_window_is_invalid() {
    let now = Utc::now();
    let not_started = coupon(true, now + Duration::days(1), now + Duration::days(2), None, 0);
    assert!(!is_valid(&not_started, now));

    let expired = coupon(true, now - Duration::days(2), now - Duration::days(1), None, 0);
    assert!(!is_valid(&expired, now));
}

#[test]
fn window_boundaries_are_inclusive() {
    let now = Utc::now();
    let starts_now = coupon(true, now, now + Duration::days(1), None, 0);
    assert!(is_valid(&starts_now, now));

    let ends_now = coupon(true, now - Duration::days(1), now, None, 0);
    assert!(is_valid(&ends_now, now));
}

#[test]
fn usage_limit_exhaustion_invalidates() {
    let now = Utc::now();
    let fresh = coupon(true, now - Duration::days(1), now + Duration::days(1), Some(3), 2);
    assert!(is_valid(&fresh, now));

    let spent = coupon(true, now - Duration::days(1), now + Duration::days(1), Some(3), 3);
    assert!(!is_valid(&spent, now));
}

#[test]
fn no_usage_limit_means_unlimited() {
    let now = Utc::now();
    let c = coupon(true, now - Duration::days(1), now + Duration::days(1), None, 1_000_000);
    assert!(is_valid(&c, now));
}
