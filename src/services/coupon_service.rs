use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait,
};
use uuid::Uuid;

use crate::{
    audit::{AuditEntry, record_or_warn},
    dto::coupons::{CouponList, CreateCouponRequest, UpdateCouponRequest},
    entity::{
        coupon_products::{
            ActiveModel as CouponProductActive, Column as CouponProductCol,
            Entity as CouponProducts,
        },
        coupons::{ActiveModel as CouponActive, Column as CouponCol, Entity as Coupons, Model as CouponModel},
    },
    error::{AppError, AppResult, FieldError},
    middleware::auth::{AuthUser, ensure_admin},
    models::Coupon,
    pricing::DiscountType,
    response::{ApiResponse, Meta},
    routes::params::Pagination,
    state::AppState,
};

/// Whether the coupon is usable at `now`: it must be active, inside its
/// validity window (boundaries inclusive), and under its usage limit when
/// one is set. Pure predicate, no side effects.
pub fn is_valid(coupon: &CouponModel, now: DateTime<Utc>) -> bool {
    coupon.active
        && coupon.valid_from <= now
        && now <= coupon.valid_until
        && coupon
            .usage_limit
            .map_or(true, |limit| coupon.used_count < limit)
}

/// Gate applied when attaching a coupon to an order: validity, cart
/// minimum, and product applicability for restricted coupons.
pub async fn check_redeemable<C: ConnectionTrait>(
    conn: &C,
    coupon: &CouponModel,
    now: DateTime<Utc>,
    subtotal: Decimal,
    cart_product_ids: &[Uuid],
) -> AppResult<()> {
    if !is_valid(coupon, now) {
        return Err(AppError::BadRequest("Coupon is not valid".into()));
    }
    if subtotal < coupon.min_cart_value {
        return Err(AppError::BadRequest(format!(
            "Cart total is below the coupon minimum of {}",
            coupon.min_cart_value
        )));
    }
    if !coupon.applicable_to_all {
        let eligible = CouponProducts::find()
            .filter(CouponProductCol::CouponId.eq(coupon.id))
            .filter(CouponProductCol::ProductId.is_in(cart_product_ids.to_vec()))
            .count(conn)
            .await?;
        if eligible == 0 {
            return Err(AppError::BadRequest(
                "Coupon does not apply to any product in the cart".into(),
            ));
        }
    }
    Ok(())
}

/// Count one redemption. Called inside the checkout transaction.
pub async fn redeem<C: ConnectionTrait>(conn: &C, coupon_id: Uuid) -> AppResult<()> {
    Coupons::update_many()
        .col_expr(CouponCol::UsedCount, Expr::col(CouponCol::UsedCount).add(1))
        .filter(CouponCol::Id.eq(coupon_id))
        .exec(conn)
        .await?;
    Ok(())
}

pub async fn find_by_code<C: ConnectionTrait>(
    conn: &C,
    code: &str,
) -> AppResult<Option<CouponModel>> {
    let coupon = Coupons::find()
        .filter(CouponCol::Code.eq(code))
        .one(conn)
        .await?;
    Ok(coupon)
}

pub async fn list_coupons(
    state: &AppState,
    user: &AuthUser,
    pagination: Pagination,
) -> AppResult<ApiResponse<CouponList>> {
    ensure_admin(user)?;
    let (page, limit, offset) = pagination.normalize();

    let finder = Coupons::find().order_by_desc(CouponCol::ValidUntil);
    let total = finder.clone().count(&state.orm).await? as i64;

    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(coupon_from_entity)
        .collect();

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success("Coupons", CouponList { items }, Some(meta)))
}

pub async fn create_coupon(
    state: &AppState,
    user: &AuthUser,
    payload: CreateCouponRequest,
) -> AppResult<ApiResponse<Coupon>> {
    ensure_admin(user)?;
    let mut errors = Vec::new();
    if payload.code.trim().is_empty() {
        errors.push(FieldError::new("code", "code must not be empty"));
    }
    let discount_type = DiscountType::parse(&payload.discount_type);
    if discount_type.is_none() {
        errors.push(FieldError::new(
            "discount_type",
            "must be \"percentage\" or \"flat\"",
        ));
    }
    if payload.discount_value <= Decimal::ZERO {
        errors.push(FieldError::new(
            "discount_value",
            "must be greater than 0",
        ));
    } else if discount_type == Some(DiscountType::Percentage)
        && payload.discount_value > Decimal::ONE_HUNDRED
    {
        errors.push(FieldError::new(
            "discount_value",
            "percentage must not exceed 100",
        ));
    }
    if payload.valid_until < payload.valid_from {
        errors.push(FieldError::new(
            "valid_until",
            "must not precede valid_from",
        ));
    }
    if !errors.is_empty() {
        return Err(AppError::Validation(errors));
    }

    let existing = find_by_code(&state.orm, payload.code.trim()).await?;
    if existing.is_some() {
        return Err(AppError::BadRequest("Coupon code already exists".into()));
    }

    let applicable_to_all = payload.applicable_to_all.unwrap_or(true);
    let txn = state.orm.begin().await?;

    let coupon = CouponActive {
        id: Set(Uuid::new_v4()),
        code: Set(payload.code.trim().to_string()),
        discount_type: Set(payload.discount_type),
        discount_value: Set(payload.discount_value),
        min_cart_value: Set(payload.min_cart_value.unwrap_or(Decimal::ZERO)),
        valid_from: Set(payload.valid_from.into()),
        valid_until: Set(payload.valid_until.into()),
        active: Set(payload.active.unwrap_or(true)),
        usage_limit: Set(payload.usage_limit),
        used_count: Set(0),
        applicable_to_all: Set(applicable_to_all),
    }
    .insert(&txn)
    .await?;

    if !applicable_to_all {
        for product_id in &payload.product_ids {
            CouponProductActive {
                coupon_id: Set(coupon.id),
                product_id: Set(*product_id),
            }
            .insert(&txn)
            .await?;
        }
    }

    txn.commit().await?;

    record_or_warn(
        &state.pool,
        AuditEntry {
            user_id: Some(user.user_id),
            action: "coupon_create",
            resource: Some("coupons"),
            metadata: Some(serde_json::json!({ "coupon_id": coupon.id, "code": coupon.code })),
        },
    )
    .await;

    Ok(ApiResponse::success(
        "Coupon created",
        coupon_from_entity(coupon),
        Some(Meta::empty()),
    ))
}

pub async fn update_coupon(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateCouponRequest,
) -> AppResult<ApiResponse<Coupon>> {
    ensure_admin(user)?;
    let existing = Coupons::find_by_id(id).one(&state.orm).await?;
    let existing = match existing {
        Some(c) => c,
        None => return Err(AppError::NotFound),
    };

    if let Some(discount_type) = payload.discount_type.as_deref() {
        if DiscountType::parse(discount_type).is_none() {
            return Err(AppError::Validation(vec![FieldError::new(
                "discount_type",
                "must be \"percentage\" or \"flat\"",
            )]));
        }
    }

    let txn = state.orm.begin().await?;

    let mut active: CouponActive = existing.into();
    if let Some(discount_type) = payload.discount_type {
        active.discount_type = Set(discount_type);
    }
    if let Some(discount_value) = payload.discount_value {
        active.discount_value = Set(discount_value);
    }
    if let Some(min_cart_value) = payload.min_cart_value {
        active.min_cart_value = Set(min_cart_value);
    }
    if let Some(valid_from) = payload.valid_from {
        active.valid_from = Set(valid_from.into());
    }
    if let Some(valid_until) = payload.valid_until {
        active.valid_until = Set(valid_until.into());
    }
    if let Some(is_active) = payload.active {
        active.active = Set(is_active);
    }
    if let Some(usage_limit) = payload.usage_limit {
        active.usage_limit = Set(Some(usage_limit));
    }
    if let Some(applicable_to_all) = payload.applicable_to_all {
        active.applicable_to_all = Set(applicable_to_all);
    }
    let coupon = active.update(&txn).await?;

    if let Some(product_ids) = payload.product_ids {
        CouponProducts::delete_many()
            .filter(CouponProductCol::CouponId.eq(coupon.id))
            .exec(&txn)
            .await?;
        for product_id in product_ids {
            CouponProductActive {
                coupon_id: Set(coupon.id),
                product_id: Set(product_id),
            }
            .insert(&txn)
            .await?;
        }
    }

    txn.commit().await?;

    record_or_warn(
        &state.pool,
        AuditEntry {
            user_id: Some(user.user_id),
            action: "coupon_update",
            resource: Some("coupons"),
            metadata: Some(serde_json::json!({ "coupon_id": coupon.id })),
        },
    )
    .await;

    Ok(ApiResponse::success(
        "Coupon updated",
        coupon_from_entity(coupon),
        Some(Meta::empty()),
    ))
}

pub async fn delete_coupon(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    ensure_admin(user)?;
    let result = Coupons::delete_by_id(id).exec(&state.orm).await?;

    if result.rows_affected == 0 {
        return Err(AppError::NotFound);
    }

    record_or_warn(
        &state.pool,
        AuditEntry {
            user_id: Some(user.user_id),
            action: "coupon_delete",
            resource: Some("coupons"),
            metadata: Some(serde_json::json!({ "coupon_id": id })),
        },
    )
    .await;

    Ok(ApiResponse::success(
        "Deleted",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

pub fn coupon_from_entity(model: CouponModel) -> Coupon {
    Coupon {
        id: model.id,
        code: model.code,
        discount_type: model.discount_type,
        discount_value: model.discount_value,
        min_cart_value: model.min_cart_value,
        valid_from: model.valid_from.with_timezone(&Utc),
        valid_until: model.valid_until.with_timezone(&Utc),
        active: model.active,
        usage_limit: model.usage_limit,
        used_count: model.used_count,
        applicable_to_all: model.applicable_to_all,
    }
}
