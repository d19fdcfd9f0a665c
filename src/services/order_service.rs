use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::{Expr, LockType};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, FromQueryResult,
    JoinType, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, RelationTrait, Set,
    TransactionTrait,
};
use uuid::Uuid;

use crate::{
    audit::{AuditEntry, record_or_warn},
    dto::orders::{CheckoutRequest, CreateOrderRequest, OrderList, OrderWithItems},
    entity::{
        cart_items::{self, Column as CartItemCol, Entity as CartItems},
        carts::{Column as CartCol, Entity as Carts},
        coupons::Entity as Coupons,
        order_items::{
            ActiveModel as OrderItemActive, Column as OrderItemCol, Entity as OrderItems,
            Model as OrderItemModel,
        },
        orders::{ActiveModel as OrderActive, Column as OrderCol, Entity as Orders, Model as OrderModel},
        products::{Column as ProdCol, Entity as Products},
    },
    error::{AppError, AppResult, FieldError},
    middleware::auth::{AuthUser, CartOwner},
    models::{Order, OrderItem},
    pricing::{self, DiscountType},
    response::{ApiResponse, Meta},
    routes::params::{OrderListQuery, SortOrder},
    services::coupon_service,
    state::AppState,
};

pub const ORDER_STATUSES: [&str; 5] =
    ["pending", "processing", "shipped", "delivered", "cancelled"];

/// Recompute and persist the order's three derived money fields from its
/// items and attached coupon. Everything else on the order is left alone.
pub async fn calculate_totals<C: ConnectionTrait>(
    conn: &C,
    order: OrderModel,
) -> AppResult<OrderModel> {
    let lines: Vec<(i32, Decimal)> = OrderItems::find()
        .filter(OrderItemCol::OrderId.eq(order.id))
        .all(conn)
        .await?
        .into_iter()
        .map(|item| (item.quantity, item.price_at_time))
        .collect();

    let subtotal: Decimal = lines
        .iter()
        .map(|(quantity, price)| pricing::line_subtotal(*quantity, *price))
        .sum();

    let discount = match order.coupon_id {
        None => Decimal::ZERO,
        Some(coupon_id) => {
            let coupon = Coupons::find_by_id(coupon_id)
                .one(conn)
                .await?
                .ok_or(AppError::NotFound)?;
            let discount_type = DiscountType::parse(&coupon.discount_type).ok_or_else(|| {
                AppError::Internal(anyhow::anyhow!(
                    "coupon {} has unknown discount type {}",
                    coupon.id,
                    coupon.discount_type
                ))
            })?;
            pricing::discount_amount(discount_type, coupon.discount_value, subtotal)
        }
    };

    let totals = pricing::order_totals(lines, discount);
    if totals.discount_capped {
        tracing::warn!(
            order_id = %order.id,
            subtotal = %totals.subtotal,
            "discount exceeded subtotal; capped at subtotal"
        );
    }

    let mut active: OrderActive = order.into();
    active.subtotal = Set(totals.subtotal);
    active.discount_amount = Set(totals.discount_amount);
    active.total = Set(totals.total);
    active.updated_at = Set(Utc::now().into());
    let order = active.update(conn).await?;
    Ok(order)
}

/// Direct order intake: persists the submitted lines with their price
/// snapshots and runs the totaling engine. Lines naming an unknown product
/// are dropped, or rejected when strict intake is configured. No stock is
/// touched on this path.
pub async fn create_order(
    state: &AppState,
    auth: Option<&AuthUser>,
    payload: CreateOrderRequest,
) -> AppResult<ApiResponse<OrderWithItems>> {
    validate_submission(auth, &payload)?;

    let status = payload.status.unwrap_or_else(|| "pending".to_string());

    let txn = state.orm.begin().await?;

    let order = OrderActive {
        id: Set(Uuid::new_v4()),
        user_id: Set(auth.map(|user| user.user_id)),
        guest_name: Set(payload.guest_name),
        guest_email: Set(payload.guest_email),
        status: Set(status),
        subtotal: Set(Decimal::ZERO),
        discount_amount: Set(Decimal::ZERO),
        total: Set(Decimal::ZERO),
        coupon_id: Set(None),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&txn)
    .await?;

    let mut items: Vec<OrderItem> = Vec::new();
    for (index, line) in payload.items.iter().enumerate() {
        let product = Products::find_by_id(line.product_id).one(&txn).await?;
        if product.is_none() {
            if state.config.order_intake_strict {
                return Err(AppError::Validation(vec![FieldError::new(
                    format!("items[{index}].product"),
                    format!("unknown product {}", line.product_id),
                )]));
            }
            tracing::debug!(
                product_id = %line.product_id,
                "order line references an unknown product; dropped"
            );
            continue;
        }

        let item = OrderItemActive {
            id: Set(Uuid::new_v4()),
            order_id: Set(order.id),
            product_id: Set(Some(line.product_id)),
            quantity: Set(line.quantity),
            price_at_time: Set(line.price_at_time),
            created_at: NotSet,
        }
        .insert(&txn)
        .await?;
        items.push(order_item_from_entity(item));
    }

    let order = calculate_totals(&txn, order).await?;

    txn.commit().await?;

    record_or_warn(
        &state.pool,
        AuditEntry {
            user_id: auth.map(|user| user.user_id),
            action: "order_create",
            resource: Some("orders"),
            metadata: Some(serde_json::json!({ "order_id": order.id })),
        },
    )
    .await;

    Ok(ApiResponse::success(
        "Order created",
        OrderWithItems {
            order: order_from_entity(order),
            items,
        },
        Some(Meta::empty()),
    ))
}

/// Convert the caller's cart into an order: live prices become snapshots,
/// an optional coupon is validated and redeemed, stock is decremented, and
/// the cart is emptied. All in one transaction.
pub async fn checkout(
    state: &AppState,
    owner: &CartOwner,
    payload: CheckoutRequest,
) -> AppResult<ApiResponse<OrderWithItems>> {
    let (user_id, guest_name, guest_email) = checkout_identity(owner, &payload)?;

    let txn = state.orm.begin().await?;

    let cart = match owner {
        CartOwner::User(user_id) => {
            Carts::find()
                .filter(CartCol::UserId.eq(*user_id))
                .one(&txn)
                .await?
        }
        CartOwner::Session(session_key) => {
            Carts::find()
                .filter(CartCol::SessionKey.eq(session_key.clone()))
                .one(&txn)
                .await?
        }
    };
    let cart = match cart {
        Some(cart) => cart,
        None => return Err(AppError::BadRequest("Cart is empty".into())),
    };

    #[derive(Debug, FromQueryResult)]
    struct CartLine {
        product_id: Uuid,
        quantity: i32,
        price: Decimal,
        stock: i32,
        available: bool,
    }

    let lines = CartItems::find()
        .select_only()
        .column(CartItemCol::ProductId)
        .column(CartItemCol::Quantity)
        .column_as(ProdCol::Price, "price")
        .column_as(ProdCol::Stock, "stock")
        .column_as(ProdCol::Available, "available")
        .join(JoinType::InnerJoin, cart_items::Relation::Products.def())
        .filter(CartItemCol::CartId.eq(cart.id))
        .lock(LockType::Update)
        .into_model::<CartLine>()
        .all(&txn)
        .await?;

    if lines.is_empty() {
        return Err(AppError::BadRequest("Cart is empty".into()));
    }

    let mut subtotal = Decimal::ZERO;
    for line in &lines {
        if line.quantity < 1 {
            return Err(AppError::BadRequest("Cart has invalid quantity".into()));
        }
        if !line.available {
            return Err(AppError::BadRequest(format!(
                "Product {} is no longer available",
                line.product_id
            )));
        }
        if line.stock < line.quantity {
            return Err(AppError::BadRequest(format!(
                "Insufficient stock for product {}",
                line.product_id
            )));
        }
        subtotal += pricing::line_subtotal(line.quantity, line.price);
    }

    let coupon = match payload.coupon_code.as_deref() {
        None => None,
        Some(code) => {
            let coupon = coupon_service::find_by_code(&txn, code)
                .await?
                .ok_or_else(|| AppError::BadRequest("Unknown coupon code".into()))?;
            let product_ids: Vec<Uuid> = lines.iter().map(|line| line.product_id).collect();
            coupon_service::check_redeemable(&txn, &coupon, Utc::now(), subtotal, &product_ids)
                .await?;
            Some(coupon)
        }
    };

    let order = OrderActive {
        id: Set(Uuid::new_v4()),
        user_id: Set(user_id),
        guest_name: Set(guest_name),
        guest_email: Set(guest_email),
        status: Set("pending".into()),
        subtotal: Set(Decimal::ZERO),
        discount_amount: Set(Decimal::ZERO),
        total: Set(Decimal::ZERO),
        coupon_id: Set(coupon.as_ref().map(|c| c.id)),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&txn)
    .await?;

    let mut items: Vec<OrderItem> = Vec::new();
    for line in &lines {
        let item = OrderItemActive {
            id: Set(Uuid::new_v4()),
            order_id: Set(order.id),
            product_id: Set(Some(line.product_id)),
            quantity: Set(line.quantity),
            price_at_time: Set(line.price),
            created_at: NotSet,
        }
        .insert(&txn)
        .await?;
        items.push(order_item_from_entity(item));

        Products::update_many()
            .col_expr(ProdCol::Stock, Expr::col(ProdCol::Stock).sub(line.quantity))
            .filter(ProdCol::Id.eq(line.product_id))
            .exec(&txn)
            .await?;
    }

    CartItems::delete_many()
        .filter(CartItemCol::CartId.eq(cart.id))
        .exec(&txn)
        .await?;

    if let Some(coupon) = &coupon {
        coupon_service::redeem(&txn, coupon.id).await?;
    }

    let order = calculate_totals(&txn, order).await?;

    txn.commit().await?;

    record_or_warn(
        &state.pool,
        AuditEntry {
            user_id,
            action: "checkout",
            resource: Some("orders"),
            metadata: Some(serde_json::json!({ "order_id": order.id })),
        },
    )
    .await;

    Ok(ApiResponse::success(
        "Checkout success",
        OrderWithItems {
            order: order_from_entity(order),
            items,
        },
        Some(Meta::empty()),
    ))
}

pub async fn list_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    let (page, limit, offset) = query.pagination.normalize();
    let mut condition = Condition::all().add(OrderCol::UserId.eq(user.user_id));
    if let Some(status) = query.status.as_ref().filter(|s| !s.is_empty()) {
        condition = condition.add(OrderCol::Status.eq(status.clone()));
    }

    let sort_order = query.sort_order.unwrap_or(SortOrder::Desc);

    let mut finder = Orders::find().filter(condition);
    finder = match sort_order {
        SortOrder::Asc => finder.order_by_asc(OrderCol::CreatedAt),
        SortOrder::Desc => finder.order_by_desc(OrderCol::CreatedAt),
    };

    let total = finder.clone().count(&state.orm).await? as i64;

    let orders = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(order_from_entity)
        .collect();

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success(
        "Ok",
        OrderList { items: orders },
        Some(meta),
    ))
}

pub async fn get_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderWithItems>> {
    let order = Orders::find()
        .filter(
            Condition::all()
                .add(OrderCol::UserId.eq(user.user_id))
                .add(OrderCol::Id.eq(id)),
        )
        .one(&state.orm)
        .await?;
    let order = match order {
        Some(o) => o,
        None => return Err(AppError::NotFound),
    };

    let items = OrderItems::find()
        .filter(OrderItemCol::OrderId.eq(order.id))
        .all(&state.orm)
        .await?
        .into_iter()
        .map(order_item_from_entity)
        .collect();

    Ok(ApiResponse::success(
        "OK",
        OrderWithItems {
            order: order_from_entity(order),
            items,
        },
        Some(Meta::empty()),
    ))
}

fn validate_submission(auth: Option<&AuthUser>, payload: &CreateOrderRequest) -> AppResult<()> {
    let mut errors = Vec::new();

    if auth.is_none() {
        match payload.guest_name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => {}
            _ => errors.push(FieldError::new("guest_name", "guest_name is required")),
        }
        match payload.guest_email.as_deref().map(str::trim) {
            Some(email) if email.contains('@') => {}
            Some(_) => errors.push(FieldError::new("guest_email", "not a valid email address")),
            None => errors.push(FieldError::new("guest_email", "guest_email is required")),
        }
    }

    if let Some(status) = payload.status.as_deref() {
        if !ORDER_STATUSES.contains(&status) {
            errors.push(FieldError::new("status", "not a valid order status"));
        }
    }

    if payload.items.is_empty() {
        errors.push(FieldError::new("items", "at least one item is required"));
    }
    for (index, item) in payload.items.iter().enumerate() {
        if item.quantity < 1 {
            errors.push(FieldError::new(
                format!("items[{index}].quantity"),
                "quantity must be at least 1",
            ));
        }
        if item.price_at_time <= Decimal::ZERO {
            errors.push(FieldError::new(
                format!("items[{index}].price_at_time"),
                "price_at_time must be greater than 0",
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(AppError::Validation(errors))
    }
}

fn checkout_identity(
    owner: &CartOwner,
    payload: &CheckoutRequest,
) -> AppResult<(Option<Uuid>, Option<String>, Option<String>)> {
    match owner {
        CartOwner::User(user_id) => Ok((Some(*user_id), None, None)),
        CartOwner::Session(_) => {
            let mut errors = Vec::new();
            let guest_name = payload.guest_name.as_deref().map(str::trim);
            if guest_name.map_or(true, str::is_empty) {
                errors.push(FieldError::new(
                    "guest_name",
                    "guest_name is required for guest checkout",
                ));
            }
            let guest_email = payload.guest_email.as_deref().map(str::trim);
            match guest_email {
                Some(email) if email.contains('@') => {}
                Some(_) => errors.push(FieldError::new("guest_email", "not a valid email address")),
                None => errors.push(FieldError::new(
                    "guest_email",
                    "guest_email is required for guest checkout",
                )),
            }
            if !errors.is_empty() {
                return Err(AppError::Validation(errors));
            }
            Ok((
                None,
                guest_name.map(str::to_string),
                guest_email.map(str::to_string),
            ))
        }
    }
}

pub fn order_from_entity(model: OrderModel) -> Order {
    Order {
        id: model.id,
        user_id: model.user_id,
        guest_name: model.guest_name,
        guest_email: model.guest_email,
        status: model.status,
        subtotal: model.subtotal,
        discount_amount: model.discount_amount,
        total: model.total,
        coupon_id: model.coupon_id,
        created_at: model.created_at.with_timezone(&Utc),
        updated_at: model.updated_at.with_timezone(&Utc),
    }
}

pub fn order_item_from_entity(model: OrderItemModel) -> OrderItem {
    OrderItem {
        id: model.id,
        order_id: model.order_id,
        product_id: model.product_id,
        quantity: model.quantity,
        price_at_time: model.price_at_time,
        created_at: model.created_at.with_timezone(&Utc),
    }
}
