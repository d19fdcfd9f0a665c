use axum_storefront_api::{
    config::AppConfig,
    db::{create_orm_conn, create_pool, run_migrations},
    dto::cart::AddToCartRequest,
    dto::orders::{CheckoutRequest, CreateOrderRequest, OrderItemInput},
    entity::{
        coupons::{ActiveModel as CouponActive, Entity as Coupons},
        products::{ActiveModel as ProductActive, Entity as Products},
        users::ActiveModel as UserActive,
    },
    error::AppError,
    middleware::auth::{AuthUser, CartOwner},
    routes::admin::UpdateOrderStatusRequest,
    services::{admin_service, cart_service, order_service},
    state::AppState,
};
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use sea_orm::ActiveValue::NotSet;
use sea_orm::{ActiveModelTrait, ConnectionTrait, EntityTrait, Set, Statement};
use uuid::Uuid;

fn dec(value: &str) -> Decimal {
    value.parse().expect("decimal literal")
}

// Integration flow: cart -> checkout with a flat coupon -> price snapshot
// independence -> direct intake with a dropped line -> admin status update.
#[tokio::test]
async fn cart_checkout_and_intake_flow() -> anyhow::Result<()> {
    // Allow skipping when no DB is configured in the environment.
    let database_url = match std::env::var("TEST_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
    {
        Ok(url) => url,
        Err(_) => {
            eprintln!(
                "Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run integration flow tests."
            );
            return Ok(());
        }
    };

    let state = setup_state(&database_url).await?;

    let user_id = create_user(&state, "user", "user@example.com").await?;
    let admin_id = create_user(&state, "admin", "admin@example.com").await?;

    let product_a = create_product(&state, "Widget", "widget", "10.00", 10).await?;
    let product_b = create_product(&state, "Gadget", "gadget", "5.00", 10).await?;

    let now = Utc::now();
    CouponActive {
        id: Set(Uuid::new_v4()),
        code: Set("FIVER".into()),
        discount_type: Set("flat".into()),
        discount_value: Set(dec("5.00")),
        min_cart_value: Set(Decimal::ZERO),
        valid_from: Set((now - Duration::days(1)).into()),
        valid_until: Set((now + Duration::days(1)).into()),
        active: Set(true),
        usage_limit: Set(Some(10)),
        used_count: Set(0),
        applicable_to_all: Set(true),
    }
    .insert(&state.orm)
    .await?;

    let owner = CartOwner::User(user_id);
    let auth_user = AuthUser {
        user_id,
        role: "user".into(),
    };
    let auth_admin = AuthUser {
        user_id: admin_id,
        role: "admin".into(),
    };

    // Fill the cart: 2 x 10.00 + 1 x 5.00.
    cart_service::add_to_cart(
        &state.pool,
        &owner,
        AddToCartRequest {
            product_id: product_a,
            quantity: 2,
        },
    )
    .await?;
    cart_service::add_to_cart(
        &state.pool,
        &owner,
        AddToCartRequest {
            product_id: product_b,
            quantity: 1,
        },
    )
    .await?;

    let cart = cart_service::resolve_cart(&state.pool, &owner).await?;
    let (total_items, subtotal) = cart_service::cart_totals(&state.pool, cart.id).await?;
    assert_eq!(total_items, 3);
    assert_eq!(subtotal, dec("25.00"));

    // Checkout with the flat coupon.
    let checkout_resp = order_service::checkout(
        &state,
        &owner,
        CheckoutRequest {
            coupon_code: Some("FIVER".into()),
            guest_name: None,
            guest_email: None,
        },
    )
    .await?;
    let placed = checkout_resp.data.expect("checkout data");
    assert_eq!(placed.order.subtotal, dec("25.00"));
    assert_eq!(placed.order.discount_amount, dec("5.00"));
    assert_eq!(placed.order.total, dec("20.00"));
    assert_eq!(placed.order.status, "pending");
    assert_eq!(placed.items.len(), 2);
    assert_eq!(
        placed.order.total,
        placed.order.subtotal - placed.order.discount_amount
    );

    // The cart is emptied and stock decremented on the checkout path.
    let (total_items, subtotal) = cart_service::cart_totals(&state.pool, cart.id).await?;
    assert_eq!(total_items, 0);
    assert_eq!(subtotal, Decimal::ZERO);
    let restocked = Products::find_by_id(product_a)
        .one(&state.orm)
        .await?
        .expect("product a");
    assert_eq!(restocked.stock, 8);

    // Redeeming bumped the usage counter.
    let coupon = Coupons::find()
        .one(&state.orm)
        .await?
        .expect("coupon row");
    assert_eq!(coupon.used_count, 1);

    // A later price edit must not leak into the placed order.
    let mut repriced: ProductActive = restocked.into();
    repriced.price = Set(dec("99.00"));
    repriced.update(&state.orm).await?;

    let reread = order_service::get_order(&state, &auth_user, placed.order.id).await?;
    let reread = reread.data.expect("order data");
    let snapshot = reread
        .items
        .iter()
        .find(|item| item.product_id == Some(product_a))
        .expect("order line for product a");
    assert_eq!(snapshot.price_at_time, dec("10.00"));
    assert_eq!(reread.order.total, dec("20.00"));

    // Direct intake as a guest: the unknown line is dropped, the order still
    // lands with the submitted price snapshots.
    let intake = order_service::create_order(
        &state,
        None,
        CreateOrderRequest {
            guest_name: Some("Ada".into()),
            guest_email: Some("ada@example.com".into()),
            status: None,
            items: vec![
                OrderItemInput {
                    product_id: product_b,
                    quantity: 2,
                    price_at_time: dec("5.00"),
                },
                OrderItemInput {
                    product_id: Uuid::new_v4(),
                    quantity: 1,
                    price_at_time: dec("7.00"),
                },
            ],
        },
    )
    .await?;
    let intake = intake.data.expect("intake data");
    assert_eq!(intake.items.len(), 1);
    assert_eq!(intake.order.subtotal, dec("10.00"));
    assert_eq!(intake.order.total, dec("10.00"));
    assert_eq!(intake.order.guest_name.as_deref(), Some("Ada"));

    // Intake keeps its hands off stock.
    let untouched = Products::find_by_id(product_b)
        .one(&state.orm)
        .await?
        .expect("product b");
    assert_eq!(untouched.stock, 9);

    // The chosen validation boundary: zero quantity is a field error.
    let rejected = order_service::create_order(
        &state,
        None,
        CreateOrderRequest {
            guest_name: Some("Ada".into()),
            guest_email: Some("ada@example.com".into()),
            status: None,
            items: vec![OrderItemInput {
                product_id: product_b,
                quantity: 0,
                price_at_time: dec("5.00"),
            }],
        },
    )
    .await;
    assert!(matches!(rejected, Err(AppError::Validation(_))));

    // Fulfillment moves the order along.
    let updated = admin_service::update_order_status(
        &state,
        &auth_admin,
        placed.order.id,
        UpdateOrderStatusRequest {
            status: "shipped".into(),
        },
    )
    .await?;
    assert_eq!(updated.data.expect("order").status, "shipped");

    // Checking out an empty cart is refused.
    let empty = order_service::checkout(
        &state,
        &owner,
        CheckoutRequest {
            coupon_code: None,
            guest_name: None,
            guest_email: None,
        },
    )
    .await;
    assert!(matches!(empty, Err(AppError::BadRequest(_))));

    Ok(())
}

async fn setup_state(database_url: &str) -> anyhow::Result<AppState> {
    let pool = create_pool(database_url).await?;
    let orm = create_orm_conn(database_url).await?;
    run_migrations(&orm).await?;

    // Clean tables between runs
    let backend = orm.get_database_backend();
    orm.execute(Statement::from_string(
        backend,
        "TRUNCATE TABLE order_items, orders, cart_items, carts, coupon_products, coupons, \
         products, categories, audit_logs, users RESTART IDENTITY CASCADE",
    ))
    .await?;

    Ok(AppState {
        pool,
        orm,
        config: AppConfig {
            database_url: database_url.to_string(),
            host: "127.0.0.1".into(),
            port: 0,
            order_intake_strict: false,
        },
    })
}

async fn create_user(state: &AppState, role: &str, email: &str) -> anyhow::Result<Uuid> {
    let user = UserActive {
        id: Set(Uuid::new_v4()),
        email: Set(email.to_string()),
        password_hash: Set("dummy".into()),
        role: Set(role.into()),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    Ok(user.id)
}

async fn create_product(
    state: &AppState,
    name: &str,
    slug: &str,
    price: &str,
    stock: i32,
) -> anyhow::Result<Uuid> {
    let product = ProductActive {
        id: Set(Uuid::new_v4()),
        name: Set(name.to_string()),
        slug: Set(slug.to_string()),
        description: Set(None),
        price: Set(dec(price)),
        stock: Set(stock),
        available: Set(true),
        category_id: Set(None),
        image: Set(None),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    Ok(product.id)
}
