use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::FromRow;
use uuid::Uuid;

use crate::{
    audit::{AuditEntry, record_or_warn},
    db::DbPool,
    dto::cart::{AddToCartRequest, CartItemDto, CartView},
    error::{AppError, AppResult},
    middleware::auth::CartOwner,
    models::{Cart, CartItem, Product},
    pricing,
    response::{ApiResponse, Meta},
};

#[derive(FromRow)]
struct CartLineRow {
    line_id: Uuid,
    quantity: i32,
    product_id: Uuid,
    name: String,
    slug: String,
    description: Option<String>,
    price: Decimal,
    stock: i32,
    available: bool,
    category_id: Option<Uuid>,
    image: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Fetch the owner's cart, creating it on first use. One cart per user and
/// per session key.
pub async fn resolve_cart(pool: &DbPool, owner: &CartOwner) -> AppResult<Cart> {
    let cart = match owner {
        CartOwner::User(user_id) => {
            sqlx::query_as::<_, Cart>(
                r#"
                INSERT INTO carts (user_id)
                VALUES ($1)
                ON CONFLICT (user_id) DO UPDATE SET updated_at = now()
                RETURNING *
                "#,
            )
            .bind(user_id)
            .fetch_one(pool)
            .await?
        }
        CartOwner::Session(session_key) => {
            sqlx::query_as::<_, Cart>(
                r#"
                INSERT INTO carts (session_key)
                VALUES ($1)
                ON CONFLICT (session_key) DO UPDATE SET updated_at = now()
                RETURNING *
                "#,
            )
            .bind(session_key)
            .fetch_one(pool)
            .await?
        }
    };
    Ok(cart)
}

/// Sum of line quantities and of quantity x live product price. An empty
/// cart yields (0, 0). Lines whose product vanished are dropped by the
/// join rather than failing the aggregate.
pub async fn cart_totals(pool: &DbPool, cart_id: Uuid) -> AppResult<(i64, Decimal)> {
    let totals: (i64, Decimal) = sqlx::query_as(
        r#"
        SELECT COALESCE(SUM(ci.quantity), 0)::BIGINT,
               COALESCE(SUM(ci.quantity * p.price), 0)::NUMERIC(10, 2)
        FROM cart_items ci
        JOIN products p ON p.id = ci.product_id
        WHERE ci.cart_id = $1
        "#,
    )
    .bind(cart_id)
    .fetch_one(pool)
    .await?;
    Ok(totals)
}

pub async fn view_cart(pool: &DbPool, owner: &CartOwner) -> AppResult<ApiResponse<CartView>> {
    let cart = resolve_cart(pool, owner).await?;

    let rows = sqlx::query_as::<_, CartLineRow>(
        r#"
        SELECT ci.id AS line_id, ci.quantity,
               p.id AS product_id, p.name, p.slug, p.description, p.price, p.stock,
               p.available, p.category_id, p.image, p.created_at, p.updated_at
        FROM cart_items ci
        JOIN products p ON p.id = ci.product_id
        WHERE ci.cart_id = $1
        ORDER BY ci.created_at DESC
        "#,
    )
    .bind(cart.id)
    .fetch_all(pool)
    .await?;

    let (total_items, subtotal) = cart_totals(pool, cart.id).await?;

    let items = rows
        .into_iter()
        .map(|row| CartItemDto {
            id: row.line_id,
            subtotal: pricing::line_subtotal(row.quantity, row.price),
            quantity: row.quantity,
            product: Product {
                id: row.product_id,
                name: row.name,
                slug: row.slug,
                description: row.description,
                price: row.price,
                stock: row.stock,
                available: row.available,
                category_id: row.category_id,
                image: row.image,
                created_at: row.created_at,
                updated_at: row.updated_at,
            },
        })
        .collect();

    let view = CartView {
        id: cart.id,
        items,
        total_items,
        subtotal,
    };
    Ok(ApiResponse::success("OK", view, Some(Meta::empty())))
}

pub async fn add_to_cart(
    pool: &DbPool,
    owner: &CartOwner,
    payload: AddToCartRequest,
) -> AppResult<ApiResponse<CartItem>> {
    if payload.quantity < 1 {
        return Err(AppError::BadRequest(
            "quantity must be at least 1".to_string(),
        ));
    }

    let product: Option<(Uuid, bool)> =
        sqlx::query_as("SELECT id, available FROM products WHERE id = $1")
            .bind(payload.product_id)
            .fetch_optional(pool)
            .await?;
    match product {
        None => return Err(AppError::BadRequest("product not found".to_string())),
        Some((_, false)) => {
            return Err(AppError::BadRequest("product is not available".to_string()));
        }
        Some((_, true)) => {}
    }

    let cart = resolve_cart(pool, owner).await?;

    let exist: Option<CartItem> =
        sqlx::query_as("SELECT * FROM cart_items WHERE cart_id = $1 AND product_id = $2")
            .bind(cart.id)
            .bind(payload.product_id)
            .fetch_optional(pool)
            .await?;

    let cart_item = if let Some(item) = exist {
        sqlx::query_as::<_, CartItem>(
            r#"
            UPDATE cart_items
            SET quantity = $2
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(item.id)
        .bind(payload.quantity)
        .fetch_one(pool)
        .await?
    } else {
        sqlx::query_as(
            "INSERT INTO cart_items (cart_id, product_id, quantity) VALUES ($1, $2, $3) RETURNING *",
        )
        .bind(cart.id)
        .bind(payload.product_id)
        .bind(payload.quantity)
        .fetch_one(pool)
        .await?
    };

    record_or_warn(
        pool,
        AuditEntry {
            user_id: owner_user_id(owner),
            action: "cart_update",
            resource: Some("cart_items"),
            metadata: Some(serde_json::json!({
                "product_id": payload.product_id,
                "quantity": payload.quantity,
            })),
        },
    )
    .await;

    Ok(ApiResponse::success("OK", cart_item, None))
}

pub async fn remove_from_cart(
    pool: &DbPool,
    owner: &CartOwner,
    product_id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let cart = resolve_cart(pool, owner).await?;

    let result = sqlx::query("DELETE FROM cart_items WHERE cart_id = $1 AND product_id = $2")
        .bind(cart.id)
        .bind(product_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound);
    }

    record_or_warn(
        pool,
        AuditEntry {
            user_id: owner_user_id(owner),
            action: "cart_remove",
            resource: Some("cart_items"),
            metadata: Some(serde_json::json!({ "product_id": product_id })),
        },
    )
    .await;

    Ok(ApiResponse::success(
        "Removed from cart",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

fn owner_user_id(owner: &CartOwner) -> Option<Uuid> {
    match owner {
        CartOwner::User(user_id) => Some(*user_id),
        CartOwner::Session(_) => None,
    }
}
