use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::{Order, OrderItem};

/// One submitted order line. The product reference is accepted as either
/// `product` or `product_id`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct OrderItemInput {
    #[serde(alias = "product")]
    pub product_id: Uuid,
    pub quantity: i32,
    pub price_at_time: Decimal,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateOrderRequest {
    pub guest_name: Option<String>,
    pub guest_email: Option<String>,
    /// Defaults to "pending".
    pub status: Option<String>,
    #[serde(default)]
    pub items: Vec<OrderItemInput>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CheckoutRequest {
    pub coupon_code: Option<String>,
    /// Required when checking out a guest-session cart.
    pub guest_name: Option<String>,
    pub guest_email: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderWithItems {
    pub order: Order,
    pub items: Vec<OrderItem>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderList {
    pub items: Vec<Order>,
}
