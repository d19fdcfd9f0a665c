use utoipa::{
    Modify, OpenApi,
    openapi::{
        self,
        OpenApi as OpenApiSpec,
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    },
};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    dto::{
        cart::{CartItemDto, CartView},
        categories::{self, CategoryList},
        coupons::{self, CouponList},
        orders::{self, OrderList, OrderWithItems},
        products,
    },
    error::FieldError,
    models::{Cart, CartItem, Category, Coupon, Order, OrderItem, Product, User},
    response::{ApiResponse, Meta},
    routes::{
        admin, auth, cart, categories as category_routes, health, orders as order_routes, params,
        products as product_routes,
    },
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        auth::login,
        auth::register,
        category_routes::list_categories,
        product_routes::list_products,
        product_routes::get_product,
        cart::view_cart,
        cart::add_to_cart,
        cart::remove_from_cart,
        order_routes::create_order,
        order_routes::checkout,
        order_routes::list_orders,
        order_routes::get_order,
        admin::create_category,
        admin::update_category,
        admin::delete_category,
        admin::create_product,
        admin::update_product,
        admin::delete_product,
        admin::list_coupons,
        admin::create_coupon,
        admin::update_coupon,
        admin::delete_coupon,
        admin::list_all_orders,
        admin::get_order_admin,
        admin::update_order_status
    ),
    components(
        schemas(
            User,
            Category,
            Product,
            Coupon,
            Cart,
            CartItem,
            Order,
            OrderItem,
            FieldError,
            CategoryList,
            categories::CreateCategoryRequest,
            categories::UpdateCategoryRequest,
            products::CreateProductRequest,
            products::UpdateProductRequest,
            products::ProductList,
            CouponList,
            coupons::CreateCouponRequest,
            coupons::UpdateCouponRequest,
            CartView,
            CartItemDto,
            orders::OrderItemInput,
            orders::CreateOrderRequest,
            orders::CheckoutRequest,
            OrderList,
            OrderWithItems,
            admin::UpdateOrderStatusRequest,
            params::Pagination,
            params::ProductQuery,
            params::OrderListQuery,
            Meta,
            ApiResponse<Product>,
            ApiResponse<products::ProductList>,
            ApiResponse<CategoryList>,
            ApiResponse<CartView>,
            ApiResponse<OrderWithItems>,
            ApiResponse<OrderList>,
            ApiResponse<CouponList>
        )
    ),
    security(
        ("bearer_auth" = [])
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Categories", description = "Public category catalog"),
        (name = "Products", description = "Public product catalog"),
        (name = "Cart", description = "Cart endpoints"),
        (name = "Orders", description = "Order intake and checkout"),
        (name = "Admin", description = "Administrative endpoints"),
        (name = "Auth", description = "Authentication endpoints"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}
