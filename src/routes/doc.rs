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
        auth::{LoginRequest, LoginResponse, RegisterRequest},
        cart::{AddToCartRequest, CartItemDto, CartList, UpdateCartItemRequest},
        categories::{CategoryNode, CategoryTree, CreateCategoryRequest, UpdateCategoryRequest},
        employees::{CreateEmployeeRequest, EmployeeDetail, EmployeeList, UpdateEmployeeRequest},
        notifications::{NotificationList, UnreadCount},
        orders::{
            FileUploadForm, OrderItemInput, OrderList, OrderWithItems, PlaceOrderForm,
            PlacedOrder, ShippingInfo, UpdateOrderStatusRequest,
        },
        products::{CreateProductRequest, ProductList, StockAdjustRequest, UpdateProductRequest},
        profile::{ChangePasswordRequest, Profile, UpdateProfileRequest},
    },
    entity::sea_orm_active_enums::{NotificationType, OrderStatus, UserRole, UserStatus},
    models::{CartItem, Category, Customer, Employee, Notification, Order, OrderItem, Product, User},
    response::{ApiResponse, Meta},
    routes::{
        auth, cart, categories, employees, health, notifications, orders, params, products,
        profile,
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
        auth::register,
        auth::login,
        profile::get_profile,
        profile::update_profile,
        profile::change_password,
        products::list_products,
        products::get_product,
        products::create_product,
        products::update_product,
        products::delete_product,
        products::adjust_stock,
        products::upload_image,
        categories::list_categories,
        categories::get_category,
        categories::create_category,
        categories::update_category,
        categories::delete_category,
        cart::cart_list,
        cart::add_to_cart,
        cart::update_cart_item,
        cart::remove_from_cart,
        cart::clear_cart,
        orders::place_order,
        orders::list_orders,
        orders::list_user_orders,
        orders::get_order,
        orders::update_order_status,
        orders::cancel_order,
        orders::upload_shipping_bill,
        orders::delete_order,
        employees::list_employees,
        employees::get_employee,
        employees::create_employee,
        employees::update_employee,
        employees::delete_employee,
        notifications::list_notifications,
        notifications::unread_count,
        notifications::mark_read,
        notifications::mark_all_read
    ),
    components(
        schemas(
            User,
            Customer,
            Employee,
            Product,
            Category,
            CartItem,
            Order,
            OrderItem,
            Notification,
            UserRole,
            UserStatus,
            OrderStatus,
            NotificationType,
            RegisterRequest,
            LoginRequest,
            LoginResponse,
            Profile,
            UpdateProfileRequest,
            ChangePasswordRequest,
            CreateProductRequest,
            UpdateProductRequest,
            StockAdjustRequest,
            ProductList,
            CreateCategoryRequest,
            UpdateCategoryRequest,
            CategoryNode,
            CategoryTree,
            AddToCartRequest,
            UpdateCartItemRequest,
            CartItemDto,
            CartList,
            OrderItemInput,
            ShippingInfo,
            PlaceOrderForm,
            FileUploadForm,
            UpdateOrderStatusRequest,
            OrderWithItems,
            PlacedOrder,
            OrderList,
            CreateEmployeeRequest,
            UpdateEmployeeRequest,
            EmployeeDetail,
            EmployeeList,
            NotificationList,
            UnreadCount,
            health::HealthData,
            params::Pagination,
            params::ProductQuery,
            params::OrderListQuery,
            params::SortOrder,
            params::ProductSortBy,
            Meta,
            ApiResponse<Product>,
            ApiResponse<ProductList>,
            ApiResponse<PlacedOrder>,
            ApiResponse<OrderWithItems>,
            ApiResponse<OrderList>
        )
    ),
    security(
        ("bearer_auth" = [])
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Auth", description = "Registration and login"),
        (name = "Profile", description = "Current user's account"),
        (name = "Products", description = "Catalog products"),
        (name = "Categories", description = "Two-level category tree"),
        (name = "Cart", description = "Shopping cart"),
        (name = "Orders", description = "Order placement and lifecycle"),
        (name = "Employees", description = "Back-office accounts"),
        (name = "Notifications", description = "Order notifications"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_lists_order_routes_and_bearer_scheme() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/api/orders"));
        assert!(doc.paths.paths.contains_key("/api/orders/{id}/cancel"));
        assert!(doc.paths.paths.contains_key("/api/orders/delete/{id}"));
        let components = doc.components.expect("components");
        assert!(components.security_schemes.contains_key("bearer_auth"));
    }
}
