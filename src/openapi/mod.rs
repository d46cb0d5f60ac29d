use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Stonecraft Storefront API",
        version = "1.0.0",
        description = r#"
# Stonecraft Storefront API

Back end for a marble and stone-art store: catalog, checkout with Razorpay,
order lifecycle, returns, support tickets, reviews and editorial content.

## Authentication

Register or log in under `/api/auth` and send the returned token:

```
Authorization: Bearer <your-jwt-token>
```

Catalog and content reads are public. Admin-only operations answer 403 for
customer tokens.

## Error Handling

Every failure carries the same body:

```json
{
  "error": "Order can only be cancelled while pending or confirmed",
  "status": 400,
  "request_id": "2f0c1b8e-...",
  "timestamp": "2026-03-09T10:30:00Z"
}
```

## Pagination

List endpoints accept `page` (default 1) and `limit` (default 20, max 100).
        "#,
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Auth", description = "Registration and login"),
        (name = "Products", description = "Catalog browsing and administration"),
        (name = "Orders", description = "Checkout and order lifecycle"),
        (name = "Payments", description = "Payment confirmation and gateway webhooks"),
        (name = "Returns", description = "Return requests and refunds"),
        (name = "Support", description = "Support tickets"),
        (name = "Reviews", description = "Product reviews and moderation"),
        (name = "Promotions", description = "Promo codes"),
        (name = "Account", description = "Profile, address book and wishlist"),
        (name = "Content", description = "Projects, testimonials and home page")
    ),
    paths(
        // Auth
        crate::handlers::auth::register,
        crate::handlers::auth::login,

        // Products
        crate::handlers::products::list_products,
        crate::handlers::products::get_product,
        crate::handlers::products::create_product,
        crate::handlers::products::update_product,
        crate::handlers::products::delete_product,

        // Orders
        crate::handlers::orders::create_order,
        crate::handlers::orders::list_orders,
        crate::handlers::orders::get_order,
        crate::handlers::orders::update_order,
        crate::handlers::orders::cancel_order,
        crate::handlers::orders::delete_order,

        // Payments
        crate::handlers::payments::verify_payment,
        crate::handlers::webhooks::razorpay_webhook,

        // Returns
        crate::handlers::returns::create_return,
        crate::handlers::returns::list_returns,
        crate::handlers::returns::get_return,
        crate::handlers::returns::update_return,
        crate::handlers::returns::cancel_return,

        // Support
        crate::handlers::tickets::create_ticket,
        crate::handlers::tickets::list_tickets,
        crate::handlers::tickets::get_ticket,
        crate::handlers::tickets::add_message,
        crate::handlers::tickets::update_ticket,

        // Reviews
        crate::handlers::reviews::list_reviews,
        crate::handlers::reviews::rating_summary,
        crate::handlers::reviews::create_review,
        crate::handlers::reviews::moderate_review,
        crate::handlers::reviews::delete_review,

        // Promotions
        crate::handlers::promotions::validate_promo,
        crate::handlers::promotions::list_promo_codes,
        crate::handlers::promotions::create_promo_code,
        crate::handlers::promotions::update_promo_code,
        crate::handlers::promotions::delete_promo_code,

        // Account
        crate::handlers::users::get_profile,
        crate::handlers::users::update_profile,
        crate::handlers::users::list_addresses,
        crate::handlers::users::add_address,
        crate::handlers::users::update_address,
        crate::handlers::users::delete_address,
        crate::handlers::users::get_wishlist,
        crate::handlers::users::add_to_wishlist,
        crate::handlers::users::remove_from_wishlist,

        // Content
        crate::handlers::cms::list_projects,
        crate::handlers::cms::get_project,
        crate::handlers::cms::create_project,
        crate::handlers::cms::update_project,
        crate::handlers::cms::delete_project,
        crate::handlers::cms::list_testimonials,
        crate::handlers::cms::create_testimonial,
        crate::handlers::cms::update_testimonial,
        crate::handlers::cms::delete_testimonial,
        crate::handlers::cms::get_homepage,
        crate::handlers::cms::upsert_section,
        crate::handlers::cms::delete_section,
    ),
    components(
        schemas(
            crate::errors::ErrorResponse,
            crate::entities::TimelineEntry,
            crate::auth::TokenResponse
        )
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "Bearer",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_lists_storefront_routes() {
        let json = ApiDoc::openapi().to_json().unwrap();
        assert!(json.contains("Stonecraft Storefront API"));
        assert!(json.contains("/api/orders/{id}/cancel"));
        assert!(json.contains("/api/webhooks/razorpay"));
        assert!(json.contains("\"Bearer\""));
    }
}
