//! Seed data script - populates the database with a demo storefront
//!
//! Run with: cargo run --bin seed-data
//!
//! This creates:
//! - an admin account
//! - 6 products across marble, sandstone and onyx
//! - 2 promo codes
//! - portfolio projects, testimonials and home page sections

use chrono::{Duration, Utc};
use clap::Parser;
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use stonecraft_api::{
    auth::password,
    db::{self, DbConfig},
    entities::{
        product::{Highlight, StockStatus},
        promo_code::DiscountType,
        user::{self, AddressBook, UserRole},
        UuidList,
    },
    errors::ServiceError,
    services::{
        catalog::{CatalogService, CreateProductInput},
        cms::{CmsService, CreateProjectInput, HomepageSectionInput, TestimonialInput},
        promotions::{CreatePromoInput, PromotionService},
    },
};

#[derive(Parser)]
#[command(name = "seed-data", about = "Populate a Stonecraft database with demo content")]
struct Cli {
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite://stonecraft.db?mode=rwc")]
    database_url: String,

    #[arg(long, default_value = "admin@stonecraft.local")]
    admin_email: String,

    #[arg(long, env = "SEED_ADMIN_PASSWORD", default_value = "Marble#Admin2026")]
    admin_password: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let cli = Cli::parse();
    info!("=== Stonecraft Seed Data ===");

    let conn = db::establish_connection_with_config(&DbConfig {
        url: cli.database_url.clone(),
        max_connections: 5,
        ..Default::default()
    })
    .await?;
    db::run_migrations(&conn).await?;
    let conn = Arc::new(conn);

    info!("Creating admin account...");
    create_admin(&conn, &cli.admin_email, &cli.admin_password).await?;

    info!("Creating products...");
    let count = create_products(CatalogService::new(conn.clone())).await?;
    info!("  Created {} products", count);

    info!("Creating promo codes...");
    let count = create_promos(PromotionService::new(conn.clone())).await?;
    info!("  Created {} promo codes", count);

    info!("Creating site content...");
    create_content(CmsService::new(conn.clone())).await?;

    info!("=== Seed Data Complete ===");
    info!("Try these API calls:");
    info!("  curl http://localhost:8080/api/products");
    info!("  curl http://localhost:8080/api/homepage");
    info!("Or explore interactively at: http://localhost:8080/swagger-ui");

    Ok(())
}

async fn create_admin(
    conn: &sea_orm::DatabaseConnection,
    email: &str,
    password_plain: &str,
) -> Result<(), ServiceError> {
    let email = email.trim().to_lowercase();
    if user::Entity::find()
        .filter(user::Column::Email.eq(email.as_str()))
        .one(conn)
        .await?
        .is_some()
    {
        warn!(%email, "admin already exists, skipping");
        return Ok(());
    }

    let now = Utc::now();
    user::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set("Store Admin".to_string()),
        email: Set(email.clone()),
        mobile: Set(None),
        password_hash: Set(password::hash_password(password_plain)?),
        role: Set(UserRole::Admin),
        addresses: Set(AddressBook::default()),
        wishlist: Set(UuidList::default()),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(conn)
    .await?;

    info!(%email, "  Admin created");
    Ok(())
}

fn product(
    name: &str,
    category: &str,
    material: &str,
    dimensions: &str,
    price: rust_decimal::Decimal,
    discount: i32,
    highlight: Highlight,
) -> CreateProductInput {
    CreateProductInput {
        name: name.to_string(),
        slug: None,
        description: format!("Hand-finished {} piece carved in our workshop.", material.to_lowercase()),
        category: category.to_string(),
        material: Some(material.to_string()),
        dimensions: Some(dimensions.to_string()),
        price,
        discount,
        stock_status: Some(StockStatus::InStock),
        images: vec![format!(
            "/images/products/{}.jpg",
            name.to_lowercase().replace(' ', "-")
        )],
        tags: vec![category.to_lowercase(), material.to_lowercase()],
        highlight,
        featured: highlight != Highlight::None,
    }
}

async fn create_products(catalog: CatalogService) -> Result<usize, ServiceError> {
    let items = vec![
        product("Carrara Ganesha Idol", "Idols", "Carrara Marble", "12 x 8 x 6 in", dec!(14500), 0, Highlight::Bestseller),
        product("Makrana Lotus Fountain", "Fountains", "Makrana Marble", "36 x 24 in", dec!(58000), 10, Highlight::New),
        product("Onyx Table Lamp", "Lighting", "Onyx", "18 x 7 in", dec!(9200), 15, Highlight::Sale),
        product("Sandstone Jali Panel", "Wall Decor", "Sandstone", "48 x 24 in", dec!(21000), 0, Highlight::None),
        product("Inlay Dining Tabletop", "Furniture", "White Marble", "72 x 40 in", dec!(185000), 5, Highlight::Limited),
        product("Black Marble Planter", "Garden", "Black Marble", "14 x 14 in", dec!(4800), 0, Highlight::None),
    ];

    let mut created = 0;
    for input in items {
        match catalog.create_product(input).await {
            Ok(_) => created += 1,
            Err(ServiceError::Conflict(msg)) => warn!("  skipping: {}", msg),
            Err(e) => return Err(e),
        }
    }
    Ok(created)
}

async fn create_promos(promotions: PromotionService) -> Result<usize, ServiceError> {
    let now = Utc::now();
    let codes = vec![
        CreatePromoInput {
            code: "WELCOME10".into(),
            description: Some("10% off the first order".into()),
            discount_type: DiscountType::Percentage,
            value: dec!(10),
            min_order_value: dec!(2000),
            max_discount: Some(dec!(5000)),
            valid_from: Some(now),
            valid_until: Some(now + Duration::days(90)),
            usage_limit: Some(500),
            is_active: true,
        },
        CreatePromoInput {
            code: "FESTIVE2500".into(),
            description: Some("Flat 2500 off orders above 25000".into()),
            discount_type: DiscountType::Fixed,
            value: dec!(2500),
            min_order_value: dec!(25000),
            max_discount: None,
            valid_from: Some(now),
            valid_until: Some(now + Duration::days(30)),
            usage_limit: None,
            is_active: true,
        },
    ];

    let mut created = 0;
    for input in codes {
        match promotions.create(input).await {
            Ok(_) => created += 1,
            Err(ServiceError::Conflict(msg)) => warn!("  skipping: {}", msg),
            Err(e) => return Err(e),
        }
    }
    Ok(created)
}

async fn create_content(cms: CmsService) -> Result<(), ServiceError> {
    let project = CreateProjectInput {
        title: "Temple Courtyard, Udaipur".into(),
        slug: None,
        description: "Hand-carved Makrana columns and inlay flooring for a private temple.".into(),
        location: Some("Udaipur, Rajasthan".into()),
        category: Some("Temples".into()),
        images: vec!["/images/projects/udaipur-courtyard.jpg".into()],
        featured: true,
        is_published: true,
    };
    if let Err(e) = cms.create_project(project).await {
        warn!(error = %e, "  project not created");
    }

    cms.create_testimonial(TestimonialInput {
        author_name: "Ananya Mehta".into(),
        author_title: Some("Interior designer".into()),
        quote: "The fountain arrived perfectly packed and the finish is flawless.".into(),
        rating: Some(5),
        avatar_url: None,
        is_published: true,
        display_order: 1,
    })
    .await?;

    cms.upsert_section(
        "hero",
        HomepageSectionInput {
            title: Some("Timeless stone, carved by hand".into()),
            subtitle: Some("Idols, fountains and furniture from Rajasthan".into()),
            content: json!({ "cta_label": "Shop now", "cta_href": "/products" }),
            display_order: 0,
            is_active: true,
        },
    )
    .await?;

    cms.upsert_section(
        "featured_categories",
        HomepageSectionInput {
            title: Some("Shop by category".into()),
            subtitle: None,
            content: json!({ "categories": ["Idols", "Fountains", "Furniture"] }),
            display_order: 1,
            is_active: true,
        },
    )
    .await?;

    Ok(())
}
