use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, Set,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use super::{clean_optional, slugify, Page, PageRequest};
use crate::entities::product::{self, Highlight, StockStatus};
use crate::entities::StringList;
use crate::errors::ServiceError;

pub(crate) fn non_negative(value: &Decimal) -> Result<(), ValidationError> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(ValidationError::new("non_negative"));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, Default, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ProductSort {
    #[default]
    Newest,
    PriceAsc,
    PriceDesc,
    Name,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
pub struct ProductQuery {
    pub category: Option<String>,
    /// Matches name, description or material
    pub search: Option<String>,
    pub featured: Option<bool>,
    pub highlight: Option<Highlight>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    #[serde(default)]
    #[param(inline)]
    pub sort: ProductSort,
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

impl ProductQuery {
    pub fn page_request(&self) -> PageRequest {
        PageRequest::from_parts(self.page, self.limit)
    }
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateProductInput {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    /// Derived from the name when omitted
    #[validate(length(min = 1, max = 200))]
    pub slug: Option<String>,
    #[serde(default)]
    pub description: String,
    #[validate(length(min = 1, max = 100))]
    pub category: String,
    pub material: Option<String>,
    pub dimensions: Option<String>,
    #[validate(custom = "non_negative")]
    pub price: Decimal,
    #[serde(default)]
    #[validate(range(min = 0, max = 100))]
    pub discount: i32,
    pub stock_status: Option<StockStatus>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub highlight: Highlight,
    #[serde(default)]
    pub featured: bool,
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateProductInput {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    #[validate(length(min = 1, max = 200))]
    pub slug: Option<String>,
    pub description: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub category: Option<String>,
    pub material: Option<String>,
    pub dimensions: Option<String>,
    #[validate(custom = "non_negative")]
    pub price: Option<Decimal>,
    #[validate(range(min = 0, max = 100))]
    pub discount: Option<i32>,
    pub stock_status: Option<StockStatus>,
    pub images: Option<Vec<String>>,
    pub tags: Option<Vec<String>>,
    pub highlight: Option<Highlight>,
    pub featured: Option<bool>,
}

/// Product catalog: public browsing and admin maintenance.
#[derive(Clone)]
pub struct CatalogService {
    db: Arc<DatabaseConnection>,
}

impl CatalogService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[instrument(skip(self))]
    pub async fn list_products(&self, query: ProductQuery) -> Result<Page<product::Model>, ServiceError> {
        let page = query.page_request();
        let mut condition = Condition::all();

        if let Some(category) = clean_optional(query.category) {
            condition = condition.add(product::Column::Category.eq(category));
        }
        if let Some(search) = clean_optional(query.search) {
            condition = condition.add(
                Condition::any()
                    .add(product::Column::Name.contains(&search))
                    .add(product::Column::Description.contains(&search))
                    .add(product::Column::Material.contains(&search)),
            );
        }
        if let Some(featured) = query.featured {
            condition = condition.add(product::Column::Featured.eq(featured));
        }
        if let Some(highlight) = query.highlight {
            condition = condition.add(product::Column::Highlight.eq(highlight));
        }
        if let Some(min) = query.min_price {
            condition = condition.add(product::Column::Price.gte(min));
        }
        if let Some(max) = query.max_price {
            condition = condition.add(product::Column::Price.lte(max));
        }

        let select = product::Entity::find().filter(condition);
        let select = match query.sort {
            ProductSort::Newest => select.order_by_desc(product::Column::CreatedAt),
            ProductSort::PriceAsc => select.order_by_asc(product::Column::Price),
            ProductSort::PriceDesc => select.order_by_desc(product::Column::Price),
            ProductSort::Name => select.order_by_asc(product::Column::Name),
        };

        let paginator = select.paginate(&*self.db, page.limit());
        let total = paginator.num_items().await?;
        let items = paginator.fetch_page(page.index()).await?;
        Ok(Page::new(items, total, page))
    }

    /// Looks a product up by id, falling back to its slug.
    #[instrument(skip(self))]
    pub async fn get_product(&self, id_or_slug: &str) -> Result<product::Model, ServiceError> {
        let found = match Uuid::parse_str(id_or_slug) {
            Ok(id) => product::Entity::find_by_id(id).one(&*self.db).await?,
            Err(_) => {
                product::Entity::find()
                    .filter(product::Column::Slug.eq(id_or_slug))
                    .one(&*self.db)
                    .await?
            }
        };
        found.ok_or_else(|| ServiceError::not_found("Product", id_or_slug))
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<product::Model, ServiceError> {
        product::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Product", id))
    }

    /// Loads several products keyed by id. Unknown ids are simply absent.
    pub async fn find_many(&self, ids: &[Uuid]) -> Result<HashMap<Uuid, product::Model>, ServiceError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let products = product::Entity::find()
            .filter(product::Column::Id.is_in(ids.iter().copied()))
            .all(&*self.db)
            .await?;
        Ok(products.into_iter().map(|p| (p.id, p)).collect())
    }

    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create_product(&self, input: CreateProductInput) -> Result<product::Model, ServiceError> {
        input.validate()?;

        let name = input.name.trim().to_string();
        let slug = slugify(input.slug.as_deref().unwrap_or(&name));
        if slug.is_empty() {
            return Err(ServiceError::ValidationError(
                "Product slug must contain letters or digits".into(),
            ));
        }
        self.ensure_unique_slug(&slug, None).await?;

        let now = Utc::now();
        let product = product::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name),
            slug: Set(slug),
            description: Set(input.description),
            category: Set(input.category.trim().to_string()),
            material: Set(clean_optional(input.material)),
            dimensions: Set(clean_optional(input.dimensions)),
            price: Set(input.price),
            discount: Set(input.discount),
            stock_status: Set(input.stock_status.unwrap_or(StockStatus::InStock)),
            images: Set(StringList(input.images)),
            tags: Set(StringList(input.tags)),
            highlight: Set(input.highlight),
            featured: Set(input.featured),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await?;

        info!(product_id = %product.id, slug = %product.slug, "product created");
        Ok(product)
    }

    #[instrument(skip(self, input))]
    pub async fn update_product(
        &self,
        id: Uuid,
        input: UpdateProductInput,
    ) -> Result<product::Model, ServiceError> {
        input.validate()?;
        let existing = self.get_by_id(id).await?;
        let mut active: product::ActiveModel = existing.into();

        if let Some(slug) = input.slug {
            let slug = slugify(&slug);
            if slug.is_empty() {
                return Err(ServiceError::ValidationError(
                    "Product slug must contain letters or digits".into(),
                ));
            }
            self.ensure_unique_slug(&slug, Some(id)).await?;
            active.slug = Set(slug);
        }
        if let Some(name) = input.name {
            active.name = Set(name.trim().to_string());
        }
        if let Some(description) = input.description {
            active.description = Set(description);
        }
        if let Some(category) = input.category {
            active.category = Set(category.trim().to_string());
        }
        if input.material.is_some() {
            active.material = Set(clean_optional(input.material));
        }
        if input.dimensions.is_some() {
            active.dimensions = Set(clean_optional(input.dimensions));
        }
        if let Some(price) = input.price {
            active.price = Set(price);
        }
        if let Some(discount) = input.discount {
            active.discount = Set(discount);
        }
        if let Some(stock_status) = input.stock_status {
            active.stock_status = Set(stock_status);
        }
        if let Some(images) = input.images {
            active.images = Set(StringList(images));
        }
        if let Some(tags) = input.tags {
            active.tags = Set(StringList(tags));
        }
        if let Some(highlight) = input.highlight {
            active.highlight = Set(highlight);
        }
        if let Some(featured) = input.featured {
            active.featured = Set(featured);
        }
        active.updated_at = Set(Utc::now());

        let product = active.update(&*self.db).await?;
        info!(product_id = %id, "product updated");
        Ok(product)
    }

    #[instrument(skip(self))]
    pub async fn delete_product(&self, id: Uuid) -> Result<(), ServiceError> {
        let result = product::Entity::delete_by_id(id).exec(&*self.db).await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::not_found("Product", id));
        }
        info!(product_id = %id, "product deleted");
        Ok(())
    }

    async fn ensure_unique_slug(&self, slug: &str, exclude: Option<Uuid>) -> Result<(), ServiceError> {
        let mut query = product::Entity::find().filter(product::Column::Slug.eq(slug));
        if let Some(id) = exclude {
            query = query.filter(product::Column::Id.ne(id));
        }
        if query.one(&*self.db).await?.is_some() {
            return Err(ServiceError::Conflict(format!(
                "A product with slug '{}' already exists",
                slug
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn input() -> CreateProductInput {
        CreateProductInput {
            name: "Carved Elephant".into(),
            slug: None,
            description: String::new(),
            category: "sculptures".into(),
            material: None,
            dimensions: None,
            price: dec!(4999),
            discount: 10,
            stock_status: None,
            images: vec![],
            tags: vec![],
            highlight: Highlight::None,
            featured: false,
        }
    }

    #[test]
    fn discount_outside_percentage_range_is_invalid() {
        let mut bad = input();
        bad.discount = 101;
        assert!(bad.validate().is_err());
        bad.discount = -1;
        assert!(bad.validate().is_err());
        assert!(input().validate().is_ok());
    }

    #[test]
    fn negative_price_is_invalid() {
        let mut bad = input();
        bad.price = dec!(-0.01);
        assert!(bad.validate().is_err());
        bad.price = dec!(0);
        assert!(bad.validate().is_ok());
    }
}
