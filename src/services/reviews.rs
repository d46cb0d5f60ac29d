use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use super::catalog::CatalogService;
use super::orders::{is_unique_violation, OrderService};
use super::{clean_optional, Page, PageRequest};
use crate::auth::AuthUser;
use crate::entities::review;
use crate::errors::ServiceError;

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateReviewInput {
    pub product_id: Uuid,
    #[validate(range(min = 1, max = 5))]
    pub rating: i32,
    #[validate(length(max = 120))]
    pub title: Option<String>,
    #[validate(length(min = 1, max = 4000))]
    pub comment: String,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct ModerateReviewInput {
    pub is_approved: bool,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
pub struct ReviewListQuery {
    pub product_id: Option<Uuid>,
    /// Admin only; ignored for everyone else
    pub include_unapproved: Option<bool>,
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

/// Rating summary over the reviews visible to the caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
pub struct RatingSummary {
    pub count: u64,
    pub average: f64,
}

impl RatingSummary {
    pub fn from_ratings(ratings: &[i32]) -> Self {
        if ratings.is_empty() {
            return Self::default();
        }
        let sum: i64 = ratings.iter().map(|r| i64::from(*r)).sum();
        let average = sum as f64 / ratings.len() as f64;
        Self {
            count: ratings.len() as u64,
            average: (average * 10.0).round() / 10.0,
        }
    }
}

#[derive(Clone)]
pub struct ReviewService {
    db: Arc<DatabaseConnection>,
    catalog: Arc<CatalogService>,
    orders: Arc<OrderService>,
}

impl ReviewService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        catalog: Arc<CatalogService>,
        orders: Arc<OrderService>,
    ) -> Self {
        Self { db, catalog, orders }
    }

    /// Approved reviews for everyone; admins may ask for the moderation queue too.
    pub async fn list_reviews(
        &self,
        caller: Option<&AuthUser>,
        query: ReviewListQuery,
    ) -> Result<Page<review::Model>, ServiceError> {
        let page = PageRequest::from_parts(query.page, query.limit);
        let show_all = caller.is_some_and(AuthUser::is_admin)
            && query.include_unapproved.unwrap_or(true);

        let mut select = review::Entity::find().order_by_desc(review::Column::CreatedAt);
        if let Some(product_id) = query.product_id {
            select = select.filter(review::Column::ProductId.eq(product_id));
        }
        if !show_all {
            select = select.filter(review::Column::IsApproved.eq(true));
        }
        let paginator = select.paginate(&*self.db, page.limit());
        let total = paginator.num_items().await?;
        let items = paginator.fetch_page(page.index()).await?;
        Ok(Page::new(items, total, page))
    }

    pub async fn rating_summary(&self, product_id: Uuid) -> Result<RatingSummary, ServiceError> {
        let ratings: Vec<i32> = review::Entity::find()
            .filter(review::Column::ProductId.eq(product_id))
            .filter(review::Column::IsApproved.eq(true))
            .all(&*self.db)
            .await?
            .into_iter()
            .map(|r| r.rating)
            .collect();
        Ok(RatingSummary::from_ratings(&ratings))
    }

    #[instrument(skip(self, input), fields(user_id = %caller.user_id, product_id = %input.product_id))]
    pub async fn create_review(
        &self,
        caller: &AuthUser,
        input: CreateReviewInput,
    ) -> Result<review::Model, ServiceError> {
        input.validate()?;
        let product = self.catalog.get_by_id(input.product_id).await?;

        let existing = review::Entity::find()
            .filter(review::Column::ProductId.eq(product.id))
            .filter(review::Column::UserId.eq(caller.user_id))
            .one(&*self.db)
            .await?;
        if existing.is_some() {
            return Err(ServiceError::Conflict(
                "You have already reviewed this product".into(),
            ));
        }

        let verified_purchase = self
            .orders
            .has_delivered_purchase(caller.user_id, product.id)
            .await?;

        let now = Utc::now();
        let created = review::ActiveModel {
            id: Set(Uuid::new_v4()),
            product_id: Set(product.id),
            user_id: Set(caller.user_id),
            reviewer_name: Set(caller.name.clone()),
            rating: Set(input.rating),
            title: Set(clean_optional(input.title)),
            comment: Set(input.comment.trim().to_string()),
            verified_purchase: Set(verified_purchase),
            is_approved: Set(false),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await
        .map_err(|err| {
            if is_unique_violation(&err) {
                ServiceError::Conflict("You have already reviewed this product".into())
            } else {
                err.into()
            }
        })?;

        info!(review_id = %created.id, verified_purchase, "review submitted for moderation");
        Ok(created)
    }

    #[instrument(skip(self))]
    pub async fn moderate_review(
        &self,
        caller: &AuthUser,
        id: Uuid,
        input: ModerateReviewInput,
    ) -> Result<review::Model, ServiceError> {
        caller.ensure_admin()?;
        let review = review::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Review", id))?;

        let mut active: review::ActiveModel = review.into();
        active.is_approved = Set(input.is_approved);
        active.updated_at = Set(Utc::now());
        Ok(active.update(&*self.db).await?)
    }

    #[instrument(skip(self))]
    pub async fn delete_review(&self, caller: &AuthUser, id: Uuid) -> Result<(), ServiceError> {
        let review = review::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Review", id))?;
        caller.ensure_can_access(review.user_id, "review")?;

        review::Entity::delete_by_id(id).exec(&*self.db).await?;
        info!(review_id = %id, "review deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_rounds_to_one_decimal() {
        let summary = RatingSummary::from_ratings(&[5, 4, 4]);
        assert_eq!(summary.count, 3);
        assert_eq!(summary.average, 4.3);
    }

    #[test]
    fn empty_summary() {
        assert_eq!(RatingSummary::from_ratings(&[]), RatingSummary::default());
    }
}
