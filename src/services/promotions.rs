use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use super::catalog::non_negative;
use super::{clean_optional, Page, PageRequest};
use crate::entities::order::{self, OrderStatus, PaymentMethod, PaymentStatus};
use crate::entities::promo_code::{self, DiscountType};
use crate::entities::UuidList;
use crate::errors::ServiceError;

fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

/// Discount a code grants on a given subtotal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct PromoQuote {
    pub code: String,
    pub description: Option<String>,
    pub discount_type: DiscountType,
    pub discount: Decimal,
    pub subtotal_after_discount: Decimal,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct ValidatePromoInput {
    #[validate(length(min = 1, max = 32))]
    pub code: String,
    #[validate(custom = "non_negative")]
    pub subtotal: Decimal,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreatePromoInput {
    #[validate(length(min = 3, max = 32))]
    pub code: String,
    pub description: Option<String>,
    pub discount_type: DiscountType,
    #[validate(custom = "non_negative")]
    pub value: Decimal,
    #[serde(default)]
    #[validate(custom = "non_negative")]
    pub min_order_value: Decimal,
    #[validate(custom = "non_negative")]
    pub max_discount: Option<Decimal>,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
    #[validate(range(min = 1))]
    pub usage_limit: Option<i32>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdatePromoInput {
    pub description: Option<String>,
    pub discount_type: Option<DiscountType>,
    #[validate(custom = "non_negative")]
    pub value: Option<Decimal>,
    #[validate(custom = "non_negative")]
    pub min_order_value: Option<Decimal>,
    #[validate(custom = "non_negative")]
    pub max_discount: Option<Decimal>,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
    #[validate(range(min = 1))]
    pub usage_limit: Option<i32>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
pub struct PromoListQuery {
    pub active: Option<bool>,
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

fn check_value(discount_type: DiscountType, value: Decimal) -> Result<(), ServiceError> {
    if value <= Decimal::ZERO {
        return Err(ServiceError::ValidationError(
            "Discount value must be greater than zero".into(),
        ));
    }
    if discount_type == DiscountType::Percentage && value > Decimal::ONE_HUNDRED {
        return Err(ServiceError::ValidationError(
            "Percentage discount cannot exceed 100".into(),
        ));
    }
    Ok(())
}

fn check_window(from: DateTime<Utc>, until: Option<DateTime<Utc>>) -> Result<(), ServiceError> {
    if until.is_some_and(|until| until <= from) {
        return Err(ServiceError::ValidationError(
            "valid_until must be after valid_from".into(),
        ));
    }
    Ok(())
}

#[derive(Clone)]
pub struct PromotionService {
    db: Arc<DatabaseConnection>,
}

impl PromotionService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub async fn find_by_code<C: ConnectionTrait>(
        conn: &C,
        code: &str,
    ) -> Result<Option<promo_code::Model>, ServiceError> {
        Ok(promo_code::Entity::find()
            .filter(promo_code::Column::Code.eq(normalize_code(code)))
            .one(conn)
            .await?)
    }

    /// Prices `code` for `user_id` on `subtotal`, rejecting ineligible codes with 400.
    #[instrument(skip(self))]
    pub async fn quote(
        &self,
        user_id: Uuid,
        code: &str,
        subtotal: Decimal,
    ) -> Result<PromoQuote, ServiceError> {
        let promo = Self::find_by_code(&*self.db, code)
            .await?
            .ok_or_else(|| ServiceError::ValidationError("Invalid promo code".into()))?;

        promo
            .check_eligibility(user_id, subtotal, Utc::now())
            .map_err(|rejection| ServiceError::ValidationError(rejection.to_string()))?;

        let discount = promo.discount_for(subtotal);
        Ok(PromoQuote {
            code: promo.code,
            description: promo.description,
            discount_type: promo.discount_type,
            discount,
            subtotal_after_discount: subtotal - discount,
        })
    }

    /// [`Self::quote`] for a new order. Online orders only redeem their code
    /// once paid, so unpaid ones still hold a claim on it: the same customer
    /// cannot stack a second one, and together they count toward the limit.
    pub async fn quote_for_checkout(
        &self,
        user_id: Uuid,
        code: &str,
        subtotal: Decimal,
    ) -> Result<PromoQuote, ServiceError> {
        let quote = self.quote(user_id, code, subtotal).await?;

        let awaiting_payment = order::Entity::find()
            .filter(order::Column::PromoCode.eq(quote.code.as_str()))
            .filter(order::Column::PaymentMethod.eq(PaymentMethod::Razorpay))
            .filter(order::Column::PaymentStatus.eq(PaymentStatus::Pending))
            .filter(order::Column::Status.ne(OrderStatus::Cancelled))
            .all(&*self.db)
            .await?;

        if awaiting_payment.iter().any(|o| o.user_id == user_id) {
            return Err(ServiceError::ValidationError(
                "Promo code is already applied to an order awaiting payment".into(),
            ));
        }
        if let Some(promo) = Self::find_by_code(&*self.db, &quote.code).await? {
            if let Some(limit) = promo.usage_limit {
                let claimed = i64::from(promo.usage_count) + awaiting_payment.len() as i64;
                if claimed >= i64::from(limit) {
                    return Err(ServiceError::ValidationError(
                        "Promo code usage limit reached".into(),
                    ));
                }
            }
        }
        Ok(quote)
    }

    pub async fn validate_code(
        &self,
        user_id: Uuid,
        input: ValidatePromoInput,
    ) -> Result<PromoQuote, ServiceError> {
        input.validate()?;
        self.quote(user_id, &input.code, input.subtotal).await
    }

    /// Counts one redemption of `code` by `user_id`. Runs inside the caller's
    /// transaction so that the redemption commits with the payment.
    pub async fn record_usage<C: ConnectionTrait>(
        conn: &C,
        code: &str,
        user_id: Uuid,
    ) -> Result<(), ServiceError> {
        let Some(promo) = Self::find_by_code(conn, code).await? else {
            warn!(code, "redeemed promo code no longer exists");
            return Ok(());
        };
        if promo.used_by.contains(&user_id) {
            warn!(code, %user_id, "promo code already redeemed by this customer; not counted again");
            return Ok(());
        }
        if promo.usage_limit.is_some_and(|limit| promo.usage_count >= limit) {
            warn!(code, %user_id, "promo code redeemed past its usage limit");
        }

        let mut used_by = promo.used_by.clone();
        used_by.0.push(user_id);
        let usage_count = promo.usage_count + 1;

        let mut active: promo_code::ActiveModel = promo.into();
        active.usage_count = Set(usage_count);
        active.used_by = Set(used_by);
        active.updated_at = Set(Utc::now());
        active.update(conn).await?;

        metrics::counter!("stonecraft_promo.redemptions", 1);
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn list(&self, query: PromoListQuery) -> Result<Page<promo_code::Model>, ServiceError> {
        let page = PageRequest::from_parts(query.page, query.limit);
        let mut select = promo_code::Entity::find().order_by_desc(promo_code::Column::CreatedAt);
        if let Some(active) = query.active {
            select = select.filter(promo_code::Column::IsActive.eq(active));
        }
        let paginator = select.paginate(&*self.db, page.limit());
        let total = paginator.num_items().await?;
        let items = paginator.fetch_page(page.index()).await?;
        Ok(Page::new(items, total, page))
    }

    #[instrument(skip(self, input), fields(code = %input.code))]
    pub async fn create(&self, input: CreatePromoInput) -> Result<promo_code::Model, ServiceError> {
        input.validate()?;
        check_value(input.discount_type, input.value)?;

        let code = normalize_code(&input.code);
        if !code.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
            return Err(ServiceError::ValidationError(
                "Promo code may contain only letters, digits, '-' and '_'".into(),
            ));
        }
        if Self::find_by_code(&*self.db, &code).await?.is_some() {
            return Err(ServiceError::Conflict(format!("Promo code {} already exists", code)));
        }

        let now = Utc::now();
        let valid_from = input.valid_from.unwrap_or(now);
        check_window(valid_from, input.valid_until)?;

        let promo = promo_code::ActiveModel {
            id: Set(Uuid::new_v4()),
            code: Set(code),
            description: Set(clean_optional(input.description)),
            discount_type: Set(input.discount_type),
            value: Set(input.value),
            min_order_value: Set(input.min_order_value),
            max_discount: Set(input.max_discount),
            valid_from: Set(valid_from),
            valid_until: Set(input.valid_until),
            usage_limit: Set(input.usage_limit),
            usage_count: Set(0),
            used_by: Set(UuidList::default()),
            is_active: Set(input.is_active),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await?;

        info!(promo_id = %promo.id, code = %promo.code, "promo code created");
        Ok(promo)
    }

    #[instrument(skip(self, input))]
    pub async fn update(
        &self,
        id: Uuid,
        input: UpdatePromoInput,
    ) -> Result<promo_code::Model, ServiceError> {
        input.validate()?;
        let existing = promo_code::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Promo code", id))?;

        let discount_type = input.discount_type.unwrap_or(existing.discount_type);
        let value = input.value.unwrap_or(existing.value);
        check_value(discount_type, value)?;
        let valid_from = input.valid_from.unwrap_or(existing.valid_from);
        let valid_until = input.valid_until.or(existing.valid_until);
        check_window(valid_from, valid_until)?;

        let mut active: promo_code::ActiveModel = existing.into();
        if input.description.is_some() {
            active.description = Set(clean_optional(input.description));
        }
        active.discount_type = Set(discount_type);
        active.value = Set(value);
        if let Some(min) = input.min_order_value {
            active.min_order_value = Set(min);
        }
        if input.max_discount.is_some() {
            active.max_discount = Set(input.max_discount);
        }
        active.valid_from = Set(valid_from);
        active.valid_until = Set(valid_until);
        if input.usage_limit.is_some() {
            active.usage_limit = Set(input.usage_limit);
        }
        if let Some(is_active) = input.is_active {
            active.is_active = Set(is_active);
        }
        active.updated_at = Set(Utc::now());

        Ok(active.update(&*self.db).await?)
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, id: Uuid) -> Result<(), ServiceError> {
        let result = promo_code::Entity::delete_by_id(id).exec(&*self.db).await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::not_found("Promo code", id));
        }
        info!(promo_id = %id, "promo code deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn codes_are_upper_cased() {
        assert_eq!(normalize_code("  diwali20 "), "DIWALI20");
    }

    #[test]
    fn percentage_over_hundred_is_rejected() {
        assert!(check_value(DiscountType::Percentage, dec!(101)).is_err());
        assert!(check_value(DiscountType::Fixed, dec!(101)).is_ok());
        assert!(check_value(DiscountType::Fixed, dec!(0)).is_err());
    }

    #[test]
    fn window_must_be_ordered() {
        let now = Utc::now();
        assert!(check_window(now, Some(now)).is_err());
        assert!(check_window(now, Some(now + chrono::Duration::days(1))).is_ok());
        assert!(check_window(now, None).is_ok());
    }
}
