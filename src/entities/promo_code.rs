use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::UuidList;
use crate::services::pricing::round_money;

#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    ToSchema,
    strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DiscountType {
    #[sea_orm(string_value = "percentage")]
    Percentage,
    #[sea_orm(string_value = "fixed")]
    Fixed,
}

/// Why a code cannot be applied to an order.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PromoRejection {
    #[error("Promo code is not active")]
    Inactive,
    #[error("Promo code is not valid yet")]
    NotStarted,
    #[error("Promo code has expired")]
    Expired,
    #[error("Promo code usage limit reached")]
    UsageLimitReached,
    #[error("Order total must be at least {0} to use this promo code")]
    BelowMinimum(Decimal),
    #[error("Promo code already used")]
    AlreadyUsed,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "promo_codes")]
#[schema(as = PromoCode)]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    /// Stored upper-case
    #[sea_orm(unique)]
    pub code: String,
    pub description: Option<String>,
    pub discount_type: DiscountType,
    pub value: Decimal,
    pub min_order_value: Decimal,
    /// Ceiling for percentage discounts
    pub max_discount: Option<Decimal>,
    pub valid_from: DateTime<Utc>,
    pub valid_until: Option<DateTime<Utc>>,
    pub usage_limit: Option<i32>,
    pub usage_count: i32,
    #[sea_orm(column_type = "Json")]
    pub used_by: UuidList,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    /// Checks every rule that can disqualify this code for `user_id` on an
    /// order whose pre-discount subtotal is `subtotal`.
    pub fn check_eligibility(
        &self,
        user_id: Uuid,
        subtotal: Decimal,
        now: DateTime<Utc>,
    ) -> Result<(), PromoRejection> {
        if !self.is_active {
            return Err(PromoRejection::Inactive);
        }
        if now < self.valid_from {
            return Err(PromoRejection::NotStarted);
        }
        if self.valid_until.is_some_and(|until| now > until) {
            return Err(PromoRejection::Expired);
        }
        if self
            .usage_limit
            .is_some_and(|limit| self.usage_count >= limit)
        {
            return Err(PromoRejection::UsageLimitReached);
        }
        if subtotal < self.min_order_value {
            return Err(PromoRejection::BelowMinimum(self.min_order_value));
        }
        if self.used_by.contains(&user_id) {
            return Err(PromoRejection::AlreadyUsed);
        }
        Ok(())
    }

    /// Discount this code grants on `subtotal`, never more than the subtotal.
    pub fn discount_for(&self, subtotal: Decimal) -> Decimal {
        let raw = match self.discount_type {
            DiscountType::Percentage => {
                let pct = subtotal * self.value / Decimal::ONE_HUNDRED;
                match self.max_discount {
                    Some(cap) => pct.min(cap),
                    None => pct,
                }
            }
            DiscountType::Fixed => self.value,
        };
        round_money(raw.min(subtotal).max(Decimal::ZERO))
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn promo() -> Model {
        let now = Utc::now();
        Model {
            id: Uuid::new_v4(),
            code: "MARBLE10".into(),
            description: None,
            discount_type: DiscountType::Percentage,
            value: dec!(10),
            min_order_value: dec!(1000),
            max_discount: Some(dec!(500)),
            valid_from: now - Duration::days(1),
            valid_until: Some(now + Duration::days(30)),
            usage_limit: Some(2),
            usage_count: 0,
            used_by: UuidList::default(),
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn eligible_code_passes() {
        assert!(promo()
            .check_eligibility(Uuid::new_v4(), dec!(2000), Utc::now())
            .is_ok());
    }

    #[test]
    fn usage_limit_reached_is_rejected() {
        let mut code = promo();
        code.usage_count = 2;
        assert_eq!(
            code.check_eligibility(Uuid::new_v4(), dec!(2000), Utc::now()),
            Err(PromoRejection::UsageLimitReached)
        );
    }

    #[test]
    fn below_minimum_is_rejected() {
        assert_eq!(
            promo().check_eligibility(Uuid::new_v4(), dec!(999.99), Utc::now()),
            Err(PromoRejection::BelowMinimum(dec!(1000)))
        );
    }

    #[test]
    fn repeat_use_by_same_user_is_rejected() {
        let user = Uuid::new_v4();
        let mut code = promo();
        code.used_by.0.push(user);
        code.usage_count = 1;
        assert_eq!(
            code.check_eligibility(user, dec!(2000), Utc::now()),
            Err(PromoRejection::AlreadyUsed)
        );
        assert!(code
            .check_eligibility(Uuid::new_v4(), dec!(2000), Utc::now())
            .is_ok());
    }

    #[test]
    fn validity_window_is_enforced() {
        let code = promo();
        assert_eq!(
            code.check_eligibility(Uuid::new_v4(), dec!(2000), Utc::now() + Duration::days(31)),
            Err(PromoRejection::Expired)
        );
        assert_eq!(
            code.check_eligibility(Uuid::new_v4(), dec!(2000), Utc::now() - Duration::days(2)),
            Err(PromoRejection::NotStarted)
        );
    }

    #[test]
    fn percentage_discount_is_capped() {
        let code = promo();
        assert_eq!(code.discount_for(dec!(2000)), dec!(200));
        assert_eq!(code.discount_for(dec!(9000)), dec!(500));
    }

    #[test]
    fn fixed_discount_never_exceeds_subtotal() {
        let mut code = promo();
        code.discount_type = DiscountType::Fixed;
        code.value = dec!(750);
        assert_eq!(code.discount_for(dec!(2000)), dec!(750));
        assert_eq!(code.discount_for(dec!(600)), dec!(600));
    }
}
