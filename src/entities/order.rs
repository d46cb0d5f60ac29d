use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{entity::prelude::*, FromJsonQueryResult};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{user::AddressDetails, Timeline};

/// Lifecycle of an order.
///
/// The happy path is pending → confirmed → processing → shipped → delivered.
/// Cancellation is possible only before processing starts and a delivered
/// order can move to returned once a return completes.
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
    strum::EnumString,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OrderStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "confirmed")]
    Confirmed,
    #[sea_orm(string_value = "processing")]
    Processing,
    #[sea_orm(string_value = "shipped")]
    Shipped,
    #[sea_orm(string_value = "delivered")]
    Delivered,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
    #[sea_orm(string_value = "returned")]
    Returned,
}

impl OrderStatus {
    pub fn is_cancellable(self) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::Confirmed)
    }

    /// Cancelled and returned orders no longer take money.
    pub fn is_closed(self) -> bool {
        matches!(self, OrderStatus::Cancelled | OrderStatus::Returned)
    }

    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        match (self, next) {
            (Pending, Confirmed)
            | (Confirmed, Processing)
            | (Processing, Shipped)
            | (Shipped, Delivered)
            | (Delivered, Returned) => true,
            (from, Cancelled) => from.is_cancellable(),
            _ => false,
        }
    }
}

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
pub enum PaymentMethod {
    #[sea_orm(string_value = "razorpay")]
    Razorpay,
    #[sea_orm(string_value = "cod")]
    Cod,
}

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
pub enum PaymentStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "completed")]
    Completed,
    #[sea_orm(string_value = "failed")]
    Failed,
    #[sea_orm(string_value = "refunded")]
    Refunded,
}

/// Catalog snapshot taken when the order is placed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct OrderItem {
    pub product_id: Uuid,
    pub name: String,
    pub image: Option<String>,
    pub unit_price: Decimal,
    pub discount: i32,
    pub discounted_price: Decimal,
    pub quantity: i32,
    pub line_total: Decimal,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult, ToSchema)]
pub struct OrderItems(pub Vec<OrderItem>);

impl OrderItems {
    pub fn find(&self, product_id: Uuid) -> Option<&OrderItem> {
        self.0.iter().find(|item| item.product_id == product_id)
    }

    pub fn contains(&self, product_id: Uuid) -> bool {
        self.find(product_id).is_some()
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "orders")]
#[schema(as = Order)]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub order_number: String,
    pub user_id: Uuid,
    #[sea_orm(column_type = "Json")]
    pub items: OrderItems,
    #[sea_orm(column_type = "Json")]
    pub shipping_address: AddressDetails,
    #[sea_orm(column_type = "Json", nullable)]
    pub billing_address: Option<AddressDetails>,

    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    /// Order id issued by the gateway for online payments
    pub gateway_order_id: Option<String>,
    /// Gateway payment id once the payment is captured
    pub transaction_id: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,

    pub currency: String,
    pub subtotal: Decimal,
    pub discount_amount: Decimal,
    pub shipping_cost: Decimal,
    pub gift_wrap_cost: Decimal,
    pub tax_amount: Decimal,
    pub total: Decimal,
    pub promo_code: Option<String>,

    pub gift_wrap: bool,
    pub gift_message: Option<String>,
    pub gstin: Option<String>,
    pub gst_business_name: Option<String>,

    pub status: OrderStatus,
    pub tracking_number: Option<String>,
    pub notes: Option<String>,
    #[sea_orm(column_type = "Json")]
    pub timeline: Timeline,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    /// Amount in the currency's minor unit (paise) as the gateway expects.
    pub fn amount_minor_units(&self) -> i64 {
        crate::services::pricing::minor_units(self.total)
    }

    pub fn is_paid_online(&self) -> bool {
        self.payment_method == PaymentMethod::Razorpay && self.payment_status == PaymentStatus::Completed
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id"
    )]
    User,
    #[sea_orm(has_many = "super::return_request::Entity")]
    ReturnRequest,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl Related<super::return_request::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ReturnRequest.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;
    use OrderStatus::*;

    #[test]
    fn only_pending_and_confirmed_are_cancellable() {
        for status in [Pending, Confirmed] {
            assert!(status.is_cancellable());
            assert!(status.can_transition_to(Cancelled));
        }
        for status in [Processing, Shipped, Delivered, Cancelled, Returned] {
            assert!(!status.is_cancellable(), "{status} should not be cancellable");
            assert!(!status.can_transition_to(Cancelled));
        }
    }

    #[test]
    fn forward_path_is_linear() {
        assert!(Pending.can_transition_to(Confirmed));
        assert!(Confirmed.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Shipped));
        assert!(Shipped.can_transition_to(Delivered));
        assert!(Delivered.can_transition_to(Returned));

        assert!(!Pending.can_transition_to(Shipped));
        assert!(!Delivered.can_transition_to(Pending));
        assert!(!Cancelled.can_transition_to(Confirmed));
        assert!(!Shipped.can_transition_to(Returned));
    }

    #[test]
    fn closed_orders() {
        assert!(Cancelled.is_closed());
        assert!(Returned.is_closed());
        for status in [Pending, Confirmed, Processing, Shipped, Delivered] {
            assert!(!status.is_closed(), "{status} should accept payment");
        }
    }

    #[test]
    fn status_strings_match_storage_values() {
        assert_eq!(Pending.to_string(), "pending");
        assert_eq!("shipped".parse::<OrderStatus>().unwrap(), Shipped);
    }
}
