//! Money arithmetic for the catalog and checkout.
//!
//! All amounts are `Decimal` and rounded half-up to two places, which is how
//! prices are displayed to customers and how totals are charged.

use rust_decimal::{prelude::ToPrimitive, Decimal, RoundingStrategy};
use serde::Serialize;
use utoipa::ToSchema;

use crate::config::CommerceConfig;

pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// `price × (100 − discount) / 100`. Discount is clamped into `0..=100`.
pub fn discounted_price(price: Decimal, discount: i32) -> Decimal {
    let discount = Decimal::from(discount.clamp(0, 100));
    round_money(price * (Decimal::ONE_HUNDRED - discount) / Decimal::ONE_HUNDRED)
}

/// Inputs that are known once the cart has been priced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TotalsInput {
    pub subtotal: Decimal,
    pub promo_discount: Decimal,
    pub gift_wrap: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct OrderTotals {
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub shipping: Decimal,
    pub gift_wrap_cost: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
}

/// Computes the charge for an order.
///
/// The gift wrap fee enters the taxable base but is not added to the total
/// on its own line, matching how the storefront has always charged it.
pub fn order_totals(input: TotalsInput, rates: &CommerceConfig) -> OrderTotals {
    let subtotal = round_money(input.subtotal.max(Decimal::ZERO));
    let discount = round_money(input.promo_discount.clamp(Decimal::ZERO, subtotal));
    let after_discount = subtotal - discount;

    let shipping = if subtotal.is_zero() || after_discount >= rates.free_shipping_threshold {
        Decimal::ZERO
    } else {
        round_money(rates.shipping_fee)
    };
    let gift_wrap_cost = if input.gift_wrap {
        round_money(rates.gift_wrap_fee)
    } else {
        Decimal::ZERO
    };

    let tax = round_money((after_discount + shipping + gift_wrap_cost) * rates.tax_rate);
    let total = after_discount + shipping + tax;

    OrderTotals {
        subtotal,
        discount,
        shipping,
        gift_wrap_cost,
        tax,
        total,
    }
}

/// Sum of `discounted unit price × quantity` over cart lines.
pub fn subtotal<I>(lines: I) -> Decimal
where
    I: IntoIterator<Item = (Decimal, i32)>,
{
    round_money(
        lines
            .into_iter()
            .map(|(unit, qty)| unit * Decimal::from(qty))
            .sum(),
    )
}

/// Amount in the currency's minor unit (paise), as the gateway expects.
pub fn minor_units(amount: Decimal) -> i64 {
    (round_money(amount) * Decimal::ONE_HUNDRED)
        .round()
        .to_i64()
        .unwrap_or(0)
}

/// Share of an order's charged total that corresponds to `lines_value` of its
/// subtotal: discount, shipping and tax are apportioned pro rata.
pub fn refund_share(order_subtotal: Decimal, order_total: Decimal, lines_value: Decimal) -> Decimal {
    if order_subtotal.is_zero() {
        return Decimal::ZERO;
    }
    let share = round_money(order_total * lines_value / order_subtotal);
    share.min(order_total)
}
