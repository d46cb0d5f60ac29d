use chrono::{DateTime, Utc};
use sea_orm::{entity::prelude::*, FromJsonQueryResult};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use super::UuidList;

#[derive(
    Clone,
    Copy,
    Debug,
    Default,
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
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum UserRole {
    #[default]
    #[sea_orm(string_value = "customer")]
    Customer,
    #[sea_orm(string_value = "admin")]
    Admin,
}

/// Postal address as captured at checkout or stored in the address book.
#[derive(
    Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Validate, FromJsonQueryResult, ToSchema,
)]
pub struct AddressDetails {
    #[validate(length(min = 1, max = 100))]
    pub full_name: String,
    #[validate(length(min = 7, max = 20))]
    pub phone: String,
    #[validate(length(min = 1, max = 200))]
    pub line1: String,
    #[serde(default)]
    pub line2: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub city: String,
    #[validate(length(min = 1, max = 100))]
    pub state: String,
    #[validate(length(min = 4, max = 12))]
    pub postal_code: String,
    #[serde(default = "default_country")]
    pub country: String,
}

fn default_country() -> String {
    "India".to_string()
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Address {
    pub id: Uuid,
    pub label: Option<String>,
    #[serde(flatten)]
    pub details: AddressDetails,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
}

/// Embedded address list. Writers go through [`AddressBook::set_default`] and
/// [`AddressBook::remove`] so that at most one entry is flagged default.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult, ToSchema)]
pub struct AddressBook(pub Vec<Address>);

impl AddressBook {
    pub fn get(&self, id: Uuid) -> Option<&Address> {
        self.0.iter().find(|a| a.id == id)
    }

    pub fn default_address(&self) -> Option<&Address> {
        self.0.iter().find(|a| a.is_default)
    }

    /// Adds an address. The first address, or one explicitly marked default,
    /// becomes the sole default.
    pub fn add(&mut self, label: Option<String>, details: AddressDetails, make_default: bool) -> Uuid {
        let id = Uuid::new_v4();
        let is_first = self.0.is_empty();
        self.0.push(Address {
            id,
            label,
            details,
            is_default: false,
            created_at: Utc::now(),
        });
        if is_first || make_default {
            self.set_default(id);
        }
        id
    }

    /// Marks `id` as the only default. Returns false if the id is unknown.
    pub fn set_default(&mut self, id: Uuid) -> bool {
        if self.get(id).is_none() {
            return false;
        }
        for address in &mut self.0 {
            address.is_default = address.id == id;
        }
        true
    }

    /// Removes an address. When the default is removed the oldest remaining
    /// address is promoted.
    pub fn remove(&mut self, id: Uuid) -> Option<Address> {
        let index = self.0.iter().position(|a| a.id == id)?;
        let removed = self.0.remove(index);
        if removed.is_default {
            if let Some(oldest) = self.0.iter_mut().min_by_key(|a| a.created_at) {
                oldest.is_default = true;
            }
        }
        Some(removed)
    }

    pub fn default_count(&self) -> usize {
        self.0.iter().filter(|a| a.is_default).count()
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub name: String,
    #[sea_orm(unique)]
    pub email: String,
    #[sea_orm(unique)]
    pub mobile: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: UserRole,
    #[sea_orm(column_type = "Json")]
    pub addresses: AddressBook,
    #[sea_orm(column_type = "Json")]
    pub wishlist: UuidList,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::order::Entity")]
    Order,
}

impl Related<super::order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Order.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;

    fn details(city: &str) -> AddressDetails {
        AddressDetails {
            full_name: "Asha Rao".into(),
            phone: "9876543210".into(),
            line1: "12 Marble Lane".into(),
            line2: None,
            city: city.into(),
            state: "Rajasthan".into(),
            postal_code: "313001".into(),
            country: "India".into(),
        }
    }

    #[test]
    fn first_address_becomes_default() {
        let mut book = AddressBook::default();
        let first = book.add(None, details("Udaipur"), false);
        let second = book.add(Some("Office".into()), details("Jaipur"), false);
        assert_eq!(book.default_address().map(|a| a.id), Some(first));
        assert!(!book.get(second).unwrap().is_default);
        assert_eq!(book.default_count(), 1);
    }

    #[test]
    fn new_default_clears_siblings() {
        let mut book = AddressBook::default();
        book.add(None, details("Udaipur"), false);
        let second = book.add(None, details("Jaipur"), true);
        assert_eq!(book.default_count(), 1);
        assert_eq!(book.default_address().map(|a| a.id), Some(second));
    }

    #[test]
    fn removing_default_promotes_oldest() {
        let mut book = AddressBook::default();
        let first = book.add(None, details("Udaipur"), false);
        let second = book.add(None, details("Jaipur"), false);
        let third = book.add(None, details("Makrana"), true);
        book.remove(third);
        assert_eq!(book.default_address().map(|a| a.id), Some(first));
        book.remove(first);
        assert_eq!(book.default_address().map(|a| a.id), Some(second));
        assert_eq!(book.default_count(), 1);
    }

    #[test]
    fn set_default_rejects_unknown_id() {
        let mut book = AddressBook::default();
        book.add(None, details("Udaipur"), false);
        assert!(!book.set_default(Uuid::new_v4()));
        assert_eq!(book.default_count(), 1);
    }
}
