use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use super::catalog::CatalogService;
use super::clean_optional;
use super::orders::is_unique_violation;
use crate::auth::password::{check_strength, hash_password, verify_password};
use crate::auth::{AuthService, AuthUser, TokenResponse};
use crate::entities::product;
use crate::entities::user::{self, Address, AddressBook, AddressDetails, UserRole};
use crate::entities::UuidList;
use crate::errors::ServiceError;

/// Public view of an account; never carries the password hash.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct UserProfile {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub mobile: Option<String>,
    pub role: UserRole,
    pub addresses: Vec<Address>,
    pub wishlist: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl From<user::Model> for UserProfile {
    fn from(model: user::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            email: model.email,
            mobile: model.mobile,
            role: model.role,
            addresses: model.addresses.0,
            wishlist: model.wishlist.0,
            created_at: model.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AuthSession {
    #[serde(flatten)]
    pub token: TokenResponse,
    pub user: UserProfile,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct RegisterInput {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 7, max = 20))]
    pub mobile: Option<String>,
    #[validate(length(max = 128))]
    pub password: String,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct LoginInput {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1, max = 128))]
    pub password: String,
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateProfileInput {
    #[validate(length(min = 1, max = 100))]
    pub name: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(min = 7, max = 20))]
    pub mobile: Option<String>,
    /// Required when `new_password` is set
    pub current_password: Option<String>,
    #[validate(length(max = 128))]
    pub new_password: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct AddressInput {
    #[validate(length(max = 50))]
    pub label: Option<String>,
    #[serde(flatten)]
    #[validate]
    pub details: AddressDetails,
    #[serde(default)]
    pub is_default: bool,
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub struct UserService {
    db: Arc<DatabaseConnection>,
    auth: Arc<AuthService>,
    catalog: Arc<CatalogService>,
}

impl UserService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        auth: Arc<AuthService>,
        catalog: Arc<CatalogService>,
    ) -> Self {
        Self { db, auth, catalog }
    }

    async fn find_user(&self, id: Uuid) -> Result<user::Model, ServiceError> {
        user::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("User", id))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<user::Model>, ServiceError> {
        Ok(user::Entity::find()
            .filter(user::Column::Email.eq(normalize_email(email)))
            .one(&*self.db)
            .await?)
    }

    async fn ensure_unique_contact(
        &self,
        email: Option<&str>,
        mobile: Option<&str>,
        except: Option<Uuid>,
    ) -> Result<(), ServiceError> {
        if let Some(email) = email {
            if let Some(existing) = self.find_by_email(email).await? {
                if Some(existing.id) != except {
                    return Err(ServiceError::Conflict("Email is already registered".into()));
                }
            }
        }
        if let Some(mobile) = mobile {
            let existing = user::Entity::find()
                .filter(user::Column::Mobile.eq(mobile))
                .one(&*self.db)
                .await?;
            if existing.is_some_and(|u| Some(u.id) != except) {
                return Err(ServiceError::Conflict(
                    "Mobile number is already registered".into(),
                ));
            }
        }
        Ok(())
    }

    fn session(&self, user: user::Model) -> Result<AuthSession, ServiceError> {
        let token = self.auth.issue_token(&user)?;
        Ok(AuthSession {
            token,
            user: user.into(),
        })
    }

    #[instrument(skip(self, input), fields(email = %input.email))]
    pub async fn register(&self, input: RegisterInput) -> Result<AuthSession, ServiceError> {
        input.validate()?;
        check_strength(&input.password)?;

        let email = normalize_email(&input.email);
        let mobile = clean_optional(input.mobile);
        self.ensure_unique_contact(Some(&email), mobile.as_deref(), None)
            .await?;

        let now = Utc::now();
        let created = user::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(input.name.trim().to_string()),
            email: Set(email),
            mobile: Set(mobile),
            password_hash: Set(hash_password(&input.password)?),
            role: Set(UserRole::Customer),
            addresses: Set(AddressBook::default()),
            wishlist: Set(UuidList::default()),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await
        .map_err(|err| {
            if is_unique_violation(&err) {
                ServiceError::Conflict("Email is already registered".into())
            } else {
                err.into()
            }
        })?;

        info!(user_id = %created.id, "user registered");
        metrics::counter!("stonecraft_users.registered", 1);
        self.session(created)
    }

    #[instrument(skip(self, input), fields(email = %input.email))]
    pub async fn login(&self, input: LoginInput) -> Result<AuthSession, ServiceError> {
        input.validate()?;
        let invalid = || ServiceError::Unauthorized("Invalid email or password".into());

        let Some(user) = self.find_by_email(&input.email).await? else {
            return Err(invalid());
        };
        if !verify_password(&input.password, &user.password_hash)? {
            warn!(user_id = %user.id, "failed login attempt");
            return Err(invalid());
        }
        self.session(user)
    }

    pub async fn get_profile(&self, caller: &AuthUser) -> Result<UserProfile, ServiceError> {
        Ok(self.find_user(caller.user_id).await?.into())
    }

    #[instrument(skip(self, input), fields(user_id = %caller.user_id))]
    pub async fn update_profile(
        &self,
        caller: &AuthUser,
        input: UpdateProfileInput,
    ) -> Result<UserProfile, ServiceError> {
        input.validate()?;
        let user = self.find_user(caller.user_id).await?;

        let email = input.email.as_deref().map(normalize_email);
        let mobile = clean_optional(input.mobile);
        self.ensure_unique_contact(email.as_deref(), mobile.as_deref(), Some(user.id))
            .await?;

        let password_hash = match input.new_password {
            Some(new_password) => {
                let current = input.current_password.ok_or_else(|| {
                    ServiceError::ValidationError(
                        "Current password is required to set a new one".into(),
                    )
                })?;
                if !verify_password(&current, &user.password_hash)? {
                    return Err(ServiceError::Unauthorized(
                        "Current password is incorrect".into(),
                    ));
                }
                check_strength(&new_password)?;
                Some(hash_password(&new_password)?)
            }
            None => None,
        };

        let mut active: user::ActiveModel = user.into();
        if let Some(name) = clean_optional(input.name) {
            active.name = Set(name);
        }
        if let Some(email) = email {
            active.email = Set(email);
        }
        if mobile.is_some() {
            active.mobile = Set(mobile);
        }
        if let Some(hash) = password_hash {
            active.password_hash = Set(hash);
        }
        active.updated_at = Set(Utc::now());
        let updated = active.update(&*self.db).await?;
        Ok(updated.into())
    }

    async fn save_addresses(
        &self,
        user: user::Model,
        addresses: AddressBook,
    ) -> Result<Vec<Address>, ServiceError> {
        let mut active: user::ActiveModel = user.into();
        active.addresses = Set(addresses);
        active.updated_at = Set(Utc::now());
        let updated = active.update(&*self.db).await?;
        Ok(updated.addresses.0)
    }

    pub async fn list_addresses(&self, caller: &AuthUser) -> Result<Vec<Address>, ServiceError> {
        Ok(self.find_user(caller.user_id).await?.addresses.0)
    }

    #[instrument(skip(self, input), fields(user_id = %caller.user_id))]
    pub async fn add_address(
        &self,
        caller: &AuthUser,
        input: AddressInput,
    ) -> Result<Vec<Address>, ServiceError> {
        input.validate()?;
        let user = self.find_user(caller.user_id).await?;
        let mut book = user.addresses.clone();
        book.add(clean_optional(input.label), input.details, input.is_default);
        self.save_addresses(user, book).await
    }

    #[instrument(skip(self, input), fields(user_id = %caller.user_id))]
    pub async fn update_address(
        &self,
        caller: &AuthUser,
        address_id: Uuid,
        input: AddressInput,
    ) -> Result<Vec<Address>, ServiceError> {
        input.validate()?;
        let user = self.find_user(caller.user_id).await?;
        let mut book = user.addresses.clone();
        let entry = book
            .0
            .iter_mut()
            .find(|a| a.id == address_id)
            .ok_or_else(|| ServiceError::not_found("Address", address_id))?;
        entry.label = clean_optional(input.label);
        entry.details = input.details;
        if input.is_default {
            book.set_default(address_id);
        }
        self.save_addresses(user, book).await
    }

    #[instrument(skip(self), fields(user_id = %caller.user_id))]
    pub async fn delete_address(
        &self,
        caller: &AuthUser,
        address_id: Uuid,
    ) -> Result<Vec<Address>, ServiceError> {
        let user = self.find_user(caller.user_id).await?;
        let mut book = user.addresses.clone();
        book.remove(address_id)
            .ok_or_else(|| ServiceError::not_found("Address", address_id))?;
        self.save_addresses(user, book).await
    }

    /// Wishlisted products that still exist, in the order they were added.
    pub async fn wishlist(&self, caller: &AuthUser) -> Result<Vec<product::Model>, ServiceError> {
        let user = self.find_user(caller.user_id).await?;
        let mut products = self.catalog.find_many(&user.wishlist.0).await?;
        Ok(user
            .wishlist
            .0
            .iter()
            .filter_map(|id| products.remove(id))
            .collect())
    }

    pub async fn add_to_wishlist(
        &self,
        caller: &AuthUser,
        product_id: Uuid,
    ) -> Result<Vec<product::Model>, ServiceError> {
        self.catalog.get_by_id(product_id).await?;
        let user = self.find_user(caller.user_id).await?;
        if !user.wishlist.contains(&product_id) {
            let mut wishlist = user.wishlist.clone();
            wishlist.0.push(product_id);
            let mut active: user::ActiveModel = user.into();
            active.wishlist = Set(wishlist);
            active.updated_at = Set(Utc::now());
            active.update(&*self.db).await?;
        }
        self.wishlist(caller).await
    }

    pub async fn remove_from_wishlist(
        &self,
        caller: &AuthUser,
        product_id: Uuid,
    ) -> Result<Vec<product::Model>, ServiceError> {
        let user = self.find_user(caller.user_id).await?;
        if user.wishlist.contains(&product_id) {
            let wishlist = UuidList(
                user.wishlist
                    .0
                    .iter()
                    .copied()
                    .filter(|id| *id != product_id)
                    .collect(),
            );
            let mut active: user::ActiveModel = user.into();
            active.wishlist = Set(wishlist);
            active.updated_at = Set(Utc::now());
            active.update(&*self.db).await?;
        }
        self.wishlist(caller).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emails_are_case_insensitive() {
        assert_eq!(normalize_email("  Asha@Example.COM "), "asha@example.com");
    }

    #[test]
    fn profile_hides_password_hash() {
        let now = Utc::now();
        let model = user::Model {
            id: Uuid::new_v4(),
            name: "Asha".into(),
            email: "asha@example.com".into(),
            mobile: None,
            password_hash: "secret-hash".into(),
            role: UserRole::Customer,
            addresses: AddressBook::default(),
            wishlist: UuidList::default(),
            created_at: now,
            updated_at: now,
        };
        let json = serde_json::to_string(&UserProfile::from(model)).unwrap();
        assert!(!json.contains("secret-hash"));
        assert!(json.contains("asha@example.com"));
    }
}
