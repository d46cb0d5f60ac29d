//! Editorial content: portfolio projects, testimonials and home page blocks.
//!
//! Public readers only ever see published or active rows; admins see all.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use super::{clean_optional, slugify, Page, PageRequest};
use crate::entities::{homepage_section, project, testimonial, StringList};
use crate::errors::ServiceError;

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
pub struct ProjectQuery {
    pub category: Option<String>,
    pub featured: Option<bool>,
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateProjectInput {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    /// Derived from the title when omitted
    pub slug: Option<String>,
    #[validate(length(min = 1))]
    pub description: String,
    pub location: Option<String>,
    pub category: Option<String>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub featured: bool,
    #[serde(default = "published_by_default")]
    pub is_published: bool,
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateProjectInput {
    #[validate(length(min = 1, max = 200))]
    pub title: Option<String>,
    pub slug: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub category: Option<String>,
    pub images: Option<Vec<String>>,
    pub featured: Option<bool>,
    pub is_published: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct TestimonialInput {
    #[validate(length(min = 1, max = 100))]
    pub author_name: String,
    pub author_title: Option<String>,
    #[validate(length(min = 1, max = 2000))]
    pub quote: String,
    #[validate(range(min = 1, max = 5))]
    pub rating: Option<i32>,
    pub avatar_url: Option<String>,
    #[serde(default = "published_by_default")]
    pub is_published: bool,
    #[serde(default)]
    pub display_order: i32,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct HomepageSectionInput {
    pub title: Option<String>,
    pub subtitle: Option<String>,
    #[schema(value_type = Object)]
    pub content: JsonValue,
    #[serde(default)]
    pub display_order: i32,
    #[serde(default = "published_by_default")]
    pub is_active: bool,
}

fn published_by_default() -> bool {
    true
}

fn project_slug(explicit: Option<&str>, title: &str) -> Result<String, ServiceError> {
    let slug = slugify(explicit.unwrap_or(title));
    if slug.is_empty() {
        return Err(ServiceError::ValidationError(
            "Project slug must contain letters or digits".into(),
        ));
    }
    Ok(slug)
}

fn section_key(key: &str) -> Result<String, ServiceError> {
    let key = key.trim().to_lowercase();
    let valid = !key.is_empty()
        && key.len() <= 64
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !valid {
        return Err(ServiceError::ValidationError(
            "Section key may contain only letters, digits, '-' and '_'".into(),
        ));
    }
    Ok(key)
}

#[derive(Clone)]
pub struct CmsService {
    db: Arc<DatabaseConnection>,
}

impl CmsService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    // Projects

    pub async fn list_projects(
        &self,
        include_unpublished: bool,
        query: ProjectQuery,
    ) -> Result<Page<project::Model>, ServiceError> {
        let page = PageRequest::from_parts(query.page, query.limit);
        let mut select = project::Entity::find()
            .order_by_desc(project::Column::Featured)
            .order_by_desc(project::Column::CreatedAt);
        if !include_unpublished {
            select = select.filter(project::Column::IsPublished.eq(true));
        }
        if let Some(category) = query.category {
            select = select.filter(project::Column::Category.eq(category));
        }
        if let Some(featured) = query.featured {
            select = select.filter(project::Column::Featured.eq(featured));
        }
        let paginator = select.paginate(&*self.db, page.limit());
        let total = paginator.num_items().await?;
        let items = paginator.fetch_page(page.index()).await?;
        Ok(Page::new(items, total, page))
    }

    /// Looks a project up by id or slug.
    pub async fn get_project(
        &self,
        id_or_slug: &str,
        include_unpublished: bool,
    ) -> Result<project::Model, ServiceError> {
        let found = match Uuid::parse_str(id_or_slug) {
            Ok(id) => project::Entity::find_by_id(id).one(&*self.db).await?,
            Err(_) => {
                project::Entity::find()
                    .filter(project::Column::Slug.eq(id_or_slug))
                    .one(&*self.db)
                    .await?
            }
        };
        found
            .filter(|p| include_unpublished || p.is_published)
            .ok_or_else(|| ServiceError::not_found("Project", id_or_slug))
    }

    async fn ensure_slug_free(&self, slug: &str, except: Option<Uuid>) -> Result<(), ServiceError> {
        let taken = project::Entity::find()
            .filter(project::Column::Slug.eq(slug))
            .one(&*self.db)
            .await?;
        if taken.is_some_and(|p| Some(p.id) != except) {
            return Err(ServiceError::Conflict(format!(
                "Project slug {} is already in use",
                slug
            )));
        }
        Ok(())
    }

    #[instrument(skip(self, input), fields(title = %input.title))]
    pub async fn create_project(&self, input: CreateProjectInput) -> Result<project::Model, ServiceError> {
        input.validate()?;
        let slug = project_slug(input.slug.as_deref(), &input.title)?;
        self.ensure_slug_free(&slug, None).await?;

        let now = Utc::now();
        let created = project::ActiveModel {
            id: Set(Uuid::new_v4()),
            title: Set(input.title.trim().to_string()),
            slug: Set(slug),
            description: Set(input.description),
            location: Set(clean_optional(input.location)),
            category: Set(clean_optional(input.category)),
            images: Set(StringList(input.images)),
            featured: Set(input.featured),
            is_published: Set(input.is_published),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await?;
        info!(project_id = %created.id, slug = %created.slug, "project created");
        Ok(created)
    }

    #[instrument(skip(self, input))]
    pub async fn update_project(
        &self,
        id: Uuid,
        input: UpdateProjectInput,
    ) -> Result<project::Model, ServiceError> {
        input.validate()?;
        let existing = project::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Project", id))?;

        let slug = match input.slug.as_deref() {
            Some(slug) => {
                let slug = project_slug(Some(slug), &existing.title)?;
                self.ensure_slug_free(&slug, Some(id)).await?;
                Some(slug)
            }
            None => None,
        };

        let mut active: project::ActiveModel = existing.into();
        if let Some(title) = input.title {
            active.title = Set(title.trim().to_string());
        }
        if let Some(slug) = slug {
            active.slug = Set(slug);
        }
        if let Some(description) = input.description {
            active.description = Set(description);
        }
        if input.location.is_some() {
            active.location = Set(clean_optional(input.location));
        }
        if input.category.is_some() {
            active.category = Set(clean_optional(input.category));
        }
        if let Some(images) = input.images {
            active.images = Set(StringList(images));
        }
        if let Some(featured) = input.featured {
            active.featured = Set(featured);
        }
        if let Some(is_published) = input.is_published {
            active.is_published = Set(is_published);
        }
        active.updated_at = Set(Utc::now());
        Ok(active.update(&*self.db).await?)
    }

    pub async fn delete_project(&self, id: Uuid) -> Result<(), ServiceError> {
        let result = project::Entity::delete_by_id(id).exec(&*self.db).await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::not_found("Project", id));
        }
        info!(project_id = %id, "project deleted");
        Ok(())
    }

    // Testimonials

    pub async fn list_testimonials(
        &self,
        include_unpublished: bool,
    ) -> Result<Vec<testimonial::Model>, ServiceError> {
        let mut select = testimonial::Entity::find()
            .order_by_asc(testimonial::Column::DisplayOrder)
            .order_by_desc(testimonial::Column::CreatedAt);
        if !include_unpublished {
            select = select.filter(testimonial::Column::IsPublished.eq(true));
        }
        Ok(select.all(&*self.db).await?)
    }

    pub async fn create_testimonial(
        &self,
        input: TestimonialInput,
    ) -> Result<testimonial::Model, ServiceError> {
        input.validate()?;
        let now = Utc::now();
        let created = testimonial::ActiveModel {
            id: Set(Uuid::new_v4()),
            author_name: Set(input.author_name.trim().to_string()),
            author_title: Set(clean_optional(input.author_title)),
            quote: Set(input.quote.trim().to_string()),
            rating: Set(input.rating),
            avatar_url: Set(clean_optional(input.avatar_url)),
            is_published: Set(input.is_published),
            display_order: Set(input.display_order),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await?;
        Ok(created)
    }

    /// Replaces every editable field of a testimonial.
    pub async fn update_testimonial(
        &self,
        id: Uuid,
        input: TestimonialInput,
    ) -> Result<testimonial::Model, ServiceError> {
        input.validate()?;
        let existing = testimonial::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Testimonial", id))?;

        let mut active: testimonial::ActiveModel = existing.into();
        active.author_name = Set(input.author_name.trim().to_string());
        active.author_title = Set(clean_optional(input.author_title));
        active.quote = Set(input.quote.trim().to_string());
        active.rating = Set(input.rating);
        active.avatar_url = Set(clean_optional(input.avatar_url));
        active.is_published = Set(input.is_published);
        active.display_order = Set(input.display_order);
        active.updated_at = Set(Utc::now());
        Ok(active.update(&*self.db).await?)
    }

    pub async fn delete_testimonial(&self, id: Uuid) -> Result<(), ServiceError> {
        let result = testimonial::Entity::delete_by_id(id).exec(&*self.db).await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::not_found("Testimonial", id));
        }
        Ok(())
    }

    // Home page

    pub async fn homepage(
        &self,
        include_inactive: bool,
    ) -> Result<Vec<homepage_section::Model>, ServiceError> {
        let mut select =
            homepage_section::Entity::find().order_by_asc(homepage_section::Column::DisplayOrder);
        if !include_inactive {
            select = select.filter(homepage_section::Column::IsActive.eq(true));
        }
        Ok(select.all(&*self.db).await?)
    }

    /// Creates or replaces the section stored under `key`.
    #[instrument(skip(self, input))]
    pub async fn upsert_section(
        &self,
        key: &str,
        input: HomepageSectionInput,
    ) -> Result<homepage_section::Model, ServiceError> {
        input.validate()?;
        let key = section_key(key)?;
        let now = Utc::now();

        let existing = homepage_section::Entity::find()
            .filter(homepage_section::Column::Key.eq(key.as_str()))
            .one(&*self.db)
            .await?;

        let saved = match existing {
            Some(section) => {
                let mut active: homepage_section::ActiveModel = section.into();
                active.title = Set(clean_optional(input.title));
                active.subtitle = Set(clean_optional(input.subtitle));
                active.content = Set(input.content);
                active.display_order = Set(input.display_order);
                active.is_active = Set(input.is_active);
                active.updated_at = Set(now);
                active.update(&*self.db).await?
            }
            None => {
                homepage_section::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    key: Set(key),
                    title: Set(clean_optional(input.title)),
                    subtitle: Set(clean_optional(input.subtitle)),
                    content: Set(input.content),
                    display_order: Set(input.display_order),
                    is_active: Set(input.is_active),
                    created_at: Set(now),
                    updated_at: Set(now),
                }
                .insert(&*self.db)
                .await?
            }
        };
        info!(key = %saved.key, "homepage section saved");
        Ok(saved)
    }

    pub async fn delete_section(&self, key: &str) -> Result<(), ServiceError> {
        let key = section_key(key)?;
        let result = homepage_section::Entity::delete_many()
            .filter(homepage_section::Column::Key.eq(key.as_str()))
            .exec(&*self.db)
            .await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::not_found("Homepage section", key));
        }
        Ok(())
    }
}
