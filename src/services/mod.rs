// Pure money arithmetic
pub mod pricing;

// Storefront
pub mod catalog;
pub mod cms;
pub mod reviews;

// Checkout and after-sales
pub mod orders;
pub mod payments;
pub mod promotions;
pub mod returns;
pub mod tickets;

// Accounts
pub mod users;

use chrono::Utc;
use rand::Rng;
use sea_orm::{
    ActiveModelBehavior, ActiveModelTrait, DatabaseTransaction, DbErr, EntityTrait,
    IntoActiveModel, TransactionTrait,
};
use tracing::warn;

use orders::is_unique_violation;

pub const DEFAULT_PAGE_SIZE: u64 = 20;
pub const MAX_PAGE_SIZE: u64 = 100;

const REFERENCE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const REFERENCE_SUFFIX_LEN: usize = 6;

/// Page selection shared by list endpoints. Out of range values are clamped.
#[derive(Debug, Clone, Copy)]
pub struct PageRequest {
    pub page: u64,
    pub limit: u64,
}

fn default_page() -> u64 {
    1
}

fn default_limit() -> u64 {
    DEFAULT_PAGE_SIZE
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: default_page(),
            limit: default_limit(),
        }
    }
}

impl PageRequest {
    pub fn new(page: u64, limit: u64) -> Self {
        Self { page, limit }
    }

    pub fn from_parts(page: Option<u64>, limit: Option<u64>) -> Self {
        Self {
            page: page.unwrap_or_else(default_page),
            limit: limit.unwrap_or_else(default_limit),
        }
    }

    pub fn page(&self) -> u64 {
        self.page.max(1)
    }

    pub fn limit(&self) -> u64 {
        self.limit.clamp(1, MAX_PAGE_SIZE)
    }

    /// Zero-based index of the page for `Paginator::fetch_page`.
    pub fn index(&self) -> u64 {
        self.page() - 1
    }
}

/// One page of results plus the unpaged total.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: u64, request: PageRequest) -> Self {
        Self {
            items,
            total,
            page: request.page(),
            limit: request.limit(),
        }
    }

    pub fn total_pages(&self) -> u64 {
        if self.total == 0 {
            0
        } else {
            self.total.div_ceil(self.limit.max(1))
        }
    }
}

/// Human-facing reference such as `ORD-260314-K7Q2ZP`.
///
/// The random suffix avoids ambiguous glyphs; uniqueness is enforced by the
/// table's unique index and callers retry on collision.
pub fn reference_number(prefix: &str) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..REFERENCE_SUFFIX_LEN)
        .map(|_| REFERENCE_ALPHABET[rng.gen_range(0..REFERENCE_ALPHABET.len())] as char)
        .collect();
    format!("{}-{}-{}", prefix, Utc::now().format("%y%m%d"), suffix)
}

/// Inserts the row produced by `build`, calling it again whenever the insert
/// hits a unique index. Every attempt runs in its own savepoint, so a
/// collision leaves `txn` usable on Postgres. `Ok(None)` means all attempts
/// collided.
pub(crate) async fn insert_with_retry<A, F>(
    txn: &DatabaseTransaction,
    attempts: usize,
    mut build: F,
) -> Result<Option<<A::Entity as EntityTrait>::Model>, DbErr>
where
    A: ActiveModelTrait + ActiveModelBehavior + Send + 'static,
    <A::Entity as EntityTrait>::Model: IntoActiveModel<A>,
    F: FnMut() -> A,
{
    for attempt in 1..=attempts {
        let candidate = build();
        let savepoint = txn.begin().await?;
        match candidate.insert(&savepoint).await {
            Ok(model) => {
                savepoint.commit().await?;
                return Ok(Some(model));
            }
            Err(err) if is_unique_violation(&err) => {
                savepoint.rollback().await?;
                warn!(attempt, "unique key collision, retrying");
                metrics::counter!("stonecraft_db.unique_collisions", 1);
            }
            Err(err) => return Err(err),
        }
    }
    Ok(None)
}

/// Trims and drops empty optional text.
pub(crate) fn clean_optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// URL slug from free text: lowercase ASCII words joined by dashes.
pub(crate) fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_dash = false;
    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    slug
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{project, StringList};
    use crate::migrator::Migrator;
    use regex::Regex;
    use sea_orm::{ConnectOptions, Database, DatabaseConnection, PaginatorTrait, Set};
    use sea_orm_migration::MigratorTrait;
    use uuid::Uuid;

    async fn memory_db() -> DatabaseConnection {
        let mut options = ConnectOptions::new("sqlite::memory:");
        options.max_connections(1).min_connections(1);
        let db = Database::connect(options).await.unwrap();
        Migrator::up(&db, None).await.unwrap();
        db
    }

    fn project_with_slug(slug: &str) -> project::ActiveModel {
        let now = Utc::now();
        project::ActiveModel {
            id: Set(Uuid::new_v4()),
            title: Set("Temple Facade".into()),
            slug: Set(slug.to_string()),
            description: Set("Carved sandstone".into()),
            location: Set(None),
            category: Set(None),
            images: Set(StringList::default()),
            featured: Set(false),
            is_published: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        }
    }

    #[tokio::test]
    async fn insert_retries_after_unique_collision() {
        let db = memory_db().await;
        project_with_slug("temple-facade").insert(&db).await.unwrap();

        let mut slugs = ["temple-facade", "temple-facade-2"].into_iter();
        let txn = db.begin().await.unwrap();
        let inserted = insert_with_retry(&txn, 3, || {
            project_with_slug(slugs.next().unwrap_or("temple-facade-3"))
        })
        .await
        .unwrap()
        .unwrap();
        txn.commit().await.unwrap();

        assert_eq!(inserted.slug, "temple-facade-2");
        assert_eq!(project::Entity::find().count(&db).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn exhausted_retries_leave_transaction_usable() {
        let db = memory_db().await;
        project_with_slug("jali-screen").insert(&db).await.unwrap();

        let txn = db.begin().await.unwrap();
        let inserted = insert_with_retry(&txn, 3, || project_with_slug("jali-screen"))
            .await
            .unwrap();
        assert!(inserted.is_none());

        project_with_slug("jali-screen-2").insert(&txn).await.unwrap();
        txn.commit().await.unwrap();
        assert_eq!(project::Entity::find().count(&db).await.unwrap(), 2);
    }

    #[test]
    fn reference_numbers_have_expected_shape() {
        let re = Regex::new(r"^ORD-\d{6}-[A-HJ-NP-Z2-9]{6}$").unwrap();
        for _ in 0..50 {
            let number = reference_number("ORD");
            assert!(re.is_match(&number), "{number}");
        }
    }

    #[test]
    fn page_request_is_clamped() {
        let req = PageRequest::new(0, 10_000);
        assert_eq!(req.page(), 1);
        assert_eq!(req.limit(), MAX_PAGE_SIZE);
        assert_eq!(req.index(), 0);
        assert_eq!(PageRequest::new(3, 0).limit(), 1);
    }

    #[test]
    fn total_pages_rounds_up() {
        let page = Page::new(Vec::<()>::new(), 41, PageRequest::new(1, 20));
        assert_eq!(page.total_pages(), 3);
        let empty = Page::new(Vec::<()>::new(), 0, PageRequest::default());
        assert_eq!(empty.total_pages(), 0);
    }

    #[test]
    fn slugify_collapses_separators() {
        assert_eq!(slugify("  Carved Marble  Elephant!"), "carved-marble-elephant");
        assert_eq!(slugify("Onyx & Jade -- Bowl"), "onyx-jade-bowl");
        assert_eq!(slugify("!!!"), "");
    }
}
