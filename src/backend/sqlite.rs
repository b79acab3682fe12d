use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::str::FromStr;
use tokio::sync::broadcast;
use tracing::{info, instrument};
use uuid::Uuid;

use super::{Backend, AUTH_EVENT_CAPACITY};
use crate::model::{
    NewReview, PageQuery, Profile, RestaurantDetail, RestaurantListing, RestaurantPin,
    RestaurantSummary, Review, Role, Session,
};

pub type Pool = SqlitePool;

type ProfileRow = (Uuid, Option<String>, Option<String>, String, Option<String>);
type SummaryRow = (Uuid, String, Option<String>, Option<String>);
type DetailRow = (
    Uuid,
    Option<Uuid>,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<f64>,
    Option<f64>,
);
type ReviewRow = (
    Uuid,
    Uuid,
    i64,
    Option<String>,
    i64,
    Option<String>,
    Option<String>,
);

const REVIEW_SELECT: &str = "SELECT r.id, r.restaurant_id, r.rating, r.comment, r.created_at,
        p.first_name, p.last_name
     FROM reviews r LEFT JOIN profiles p ON p.id = r.user_id";

/// Restaurant to insert into the local database.
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct NewRestaurant {
    #[serde(default)]
    pub id: Option<Uuid>,
    pub owner_id: Option<Uuid>,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub cuisine: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Local backend over SQLite. Sign-in is local: `sign_in` mints an opaque
/// token for an existing profile.
#[derive(Clone)]
pub struct SqliteBackend {
    pool: Pool,
    events: broadcast::Sender<Option<Session>>,
}

impl std::fmt::Debug for SqliteBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteBackend").finish_non_exhaustive()
    }
}

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let normalized = prepare_sqlite_url(database_url);
    let mut options = SqliteConnectOptions::from_str(&normalized)
        .with_context(|| format!("invalid sqlite url {normalized}"))?
        .create_if_missing(true)
        .foreign_keys(true);
    let mut pool_options = SqlitePoolOptions::new();
    if normalized.starts_with("sqlite::memory") {
        // Every connection to `:memory:` opens a separate database.
        pool_options = pool_options
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None);
    } else {
        options = options
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Full);
    }
    let pool = pool_options.connect_with(options).await?;
    Ok(pool)
}

/// Expand a leading `~/` in file-backed SQLite URLs and make sure the parent
/// directory exists. In-memory URLs pass through untouched.
fn prepare_sqlite_url(url: &str) -> String {
    if !url.starts_with("sqlite:") || url.starts_with("sqlite::memory") {
        return url.to_string();
    }

    let rest = &url["sqlite:".len()..];
    let rest = rest.strip_prefix("//").unwrap_or(rest);
    let (path_part, query_part) = match rest.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (rest, None),
    };
    if path_part.is_empty() {
        return url.to_string();
    }

    let expanded = match (path_part.strip_prefix("~/"), std::env::var("HOME")) {
        (Some(tail), Ok(home)) => format!("{}/{}", home.trim_end_matches('/'), tail),
        _ => path_part.to_string(),
    };

    if let Some(parent) = std::path::Path::new(&expanded).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    let mut rebuilt = format!("sqlite://{expanded}");
    if let Some(q) = query_part {
        rebuilt.push('?');
        rebuilt.push_str(q);
    }
    rebuilt
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Escape `LIKE` wildcards so a search term matches literally.
fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

fn profile_from_row(row: ProfileRow) -> Result<Profile> {
    let (id, first_name, last_name, role, cnpj) = row;
    let role = Role::parse_role(&role).ok_or_else(|| anyhow!("unknown role '{role}' for {id}"))?;
    Ok(Profile {
        id,
        first_name,
        last_name,
        role,
        cnpj,
    })
}

fn review_from_row(row: ReviewRow) -> Result<Review> {
    let (id, restaurant_id, rating, comment, created_at, first_name, last_name) = row;
    let rating = u8::try_from(rating).with_context(|| format!("rating {rating} on review {id}"))?;
    let created_at = DateTime::<Utc>::from_timestamp_micros(created_at)
        .ok_or_else(|| anyhow!("timestamp {created_at} on review {id} out of range"))?;
    Ok(Review {
        id,
        restaurant_id,
        rating,
        comment,
        created_at,
        reviewer_first_name: first_name,
        reviewer_last_name: last_name,
    })
}

fn summary_from_row(row: SummaryRow) -> RestaurantSummary {
    let (id, name, description, image_url) = row;
    RestaurantSummary {
        id,
        name,
        description,
        image_url,
    }
}

impl SqliteBackend {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = init_pool(database_url).await?;
        run_migrations(&pool).await?;
        info!("sqlite backend ready");
        Ok(Self::from_pool(pool))
    }

    /// Wrap an already migrated pool.
    pub fn from_pool(pool: Pool) -> Self {
        let (events, _) = broadcast::channel(AUTH_EVENT_CAPACITY);
        Self { pool, events }
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    #[instrument(skip_all)]
    pub async fn insert_profile(&self, profile: &Profile) -> Result<()> {
        sqlx::query(
            "INSERT INTO profiles (id, first_name, last_name, role, cnpj) VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET first_name = excluded.first_name,
                 last_name = excluded.last_name, role = excluded.role, cnpj = excluded.cnpj",
        )
        .bind(profile.id)
        .bind(&profile.first_name)
        .bind(&profile.last_name)
        .bind(profile.role.as_str())
        .bind(&profile.cnpj)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[instrument(skip_all)]
    pub async fn insert_restaurant(&self, restaurant: &NewRestaurant) -> Result<Uuid> {
        let id = restaurant.id.unwrap_or_else(Uuid::new_v4);
        let created_at = restaurant.created_at.unwrap_or_else(Utc::now);
        sqlx::query(
            "INSERT INTO restaurants
                (id, owner_id, name, name_lower, description, address, cuisine, image_url,
                 latitude, longitude, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(restaurant.owner_id)
        .bind(&restaurant.name)
        .bind(restaurant.name.to_lowercase())
        .bind(&restaurant.description)
        .bind(&restaurant.address)
        .bind(&restaurant.cuisine)
        .bind(&restaurant.image_url)
        .bind(restaurant.latitude)
        .bind(restaurant.longitude)
        .bind(created_at.timestamp_micros())
        .execute(&self.pool)
        .await?;
        Ok(id)
    }

    /// Mint a session for an existing profile and announce it.
    #[instrument(skip_all)]
    pub async fn sign_in(&self, user_id: Uuid) -> Result<Session> {
        let exists = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM profiles WHERE id = ?")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;
        if exists == 0 {
            return Err(anyhow!("no profile for user {user_id}"));
        }
        let session = Session {
            access_token: Uuid::new_v4().simple().to_string(),
            refresh_token: None,
            expires_at: None,
            user_id,
            email: None,
        };
        sqlx::query("INSERT INTO sessions (access_token, user_id, created_at) VALUES (?, ?, ?)")
            .bind(&session.access_token)
            .bind(user_id)
            .bind(Utc::now().timestamp_micros())
            .execute(&self.pool)
            .await?;
        let _ = self.events.send(Some(session.clone()));
        Ok(session)
    }
}

#[async_trait]
impl Backend for SqliteBackend {
    #[instrument(skip_all)]
    async fn current_session(&self) -> Result<Option<Session>> {
        let row = sqlx::query_as::<_, (String, Uuid)>(
            "SELECT access_token, user_id FROM sessions ORDER BY created_at DESC, rowid DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(access_token, user_id)| Session {
            access_token,
            refresh_token: None,
            expires_at: None,
            user_id,
            email: None,
        }))
    }

    fn auth_events(&self) -> broadcast::Receiver<Option<Session>> {
        self.events.subscribe()
    }

    #[instrument(skip_all)]
    async fn sign_out(&self) -> Result<()> {
        sqlx::query("DELETE FROM sessions")
            .execute(&self.pool)
            .await?;
        let _ = self.events.send(None);
        Ok(())
    }

    #[instrument(skip_all)]
    async fn fetch_profile(&self, user_id: Uuid) -> Result<Profile> {
        let row = sqlx::query_as::<_, ProfileRow>(
            "SELECT id, first_name, last_name, role, cnpj FROM profiles WHERE id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| anyhow!("profile {user_id} not found"))?;
        profile_from_row(row)
    }

    #[instrument(skip_all)]
    async fn fetch_restaurants(&self, query: &PageQuery) -> Result<Vec<RestaurantSummary>> {
        let limit = i64::try_from(query.limit).context("page limit out of range")?;
        let offset = i64::try_from(query.offset).context("page offset out of range")?;
        let rows = match &query.search {
            Some(term) => {
                sqlx::query_as::<_, SummaryRow>(
                    "SELECT id, name, description, image_url FROM restaurants
                     WHERE name_lower LIKE ? ESCAPE '\\'
                     ORDER BY created_at DESC, rowid DESC LIMIT ? OFFSET ?",
                )
                .bind(like_pattern(&term.to_lowercase()))
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, SummaryRow>(
                    "SELECT id, name, description, image_url FROM restaurants
                     ORDER BY created_at DESC, rowid DESC LIMIT ? OFFSET ?",
                )
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(rows.into_iter().map(summary_from_row).collect())
    }

    #[instrument(skip_all)]
    async fn fetch_owned_restaurants(&self, owner_id: Uuid) -> Result<Vec<RestaurantSummary>> {
        let rows = sqlx::query_as::<_, SummaryRow>(
            "SELECT id, name, description, image_url FROM restaurants
             WHERE owner_id = ? ORDER BY created_at DESC, rowid DESC",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(summary_from_row).collect())
    }

    #[instrument(skip_all)]
    async fn fetch_map_pins(&self) -> Result<Vec<RestaurantPin>> {
        let rows = sqlx::query_as::<_, (Uuid, String, f64, f64)>(
            "SELECT id, name, latitude, longitude FROM restaurants
             WHERE latitude IS NOT NULL AND longitude IS NOT NULL",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(id, name, latitude, longitude)| RestaurantPin {
                id,
                name,
                latitude,
                longitude,
            })
            .collect())
    }

    #[instrument(skip_all)]
    async fn delete_restaurant(&self, id: Uuid) -> Result<()> {
        let res = sqlx::query("DELETE FROM restaurants WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if res.rows_affected() == 0 {
            return Err(anyhow!("restaurant {id} not found"));
        }
        Ok(())
    }

    #[instrument(skip_all)]
    async fn list_profiles(&self) -> Result<Vec<Profile>> {
        let rows = sqlx::query_as::<_, ProfileRow>(
            "SELECT id, first_name, last_name, role, cnpj FROM profiles ORDER BY first_name, last_name",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(profile_from_row).collect()
    }

    #[instrument(skip_all)]
    async fn delete_profile(&self, id: Uuid) -> Result<()> {
        let res = sqlx::query("DELETE FROM profiles WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if res.rows_affected() == 0 {
            return Err(anyhow!("profile {id} not found"));
        }
        Ok(())
    }

    #[instrument(skip_all)]
    async fn list_restaurant_listings(&self) -> Result<Vec<RestaurantListing>> {
        let rows = sqlx::query_as::<_, (Uuid, String, Option<String>, Option<String>, Option<String>)>(
            "SELECT r.id, r.name, r.cuisine, p.first_name, p.last_name
             FROM restaurants r LEFT JOIN profiles p ON p.id = r.owner_id
             ORDER BY r.created_at DESC, r.rowid DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(
                |(id, name, cuisine, owner_first_name, owner_last_name)| RestaurantListing {
                    id,
                    name,
                    cuisine,
                    owner_first_name,
                    owner_last_name,
                },
            )
            .collect())
    }

    #[instrument(skip_all)]
    async fn fetch_restaurant(&self, id: Uuid) -> Result<Option<RestaurantDetail>> {
        let row = sqlx::query_as::<_, DetailRow>(
            "SELECT id, owner_id, name, description, address, cuisine, image_url, latitude, longitude
             FROM restaurants WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(
            |(id, owner_id, name, description, address, cuisine, image_url, latitude, longitude)| {
                RestaurantDetail {
                    id,
                    owner_id,
                    name,
                    description,
                    address,
                    cuisine,
                    image_url,
                    latitude,
                    longitude,
                }
            },
        ))
    }

    #[instrument(skip_all)]
    async fn fetch_reviews(&self, restaurant_id: Uuid) -> Result<Vec<Review>> {
        let rows = sqlx::query_as::<_, ReviewRow>(&format!(
            "{REVIEW_SELECT} WHERE r.restaurant_id = ? ORDER BY r.created_at DESC, r.rowid DESC"
        ))
        .bind(restaurant_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(review_from_row).collect()
    }

    #[instrument(skip_all)]
    async fn insert_review(&self, review: &NewReview) -> Result<Review> {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO reviews (id, restaurant_id, user_id, rating, comment, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(review.restaurant_id)
        .bind(review.user_id)
        .bind(i64::from(review.rating))
        .bind(&review.comment)
        .bind(Utc::now().timestamp_micros())
        .execute(&self.pool)
        .await
        .with_context(|| format!("insert review for restaurant {}", review.restaurant_id))?;
        let row = sqlx::query_as::<_, ReviewRow>(&format!("{REVIEW_SELECT} WHERE r.id = ?"))
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        review_from_row(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("pizza"), "%pizza%");
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
    }

    #[test]
    fn memory_urls_pass_through() {
        assert_eq!(prepare_sqlite_url("sqlite::memory:"), "sqlite::memory:");
        assert_eq!(prepare_sqlite_url("postgres://x"), "postgres://x");
    }

    #[test]
    fn file_urls_are_rebuilt_with_parent_dir() {
        let td = tempfile::tempdir().unwrap();
        let db = td.path().join("nested").join("restodir.db");
        let url = format!("sqlite:{}?mode=rwc", db.display());
        let rebuilt = prepare_sqlite_url(&url);
        assert_eq!(rebuilt, format!("sqlite://{}?mode=rwc", db.display()));
        assert!(db.parent().unwrap().exists());
    }
}
