use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::header::HeaderValue;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::{Backend, AUTH_EVENT_CAPACITY};
use crate::model::{
    NewReview, PageQuery, Profile, RestaurantDetail, RestaurantListing, RestaurantPin,
    RestaurantSummary, Review, Session,
};

const SUMMARY_COLUMNS: &str = "id,name,description,image_url";
const DETAIL_COLUMNS: &str =
    "id,owner_id,name,description,address,cuisine,image_url,latitude,longitude";
const REVIEW_COLUMNS: &str =
    "id,restaurant_id,rating,comment,created_at,reviewer:profiles!user_id(first_name,last_name)";

/// HTTP backend speaking PostgREST under `/rest/v1` and GoTrue under
/// `/auth/v1`. The signed-in session is persisted as JSON so it survives
/// restarts.
pub struct RestBackend {
    http: Client,
    base_url: Url,
    anon_key: String,
    credentials_path: Option<PathBuf>,
    session: Mutex<Option<Session>>,
    events: broadcast::Sender<Option<Session>>,
}

impl fmt::Debug for RestBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestBackend")
            .field("base_url", &self.base_url)
            .field("credentials_path", &self.credentials_path)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    user: TokenUser,
}

#[derive(Debug, Deserialize)]
struct TokenUser {
    id: Uuid,
    email: Option<String>,
}

impl From<TokenResponse> for Session {
    fn from(resp: TokenResponse) -> Self {
        Session {
            access_token: resp.access_token,
            refresh_token: resp.refresh_token,
            expires_at: resp
                .expires_in
                .map(|secs| Utc::now() + ChronoDuration::seconds(secs)),
            user_id: resp.user.id,
            email: resp.user.email,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ListingRow {
    id: Uuid,
    name: String,
    cuisine: Option<String>,
    owner: Option<PersonName>,
}

#[derive(Debug, Deserialize)]
struct PersonName {
    first_name: Option<String>,
    last_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReviewRow {
    id: Uuid,
    restaurant_id: Uuid,
    rating: u8,
    comment: Option<String>,
    created_at: DateTime<Utc>,
    reviewer: Option<PersonName>,
}

impl From<ReviewRow> for Review {
    fn from(row: ReviewRow) -> Self {
        let (reviewer_first_name, reviewer_last_name) = match row.reviewer {
            Some(p) => (p.first_name, p.last_name),
            None => (None, None),
        };
        Review {
            id: row.id,
            restaurant_id: row.restaurant_id,
            rating: row.rating,
            comment: row.comment,
            created_at: row.created_at,
            reviewer_first_name,
            reviewer_last_name,
        }
    }
}

/// `ilike` filter value matching `term` as a literal substring. PostgREST
/// turns every `*` into `%`, so a literal `*` can only be approximated by the
/// single-character wildcard.
fn ilike_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 8);
    pattern.push_str("ilike.*");
    for c in term.chars() {
        match c {
            '%' | '_' | '\\' => {
                pattern.push('\\');
                pattern.push(c);
            }
            '*' => pattern.push('_'),
            _ => pattern.push(c),
        }
    }
    pattern.push('*');
    pattern
}

impl RestBackend {
    pub fn new(base_url: Url, anon_key: String, credentials_path: Option<PathBuf>) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("restodir/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build http client")?;
        let (events, _) = broadcast::channel(AUTH_EVENT_CAPACITY);
        Ok(Self {
            http,
            base_url,
            anon_key,
            credentials_path,
            session: Mutex::new(None),
            events,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .with_context(|| format!("invalid backend path {path}"))
    }

    /// Start a request carrying the api key and, when signed in, the user's
    /// bearer token.
    async fn request(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        let url = self.endpoint(path)?;
        let bearer = match self.session.lock().await.as_ref() {
            Some(s) => s.access_token.clone(),
            None => self.anon_key.clone(),
        };
        Ok(self
            .http
            .request(method, url)
            .header("apikey", &self.anon_key)
            .header("Authorization", format!("Bearer {bearer}")))
    }

    pub fn build_page_request(&self, query: &PageQuery) -> Result<reqwest::Request> {
        let url = self.endpoint("rest/v1/restaurants")?;
        let mut params = vec![
            ("select", SUMMARY_COLUMNS.to_string()),
            ("order", "created_at.desc".to_string()),
            ("offset", query.offset.to_string()),
            ("limit", query.limit.to_string()),
        ];
        if let Some(term) = &query.search {
            params.push(("name", ilike_pattern(term)));
        }
        self.http
            .get(url)
            .header("apikey", &self.anon_key)
            .query(&params)
            .build()
            .context("failed to build restaurants request")
    }

    async fn send_json<T: DeserializeOwned>(&self, req: RequestBuilder, what: &str) -> Result<T> {
        let res = check(req.send().await.with_context(|| format!("failed to reach backend for {what}"))?, what).await?;
        res.json::<T>()
            .await
            .with_context(|| format!("invalid {what} response"))
    }

    async fn send_empty(&self, req: RequestBuilder, what: &str) -> Result<()> {
        check(req.send().await.with_context(|| format!("failed to reach backend for {what}"))?, what).await?;
        Ok(())
    }

    /// Password sign-in; persists and announces the new session.
    #[instrument(skip_all)]
    pub async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session> {
        let url = self.endpoint("auth/v1/token")?;
        let req = self
            .http
            .post(url)
            .query(&[("grant_type", "password")])
            .header("apikey", &self.anon_key)
            .json(&json!({ "email": email, "password": password }));
        let token: TokenResponse = self.send_json(req, "sign-in").await?;
        let session = Session::from(token);
        self.store_session(Some(session.clone())).await?;
        info!(user_id = %session.user_id, "signed in");
        Ok(session)
    }

    async fn refresh(&self, refresh_token: &str) -> Result<Session> {
        let url = self.endpoint("auth/v1/token")?;
        let req = self
            .http
            .post(url)
            .query(&[("grant_type", "refresh_token")])
            .header("apikey", &self.anon_key)
            .json(&json!({ "refresh_token": refresh_token }));
        let token: TokenResponse = self.send_json(req, "token refresh").await?;
        Ok(Session::from(token))
    }

    async fn store_session(&self, session: Option<Session>) -> Result<()> {
        *self.session.lock().await = session.clone();
        if let Some(path) = &self.credentials_path {
            match &session {
                Some(s) => write_credentials(path, s).await?,
                None => match fs::remove_file(path).await {
                    Ok(()) => {}
                    Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                    Err(err) => return Err(err).context("failed to remove credentials"),
                },
            }
        }
        let _ = self.events.send(session);
        Ok(())
    }

    async fn load_credentials(&self) -> Result<Option<Session>> {
        let Some(path) = &self.credentials_path else {
            return Ok(None);
        };
        let raw = match fs::read_to_string(path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err).context("failed to read credentials"),
        };
        let session: Session =
            serde_json::from_str(&raw).context("invalid persisted credentials")?;
        Ok(Some(session))
    }
}

async fn write_credentials(path: &Path, session: &Session) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await?;
        }
    }
    let body = serde_json::to_vec_pretty(session)?;
    fs::write(path, body)
        .await
        .with_context(|| format!("failed to write credentials to {}", path.display()))
}

async fn check(res: Response, what: &str) -> Result<Response> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }
    let body = res.text().await.unwrap_or_default();
    if status == StatusCode::TOO_MANY_REQUESTS {
        warn!(%status, what, "rate limited by backend");
    }
    Err(anyhow!("backend error {status} on {what}: {body}"))
}

#[async_trait]
impl Backend for RestBackend {
    #[instrument(skip_all)]
    async fn current_session(&self) -> Result<Option<Session>> {
        if let Some(session) = self.session.lock().await.clone() {
            return Ok(Some(session));
        }
        let Some(stored) = self.load_credentials().await? else {
            return Ok(None);
        };
        if !stored.is_expired(Utc::now()) {
            *self.session.lock().await = Some(stored.clone());
            return Ok(Some(stored));
        }
        let Some(refresh_token) = stored.refresh_token.as_deref() else {
            debug!("persisted session expired without refresh token");
            self.store_session(None).await?;
            return Ok(None);
        };
        let fresh = self.refresh(refresh_token).await?;
        self.store_session(Some(fresh.clone())).await?;
        Ok(Some(fresh))
    }

    fn auth_events(&self) -> broadcast::Receiver<Option<Session>> {
        self.events.subscribe()
    }

    #[instrument(skip_all)]
    async fn sign_out(&self) -> Result<()> {
        if self.session.lock().await.is_some() {
            let req = self.request(Method::POST, "auth/v1/logout").await?;
            if let Err(err) = self.send_empty(req, "sign-out").await {
                // The local session is dropped regardless; the token expires server side.
                warn!(?err, "remote sign-out failed");
            }
        }
        self.store_session(None).await
    }

    #[instrument(skip_all)]
    async fn fetch_profile(&self, user_id: Uuid) -> Result<Profile> {
        let req = self
            .request(Method::GET, "rest/v1/profiles")
            .await?
            .query(&[("select", "*".to_string()), ("id", format!("eq.{user_id}"))])
            .header("Accept", "application/vnd.pgrst.object+json");
        self.send_json(req, "profile").await
    }

    #[instrument(skip_all)]
    async fn fetch_restaurants(&self, query: &PageQuery) -> Result<Vec<RestaurantSummary>> {
        let mut request = self.build_page_request(query)?;
        if let Some(session) = self.session.lock().await.as_ref() {
            let value: HeaderValue = format!("Bearer {}", session.access_token)
                .parse()
                .context("invalid access token header")?;
            request.headers_mut().insert("Authorization", value);
        }
        debug!(url = %request.url(), "fetching restaurant page");
        let res = self
            .http
            .execute(request)
            .await
            .context("failed to reach backend for restaurants")?;
        check(res, "restaurants")
            .await?
            .json()
            .await
            .context("invalid restaurants response")
    }

    #[instrument(skip_all)]
    async fn fetch_owned_restaurants(&self, owner_id: Uuid) -> Result<Vec<RestaurantSummary>> {
        let req = self
            .request(Method::GET, "rest/v1/restaurants")
            .await?
            .query(&[
                ("select", SUMMARY_COLUMNS.to_string()),
                ("owner_id", format!("eq.{owner_id}")),
                ("order", "created_at.desc".to_string()),
            ]);
        self.send_json(req, "owned restaurants").await
    }

    #[instrument(skip_all)]
    async fn fetch_map_pins(&self) -> Result<Vec<RestaurantPin>> {
        let req = self
            .request(Method::GET, "rest/v1/restaurants")
            .await?
            .query(&[
                ("select", "id,name,latitude,longitude"),
                ("latitude", "not.is.null"),
                ("longitude", "not.is.null"),
            ]);
        self.send_json(req, "map pins").await
    }

    #[instrument(skip_all)]
    async fn delete_restaurant(&self, id: Uuid) -> Result<()> {
        let req = self
            .request(Method::DELETE, "rest/v1/restaurants")
            .await?
            .query(&[("id", format!("eq.{id}"))]);
        self.send_empty(req, "restaurant delete").await
    }

    #[instrument(skip_all)]
    async fn list_profiles(&self) -> Result<Vec<Profile>> {
        let req = self
            .request(Method::GET, "rest/v1/profiles")
            .await?
            .query(&[("select", "*")]);
        self.send_json(req, "profiles").await
    }

    #[instrument(skip_all)]
    async fn delete_profile(&self, id: Uuid) -> Result<()> {
        let req = self
            .request(Method::DELETE, "rest/v1/profiles")
            .await?
            .query(&[("id", format!("eq.{id}"))]);
        self.send_empty(req, "profile delete").await
    }

    #[instrument(skip_all)]
    async fn list_restaurant_listings(&self) -> Result<Vec<RestaurantListing>> {
        let req = self
            .request(Method::GET, "rest/v1/restaurants")
            .await?
            .query(&[(
                "select",
                "id,name,cuisine,owner:profiles!owner_id(first_name,last_name)",
            )]);
        let rows: Vec<ListingRow> = self.send_json(req, "restaurant listings").await?;
        Ok(rows
            .into_iter()
            .map(|row| {
                let (owner_first_name, owner_last_name) = match row.owner {
                    Some(o) => (o.first_name, o.last_name),
                    None => (None, None),
                };
                RestaurantListing {
                    id: row.id,
                    name: row.name,
                    cuisine: row.cuisine,
                    owner_first_name,
                    owner_last_name,
                }
            })
            .collect())
    }

    #[instrument(skip_all)]
    async fn fetch_restaurant(&self, id: Uuid) -> Result<Option<RestaurantDetail>> {
        let req = self
            .request(Method::GET, "rest/v1/restaurants")
            .await?
            .query(&[("select", DETAIL_COLUMNS.to_string()), ("id", format!("eq.{id}"))]);
        let rows: Vec<RestaurantDetail> = self.send_json(req, "restaurant").await?;
        Ok(rows.into_iter().next())
    }

    #[instrument(skip_all)]
    async fn fetch_reviews(&self, restaurant_id: Uuid) -> Result<Vec<Review>> {
        let req = self
            .request(Method::GET, "rest/v1/reviews")
            .await?
            .query(&[
                ("select", REVIEW_COLUMNS.to_string()),
                ("restaurant_id", format!("eq.{restaurant_id}")),
                ("order", "created_at.desc".to_string()),
            ]);
        let rows: Vec<ReviewRow> = self.send_json(req, "reviews").await?;
        Ok(rows.into_iter().map(Review::from).collect())
    }

    #[instrument(skip_all)]
    async fn insert_review(&self, review: &NewReview) -> Result<Review> {
        let req = self
            .request(Method::POST, "rest/v1/reviews")
            .await?
            .query(&[("select", REVIEW_COLUMNS)])
            .header("Prefer", "return=representation")
            .header("Accept", "application/vnd.pgrst.object+json")
            .json(review);
        let row: ReviewRow = self.send_json(req, "review insert").await?;
        Ok(Review::from(row))
    }
}
