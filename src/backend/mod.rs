//! Backend service seam: persistent storage, auth state and moderation calls.
//!
//! The stores and controllers only ever talk to `dyn Backend`. Two adapters
//! live here:
//! - `sqlite`: a local SQLite database, used offline and in tests.
//! - `rest`: a PostgREST/GoTrue HTTP backend.

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::model::{
    NewReview, PageQuery, Profile, RestaurantDetail, RestaurantListing, RestaurantPin,
    RestaurantSummary, Review, Session,
};

pub mod rest;
pub mod sqlite;

pub use rest::RestBackend;
pub use sqlite::SqliteBackend;

/// Capacity of the auth event channel. Listeners that fall further behind
/// than this re-read the current session instead.
pub const AUTH_EVENT_CAPACITY: usize = 32;

#[async_trait]
pub trait Backend: Send + Sync {
    /// Session restored from persisted credentials, if any.
    async fn current_session(&self) -> Result<Option<Session>>;

    /// Auth state changes (sign-in, sign-out, token refresh) in emission order.
    fn auth_events(&self) -> broadcast::Receiver<Option<Session>>;

    async fn sign_out(&self) -> Result<()>;

    async fn fetch_profile(&self, user_id: Uuid) -> Result<Profile>;

    /// Restaurants ordered newest first, filtered by `query.search`.
    async fn fetch_restaurants(&self, query: &PageQuery) -> Result<Vec<RestaurantSummary>>;

    async fn fetch_owned_restaurants(&self, owner_id: Uuid) -> Result<Vec<RestaurantSummary>>;

    /// Every restaurant that has both coordinates set.
    async fn fetch_map_pins(&self) -> Result<Vec<RestaurantPin>>;

    async fn delete_restaurant(&self, id: Uuid) -> Result<()>;

    async fn list_profiles(&self) -> Result<Vec<Profile>>;

    async fn delete_profile(&self, id: Uuid) -> Result<()>;

    async fn list_restaurant_listings(&self) -> Result<Vec<RestaurantListing>>;

    /// `None` when no restaurant has this id.
    async fn fetch_restaurant(&self, id: Uuid) -> Result<Option<RestaurantDetail>>;

    /// Reviews of one restaurant, newest first.
    async fn fetch_reviews(&self, restaurant_id: Uuid) -> Result<Vec<Review>>;

    /// Store a review and return it as `fetch_reviews` would list it.
    async fn insert_review(&self, review: &NewReview) -> Result<Review>;
}
