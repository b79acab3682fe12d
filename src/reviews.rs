//! Reviews of one restaurant and the form that adds to them.
//!
//! Refreshes take a freshness ticket when they are started, so a reload
//! triggered by a new review is never overwritten by an older one that
//! answers late.

use futures::future::{BoxFuture, FutureExt};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::backend::Backend;
use crate::dashboard::ListState;
use crate::form::{FormError, ReviewForm};
use crate::freshness::Generation;
use crate::model::{NewReview, Review};
use crate::observable::{Observable, Subscription};
use crate::session::SessionStore;

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error(transparent)]
    Invalid(#[from] FormError),
    #[error("you must be signed in to leave a review")]
    SignedOut,
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

pub struct ReviewsController {
    backend: Arc<dyn Backend>,
    sessions: SessionStore,
    restaurant_id: Uuid,
    state: Observable<ListState<Review>>,
    generation: Arc<Generation>,
}

impl ReviewsController {
    pub fn new(backend: Arc<dyn Backend>, sessions: SessionStore, restaurant_id: Uuid) -> Self {
        Self {
            backend,
            sessions,
            restaurant_id,
            state: Observable::new(ListState::default()),
            generation: Arc::new(Generation::new()),
        }
    }

    pub fn state(&self) -> ListState<Review> {
        self.state.get()
    }

    pub fn subscribe(&self) -> Subscription<ListState<Review>> {
        self.state.subscribe()
    }

    /// Reload the list. The request counts as started when this is called.
    /// A failed reload keeps the reviews already shown.
    pub fn refresh(&self) -> BoxFuture<'static, ()> {
        let ticket = self.state.update(|s| {
            s.loading = true;
            self.generation.advance()
        });
        let backend = Arc::clone(&self.backend);
        let state = self.state.clone();
        let generation = Arc::clone(&self.generation);
        let restaurant_id = self.restaurant_id;
        async move {
            let fetched = backend.fetch_reviews(restaurant_id).await;
            state.update_if(|s| {
                if !generation.is_current(ticket) {
                    debug!(%restaurant_id, "discarding superseded reviews");
                    return (false, ());
                }
                match fetched {
                    Ok(reviews) => s.items = reviews,
                    Err(err) => error!(?err, %restaurant_id, "failed to fetch reviews"),
                }
                s.loading = false;
                (true, ())
            })
        }
        .boxed()
    }

    /// Validate and store a review by the signed-in user, then reload the
    /// list so it shows up in its place.
    pub async fn submit(&self, form: &ReviewForm) -> Result<Review, SubmitError> {
        form.validate()?;
        let session = self.sessions.current().ok_or(SubmitError::SignedOut)?;
        let review = self
            .backend
            .insert_review(&NewReview {
                restaurant_id: self.restaurant_id,
                user_id: session.user_id,
                rating: form.rating,
                comment: Some(form.comment.clone()),
            })
            .await?;
        info!(id = %review.id, restaurant_id = %self.restaurant_id, "review added");
        self.refresh().await;
        Ok(review)
    }
}
