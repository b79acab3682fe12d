use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::backend::Backend;
use crate::freshness::Generation;
use crate::model::RestaurantDetail;
use crate::observable::{Observable, Subscription};

#[derive(Debug, Clone, PartialEq, Default)]
pub enum DetailState {
    #[default]
    Loading,
    Found(RestaurantDetail),
    /// No such restaurant, or the lookup failed.
    NotFound,
}

impl DetailState {
    pub fn restaurant(&self) -> Option<&RestaurantDetail> {
        match self {
            DetailState::Found(detail) => Some(detail),
            _ => None,
        }
    }
}

/// The page of a single restaurant.
pub struct RestaurantPage {
    backend: Arc<dyn Backend>,
    id: Uuid,
    state: Observable<DetailState>,
    generation: Generation,
}

impl RestaurantPage {
    pub fn new(backend: Arc<dyn Backend>, id: Uuid) -> Self {
        Self {
            backend,
            id,
            state: Observable::new(DetailState::Loading),
            generation: Generation::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> DetailState {
        self.state.get()
    }

    pub fn subscribe(&self) -> Subscription<DetailState> {
        self.state.subscribe()
    }

    pub async fn load(&self) {
        let ticket = self.state.update(|s| {
            *s = DetailState::Loading;
            self.generation.advance()
        });
        let fetched = self.backend.fetch_restaurant(self.id).await;
        let id = self.id;
        self.state.update_if(|s| {
            if !self.generation.is_current(ticket) {
                debug!(%id, "discarding superseded restaurant load");
                return (false, ());
            }
            *s = match fetched {
                Ok(Some(detail)) => DetailState::Found(detail),
                Ok(None) => DetailState::NotFound,
                Err(err) => {
                    warn!(?err, %id, "failed to load restaurant");
                    DetailState::NotFound
                }
            };
            (true, ())
        });
    }
}
