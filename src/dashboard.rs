use anyhow::Result;
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

use crate::backend::Backend;
use crate::freshness::Generation;
use crate::model::{Profile, RestaurantListing, RestaurantSummary, Role};
use crate::observable::{Observable, Subscription};
use crate::profile::{Access, ProfileStore};
use crate::session::SessionStore;

#[derive(Debug, Clone, PartialEq)]
pub struct ListState<T> {
    pub items: Vec<T>,
    pub loading: bool,
}

impl<T> Default for ListState<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            loading: true,
        }
    }
}

/// "My restaurants" for the signed-in owner.
pub struct OwnerDashboard {
    backend: Arc<dyn Backend>,
    session: SessionStore,
    state: Observable<ListState<RestaurantSummary>>,
    generation: Generation,
}

impl OwnerDashboard {
    pub fn new(backend: Arc<dyn Backend>, session: SessionStore) -> Self {
        Self {
            backend,
            session,
            state: Observable::new(ListState::default()),
            generation: Generation::new(),
        }
    }

    pub fn state(&self) -> ListState<RestaurantSummary> {
        self.state.get()
    }

    pub fn subscribe(&self) -> Subscription<ListState<RestaurantSummary>> {
        self.state.subscribe()
    }

    pub async fn refresh(&self) {
        let Some(session) = self.session.current() else {
            self.state.update(|s| {
                self.generation.advance();
                s.items.clear();
                s.loading = false;
            });
            return;
        };
        let ticket = self.state.update(|s| {
            s.loading = true;
            self.generation.advance()
        });
        let fetched = self.backend.fetch_owned_restaurants(session.user_id).await;
        self.state.update_if(|s| {
            if !self.generation.is_current(ticket) {
                return (false, ());
            }
            match fetched {
                Ok(items) => s.items = items,
                Err(err) => error!(?err, "failed to fetch owned restaurants"),
            }
            s.loading = false;
            (true, ())
        });
    }

    /// The row leaves the list only after the backend accepted the delete.
    pub async fn delete(&self, id: Uuid) -> Result<()> {
        self.backend.delete_restaurant(id).await?;
        info!(%id, "restaurant deleted");
        self.state.update(|s| s.items.retain(|r| r.id != id));
        Ok(())
    }
}

/// Moderation view; only fetches while the signed-in profile is an admin.
pub struct AdminDashboard {
    backend: Arc<dyn Backend>,
    profiles: ProfileStore,
    users: Observable<ListState<Profile>>,
    restaurants: Observable<ListState<RestaurantListing>>,
    generation: Generation,
}

impl AdminDashboard {
    pub fn new(backend: Arc<dyn Backend>, profiles: ProfileStore) -> Self {
        Self {
            backend,
            profiles,
            users: Observable::new(ListState::default()),
            restaurants: Observable::new(ListState::default()),
            generation: Generation::new(),
        }
    }

    pub fn access(&self) -> Access {
        self.profiles.current().access(Role::Admin)
    }

    pub fn users(&self) -> ListState<Profile> {
        self.users.get()
    }

    pub fn restaurants(&self) -> ListState<RestaurantListing> {
        self.restaurants.get()
    }

    pub fn subscribe_users(&self) -> Subscription<ListState<Profile>> {
        self.users.subscribe()
    }

    pub fn subscribe_restaurants(&self) -> Subscription<ListState<RestaurantListing>> {
        self.restaurants.subscribe()
    }

    /// Reload both tables. Returns the access decision it acted on; nothing
    /// is fetched unless access is granted. Results of a refresh overtaken
    /// by a later one are dropped.
    pub async fn refresh(&self) -> Access {
        let access = self.access();
        if access != Access::Granted {
            return access;
        }
        let ticket = self.generation.advance();
        self.users.update(|s| s.loading = true);
        self.restaurants.update(|s| s.loading = true);
        let (users, restaurants) = futures::join!(
            self.backend.list_profiles(),
            self.backend.list_restaurant_listings()
        );
        self.users.update_if(|s| {
            if !self.generation.is_current(ticket) {
                return (false, ());
            }
            match users {
                Ok(items) => s.items = items,
                Err(err) => error!(?err, "failed to fetch users"),
            }
            s.loading = false;
            (true, ())
        });
        self.restaurants.update_if(|s| {
            if !self.generation.is_current(ticket) {
                return (false, ());
            }
            match restaurants {
                Ok(items) => s.items = items,
                Err(err) => error!(?err, "failed to fetch restaurants"),
            }
            s.loading = false;
            (true, ())
        });
        access
    }

    /// Removes the profile row only; auth accounts are managed by the backend.
    pub async fn delete_profile(&self, id: Uuid) -> Result<()> {
        self.backend.delete_profile(id).await?;
        info!(%id, "profile deleted");
        self.users.update(|s| s.items.retain(|p| p.id != id));
        Ok(())
    }

    pub async fn delete_restaurant(&self, id: Uuid) -> Result<()> {
        self.backend.delete_restaurant(id).await?;
        info!(%id, "restaurant deleted");
        self.restaurants.update(|s| s.items.retain(|r| r.id != id));
        Ok(())
    }
}
