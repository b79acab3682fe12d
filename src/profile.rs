//! Profile store: the signed-in user's profile, refetched on every session
//! change.
//!
//! Fetches can overlap (sign-out followed quickly by sign-in). Each call takes
//! a freshness ticket when it is made, so whichever call was initiated last
//! decides the final state no matter which response arrives last.

use futures::future::{BoxFuture, FutureExt};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::backend::Backend;
use crate::freshness::Generation;
use crate::model::{Profile, Role, Session};
use crate::observable::{Observable, Subscription};
use crate::session::SessionStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileState {
    pub profile: Option<Profile>,
    pub loading: bool,
}

impl Default for ProfileState {
    /// Nothing is known before the first session resolves.
    fn default() -> Self {
        Self {
            profile: None,
            loading: true,
        }
    }
}

/// Outcome of a role check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Profile still loading; render a neutral placeholder.
    Checking,
    Granted,
    Denied,
}

impl ProfileState {
    pub fn role(&self) -> Option<Role> {
        self.profile.as_ref().map(|p| p.role)
    }

    pub fn access(&self, required: Role) -> Access {
        if self.loading {
            return Access::Checking;
        }
        match self.role() {
            Some(role) if role.satisfies(required) => Access::Granted,
            _ => Access::Denied,
        }
    }
}

#[derive(Clone)]
pub struct ProfileStore {
    backend: Arc<dyn Backend>,
    state: Observable<ProfileState>,
    generation: Arc<Generation>,
}

impl std::fmt::Debug for ProfileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProfileStore")
            .field("state", &self.state.get())
            .finish_non_exhaustive()
    }
}

impl ProfileStore {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            state: Observable::new(ProfileState::default()),
            generation: Arc::new(Generation::new()),
        }
    }

    pub fn current(&self) -> ProfileState {
        self.state.get()
    }

    pub fn subscribe(&self) -> Subscription<ProfileState> {
        self.state.subscribe()
    }

    /// Refresh the profile for `session`.
    ///
    /// The request is initiated when this is called, not when the returned
    /// future is first polled; the future only waits for the backend and
    /// applies the result if no later call superseded it. Without a session
    /// the store is cleared immediately and the future is already complete.
    pub fn fetch_profile(&self, session: Option<&Session>) -> BoxFuture<'static, ()> {
        let Some(user_id) = session.map(|s| s.user_id) else {
            self.state.update(|s| {
                self.generation.advance();
                s.profile = None;
                s.loading = false;
            });
            return futures::future::ready(()).boxed();
        };

        let ticket = self.state.update(|s| {
            s.loading = true;
            self.generation.advance()
        });

        let backend = Arc::clone(&self.backend);
        let state = self.state.clone();
        let generation = Arc::clone(&self.generation);
        async move {
            let fetched = backend.fetch_profile(user_id).await;
            state.update_if(|s| {
                if !generation.is_current(ticket) {
                    debug!(%user_id, "discarding superseded profile fetch");
                    return (false, ());
                }
                s.profile = match fetched {
                    Ok(profile) => Some(profile),
                    Err(err) => {
                        warn!(?err, %user_id, "failed to fetch profile");
                        None
                    }
                };
                s.loading = false;
                (true, ())
            })
        }
        .boxed()
    }

    /// Refetch on every session change. Each fetch runs on its own task so
    /// a slow backend never delays reacting to the next session.
    pub fn follow(&self, sessions: &SessionStore) -> JoinHandle<()> {
        let mut changes = sessions.subscribe();
        let store = self.clone();
        tokio::spawn(async move {
            while let Some(session) = changes.next().await {
                tokio::spawn(store.fetch_profile(session.as_ref()));
            }
        })
    }
}
