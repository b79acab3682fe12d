use anyhow::Result;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::backend::Backend;
use crate::freshness::Generation;
use crate::model::Session;
use crate::observable::{Observable, Subscription};

#[derive(Clone)]
pub struct SessionStore {
    backend: Arc<dyn Backend>,
    state: Observable<Option<Session>>,
    generation: Arc<Generation>,
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("session", &self.state.get())
            .finish_non_exhaustive()
    }
}

impl SessionStore {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            state: Observable::new(None),
            generation: Arc::new(Generation::new()),
        }
    }

    /// Restore the persisted session, if any. A failed lookup counts as
    /// signed out. An auth event applied while the lookup is in flight wins
    /// over the lookup's answer.
    #[instrument(skip_all)]
    pub async fn initialize(&self) {
        let ticket = self.generation.current();
        let session = match self.backend.current_session().await {
            Ok(session) => session,
            Err(err) => {
                warn!(?err, "failed to restore session; continuing signed out");
                None
            }
        };
        let signed_in = session.is_some();
        let applied = self.state.update_if(|current| {
            if !self.generation.is_current(ticket) {
                return (false, false);
            }
            self.generation.advance();
            *current = session;
            (true, true)
        });
        if applied {
            info!(signed_in, "session initialized");
        } else {
            debug!(signed_in, "session lookup superseded by an auth event");
        }
    }

    pub fn set_session(&self, session: Option<Session>) {
        debug!(user_id = ?session.as_ref().map(|s| s.user_id), "session changed");
        self.state.update(|current| {
            self.generation.advance();
            *current = session;
        });
    }

    pub fn current(&self) -> Option<Session> {
        self.state.get()
    }

    pub fn is_signed_in(&self) -> bool {
        self.state.with(Option::is_some)
    }

    pub fn subscribe(&self) -> Subscription<Option<Session>> {
        self.state.subscribe()
    }

    /// The backend announces the sign-out through its auth events, which
    /// clear the held session.
    pub async fn sign_out(&self) -> Result<()> {
        self.backend.sign_out().await
    }

    /// Forward backend auth events into the store, in emission order.
    pub fn listen(&self) -> JoinHandle<()> {
        let mut events = self.backend.auth_events();
        let store = self.clone();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(session) => store.set_session(session),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "auth events lagged; re-reading session");
                        store.initialize().await;
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }
}
