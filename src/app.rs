//! Process-wide wiring: builds the session and profile stores once, keeps
//! them in sync with the backend, and hands out per-view controllers.

use anyhow::{Context, Result};
use reqwest::Url;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;
use uuid::Uuid;

use crate::backend::{Backend, RestBackend, SqliteBackend};
use crate::config::{self, BackendKind, Config};
use crate::dashboard::{AdminDashboard, OwnerDashboard};
use crate::detail::RestaurantPage;
use crate::feed::FeedController;
use crate::form::RestaurantForm;
use crate::geocode::{GeocodeController, Geocoder, NominatimClient};
use crate::guard::{self, Route, RouteDecision};
use crate::map::MapController;
use crate::observable::Observable;
use crate::profile::ProfileStore;
use crate::reviews::ReviewsController;
use crate::session::SessionStore;

pub async fn connect_backend(cfg: &Config) -> Result<Arc<dyn Backend>> {
    match cfg.backend.kind {
        BackendKind::Sqlite => {
            let url = cfg.backend.resolved_database_url();
            let backend = SqliteBackend::connect(&url)
                .await
                .with_context(|| format!("failed to open {url}"))?;
            Ok(Arc::new(backend))
        }
        BackendKind::Rest => {
            let base = Url::parse(cfg.backend.rest_url.trim()).context("invalid backend.rest_url")?;
            let backend = RestBackend::new(
                base,
                cfg.backend.anon_key.clone(),
                cfg.backend.credentials_path(),
            )?;
            Ok(Arc::new(backend))
        }
    }
}

pub fn build_geocoder(cfg: &Config) -> Result<Arc<dyn Geocoder>> {
    let base = Url::parse(cfg.geocoding.base_url.trim()).context("invalid geocoding.base_url")?;
    let client = NominatimClient::with_base_url(&cfg.geocoding.user_agent, base)?;
    Ok(Arc::new(client))
}

pub struct App {
    settings: config::App,
    backend: Arc<dyn Backend>,
    geocoder: Arc<dyn Geocoder>,
    sessions: SessionStore,
    profiles: ProfileStore,
    tasks: Vec<JoinHandle<()>>,
}

impl App {
    /// Restore the session, then keep session and profile in sync with the
    /// backend until the app is dropped.
    pub async fn start(
        settings: config::App,
        backend: Arc<dyn Backend>,
        geocoder: Arc<dyn Geocoder>,
    ) -> Self {
        let sessions = SessionStore::new(Arc::clone(&backend));
        let profiles = ProfileStore::new(Arc::clone(&backend));

        // An auth event landing while `initialize` is in flight wins over it.
        let listener = sessions.listen();
        sessions.initialize().await;
        // Started after the session resolved so its first value is real.
        let follower = profiles.follow(&sessions);
        info!("app started");

        Self {
            settings,
            backend,
            geocoder,
            sessions,
            profiles,
            tasks: vec![listener, follower],
        }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn profiles(&self) -> &ProfileStore {
        &self.profiles
    }

    pub fn backend(&self) -> Arc<dyn Backend> {
        Arc::clone(&self.backend)
    }

    pub fn route(&self, route: Route) -> RouteDecision {
        guard::resolve(route, self.sessions.current().as_ref(), &self.profiles.current())
    }

    pub fn feed(&self) -> FeedController {
        FeedController::new(Arc::clone(&self.backend), self.settings.page_size)
    }

    pub fn map(&self) -> MapController {
        MapController::new(Arc::clone(&self.backend), self.settings.map_filter_debounce())
    }

    /// Geocoding for a new restaurant form.
    pub fn geocoder_for(&self, form: &Observable<RestaurantForm>) -> GeocodeController {
        GeocodeController::new(
            Arc::clone(&self.geocoder),
            Arc::new(form.clone()),
            self.settings.geocode_settings(),
        )
    }

    /// Geocoding for a form pre-filled from an existing restaurant.
    pub fn geocoder_for_existing(&self, form: &Observable<RestaurantForm>) -> GeocodeController {
        let (address, coordinates) = form.with(|f| (f.address.clone(), f.coordinates()));
        GeocodeController::with_existing(
            Arc::clone(&self.geocoder),
            Arc::new(form.clone()),
            self.settings.geocode_settings(),
            address,
            coordinates,
        )
    }

    pub fn owner_dashboard(&self) -> OwnerDashboard {
        OwnerDashboard::new(Arc::clone(&self.backend), self.sessions.clone())
    }

    pub fn admin_dashboard(&self) -> AdminDashboard {
        AdminDashboard::new(Arc::clone(&self.backend), self.profiles.clone())
    }

    pub fn restaurant_page(&self, id: Uuid) -> RestaurantPage {
        RestaurantPage::new(Arc::clone(&self.backend), id)
    }

    pub fn reviews(&self, restaurant_id: Uuid) -> ReviewsController {
        ReviewsController::new(Arc::clone(&self.backend), self.sessions.clone(), restaurant_id)
    }
}

impl Drop for App {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}
