use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::error;

use crate::backend::Backend;
use crate::debounce::{DebounceState, Debouncer};
use crate::model::RestaurantPin;
use crate::observable::{Observable, Subscription};

pub const DEFAULT_FILTER_QUIET: Duration = Duration::from_millis(300);

#[derive(Debug, Clone, PartialEq, Default)]
pub struct MapState {
    pub pins: Vec<RestaurantPin>,
    pub visible: Vec<RestaurantPin>,
    pub search: String,
    pub loading: bool,
}

fn filter_pins(pins: &[RestaurantPin], term: &str) -> Vec<RestaurantPin> {
    let term = term.trim().to_lowercase();
    if term.is_empty() {
        return pins.to_vec();
    }
    pins.iter()
        .filter(|p| p.name.to_lowercase().contains(&term))
        .cloned()
        .collect()
}

/// Pins with coordinates, filtered locally by a debounced name search.
pub struct MapController {
    backend: Arc<dyn Backend>,
    state: Observable<MapState>,
    debouncer: Debouncer<String>,
    driver: JoinHandle<()>,
}

impl MapController {
    pub fn new(backend: Arc<dyn Backend>, quiet: Duration) -> Self {
        let state = Observable::new(MapState {
            loading: true,
            ..MapState::default()
        });
        let (debouncer, mut settled) =
            Debouncer::spawn_with(DebounceState::with_committed(quiet, String::new()));
        let filtered = state.clone();
        let driver = tokio::spawn(async move {
            while let Some(term) = settled.recv().await {
                filtered.update(|s| {
                    s.visible = filter_pins(&s.pins, &term);
                    s.search = term;
                });
            }
        });
        Self {
            backend,
            state,
            debouncer,
            driver,
        }
    }

    pub async fn load(&self) {
        self.state.update(|s| s.loading = true);
        let pins = match self.backend.fetch_map_pins().await {
            Ok(pins) => pins,
            Err(err) => {
                error!(?err, "failed to fetch restaurants for map");
                Vec::new()
            }
        };
        self.state.update(|s| {
            s.visible = filter_pins(&pins, &s.search);
            s.pins = pins;
            s.loading = false;
        });
    }

    pub fn search_changed(&self, term: impl Into<String>) {
        self.debouncer.push(term.into());
    }

    pub fn state(&self) -> MapState {
        self.state.get()
    }

    pub fn subscribe(&self) -> Subscription<MapState> {
        self.state.subscribe()
    }
}

impl Drop for MapController {
    fn drop(&mut self) {
        self.driver.abort();
    }
}
