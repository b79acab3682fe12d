//! Geocode-on-type: watches an address field, waits for it to settle, looks
//! the address up and writes the first candidate into the owning form.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::Geocoder;
use crate::debounce::{DebounceState, Debouncer};
use crate::freshness::{Generation, Ticket};
use crate::model::Coordinates;
use crate::observable::{Observable, Subscription};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GeocodeStatus {
    #[default]
    Idle,
    Loading,
    Success,
    Error,
}

impl GeocodeStatus {
    /// Status line shown under the address field.
    pub fn hint(&self) -> &'static str {
        match self {
            GeocodeStatus::Idle => "Type the full address to locate it on the map.",
            GeocodeStatus::Loading => "Looking up address...",
            GeocodeStatus::Success => "Address found.",
            GeocodeStatus::Error => "Address not found.",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct GeocodeState {
    /// Settled address the current status refers to.
    pub address: String,
    pub status: GeocodeStatus,
    /// Last committed coordinates; kept when a later lookup finds nothing.
    pub coordinates: Option<Coordinates>,
}

/// Where committed coordinates go, normally the restaurant form.
pub trait CoordinateSink: Send + Sync + 'static {
    fn write_coordinates(&self, coordinates: Coordinates);
}

#[derive(Debug, Clone, Copy)]
pub struct GeocodeSettings {
    pub quiet: Duration,
    pub min_length: usize,
}

impl Default for GeocodeSettings {
    fn default() -> Self {
        Self {
            quiet: Duration::from_millis(500),
            min_length: 5,
        }
    }
}

/// One per mounted form. Dropping it cancels the pending debounce, stops the
/// driver and discards any lookup still in flight.
pub struct GeocodeController {
    debouncer: Debouncer<String>,
    driver: JoinHandle<()>,
    state: Observable<GeocodeState>,
    generation: Arc<Generation>,
}

#[derive(Clone)]
struct Driver {
    geocoder: Arc<dyn Geocoder>,
    sink: Arc<dyn CoordinateSink>,
    state: Observable<GeocodeState>,
    generation: Arc<Generation>,
    min_length: usize,
}

impl GeocodeController {
    pub fn new(
        geocoder: Arc<dyn Geocoder>,
        sink: Arc<dyn CoordinateSink>,
        settings: GeocodeSettings,
    ) -> Self {
        Self::start(geocoder, sink, settings, DebounceState::new(settings.quiet), GeocodeState::default())
    }

    /// For editing an existing restaurant: the stored address and coordinates
    /// count as already resolved, so mounting the form triggers no lookup.
    pub fn with_existing(
        geocoder: Arc<dyn Geocoder>,
        sink: Arc<dyn CoordinateSink>,
        settings: GeocodeSettings,
        address: String,
        coordinates: Option<Coordinates>,
    ) -> Self {
        let initial = GeocodeState {
            address: address.clone(),
            status: GeocodeStatus::Idle,
            coordinates,
        };
        Self::start(
            geocoder,
            sink,
            settings,
            DebounceState::with_committed(settings.quiet, address),
            initial,
        )
    }

    fn start(
        geocoder: Arc<dyn Geocoder>,
        sink: Arc<dyn CoordinateSink>,
        settings: GeocodeSettings,
        debounce: DebounceState<String>,
        initial: GeocodeState,
    ) -> Self {
        let state = Observable::new(initial);
        let generation = Arc::new(Generation::new());
        let (debouncer, settled) = Debouncer::spawn_with(debounce);
        let driver = Driver {
            geocoder,
            sink,
            state: state.clone(),
            generation: Arc::clone(&generation),
            min_length: settings.min_length.max(1),
        };
        let driver = tokio::spawn(driver.run(settled));
        Self {
            debouncer,
            driver,
            state,
            generation,
        }
    }

    /// Every keystroke in the address field. After a failed lookup the same
    /// address may settle again, so retyping it retries.
    pub fn address_changed(&self, text: impl Into<String>) {
        if self.status() == GeocodeStatus::Error {
            self.debouncer.forget();
        }
        self.debouncer.push(text.into());
    }

    pub fn state(&self) -> GeocodeState {
        self.state.get()
    }

    pub fn status(&self) -> GeocodeStatus {
        self.state.with(|s| s.status)
    }

    pub fn subscribe(&self) -> Subscription<GeocodeState> {
        self.state.subscribe()
    }
}

impl Drop for GeocodeController {
    fn drop(&mut self) {
        self.driver.abort();
        self.generation.advance();
    }
}

impl Driver {
    async fn run(self, mut settled: mpsc::UnboundedReceiver<String>) {
        while let Some(address) = settled.recv().await {
            self.on_settled(address);
        }
    }

    fn on_settled(&self, address: String) {
        if address.trim().chars().count() < self.min_length {
            self.state.update(|s| {
                self.generation.advance();
                s.address = address;
                s.status = GeocodeStatus::Idle;
            });
            return;
        }

        let ticket = self.state.update(|s| {
            let ticket = self.generation.advance();
            s.address = address.clone();
            s.status = GeocodeStatus::Loading;
            ticket
        });
        debug!(address, ticket = ticket.id(), "geocoding settled address");

        let this = self.clone();
        tokio::spawn(async move {
            let outcome = this.geocoder.lookup(&address).await;
            this.commit(ticket, &address, outcome);
        });
    }

    fn commit(&self, ticket: Ticket, address: &str, outcome: Result<Vec<Coordinates>>) {
        self.state.update_if(|s| {
            if !self.generation.is_current(ticket) {
                debug!(address, "discarding stale geocoding result");
                return (false, ());
            }
            match outcome {
                Ok(candidates) => match candidates.first() {
                    Some(first) => {
                        self.sink.write_coordinates(*first);
                        s.coordinates = Some(*first);
                        s.status = GeocodeStatus::Success;
                    }
                    None => {
                        debug!(address, "no geocoding candidates");
                        s.status = GeocodeStatus::Error;
                    }
                },
                Err(err) => {
                    warn!(?err, address, "geocoding lookup failed");
                    s.status = GeocodeStatus::Error;
                }
            }
            (true, ())
        })
    }
}
