#![allow(dead_code)]

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use tokio::sync::{broadcast, oneshot};
use uuid::Uuid;

use restodir::backend::Backend;
use restodir::geocode::Geocoder;
use restodir::model::{
    Coordinates, NewReview, PageQuery, Profile, RestaurantDetail, RestaurantListing,
    RestaurantPin, RestaurantSummary, Review, Role, Session,
};

pub fn session_for(user_id: Uuid) -> Session {
    Session {
        access_token: format!("token-{user_id}"),
        refresh_token: None,
        expires_at: None,
        user_id,
        email: None,
    }
}

pub fn profile(role: Role, first_name: &str) -> Profile {
    Profile {
        id: Uuid::new_v4(),
        first_name: Some(first_name.into()),
        last_name: None,
        role,
        cnpj: None,
    }
}

pub fn restaurant(name: &str) -> RestaurantSummary {
    RestaurantSummary {
        id: Uuid::new_v4(),
        name: name.into(),
        description: None,
        image_url: None,
    }
}

/// In-memory backend whose responses can be held back and released in any
/// order through oneshot gates.
pub struct ScriptedBackend {
    restaurants: Mutex<Vec<RestaurantSummary>>,
    profiles: Mutex<HashMap<Uuid, Profile>>,
    session: Mutex<Option<Session>>,
    session_error: Mutex<bool>,
    page_gates: Mutex<HashMap<(Option<String>, usize), oneshot::Receiver<()>>>,
    profile_gates: Mutex<HashMap<Uuid, VecDeque<oneshot::Receiver<()>>>>,
    failing_offsets: Mutex<HashSet<usize>>,
    page_calls: Mutex<Vec<PageQuery>>,
    profile_calls: Mutex<Vec<Uuid>>,
    session_gates: Mutex<VecDeque<oneshot::Receiver<()>>>,
    session_lookups: Mutex<usize>,
    profile_list_gates: Mutex<VecDeque<oneshot::Receiver<()>>>,
    review_gates: Mutex<VecDeque<oneshot::Receiver<()>>>,
    details: Mutex<HashMap<Uuid, RestaurantDetail>>,
    reviews: Mutex<Vec<Review>>,
    failing_reviews: Mutex<bool>,
    events: Mutex<Option<broadcast::Sender<Option<Session>>>>,
}

impl Default for ScriptedBackend {
    fn default() -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            restaurants: Mutex::default(),
            profiles: Mutex::default(),
            session: Mutex::default(),
            session_error: Mutex::new(false),
            page_gates: Mutex::default(),
            profile_gates: Mutex::default(),
            failing_offsets: Mutex::default(),
            page_calls: Mutex::default(),
            profile_calls: Mutex::default(),
            session_gates: Mutex::default(),
            session_lookups: Mutex::default(),
            profile_list_gates: Mutex::default(),
            review_gates: Mutex::default(),
            details: Mutex::default(),
            reviews: Mutex::default(),
            failing_reviews: Mutex::new(false),
            events: Mutex::new(Some(events)),
        }
    }
}

impl ScriptedBackend {
    /// Restaurants in newest-first order.
    pub fn with_restaurants(restaurants: Vec<RestaurantSummary>) -> Self {
        let backend = Self::default();
        *backend.restaurants.lock().unwrap() = restaurants;
        backend
    }

    pub fn add_profile(&self, profile: &Profile) {
        self.profiles
            .lock()
            .unwrap()
            .insert(profile.id, profile.clone());
    }

    pub fn set_persisted_session(&self, session: Option<Session>) {
        *self.session.lock().unwrap() = session;
    }

    pub fn fail_session_lookup(&self) {
        *self.session_error.lock().unwrap() = true;
    }

    pub fn emit(&self, session: Option<Session>) {
        *self.session.lock().unwrap() = session.clone();
        if let Some(events) = self.events.lock().unwrap().as_ref() {
            let _ = events.send(session);
        }
    }

    /// Drop the auth event sender; listeners drain the backlog and stop.
    pub fn close_auth_events(&self) {
        self.events.lock().unwrap().take();
    }

    /// Hold the next session lookup. The lookup answers with the session
    /// persisted when it started, like a request already on the wire.
    pub fn hold_session_lookup(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.session_gates.lock().unwrap().push_back(rx);
        tx
    }

    pub fn session_lookups(&self) -> usize {
        *self.session_lookups.lock().unwrap()
    }

    /// Hold the next `list_profiles` call.
    pub fn hold_profile_list(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.profile_list_gates.lock().unwrap().push_back(rx);
        tx
    }

    /// Hold the next `fetch_reviews` call.
    pub fn hold_reviews(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.review_gates.lock().unwrap().push_back(rx);
        tx
    }

    pub fn add_detail(&self, detail: RestaurantDetail) {
        self.details.lock().unwrap().insert(detail.id, detail);
    }

    pub fn fail_reviews(&self, failing: bool) {
        *self.failing_reviews.lock().unwrap() = failing;
    }

    pub fn stored_reviews(&self) -> Vec<Review> {
        self.reviews.lock().unwrap().clone()
    }

    /// Hold the page request for `search` at `offset` until the sender fires.
    pub fn hold_page(&self, search: Option<&str>, offset: usize) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.page_gates
            .lock()
            .unwrap()
            .insert((search.map(str::to_string), offset), rx);
        tx
    }

    pub fn fail_page(&self, offset: usize) {
        self.failing_offsets.lock().unwrap().insert(offset);
    }

    /// Hold the next profile fetch for `user_id`.
    pub fn hold_profile(&self, user_id: Uuid) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.profile_gates
            .lock()
            .unwrap()
            .entry(user_id)
            .or_default()
            .push_back(rx);
        tx
    }

    pub fn page_calls(&self) -> Vec<PageQuery> {
        self.page_calls.lock().unwrap().clone()
    }

    pub fn profile_calls(&self) -> Vec<Uuid> {
        self.profile_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Backend for ScriptedBackend {
    async fn current_session(&self) -> Result<Option<Session>> {
        *self.session_lookups.lock().unwrap() += 1;
        let answer = if *self.session_error.lock().unwrap() {
            Err(anyhow!("auth service unavailable"))
        } else {
            Ok(self.session.lock().unwrap().clone())
        };
        let gate = self.session_gates.lock().unwrap().pop_front();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        answer
    }

    fn auth_events(&self) -> broadcast::Receiver<Option<Session>> {
        match self.events.lock().unwrap().as_ref() {
            Some(events) => events.subscribe(),
            None => broadcast::channel(1).1,
        }
    }

    async fn sign_out(&self) -> Result<()> {
        self.emit(None);
        Ok(())
    }

    async fn fetch_profile(&self, user_id: Uuid) -> Result<Profile> {
        self.profile_calls.lock().unwrap().push(user_id);
        let gate = self
            .profile_gates
            .lock()
            .unwrap()
            .get_mut(&user_id)
            .and_then(VecDeque::pop_front);
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        self.profiles
            .lock()
            .unwrap()
            .get(&user_id)
            .cloned()
            .ok_or_else(|| anyhow!("profile {user_id} not found"))
    }

    async fn fetch_restaurants(&self, query: &PageQuery) -> Result<Vec<RestaurantSummary>> {
        self.page_calls.lock().unwrap().push(query.clone());
        let gate = self
            .page_gates
            .lock()
            .unwrap()
            .remove(&(query.search.clone(), query.offset));
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        if self.failing_offsets.lock().unwrap().contains(&query.offset) {
            return Err(anyhow!("backend unavailable"));
        }
        Ok(self
            .restaurants
            .lock()
            .unwrap()
            .iter()
            .filter(|r| query.matches(&r.name))
            .skip(query.offset)
            .take(query.limit)
            .cloned()
            .collect())
    }

    async fn fetch_owned_restaurants(&self, _owner_id: Uuid) -> Result<Vec<RestaurantSummary>> {
        Ok(self.restaurants.lock().unwrap().clone())
    }

    async fn fetch_map_pins(&self) -> Result<Vec<RestaurantPin>> {
        Ok(Vec::new())
    }

    async fn delete_restaurant(&self, id: Uuid) -> Result<()> {
        let mut all = self.restaurants.lock().unwrap();
        let before = all.len();
        all.retain(|r| r.id != id);
        if all.len() == before {
            return Err(anyhow!("restaurant {id} not found"));
        }
        Ok(())
    }

    async fn list_profiles(&self) -> Result<Vec<Profile>> {
        let snapshot: Vec<Profile> = self.profiles.lock().unwrap().values().cloned().collect();
        let gate = self.profile_list_gates.lock().unwrap().pop_front();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        Ok(snapshot)
    }

    async fn delete_profile(&self, id: Uuid) -> Result<()> {
        self.profiles
            .lock()
            .unwrap()
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| anyhow!("profile {id} not found"))
    }

    async fn list_restaurant_listings(&self) -> Result<Vec<RestaurantListing>> {
        Ok(Vec::new())
    }

    async fn fetch_restaurant(&self, id: Uuid) -> Result<Option<RestaurantDetail>> {
        Ok(self.details.lock().unwrap().get(&id).cloned())
    }

    async fn fetch_reviews(&self, restaurant_id: Uuid) -> Result<Vec<Review>> {
        let snapshot: Vec<Review> = self
            .reviews
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.restaurant_id == restaurant_id)
            .cloned()
            .collect();
        let gate = self.review_gates.lock().unwrap().pop_front();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        if *self.failing_reviews.lock().unwrap() {
            bail!("reviews unavailable");
        }
        Ok(snapshot)
    }

    async fn insert_review(&self, review: &NewReview) -> Result<Review> {
        if *self.failing_reviews.lock().unwrap() {
            bail!("reviews unavailable");
        }
        let author = self.profiles.lock().unwrap().get(&review.user_id).cloned();
        let stored = Review {
            id: Uuid::new_v4(),
            restaurant_id: review.restaurant_id,
            rating: review.rating,
            comment: review.comment.clone(),
            created_at: Utc::now(),
            reviewer_first_name: author.as_ref().and_then(|p| p.first_name.clone()),
            reviewer_last_name: author.and_then(|p| p.last_name),
        };
        self.reviews.lock().unwrap().insert(0, stored.clone());
        Ok(stored)
    }
}

/// Geocoder with canned answers per address and optional gates.
#[derive(Default)]
pub struct ScriptedGeocoder {
    answers: Mutex<HashMap<String, std::result::Result<Vec<Coordinates>, String>>>,
    gates: Mutex<HashMap<String, oneshot::Receiver<()>>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedGeocoder {
    pub fn answer(&self, address: &str, candidates: Vec<Coordinates>) {
        self.answers
            .lock()
            .unwrap()
            .insert(address.to_string(), Ok(candidates));
    }

    pub fn fail(&self, address: &str) {
        self.answers
            .lock()
            .unwrap()
            .insert(address.to_string(), Err("connection reset".into()));
    }

    pub fn hold(&self, address: &str) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.gates.lock().unwrap().insert(address.to_string(), rx);
        tx
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Geocoder for ScriptedGeocoder {
    async fn lookup(&self, address: &str) -> Result<Vec<Coordinates>> {
        self.calls.lock().unwrap().push(address.to_string());
        let gate = self.gates.lock().unwrap().remove(address);
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        match self.answers.lock().unwrap().get(address) {
            Some(Ok(candidates)) => Ok(candidates.clone()),
            Some(Err(msg)) => Err(anyhow!("{msg}")),
            None => Ok(Vec::new()),
        }
    }
}

pub fn coords(latitude: f64, longitude: f64) -> Coordinates {
    Coordinates {
        latitude,
        longitude,
    }
}
