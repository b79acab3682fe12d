//! Client-side state synchronization for a restaurant directory.
//!
//! Session and profile stores gate navigation, the feed controller pages
//! through the directory with search, and the geocoding controller resolves
//! typed addresses into coordinates. Views read observable state and call
//! intent methods; the backend and geocoding services sit behind traits.

pub mod app;
pub mod backend;
pub mod config;
pub mod dashboard;
pub mod debounce;
pub mod detail;
pub mod feed;
pub mod form;
pub mod freshness;
pub mod geocode;
pub mod guard;
pub mod map;
pub mod model;
pub mod observable;
pub mod profile;
pub mod reviews;
pub mod session;
