mod common;

use std::sync::Arc;

use common::{profile, restaurant, session_for, ScriptedBackend};
use restodir::dashboard::{AdminDashboard, OwnerDashboard};
use restodir::model::Role;
use restodir::profile::{Access, ProfileStore};
use restodir::session::SessionStore;

async fn signed_in_admin(backend: &Arc<ScriptedBackend>) -> ProfileStore {
    let admin = profile(Role::Admin, "Arthur");
    backend.add_profile(&admin);
    let profiles = ProfileStore::new(backend.clone());
    profiles.fetch_profile(Some(&session_for(admin.id))).await;
    profiles
}

#[tokio::test]
async fn overtaken_admin_refresh_keeps_newer_lists() {
    let backend = Arc::new(ScriptedBackend::default());
    let profiles = signed_in_admin(&backend).await;
    let dashboard = AdminDashboard::new(backend.clone(), profiles);
    let release_first = backend.hold_profile_list();
    let newcomer = profile(Role::User, "Nina");

    let (first, second) = tokio::join!(dashboard.refresh(), async {
        backend.add_profile(&newcomer);
        let access = dashboard.refresh().await;
        assert_eq!(dashboard.users().items.len(), 2);
        release_first.send(()).unwrap();
        access
    });

    assert_eq!((first, second), (Access::Granted, Access::Granted));
    let users = dashboard.users();
    assert!(!users.loading);
    assert_eq!(users.items.len(), 2);
    assert!(users.items.iter().any(|p| p.id == newcomer.id));
    assert!(!dashboard.restaurants().loading);
}

#[tokio::test]
async fn admin_dashboard_waits_for_profile() {
    let backend = Arc::new(ScriptedBackend::default());
    let dashboard = AdminDashboard::new(backend.clone(), ProfileStore::new(backend.clone()));
    assert_eq!(dashboard.refresh().await, Access::Checking);
    assert!(dashboard.users().loading);
}

#[tokio::test]
async fn owner_dashboard_without_session_is_empty() {
    let backend = Arc::new(ScriptedBackend::with_restaurants(vec![restaurant("Bistro")]));
    let sessions = SessionStore::new(backend.clone());
    let dashboard = OwnerDashboard::new(backend.clone(), sessions.clone());

    dashboard.refresh().await;
    assert!(dashboard.state().items.is_empty());
    assert!(!dashboard.state().loading);

    sessions.set_session(Some(session_for(uuid::Uuid::new_v4())));
    dashboard.refresh().await;
    assert_eq!(dashboard.state().items.len(), 1);
}
