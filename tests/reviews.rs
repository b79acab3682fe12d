mod common;

use std::sync::Arc;
use uuid::Uuid;

use common::{profile, session_for, ScriptedBackend};
use restodir::detail::{DetailState, RestaurantPage};
use restodir::form::{FormError, ReviewForm};
use restodir::model::{RestaurantDetail, Role};
use restodir::reviews::{ReviewsController, SubmitError};
use restodir::session::SessionStore;

fn detail(name: &str) -> RestaurantDetail {
    RestaurantDetail {
        id: Uuid::new_v4(),
        owner_id: None,
        name: name.into(),
        description: Some("Cozinha caseira".into()),
        address: Some("Rua Augusta 500".into()),
        cuisine: None,
        image_url: None,
        latitude: None,
        longitude: None,
    }
}

fn good_review(rating: u8) -> ReviewForm {
    ReviewForm {
        rating,
        comment: "Comida excelente e preço justo".into(),
    }
}

#[tokio::test]
async fn restaurant_page_reports_found_and_not_found() {
    let backend = Arc::new(ScriptedBackend::default());
    let casa = detail("Casa Nova");
    backend.add_detail(casa.clone());

    let page = RestaurantPage::new(backend.clone(), casa.id);
    assert_eq!(page.state(), DetailState::Loading);
    page.load().await;
    assert_eq!(page.state().restaurant(), Some(&casa));

    let missing = RestaurantPage::new(backend, Uuid::new_v4());
    missing.load().await;
    assert_eq!(missing.state(), DetailState::NotFound);
}

#[tokio::test]
async fn submitting_requires_a_valid_form_and_a_session() {
    let backend = Arc::new(ScriptedBackend::default());
    let sessions = SessionStore::new(backend.clone());
    let reviews = ReviewsController::new(backend.clone(), sessions.clone(), Uuid::new_v4());

    let err = reviews
        .submit(&ReviewForm {
            rating: 0,
            comment: "Comida excelente".into(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, SubmitError::Invalid(FormError::RatingOutOfRange)));

    let err = reviews.submit(&good_review(5)).await.unwrap_err();
    assert!(matches!(err, SubmitError::SignedOut));
    assert!(backend.stored_reviews().is_empty());
}

#[tokio::test]
async fn submitted_review_appears_first_with_author_name() {
    let backend = Arc::new(ScriptedBackend::default());
    let mut author = profile(Role::User, "Rita");
    author.last_name = Some("Souza".into());
    backend.add_profile(&author);
    let sessions = SessionStore::new(backend.clone());
    sessions.set_session(Some(session_for(author.id)));
    let restaurant_id = Uuid::new_v4();
    let reviews = ReviewsController::new(backend.clone(), sessions, restaurant_id);

    reviews.refresh().await;
    let empty = reviews.state();
    assert!(empty.items.is_empty());
    assert!(!empty.loading);

    reviews.submit(&good_review(3)).await.unwrap();
    let latest = reviews.submit(&good_review(5)).await.unwrap();
    let state = reviews.state();
    assert_eq!(state.items.len(), 2);
    assert_eq!(state.items[0], latest);
    assert_eq!(state.items[0].reviewer_name(), "Rita Souza");
    assert_eq!(state.items[0].restaurant_id, restaurant_id);
}

#[tokio::test]
async fn late_reload_does_not_hide_newer_reviews() {
    let backend = Arc::new(ScriptedBackend::default());
    let author = profile(Role::User, "Caio");
    backend.add_profile(&author);
    let sessions = SessionStore::new(backend.clone());
    sessions.set_session(Some(session_for(author.id)));
    let reviews = ReviewsController::new(backend.clone(), sessions, Uuid::new_v4());

    let release = backend.hold_reviews();
    let first = tokio::spawn(reviews.refresh());
    // Let the first reload read the (still empty) list before the submit.
    tokio::task::yield_now().await;
    reviews.submit(&good_review(4)).await.unwrap();
    assert_eq!(reviews.state().items.len(), 1);

    release.send(()).unwrap();
    first.await.unwrap();
    let state = reviews.state();
    assert_eq!(state.items.len(), 1);
    assert!(!state.loading);
}

#[tokio::test]
async fn failed_reload_keeps_listed_reviews() {
    let backend = Arc::new(ScriptedBackend::default());
    let author = profile(Role::User, "Lia");
    backend.add_profile(&author);
    let sessions = SessionStore::new(backend.clone());
    sessions.set_session(Some(session_for(author.id)));
    let reviews = ReviewsController::new(backend.clone(), sessions, Uuid::new_v4());
    reviews.submit(&good_review(2)).await.unwrap();

    backend.fail_reviews(true);
    reviews.refresh().await;
    let state = reviews.state();
    assert_eq!(state.items.len(), 1);
    assert!(!state.loading);

    let err = reviews.submit(&good_review(5)).await.unwrap_err();
    assert!(matches!(err, SubmitError::Backend(_)));
}
