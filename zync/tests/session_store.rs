//! Session flows through the store runtime: restore, logout, wallet, songs.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;
use zync::fixtures;
use zync::session::{
    AuthFuture, Authenticated, Authenticator, InMemoryDirectory, SessionAction, SessionEnvironment, SessionReducer,
    SessionState,
};
use zync::storage::{InMemoryTokenStorage, AUTH_TOKEN_KEY};
use zync::types::{Track, TrackId, User};
use zync::wallet::TopUpForm;
use zync::{AppDependencies, ZyncApp, ZyncConfig, ZyncError};
use zync_runtime::Store;
use zync_testing::test_clock;

const WAIT: Duration = Duration::from_secs(2);

type SessionStore = Store<SessionState, SessionAction, SessionEnvironment, SessionReducer>;

fn session_store(storage: InMemoryTokenStorage) -> SessionStore {
    Store::new(
        SessionState::new(),
        SessionReducer::new(),
        SessionEnvironment::new(
            Arc::new(InMemoryDirectory::development()),
            Arc::new(storage),
            Arc::new(test_clock()),
        ),
    )
}

/// Development directory that answers only after `delay`
struct SlowDirectory {
    inner: InMemoryDirectory,
    delay: Duration,
}

impl Authenticator for SlowDirectory {
    fn login(&self, identifier: String, secret: String) -> AuthFuture<Option<Authenticated>> {
        let answer = self.inner.login(identifier, secret);
        let delay = self.delay;
        Box::pin(async move {
            tokio::time::sleep(delay).await;
            answer.await
        })
    }

    fn current_user(&self, token: String) -> AuthFuture<User> {
        let answer = self.inner.current_user(token);
        let delay = self.delay;
        Box::pin(async move {
            tokio::time::sleep(delay).await;
            answer.await
        })
    }
}

fn app() -> ZyncApp {
    let config = ZyncConfig::default();
    let deps = AppDependencies::development(&config).with_clock(Arc::new(test_clock()));
    ZyncApp::new(&config, deps).unwrap()
}

fn track() -> Track {
    Track {
        id: TrackId::new("t1"),
        name: "Blue Monday".to_string(),
        artists: vec!["New Order".to_string()],
        album_name: "Power, Corruption & Lies".to_string(),
        album_images: Vec::new(),
        uri: "spotify:track:t1".to_string(),
    }
}

#[tokio::test]
async fn restore_resolves_a_stored_token() {
    let storage = InMemoryTokenStorage::with_value(AUTH_TOKEN_KEY, fixtures::DEVELOPMENT_TOKEN);
    let store = session_store(storage);

    store
        .send_and_wait_for(
            SessionAction::Restore,
            |a| matches!(a, SessionAction::Restored { .. }),
            WAIT,
        )
        .await
        .unwrap();

    let (authenticated, loading, email) = store
        .state(|s| {
            (
                s.is_authenticated(),
                s.is_loading(),
                s.user().map(|u| u.email.clone()),
            )
        })
        .await;
    assert!(authenticated);
    assert!(!loading);
    assert_eq!(email.as_deref(), Some("frank@zync.com"));
}

#[tokio::test]
async fn restore_discards_a_stale_token() {
    let storage = InMemoryTokenStorage::with_value(AUTH_TOKEN_KEY, "expired-token");
    let store = session_store(storage.clone());

    store
        .send_and_wait_for(
            SessionAction::Restore,
            |a| matches!(a, SessionAction::Restored { .. }),
            WAIT,
        )
        .await
        .unwrap();

    assert!(!store.state(SessionState::is_authenticated).await);
    assert_eq!(storage.peek(AUTH_TOKEN_KEY), None);
}

#[tokio::test]
async fn logout_during_restore_stays_signed_out() {
    let storage = InMemoryTokenStorage::with_value(AUTH_TOKEN_KEY, fixtures::DEVELOPMENT_TOKEN);
    let store: SessionStore = Store::new(
        SessionState::new(),
        SessionReducer::new(),
        SessionEnvironment::new(
            Arc::new(SlowDirectory {
                inner: InMemoryDirectory::development(),
                delay: Duration::from_millis(100),
            }),
            Arc::new(storage.clone()),
            Arc::new(test_clock()),
        ),
    );

    let restore = store.send_and_wait_for(
        SessionAction::Restore,
        |a| matches!(a, SessionAction::Restored { .. }),
        WAIT,
    );
    let logout = async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        store
            .send_and_wait_for(SessionAction::Logout, |a| matches!(a, SessionAction::SessionEnded), WAIT)
            .await
    };
    let (restored, ended) = tokio::join!(restore, logout);
    assert!(matches!(restored.unwrap(), SessionAction::Restored { session: None }));
    ended.unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;
    let (authenticated, loading) = store.state(|s| (s.is_authenticated(), s.is_loading())).await;
    assert!(!authenticated);
    assert!(!loading);
    assert_eq!(storage.peek(AUTH_TOKEN_KEY), None);
}

#[tokio::test]
async fn restore_without_token_is_a_no_op() {
    let app = app();
    assert!(!app.restore().await.unwrap());
    assert!(!app.session(SessionState::is_loading).await);
}

#[tokio::test]
async fn logout_publishes_session_ended_and_deletes_the_token() {
    let storage = InMemoryTokenStorage::new();
    let store = session_store(storage.clone());

    store
        .send_and_wait_for(
            SessionAction::Login {
                attempt: zync::types::LoginAttemptId::new(),
                identifier: "frank@zync.com".to_string(),
                secret: String::new(),
            },
            |a| matches!(a, SessionAction::LoginFinished { .. }),
            WAIT,
        )
        .await
        .unwrap();

    let ended = store
        .send_and_wait_for(
            SessionAction::Logout,
            |a| matches!(a, SessionAction::SessionEnded),
            WAIT,
        )
        .await
        .unwrap();

    assert!(matches!(ended, SessionAction::SessionEnded));
    assert!(!store.state(SessionState::is_authenticated).await);
    assert_eq!(storage.peek(AUTH_TOKEN_KEY), None);
}

#[tokio::test]
async fn wallet_rejects_overdraw_and_signed_out_calls() {
    let app = app();

    assert!(matches!(app.top_up(10).await, Err(ZyncError::Rejected(_))));

    assert!(app.login("frank@zync.com").await.unwrap());
    let mut form = TopUpForm::new();
    form.select_preset(100);
    assert_eq!(app.top_up_form(&form).await.unwrap(), 15100);

    form.set_custom("zero");
    assert!(app.top_up_form(&form).await.is_err());
    assert_eq!(app.session(SessionState::balance).await, 15100);
}

#[tokio::test]
async fn song_request_slot_is_single_and_paid() {
    let app = app();
    assert!(app.login("frank@zync.com").await.unwrap());

    app.request_song(track(), 5000).await.unwrap();
    let err = app.request_song(track(), 5000).await.unwrap_err();
    assert_eq!(err.to_string(), "A song request is already active");
    assert_eq!(app.session(SessionState::balance).await, 10000);

    app.clear_song_request().await.unwrap();
    assert!(app.session(|s| s.active_request().is_none()).await);

    let err = app.request_song(track(), 20000).await.unwrap_err();
    assert!(matches!(err, ZyncError::Rejected(_)));
    assert_eq!(app.session(SessionState::balance).await, 10000);
}

#[tokio::test]
async fn concurrent_song_requests_admit_exactly_one() {
    let app = app();
    assert!(app.login("frank@zync.com").await.unwrap());

    let attempts = (0..8).map(|_| {
        let app = app.clone();
        tokio::spawn(async move { app.request_song(track(), 1000).await.is_ok() })
    });
    let accepted = futures::future::join_all(attempts)
        .await
        .into_iter()
        .filter(|r| *r.as_ref().unwrap())
        .count();

    assert_eq!(accepted, 1);
    assert_eq!(app.session(SessionState::balance).await, 14000);
}

#[tokio::test]
async fn saved_cards_are_append_only() {
    let app = app();
    assert!(app.login("frank@zync.com").await.unwrap());

    let card = fixtures::users()[0].cards[0].clone();
    assert!(app.add_payment_method(card).await.is_err());
    assert_eq!(app.session(|s| s.user().map(|u| u.cards.len())).await, Some(2));
}
