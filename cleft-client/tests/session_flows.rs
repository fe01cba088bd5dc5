use cleft_client::mock::ScriptedTransport;
use cleft_client::{
    ApiGateway, GuardOutcome, InMemoryTokenStore, Method, Navigator, Route, RouteGuard,
    SessionStatus, SessionStore,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;
use std::sync::Arc;

struct Harness {
    transport: Arc<ScriptedTransport>,
    tokens: Arc<InMemoryTokenStore>,
    gateway: Arc<ApiGateway>,
    navigator: Arc<Navigator>,
    store: SessionStore,
}

fn harness(tokens: InMemoryTokenStore) -> Harness {
    let transport = Arc::new(ScriptedTransport::new());
    transport.respond(
        Method::Get,
        "/users/me",
        200,
        json!({"id": 9, "full_name": "Dr. Sun", "email": "sun@clinic.cn", "role": "doctor"}),
    );
    let tokens = Arc::new(tokens);
    let gateway = Arc::new(ApiGateway::new(transport.clone(), tokens.clone()));
    let navigator = Arc::new(Navigator::new(Route::Patients));
    let store = SessionStore::new(gateway.clone(), navigator.clone());
    Harness {
        transport,
        tokens,
        gateway,
        navigator,
        store,
    }
}

fn assert_consistent(h: &Harness) {
    let session = h.store.snapshot();
    let authenticated = session.status() == SessionStatus::Authenticated;
    assert_eq!(authenticated, session.token().is_some());
    assert_eq!(authenticated, session.user().is_some());
    if authenticated {
        assert_eq!(h.tokens.peek().as_deref(), session.token());
    }
}

#[tokio::test]
async fn mid_session_revocation_redirects_to_login() {
    let h = harness(InMemoryTokenStore::with_token("stale"));
    h.transport
        .respond(Method::Get, "/patients", 401, json!({"detail": "Token expired"}));

    assert_eq!(h.store.initialize().await, SessionStatus::Authenticated);
    let mut guard = RouteGuard::new(&h.store);
    assert_eq!(guard.current(), GuardOutcome::Render(Route::Patients));

    let err = h.gateway.list_patients(1, 20).await.unwrap_err();

    assert!(err.is_unauthorized());
    assert_eq!(err.detail(), Some("Token expired"));
    assert_eq!(h.store.status(), SessionStatus::Unauthenticated);
    assert!(h.tokens.peek().is_none());
    assert_eq!(h.navigator.current(), Route::Login);
    assert_eq!(guard.current(), GuardOutcome::Render(Route::Login));

    h.navigator.navigate(Route::Patients);
    assert_eq!(guard.current(), GuardOutcome::Redirect(Route::Login));
}

#[tokio::test]
async fn failed_login_reports_backend_detail() {
    let h = harness(InMemoryTokenStore::new());
    h.transport.respond(
        Method::Post,
        "/users/login",
        401,
        json!({"detail": "邮箱或密码不正确"}),
    );
    h.store.initialize().await;

    let outcome = h.store.login("sun@clinic.cn", "wrong").await;

    assert_eq!(outcome.message(), Some("邮箱或密码不正确"));
    assert_eq!(h.store.status(), SessionStatus::Unauthenticated);
    assert!(h.tokens.peek().is_none());
}

#[tokio::test]
async fn session_stays_consistent_under_random_operations() {
    for seed in 0..25u64 {
        let mut rng = StdRng::seed_from_u64(seed);
        let start = if rng.gen_bool(0.5) {
            InMemoryTokenStore::with_token("persisted")
        } else {
            InMemoryTokenStore::new()
        };
        let h = harness(start);

        for step in 0..30u32 {
            match rng.gen_range(0..5) {
                0 => {
                    h.store.initialize().await;
                }
                1 => {
                    h.transport.respond_once(
                        Method::Post,
                        "/users/login",
                        200,
                        json!({"access_token": format!("tok-{}-{}", seed, step), "token_type": "bearer"}),
                    );
                    assert!(h.store.login("sun@clinic.cn", "correct-horse").await.is_success());
                }
                2 => {
                    h.transport.respond_once(
                        Method::Post,
                        "/users/login",
                        401,
                        json!({"detail": "bad credentials"}),
                    );
                    assert!(!h.store.login("sun@clinic.cn", "nope").await.is_success());
                }
                3 => {
                    h.store.logout().await;
                    assert_eq!(h.navigator.current(), Route::Login);
                }
                _ => {
                    h.transport.respond_once(Method::Get, "/patients", 401, json!({}));
                    let _ = h.gateway.list_patients(1, 20).await;
                    assert_eq!(h.store.status(), SessionStatus::Unauthenticated);
                    assert!(h.tokens.peek().is_none());
                }
            }
            assert_consistent(&h);
        }
    }
}
