use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

use crate::navigation::{Navigator, Route};
use crate::session::{Session, SessionStatus, SessionStore};

/// What the shell should show for a location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardOutcome {
    /// Session still initializing: show a neutral placeholder, nothing else
    Loading,
    /// Not reachable; the requested location is discarded
    Redirect(Route),
    Render(Route),
}

/// Pure reachability decision.
pub fn evaluate(status: SessionStatus, requested: &Route) -> GuardOutcome {
    if requested.is_public() {
        return GuardOutcome::Render(requested.clone());
    }
    match status {
        SessionStatus::Initializing => GuardOutcome::Loading,
        SessionStatus::Unauthenticated => GuardOutcome::Redirect(Route::Login),
        SessionStatus::Authenticated => GuardOutcome::Render(requested.clone()),
    }
}

/// Re-evaluates reachability on every navigation and every session change.
pub struct RouteGuard {
    session: watch::Receiver<Session>,
    location: watch::Receiver<Route>,
    navigator: Arc<Navigator>,
}

impl RouteGuard {
    pub fn new(store: &SessionStore) -> Self {
        let navigator = store.navigator();
        Self {
            session: store.subscribe(),
            location: navigator.subscribe(),
            navigator,
        }
    }

    /// Evaluates the current location. A redirect replaces the navigator's
    /// location with the login screen.
    pub fn current(&mut self) -> GuardOutcome {
        let status = self.session.borrow_and_update().status();
        let requested = self.location.borrow_and_update().clone();

        let outcome = evaluate(status, &requested);
        if let GuardOutcome::Redirect(target) = &outcome {
            info!("{} is not reachable, redirecting to {}", requested, target);
            self.navigator.navigate(target.clone());
            // the redirect itself is not a change worth reporting again
            self.location.borrow_and_update();
        }
        outcome
    }

    /// Waits for the next navigation or session change, then evaluates.
    /// Returns the current outcome right away if either source is gone.
    pub async fn changed(&mut self) -> GuardOutcome {
        tokio::select! {
            res = self.session.changed() => { let _ = res; }
            res = self.location.changed() => { let _ = res; }
        }
        self.current()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{ApiGateway, Method};
    use crate::mock::ScriptedTransport;
    use crate::storage::InMemoryTokenStore;
    use serde_json::json;

    #[test]
    fn test_evaluate_table() {
        use SessionStatus::*;
        assert_eq!(evaluate(Initializing, &Route::Analysis), GuardOutcome::Loading);
        assert_eq!(
            evaluate(Unauthenticated, &Route::Analysis),
            GuardOutcome::Redirect(Route::Login)
        );
        assert_eq!(
            evaluate(Authenticated, &Route::Analysis),
            GuardOutcome::Render(Route::Analysis)
        );
        assert_eq!(
            evaluate(Initializing, &Route::Login),
            GuardOutcome::Render(Route::Login)
        );
        assert_eq!(
            evaluate(Unauthenticated, &Route::Register),
            GuardOutcome::Render(Route::Register)
        );
    }

    fn fixture(token: Option<&str>) -> (Arc<ScriptedTransport>, SessionStore, Arc<Navigator>) {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond(
            Method::Get,
            "/users/me",
            200,
            json!({"id": 1, "full_name": "Nurse Zhao", "email": "zhao@clinic.cn", "role": "user"}),
        );
        let tokens = match token {
            Some(t) => InMemoryTokenStore::with_token(t),
            None => InMemoryTokenStore::new(),
        };
        let gateway = Arc::new(ApiGateway::new(transport.clone(), Arc::new(tokens)));
        let navigator = Arc::new(Navigator::new(Route::Analysis));
        let store = SessionStore::new(gateway, navigator.clone());
        (transport, store, navigator)
    }

    #[tokio::test]
    async fn test_loading_until_initialized() {
        let (_, store, _) = fixture(Some("t"));
        let mut guard = RouteGuard::new(&store);

        assert_eq!(guard.current(), GuardOutcome::Loading);
        store.initialize().await;
        assert_eq!(guard.current(), GuardOutcome::Render(Route::Analysis));
    }

    #[tokio::test]
    async fn test_unauthenticated_redirect_discards_requested_location() {
        let (_, store, navigator) = fixture(None);
        store.initialize().await;
        let mut guard = RouteGuard::new(&store);

        assert_eq!(guard.current(), GuardOutcome::Redirect(Route::Login));
        assert_eq!(navigator.current(), Route::Login);
        assert_eq!(guard.current(), GuardOutcome::Render(Route::Login));
    }

    #[tokio::test]
    async fn test_logout_revokes_displayed_screen() {
        let (_, store, navigator) = fixture(Some("t"));
        store.initialize().await;
        let mut guard = RouteGuard::new(&store);
        assert_eq!(guard.current(), GuardOutcome::Render(Route::Analysis));

        navigator.navigate(Route::Patients);
        assert_eq!(guard.changed().await, GuardOutcome::Render(Route::Patients));

        store.logout().await;
        assert_eq!(guard.changed().await, GuardOutcome::Render(Route::Login));
    }
}
