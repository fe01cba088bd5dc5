use std::fmt;
use tokio::sync::watch;
use tracing::debug;

/// Screens of the client, mirroring the application's routing table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Login,
    Register,
    Dashboard,
    Patients,
    PatientDetail(i64),
    Analysis,
    Guidelines,
    Literature,
    Profile,
    NotFound,
}

impl Route {
    /// Reachable without a session
    pub fn is_public(&self) -> bool {
        matches!(self, Route::Login | Route::Register | Route::NotFound)
    }

    pub fn path(&self) -> String {
        match self {
            Route::Login => "/login".to_string(),
            Route::Register => "/register".to_string(),
            Route::Dashboard => "/".to_string(),
            Route::Patients => "/patients".to_string(),
            Route::PatientDetail(id) => format!("/patients/{}", id),
            Route::Analysis => "/analysis".to_string(),
            Route::Guidelines => "/guidelines".to_string(),
            Route::Literature => "/literature".to_string(),
            Route::Profile => "/profile".to_string(),
            Route::NotFound => "/404".to_string(),
        }
    }

    pub fn parse(path: &str) -> Route {
        let trimmed = path.trim().trim_end_matches('/');
        let segments: Vec<&str> = trimmed.split('/').filter(|s| !s.is_empty()).collect();

        match segments.as_slice() {
            [] => Route::Dashboard,
            ["login"] => Route::Login,
            ["register"] => Route::Register,
            ["patients"] => Route::Patients,
            ["patients", id] => id
                .parse::<i64>()
                .map(Route::PatientDetail)
                .unwrap_or(Route::NotFound),
            ["analysis"] => Route::Analysis,
            ["guidelines"] => Route::Guidelines,
            ["literature"] => Route::Literature,
            ["profile"] => Route::Profile,
            _ => Route::NotFound,
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

/// Holds the current location. Every navigation notifies subscribers, even
/// when the target equals the current route.
#[derive(Debug)]
pub struct Navigator {
    location: watch::Sender<Route>,
}

impl Navigator {
    pub fn new(initial: Route) -> Self {
        let (location, _) = watch::channel(initial);
        Self { location }
    }

    /// Replaces the current location; there is no back stack.
    pub fn navigate(&self, route: Route) {
        debug!("Navigating to {}", route);
        self.location.send_replace(route);
    }

    pub fn current(&self) -> Route {
        self.location.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Route> {
        self.location.subscribe()
    }
}

impl Default for Navigator {
    fn default() -> Self {
        Self::new(Route::Dashboard)
    }
}
