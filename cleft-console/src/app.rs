use anyhow::{Context, Result, anyhow, bail};
use std::sync::Arc;
use tracing::{debug, info};

use cleft_client::{
    AnalysisOrchestrator, ApiGateway, AuthOutcome, ClientConfig, GuardOutcome, LiteratureQuery,
    Navigator, RegistrationForm, Route, RouteGuard, SessionStore, SubmitOutcome, render_result,
};

/// One command-line invocation: the gateway, the session and a navigator
/// standing in for the browser location.
pub struct App {
    gateway: Arc<ApiGateway>,
    navigator: Arc<Navigator>,
    session: SessionStore,
}

impl App {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let gateway = ApiGateway::from_config(config)
            .with_context(|| format!("Failed to create client for {}", config.api_base_url))?;
        debug!("Using API at {}", config.api_base_url);
        Ok(Self::with_gateway(Arc::new(gateway)))
    }

    pub fn with_gateway(gateway: Arc<ApiGateway>) -> Self {
        let navigator = Arc::new(Navigator::default());
        let session = SessionStore::new(gateway.clone(), navigator.clone());
        Self {
            gateway,
            navigator,
            session,
        }
    }

    /// Restores the session and checks that `route` may be shown.
    async fn enter(&self, route: Route) -> Result<()> {
        self.session.initialize().await;
        self.navigator.navigate(route);

        let mut guard = RouteGuard::new(&self.session);
        match guard.current() {
            GuardOutcome::Render(_) => Ok(()),
            GuardOutcome::Redirect(_) => {
                bail!("Not signed in. Run `cleft-console login` first")
            }
            GuardOutcome::Loading => bail!("Session is still initializing"),
        }
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<()> {
        self.enter(Route::Login).await?;
        match self.session.login(email, password).await {
            AuthOutcome::Success(user) => {
                println!("Signed in as {} <{}>", user.full_name, user.email);
                Ok(())
            }
            AuthOutcome::Failure { message } => Err(anyhow!(message)),
        }
    }

    pub async fn logout(&self) -> Result<()> {
        self.session.logout().await;
        println!("Signed out");
        Ok(())
    }

    pub async fn register(
        &self,
        full_name: String,
        email: String,
        password: String,
        confirm_password: String,
    ) -> Result<()> {
        self.enter(Route::Register).await?;
        let form = RegistrationForm {
            full_name,
            email,
            password,
            confirm_password,
        };
        let request = form
            .validate()
            .map_err(|errors| anyhow!("Invalid registration: {}", errors))?;

        match self.session.register(&request).await {
            AuthOutcome::Success(user) => {
                println!("Account created for {}. Sign in to continue.", user.email);
                Ok(())
            }
            AuthOutcome::Failure { message } => Err(anyhow!(message)),
        }
    }

    pub async fn whoami(&self) -> Result<()> {
        self.enter(Route::Profile).await?;
        let user = self
            .session
            .current_user()
            .ok_or_else(|| anyhow!("No user loaded"))?;
        println!("{} <{}> ({})", user.full_name, user.email, user.role);
        Ok(())
    }

    pub async fn patients(&self, page: u64, size: u64) -> Result<()> {
        self.enter(Route::Patients).await?;
        let patients = self.gateway.list_patients(page, size).await?;
        if patients.items.is_empty() {
            println!("No patients");
        }
        for p in &patients.items {
            println!(
                "#{:<5} {:<20} {:>4} {}  {}",
                p.id,
                p.name,
                p.age,
                p.gender,
                p.symptoms.join(", ")
            );
        }
        println!("page {} of {} ({} total)", patients.page, patients.pages.unwrap_or(1), patients.total);
        Ok(())
    }

    pub async fn analyze(
        &self,
        symptoms: String,
        age: String,
        gender: String,
        medical_history: String,
        family_history: String,
    ) -> Result<()> {
        self.enter(Route::Analysis).await?;
        let screen = AnalysisOrchestrator::new(self.gateway.clone());
        screen.edit_draft(|draft| {
            draft.symptoms = symptoms;
            draft.age = age;
            draft.gender = gender;
            draft.medical_history = medical_history;
            draft.family_history = family_history;
        });
        report(screen.submit_draft().await)
    }

    pub async fn analyze_patient(&self, patient_id: i64) -> Result<()> {
        self.enter(Route::Analysis).await?;
        let patient = self.gateway.get_patient(patient_id).await?;
        let screen = AnalysisOrchestrator::new(self.gateway.clone());
        screen.bind_patient(&patient);
        info!("Analyzing stored record for {}", patient.name);
        report(screen.analyze_bound_patient().await)
    }

    pub async fn analyses(&self, patient_id: Option<i64>, page: u64, size: u64) -> Result<()> {
        self.enter(Route::Dashboard).await?;
        let analyses = self.gateway.list_analyses(page, size, patient_id).await?;
        if analyses.items.is_empty() {
            println!("No analyses");
        }
        for a in &analyses.items {
            println!(
                "#{:<5} patient #{:<5} {}  {} ({})",
                a.id,
                a.patient_id,
                a.analyzed_at.format("%Y-%m-%d %H:%M"),
                a.result.cleft_type,
                a.result.severity
            );
        }
        Ok(())
    }

    pub async fn guidelines(&self, page: u64, size: u64) -> Result<()> {
        self.enter(Route::Guidelines).await?;
        let guidelines = self.gateway.list_guidelines(page, size).await?;
        for g in &guidelines.items {
            println!("[{}] {}", g.condition_id, g.title);
            if let Some(follow_up) = &g.follow_up {
                println!("    follow-up: {}", follow_up);
            }
        }
        Ok(())
    }

    pub async fn literature(&self, query: String, max_results: u32) -> Result<()> {
        self.enter(Route::Literature).await?;
        let mut search = LiteratureQuery::new(query);
        search.max_results = max_results;
        let results = self.gateway.search_literature(&search).await?;
        println!("{}", serde_json::to_string_pretty(&results)?);
        Ok(())
    }
}

fn report(outcome: SubmitOutcome) -> Result<()> {
    match outcome {
        SubmitOutcome::Succeeded(result) => {
            print!("{}", render_result(&result));
            Ok(())
        }
        SubmitOutcome::Failed(message) => Err(anyhow!(message)),
        SubmitOutcome::Invalid(errors) => Err(anyhow!("Invalid input: {}", errors)),
        SubmitOutcome::NotBound => Err(anyhow!("No patient selected")),
        SubmitOutcome::Busy | SubmitOutcome::Discarded => {
            Err(anyhow!("Analysis was not completed"))
        }
    }
}
