use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cleft_client::ClientConfig;

mod app;

use app::App;

#[derive(Parser)]
#[command(name = "cleft-console")]
#[command(about = "Terminal client for the cleft lip/palate decision-support service")]
struct Cli {
    /// Override CLEFT_API_BASE_URL
    #[arg(long, global = true)]
    api_base_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sign in and keep the session token on disk
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Forget the stored session
    Logout,
    /// Create an account; does not sign in
    Register {
        #[arg(long)]
        full_name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        confirm_password: String,
    },
    /// Show the signed-in user
    Whoami,
    /// List patients
    Patients {
        #[arg(long, default_value_t = 1)]
        page: u64,
        #[arg(long, default_value_t = 20)]
        size: u64,
    },
    /// Stateless analysis of the given findings
    Analyze {
        /// Comma-separated, e.g. "cleft lip, feeding difficulty"
        #[arg(long)]
        symptoms: String,
        #[arg(long)]
        age: String,
        /// 男 or 女
        #[arg(long)]
        gender: String,
        #[arg(long, default_value = "")]
        medical_history: String,
        #[arg(long, default_value = "")]
        family_history: String,
    },
    /// Analyze a stored patient and save the result to their record
    AnalyzePatient { patient_id: i64 },
    /// Recent stored analyses, optionally for one patient
    Analyses {
        #[arg(long)]
        patient_id: Option<i64>,
        #[arg(long, default_value_t = 1)]
        page: u64,
        #[arg(long, default_value_t = 5)]
        size: u64,
    },
    /// List clinical guidelines
    Guidelines {
        #[arg(long, default_value_t = 1)]
        page: u64,
        #[arg(long, default_value_t = 20)]
        size: u64,
    },
    /// Search the literature
    Literature {
        query: String,
        #[arg(long, default_value_t = 10)]
        max_results: u32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cleft_console=info,cleft_client=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let mut config = ClientConfig::from_env().context("Failed to load client configuration")?;
    if let Some(url) = &cli.api_base_url {
        config = config
            .with_base_url(url)
            .context("Invalid --api-base-url")?;
    }

    let app = App::new(&config)?;

    match cli.command {
        Command::Login { email, password } => app.login(&email, &password).await,
        Command::Logout => app.logout().await,
        Command::Register {
            full_name,
            email,
            password,
            confirm_password,
        } => {
            app.register(full_name, email, password, confirm_password)
                .await
        }
        Command::Whoami => app.whoami().await,
        Command::Patients { page, size } => app.patients(page, size).await,
        Command::Analyze {
            symptoms,
            age,
            gender,
            medical_history,
            family_history,
        } => {
            app.analyze(symptoms, age, gender, medical_history, family_history)
                .await
        }
        Command::AnalyzePatient { patient_id } => app.analyze_patient(patient_id).await,
        Command::Analyses {
            patient_id,
            page,
            size,
        } => app.analyses(patient_id, page, size).await,
        Command::Guidelines { page, size } => app.guidelines(page, size).await,
        Command::Literature { query, max_results } => app.literature(query, max_results).await,
    }
}
