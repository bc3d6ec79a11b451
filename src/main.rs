use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde_json::Value;
use vulnscan_session::config::{DEFAULT_BASE_URL, DEFAULT_STATE_DIR};
use vulnscan_session::{
    ApiError, AuthorizedClient, Identity, Navigator, Readiness, RouteGuard, SessionConfig, SessionError, SessionStore,
    Verdict,
};

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("{0}")]
    Session(#[from] SessionError),
    #[error("api call failed: {0}")]
    Api(#[from] ApiError),
    #[error("login required for {return_to}; run `vulnscan login` first")]
    LoginRequired { return_to: String },
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(name = "vulnscan", about = "Session client for the vulnerability scan service")]
struct Cli {
    #[arg(long, env = "VULNSCAN_BASE_URL", default_value = DEFAULT_BASE_URL)]
    base_url: String,

    #[arg(long, env = "VULNSCAN_STATE_DIR", default_value = DEFAULT_STATE_DIR)]
    state_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Log in and persist the session credential.
    Login {
        #[arg(long)]
        username: String,
        #[arg(long, env = "VULNSCAN_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Create an account and log in with it.
    Signup {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
        #[arg(long, env = "VULNSCAN_PASSWORD", hide_env_values = true)]
        password: String,
        #[arg(long, default_value = "")]
        full_name: String,
    },
    /// Forget the persisted credential.
    Logout,
    /// Show the identity behind the persisted credential.
    Whoami,
    /// Check whether an application route is reachable with the current session.
    Open { path: String },
    /// GET an API path with the session's bearer credential.
    Get { path: String },
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let cli = Cli::parse();
    let config =
        SessionConfig::new(cli.base_url, cli.state_dir).with_timeouts(SessionConfig::from_env().timeouts);
    let session = SessionStore::from_config(&config)?;

    match cli.command {
        Command::Login { username, password } => {
            let identity = session.authenticate(&username, &password).await?;
            print_identity(&identity);
            Ok(())
        }
        Command::Signup { username, email, password, full_name } => {
            let identity = session.register(&username, &email, &password, &full_name).await?;
            print_identity(&identity);
            Ok(())
        }
        Command::Logout => {
            session.terminate();
            println!("logged out");
            Ok(())
        }
        Command::Whoami => run_whoami(&session).await,
        Command::Open { path } => run_open(session, &path).await,
        Command::Get { path } => run_get(&config, session, &path).await,
    }
}

async fn run_whoami(session: &SessionStore) -> Result<(), CliError> {
    match session.bootstrap().await {
        Readiness::Authenticated(identity) => print_identity(&identity),
        Readiness::Anonymous | Readiness::Pending => println!("not logged in"),
    }
    Ok(())
}

async fn run_open(session: SessionStore, path: &str) -> Result<(), CliError> {
    let mut navigator = Navigator::new(RouteGuard::default(), session.clone());
    let (_, verdict) = tokio::join!(session.bootstrap(), navigator.visit(path));
    match verdict {
        Verdict::Allow => {
            println!("{path}: allowed");
            Ok(())
        }
        Verdict::Redirect { to, return_to } => {
            tracing::info!(%to, %return_to, "redirecting to login");
            Err(CliError::LoginRequired { return_to })
        }
        Verdict::Suspend => {
            println!("{path}: session still resolving");
            Ok(())
        }
    }
}

async fn run_get(config: &SessionConfig, session: SessionStore, path: &str) -> Result<(), CliError> {
    session.bootstrap().await;
    let client = AuthorizedClient::new(config.clone(), session)?;
    let body: Value = client.get_json(path).await?;
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}

fn print_identity(identity: &Identity) {
    println!("logged in as {}", identity.display_name());
    println!("  username: {}", identity.username);
    if let Some(email) = identity.email.as_deref().filter(|e| !e.is_empty()) {
        println!("  email:    {email}");
    }
}
