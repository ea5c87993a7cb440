use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use storefront_session::config::ConfigError;
use storefront_session::validate::{self, FieldErrors};
use storefront_session::{ApiError, LoginRequest, Outcome, RegisterRequest, SessionConfig, SessionManager};
use tokio::task::JoinHandle;
use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("auth client setup failed: {0}")]
    Client(#[from] ApiError),
    #[error("invalid form: {0}")]
    Validation(#[from] FieldErrors),
    #[error("{op} failed: {message}")]
    Auth { op: &'static str, message: String },
    #[error("another auth operation is still pending")]
    Busy,
    #[error("not logged in")]
    NotLoggedIn,
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(name = "storefront", about = "Storefront account session CLI")]
struct Cli {
    /// Overrides `STOREFRONT_API_BASE_URL`.
    #[arg(long)]
    base_url: Option<String>,

    /// Overrides `STOREFRONT_SESSION_PATH`.
    #[arg(long)]
    session_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    #[command(flatten)]
    Session(SessionCommand),
    /// Rate a password the way the register form does.
    Strength { password: String },
}

/// Commands that open the stored session.
#[derive(Subcommand, Debug)]
enum SessionCommand {
    /// Create an account (does not log in).
    Register(RegisterArgs),
    /// Log in and remember the session.
    Login(LoginArgs),
    /// Forget the stored session.
    Logout,
    /// Print the stored user.
    Whoami,
}

#[derive(Args, Debug)]
struct RegisterArgs {
    #[arg(long)]
    username: String,
    #[arg(long)]
    email: String,
    #[arg(long, env = "STOREFRONT_PASSWORD", hide_env_values = true)]
    password: String,
}

#[derive(Args, Debug)]
struct LoginArgs {
    #[arg(long)]
    email: String,
    #[arg(long, env = "STOREFRONT_PASSWORD", hide_env_values = true)]
    password: String,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Strength { password } => {
            let strength = validate::password_strength(&password);
            println!("{} ({}/100)", strength.label(), strength.score);
            Ok(())
        }
        Command::Session(command) => {
            let config = load_config(cli.base_url, cli.session_path)?;
            let manager = SessionManager::from_config(&config)?;
            let watcher = spawn_state_logger(&manager);

            let result = run_session_command(&manager, command).await;

            // Dropping the manager closes the channel; the logger exits after the last transition.
            drop(manager);
            if let Err(e) = watcher.await {
                tracing::warn!(error = %e, "session state logger stopped abnormally");
            }
            result
        }
    }
}

async fn run_session_command(manager: &SessionManager, command: SessionCommand) -> Result<(), CliError> {
    match command {
        SessionCommand::Register(args) => run_register(manager, args).await,
        SessionCommand::Login(args) => run_login(manager, args).await,
        SessionCommand::Logout => {
            manager.logout();
            println!("logged out");
            Ok(())
        }
        SessionCommand::Whoami => run_whoami(manager),
    }
}

fn load_config(base_url: Option<String>, session_path: Option<PathBuf>) -> Result<SessionConfig, CliError> {
    let mut config = SessionConfig::from_env()?;
    if let Some(base_url) = base_url {
        config.api_base_url = storefront_session::config::parse_base_url(Some(&base_url))?;
    }
    if let Some(session_path) = session_path {
        config.session_path = session_path;
    }
    tracing::debug!(base_url = %config.api_base_url, path = %config.session_path.display(), "session config loaded");
    Ok(config)
}

/// Log every published session transition at debug level.
fn spawn_state_logger(manager: &SessionManager) -> JoinHandle<()> {
    let mut rx = manager.subscribe();
    tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            let session = rx.borrow_and_update();
            tracing::debug!(
                status = ?session.status,
                authenticated = session.is_authenticated(),
                error = ?session.error,
                "session changed"
            );
        }
    })
}

async fn run_register(manager: &SessionManager, args: RegisterArgs) -> Result<(), CliError> {
    let form = RegisterRequest { username: args.username, email: args.email, password: args.password };
    validate::validate_registration(&form)?;

    let outcome = manager.register(&form).await;
    finish("register", outcome)?;

    let session = manager.snapshot();
    if session.show_registration_confirmation() {
        let name = session.display_name().unwrap_or(&form.username);
        println!("Account created for {name}. Log in to continue.");
    }
    Ok(())
}

async fn run_login(manager: &SessionManager, args: LoginArgs) -> Result<(), CliError> {
    let form = LoginRequest { email: args.email, password: args.password };
    validate::validate_login(&form)?;

    let outcome = manager.login(&form).await;
    finish("login", outcome)?;

    let session = manager.snapshot();
    println!("logged in as {}", session.display_name().unwrap_or(&form.email));
    Ok(())
}

fn run_whoami(manager: &SessionManager) -> Result<(), CliError> {
    let session = manager.snapshot();
    let Some(user) = session.user.as_ref().filter(|_| session.is_authenticated()) else {
        return Err(CliError::NotLoggedIn);
    };
    let rendered = serde_json::to_string_pretty(user)?;
    println!("{rendered}");
    Ok(())
}

fn finish(op: &'static str, outcome: Outcome) -> Result<(), CliError> {
    match outcome {
        Outcome::Succeeded => Ok(()),
        Outcome::Failed(message) => Err(CliError::Auth { op, message }),
        Outcome::Busy => Err(CliError::Busy),
    }
}

#[cfg(test)]
#[path = "main_test.rs"]
mod tests;
