use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use serde_json::json;

use courier::config::ConfigError;
use courier::net::types::{DeliveryStatus, NewDelivery, NewTrackingPoint, Role};
use courier::net::{admin, deliveries, tracking};
use courier::state::auth::SignUp;
use courier::util::auth::should_redirect_unauth;
use courier::{ApiClient, ApiError, AuthError, ClientConfig, Hydration, Identity, Navigator, Route, SessionStore};

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("not signed in; run `courier login` first")]
    NotSignedIn,
    #[error("unknown route: {0}")]
    UnknownRoute(String),
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("{0}")]
    Api(#[from] ApiError),
    #[error("{0}")]
    Auth(#[from] AuthError),
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(name = "courier", about = "Delivery tracking client")]
struct Cli {
    #[arg(long, env = "COURIER_API_URL")]
    api_url: Option<String>,

    #[arg(long, env = "COURIER_CREDENTIAL_PATH")]
    credential_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sign in and store the credential.
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "COURIER_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Create an account and sign in as it.
    Register(RegisterArgs),
    /// Discard the stored credential.
    Logout,
    /// Print the signed-in identity.
    Whoami,
    /// Show where the router sends the current session for a path.
    Route { path: String },
    Deliveries(DeliveriesCommand),
    Tracking(TrackingCommand),
    Admin(AdminCommand),
}

#[derive(Args, Debug)]
struct RegisterArgs {
    #[arg(long)]
    email: String,
    #[arg(long, env = "COURIER_PASSWORD", hide_env_values = true)]
    password: String,
    #[arg(long)]
    full_name: String,
    #[arg(long)]
    phone: Option<String>,
    #[arg(long, default_value = "customer")]
    role: Role,
}

#[derive(Args, Debug)]
struct DeliveriesCommand {
    #[command(subcommand)]
    command: DeliveriesSubcommand,
}

#[derive(Subcommand, Debug)]
enum DeliveriesSubcommand {
    List,
    Get {
        delivery_id: String,
    },
    Create {
        #[arg(long)]
        pickup: String,
        #[arg(long)]
        dropoff: String,
        #[arg(long)]
        details: Option<String>,
    },
    Status {
        delivery_id: String,
        status: DeliveryStatus,
    },
    Assign {
        delivery_id: String,
        driver_id: String,
    },
}

#[derive(Args, Debug)]
struct TrackingCommand {
    #[command(subcommand)]
    command: TrackingSubcommand,
}

#[derive(Subcommand, Debug)]
enum TrackingSubcommand {
    List {
        delivery_id: String,
    },
    Share {
        delivery_id: String,
        #[arg(long, allow_negative_numbers = true)]
        lat: f64,
        #[arg(long, allow_negative_numbers = true)]
        lng: f64,
    },
}

#[derive(Args, Debug)]
struct AdminCommand {
    #[command(subcommand)]
    command: AdminSubcommand,
}

#[derive(Subcommand, Debug)]
enum AdminSubcommand {
    Stats,
    Drivers,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let dotenv = dotenvy::dotenv();
    init_tracing();
    if let Err(e) = dotenv {
        tracing::debug!(error = %e, "no .env loaded");
    }

    let cli = Cli::parse();
    let config = resolve_config(cli.api_url.as_deref(), cli.credential_path)?;
    let store = SessionStore::new(ApiClient::from_config(&config)?);

    match cli.command {
        Command::Login { email, password } => {
            let user = store.sign_in(&email, &password).await?;
            print_json(&user)
        }
        Command::Register(args) => run_register(&store, args).await,
        Command::Logout => {
            store.sign_out();
            print_json(&json!({ "signed_in": false }))
        }
        Command::Whoami => {
            let user = require_session(&store).await?;
            print_json(&user)
        }
        Command::Route { path } => run_route(&store, &path).await,
        Command::Deliveries(command) => {
            require_session(&store).await?;
            run_deliveries(store.api(), command).await
        }
        Command::Tracking(command) => {
            require_session(&store).await?;
            run_tracking(store.api(), command).await
        }
        Command::Admin(command) => {
            require_session(&store).await?;
            run_admin(store.api(), command).await
        }
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

fn resolve_config(api_url: Option<&str>, credential_path: Option<PathBuf>) -> Result<ClientConfig, CliError> {
    let mut config = ClientConfig::from_env()?;
    if let Some(api_url) = api_url {
        config = config.with_api_url(api_url)?;
    }
    if let Some(path) = credential_path {
        config.credential_path = path;
    }
    Ok(config)
}

/// Hydrate and return the signed-in identity, or fail the way the router
/// would redirect to the auth screen.
async fn require_session(store: &SessionStore) -> Result<Identity, CliError> {
    if store.hydrate().await == Hydration::Expired {
        tracing::warn!("stored session expired; sign in again");
    }
    let session = store.session();
    if should_redirect_unauth(&session) {
        return Err(CliError::NotSignedIn);
    }
    session.user.ok_or(CliError::NotSignedIn)
}

async fn run_register(store: &SessionStore, args: RegisterArgs) -> Result<(), CliError> {
    let user = store
        .sign_up(SignUp {
            email: args.email,
            password: args.password,
            full_name: args.full_name,
            phone: args.phone,
            role: args.role,
        })
        .await?;
    print_json(&user)
}

async fn run_route(store: &SessionStore, path: &str) -> Result<(), CliError> {
    let route = Route::parse(path).ok_or_else(|| CliError::UnknownRoute(path.to_owned()))?;
    store.hydrate().await;

    let mut navigator = Navigator::new(route);
    let redirect = navigator.observe(&store.session()).map(Route::path);
    print_json(&json!({
        "requested": path,
        "redirect": redirect,
        "current": navigator.current().path(),
    }))
}

async fn run_deliveries(api: &ApiClient, command: DeliveriesCommand) -> Result<(), CliError> {
    match command.command {
        DeliveriesSubcommand::List => print_json(&deliveries::list(api).await?),
        DeliveriesSubcommand::Get { delivery_id } => print_json(&deliveries::get(api, &delivery_id).await?),
        DeliveriesSubcommand::Create { pickup, dropoff, details } => {
            let delivery = NewDelivery { pickup_address: pickup, delivery_address: dropoff, package_details: details };
            print_json(&deliveries::create(api, delivery).await?)
        }
        DeliveriesSubcommand::Status { delivery_id, status } => {
            print_json(&deliveries::update_status(api, &delivery_id, status).await?)
        }
        DeliveriesSubcommand::Assign { delivery_id, driver_id } => {
            print_json(&deliveries::assign_driver(api, &delivery_id, &driver_id).await?)
        }
    }
}

async fn run_tracking(api: &ApiClient, command: TrackingCommand) -> Result<(), CliError> {
    match command.command {
        TrackingSubcommand::List { delivery_id } => print_json(&tracking::for_delivery(api, &delivery_id).await?),
        TrackingSubcommand::Share { delivery_id, lat, lng } => {
            let point = NewTrackingPoint { delivery_id, latitude: lat, longitude: lng };
            print_json(&tracking::share_location(api, &point).await?)
        }
    }
}

async fn run_admin(api: &ApiClient, command: AdminCommand) -> Result<(), CliError> {
    match command.command {
        AdminSubcommand::Stats => print_json(&admin::stats(api).await?),
        AdminSubcommand::Drivers => print_json(&admin::drivers(api).await?),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}
