use clap::Parser;
use prospect_auth::accounts::{load_accounts, load_client_secrets};
use prospect_auth::{
    CredentialStore, FileCredentialStore, GateConfig, GoogleOAuthProvider, OAuthGate,
    SystemBrowser,
};
use prospect_common::{HttpClient, ReqwestHttpClient};
use prospect_dispatch::mcp::ServerInfo;
use prospect_dispatch::{Dispatcher, DEFAULT_IDENTITY_FIELD};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tools::search::{SearchSettings, DEFAULT_MODEL, DEFAULT_RESULTS_PER_QUERY};
use tools::tracker::{JsonFileTrackingStore, DEFAULT_STORE_PATH};
use tracing_subscriber::EnvFilter;

mod tools;

#[derive(Parser)]
#[command(
    name = "prospect-tools",
    version,
    about = "Prospecting MCP tool servers over stdio"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Find work emails for LinkedIn profiles (AnyMailFinder)
    EmailFinder {
        #[arg(long, env = "ANYMAILFINDER_KEY", hide_env_values = true)]
        api_key: String,
    },

    /// Fetch LinkedIn profile data (RapidAPI)
    Linkedin {
        #[arg(long, env = "RAPIDAPI_KEY", hide_env_values = true)]
        api_key: String,
    },

    /// Generate Google dorks with an LLM and run them through Custom Search
    Search {
        #[arg(long, env = "ANTHROPIC_API_KEY", hide_env_values = true)]
        anthropic_api_key: String,

        #[arg(long, env = "GOOGLE_API_KEY", hide_env_values = true)]
        google_api_key: String,

        #[arg(long, env = "GOOGLE_CSE_ID")]
        google_cse_id: String,

        /// Model used to write the search queries
        #[arg(long, default_value = DEFAULT_MODEL)]
        model: String,

        #[arg(long, default_value_t = DEFAULT_RESULTS_PER_QUERY)]
        results_per_query: u32,
    },

    /// Track which emails were found for which URLs
    Tracker {
        /// JSON file holding the tracked URLs
        #[arg(long, default_value = DEFAULT_STORE_PATH)]
        store_path: PathBuf,
    },

    /// Gmail and Google Calendar tools, authorized per account
    Gsuite(GsuiteArgs),
}

#[derive(clap::Args)]
struct GsuiteArgs {
    /// OAuth client secrets downloaded from the Google Cloud console
    #[arg(long, default_value = "./.gauth.json")]
    gauth_file: PathBuf,

    /// Accounts this server may act for
    #[arg(long, default_value = "./.accounts.json")]
    accounts_file: PathBuf,

    /// Directory holding the per-account `.oauth2.<encoded email>.json` files
    #[arg(long, default_value = ".")]
    credentials_dir: PathBuf,

    /// Loopback address for the OAuth redirect listener
    #[arg(long, default_value = "127.0.0.1:4100")]
    callback_addr: SocketAddr,

    /// Redirect URI registered with Google, if it differs from the listener address
    #[arg(long)]
    redirect_uri: Option<String>,

    /// How long to wait for the user to finish authorizing in the browser
    #[arg(long, default_value_t = 300)]
    auth_timeout_secs: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    // All logging goes to stderr so stdout is reserved for MCP JSON-RPC.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let http: Arc<dyn HttpClient> = Arc::new(ReqwestHttpClient::new()?);

    let (name, dispatcher) = match cli.command {
        Commands::EmailFinder { api_key } => (
            "email-finder-mcp",
            Dispatcher::new(tools::email_finder_tools(http, api_key)),
        ),
        Commands::Linkedin { api_key } => (
            "rapidapi-linkedin-mcp",
            Dispatcher::new(tools::linkedin_tools(http, api_key)),
        ),
        Commands::Search {
            anthropic_api_key,
            google_api_key,
            google_cse_id,
            model,
            results_per_query,
        } => {
            let settings = SearchSettings {
                anthropic_api_key,
                google_api_key,
                search_engine_id: google_cse_id,
                model,
                results_per_query,
            };
            ("search-mcp", Dispatcher::new(tools::search_tools(http, settings)))
        }
        Commands::Tracker { store_path } => {
            tracing::info!("Tracking store at {:?}", store_path);
            let store = Arc::new(JsonFileTrackingStore::new(store_path));
            ("tracker-mcp", Dispatcher::new(tools::tracker_tools(store)))
        }
        Commands::Gsuite(args) => ("mcp-gsuite", gsuite_dispatcher(args, http)?),
    };

    tracing::info!(
        "Starting {name} with {} tools (gated: {})",
        dispatcher.registry().len(),
        dispatcher.is_gated()
    );
    prospect_dispatch::server::run(dispatcher, ServerInfo::new(name, env!("CARGO_PKG_VERSION")))
        .await?;

    Ok(())
}

fn gsuite_dispatcher(
    args: GsuiteArgs,
    http: Arc<dyn HttpClient>,
) -> Result<Dispatcher, Box<dyn std::error::Error>> {
    let secrets = load_client_secrets(&args.gauth_file)?;
    let accounts = load_accounts(&args.accounts_file)?;
    let store = Arc::new(FileCredentialStore::new(args.credentials_dir));

    for account in &accounts {
        match store.load(&account.email) {
            Ok(Some(_)) => tracing::info!("Found stored credentials for {}", account.email),
            Ok(None) => tracing::info!(
                "No stored credentials for {}, authorization runs on first use",
                account.email
            ),
            Err(e) => tracing::warn!("Unreadable credentials for {}: {e}", account.email),
        }
    }

    let config = GateConfig {
        callback_addr: args.callback_addr,
        redirect_uri: args.redirect_uri,
        timeout: Duration::from_secs(args.auth_timeout_secs),
        ..GateConfig::default()
    };
    let gate = OAuthGate::new(
        config,
        store,
        Arc::new(GoogleOAuthProvider::new(secrets)),
        Arc::new(SystemBrowser),
    )
    .with_allowed_identities(accounts.into_iter().map(|account| account.email));

    let api = tools::google::GoogleApi::new(http);
    Ok(Dispatcher::new(tools::gsuite_tools(api)).with_gate(Arc::new(gate), DEFAULT_IDENTITY_FIELD))
}
