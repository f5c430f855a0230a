//! Livedesk terminal chat client.
//!
//! Signs in as an admin or a customer, keeps a realtime connection to the chat
//! backend and syncs the active room, typing indicators and read receipts.
//! Customers are placed in their own room on start; admins pick rooms with
//! `/join`.
//!
//! Run with:
//! ```not_rust
//! LIVEDESK_TOKEN=... cargo run --bin livedesk-client -- --role customer --user-id c1 --name Alice
//! cargo run --bin livedesk-client -- --role admin --user-id admin-1 --token ...
//! ```

use clap::{Parser, ValueEnum};

use livedesk_client::{
    config::{ClientConfig, DEFAULT_API_URL, DEFAULT_WS_URL},
    domain::{Identity, Role, UserId},
    ui::{RunOptions, error::StartupError, run_client},
};
use livedesk_shared::logger::setup_logger;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum RoleArg {
    Admin,
    Customer,
}

impl From<RoleArg> for Role {
    fn from(role: RoleArg) -> Self {
        match role {
            RoleArg::Admin => Role::Admin,
            RoleArg::Customer => Role::Customer,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "livedesk-client")]
#[command(about = "Realtime live-chat client for admins and customers", long_about = None)]
struct Args {
    /// Which side of the conversation to sign in as
    #[arg(short = 'r', long, value_enum)]
    role: RoleArg,

    /// User id; for customers this is also the room id
    #[arg(short = 'u', long)]
    user_id: String,

    /// Bearer token presented to the backend
    #[arg(short = 't', long, env = "LIVEDESK_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// WebSocket endpoint
    #[arg(long, default_value = DEFAULT_WS_URL)]
    url: String,

    /// REST API base URL
    #[arg(long, default_value = DEFAULT_API_URL)]
    api_url: String,

    /// Display name used when a customer room is created
    #[arg(short = 'n', long)]
    name: Option<String>,
}

impl Args {
    fn into_options(self) -> Result<RunOptions, StartupError> {
        let identity = Identity::new(UserId::new(self.user_id)?, self.role.into());
        let config = ClientConfig {
            ws_url: self.url,
            api_url: self.api_url,
            ..ClientConfig::default()
        };
        Ok(RunOptions {
            identity,
            token: self.token,
            display_name: self.name,
            config,
        })
    }
}

#[tokio::main]
async fn main() {
    setup_logger("livedesk_client", env!("CARGO_BIN_NAME"), "info");

    let args = Args::parse();
    let options = match args.into_options() {
        Ok(options) => options,
        Err(e) => {
            tracing::error!("{}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = run_client(options).await {
        tracing::error!("Client error: {}", e);
        std::process::exit(1);
    }
}
