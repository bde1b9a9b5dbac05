use clap::{Parser, Subcommand};

/// Keystone — admin API and gateway for local AI services
#[derive(Parser)]
#[command(name = "keystone", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the gateway server
    Serve {
        /// Port to bind (overrides KEYSTONE_PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Manage API keys
    Key {
        #[command(subcommand)]
        command: KeyCommands,
    },
}

#[derive(Subcommand)]
pub enum KeyCommands {
    /// Issue a new API key
    Create {
        #[arg(long)]
        name: String,
        /// Advisory requests-per-minute figure shown on the dashboard
        #[arg(long, default_value = "100")]
        rate_limit: u32,
    },
    /// List stored keys
    List,
    /// Revoke a key
    Revoke {
        #[arg(long)]
        id: String,
    },
}
