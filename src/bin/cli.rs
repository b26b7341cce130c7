//! stashkv CLI
//!
//! Command-line client for a running stashkv server.

use clap::{Parser, Subcommand};
use stashkv::client::{Client, ClientError};
use std::process::ExitCode;

/// stashkv CLI
#[derive(Parser, Debug)]
#[command(name = "stashkv-cli")]
#[command(about = "CLI for the stashkv key-value store")]
#[command(version)]
struct Args {
    /// Server address
    #[arg(short, long, default_value = "127.0.0.1:8080")]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Store a new key; fails if it exists
    Add {
        key: String,
        value: String,
        /// Expiry: RFC 3339 time, or seconds / 30s / 15m / 2h / 7d
        #[arg(short, long, default_value = "")]
        ttl: String,
    },

    /// Update an existing key; an empty value keeps the stored data
    Set {
        key: String,
        #[arg(default_value = "")]
        value: String,
        /// Expiry: RFC 3339 time, or seconds / 30s / 15m / 2h / 7d
        #[arg(short, long, default_value = "")]
        ttl: String,
    },

    /// Print a key's value record as JSON
    Get { key: String },

    /// Delete a key
    Del { key: String },

    /// Ping the server
    Ping,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    match run(args).await {
        Ok(output) => {
            println!("{}", output);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<String, ClientError> {
    let mut client = Client::connect(&args.server).await?;

    match args.command {
        Commands::Add { key, value, ttl } => {
            client.add(&key, &value, &ttl).await?;
            Ok("OK".to_string())
        }
        Commands::Set { key, value, ttl } => {
            client.set(&key, &value, &ttl).await?;
            Ok("OK".to_string())
        }
        Commands::Get { key } => {
            let entry = client.get(&key).await?;
            Ok(entry.to_json()?)
        }
        Commands::Del { key } => {
            client.del(&key).await?;
            Ok("OK".to_string())
        }
        Commands::Ping => client.ping().await,
    }
}
