use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use serde::Serialize;
use stockscan_api::{
    auth::{self, AuthConfig, AuthService},
    barcode::{self, Barcode},
    config::{self, AppConfig},
    db,
};

#[derive(Parser)]
#[command(
    name = "stockscan-cli",
    version,
    about = "Operator tooling for the StockScan inventory service"
)]
struct Cli {
    #[arg(
        long,
        global = true,
        action = ArgAction::SetTrue,
        help = "Render command output as pretty JSON"
    )]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending database migrations
    Migrate,
    /// Mint an access token signed with the configured secret
    MintToken(MintTokenArgs),
    /// Normalize and validate a scanned code
    CheckBarcode(CheckBarcodeArgs),
}

#[derive(Args)]
struct MintTokenArgs {
    /// Subject (user or device id) the token is issued to
    subject: String,
    #[arg(long)]
    name: Option<String>,
    /// Role to grant; repeatable
    #[arg(long = "role")]
    roles: Vec<String>,
    /// Explicit permission to grant; repeatable
    #[arg(long = "permission")]
    permissions: Vec<String>,
    /// Token lifetime in seconds (defaults to the configured expiration)
    #[arg(long)]
    ttl: Option<u64>,
}

#[derive(Args)]
struct CheckBarcodeArgs {
    code: String,
    /// Treat the input as a GTIN payload and append its check digit
    #[arg(long, action = ArgAction::SetTrue)]
    complete: bool,
}

#[derive(Serialize)]
struct MintedToken {
    subject: String,
    roles: Vec<String>,
    permissions: Vec<String>,
    expires_in_secs: u64,
    token: String,
}

#[derive(Serialize)]
struct BarcodeReport {
    input: String,
    normalized: String,
    symbology: barcode::Symbology,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Migrate => handle_migrate().await?,
        Commands::MintToken(args) => handle_mint_token(args, cli.json)?,
        Commands::CheckBarcode(args) => handle_check_barcode(args, cli.json)?,
    }

    Ok(())
}

fn load_config() -> Result<AppConfig> {
    let config = config::load_config().context("failed to load application config")?;
    config::init_tracing(config.log_level(), config.log_json);
    Ok(config)
}

async fn handle_migrate() -> Result<()> {
    let config = load_config()?;
    let pool = db::establish_connection_with_config(&db::DbConfig::from(&config))
        .await
        .context("failed to connect to database")?;
    db::run_migrations(&pool)
        .await
        .context("failed to apply migrations")?;
    println!("Migrations applied");
    Ok(())
}

fn handle_mint_token(args: MintTokenArgs, json: bool) -> Result<()> {
    let config = load_config()?;

    for role in &args.roles {
        if auth::role_permissions(role).is_empty() {
            return Err(anyhow!("unknown role '{}'", role));
        }
    }

    let auth_config = AuthConfig::from(&config);
    let ttl = args
        .ttl
        .map(Duration::from_secs)
        .unwrap_or(auth_config.access_token_expiration);
    let service = AuthService::new(auth_config);

    let token = service
        .issue_token_with_ttl(
            &args.subject,
            args.name,
            args.roles.clone(),
            args.permissions.clone(),
            ttl,
        )
        .context("failed to mint token")?;

    let minted = MintedToken {
        subject: args.subject,
        roles: args.roles,
        permissions: args.permissions,
        expires_in_secs: ttl.as_secs(),
        token,
    };

    if json {
        print_json(&minted)?;
    } else {
        println!("{}", minted.token);
    }
    Ok(())
}

fn handle_check_barcode(args: CheckBarcodeArgs, json: bool) -> Result<()> {
    let raw = if args.complete {
        let payload = barcode::normalize(&args.code)?;
        barcode::append_check_digit(&payload)?
    } else {
        args.code.clone()
    };

    let parsed = Barcode::parse(&raw).with_context(|| format!("rejected '{}'", args.code))?;
    let report = BarcodeReport {
        input: args.code,
        normalized: parsed.as_str().to_string(),
        symbology: parsed.symbology(),
    };

    if json {
        print_json(&report)?;
    } else {
        println!("{} ({})", report.normalized, report.symbology);
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
