use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use clap::{Parser, Subcommand, ValueEnum};
use querydesk::{AppState, router, version_string};
use querydesk_config::Config;
use querydesk_core::{Desk, SessionStore, StaticCredentials, TicketDraft};
use querydesk_models::{StatusFilter, Ticket, TicketFilter};
use sqlx::SqlitePool;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::OffsetTime;

// --- CLI definition ---

#[derive(Debug, Clone, ValueEnum)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "trace"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

#[derive(Parser)]
#[command(name = "querydesk")]
#[command(about = "Client Query Analysis System")]
#[command(version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("QUERYDESK_GIT_HASH"), ")"))]
struct Cli {
    /// Log level (default: from config, else info)
    #[arg(short, long, global = true)]
    log_level: Option<LogLevel>,

    /// Display log timestamps in UTC (default: local time)
    #[arg(long, global = true)]
    utc: bool,

    /// Database URL (default: from config, else sqlite:querydesk.db)
    #[arg(long, global = true)]
    db_url: Option<String>,

    /// Serve an existing customer_data table without running migrations
    #[arg(long, global = true)]
    no_migrate: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Raise a new query
    Raise {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        mobile: String,
        /// Short title
        #[arg(long)]
        heading: String,
        #[arg(long)]
        description: String,
        /// Confirm the information is correct
        #[arg(long)]
        yes: bool,
    },
    /// List queries, newest first
    List {
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        mobile: Option<String>,
        /// Status to match ("all" for any)
        #[arg(long)]
        status: Option<String>,
    },
    /// List open queries for a contact (email or mobile)
    OpenFor {
        #[arg(long)]
        email: String,
        #[arg(long)]
        mobile: String,
    },
    /// Set the status (and remarks) of a query
    Update {
        /// Complaint ID
        id: i64,
        #[arg(long)]
        status: String,
        #[arg(long, default_value = "")]
        remarks: String,
    },
    /// Show detected table capabilities
    Capabilities,
}

/// Merge CLI overrides on top of the loaded config.
fn resolve_config(cli: &Cli) -> Config {
    let mut config = Config::load();
    if let Some(level) = &cli.log_level { config.log_level = level.to_string(); }
    if cli.utc { config.utc = true; }
    if let Some(url) = &cli.db_url { config.db_url = url.clone(); }
    if cli.no_migrate { config.migrate = false; }
    if let Commands::Serve { port: Some(port) } = &cli.command { config.port = *port; }
    config
}

// --- Logging ---

fn init_logging(config: &Config) {
    let filter = EnvFilter::new(&config.log_level);

    if config.utc {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_timer(OffsetTime::new(
                time::UtcOffset::UTC,
                time::macros::format_description!(
                    "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]Z"
                ),
            ))
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_timer(LocalTimer)
            .init();
    }
}

struct LocalTimer;

impl tracing_subscriber::fmt::time::FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        let now = Local::now();
        write!(w, "{}", now.format("%Y-%m-%dT%H:%M:%S%.3f%:z"))
    }
}

// --- Server ---

async fn run_server(config: &Config, desk: Desk) -> anyhow::Result<()> {
    info!("querydesk v{}", version_string());

    let sessions = SessionStore::with_idle_timeout(Duration::from_secs(config.session_idle_secs));
    let app = router(AppState::with_sessions(desk, sessions));

    let addr = format!("0.0.0.0:{}", config.port);
    info!("Listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// --- Output ---

fn print_tickets(tickets: &[Ticket]) {
    if tickets.is_empty() {
        println!("No complaints found.");
        return;
    }
    println!(
        "{:<6} {:<16} {:<24} {:<12} {:<28} {:<12} {:<20} {:<20} {}",
        "ID", "Name", "Email", "Mobile", "Heading", "Status", "Created", "Closed", "Remarks"
    );
    println!("{}", "-".repeat(150));
    for t in tickets.iter().map(Ticket::view) {
        println!(
            "{:<6} {:<16} {:<24} {:<12} {:<28} {:<12} {:<20} {:<20} {}",
            t.query_id,
            t.name,
            t.email,
            t.mobile,
            t.query_heading,
            t.status,
            t.created_at,
            t.closed_at,
            t.remarks.as_deref().unwrap_or(""),
        );
    }
    println!("\n{} complaint(s) total", tickets.len());
}

async fn open_pool(config: &Config) -> anyhow::Result<SqlitePool> {
    let pool = querydesk_db::connect(&config.db_url).await?;
    if config.migrate {
        querydesk_db::migrate(&pool).await?;
    }
    Ok(pool)
}

// --- Main ---

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = resolve_config(&cli);
    init_logging(&config);

    let pool = open_pool(&config).await?;
    let desk = Desk::new(pool, Arc::new(StaticCredentials::demo())).await;

    match cli.command {
        Commands::Serve { .. } => {
            run_server(&config, desk).await?;
        }
        Commands::Raise { name, email, mobile, heading, description, yes } => {
            let draft = TicketDraft {
                name,
                email: email.clone(),
                mobile: mobile.clone(),
                query_heading: heading,
                query_description: description,
                confirmed: yes,
            };
            let id = desk.submit(&draft).await?;
            println!("Complaint registered! (ID: {id})");
            println!("\nOpen complaints for {email} / {mobile}:");
            print_tickets(&desk.find_open_by_contact(email.trim(), mobile.trim()).await?);
        }
        Commands::List { name, email, mobile, status } => {
            let filter = TicketFilter {
                name,
                email,
                mobile,
                status: StatusFilter::parse(status.as_deref()),
            };
            print_tickets(&desk.find_tickets(&filter).await?);
        }
        Commands::OpenFor { email, mobile } => {
            print_tickets(&desk.find_open_by_contact(&email, &mobile).await?);
        }
        Commands::Update { id, status, remarks } => {
            let ticket = desk.set_status(id, &status, &remarks).await?;
            println!("Status for ID {id} set to '{}'.", ticket.status);
            if !desk.capabilities().has_remarks_column {
                println!("Remarks not saved: table has no remarks column.");
            }
        }
        Commands::Capabilities => {
            let caps = desk.capabilities();
            println!("auto-increment id: {}", caps.has_auto_increment_id);
            println!("remarks column:    {}", caps.has_remarks_column);
        }
    }

    Ok(())
}
