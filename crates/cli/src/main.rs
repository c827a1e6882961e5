use std::str::FromStr;

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use tideline_api::{FeedApi, HttpApi, PageQuery};
use tideline_core::ActionKind;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "tidectl", version, about = "Tideline CLI")]
struct Cli {
    /// Base URL of the feed service
    #[arg(long = "base-url", env = "TIDELINE_BASE_URL")]
    base_url: String,

    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output {
    Human,
    Json,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum KindArg {
    Follow,
    Star,
    Repost,
    Subscribe,
    Mute,
    Block,
    Recommend,
}

impl From<KindArg> for ActionKind {
    fn from(v: KindArg) -> Self {
        match v {
            KindArg::Follow => ActionKind::Follow,
            KindArg::Star => ActionKind::Star,
            KindArg::Repost => ActionKind::Repost,
            KindArg::Subscribe => ActionKind::Subscribe,
            KindArg::Mute => ActionKind::Mute,
            KindArg::Block => ActionKind::Block,
            KindArg::Recommend => ActionKind::Recommend,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Apply or remove a toggle-style action on a target
    Mutate {
        #[arg(value_enum)]
        kind: KindArg,
        /// Target resource id (user, post, channel or app)
        target: u64,
        /// Remove the action instead of applying it
        #[arg(long = "off", action = ArgAction::SetTrue)]
        off: bool,
    },
    /// Fetch one page of the feed
    Page {
        /// Fetch items older than this id
        #[arg(long = "before")]
        before: Option<u64>,
        /// Fetch items newer than this id
        #[arg(long = "since")]
        since: Option<u64>,
        /// Extra filter pairs, key=value (repeatable)
        #[arg(long = "filter", value_parser = parse_filter)]
        filters: Vec<(String, String)>,
    },
    /// Persist a read marker
    Marker {
        /// Marker name, e.g. "personal"
        name: String,
        /// Furthest-read item id
        id: u64,
    },
}

fn parse_filter(raw: &str) -> std::result::Result<(String, String), String> {
    match raw.split_once('=') {
        Some((k, v)) if !k.is_empty() => Ok((k.to_string(), v.to_string())),
        _ => Err(format!("expected key=value, got {:?}", raw)),
    }
}

fn init_tracing() {
    let env = std::env::var("TIDELINE_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).init();
}

fn init_metrics() {
    if let Ok(addr) = std::env::var("TIDELINE_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => tracing::info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => tracing::warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            tracing::warn!(addr = %addr, "invalid TIDELINE_METRICS_ADDR; expected host:port");
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    init_metrics();
    let cli = Cli::parse();
    let api = HttpApi::new(&cli.base_url)?;

    match cli.command {
        Commands::Mutate { kind, target, off } => {
            let kind: ActionKind = kind.into();
            let desired = !off;
            info!(kind = ?kind, target, desired, "mutate invoked");
            match api.mutate(kind, target, desired).await {
                Ok(()) => match cli.output {
                    Output::Human => println!("{:?} {} • ok", kind, target),
                    Output::Json => println!("{}", serde_json::json!({"ok": true})),
                },
                Err(e) => {
                    error!(error = %e, "mutate failed");
                    eprintln!("mutate error: {}", e);
                    std::process::exit(1);
                }
            }
        }
        Commands::Page { before, since, filters } => {
            info!(before = ?before, since = ?since, "page invoked");
            let query = PageQuery {
                before_id: before,
                since_id: since,
                filters: filters.into_iter().collect(),
            };
            match api.fetch_page(query).await {
                Ok(page) => match cli.output {
                    Output::Human => {
                        for it in &page.items {
                            println!("{} • {} • {}", it.id, it.created_ts, it.body);
                        }
                        println!(
                            "-- before_id={:?} since_id={:?} more={}",
                            page.before_id, page.since_id, page.more
                        );
                    }
                    Output::Json => println!("{}", serde_json::to_string_pretty(&page)?),
                },
                Err(e) => {
                    error!(error = %e, "page fetch failed");
                    eprintln!("page error: {}", e);
                    std::process::exit(1);
                }
            }
        }
        Commands::Marker { name, id } => {
            info!(name = %name, id, "marker invoked");
            match api.sync_marker(&name, id).await {
                Ok(()) => match cli.output {
                    Output::Human => println!("marker {} • {}", name, id),
                    Output::Json => println!("{}", serde_json::json!({"ok": true, "name": name, "id": id})),
                },
                Err(e) => {
                    error!(error = %e, "marker sync failed");
                    eprintln!("marker error: {}", e);
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}
