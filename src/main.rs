use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;

use blueprint_store::config::Config;
use blueprint_store::ingest::{spawn_scheduler, IngestContext, RefreshCoordinator, SweepOutcome};
use blueprint_store::models::ListParams;
use blueprint_store::query::QueryService;

#[derive(Debug, Parser)]
#[command(name = "blueprint-store")]
#[command(about = "Local catalog of community automation blueprints", version)]
struct Cli {
    /// Config file to use instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at info level instead of warnings only
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run one sweep if the refresh interval has passed
    Refresh {
        /// Ignore the refresh interval
        #[arg(long)]
        force: bool,
    },
    /// Keep the catalog fresh until interrupted
    Serve,
    /// List blueprints
    List {
        #[arg(long, default_value_t = 0)]
        page: i64,
        #[arg(long, default_value = "")]
        q: String,
        #[arg(long, default_value = "")]
        bucket: String,
        #[arg(long, default_value = "")]
        tag: String,
        #[arg(long, default_value = "new")]
        sort: String,
    },
    /// Curated bucket names
    Filters,
    /// Source tags seen on stored blueprints
    Tags,
    /// First post of a topic
    Topic {
        id: i64,
        /// Render as terminal text instead of JSON
        #[arg(long)]
        text: bool,
    },
    /// Forum URL of a topic
    Go {
        id: i64,
        #[arg(long, default_value = "")]
        slug: String,
    },
    /// Most popular topic, most prolific author and latest update
    Spotlight,
    /// Number of stored blueprints and time of the last refresh
    Status,
    /// Delete topics no refresh has seen for the given number of days
    Prune {
        #[arg(long)]
        days: Option<u32>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays machine-readable
    let level = if cli.verbose {
        tracing::Level::INFO
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .with_writer(std::io::stderr)
        .init();

    let config = Config::load(cli.config.as_deref()).context("loading configuration")?;
    let ctx = IngestContext::open(&config)
        .await
        .with_context(|| format!("opening blueprint store at {}", config.db_path))?;
    let queries = QueryService::new(Arc::clone(&ctx), config.query.clone());

    match cli.command {
        Commands::Refresh { force } => {
            let coordinator = RefreshCoordinator::new(ctx, config.refresh.clone());
            match coordinator.sweep(force).await? {
                SweepOutcome::Completed(report) => print_json(&report)?,
                SweepOutcome::NotDue => eprintln!("Refresh not due yet (use --force to override)"),
                SweepOutcome::AlreadyRunning => eprintln!("A refresh is already running"),
            }
        }
        Commands::Serve => {
            let coordinator = Arc::new(RefreshCoordinator::new(ctx, config.refresh.clone()));
            let scheduler = spawn_scheduler(
                coordinator,
                config.refresh.interval(),
                config.refresh.jitter(),
            );
            tracing::info!(
                "Refreshing every {:?}; press Ctrl-C to stop",
                config.refresh.interval()
            );
            tokio::signal::ctrl_c().await.context("waiting for Ctrl-C")?;
            scheduler.shutdown().await;
        }
        Commands::List {
            page,
            q,
            bucket,
            tag,
            sort,
        } => {
            let params = ListParams {
                page,
                q,
                bucket,
                tag,
                sort,
            };
            print_json(&queries.list(params).await)?;
        }
        Commands::Filters => print_json(&queries.filters())?,
        Commands::Tags => print_json(&queries.tags().await)?,
        Commands::Topic { id, text } => {
            let detail = queries.topic_detail(id).await;
            if text && detail.error.is_none() {
                let rendered = html2text::from_read(detail.cooked.as_bytes(), 80)
                    .context("rendering topic body")?;
                println!("{}", rendered.trim_end());
                if let Some(url) = &detail.import_url {
                    println!("\nImport: {}", url);
                }
            } else {
                print_json(&detail)?;
            }
        }
        Commands::Go { id, slug } => println!("{}", queries.redirect_target(id, &slug).await),
        Commands::Spotlight => print_json(&queries.spotlight().await)?,
        Commands::Status => print_json(&queries.status().await)?,
        Commands::Prune { days } => {
            let days = days.unwrap_or(config.refresh.prune_days);
            anyhow::ensure!(days > 0, "pruning is disabled (prune_days = 0); pass --days");
            let removed = ctx.repository.prune_older_than(days).await?;
            println!("Pruned {} topic(s) older than {} days", removed, days);
        }
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
