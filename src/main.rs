//! Channel Member Export CLI
//!
//! Signs in to the messaging gateway, lists every member of a channel and
//! writes them to `user_data.json`.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use channel_members::api::HttpDirectory;
use channel_members::channel::ChannelRef;
use channel_members::config::ScraperConfig;
use channel_members::export::{read_members_json, write_members_json, write_name_list};
use channel_members::fetch_members::{FetchParams, PaginatedFetcher, ScrapeError};
use channel_members::normalize::normalize_all;
use channel_members::schemas::RunMetadata;
use channel_members::session::{ensure_authorized, LinePrompter, Prompter};

#[derive(Parser)]
#[command(name = "channel-members")]
#[command(version)]
#[command(about = "Export the member list of a messaging channel", long_about = None)]
struct Cli {
    /// Path to configuration file (optional, uses env vars if not provided)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output directory for export files
    #[arg(short, long, global = true)]
    output_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in, list every member of a channel and write them as JSON
    Scrape {
        /// Channel id, @username or t.me link (prompted for when omitted)
        #[arg(long)]
        channel: Option<String>,

        /// Members requested per page
        #[arg(long)]
        page_size: Option<u32>,

        /// Budget for unclassified failures over the whole listing
        #[arg(long)]
        max_retries: Option<u32>,

        /// Seconds to wait after an unclassified failure
        #[arg(long)]
        retry_delay: Option<u64>,
    },

    /// Turn an export into a plain `id:<id> name: <name>` list
    Names {
        /// Export file to read (defaults to the configured members file)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Name list to write (defaults to the configured names file)
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    // Load configuration
    let mut config = match &cli.config {
        Some(path) => ScraperConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config from {:?}", path))?,
        None => ScraperConfig::load().context("Failed to load config from environment")?,
    };

    if let Some(dir) = &cli.output_dir {
        config.paths.output_dir = dir.clone();
    }

    match cli.command {
        Commands::Scrape {
            channel,
            page_size,
            max_retries,
            retry_delay,
        } => {
            if let Some(size) = page_size {
                config.fetch.page_size = size;
            }
            if let Some(retries) = max_retries {
                config.fetch.max_retries = retries;
            }
            if let Some(delay) = retry_delay {
                config.fetch.retry_delay_secs = delay;
            }
            cmd_scrape(&config, channel).await?;
        }
        Commands::Names { input, output } => {
            let input = input.unwrap_or_else(|| config.paths.members_path());
            let output = output.unwrap_or_else(|| config.paths.names_path());
            cmd_names(&input, &output)?;
        }
    }

    Ok(())
}

async fn cmd_scrape(config: &ScraperConfig, channel_input: Option<String>) -> Result<()> {
    config.validate()?;
    config.ensure_directories()?;

    let directory = HttpDirectory::new(
        config.api_base_url.clone(),
        config.credentials.clone(),
        &config.rate_limits,
    )
    .context("Failed to create gateway client")?;
    info!("Client created for {}", config.api_base_url);

    let mut prompter = LinePrompter::stdio();
    ensure_authorized(&directory, &mut prompter, &config.credentials.phone)
        .await
        .context("Login failed")?;

    let channel_input = match channel_input {
        Some(input) => input,
        None => prompter
            .ask("Enter entity (URL or entity ID): ")
            .context("Failed to read channel from prompt")?,
    };

    let reference = ChannelRef::parse(&channel_input).map_err(ScrapeError::from)?;
    let fetcher = PaginatedFetcher::new(&directory, FetchParams::from(&config.fetch));
    let channel = fetcher.resolve(&reference).await?;

    info!(
        "Listing members of {} (page size {}, {} retries, {}s retry delay)",
        reference,
        config.fetch.page_size,
        config.fetch.max_retries,
        config.fetch.retry_delay_secs
    );
    let members = fetcher.fetch_all(&channel).await;
    let records = normalize_all(&members);

    let output_path = config.paths.members_path();
    write_members_json(&records, &output_path).context("Failed to write member export")?;
    info!(
        "Scraped {} participants. Data saved to {:?}",
        records.len(),
        output_path
    );

    info!("Channel ID: {}", channel.id);
    info!("Channel Title: {}", channel.title.as_deref().unwrap_or("-"));
    info!("Channel Username: {}", channel.username.as_deref().unwrap_or("-"));
    match channel.participants_count {
        Some(count) => info!("Channel Participants Count (from channel info): {}", count),
        None => info!("Channel Participants Count (from channel info): unknown"),
    }

    let metadata = RunMetadata::new(channel, records.len());
    if metadata.is_short_of_reported() {
        warn!(
            "Listing returned fewer members than the channel reports; the export may be partial"
        );
    }
    let metadata_path = config.paths.metadata_path();
    metadata.save(&metadata_path)?;
    info!("Metadata saved to {:?}", metadata_path);

    Ok(())
}

fn cmd_names(input: &PathBuf, output: &PathBuf) -> Result<()> {
    if !input.exists() {
        anyhow::bail!("Export file not found: {:?}. Run scrape first.", input);
    }

    let records = read_members_json(input)
        .with_context(|| format!("Failed to read member export {:?}", input))?;
    write_name_list(&records, output).context("Failed to write name list")?;

    info!("Results have been written to {:?}", output);
    Ok(())
}
