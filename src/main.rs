mod asset_persistence;
mod batch_scheduler;
mod config;
mod entity_list_import;
mod entity_resolver;
mod http;
mod protocol;
mod resolvers;
mod slug;

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Local;
use clap::Parser;
use log::{info, warn};

use asset_persistence::AssetPersistence;
use batch_scheduler::BatchScheduler;
use config::{sanitize_config, Config};
use entity_resolver::EntityResolver;
use http::ureq_transport::UreqTransport;
use http::HttpTransport;

#[derive(Debug, Parser)]
#[command(
    name = "uniassets",
    about = "Resolve and download university logos and gallery images"
)]
struct Cli {
    /// CSV file with a `University` column.
    #[arg(long)]
    csv: PathBuf,

    /// Root folder that receives the timestamped run directory.
    #[arg(long, default_value = ".")]
    out: PathBuf,

    /// Maximum gallery images kept per university.
    #[arg(long)]
    max_gallery: Option<usize>,

    /// Number of universities resolved in parallel.
    #[arg(long)]
    concurrency: Option<usize>,

    /// Request timeout in seconds.
    #[arg(long)]
    timeout: Option<u64>,

    /// Scrape college pages even when robots.txt disallows it.
    #[arg(long)]
    ignore_robots: bool,

    /// Config file. Defaults to `<config dir>/uniassets/config.toml`.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Bearer token for the search and detail APIs.
    #[arg(long, env = "UNIASSETS_API_TOKEN", hide_env_values = true)]
    token: Option<String>,

    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn apply_overrides(&self, mut config: Config) -> Config {
        if let Some(max_gallery) = self.max_gallery {
            config.scrape.max_gallery_images = max_gallery;
        }
        if let Some(concurrency) = self.concurrency {
            config.batch.concurrency = concurrency;
        }
        if let Some(timeout) = self.timeout {
            config.network.request_timeout_secs = timeout;
        }
        if self.ignore_robots {
            config.scrape.ignore_robots = true;
        }
        if let Some(token) = self.token.as_ref().filter(|token| !token.trim().is_empty()) {
            config.source.bearer_token = token.clone();
        }
        config
    }

    fn load_config(&self) -> Result<Config, String> {
        let path = self.config.clone().or_else(Config::default_path);
        let loaded = match path {
            Some(path) => Config::load(&path)?,
            None => Config::default(),
        };
        Ok(sanitize_config(self.apply_overrides(loaded)))
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut clog = colog::default_builder();
    let level = if cli.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    clog.filter(None, level);
    clog.init();

    std::panic::set_hook(Box::new(|panic_info| {
        let current_thread = std::thread::current();
        let thread_name = current_thread.name().unwrap_or("unnamed");
        log::error!("panic in thread '{}': {}", thread_name, panic_info);
    }));

    let config = cli.load_config()?;
    if config.source.bearer_token.trim().is_empty() {
        warn!("No API token configured; search and detail requests will likely be rejected");
    }

    let names = entity_list_import::read_entity_names(&cli.csv)?;
    if names.is_empty() {
        return Err(format!("No universities found in {}", cli.csv.display()).into());
    }
    info!("Loaded {} universities from {}", names.len(), cli.csv.display());

    let transport: Arc<dyn HttpTransport> = Arc::new(UreqTransport::new(config.request_timeout()));
    let resolver = Arc::new(EntityResolver::new(Arc::clone(&transport), &config));
    let report = BatchScheduler::from_config(&config).run(&names, resolver);

    let persistence = AssetPersistence::new(transport, config.request_timeout());
    let (run_dir, downloads) = persistence.persist_batch(&cli.out, &report.result, Local::now())?;
    info!(
        "Wrote {} ({} downloaded, {} failed downloads)",
        run_dir.display(),
        downloads.downloaded,
        downloads.failed
    );
    info!("{}", report.summary_line());
    Ok(())
}
