use anyhow::Result;
use clap::Parser;
use movie_chars::config::{DEFAULT_ENTITY_URI, DEFAULT_USER_AGENT};
use movie_chars::{ClaimProperties, Config, HttpFetcher, OutputFormat};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Parser)]
#[command(name = "movie_chars")]
#[command(about = "Collects director, producer, top cast and box office of movie entities")]
struct Cli {
    /// Directory containing one JSON record per movie (file stem = entity ID)
    #[arg(short, long, env = "MOVIE_CHARS_INPUT_DIR", default_value = "./wikidata")]
    input_dir: String,

    /// Directory for the entity cache and the final table
    #[arg(short, long, env = "MOVIE_CHARS_OUTPUT_DIR", default_value = "./wikidata_chars")]
    output_dir: String,

    /// Number of parallel workers (default: number of cores)
    #[arg(short, long, env = "MOVIE_CHARS_WORKERS")]
    workers: Option<usize>,

    /// Number of chunks the work list is split into for progress reporting
    #[arg(short, long, default_value = "1000")]
    chunks: usize,

    /// Base URI for entity documents; `<id>.json` is appended
    #[arg(long, env = "MOVIE_CHARS_ENTITY_URI", default_value = DEFAULT_ENTITY_URI)]
    entity_uri: String,

    /// User-Agent header sent with every request
    #[arg(long, env = "MOVIE_CHARS_USER_AGENT", default_value = DEFAULT_USER_AGENT)]
    user_agent: String,

    /// Seconds to wait before the single retry of a failed fetch
    #[arg(long, default_value = "60")]
    retry_delay_secs: u64,

    /// Milliseconds each worker sleeps after every movie
    #[arg(long, default_value = "10")]
    throttle_ms: u64,

    /// HTTP read timeout in seconds
    #[arg(long, default_value = "30")]
    timeout_secs: u64,

    #[arg(long, default_value = "P57")]
    director_property: String,

    #[arg(long, default_value = "P162")]
    producer_property: String,

    #[arg(long, default_value = "P161")]
    cast_property: String,

    #[arg(long, default_value = "P2142")]
    box_office_property: String,

    /// File name of the output table inside the output directory
    #[arg(long, default_value = "movie_chars.csv")]
    table_name: String,

    /// Output table format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Csv)]
    format: OutputFormat,

    /// Disable the progress bar
    #[arg(long)]
    no_progress: bool,
}

impl Cli {
    fn into_config(self) -> Config {
        let mut config = Config::new(self.input_dir, self.output_dir);
        if let Some(workers) = self.workers {
            config.worker_count = workers;
        }
        config.chunk_count = self.chunks;
        config.entity_uri = self.entity_uri;
        config.user_agent = self.user_agent;
        config.retry_delay = Duration::from_secs(self.retry_delay_secs);
        config.throttle = Duration::from_millis(self.throttle_ms);
        config.request_timeout = Duration::from_secs(self.timeout_secs);
        config.properties = ClaimProperties {
            director: self.director_property,
            producer: self.producer_property,
            cast: self.cast_property,
            box_office: self.box_office_property,
        };
        config.table_name = self.table_name;
        config.format = self.format;
        config.show_progress = !self.no_progress;
        config.normalized()
    }
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let config = Cli::parse().into_config();

    info!(
        "Using {} workers (cores available: {})",
        config.worker_count,
        num_cpus::get()
    );
    info!("Input directory: {}", config.input_dir.display());
    info!("Entity URI: {}", config.entity_uri);

    let fetcher = Arc::new(HttpFetcher::new(&config));
    let summary = movie_chars::run(&config, fetcher)?;

    info!(
        "Movie table with {} rows created successfully in: {}",
        summary.rows,
        config.output_dir.display()
    );

    Ok(())
}
