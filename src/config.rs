use std::path::PathBuf;
use std::time::Duration;

use crate::output::OutputFormat;

/// Number of cast columns in every output row.
pub const CAST_SLOTS: usize = 5;

pub const DEFAULT_ENTITY_URI: &str = "https://www.wikidata.org/wiki/Special:EntityData/";
pub const DEFAULT_USER_AGENT: &str = concat!("movie_chars/", env!("CARGO_PKG_VERSION"));

/// Claim property identifiers for each extracted field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimProperties {
    pub director: String,
    pub producer: String,
    pub cast: String,
    pub box_office: String,
}

impl Default for ClaimProperties {
    fn default() -> Self {
        Self {
            director: "P57".to_string(),
            producer: "P162".to_string(),
            cast: "P161".to_string(),
            box_office: "P2142".to_string(),
        }
    }
}

/// Everything a batch run needs, resolved once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding one `<movie_id>.json` (or `.json.gz`) record per movie.
    pub input_dir: PathBuf,
    /// Root of the entity cache; the final table is written here too.
    pub output_dir: PathBuf,
    /// Degree of parallelism.
    pub worker_count: usize,
    /// Progress granularity: the work list is split into this many chunks.
    pub chunk_count: usize,
    /// Base URI; the entity ID and `.json` are appended to it.
    pub entity_uri: String,
    pub user_agent: String,
    pub retry_delay: Duration,
    /// Sleep per movie to keep the request rate down.
    pub throttle: Duration,
    pub request_timeout: Duration,
    pub properties: ClaimProperties,
    pub table_name: String,
    pub format: OutputFormat,
    pub show_progress: bool,
}

impl Config {
    pub fn new(input_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            input_dir: input_dir.into(),
            output_dir: output_dir.into(),
            worker_count: num_cpus::get(),
            chunk_count: 1000,
            entity_uri: DEFAULT_ENTITY_URI.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            retry_delay: Duration::from_secs(60),
            throttle: Duration::from_millis(10),
            request_timeout: Duration::from_secs(30),
            properties: ClaimProperties::default(),
            table_name: "movie_chars.csv".to_string(),
            format: OutputFormat::Csv,
            show_progress: true,
        }
    }

    /// Clamp counts that must be positive.
    pub fn normalized(mut self) -> Self {
        self.worker_count = self.worker_count.max(1);
        self.chunk_count = self.chunk_count.max(1);
        self
    }

    pub fn table_path(&self) -> PathBuf {
        self.output_dir.join(&self.table_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalized_clamps_zero_counts() {
        let mut config = Config::new("in", "out");
        config.worker_count = 0;
        config.chunk_count = 0;
        let config = config.normalized();
        assert_eq!(config.worker_count, 1);
        assert_eq!(config.chunk_count, 1);
    }

    #[test]
    fn default_properties() {
        let props = ClaimProperties::default();
        assert_eq!(props.director, "P57");
        assert_eq!(props.cast, "P161");
    }
}
