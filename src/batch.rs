use anyhow::{anyhow, Context, Result};
use crossbeam::channel::unbounded;
use glob::{glob, Pattern};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::{self, create_dir_all};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Instant;
use tracing::{info, warn};

use crate::cache::{CacheCounts, EntityCache};
use crate::config::Config;
use crate::fetch::EntitySource;
use crate::output::write_table;
use crate::row::{build_row, MovieRow};

#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    pub movies: usize,
    pub rows: usize,
    pub cache: CacheCounts,
    pub outputs: Vec<PathBuf>,
    pub elapsed_secs: f64,
}

/// Movie ID encoded in a record's file name (`Q42.json` or `Q42.json.gz`).
pub fn movie_id_from_path(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_str()?;
    let stem = name
        .strip_suffix(".json.gz")
        .or_else(|| name.strip_suffix(".json"))?;
    (!stem.is_empty()).then(|| stem.to_string())
}

/// All movie records in `input_dir`, one file per movie ID, sorted by ID.
///
/// When both `<id>.json` and `<id>.json.gz` exist the plain file is used.
pub fn find_movie_files(input_dir: &Path) -> Result<Vec<PathBuf>> {
    let dir = Pattern::escape(&input_dir.to_string_lossy());
    let mut files: BTreeMap<String, PathBuf> = BTreeMap::new();

    for suffix in ["json", "json.gz"] {
        let pattern = format!("{}/*.{}", dir, suffix);
        info!("Searching for movie records with pattern: {}", pattern);

        for entry in glob(&pattern)? {
            match entry {
                Ok(path) => {
                    let Some(movie_id) = movie_id_from_path(&path).filter(|_| path.is_file())
                    else {
                        continue;
                    };
                    if let Some(kept) = files.get(&movie_id) {
                        warn!(
                            "Ignoring {}, movie {} already read from {}",
                            path.display(),
                            movie_id,
                            kept.display()
                        );
                        continue;
                    }
                    files.insert(movie_id, path);
                }
                Err(e) => warn!("Error reading glob entry: {}", e),
            }
        }
    }

    info!("Found {} movie records", files.len());
    Ok(files.into_values().collect())
}

/// Split `items` into `chunk_count` contiguous chunks whose lengths differ by at most one.
/// Empty chunks are dropped.
pub fn split_chunks<T>(items: &[T], chunk_count: usize) -> Vec<&[T]> {
    let chunk_count = chunk_count.max(1);
    let base = items.len() / chunk_count;
    let extra = items.len() % chunk_count;

    let mut chunks = Vec::with_capacity(chunk_count.min(items.len()));
    let mut start = 0;
    for i in 0..chunk_count {
        let len = base + usize::from(i < extra);
        if len == 0 {
            break;
        }
        chunks.push(&items[start..start + len]);
        start += len;
    }
    chunks
}

/// Build one row per movie record in `config.input_dir` and write the table.
///
/// Rows are produced by a fixed pool of `worker_count` threads in no particular order
/// and collected into a map keyed by movie ID, so the written table is always sorted.
pub fn run(config: &Config, source: Arc<dyn EntitySource>) -> Result<BatchSummary> {
    let started = Instant::now();

    create_dir_all(&config.output_dir)
        .with_context(|| format!("creating {}", config.output_dir.display()))?;
    info!("Output directory: {}", config.output_dir.display());

    let files = find_movie_files(&config.input_dir)?;
    let chunks = split_chunks(&files, config.chunk_count);

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.worker_count)
        .thread_name(|i| format!("movie-chars-worker-{}", i))
        .build()?;
    info!(
        "Processing {} movies in {} chunks with {} workers",
        files.len(),
        chunks.len(),
        config.worker_count
    );

    let cache = EntityCache::new(&config.output_dir, source);

    let progress = if config.show_progress {
        ProgressBar::new(chunks.len() as u64)
    } else {
        ProgressBar::hidden()
    };
    progress.set_style(ProgressStyle::with_template(
        "[{elapsed_precise}] {bar:50.cyan/blue} {pos:>5}/{len:5} chunks | {msg}",
    )?);
    progress.set_message("Collecting movie claims...");

    let (row_tx, row_rx) = unbounded::<MovieRow>();
    let collector = thread::spawn(move || {
        let mut rows = BTreeMap::new();
        for row in row_rx {
            rows.insert(row.movie_id.clone(), row);
        }
        rows
    });

    let throttle = config.throttle;
    let processed: Result<()> = chunks.iter().try_for_each(|chunk| {
        pool.install(|| {
            chunk
                .par_iter()
                .try_for_each_with(row_tx.clone(), |tx, path| -> Result<()> {
                    let row = build_row(path, &cache, &config.properties)?;
                    thread::sleep(throttle);
                    tx.send(row)
                        .map_err(|_| anyhow!("row collector stopped early"))?;
                    Ok(())
                })
        })?;
        progress.inc(1);
        Ok(())
    });

    // Closing the last sender ends the collector loop.
    drop(row_tx);
    let rows = collector
        .join()
        .map_err(|_| anyhow!("row collector panicked"))?;
    processed?;

    progress.finish_with_message("Claims collection complete");

    let rows: Vec<MovieRow> = rows.into_values().collect();
    let outputs = write_table(config, &rows)?;

    let summary = BatchSummary {
        movies: files.len(),
        rows: rows.len(),
        cache: cache.stats().snapshot(),
        outputs,
        elapsed_secs: started.elapsed().as_secs_f64(),
    };

    let summary_path = config.table_path().with_extension("summary.json");
    fs::write(&summary_path, serde_json::to_vec_pretty(&summary)?)
        .with_context(|| format!("writing {}", summary_path.display()))?;

    info!("Final Processing Statistics:");
    info!("  Movie records: {}", summary.movies);
    info!("  Rows written: {}", summary.rows);
    info!("  Cache hits: {}", summary.cache.hits);
    info!("  Entities fetched: {}", summary.cache.fetched);
    info!("  Entities unavailable: {}", summary.cache.unavailable);
    info!("  Elapsed: {:.1}s", summary.elapsed_secs);

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn movie_id_strips_json_suffixes() {
        assert_eq!(
            movie_id_from_path(Path::new("/data/Q42.json")),
            Some("Q42".to_string())
        );
        assert_eq!(
            movie_id_from_path(Path::new("Q7.json.gz")),
            Some("Q7".to_string())
        );
        assert_eq!(movie_id_from_path(Path::new("notes.txt")), None);
        assert_eq!(movie_id_from_path(Path::new(".json")), None);
    }

    #[test]
    fn chunks_are_balanced() {
        let items: Vec<u32> = (0..10).collect();
        let chunks = split_chunks(&items, 3);
        let lens: Vec<usize> = chunks.iter().map(|c| c.len()).collect();
        assert_eq!(lens, vec![4, 3, 3]);
        assert_eq!(chunks.concat(), items);
    }

    #[test]
    fn more_chunks_than_items_drops_empties() {
        let items = [1, 2];
        assert_eq!(split_chunks(&items, 1000).len(), 2);
        assert!(split_chunks::<u8>(&[], 5).is_empty());
        assert_eq!(split_chunks(&items, 0).len(), 1);
    }

    #[test]
    fn plain_record_wins_over_gzipped_duplicate() {
        let tmp = tempfile::tempdir().unwrap();
        for name in ["Q1.json", "Q1.json.gz", "Q2.json.gz"] {
            fs::write(tmp.path().join(name), "{}").unwrap();
        }

        let files = find_movie_files(tmp.path()).unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["Q1.json", "Q2.json.gz"]);
    }

    #[test]
    fn finds_plain_and_gzipped_records_only() {
        let tmp = tempfile::tempdir().unwrap();
        for name in ["Q2.json", "Q1.json.gz", "readme.md", "Q3.json.bak"] {
            fs::write(tmp.path().join(name), "{}").unwrap();
        }
        fs::create_dir(tmp.path().join("Q9.json")).unwrap();

        let files = find_movie_files(tmp.path()).unwrap();
        let ids: Vec<String> = files.iter().filter_map(|p| movie_id_from_path(p)).collect();
        assert_eq!(ids, vec!["Q1", "Q2"]);
    }
}
