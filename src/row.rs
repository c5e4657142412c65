use anyhow::{anyhow, Result};
use std::path::Path;

use crate::batch::movie_id_from_path;
use crate::cache::EntityCache;
use crate::config::{ClaimProperties, CAST_SLOTS};
use crate::extract::{Extractor, MovieRecord};

/// Column order of the output table; `movie_id` is the index column.
pub const COLUMNS: [&str; 4 + CAST_SLOTS] = [
    "movie_id",
    "director_id",
    "producer_id",
    "box_office_value",
    "cast_id_0",
    "cast_id_1",
    "cast_id_2",
    "cast_id_3",
    "cast_id_4",
];

#[derive(Debug, Clone, PartialEq)]
pub struct MovieRow {
    pub movie_id: String,
    pub director_id: Option<String>,
    pub producer_id: Option<String>,
    pub box_office_value: Option<f64>,
    pub cast_ids: [Option<String>; CAST_SLOTS],
}

/// Fit a cast list into exactly `CAST_SLOTS` slots, null-padded on the right.
pub fn pad_cast(cast: Option<Vec<String>>) -> [Option<String>; CAST_SLOTS] {
    let mut slots: [Option<String>; CAST_SLOTS] = Default::default();
    for (slot, id) in slots.iter_mut().zip(cast.unwrap_or_default()) {
        *slot = Some(id);
    }
    slots
}

impl MovieRow {
    pub fn new(
        movie_id: impl Into<String>,
        director_id: Option<String>,
        producer_id: Option<String>,
        cast: Option<Vec<String>>,
        box_office_value: Option<f64>,
    ) -> Self {
        Self {
            movie_id: movie_id.into(),
            director_id,
            producer_id,
            box_office_value,
            cast_ids: pad_cast(cast),
        }
    }

    /// Row with every field but the ID missing.
    pub fn empty(movie_id: impl Into<String>) -> Self {
        Self::new(movie_id, None, None, None, None)
    }
}

/// Build the row for one movie file, caching its director, producer and cast documents.
pub fn build_row(
    movie_file: &Path,
    cache: &EntityCache,
    props: &ClaimProperties,
) -> Result<MovieRow> {
    let movie_id = movie_id_from_path(movie_file)
        .ok_or_else(|| anyhow!("no movie id in file name {}", movie_file.display()))?;

    let record = MovieRecord::load(&movie_id, movie_file)?;
    let movie_dir = cache.movie_dir(&movie_id)?;
    let extractor = Extractor::new(cache);

    let director_id = extractor.single_reference(&record, &props.director, &movie_dir)?;
    let producer_id = extractor.single_reference(&record, &props.producer, &movie_dir)?;
    let cast = extractor.multi_reference(&record, &props.cast, &movie_dir)?;
    let box_office_value = extractor.scalar_amount(&record, &props.box_office);

    Ok(MovieRow::new(
        movie_id,
        director_id,
        producer_id,
        cast,
        box_office_value,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_cast_is_five_nulls() {
        assert_eq!(pad_cast(None), [None, None, None, None, None]);
        assert_eq!(pad_cast(Some(vec![])), [None, None, None, None, None]);
    }

    #[test]
    fn short_cast_is_right_padded() {
        let slots = pad_cast(Some(vec!["Q1".to_string(), "Q2".to_string()]));
        assert_eq!(
            slots,
            [Some("Q1".to_string()), Some("Q2".to_string()), None, None, None]
        );
    }

    #[test]
    fn long_cast_is_truncated() {
        let cast: Vec<String> = (0..7).map(|i| format!("Q{}", i)).collect();
        let slots = pad_cast(Some(cast));
        assert_eq!(slots.len(), CAST_SLOTS);
        assert_eq!(slots[4].as_deref(), Some("Q4"));
    }

    #[test]
    fn empty_row_keeps_id() {
        let row = MovieRow::empty("Q42");
        assert_eq!(row.movie_id, "Q42");
        assert!(row.director_id.is_none() && row.box_office_value.is_none());
        assert!(row.cast_ids.iter().all(Option::is_none));
    }
}
