//! Movie metadata collector.
//!
//! Walks a directory of per-movie knowledge-base records, resolves the director,
//! producer, top cast and box-office claims of each movie, caches every referenced
//! entity document on disk and writes one fixed-width row per movie.

// Macro for walking a claim down to its `mainsnak.datavalue.value` object
macro_rules! claim_value {
    ($claim:expr) => {
        $claim
            .get("mainsnak")
            .and_then(|v| v.get("datavalue"))
            .and_then(|v| v.get("value"))
    };
}

// Macro for creating Arrow schema fields
macro_rules! field {
    ($name:expr, $data_type:expr) => {
        Field::new($name, $data_type, true)
    };
    ($name:expr, $data_type:expr, $nullable:expr) => {
        Field::new($name, $data_type, $nullable)
    };
}

// Macro for creating schemas with less boilerplate
macro_rules! schema {
    ($($name:expr => $data_type:expr $(, $nullable:expr)?);* $(;)?) => {
        Schema::new(vec![
            $(field!($name, $data_type $(, $nullable)?),)*
        ])
    };
}

pub mod batch;
pub mod cache;
pub mod config;
pub mod extract;
pub mod fetch;
pub mod output;
pub mod row;

pub use batch::{run, BatchSummary};
pub use config::{ClaimProperties, Config};
pub use fetch::{EntitySource, HttpFetcher};
pub use output::OutputFormat;
pub use row::MovieRow;
