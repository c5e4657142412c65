use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use serde_json::{Map, Value};
use std::fs;
use std::io::Read;
use std::path::Path;
use tracing::warn;

use crate::cache::EntityCache;
use crate::config::CAST_SLOTS;

/// One movie record: its ID and the claims mapping (property ID -> claim list).
#[derive(Debug, Clone, Default)]
pub struct MovieRecord {
    pub id: String,
    claims: Map<String, Value>,
}

impl MovieRecord {
    /// Pull the claims out of an entity document.
    ///
    /// Looks at `entities.<id>.claims` first; a document holding a single entity under
    /// another key (a redirect) uses that entity, and a bare `claims` object is accepted.
    pub fn from_document(id: &str, document: &Value) -> Self {
        let entity = match document.get("entities").and_then(|v| v.as_object()) {
            Some(entities) => entities.get(id).or_else(|| {
                if entities.len() == 1 {
                    entities.values().next()
                } else {
                    None
                }
            }),
            None => Some(document),
        };

        let claims = entity
            .and_then(|e| e.get("claims"))
            .and_then(|v| v.as_object())
            .cloned()
            .unwrap_or_default();

        Self {
            id: id.to_string(),
            claims,
        }
    }

    /// Read a record from disk, transparently decoding `.gz` files.
    ///
    /// Only failing to read the file is an error. A body that does not decompress or
    /// is not valid JSON produces a record with no claims.
    pub fn load(id: &str, path: &Path) -> Result<Self> {
        let raw = fs::read(path).with_context(|| format!("reading {}", path.display()))?;

        let document = if path.extension().is_some_and(|ext| ext == "gz") {
            let mut decoded = Vec::new();
            GzDecoder::new(raw.as_slice())
                .read_to_end(&mut decoded)
                .map_err(anyhow::Error::from)
                .and_then(|_| Ok(serde_json::from_slice::<Value>(&decoded)?))
        } else {
            serde_json::from_slice::<Value>(&raw).map_err(anyhow::Error::from)
        };

        match document {
            Ok(document) => Ok(Self::from_document(id, &document)),
            Err(e) => {
                warn!("Malformed movie record {}: {}", path.display(), e);
                Ok(Self {
                    id: id.to_string(),
                    claims: Map::new(),
                })
            }
        }
    }

    pub fn claims(&self, property: &str) -> Option<&Vec<Value>> {
        self.claims.get(property).and_then(|v| v.as_array())
    }

    fn first_claim(&self, property: &str) -> Option<&Value> {
        self.claims(property).and_then(|claims| claims.first())
    }
}

/// Entity ID referenced by a claim (`mainsnak.datavalue.value.id`).
///
/// The ID names a cache file, so IDs that could leave the movie directory are rejected.
pub fn referenced_id(claim: &Value) -> Option<&str> {
    claim_value!(claim)
        .and_then(|v| v.get("id"))
        .and_then(|v| v.as_str())
        .filter(|id| is_safe_entity_id(id))
}

fn is_safe_entity_id(id: &str) -> bool {
    !id.is_empty() && !id.contains(['/', '\\']) && !id.contains("..")
}

/// Numeric amount of a quantity claim; string amounts such as `"+1000000"` are parsed.
pub fn claim_amount(claim: &Value) -> Option<f64> {
    match claim_value!(claim).and_then(|v| v.get("amount"))? {
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

/// Resolves claim fields of a movie, caching every referenced entity it returns.
pub struct Extractor<'a> {
    cache: &'a EntityCache,
}

impl<'a> Extractor<'a> {
    pub fn new(cache: &'a EntityCache) -> Self {
        Self { cache }
    }

    /// First reference under `property`, cached into `movie_dir`.
    pub fn single_reference(
        &self,
        record: &MovieRecord,
        property: &str,
        movie_dir: &Path,
    ) -> Result<Option<String>> {
        let Some(entity_id) = record.first_claim(property).and_then(referenced_id) else {
            return Ok(None);
        };

        self.cache.ensure(movie_dir, entity_id)?;
        Ok(Some(entity_id.to_string()))
    }

    /// References of the first `CAST_SLOTS` claims under `property`, in claim order.
    ///
    /// If any claim in that window has no usable reference the whole field is absent,
    /// and nothing is fetched.
    pub fn multi_reference(
        &self,
        record: &MovieRecord,
        property: &str,
        movie_dir: &Path,
    ) -> Result<Option<Vec<String>>> {
        let Some(claims) = record.claims(property) else {
            return Ok(None);
        };

        let Some(ids) = claims
            .iter()
            .take(CAST_SLOTS)
            .map(referenced_id)
            .collect::<Option<Vec<&str>>>()
        else {
            return Ok(None);
        };

        for entity_id in &ids {
            self.cache.ensure(movie_dir, entity_id)?;
        }
        Ok(Some(ids.into_iter().map(str::to_string).collect()))
    }

    /// Amount of the first claim under `property`.
    pub fn scalar_amount(&self, record: &MovieRecord, property: &str) -> Option<f64> {
        record.first_claim(property).and_then(claim_amount)
    }
}
