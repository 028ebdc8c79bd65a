//! Meridian name → storage id lookup for acupoints.

use std::collections::HashMap;

use bencao_common::EntityKind;
use bencao_db::{DbError, Store};
use serde_json::Value;
use tracing::debug;

use crate::error::{ImportError, Result};

/// Snapshot of `meridians (id, name)` taken once per acupoint phase.
///
/// Loading it after the meridian phase has finished is what guarantees
/// acupoints see every meridian written in the same run.
#[derive(Debug, Clone, Default)]
pub struct MeridianResolver {
    ids: HashMap<String, Vec<Value>>,
}

impl MeridianResolver {
    pub async fn load(store: &dyn Store) -> std::result::Result<Self, DbError> {
        let rows = store.select(EntityKind::Meridians.table(), &[], None).await?;
        let mut ids: HashMap<String, Vec<Value>> = HashMap::new();
        for row in rows {
            let (Some(name), Some(id)) = (row.get("name").and_then(Value::as_str), row.get("id")) else {
                continue;
            };
            ids.entry(name.trim().to_string()).or_default().push(id.clone());
        }
        debug!(meridians = ids.len(), "meridian snapshot loaded");
        Ok(Self { ids })
    }

    /// Build from `(name, id)` pairs.
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, Value)>,
        S: Into<String>,
    {
        let mut ids: HashMap<String, Vec<Value>> = HashMap::new();
        for (name, id) in pairs {
            ids.entry(name.into().trim().to_string()).or_default().push(id);
        }
        Self { ids }
    }

    /// The single id stored under `name` (exact match after trimming).
    pub fn resolve(&self, name: &str) -> Result<&Value> {
        let name = name.trim();
        match self.ids.get(name).map(Vec::as_slice) {
            None | Some([]) => Err(ImportError::ReferenceNotFound { meridian: name.to_string() }),
            Some([id]) => Ok(id),
            Some(many) => Err(ImportError::AmbiguousReference {
                meridian: name.to_string(),
                matches: many.len(),
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}
