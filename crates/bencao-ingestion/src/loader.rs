//! Reading import files.
//!
//! Two layouts are accepted:
//!
//! - an envelope naming its kind: `{"kind": "herbs", "records": [...]}`
//! - a bare array, only when the caller says which kind it holds
//!
//! Contraindication arrays may also use the grouped layout
//! `[{"type": T, "rules": [{"herb1": A, "herb2": B, ...}]}]`, which is
//! flattened into one record per rule named `"A - B"`.

use std::path::Path;

use bencao_common::EntityKind;
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::error::{ImportError, Result};
use crate::pipeline::ImportBundle;

/// Records read from one file, with the kind they belong to.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedRecords {
    pub kind: EntityKind,
    pub records: Vec<Value>,
}

/// Parse file contents. `kind` is the caller's selection, if any.
pub fn parse_records(text: &str, kind: Option<EntityKind>) -> Result<LoadedRecords> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| ImportError::Format(format!("invalid JSON: {e}")))?;

    let (kind, records) = match value {
        Value::Object(mut envelope) => {
            let declared = match envelope.get("kind") {
                None | Some(Value::Null) => None,
                Some(Value::String(s)) => Some(
                    s.parse::<EntityKind>()
                        .map_err(|e| ImportError::Format(e.to_string()))?,
                ),
                Some(_) => return Err(ImportError::Format("`kind` must be a string".to_string())),
            };
            let kind = match (declared, kind) {
                (Some(d), Some(c)) if d != c => {
                    return Err(ImportError::Format(format!(
                        "file declares kind `{d}` but `{c}` was requested"
                    )))
                }
                (Some(k), _) | (None, Some(k)) => k,
                (None, None) => {
                    return Err(ImportError::Format(
                        "envelope has no `kind`; pass one explicitly".to_string(),
                    ))
                }
            };
            match envelope.remove("records") {
                Some(Value::Array(records)) => (kind, records),
                Some(_) => return Err(ImportError::Format("`records` must be an array".to_string())),
                None => return Err(ImportError::Format("envelope has no `records` array".to_string())),
            }
        }
        Value::Array(records) => match kind {
            Some(k) => (k, records),
            None => {
                return Err(ImportError::Format(
                    "bare array input needs an explicit kind".to_string(),
                ))
            }
        },
        _ => {
            return Err(ImportError::Format(
                "expected a JSON array or a {\"kind\", \"records\"} object".to_string(),
            ))
        }
    };

    let records = if kind == EntityKind::Contraindications {
        flatten_grouped_contraindications(records)
    } else {
        records
    };
    Ok(LoadedRecords { kind, records })
}

/// Read and parse one file.
pub fn load_file(path: &Path, kind: Option<EntityKind>) -> Result<LoadedRecords> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| ImportError::Format(format!("cannot read {}: {e}", path.display())))?;
    let loaded = parse_records(&text, kind)
        .map_err(|e| match e {
            ImportError::Format(msg) => ImportError::Format(format!("{}: {msg}", path.display())),
            other => other,
        })?;
    info!(path = %path.display(), kind = %loaded.kind, records = loaded.records.len(), "Loaded import file");
    Ok(loaded)
}

/// Read the standard fixture files of a data directory.
///
/// Missing files are skipped; a directory holding none of them is an error.
pub fn load_data_dir(dir: &Path) -> Result<ImportBundle> {
    let mut bundle = ImportBundle::new();
    let mut found = 0;
    for kind in EntityKind::ORDER {
        let path = dir.join(kind.fixture_file());
        if !path.is_file() {
            warn!(path = %path.display(), kind = %kind, "Fixture file not found, skipping");
            continue;
        }
        let loaded = load_file(&path, Some(kind))?;
        bundle.add(loaded.kind, loaded.records);
        found += 1;
    }
    if found == 0 {
        return Err(ImportError::Format(format!(
            "no fixture files found in {}",
            dir.display()
        )));
    }
    Ok(bundle)
}

fn flatten_grouped_contraindications(records: Vec<Value>) -> Vec<Value> {
    let mut flat = Vec::with_capacity(records.len());
    for record in records {
        let Value::Object(mut group) = record else {
            flat.push(record);
            continue;
        };
        let Some(Value::Array(rules)) = group.remove("rules") else {
            flat.push(Value::Object(group));
            continue;
        };
        let group_type = group.get("type").cloned();
        for rule in rules {
            flat.push(expand_rule(rule, group_type.as_ref()));
        }
    }
    flat
}

fn expand_rule(rule: Value, group_type: Option<&Value>) -> Value {
    let Value::Object(mut rule) = rule else {
        return rule;
    };
    let herb_a = take_herb(&mut rule, "herb1");
    let herb_b = take_herb(&mut rule, "herb2");

    let mut out = Map::new();
    if !herb_a.is_empty() && !herb_b.is_empty() {
        out.insert("name".to_string(), Value::String(format!("{herb_a} - {herb_b}")));
    }
    if let Some(t) = group_type {
        out.insert("type".to_string(), t.clone());
    }
    out.insert("herb_a".to_string(), Value::String(herb_a));
    out.insert("herb_b".to_string(), Value::String(herb_b));
    // Per-rule fields win over the group's.
    out.extend(rule);
    Value::Object(out)
}

fn take_herb(rule: &mut Map<String, Value>, key: &str) -> String {
    match rule.remove(key) {
        Some(Value::String(s)) => s.trim().to_string(),
        _ => String::new(),
    }
}
