//! Reference-data entities mirroring the storage tables.
//! These are the normalised forms produced by the import validator.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::UnknownKind;

/// A storage row: a flat JSON object keyed by column name.
pub type Row = Map<String, Value>;

// ---------------------------------------------------------------------------
// Entity kind
// ---------------------------------------------------------------------------

/// Which category of reference data a record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Herbs,
    Formulas,
    Contraindications,
    Meridians,
    Acupoints,
}

impl EntityKind {
    /// Fixed import order. Acupoints come after meridians because they
    /// reference them by name.
    pub const ORDER: [EntityKind; 5] = [
        EntityKind::Herbs,
        EntityKind::Formulas,
        EntityKind::Contraindications,
        EntityKind::Meridians,
        EntityKind::Acupoints,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Herbs             => "herbs",
            EntityKind::Formulas          => "formulas",
            EntityKind::Contraindications => "contraindications",
            EntityKind::Meridians         => "meridians",
            EntityKind::Acupoints         => "acupoints",
        }
    }

    /// Human-readable category name used in logs and reports.
    pub fn label(&self) -> &'static str {
        match self {
            EntityKind::Herbs             => "Herbs (中药)",
            EntityKind::Formulas          => "Formulas (方剂)",
            EntityKind::Contraindications => "Contraindications (配伍禁忌)",
            EntityKind::Meridians         => "Meridians (经络)",
            EntityKind::Acupoints         => "Acupoints (穴位)",
        }
    }

    /// Storage table the kind is persisted to.
    pub fn table(&self) -> &'static str {
        match self {
            EntityKind::Herbs             => "herbs",
            EntityKind::Formulas          => "formulas",
            EntityKind::Contraindications => "herb_contraindications",
            EntityKind::Meridians         => "meridians",
            EntityKind::Acupoints         => "acupoints",
        }
    }

    /// Natural key columns used as the upsert conflict target.
    pub fn conflict_keys(&self) -> &'static [&'static str] {
        match self {
            EntityKind::Acupoints => &["name", "meridian_id"],
            _ => &["name"],
        }
    }

    /// Records per batch. Formulas are structurally heavier, so smaller.
    pub fn default_batch_size(&self) -> usize {
        match self {
            EntityKind::Herbs             => 10,
            EntityKind::Formulas          => 5,
            EntityKind::Contraindications => 20,
            EntityKind::Meridians         => 10,
            EntityKind::Acupoints         => 20,
        }
    }

    /// Pause between batches, to stay under the backend's rate limit.
    pub fn default_batch_delay(&self) -> Duration {
        let ms = match self {
            EntityKind::Herbs             => 100,
            EntityKind::Formulas          => 150,
            EntityKind::Contraindications => 50,
            EntityKind::Meridians         => 100,
            EntityKind::Acupoints         => 80,
        };
        Duration::from_millis(ms)
    }

    /// Fixture file name inside a data directory.
    pub fn fixture_file(&self) -> &'static str {
        match self {
            EntityKind::Herbs             => "herbs_data.json",
            EntityKind::Formulas          => "formulas_data.json",
            EntityKind::Contraindications => "herb_contraindications.json",
            EntityKind::Meridians         => "meridians_data.json",
            EntityKind::Acupoints         => "acupoints_data.json",
        }
    }

    /// Placeholder identity for records that carry no usable name.
    pub fn unnamed_item(&self) -> &'static str {
        match self {
            EntityKind::Herbs             => "<unnamed herb>",
            EntityKind::Formulas          => "<unnamed formula>",
            EntityKind::Contraindications => "<unnamed contraindication>",
            EntityKind::Meridians         => "<unnamed meridian>",
            EntityKind::Acupoints         => "<unnamed acupoint>",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "herbs" | "herb" | "中药" => Ok(EntityKind::Herbs),
            "formulas" | "formula" | "方剂" => Ok(EntityKind::Formulas),
            "contraindications" | "contraindication" | "herb_contraindications" | "配伍禁忌" => {
                Ok(EntityKind::Contraindications)
            }
            "meridians" | "meridian" | "经络" => Ok(EntityKind::Meridians),
            "acupoints" | "acupoint" | "穴位" => Ok(EntityKind::Acupoints),
            other => Err(UnknownKind(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Herb
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Herb {
    pub name: String,
    pub pinyin: Option<String>,
    pub latin_name: Option<String>,
    pub nature_flavor: Option<String>,
    pub meridian_tropism: Option<String>,
    pub efficacy: Option<String>,
    pub usage_dosage: Option<String>,
    pub contraindications: Option<String>,
    pub category: Option<String>,
    pub property: Option<String>,
    pub toxicity_level: String, // none | low | medium | high
    pub processing_method: Option<String>,
    pub origin: Option<String>,
    pub quality_identification: Option<String>,
    pub storage_method: Option<String>,
    pub image_url: Option<String>,
    pub tags: Vec<String>,
}

// ---------------------------------------------------------------------------
// Formula
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Formula {
    pub name: String,
    pub pinyin: Option<String>,
    pub composition: String,
    pub dosage: Option<String>,
    pub decoction_method: Option<String>,
    pub efficacy: Option<String>,
    pub indications: Option<String>,
    pub usage: Option<String>,
    pub contraindications: Option<String>,
    pub source: Option<String>,
    pub category: Option<String>,
    pub syndrome: Option<String>,
    pub disease_type: Option<String>,
    pub therapeutic_principle: Option<String>,
    pub clinical_application: Option<String>,
    pub modern_research: Option<String>,
    pub tags: Vec<String>,
}

// ---------------------------------------------------------------------------
// Contraindication (herb pair)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contraindication {
    pub name: String,
    #[serde(rename = "type")]
    pub contraindication_type: String, // e.g. eighteen_incompatible
    pub herb_a: String,
    pub herb_b: String,
    pub description: Option<String>,
    pub severity: String,
    pub mechanism: Option<String>,
    pub clinical_manifestation: Option<String>,
    pub management: Option<String>,
    pub references_text: Option<String>,
}

// ---------------------------------------------------------------------------
// Meridian
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeridianType {
    Regular,
    Extraordinary,
}

impl MeridianType {
    /// Map an English or Chinese label. Unrecognised labels yield `None`.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim() {
            "regular" | "十二正经" => Some(MeridianType::Regular),
            "extraordinary" | "奇经八脉" => Some(MeridianType::Extraordinary),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MeridianType::Regular => "regular",
            MeridianType::Extraordinary => "extraordinary",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Meridian {
    pub name: String,
    #[serde(rename = "type")]
    pub meridian_type: MeridianType,
    pub pathway: Option<String>,
    pub main_functions: Option<String>,
    pub associated_organs: Option<String>,
    /// Free-form nested data; never interpreted by the importer.
    pub flow_points: Option<Value>,
}

// ---------------------------------------------------------------------------
// Acupoint
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Acupoint {
    pub name: String,
    pub meridian_name: String,
    pub location: String,
    pub location_method: Option<String>,
    pub indications: Option<String>,
    pub needle_depth: Option<String>,
    pub manipulation: Option<String>,
    /// Free-form nested data; never interpreted by the importer.
    pub coordinates_3d: Option<Value>,
    pub anatomical_landmarks: Option<String>,
}

impl Acupoint {
    /// Storage row: the meridian name is replaced by the resolved reference id.
    pub fn to_storage_row(&self, meridian_id: &Value) -> Result<Row, serde_json::Error> {
        let mut row = to_object(self)?;
        row.remove("meridian_name");
        row.insert("meridian_id".to_string(), meridian_id.clone());
        Ok(row)
    }
}

// ---------------------------------------------------------------------------
// Normalised record
// ---------------------------------------------------------------------------

/// Output of the validator: one record of any kind, ready to be written.
#[derive(Debug, Clone, PartialEq)]
pub enum NormalizedRecord {
    Herb(Herb),
    Formula(Formula),
    Contraindication(Contraindication),
    Meridian(Meridian),
    Acupoint(Acupoint),
}

impl NormalizedRecord {
    pub fn kind(&self) -> EntityKind {
        match self {
            NormalizedRecord::Herb(_)             => EntityKind::Herbs,
            NormalizedRecord::Formula(_)          => EntityKind::Formulas,
            NormalizedRecord::Contraindication(_) => EntityKind::Contraindications,
            NormalizedRecord::Meridian(_)         => EntityKind::Meridians,
            NormalizedRecord::Acupoint(_)         => EntityKind::Acupoints,
        }
    }

    /// The trimmed natural name of the record.
    pub fn identity(&self) -> &str {
        match self {
            NormalizedRecord::Herb(r)             => &r.name,
            NormalizedRecord::Formula(r)          => &r.name,
            NormalizedRecord::Contraindication(r) => &r.name,
            NormalizedRecord::Meridian(r)         => &r.name,
            NormalizedRecord::Acupoint(r)         => &r.name,
        }
    }

    /// The record as a JSON object, field for field.
    ///
    /// For acupoints this still carries `meridian_name`; use
    /// [`Acupoint::to_storage_row`] once the meridian has been resolved.
    pub fn to_row(&self) -> Result<Row, serde_json::Error> {
        match self {
            NormalizedRecord::Herb(r)             => to_object(r),
            NormalizedRecord::Formula(r)          => to_object(r),
            NormalizedRecord::Contraindication(r) => to_object(r),
            NormalizedRecord::Meridian(r)         => to_object(r),
            NormalizedRecord::Acupoint(r)         => to_object(r),
        }
    }
}

fn to_object<T: Serialize>(value: &T) -> Result<Row, serde_json::Error> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(serde::ser::Error::custom(format!(
            "expected a JSON object, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_kind_order_puts_meridians_before_acupoints() {
        let pos = |k| EntityKind::ORDER.iter().position(|x| *x == k).unwrap();
        assert!(pos(EntityKind::Meridians) < pos(EntityKind::Acupoints));
        assert_eq!(EntityKind::ORDER[0], EntityKind::Herbs);
    }

    #[test]
    fn test_kind_parses_english_and_chinese_labels() {
        assert_eq!("herbs".parse::<EntityKind>().unwrap(), EntityKind::Herbs);
        assert_eq!("Formula".parse::<EntityKind>().unwrap(), EntityKind::Formulas);
        assert_eq!("配伍禁忌".parse::<EntityKind>().unwrap(), EntityKind::Contraindications);
        assert_eq!("穴位".parse::<EntityKind>().unwrap(), EntityKind::Acupoints);
        assert!("minerals".parse::<EntityKind>().is_err());
    }

    #[test]
    fn test_acupoint_conflict_key_is_composite() {
        assert_eq!(EntityKind::Acupoints.conflict_keys(), &["name", "meridian_id"]);
        assert_eq!(EntityKind::Contraindications.table(), "herb_contraindications");
    }

    #[test]
    fn test_meridian_type_labels() {
        assert_eq!(MeridianType::from_label("十二正经"), Some(MeridianType::Regular));
        assert_eq!(MeridianType::from_label("奇经八脉"), Some(MeridianType::Extraordinary));
        assert_eq!(MeridianType::from_label("unknown"), None);
    }

    #[test]
    fn test_acupoint_storage_row_swaps_meridian_reference() {
        let ap = Acupoint {
            name: "中府".to_string(),
            meridian_name: "手太阴肺经".to_string(),
            location: "胸前壁外上方".to_string(),
            location_method: None,
            indications: None,
            needle_depth: None,
            manipulation: None,
            coordinates_3d: Some(serde_json::json!({"x": 1.0, "y": 2.0, "z": 0.5})),
            anatomical_landmarks: None,
        };
        let row = ap.to_storage_row(&Value::from("m-1")).unwrap();
        assert!(!row.contains_key("meridian_name"));
        assert_eq!(row["meridian_id"], "m-1");
        assert_eq!(row["coordinates_3d"]["z"], 0.5);
    }

    #[test]
    fn test_contraindication_type_serialises_as_type() {
        let c = Contraindication {
            name: "甘草 - 甘遂".to_string(),
            contraindication_type: "eighteen_incompatible".to_string(),
            herb_a: "甘草".to_string(),
            herb_b: "甘遂".to_string(),
            description: None,
            severity: "high".to_string(),
            mechanism: None,
            clinical_manifestation: None,
            management: None,
            references_text: None,
        };
        let row = NormalizedRecord::Contraindication(c).to_row().unwrap();
        assert_eq!(row["type"], "eighteen_incompatible");
        assert!(row["description"].is_null());
    }
}
