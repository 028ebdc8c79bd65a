//! Record validation and normalisation.
//!
//! Turns one raw JSON record into a typed [`NormalizedRecord`]: required
//! fields present and non-blank, strings trimmed, blank optionals mapped
//! to `None`, defaults applied. Pure, so running it over its own output
//! gives the same record back.

use bencao_common::{
    Acupoint, Contraindication, EntityKind, Formula, Herb, Meridian, MeridianType,
    NormalizedRecord, ValidationError,
};
use serde_json::{Map, Value};

const DEFAULT_TOXICITY: &str = "none";
const DEFAULT_SEVERITY: &str = "high";

/// Validate and normalise `raw` as a record of `kind`.
pub fn normalize(kind: EntityKind, raw: &Value) -> Result<NormalizedRecord, ValidationError> {
    Ok(match kind {
        EntityKind::Herbs => NormalizedRecord::Herb(normalize_herb(raw)?),
        EntityKind::Formulas => NormalizedRecord::Formula(normalize_formula(raw)?),
        EntityKind::Contraindications => {
            NormalizedRecord::Contraindication(normalize_contraindication(raw)?)
        }
        EntityKind::Meridians => NormalizedRecord::Meridian(normalize_meridian(raw)?),
        EntityKind::Acupoints => NormalizedRecord::Acupoint(normalize_acupoint(raw)?),
    })
}

/// Best-effort display name of a raw record, for error attribution when
/// validation fails before a name is known.
pub fn raw_identity(kind: EntityKind, raw: &Value) -> String {
    raw.get("name")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| kind.unnamed_item().to_string())
}

pub fn normalize_herb(raw: &Value) -> Result<Herb, ValidationError> {
    let f = Fields::new(raw)?;
    Ok(Herb {
        name: f.required("name")?,
        pinyin: f.optional("pinyin")?,
        latin_name: f.optional("latin_name")?,
        nature_flavor: f.optional("nature_flavor")?,
        meridian_tropism: f.optional("meridian_tropism")?,
        efficacy: f.optional("efficacy")?,
        usage_dosage: f.optional("usage_dosage")?,
        contraindications: f.optional("contraindications")?,
        category: f.optional("category")?,
        property: f.optional("property")?,
        toxicity_level: f.optional("toxicity_level")?.unwrap_or_else(|| DEFAULT_TOXICITY.to_string()),
        processing_method: f.optional("processing_method")?,
        origin: f.optional("origin")?,
        quality_identification: f.optional("quality_identification")?,
        storage_method: f.optional("storage_method")?,
        image_url: f.optional("image_url")?,
        tags: f.tags(),
    })
}

pub fn normalize_formula(raw: &Value) -> Result<Formula, ValidationError> {
    let f = Fields::new(raw)?;
    Ok(Formula {
        name: f.required("name")?,
        composition: f.required("composition")?,
        pinyin: f.optional("pinyin")?,
        dosage: f.optional("dosage")?,
        decoction_method: f.optional("decoction_method")?,
        efficacy: f.optional("efficacy")?,
        indications: f.optional("indications")?,
        usage: f.optional("usage")?,
        contraindications: f.optional("contraindications")?,
        source: f.optional("source")?,
        category: f.optional("category")?,
        syndrome: f.optional("syndrome")?,
        disease_type: f.optional("disease_type")?,
        therapeutic_principle: f.optional("therapeutic_principle")?,
        clinical_application: f.optional("clinical_application")?,
        modern_research: f.optional("modern_research")?,
        tags: f.tags(),
    })
}

pub fn normalize_contraindication(raw: &Value) -> Result<Contraindication, ValidationError> {
    let f = Fields::new(raw)?;
    Ok(Contraindication {
        name: f.required("name")?,
        contraindication_type: f.required("type")?,
        herb_a: f.required("herb_a")?,
        herb_b: f.required("herb_b")?,
        description: f.optional("description")?,
        severity: f.optional("severity")?.unwrap_or_else(|| DEFAULT_SEVERITY.to_string()),
        mechanism: f.optional("mechanism")?,
        clinical_manifestation: f.optional("clinical_manifestation")?,
        management: f.optional("management")?,
        references_text: f.optional("references_text")?,
    })
}

pub fn normalize_meridian(raw: &Value) -> Result<Meridian, ValidationError> {
    let f = Fields::new(raw)?;
    let name = f.required("name")?;
    // Missing, non-string or unknown labels fall back to the twelve regular channels.
    let meridian_type = f
        .0
        .get("type")
        .and_then(Value::as_str)
        .and_then(MeridianType::from_label)
        .unwrap_or(MeridianType::Regular);
    Ok(Meridian {
        name,
        meridian_type,
        pathway: f.optional("pathway")?,
        main_functions: f.optional("main_functions")?,
        associated_organs: f.optional("associated_organs")?,
        flow_points: f.opaque("flow_points"),
    })
}

pub fn normalize_acupoint(raw: &Value) -> Result<Acupoint, ValidationError> {
    let f = Fields::new(raw)?;
    Ok(Acupoint {
        name: f.required("name")?,
        location: f.required("location")?,
        meridian_name: f.required("meridian_name")?,
        location_method: f.optional("location_method")?,
        indications: f.optional("indications")?,
        needle_depth: f.optional("needle_depth")?,
        manipulation: f.optional("manipulation")?,
        anatomical_landmarks: f.optional("anatomical_landmarks")?,
        coordinates_3d: f.opaque("coordinates_3d"),
    })
}

// ── Field access ──────────────────────────────────────────────────────────────

struct Fields<'a>(&'a Map<String, Value>);

impl<'a> Fields<'a> {
    fn new(raw: &'a Value) -> Result<Self, ValidationError> {
        raw.as_object().map(Fields).ok_or(ValidationError::NotAnObject)
    }

    fn required(&self, field: &'static str) -> Result<String, ValidationError> {
        self.optional(field)?.ok_or(ValidationError::MissingField { field })
    }

    fn optional(&self, field: &'static str) -> Result<Option<String>, ValidationError> {
        match self.0.get(field) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => {
                let trimmed = s.trim();
                Ok((!trimmed.is_empty()).then(|| trimmed.to_string()))
            }
            Some(_) => Err(ValidationError::InvalidField { field, expected: "string" }),
        }
    }

    fn tags(&self) -> Vec<String> {
        match self.0.get("tags") {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        }
    }

    fn opaque(&self, field: &str) -> Option<Value> {
        self.0.get(field).filter(|v| !v.is_null()).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn renormalize(kind: EntityKind, raw: &Value) -> (NormalizedRecord, NormalizedRecord) {
        let once = normalize(kind, raw).unwrap();
        let again = normalize(kind, &Value::Object(once.to_row().unwrap())).unwrap();
        (once, again)
    }

    #[test]
    fn test_herb_trims_and_defaults() {
        let herb = normalize_herb(&json!({
            "name": "  人参 ",
            "pinyin": "renshen",
            "efficacy": "   ",
            "tags": ["补虚药", "  ", 3, " 名贵 "]
        }))
        .unwrap();

        assert_eq!(herb.name, "人参");
        assert_eq!(herb.pinyin.as_deref(), Some("renshen"));
        assert_eq!(herb.efficacy, None);
        assert_eq!(herb.toxicity_level, "none");
        assert_eq!(herb.tags, vec!["补虚药".to_string(), "名贵".to_string()]);
    }

    #[test]
    fn test_tags_non_array_become_empty() {
        let herb = normalize_herb(&json!({"name": "甘草", "tags": "补虚药"})).unwrap();
        assert!(herb.tags.is_empty());
    }

    #[test]
    fn test_blank_name_is_missing() {
        let err = normalize_herb(&json!({"name": "   "})).unwrap_err();
        assert_eq!(err, ValidationError::MissingField { field: "name" });
    }

    #[test]
    fn test_non_object_rejected() {
        assert_eq!(normalize(EntityKind::Herbs, &json!("人参")).unwrap_err(), ValidationError::NotAnObject);
        assert_eq!(normalize(EntityKind::Herbs, &json!(null)).unwrap_err(), ValidationError::NotAnObject);
    }

    #[test]
    fn test_wrong_type_is_invalid_field() {
        let err = normalize_formula(&json!({"name": "四君子汤", "composition": ["人参", "白术"]})).unwrap_err();
        assert_eq!(err, ValidationError::InvalidField { field: "composition", expected: "string" });

        let err = normalize_herb(&json!({"name": "人参", "origin": 12})).unwrap_err();
        assert_eq!(err.field(), Some("origin"));
    }

    #[test]
    fn test_formula_requires_composition() {
        let err = normalize_formula(&json!({"name": "四君子汤"})).unwrap_err();
        assert_eq!(err, ValidationError::MissingField { field: "composition" });
    }

    #[test]
    fn test_contraindication_required_fields_in_order() {
        let err = normalize_contraindication(&json!({"name": "甘草 - 甘遂", "type": "eighteen_incompatible", "herb_b": "甘遂"}))
            .unwrap_err();
        assert_eq!(err, ValidationError::MissingField { field: "herb_a" });

        let c = normalize_contraindication(&json!({
            "name": "甘草 - 甘遂",
            "type": "eighteen_incompatible",
            "herb_a": "甘草",
            "herb_b": "甘遂"
        }))
        .unwrap();
        assert_eq!(c.severity, "high");
    }

    #[test]
    fn test_non_string_meridian_type_is_regular() {
        for raw in [json!({"name": "手太阴肺经", "type": 1}), json!({"name": "手太阴肺经", "type": ["奇经八脉"]})] {
            let m = normalize_meridian(&raw).unwrap();
            assert_eq!(m.meridian_type, MeridianType::Regular);
        }
    }

    #[test]
    fn test_meridian_type_mapping() {
        let m = normalize_meridian(&json!({"name": "督脉", "type": "奇经八脉"})).unwrap();
        assert_eq!(m.meridian_type, MeridianType::Extraordinary);

        let m = normalize_meridian(&json!({"name": "手太阴肺经", "type": "something"})).unwrap();
        assert_eq!(m.meridian_type, MeridianType::Regular);

        let m = normalize_meridian(&json!({"name": "手太阴肺经"})).unwrap();
        assert_eq!(m.meridian_type, MeridianType::Regular);
    }

    #[test]
    fn test_acupoint_requires_meridian_name() {
        let err = normalize_acupoint(&json!({"name": "中府", "location": "胸前壁外上方"})).unwrap_err();
        assert_eq!(err, ValidationError::MissingField { field: "meridian_name" });
    }

    #[test]
    fn test_opaque_fields_pass_through() {
        let ap = normalize_acupoint(&json!({
            "name": "中府",
            "location": "胸前壁外上方",
            "meridian_name": "手太阴肺经",
            "coordinates_3d": {"x": 0.1, "y": [1, 2]}
        }))
        .unwrap();
        assert_eq!(ap.coordinates_3d, Some(json!({"x": 0.1, "y": [1, 2]})));
    }

    #[test]
    fn test_normalisation_is_idempotent() {
        let cases = [
            (EntityKind::Herbs, json!({"name": " 人参 ", "tags": [" 补虚药 "], "toxicity_level": " low "})),
            (EntityKind::Formulas, json!({"name": "四君子汤", "composition": " 人参、白术、茯苓、甘草 "})),
            (
                EntityKind::Contraindications,
                json!({"name": "甘草 - 甘遂", "type": "eighteen_incompatible", "herb_a": "甘草", "herb_b": "甘遂", "severity": ""}),
            ),
            (EntityKind::Meridians, json!({"name": "任脉", "type": "奇经八脉", "flow_points": ["承浆"]})),
            (
                EntityKind::Acupoints,
                json!({"name": "中府", "location": "胸前壁", "meridian_name": " 手太阴肺经 "}),
            ),
        ];
        for (kind, raw) in cases {
            let (once, again) = renormalize(kind, &raw);
            assert_eq!(once, again, "{kind} not idempotent");
        }
    }

    #[test]
    fn test_raw_identity_fallback() {
        assert_eq!(raw_identity(EntityKind::Herbs, &json!({"name": " 黄芪 "})), "黄芪");
        assert_eq!(raw_identity(EntityKind::Acupoints, &json!({"location": "x"})), "<unnamed acupoint>");
    }
}
