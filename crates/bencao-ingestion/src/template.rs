//! Sample import files, one per kind.

use bencao_common::EntityKind;
use serde_json::{json, Value};

/// An envelope holding one sample record of `kind`.
pub fn template(kind: EntityKind) -> Value {
    json!({
        "kind": kind.as_str(),
        "records": [sample(kind)],
    })
}

/// Suggested file name for a downloaded template.
pub fn template_file_name(kind: EntityKind) -> String {
    format!("{}_template.json", kind.as_str())
}

fn sample(kind: EntityKind) -> Value {
    match kind {
        EntityKind::Herbs => json!({
            "name": "人参",
            "pinyin": "ren shen",
            "nature_flavor": "甘、微苦，微温",
            "meridian_tropism": "脾、肺、心经",
            "efficacy": "大补元气，复脉固脱，补脾益肺，生津养血，安神益智",
            "usage_dosage": "3-9g，另煎兑入",
            "contraindications": "不宜与藜芦同用",
            "category": "补气药",
            "property": "温性",
            "toxicity_level": "none",
            "tags": ["补虚药"]
        }),
        EntityKind::Formulas => json!({
            "name": "四君子汤",
            "pinyin": "si jun zi tang",
            "composition": "人参9g，白术9g，茯苓9g，炙甘草6g",
            "efficacy": "益气健脾",
            "indications": "脾胃气虚证。面色萎白，语声低微，气短乏力，食少便溏，舌淡苔白，脉虚弱",
            "category": "补气剂",
            "source": "《太平惠民和剂局方》"
        }),
        EntityKind::Contraindications => json!({
            "name": "甘草反甘遂",
            "type": "eighteen_incompatible",
            "herb_a": "甘草",
            "herb_b": "甘遂",
            "description": "甘草与甘遂同用可能产生毒副作用",
            "severity": "high"
        }),
        EntityKind::Meridians => json!({
            "name": "手太阴肺经",
            "type": "十二正经",
            "pathway": "起于中焦，下络大肠，还循胃口，上膈属肺",
            "main_functions": "主气司呼吸",
            "associated_organs": "肺、大肠",
            "flow_points": ["中府", "云门", "天府", "侠白", "尺泽", "孔最", "列缺", "经渠", "太渊", "鱼际", "少商"]
        }),
        EntityKind::Acupoints => json!({
            "name": "中府",
            "meridian_name": "手太阴肺经",
            "location": "胸前壁外上方，前正中线旁开6寸，平第1肋间隙处",
            "indications": "咳嗽，气喘，胸痛，肩背痛",
            "needle_depth": "向外斜刺0.5-0.8寸",
            "manipulation": "不可向内深刺，以免伤及肺脏",
            "coordinates_3d": {"x": 0.18, "y": 1.42, "z": 0.09}
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::parse_records;
    use crate::validate::normalize;

    #[test]
    fn test_every_template_loads_and_validates() {
        for kind in EntityKind::ORDER {
            let text = template(kind).to_string();
            let loaded = parse_records(&text, None).unwrap();
            assert_eq!(loaded.kind, kind);
            for record in &loaded.records {
                normalize(kind, record).unwrap();
            }
        }
    }

    #[test]
    fn test_file_name() {
        assert_eq!(template_file_name(EntityKind::Acupoints), "acupoints_template.json");
    }
}
