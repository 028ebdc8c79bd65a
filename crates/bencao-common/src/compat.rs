//! Herb compatibility checker.
//!
//! A flat rule scan over the two classical incompatibility tables:
//! 十八反 (eighteen antagonisms) and 十九畏 (nineteen fears). Matching is
//! by substring, so processed forms such as 炙甘草 hit the 甘草 rule.
//! Intended for display warnings, not for clinical decisions.

use serde::Serialize;

/// 十八反: key herb → herbs it must never be combined with.
const EIGHTEEN_ANTAGONISMS: &[(&str, &[&str])] = &[
    ("甘草", &["海藻", "大戟", "芫花", "甘遂"]),
    ("乌头", &["贝母", "瓜蒌", "半夏", "白蔹", "白及"]),
    ("藜芦", &["人参", "丹参", "玄参", "沙参", "细辛", "芍药"]),
];

/// 十九畏: key herb → herbs it "fears".
const NINETEEN_FEARS: &[(&str, &[&str])] = &[
    ("硫磺", &["朴硝"]),
    ("水银", &["砒霜"]),
    ("狼毒", &["密陀僧"]),
    ("巴豆", &["牵牛"]),
    ("丁香", &["郁金"]),
    ("牙硝", &["三棱"]),
    ("川乌", &["犀角"]),
    ("人参", &["五灵脂"]),
    ("官桂", &["赤石脂"]),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CompatRule {
    EighteenAntagonisms,
    NineteenFears,
}

impl CompatRule {
    pub fn label(&self) -> &'static str {
        match self {
            CompatRule::EighteenAntagonisms => "十八反",
            CompatRule::NineteenFears => "十九畏",
        }
    }

    pub fn level(&self) -> WarningLevel {
        match self {
            CompatRule::EighteenAntagonisms => WarningLevel::Danger,
            CompatRule::NineteenFears => WarningLevel::Caution,
        }
    }

    fn table(&self) -> &'static [(&'static str, &'static [&'static str])] {
        match self {
            CompatRule::EighteenAntagonisms => EIGHTEEN_ANTAGONISMS,
            CompatRule::NineteenFears => NINETEEN_FEARS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningLevel {
    /// Must not be combined.
    Danger,
    /// Use with caution.
    Caution,
}

/// A rule whose key herb appears in the checked name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompatWarning {
    pub rule: CompatRule,
    pub level: WarningLevel,
    pub herb: &'static str,
    pub partners: &'static [&'static str],
    pub message: String,
}

/// Two names from a combination that hit the same rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PairConflict {
    pub rule: CompatRule,
    pub level: WarningLevel,
    pub first: String,
    pub second: String,
    pub herb: &'static str,
    pub partner: &'static str,
    pub message: String,
}

const RULES: [CompatRule; 2] = [CompatRule::EighteenAntagonisms, CompatRule::NineteenFears];

/// Warnings for a single herb name, antagonisms first.
pub fn check_herb(name: &str) -> Vec<CompatWarning> {
    let mut warnings = Vec::new();
    for rule in RULES {
        for &(herb, partners) in rule.table() {
            if !name.contains(herb) {
                continue;
            }
            let joined = partners.join("、");
            let message = match rule {
                CompatRule::EighteenAntagonisms => {
                    format!("{}：{}与{}相反，不可同用", rule.label(), herb, joined)
                }
                CompatRule::NineteenFears => {
                    format!("{}：{}畏{}，慎用", rule.label(), herb, joined)
                }
            };
            warnings.push(CompatWarning {
                rule,
                level: rule.level(),
                herb,
                partners,
                message,
            });
        }
    }
    warnings
}

/// Every conflicting pair within a combination of herb names.
pub fn check_combination(names: &[&str]) -> Vec<PairConflict> {
    let mut conflicts = Vec::new();
    for (i, first) in names.iter().enumerate() {
        for second in &names[i + 1..] {
            for rule in RULES {
                for &(herb, partners) in rule.table() {
                    for &partner in partners {
                        let forward = first.contains(herb) && second.contains(partner);
                        let backward = second.contains(herb) && first.contains(partner);
                        if !(forward || backward) {
                            continue;
                        }
                        let message = match rule {
                            CompatRule::EighteenAntagonisms => {
                                format!("{}：{}与{}相反，不可同用", rule.label(), herb, partner)
                            }
                            CompatRule::NineteenFears => {
                                format!("{}：{}畏{}，慎用", rule.label(), herb, partner)
                            }
                        };
                        conflicts.push(PairConflict {
                            rule,
                            level: rule.level(),
                            first: first.to_string(),
                            second: second.to_string(),
                            herb,
                            partner,
                            message,
                        });
                    }
                }
            }
        }
    }
    conflicts
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_gancao_hits_eighteen_antagonisms() {
        let warnings = check_herb("甘草");
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].level, WarningLevel::Danger);
        assert_eq!(warnings[0].message, "十八反：甘草与海藻、大戟、芫花、甘遂相反，不可同用");
    }

    #[test]
    fn test_processed_form_matches_by_substring() {
        let warnings = check_herb("炙甘草");
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].herb, "甘草");
    }

    #[test]
    fn test_renshen_only_matches_as_key() {
        // 人参 is a partner under 藜芦 but only a key under 十九畏.
        let warnings = check_herb("人参");
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].rule, CompatRule::NineteenFears);
        assert_eq!(warnings[0].message, "十九畏：人参畏五灵脂，慎用");
    }

    #[test]
    fn test_unlisted_herb_has_no_warnings() {
        assert!(check_herb("茯苓").is_empty());
        assert!(check_herb("").is_empty());
    }

    #[test]
    fn test_combination_detects_pair_in_either_order() {
        let conflicts = check_combination(&["人参", "藜芦"]);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].rule, CompatRule::EighteenAntagonisms);
        assert_eq!(conflicts[0].herb, "藜芦");
        assert_eq!(conflicts[0].partner, "人参");

        let fears = check_combination(&["五灵脂", "白术", "人参"]);
        assert_eq!(fears.len(), 1);
        assert_eq!(fears[0].first, "五灵脂");
        assert_eq!(fears[0].second, "人参");
        assert_eq!(fears[0].level, WarningLevel::Caution);
    }

    #[test]
    fn test_compatible_combination_is_clean() {
        assert!(check_combination(&["人参", "白术", "茯苓", "甘草"]).is_empty());
    }
}
