//! Hardcoded resolution paths for names whose wiki page does not describe a
//! single item.

use crate::wikitext::normalize_name;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameMatcher {
    Exact(&'static str),
    /// Compared with underscores read as spaces.
    Prefix(&'static str),
    OneOf(&'static [&'static str]),
}

impl NameMatcher {
    pub fn matches(&self, name: &str) -> bool {
        match self {
            Self::Exact(expected) => name == *expected,
            Self::Prefix(prefix) => name.replace('_', " ").starts_with(prefix),
            Self::OneOf(names) => names.contains(&name),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind {
    /// Every page of `category` whose title ends with `suffix`.
    CategoryMembers {
        category: &'static str,
        suffix: &'static str,
    },
    /// `"{name} 1"` through `"{name} {tiers}"`.
    NumberedTiers { tiers: u32 },
    /// A fixed list of pieces resolved one by one.
    FixedPieces(&'static [&'static str]),
    /// A wrapper whose real item is named by the referencing template.
    TemplateOverride { parameter: &'static str },
    /// Generic page resolution of other pages, concatenated.
    RedirectPages(&'static [&'static str]),
    /// Every wikilink on the item's own page.
    LinkPage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpecialRule {
    pub label: &'static str,
    pub matcher: NameMatcher,
    pub kind: RuleKind,
}

pub const REGIONAL_DIARY_ITEMS: &[&str] = &[
    "Ardougne cloak",
    "Desert amulet",
    "Falador shield",
    "Fremennik sea boots",
    "Kandarin headgear",
    "Karamja gloves",
    "Rada's blessing",
    "Explorer's ring",
    "Morytania legs",
    "Varrock armour",
    "Western banner",
    "Wilderness sword",
];

pub const BARROWS_HELMS: &[&str] = &[
    "Ahrim's hood",
    "Dharok's helm",
    "Guthan's helm",
    "Karil's coif",
    "Torag's helm",
    "Verac's helm",
];

pub const BARROWS_BODIES: &[&str] = &[
    "Ahrim's robetop",
    "Dharok's platebody",
    "Guthan's platebody",
    "Karil's leathertop",
    "Torag's platebody",
    "Verac's brassard",
];

pub const BARROWS_LEGS: &[&str] = &[
    "Ahrim's robeskirt",
    "Dharok's platelegs",
    "Guthan's chainskirt",
    "Karil's leatherskirt",
    "Torag's platelegs",
    "Verac's plateskirt",
];

/// Tried in order; the first match wins.
pub const SPECIAL_RULES: &[SpecialRule] = &[
    SpecialRule {
        label: "achievement capes",
        matcher: NameMatcher::Prefix("Cape of Accomplishment"),
        kind: RuleKind::CategoryMembers {
            category: "Capes of Accomplishment",
            suffix: "cape",
        },
    },
    SpecialRule {
        label: "achievement diary rewards",
        matcher: NameMatcher::OneOf(REGIONAL_DIARY_ITEMS),
        kind: RuleKind::NumberedTiers { tiers: 4 },
    },
    SpecialRule {
        label: "barrows helms",
        matcher: NameMatcher::Exact("Barrows helm"),
        kind: RuleKind::FixedPieces(BARROWS_HELMS),
    },
    SpecialRule {
        label: "barrows bodies",
        matcher: NameMatcher::Exact("Barrows body"),
        kind: RuleKind::FixedPieces(BARROWS_BODIES),
    },
    SpecialRule {
        label: "barrows legs",
        matcher: NameMatcher::Exact("Barrows legs"),
        kind: RuleKind::FixedPieces(BARROWS_LEGS),
    },
    SpecialRule {
        label: "barrows equipment",
        matcher: NameMatcher::Exact("Barrows equipment"),
        kind: RuleKind::TemplateOverride { parameter: "txt" },
    },
    SpecialRule {
        label: "god staves",
        matcher: NameMatcher::Exact("God staves"),
        kind: RuleKind::RedirectPages(&["God spells"]),
    },
    SpecialRule {
        label: "link pages",
        matcher: NameMatcher::OneOf(&["Damaged book", "Halo"]),
        kind: RuleKind::LinkPage,
    },
    SpecialRule {
        label: "blessings",
        matcher: NameMatcher::Exact("Blessing"),
        kind: RuleKind::RedirectPages(&["God blessings", "Rada's blessing"]),
    },
];

/// Names that resolve through more than one page.
const ALIASES: &[(&str, &[&str])] = &[("Skull sceptre", &["Skull sceptre", "Skull sceptre (i)"])];

pub fn find_rule(name: &str) -> Option<&'static SpecialRule> {
    SPECIAL_RULES.iter().find(|rule| rule.matcher.matches(name))
}

/// Pages that stand in for `name`; any name without an alias maps to itself.
pub fn alias_names(name: &str) -> Vec<String> {
    ALIASES
        .iter()
        .find(|(alias, _)| *alias == name)
        .map(|(_, targets)| targets.iter().map(|target| target.to_string()).collect())
        .unwrap_or_else(|| vec![name.to_string()])
}

/// A rule result only depends on the name when the rule does not read the
/// referencing template.
pub fn is_cacheable_under_own_name(rule: &SpecialRule) -> bool {
    !matches!(rule.kind, RuleKind::TemplateOverride { .. })
}

pub(crate) fn tier_names(name: &str, tiers: u32) -> Vec<String> {
    (1..=tiers).map(|tier| format!("{name} {tier}")).collect()
}

pub(crate) fn keeps_category_member(title: &str, suffix: &str) -> bool {
    normalize_name(title).ends_with(suffix)
}

#[cfg(test)]
mod tests {
    use super::{
        BARROWS_LEGS, RuleKind, SPECIAL_RULES, alias_names, find_rule, is_cacheable_under_own_name,
        keeps_category_member, tier_names,
    };

    #[test]
    fn cape_prefix_matches_underscored_names() {
        let rule = find_rule("Cape_of_Accomplishment_(fire_making)").expect("cape rule");
        assert_eq!(rule.label, "achievement capes");
        let rule = find_rule("Cape of Accomplishment (fire making)").expect("cape rule");
        assert!(matches!(rule.kind, RuleKind::CategoryMembers { .. }));
    }

    #[test]
    fn barrows_equipment_uses_template_override() {
        let rule = find_rule("Barrows equipment").expect("barrows rule");
        assert_eq!(rule.kind, RuleKind::TemplateOverride { parameter: "txt" });
        assert!(!is_cacheable_under_own_name(rule));
    }

    #[test]
    fn barrows_legs_list_is_complete() {
        let rule = find_rule("Barrows legs").expect("legs rule");
        assert_eq!(rule.kind, RuleKind::FixedPieces(BARROWS_LEGS));
        assert_eq!(BARROWS_LEGS.len(), 6);
    }

    #[test]
    fn regional_rewards_expand_to_four_tiers() {
        let rule = find_rule("Karamja gloves").expect("tier rule");
        let RuleKind::NumberedTiers { tiers } = rule.kind else {
            panic!("expected numbered tiers");
        };
        assert_eq!(
            tier_names("Karamja gloves", tiers),
            vec!["Karamja gloves 1", "Karamja gloves 2", "Karamja gloves 3", "Karamja gloves 4"]
        );
    }

    #[test]
    fn exact_rules_are_case_sensitive() {
        assert!(find_rule("halo").is_none());
        assert!(find_rule("Halo").is_some());
        assert!(find_rule("Iron sword").is_none());
    }

    #[test]
    fn rule_order_is_stable() {
        let labels = SPECIAL_RULES.iter().map(|rule| rule.label).collect::<Vec<_>>();
        assert_eq!(labels.first(), Some(&"achievement capes"));
        assert_eq!(labels.last(), Some(&"blessings"));
        assert_eq!(labels.len(), 9);
    }

    #[test]
    fn aliases_expand_skull_sceptre_only() {
        assert_eq!(alias_names("Skull sceptre"), vec!["Skull sceptre", "Skull sceptre (i)"]);
        assert_eq!(alias_names("Iron sword"), vec!["Iron sword"]);
    }

    #[test]
    fn category_members_filter_on_suffix() {
        assert!(keeps_category_member("Firemaking cape", "cape"));
        assert!(!keeps_category_member("Firemaking hood", "cape"));
    }
}
