use std::collections::BTreeMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::cache::ItemIdList;
use crate::error::ResolveResult;
use crate::resolve::ItemResolver;
use crate::special::alias_names;
use crate::wiki::PageSource;
use crate::wikitext::{Node, Template, Wikicode};

pub const RECOMMENDED_EQUIPMENT: &str = "Recommended equipment";
pub const DEFAULT_STYLE_NAME: &str = "Default";
pub const SLOT_ITEM_TEMPLATE: &str = "plink";
/// Slots are numbered `head1` through `head5`.
pub const MAX_SLOT_VARIANTS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GearSlot {
    Head,
    Neck,
    Cape,
    Body,
    Legs,
    Weapon,
    Shield,
    Ammo,
    Hands,
    Feet,
    Ring,
    Special,
}

impl GearSlot {
    pub const ALL: [GearSlot; 12] = [
        GearSlot::Head,
        GearSlot::Neck,
        GearSlot::Cape,
        GearSlot::Body,
        GearSlot::Legs,
        GearSlot::Weapon,
        GearSlot::Shield,
        GearSlot::Ammo,
        GearSlot::Hands,
        GearSlot::Feet,
        GearSlot::Ring,
        GearSlot::Special,
    ];

    pub fn label(self) -> &'static str {
        match self {
            GearSlot::Head => "head",
            GearSlot::Neck => "neck",
            GearSlot::Cape => "cape",
            GearSlot::Body => "body",
            GearSlot::Legs => "legs",
            GearSlot::Weapon => "weapon",
            GearSlot::Shield => "shield",
            GearSlot::Ammo => "ammo",
            GearSlot::Hands => "hands",
            GearSlot::Feet => "feet",
            GearSlot::Ring => "ring",
            GearSlot::Special => "special",
        }
    }
}

/// Item name to ids for one numbered variant of a slot, in the order the
/// items are referenced.
pub type GearSlotEntry = IndexMap<String, ItemIdList>;

/// One `Recommended equipment` template.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GearStyle {
    pub name: String,
    #[serde(flatten)]
    pub slots: BTreeMap<GearSlot, Vec<GearSlotEntry>>,
}

impl GearStyle {
    pub fn slot(&self, slot: GearSlot) -> &[GearSlotEntry] {
        self.slots.get(&slot).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Styles for every `Recommended equipment` template in `markup`.
pub fn page_styles<S: PageSource>(
    resolver: &mut ItemResolver<'_, S>,
    markup: &str,
) -> ResolveResult<Vec<GearStyle>> {
    let code = Wikicode::parse(markup);
    let mut styles = Vec::new();
    for template in code.templates_named(RECOMMENDED_EQUIPMENT) {
        styles.push(resolve_gear_template(resolver, template)?);
    }
    Ok(styles)
}

pub fn resolve_gear_template<S: PageSource>(
    resolver: &mut ItemResolver<'_, S>,
    template: &Template,
) -> ResolveResult<GearStyle> {
    let name = template
        .get("style")
        .map(|param| param.value_text())
        .unwrap_or_else(|| DEFAULT_STYLE_NAME.to_string());
    info!(style = %name, "collecting recommended gear");

    let mut slots = BTreeMap::new();
    for slot in GearSlot::ALL {
        slots.insert(slot, gear_from_slot(resolver, template, slot)?);
    }
    Ok(GearStyle { name, slots })
}

pub fn gear_from_slot<S: PageSource>(
    resolver: &mut ItemResolver<'_, S>,
    template: &Template,
    slot: GearSlot,
) -> ResolveResult<Vec<GearSlotEntry>> {
    let mut entries = Vec::new();
    for index in 1..=MAX_SLOT_VARIANTS {
        let Some(param) = template.get(&format!("{}{index}", slot.label())) else {
            continue;
        };
        let references = slot_item_references(&param.value);
        if references.is_empty() {
            continue;
        }

        let mut entry = GearSlotEntry::new();
        for reference in references {
            let Some(first) = reference.first_param() else {
                continue;
            };
            for alias in alias_names(&first.value_text()) {
                let resolved = resolver.get_or_resolve(&alias, Some(reference))?;
                entry
                    .entry(resolved.name)
                    .or_default()
                    .extend_from(resolved.ids.iter());
            }
        }
        entries.push(entry);
    }
    Ok(entries)
}

/// `plink` templates in a slot value. Anything inside or after a `<ref>` in
/// the same top-level node is a citation and is skipped.
pub fn slot_item_references(value: &Wikicode) -> Vec<&Template> {
    let mut output = Vec::new();
    for top in &value.nodes {
        let mut stack = vec![top];
        while let Some(node) = stack.pop() {
            if node.is_tag("ref") {
                break;
            }
            match node {
                Node::Text(_) => continue,
                Node::Template(template) if template.name_matches(SLOT_ITEM_TEMPLATE) => {
                    output.push(template);
                }
                _ => {}
            }
            for child in node.children().into_iter().rev() {
                stack.extend(child.nodes.iter().rev());
            }
        }
    }
    output
}

#[cfg(test)]
mod tests {
    use super::{GearSlot, GearStyle, page_styles, slot_item_references};
    use crate::cache::{ItemIdList, RemediationList, ResolutionCache};
    use crate::resolve::ItemResolver;
    use crate::wiki::testing::MockSource;
    use crate::wikitext::Wikicode;

    fn ids(values: &[u32]) -> ItemIdList {
        values.iter().copied().collect()
    }

    fn reference_names(source: &str) -> Vec<String> {
        let code = Wikicode::parse(source);
        slot_item_references(&code)
            .into_iter()
            .filter_map(|template| template.first_param().map(|param| param.value_text()))
            .collect()
    }

    #[test]
    fn slot_references_skip_citations() {
        assert_eq!(
            reference_names("{{plink|Abyssal whip}}<ref>{{plink|Dragon scimitar}}</ref>"),
            vec!["Abyssal whip"]
        );
        assert_eq!(
            reference_names("{{plink|A}} or {{plinkp|B}} {{sic|{{plink|C}}}}"),
            vec!["A", "C"]
        );
    }

    #[test]
    fn ref_stops_only_its_own_top_level_node() {
        assert_eq!(
            reference_names("{{Note|<ref>{{plink|Hidden}}</ref>{{plink|Also hidden}}}}{{plink|Shown}}"),
            vec!["Shown"]
        );
    }

    #[test]
    fn recommended_equipment_resolves_each_slot() {
        let mut source = MockSource::default()
            .with_page("Iron sword", "{{Infobox Item|id = 1277}}")
            .with_page("Bronze sword", "{{Infobox Item|id = 1277}}")
            .with_page("Dragon dagger", "{{Infobox Item|id=1215|id2=1231}}");
        let mut cache = ResolutionCache::in_memory();
        let mut remediation = RemediationList::in_memory();
        let mut resolver = ItemResolver::new(&mut source, &mut cache, &mut remediation);

        let styles = page_styles(
            &mut resolver,
            "{{Recommended equipment\n|style = Melee\n|weapon1 = {{plink|Iron sword}}\n|weapon2 = {{plink|Dragon dagger}}{{plink|Bronze sword}}\n|head1 = none\n}}",
        )
        .expect("styles");
        assert_eq!(styles.len(), 1);
        let style = &styles[0];
        assert_eq!(style.name, "Melee");
        assert_eq!(style.slots.len(), GearSlot::ALL.len());

        let weapon = style.slot(GearSlot::Weapon);
        assert_eq!(weapon.len(), 2);
        assert_eq!(weapon[0].get("Iron sword"), Some(&ids(&[1277])));
        assert_eq!(weapon[1].get("Dragon dagger"), Some(&ids(&[1215, 1231])));
        assert_eq!(weapon[1].get("Bronze sword"), Some(&ids(&[1277])));
        assert_eq!(
            weapon[1].keys().map(String::as_str).collect::<Vec<_>>(),
            vec!["Dragon dagger", "Bronze sword"]
        );
        assert!(style.slot(GearSlot::Head).is_empty());
    }

    #[test]
    fn style_defaults_and_empty_items_are_kept() {
        let mut source = MockSource::default().with_page("Mystery", "nothing here");
        let mut cache = ResolutionCache::in_memory();
        let mut remediation = RemediationList::in_memory();
        let mut resolver = ItemResolver::new(&mut source, &mut cache, &mut remediation);

        let styles = page_styles(&mut resolver, "{{Recommended equipment|ring1={{plink|Mystery}}}}")
            .expect("styles");
        assert_eq!(styles[0].name, "Default");
        let ring = styles[0].slot(GearSlot::Ring);
        assert_eq!(ring.len(), 1);
        assert_eq!(ring[0].get("Mystery"), Some(&ItemIdList::new()));
        assert!(remediation.contains("Mystery"));
    }

    #[test]
    fn barrows_wrapper_is_keyed_by_its_override() {
        let mut source =
            MockSource::default().with_page("Guthan's helm", "{{Infobox Item|id=4724}}");
        let mut cache = ResolutionCache::in_memory();
        let mut remediation = RemediationList::in_memory();
        let mut resolver = ItemResolver::new(&mut source, &mut cache, &mut remediation);

        let styles = page_styles(
            &mut resolver,
            "{{Recommended equipment|head1={{plink|Barrows equipment|txt=Guthan's helm}}}}",
        )
        .expect("styles");
        let head = styles[0].slot(GearSlot::Head);
        assert_eq!(head[0].get("Guthan's helm"), Some(&ids(&[4724])));
        assert!(!head[0].contains_key("Barrows equipment"));
    }

    #[test]
    fn style_serializes_slots_in_declaration_order() {
        let mut style = GearStyle {
            name: "Default".to_string(),
            ..GearStyle::default()
        };
        for slot in GearSlot::ALL {
            style.slots.insert(slot, Vec::new());
        }
        style.slots.insert(
            GearSlot::Weapon,
            vec![[("Iron sword".to_string(), ids(&[1277]))].into_iter().collect()],
        );

        let rendered = serde_json::to_string(&style).expect("serialize");
        assert!(rendered.starts_with(r#"{"name":"Default","head":[],"neck":[]"#));
        assert!(rendered.contains(r#""weapon":[{"Iron sword":[1277]}]"#));
        assert!(rendered.ends_with(r#""special":[]}"#));

        let parsed: GearStyle = serde_json::from_str(&rendered).expect("deserialize");
        assert_eq!(parsed, style);
    }
}
