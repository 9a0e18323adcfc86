use tracing::{debug, warn};

use crate::cache::{ItemIdList, RemediationList, ResolutionCache};
use crate::error::{ResolveError, ResolveResult};
use crate::special::{
    RuleKind, SpecialRule, alias_names, find_rule, is_cacheable_under_own_name,
    keeps_category_member, tier_names,
};
use crate::versions::{EachVersionOptions, VersionId, each_version};
use crate::wiki::PageSource;
use crate::wikitext::{Template, Wikicode};

pub const MAX_RESOLUTION_DEPTH: usize = 16;
pub const INFOBOX_ITEM: &str = "Infobox Item";
pub const BONUS_TABLE: &str = "Infotable Bonuses";
pub const ITEM_LINK_TEMPLATES: &[&str] = &["plink", "plinkp", "plinkt", "CostLine"];

/// A name as stored in the cache together with its ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub name: String,
    pub ids: ItemIdList,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpecialOutcome {
    /// `ids` are raw concatenations and may repeat.
    Applicable { name: String, ids: Vec<u32> },
    NotApplicable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Frame<'n> {
    Special(&'n str),
    Page(&'n str),
}

impl Frame<'_> {
    fn label(self) -> String {
        match self {
            Frame::Special(name) => format!("special `{name}`"),
            Frame::Page(name) => format!("page `{name}`"),
        }
    }
}

/// Names currently being resolved, innermost last.
#[derive(Debug, Default)]
struct ResolutionGuard {
    stack: Vec<String>,
}

impl ResolutionGuard {
    fn enter(&mut self, frame: Frame<'_>) -> ResolveResult<()> {
        let label = frame.label();
        if self.stack.contains(&label) {
            let mut chain = self.stack.clone();
            chain.push(label);
            return Err(ResolveError::Cycle { chain });
        }
        if self.stack.len() >= MAX_RESOLUTION_DEPTH {
            let item = match frame {
                Frame::Special(name) | Frame::Page(name) => name.to_string(),
            };
            return Err(ResolveError::DepthExceeded {
                item,
                limit: MAX_RESOLUTION_DEPTH,
            });
        }
        self.stack.push(label);
        Ok(())
    }

    fn leave(&mut self) {
        self.stack.pop();
    }
}

pub struct ItemResolver<'a, S: PageSource> {
    source: &'a mut S,
    cache: &'a mut ResolutionCache,
    remediation: &'a mut RemediationList,
    guard: ResolutionGuard,
}

impl<'a, S: PageSource> ItemResolver<'a, S> {
    pub fn new(
        source: &'a mut S,
        cache: &'a mut ResolutionCache,
        remediation: &'a mut RemediationList,
    ) -> Self {
        Self {
            source,
            cache,
            remediation,
            guard: ResolutionGuard::default(),
        }
    }

    /// Resolve a bare item name, with no referencing template.
    pub fn resolve_item(&mut self, name: &str) -> ResolveResult<ItemIdList> {
        Ok(self.get_or_resolve(name, None)?.ids)
    }

    /// Cache lookup, then special cases, then the item's own page. The
    /// result is stored under its effective name, or evicted and recorded
    /// for remediation when it is empty.
    pub fn get_or_resolve(
        &mut self,
        name: &str,
        template: Option<&Template>,
    ) -> ResolveResult<Resolved> {
        let rule = find_rule(name);
        if rule.is_none_or(is_cacheable_under_own_name)
            && let Some(ids) = self.cache.get(name)
        {
            debug!(item = name, "item cache hit");
            return Ok(Resolved {
                name: name.to_string(),
                ids: ids.clone(),
            });
        }

        let (effective_name, ids) = match self.resolve_special(name, template)? {
            SpecialOutcome::Applicable { name, ids } => (name, ids.into_iter().collect()),
            SpecialOutcome::NotApplicable => (name.to_string(), self.resolve_page(name)?),
        };

        if ids.is_empty() {
            warn!(item = %effective_name, "no item ids found");
            self.cache.evict(&effective_name);
            self.remediation
                .record(&effective_name)
                .map_err(ResolveError::Storage)?;
        } else {
            debug!(item = %effective_name, ids = ?ids.as_slice(), "resolved item");
            self.cache.insert(effective_name.clone(), ids.clone());
        }

        Ok(Resolved {
            name: effective_name,
            ids,
        })
    }

    pub fn resolve_special(
        &mut self,
        name: &str,
        template: Option<&Template>,
    ) -> ResolveResult<SpecialOutcome> {
        let Some(rule) = find_rule(name) else {
            return Ok(SpecialOutcome::NotApplicable);
        };
        debug!(item = name, rule = rule.label, "special-case rule applies");

        self.guard.enter(Frame::Special(name))?;
        let outcome = self.apply_rule(rule, name, template);
        self.guard.leave();
        outcome
    }

    fn apply_rule(
        &mut self,
        rule: &SpecialRule,
        name: &str,
        template: Option<&Template>,
    ) -> ResolveResult<SpecialOutcome> {
        let mut ids = Vec::new();
        match rule.kind {
            RuleKind::CategoryMembers { category, suffix } => {
                let pages = self
                    .source
                    .fetch_category_pages(category)
                    .map_err(|error| ResolveError::fetch(format!("Category:{category}"), error))?;
                for (title, markup) in &pages {
                    if !keeps_category_member(title, suffix) {
                        continue;
                    }
                    match self.cache.get(title) {
                        Some(cached) => ids.extend(cached.iter()),
                        None => {
                            ids.extend(item_definition_ids(&Wikicode::parse(markup), title).iter())
                        }
                    }
                }
            }
            RuleKind::NumberedTiers { tiers } => {
                for tier_name in tier_names(name, tiers) {
                    ids.extend(self.resolve_sub_item(&tier_name)?.iter());
                }
            }
            RuleKind::FixedPieces(pieces) => {
                for piece in pieces {
                    ids.extend(self.resolve_sub_item(piece)?.iter());
                }
            }
            RuleKind::TemplateOverride { parameter } => {
                let replacement = template
                    .and_then(|template| template.get(parameter))
                    .map(|param| param.value_text())
                    .filter(|value| !value.is_empty());
                let Some(replacement) = replacement else {
                    return Err(ResolveError::OverrideMissing {
                        item: name.to_string(),
                        parameter: parameter.to_string(),
                        template: template
                            .map(Template::to_source)
                            .unwrap_or_else(|| "(none)".to_string()),
                    });
                };
                return self.resolve_override(&replacement, template);
            }
            RuleKind::RedirectPages(pages) => {
                for page in pages {
                    ids.extend(self.resolve_page(page)?.iter());
                }
            }
            RuleKind::LinkPage => {
                let code = self.fetch_code(name)?;
                let targets = code
                    .wikilinks()
                    .into_iter()
                    .map(|link| link.title().to_string())
                    .filter(|title| !title.is_empty())
                    .collect::<Vec<_>>();
                for target in targets {
                    ids.extend(self.resolve_page(&target)?.iter());
                }
            }
        }

        Ok(SpecialOutcome::Applicable {
            name: name.to_string(),
            ids,
        })
    }

    fn resolve_override(
        &mut self,
        name: &str,
        template: Option<&Template>,
    ) -> ResolveResult<SpecialOutcome> {
        if let Some(ids) = self.cache.get(name) {
            debug!(item = name, "item cache hit");
            return Ok(SpecialOutcome::Applicable {
                name: name.to_string(),
                ids: ids.as_slice().to_vec(),
            });
        }
        match self.resolve_special(name, template)? {
            SpecialOutcome::Applicable { name, ids } => {
                Ok(SpecialOutcome::Applicable { name, ids })
            }
            SpecialOutcome::NotApplicable => {
                let ids = self.resolve_page(name)?;
                Ok(SpecialOutcome::Applicable {
                    name: name.to_string(),
                    ids: ids.as_slice().to_vec(),
                })
            }
        }
    }

    /// Ids described by the page `name`, which may carry a `#Section`.
    pub fn resolve_page(&mut self, name: &str) -> ResolveResult<ItemIdList> {
        self.guard.enter(Frame::Page(name))?;
        let result = self.scan_page(name);
        self.guard.leave();
        result
    }

    fn scan_page(&mut self, name: &str) -> ResolveResult<ItemIdList> {
        let (title, section) = split_section(name);
        let page = self.fetch_code(title)?;
        let code = match section {
            Some(section) => page.section(&section.replace('_', " ")).unwrap_or_else(|| {
                warn!(page = title, section, "section not found");
                Wikicode::default()
            }),
            None => page,
        };

        let mut ids = ItemIdList::new();
        for template in code.templates() {
            if template.name_matches(INFOBOX_ITEM) {
                ids.extend_from(item_definition_ids(&code, title).iter());
                break;
            }

            if template.name_matches(BONUS_TABLE) {
                for param in template.positional() {
                    for alias in alias_names(&param.value_text()) {
                        ids.extend_from(self.resolve_sub_item(&alias)?.iter());
                    }
                }
                break;
            }

            if ITEM_LINK_TEMPLATES
                .iter()
                .any(|link| template.name_matches(link))
                && let Some(first) = template.first_param()
            {
                for alias in alias_names(&first.value_text()) {
                    ids.extend_from(self.resolve_sub_item(&alias)?.iter());
                }
            }
        }
        Ok(ids)
    }

    /// Cached ids when present, otherwise the item's own infobox. Never
    /// writes the cache.
    fn resolve_sub_item(&mut self, name: &str) -> ResolveResult<ItemIdList> {
        if let Some(ids) = self.cache.get(name) {
            return Ok(ids.clone());
        }
        let code = self.fetch_code(name)?;
        Ok(item_definition_ids(&code, name))
    }

    fn fetch_code(&mut self, title: &str) -> ResolveResult<Wikicode> {
        debug!(title, "fetching page");
        let markup = self
            .source
            .fetch_page(title)
            .map_err(|error| ResolveError::fetch(title, error))?;
        Ok(Wikicode::parse(&markup))
    }
}

/// Ids from every `Infobox Item` version on a page, bare base included.
pub fn item_definition_ids(code: &Wikicode, source_name: &str) -> ItemIdList {
    let records = each_version(INFOBOX_ITEM, code, &EachVersionOptions::with_base())
        .collect::<Vec<_>>();
    let versioned = records
        .iter()
        .any(|(version, _)| matches!(version, VersionId::Numbered(_)));

    let mut ids = ItemIdList::new();
    for (version, record) in &records {
        let parsed = record
            .text("id")
            .map(|value| parse_id_list(&value))
            .unwrap_or_default();
        if parsed.is_empty() {
            if versioned && *version == VersionId::Unversioned {
                debug!(page = source_name, %version, "base record has no id");
            } else if record.contains("id") {
                warn!(page = source_name, %version, "item has an empty id");
            } else {
                warn!(page = source_name, %version, "item is missing an id");
            }
            continue;
        }
        ids.extend_from(parsed);
    }
    ids
}

/// Numeric tokens of a comma-separated id value.
pub fn parse_id_list(value: &str) -> Vec<u32> {
    value
        .split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty() && token.bytes().all(|byte| byte.is_ascii_digit()))
        .filter_map(|token| token.parse::<u32>().ok())
        .collect()
}

fn split_section(name: &str) -> (&str, Option<&str>) {
    match name.split_once('#') {
        Some((title, section)) => (title, Some(section)),
        None => (name, None),
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::{
        Frame, ItemResolver, MAX_RESOLUTION_DEPTH, ResolutionGuard, item_definition_ids,
        parse_id_list,
    };
    use crate::cache::{ItemIdList, RemediationList, ResolutionCache};
    use crate::error::ResolveError;
    use crate::wiki::testing::MockSource;
    use crate::wikitext::Wikicode;

    const CAPES: &str = "Capes of Accomplishment";

    fn item(id: &str) -> String {
        format!("{{{{Infobox Item\n|name = x\n|id = {id}\n}}}}")
    }

    fn ids(values: &[u32]) -> ItemIdList {
        values.iter().copied().collect()
    }

    fn barrows_pieces(source: MockSource) -> MockSource {
        source
            .with_page("Dharok's helm", &item("4716"))
            .with_page("Ahrim's hood", &item("4708"))
    }

    #[test]
    fn parses_comma_separated_ids() {
        assert_eq!(parse_id_list(" 1121, 1122 ,x, ,12a"), vec![1121, 1122]);
        assert!(parse_id_list("").is_empty());
    }

    #[test]
    fn infobox_versions_contribute_base_then_numbered_ids() {
        let code = Wikicode::parse("{{Infobox Item|id=1119|id2=1121,1122}}");
        assert_eq!(item_definition_ids(&code, "Adamant platebody"), ids(&[1119, 1121, 1122]));

        let code = Wikicode::parse("{{Infobox Item|version1=New|id1=5|version2=Old|id2=6}}");
        assert_eq!(item_definition_ids(&code, "Thing"), ids(&[5, 6]));
    }

    #[test]
    fn resolves_plain_item_pages() {
        let mut source = MockSource::default()
            .with_page("Iron sword", &item("1277"))
            .with_page("Adamant platebody", "{{Infobox Item|id=1119|id2=1121,1122}}");
        let mut cache = ResolutionCache::in_memory();
        let mut remediation = RemediationList::in_memory();
        let mut resolver = ItemResolver::new(&mut source, &mut cache, &mut remediation);

        assert_eq!(resolver.resolve_item("Iron sword").expect("resolve"), ids(&[1277]));
        assert_eq!(
            resolver.resolve_item("Adamant platebody").expect("resolve"),
            ids(&[1119, 1121, 1122])
        );
        assert_eq!(cache.get("Iron sword"), Some(&ids(&[1277])));
    }

    #[test]
    fn repeated_resolution_hits_the_cache() {
        let mut source = MockSource::default().with_page("Iron sword", &item("1277"));
        let mut cache = ResolutionCache::in_memory();
        let mut remediation = RemediationList::in_memory();
        let mut resolver = ItemResolver::new(&mut source, &mut cache, &mut remediation);

        let first = resolver.resolve_item("Iron sword").expect("first");
        let second = resolver.resolve_item("Iron sword").expect("second");
        assert_eq!(first, second);
        assert_eq!(source.fetch_count("Iron sword"), 1);
    }

    #[test]
    fn link_templates_are_concatenated_without_repeats() {
        let mut source = MockSource::default()
            .with_page("Mixed", "{{plink|A}} {{plinkp|B}}\n{{CostLine|C|1}}")
            .with_page("A", &item("5"))
            .with_page("B", &item("3"))
            .with_page("C", &item("5"));
        let mut cache = ResolutionCache::in_memory();
        let mut remediation = RemediationList::in_memory();
        let mut resolver = ItemResolver::new(&mut source, &mut cache, &mut remediation);

        assert_eq!(resolver.resolve_item("Mixed").expect("resolve"), ids(&[5, 3]));
        assert!(!cache.contains("A"), "sub-items are not cached");
    }

    #[test]
    fn infobox_stops_the_scan() {
        let mut source = MockSource::default()
            .with_page("Rune axe", "{{Infobox Item|id=1359}}\n{{plink|Dragon axe}}");
        let mut cache = ResolutionCache::in_memory();
        let mut remediation = RemediationList::in_memory();
        let mut resolver = ItemResolver::new(&mut source, &mut cache, &mut remediation);

        assert_eq!(resolver.resolve_item("Rune axe").expect("resolve"), ids(&[1359]));
        assert_eq!(source.fetch_count("Dragon axe"), 0);
    }

    #[test]
    fn bonus_tables_expand_positional_names_and_aliases() {
        let mut source = MockSource::default()
            .with_page(
                "Sceptres",
                "{{Infotable Bonuses|Skull sceptre|Ancient sceptre|sort=yes}}\n{{plink|Ignored}}",
            )
            .with_page("Skull sceptre", &item("9013"))
            .with_page("Skull sceptre (i)", &item("21276"))
            .with_page("Ancient sceptre", &item("27624"));
        let mut cache = ResolutionCache::in_memory();
        let mut remediation = RemediationList::in_memory();
        let mut resolver = ItemResolver::new(&mut source, &mut cache, &mut remediation);

        assert_eq!(
            resolver.resolve_item("Sceptres").expect("resolve"),
            ids(&[9013, 21276, 27624])
        );
        assert_eq!(source.fetch_count("Ignored"), 0);
    }

    #[test]
    fn section_fragments_narrow_the_page() {
        let mut source = MockSource::default()
            .with_page(
                "Staves",
                "==Battlestaves==\n{{plink|Fire battlestaff}}\n==Mystic_staves==\n{{plink|Mystic fire staff}}",
            )
            .with_page("Fire battlestaff", &item("1393"))
            .with_page("Mystic fire staff", &item("1401"));
        let mut cache = ResolutionCache::in_memory();
        let mut remediation = RemediationList::in_memory();
        let mut resolver = ItemResolver::new(&mut source, &mut cache, &mut remediation);

        assert_eq!(
            resolver.resolve_page("Staves#Mystic_staves").expect("resolve"),
            ids(&[1401])
        );
        assert!(resolver.resolve_page("Staves#Elder staves").expect("resolve").is_empty());
    }

    #[test]
    fn unresolved_items_are_evicted_and_recorded_once() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("items_that_need_special_handling.txt");
        let mut source = MockSource::default().with_page("Mystery", "Just prose.");
        let mut cache = ResolutionCache::in_memory();
        cache.insert("Mystery", ItemIdList::new());
        let mut remediation = RemediationList::open(&path).expect("open");
        let mut resolver = ItemResolver::new(&mut source, &mut cache, &mut remediation);

        // A stale empty entry is still served from the cache.
        assert!(resolver.resolve_item("Mystery").expect("cached").is_empty());
        resolver.cache.evict("Mystery");

        assert!(resolver.resolve_item("Mystery").expect("first").is_empty());
        assert!(resolver.resolve_item("Mystery").expect("second").is_empty());
        assert!(!cache.contains("Mystery"));
        assert_eq!(source.fetch_count("Mystery"), 2);
        assert_eq!(fs::read_to_string(&path).expect("read"), "Mystery\n");
    }

    #[test]
    fn barrows_equipment_follows_the_template_override() {
        let mut source = barrows_pieces(MockSource::default());
        let mut cache = ResolutionCache::in_memory();
        let mut remediation = RemediationList::in_memory();
        let code = Wikicode::parse("{{plink|Barrows equipment|txt=Dharok's helm}}");
        let template = code.templates().next().expect("template");
        let mut resolver = ItemResolver::new(&mut source, &mut cache, &mut remediation);

        let resolved = resolver
            .get_or_resolve("Barrows equipment", Some(template))
            .expect("resolve");
        assert_eq!(resolved.name, "Dharok's helm");
        assert_eq!(resolved.ids, ids(&[4716]));
        assert!(cache.contains("Dharok's helm"));
        assert!(!cache.contains("Barrows equipment"));
    }

    #[test]
    fn barrows_override_can_name_another_special_case() {
        let mut source = MockSource::default()
            .with_page("Ahrim's hood", &item("4708"))
            .with_page("Dharok's helm", &item("4716"))
            .with_page("Guthan's helm", &item("4724"))
            .with_page("Karil's coif", &item("4732"))
            .with_page("Torag's helm", &item("4745"))
            .with_page("Verac's helm", &item("4753"));
        let mut cache = ResolutionCache::in_memory();
        let mut remediation = RemediationList::in_memory();
        let code = Wikicode::parse("{{plink|Barrows equipment|txt=Barrows helm}}");
        let template = code.templates().next().expect("template");
        let mut resolver = ItemResolver::new(&mut source, &mut cache, &mut remediation);

        let resolved = resolver
            .get_or_resolve("Barrows equipment", Some(template))
            .expect("resolve");
        assert_eq!(resolved.name, "Barrows helm");
        assert_eq!(resolved.ids, ids(&[4708, 4716, 4724, 4732, 4745, 4753]));
    }

    #[test]
    fn barrows_equipment_without_override_fails() {
        let mut source = MockSource::default();
        let mut cache = ResolutionCache::in_memory();
        let mut remediation = RemediationList::in_memory();
        let mut resolver = ItemResolver::new(&mut source, &mut cache, &mut remediation);

        let error = resolver.resolve_item("Barrows equipment").expect_err("must fail");
        assert!(matches!(error, ResolveError::OverrideMissing { .. }));
        assert!(remediation.is_empty());
    }

    #[test]
    fn self_referencing_override_is_a_cycle() {
        let mut source = MockSource::default();
        let mut cache = ResolutionCache::in_memory();
        let mut remediation = RemediationList::in_memory();
        let code = Wikicode::parse("{{plink|Barrows equipment|txt=Barrows equipment}}");
        let template = code.templates().next().expect("template");
        let mut resolver = ItemResolver::new(&mut source, &mut cache, &mut remediation);

        let error = resolver
            .get_or_resolve("Barrows equipment", Some(template))
            .expect_err("must fail");
        let ResolveError::Cycle { chain } = &error else {
            panic!("expected cycle, got {error}");
        };
        assert_eq!(chain.len(), 2);
    }

    #[test]
    fn achievement_capes_come_from_the_category() {
        let mut source = MockSource::default()
            .with_category_page(CAPES, "Attack cape", "{{Infobox Item|id=9747|id2=9748}}")
            .with_category_page(CAPES, "Attack hood", "{{Infobox Item|id=9749}}")
            .with_category_page(CAPES, "Defence cape", "{{Infobox Item|id=9753}}");
        let mut cache = ResolutionCache::in_memory();
        let mut remediation = RemediationList::in_memory();
        let mut resolver = ItemResolver::new(&mut source, &mut cache, &mut remediation);

        let resolved = resolver
            .get_or_resolve("Cape of Accomplishment (fire making)", None)
            .expect("resolve");
        assert_eq!(resolved.ids, ids(&[9747, 9748, 9753]));
        assert!(cache.contains("Cape of Accomplishment (fire making)"));
    }

    #[test]
    fn cached_capes_are_reused() {
        let mut source = MockSource::default()
            .with_category_page(CAPES, "Attack cape", "{{Infobox Item|id=9747}}")
            .with_category_page(CAPES, "Defence cape", "{{Infobox Item|id=9753}}");
        let mut cache = ResolutionCache::in_memory();
        cache.insert("Attack cape", ids(&[9747, 9748]));
        let mut remediation = RemediationList::in_memory();
        let mut resolver = ItemResolver::new(&mut source, &mut cache, &mut remediation);

        assert_eq!(
            resolver
                .resolve_item("Cape of Accomplishment")
                .expect("resolve"),
            ids(&[9747, 9748, 9753])
        );
        assert!(!cache.contains("Defence cape"));
    }

    #[test]
    fn guard_rejects_frames_past_the_depth_limit() {
        let names = (0..=MAX_RESOLUTION_DEPTH)
            .map(|index| format!("Item {index}"))
            .collect::<Vec<_>>();
        let mut guard = ResolutionGuard::default();
        for name in &names[..MAX_RESOLUTION_DEPTH] {
            guard.enter(Frame::Page(name)).expect("within limit");
        }

        let error = guard
            .enter(Frame::Page(&names[MAX_RESOLUTION_DEPTH]))
            .expect_err("past limit");
        let ResolveError::DepthExceeded { item, limit } = &error else {
            panic!("expected depth error, got {error}");
        };
        assert_eq!(item, "Item 16");
        assert_eq!(*limit, MAX_RESOLUTION_DEPTH);

        guard.leave();
        guard
            .enter(Frame::Special(&names[MAX_RESOLUTION_DEPTH]))
            .expect("room after leaving");
    }

    #[test]
    fn diary_rewards_cover_all_tiers_and_reuse_cached_tiers() {
        let mut source = MockSource::default()
            .with_page("Karamja gloves 2", &item("11138"))
            .with_page("Karamja gloves 3", &item("11140"))
            .with_page("Karamja gloves 4", &item("13103"));
        let mut cache = ResolutionCache::in_memory();
        cache.insert("Karamja gloves 1", ids(&[11136]));
        let mut remediation = RemediationList::in_memory();
        let mut resolver = ItemResolver::new(&mut source, &mut cache, &mut remediation);

        assert_eq!(
            resolver.resolve_item("Karamja gloves").expect("resolve"),
            ids(&[11136, 11138, 11140, 13103])
        );
        assert_eq!(source.fetch_count("Karamja gloves 1"), 0);
        assert!(!cache.contains("Karamja gloves 2"));
    }

    #[test]
    fn link_pages_resolve_every_linked_page() {
        let mut source = MockSource::default()
            .with_page(
                "Halo",
                "A halo is one of:\n* [[Saradomin halo]]\n* [[Guthix halo|the Guthix one]]",
            )
            .with_page("Saradomin halo", &item("12637"))
            .with_page("Guthix halo", &item("12639"));
        let mut cache = ResolutionCache::in_memory();
        let mut remediation = RemediationList::in_memory();
        let mut resolver = ItemResolver::new(&mut source, &mut cache, &mut remediation);

        assert_eq!(resolver.resolve_item("Halo").expect("resolve"), ids(&[12637, 12639]));
    }

    #[test]
    fn god_staves_and_blessings_use_redirect_pages() {
        let mut source = MockSource::default()
            .with_page("God spells", "{{Infotable Bonuses|Saradomin staff|Guthix staff}}")
            .with_page("Saradomin staff", &item("2415"))
            .with_page("Guthix staff", &item("2416"))
            .with_page("God blessings", "{{plink|Holy blessing}}")
            .with_page("Holy blessing", &item("20220"))
            .with_page("Rada's blessing", "{{Infobox Item|id1=22941|id2=22943}}");
        let mut cache = ResolutionCache::in_memory();
        let mut remediation = RemediationList::in_memory();
        let mut resolver = ItemResolver::new(&mut source, &mut cache, &mut remediation);

        assert_eq!(
            resolver.resolve_item("God staves").expect("staves"),
            ids(&[2415, 2416])
        );
        assert_eq!(
            resolver.resolve_item("Blessing").expect("blessing"),
            ids(&[20220, 22941, 22943])
        );
    }

    #[test]
    fn missing_pages_are_fetch_failures() {
        let mut source = MockSource::default().with_page("Broken", "{{plink|Nowhere}}");
        let mut cache = ResolutionCache::in_memory();
        let mut remediation = RemediationList::in_memory();
        let mut resolver = ItemResolver::new(&mut source, &mut cache, &mut remediation);

        let error = resolver.resolve_item("Broken").expect_err("must fail");
        let ResolveError::Fetch { title, .. } = &error else {
            panic!("expected fetch failure, got {error}");
        };
        assert_eq!(title, "Nowhere");
        assert!(!cache.contains("Broken"));
    }
}
