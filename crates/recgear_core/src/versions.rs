use std::collections::BTreeMap;
use std::fmt;

use crate::wikitext::{Template, Wikicode};

/// Parameter bases that may differ between versions without making them
/// distinct items.
pub const DEFAULT_MERGEABLE_KEYS: &[&str] = &["version", "image", "caption"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum VersionId {
    Unversioned,
    Numbered(u32),
}

impl VersionId {
    pub fn as_i64(self) -> i64 {
        match self {
            Self::Unversioned => -1,
            Self::Numbered(value) => i64::from(value),
        }
    }
}

impl fmt::Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_i64())
    }
}

/// One version of a template's data, keyed by parameter base name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionRecord {
    pub fields: BTreeMap<String, Wikicode>,
}

impl VersionRecord {
    pub fn get(&self, key: &str) -> Option<&Wikicode> {
        self.fields.get(key)
    }

    /// Trimmed source text of a field.
    pub fn text(&self, key: &str) -> Option<String> {
        self.get(key)
            .map(|value| value.to_source().trim().to_string())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    fn merged_with(&self, overlay: &VersionRecord) -> VersionRecord {
        let mut fields = self.fields.clone();
        for (key, value) in &overlay.fields {
            fields.insert(key.clone(), value.clone());
        }
        VersionRecord { fields }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EachVersionOptions<'a> {
    /// Also yield the bare base record before the numbered versions.
    pub include_base: bool,
    pub mergeable_keys: &'a [&'a str],
}

impl Default for EachVersionOptions<'_> {
    fn default() -> Self {
        Self {
            include_base: false,
            mergeable_keys: DEFAULT_MERGEABLE_KEYS,
        }
    }
}

impl EachVersionOptions<'_> {
    pub fn with_base() -> Self {
        Self {
            include_base: true,
            ..Self::default()
        }
    }
}

/// Yield every version of every `template_name` template in `code`, in
/// document order and ascending version order within one template.
pub fn each_version(
    template_name: &str,
    code: &Wikicode,
    options: &EachVersionOptions<'_>,
) -> impl Iterator<Item = (VersionId, VersionRecord)> + use<> {
    let mut output = Vec::new();
    for template in code.templates_named(template_name) {
        versions_of_template(template, options, &mut output);
    }
    output.into_iter()
}

fn versions_of_template(
    template: &Template,
    options: &EachVersionOptions<'_>,
    output: &mut Vec<(VersionId, VersionRecord)>,
) {
    let mut base = VersionRecord::default();
    let mut versions = BTreeMap::<u32, VersionRecord>::new();
    for param in &template.params {
        let (key, version) = split_version_suffix(param.name());
        let target = match version {
            Some(version) => versions.entry(version).or_default(),
            None => &mut base,
        };
        target.fields.insert(key.to_string(), param.value.clone());
    }

    if versions.is_empty() {
        output.push((VersionId::Unversioned, base));
        return;
    }

    let all_mergeable = versions.values().all(|record| {
        record
            .fields
            .keys()
            .all(|key| options.mergeable_keys.contains(&key.as_str()))
    });
    if all_mergeable {
        output.push((VersionId::Unversioned, base));
        return;
    }

    if options.include_base {
        output.push((VersionId::Unversioned, base.clone()));
    }
    for (version, record) in versions {
        output.push((VersionId::Numbered(version), base.merged_with(&record)));
    }
}

/// Split `name` into its base and trailing decimal suffix (`id2` -> `id`, 2).
pub fn split_version_suffix(name: &str) -> (&str, Option<u32>) {
    let digits = name
        .bytes()
        .rev()
        .take_while(|byte| byte.is_ascii_digit())
        .count();
    if digits == 0 {
        return (name, None);
    }
    let split = name.len() - digits;
    match name[split..].parse::<u32>() {
        Ok(version) => (&name[..split], Some(version)),
        Err(_) => (name, None),
    }
}
