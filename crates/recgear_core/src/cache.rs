use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Item ids in first-seen order, without repeats.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemIdList(Vec<u32>);

impl ItemIdList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, id: u32) {
        if !self.0.contains(&id) {
            self.0.push(id);
        }
    }

    pub fn extend_from(&mut self, ids: impl IntoIterator<Item = u32>) {
        for id in ids {
            self.push(id);
        }
    }

    pub fn as_slice(&self) -> &[u32] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.0.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<u32> for ItemIdList {
    fn from_iter<I: IntoIterator<Item = u32>>(iter: I) -> Self {
        let mut output = Self::new();
        output.extend_from(iter);
        output
    }
}

impl From<ItemIdList> for Vec<u32> {
    fn from(value: ItemIdList) -> Self {
        value.0
    }
}

/// Item name to id list, persisted across runs as one JSON object.
#[derive(Debug, Clone, Default)]
pub struct ResolutionCache {
    entries: BTreeMap<String, ItemIdList>,
    path: Option<PathBuf>,
}

impl ResolutionCache {
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Open the cache backed by `path`. Existing contents are read only when
    /// `read_existing` is set; saving always targets `path`.
    pub fn open(path: &Path, read_existing: bool) -> Result<Self> {
        let entries = if read_existing && path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            if content.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&content)
                    .with_context(|| format!("failed to parse item cache {}", path.display()))?
            }
        } else {
            BTreeMap::new()
        };
        Ok(Self {
            entries,
            path: Some(path.to_path_buf()),
        })
    }

    pub fn get(&self, name: &str) -> Option<&ItemIdList> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, ids: ItemIdList) {
        self.entries.insert(name.into(), ids);
    }

    pub fn evict(&mut self, name: &str) -> Option<ItemIdList> {
        self.entries.remove(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &ItemIdList)> {
        self.entries.iter().map(|(name, ids)| (name.as_str(), ids))
    }

    /// Write the cache to its backing file, if it has one.
    pub fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let rendered =
            serde_json::to_string(&self.entries).context("failed to serialize item cache")?;
        fs::write(path, rendered).with_context(|| format!("failed to write {}", path.display()))
    }
}

/// Names that resolved to no ids, one per line, each written once.
#[derive(Debug, Clone, Default)]
pub struct RemediationList {
    names: BTreeSet<String>,
    path: Option<PathBuf>,
}

impl RemediationList {
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Load the list at `path`, creating an empty file when it is missing.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let names = if path.exists() {
            fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?
                .lines()
                .map(str::trim_end)
                .filter(|line| !line.is_empty())
                .map(ToString::to_string)
                .collect()
        } else {
            fs::write(path, "").with_context(|| format!("failed to create {}", path.display()))?;
            BTreeSet::new()
        };
        Ok(Self {
            names,
            path: Some(path.to_path_buf()),
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Append `name` unless it is already listed. Returns `true` when a line
    /// was written.
    pub fn record(&mut self, name: &str) -> Result<bool> {
        if self.names.contains(name) {
            return Ok(false);
        }
        if let Some(path) = &self.path {
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open {}", path.display()))?;
            writeln!(file, "{name}")
                .with_context(|| format!("failed to append to {}", path.display()))?;
        }
        self.names.insert(name.to_string());
        Ok(true)
    }
}
