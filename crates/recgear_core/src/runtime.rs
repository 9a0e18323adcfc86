use std::collections::HashSet;
use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::config::{
    DEFAULT_ACTIVITIES_CSV, DEFAULT_CATEGORY_CACHE_DIR, DEFAULT_ITEM_CACHE, DEFAULT_OUTPUT_DIR,
    DEFAULT_REMEDIATION_FILE, RecgearConfig,
};

pub const STATE_DIR_NAME: &str = ".recgear";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueSource {
    Flag,
    Env,
    Config,
    Heuristic,
    Default,
}

impl ValueSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Flag => "flag",
            Self::Env => "env",
            Self::Config => "config",
            Self::Heuristic => "heuristic",
            Self::Default => "default",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PathOverrides {
    pub project_root: Option<PathBuf>,
    pub config: Option<PathBuf>,
    pub activities_csv: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ResolutionContext {
    pub cwd: PathBuf,
}

impl ResolutionContext {
    pub fn from_process() -> Result<Self> {
        let cwd = env::current_dir().context("failed to read current directory")?;
        Ok(Self { cwd })
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedPaths {
    pub project_root: PathBuf,
    pub state_dir: PathBuf,
    pub config_path: PathBuf,
    pub root_source: ValueSource,
    pub config_source: ValueSource,
}

/// Where one scrape run reads and writes, after config is applied.
#[derive(Debug, Clone)]
pub struct ScrapePaths {
    pub activities_csv: PathBuf,
    pub output_dir: PathBuf,
    pub item_cache: PathBuf,
    pub remediation_file: PathBuf,
    pub category_cache_dir: PathBuf,
    pub activities_source: ValueSource,
    pub output_source: ValueSource,
}

impl ResolvedPaths {
    pub fn diagnostics(&self) -> String {
        format!(
            "project_root={} ({})\nstate_dir={}\nconfig_path={} ({})",
            normalize_for_display(&self.project_root),
            self.root_source.as_str(),
            normalize_for_display(&self.state_dir),
            normalize_for_display(&self.config_path),
            self.config_source.as_str(),
        )
    }

    pub fn scrape_paths(&self, config: &RecgearConfig, overrides: &PathOverrides) -> ScrapePaths {
        let scrape = &config.scrape;
        let (activities_csv, activities_source) = pick_path(
            overrides.activities_csv.as_deref(),
            scrape.activities_csv.as_deref(),
            DEFAULT_ACTIVITIES_CSV,
            &self.project_root,
        );
        let (output_dir, output_source) = pick_path(
            overrides.output_dir.as_deref(),
            scrape.output_dir.as_deref(),
            DEFAULT_OUTPUT_DIR,
            &self.project_root,
        );
        let (item_cache, _) = pick_path(
            None,
            scrape.item_cache.as_deref(),
            DEFAULT_ITEM_CACHE,
            &self.project_root,
        );
        let (remediation_file, _) = pick_path(
            None,
            scrape.remediation_file.as_deref(),
            DEFAULT_REMEDIATION_FILE,
            &self.project_root,
        );
        let (category_cache_dir, _) = pick_path(
            None,
            scrape.category_cache_dir.as_deref(),
            DEFAULT_CATEGORY_CACHE_DIR,
            &self.project_root,
        );
        ScrapePaths {
            activities_csv,
            output_dir,
            item_cache,
            remediation_file,
            category_cache_dir,
            activities_source,
            output_source,
        }
    }
}

impl ScrapePaths {
    pub fn diagnostics(&self) -> String {
        format!(
            "activities_csv={} ({})\noutput_dir={} ({})\nitem_cache={}\nremediation_file={}\ncategory_cache_dir={}",
            normalize_for_display(&self.activities_csv),
            self.activities_source.as_str(),
            normalize_for_display(&self.output_dir),
            self.output_source.as_str(),
            normalize_for_display(&self.item_cache),
            normalize_for_display(&self.remediation_file),
            normalize_for_display(&self.category_cache_dir),
        )
    }

    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if !self.activities_csv.exists() {
            warnings.push(format!(
                "activities CSV is missing: {}",
                normalize_for_display(&self.activities_csv)
            ));
        }
        warnings
    }
}

pub fn resolve_paths(
    context: &ResolutionContext,
    overrides: &PathOverrides,
) -> Result<ResolvedPaths> {
    resolve_paths_with_lookup(context, overrides, |key| env::var(key).ok())
}

fn resolve_paths_with_lookup<F>(
    context: &ResolutionContext,
    overrides: &PathOverrides,
    lookup_env: F,
) -> Result<ResolvedPaths>
where
    F: Fn(&str) -> Option<String>,
{
    let (project_root, root_source) = resolve_project_root(context, overrides, &lookup_env);
    let state_dir = project_root.join(STATE_DIR_NAME);

    let (config_path, config_source) = if let Some(path) = overrides.config.as_deref() {
        (absolutize(path, &project_root), ValueSource::Flag)
    } else if let Some(value) = lookup_env("RECGEAR_CONFIG") {
        (
            absolutize(Path::new(value.trim()), &project_root),
            ValueSource::Env,
        )
    } else {
        (state_dir.join("config.toml"), ValueSource::Default)
    };

    Ok(ResolvedPaths {
        project_root,
        state_dir,
        config_path,
        root_source,
        config_source,
    })
}

fn resolve_project_root<F>(
    context: &ResolutionContext,
    overrides: &PathOverrides,
    lookup_env: &F,
) -> (PathBuf, ValueSource)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(path) = overrides.project_root.as_deref() {
        return (absolutize(path, &context.cwd), ValueSource::Flag);
    }

    if let Some(value) = lookup_env("RECGEAR_PROJECT_ROOT")
        && !value.trim().is_empty()
    {
        return (
            absolutize(Path::new(value.trim()), &context.cwd),
            ValueSource::Env,
        );
    }

    match detect_project_root_heuristic(&context.cwd) {
        Some(root) => (root, ValueSource::Heuristic),
        None => (context.cwd.clone(), ValueSource::Default),
    }
}

/// The nearest ancestor holding a state directory or an activities CSV.
fn detect_project_root_heuristic(cwd: &Path) -> Option<PathBuf> {
    let mut seen = HashSet::new();
    for candidate in cwd.ancestors() {
        if !seen.insert(normalize_for_display(candidate)) {
            continue;
        }
        if candidate.join(STATE_DIR_NAME).is_dir()
            || candidate.join(DEFAULT_ACTIVITIES_CSV).is_file()
        {
            return Some(candidate.to_path_buf());
        }
    }
    None
}

fn pick_path(
    flag: Option<&Path>,
    configured: Option<&str>,
    default: &str,
    project_root: &Path,
) -> (PathBuf, ValueSource) {
    if let Some(path) = flag {
        return (absolutize(path, project_root), ValueSource::Flag);
    }
    if let Some(value) = configured
        && !value.trim().is_empty()
    {
        return (
            absolutize(Path::new(value.trim()), project_root),
            ValueSource::Config,
        );
    }
    (project_root.join(default), ValueSource::Default)
}

fn absolutize(path: &Path, base: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

pub fn normalize_for_display(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
