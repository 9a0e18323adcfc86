use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::cache::{RemediationList, ResolutionCache};
use crate::gear::{GearStyle, page_styles};
use crate::resolve::ItemResolver;
use crate::wiki::PageSource;
use crate::wikitext::normalize_name;

pub const ALL_OUTPUT_FILE: &str = "all.json";
pub const ALL_MINIFIED_OUTPUT_FILE: &str = "all.min.json";

/// One row of the activities CSV.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityRow {
    pub name: String,
    pub url: String,
    pub category: String,
}

impl ActivityRow {
    /// Wiki page title for this activity: the URL without the article prefix
    /// and without any `#fragment`.
    pub fn page_title(&self, article_prefix: &str) -> String {
        let url = self.url.trim();
        let title = url.strip_prefix(article_prefix).unwrap_or(url);
        let title = title.split('#').next().unwrap_or(title);
        title.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityRecommendations {
    #[serde(flatten)]
    pub activity: ActivityRow,
    pub styles: Vec<GearStyle>,
}

#[derive(Debug, Clone)]
pub struct ScrapeOptions {
    pub output_dir: PathBuf,
    pub article_prefix: String,
    /// Only scrape activities whose page title is listed. Empty means all.
    pub only_titles: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ScrapeReport {
    pub activities_total: usize,
    pub activities_scraped: usize,
    pub styles_total: usize,
    pub written_files: Vec<PathBuf>,
    pub missing_pages: Vec<String>,
    pub request_count: usize,
    pub cache_entries: usize,
    pub remediation_entries: usize,
}

pub fn load_activities(path: &Path) -> Result<Vec<ActivityRow>> {
    let content =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    parse_activities_csv(&content)
        .with_context(|| format!("failed to parse activities CSV {}", path.display()))
}

/// Rows after the header, skipping any without a URL.
pub fn parse_activities_csv(content: &str) -> Result<Vec<ActivityRow>> {
    let rows = parse_csv_rows(strip_bom(content), ',');
    let mut output = Vec::new();
    for (line, row) in rows.into_iter().enumerate().skip(1) {
        if row.iter().all(|field| field.trim().is_empty()) {
            continue;
        }
        if row.len() < 3 {
            bail!(
                "row {} has {} columns, expected name,url,category",
                line + 1,
                row.len()
            );
        }
        let url = row[1].trim();
        if url.is_empty() {
            continue;
        }
        output.push(ActivityRow {
            name: row[0].trim().to_string(),
            url: url.to_string(),
            category: row[2].trim().to_string(),
        });
    }
    Ok(output)
}

/// Scrape recommended gear for every activity. Each activity's styles are
/// written as soon as they are known and the item cache is saved after every
/// activity, and before an error is returned.
pub fn scrape_activities<S: PageSource>(
    source: &mut S,
    cache: &mut ResolutionCache,
    remediation: &mut RemediationList,
    activities: &[ActivityRow],
    options: &ScrapeOptions,
) -> Result<ScrapeReport> {
    fs::create_dir_all(&options.output_dir)
        .with_context(|| format!("failed to create {}", options.output_dir.display()))?;

    let selected = activities
        .iter()
        .filter(|activity| {
            options.only_titles.is_empty()
                || options.only_titles.iter().any(|wanted| {
                    normalize_name(wanted)
                        == normalize_name(&activity.page_title(&options.article_prefix))
                })
        })
        .collect::<Vec<_>>();

    let mut by_title = BTreeMap::<String, &ActivityRow>::new();
    let mut titles = Vec::new();
    for activity in &selected {
        let title = activity.page_title(&options.article_prefix);
        if by_title.insert(normalize_name(&title), activity).is_none() {
            titles.push(title);
        }
    }

    let pages = source
        .fetch_pages(&titles)
        .context("failed to fetch activity pages")?;
    let mut report = ScrapeReport {
        activities_total: activities.len(),
        ..ScrapeReport::default()
    };
    let fetched = pages
        .iter()
        .map(|page| normalize_name(&page.requested))
        .collect::<Vec<_>>();
    for title in &titles {
        if !fetched.contains(&normalize_name(title)) {
            warn!(title = %title, "activity page does not exist");
            report.missing_pages.push(title.clone());
        }
    }

    let mut all = Vec::new();
    for page in &pages {
        let Some(activity) = by_title.get(&normalize_name(&page.requested)) else {
            continue;
        };
        info!(activity = %activity.name, title = %page.title, "scraping activity");

        let styles = {
            let mut resolver = ItemResolver::new(&mut *source, &mut *cache, &mut *remediation);
            page_styles(&mut resolver, &page.content)
        };
        let styles = match styles {
            Ok(styles) => styles,
            Err(resolve_error) => {
                error!(activity = %activity.name, error = %resolve_error, "activity failed");
                cache.save()?;
                return Err(anyhow::Error::new(resolve_error))
                    .with_context(|| format!("failed to scrape `{}`", activity.name));
            }
        };

        let output_path = options
            .output_dir
            .join(format!("{}.json", sanitize_filename(&activity.name)));
        write_json(Some(&output_path), None, &styles)?;
        cache.save()?;

        report.activities_scraped += 1;
        report.styles_total += styles.len();
        report.written_files.push(output_path);
        all.push(ActivityRecommendations {
            activity: (*activity).clone(),
            styles,
        });
    }

    let all_path = options.output_dir.join(ALL_OUTPUT_FILE);
    let all_min_path = options.output_dir.join(ALL_MINIFIED_OUTPUT_FILE);
    write_json(Some(&all_path), Some(&all_min_path), &all)?;
    cache.save()?;
    report.written_files.push(all_path);
    report.written_files.push(all_min_path);

    report.request_count = source.request_count();
    report.cache_entries = cache.len();
    report.remediation_entries = remediation.len();
    Ok(report)
}

/// Write `data` pretty-printed, minified, or both.
pub fn write_json<T: Serialize + ?Sized>(
    pretty_path: Option<&Path>,
    minified_path: Option<&Path>,
    data: &T,
) -> Result<()> {
    if let Some(path) = pretty_path {
        let rendered = serde_json::to_string_pretty(data).context("failed to serialize JSON")?;
        write_file(path, &rendered)?;
    }
    if let Some(path) = minified_path {
        let rendered = serde_json::to_string(data).context("failed to serialize JSON")?;
        write_file(path, &rendered)?;
    }
    Ok(())
}

/// Activity names are used as file names; path separators and characters
/// Windows rejects become `-`.
pub fn sanitize_filename(value: &str) -> String {
    let mut output = String::new();
    let mut previous_dash = false;
    for ch in value.trim().chars() {
        if ch.is_control() || matches!(ch, '<' | '>' | ':' | '"' | '|' | '?' | '*' | '/' | '\\') {
            if !previous_dash && !output.is_empty() {
                output.push('-');
                previous_dash = true;
            }
            continue;
        }
        output.push(ch);
        previous_dash = false;
    }
    while output.ends_with('-') || output.ends_with('.') {
        output.pop();
    }
    if output.is_empty() {
        output.push_str("activity");
    }
    output
}

fn write_file(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(path, content).with_context(|| format!("failed to write {}", path.display()))
}

fn parse_csv_rows(content: &str, delimiter: char) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    let mut row = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = content.chars().peekable();

    while let Some(ch) = chars.next() {
        if in_quotes {
            if ch == '"' {
                if chars.peek() == Some(&'"') {
                    field.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            } else {
                field.push(ch);
            }
            continue;
        }

        match ch {
            '"' => in_quotes = true,
            ch if ch == delimiter => row.push(std::mem::take(&mut field)),
            '\n' | '\r' => {
                if ch == '\r' && chars.peek() == Some(&'\n') {
                    chars.next();
                }
                row.push(std::mem::take(&mut field));
                rows.push(std::mem::take(&mut row));
            }
            _ => field.push(ch),
        }
    }

    row.push(field);
    if row.len() > 1 || row.first().is_some_and(|value| !value.trim().is_empty()) {
        rows.push(row);
    }
    rows
}

fn strip_bom(content: &str) -> &str {
    content.strip_prefix('\u{feff}').unwrap_or(content)
}
