use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::thread::sleep;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result, bail};
use reqwest::blocking::Client;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::config::RecgearConfig;

const TITLES_PER_REQUEST: usize = 50;
const MAX_REDIRECT_HOPS: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    /// Title as it was asked for.
    pub requested: String,
    /// Title after normalization and redirects.
    pub title: String,
    pub content: String,
}

/// Read access to wiki page markup.
pub trait PageSource {
    /// Markup of `title`, following redirects. A missing page is an error.
    fn fetch_page(&mut self, title: &str) -> Result<String>;

    /// Every page in `category`, title to markup.
    fn fetch_category_pages(&mut self, category: &str) -> Result<BTreeMap<String, String>>;

    /// Markup for several titles. Titles that do not exist are left out; the
    /// default implementation fetches one title at a time and stops at the
    /// first failure.
    fn fetch_pages(&mut self, titles: &[String]) -> Result<Vec<FetchedPage>> {
        let mut output = Vec::with_capacity(titles.len());
        for title in titles {
            let content = self.fetch_page(title)?;
            output.push(FetchedPage {
                requested: title.clone(),
                title: title.clone(),
                content,
            });
        }
        Ok(output)
    }

    fn request_count(&self) -> usize;
}

#[derive(Debug, Clone)]
pub struct MediaWikiClientConfig {
    pub api_url: String,
    pub user_agent: String,
    pub timeout_ms: u64,
    pub rate_limit_read_ms: u64,
    pub max_retries: usize,
    pub retry_delay_ms: u64,
    pub category_cache_dir: Option<PathBuf>,
    pub reuse_category_cache: bool,
}

impl MediaWikiClientConfig {
    pub fn from_config(config: &RecgearConfig) -> Self {
        Self {
            api_url: config.api_url(),
            user_agent: config.user_agent(),
            timeout_ms: env_value_u64("WIKI_HTTP_TIMEOUT_MS", 30_000),
            rate_limit_read_ms: env_value_u64("WIKI_RATE_LIMIT_READ", 300),
            max_retries: env_value_usize("WIKI_HTTP_RETRIES", 2),
            retry_delay_ms: env_value_u64("WIKI_HTTP_RETRY_DELAY_MS", 500),
            category_cache_dir: None,
            reuse_category_cache: true,
        }
    }

    pub fn with_category_cache(mut self, dir: impl Into<PathBuf>, reuse: bool) -> Self {
        self.category_cache_dir = Some(dir.into());
        self.reuse_category_cache = reuse;
        self
    }
}

pub struct MediaWikiClient {
    client: Client,
    config: MediaWikiClientConfig,
    last_request_at: Option<Instant>,
    request_count: usize,
    pages: BTreeMap<String, Option<FetchedPage>>,
}

impl MediaWikiClient {
    pub fn new(config: MediaWikiClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .context("failed to build MediaWiki HTTP client")?;

        Ok(Self {
            client,
            config,
            last_request_at: None,
            request_count: 0,
            pages: BTreeMap::new(),
        })
    }

    fn request_json_get(&mut self, params: &[(&str, String)]) -> Result<Value> {
        let base_url = Url::parse(&self.config.api_url)
            .with_context(|| format!("invalid WIKI_API_URL: {}", self.config.api_url))?;

        let mut pairs = Vec::with_capacity(params.len() + 2);
        pairs.push(("format".to_string(), "json".to_string()));
        pairs.push(("formatversion".to_string(), "2".to_string()));
        for (key, value) in params {
            if !value.is_empty() {
                pairs.push(((*key).to_string(), value.clone()));
            }
        }

        for attempt in 0..=self.config.max_retries {
            self.apply_rate_limit();
            debug!(attempt, api = %self.config.api_url, "requesting MediaWiki API");
            let response = self
                .client
                .get(base_url.clone())
                .header("User-Agent", self.config.user_agent.clone())
                .query(&pairs)
                .send();

            match response {
                Ok(response) => {
                    let status = response.status();
                    if !status.is_success() {
                        if attempt < self.config.max_retries && is_retryable_status(status) {
                            self.wait_before_retry(attempt);
                            continue;
                        }
                        bail!("MediaWiki API request failed with HTTP {status}");
                    }

                    let payload: Value = response
                        .json()
                        .context("failed to decode MediaWiki API JSON response")?;
                    if let Some(error) = payload.get("error") {
                        let code = error
                            .get("code")
                            .and_then(Value::as_str)
                            .unwrap_or("unknown_error");
                        let info = error
                            .get("info")
                            .and_then(Value::as_str)
                            .unwrap_or("unknown info");
                        bail!("MediaWiki API error [{code}]: {info}");
                    }
                    return Ok(payload);
                }
                Err(error) => {
                    if attempt < self.config.max_retries && is_retryable_error(&error) {
                        self.wait_before_retry(attempt);
                        continue;
                    }
                    return Err(error).context("failed to call MediaWiki API");
                }
            }
        }

        bail!("MediaWiki API request exhausted retry budget")
    }

    fn apply_rate_limit(&mut self) {
        let delay = Duration::from_millis(self.config.rate_limit_read_ms);
        if let Some(last) = self.last_request_at {
            let elapsed = last.elapsed();
            if elapsed < delay {
                sleep(delay - elapsed);
            }
        }
        self.last_request_at = Some(Instant::now());
        self.request_count += 1;
    }

    fn wait_before_retry(&self, attempt: usize) {
        let exponent = u32::try_from(attempt).unwrap_or(16);
        let base = self
            .config
            .retry_delay_ms
            .saturating_mul(2u64.saturating_pow(exponent));
        let jitter = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|duration| u64::from(duration.subsec_millis() % 100))
            .unwrap_or(0);
        sleep(Duration::from_millis(base.saturating_add(jitter)));
    }

    fn load_titles(&mut self, titles: &[String]) -> Result<()> {
        let pending = titles
            .iter()
            .filter(|title| !self.pages.contains_key(*title))
            .cloned()
            .collect::<Vec<_>>();

        for batch in pending.chunks(TITLES_PER_REQUEST) {
            let params = vec![
                ("action", "query".to_string()),
                ("titles", batch.join("|")),
                ("prop", "revisions".to_string()),
                ("rvprop", "content".to_string()),
                ("rvslots", "main".to_string()),
                ("redirects", "1".to_string()),
            ];
            let response = self.request_json_get(&params)?;
            let parsed: QueryResponse = serde_json::from_value(response)
                .context("failed to decode page content API response")?;

            let normalized = title_mapping(&parsed.query.normalized);
            let redirects = title_mapping(&parsed.query.redirects);
            let contents = page_contents(parsed.query.pages);

            for requested in batch {
                let resolved = resolve_requested_title(requested, &normalized, &redirects);
                let page = contents.get(&resolved).map(|content| FetchedPage {
                    requested: requested.clone(),
                    title: resolved.clone(),
                    content: content.clone(),
                });
                if page.is_none() {
                    debug!(title = %requested, "page does not exist");
                }
                self.pages.insert(requested.clone(), page);
            }
        }
        Ok(())
    }

    fn category_cache_path(&self, category: &str) -> Option<PathBuf> {
        self.config
            .category_cache_dir
            .as_deref()
            .map(|dir| category_cache_file(dir, category))
    }

    fn query_category_page_ids(&mut self, category: &str) -> Result<Vec<i64>> {
        let mut page_ids = Vec::new();
        let mut continue_token: Option<String> = None;
        let category_title = if category.starts_with("Category:") {
            category.to_string()
        } else {
            format!("Category:{category}")
        };

        loop {
            let mut params = vec![
                ("action", "query".to_string()),
                ("list", "categorymembers".to_string()),
                ("cmtitle", category_title.clone()),
                ("cmtype", "page".to_string()),
                ("cmlimit", "500".to_string()),
            ];
            if let Some(token) = &continue_token {
                params.push(("cmcontinue", token.clone()));
            }

            let response = self.request_json_get(&params)?;
            let parsed: QueryResponse = serde_json::from_value(response)
                .context("failed to decode categorymembers API response")?;
            for item in parsed.query.categorymembers {
                page_ids.push(item.pageid);
            }

            continue_token = parsed.continuation.and_then(|cont| cont.cmcontinue);
            if continue_token.is_none() {
                break;
            }
        }

        Ok(page_ids)
    }

    fn query_pages_by_id(&mut self, page_ids: &[i64]) -> Result<BTreeMap<String, String>> {
        let mut output = BTreeMap::new();
        for batch in page_ids.chunks(TITLES_PER_REQUEST) {
            let params = vec![
                ("action", "query".to_string()),
                (
                    "pageids",
                    batch
                        .iter()
                        .map(ToString::to_string)
                        .collect::<Vec<_>>()
                        .join("|"),
                ),
                ("prop", "revisions".to_string()),
                ("rvprop", "content".to_string()),
                ("rvslots", "main".to_string()),
            ];
            let response = self.request_json_get(&params)?;
            let parsed: QueryResponse = serde_json::from_value(response)
                .context("failed to decode page content API response")?;
            output.extend(page_contents(parsed.query.pages));
        }
        Ok(output)
    }
}

impl PageSource for MediaWikiClient {
    fn fetch_page(&mut self, title: &str) -> Result<String> {
        let requested = title.to_string();
        self.load_titles(std::slice::from_ref(&requested))?;
        match self.pages.get(&requested) {
            Some(Some(page)) => Ok(page.content.clone()),
            _ => bail!("page `{title}` does not exist"),
        }
    }

    fn fetch_category_pages(&mut self, category: &str) -> Result<BTreeMap<String, String>> {
        let cache_path = self.category_cache_path(category);
        if self.config.reuse_category_cache
            && let Some(path) = &cache_path
            && path.exists()
        {
            debug!(category, path = %path.display(), "reading cached category");
            let content = fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            return serde_json::from_str(&content)
                .with_context(|| format!("failed to parse category cache {}", path.display()));
        }

        let page_ids = self.query_category_page_ids(category)?;
        let pages = self.query_pages_by_id(&page_ids)?;
        info!(category, pages = pages.len(), "fetched category members");

        if let Some(path) = &cache_path {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
            let rendered =
                serde_json::to_string(&pages).context("failed to serialize category cache")?;
            fs::write(path, rendered)
                .with_context(|| format!("failed to write {}", path.display()))?;
        }
        Ok(pages)
    }

    fn fetch_pages(&mut self, titles: &[String]) -> Result<Vec<FetchedPage>> {
        self.load_titles(titles)?;
        Ok(titles
            .iter()
            .filter_map(|title| self.pages.get(title).cloned().flatten())
            .collect())
    }

    fn request_count(&self) -> usize {
        self.request_count
    }
}

pub fn category_cache_file(dir: &Path, category: &str) -> PathBuf {
    let name = category.strip_prefix("Category:").unwrap_or(category);
    dir.join(format!("{}.cache.json", name.replace(['/', '\\'], "_")))
}

/// Follow the API's `normalized` and `redirects` lists from a requested title
/// to the title of the page that was returned.
fn resolve_requested_title(
    requested: &str,
    normalized: &BTreeMap<String, String>,
    redirects: &BTreeMap<String, String>,
) -> String {
    let mut current = normalized
        .get(requested)
        .cloned()
        .unwrap_or_else(|| requested.to_string());
    for _ in 0..MAX_REDIRECT_HOPS {
        match redirects.get(&current) {
            Some(target) if *target != current => current = target.clone(),
            _ => break,
        }
    }
    current
}

fn title_mapping(items: &[TitleMapping]) -> BTreeMap<String, String> {
    items
        .iter()
        .map(|item| (item.from.clone(), item.to.clone()))
        .collect()
}

fn page_contents(pages: Vec<PageQueryItem>) -> BTreeMap<String, String> {
    let mut output = BTreeMap::new();
    for page in pages {
        if page.missing.unwrap_or(false) {
            continue;
        }
        let Some(content) = page
            .revisions
            .into_iter()
            .next()
            .and_then(|revision| revision.slots)
            .and_then(|slots| slots.main)
            .map(|slot| slot.content)
        else {
            continue;
        };
        output.insert(page.title, content);
    }
    output
}

fn env_value_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_value_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<usize>().ok())
        .unwrap_or(default)
}

fn is_retryable_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::REQUEST_TIMEOUT
            | StatusCode::TOO_MANY_REQUESTS
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    )
}

fn is_retryable_error(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect() || error.is_request()
}

#[derive(Debug, Deserialize, Default)]
struct QueryResponse {
    #[serde(default)]
    query: QueryPayload,
    #[serde(default, rename = "continue")]
    continuation: Option<ContinuationPayload>,
}

#[derive(Debug, Deserialize, Default)]
struct QueryPayload {
    #[serde(default)]
    normalized: Vec<TitleMapping>,
    #[serde(default)]
    redirects: Vec<TitleMapping>,
    #[serde(default)]
    categorymembers: Vec<CategoryMemberItem>,
    #[serde(default)]
    pages: Vec<PageQueryItem>,
}

#[derive(Debug, Deserialize, Default)]
struct ContinuationPayload {
    cmcontinue: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TitleMapping {
    from: String,
    to: String,
}

#[derive(Debug, Deserialize)]
struct CategoryMemberItem {
    pageid: i64,
}

#[derive(Debug, Deserialize)]
struct PageQueryItem {
    title: String,
    missing: Option<bool>,
    #[serde(default)]
    revisions: Vec<RevisionQueryItem>,
}

#[derive(Debug, Deserialize)]
struct RevisionQueryItem {
    slots: Option<RevisionSlotContainer>,
}

#[derive(Debug, Deserialize)]
struct RevisionSlotContainer {
    main: Option<RevisionMainSlot>,
}

#[derive(Debug, Deserialize)]
struct RevisionMainSlot {
    content: String,
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::BTreeMap;

    use anyhow::{Result, bail};

    use super::{FetchedPage, PageSource};
    use crate::wikitext::normalize_name;

    /// In-memory wiki keyed by normalized title.
    #[derive(Debug, Default)]
    pub(crate) struct MockSource {
        pages: BTreeMap<String, String>,
        categories: BTreeMap<String, BTreeMap<String, String>>,
        pub(crate) fetched: Vec<String>,
        request_count: usize,
    }

    impl MockSource {
        pub(crate) fn with_page(mut self, title: &str, content: &str) -> Self {
            self.pages.insert(normalize_name(title), content.to_string());
            self
        }

        pub(crate) fn with_category_page(
            mut self,
            category: &str,
            title: &str,
            content: &str,
        ) -> Self {
            self.categories
                .entry(category.to_string())
                .or_default()
                .insert(title.to_string(), content.to_string());
            self
        }

        pub(crate) fn fetch_count(&self, title: &str) -> usize {
            self.fetched.iter().filter(|fetched| *fetched == title).count()
        }
    }

    impl PageSource for MockSource {
        fn fetch_page(&mut self, title: &str) -> Result<String> {
            self.request_count += 1;
            self.fetched.push(title.to_string());
            match self.pages.get(&normalize_name(title)) {
                Some(content) => Ok(content.clone()),
                None => bail!("page `{title}` does not exist"),
            }
        }

        fn fetch_category_pages(&mut self, category: &str) -> Result<BTreeMap<String, String>> {
            self.request_count += 1;
            Ok(self.categories.get(category).cloned().unwrap_or_default())
        }

        fn fetch_pages(&mut self, titles: &[String]) -> Result<Vec<FetchedPage>> {
            self.request_count += 1;
            Ok(titles
                .iter()
                .filter_map(|title| {
                    self.pages.get(&normalize_name(title)).map(|content| FetchedPage {
                        requested: title.clone(),
                        title: normalize_name(title),
                        content: content.clone(),
                    })
                })
                .collect())
        }

        fn request_count(&self) -> usize {
            self.request_count
        }
    }
}
