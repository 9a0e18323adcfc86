use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, CommandFactory, Parser, Subcommand};
use recgear_core::activities::{ScrapeOptions, load_activities, scrape_activities};
use recgear_core::cache::{RemediationList, ResolutionCache};
use recgear_core::config::{RecgearConfig, load_config};
use recgear_core::gear::page_styles;
use recgear_core::resolve::ItemResolver;
use recgear_core::runtime::{
    PathOverrides, ResolutionContext, ResolvedPaths, ScrapePaths, resolve_paths,
};
use recgear_core::wiki::{MediaWikiClient, MediaWikiClientConfig, PageSource};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "recgear",
    version,
    about = "Scrape recommended gear from wiki strategy pages and resolve item ids"
)]
struct Cli {
    #[arg(long, global = true, value_name = "PATH")]
    project_root: Option<PathBuf>,
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    #[arg(long, global = true, help = "Ignore the item and category caches on load")]
    no_cache: bool,
    #[arg(long, global = true, help = "Print resolved runtime diagnostics")]
    diagnostics: bool,
    #[arg(short, long, global = true, help = "Log at debug level")]
    verbose: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Clone)]
struct RuntimeOptions {
    project_root: Option<PathBuf>,
    config: Option<PathBuf>,
    no_cache: bool,
    diagnostics: bool,
}

impl RuntimeOptions {
    fn from_cli(cli: &Cli) -> Self {
        Self {
            project_root: cli.project_root.clone(),
            config: cli.config.clone(),
            no_cache: cli.no_cache,
            diagnostics: cli.diagnostics,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Scrape every activity in the activities CSV")]
    Scrape(ScrapeArgs),
    #[command(about = "Resolve item names to ids")]
    Resolve(ResolveArgs),
    #[command(about = "Print the recommended gear styles of one page as JSON")]
    Page(PageArgs),
    Cache(CacheArgs),
}

#[derive(Debug, Args)]
struct ScrapeArgs {
    #[arg(long, value_name = "PATH", help = "Activities CSV (name,url,category)")]
    csv: Option<PathBuf>,
    #[arg(long, value_name = "DIR", help = "Directory for per-activity and combined JSON")]
    output: Option<PathBuf>,
    #[arg(long = "title", value_name = "TITLE", help = "Only scrape these page titles")]
    titles: Vec<String>,
}

#[derive(Debug, Args)]
struct ResolveArgs {
    #[arg(required = true)]
    names: Vec<String>,
}

#[derive(Debug, Args)]
struct PageArgs {
    title: String,
}

#[derive(Debug, Args)]
struct CacheArgs {
    #[command(subcommand)]
    command: CacheSubcommand,
}

#[derive(Debug, Subcommand)]
enum CacheSubcommand {
    Stats,
    Forget { name: String },
}

/// Everything a command needs once paths and config are settled.
struct Session {
    scrape_paths: ScrapePaths,
    config: RecgearConfig,
    use_cache: bool,
}

impl Session {
    fn open_cache(&self) -> Result<ResolutionCache> {
        ResolutionCache::open(&self.scrape_paths.item_cache, self.use_cache)
    }

    fn open_remediation(&self) -> Result<RemediationList> {
        RemediationList::open(&self.scrape_paths.remediation_file)
    }

    fn client(&self) -> Result<MediaWikiClient> {
        let config = MediaWikiClientConfig::from_config(&self.config)
            .with_category_cache(&self.scrape_paths.category_cache_dir, self.use_cache);
        MediaWikiClient::new(config)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let runtime = RuntimeOptions::from_cli(&cli);

    match cli.command {
        Some(Commands::Scrape(args)) => run_scrape(&runtime, args),
        Some(Commands::Resolve(ResolveArgs { names })) => run_resolve(&runtime, &names),
        Some(Commands::Page(PageArgs { title })) => run_page(&runtime, &title),
        Some(Commands::Cache(CacheArgs { command })) => match command {
            CacheSubcommand::Stats => run_cache_stats(&runtime),
            CacheSubcommand::Forget { name } => run_cache_forget(&runtime, &name),
        },
        None => {
            let mut command = Cli::command();
            command.print_help()?;
            println!();
            Ok(())
        }
    }
}

fn init_tracing(verbose: bool) {
    let fallback = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_env("RECGEAR_LOG").unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run_scrape(runtime: &RuntimeOptions, args: ScrapeArgs) -> Result<()> {
    let session = open_session(
        runtime,
        PathOverrides {
            activities_csv: args.csv,
            output_dir: args.output,
            ..PathOverrides::default()
        },
    )?;
    let activities = load_activities(&session.scrape_paths.activities_csv)?;
    info!(
        activities = activities.len(),
        csv = %normalize_path(&session.scrape_paths.activities_csv),
        "loaded activities"
    );

    let mut client = session.client()?;
    let mut cache = session.open_cache()?;
    let mut remediation = session.open_remediation()?;
    let options = ScrapeOptions {
        output_dir: session.scrape_paths.output_dir.clone(),
        article_prefix: session.config.article_prefix().to_string(),
        only_titles: args.titles,
    };

    let report = match scrape_activities(
        &mut client,
        &mut cache,
        &mut remediation,
        &activities,
        &options,
    ) {
        Ok(report) => report,
        Err(scrape_error) => {
            error!(error = %format!("{scrape_error:#}"), "scrape aborted");
            return Err(scrape_error);
        }
    };

    println!("scrape");
    println!("activities.total: {}", report.activities_total);
    println!("activities.scraped: {}", report.activities_scraped);
    println!("styles: {}", report.styles_total);
    println!("requests: {}", report.request_count);
    println!("cache.entries: {}", report.cache_entries);
    println!("remediation.entries: {}", report.remediation_entries);
    if report.missing_pages.is_empty() {
        println!("missing_pages: <none>");
    } else {
        for title in &report.missing_pages {
            println!("missing_page: {title}");
        }
    }
    for path in &report.written_files {
        println!("wrote: {}", normalize_path(path));
    }
    Ok(())
}

fn run_resolve(runtime: &RuntimeOptions, names: &[String]) -> Result<()> {
    let session = open_session(runtime, PathOverrides::default())?;
    let mut client = session.client()?;
    let mut cache = session.open_cache()?;
    let mut remediation = session.open_remediation()?;

    let outcome = {
        let mut resolver = ItemResolver::new(&mut client, &mut cache, &mut remediation);
        let mut lines = Vec::with_capacity(names.len());
        let mut failure = None;
        for name in names {
            match resolver.resolve_item(name) {
                Ok(ids) => lines.push(format!("{name}: {:?}", ids.as_slice())),
                Err(resolve_error) => {
                    failure = Some(
                        anyhow::Error::new(resolve_error)
                            .context(format!("failed to resolve `{name}`")),
                    );
                    break;
                }
            }
        }
        (lines, failure)
    };
    cache.save()?;

    let (lines, failure) = outcome;
    for line in lines {
        println!("{line}");
    }
    println!("requests: {}", client.request_count());
    match failure {
        Some(failure) => Err(failure),
        None => Ok(()),
    }
}

fn run_page(runtime: &RuntimeOptions, title: &str) -> Result<()> {
    let session = open_session(runtime, PathOverrides::default())?;
    let mut client = session.client()?;
    let mut cache = session.open_cache()?;
    let mut remediation = session.open_remediation()?;

    let markup = client
        .fetch_page(title)
        .with_context(|| format!("failed to fetch `{title}`"))?;
    let styles = {
        let mut resolver = ItemResolver::new(&mut client, &mut cache, &mut remediation);
        page_styles(&mut resolver, &markup)
    };
    cache.save()?;
    let styles = styles.with_context(|| format!("failed to collect gear for `{title}`"))?;

    let rendered = serde_json::to_string_pretty(&styles).context("failed to serialize styles")?;
    println!("{rendered}");
    Ok(())
}

fn run_cache_stats(runtime: &RuntimeOptions) -> Result<()> {
    let session = open_session(runtime, PathOverrides::default())?;
    let cache = ResolutionCache::open(&session.scrape_paths.item_cache, true)?;
    let remediation = session.open_remediation()?;
    let total_ids = cache.entries().map(|(_, ids)| ids.len()).sum::<usize>();

    println!("cache stats");
    println!("item_cache: {}", normalize_path(&session.scrape_paths.item_cache));
    println!("item_cache.entries: {}", cache.len());
    println!("item_cache.ids: {total_ids}");
    println!(
        "remediation_file: {}",
        normalize_path(&session.scrape_paths.remediation_file)
    );
    println!("remediation.entries: {}", remediation.len());
    Ok(())
}

fn run_cache_forget(runtime: &RuntimeOptions, name: &str) -> Result<()> {
    let session = open_session(runtime, PathOverrides::default())?;
    let mut cache = ResolutionCache::open(&session.scrape_paths.item_cache, true)?;
    match cache.evict(name) {
        Some(ids) => {
            cache.save()?;
            println!("forgot: {name} {:?}", ids.as_slice());
        }
        None => println!("not cached: {name}"),
    }
    Ok(())
}

fn open_session(runtime: &RuntimeOptions, overrides: PathOverrides) -> Result<Session> {
    let overrides = PathOverrides {
        project_root: runtime.project_root.clone(),
        config: runtime.config.clone(),
        ..overrides
    };
    let paths = resolve_runtime_paths(&overrides)?;
    let config = load_config(&paths.config_path)?;
    let scrape_paths = paths.scrape_paths(&config, &overrides);
    let use_cache = !runtime.no_cache && config.use_cache();

    if runtime.diagnostics {
        println!("{}", paths.diagnostics());
        println!("{}", scrape_paths.diagnostics());
        println!("use_cache={}", format_flag(use_cache));
        for warning in scrape_paths.warnings() {
            println!("warning: {warning}");
        }
    }

    Ok(Session {
        scrape_paths,
        config,
        use_cache,
    })
}

fn resolve_runtime_paths(overrides: &PathOverrides) -> Result<ResolvedPaths> {
    dotenvy::dotenv().ok();

    let context = ResolutionContext::from_process()?;
    let initial = resolve_paths(&context, overrides)?;
    let project_env = initial.project_root.join(".env");
    if project_env.exists() {
        let _ = dotenvy::from_path_override(&project_env);
    }

    resolve_paths(&context, overrides)
}

fn normalize_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn format_flag(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}
