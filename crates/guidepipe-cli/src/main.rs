use anyhow::Result;
use clap::{Parser, Subcommand};
use guidepipe_core::{Error, DEFAULT_FETCH_TIMEOUT};
use guidepipe_local::locales::{locale_label, LOCALES};
use guidepipe_local::session::{next_page, prev_page};
use guidepipe_local::{FieldGuide, GuideConfig, LocalFetcher, Locator};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "guidepipe")]
#[command(about = "Look up and search the field guide (JSON on stdout)", long_about = None)]
struct Cli {
    #[command(flatten)]
    site: SiteArgs,
    #[command(subcommand)]
    command: Commands,
}

/// Overrides applied on top of `GUIDEPIPE_*` environment configuration.
#[derive(clap::Args, Debug)]
struct SiteArgs {
    /// Site prefix up to and including the content-root segment.
    #[arg(long, global = true, env = "GUIDEPIPE_SITE_ROOT")]
    site_root: Option<String>,
    /// Locale code (en_us, ja_jp, ...).
    #[arg(long, global = true, env = "GUIDEPIPE_LOCALE")]
    locale: Option<String>,
    /// Explicit search index URL.
    #[arg(long, global = true, env = "GUIDEPIPE_SEARCH_INDEX_URL")]
    search_index_url: Option<String>,
    /// Per-request fetch timeout (ms).
    #[arg(long, global = true, env = "GUIDEPIPE_FETCH_TIMEOUT_MS")]
    timeout_ms: Option<u64>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Resolve a path or URL to its canonical page URL (no network).
    Locate(LocateCmd),
    /// Summarize a page, or one section of it when a #fragment is given.
    Page(PageCmd),
    /// Print the title of a page.
    Title(PageCmd),
    /// Search the guide and print one page of results.
    Search(SearchCmd),
    /// Print the quick-access menu of entry pages, labelled with their titles.
    Top,
    /// Print the effective configuration and known locales.
    Doctor(DoctorCmd),
    /// Print version info.
    Version(VersionCmd),
}

#[derive(clap::Args, Debug)]
struct LocateCmd {
    /// Path relative to the locale root, or an absolute URL.
    input: String,
}

#[derive(clap::Args, Debug)]
struct PageCmd {
    /// Path relative to the locale root, or an absolute URL; may carry a #fragment.
    input: String,
}

#[derive(clap::Args, Debug)]
struct SearchCmd {
    /// Free-text query.
    query: String,
    /// Maximum index matches to consider.
    #[arg(long, default_value_t = 250)]
    limit: usize,
    /// Result page to print (1-based; clamped).
    #[arg(long, default_value_t = 1)]
    page: usize,
    /// Skip the index and crawl with the smaller page budget.
    #[arg(long, action = clap::ArgAction::Set, default_value_t = false)]
    deep: bool,
}

#[derive(clap::Args, Debug)]
struct DoctorCmd {
    /// Output format: json|text
    #[arg(long = "output", alias = "format", default_value = "json")]
    output: String,
}

#[derive(clap::Args, Debug)]
struct VersionCmd {
    /// Output format: json|text
    #[arg(long = "output", alias = "format", default_value = "json")]
    output: String,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn load_config(site: &SiteArgs) -> Result<GuideConfig> {
    let mut cfg = GuideConfig::from_env()?;
    if let Some(s) = &site.site_root {
        cfg.site_root = s.trim().to_string();
    }
    if let Some(l) = &site.locale {
        cfg.locale = l.trim().to_ascii_lowercase();
    }
    if let Some(u) = site.search_index_url.as_ref().filter(|u| !u.trim().is_empty()) {
        cfg.search_index_url = Some(u.trim().to_string());
    }
    if let Some(t) = site.timeout_ms {
        cfg.fetch_timeout_ms = t;
    }
    cfg.validate()?;
    Ok(cfg)
}

fn build_guide(cfg: GuideConfig) -> Result<FieldGuide> {
    let timeout = Duration::from_millis(cfg.fetch_timeout_ms).max(DEFAULT_FETCH_TIMEOUT);
    let fetcher = LocalFetcher::new(timeout)?;
    Ok(FieldGuide::new(cfg, Arc::new(fetcher))?)
}

/// Stable code plus a message safe to show an end user (never a raw transport error).
fn error_view(e: &Error) -> (&'static str, String) {
    match e {
        Error::InvalidUrl(_) => ("invalid_url", "that doesn't look like a guide page".to_string()),
        Error::Fetch(_) => ("fetch_failed", "failed to fetch".to_string()),
        Error::IndexFormat(_) => ("index_format", "the search index is unavailable".to_string()),
        Error::SessionExpired => ("session_expired", "this session expired".to_string()),
        Error::NotConfigured(m) => ("not_configured", m.clone()),
    }
}

fn print_error(kind: &str, e: &Error) -> ExitCode {
    tracing::warn!(kind, error = %e, "command failed");
    let (code, message) = error_view(e);
    let v = serde_json::json!({
        "schema_version": 1,
        "kind": kind,
        "ok": false,
        "error": { "code": code, "message": message },
    });
    println!("{v}");
    ExitCode::FAILURE
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Version(args) => {
            let v = serde_json::json!({
                "schema_version": 1,
                "kind": "version",
                "ok": true,
                "name": "guidepipe",
                "version": env!("CARGO_PKG_VERSION"),
            });
            match args.output.to_ascii_lowercase().as_str() {
                "text" => println!("guidepipe {}", env!("CARGO_PKG_VERSION")),
                _ => println!("{v}"),
            }
        }
        Commands::Doctor(args) => {
            let cfg = load_config(&cli.site);
            let locales: Vec<serde_json::Value> = LOCALES
                .iter()
                .map(|(code, label)| serde_json::json!({ "code": code, "label": label }))
                .collect();
            let v = match &cfg {
                Ok(c) => serde_json::json!({
                    "schema_version": 1,
                    "kind": "doctor",
                    "ok": true,
                    "name": "guidepipe",
                    "version": env!("CARGO_PKG_VERSION"),
                    "config": c,
                    "locale_label": locale_label(&c.locale),
                    "locales": locales,
                }),
                Err(e) => serde_json::json!({
                    "schema_version": 1,
                    "kind": "doctor",
                    "ok": false,
                    "name": "guidepipe",
                    "version": env!("CARGO_PKG_VERSION"),
                    "error": { "code": "not_configured", "message": e.to_string() },
                    "locales": locales,
                }),
            };
            match args.output.to_ascii_lowercase().as_str() {
                "text" => match &cfg {
                    Ok(c) => println!(
                        "guidepipe {}: {} ({})",
                        env!("CARGO_PKG_VERSION"),
                        c.site_root,
                        locale_label(&c.locale)
                    ),
                    Err(e) => println!("guidepipe {}: {e}", env!("CARGO_PKG_VERSION")),
                },
                _ => println!("{v}"),
            }
        }
        Commands::Locate(args) => {
            let locator = Locator::from_config(&load_config(&cli.site)?)?;
            match locator.resolve(&args.input) {
                Ok(located) => {
                    let v = serde_json::json!({
                        "schema_version": 1,
                        "kind": "locate",
                        "ok": true,
                        "url": located.full_url(),
                        "canonical_url": located.canonical_url,
                        "fragment": located.fragment,
                    });
                    println!("{v}");
                }
                Err(e) => return Ok(print_error("locate", &e)),
            }
        }
        Commands::Page(args) => {
            let guide = build_guide(load_config(&cli.site)?)?;
            match guide.build_page_artifact(&args.input).await {
                Ok(artifact) => {
                    let v = serde_json::json!({
                        "schema_version": 1,
                        "kind": "page",
                        "ok": true,
                        "artifact": artifact,
                    });
                    println!("{v}");
                }
                Err(e) => return Ok(print_error("page", &e)),
            }
        }
        Commands::Title(args) => {
            let guide = build_guide(load_config(&cli.site)?)?;
            match guide.page_title(&args.input).await {
                Ok(r) => {
                    let v = serde_json::json!({
                        "schema_version": 1,
                        "kind": "title",
                        "ok": true,
                        "title": r.title,
                        "url": r.url,
                    });
                    println!("{v}");
                }
                Err(e) => return Ok(print_error("title", &e)),
            }
        }
        Commands::Top => {
            let guide = build_guide(load_config(&cli.site)?)?;
            match guide.top_links(None).await {
                Ok(options) => {
                    let v = serde_json::json!({
                        "schema_version": 1,
                        "kind": "top",
                        "ok": true,
                        "locale": guide.locator().locale(),
                        "options": options,
                    });
                    println!("{v}");
                }
                Err(e) => return Ok(print_error("top", &e)),
            }
        }
        Commands::Search(args) => {
            let guide = build_guide(load_config(&cli.site)?)?;
            let t0 = std::time::Instant::now();
            let results = if args.deep {
                guide.search_deep(&args.query).await
            } else {
                guide.search(&args.query, args.limit).await
            };
            let token = guide.session_create(results, &args.query);
            match guide.session_page(&token, args.page) {
                Ok(page) => {
                    let v = serde_json::json!({
                        "schema_version": 1,
                        "kind": "search",
                        "ok": true,
                        "mode": if args.deep { "deep" } else { "auto" },
                        "elapsed_ms": t0.elapsed().as_millis() as u64,
                        "prev_page": prev_page(page.page),
                        "next_page": next_page(page.page, page.total_pages),
                        "session": page,
                    });
                    println!("{v}");
                }
                Err(e) => return Ok(print_error("search", &e)),
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}
