//! rustscholarly - resilient Google Scholar retrieval
//!
//! ## Usage
//!
//! ### CLI Mode
//! ```bash
//! rustscholarly search "machine learning" --limit 20
//! rustscholarly author-id JicYPdAAAAAJ --fill
//! ```
//!
//! ### HTTP Server Mode
//! ```bash
//! rustscholarly serve --port 3000
//! ```

use anyhow::{Context, Result};
use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use chrono::Local;
use clap::{Parser, Subcommand, ValueEnum};
use futures::{StreamExt, TryStreamExt};
use rustscholarly::{
    cookies::{Cookie, CookieManager},
    navigator::{NavigatorOptions, DEFAULT_SCHOLAR_URL},
    pagination::{Listing, PageIterator},
    proxy::{PathDescriptor, SessionProvider},
    scholarly::{SortBy, SearchOptions},
    types::{Author, AuthorSortBy, Publication},
    Scholarly,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, EnvFilter};

// ============================================================================
// CLI Definition
// ============================================================================

/// Resilient Google Scholar retrieval
#[derive(Parser)]
#[command(name = "rustscholarly")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Per-attempt timeout in milliseconds
    #[arg(long, global = true)]
    timeout_ms: Option<i64>,

    /// Retry budget per request
    #[arg(long, global = true)]
    retries: Option<i64>,

    /// Single HTTP proxy (e.g., http://127.0.0.1:7890)
    #[arg(long, global = true)]
    proxy: Option<String>,

    /// ScraperAPI key, takes precedence over --proxy
    #[arg(long, global = true, env = "SCRAPER_API_KEY", hide_env_values = true)]
    scraperapi_key: Option<String>,

    /// Mirror site URL
    #[arg(long, global = true)]
    mirror: Option<String>,

    /// Write results as CSV into this directory
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum PubSort {
    Relevance,
    Date,
}

#[derive(Clone, Copy, ValueEnum)]
enum ProfileSort {
    Citedby,
    Year,
}

#[derive(Subcommand)]
enum Commands {
    /// Search publications
    Search {
        /// Search query
        query: String,

        /// Maximum number of results
        #[arg(short, long, default_value = "10")]
        limit: usize,

        /// Results from this year onwards
        #[arg(long)]
        year_low: Option<i32>,

        /// Results up to this year
        #[arg(long)]
        year_high: Option<i32>,

        #[arg(long, value_enum, default_value = "relevance")]
        sort_by: PubSort,

        /// Exclude patents
        #[arg(long)]
        no_patents: bool,

        /// Exclude citation-only entries
        #[arg(long)]
        no_citations: bool,
    },

    /// Publications citing a cluster id
    Citedby {
        id: String,

        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Search authors by name
    Author {
        name: String,

        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Search authors by interest labels
    Keyword {
        #[arg(required = true)]
        keywords: Vec<String>,

        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Fetch an author profile by scholar id
    AuthorId {
        id: String,

        /// Fill every profile section
        #[arg(long)]
        fill: bool,

        #[arg(long, value_enum, default_value = "citedby")]
        sort_by: ProfileSort,

        /// Maximum publications to load (0 = all)
        #[arg(long, default_value = "0")]
        publication_limit: usize,
    },

    /// Search institutions
    Org { name: String },

    /// Run as HTTP server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },

    /// Manage cookies
    Cookies {
        #[command(subcommand)]
        action: CookieAction,
    },
}

#[derive(Subcommand)]
enum CookieAction {
    /// Clear stored cookies
    Clear,
    /// Show cookie file path
    Path,
    /// Import cookies exported from a browser (JSON array)
    Import {
        /// File to read, stdin when omitted
        file: Option<PathBuf>,
    },
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.debug { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .init();

    if let Commands::Cookies { action } = &cli.command {
        return handle_cookies(action);
    }

    let scholarly = build_scholarly(&cli).await?;
    let output = cli.output.as_deref();

    match cli.command {
        Commands::Search {
            query,
            limit,
            year_low,
            year_high,
            sort_by,
            no_patents,
            no_citations,
        } => {
            let options = SearchOptions {
                patents: !no_patents,
                citations: !no_citations,
                year_low,
                year_high,
                sort_by: match sort_by {
                    PubSort::Relevance => SortBy::Relevance,
                    PubSort::Date => SortBy::Date,
                },
                ..SearchOptions::default()
            };
            let mut iter = scholarly.search_pubs(&query, &options);
            report_publications(&mut iter, limit, output, "search").await
        }
        Commands::Citedby { id, limit } => {
            let mut iter = scholarly.search_citedby(&id, &SearchOptions::default());
            report_publications(&mut iter, limit, output, "citedby").await
        }
        Commands::Author { name, limit } => {
            let mut iter = scholarly.search_author(&name);
            report_authors(&mut iter, limit, output, "authors").await
        }
        Commands::Keyword { keywords, limit } => {
            let refs: Vec<&str> = keywords.iter().map(String::as_str).collect();
            let mut iter = scholarly.search_keywords(&refs)?;
            report_authors(&mut iter, limit, output, "keyword").await
        }
        Commands::AuthorId {
            id,
            fill,
            sort_by,
            publication_limit,
        } => {
            let sort_by = match sort_by {
                ProfileSort::Citedby => AuthorSortBy::CitedBy,
                ProfileSort::Year => AuthorSortBy::Year,
            };
            let author = scholarly
                .search_author_id(&id, fill, sort_by, publication_limit)
                .await
                .with_context(|| format!("Failed to load author {}", id))?;
            println!("{}", serde_json::to_string_pretty(&author)?);
            if let Some(dir) = output {
                save_csv(dir, "author_publications", &publication_rows(&author.publications))?;
            }
            Ok(())
        }
        Commands::Org { name } => {
            let orgs = scholarly.search_org(&name).await?;
            if orgs.is_empty() {
                println!("No institutions found.");
            }
            for org in &orgs {
                println!("{}\t{}", org.id, org.name);
            }
            Ok(())
        }
        Commands::Serve { port, host } => run_server(scholarly, host, port).await,
        Commands::Cookies { .. } => Ok(()),
    }
}

/// Navigator options, cookies and network path from the global flags
async fn build_scholarly(cli: &Cli) -> Result<Scholarly> {
    let options = NavigatorOptions {
        base_url: cli
            .mirror
            .clone()
            .unwrap_or_else(|| DEFAULT_SCHOLAR_URL.to_string()),
        ..NavigatorOptions::default()
    };
    let scholarly = Scholarly::with_options(options);

    if let Some(ms) = cli.timeout_ms {
        scholarly.set_timeout(ms);
    }
    if let Some(n) = cli.retries {
        scholarly.set_retries(n).context("Invalid --retries")?;
    }

    let cookies = CookieManager::default().load_google();
    if cookies.is_empty() {
        warn!("No cookies loaded. Run 'rustscholarly cookies import' to add browser cookies.");
    }

    let primary = SessionProvider::new().with_cookies(cookies.clone());
    let descriptor = if let Some(key) = &cli.scraperapi_key {
        Some(PathDescriptor::AuthenticatedGateway {
            api_key: key.clone(),
            country_code: None,
            premium: false,
            render: false,
        })
    } else {
        cli.proxy.as_ref().map(|proxy| PathDescriptor::SingleProxy {
            http: proxy.clone(),
            https: None,
        })
    };

    if let Some(descriptor) = descriptor {
        let mode = descriptor.mode();
        let ok = primary
            .configure(descriptor)
            .await
            .context("Invalid proxy configuration")?;
        if ok {
            info!(mode = ?mode, "Using proxy");
        } else {
            warn!(mode = ?mode, "Proxy unusable, continuing with a direct connection");
        }
    }

    scholarly.use_proxy(primary, Some(SessionProvider::new().with_cookies(cookies)));
    Ok(scholarly)
}

/// Pull up to `limit` items; items yielded before a failure are kept
async fn collect<L: Listing>(
    iter: &mut PageIterator<L>,
    limit: usize,
) -> (Vec<L::Item>, Option<rustscholarly::ScholarError>) {
    let mut items = Vec::new();
    while items.len() < limit {
        match iter.next().await {
            Ok(Some(item)) => items.push(item),
            Ok(None) => break,
            Err(e) => return (items, Some(e)),
        }
    }
    (items, None)
}

async fn report_publications<L: Listing<Item = Publication>>(
    iter: &mut PageIterator<L>,
    limit: usize,
    output: Option<&Path>,
    label: &str,
) -> Result<()> {
    let (items, failure) = collect(iter, limit).await;
    if let Some(total) = iter.total_results() {
        println!("About {} results", total);
    }
    for (i, publication) in items.iter().enumerate() {
        println!(
            "{:>3}. {} ({}) - cited by {}",
            i + 1,
            publication.title(),
            publication.bib.pub_year.as_deref().unwrap_or("NA"),
            publication.num_citations
        );
    }
    if let Some(dir) = output {
        save_csv(dir, label, &publication_rows(&items))?;
    }
    match failure {
        Some(e) => Err(e).context(format!("Stopped after {} results", items.len())),
        None => Ok(()),
    }
}

async fn report_authors<L: Listing<Item = Author>>(
    iter: &mut PageIterator<L>,
    limit: usize,
    output: Option<&Path>,
    label: &str,
) -> Result<()> {
    let (items, failure) = collect(iter, limit).await;
    for author in &items {
        println!(
            "{}\t{}\t{}",
            author.scholar_id,
            author.name.as_deref().unwrap_or(""),
            author.affiliation.as_deref().unwrap_or("")
        );
    }
    if let Some(dir) = output {
        save_csv(dir, label, &author_rows(&items))?;
    }
    match failure {
        Some(e) => Err(e).context(format!("Stopped after {} authors", items.len())),
        None => Ok(()),
    }
}

// ============================================================================
// CSV Export
// ============================================================================

#[derive(Debug, Serialize)]
struct PublicationRow {
    title: String,
    author: String,
    year: String,
    venue: String,
    citations: u64,
    pub_url: String,
    eprint_url: String,
    citedby_url: String,
}

fn publication_rows(items: &[Publication]) -> Vec<PublicationRow> {
    items
        .iter()
        .map(|p| PublicationRow {
            title: p.title().to_string(),
            author: p.bib.author.join(" and "),
            year: p.bib.pub_year.clone().unwrap_or_default(),
            venue: p
                .bib
                .venue
                .clone()
                .or_else(|| p.bib.journal.clone())
                .or_else(|| p.bib.citation.clone())
                .unwrap_or_default(),
            citations: p.num_citations,
            pub_url: p.pub_url.clone().unwrap_or_default(),
            eprint_url: p.eprint_url.clone().unwrap_or_default(),
            citedby_url: p.citedby_url.clone().unwrap_or_default(),
        })
        .collect()
}

#[derive(Debug, Serialize)]
struct AuthorRow {
    scholar_id: String,
    name: String,
    affiliation: String,
    email_domain: String,
    citedby: u64,
    interests: String,
}

fn author_rows(items: &[Author]) -> Vec<AuthorRow> {
    items
        .iter()
        .map(|a| AuthorRow {
            scholar_id: a.scholar_id.clone(),
            name: a.name.clone().unwrap_or_default(),
            affiliation: a.affiliation.clone().unwrap_or_default(),
            email_domain: a.email_domain.clone().unwrap_or_default(),
            citedby: a.citedby.unwrap_or(0),
            interests: a.interests.join("; "),
        })
        .collect()
}

/// Save rows to `<dir>/<timestamp>_<label>.csv`
fn save_csv<T: Serialize>(dir: &Path, label: &str, data: &[T]) -> Result<()> {
    if data.is_empty() {
        println!("No data to save for {}", label);
        return Ok(());
    }
    std::fs::create_dir_all(dir).context("Failed to create output directory")?;
    let timestamp = Local::now().format("%Y%m%d_%H%M%S").to_string();
    let path = dir.join(format!("{}_{}.csv", timestamp, label));

    let mut wtr = csv::WriterBuilder::new()
        .has_headers(true)
        .from_path(&path)
        .context("Failed to create CSV writer")?;

    for item in data {
        wtr.serialize(item).context("Failed to write CSV record")?;
    }

    wtr.flush().context("Failed to flush CSV")?;
    println!("Saved: {:?}", path);
    Ok(())
}

// ============================================================================
// HTTP Server
// ============================================================================

async fn run_server(scholarly: Scholarly, host: String, port: u16) -> Result<()> {
    info!(host = %host, port = port, "Starting HTTP server");

    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/search", post(search_handler))
        .route("/authors", post(authors_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(scholarly);

    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .context("Invalid host:port")?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    println!("Listening on http://{}", addr);

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}

/// Health check endpoint
async fn health_handler() -> &'static str {
    "OK"
}

fn default_limit() -> usize {
    10
}

/// Publication search request body
#[derive(Debug, Deserialize)]
struct SearchRequest {
    query: String,
    #[serde(default = "default_limit")]
    limit: usize,
    #[serde(flatten)]
    options: SearchOptions,
}

#[derive(Debug, Serialize)]
struct SearchResponse {
    status: String,
    count: usize,
    total_results: Option<u64>,
    results: Vec<Publication>,
}

async fn search_handler(
    State(scholarly): State<Scholarly>,
    Json(req): Json<SearchRequest>,
) -> Json<SearchResponse> {
    info!(query = %req.query, limit = req.limit, "Search request");

    let mut iter = scholarly.search_pubs(&req.query, &req.options);
    let results: std::result::Result<Vec<Publication>, _> =
        iter.stream().take(req.limit).try_collect().await;
    let total_results = iter.total_results();

    match results {
        Ok(results) => Json(SearchResponse {
            status: "success".to_string(),
            count: results.len(),
            total_results,
            results,
        }),
        Err(e) => {
            error!(error = %e, "Search failed");
            Json(SearchResponse {
                status: format!("error: {}", e),
                count: 0,
                total_results,
                results: vec![],
            })
        }
    }
}

/// Author search request body
#[derive(Debug, Deserialize)]
struct AuthorsRequest {
    name: String,
    #[serde(default = "default_limit")]
    limit: usize,
}

#[derive(Debug, Serialize)]
struct AuthorsResponse {
    status: String,
    count: usize,
    results: Vec<Author>,
}

async fn authors_handler(
    State(scholarly): State<Scholarly>,
    Json(req): Json<AuthorsRequest>,
) -> Json<AuthorsResponse> {
    info!(name = %req.name, limit = req.limit, "Author search request");

    let mut iter = scholarly.search_author(&req.name);
    let results: std::result::Result<Vec<Author>, _> =
        iter.stream().take(req.limit).try_collect().await;

    match results {
        Ok(results) => Json(AuthorsResponse {
            status: "success".to_string(),
            count: results.len(),
            results,
        }),
        Err(e) => {
            error!(error = %e, "Author search failed");
            Json(AuthorsResponse {
                status: format!("error: {}", e),
                count: 0,
                results: vec![],
            })
        }
    }
}

// ============================================================================
// Cookie Management
// ============================================================================

fn handle_cookies(action: &CookieAction) -> Result<()> {
    let manager = CookieManager::new()?;

    match action {
        CookieAction::Clear => {
            manager.clear()?;
            println!("Cookies cleared.");
        }
        CookieAction::Path => {
            println!("Cookie file: {:?}", manager.path());
        }
        CookieAction::Import { file } => import_cookies(&manager, file.as_deref())?,
    }

    Ok(())
}

fn import_cookies(manager: &CookieManager, file: Option<&Path>) -> Result<()> {
    use std::io::{self, Read, Write};

    let input = match file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {:?}", path))?,
        None => {
            println!("=== Manual Cookie Export Instructions ===");
            println!();
            println!("1. Open https://scholar.google.com and complete any CAPTCHA");
            println!("2. Export the cookies with a cookie export extension");
            println!("3. Paste the JSON array below and finish with Ctrl-D");
            println!("Format: [{{\"name\":\"NID\",\"value\":\"xxx\",\"domain\":\".google.com\"}},...]");
            print!("> ");
            io::stdout().flush()?;
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };

    let input = input.trim();
    if input.is_empty() {
        println!("No cookies provided. You can create the cookie file manually at:");
        println!("{:?}", manager.path());
        return Ok(());
    }

    let cookies: Vec<Cookie> =
        serde_json::from_str(input).context("Cookies must be a JSON array")?;
    manager.save(&cookies)?;
    println!("Successfully saved {} cookies!", cookies.len());
    Ok(())
}
