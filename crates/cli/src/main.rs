//! stacmap CLI - STAC extent inspection and incremental item search

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use stacmap_search::bbox::{sanitize, value_bbox};
use stacmap_search::models::Collection;
use stacmap_search::temporal::{
    extract_temporal_extent, format_instant, from_millis, parse_instant,
};
use stacmap_search::url_state::{with_param, HREF_PARAM};
use stacmap_search::window::{describe_duration, window_size};
use stacmap_search::{
    find_search_link, BBox, DateRange, ItemCollection, MapState, MemoryLocation, Progress,
    SearchRequest, SearchSnapshot, SearchStatus, StacClient, StacClientOptions, StacValue,
    StateOptions,
};

// ─── CLI structure ──────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "stacmap")]
#[command(author, version, about = "Browse and search STAC catalogs", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Request timeout in seconds
    #[arg(long, global = true, default_value = "30")]
    timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the temporal and spatial extent of a STAC value and the
    /// slider domain derived from it
    Extent {
        /// Catalog, collection, item or item collection URL
        href: String,
        /// Page query to restore state from, e.g. "clientFilter=startDate%3D..."
        #[arg(long)]
        url: Option<String>,
    },
    /// Run a paginated item search
    Search {
        /// Catalog or collection URL whose search endpoint is used
        href: String,
        /// Collection id to search (repeatable); defaults to the loaded collection
        #[arg(short, long = "collection")]
        collections: Vec<String>,
        /// Window start (RFC 3339 or YYYY-MM-DD)
        #[arg(long)]
        start: Option<String>,
        /// Window end (RFC 3339 or YYYY-MM-DD)
        #[arg(long)]
        end: Option<String>,
        /// Viewport as west,south,east,north
        #[arg(long, allow_hyphen_values = true)]
        bbox: Option<String>,
        /// Search link method to prefer
        #[arg(short, long, value_enum)]
        method: Option<Method>,
        /// Page size
        #[arg(short, long)]
        limit: Option<u32>,
        /// Pause the search once this many items have arrived
        #[arg(long)]
        max_items: Option<usize>,
        /// Write the items as a FeatureCollection here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Method {
    Get,
    Post,
}

impl Method {
    fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

// ─── Helpers ────────────────────────────────────────────────────────────

fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");
}

fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap(),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn items_bar() -> ProgressBar {
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} items {msg}",
            )
            .unwrap()
            .progress_chars("=> "),
    );
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn update_bar(pb: &ProgressBar, snapshot: &SearchSnapshot) {
    let Progress { accumulated, matched } = snapshot.progress;
    match matched {
        Some(total) => pb.set_length(total),
        None => pb.set_length(accumulated as u64),
    }
    pb.set_position(accumulated as u64);
    let msg = match &snapshot.status {
        SearchStatus::FirstRequest => "waiting for first page",
        SearchStatus::Fetching => "fetching",
        SearchStatus::Paused => "paused",
        SearchStatus::Exhausted => "done",
        SearchStatus::Errored(_) => "failed",
        SearchStatus::Idle => "",
    };
    pb.set_message(msg);
}

fn client(timeout: u64) -> Result<Arc<StacClient>> {
    let options = StacClientOptions {
        request_timeout: Duration::from_secs(timeout),
        ..StacClientOptions::default()
    };
    Ok(Arc::new(StacClient::new(options).context("Failed to build HTTP client")?))
}

async fn load(client: &StacClient, href: &str) -> Result<StacValue> {
    let pb = spinner("Loading STAC value...");
    let value = client
        .get_value(href)
        .await
        .with_context(|| format!("Failed to load {href}"))?;
    pb.finish_and_clear();
    info!("Loaded {} {}", value.kind(), value.id().unwrap_or("-"));
    Ok(value)
}

async fn load_collections(client: &StacClient, href: &str, value: &StacValue) -> Vec<Collection> {
    match client.get_collections(href, value).await {
        Ok(collections) => collections,
        Err(e) => {
            warn!("Could not list collections: {e}");
            Vec::new()
        }
    }
}

/// Reject requested collection ids the catalog does not list. An empty
/// listing accepts anything.
fn check_collections(requested: &[String], available: &[Collection]) -> Result<()> {
    if available.is_empty() {
        return Ok(());
    }
    let unknown: Vec<&str> = requested
        .iter()
        .map(String::as_str)
        .filter(|id| !available.iter().any(|c| c.id == *id))
        .collect();
    if !unknown.is_empty() {
        bail!("Unknown collection(s): {}", unknown.join(", "));
    }
    Ok(())
}

fn fmt_ms(ms: i64) -> String {
    from_millis(ms)
        .map(|t| format_instant(&t))
        .unwrap_or_else(|| ms.to_string())
}

fn parse_bbox(input: &str) -> Result<BBox> {
    let values = input
        .split(',')
        .map(|v| v.trim().parse::<f64>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .context("Invalid bbox: expected comma-separated numbers")?;
    Ok(sanitize(&values)?)
}

fn parse_filter(start: Option<&str>, end: Option<&str>) -> Result<DateRange> {
    let start = start.map(parse_instant).transpose()?;
    let end = end.map(parse_instant).transpose()?;
    Ok(match (start, end) {
        (Some(start), Some(end)) => match DateRange::between(start, end) {
            Some(range) => range,
            None => bail!("--start must be before --end"),
        },
        (Some(start), None) => DateRange::starting(start),
        (None, Some(end)) => DateRange::ending(end),
        (None, None) => DateRange::default(),
    })
}

// ─── Commands ───────────────────────────────────────────────────────────

async fn run_extent(href: String, url: Option<String>, timeout: u64) -> Result<()> {
    let client = client(timeout)?;
    let value = load(&client, &href).await?;

    let query = url.as_deref().unwrap_or("").trim_start_matches('?');
    let query = with_param(query, HREF_PARAM, Some(&href));
    let location = MemoryLocation::new("/", &query);
    let mut state = MapState::new(location, Arc::clone(&client), StateOptions::default());
    let had_filter = state.is_client_filter_active();

    println!("{}: {}", value.kind(), value.id().unwrap_or("-"));
    match extract_temporal_extent(&value) {
        Some(extent) => println!(
            "Temporal extent: {} / {}",
            format_instant(&extent.start),
            format_instant(&extent.end)
        ),
        None => println!("Temporal extent: none"),
    }
    if let Some(bbox) = value_bbox(&value) {
        println!(
            "Spatial extent: ({:.6}, {:.6}) - ({:.6}, {:.6})",
            bbox.west, bbox.south, bbox.east, bbox.north
        );
    }

    let collections = load_collections(&client, &href, &value).await;
    if !collections.is_empty() {
        println!("\nCollections ({}):", collections.len());
        for collection in &collections {
            match &collection.title {
                Some(title) => println!("  {} - {title}", collection.id),
                None => println!("  {}", collection.id),
            }
        }
    }

    let domain = state.set_value(value);
    if !domain.has_valid_range {
        println!("No temporal data available");
    } else {
        println!("\nSlider:");
        println!("  Range: {} - {}", fmt_ms(domain.min), fmt_ms(domain.max));
        println!("  Duration: {}", describe_duration(domain.duration()));
        println!("  Step: {} ms", domain.step);
        println!("  Default window: {}", describe_duration(window_size(&domain)));
        let [low, high] = state.selection();
        println!("  Selection: {} - {}", fmt_ms(low), fmt_ms(high));
    }

    if had_filter && !state.is_client_filter_active() {
        warn!("Client filter was outside the temporal extent and has been cleared");
    } else if let Some(interval) = state.client_filter().to_interval() {
        println!("Client filter: {interval}");
    }

    state.flush();
    println!("\nURL: {}", state.with_location(|l| l.url()));
    Ok(())
}

struct SearchArgs {
    href: String,
    collections: Vec<String>,
    start: Option<String>,
    end: Option<String>,
    bbox: Option<String>,
    method: Option<Method>,
    limit: Option<u32>,
    max_items: Option<usize>,
    output: Option<PathBuf>,
}

async fn run_search(args: SearchArgs, timeout: u64) -> Result<()> {
    let filter = parse_filter(args.start.as_deref(), args.end.as_deref())?;
    let viewport = args.bbox.as_deref().map(parse_bbox).transpose()?;

    let client = client(timeout)?;
    let value = load(&client, &args.href).await?;
    if !args.collections.is_empty() {
        let available = load_collections(&client, &args.href, &value).await;
        check_collections(&args.collections, &available)?;
    }
    let link = find_search_link(&client, &args.href, &value, args.method.map(Method::as_str))
        .await
        .context("No item search endpoint")?;

    let mut base = SearchRequest::new();
    if !args.collections.is_empty() {
        base = base.collections(&args.collections);
    } else if let StacValue::Collection(collection) = &value {
        base = base.collections(&[collection.id.as_str()]);
    }
    if let Some(limit) = args.limit {
        base = base.limit(limit);
    }

    let query = with_param("", HREF_PARAM, Some(&args.href));
    let location = MemoryLocation::new("/", &query);
    let mut state = MapState::new(location, client, StateOptions::default());
    state.set_value(value);
    if filter.is_active() && !state.set_client_filter(filter) {
        bail!("--start/--end lie outside the temporal extent");
    }
    state.set_viewport(viewport);
    state.submit_search(base, link)?;
    if let Some(request) = state.search().effective_request() {
        info!(
            "Searching collections={:?} datetime={} bbox={:?}",
            request.collections.unwrap_or_default(),
            request.datetime.as_deref().unwrap_or(".."),
            request.bbox
        );
    }

    let start = Instant::now();
    let snapshot = match state.search().session() {
        Some(session) => {
            let pb = items_bar();
            let mut rx = session.subscribe();
            let mut pausing = false;
            let snapshot = loop {
                let snapshot = rx.borrow_and_update().clone();
                update_bar(&pb, &snapshot);
                if let Some(max) = args.max_items {
                    let reached = snapshot.progress.accumulated >= max;
                    if !pausing && reached && !snapshot.status.is_terminal() {
                        info!("Reached {max} items, pausing");
                        session.pause();
                        pausing = true;
                        continue;
                    }
                }
                if snapshot.is_settled() || rx.changed().await.is_err() {
                    break snapshot;
                }
            };
            pb.finish_and_clear();
            snapshot
        }
        None => bail!("Search did not start"),
    };

    if let Some(message) = state.search_mut().take_error() {
        warn!("Search stopped early: {message}");
    }

    let mut items = state.search_items();
    if let Some(max) = args.max_items {
        items.truncate(max);
    }
    let matched = snapshot.progress.matched;
    info!(
        "{} items{} in {:.2?}",
        items.len(),
        matched.map(|m| format!(" of {m} matched")).unwrap_or_default(),
        start.elapsed()
    );

    let mut collection = ItemCollection::new(items);
    collection.number_matched = matched;
    match &args.output {
        Some(path) => {
            let file = std::fs::File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            serde_json::to_writer_pretty(file, &collection).context("Failed to write output")?;
            println!("Items saved to: {}", path.display());
        }
        None => {
            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            serde_json::to_writer_pretty(&mut out, &collection).context("Failed to write output")?;
            writeln!(out)?;
        }
    }

    state.flush();
    info!("URL: {}", state.with_location(|l| l.url()));

    if let SearchStatus::Errored(_) = snapshot.status {
        bail!("Search failed after {} items", collection.features.len());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match cli.command {
        Commands::Extent { href, url } => run_extent(href, url, cli.timeout).await?,
        Commands::Search {
            href,
            collections,
            start,
            end,
            bbox,
            method,
            limit,
            max_items,
            output,
        } => {
            let args = SearchArgs {
                href,
                collections,
                start,
                end,
                bbox,
                method,
                limit,
                max_items,
                output,
            };
            run_search(args, cli.timeout).await?
        }
    }

    Ok(())
}
