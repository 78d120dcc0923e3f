use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};

use reelfeed::catalog::{ApplyOutcome, Catalog, ReloadToken, SortOrder};
use reelfeed::config::Config;
use reelfeed::feed::{build_client, load_feed, EpisodeRecord, FeedError, FeedResolver, FeedSnapshot};
use reelfeed::util::{clean_html, strip_control_chars, truncate_to_width, validate_url};

/// Episodes suggested under a single-episode view
const RELATED_LIMIT: usize = 6;
const TITLE_WIDTH: usize = 72;
const SUMMARY_WIDTH: usize = 100;

#[derive(Parser, Debug)]
#[command(
    name = "reelfeed",
    version,
    about = "Load a video episode RSS feed through a proxy fallback chain"
)]
struct Args {
    /// Config file (default: ~/.config/reelfeed/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Feed to load instead of the configured one
    #[arg(long, value_name = "URL")]
    feed_url: Option<String>,

    /// Show only the first N episodes
    #[arg(long, value_name = "N")]
    limit: Option<usize>,

    /// Case-insensitive filter on title and description
    #[arg(long, value_name = "QUERY")]
    search: Option<String>,

    /// Listing order: feed, newest or title
    #[arg(long, default_value_t = SortOrder::Feed)]
    sort: SortOrder,

    /// Print JSON instead of text
    #[arg(long)]
    json: bool,

    /// Show one episode in detail, with related episodes
    #[arg(long, value_name = "GUID")]
    episode: Option<String>,

    /// Keep running: reload on the refresh timer or when Enter is pressed
    #[arg(long, conflicts_with = "episode")]
    watch: bool,
}

/// How loaded records are printed.
#[derive(Debug, Clone, Copy)]
struct Output {
    json: bool,
    limit: Option<usize>,
}

/// Result of a background reload, tagged with its generation.
struct ReloadDone {
    token: ReloadToken,
    result: Result<FeedSnapshot, FeedError>,
}

#[derive(Serialize)]
struct EpisodeJson<'a> {
    #[serde(flatten)]
    record: &'a EpisodeRecord,
    slug: String,
    embed_url: String,
    summary: String,
}

impl<'a> EpisodeJson<'a> {
    fn new(record: &'a EpisodeRecord) -> Self {
        Self {
            record,
            slug: record.slug(),
            embed_url: record.embed_url(),
            summary: clean_html(&record.description),
        }
    }
}

#[derive(Serialize)]
struct ListingJson<'a> {
    status: String,
    episodes: Vec<EpisodeJson<'a>>,
}

#[derive(Serialize)]
struct DetailJson<'a> {
    episode: EpisodeJson<'a>,
    recap: String,
    related: Vec<EpisodeJson<'a>>,
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    let path = match path {
        Some(p) => p.clone(),
        None => match Config::default_path() {
            Some(p) => p,
            None => {
                tracing::debug!("HOME not set, using default configuration");
                return Ok(Config::default());
            }
        },
    };
    Config::load(&path).with_context(|| format!("Failed to load config from {}", path.display()))
}

/// Sanitized single-line text for terminal output.
fn terminal_text(s: &str, width: usize) -> String {
    truncate_to_width(&strip_control_chars(s), width).into_owned()
}

fn print_listing(catalog: &Catalog, output: Output) -> Result<()> {
    let visible = catalog.visible();
    let shown = visible.iter().take(output.limit.unwrap_or(usize::MAX));

    if output.json {
        let listing = ListingJson {
            status: catalog.status_line(),
            episodes: shown.map(|r| EpisodeJson::new(r)).collect(),
        };
        println!("{}", serde_json::to_string_pretty(&listing)?);
        return Ok(());
    }

    println!("{}", catalog.status_line());
    if visible.is_empty() {
        println!("No episodes match.");
        return Ok(());
    }

    let now = Utc::now();
    for (n, record) in shown.enumerate() {
        println!();
        println!("{:>3}. {}", n + 1, terminal_text(&record.title, TITLE_WIDTH));
        println!(
            "     {} | {}",
            record.display_date(now),
            terminal_text(&record.guid, TITLE_WIDTH)
        );
        let summary = clean_html(&record.description);
        if !summary.is_empty() {
            println!("     {}", terminal_text(&summary, SUMMARY_WIDTH));
        }
    }
    Ok(())
}

fn print_episode(catalog: &Catalog, guid: &str, json: bool) -> Result<()> {
    let record = catalog
        .find(guid)
        .with_context(|| format!("No episode with guid '{guid}' in feed"))?;
    let related = catalog.related(guid, RELATED_LIMIT);

    if json {
        let detail = DetailJson {
            episode: EpisodeJson::new(record),
            recap: record.recap(),
            related: related.into_iter().map(EpisodeJson::new).collect(),
        };
        println!("{}", serde_json::to_string_pretty(&detail)?);
        return Ok(());
    }

    println!("{}", strip_control_chars(&record.title));
    println!("{}", record.display_date(Utc::now()));
    println!("Recap:     {}", record.recap());
    println!("Link:      {}", strip_control_chars(&record.link));
    println!("Embed:     {}", strip_control_chars(&record.embed_url()));
    println!("Slug:      {}", record.slug());
    println!("Thumbnail: {}", strip_control_chars(record.thumbnail_or_placeholder()));
    println!();
    println!("{}", strip_control_chars(&clean_html(&record.description)));

    if !related.is_empty() {
        println!();
        println!("More episodes:");
        for other in related {
            println!("  - {}", terminal_text(&other.title, TITLE_WIDTH));
        }
    }
    Ok(())
}

fn spawn_reload(
    catalog: &mut Catalog,
    resolver: &FeedResolver,
    feed_url: &str,
    tx: &mpsc::Sender<ReloadDone>,
) {
    let token = catalog.begin_reload();
    let resolver = resolver.clone();
    let feed_url = feed_url.to_owned();
    let tx = tx.clone();

    tracing::debug!(generation = token.generation(), "Spawning feed reload");

    tokio::spawn(async move {
        let result = load_feed(&resolver, &feed_url, None).await;
        if let Err(e) = tx.send(ReloadDone { token, result }).await {
            tracing::warn!(error = %e, "Failed to deliver reload result (receiver dropped)");
        }
    });
}

/// Reloads on the timer, on Enter, and stops on Ctrl-C.
///
/// A reload never cancels one already running; whichever result arrives
/// for an outdated generation is discarded by the catalog.
async fn watch(
    mut catalog: Catalog,
    resolver: FeedResolver,
    feed_url: &str,
    refresh: Option<Duration>,
    output: Output,
) -> Result<()> {
    let (tx, mut rx) = mpsc::channel::<ReloadDone>(8);
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    // Never fires when refresh is None; the select branch is disabled
    let period = refresh.unwrap_or(Duration::from_secs(3600));
    let mut timer = tokio::time::interval_at(Instant::now() + period, period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

    match refresh {
        Some(p) => eprintln!(
            "Watching feed, reloading every {} min. Enter reloads now, Ctrl-C quits.",
            p.as_secs() / 60
        ),
        None => eprintln!("Watching feed. Enter reloads, Ctrl-C quits."),
    }
    spawn_reload(&mut catalog, &resolver, feed_url, &tx);

    loop {
        tokio::select! {
            _ = timer.tick(), if refresh.is_some() => {
                spawn_reload(&mut catalog, &resolver, feed_url, &tx);
            }
            line = stdin.next_line(), if stdin_open => match line {
                Ok(Some(_)) => spawn_reload(&mut catalog, &resolver, feed_url, &tx),
                Ok(None) => {
                    tracing::debug!("stdin closed, manual reload disabled");
                    stdin_open = false;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to read stdin, manual reload disabled");
                    stdin_open = false;
                }
            },
            Some(done) = rx.recv() => {
                match catalog.apply(done.token, done.result) {
                    ApplyOutcome::Applied(_) => print_listing(&catalog, output)?,
                    ApplyOutcome::Failed => {
                        eprintln!("{}", catalog.status_line());
                        if let Some(e) = catalog.last_error() {
                            eprintln!("  {e}");
                        }
                    }
                    ApplyOutcome::Stale => {}
                }
            }
            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to listen for Ctrl-C")?;
                tracing::info!("Interrupted, exiting");
                break;
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so stdout stays clean for --json
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = load_config(args.config.as_ref())?;

    let requested = args.feed_url.as_deref().unwrap_or(&config.feed_url);
    let feed_url = validate_url(requested)
        .with_context(|| format!("Refusing to load feed URL '{requested}'"))?;

    let client = build_client(&config.user_agent).context("Failed to build HTTP client")?;
    let resolver = FeedResolver::new(client).with_timeout(config.request_timeout());

    let mut catalog = Catalog::new();
    catalog.set_sort(args.sort);
    if let Some(query) = &args.search {
        catalog.set_query(query);
    }

    let output = Output {
        json: args.json,
        limit: args.limit.or_else(|| config.limit()),
    };

    if args.watch {
        return watch(
            catalog,
            resolver,
            feed_url.as_str(),
            config.refresh_interval(),
            output,
        )
        .await;
    }

    // Partial extraction only when the first N in feed order are what gets shown
    let plain_listing =
        args.episode.is_none() && args.search.is_none() && args.sort == SortOrder::Feed;
    let extract = if plain_listing { output.limit } else { None };

    let token = catalog.begin_reload();
    let snapshot = load_feed(&resolver, feed_url.as_str(), extract)
        .await
        .context("Failed to load feed")?;
    catalog.apply(token, Ok(snapshot));

    match &args.episode {
        Some(guid) => print_episode(&catalog, guid, args.json),
        None => print_listing(&catalog, output),
    }
}
