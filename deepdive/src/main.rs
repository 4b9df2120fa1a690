//! deepdive - command-line client for DeepDive event collection
//!
//! Each invocation behaves like one page load: the visitor and session are
//! resolved from local storage, queued calls are replayed, and events are
//! sent to the collection endpoint.
//!
//! Uses XDG Base Directory specification for file locations:
//! - Store: $XDG_DATA_HOME/deepdive/store.db (~/.local/share/deepdive/store.db)
//! - Cookies: $XDG_DATA_HOME/deepdive/cookies.json
//! - Config: $XDG_CONFIG_HOME/deepdive/config.toml (~/.config/deepdive/config.toml)

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use deepdive_core::identity::{IdentityResolver, IDENTITY_KEY};
use deepdive_core::session::{session_window, SessionResolver, SESSION_KEY};
use deepdive_core::{
    deepdive, lock_global, Clock, CommandQueue, Config, CookieJar, EntryPoint, HttpTransport,
    PageContext, SqliteStore, StorageBackend, StorageTier, SystemClock, Tracker, TrackerBuilder,
    Transport,
};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "deepdive")]
#[command(about = "Send visitor, session and commerce events to DeepDive")]
#[command(version)]
struct Args {
    /// Echo log output to stderr
    #[arg(short, long)]
    verbose: bool,

    /// Print request URLs instead of sending them
    #[arg(long)]
    dry_run: bool,

    /// Project id (overrides DEEPDIVE_PROJECT_ID and the config file)
    #[arg(long)]
    project_id: Option<String>,

    /// Do not send the pageview that accompanies initialization
    #[arg(long)]
    no_pageview: bool,

    /// Cookies as a `name=value; name2=value2` line, used in place of the cookie file
    #[arg(long, value_name = "HEADER")]
    cookie: Option<String>,

    #[command(flatten)]
    page: PageArgs,

    #[command(subcommand)]
    command: Command,
}

/// Description of the page the events are attributed to
#[derive(clap::Args)]
struct PageArgs {
    /// Page URL, including any query string
    #[arg(long, default_value = "")]
    url: String,

    /// Page title
    #[arg(long, default_value = "")]
    title: String,

    /// Referring URL
    #[arg(long, default_value = "")]
    referrer: String,

    /// Language tag
    #[arg(long, default_value = "en-US")]
    language: String,

    /// User agent string
    #[arg(long, default_value = "")]
    user_agent: String,

    /// Viewport width in pixels
    #[arg(long)]
    viewport_width: Option<u32>,

    /// Screen size as WIDTHxHEIGHT
    #[arg(long, value_parser = parse_screen)]
    screen: Option<(u32, u32)>,
}

impl PageArgs {
    fn to_context(&self) -> PageContext {
        let (screen_width, screen_height) = self.screen.unwrap_or((0, 0));
        PageContext {
            url: self.url.clone(),
            title: self.title.clone(),
            referrer: self.referrer.clone(),
            language: self.language.clone(),
            user_agent: self.user_agent.clone(),
            viewport_width: self.viewport_width,
            screen_width,
            screen_height,
            utc_offset: None,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Show configuration and the stored visitor and session
    Status,

    /// Initialize the tracker and send a pageview
    Pageview,

    /// Make one call, e.g. `call purchase '[{"id":"sku1"}]' 9.99 USD 1 2 T1`
    Call {
        /// Method name (pageview, customEvent, viewItem, addToCart, checkout, purchase)
        method: String,

        /// Arguments as JSON; anything that is not valid JSON is taken as a string
        args: Vec<String>,
    },

    /// Queue every call in a JSON-lines file, then initialize and replay them
    Replay {
        /// File with one `["method", arg, ...]` array per line
        file: PathBuf,
    },
}

/// Prints each request URL instead of sending it
struct PrintTransport;

impl Transport for PrintTransport {
    fn send(&self, url: &str) -> deepdive_core::Result<()> {
        println!("{}", url);
        Ok(())
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    Config::ensure_xdg_env();

    let config = Config::load().context("failed to load configuration")?;

    let _log_guard = match deepdive_core::logging::init(&config.logging, args.verbose) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("warning: logging disabled: {}", e);
            None
        }
    };

    match &args.command {
        Command::Status => cmd_status(&config, &args),
        Command::Pageview => cmd_pageview(config, &args),
        Command::Call { method, args: raw } => {
            let call_args = raw.iter().map(|a| parse_arg(a)).collect();
            cmd_call(config, &args, method, call_args)
        }
        Command::Replay { file } => cmd_replay(config, &args, file),
    }
}

fn cmd_status(config: &Config, args: &Args) -> Result<()> {
    let tracker = &config.tracker;
    let project_id = args
        .project_id
        .clone()
        .or_else(|| tracker.resolve_project_id());

    println!("DeepDive Configuration");
    println!("======================");
    println!();
    println!(
        "Project ID:      {}",
        project_id.as_deref().unwrap_or("<not set>")
    );
    println!("Collect URL:     {}", tracker.collect_url);
    println!("Event param:     {}", tracker.event_param.as_str());
    println!("Timestamps:      {:?}", tracker.timestamp_style);
    println!("Debug id:        {}", tracker.debug_id);
    println!("Auto pageview:   {}", tracker.auto_pageview);
    println!("Timeout:         {}s", tracker.timeout_secs);
    println!();

    let store_path = Config::store_path();
    let cookie_path = Config::cookie_path();
    println!("Store:           {}", store_path.display());
    println!("Cookies:         {}", cookie_path.display());
    println!();

    if !store_path.exists() && !cookie_path.exists() && args.cookie.is_none() {
        println!("Visitor:         <none>");
        println!("Session:         <none>");
        return Ok(());
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let cookies = open_cookies(args, clock.clone());
    if let Some(jar) = &cookies {
        println!("Cookie header:   {}", jar.header());
        for name in [IDENTITY_KEY, SESSION_KEY] {
            if let Some(line) = jar.set_cookie_header(name) {
                println!("Set-Cookie:      {}", line);
            }
        }
    }
    let storage = Arc::new(open_storage(cookies));
    let identity = IdentityResolver::new(storage.clone(), clock.clone());
    let session = SessionResolver::new(storage);

    println!(
        "Visitor:         {}",
        identity.peek().as_deref().unwrap_or("<none>")
    );
    match session.peek() {
        Some(stored) => {
            let active = stored
                .last_seen()
                .map(|seen| clock.now() - seen <= session_window())
                .unwrap_or(false);
            println!("Session:         {}", stored.id);
            if let Some(seen) = stored.last_seen() {
                println!("Last seen:       {}", seen.to_rfc3339());
            }
            println!(
                "Status:          {}",
                if active { "active" } else { "expired" }
            );
        }
        None => println!("Session:         <none>"),
    }

    Ok(())
}

fn cmd_pageview(config: Config, args: &Args) -> Result<()> {
    let auto_pageview = config.tracker.auto_pageview && !args.no_pageview;
    run(config, args, CommandQueue::new(), || {
        if !auto_pageview {
            deepdive("pageview", Vec::new());
        }
    })
}

fn cmd_call(config: Config, args: &Args, method: &str, call_args: Vec<Value>) -> Result<()> {
    run(config, args, CommandQueue::new(), || {
        deepdive(method, call_args);
    })
}

fn cmd_replay(config: Config, args: &Args, file: &Path) -> Result<()> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;

    let mut queue = match config.tracker.queue_capacity {
        Some(capacity) => CommandQueue::bounded(capacity),
        None => CommandQueue::new(),
    };
    for (index, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let (method, call_args) = parse_replay_line(line)
            .with_context(|| format!("{}:{}: invalid call", file.display(), index + 1))?;
        queue.enqueue(method, call_args);
    }

    let queued = queue.len();
    run(config, args, queue, || {})?;
    if !args.dry_run {
        println!("Replayed {} call(s)", queued);
    }
    Ok(())
}

/// Initialize the process-wide entry point over `queue`, then run `after_init`.
fn run(config: Config, args: &Args, queue: CommandQueue, after_init: impl FnOnce()) -> Result<()> {
    let mut tracker_config = config.tracker;
    if args.no_pageview {
        tracker_config.auto_pageview = false;
    }
    let timeout = Duration::from_secs(tracker_config.timeout_secs);

    let mut builder = Tracker::builder(tracker_config).page(args.page.to_context());
    if let Some(project_id) = &args.project_id {
        builder = builder.project_id(project_id.clone());
    }
    if builder.configured_project_id().is_none() {
        bail!(
            "no project id configured; pass --project-id, set DEEPDIVE_PROJECT_ID \
             or add tracker.project_id to {}",
            Config::config_path().display()
        );
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let cookies = open_cookies(args, clock.clone());
    let builder = builder
        .clock(clock)
        .storage(open_storage(cookies));

    let http = if args.dry_run {
        None
    } else {
        Some(Arc::new(
            HttpTransport::new(timeout).context("failed to create HTTP transport")?,
        ))
    };
    let builder: TrackerBuilder = match &http {
        Some(http) => builder.transport(http.clone()),
        None => builder.transport(PrintTransport),
    };

    {
        let mut entry = lock_global();
        *entry = EntryPoint::with_queue(queue);
        tracing::debug!(
            dry_run = args.dry_run,
            queued = entry.pending(),
            "Initializing tracker"
        );
        entry.initialize(builder);
        if !entry.is_ready() {
            bail!("tracker failed to initialize; run with --verbose for details");
        }
    }
    after_init();

    if let Some(http) = http {
        http.flush(timeout);
    }
    Ok(())
}

/// The cookie tier: `--cookie` if given, otherwise the cookie file.
fn open_cookies(args: &Args, clock: Arc<dyn Clock>) -> Option<CookieJar> {
    if let Some(header) = &args.cookie {
        return Some(CookieJar::parse_header(header, clock));
    }
    let path = Config::cookie_path();
    match CookieJar::open(&path, clock) {
        Ok(jar) => Some(jar),
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "Cookie jar unavailable, skipping");
            None
        }
    }
}

/// Every tier that opens, primary first. Possibly none.
fn open_storage(cookies: Option<CookieJar>) -> StorageBackend {
    let mut tiers: Vec<Box<dyn StorageTier>> = Vec::new();
    let path = Config::store_path();
    match SqliteStore::open(&path) {
        Ok(store) => tiers.push(Box::new(store)),
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "Store unavailable, skipping");
        }
    }
    if let Some(cookies) = cookies {
        tiers.push(Box::new(cookies));
    }
    let storage = StorageBackend::new(tiers);
    tracing::debug!(tiers = storage.tier_count(), "Storage opened");
    storage
}

/// `--screen 1920x1080`
fn parse_screen(value: &str) -> std::result::Result<(u32, u32), String> {
    let (width, height) = value
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got {:?}", value))?;
    let width = width
        .trim()
        .parse()
        .map_err(|_| format!("invalid width in {:?}", value))?;
    let height = height
        .trim()
        .parse()
        .map_err(|_| format!("invalid height in {:?}", value))?;
    Ok((width, height))
}

/// JSON if it parses, a plain string otherwise
fn parse_arg(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// One replay line: `["method", arg, ...]`
fn parse_replay_line(line: &str) -> Result<(String, Vec<Value>)> {
    let value: Value = serde_json::from_str(line).context("not valid JSON")?;
    let Value::Array(mut items) = value else {
        bail!("expected an array");
    };
    if items.is_empty() {
        bail!("missing method name");
    }
    let Value::String(method) = items.remove(0) else {
        bail!("method name must be a string");
    };
    Ok((method, items))
}
