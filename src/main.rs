use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use futures::future::join_all;
use serde_json::{json, Map, Value};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use hookfetch::cache::{CacheStorage, NoopStorage, SqliteStorage};
use hookfetch::config::Config;
use hookfetch::{
  logging, FetchClient, FetchHook, FetchOptions, HttpTransport, MutateOptions, MutationHook,
  MutationMethod, RequestOptions, ResponseType,
};

#[derive(Parser, Debug)]
#[command(name = "hookfetch")]
#[command(about = "Fetch and mutate HTTP resources through a persistent response cache")]
#[command(version)]
struct Args {
  /// Path to config file (default: ./hookfetch.yaml or $XDG_CONFIG_HOME/hookfetch/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// GET one or more paths through the cache, with retries
  Get {
    #[arg(required = true)]
    paths: Vec<String>,
    #[command(flatten)]
    request: RequestArgs,
    /// Serve cached responses younger than this many milliseconds
    #[arg(long)]
    cache_ms: Option<u64>,
    /// Bypass the persistent cache entirely
    #[arg(long)]
    no_cache: bool,
    /// Drop cached entries before fetching
    #[arg(long)]
    invalidate: bool,
    #[arg(long)]
    retries: Option<u32>,
    #[arg(long)]
    retry_delay_ms: Option<u64>,
  },
  /// Send a write request (POST, PUT, PATCH, DELETE); never cached
  Send {
    #[arg(value_parser = parse_method)]
    method: MutationMethod,
    path: String,
    /// JSON request body
    #[arg(long, default_value = "null")]
    body: String,
    #[command(flatten)]
    request: RequestArgs,
  },
  /// Print the cached entry for a path without fetching
  Show { path: String },
  /// Remove the cached entry for a path
  Invalidate { path: String },
  /// Remove cached entries older than the given age
  Prune {
    #[arg(long)]
    older_than_ms: u64,
  },
  /// Remove every cached entry
  Clear,
}

#[derive(clap::Args, Debug, Default)]
struct RequestArgs {
  /// Query parameter as name=value (repeatable)
  #[arg(long = "param", value_parser = parse_pair)]
  params: Vec<(String, String)>,
  /// Header as name=value (repeatable)
  #[arg(long = "header", value_parser = parse_pair)]
  headers: Vec<(String, String)>,
  /// Override the configured base URL
  #[arg(long)]
  base_url: Option<String>,
  #[arg(long)]
  timeout_ms: Option<u64>,
  /// Return the body as text instead of parsing JSON
  #[arg(long)]
  text: bool,
}

impl RequestArgs {
  fn to_options(&self) -> RequestOptions {
    let mut options = RequestOptions::new();
    for (name, value) in &self.params {
      options = options.param(name, value);
    }
    for (name, value) in &self.headers {
      options = options.header(name, value);
    }
    if let Some(base_url) = &self.base_url {
      options = options.base_url(base_url);
    }
    if let Some(ms) = self.timeout_ms {
      options = options.timeout(Duration::from_millis(ms));
    }
    if self.text {
      options = options.response_type(ResponseType::Text);
    }
    options
  }
}

fn parse_pair(s: &str) -> std::result::Result<(String, String), String> {
  s.split_once('=')
    .map(|(k, v)| (k.trim().to_string(), v.to_string()))
    .filter(|(k, _)| !k.is_empty())
    .ok_or_else(|| format!("expected name=value, got '{}'", s))
}

fn parse_method(s: &str) -> std::result::Result<MutationMethod, String> {
  match s.to_ascii_uppercase().as_str() {
    "POST" => Ok(MutationMethod::Post),
    "PUT" => Ok(MutationMethod::Put),
    "PATCH" => Ok(MutationMethod::Patch),
    "DELETE" => Ok(MutationMethod::Delete),
    _ => Err(format!("unsupported method '{}'", s)),
  }
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = Config::load(args.config.as_deref())?;
  let _log_guard = logging::init(&config.log)?;

  let no_cache = matches!(args.command, Command::Get { no_cache: true, .. });
  let storage: Arc<dyn CacheStorage> = if no_cache {
    Arc::new(NoopStorage)
  } else {
    Arc::new(SqliteStorage::open(config.cache.db_path()?))
  };
  let transport = Arc::new(HttpTransport::new()?);
  let client = FetchClient::new(config.options.clone(), storage, transport);

  match args.command {
    Command::Get {
      paths,
      request,
      cache_ms,
      invalidate,
      retries,
      retry_delay_ms,
      ..
    } => {
      let cache_duration = cache_ms
        .map(Duration::from_millis)
        .unwrap_or_else(|| config.cache.duration());
      let mut hooks: Vec<FetchHook<Value>> = paths
        .iter()
        .map(|path| {
          let options = FetchOptions::new()
            .request(request.to_options())
            .cache_duration(cache_duration)
            .retries(retries.unwrap_or_else(|| config.retry.retries()))
            .retry_delay(
              retry_delay_ms
                .map(Duration::from_millis)
                .unwrap_or_else(|| config.retry.delay()),
            )
            .invalidate(invalidate);
          FetchHook::mount(client.clone(), path.clone(), options)
        })
        .collect();

      join_all(hooks.iter_mut().map(|hook| hook.settled())).await;

      let mut failures = Vec::new();
      let mut output = Map::new();
      for hook in &hooks {
        match (hook.data(), hook.error()) {
          (Some(data), _) => {
            output.insert(hook.url().to_string(), data.clone());
          }
          (None, Some(error)) => failures.push(format!("{}: {}", hook.url(), error)),
          (None, None) => failures.push(format!("{}: no data", hook.url())),
        }
      }

      if paths.len() == 1 {
        if let Some(data) = output.values().next() {
          println!("{}", serde_json::to_string_pretty(data)?);
        }
      } else {
        println!("{}", serde_json::to_string_pretty(&output)?);
      }

      if !failures.is_empty() {
        return Err(eyre!("Request failed:\n{}", failures.join("\n")));
      }
    }

    Command::Send {
      method,
      path,
      body,
      request,
    } => {
      let body: Value =
        serde_json::from_str(&body).map_err(|e| eyre!("Invalid JSON body: {}", e))?;
      let mut hook: MutationHook<Value> = MutationHook::new(
        client,
        path,
        method,
        MutateOptions::new().request(request.to_options()),
      );
      hook.mutate(&body);

      let state = hook.settled().await;
      if let Some(error) = state.error() {
        return Err(eyre!("Request failed: {}", error));
      }
      if let Some(data) = state.data() {
        println!("{}", serde_json::to_string_pretty(data)?);
      }
    }

    Command::Show { path } => match client.cache().peek(&path)? {
      Some(entry) => {
        let age_ms = (chrono::Utc::now() - entry.stored_at).num_milliseconds();
        let shown = json!({
          "url": entry.key,
          "timestamp": entry.stored_at.timestamp_millis(),
          "age_ms": age_ms,
          "data": entry.payload,
        });
        println!("{}", serde_json::to_string_pretty(&shown)?);
      }
      None => return Err(eyre!("No cached entry for {}", path)),
    },

    Command::Invalidate { path } => {
      client.invalidate(&path)?;
    }

    Command::Prune { older_than_ms } => {
      let removed = client
        .cache()
        .prune(Duration::from_millis(older_than_ms))?;
      println!("Removed {} entries", removed);
    }

    Command::Clear => {
      client.cache().clear()?;
    }
  }

  Ok(())
}
