use catalog_client::auth::{bearer_headers, EnvTokenProvider};
use catalog_client::config::Config;
use catalog_client::{logging, ApiClient, ApiError, ErrorCode, RequestOptions};
use clap::{Args as ClapArgs, Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "catalog")]
#[command(about = "Query the content directory API with caching and retries")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/catalog/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// API base URL, overriding the config file
  #[arg(short, long)]
  base_url: Option<String>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Fetch a resource
  Get(RequestArgs),
  /// Create a resource
  Post(WriteArgs),
  /// Replace a resource
  Put(WriteArgs),
  /// Delete a resource
  Delete(WriteArgs),
}

#[derive(ClapArgs, Debug)]
struct RequestArgs {
  /// Endpoint relative to the base URL, e.g. `teachers/42`
  endpoint: String,

  /// Query parameter as key=value; repeat the key for lists
  #[arg(short, long = "param", value_parser = parse_param)]
  params: Vec<(String, String)>,

  /// Bypass the response cache
  #[arg(long)]
  no_cache: bool,

  /// Drop cached reads of the resource after a successful write
  #[arg(long)]
  invalidate_cache: bool,

  /// Per-attempt timeout in milliseconds
  #[arg(long)]
  timeout_ms: Option<u64>,

  /// Make a single attempt
  #[arg(long)]
  no_retry: bool,
}

/// Arguments of requests that may carry a body.
#[derive(ClapArgs, Debug)]
struct WriteArgs {
  #[command(flatten)]
  request: RequestArgs,

  /// JSON request body
  #[arg(short, long)]
  data: Option<String>,
}

fn parse_param(raw: &str) -> std::result::Result<(String, String), String> {
  match raw.split_once('=') {
    Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
    _ => Err(format!("expected key=value, got '{}'", raw)),
  }
}

impl RequestArgs {
  fn options(&self) -> RequestOptions {
    let mut options = RequestOptions::new().with_params(params_object(&self.params));
    if self.no_cache {
      options = options.no_cache();
    }
    if self.invalidate_cache {
      options = options.invalidate_cache();
    }
    if let Some(ms) = self.timeout_ms {
      options = options.with_timeout(Duration::from_millis(ms));
    }
    if self.no_retry {
      options = options.no_retry();
    }
    options
  }
}

impl WriteArgs {
  fn body(&self) -> Result<Option<Value>, ApiError> {
    self
      .data
      .as_deref()
      .map(|raw| {
        serde_json::from_str(raw).map_err(|e| {
          ApiError::new(
            ErrorCode::InvalidParams,
            format!("--data is not valid JSON: {}", e),
            self.request.endpoint.clone(),
          )
        })
      })
      .transpose()
  }
}

/// Collect `key=value` pairs into a params object; repeated keys become lists.
fn params_object(pairs: &[(String, String)]) -> Value {
  let mut map = serde_json::Map::new();
  for (key, value) in pairs {
    let value = Value::String(value.clone());
    match map.get_mut(key) {
      Some(Value::Array(items)) => items.push(value),
      Some(existing) => {
        let first = existing.take();
        *existing = Value::Array(vec![first, value]);
      }
      None => {
        map.insert(key.clone(), value);
      }
    }
  }
  if map.is_empty() {
    Value::Null
  } else {
    Value::Object(map)
  }
}

async fn run(client: &ApiClient, command: &Command) -> Result<Value, ApiError> {
  let response = match command {
    Command::Get(req) => client.get(&req.endpoint, &req.options()).await?,
    Command::Post(write) => {
      let body = write.body()?.unwrap_or(Value::Null);
      let req = &write.request;
      client.post(&req.endpoint, &body, &req.options()).await?
    }
    Command::Put(write) => {
      let body = write.body()?.unwrap_or(Value::Null);
      let req = &write.request;
      client.put(&req.endpoint, &body, &req.options()).await?
    }
    Command::Delete(write) => {
      let body = write.body()?;
      let req = &write.request;
      client.delete(&req.endpoint, body.as_ref(), &req.options()).await?
    }
  };
  Ok(response.into_merged())
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  let log_guard = match logging::init_logging() {
    Ok(guard) => Some(guard),
    Err(e) => {
      logging::init_logging_stderr()?;
      tracing::warn!("File logging unavailable, using stderr: {}", e);
      None
    }
  };

  // Load configuration
  let mut config = Config::load(args.config.as_deref())?;

  // Override base URL if specified on command line
  if let Some(base_url) = args.base_url {
    config.api.base_url = Some(base_url);
  }

  let mut client = ApiClient::new(&config)?;
  if let Some(token) = EnvTokenProvider::default().lookup() {
    let headers = bearer_headers(&token).map_err(|e| eyre!(e.message))?;
    client = client.with_extra_headers(headers);
  }

  match run(&client, &args.command).await {
    Ok(value) => {
      println!("{}", serde_json::to_string_pretty(&value)?);
      Ok(())
    }
    Err(err) => {
      tracing::error!(code = %err.code, endpoint = %err.endpoint, "Request failed: {}", err.message);
      eprintln!("{}", err.user_message());
      if cfg!(debug_assertions) {
        eprintln!("{}", serde_json::to_string_pretty(&err.to_envelope())?);
      }
      // Flush the file log; exit skips destructors.
      drop(log_guard);
      std::process::exit(1);
    }
  }
}
