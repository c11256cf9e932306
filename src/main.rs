use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use jsonapi_store::cache::{snapshot_key, NoopStorage, SnapshotStorage, SqliteStorage};
use jsonapi_store::config::Config;
use jsonapi_store::{logging, Client, HttpTransport, ResourceRef, Store};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{debug, info};

#[derive(Parser, Debug)]
#[command(name = "jsonapi-store")]
#[command(about = "A normalized cache for JSON:API backends")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/jsonapi-store/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Base URL of the API (overrides the config file)
  #[arg(short, long)]
  base_url: Option<String>,

  /// Don't load or save the store snapshot
  #[arg(long)]
  no_cache: bool,

  /// Increase log verbosity (-v, -vv, -vvv)
  #[arg(short, long, action = clap::ArgAction::Count)]
  verbose: u8,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Read an endpoint and merge the response into the store
  Read {
    endpoint: String,
    /// Follow `next` links until the listing is exhausted
    #[arg(long)]
    all: bool,
  },
  /// Make sure a resource and its included relationships are cached
  Ensure {
    #[arg(value_name = "TYPE")]
    resource_type: String,
    id: String,
    /// Comma-separated relationship names
    #[arg(short, long, value_delimiter = ',')]
    include: Vec<String>,
  },
  /// Read a collection unless resources of its type are already cached
  Require {
    #[arg(value_name = "TYPE")]
    resource_type: String,
    /// Endpoint to read (defaults to the type's collection)
    #[arg(short, long)]
    endpoint: Option<String>,
  },
  /// Delete a resource on the server and from the store
  Delete {
    #[arg(value_name = "TYPE")]
    resource_type: String,
    id: String,
  },
  /// Print the cached store, or one type of it
  Show {
    #[arg(value_name = "TYPE")]
    resource_type: Option<String>,
  },
  /// Forget the cached snapshot
  Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let mut config = Config::load(args.config.as_deref())?;

  // Override base URL if specified on command line
  if let Some(base_url) = args.base_url.clone() {
    config.api.base_url = Some(base_url);
  }

  let _log_guard = logging::init(&config.logging, args.verbose)?;

  let storage: Box<dyn SnapshotStorage> = if args.no_cache || !config.cache.enabled {
    Box::new(NoopStorage)
  } else {
    Box::new(SqliteStorage::open(config.cache.path.as_deref())?)
  };
  let key = snapshot_key(config.api.base_url.as_deref());

  let store = match storage.load(&key)? {
    Some(snapshot) if snapshot.is_fresh(config.cache.max_age_secs) => {
      debug!(cached_at = %snapshot.cached_at, "restored store snapshot");
      snapshot.store
    }
    Some(_) => {
      info!("store snapshot expired, starting empty");
      Store::new()
    }
    None => Store::new(),
  };

  let client = Client::with_store(HttpTransport::new(), store);
  client.set_config(config.api.clone());

  match args.command {
    Command::Read { endpoint, all } => {
      let mut response = client.read_endpoint(&endpoint).await?;
      print_json(&response.body)?;
      while all {
        match client.load_next(&response) {
          Some(next) => {
            response = next.await?;
            print_json(&response.body)?;
          }
          None => break,
        }
      }
    }
    Command::Ensure {
      resource_type,
      id,
      include,
    } => {
      let include: Vec<&str> = include.iter().map(String::as_str).collect();
      let reads = client.ensure_resource(&resource_type, &id, &include).await?;
      info!(reads = reads.len(), "ensure complete");

      let state = client.state();
      let resource = state
        .resource(&resource_type, &id)
        .ok_or_else(|| eyre!("{}/{} not found", resource_type, id))?;
      print_json(resource)?;
    }
    Command::Require {
      resource_type,
      endpoint,
    } => {
      if client
        .require_resource(&resource_type, endpoint.as_deref())
        .await?
        .is_none()
      {
        info!(resource_type = %resource_type, "already cached");
      }
      print_json(&client.state().resources.of_type(&resource_type))?;
    }
    Command::Delete { resource_type, id } => {
      client
        .delete_resource(ResourceRef::new(resource_type, id))
        .await?;
    }
    Command::Show { resource_type } => {
      let state = client.state();
      match resource_type {
        Some(t) => print_json(&state.resources.of_type(&t))?,
        None => print_json(&state)?,
      }
      return Ok(());
    }
    Command::Clear => {
      storage.clear(&key)?;
      return Ok(());
    }
  }

  storage.save(&key, &client.state())?;

  Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
  let out = serde_json::to_string_pretty(value)?;
  println!("{}", out);
  Ok(())
}
