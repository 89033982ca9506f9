use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use my_locations::address::{AddressCache, ReverseGeocoder};
use my_locations::config::{default_data_dir, AcquisitionConfig};
use my_locations::location::{Coordinate, IpProvider, LocationProvider, ReplayProvider};
use my_locations::session::{self, SessionHandle, StartOutcome};
use my_locations::store::{Category, LocationStore, NewLocation};
use my_locations::{server, Snapshot};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// MyLocations — capture, reverse-geocode, tag and store your current location.
///
/// Examples:
///   mylocations locate --track demos/walk.json
///   mylocations locate --ip --offline
///   mylocations tag --ip --category park --description "Picnic spot"
///   mylocations tag --lat 59.3326 --lon 18.0649 --category landmark
///   mylocations list
///   mylocations serve --track demos/walk.json --port 8080
#[derive(Parser)]
#[command(name = "mylocations", version, about, long_about = None)]
struct Cli {
    /// Where settings, the geocode cache and tagged locations live.
    #[arg(long, env = "MYLOCATIONS_HOME", global = true)]
    data_dir: Option<PathBuf>,

    /// Offline mode: only use the geocode cache and built-in data.
    #[arg(long, global = true)]
    offline: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Acquire the current location and print the result as JSON.
    Locate {
        #[command(flatten)]
        source: SourceArgs,
        #[command(flatten)]
        tuning: TuningArgs,
    },
    /// Acquire (or take the given coordinates) and save a tagged location.
    Tag {
        #[command(flatten)]
        source: SourceArgs,
        #[command(flatten)]
        tuning: TuningArgs,
        /// Category name, e.g. "park" or "Historic Building".
        #[arg(long, short = 'c')]
        category: Option<String>,
        #[arg(long, short = 'd', default_value = "")]
        description: String,
        /// Latitude (-90 to 90). Skips acquisition.
        #[arg(long, allow_hyphen_values = true, requires = "lon")]
        lat: Option<f64>,
        /// Longitude (-180 to 180). Skips acquisition.
        #[arg(long, allow_hyphen_values = true, requires = "lat")]
        lon: Option<f64>,
    },
    /// Print all tagged locations.
    List,
    /// Delete a tagged location.
    Remove { id: u64 },
    /// Print the available categories.
    Categories,
    /// Run the HTTP API.
    Serve {
        #[command(flatten)]
        source: SourceArgs,
        #[command(flatten)]
        tuning: TuningArgs,
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        #[arg(long, default_value_t = 3000)]
        port: u16,
    },
}

#[derive(Args)]
struct SourceArgs {
    /// Replay a recorded JSON track instead of a live source.
    #[arg(long, conflicts_with = "ip")]
    track: Option<PathBuf>,

    /// Use IP geolocation (city-level accuracy).
    #[arg(long)]
    ip: bool,

    /// Seconds between IP lookups.
    #[arg(long, default_value_t = 5)]
    ip_interval: u64,
}

#[derive(Args)]
struct TuningArgs {
    /// Stop once a fix is this accurate (meters).
    #[arg(long)]
    desired_accuracy: Option<f64>,

    /// Give up after this many seconds without any fix.
    #[arg(long)]
    timeout: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let data_dir = cli.data_dir.clone().unwrap_or_else(default_data_dir);

    match cli.command {
        Command::Locate { source, tuning } => {
            let handle = spawn_session(&source, &tuning, &data_dir, cli.offline)?;
            let snapshot = acquire(&handle).await?;
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }

        Command::Tag {
            source,
            tuning,
            category,
            description,
            lat,
            lon,
        } => {
            let category = match category {
                Some(c) => c.parse::<Category>()?,
                None => Category::default(),
            };

            let (coordinate, placemark) = match (lat, lon) {
                (Some(lat), Some(lon)) => (Coordinate { lat, lon }, None),
                _ => {
                    let handle = spawn_session(&source, &tuning, &data_dir, cli.offline)?;
                    let snapshot = acquire(&handle).await?;
                    let Some(reading) = snapshot.location else {
                        match snapshot.location_error {
                            Some(e) => bail!("No location acquired: {}", e),
                            None => bail!("No location acquired"),
                        }
                    };
                    (reading.coordinate(), snapshot.placemark)
                }
            };

            let mut store = LocationStore::open(&data_dir)?;
            let saved = store.tag(NewLocation {
                coordinate,
                placemark,
                category,
                description,
            })?;
            eprintln!("  Tagged #{} as {}", saved.id, saved.category);
            println!("{}", serde_json::to_string_pretty(&saved)?);
        }

        Command::List => {
            let store = LocationStore::open(&data_dir)?;
            println!("{}", serde_json::to_string_pretty(store.list())?);
        }

        Command::Remove { id } => {
            let mut store = LocationStore::open(&data_dir)?;
            let removed = store.remove(id)?;
            println!("{}", serde_json::to_string_pretty(&removed)?);
        }

        Command::Categories => {
            println!("{}", serde_json::to_string_pretty(&Category::ALL)?);
        }

        Command::Serve {
            source,
            tuning,
            host,
            port,
        } => {
            let handle = spawn_session(&source, &tuning, &data_dir, cli.offline)?;
            let store = LocationStore::open(&data_dir)?;
            server::start(&host, port, handle, store)
                .await
                .with_context(|| format!("server on {}:{} failed", host, port))?;
        }
    }

    Ok(())
}

fn spawn_session(
    source: &SourceArgs,
    tuning: &TuningArgs,
    data_dir: &Path,
    offline: bool,
) -> anyhow::Result<SessionHandle> {
    let provider: Box<dyn LocationProvider> = match (&source.track, source.ip) {
        (Some(path), _) => Box::new(ReplayProvider::from_file(path)?),
        (None, true) => Box::new(IpProvider::new(Duration::from_secs(source.ip_interval.max(1)))),
        (None, false) => bail!("No location source. Use --track <file> or --ip"),
    };

    let mut config = AcquisitionConfig::load_from(&data_dir.join("config.json"));
    if let Some(acc) = tuning.desired_accuracy {
        config.desired_accuracy = acc;
    }
    if let Some(secs) = tuning.timeout {
        config.timeout = Duration::from_secs(secs);
    }

    let mut geocoder = ReverseGeocoder::new(AddressCache::load(data_dir));
    geocoder.set_offline(offline);

    Ok(session::spawn(provider, Arc::new(geocoder), config))
}

/// Run one acquisition to completion. Ctrl+C stops early and keeps the best fix so far.
async fn acquire(handle: &SessionHandle) -> anyhow::Result<Snapshot> {
    match handle.start().await? {
        StartOutcome::AuthorizationRequested => bail!("Location permission requested; run again once granted"),
        StartOutcome::Started | StartOutcome::Stopped => {}
    }
    eprintln!("  Searching...");

    let snapshot = tokio::select! {
        s = handle.settled() => s,
        _ = tokio::signal::ctrl_c() => {
            handle.stop().await;
            handle.settled().await
        }
    };
    Ok(snapshot)
}
