//! Topo Geo - command-line front end over the topology cache
//!
//! Every command shares one [`StaticTopologyCache`] and one [`GeoIndex`]. One-shot
//! commands print JSON to stdout (or a file); `watch` keeps polling the cache from a
//! set of concurrent readers so rebuilds after a file change can be observed in the log.

mod logging;
mod settings;

use serde::Serialize;
use settings::{Command, OutputArgs, Settings};
use std::fs;
use std::io::{self, Write};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use topo_geo_lib::{GeoIndex, StaticTopologyCache, TopoError};

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Topology(#[from] TopoError),

    #[error("Failed to write output: {0}")]
    Output(#[from] io::Error),

    #[error("Failed to serialize output: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to start async runtime: {0}")]
    Runtime(io::Error),

    #[error("Reader task failed: {0}")]
    Reader(#[from] tokio::task::JoinError),
}

type CliResult<T> = std::result::Result<T, CliError>;

/// Shared state handed to every command
struct Services {
    cache: Arc<StaticTopologyCache>,
    index: Arc<GeoIndex>,
    pretty: bool,
}

impl Services {
    fn new(settings: &Settings) -> Self {
        let cache = Arc::new(StaticTopologyCache::new(settings.cache_config()));
        let index = Arc::new(GeoIndex::new(cache.clone()));
        Self {
            cache,
            index,
            pretty: settings.pretty,
        }
    }

    fn emit<T: Serialize>(&self, value: &T, output: &OutputArgs) -> CliResult<()> {
        let json = if self.pretty {
            serde_json::to_vec_pretty(value)?
        } else {
            serde_json::to_vec(value)?
        };

        match &output.output {
            Some(path) => {
                fs::write(path, &json)?;
                tracing::info!("Wrote {} bytes to {}", json.len(), path.display());
            }
            None => {
                let mut stdout = io::stdout().lock();
                stdout.write_all(&json)?;
                stdout.write_all(b"\n")?;
            }
        }
        Ok(())
    }

    fn run(&self, command: Command) -> CliResult<()> {
        let stdout = OutputArgs::default();
        match command {
            Command::Stats => {
                self.cache.get_feature_collection()?;
                self.emit(&self.cache.stats(), &stdout)
            }
            Command::Geojson(output) => {
                let features = self.cache.get_feature_collection()?;
                self.emit(features.as_ref(), &output)
            }
            Command::SearchData => {
                let data = self.index.search_data()?;
                self.emit(data.as_ref(), &stdout)
            }
            Command::Distinct { field } => {
                let values = self.index.distinct_values(&field)?;
                self.emit(&values, &stdout)
            }
            Command::Filter {
                field,
                value,
                contains,
                output,
            } => {
                if contains {
                    let matches = self.index.filter_contains(field, &value)?;
                    tracing::info!("{} features contain '{}' in {}", matches.len(), value, field);
                    self.emit(&matches, &output)
                } else {
                    let matches = self.index.filter(field, &value)?;
                    tracing::info!("{} features match {} = '{}'", matches.len(), field, value);
                    self.emit(matches.as_ref(), &output)
                }
            }
            Command::Watch {
                interval_ms,
                readers,
                ticks,
            } => self.watch(Duration::from_millis(interval_ms), readers.max(1), ticks),
        }
    }

    fn watch(&self, interval: Duration, readers: usize, ticks: Option<u64>) -> CliResult<()> {
        let rt = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(CliError::Runtime)?;

        rt.block_on(async {
            let mut timer = tokio::time::interval(interval);
            let mut last_generation = None;
            let mut tick = 0u64;

            loop {
                if ticks.is_some_and(|limit| tick >= limit) {
                    break;
                }
                timer.tick().await;
                tick += 1;

                let handles: Vec<_> = (0..readers)
                    .map(|_| {
                        let cache = self.cache.clone();
                        tokio::task::spawn_blocking(move || cache.get_snapshot())
                    })
                    .collect();

                for handle in handles {
                    match handle.await? {
                        Ok(snapshot) if last_generation != Some(snapshot.generation) => {
                            tracing::info!(
                                "Serving generation {} ({} features)",
                                snapshot.generation,
                                snapshot.features.len()
                            );
                            last_generation = Some(snapshot.generation);
                        }
                        Ok(_) => {}
                        Err(err) => tracing::warn!("Refresh failed, serving previous data: {}", err),
                    }
                }
            }

            let stats = self.cache.stats();
            tracing::info!(
                "Watch finished after {} ticks ({} loads, {} builds)",
                tick,
                stats.loads,
                stats.builds
            );
            Ok::<(), CliError>(())
        })
    }
}

fn main() -> ExitCode {
    let settings = Settings::from_cli();
    logging::setup_logging();

    let services = Services::new(&settings);
    tracing::debug!("Topology source: {}", services.cache.source_path().display());

    match services.run(settings.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{}", err);
            ExitCode::FAILURE
        }
    }
}
