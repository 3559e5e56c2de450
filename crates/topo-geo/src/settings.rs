use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use topo_geo_lib::{CacheConfig, SearchField};

#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
/// Topo Geo - Serves GeoJSON views of a TopoJSON file, rebuilt whenever the file changes
pub struct Settings {
    /// Topology file to serve (overrides --assets-dir)
    #[clap(short, long, value_name = "FILE", global = true)]
    pub topology: Option<PathBuf>,

    /// Directory holding topo.json
    #[clap(long, value_name = "DIR", env = "ASSETS_DIR", default_value = "assets", global = true)]
    pub assets_dir: PathBuf,

    /// Pretty-print JSON output
    #[clap(long, default_value = "false", global = true)]
    pub pretty: bool,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Print cache diagnostics after loading the topology
    Stats,
    /// Print the full FeatureCollection
    Geojson(OutputArgs),
    /// Print the distinct departments, municipalities and localities
    SearchData,
    /// Print the distinct values of one property
    Distinct {
        /// Property key, any key is accepted here
        #[clap(short, long)]
        field: String,
    },
    /// Print the features whose property matches a value
    Filter {
        /// One of D, M or NAM (case-insensitive)
        #[clap(short, long)]
        field: SearchField,

        /// Value to match
        #[clap(short, long)]
        value: String,

        /// Case-insensitive substring match instead of exact match
        #[clap(long, default_value = "false")]
        contains: bool,

        #[clap(flatten)]
        output: OutputArgs,
    },
    /// Keep serving from the cache and log every rebuild after the file changes
    Watch {
        /// Polling interval in milliseconds
        #[clap(long, default_value = "1000")]
        interval_ms: u64,

        /// Concurrent readers per tick
        #[clap(long, default_value = "4")]
        readers: usize,

        /// Stop after this many ticks (runs until interrupted when absent)
        #[clap(long)]
        ticks: Option<u64>,
    },
}

#[derive(Args, Debug, Clone, Default)]
pub struct OutputArgs {
    /// Write to this file instead of stdout
    #[clap(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

impl Settings {
    /// Parse the process arguments, exiting with usage on error
    pub fn from_cli() -> Self {
        match Settings::try_parse() {
            Ok(settings) => settings,
            Err(e) => e.exit(),
        }
    }

    /// Cache configuration for the selected topology file
    pub fn cache_config(&self) -> CacheConfig {
        match &self.topology {
            Some(path) => CacheConfig::new(path),
            None => CacheConfig::from_assets_dir(&self.assets_dir),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_topology_overrides_assets_dir() {
        let settings =
            Settings::try_parse_from(["topo-geo", "--topology", "/data/sv.json", "stats"]).unwrap();
        assert_eq!(
            settings.cache_config().source_path,
            Path::new("/data/sv.json")
        );
    }

    #[test]
    fn test_assets_dir_resolves_topo_json() {
        let settings =
            Settings::try_parse_from(["topo-geo", "--assets-dir", "/srv/assets", "search-data"])
                .unwrap();
        assert_eq!(
            settings.cache_config().source_path,
            Path::new("/srv/assets/topo.json")
        );
        assert!(matches!(settings.command, Command::SearchData));
    }

    #[test]
    fn test_filter_field_is_case_insensitive() {
        let settings = Settings::try_parse_from([
            "topo-geo", "filter", "--field", "nam", "--value", "Centro", "--contains",
        ])
        .unwrap();
        match settings.command {
            Command::Filter {
                field,
                value,
                contains,
                output,
            } => {
                assert_eq!(field, SearchField::Locality);
                assert_eq!(value, "Centro");
                assert!(contains);
                assert!(output.output.is_none());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_filter_rejects_unknown_field() {
        let result =
            Settings::try_parse_from(["topo-geo", "filter", "--field", "X", "--value", "a"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let settings = Settings::try_parse_from([
            "topo-geo", "geojson", "--output", "out.json", "--pretty",
        ])
        .unwrap();
        assert!(settings.pretty);
        match settings.command {
            Command::Geojson(args) => assert_eq!(args.output, Some(PathBuf::from("out.json"))),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_watch_defaults() {
        let settings = Settings::try_parse_from(["topo-geo", "watch"]).unwrap();
        match settings.command {
            Command::Watch {
                interval_ms,
                readers,
                ticks,
            } => {
                assert_eq!(interval_ms, 1000);
                assert_eq!(readers, 4);
                assert_eq!(ticks, None);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
