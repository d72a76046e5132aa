use clap::Parser;
use map_insights_lib::{Config, CoordinateSpace};
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
/// Map Insights - Replays viewport events over GeoJSON layers and prints live feature counts
pub struct Settings {
    /// GeoJSON files to load, one layer each
    #[clap(short, long = "file", value_name = "FILE", required = true)]
    pub files: Vec<PathBuf>,

    /// JSON-lines file of view-state or bounds events ("-" or absent reads stdin)
    #[clap(short, long, value_name = "FILE")]
    pub events: Option<PathBuf>,

    /// Attribute to tally on every layer that has it (repeatable)
    #[clap(short, long = "count", value_name = "ATTRIBUTE")]
    pub counters: Vec<String>,

    /// Settling window for viewport events in milliseconds
    #[clap(long, default_value = "200")]
    pub debounce_ms: u64,

    /// Categorical palette for attribute colors
    #[clap(long, default_value = "category10")]
    pub palette: String,

    /// Continuous ramp for numeric attribute colors
    #[clap(long, default_value = "viridis")]
    pub ramp: String,

    /// Fill color for new layers (any CSS color)
    #[clap(long, default_value = "#0080ff")]
    pub fill_color: String,

    /// Line color for new layers (any CSS color)
    #[clap(long, default_value = "#000000")]
    pub line_color: String,

    /// Data and viewport rectangles are Web Mercator meters instead of degrees
    #[clap(long, default_value = "false")]
    pub web_mercator: bool,

    /// Print the color scale of each counted attribute after loading
    #[clap(long, default_value = "false")]
    pub print_scales: bool,

    /// Honor the `at_ms` timestamps of events instead of replaying as fast as possible
    #[clap(long, default_value = "false")]
    pub realtime: bool,
}

impl Settings {
    /// Session configuration from the command line knobs
    pub fn to_config(&self) -> Config {
        Config {
            debounce_ms: self.debounce_ms,
            default_palette: self.palette.clone(),
            default_ramp: self.ramp.clone(),
            fill_color: self.fill_color.clone(),
            line_color: self.line_color.clone(),
            coordinate_space: if self.web_mercator {
                CoordinateSpace::WebMercator
            } else {
                CoordinateSpace::Geographic
            },
            ..Config::default()
        }
    }

    /// Events file, or `None` for stdin
    pub fn events_path(&self) -> Option<&PathBuf> {
        self.events
            .as_ref()
            .filter(|path| path.as_os_str() != "-")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_library_config() {
        let settings = Settings::parse_from(["map-insights", "-f", "a.geojson"]);
        assert_eq!(settings.to_config(), Config::default());
        assert!(settings.events_path().is_none());
    }

    #[test]
    fn test_knobs_flow_into_config() {
        let settings = Settings::parse_from([
            "map-insights",
            "-f",
            "a.geojson",
            "--file",
            "b.geojson",
            "-c",
            "status",
            "--debounce-ms",
            "50",
            "--ramp",
            "magma",
            "--web-mercator",
            "--events",
            "-",
        ]);
        assert_eq!(settings.files.len(), 2);
        assert_eq!(settings.counters, vec!["status".to_string()]);
        assert!(settings.events_path().is_none());

        let config = settings.to_config();
        assert_eq!(config.debounce_ms, 50);
        assert_eq!(config.default_ramp, "magma");
        assert_eq!(config.coordinate_space, CoordinateSpace::WebMercator);
    }

    #[test]
    fn test_files_required() {
        assert!(Settings::try_parse_from(["map-insights"]).is_err());
    }
}
