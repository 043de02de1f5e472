use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
/// Min Svampkarta - keep track of where the mushrooms and berries are
pub struct Settings {
    /// Storage file (defaults to the per-user config directory)
    #[clap(long, global = true, value_name = "FILE")]
    pub storage: Option<PathBuf>,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Add a find
    Add(AddArgs),

    /// Remove a find by id
    Remove { id: u64 },

    /// List finds
    List {
        /// Only finds in this category
        #[clap(long)]
        category: Option<String>,

        /// Current position as LAT,LNG; lists nearest finds first
        #[clap(long, value_name = "LAT,LNG", value_parser = parse_point, allow_hyphen_values = true)]
        from: Option<(f64, f64)>,
    },

    /// Distance and direction from a position to a find or the parked car
    Navigate {
        /// Current position as LAT,LNG
        #[clap(long, value_name = "LAT,LNG", value_parser = parse_point, allow_hyphen_values = true)]
        from: (f64, f64),

        /// Find id to walk to
        #[clap(long, required_unless_present = "car", conflicts_with = "car")]
        to: Option<u64>,

        /// Walk back to the parked car
        #[clap(long)]
        car: bool,
    },

    /// Cluster the finds for a map view and print the layers as JSON
    Cluster(ClusterArgs),

    /// Replay a GPX track through the movement tracker
    Replay(ReplayArgs),

    /// Measure a route, optionally saving or loading GPX
    Measure(MeasureArgs),

    /// Write a JSON backup of all data
    Export {
        /// Output file (defaults to svampkartan-backup-<date>.json)
        #[clap(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Merge a JSON backup into the stored data
    Import {
        #[clap(value_name = "FILE")]
        file: PathBuf,
    },

    /// Remember where the car is parked
    Park {
        #[clap(long, allow_hyphen_values = true)]
        lat: f64,
        #[clap(long, allow_hyphen_values = true)]
        lng: f64,
    },

    /// Forget the parked car
    Unpark,

    /// Manage categories
    Categories {
        #[clap(subcommand)]
        action: CategoryCommand,
    },
}

#[derive(Args, Debug, Clone)]
pub struct AddArgs {
    pub name: String,

    #[clap(long, allow_hyphen_values = true)]
    pub lat: f64,

    #[clap(long, allow_hyphen_values = true)]
    pub lng: f64,

    /// Category id
    #[clap(short, long, default_value = "unknown")]
    pub category: String,

    /// How many there were, 1 (few) to 5 (many)
    #[clap(short, long, default_value = "3", value_parser = clap::value_parser!(u8).range(1..=5))]
    pub abundance: u8,

    #[clap(short, long)]
    pub notes: Option<String>,

    /// Date of the find (defaults to today)
    #[clap(long)]
    pub date: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct ClusterArgs {
    /// Map zoom level (fractional zoom is allowed)
    #[clap(short, long, default_value = "13.0")]
    pub zoom: f64,

    /// View center latitude (defaults to the middle of all finds)
    #[clap(long, allow_hyphen_values = true, requires = "center_lng")]
    pub center_lat: Option<f64>,

    /// View center longitude
    #[clap(long, allow_hyphen_values = true, requires = "center_lat")]
    pub center_lng: Option<f64>,

    /// Viewport width in pixels
    #[clap(long, default_value = "1280")]
    pub width: u32,

    /// Viewport height in pixels
    #[clap(long, default_value = "800")]
    pub height: u32,

    /// Visible category ids (all when omitted)
    #[clap(long, value_delimiter = ',')]
    pub categories: Vec<String>,

    /// Find whose popup is open
    #[clap(long)]
    pub selected: Option<u64>,

    /// Find being walked to; hides everything else
    #[clap(long)]
    pub walking_to: Option<u64>,

    /// JSON file with clustering parameters
    #[clap(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct ReplayArgs {
    /// GPX file whose track points are replayed in order
    #[clap(value_name = "FILE")]
    pub file: PathBuf,

    /// Time between consecutive fixes in milliseconds
    #[clap(long, default_value = "1000")]
    pub interval_ms: u64,

    /// Reported speed in m/s attached to every fix
    #[clap(long)]
    pub speed: Option<f64>,

    /// Map gesture as START-END milliseconds; can be repeated
    #[clap(long, value_parser = parse_interaction)]
    pub interaction: Vec<(u64, u64)>,

    /// JSON file with tracker parameters
    #[clap(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct MeasureArgs {
    /// Points as LAT,LNG
    #[clap(value_parser = parse_point, allow_hyphen_values = true)]
    pub points: Vec<(f64, f64)>,

    /// Route name
    #[clap(long)]
    pub name: Option<String>,

    /// Load the route from a GPX file instead
    #[clap(long, value_name = "FILE", conflicts_with = "points")]
    pub import: Option<PathBuf>,

    /// Save the route as GPX
    #[clap(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum CategoryCommand {
    /// List categories
    List,

    /// Add a category; the id is derived from the name
    Add { name: String, emoji: String },

    /// Change a category's name and emoji
    Edit {
        id: String,
        name: String,
        emoji: String,
    },

    /// Remove a category, moving its finds to the general category
    Remove { id: String },

    /// Move finds with unknown categories to the general category
    Repair,
}

fn parse_point(s: &str) -> Result<(f64, f64), String> {
    let (lat, lng) = s
        .split_once(',')
        .ok_or_else(|| format!("expected LAT,LNG, got '{}'", s))?;
    let lat = lat.trim().parse::<f64>().map_err(|e| e.to_string())?;
    let lng = lng.trim().parse::<f64>().map_err(|e| e.to_string())?;
    Ok((lat, lng))
}

fn parse_interaction(s: &str) -> Result<(u64, u64), String> {
    let (start, end) = s
        .split_once('-')
        .ok_or_else(|| format!("expected START-END, got '{}'", s))?;
    let start = start.trim().parse::<u64>().map_err(|e| e.to_string())?;
    let end = end.trim().parse::<u64>().map_err(|e| e.to_string())?;
    if end < start {
        return Err(format!("interaction ends before it starts: '{}'", s));
    }
    Ok((start, end))
}

impl Settings {
    /// Parse the process arguments, exiting with usage on error
    pub fn from_cli() -> Self {
        match Settings::try_parse() {
            Ok(args) => args,
            Err(e) => e.exit(),
        }
    }
}
