//! Configuration settings for mtpcopy
//!
//! Defines the CLI arguments, the runtime configuration they resolve to,
//! and the JSON config file format.

use crate::device::{RawDevice, StorageSortPolicy};
use crate::error::{IoResultExt, MtpError, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// mtpcopy - Copy files to, from and between MTP devices
#[derive(Parser, Debug, Clone)]
#[command(name = "mtpcopy")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Copy files to, from and between MTP devices")]
#[command(long_about = r#"
mtpcopy drives media devices over a blocking transport. Every device call
runs on a background worker pool; device-to-device copies stream through a
single-slot handoff buffer without touching local disk.

Examples:
  mtpcopy --bus bus.json detect
  mtpcopy --bus bus.json ls -d 0 /Music
  mtpcopy --bus bus.json get -d 0 /Music/song.mp3 ./song.mp3
  mtpcopy --bus bus.json get -r -d 0 /DCIM ./dcim
  mtpcopy --bus bus.json copy --from 0 /DCIM/img.jpg --to 1:3 /Pictures
"#)]
pub struct CliArgs {
    /// Bus image describing the attached devices (JSON)
    #[arg(long, env = "MTPCOPY_BUS", value_name = "PATH")]
    pub bus: Option<PathBuf>,

    /// Runtime config file (JSON)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Number of executor workers (0 = auto-detect)
    #[arg(short = 't', long, value_name = "NUM")]
    pub workers: Option<usize>,

    /// Maximum number of queued operations
    #[arg(long, value_name = "NUM")]
    pub queue_size: Option<usize>,

    /// Chunk size handed out by fetch calls (e.g., 64K)
    #[arg(long, value_name = "SIZE")]
    pub push_chunk: Option<String>,

    /// Chunk size requested by send calls (e.g., 48K)
    #[arg(long, value_name = "SIZE")]
    pub pull_chunk: Option<String>,

    /// Open devices without caching their object tree
    #[arg(long)]
    pub uncached: bool,

    /// Storage ordering used when enumerating storages
    #[arg(long, value_enum, value_name = "POLICY")]
    pub sort: Option<StorageSortPolicy>,

    /// Show transfer progress bars
    #[arg(short = 'p', long)]
    pub progress: bool,

    /// Verbose output (can be repeated: -v, -vv, -vvv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (suppress non-error output)
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Output format for listings
    #[arg(long, value_enum, default_value = "text")]
    pub output_format: OutputFormat,

    /// Subcommand
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// List attached devices
    #[command(name = "detect")]
    Detect,

    /// Show device identity
    #[command(name = "info")]
    Info {
        /// Device index or BUS:DEVNUM
        #[arg(short, long, default_value = "0")]
        device: DeviceSelector,
    },

    /// List storages of a device
    #[command(name = "storages")]
    Storages {
        /// Device index or BUS:DEVNUM
        #[arg(short, long, default_value = "0")]
        device: DeviceSelector,
    },

    /// List a folder
    #[command(name = "ls")]
    Ls {
        /// Device index or BUS:DEVNUM
        #[arg(short, long, default_value = "0")]
        device: DeviceSelector,
        /// Folder path or id
        #[arg(default_value = "/")]
        path: String,
        /// List subfolders too
        #[arg(short, long)]
        recursive: bool,
        /// Skip dot files and dot folders
        #[arg(long)]
        ignore_hidden: bool,
    },

    /// Show metadata of one object
    #[command(name = "stat")]
    Stat {
        /// Device index or BUS:DEVNUM
        #[arg(short, long, default_value = "0")]
        device: DeviceSelector,
        /// Object path or id
        path: String,
    },

    /// Resolve a path to an object id
    #[command(name = "resolve")]
    Resolve {
        /// Device index or BUS:DEVNUM
        #[arg(short, long, default_value = "0")]
        device: DeviceSelector,
        /// Object path or id
        path: String,
    },

    /// Create a folder
    #[command(name = "mkdir")]
    Mkdir {
        /// Device index or BUS:DEVNUM
        #[arg(short, long, default_value = "0")]
        device: DeviceSelector,
        /// Path of the new folder
        path: String,
    },

    /// Rename an object
    #[command(name = "rename")]
    Rename {
        /// Device index or BUS:DEVNUM
        #[arg(short, long, default_value = "0")]
        device: DeviceSelector,
        /// Object path or id
        path: String,
        /// New name
        name: String,
    },

    /// Delete an object
    #[command(name = "rm")]
    Rm {
        /// Device index or BUS:DEVNUM
        #[arg(short, long, default_value = "0")]
        device: DeviceSelector,
        /// Object path or id
        path: String,
    },

    /// Download an object to a local file
    #[command(name = "get")]
    Get {
        /// Device index or BUS:DEVNUM
        #[arg(short, long, default_value = "0")]
        device: DeviceSelector,
        /// Object path or id
        path: String,
        /// Local destination
        local: PathBuf,
        /// Download a folder with everything below it
        #[arg(short, long)]
        recursive: bool,
        /// Skip dot files and dot folders
        #[arg(long)]
        ignore_hidden: bool,
    },

    /// Upload a local file
    #[command(name = "put")]
    Put {
        /// Device index or BUS:DEVNUM
        #[arg(short, long, default_value = "0")]
        device: DeviceSelector,
        /// Local source
        local: PathBuf,
        /// Destination folder path or id
        #[arg(default_value = "/")]
        folder: String,
        /// Name on the device
        #[arg(long)]
        name: Option<String>,
        /// Upload a directory with everything below it
        #[arg(short, long)]
        recursive: bool,
        /// Skip dot files and dot directories
        #[arg(long)]
        ignore_hidden: bool,
    },

    /// Copy an object from one device to another
    #[command(name = "copy")]
    Copy {
        /// Source device index or BUS:DEVNUM
        #[arg(long)]
        from: DeviceSelector,
        /// Source object path or id
        path: String,
        /// Destination device index or BUS:DEVNUM
        #[arg(long)]
        to: DeviceSelector,
        /// Destination folder path or id
        #[arg(default_value = "/")]
        folder: String,
        /// Name on the destination
        #[arg(long)]
        name: Option<String>,
    },
}

/// Output format for listings
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable text
    #[default]
    Text,
    /// JSON format
    Json,
}

/// Picks one device out of a detection result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceSelector {
    /// Position in detection order
    Index(usize),
    /// Bus location and device number
    Location {
        /// Bus location
        bus_location: u32,
        /// Device number on the bus
        devnum: u8,
    },
}

impl DeviceSelector {
    /// Find the selected device
    pub fn pick<'a>(&self, devices: &'a [RawDevice]) -> Option<&'a RawDevice> {
        match *self {
            Self::Index(i) => devices.get(i),
            Self::Location { bus_location, devnum } => devices
                .iter()
                .find(|d| d.bus_location == bus_location && d.devnum == devnum),
        }
    }
}

impl FromStr for DeviceSelector {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        match s.split_once(':') {
            Some((bus, dev)) => {
                let bus_location = bus
                    .trim()
                    .parse()
                    .map_err(|_| format!("Invalid bus location: {}", bus))?;
                let devnum = dev
                    .trim()
                    .parse()
                    .map_err(|_| format!("Invalid device number: {}", dev))?;
                Ok(Self::Location { bus_location, devnum })
            }
            None => s
                .parse()
                .map(Self::Index)
                .map_err(|_| format!("Invalid device selector: {}", s)),
        }
    }
}

impl std::fmt::Display for DeviceSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Index(i) => write!(f, "#{}", i),
            Self::Location { bus_location, devnum } => write!(f, "{}:{}", bus_location, devnum),
        }
    }
}

/// Task executor settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Worker threads (0 = auto-detect)
    pub workers: usize,
    /// Maximum queued operations before submissions are refused
    pub queue_size: usize,
}

impl ExecutorConfig {
    /// Worker count with auto-detection applied
    pub fn effective_workers(&self) -> usize {
        if self.workers == 0 {
            num_cpus::get().max(1)
        } else {
            self.workers
        }
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            workers: 0, // Auto-detect
            queue_size: 256,
        }
    }
}

/// Transfer chunking and session settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Bytes handed out per fetch callback
    pub push_chunk: usize,
    /// Bytes requested per send callback
    pub pull_chunk: usize,
    /// Open sessions with a cached object tree
    pub cached: bool,
    /// Storage ordering policy
    pub sort: StorageSortPolicy,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            push_chunk: crate::device::memory::DEFAULT_PUSH_CHUNK,
            pull_chunk: crate::device::memory::DEFAULT_PULL_CHUNK,
            cached: true,
            sort: StorageSortPolicy::NotSorted,
        }
    }
}

/// Path resolution settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Deepest folder level the resolver descends to
    pub max_depth: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_depth: crate::resolve::DEFAULT_MAX_DEPTH,
        }
    }
}

/// Runtime configuration, from a config file and CLI overrides
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Executor settings
    pub executor: ExecutorConfig,
    /// Transfer settings
    pub bridge: BridgeConfig,
    /// Resolver settings
    pub resolver: ResolverConfig,
}

impl RuntimeConfig {
    /// Load a JSON config file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).with_path(path)?;
        let config: Self = serde_json::from_str(&text)
            .map_err(|e| MtpError::config(format!("{}: {}", path.display(), e)))?;
        tracing::debug!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Create config from CLI arguments, layered over `--config` if given
    pub fn from_cli(args: &CliArgs) -> Result<Self> {
        let mut config = match &args.config {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };

        if let Some(workers) = args.workers {
            config.executor.workers = workers;
        }
        if let Some(queue_size) = args.queue_size {
            config.executor.queue_size = queue_size;
        }
        if let Some(size) = &args.push_chunk {
            config.bridge.push_chunk = parse_chunk(size).map_err(|e| MtpError::config(format!("Invalid push chunk: {}", e)))?;
        }
        if let Some(size) = &args.pull_chunk {
            config.bridge.pull_chunk = parse_chunk(size).map_err(|e| MtpError::config(format!("Invalid pull chunk: {}", e)))?;
        }
        if args.uncached {
            config.bridge.cached = false;
        }
        if let Some(sort) = args.sort {
            config.bridge.sort = sort;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the executor or bridge cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.executor.queue_size == 0 {
            return Err(MtpError::config("queue_size must be at least 1"));
        }
        if self.bridge.push_chunk == 0 || self.bridge.pull_chunk == 0 {
            return Err(MtpError::config("chunk sizes must be at least 1 byte"));
        }
        if self.resolver.max_depth == 0 {
            return Err(MtpError::config("max_depth must be at least 1"));
        }
        Ok(())
    }
}

fn parse_chunk(size: &str) -> std::result::Result<usize, String> {
    let bytes = parse_size(size)?;
    usize::try_from(bytes).map_err(|_| format!("Chunk too large: {}", size))
}

/// Parse human-readable size string to bytes
pub fn parse_size(size: &str) -> std::result::Result<u64, String> {
    let size = size.trim().to_uppercase();

    if size.is_empty() {
        return Err("Empty size string".to_string());
    }

    let (num_str, multiplier) = if size.ends_with("GB") || size.ends_with('G') {
        let num = size.trim_end_matches(|c| c == 'G' || c == 'B');
        (num, 1024u64 * 1024 * 1024)
    } else if size.ends_with("MB") || size.ends_with('M') {
        let num = size.trim_end_matches(|c| c == 'M' || c == 'B');
        (num, 1024u64 * 1024)
    } else if size.ends_with("KB") || size.ends_with('K') {
        let num = size.trim_end_matches(|c| c == 'K' || c == 'B');
        (num, 1024u64)
    } else if size.ends_with('B') {
        let num = size.trim_end_matches('B');
        (num, 1u64)
    } else {
        // Assume bytes if no suffix
        (size.as_str(), 1u64)
    };

    let num: f64 = num_str
        .trim()
        .parse()
        .map_err(|_| format!("Invalid number: {}", num_str))?;

    if num < 0.0 {
        return Err(format!("Negative size: {}", num_str));
    }

    Ok((num * multiplier as f64) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("1024").unwrap(), 1024);
        assert_eq!(parse_size("1K").unwrap(), 1024);
        assert_eq!(parse_size("1KB").unwrap(), 1024);
        assert_eq!(parse_size("64k").unwrap(), 64 * 1024);
        assert_eq!(parse_size("1M").unwrap(), 1024 * 1024);
        assert_eq!(parse_size("1G").unwrap(), 1024 * 1024 * 1024);
        assert_eq!(parse_size("1.5M").unwrap(), (1.5 * 1024.0 * 1024.0) as u64);
        assert!(parse_size("").is_err());
        assert!(parse_size("lots").is_err());
        assert!(parse_size("-1K").is_err());
    }

    #[test]
    fn test_device_selector() {
        assert_eq!("2".parse::<DeviceSelector>().unwrap(), DeviceSelector::Index(2));
        assert_eq!(
            "3:14".parse::<DeviceSelector>().unwrap(),
            DeviceSelector::Location { bus_location: 3, devnum: 14 }
        );
        assert!("x:1".parse::<DeviceSelector>().is_err());
        assert!("1:300".parse::<DeviceSelector>().is_err());
    }

    #[test]
    fn test_selector_pick() {
        let devices = vec![
            crate::device::DeviceImage::new(1, 4, "Acme").raw,
            crate::device::DeviceImage::new(3, 9, "Globex").raw,
        ];

        let by_index = DeviceSelector::Index(1).pick(&devices).unwrap();
        assert_eq!(by_index.vendor, "Globex");

        let by_location = DeviceSelector::Location { bus_location: 1, devnum: 4 }.pick(&devices).unwrap();
        assert_eq!(by_location.vendor, "Acme");

        assert!(DeviceSelector::Index(5).pick(&devices).is_none());
    }

    #[test]
    fn test_effective_workers() {
        let auto = ExecutorConfig::default();
        assert!(auto.effective_workers() >= 1);

        let fixed = ExecutorConfig { workers: 3, ..Default::default() };
        assert_eq!(fixed.effective_workers(), 3);
    }

    #[test]
    fn test_cli_overrides_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"executor": {{"workers": 2, "queue_size": 8}}, "bridge": {{"cached": false}}}}"#).unwrap();

        let args = CliArgs::parse_from([
            "mtpcopy",
            "--config",
            file.path().to_str().unwrap(),
            "--queue-size",
            "16",
            "--pull-chunk",
            "4K",
            "detect",
        ]);

        let config = RuntimeConfig::from_cli(&args).unwrap();
        assert_eq!(config.executor.workers, 2);
        assert_eq!(config.executor.queue_size, 16);
        assert_eq!(config.bridge.pull_chunk, 4096);
        assert!(!config.bridge.cached);
    }

    #[test]
    fn test_validate_rejects_zero_queue() {
        let mut config = RuntimeConfig::default();
        config.executor.queue_size = 0;
        assert!(matches!(config.validate(), Err(MtpError::ConfigError(_))));
    }
}
