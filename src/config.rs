// Config Module - Configuration management and command-line argument parsing
use anyhow::{Context, Result};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug, Default)]
#[command(
    author,
    version,
    about = "Procedural light animations for an LED cloud driven over DDP",
    long_about = "Renders ambient patterns, rainbows, notifications and a sunrise alarm onto an\n\
                  irregular LED mesh. Modes are switched by JSON commands sent over TCP."
)]
pub struct Args {
    /// Config file path or name (e.g., --cfg /full/path or --cfg bedroom for ~/.config/ledcloud/bedroom.toml)
    #[arg(long)]
    pub cfg: Option<String>,

    /// Mesh table file: JSON array of [row, column] pairs in wiring order
    #[arg(short, long)]
    pub mesh: Option<String>,

    /// TCP port for commands
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Single WLED device covering the whole mesh (replaces configured devices)
    #[arg(short, long)]
    pub wled_ip: Option<String>,

    /// Seed for the pattern generator
    #[arg(long)]
    pub seed: Option<u64>,

    /// Render without sending anything to the hardware
    #[arg(long)]
    pub dry_run: bool,

    /// Start without the rainbow intro
    #[arg(long)]
    pub skip_intro: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WledDeviceConfig {
    pub ip: String,
    pub led_offset: usize,
    pub led_count: usize,
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudConfig {
    #[serde(skip)]
    pub config_path: Option<PathBuf>, // Stores the config file path (not serialized)

    pub mesh_file: String,
    pub listen_ip: String,
    pub listen_port: u16,

    // Shorthand for one device spanning the whole mesh; ignored when wled_devices is set
    pub wled_ip: String,
    pub wled_devices: Vec<WledDeviceConfig>,
    pub global_brightness: f64,
    pub dry_run: bool,

    pub tick_ms: u64,
    pub idle_ms: u64,
    pub alarm_poll_ms: u64,
    pub intro_ms: u64,

    pub rainbow_velocity: f64,
    pub rainbow_density: usize,
    pub rainbow_palette: String,
    pub interpolation: String,

    pub spawn_chance: f64,
    pub min_patterns: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for CloudConfig {
    fn default() -> Self {
        CloudConfig {
            config_path: None,
            mesh_file: "mesh.json".to_string(),
            listen_ip: "0.0.0.0".to_string(),
            listen_port: 6639,
            wled_ip: String::new(),
            wled_devices: Vec::new(),
            global_brightness: 1.0,
            dry_run: false,
            tick_ms: 50,
            idle_ms: 1000,
            alarm_poll_ms: 500,
            intro_ms: 5000,
            rainbow_velocity: 600.0,
            rainbow_density: 20,
            rainbow_palette: "classic".to_string(),
            interpolation: "linear".to_string(),
            spawn_chance: 0.02,
            min_patterns: 2,
            seed: None,
        }
    }
}

impl CloudConfig {
    pub fn merge_with_args(&mut self, args: &Args) -> bool {
        // Track if any args were actually provided
        let mut args_provided = false;

        if let Some(ref mesh) = args.mesh {
            self.mesh_file = mesh.clone();
            args_provided = true;
        }

        if let Some(port) = args.port {
            self.listen_port = port;
            args_provided = true;
        }

        // A device on the command line replaces the configured ones
        if let Some(ref wled_ip) = args.wled_ip {
            self.wled_ip = wled_ip.trim().to_string();
            self.wled_devices.clear();
            args_provided = true;
        }

        if let Some(seed) = args.seed {
            self.seed = Some(seed);
            args_provided = true;
        }

        if args.dry_run {
            self.dry_run = true;
            args_provided = true;
        }

        args_provided
    }

    /// Devices to drive for a mesh of `channel_count` LEDs
    pub fn devices_for(&self, channel_count: usize) -> Vec<WledDeviceConfig> {
        if !self.wled_devices.is_empty() || self.wled_ip.is_empty() {
            return self.wled_devices.clone();
        }
        vec![WledDeviceConfig {
            ip: self.wled_ip.clone(),
            led_offset: 0,
            led_count: channel_count,
            enabled: true,
        }]
    }

    pub fn config_path(cfg_arg: Option<&str>) -> Result<PathBuf> {
        if let Some(cfg) = cfg_arg {
            // Check if it's an absolute path
            let path = PathBuf::from(cfg);
            if path.is_absolute() {
                return Ok(path);
            }

            // Check if it contains path separators (relative path)
            if cfg.contains('/') || cfg.contains('\\') {
                return Ok(path);
            }

            // Otherwise treat as config name in config directory
            let filename = if cfg.ends_with(".toml") {
                cfg.to_string()
            } else {
                format!("{}.toml", cfg)
            };
            Ok(Self::config_dir()?.join(filename))
        } else {
            Ok(Self::config_dir()?.join("config.toml"))
        }
    }

    fn config_dir() -> Result<PathBuf> {
        let home = std::env::var("HOME").context("HOME is not set")?;
        let config_dir = PathBuf::from(home).join(".config").join("ledcloud");
        std::fs::create_dir_all(&config_dir)
            .with_context(|| format!("Failed to create {}", config_dir.display()))?;
        Ok(config_dir)
    }

    /// Load the config, writing a default one first if the file does not exist
    pub fn load_with_path(cfg_arg: Option<&str>) -> Result<Self> {
        let path = Self::config_path(cfg_arg)?;
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            let config = CloudConfig {
                config_path: Some(path.to_path_buf()),
                ..CloudConfig::default()
            };
            config.save()?;
            return Ok(config);
        }

        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let mut parsed: Self = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        parsed.config_path = Some(path.to_path_buf());
        parsed.sanitize();
        Ok(parsed)
    }

    /// Sanitize config values to handle common formatting issues
    pub fn sanitize(&mut self) {
        // Sanitize string values (trim whitespace)
        self.mesh_file = self.mesh_file.trim().to_string();
        self.listen_ip = self.listen_ip.trim().to_string();
        self.wled_ip = self.wled_ip.trim().to_string();
        self.rainbow_palette = self.rainbow_palette.trim().trim_matches(',').to_string();
        self.interpolation = self.interpolation.trim().to_lowercase();
        for device in &mut self.wled_devices {
            device.ip = device.ip.trim().to_string();
        }

        if self.listen_ip.is_empty() {
            self.listen_ip = "0.0.0.0".to_string();
        }

        // Clamp numeric values to reasonable ranges
        self.listen_port = self.listen_port.max(1);
        self.global_brightness = self.global_brightness.max(0.0).min(1.0);
        self.tick_ms = self.tick_ms.max(1).min(1000);
        self.idle_ms = self.idle_ms.max(10).min(60_000);
        self.alarm_poll_ms = self.alarm_poll_ms.max(10).min(10_000);
        self.intro_ms = self.intro_ms.min(60_000);
        self.rainbow_velocity = self.rainbow_velocity.max(-100_000.0).min(100_000.0);
        self.rainbow_density = self.rainbow_density.max(1).min(1530);
        self.spawn_chance = self.spawn_chance.max(0.0).min(1.0);
        self.min_patterns = self.min_patterns.min(64);
    }

    pub fn save(&self) -> Result<()> {
        let path = match self.config_path.clone() {
            Some(path) => path,
            None => Self::config_path(None)?,
        };

        // Sanitize values before saving
        let mut sanitized = self.clone();
        sanitized.sanitize();

        // Build TOML with comments manually for better documentation
        let mut contents = format!(
            r#"# ledcloud configuration

# Mesh table: JSON array of [row, column] pairs, one per LED in wiring order
mesh_file = {}

# Command listener
listen_ip = {}
listen_port = {}

# Single WLED controller for the whole mesh (ignored when [[wled_devices]] are listed)
wled_ip = {}
# Global brightness (0.0 - 1.0)
global_brightness = {:?}
# Render without sending DDP packets
dry_run = {}

# Timing (milliseconds)
tick_ms = {}
idle_ms = {}
alarm_poll_ms = {}
intro_ms = {}

# Rainbow mode: palette entries per second, palette step between columns
rainbow_velocity = {:?}
rainbow_density = {}
# classic, sinebow, rainbow, turbo, spectral, or comma-separated hex colors
rainbow_palette = {}
# linear, basis, catmullrom (custom hex palettes only)
interpolation = {}

# Patterns mode: chance of a new pattern per frame, minimum foreground patterns
spawn_chance = {:?}
min_patterns = {}
"#,
            quoted(&sanitized.mesh_file),
            quoted(&sanitized.listen_ip),
            sanitized.listen_port,
            quoted(&sanitized.wled_ip),
            sanitized.global_brightness,
            sanitized.dry_run,
            sanitized.tick_ms,
            sanitized.idle_ms,
            sanitized.alarm_poll_ms,
            sanitized.intro_ms,
            sanitized.rainbow_velocity,
            sanitized.rainbow_density,
            quoted(&sanitized.rainbow_palette),
            quoted(&sanitized.interpolation),
            sanitized.spawn_chance,
            sanitized.min_patterns,
        );

        match sanitized.seed {
            Some(seed) => contents.push_str(&format!("seed = {}\n", seed)),
            None => contents.push_str("# seed = 42\n"),
        }

        if !sanitized.wled_devices.is_empty() {
            contents.push_str("\n# Multi-Device Configuration\n");
            contents.push_str("# Each controller drives a slice of the mesh channels\n");
            contents.push_str("# led_offset: First mesh channel sent to this device\n");
            contents.push_str("# led_count: Number of LEDs this device controls\n\n");

            for device in &sanitized.wled_devices {
                contents.push_str("[[wled_devices]]\n");
                contents.push_str(&format!("ip = {}\n", quoted(&device.ip)));
                contents.push_str(&format!("led_offset = {}\n", device.led_offset));
                contents.push_str(&format!("led_count = {}\n", device.led_count));
                contents.push_str(&format!("enabled = {}\n\n", device.enabled));
            }
        }

        std::fs::write(&path, contents).with_context(|| format!("Failed to write config {}", path.display()))?;
        Ok(())
    }
}

/// TOML string literal with escaping, so paths and palettes survive a reload
fn quoted(value: &str) -> String {
    toml::Value::String(value.to_string()).to_string()
}
