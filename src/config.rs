use clap::Parser;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Command-line arguments. Anything given here overrides the config file.
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "neonhud", version, about = "Weather / now-playing / clock dashboard for small panels")]
pub struct Cli {
    /// Path to a YAML config file (default: search well-known locations)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short = 'v', long)]
    pub debug: bool,

    /// Start screen: weather, media, or clock
    #[arg(short, long)]
    pub screen: Option<String>,

    /// Display width in pixels
    #[arg(long)]
    pub display_width: Option<u32>,

    /// Display height in pixels
    #[arg(long)]
    pub display_height: Option<u32>,

    /// Display rotation in degrees (0, 90, 180, 270)
    #[arg(long)]
    pub rotate_deg: Option<u32>,

    /// Print the effective configuration and exit
    #[arg(long)]
    pub dump_config: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdapterKind {
    Framebuffer,
    Png,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub width: u32,
    pub height: u32,
    pub rotate_deg: u32,
    /// Adapter preference order; the first is primary, the rest fallbacks.
    pub adapters: Vec<AdapterKind>,
    pub framebuffer: String,
    pub png_path: String,
    /// Minimum milliseconds between presented frames.
    pub min_frame_interval_ms: u64,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            width: 480,
            height: 320,
            rotate_deg: 0,
            adapters: vec![AdapterKind::Framebuffer, AdapterKind::Png],
            framebuffer: "/dev/fb1".to_string(),
            png_path: "frame.png".to_string(),
            min_frame_interval_ms: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WeatherConfig {
    pub api_key: String,
    pub units: String,
    pub refresh_secs: u64,
    pub geo_refresh_secs: u64,
    /// Location provider order: ipapi, geolocation, city
    pub providers: Vec<String>,
    pub geolocation_api_key: String,
    pub fallback_city: String,
    /// Directory of condition-keyed background images.
    pub background_dir: String,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            units: "metric".to_string(),
            refresh_secs: 3600,
            geo_refresh_secs: 3600,
            providers: vec![
                "ipapi".to_string(),
                "geolocation".to_string(),
                "city".to_string(),
            ],
            geolocation_api_key: String::new(),
            fallback_city: String::new(),
            background_dir: "./bg".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    pub now_playing_url: String,
    pub poll_secs: u64,
    pub token_cache: String,
    pub export_path: String,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            now_playing_url: String::new(),
            poll_secs: 1,
            token_cache: ".media_token".to_string(),
            export_path: ".now_playing.json".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpriteConfig {
    pub speed_factor: f32,
    pub step_multiplier: f32,
}

impl Default for SpriteConfig {
    fn default() -> Self {
        Self {
            speed_factor: 0.4,
            step_multiplier: 1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClockConfig {
    /// "analog" or "digital"
    pub style: String,
    /// "color" or "album" (album-art backdrop)
    pub background: String,
    pub color: String,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            style: "analog".to_string(),
            background: "color".to_string(),
            color: "black".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PanelConfig {
    pub time_display: bool,
    pub progress_bar: bool,
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            time_display: true,
            progress_bar: true,
        }
    }
}

/// Top-level configuration. Every section is optional in the file;
/// absent sections take their defaults after the merge.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub log_level: Option<String>,
    pub start_screen: Option<String>,
    pub display: Option<DisplayConfig>,
    pub weather: Option<WeatherConfig>,
    pub media: Option<MediaConfig>,
    pub sprites: Option<SpriteConfig>,
    pub clock: Option<ClockConfig>,
    pub panels: Option<PanelConfig>,
}

impl Config {
    pub fn display(&self) -> DisplayConfig {
        self.display.clone().unwrap_or_default()
    }

    pub fn weather(&self) -> WeatherConfig {
        self.weather.clone().unwrap_or_default()
    }

    pub fn media(&self) -> MediaConfig {
        self.media.clone().unwrap_or_default()
    }

    pub fn sprites(&self) -> SpriteConfig {
        self.sprites.clone().unwrap_or_default()
    }

    pub fn clock(&self) -> ClockConfig {
        self.clock.clone().unwrap_or_default()
    }

    pub fn panels(&self) -> PanelConfig {
        self.panels.clone().unwrap_or_default()
    }

    pub fn start_screen(&self) -> String {
        self.start_screen
            .clone()
            .unwrap_or_else(|| "weather".to_string())
    }

    pub fn log_level(&self) -> String {
        self.log_level.clone().unwrap_or_else(|| "info".to_string())
    }

    /// Shallow merge: sections present in `other` replace ours wholesale.
    fn merge(&mut self, other: Config) {
        if other.log_level.is_some() {
            self.log_level = other.log_level;
        }
        if other.start_screen.is_some() {
            self.start_screen = other.start_screen;
        }
        if other.display.is_some() {
            self.display = other.display;
        }
        if other.weather.is_some() {
            self.weather = other.weather;
        }
        if other.media.is_some() {
            self.media = other.media;
        }
        if other.sprites.is_some() {
            self.sprites = other.sprites;
        }
        if other.clock.is_some() {
            self.clock = other.clock;
        }
        if other.panels.is_some() {
            self.panels = other.panels;
        }
    }

    fn apply_cli_overrides(&mut self, cli: &Cli) {
        if cli.debug {
            self.log_level = Some("debug".to_string());
        }
        if let Some(screen) = &cli.screen {
            self.start_screen = Some(screen.clone());
        }
        if cli.display_width.is_some() || cli.display_height.is_some() || cli.rotate_deg.is_some() {
            let mut display = self.display();
            if let Some(w) = cli.display_width {
                display.width = w;
            }
            if let Some(h) = cli.display_height {
                display.height = h;
            }
            if let Some(r) = cli.rotate_deg {
                display.rotate_deg = r;
            }
            self.display = Some(display);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let screen = self.start_screen();
        if !matches!(screen.as_str(), "weather" | "media" | "clock") {
            return Err(ConfigError::Validation(format!(
                "unknown start screen '{screen}' (expected weather, media, or clock)"
            )));
        }

        let display = self.display();
        if display.width == 0 || display.height == 0 {
            return Err(ConfigError::Validation(format!(
                "display geometry {}x{} is not drawable",
                display.width, display.height
            )));
        }
        if !matches!(display.rotate_deg, 0 | 90 | 180 | 270) {
            return Err(ConfigError::Validation(format!(
                "rotation must be 0, 90, 180 or 270 degrees, got {}",
                display.rotate_deg
            )));
        }
        if display.adapters.is_empty() {
            return Err(ConfigError::Validation(
                "at least one display adapter must be configured".to_string(),
            ));
        }

        let sprites = self.sprites();
        if sprites.speed_factor <= 0.0 {
            return Err(ConfigError::Validation(
                "sprites.speed_factor must be positive".to_string(),
            ));
        }

        let clock = self.clock();
        if !matches!(clock.style.as_str(), "analog" | "digital") {
            return Err(ConfigError::Validation(format!(
                "clock style '{}' (expected analog or digital)",
                clock.style
            )));
        }

        Ok(())
    }
}

fn find_config_file() -> Option<PathBuf> {
    let mut candidates: Vec<PathBuf> = Vec::new();
    if let Some(home) = dirs_next::config_dir() {
        candidates.push(home.join("neonhud/config.yaml"));
        candidates.push(home.join("neonhud.yaml"));
    }
    candidates.push(PathBuf::from("neonhud.yaml"));
    candidates.push(PathBuf::from("config.yaml"));
    candidates.push(PathBuf::from("config/neonhud.yaml"));

    candidates.into_iter().find(|p| p.is_file())
}

/// Parse the CLI, load and merge the config file, apply overrides,
/// validate. Also hands back the file the config came from (if any);
/// logging may not be up yet, so the caller reports it.
pub fn load() -> Result<(Config, Cli, Option<PathBuf>), ConfigError> {
    let cli = Cli::parse();
    let (config, source) = load_with(&cli)?;
    Ok((config, cli, source))
}

pub fn load_with(cli: &Cli) -> Result<(Config, Option<PathBuf>), ConfigError> {
    let mut config = Config::default();

    let path = cli.config.clone().or_else(find_config_file);
    if let Some(path) = &path {
        let text = fs::read_to_string(path)?;
        let loaded: Config = serde_yaml::from_str(&text)?;
        config.merge(loaded);
    }

    config.apply_cli_overrides(cli);
    config.validate()?;
    Ok((config, path))
}
