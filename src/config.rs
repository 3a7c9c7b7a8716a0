//! Engine configuration model, defaults, and loading.

use std::path::Path;
use std::time::Duration;

use log::warn;

/// Root configuration persisted to `playsync.toml`.
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Config {
    #[serde(default)]
    /// Timer and frame durations.
    pub timing: TimingConfig,
    #[serde(default)]
    /// Control behavior and feature switches.
    pub controls: ControlsConfig,
    #[serde(default)]
    /// Page-wide event bus sizing.
    pub bus: BusConfig,
}

/// Timer durations in milliseconds.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct TimingConfig {
    /// One display refresh.
    #[serde(default = "default_frame_interval_ms")]
    pub frame_interval_ms: u64,
    #[serde(default = "default_pointer_debounce_ms")]
    pub pointer_debounce_ms: u64,
    /// Debounce quantum while the pointer is over the control bar.
    #[serde(default = "default_controls_pointer_debounce_ms")]
    pub controls_pointer_debounce_ms: u64,
    #[serde(default = "default_idle_hide_ms")]
    pub idle_hide_ms: u64,
    #[serde(default = "default_stall_timeout_ms")]
    pub stall_timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct ControlsConfig {
    #[serde(default = "default_skip_seconds")]
    pub skip_seconds: f64,
    #[serde(default = "default_volume_step")]
    pub volume_step: f64,
    /// Volume restored on unmute when nothing is remembered for the session.
    #[serde(default = "default_fallback_unmute_volume")]
    pub fallback_unmute_volume: f64,
    #[serde(default = "default_true")]
    pub hide_idle_controls: bool,
    #[serde(default = "default_true")]
    pub use_svg_icons: bool,
    #[serde(default = "default_true")]
    pub use_subtitles: bool,
    #[serde(default = "default_true")]
    pub use_settings: bool,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct BusConfig {
    #[serde(default = "default_bus_capacity")]
    pub capacity: usize,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            frame_interval_ms: default_frame_interval_ms(),
            pointer_debounce_ms: default_pointer_debounce_ms(),
            controls_pointer_debounce_ms: default_controls_pointer_debounce_ms(),
            idle_hide_ms: default_idle_hide_ms(),
            stall_timeout_ms: default_stall_timeout_ms(),
        }
    }
}

impl Default for ControlsConfig {
    fn default() -> Self {
        Self {
            skip_seconds: default_skip_seconds(),
            volume_step: default_volume_step(),
            fallback_unmute_volume: default_fallback_unmute_volume(),
            hide_idle_controls: true,
            use_svg_icons: true,
            use_subtitles: true,
            use_settings: true,
        }
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            capacity: default_bus_capacity(),
        }
    }
}

impl TimingConfig {
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }

    pub fn pointer_debounce(&self, over_controls: bool) -> Duration {
        if over_controls {
            Duration::from_millis(self.controls_pointer_debounce_ms)
        } else {
            Duration::from_millis(self.pointer_debounce_ms)
        }
    }

    pub fn idle_hide(&self) -> Duration {
        Duration::from_millis(self.idle_hide_ms)
    }

    pub fn stall_timeout(&self) -> Duration {
        Duration::from_millis(self.stall_timeout_ms)
    }
}

fn default_true() -> bool {
    true
}

fn default_frame_interval_ms() -> u64 {
    16
}

fn default_pointer_debounce_ms() -> u64 {
    100
}

fn default_controls_pointer_debounce_ms() -> u64 {
    50
}

fn default_idle_hide_ms() -> u64 {
    3_500
}

fn default_stall_timeout_ms() -> u64 {
    10_000
}

fn default_skip_seconds() -> f64 {
    10.0
}

fn default_volume_step() -> f64 {
    0.1
}

fn default_fallback_unmute_volume() -> f64 {
    0.1
}

fn default_bus_capacity() -> usize {
    1024
}

/// Clamps loaded values into ranges the engine can run with.
pub fn sanitize_config(config: Config) -> Config {
    let mut sanitized = config;
    let timing = &mut sanitized.timing;
    timing.frame_interval_ms = timing.frame_interval_ms.clamp(1, 1_000);
    timing.pointer_debounce_ms = timing.pointer_debounce_ms.clamp(1, 1_000);
    timing.controls_pointer_debounce_ms = timing.controls_pointer_debounce_ms.clamp(1, 1_000);
    timing.idle_hide_ms = timing.idle_hide_ms.clamp(500, 60_000);
    timing.stall_timeout_ms = timing.stall_timeout_ms.clamp(1_000, 120_000);

    let controls = &mut sanitized.controls;
    if !controls.skip_seconds.is_finite() || controls.skip_seconds <= 0.0 {
        controls.skip_seconds = default_skip_seconds();
    }
    if !controls.volume_step.is_finite() || controls.volume_step <= 0.0 {
        controls.volume_step = default_volume_step();
    }
    // Whole tenths, the grid `step_volume` rounds to.
    controls.volume_step = ((controls.volume_step * 10.0).round() / 10.0).clamp(0.1, 1.0);
    if !controls.fallback_unmute_volume.is_finite() || controls.fallback_unmute_volume <= 0.0 {
        controls.fallback_unmute_volume = default_fallback_unmute_volume();
    }
    controls.fallback_unmute_volume = controls.fallback_unmute_volume.min(1.0);

    sanitized.bus.capacity = sanitized.bus.capacity.clamp(16, 65_536);
    sanitized
}

/// Reads and sanitizes `path`, falling back to defaults when it cannot be parsed.
pub fn load_config(path: &Path) -> Result<Config, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|err| format!("failed to read {}: {}", path.display(), err))?;
    let parsed = match toml::from_str::<Config>(&content) {
        Ok(config) => config,
        Err(err) => {
            warn!(
                "Config: failed to parse {}, using defaults: {}",
                path.display(),
                err
            );
            Config::default()
        }
    };
    Ok(sanitize_config(parsed))
}

/// Writes the default configuration to `path`.
pub fn write_default_config(path: &Path) -> Result<(), String> {
    let serialized = toml::to_string(&Config::default())
        .map_err(|err| format!("failed to serialize default config: {}", err))?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|err| format!("failed to create {}: {}", parent.display(), err))?;
    }
    std::fs::write(path, serialized)
        .map_err(|err| format!("failed to write {}: {}", path.display(), err))
}
