use crate::platform::CameraFacing;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ScannerConfig {
    pub scanner: EngineConfig,
    pub camera: CameraConfig,
    pub telemetry: TelemetryConfig,
    pub system: SystemConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct EngineConfig {
    /// Never use the primary engine, even when its platform service is present
    #[serde(default = "default_fallback_only")]
    pub fallback_only: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct CameraConfig {
    /// Camera facing selected on first prepare
    #[serde(default = "default_facing")]
    pub default_facing: CameraFacing,

    /// Upper bound for a single camera bind, in milliseconds
    #[serde(default = "default_bind_timeout_ms")]
    pub bind_timeout_ms: u64,

    /// Frames buffered between the camera and the recognition worker
    #[serde(default = "default_frame_queue_depth")]
    pub frame_queue_depth: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct TelemetryConfig {
    /// Track scan durations and report them in the status snapshot
    #[serde(default = "default_performance_monitoring")]
    pub performance_monitoring: bool,

    /// Haptic feedback on successful scans (reported only)
    #[serde(default = "default_haptic_feedback")]
    pub haptic_feedback: bool,

    /// Weight given to the previous average when folding in a new sample
    #[serde(default = "default_smoothing_weight")]
    pub smoothing_weight: f64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SystemConfig {
    /// Event bus capacity
    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,
}

impl CameraConfig {
    pub fn bind_timeout(&self) -> Duration {
        Duration::from_millis(self.bind_timeout_ms)
    }
}

impl ScannerConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("qrscanner.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default("scanner.fallback_only", default_fallback_only())?
            .set_default("camera.default_facing", default_facing().as_str())?
            .set_default("camera.bind_timeout_ms", default_bind_timeout_ms())?
            .set_default(
                "camera.frame_queue_depth",
                default_frame_queue_depth() as i64,
            )?
            .set_default(
                "telemetry.performance_monitoring",
                default_performance_monitoring(),
            )?
            .set_default("telemetry.haptic_feedback", default_haptic_feedback())?
            .set_default("telemetry.smoothing_weight", default_smoothing_weight())?
            .set_default(
                "system.event_bus_capacity",
                default_event_bus_capacity() as i64,
            )?
            .add_source(File::with_name(&path_str).required(false))
            // QRSCANNER_SCANNER__FALLBACK_ONLY=true
            .add_source(
                Environment::with_prefix("QRSCANNER")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: ScannerConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.camera.bind_timeout_ms == 0 {
            return Err(ConfigError::Message(
                "Camera bind_timeout_ms must be greater than 0".to_string(),
            ));
        }

        if self.camera.frame_queue_depth == 0 {
            return Err(ConfigError::Message(
                "Camera frame_queue_depth must be greater than 0".to_string(),
            ));
        }

        let weight = self.telemetry.smoothing_weight;
        if !(0.0..1.0).contains(&weight) {
            return Err(ConfigError::Message(format!(
                "Telemetry smoothing_weight must be in [0, 1), got {}",
                weight
            )));
        }

        if self.system.event_bus_capacity == 0 {
            return Err(ConfigError::Message(
                "Event bus capacity must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            scanner: EngineConfig {
                fallback_only: default_fallback_only(),
            },
            camera: CameraConfig {
                default_facing: default_facing(),
                bind_timeout_ms: default_bind_timeout_ms(),
                frame_queue_depth: default_frame_queue_depth(),
            },
            telemetry: TelemetryConfig {
                performance_monitoring: default_performance_monitoring(),
                haptic_feedback: default_haptic_feedback(),
                smoothing_weight: default_smoothing_weight(),
            },
            system: SystemConfig {
                event_bus_capacity: default_event_bus_capacity(),
            },
        }
    }
}

// Default value functions
fn default_fallback_only() -> bool {
    false
}

fn default_facing() -> CameraFacing {
    CameraFacing::Back
}
fn default_bind_timeout_ms() -> u64 {
    3000
}
fn default_frame_queue_depth() -> usize {
    4
}

fn default_performance_monitoring() -> bool {
    true
}
fn default_haptic_feedback() -> bool {
    false
}
fn default_smoothing_weight() -> f64 {
    0.7
}

fn default_event_bus_capacity() -> usize {
    64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = ScannerConfig::default();
        assert!(config.validate().is_ok());
        assert!(!config.scanner.fallback_only);
        assert_eq!(config.camera.default_facing, CameraFacing::Back);
        assert_eq!(config.camera.bind_timeout(), Duration::from_secs(3));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        writeln!(
            file,
            "[scanner]\nfallback_only = true\n\n[camera]\ndefault_facing = \"front\"\n\n[telemetry]\nsmoothing_weight = 0.5"
        )
        .unwrap();

        let config = ScannerConfig::load_from_file(file.path()).unwrap();
        assert!(config.scanner.fallback_only);
        assert_eq!(config.camera.default_facing, CameraFacing::Front);
        assert_eq!(config.telemetry.smoothing_weight, 0.5);
        // Untouched sections keep their defaults
        assert_eq!(config.camera.frame_queue_depth, 4);
        assert_eq!(config.system.event_bus_capacity, 64);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ScannerConfig::load_from_file(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, ScannerConfig::default());
    }

    #[test]
    fn test_config_validation() {
        let mut config = ScannerConfig::default();

        config.telemetry.smoothing_weight = 1.0;
        assert!(config.validate().is_err());
        config.telemetry.smoothing_weight = 0.7;

        config.camera.bind_timeout_ms = 0;
        assert!(config.validate().is_err());
        config.camera.bind_timeout_ms = 500;

        config.camera.frame_queue_depth = 0;
        assert!(config.validate().is_err());
        config.camera.frame_queue_depth = 1;

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_config_serializes_to_toml() {
        let rendered = toml::to_string_pretty(&ScannerConfig::default()).unwrap();
        assert!(rendered.contains("fallback_only = false"));
        assert!(rendered.contains("default_facing = \"back\""));
    }
}
