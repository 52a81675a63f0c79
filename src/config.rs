use crate::solver::{GridShape, StereoCalibrationFlags};
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct CamcalConfig {
    pub calibration: CalibrationConfig,
    pub stereo: StereoConfig,
    pub processor: ProcessorOptions,
}

/// Settings for single-camera calibration stages
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq)]
pub struct CalibrationConfig {
    /// Inner corners of the chessboard (columns, rows)
    #[serde(default = "default_mono_grid_shape")]
    pub grid_shape: GridShape,

    /// Accepted detections needed before solving
    #[serde(default = "default_max_samples")]
    pub max_samples: usize,
}

/// Settings for stereo calibration stages
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq)]
pub struct StereoConfig {
    /// Inner corners of the chessboard (columns, rows); forced onto both sides
    #[serde(default = "default_stereo_grid_shape")]
    pub grid_shape: GridShape,

    /// Accepted left+right detections needed before solving
    #[serde(default = "default_max_samples")]
    pub max_samples: usize,

    /// Parameters the joint refinement may change
    #[serde(default)]
    pub flags: StereoCalibrationFlags,
}

/// Options shared by every processor stage
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq)]
pub struct ProcessorOptions {
    /// Extra per-frame logging
    #[serde(default = "default_debug")]
    pub debug: bool,

    /// Report processed results; there is no on-screen output, results go to the debug log
    #[serde(default = "default_display_results")]
    pub display_results: bool,

    /// When false the stage passes images through untouched
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl CamcalConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("camcal.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let mono_grid = default_mono_grid_shape();
        let stereo_grid = default_stereo_grid_shape();

        let settings = Config::builder()
            // Start with default values
            .set_default(
                "calibration.grid_shape",
                vec![mono_grid.columns, mono_grid.rows],
            )?
            .set_default("calibration.max_samples", default_max_samples() as i64)?
            .set_default(
                "stereo.grid_shape",
                vec![stereo_grid.columns, stereo_grid.rows],
            )?
            .set_default("stereo.max_samples", default_max_samples() as i64)?
            .set_default("processor.debug", default_debug())?
            .set_default("processor.display_results", default_display_results())?
            .set_default("processor.enabled", default_enabled())?
            // Add configuration file (optional)
            .add_source(File::with_name(&path_str).required(false))
            // Add environment variables, e.g. CAMCAL_STEREO__MAX_SAMPLES
            .add_source(
                Environment::with_prefix("CAMCAL")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: CamcalConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.calibration.grid_shape.is_empty() {
            return Err(ConfigError::Message(
                "Calibration grid_shape must have non-zero columns and rows".to_string(),
            ));
        }

        if self.calibration.max_samples == 0 {
            return Err(ConfigError::Message(
                "Calibration max_samples must be greater than 0".to_string(),
            ));
        }

        if self.stereo.grid_shape.is_empty() {
            return Err(ConfigError::Message(
                "Stereo grid_shape must have non-zero columns and rows".to_string(),
            ));
        }

        if self.stereo.max_samples == 0 {
            return Err(ConfigError::Message(
                "Stereo max_samples must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for CamcalConfig {
    fn default() -> Self {
        Self {
            calibration: CalibrationConfig::default(),
            stereo: StereoConfig::default(),
            processor: ProcessorOptions::default(),
        }
    }
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            grid_shape: default_mono_grid_shape(),
            max_samples: default_max_samples(),
        }
    }
}

impl Default for StereoConfig {
    fn default() -> Self {
        Self {
            grid_shape: default_stereo_grid_shape(),
            max_samples: default_max_samples(),
            flags: StereoCalibrationFlags::default(),
        }
    }
}

impl Default for ProcessorOptions {
    fn default() -> Self {
        Self {
            debug: default_debug(),
            display_results: default_display_results(),
            enabled: default_enabled(),
        }
    }
}

// Default value functions
fn default_mono_grid_shape() -> GridShape {
    GridShape::new(7, 6)
}

fn default_stereo_grid_shape() -> GridShape {
    GridShape::new(9, 6)
}

fn default_max_samples() -> usize {
    20
}

fn default_debug() -> bool {
    false
}

fn default_display_results() -> bool {
    false
}

fn default_enabled() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = CamcalConfig::default();

        assert_eq!(config.calibration.grid_shape, GridShape::new(7, 6));
        assert_eq!(config.stereo.grid_shape, GridShape::new(9, 6));
        assert_eq!(config.calibration.max_samples, 20);
        assert!(config.processor.enabled);
        assert!(!config.processor.debug);
        assert!(config.stereo.flags.same_focal_length);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_file_overrides_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("camcal.toml");
        fs::write(
            &path,
            r#"
[calibration]
grid_shape = [8, 5]
max_samples = 4

[stereo.flags]
fix_intrinsic = true

[processor]
display_results = true
"#,
        )
        .unwrap();

        let config = CamcalConfig::load_from_file(&path).unwrap();

        assert_eq!(config.calibration.grid_shape, GridShape::new(8, 5));
        assert_eq!(config.calibration.max_samples, 4);
        assert_eq!(config.stereo.grid_shape, GridShape::new(9, 6));
        assert!(config.stereo.flags.fix_intrinsic);
        assert!(config.stereo.flags.zero_tangent_distortion);
        assert!(config.processor.display_results);
        assert!(config.processor.enabled);
    }

    #[test]
    fn test_environment_variable_override() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("absent.toml");

        env::set_var("CAMCAL_STEREO__MAX_SAMPLES", "33");
        let result = CamcalConfig::load_from_file(&missing);
        env::remove_var("CAMCAL_STEREO__MAX_SAMPLES");

        let config = result.unwrap();
        assert_eq!(config.stereo.max_samples, 33);
        assert_eq!(config.calibration.grid_shape, GridShape::new(7, 6));
    }

    #[test]
    fn test_config_validation() {
        let mut config = CamcalConfig::default();
        config.calibration.grid_shape = GridShape::new(0, 6);

        // Should fail validation due to empty grid
        assert!(config.validate().is_err());

        config.calibration.grid_shape = GridShape::new(7, 6);
        config.stereo.max_samples = 0;
        assert!(config.validate().is_err());

        config.stereo.max_samples = 1;
        assert!(config.validate().is_ok());
    }
}
