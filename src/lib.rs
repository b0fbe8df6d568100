pub mod capture;
pub mod error;
pub mod hardware;
pub mod interface;
pub mod pipeline;
pub mod utils;

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use capture::{FrameBufferController, RawFrame, VideoGeometry};
pub use error::{ConfigError, Error, HardwareError, Result};
pub use interface::{CaptureInterface, Control, Finished, Mode, RunSummary};

/// Width of the switch and button GPIO banks.
pub const INPUT_BANK_WIDTH: u8 = 8;

/// System configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub video: VideoConfig,
    pub pipeline: PipelineConfig,
    pub controls: ControlsConfig,
    pub hardware: HardwareConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoConfig {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Run demosaic + color conversion in software during pass-through.
    pub debayer: bool,
    pub max_raw_images: usize,
    /// How long a freshly captured frame is held on the display before
    /// circular park is restored.
    pub settle_delay_ms: u64,
    /// Stop after this many polling cycles.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_limit: Option<u64>,
    /// Pin the polling loop to this core.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_core: Option<usize>,
}

impl PipelineConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

/// Bit indices into the switch and button banks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlsConfig {
    pub mode_switch: u8,
    pub exit_switch: u8,
    pub capture_button: u8,
    pub previous_button: u8,
    pub next_button: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Physical registers and DDR through /dev/mem.
    DevMem,
    /// In-memory VDMA model.
    Simulated,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HardwareConfig {
    pub backend: Backend,
    pub vdma_base: u64,
    pub switches_base: u64,
    pub buttons_base: u64,
    /// Frame stores configured in the VDMA core.
    pub num_frame_stores: u8,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            video: VideoConfig {
                width: 1920,
                height: 1080,
            },
            pipeline: PipelineConfig {
                debayer: true,
                max_raw_images: 32,
                settle_delay_ms: 3000,
                frame_limit: None,
                cpu_core: None,
            },
            controls: ControlsConfig {
                mode_switch: 1,
                exit_switch: 7,
                capture_button: 4,
                previous_button: 0,
                next_button: 1,
            },
            hardware: HardwareConfig {
                backend: Backend::DevMem,
                vdma_base: 0x4300_0000,
                switches_base: 0x4124_0000,
                buttons_base: 0x4120_0000,
                num_frame_stores: 3,
            },
        }
    }
}

impl Config {
    /// Layer defaults, an optional TOML file and `PARKCAM__*` environment
    /// variables, then validate the result.
    pub fn load(path: Option<&Path>) -> std::result::Result<Self, ConfigError> {
        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&Config::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let config: Config = builder
            .add_source(
                config::Environment::with_prefix("PARKCAM")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        VideoGeometry::new(self.video.width, self.video.height)?;

        if self.pipeline.max_raw_images == 0 {
            return Err(ConfigError::EmptyFrameStore);
        }

        let controls = &self.controls;
        for (name, index) in [
            ("mode switch", controls.mode_switch),
            ("exit switch", controls.exit_switch),
            ("capture button", controls.capture_button),
            ("previous button", controls.previous_button),
            ("next button", controls.next_button),
        ] {
            if index >= INPUT_BANK_WIDTH {
                return Err(ConfigError::InputOutOfRange { name, index });
            }
        }

        if controls.mode_switch == controls.exit_switch {
            return Err(ConfigError::SharedSwitch(controls.mode_switch));
        }

        if self.hardware.num_frame_stores < 2 {
            return Err(ConfigError::TooFewFrameStores(
                self.hardware.num_frame_stores,
            ));
        }

        if self.hardware.backend == Backend::Simulated && self.pipeline.frame_limit.is_none() {
            return Err(ConfigError::UnboundedSimulation);
        }

        Ok(())
    }

    pub fn geometry(&self) -> std::result::Result<VideoGeometry, ConfigError> {
        VideoGeometry::new(self.video.width, self.video.height)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn defaults_match_the_board() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.pipeline.max_raw_images, 32);
        assert_eq!(config.pipeline.settle_delay(), Duration::from_secs(3));
        assert_eq!(config.geometry().unwrap().frame_len(), 1920 * 1080);
    }

    #[test]
    fn load_overrides_from_toml() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[video]\nwidth = 64\nheight = 48\n\n[pipeline]\nsettle_delay_ms = 0\nframe_limit = 10\n\n[hardware]\nbackend = \"simulated\""
        )
        .unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.video.width, 64);
        assert_eq!(config.video.height, 48);
        assert_eq!(config.pipeline.frame_limit, Some(10));
        assert_eq!(config.pipeline.settle_delay(), Duration::ZERO);
        assert_eq!(config.hardware.backend, Backend::Simulated);
        // untouched sections keep their defaults
        assert_eq!(config.controls.exit_switch, 7);
        assert_eq!(config.pipeline.max_raw_images, 32);
    }

    #[test]
    fn load_rejects_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");
        assert!(matches!(
            Config::load(Some(&missing)),
            Err(ConfigError::Load(_))
        ));
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut config = Config::default();
        config.video.width = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidGeometry { .. })
        ));

        let mut config = Config::default();
        config.pipeline.max_raw_images = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::EmptyFrameStore)
        ));

        let mut config = Config::default();
        config.controls.capture_button = 8;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InputOutOfRange { index: 8, .. })
        ));

        let mut config = Config::default();
        config.controls.exit_switch = config.controls.mode_switch;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::SharedSwitch(1))
        ));

        let mut config = Config::default();
        config.hardware.backend = Backend::Simulated;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::UnboundedSimulation)
        ));
        config.pipeline.frame_limit = Some(100);
        assert!(config.validate().is_ok());

        let mut config = Config::default();
        config.hardware.num_frame_stores = 1;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::TooFewFrameStores(1))
        ));
    }
}
