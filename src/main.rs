//! parkcam: software pass-through, capture and playback for the VDMA camera

use std::path::PathBuf;

use color_eyre::Result;
use tracing::info;

use parkcam::hardware::{
    DevMemVdma, GpioInputs, InputState, ScriptedInputs, SimulatedVdma, VideoHardware,
};
use parkcam::{utils, Backend, CaptureInterface, Config};

fn main() -> Result<()> {
    // Initialize error handling and logging
    color_eyre::install()?;
    utils::init_logging();

    info!("parkcam launching...");

    // Optional TOML file as the only argument
    let path = std::env::args_os().nth(1).map(PathBuf::from);
    let config = Config::load(path.as_deref())?;
    let geometry = config.geometry()?;

    if let Some(core) = config.pipeline.cpu_core {
        utils::pin_to_core(core);
    }

    let (hardware, inputs): (Box<dyn VideoHardware>, Box<dyn InputState>) =
        match config.hardware.backend {
            Backend::DevMem => (
                Box::new(DevMemVdma::open(&config.hardware, geometry)?),
                Box::new(GpioInputs::open(&config.hardware)?),
            ),
            Backend::Simulated => (
                Box::new(SimulatedVdma::new(
                    geometry,
                    config.hardware.num_frame_stores,
                )),
                Box::new(ScriptedInputs::default()),
            ),
        };
    info!("Using {:?} backend", config.hardware.backend);

    let interface = CaptureInterface::start(hardware, inputs, &config)?;
    let finished = interface.run()?;

    info!(
        "parkcam shutting down after {} cycles ({} converted, {} captured, {} rejected)",
        finished.summary.cycles,
        finished.summary.frames_converted,
        finished.summary.frames_captured,
        finished.summary.captures_rejected
    );
    Ok(())
}
