//! Pass-through / capture / playback state machine driven by the board's
//! switches and buttons.

use std::time::{Duration, Instant};

use tracing::{debug, info, instrument, trace, warn};

use crate::capture::{FrameBufferController, RawFrame};
use crate::error::Result;
use crate::hardware::{InputState, VideoHardware};
use crate::pipeline::{self, BayerDemosaic, CaptureResult, FrameStore};
use crate::utils;
use crate::{Config, ControlsConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Live video, optionally debayered in software.
    PassThrough,
    /// Copying the inbound frame into the store. Never outlives one cycle.
    Capture,
    /// Saved frames shown on the display.
    Playback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Continue,
    Exit,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub cycles: u64,
    pub frames_converted: u64,
    pub frames_captured: u64,
    pub captures_rejected: u64,
}

/// What is left once the loop has exited and the frame store is released.
pub struct Finished<H> {
    pub summary: RunSummary,
    pub hardware: H,
}

#[derive(Debug, Default, Clone, Copy)]
struct Buttons {
    capture: bool,
    previous: bool,
    next: bool,
}

impl Buttons {
    fn rising_since(self, before: Buttons) -> Buttons {
        Buttons {
            capture: self.capture && !before.capture,
            previous: self.previous && !before.previous,
            next: self.next && !before.next,
        }
    }
}

pub struct CaptureInterface<H, I> {
    buffers: FrameBufferController<H>,
    inputs: I,
    demosaic: BayerDemosaic,
    store: FrameStore,
    controls: ControlsConfig,
    debayer: bool,
    settle_delay: Duration,
    frame_limit: Option<u64>,
    mode: Mode,
    buttons: Buttons,
    playback_index: Option<usize>,
    summary: RunSummary,
}

impl<H: VideoHardware, I: InputState> CaptureInterface<H, I> {
    /// Configure the video pipeline, park the frame buffers and start in
    /// pass-through.
    #[instrument(skip_all)]
    pub fn start(mut hardware: H, inputs: I, config: &Config) -> Result<Self> {
        config.validate()?;
        let geometry = config.geometry()?;

        hardware.configure_video_pipeline(&config.video)?;
        let buffers = FrameBufferController::new(hardware, geometry)?;

        info!(
            "Capture interface ready: {}x{}, {} frame slots, debayer {}",
            geometry.width(),
            geometry.height(),
            config.pipeline.max_raw_images,
            if config.pipeline.debayer { "on" } else { "off" }
        );

        Ok(Self {
            buffers,
            inputs,
            demosaic: BayerDemosaic::new(geometry),
            store: FrameStore::new(config.pipeline.max_raw_images),
            controls: config.controls.clone(),
            debayer: config.pipeline.debayer,
            settle_delay: config.pipeline.settle_delay(),
            frame_limit: config.pipeline.frame_limit,
            mode: Mode::PassThrough,
            buttons: Buttons::default(),
            playback_index: None,
            summary: RunSummary::default(),
        })
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn store(&self) -> &FrameStore {
        &self.store
    }

    /// Saved frame for the display path.
    pub fn load(&self, index: usize) -> Option<&RawFrame> {
        self.store.load(index)
    }

    /// Frame currently shown in playback.
    pub fn playback_index(&self) -> Option<usize> {
        self.playback_index
    }

    pub fn buffers(&self) -> &FrameBufferController<H> {
        &self.buffers
    }

    pub fn hardware_mut(&mut self) -> &mut H {
        self.buffers.hardware_mut()
    }

    pub fn summary(&self) -> RunSummary {
        self.summary
    }

    /// One polling cycle.
    pub fn step(&mut self) -> Result<Control> {
        self.inputs.refresh();
        self.summary.cycles += 1;

        if self.inputs.switch(self.controls.exit_switch) {
            info!("Exit switch asserted");
            return Ok(Control::Exit);
        }

        let playback = self.inputs.switch(self.controls.mode_switch);
        let pressed = self.sample_buttons();

        match self.mode {
            Mode::PassThrough | Mode::Capture if playback => self.enter_playback()?,
            Mode::PassThrough | Mode::Capture => {
                let captured = pressed.capture && self.capture()?;
                if !captured && self.debayer {
                    self.convert()?;
                }
            }
            Mode::Playback if !playback => self.leave_playback()?,
            Mode::Playback => {
                if pressed.previous {
                    self.step_playback(false)?;
                } else if pressed.next {
                    self.step_playback(true)?;
                }
            }
        }

        match self.frame_limit {
            Some(limit) if self.summary.cycles >= limit => {
                info!("Frame limit of {} cycles reached", limit);
                Ok(Control::Exit)
            }
            _ => Ok(Control::Continue),
        }
    }

    /// Poll until the exit switch or the frame limit, then restore circular
    /// park and release the frame store.
    pub fn run(mut self) -> Result<Finished<H>> {
        info!("Entering main processing loop");

        let outcome = loop {
            match self.step() {
                Ok(Control::Continue) => {}
                Ok(Control::Exit) => break Ok(()),
                Err(e) => break Err(e),
            }
        };
        let shutdown = self.shutdown();
        outcome?;
        shutdown?;

        let Self {
            buffers,
            store,
            summary,
            ..
        } = self;
        info!("Releasing {} saved frames", store.len());
        drop(store);

        info!(?summary, "Main processing loop complete");
        Ok(Finished {
            summary,
            hardware: buffers.into_hardware(),
        })
    }

    /// Close any open pause bracket and fall back to pass-through.
    pub fn shutdown(&mut self) -> Result<()> {
        if self.buffers.is_paused() {
            self.buffers.resume()?;
        }
        self.mode = Mode::PassThrough;
        self.playback_index = None;
        Ok(())
    }

    fn sample_buttons(&mut self) -> Buttons {
        let now = Buttons {
            capture: self.inputs.button(self.controls.capture_button),
            previous: self.inputs.button(self.controls.previous_button),
            next: self.inputs.button(self.controls.next_button),
        };
        let pressed = now.rising_since(self.buttons);
        self.buttons = now;
        pressed
    }

    /// Store the inbound frame. `false` when the store was already full and
    /// the cycle is still free for a pixel pass.
    fn capture(&mut self) -> Result<bool> {
        if self.store.is_full() {
            warn!(
                "Frame store full ({} frames), capture ignored",
                self.store.len()
            );
            self.summary.captures_rejected += 1;
            metrics::counter!("parkcam_captures_rejected").increment(1);
            return Ok(false);
        }

        self.mode = Mode::Capture;
        let store = &mut self.store;
        let settle_delay = self.settle_delay;
        let result = self.buffers.paused(|frames| {
            let result = store.capture(frames.inbound);
            if let CaptureResult::Stored { .. } = result {
                // show the raw frame while the hardware holds still
                frames.outbound.copy_from_slice(frames.inbound);
                utils::settle(settle_delay);
            }
            result
        });
        self.mode = Mode::PassThrough;

        match result? {
            CaptureResult::Stored { slot } => {
                self.summary.frames_captured += 1;
                metrics::counter!("parkcam_frames_captured").increment(1);
                metrics::gauge!("parkcam_saved_frames").set(self.store.len() as f64);
                info!(
                    "Captured frame into slot {}, now with {} saved frames",
                    slot,
                    self.store.len()
                );
            }
            CaptureResult::Full => {
                self.summary.captures_rejected += 1;
                metrics::counter!("parkcam_captures_rejected").increment(1);
                warn!("Frame store full, capture ignored");
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn convert(&mut self) -> Result<()> {
        let demosaic = &self.demosaic;
        let started = Instant::now();
        self.buffers.paused(|frames| {
            pipeline::convert_frame(demosaic, frames.inbound, frames.outbound)
        })?;

        let elapsed = started.elapsed();
        self.summary.frames_converted += 1;
        metrics::counter!("parkcam_frames_converted").increment(1);
        metrics::histogram!("parkcam_pixel_pass_us").record(elapsed.as_micros() as f64);
        trace!(?elapsed, "Frame converted");
        Ok(())
    }

    /// Park the display and hold it for the whole of playback.
    fn enter_playback(&mut self) -> Result<()> {
        self.buffers.pause()?;
        self.mode = Mode::Playback;
        self.playback_index = self.store.len().checked_sub(1);
        info!("Mode: PLAY BACK ({} saved frames)", self.store.len());
        self.show_playback_frame()?;
        Ok(())
    }

    fn leave_playback(&mut self) -> Result<()> {
        self.buffers.resume()?;
        self.mode = Mode::PassThrough;
        self.playback_index = None;
        info!("Mode: PASS THROUGH");
        Ok(())
    }

    fn step_playback(&mut self, forward: bool) -> Result<()> {
        let saved = self.store.len();
        let Some(index) = self.playback_index else {
            debug!("No saved frames to step through");
            return Ok(());
        };
        let next = if forward {
            (index + 1) % saved
        } else {
            (index + saved - 1) % saved
        };
        self.playback_index = Some(next);
        self.show_playback_frame()
    }

    /// Copy the selected raw frame onto the parked outbound buffer.
    fn show_playback_frame(&mut self) -> Result<()> {
        let Some(frame) = self.playback_index.and_then(|i| self.store.load(i)) else {
            return Ok(());
        };
        let frames = self.buffers.frames()?;
        let len = frames.outbound.len().min(frame.len());
        frames.outbound[..len].copy_from_slice(&frame.data[..len]);
        debug!(
            index = ?self.playback_index,
            sequence = frame.sequence,
            "Showing saved frame"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::sim::InputFrame;
    use crate::hardware::{ScriptedInputs, SimulatedVdma};
    use crate::{Backend, HardwareError, VideoGeometry};

    fn config() -> Config {
        let mut config = Config::default();
        config.video.width = 6;
        config.video.height = 4;
        config.pipeline.settle_delay_ms = 0;
        config.pipeline.max_raw_images = 2;
        config.hardware.backend = Backend::Simulated;
        config.pipeline.frame_limit = Some(1000);
        config
    }

    fn interface(
        config: &Config,
        script: Vec<InputFrame>,
    ) -> CaptureInterface<SimulatedVdma, ScriptedInputs> {
        let geometry = VideoGeometry::new(config.video.width, config.video.height).unwrap();
        let hw = SimulatedVdma::new(geometry, 3);
        CaptureInterface::start(hw, ScriptedInputs::new(script), config).unwrap()
    }

    #[test]
    fn capture_fires_once_per_press() {
        let held = InputFrame::idle().with_button(4);
        let mut ui = interface(&config(), vec![held, held, held]);
        for _ in 0..3 {
            assert_eq!(ui.step().unwrap(), Control::Continue);
            assert_eq!(ui.mode(), Mode::PassThrough);
        }
        assert_eq!(ui.store().len(), 1);
        // the two held cycles ran the pixel pipeline instead
        assert_eq!(ui.summary().frames_converted, 2);
    }

    #[test]
    fn full_store_leaves_buffers_alone() {
        let press = InputFrame::idle().with_button(4);
        let idle = InputFrame::idle();
        let mut config = config();
        config.pipeline.debayer = false;
        let mut ui = interface(&config, vec![press, idle, press, idle, press]);
        for _ in 0..5 {
            ui.step().unwrap();
        }
        assert_eq!(ui.store().len(), 2);
        assert_eq!(ui.summary().captures_rejected, 1);
        assert!(!ui.buffers().is_paused());
    }

    #[test]
    fn rejected_capture_still_runs_the_pixel_pass() {
        let press = InputFrame::idle().with_button(4);
        let idle = InputFrame::idle();
        let mut ui = interface(&config(), vec![press, idle, press, idle, press]);
        for _ in 0..5 {
            ui.step().unwrap();
        }
        let summary = ui.summary();
        assert_eq!(summary.frames_captured, 2);
        assert_eq!(summary.captures_rejected, 1);
        assert_eq!(summary.frames_converted, 3);
    }

    #[test]
    fn playback_navigation_wraps() {
        let press = InputFrame::idle().with_button(4);
        let idle = InputFrame::idle();
        let play = InputFrame::idle().with_switch(1);
        let next = play.with_button(1);
        let prev = play.with_button(0);
        let mut ui = interface(
            &config(),
            vec![press, idle, press, idle, play, next, play, next, play, prev],
        );

        for _ in 0..5 {
            ui.step().unwrap();
        }
        assert_eq!(ui.mode(), Mode::Playback);
        assert_eq!(ui.playback_index(), Some(1));

        ui.step().unwrap();
        assert_eq!(ui.playback_index(), Some(0));
        ui.step().unwrap();
        ui.step().unwrap();
        assert_eq!(ui.playback_index(), Some(1));
        ui.step().unwrap();
        ui.step().unwrap();
        assert_eq!(ui.playback_index(), Some(0));
    }

    #[test]
    fn empty_playback_only_holds_the_park() {
        let play = InputFrame::idle().with_switch(1);
        let mut ui = interface(&config(), vec![play, play.with_button(1)]);
        ui.step().unwrap();
        ui.step().unwrap();
        assert_eq!(ui.mode(), Mode::Playback);
        assert_eq!(ui.playback_index(), None);
        assert!(ui.buffers().is_paused());
    }

    #[test]
    fn playback_mapping_failure_is_fatal_and_shutdown_restores_park() {
        let press = InputFrame::idle().with_button(4);
        let play = InputFrame::idle().with_switch(1);
        let mut ui = interface(
            &config(),
            vec![press, InputFrame::idle(), press, play, play.with_button(1)],
        );
        for _ in 0..4 {
            ui.step().unwrap();
        }
        assert_eq!(ui.mode(), Mode::Playback);

        let outbound = ui.buffers().outbound().base_address();
        ui.hardware_mut().unmap(outbound);
        match ui.step() {
            Err(crate::Error::Hardware(HardwareError::UnmappedFrame { address })) => {
                assert_eq!(address, outbound)
            }
            other => panic!("expected an unmapped outbound frame, got {other:?}"),
        }

        ui.shutdown().unwrap();
        assert_eq!(ui.mode(), Mode::PassThrough);
        assert!(!ui.buffers().is_paused());
        assert!(ui.buffers().hardware().circular_park_enabled());
    }

    #[test]
    fn configuration_failure_aborts_startup() {
        let config = config();
        let geometry = VideoGeometry::new(6, 4).unwrap();
        let hw = SimulatedVdma::new(geometry, 3).fail_configuration("sensor did not answer");
        let result = CaptureInterface::start(hw, ScriptedInputs::default(), &config);
        assert!(matches!(
            result,
            Err(crate::Error::Hardware(HardwareError::Configuration(_)))
        ));
    }
}
