use std::{
    collections::VecDeque,
    time::{Duration, Instant},
};

use pcm_params::HardwareConfig;

use super::{
    DeviceError, Direction, HwRequest, Negotiated, PcmEndpoint, PcmState, PcmStatus,
    TransferError, deinterleave, interleave,
};

/// Failure injected into the next transfer call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    WouldBlock,
    Underrun,
    Failed(&'static str),
}

/// In-memory endpoint with a fixed period size and scripted faults.
#[derive(Debug)]
pub struct ScriptedEndpoint {
    direction: Direction,
    period_frames: usize,
    config: HardwareConfig,
    state: PcmState,
    faults: VecDeque<Fault>,
    max_frames_per_call: Option<usize>,
    fail_prepare: bool,
    status_override: Option<PcmState>,
    capture_data: VecDeque<u8>,
    scratch: Vec<u8>,
    pub configs: Vec<HardwareConfig>,
    /// Every byte accepted by a write, interleaved.
    pub played: Vec<u8>,
    /// Frames accepted per successful write call.
    pub write_calls: Vec<usize>,
    pub captured_frames: usize,
    pub prepares: usize,
    pub waits: usize,
    pub drains: usize,
}

impl ScriptedEndpoint {
    pub fn playback(period_frames: usize) -> Self {
        Self::new(Direction::Playback, period_frames)
    }

    /// A capture device that delivers `data`, then silence.
    pub fn capture(period_frames: usize, data: Vec<u8>) -> Self {
        let mut endpoint = Self::new(Direction::Capture, period_frames);
        endpoint.capture_data = data.into();
        endpoint
    }

    fn new(direction: Direction, period_frames: usize) -> Self {
        Self {
            direction,
            period_frames,
            config: HardwareConfig::default(),
            state: PcmState::Open,
            faults: VecDeque::new(),
            max_frames_per_call: None,
            fail_prepare: false,
            status_override: None,
            capture_data: VecDeque::new(),
            scratch: Vec::new(),
            configs: Vec::new(),
            played: Vec::new(),
            write_calls: Vec::new(),
            captured_frames: 0,
            prepares: 0,
            waits: 0,
            drains: 0,
        }
    }

    pub fn with_faults(mut self, faults: impl IntoIterator<Item = Fault>) -> Self {
        self.faults.extend(faults);
        self
    }

    pub fn with_max_frames(mut self, frames: usize) -> Self {
        self.max_frames_per_call = Some(frames);
        self
    }

    /// Recovery from an xrun fails; the initial prepare still succeeds.
    pub fn failing_prepare(mut self) -> Self {
        self.fail_prepare = true;
        self
    }

    /// Makes `status()` report `state` regardless of what happened.
    pub fn with_status(mut self, state: PcmState) -> Self {
        self.status_override = Some(state);
        self
    }

    pub fn played_frames(&self) -> usize {
        self.played.len() / self.config.frame_bytes()
    }

    fn take_fault(&mut self) -> Result<(), TransferError> {
        if self.state == PcmState::Xrun {
            return Err(TransferError::Underrun);
        }
        match self.faults.pop_front() {
            None => Ok(()),
            Some(Fault::WouldBlock) => Err(TransferError::WouldBlock),
            Some(Fault::Underrun) => {
                self.state = PcmState::Xrun;
                Err(TransferError::Underrun)
            }
            Some(Fault::Failed(msg)) => Err(TransferError::Failed(msg.to_owned())),
        }
    }

    fn accept(&self, frames: usize) -> usize {
        self.max_frames_per_call
            .map_or(frames, |max| frames.min(max))
    }
}

impl PcmEndpoint for ScriptedEndpoint {
    fn direction(&self) -> Direction {
        self.direction
    }

    fn configure(&mut self, request: &HwRequest) -> Result<Negotiated, DeviceError> {
        self.configs.push(request.config);
        self.config = request.config;
        self.state = PcmState::Setup;
        Ok(Negotiated {
            config: request.config,
            period_frames: self.period_frames,
            buffer_frames: self.period_frames * 4,
        })
    }

    fn write_interleaved(&mut self, data: &[u8], frames: usize) -> Result<usize, TransferError> {
        self.take_fault()?;
        let frames = self.accept(frames);
        let bytes = frames * self.config.frame_bytes();
        self.played.extend_from_slice(&data[..bytes]);
        self.write_calls.push(frames);
        self.state = PcmState::Running;
        Ok(frames)
    }

    fn write_noninterleaved(
        &mut self,
        channels: &[&[u8]],
        frames: usize,
    ) -> Result<usize, TransferError> {
        self.take_fault()?;
        let frames = self.accept(frames);
        interleave(channels, self.config.format.sample_bytes(), frames, &mut self.scratch);
        self.played.extend_from_slice(&self.scratch);
        self.write_calls.push(frames);
        self.state = PcmState::Running;
        Ok(frames)
    }

    fn read_interleaved(
        &mut self,
        data: &mut [u8],
        frames: usize,
    ) -> Result<usize, TransferError> {
        self.take_fault()?;
        let frames = self.accept(frames);
        for byte in &mut data[..frames * self.config.frame_bytes()] {
            *byte = self.capture_data.pop_front().unwrap_or(0);
        }
        self.captured_frames += frames;
        self.state = PcmState::Running;
        Ok(frames)
    }

    fn read_noninterleaved(
        &mut self,
        channels: &mut [&mut [u8]],
        frames: usize,
    ) -> Result<usize, TransferError> {
        self.take_fault()?;
        let frames = self.accept(frames);
        let mut scratch = vec![0u8; frames * self.config.frame_bytes()];
        for byte in &mut scratch {
            *byte = self.capture_data.pop_front().unwrap_or(0);
        }
        deinterleave(&scratch, self.config.format.sample_bytes(), frames, channels);
        self.captured_frames += frames;
        self.state = PcmState::Running;
        Ok(frames)
    }

    fn wait(&mut self, _timeout: Duration) -> Result<(), DeviceError> {
        self.waits += 1;
        Ok(())
    }

    fn status(&self) -> Result<PcmStatus, DeviceError> {
        Ok(PcmStatus {
            state: self.status_override.unwrap_or(self.state),
            trigger: Some(Instant::now()),
        })
    }

    fn prepare(&mut self) -> Result<(), DeviceError> {
        self.prepares += 1;
        if self.fail_prepare && self.state == PcmState::Xrun {
            return Err(DeviceError::Failed("prepare failed".into()));
        }
        self.state = PcmState::Prepared;
        Ok(())
    }

    fn drain(&mut self) -> Result<(), DeviceError> {
        self.drains += 1;
        self.state = PcmState::Setup;
        Ok(())
    }
}
