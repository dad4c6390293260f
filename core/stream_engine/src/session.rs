use std::time::Duration;

use log::{debug, warn};
use pcm_params::{
    AccessMode, HardwareConfig,
    timing::{SwParams, TimingHints, XrunMode},
};

use crate::{
    device::{DeviceError, Direction, HwRequest, PcmEndpoint, PcmState, TransferError},
    error::{Result, StreamError},
};

/// How long a transfer waits for the device before polling it again.
const READY_TIMEOUT: Duration = Duration::from_millis(1000);

/// Per-run knobs the session applies on every (re)configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionSettings {
    pub timing: TimingHints,
    pub xrun: XrunMode,
    pub access: AccessMode,
}

/// Owns the endpoint, the current hardware configuration and the one-period
/// transfer buffer.
///
/// Callers fill [`buffer_mut`](Self::buffer_mut) (or the per-channel slices)
/// and hand the frame count to [`write`](Self::write); capture goes the other
/// way. Every [`configure`](Self::configure) reallocates the buffer, so a
/// slice obtained before a reconfigure must not be held across it.
#[derive(Debug)]
pub struct DeviceSession<E> {
    endpoint: E,
    settings: SessionSettings,
    config: HardwareConfig,
    period_frames: usize,
    buffer_frames: usize,
    buffer: Vec<u8>,
}

impl<E: PcmEndpoint> DeviceSession<E> {
    pub fn new(endpoint: E, settings: SessionSettings) -> Self {
        Self {
            endpoint,
            settings,
            config: HardwareConfig::default(),
            period_frames: 0,
            buffer_frames: 0,
            buffer: Vec::new(),
        }
    }

    /// Negotiates `requested` with the device and leaves it prepared.
    ///
    /// The device may move the rate; format and channel count must be
    /// honoured exactly. Returns the configuration actually in effect.
    pub fn configure(&mut self, requested: HardwareConfig) -> Result<HardwareConfig> {
        requested.validate()?;
        let requested = requested.with_access(self.settings.access);
        let timing = self.settings.timing;

        let request = HwRequest {
            config: requested,
            period_frames: timing.period_frames(requested.rate),
            buffer_frames: timing.buffer_frames(requested.rate),
        };
        let negotiated = self
            .endpoint
            .configure(&request)
            .map_err(|e| StreamError::Config(e.to_string()))?;

        let effective = negotiated.config;
        if effective.format != requested.format {
            return Err(StreamError::Config(format!(
                "sample format {} non available",
                requested.format
            )));
        }
        if effective.channels != requested.channels {
            return Err(StreamError::Config(format!(
                "channels count {} non available",
                requested.channels
            )));
        }
        if effective.rate != requested.rate {
            warn!(
                "rate is not accurate (requested = {} Hz, got = {} Hz)",
                requested.rate, effective.rate
            );
        }

        let period_frames = negotiated.period_frames.max(1);
        if period_frames >= negotiated.buffer_frames {
            return Err(StreamError::Config(format!(
                "can't use period equal to buffer size ({period_frames} == {})",
                negotiated.buffer_frames
            )));
        }

        let sw = SwParams::derive(
            effective.rate,
            period_frames,
            negotiated.buffer_frames,
            &timing,
            self.settings.xrun,
        );
        self.endpoint
            .set_sw_params(&sw)
            .map_err(|e| StreamError::Config(e.to_string()))?;
        self.endpoint
            .prepare()
            .map_err(|e| StreamError::device("prepare", e))?;

        self.config = effective;
        self.period_frames = period_frames;
        self.buffer_frames = negotiated.buffer_frames;
        self.buffer = vec![0; period_frames * effective.frame_bytes()];

        debug!(
            "{} {} Hz x{} ({:?}), period {} frames, buffer {} frames, avail_min {}, xfer_align {}",
            effective.format,
            effective.rate,
            effective.channels,
            effective.access,
            period_frames,
            negotiated.buffer_frames,
            sw.avail_min,
            sw.xfer_align
        );

        Ok(effective)
    }

    pub fn config(&self) -> &HardwareConfig {
        &self.config
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn period_frames(&self) -> usize {
        self.period_frames
    }

    pub fn buffer_frames(&self) -> usize {
        self.buffer_frames
    }

    pub fn period_bytes(&self) -> usize {
        self.buffer.len()
    }

    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    pub fn buffer_mut(&mut self) -> &mut [u8] {
        &mut self.buffer
    }

    /// The transfer buffer split into one equal slice per channel.
    pub fn channel_buffers_mut(&mut self) -> Vec<&mut [u8]> {
        let per_channel = self.per_channel_bytes();
        self.buffer.chunks_mut(per_channel).collect()
    }

    pub fn endpoint(&self) -> &E {
        &self.endpoint
    }

    pub fn into_endpoint(self) -> E {
        self.endpoint
    }

    fn per_channel_bytes(&self) -> usize {
        (self.buffer.len() / self.config.channels.max(1) as usize).max(1)
    }

    /// In fragment mode a short transfer is stretched to a whole period.
    fn transfer_frames(&self, frames: usize) -> usize {
        let frames = frames.min(self.period_frames);
        match self.settings.xrun {
            XrunMode::Fragment => self.period_frames,
            XrunMode::Asap => frames,
        }
    }

    /// Writes `frames` frames from the start of the transfer buffer.
    ///
    /// Blocks through "not ready" and recovers from underruns, retrying the
    /// same frames. Returns `frames`; silence padding added in fragment mode
    /// is not counted.
    pub fn write(&mut self, frames: usize) -> Result<usize> {
        let frames = frames.min(self.period_frames);
        let count = self.transfer_frames(frames);
        let frame_bytes = self.config.frame_bytes();
        if count > frames {
            self.config
                .format
                .fill_silence(&mut self.buffer[frames * frame_bytes..count * frame_bytes]);
        }

        let mut offset = 0;
        while offset < count {
            let pending = count - offset;
            let chunk = &self.buffer[offset * frame_bytes..count * frame_bytes];
            match self.endpoint.write_interleaved(chunk, pending) {
                Ok(written) => {
                    offset += written;
                    if written < pending {
                        self.wait_ready()?;
                    }
                }
                Err(err) => self.on_transfer_error(err, "write")?,
            }
        }
        Ok(frames)
    }

    /// [`write`](Self::write) for one buffer slice per channel.
    pub fn write_multi(&mut self, frames: usize) -> Result<usize> {
        let frames = frames.min(self.period_frames);
        let count = self.transfer_frames(frames);
        let sample_bytes = self.config.format.sample_bytes();
        let per_channel = self.per_channel_bytes();
        if count > frames {
            for channel in self.buffer.chunks_mut(per_channel) {
                self.config
                    .format
                    .fill_silence(&mut channel[frames * sample_bytes..count * sample_bytes]);
            }
        }

        let mut offset = 0;
        while offset < count {
            let pending = count - offset;
            let channels: Vec<&[u8]> = self
                .buffer
                .chunks(per_channel)
                .map(|channel| &channel[offset * sample_bytes..count * sample_bytes])
                .collect();
            match self.endpoint.write_noninterleaved(&channels, pending) {
                Ok(written) => {
                    offset += written;
                    if written < pending {
                        self.wait_ready()?;
                    }
                }
                Err(err) => self.on_transfer_error(err, "write")?,
            }
        }
        Ok(frames)
    }

    /// Reads `frames` frames into the start of the transfer buffer.
    ///
    /// In fragment mode a whole period is taken from the device and only the
    /// first `frames` are meant for the caller.
    pub fn read(&mut self, frames: usize) -> Result<usize> {
        let frames = frames.min(self.period_frames);
        let count = self.transfer_frames(frames);
        let frame_bytes = self.config.frame_bytes();

        let mut offset = 0;
        while offset < count {
            let pending = count - offset;
            let chunk = &mut self.buffer[offset * frame_bytes..count * frame_bytes];
            match self.endpoint.read_interleaved(chunk, pending) {
                Ok(read) => {
                    offset += read;
                    if read < pending {
                        self.wait_ready()?;
                    }
                }
                Err(err) => self.on_transfer_error(err, "read")?,
            }
        }
        Ok(frames)
    }

    /// [`read`](Self::read) into one buffer slice per channel.
    pub fn read_multi(&mut self, frames: usize) -> Result<usize> {
        let frames = frames.min(self.period_frames);
        let count = self.transfer_frames(frames);
        let sample_bytes = self.config.format.sample_bytes();
        let per_channel = self.per_channel_bytes();

        let mut offset = 0;
        while offset < count {
            let pending = count - offset;
            let mut channels: Vec<&mut [u8]> = self
                .buffer
                .chunks_mut(per_channel)
                .map(|channel| &mut channel[offset * sample_bytes..count * sample_bytes])
                .collect();
            match self.endpoint.read_noninterleaved(&mut channels, pending) {
                Ok(read) => {
                    offset += read;
                    if read < pending {
                        self.wait_ready()?;
                    }
                }
                Err(err) => self.on_transfer_error(err, "read")?,
            }
        }
        Ok(frames)
    }

    pub fn drain(&mut self) -> Result<()> {
        self.endpoint
            .drain()
            .map_err(|e| StreamError::device("drain", e))
    }

    fn wait_ready(&mut self) -> Result<()> {
        self.endpoint
            .wait(READY_TIMEOUT)
            .map_err(|e| StreamError::device("wait", e))
    }

    fn on_transfer_error(&mut self, err: TransferError, op: &'static str) -> Result<()> {
        match err {
            TransferError::WouldBlock => self.wait_ready(),
            TransferError::Underrun => self.recover(),
            TransferError::Failed(msg) => Err(StreamError::device(op, DeviceError::Failed(msg))),
        }
    }

    /// Brings the device back from an xrun. Anything other than a
    /// confirmed xrun, or a failing prepare, ends the run.
    fn recover(&mut self) -> Result<()> {
        let status = self
            .endpoint
            .status()
            .map_err(|e| StreamError::Underrun(format!("status error: {e}")))?;

        if status.state != PcmState::Xrun {
            return Err(StreamError::Underrun(format!(
                "device in {:?} state",
                status.state
            )));
        }

        let stalled_ms = status
            .trigger
            .map_or(0.0, |trigger| trigger.elapsed().as_secs_f64() * 1000.0);
        let what = match self.endpoint.direction() {
            Direction::Playback => "underrun",
            Direction::Capture => "overrun",
        };
        warn!("{what}!!! (at least {stalled_ms:.3} ms long)");

        self.endpoint
            .prepare()
            .map_err(|e| StreamError::Underrun(format!("prepare error: {e}")))
    }
}
