use std::{
    fmt,
    sync::{
        Arc, Mutex,
        atomic::{AtomicU8, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use cpal::{
    BufferSize, InputCallbackInfo, OutputCallbackInfo, SampleRate, StreamConfig,
    SupportedBufferSize, SupportedStreamConfigRange,
    traits::{DeviceTrait, HostTrait, StreamTrait},
};
use log::{debug, error};
use pcm_params::{
    AccessMode, HardwareConfig, SampleFormat,
    timing::{SwParams, micros_for_frames},
};
use rtrb::{Consumer, Producer, RingBuffer};

use super::{
    DeviceError, Direction, HwRequest, Negotiated, PcmEndpoint, PcmState, PcmStatus,
    TransferError, deinterleave, interleave,
};

/// How often a blocked transfer re-checks the ring.
const POLL_INTERVAL: Duration = Duration::from_millis(1);
/// Upper bound for one blocking wait inside a transfer call.
const BLOCK_TIMEOUT: Duration = Duration::from_secs(1);

/// Sample types the ring can carry, decoded from little-endian wire bytes.
trait WireSample: cpal::SizedSample + Send + 'static {
    const BYTES: usize;
    fn from_wire(bytes: &[u8]) -> Self;
    fn to_wire(self, out: &mut [u8]);
}

macro_rules! wire_sample {
    ($($t:ty),*) => {
        $(
            impl WireSample for $t {
                const BYTES: usize = size_of::<$t>();

                fn from_wire(bytes: &[u8]) -> Self {
                    let mut raw = [0u8; size_of::<$t>()];
                    raw.copy_from_slice(&bytes[..Self::BYTES]);
                    <$t>::from_le_bytes(raw)
                }

                fn to_wire(self, out: &mut [u8]) {
                    out[..Self::BYTES].copy_from_slice(&self.to_le_bytes());
                }
            }
        )*
    };
}

wire_sample!(u8, i8, i16, u16, i32, u32, f32);

fn cpal_format(format: SampleFormat) -> Option<cpal::SampleFormat> {
    match format {
        SampleFormat::U8 => Some(cpal::SampleFormat::U8),
        SampleFormat::S8 => Some(cpal::SampleFormat::I8),
        SampleFormat::S16Le => Some(cpal::SampleFormat::I16),
        SampleFormat::U16Le => Some(cpal::SampleFormat::U16),
        SampleFormat::S32Le => Some(cpal::SampleFormat::I32),
        SampleFormat::U32Le => Some(cpal::SampleFormat::U32),
        SampleFormat::FloatLe => Some(cpal::SampleFormat::F32),
        _ => None,
    }
}

/// State shared with the realtime callback.
#[derive(Debug)]
struct SharedState {
    state: AtomicU8,
    trigger: Mutex<Option<Instant>>,
}

impl SharedState {
    fn new() -> Self {
        Self {
            state: AtomicU8::new(PcmState::Open as u8),
            trigger: Mutex::new(None),
        }
    }

    fn load(&self) -> PcmState {
        match self.state.load(Ordering::Acquire) {
            0 => PcmState::Open,
            1 => PcmState::Setup,
            2 => PcmState::Prepared,
            3 => PcmState::Running,
            4 => PcmState::Xrun,
            _ => PcmState::Draining,
        }
    }

    fn store(&self, state: PcmState) {
        self.state.store(state as u8, Ordering::Release);
    }

    fn check_transfer(&self) -> Result<(), TransferError> {
        match self.load() {
            PcmState::Xrun => Err(TransferError::Underrun),
            PcmState::Open | PcmState::Setup => {
                Err(TransferError::Failed("PCM is not prepared".into()))
            }
            PcmState::Prepared | PcmState::Running | PcmState::Draining => Ok(()),
        }
    }

    /// Running -> Xrun, stamping the moment the ring ran dry (or full).
    /// Called from the realtime callback, so the stamp is skipped rather
    /// than waited for when `status` holds the lock.
    fn mark_xrun(&self) {
        let switched = self
            .state
            .compare_exchange(
                PcmState::Running as u8,
                PcmState::Xrun as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        if switched && let Ok(mut trigger) = self.trigger.try_lock() {
            *trigger = Some(Instant::now());
        }
    }
}

/// Frames that must be ready before a blocked transfer of `wanted` frames
/// proceeds: the larger of the wake-up and minimum-transfer thresholds,
/// but never more than the ring holds or the caller asked for.
fn wake_threshold(
    avail_min: usize,
    xfer_min: usize,
    capacity_frames: usize,
    wanted: usize,
) -> usize {
    avail_min
        .max(xfer_min)
        .min(capacity_frames)
        .min(wanted)
        .max(1)
}

enum Ring {
    None,
    Playback(Producer<u8>),
    Capture(Consumer<u8>),
}

impl Ring {
    fn slots(&self) -> usize {
        match self {
            Self::None => 0,
            Self::Playback(producer) => producer.slots(),
            Self::Capture(consumer) => consumer.slots(),
        }
    }
}

/// A cpal device driven through the blocking [`PcmEndpoint`] contract.
///
/// cpal pulls (or pushes) samples from its own callback thread; the endpoint
/// keeps an rtrb byte ring between that callback and the caller. The ring is
/// sized to the negotiated buffer, so a full ring is the device's "not
/// ready" condition and an empty ring while running is an underrun.
pub struct CpalEndpoint {
    device: cpal::Device,
    name: String,
    direction: Direction,
    nonblock: bool,
    shared: Arc<SharedState>,
    stream: Option<cpal::Stream>,
    ring: Ring,
    capacity: usize,
    config: HardwareConfig,
    period_frames: usize,
    avail_min: usize,
    xfer_min: usize,
    scratch: Vec<u8>,
}

impl fmt::Debug for CpalEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CpalEndpoint")
            .field("name", &self.name)
            .field("direction", &self.direction)
            .field("config", &self.config)
            .field("period_frames", &self.period_frames)
            .finish_non_exhaustive()
    }
}

impl CpalEndpoint {
    /// Opens `name` on the default host; `"default"` picks the host's
    /// default device for `direction`.
    pub fn open(name: &str, direction: Direction, nonblock: bool) -> Result<Self, DeviceError> {
        let host = cpal::default_host();

        let device = if name == "default" {
            match direction {
                Direction::Playback => host.default_output_device(),
                Direction::Capture => host.default_input_device(),
            }
        } else {
            let mut devices: Box<dyn Iterator<Item = cpal::Device>> = match direction {
                Direction::Playback => Box::new(
                    host.output_devices()
                        .map_err(|e| DeviceError::DeviceNotFound(format!("{name}: {e}")))?,
                ),
                Direction::Capture => Box::new(
                    host.input_devices()
                        .map_err(|e| DeviceError::DeviceNotFound(format!("{name}: {e}")))?,
                ),
            };
            devices.find(|device| device.name().is_ok_and(|n| n == name))
        }
        .ok_or_else(|| DeviceError::DeviceNotFound(name.to_owned()))?;

        debug!("opened {direction:?} device '{name}'");

        Ok(Self {
            device,
            name: name.to_owned(),
            direction,
            nonblock,
            shared: Arc::new(SharedState::new()),
            stream: None,
            ring: Ring::None,
            capacity: 0,
            config: HardwareConfig::default(),
            period_frames: 0,
            avail_min: 1,
            xfer_min: 1,
            scratch: Vec::new(),
        })
    }

    fn frame_bytes(&self) -> usize {
        self.config.frame_bytes().max(1)
    }

    fn supported_ranges(&self) -> Result<Vec<SupportedStreamConfigRange>, DeviceError> {
        let ranges = match self.direction {
            Direction::Playback => self
                .device
                .supported_output_configs()
                .map(Iterator::collect),
            Direction::Capture => self.device.supported_input_configs().map(Iterator::collect),
        };
        ranges.map_err(|e| DeviceError::UnsupportedConfig(e.to_string()))
    }

    fn build_playback_stream<T: WireSample>(
        &self,
        config: &StreamConfig,
        mut ring: Consumer<u8>,
    ) -> Result<cpal::Stream, DeviceError> {
        let shared = Arc::clone(&self.shared);
        let error_cb = move |err| {
            error!("stream error: {err}");
        };

        let data_cb = move |data: &mut [T], _: &OutputCallbackInfo| {
            let mut starved = false;
            let mut raw = [0u8; 8];
            for sample in data.iter_mut() {
                if ring.slots() < T::BYTES {
                    *sample = T::EQUILIBRIUM;
                    starved = true;
                    continue;
                }
                for byte in &mut raw[..T::BYTES] {
                    *byte = ring.pop().unwrap_or(0);
                }
                *sample = T::from_wire(&raw);
            }
            if starved {
                shared.mark_xrun();
            }
        };

        self.device
            .build_output_stream(config, data_cb, error_cb, None)
            .map_err(|e| DeviceError::StreamBuildFailed(e.to_string()))
    }

    fn build_capture_stream<T: WireSample>(
        &self,
        config: &StreamConfig,
        mut ring: Producer<u8>,
    ) -> Result<cpal::Stream, DeviceError> {
        let shared = Arc::clone(&self.shared);
        let error_cb = move |err| {
            error!("stream error: {err}");
        };

        let data_cb = move |data: &[T], _: &InputCallbackInfo| {
            if shared.load() != PcmState::Running {
                return;
            }
            let mut raw = [0u8; 8];
            for sample in data {
                if ring.slots() < T::BYTES {
                    shared.mark_xrun();
                    return;
                }
                sample.to_wire(&mut raw);
                for byte in &raw[..T::BYTES] {
                    let _ = ring.push(*byte);
                }
            }
        };

        self.device
            .build_input_stream(config, data_cb, error_cb, None)
            .map_err(|e| DeviceError::StreamBuildFailed(e.to_string()))
    }

    fn build_stream<T: WireSample>(
        &mut self,
        config: &StreamConfig,
    ) -> Result<cpal::Stream, DeviceError> {
        let (producer, consumer) = RingBuffer::<u8>::new(self.capacity);
        match self.direction {
            Direction::Playback => {
                let stream = self.build_playback_stream::<T>(config, consumer)?;
                self.ring = Ring::Playback(producer);
                Ok(stream)
            }
            Direction::Capture => {
                let stream = self.build_capture_stream::<T>(config, producer)?;
                self.ring = Ring::Capture(consumer);
                Ok(stream)
            }
        }
    }

    fn build_for_format(
        &mut self,
        format: cpal::SampleFormat,
        config: &StreamConfig,
    ) -> Result<cpal::Stream, DeviceError> {
        match format {
            cpal::SampleFormat::U8 => self.build_stream::<u8>(config),
            cpal::SampleFormat::I8 => self.build_stream::<i8>(config),
            cpal::SampleFormat::I16 => self.build_stream::<i16>(config),
            cpal::SampleFormat::U16 => self.build_stream::<u16>(config),
            cpal::SampleFormat::I32 => self.build_stream::<i32>(config),
            cpal::SampleFormat::U32 => self.build_stream::<u32>(config),
            cpal::SampleFormat::F32 => self.build_stream::<f32>(config),
            format => Err(DeviceError::UnsupportedConfig(format!(
                "Unsupported sample format '{format}'"
            ))),
        }
    }

    fn start_if_prepared(&mut self) -> Result<(), TransferError> {
        if self.shared.load() != PcmState::Prepared {
            return Ok(());
        }
        if let Some(stream) = &self.stream {
            stream
                .play()
                .map_err(|e| TransferError::Failed(e.to_string()))?;
        }
        self.shared.store(PcmState::Running);
        Ok(())
    }

    fn is_ready(&self, wanted: usize) -> bool {
        let frames = self.ring.slots() / self.frame_bytes();
        let capacity_frames = self.capacity / self.frame_bytes();
        frames >= wake_threshold(self.avail_min, self.xfer_min, capacity_frames, wanted)
    }

    fn block_until_ready(&self, wanted: usize, timeout: Duration) {
        let deadline = Instant::now() + timeout;
        while !self.is_ready(wanted) && self.shared.load() != PcmState::Xrun {
            if Instant::now() >= deadline {
                break;
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    fn push_bytes(&mut self, bytes: usize) -> Result<usize, TransferError> {
        let Ring::Playback(producer) = &mut self.ring else {
            return Err(TransferError::Failed("not a playback stream".into()));
        };
        let chunk = producer
            .write_chunk_uninit(bytes)
            .map_err(|e| TransferError::Failed(e.to_string()))?;
        let written = chunk.fill_from_iter(self.scratch[..bytes].iter().copied());
        self.start_if_prepared()?;
        Ok(written / self.frame_bytes())
    }

    fn writable_frames(&self, frames: usize) -> Result<usize, TransferError> {
        if !self.nonblock {
            self.block_until_ready(frames, BLOCK_TIMEOUT);
        }
        self.shared.check_transfer()?;
        let count = frames.min(self.ring.slots() / self.frame_bytes());
        if count == 0 {
            return Err(TransferError::WouldBlock);
        }
        Ok(count)
    }

    fn readable_frames(&mut self, frames: usize) -> Result<usize, TransferError> {
        self.shared.check_transfer()?;
        self.start_if_prepared()?;
        if !self.nonblock {
            self.block_until_ready(frames, BLOCK_TIMEOUT);
        }
        self.shared.check_transfer()?;
        let count = frames.min(self.ring.slots() / self.frame_bytes());
        if count == 0 {
            return Err(TransferError::WouldBlock);
        }
        Ok(count)
    }

    fn pop_bytes(&mut self, out: &mut [u8]) -> Result<(), TransferError> {
        let Ring::Capture(consumer) = &mut self.ring else {
            return Err(TransferError::Failed("not a capture stream".into()));
        };
        let chunk = consumer
            .read_chunk(out.len())
            .map_err(|e| TransferError::Failed(e.to_string()))?;
        let (first, second) = chunk.as_slices();
        out[..first.len()].copy_from_slice(first);
        out[first.len()..].copy_from_slice(second);
        chunk.commit_all();
        Ok(())
    }
}

impl PcmEndpoint for CpalEndpoint {
    fn direction(&self) -> Direction {
        self.direction
    }

    fn configure(&mut self, request: &HwRequest) -> Result<Negotiated, DeviceError> {
        let wanted = request.config;
        let format = cpal_format(wanted.format).ok_or_else(|| {
            DeviceError::UnsupportedConfig(format!(
                "sample format {} is not available on '{}'",
                wanted.format, self.name
            ))
        })?;
        if wanted.access == AccessMode::MemoryMapped {
            debug!("'{}': mmap access not available, using read/write transfers", self.name);
        }
        let channels = u16::try_from(wanted.channels)
            .map_err(|_| DeviceError::UnsupportedConfig(format!("{} channels", wanted.channels)))?;

        let distance = |range: &SupportedStreamConfigRange| {
            let (min, max) = (range.min_sample_rate().0, range.max_sample_rate().0);
            if wanted.rate < min {
                min - wanted.rate
            } else {
                wanted.rate.saturating_sub(max)
            }
        };
        let range = self
            .supported_ranges()?
            .into_iter()
            .filter(|range| range.channels() == channels && range.sample_format() == format)
            .min_by_key(distance)
            .ok_or_else(|| {
                DeviceError::UnsupportedConfig(format!(
                    "{} channels of {} not supported by '{}'",
                    wanted.channels, wanted.format, self.name
                ))
            })?;

        let rate = wanted
            .rate
            .clamp(range.min_sample_rate().0, range.max_sample_rate().0);
        let period = match range.buffer_size() {
            SupportedBufferSize::Range { min, max } => {
                (request.period_frames as u32).clamp(*min, *max)
            }
            SupportedBufferSize::Unknown => request.period_frames as u32,
        };
        let period_frames = period as usize;
        let buffer_frames = request.buffer_frames.max(period_frames * 2);

        // a reconfigure always starts from a fresh stream and an empty ring
        self.stream = None;
        self.ring = Ring::None;
        self.config = HardwareConfig { rate, ..wanted };
        self.period_frames = period_frames;
        self.capacity = buffer_frames * self.frame_bytes();

        let fixed = StreamConfig {
            channels,
            sample_rate: SampleRate(rate),
            buffer_size: BufferSize::Fixed(period),
        };
        let stream = match self.build_for_format(format, &fixed) {
            Ok(stream) => stream,
            Err(err) => {
                debug!("fixed period of {period} frames rejected ({err}), using device default");
                let fallback = StreamConfig {
                    buffer_size: BufferSize::Default,
                    ..fixed
                };
                self.build_for_format(format, &fallback)?
            }
        };
        self.stream = Some(stream);
        self.shared.store(PcmState::Setup);

        debug!(
            "'{}': {} {} Hz x{}, period {} frames, buffer {} frames",
            self.name, self.config.format, rate, channels, period_frames, buffer_frames
        );

        Ok(Negotiated {
            config: self.config,
            period_frames,
            buffer_frames,
        })
    }

    fn set_sw_params(&mut self, params: &SwParams) -> Result<(), DeviceError> {
        self.avail_min = params.avail_min.max(1);
        self.xfer_min = params.xfer_min.max(1);
        Ok(())
    }

    fn write_interleaved(&mut self, data: &[u8], frames: usize) -> Result<usize, TransferError> {
        let count = self.writable_frames(frames)?;
        let bytes = count * self.frame_bytes();
        self.scratch.clear();
        self.scratch.extend_from_slice(&data[..bytes]);
        self.push_bytes(bytes)
    }

    fn write_noninterleaved(
        &mut self,
        channels: &[&[u8]],
        frames: usize,
    ) -> Result<usize, TransferError> {
        let count = self.writable_frames(frames)?;
        let bytes = count * self.frame_bytes();
        interleave(
            channels,
            self.config.format.sample_bytes(),
            count,
            &mut self.scratch,
        );
        self.push_bytes(bytes)
    }

    fn read_interleaved(
        &mut self,
        data: &mut [u8],
        frames: usize,
    ) -> Result<usize, TransferError> {
        let count = self.readable_frames(frames)?;
        let bytes = count * self.frame_bytes();
        self.pop_bytes(&mut data[..bytes])?;
        Ok(count)
    }

    fn read_noninterleaved(
        &mut self,
        channels: &mut [&mut [u8]],
        frames: usize,
    ) -> Result<usize, TransferError> {
        let count = self.readable_frames(frames)?;
        let bytes = count * self.frame_bytes();
        let mut scratch = std::mem::take(&mut self.scratch);
        scratch.resize(bytes, 0);
        let popped = self.pop_bytes(&mut scratch);
        if popped.is_ok() {
            deinterleave(&scratch, self.config.format.sample_bytes(), count, channels);
        }
        self.scratch = scratch;
        popped.map(|()| count)
    }

    fn wait(&mut self, timeout: Duration) -> Result<(), DeviceError> {
        self.block_until_ready(usize::MAX, timeout);
        Ok(())
    }

    fn status(&self) -> Result<PcmStatus, DeviceError> {
        let trigger = *self
            .shared
            .trigger
            .lock()
            .map_err(|e| DeviceError::Failed(e.to_string()))?;
        Ok(PcmStatus {
            state: self.shared.load(),
            trigger,
        })
    }

    fn prepare(&mut self) -> Result<(), DeviceError> {
        if self.stream.is_none() {
            return Err(DeviceError::Failed("PCM is not configured".into()));
        }
        if let Ring::Capture(consumer) = &mut self.ring {
            let stale = consumer.slots();
            if let Ok(chunk) = consumer.read_chunk(stale) {
                chunk.commit_all();
            }
        }
        self.shared.store(PcmState::Prepared);
        Ok(())
    }

    fn drain(&mut self) -> Result<(), DeviceError> {
        let Some(stream) = &self.stream else {
            return Ok(());
        };

        if self.direction == Direction::Playback && self.shared.load() == PcmState::Running {
            self.shared.store(PcmState::Draining);
            let queued_frames = self.capacity / self.frame_bytes();
            let budget = Duration::from_micros(micros_for_frames(self.config.rate, queued_frames))
                + BLOCK_TIMEOUT;
            let deadline = Instant::now() + budget;
            while self.ring.slots() < self.capacity && Instant::now() < deadline {
                thread::sleep(POLL_INTERVAL);
            }
            // the last callback buffer is still in flight once the ring is empty
            thread::sleep(Duration::from_micros(micros_for_frames(
                self.config.rate,
                self.period_frames,
            )));
        }

        stream
            .pause()
            .map_err(|e| DeviceError::Failed(e.to_string()))?;
        self.shared.store(PcmState::Setup);
        Ok(())
    }
}
