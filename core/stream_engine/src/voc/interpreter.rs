use std::io::{Read, Seek, SeekFrom, Write};

use log::{debug, warn};
use pcm_params::{HardwareConfig, SampleFormat, hw::DEFAULT_RATE};

use super::block::{
    self, BLOCK_HEADER_LEN, BlockHeader, MODE_STEREO, REPEAT_FOREVER, TERMINATOR, VocBlock,
};
use crate::{
    device::PcmEndpoint,
    error::{Result, StreamError},
    session::DeviceSession,
    source::read_full,
};

const WINDOW_CAPACITY: usize = 64 * 1024;
/// Below this many buffered bytes the window is topped up before the next
/// step, so a block header and its fixed fields are always in memory.
const REFILL_THRESHOLD: usize = 32;

/// Bytes read from the file but not yet interpreted.
#[derive(Debug)]
struct Window {
    buf: Vec<u8>,
    start: usize,
    capacity: usize,
}

impl Window {
    fn new(initial: Vec<u8>) -> Self {
        Self {
            capacity: WINDOW_CAPACITY.max(initial.len()),
            buf: initial,
            start: 0,
        }
    }

    fn len(&self) -> usize {
        self.buf.len() - self.start
    }

    fn bytes(&self) -> &[u8] {
        &self.buf[self.start..]
    }

    fn consume(&mut self, n: usize) {
        self.start = (self.start + n).min(self.buf.len());
    }

    fn clear(&mut self) {
        self.buf.clear();
        self.start = 0;
    }

    fn refill<R: Read + ?Sized>(&mut self, source: &mut R) -> std::io::Result<usize> {
        self.buf.drain(..self.start);
        self.start = 0;
        let have = self.buf.len();
        self.buf.resize(self.capacity, 0);
        let got = read_full(source, &mut self.buf[have..])?;
        self.buf.truncate(have + got);
        Ok(got)
    }
}

/// Loop bookkeeping for repeat blocks.
#[derive(Debug, Default)]
struct Repeat {
    /// File offset of the first byte after the repeat-start block.
    point: Option<u64>,
    count: u16,
    /// Set once a seek has failed; later repeat blocks are ignored.
    disabled: bool,
}

enum Step {
    Continue,
    Halt,
}

/// Plays the block stream of a voice file.
///
/// `lookahead` holds the bytes already read past the file header. Control
/// blocks reconfigure the session as they arrive; audio is staged into the
/// session's period buffer and written a period at a time. ASCII text goes
/// to `text`, or nowhere when it is `None`.
pub fn play_voc<E, R>(
    session: &mut DeviceSession<E>,
    source: &mut R,
    name: &str,
    lookahead: Vec<u8>,
    text: Option<&mut dyn Write>,
) -> Result<()>
where
    E: PcmEndpoint,
    R: Read + Seek + ?Sized,
{
    VocInterpreter {
        session,
        source,
        name,
        text,
        window: Window::new(lookahead),
        block_remaining: 0,
        repeat: Repeat::default(),
        pending_extended: None,
        text_output: false,
        staged: 0,
        configured: false,
        channels: 1,
    }
    .run()
}

struct VocInterpreter<'a, 'w, E, R: ?Sized> {
    session: &'a mut DeviceSession<E>,
    source: &'a mut R,
    name: &'a str,
    text: Option<&'a mut (dyn Write + 'w)>,
    window: Window,
    /// Payload bytes left in the current block.
    block_remaining: u64,
    repeat: Repeat,
    /// Rate and channel count announced by an extended block, applied by
    /// the next voice-data block.
    pending_extended: Option<(u32, u32)>,
    /// Payload of the current block is text, not audio.
    text_output: bool,
    /// Bytes sitting in the session buffer that have not been written yet.
    staged: usize,
    configured: bool,
    channels: u32,
}

impl<E, R> VocInterpreter<'_, '_, E, R>
where
    E: PcmEndpoint,
    R: Read + Seek + ?Sized,
{
    fn run(mut self) -> Result<()> {
        loop {
            if self.window.len() < REFILL_THRESHOLD {
                self.window
                    .refill(self.source)
                    .map_err(|e| StreamError::io(self.name, e))?;
            }

            if self.block_remaining == 0 {
                match self.next_block()? {
                    Step::Continue => continue,
                    Step::Halt => break,
                }
            }

            let n = self.block_remaining.min(self.window.len() as u64) as usize;
            if n == 0 {
                debug!("{}: truncated block, stopping", self.name);
                break;
            }
            self.payload(n)?;
        }
        self.finish()
    }

    /// Reads and dispatches one block header.
    fn next_block(&mut self) -> Result<Step> {
        if self.text_output {
            self.text_output = false;
            self.write_text(b"\n")?;
        }

        // a truncated stream ends like a terminator
        match self.window.bytes().first() {
            None => return Ok(Step::Halt),
            Some(&TERMINATOR) => {
                self.window.consume(1);
                return Ok(Step::Halt);
            }
            Some(_) => {}
        }
        if self.window.len() < BLOCK_HEADER_LEN {
            return Ok(Step::Halt);
        }

        let header = BlockHeader::parse(self.window.bytes());
        let fixed = header.fixed_len().ok_or_else(|| {
            StreamError::protocol(format!("unknown blocktype {}. terminate.", header.tag))
        })?;
        if self.window.len() < BLOCK_HEADER_LEN + fixed {
            return Ok(Step::Halt);
        }
        let block = VocBlock::decode(
            header,
            &self.window.bytes()[BLOCK_HEADER_LEN..BLOCK_HEADER_LEN + fixed],
        )?;
        self.window.consume(BLOCK_HEADER_LEN + fixed);
        self.block_remaining = u64::from(header.len).saturating_sub(fixed as u64);

        self.dispatch(block)
    }

    fn dispatch(&mut self, block: VocBlock) -> Result<Step> {
        match block {
            VocBlock::Terminator => return Ok(Step::Halt),
            VocBlock::VoiceData { rate_code, pack } => {
                if pack != 0 {
                    return Err(StreamError::protocol("can't play packed .voc files"));
                }
                let (rate, channels) = self
                    .pending_extended
                    .take()
                    .unwrap_or((block::voice_rate(rate_code), 1));
                self.reconfigure(rate, channels)?;
            }
            VocBlock::Continuation => {}
            VocBlock::Silence { frames, rate_code } => {
                self.reconfigure(block::voice_rate(rate_code), self.channels)?;
                debug!(
                    "silence for {} ms",
                    u64::from(frames) * 1000 / u64::from(self.session.config().rate)
                );
                self.write_silence(usize::from(frames))?;
            }
            VocBlock::Marker(id) => debug!("marker {id}"),
            VocBlock::AsciiText => self.text_output = true,
            VocBlock::RepeatStart { count } => self.start_repeat(count),
            VocBlock::RepeatEnd => self.end_repeat()?,
            VocBlock::ExtendedStereo {
                time_constant,
                pack,
                mode,
            } => {
                if pack != 0 {
                    return Err(StreamError::protocol("can't play packed .voc files"));
                }
                let stereo = mode == MODE_STEREO;
                let rate = block::extended_rate(time_constant, stereo);
                self.pending_extended = Some((rate, if stereo { 2 } else { 1 }));
                debug!(
                    "extended block {} {rate} Hz",
                    if stereo { "Stereo" } else { "Mono" }
                );
            }
        }
        Ok(Step::Continue)
    }

    fn start_repeat(&mut self, count: u16) {
        if self.repeat.disabled {
            self.repeat.count = 0;
            return;
        }
        match self.source.stream_position() {
            Ok(position) => {
                self.repeat.point = Some(position.saturating_sub(self.window.len() as u64));
                self.repeat.count = count;
                debug!("repeat loop {count} times");
            }
            Err(_) => {
                warn!("can't play loops; {} isn't seekable", self.name);
                self.repeat.disabled = true;
                self.repeat.count = 0;
            }
        }
    }

    fn end_repeat(&mut self) -> Result<()> {
        if self.repeat.count == 0 {
            return Ok(());
        }
        let Some(point) = self.repeat.point else {
            return Ok(());
        };
        if self.repeat.count != REPEAT_FOREVER {
            self.repeat.count -= 1;
        }
        self.source
            .seek(SeekFrom::Start(point))
            .map_err(|e| StreamError::io(self.name, e))?;
        self.window.clear();
        self.block_remaining = 0;
        Ok(())
    }

    /// Writes out whatever is staged, then renegotiates the device.
    fn reconfigure(&mut self, rate: u32, channels: u32) -> Result<()> {
        self.flush_staged()?;
        self.session
            .configure(HardwareConfig::new(SampleFormat::U8, channels, rate))?;
        self.channels = channels;
        self.configured = true;
        Ok(())
    }

    fn payload(&mut self, n: usize) -> Result<()> {
        if self.text_output {
            let text = self.window.bytes()[..n].to_vec();
            self.write_text(&text)?;
            self.window.consume(n);
        } else {
            if !self.configured {
                self.reconfigure(DEFAULT_RATE, 1)?;
            }
            self.stage_from_window(n)?;
        }
        self.block_remaining -= n as u64;
        Ok(())
    }

    fn write_text(&mut self, bytes: &[u8]) -> Result<()> {
        match self.text.as_mut() {
            Some(text) => text
                .write_all(bytes)
                .map_err(|e| StreamError::io("stderr", e)),
            None => Ok(()),
        }
    }

    fn stage_from_window(&mut self, mut n: usize) -> Result<()> {
        while n > 0 {
            let period_bytes = self.session.period_bytes();
            let take = n.min(period_bytes - self.staged);
            let staged = self.staged;
            self.session.buffer_mut()[staged..staged + take]
                .copy_from_slice(&self.window.bytes()[..take]);
            self.window.consume(take);
            n -= take;
            self.commit(take)?;
        }
        Ok(())
    }

    fn write_silence(&mut self, frames: usize) -> Result<()> {
        let format = self.session.config().format;
        let mut bytes = frames * self.session.config().frame_bytes();
        while bytes > 0 {
            let take = bytes.min(self.session.period_bytes() - self.staged);
            let staged = self.staged;
            format.fill_silence(&mut self.session.buffer_mut()[staged..staged + take]);
            bytes -= take;
            self.commit(take)?;
        }
        Ok(())
    }

    /// Accounts for `n` newly staged bytes, writing the period once full.
    fn commit(&mut self, n: usize) -> Result<()> {
        self.staged += n;
        if self.staged == self.session.period_bytes() {
            let frames = self.session.period_frames();
            self.session.write(frames)?;
            self.staged = 0;
        }
        Ok(())
    }

    /// Writes the staged partial period; a trailing partial frame is lost.
    fn flush_staged(&mut self) -> Result<()> {
        if self.staged > 0 {
            let frames = self.staged / self.session.config().frame_bytes().max(1);
            if frames > 0 {
                self.session.write(frames)?;
            }
            self.staged = 0;
        }
        Ok(())
    }

    fn finish(mut self) -> Result<()> {
        if self.text_output {
            self.write_text(b"\n")?;
        }
        if !self.configured {
            return Ok(());
        }
        self.flush_staged()?;
        self.session.drain()
    }
}
