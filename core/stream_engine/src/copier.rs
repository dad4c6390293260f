//! Whole-file and per-channel transfer loops between byte streams and a
//! [`DeviceSession`].

use std::io::{self, Read, Write};

use pcm_params::{limit::StreamCounters, timing::XrunMode};

use crate::{
    device::PcmEndpoint,
    error::{Result, StreamError},
    session::DeviceSession,
    source::read_full,
};

/// Moves up to `out.len()` bytes from the front of `pending`.
fn take_pending(pending: &mut Vec<u8>, out: &mut [u8]) -> usize {
    let n = pending.len().min(out.len());
    out[..n].copy_from_slice(&pending[..n]);
    pending.drain(..n);
    n
}

/// Reads into `buf` the way the current xrun mode wants: fragment mode keeps
/// reading until the buffer is full, asap mode takes what one read returns.
/// Returns the byte count and whether the source hit end of file.
fn fill_from<R: Read + ?Sized>(
    source: &mut R,
    buf: &mut [u8],
    mode: XrunMode,
) -> io::Result<(usize, bool)> {
    if buf.is_empty() {
        return Ok((0, false));
    }
    match mode {
        XrunMode::Fragment => {
            let n = read_full(source, buf)?;
            Ok((n, n < buf.len()))
        }
        XrunMode::Asap => loop {
            match source.read(buf) {
                Ok(n) => return Ok((n, n == 0)),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        },
    }
}

/// Plays `source` until it runs dry or `budget` bytes have gone out.
///
/// `lookahead` holds payload bytes already read while detecting the
/// container. A trailing partial frame is carried into the next refill and
/// dropped only at end of file. Drains the device before returning.
pub fn playback_run<E: PcmEndpoint, R: Read + ?Sized>(
    session: &mut DeviceSession<E>,
    source: &mut R,
    name: &str,
    lookahead: &[u8],
    budget: u64,
) -> Result<StreamCounters> {
    let mut counters = StreamCounters::new(budget);
    let mut pending = lookahead.to_vec();
    let frame_bytes = session.config().frame_bytes();
    let mode = session.settings().xrun;

    while !counters.is_exhausted() {
        let want = counters.remaining().min(session.period_bytes() as u64) as usize;
        let buf = &mut session.buffer_mut()[..want];

        let mut filled = take_pending(&mut pending, buf);
        let mut eof = false;
        if filled < want && (filled < frame_bytes || mode == XrunMode::Fragment) {
            let (n, hit_eof) =
                fill_from(source, &mut buf[filled..], mode).map_err(|e| StreamError::io(name, e))?;
            filled += n;
            eof = hit_eof;
        }

        let frames = filled / frame_bytes;
        if frames > 0 {
            session.write(frames)?;
            counters.consume((frames * frame_bytes) as u64);
        }

        let used = frames * frame_bytes;
        if used < filled {
            let leftover = session.buffer()[used..filled].to_vec();
            pending.splice(0..0, leftover);
        }
        if eof || (frames == 0 && filled == want) {
            break;
        }
    }

    session.drain()?;
    Ok(counters)
}

/// Records into `sink` until `budget` bytes have been captured.
pub fn capture_run<E: PcmEndpoint, W: Write + ?Sized>(
    session: &mut DeviceSession<E>,
    sink: &mut W,
    name: &str,
    budget: u64,
) -> Result<StreamCounters> {
    let mut counters = StreamCounters::new(budget);
    let frame_bytes = session.config().frame_bytes() as u64;

    while !counters.is_exhausted() {
        let frames = (counters.remaining() / frame_bytes).min(session.period_frames() as u64);
        if frames == 0 {
            break;
        }
        let read = session.read(frames as usize)?;
        let bytes = read * frame_bytes as usize;
        sink.write_all(&session.buffer()[..bytes])
            .map_err(|e| StreamError::io(name, e))?;
        counters.consume(bytes as u64);
    }

    sink.flush().map_err(|e| StreamError::io(name, e))?;
    Ok(counters)
}

/// Plays one source per channel. Every channel must deliver the same number
/// of bytes per refill; a channel file that runs short is fatal. A trailing
/// partial sample at end of file is dropped.
pub fn playback_multi<E: PcmEndpoint, R: Read>(
    session: &mut DeviceSession<E>,
    sources: &mut [R],
    names: &[String],
    budget: u64,
) -> Result<StreamCounters> {
    let mut counters = StreamCounters::new(budget);
    let config = *session.config();
    let channels = config.channels as usize;
    let sample_bytes = config.format.sample_bytes();
    let mode = session.settings().xrun;
    if sources.len() != channels {
        return Err(StreamError::format(format!(
            "You need to specify {channels} files"
        )));
    }

    while !counters.is_exhausted() {
        let per_channel = session.period_bytes() / channels;
        let expected = (counters.remaining() / channels as u64).min(per_channel as u64) as usize;
        let expected = expected - expected % sample_bytes;
        if expected == 0 {
            break;
        }

        let mut buffers = session.channel_buffers_mut();
        let mut filled = 0;
        loop {
            let (first, rest) = buffers.split_at_mut(1);
            let (n, eof) = fill_from(&mut sources[0], &mut first[0][filled..expected], mode)
                .map_err(|e| StreamError::io(&names[0], e))?;
            for (index, buf) in rest.iter_mut().enumerate() {
                let channel = index + 1;
                let got = read_full(&mut sources[channel], &mut buf[filled..filled + n])
                    .map_err(|e| StreamError::io(&names[channel], e))?;
                if got != n {
                    return Err(StreamError::io(
                        &names[channel],
                        io::Error::new(
                            io::ErrorKind::UnexpectedEof,
                            "channel file shorter than the first channel",
                        ),
                    ));
                }
            }
            filled += n;
            // frame mode still completes a sample cut in half by a short read
            let whole_sample = filled % sample_bytes == 0;
            if eof || filled >= expected || (mode == XrunMode::Asap && whole_sample) {
                break;
            }
        }

        let frames = filled / sample_bytes;
        if frames == 0 {
            break;
        }
        session.write_multi(frames)?;
        counters.consume((frames * sample_bytes * channels) as u64);
        if filled < expected && mode == XrunMode::Fragment {
            break;
        }
    }

    session.drain()?;
    Ok(counters)
}

/// Records into one sink per channel.
pub fn capture_multi<E: PcmEndpoint, W: Write>(
    session: &mut DeviceSession<E>,
    sinks: &mut [W],
    names: &[String],
    budget: u64,
) -> Result<StreamCounters> {
    let mut counters = StreamCounters::new(budget);
    let config = *session.config();
    let channels = config.channels as usize;
    let sample_bytes = config.format.sample_bytes();
    let frame_bytes = config.frame_bytes() as u64;
    if sinks.len() != channels {
        return Err(StreamError::format(format!(
            "You need to specify {channels} files"
        )));
    }

    while !counters.is_exhausted() {
        let frames = (counters.remaining() / frame_bytes).min(session.period_frames() as u64);
        if frames == 0 {
            break;
        }
        let read = session.read_multi(frames as usize)?;
        let bytes = read * sample_bytes;
        let buffers = session.channel_buffers_mut();
        for ((sink, buf), name) in sinks.iter_mut().zip(&buffers).zip(names) {
            sink.write_all(&buf[..bytes])
                .map_err(|e| StreamError::io(name, e))?;
        }
        counters.consume(read as u64 * frame_bytes);
    }

    for (sink, name) in sinks.iter_mut().zip(names) {
        sink.flush().map_err(|e| StreamError::io(name, e))?;
    }
    Ok(counters)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use pcm_params::{HardwareConfig, SampleFormat, limit::UNLIMITED_BYTES};

    use super::*;
    use crate::{
        device::mock::ScriptedEndpoint,
        session::SessionSettings,
    };

    fn settings(xrun: XrunMode) -> SessionSettings {
        SessionSettings {
            xrun,
            ..SessionSettings::default()
        }
    }

    fn playback(
        period: usize,
        config: HardwareConfig,
        xrun: XrunMode,
    ) -> DeviceSession<ScriptedEndpoint> {
        let mut session = DeviceSession::new(ScriptedEndpoint::playback(period), settings(xrun));
        session.configure(config).unwrap();
        session
    }

    #[test]
    fn test_playback_uses_lookahead_then_source() {
        let mut session = playback(4, HardwareConfig::default(), XrunMode::Asap);
        let mut source = Cursor::new(vec![5u8, 6, 7, 8, 9]);
        let counters =
            playback_run(&mut session, &mut source, "in", &[1, 2, 3, 4], UNLIMITED_BYTES).unwrap();

        assert_eq!(counters.transferred(), 9);
        let endpoint = session.into_endpoint();
        assert_eq!(endpoint.played, (1..=9).collect::<Vec<u8>>());
        assert_eq!(endpoint.drains, 1);
    }

    #[test]
    fn test_playback_stops_at_budget() {
        let mut session = playback(8, HardwareConfig::default(), XrunMode::Asap);
        let mut source = Cursor::new(vec![1u8; 100]);
        let counters = playback_run(&mut session, &mut source, "in", &[], 20).unwrap();
        assert_eq!(counters.transferred(), 20);
        assert_eq!(session.endpoint().played.len(), 20);
    }

    #[test]
    fn test_partial_frame_is_carried_not_lost() {
        // lookahead ends mid-frame: 3 bytes of 16-bit mono
        let config = HardwareConfig::new(SampleFormat::S16Le, 1, 8000);
        let mut session = playback(4, config, XrunMode::Asap);
        let mut source = Cursor::new(vec![4u8, 5, 6, 7, 8]);
        playback_run(&mut session, &mut source, "in", &[1, 2, 3], UNLIMITED_BYTES).unwrap();
        assert_eq!(session.endpoint().played, (1..=8).collect::<Vec<u8>>());
    }

    #[test]
    fn test_fragment_mode_pads_last_period() {
        let mut session = playback(4, HardwareConfig::default(), XrunMode::Fragment);
        let mut source = Cursor::new(vec![1u8, 2, 3, 4, 5, 6]);
        let counters =
            playback_run(&mut session, &mut source, "in", &[], UNLIMITED_BYTES).unwrap();
        assert_eq!(counters.transferred(), 6);
        assert_eq!(
            session.endpoint().played,
            vec![1, 2, 3, 4, 5, 6, 0x80, 0x80]
        );
    }

    #[test]
    fn test_capture_writes_exact_budget() {
        let data: Vec<u8> = (0..50).collect();
        let endpoint = ScriptedEndpoint::capture(8, data.clone());
        let mut session = DeviceSession::new(endpoint, settings(XrunMode::Asap));
        session.configure(HardwareConfig::default()).unwrap();

        let mut sink = Vec::new();
        let counters = capture_run(&mut session, &mut sink, "out", 21).unwrap();
        assert_eq!(counters.transferred(), 21);
        assert_eq!(sink, data[..21]);
    }

    #[test]
    fn test_playback_then_capture_preserves_length() {
        for format in [SampleFormat::U8, SampleFormat::S16Le, SampleFormat::S32Le] {
            let config = HardwareConfig::new(format, 2, 8000);
            let frame_bytes = config.frame_bytes();
            let source: Vec<u8> = (0..(8000 * frame_bytes / 10 + 3))
                .map(|i| (i % 251) as u8)
                .collect();

            let mut out = playback(64, config, XrunMode::Asap);
            playback_run(&mut out, &mut Cursor::new(source.clone()), "in", &[], UNLIMITED_BYTES)
                .unwrap();
            let played = out.into_endpoint().played;

            let endpoint = ScriptedEndpoint::capture(64, played.clone());
            let mut session = DeviceSession::new(endpoint, settings(XrunMode::Asap));
            session.configure(config).unwrap();
            let mut sink = Vec::new();
            capture_run(&mut session, &mut sink, "out", played.len() as u64).unwrap();

            assert!(source.len() - sink.len() < frame_bytes);
            assert_eq!(sink, source[..sink.len()]);
        }
    }

    #[test]
    fn test_playback_multi_interleaves_channel_files() {
        let config = HardwareConfig::new(SampleFormat::U8, 2, 8000);
        let mut session = playback(4, config, XrunMode::Asap);
        let mut sources = vec![
            Cursor::new(vec![1u8, 2, 3, 4, 5, 6]),
            Cursor::new(vec![11u8, 12, 13, 14, 15, 16]),
        ];
        let names = vec!["a.0".to_owned(), "a.1".to_owned()];
        let counters =
            playback_multi(&mut session, &mut sources, &names, UNLIMITED_BYTES).unwrap();

        assert_eq!(counters.transferred(), 12);
        assert_eq!(
            session.endpoint().played,
            vec![1, 11, 2, 12, 3, 13, 4, 14, 5, 15, 6, 16]
        );
    }

    /// Hands out at most `step` bytes per read.
    struct Trickle {
        data: Cursor<Vec<u8>>,
        step: usize,
    }

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let len = buf.len().min(self.step);
            self.data.read(&mut buf[..len])
        }
    }

    #[test]
    fn test_playback_multi_completes_samples_split_by_short_reads() {
        let config = HardwareConfig::new(SampleFormat::S16Le, 2, 8000);
        let mut session = playback(4, config, XrunMode::Asap);
        let mut sources = vec![
            Trickle {
                data: Cursor::new((1..=8).collect()),
                step: 3,
            },
            Trickle {
                data: Cursor::new((11..=18).collect()),
                step: 8,
            },
        ];
        let names = vec!["s.0".to_owned(), "s.1".to_owned()];
        let counters =
            playback_multi(&mut session, &mut sources, &names, UNLIMITED_BYTES).unwrap();

        assert_eq!(counters.transferred(), 16);
        assert_eq!(
            session.endpoint().played,
            vec![1, 2, 11, 12, 3, 4, 13, 14, 5, 6, 15, 16, 7, 8, 17, 18]
        );
    }

    #[test]
    fn test_playback_multi_rejects_short_channel_file() {
        let config = HardwareConfig::new(SampleFormat::U8, 2, 8000);
        let mut session = playback(4, config, XrunMode::Fragment);
        let mut sources = vec![
            Cursor::new(vec![1u8, 2, 3, 4, 5, 6]),
            Cursor::new(vec![11u8, 12, 13]),
        ];
        let names = vec!["a.0".to_owned(), "a.1".to_owned()];
        let err = playback_multi(&mut session, &mut sources, &names, UNLIMITED_BYTES).unwrap_err();
        assert!(matches!(err, StreamError::Io { ref path, .. } if path == "a.1"));
    }

    #[test]
    fn test_capture_multi_splits_channels() {
        let config = HardwareConfig::new(SampleFormat::U8, 2, 8000);
        let endpoint = ScriptedEndpoint::capture(4, vec![1, 11, 2, 12, 3, 13]);
        let mut session = DeviceSession::new(endpoint, settings(XrunMode::Asap));
        session.configure(config).unwrap();

        let mut sinks = vec![Vec::new(), Vec::new()];
        let names = vec!["b.0".to_owned(), "b.1".to_owned()];
        capture_multi(&mut session, &mut sinks, &names, 6).unwrap();
        assert_eq!(sinks[0], vec![1, 2, 3]);
        assert_eq!(sinks[1], vec![11, 12, 13]);
    }
}
