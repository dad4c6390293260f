//! Top-level play and record flows, one file (or one set of per-channel
//! files) at a time.

use std::{
    fs::File,
    io::{self, Read, Seek, Write},
};

use log::{debug, info};
use pcm_params::{
    HardwareConfig,
    limit::{byte_budget, even_for_wave},
};

use crate::{
    config::{STDIO_NAME, StreamOptions},
    copier::{capture_multi, capture_run, playback_multi, playback_run},
    device::{Direction, PcmEndpoint},
    error::{Result, StreamError},
    header::{ContainerHeader, ContainerKind, Detected, detect},
    session::DeviceSession,
    source::{InputSource, NonSeekable},
    voc::play_voc,
};

/// AU writers that do not know the final length put all ones here.
const AU_UNKNOWN_SIZE: u64 = 0xffff_ffff;

fn announce(direction: Direction, kind: ContainerKind, name: &str, config: &HardwareConfig) {
    info!(
        "{} {} '{}' : {}, Rate {} Hz, {}",
        direction.verb(),
        kind.what(),
        name,
        config.format.description(),
        config.rate,
        config.channel_label()
    );
}

/// Runs every file named in `options` through one session.
pub fn run<E: PcmEndpoint>(endpoint: E, options: &StreamOptions) -> Result<()> {
    let mut session = DeviceSession::new(endpoint, options.session_settings());

    if options.separate_channels {
        return match options.direction {
            Direction::Playback => play_channels(&mut session, options),
            Direction::Capture => record_channels(&mut session, options),
        };
    }

    for name in options.file_names() {
        match options.direction {
            Direction::Playback => play_file(&mut session, options, &name)?,
            Direction::Capture => record_file(&mut session, options, &name)?,
        }
    }
    Ok(())
}

/// Plays one file, or stdin for `-`.
pub fn play_file<E: PcmEndpoint>(
    session: &mut DeviceSession<E>,
    options: &StreamOptions,
    name: &str,
) -> Result<()> {
    let mut source: Box<dyn InputSource> = if name == STDIO_NAME {
        Box::new(NonSeekable(io::stdin().lock()))
    } else {
        Box::new(File::open(name).map_err(|e| StreamError::io(name, e))?)
    };
    play_source(session, options, source.as_mut(), name)
}

/// Detects the container of `source` and plays its payload.
///
/// A forced raw file type skips detection; any other type is detected from
/// the data itself.
pub fn play_source<E, R>(
    session: &mut DeviceSession<E>,
    options: &StreamOptions,
    source: &mut R,
    name: &str,
) -> Result<()>
where
    E: PcmEndpoint,
    R: Read + Seek + ?Sized,
{
    let Detected { header, lookahead } = match options.file_type {
        Some(ContainerKind::Raw) => Detected {
            header: ContainerHeader::Raw,
            lookahead: Vec::new(),
        },
        _ => detect(source, name)?,
    };

    if let ContainerHeader::Voc(voc) = header {
        info!("Playing Creative Labs Channel file '{name}'...");
        debug!("Version {}.{}", voc.major(), voc.minor());
        let mut stderr = io::stderr();
        let text = (!options.quiet).then_some(&mut stderr as &mut dyn Write);
        return play_voc(session, source, name, lookahead, text);
    }

    let requested = header.config().unwrap_or(options.config);
    announce(Direction::Playback, header.kind(), name, &requested);
    let config = session.configure(requested)?;

    let mut budget = byte_budget(&config, options.duration);
    if let Some(declared) = header.payload_len()
        && !(header.kind() == ContainerKind::Au && declared == AU_UNKNOWN_SIZE)
    {
        budget = budget.min(declared);
    }
    let counters = playback_run(session, source, name, &lookahead, budget)?;
    debug!("{name}: {} bytes played", counters.transferred());
    Ok(())
}

/// Records into a new file, or stdout for `-`.
pub fn record_file<E: PcmEndpoint>(
    session: &mut DeviceSession<E>,
    options: &StreamOptions,
    name: &str,
) -> Result<()> {
    if name == STDIO_NAME {
        let mut stdout = io::stdout().lock();
        return record_to(session, options, &mut stdout, name);
    }
    let mut file = File::create(name).map_err(|e| StreamError::io(name, e))?;
    record_to(session, options, &mut file, name)
}

/// Writes header, captured payload and trailer of the capture container.
///
/// The header carries the full duration budget up front; a capture that
/// ends early leaves it overstated.
pub fn record_to<E, W>(
    session: &mut DeviceSession<E>,
    options: &StreamOptions,
    sink: &mut W,
    name: &str,
) -> Result<()>
where
    E: PcmEndpoint,
    W: Write + ?Sized,
{
    let kind = options.capture_kind();
    announce(Direction::Capture, kind, name, &options.config);
    let config = session.configure(options.config)?;

    let mut budget = byte_budget(&config, options.duration);
    if kind == ContainerKind::Wave {
        budget = even_for_wave(&config, budget);
    }

    let writer = kind.writer();
    let header = writer.emit_header(&config, budget)?;
    sink.write_all(&header)
        .map_err(|e| StreamError::io(name, e))?;
    let counters = capture_run(session, sink, name, budget)?;
    sink.write_all(writer.trailer())
        .and_then(|()| sink.flush())
        .map_err(|e| StreamError::io(name, e))?;
    debug!("{name}: {} bytes recorded", counters.transferred());
    Ok(())
}

/// One file per channel: a single name expands to `name.0 .. name.N-1`,
/// otherwise there must be exactly one name per channel. Capture expands
/// even a mono name; playback reads a lone mono file as named.
pub fn channel_file_names(
    names: &[String],
    channels: u32,
    direction: Direction,
) -> Result<Vec<String>> {
    let expand = channels > 1 || direction == Direction::Capture;
    match names {
        [single] if expand => Ok((0..channels).map(|c| format!("{single}.{c}")).collect()),
        _ if names.len() == channels as usize => Ok(names.to_vec()),
        _ => Err(StreamError::format(format!(
            "You need to specify {channels} files"
        ))),
    }
}

pub fn play_channels<E: PcmEndpoint>(
    session: &mut DeviceSession<E>,
    options: &StreamOptions,
) -> Result<()> {
    let names = channel_file_names(
        &options.files,
        options.config.channels,
        Direction::Playback,
    )?;
    let mut sources = names
        .iter()
        .map(|name| File::open(name).map_err(|e| StreamError::io(name, e)))
        .collect::<Result<Vec<_>>>()?;

    announce(Direction::Playback, ContainerKind::Raw, &names[0], &options.config);
    let config = session.configure(options.config)?;
    playback_multi(
        session,
        &mut sources,
        &names,
        byte_budget(&config, options.duration),
    )?;
    Ok(())
}

pub fn record_channels<E: PcmEndpoint>(
    session: &mut DeviceSession<E>,
    options: &StreamOptions,
) -> Result<()> {
    let names = channel_file_names(
        &options.files,
        options.config.channels,
        Direction::Capture,
    )?;
    let mut sinks = names
        .iter()
        .map(|name| File::create(name).map_err(|e| StreamError::io(name, e)))
        .collect::<Result<Vec<_>>>()?;

    announce(Direction::Capture, ContainerKind::Raw, &names[0], &options.config);
    let config = session.configure(options.config)?;
    capture_multi(
        session,
        &mut sinks,
        &names,
        byte_budget(&config, options.duration),
    )?;
    Ok(())
}
