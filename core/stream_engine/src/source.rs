use std::io::{self, Read, Seek, SeekFrom, Write};

/// Reads until `buf` is full or the source hits end of file.
///
/// Returns how many bytes landed in `buf`; fewer than `buf.len()` means EOF.
pub fn read_full<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Any byte source the player can take input from.
pub trait InputSource: Read + Seek {}

impl<T: Read + Seek> InputSource for T {}

/// Wraps a pipe-like reader so that every seek fails.
#[derive(Debug)]
pub struct NonSeekable<R>(pub R);

impl<R: Read> Read for NonSeekable<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf)
    }
}

impl<R> Seek for NonSeekable<R> {
    fn seek(&mut self, _pos: SeekFrom) -> io::Result<u64> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "illegal seek on a stream",
        ))
    }
}

impl<W: Write> Write for NonSeekable<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}
