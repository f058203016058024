//! Raw frame sources
//!
//! Frames carry no header; boundaries are implied by the fixed frame size.
//! A source owns one frame-sized read buffer for its whole life and lends
//! it out through [`Frame`].

use crate::error::SourceError;
use crate::types::{Frame, Geometry, SourceKind};
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

/// Something that yields complete raw frames
pub trait FrameSource: Send {
    /// Block until a full frame is available
    fn next_frame(&mut self) -> Result<Frame<'_>, SourceError>;

    fn kind(&self) -> SourceKind;

    fn geometry(&self) -> Geometry;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn next_frame(&mut self) -> Result<Frame<'_>, SourceError> {
        (**self).next_frame()
    }

    fn kind(&self) -> SourceKind {
        (**self).kind()
    }

    fn geometry(&self) -> Geometry {
        (**self).geometry()
    }
}

/// Read until `buf` is full or the reader reports EOF
///
/// Returns the number of bytes placed in `buf`. Interrupted reads are retried.
pub(crate) fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        match reader.read(&mut buf[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(total)
}

fn frame_buffer(geometry: Geometry) -> Vec<u8> {
    vec![0u8; geometry.frame_size()]
}

/// Pre-recorded frames played back in an endless loop
pub struct FileLoopSource<R = File> {
    reader: R,
    geometry: Geometry,
    buf: Vec<u8>,
    rewinds: u64,
}

impl FileLoopSource<File> {
    /// Open a recording; a missing file or one shorter than a frame is fatal
    pub fn open(path: impl AsRef<Path>, geometry: Geometry) -> Result<Self, SourceError> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        let expected = geometry.frame_size();
        if len < expected as u64 {
            return Err(SourceError::ShortRead {
                expected,
                received: len as usize,
            });
        }
        log::debug!(
            "Opened {} ({} frames of {} bytes)",
            path.display(),
            len / expected as u64,
            expected
        );
        Ok(Self::from_reader(file, geometry))
    }
}

impl<R: Read + Seek + Send> FileLoopSource<R> {
    pub fn from_reader(reader: R, geometry: Geometry) -> Self {
        Self {
            reader,
            geometry,
            buf: frame_buffer(geometry),
            rewinds: 0,
        }
    }

    /// Times playback has wrapped back to the first frame
    pub fn rewinds(&self) -> u64 {
        self.rewinds
    }
}

impl<R: Read + Seek + Send> FrameSource for FileLoopSource<R> {
    fn next_frame(&mut self) -> Result<Frame<'_>, SourceError> {
        let expected = self.buf.len();
        let mut got = read_full(&mut self.reader, &mut self.buf)?;

        if got < expected {
            // Trailing partial frame or EOF: wrap and retry once
            self.reader.seek(SeekFrom::Start(0))?;
            self.rewinds += 1;
            log::debug!("End of recording, rewinding (loop {})", self.rewinds);

            got = read_full(&mut self.reader, &mut self.buf)?;
            if got < expected {
                return Err(SourceError::ShortRead {
                    expected,
                    received: got,
                });
            }
        }

        Frame::new(&self.buf, self.geometry)
    }

    fn kind(&self) -> SourceKind {
        SourceKind::File
    }

    fn geometry(&self) -> Geometry {
        self.geometry
    }
}

/// Live frames from a single producer over a FIFO
///
/// Partial reads are accumulated until a full frame is present. A producer
/// that goes away ends the stream; there is no resynchronisation.
pub struct StreamSource<R = File> {
    reader: R,
    geometry: Geometry,
    buf: Vec<u8>,
    frames: u64,
}

impl StreamSource<File> {
    /// Open the FIFO for reading
    ///
    /// Blocks until a writer opens the other end.
    pub fn open_fifo(path: impl AsRef<Path>, geometry: Geometry) -> Result<Self, SourceError> {
        let path = path.as_ref();
        log::info!("Opening pipe: {}", path.display());
        let file = File::open(path)?;
        log::info!("Pipe opened: {}", path.display());
        Ok(Self::from_reader(file, geometry))
    }
}

impl<R: Read + Send> StreamSource<R> {
    pub fn from_reader(reader: R, geometry: Geometry) -> Self {
        Self {
            reader,
            geometry,
            buf: frame_buffer(geometry),
            frames: 0,
        }
    }

    /// Complete frames received so far
    pub fn frames_received(&self) -> u64 {
        self.frames
    }
}

impl<R: Read + Send> FrameSource for StreamSource<R> {
    fn next_frame(&mut self) -> Result<Frame<'_>, SourceError> {
        let expected = self.buf.len();
        let got = read_full(&mut self.reader, &mut self.buf)?;

        if got == 0 {
            log::info!("Pipe closed by writer after {} frames", self.frames);
            return Err(SourceError::EndOfStream);
        }
        if got < expected {
            log::warn!("Incomplete frame ({}/{} bytes)", got, expected);
            return Err(SourceError::ShortRead {
                expected,
                received: got,
            });
        }

        self.frames += 1;
        Frame::new(&self.buf, self.geometry)
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Stream
    }

    fn geometry(&self) -> Geometry {
        self.geometry
    }
}
