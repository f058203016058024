//! Frame and display buffer types

use crate::error::{PoolError, SourceError, VideoError};

/// Panel width of the 1.5" SPI OLED
pub const DEFAULT_WIDTH: u32 = 128;
/// Panel height of the 1.5" SPI OLED
pub const DEFAULT_HEIGHT: u32 = 128;

/// Pixel layouts handled by the pipeline
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    I420 = 1,   // Planar YUV 4:2:0 (wire format)
    Rgb565 = 2, // Packed 16-bit, big-endian (panel format)
}

impl PixelFormat {
    /// Returns number of planes for this format
    pub fn plane_count(self) -> usize {
        match self {
            PixelFormat::I420 => 3,
            PixelFormat::Rgb565 => 1,
        }
    }

    /// Check if format is planar
    pub fn is_planar(self) -> bool {
        self.plane_count() > 1
    }

    /// Calculate frame size in bytes
    pub fn calculate_size(self, width: u32, height: u32) -> usize {
        let pixels = width as usize * height as usize;
        match self {
            PixelFormat::I420 => {
                let uv_size = (width as usize / 2) * (height as usize / 2);
                pixels + uv_size * 2
            }
            PixelFormat::Rgb565 => pixels * 2,
        }
    }
}

/// Display and frame dimensions
///
/// Both dimensions are even so the quarter-resolution chroma planes tile the
/// luma plane exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    width: u32,
    height: u32,
}

impl Geometry {
    pub fn new(width: u32, height: u32) -> Result<Self, VideoError> {
        if width == 0 || height == 0 || width % 2 != 0 || height % 2 != 0 {
            return Err(VideoError::InvalidGeometry { width, height });
        }
        Ok(Self { width, height })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Bytes in one raw I420 frame (`W*H*3/2`)
    pub fn frame_size(&self) -> usize {
        PixelFormat::I420.calculate_size(self.width, self.height)
    }

    /// Bytes in one RGB565 display buffer (`W*H*2`)
    pub fn display_buffer_size(&self) -> usize {
        PixelFormat::Rgb565.calculate_size(self.width, self.height)
    }

    pub fn luma_size(&self) -> usize {
        self.pixel_count()
    }

    pub fn chroma_size(&self) -> usize {
        (self.width as usize / 2) * (self.height as usize / 2)
    }
}

impl Default for Geometry {
    fn default() -> Self {
        Self {
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
        }
    }
}

/// One complete raw I420 frame
///
/// Borrowed from the source's read buffer; a `Frame` can only be built from
/// exactly `frame_size` bytes, so a truncated read never reaches the
/// converter.
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    data: &'a [u8],
    geometry: Geometry,
}

impl<'a> Frame<'a> {
    pub fn new(data: &'a [u8], geometry: Geometry) -> Result<Self, SourceError> {
        let expected = geometry.frame_size();
        if data.len() != expected {
            return Err(SourceError::ShortRead {
                expected,
                received: data.len(),
            });
        }
        Ok(Self { data, geometry })
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    pub fn as_bytes(&self) -> &'a [u8] {
        self.data
    }

    /// Full-resolution luma plane
    pub fn y_plane(&self) -> &'a [u8] {
        &self.data[..self.geometry.luma_size()]
    }

    /// Quarter-resolution Cb plane
    pub fn u_plane(&self) -> &'a [u8] {
        let start = self.geometry.luma_size();
        &self.data[start..start + self.geometry.chroma_size()]
    }

    /// Quarter-resolution Cr plane
    pub fn v_plane(&self) -> &'a [u8] {
        let start = self.geometry.luma_size() + self.geometry.chroma_size();
        &self.data[start..start + self.geometry.chroma_size()]
    }
}

/// Row-major RGB565 pixels, two bytes per pixel, big-endian
pub struct DisplayBuffer {
    data: Vec<u8>,
    geometry: Geometry,
}

impl DisplayBuffer {
    /// Allocate a zeroed (black) buffer, reporting allocation failure
    pub fn try_new(geometry: Geometry) -> Result<Self, PoolError> {
        let bytes = geometry.display_buffer_size();
        let mut data = Vec::new();
        data.try_reserve_exact(bytes)
            .map_err(|_| PoolError::Allocation { bytes })?;
        data.resize(bytes, 0);
        Ok(Self { data, geometry })
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Read back one pixel; `None` outside the panel
    pub fn pixel(&self, row: u32, col: u32) -> Option<u16> {
        let pos = self.offset(row, col)?;
        Some(u16::from_be_bytes([self.data[pos], self.data[pos + 1]]))
    }

    /// Write one pixel; writes outside the panel are clipped
    pub fn set_pixel(&mut self, row: u32, col: u32, color: u16) {
        if let Some(pos) = self.offset(row, col) {
            self.data[pos..pos + 2].copy_from_slice(&color.to_be_bytes());
        }
    }

    pub fn fill(&mut self, color: u16) {
        let [hi, lo] = color.to_be_bytes();
        for px in self.data.chunks_exact_mut(2) {
            px[0] = hi;
            px[1] = lo;
        }
    }

    fn offset(&self, row: u32, col: u32) -> Option<usize> {
        if row >= self.geometry.height() || col >= self.geometry.width() {
            return None;
        }
        Some((row as usize * self.geometry.width() as usize + col as usize) * 2)
    }
}

impl std::fmt::Debug for DisplayBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DisplayBuffer")
            .field("geometry", &self.geometry)
            .field("bytes", &self.data.len())
            .finish()
    }
}

/// Which kind of source drives a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    File,
    Stream,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geometry_sizes() {
        let g = Geometry::default();
        assert_eq!(g.frame_size(), 128 * 128 * 3 / 2);
        assert_eq!(g.display_buffer_size(), 128 * 128 * 2);
        assert_eq!(g.luma_size() + 2 * g.chroma_size(), g.frame_size());
    }

    #[test]
    fn test_geometry_rejects_odd_and_zero() {
        assert!(Geometry::new(0, 128).is_err());
        assert!(Geometry::new(127, 128).is_err());
        assert!(Geometry::new(128, 3).is_err());
        assert!(Geometry::new(16, 8).is_ok());
    }

    #[test]
    fn test_frame_rejects_wrong_length() {
        let g = Geometry::new(4, 4).unwrap();
        let short = vec![0u8; g.frame_size() - 1];
        match Frame::new(&short, g) {
            Err(SourceError::ShortRead { expected, received }) => {
                assert_eq!(expected, 24);
                assert_eq!(received, 23);
            }
            other => panic!("expected ShortRead, got {:?}", other),
        }

        let long = vec![0u8; g.frame_size() + 1];
        assert!(Frame::new(&long, g).is_err());
    }

    #[test]
    fn test_frame_planes() {
        let g = Geometry::new(4, 2).unwrap();
        let data: Vec<u8> = (0..g.frame_size() as u8).collect();
        let frame = Frame::new(&data, g).unwrap();

        assert_eq!(frame.y_plane(), &[0, 1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(frame.u_plane(), &[8, 9]);
        assert_eq!(frame.v_plane(), &[10, 11]);
    }

    #[test]
    fn test_display_buffer_pixels_big_endian() {
        let g = Geometry::new(2, 2).unwrap();
        let mut buf = DisplayBuffer::try_new(g).unwrap();
        assert!(buf.as_bytes().iter().all(|&b| b == 0));

        buf.set_pixel(1, 0, 0xF800);
        assert_eq!(buf.pixel(1, 0), Some(0xF800));
        assert_eq!(&buf.as_bytes()[4..6], &[0xF8, 0x00]);

        // Clipped
        buf.set_pixel(2, 0, 0xFFFF);
        assert_eq!(buf.pixel(2, 0), None);

        buf.fill(0x1234);
        assert!(buf.as_bytes().chunks(2).all(|p| p == [0x12, 0x34]));
    }

    #[test]
    fn test_pixel_format() {
        assert_eq!(PixelFormat::I420.plane_count(), 3);
        assert!(PixelFormat::I420.is_planar());
        assert!(!PixelFormat::Rgb565.is_planar());
        assert_eq!(PixelFormat::Rgb565.calculate_size(128, 128), 32768);
    }
}
