//! OLED camera FFI - C Foreign Function Interface
//!
//! Lets the existing C firmware (SPI panel driver, GPIO, UART) host the
//! Rust pipeline. The firmware supplies callbacks for presenting a buffer
//! and reading the button; Rust owns threads, buffers and pacing.
//!
//! Status codes: `0` is success, negative values are `OLEDCAM_ERR_*`.
//! No panic crosses the boundary.

use oledcam_video::{
    convert_frame, pack_rgb565, shared_sink, yuv_to_rgb, DisplayBuffer, DisplaySession,
    DisplaySink, Frame, Geometry, PoolError, SessionError, SessionExit, SinkError, SourceError,
    VideoConfig,
};
use std::ffi::CStr;
use std::os::raw::{c_char, c_int, c_void};
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::ptr;
use std::time::Duration;

mod controller_ffi;
pub use controller_ffi::*;

pub const OLEDCAM_OK: c_int = 0;
pub const OLEDCAM_ERR_NULL: c_int = -1;
pub const OLEDCAM_ERR_INVALID: c_int = -2;
pub const OLEDCAM_ERR_ACTIVE: c_int = -3;
pub const OLEDCAM_ERR_SOURCE: c_int = -4;
pub const OLEDCAM_ERR_TRANSPORT: c_int = -5;
pub const OLEDCAM_ERR_ALLOC: c_int = -6;
pub const OLEDCAM_ERR_SPAWN: c_int = -7;
pub const OLEDCAM_ERR_SINK: c_int = -8;
pub const OLEDCAM_ERR_PANIC: c_int = -9;

/// Opaque handle to a display session (C-compatible)
pub struct OledcamSession {
    _private: [u8; 0],
}

/// Present `len` bytes of big-endian RGB565 to the panel; non-zero is an error
pub type OledcamPresentFn =
    unsafe extern "C" fn(user: *mut c_void, data: *const u8, len: usize) -> c_int;

/// C-compatible mirror of `VideoConfig`
#[repr(C)]
pub struct CVideoConfig {
    pub width: u32,
    pub height: u32,
    pub fps_num: u32,
    pub fps_den: u32,
    /// NUL-terminated FIFO path, or NULL for the default
    pub stream_path: *const c_char,
    pub fifo_mode: u32,
    /// Core to pin the pacing worker to, or -1
    pub worker_core: c_int,
    pub parallel_conversion: bool,
}

/// Fill `out` with the library defaults
///
/// # Safety
/// `out` must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn oledcam_video_config_default(out: *mut CVideoConfig) -> c_int {
    if out.is_null() {
        return OLEDCAM_ERR_NULL;
    }
    let d = VideoConfig::default();
    out.write(CVideoConfig {
        width: d.geometry.width(),
        height: d.geometry.height(),
        fps_num: d.fps_num,
        fps_den: d.fps_den,
        stream_path: ptr::null(),
        fifo_mode: d.fifo_mode,
        worker_core: -1,
        parallel_conversion: d.parallel_conversion,
    });
    OLEDCAM_OK
}

pub(crate) unsafe fn path_arg(path: *const c_char) -> Option<PathBuf> {
    if path.is_null() {
        return None;
    }
    CStr::from_ptr(path).to_str().ok().map(PathBuf::from)
}

/// Convert a C config, `None` for bad geometry, rate or path
pub(crate) unsafe fn video_config_from_c(config: *const CVideoConfig) -> Option<VideoConfig> {
    let mut video = VideoConfig::default();
    if config.is_null() {
        return Some(video);
    }
    let c = &*config;

    video.geometry = Geometry::new(c.width, c.height).ok()?;
    video.fps_num = c.fps_num;
    video.fps_den = c.fps_den;
    video.fifo_mode = c.fifo_mode;
    video.worker_core = usize::try_from(c.worker_core).ok();
    video.parallel_conversion = c.parallel_conversion;
    if !c.stream_path.is_null() {
        video.stream_path = path_arg(c.stream_path)?;
    }
    video.validate().ok()?;
    Some(video)
}

/// Raw pointer carried into worker threads; the C side owns its lifetime
pub(crate) struct UserData(pub(crate) *mut c_void);

// SAFETY: the caller promises the pointee may be used from the session
// and controller threads for as long as the handle lives
unsafe impl Send for UserData {}

/// Display sink forwarding buffers to a C callback
pub(crate) struct CallbackSink {
    present: OledcamPresentFn,
    user: UserData,
}

impl CallbackSink {
    pub(crate) fn new(present: OledcamPresentFn, user: *mut c_void) -> Self {
        Self {
            present,
            user: UserData(user),
        }
    }
}

impl DisplaySink for CallbackSink {
    fn present(&mut self, buffer: &DisplayBuffer) -> Result<(), SinkError> {
        let bytes = buffer.as_bytes();
        // SAFETY: the slice is valid for the duration of the call
        let rc = unsafe { (self.present)(self.user.0, bytes.as_ptr(), bytes.len()) };
        if rc == 0 {
            Ok(())
        } else {
            Err(SinkError::Transfer(rc))
        }
    }
}

pub(crate) fn session_status(err: &SessionError) -> c_int {
    match err {
        SessionError::AlreadyActive => OLEDCAM_ERR_ACTIVE,
        SessionError::Config(_) => OLEDCAM_ERR_INVALID,
        SessionError::Pool(_) => OLEDCAM_ERR_ALLOC,
        SessionError::Source(_) => OLEDCAM_ERR_SOURCE,
        SessionError::Transport(_) => OLEDCAM_ERR_TRANSPORT,
        SessionError::Spawn(_) => OLEDCAM_ERR_SPAWN,
    }
}

pub(crate) fn exit_status(exit: &SessionExit) -> c_int {
    match exit {
        SessionExit::Stopped => OLEDCAM_OK,
        SessionExit::StartAborted(_) | SessionExit::SourceFailed(_) => OLEDCAM_ERR_SOURCE,
        SessionExit::SinkFailed(_) => OLEDCAM_ERR_SINK,
        SessionExit::Conversion(_) => OLEDCAM_ERR_INVALID,
        SessionExit::Pool(_) => OLEDCAM_ERR_ALLOC,
        SessionExit::Panicked => OLEDCAM_ERR_PANIC,
    }
}

/// Run `f`, turning a panic into `OLEDCAM_ERR_PANIC`
pub(crate) fn guard<F: FnOnce() -> c_int>(f: F) -> c_int {
    panic::catch_unwind(AssertUnwindSafe(f)).unwrap_or(OLEDCAM_ERR_PANIC)
}

// ============================================================================
// DISPLAY SESSION API
// ============================================================================

/// Create a session presenting through `present`
///
/// Returns NULL on invalid configuration or a missing callback.
///
/// # Safety
/// `config` must be NULL or valid. `user` must stay valid, and `present`
/// callable from the session thread, until the session is destroyed.
#[no_mangle]
pub unsafe extern "C" fn oledcam_session_create(
    config: *const CVideoConfig,
    present: Option<OledcamPresentFn>,
    user: *mut c_void,
) -> *mut OledcamSession {
    let Some(present) = present else {
        return ptr::null_mut();
    };
    let Some(video) = video_config_from_c(config) else {
        return ptr::null_mut();
    };

    let session = Box::new(DisplaySession::new(
        video,
        shared_sink(CallbackSink::new(present, user)),
    ));
    Box::into_raw(session) as *mut OledcamSession
}

/// Stop (joining the worker) and free the session
///
/// # Safety
/// Caller must ensure ptr is valid and not already freed.
#[no_mangle]
pub unsafe extern "C" fn oledcam_session_destroy(ptr: *mut OledcamSession) {
    if !ptr.is_null() {
        let session = Box::from_raw(ptr as *mut DisplaySession);
        guard(move || {
            drop(session);
            OLEDCAM_OK
        });
    }
}

/// Loop a raw YUV 4:2:0 recording
///
/// # Safety
/// Caller must ensure ptr and path are valid.
#[no_mangle]
pub unsafe extern "C" fn oledcam_session_start_file(
    ptr: *mut OledcamSession,
    path: *const c_char,
) -> c_int {
    if ptr.is_null() || path.is_null() {
        return OLEDCAM_ERR_NULL;
    }
    let Some(path) = path_arg(path) else {
        return OLEDCAM_ERR_INVALID;
    };
    let session = &mut *(ptr as *mut DisplaySession);
    guard(|| match session.start_file(&path) {
        Ok(()) => OLEDCAM_OK,
        Err(e) => session_status(&e),
    })
}

/// Play the live stream from the configured FIFO
///
/// Returns once the worker is running; the FIFO open happens on the worker.
///
/// # Safety
/// Caller must ensure ptr is valid.
#[no_mangle]
pub unsafe extern "C" fn oledcam_session_start_stream(ptr: *mut OledcamSession) -> c_int {
    if ptr.is_null() {
        return OLEDCAM_ERR_NULL;
    }
    let session = &mut *(ptr as *mut DisplaySession);
    guard(|| match session.start_stream() {
        Ok(()) => OLEDCAM_OK,
        Err(e) => session_status(&e),
    })
}

/// Stop and join; returns the status of how the session ended
///
/// Safe to call on a session that never started.
///
/// # Safety
/// Caller must ensure ptr is valid.
#[no_mangle]
pub unsafe extern "C" fn oledcam_session_stop(ptr: *mut OledcamSession) -> c_int {
    if ptr.is_null() {
        return OLEDCAM_ERR_NULL;
    }
    let session = &mut *(ptr as *mut DisplaySession);
    guard(|| match session.stop() {
        Some(report) => exit_status(&report.exit),
        None => OLEDCAM_OK,
    })
}

/// # Safety
/// Caller must ensure ptr is valid.
#[no_mangle]
pub unsafe extern "C" fn oledcam_session_is_active(ptr: *const OledcamSession) -> c_int {
    if ptr.is_null() {
        return 0;
    }
    let session = &*(ptr as *const DisplaySession);
    c_int::from(session.is_active())
}

/// Block until the first frame is on the panel; 1 if it arrived in time
///
/// # Safety
/// Caller must ensure ptr is valid.
#[no_mangle]
pub unsafe extern "C" fn oledcam_session_wait_streaming(
    ptr: *const OledcamSession,
    timeout_ms: u32,
) -> c_int {
    if ptr.is_null() {
        return 0;
    }
    let session = &*(ptr as *const DisplaySession);
    c_int::from(session.wait_until_streaming(Duration::from_millis(u64::from(timeout_ms))))
}

/// # Safety
/// Caller must ensure ptr is valid.
#[no_mangle]
pub unsafe extern "C" fn oledcam_session_frames_presented(ptr: *const OledcamSession) -> u64 {
    if ptr.is_null() {
        return 0;
    }
    let session = &*(ptr as *const DisplaySession);
    session.stats().frames_presented
}

/// # Safety
/// Caller must ensure ptr is valid.
#[no_mangle]
pub unsafe extern "C" fn oledcam_session_late_frames(ptr: *const OledcamSession) -> u64 {
    if ptr.is_null() {
        return 0;
    }
    let session = &*(ptr as *const DisplaySession);
    session.stats().late_frames
}

// ============================================================================
// FORMAT CONVERSION API
// ============================================================================

/// Convert one YUV sample to 8-bit RGB
///
/// # Safety
/// Output pointers must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn oledcam_yuv420_to_rgb(
    y: u8,
    u: u8,
    v: u8,
    r: *mut u8,
    g: *mut u8,
    b: *mut u8,
) -> c_int {
    if r.is_null() || g.is_null() || b.is_null() {
        return OLEDCAM_ERR_NULL;
    }
    let (rr, gg, bb) = yuv_to_rgb(y, u, v);
    r.write(rr);
    g.write(gg);
    b.write(bb);
    OLEDCAM_OK
}

/// Pack 8-bit RGB into RGB565
#[no_mangle]
pub extern "C" fn oledcam_rgb565(r: u8, g: u8, b: u8) -> u16 {
    pack_rgb565(r, g, b)
}

/// Convert a whole YUV 4:2:0 frame into a big-endian RGB565 buffer
///
/// `yuv_len` must be exactly `width*height*3/2` and `out_len`
/// `width*height*2`.
///
/// # Safety
/// Caller must ensure the buffers are valid for the given lengths.
#[no_mangle]
pub unsafe extern "C" fn oledcam_convert_frame(
    yuv: *const u8,
    yuv_len: usize,
    width: u32,
    height: u32,
    out: *mut u8,
    out_len: usize,
) -> c_int {
    if yuv.is_null() || out.is_null() {
        return OLEDCAM_ERR_NULL;
    }
    let Ok(geometry) = Geometry::new(width, height) else {
        return OLEDCAM_ERR_INVALID;
    };
    if out_len != geometry.display_buffer_size() {
        return OLEDCAM_ERR_INVALID;
    }

    let input = std::slice::from_raw_parts(yuv, yuv_len);
    let frame = match Frame::new(input, geometry) {
        Ok(frame) => frame,
        Err(SourceError::ShortRead { .. }) => return OLEDCAM_ERR_INVALID,
        Err(_) => return OLEDCAM_ERR_SOURCE,
    };
    let mut buffer = match DisplayBuffer::try_new(geometry) {
        Ok(buffer) => buffer,
        Err(PoolError::Allocation { .. }) => return OLEDCAM_ERR_ALLOC,
        Err(_) => return OLEDCAM_ERR_INVALID,
    };
    if convert_frame(&frame, &mut buffer, false).is_err() {
        return OLEDCAM_ERR_INVALID;
    }

    let output = std::slice::from_raw_parts_mut(out, out_len);
    output.copy_from_slice(buffer.as_bytes());
    OLEDCAM_OK
}

// ============================================================================
// UTILITY FUNCTIONS
// ============================================================================

/// Get library version string
#[no_mangle]
pub extern "C" fn oledcam_version() -> *const c_char {
    concat!(env!("CARGO_PKG_VERSION"), "\0").as_ptr() as *const c_char
}
