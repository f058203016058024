//! Mode controller C API
//!
//! The firmware's `main` creates one controller, hands it the panel and
//! button callbacks, and calls `oledcam_controller_run` on its own thread.

use crate::{
    guard, path_arg, session_status, video_config_from_c, CVideoConfig, CallbackSink,
    OledcamPresentFn, UserData, OLEDCAM_ERR_INVALID, OLEDCAM_ERR_NULL, OLEDCAM_ERR_SINK,
    OLEDCAM_ERR_SOURCE, OLEDCAM_OK,
};
use oledcam_control::{
    CameraFeed, CameraProducer, ControlError, ControllerConfig, DebounceConfig, GestureConfig,
    InputPin, LibcameraConfig, LibcameraProducer, Level, Mode, ModeController, NoopProducer,
    PinError, PollingDebouncer,
};
use oledcam_nav::{
    parse_battery_line, BatteryMonitor, NavConfig, NavError, NavigationScreen, RouteFile,
    TelemetryHub,
};
use oledcam_video::{shared_sink, DisplaySession, VideoConfig};
use parking_lot::Mutex;
use std::ffi::CStr;
use std::os::raw::{c_char, c_int, c_void};
use std::ptr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Read the button line: 0 low, 1 high, negative on error
pub type OledcamPinFn = unsafe extern "C" fn(user: *mut c_void) -> c_int;

/// Opaque handle to a mode controller (C-compatible)
pub struct OledcamController {
    _private: [u8; 0],
}

/// C-compatible controller configuration
#[repr(C)]
pub struct CControllerConfig {
    pub video: CVideoConfig,
    /// Route CSV, or NULL for the default
    pub route_csv: *const c_char,
    /// Recording to loop in camera mode, or NULL for the live stream
    pub clip_path: *const c_char,
    /// Launch `libcamera-vid` into the FIFO when camera mode starts
    pub spawn_camera: bool,
    pub camera_dwell_ms: u32,
    pub debounce_samples: u32,
    pub debounce_interval_us: u32,
    pub active_high: bool,
    pub min_hold_ms: u32,
    pub restart_on_failure: bool,
    pub start_in_camera: bool,
}

/// Button read through a C callback
struct CallbackPin {
    read: OledcamPinFn,
    user: UserData,
}

impl InputPin for CallbackPin {
    fn read(&mut self) -> Result<Level, PinError> {
        // SAFETY: the caller of `oledcam_controller_create` vouches for the callback
        match unsafe { (self.read)(self.user.0) } {
            rc if rc < 0 => Err(PinError::Backend(rc)),
            rc => Ok(Level::from_bool(rc != 0)),
        }
    }
}

type Controller = ModeController<CallbackPin, PollingDebouncer, Box<dyn CameraProducer>>;

struct ControllerHandle {
    running: Arc<AtomicBool>,
    hub: TelemetryHub,
    nav: NavConfig,
    monitor: Mutex<Option<BatteryMonitor>>,
    inner: Mutex<Controller>,
}

impl Drop for ControllerHandle {
    fn drop(&mut self) {
        if let Some(mut monitor) = self.monitor.lock().take() {
            // A reader blocked on a quiet port would never join; leave it detached
            if monitor.is_finished() {
                monitor.shutdown();
            }
        }
    }
}

/// Fill `out` with the library defaults
///
/// # Safety
/// `out` must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn oledcam_controller_config_default(out: *mut CControllerConfig) -> c_int {
    if out.is_null() {
        return OLEDCAM_ERR_NULL;
    }
    let mut video = std::mem::MaybeUninit::<CVideoConfig>::uninit();
    crate::oledcam_video_config_default(video.as_mut_ptr());

    let d = ControllerConfig::default();
    out.write(CControllerConfig {
        video: video.assume_init(),
        route_csv: ptr::null(),
        clip_path: ptr::null(),
        spawn_camera: true,
        camera_dwell_ms: u32::try_from(d.camera_dwell.as_millis()).unwrap_or(u32::MAX),
        debounce_samples: d.debounce.samples,
        debounce_interval_us: u32::try_from(d.debounce.interval.as_micros()).unwrap_or(u32::MAX),
        active_high: d.debounce.active_level == Level::High,
        min_hold_ms: u32::try_from(d.gesture.min_hold.as_millis()).unwrap_or(u32::MAX),
        restart_on_failure: d.restart_stream_on_failure,
        start_in_camera: d.initial_mode == Mode::Camera,
    });
    OLEDCAM_OK
}

unsafe fn controller_config_from_c(c: &CControllerConfig) -> Option<ControllerConfig> {
    let feed = if c.clip_path.is_null() {
        CameraFeed::Stream
    } else {
        CameraFeed::File(path_arg(c.clip_path)?)
    };

    Some(ControllerConfig {
        debounce: DebounceConfig {
            samples: c.debounce_samples,
            interval: Duration::from_micros(u64::from(c.debounce_interval_us)),
            active_level: Level::from_bool(c.active_high),
        },
        gesture: GestureConfig {
            min_hold: Duration::from_millis(u64::from(c.min_hold_ms)),
        },
        camera_dwell: Duration::from_millis(u64::from(c.camera_dwell_ms)),
        restart_stream_on_failure: c.restart_on_failure,
        initial_mode: if c.start_in_camera {
            Mode::Camera
        } else {
            Mode::Navigation
        },
        feed,
        ..ControllerConfig::default()
    })
}

/// Camera arguments for the panel geometry; libcamera takes a whole rate of
/// at least one frame per second
fn camera_config(video: &VideoConfig) -> LibcameraConfig {
    LibcameraConfig {
        width: video.geometry.width(),
        height: video.geometry.height(),
        framerate: (video.fps_num / video.fps_den.max(1)).max(1),
        ..LibcameraConfig::default()
    }
}

fn control_status(err: &ControlError) -> c_int {
    match err {
        ControlError::Pin(_) => OLEDCAM_ERR_SOURCE,
        ControlError::Session(e) => session_status(e),
        ControlError::Nav(NavError::Display(_)) => OLEDCAM_ERR_SINK,
        ControlError::Nav(_) => OLEDCAM_ERR_INVALID,
    }
}

/// Create a controller driving the panel through `present` and reading the
/// button through `read_pin`; both receive `user`
///
/// Returns NULL on invalid configuration or missing callbacks.
///
/// # Safety
/// `config` must be NULL or valid. `user` must stay valid, and both
/// callbacks callable from any thread, until the controller is destroyed.
#[no_mangle]
pub unsafe extern "C" fn oledcam_controller_create(
    config: *const CControllerConfig,
    present: Option<OledcamPresentFn>,
    read_pin: Option<OledcamPinFn>,
    user: *mut c_void,
) -> *mut OledcamController {
    let (Some(present), Some(read_pin)) = (present, read_pin) else {
        return ptr::null_mut();
    };

    let mut defaults = std::mem::MaybeUninit::<CControllerConfig>::uninit();
    let c = if config.is_null() {
        oledcam_controller_config_default(defaults.as_mut_ptr());
        defaults.assume_init_ref()
    } else {
        &*config
    };

    let Some(video) = video_config_from_c(&c.video) else {
        return ptr::null_mut();
    };
    let Some(control) = controller_config_from_c(c) else {
        return ptr::null_mut();
    };
    let mut nav = NavConfig::default();
    if !c.route_csv.is_null() {
        match path_arg(c.route_csv) {
            Some(path) => nav = nav.with_route_csv(path),
            None => return ptr::null_mut(),
        }
    }
    if let Err(e) = nav.validate() {
        log::error!("Rejected navigation config: {}", e);
        return ptr::null_mut();
    }

    let sink = shared_sink(CallbackSink::new(present, user));
    let hub = TelemetryHub::new();
    let screen = match NavigationScreen::new(
        video.geometry,
        RouteFile::new(nav.route_csv.clone()),
        hub.clone(),
        sink.clone(),
    ) {
        Ok(screen) => screen,
        Err(e) => {
            log::error!("Failed to create navigation screen: {}", e);
            return ptr::null_mut();
        }
    };

    let producer: Box<dyn CameraProducer> = if c.spawn_camera {
        Box::new(LibcameraProducer::new(camera_config(&video)))
    } else {
        Box::new(NoopProducer::default())
    };

    let debouncer = PollingDebouncer::new(control.debounce);
    let pin = CallbackPin {
        read: read_pin,
        user: UserData(user),
    };
    let controller = ModeController::new(
        control,
        pin,
        debouncer,
        DisplaySession::new(video, sink),
        screen,
        producer,
    );

    let handle = Box::new(ControllerHandle {
        running: controller.shutdown_flag(),
        hub,
        nav,
        monitor: Mutex::new(None),
        inner: Mutex::new(controller),
    });
    Box::into_raw(handle) as *mut OledcamController
}

/// Run the mode loop on the calling thread until
/// `oledcam_controller_request_stop`
///
/// # Safety
/// Caller must ensure ptr is valid for the whole call.
#[no_mangle]
pub unsafe extern "C" fn oledcam_controller_run(ptr: *mut OledcamController) -> c_int {
    if ptr.is_null() {
        return OLEDCAM_ERR_NULL;
    }
    let handle = &*(ptr as *const ControllerHandle);
    guard(|| match handle.inner.lock().run() {
        Ok(()) => OLEDCAM_OK,
        Err(e) => {
            log::error!("Mode controller failed: {}", e);
            control_status(&e)
        }
    })
}

/// Ask a running controller to return; callable from any thread
///
/// # Safety
/// Caller must ensure ptr is valid.
#[no_mangle]
pub unsafe extern "C" fn oledcam_controller_request_stop(ptr: *const OledcamController) {
    if !ptr.is_null() {
        let handle = &*(ptr as *const ControllerHandle);
        handle.running.store(false, Ordering::Relaxed);
    }
}

/// Publish a battery voltage read by the firmware's own UART handling
///
/// # Safety
/// Caller must ensure ptr is valid.
#[no_mangle]
pub unsafe extern "C" fn oledcam_controller_publish_battery(
    ptr: *const OledcamController,
    voltage: f32,
) -> c_int {
    if ptr.is_null() {
        return OLEDCAM_ERR_NULL;
    }
    if !voltage.is_finite() {
        return OLEDCAM_ERR_INVALID;
    }
    let handle = &*(ptr as *const ControllerHandle);
    handle.hub.publish_battery(handle.nav.battery.reading(voltage));
    OLEDCAM_OK
}

/// Start a background reader for `Battery Voltage:` lines on a serial
/// device (NULL for the default port), replacing any previous one
///
/// # Safety
/// Caller must ensure ptr is valid and path is NULL or a valid C string.
#[no_mangle]
pub unsafe extern "C" fn oledcam_controller_attach_battery_port(
    ptr: *const OledcamController,
    path: *const c_char,
) -> c_int {
    if ptr.is_null() {
        return OLEDCAM_ERR_NULL;
    }
    let handle = &*(ptr as *const ControllerHandle);
    let port = if path.is_null() {
        handle.nav.serial_port.clone()
    } else {
        match path_arg(path) {
            Some(port) => port,
            None => return OLEDCAM_ERR_INVALID,
        }
    };

    guard(|| match BatteryMonitor::open(&port, handle.nav.battery, handle.hub.clone()) {
        Ok(monitor) => {
            if let Some(mut previous) = handle.monitor.lock().replace(monitor) {
                if previous.is_finished() {
                    previous.shutdown();
                }
            }
            OLEDCAM_OK
        }
        Err(e) => {
            log::error!("Failed to open battery port {}: {}", port.display(), e);
            OLEDCAM_ERR_SOURCE
        }
    })
}

/// Publish a raw `Battery Voltage: <v> V` gauge line
///
/// # Safety
/// Caller must ensure ptr and line are valid.
#[no_mangle]
pub unsafe extern "C" fn oledcam_controller_publish_battery_line(
    ptr: *const OledcamController,
    line: *const c_char,
) -> c_int {
    if ptr.is_null() || line.is_null() {
        return OLEDCAM_ERR_NULL;
    }
    let Ok(line) = CStr::from_ptr(line).to_str() else {
        return OLEDCAM_ERR_INVALID;
    };
    match parse_battery_line(line) {
        Ok(voltage) => oledcam_controller_publish_battery(ptr, voltage),
        Err(_) => OLEDCAM_ERR_INVALID,
    }
}

/// Free a controller that is not running
///
/// # Safety
/// Caller must ensure ptr is valid, not already freed, and that
/// `oledcam_controller_run` has returned.
#[no_mangle]
pub unsafe extern "C" fn oledcam_controller_destroy(ptr: *mut OledcamController) {
    if !ptr.is_null() {
        let handle = Box::from_raw(ptr as *mut ControllerHandle);
        guard(move || {
            drop(handle);
            OLEDCAM_OK
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    struct Board {
        frames: AtomicUsize,
        pin_reads: AtomicUsize,
    }

    unsafe extern "C" fn present(user: *mut c_void, _data: *const u8, _len: usize) -> c_int {
        let board = &*(user as *const Board);
        board.frames.fetch_add(1, Ordering::SeqCst);
        0
    }

    unsafe extern "C" fn released(user: *mut c_void) -> c_int {
        let board = &*(user as *const Board);
        board.pin_reads.fetch_add(1, Ordering::SeqCst);
        0
    }

    unsafe extern "C" fn broken_pin(_user: *mut c_void) -> c_int {
        -3
    }

    fn test_config(route: &CString) -> CControllerConfig {
        let mut config = unsafe {
            let mut c = std::mem::MaybeUninit::<CControllerConfig>::uninit();
            assert_eq!(oledcam_controller_config_default(c.as_mut_ptr()), OLEDCAM_OK);
            c.assume_init()
        };
        config.video.width = 32;
        config.video.height = 32;
        config.route_csv = route.as_ptr();
        config.spawn_camera = false;
        config.debounce_samples = 2;
        config.debounce_interval_us = 0;
        config
    }

    #[test]
    fn test_default_config() {
        let config = unsafe {
            let mut c = std::mem::MaybeUninit::<CControllerConfig>::uninit();
            oledcam_controller_config_default(c.as_mut_ptr());
            c.assume_init()
        };
        assert_eq!(config.camera_dwell_ms, 300_000);
        assert_eq!(config.debounce_samples, 10);
        assert_eq!(config.debounce_interval_us, 1000);
        assert!(config.active_high);
        assert!(!config.start_in_camera);
        assert!(config.clip_path.is_null());
    }

    #[test]
    fn test_camera_rate_never_zero() {
        let slow = VideoConfig::default().with_fps(1, 2);
        assert_eq!(camera_config(&slow).framerate, 1);

        let ntsc = VideoConfig::default().with_fps(30000, 1001);
        let camera = camera_config(&ntsc);
        assert_eq!(camera.framerate, 29);
        assert_eq!((camera.width, camera.height), (128, 128));
    }

    #[test]
    fn test_create_requires_callbacks() {
        let route = CString::new("/nonexistent/route.csv").unwrap();
        let config = test_config(&route);
        unsafe {
            assert!(oledcam_controller_create(&config, Some(present), None, ptr::null_mut())
                .is_null());
            assert!(oledcam_controller_create(&config, None, Some(released), ptr::null_mut())
                .is_null());
        }
    }

    #[test]
    #[serial_test::serial]
    fn test_run_until_stop_requested() {
        let dir = tempfile::tempdir().unwrap();
        let route = dir.path().join("route.csv");
        std::fs::write(
            &route,
            "step_ID,routeState,street_name,distance,maneuverID,arrival_time,currentTemp,currentWeather,instructions\n\
             3,NAVIGATING,Main St,200 m,2,12:30,21C,Sun,Turn right\n",
        )
        .unwrap();
        let route = CString::new(route.to_str().unwrap()).unwrap();
        let config = test_config(&route);

        let board = Box::new(Board {
            frames: AtomicUsize::new(0),
            pin_reads: AtomicUsize::new(0),
        });
        let user = &*board as *const Board as *mut c_void;

        unsafe {
            let controller =
                oledcam_controller_create(&config, Some(present), Some(released), user);
            assert!(!controller.is_null());
            assert_eq!(oledcam_controller_publish_battery(controller, 3.7), OLEDCAM_OK);
            let line = CString::new("Battery Voltage: 3.2 V").unwrap();
            assert_eq!(
                oledcam_controller_publish_battery_line(controller, line.as_ptr()),
                OLEDCAM_OK
            );
            let junk = CString::new("hello").unwrap();
            assert_eq!(
                oledcam_controller_publish_battery_line(controller, junk.as_ptr()),
                OLEDCAM_ERR_INVALID
            );

            let addr = controller as usize;
            let runner = thread::spawn(move || {
                // SAFETY: the handle outlives the join below
                unsafe { oledcam_controller_run(addr as *mut OledcamController) }
            });

            let deadline = std::time::Instant::now() + Duration::from_secs(5);
            while board.frames.load(Ordering::SeqCst) < 3 && std::time::Instant::now() < deadline {
                thread::sleep(Duration::from_millis(10));
            }
            oledcam_controller_request_stop(controller);
            assert_eq!(runner.join().unwrap(), OLEDCAM_OK);
            oledcam_controller_destroy(controller);
        }

        assert!(board.frames.load(Ordering::SeqCst) >= 3);
        assert!(board.pin_reads.load(Ordering::SeqCst) >= 2);
    }

    #[test]
    fn test_attach_battery_port() {
        let dir = tempfile::tempdir().unwrap();
        let port = dir.path().join("ttyS0");
        std::fs::write(&port, "Battery Voltage: 3.25 V\n").unwrap();
        let c_port = CString::new(port.to_str().unwrap()).unwrap();
        let missing = CString::new(dir.path().join("absent").to_str().unwrap()).unwrap();
        let route = CString::new("/nonexistent/route.csv").unwrap();
        let config = test_config(&route);

        unsafe {
            let controller = oledcam_controller_create(
                &config,
                Some(present_nothing),
                Some(broken_pin),
                ptr::null_mut(),
            );
            assert_eq!(
                oledcam_controller_attach_battery_port(controller, missing.as_ptr()),
                OLEDCAM_ERR_SOURCE
            );
            assert_eq!(
                oledcam_controller_attach_battery_port(controller, c_port.as_ptr()),
                OLEDCAM_OK
            );

            let handle = &*(controller as *const ControllerHandle);
            let deadline = std::time::Instant::now() + Duration::from_secs(2);
            while handle.hub.snapshot().battery.is_none() && std::time::Instant::now() < deadline {
                thread::sleep(Duration::from_millis(5));
            }
            let battery = handle.hub.snapshot().battery.unwrap();
            assert!(battery.low);
            oledcam_controller_destroy(controller);
        }
    }

    #[test]
    #[serial_test::serial]
    fn test_pin_failure_ends_run() {
        let route = CString::new("/nonexistent/route.csv").unwrap();
        let config = test_config(&route);
        unsafe {
            let controller =
                oledcam_controller_create(&config, Some(present_nothing), Some(broken_pin), ptr::null_mut());
            assert!(!controller.is_null());
            assert_eq!(oledcam_controller_run(controller), OLEDCAM_ERR_SOURCE);
            oledcam_controller_destroy(controller);
        }
    }

    unsafe extern "C" fn present_nothing(_user: *mut c_void, _data: *const u8, _len: usize) -> c_int {
        0
    }
}
