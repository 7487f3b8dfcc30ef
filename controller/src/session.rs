/*!
Device session: ownership of the single driver handle.

[`DeviceSession`] initialises and shuts down the driver. While open it
hands out cheap [`SessionHandle`] clones that every other component
holds. All driver calls go through [`SessionHandle::lock`], which is the
one lock serialising access to the non-reentrant driver.
*/

use crate::acquisition::SessionState;
use crate::driver::{RawStatus, VendorApi};
use shared::{translate, AcquisitionConfig, DetectorGeometry, Outcome, StatusCode, TemperatureRange};
use std::ops::{Deref, DerefMut};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, error, info, warn};

/// Everything guarded by the session lock.
#[derive(Debug)]
pub(crate) struct SessionCore {
    pub(crate) open: bool,
    pub(crate) state: SessionState,
    /// Last configuration applied to the hardware
    pub(crate) config: AcquisitionConfig,
    pub(crate) geometry: Option<DetectorGeometry>,
    pub(crate) max_exposure_s: Option<f32>,
    /// Frames the driver can hold for one readout
    pub(crate) buffer_frames: Option<u32>,
    pub(crate) thermal_range: Option<TemperatureRange>,
    pub(crate) target_c: Option<i32>,
    pub(crate) cooler_enabled: bool,
    /// A thread is blocked in the driver wait with the lock released
    pub(crate) waiting: bool,
    /// Code of the hardware failure that put the cycle in `Error`
    pub(crate) last_failure: Option<StatusCode>,
}

impl SessionCore {
    fn new() -> Self {
        Self {
            open: false,
            state: SessionState::Idle,
            config: AcquisitionConfig::new(),
            geometry: None,
            max_exposure_s: None,
            buffer_frames: None,
            thermal_range: None,
            target_c: None,
            cooler_enabled: false,
            waiting: false,
            last_failure: None,
        }
    }
}

struct SessionInner {
    api: Arc<dyn VendorApi>,
    core: Mutex<SessionCore>,
    abort_requested: AtomicBool,
}

/// Shared handle to an open session.
#[derive(Clone)]
pub struct SessionHandle {
    inner: Arc<SessionInner>,
}

impl SessionHandle {
    fn new(api: Arc<dyn VendorApi>) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                api,
                core: Mutex::new(SessionCore::new()),
                abort_requested: AtomicBool::new(false),
            }),
        }
    }

    /// Take the driver lock. Blocks behind any call already in flight.
    pub(crate) fn lock(&self) -> SessionGuard<'_> {
        // A panic while holding the lock leaves the core consistent enough to
        // report from, so poisoning is not propagated.
        let core = self.inner.core.lock().unwrap_or_else(PoisonError::into_inner);
        SessionGuard {
            core,
            api: self.inner.api.as_ref(),
        }
    }

    /// Take the driver lock, failing with `NotOpen` once the session is closed.
    pub(crate) fn lock_open(&self) -> Result<SessionGuard<'_>, StatusCode> {
        let guard = self.lock();
        if !guard.open {
            return Err(StatusCode::NotOpen);
        }
        Ok(guard)
    }

    /// Driver access for the one call made without the lock held.
    pub(crate) fn unlocked_api(&self) -> Arc<dyn VendorApi> {
        Arc::clone(&self.inner.api)
    }

    pub(crate) fn request_abort(&self) {
        self.inner.abort_requested.store(true, Ordering::SeqCst);
    }

    pub(crate) fn clear_abort(&self) {
        self.inner.abort_requested.store(false, Ordering::SeqCst);
    }

    pub(crate) fn abort_requested(&self) -> bool {
        self.inner.abort_requested.load(Ordering::SeqCst)
    }

    pub fn is_open(&self) -> bool {
        self.lock().open
    }

    /// Current acquisition state.
    pub fn state(&self) -> SessionState {
        self.lock().state
    }

    /// Detector size read when the session was opened.
    pub fn detector_geometry(&self) -> Option<DetectorGeometry> {
        self.lock().geometry
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut out = f.debug_struct("SessionHandle");
        match self.inner.core.try_lock() {
            Ok(core) => out.field("core", &*core),
            Err(_) => out.field("core", &"<locked>"),
        };
        out.finish()
    }
}

/// Lock guard giving access to both the session state and the driver.
pub(crate) struct SessionGuard<'a> {
    core: MutexGuard<'a, SessionCore>,
    api: &'a dyn VendorApi,
}

impl SessionGuard<'_> {
    /// Issue one driver call and translate its return code.
    pub(crate) fn call(&self, name: &'static str, f: impl FnOnce(&dyn VendorApi) -> RawStatus) -> StatusCode {
        let raw = f(self.api);
        let code = translate(raw);
        debug!(call = name, raw, ?code, "driver call");
        code
    }

    /// Issue a driver call that must report `Success`.
    pub(crate) fn require(&self, name: &'static str, f: impl FnOnce(&dyn VendorApi) -> RawStatus) -> Result<(), StatusCode> {
        match self.call(name, f) {
            StatusCode::Success => Ok(()),
            code => Err(code),
        }
    }

    /// Issue a state-changing driver command. Any failure ends the cycle in `Error`.
    pub(crate) fn command(&mut self, name: &'static str, f: impl FnOnce(&dyn VendorApi) -> RawStatus) -> Result<(), StatusCode> {
        match self.call(name, f) {
            StatusCode::Success => Ok(()),
            code => Err(self.fail(code)),
        }
    }

    /// Record a hardware failure: the acquisition cycle ends in `Error`.
    pub(crate) fn fail(&mut self, code: StatusCode) -> StatusCode {
        error!(?code, from = ?self.core.state, "hardware failure, acquisition cycle now in error");
        self.core.state = SessionState::Error;
        self.core.last_failure = Some(code);
        code
    }

    /// Detector size, queried from the driver at most once per session.
    pub(crate) fn detector_geometry(&mut self) -> Result<DetectorGeometry, StatusCode> {
        if let Some(geometry) = self.core.geometry {
            return Ok(geometry);
        }

        let (mut width, mut height) = (-1, -1);
        self.require("get_detector", |api| api.get_detector(&mut width, &mut height))?;
        let geometry = DetectorGeometry::from_raw(width, height).map_err(StatusCode::from)?;
        self.core.geometry = Some(geometry);
        Ok(geometry)
    }
}

impl Deref for SessionGuard<'_> {
    type Target = SessionCore;

    fn deref(&self) -> &SessionCore {
        &self.core
    }
}

impl DerefMut for SessionGuard<'_> {
    fn deref_mut(&mut self) -> &mut SessionCore {
        &mut self.core
    }
}

/// Owner of the driver lifecycle. Dropping an open session closes it.
pub struct DeviceSession {
    api: Arc<dyn VendorApi>,
    handle: Option<SessionHandle>,
}

impl DeviceSession {
    pub fn new(api: Arc<dyn VendorApi>) -> Self {
        Self { api, handle: None }
    }

    /// Initialise the driver and read the detector geometry.
    ///
    /// Fails with `AlreadyOpen`, without touching the driver, if this session
    /// is already open.
    pub fn open(&mut self, config_dir: impl AsRef<Path>) -> Outcome<SessionHandle> {
        if self.handle.is_some() {
            warn!("open requested on a session that is already open");
            return Outcome::failure(StatusCode::AlreadyOpen);
        }
        let Some(config_dir) = config_dir.as_ref().to_str() else {
            return Outcome::failure(StatusCode::InvalidArgument);
        };

        let handle = SessionHandle::new(Arc::clone(&self.api));
        {
            let mut guard = handle.lock();
            if let Err(code) = guard.require("initialize", |api| api.initialize(config_dir)) {
                error!(?code, config_dir, "driver initialisation failed");
                return Outcome::failure(code);
            }

            let geometry = match guard.detector_geometry() {
                Ok(geometry) => geometry,
                Err(code) => {
                    error!(?code, "could not read detector geometry, shutting driver down");
                    guard.call("shut_down", |api| api.shut_down());
                    return Outcome::failure(code);
                }
            };

            guard.open = true;
            guard.state = SessionState::Idle;
            info!("📷 Session open ({}), detector {}x{}", config_dir, geometry.width(), geometry.height());
        }

        self.handle = Some(handle.clone());
        Outcome::success(handle)
    }

    /// Shut the driver down. Safe on a closed session, which reports `NotOpen`.
    ///
    /// A running acquisition is aborted first.
    pub fn close(&mut self) -> Outcome<()> {
        let Some(handle) = self.handle.take() else {
            debug!("close requested on a session that is not open");
            return Outcome::informational((), StatusCode::NotOpen);
        };

        let mut guard = handle.lock();
        if matches!(guard.state, SessionState::Armed | SessionState::Acquiring) {
            warn!(state = ?guard.state, "closing with an acquisition pending, aborting it");
            handle.request_abort();
            guard.call("abort_acquisition", |api| api.abort_acquisition());
            guard.call("cancel_wait", |api| api.cancel_wait());
        }

        let code = guard.call("shut_down", |api| api.shut_down());
        *guard = SessionCore::new();
        drop(guard);

        if code == StatusCode::Success {
            info!("📷 Session closed");
            Outcome::success(())
        } else {
            warn!(?code, "driver reported a failure during shutdown");
            Outcome::failure(code)
        }
    }

    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    /// Handle to the open session, if any.
    pub fn handle(&self) -> Option<SessionHandle> {
        self.handle.clone()
    }
}

impl Drop for DeviceSession {
    fn drop(&mut self) {
        if self.handle.is_some() {
            let _ = self.close();
        }
    }
}
