/*!
Acquisition state machine.

```text
Idle -> Configured -> Armed -> Acquiring -> Ready   -> (retrieve) -> Configured
                                         -> Aborted -> (recover)  -> Configured
                                         -> Error   -> (configure) -> Configured
```

Every operation checks the current state before issuing any driver call,
so a request made in the wrong state fails without touching the
hardware. A driver failure during a state-changing command moves the
cycle to `Error`, which only a fresh `configure` leaves.

`wait` is the one operation that blocks. It releases the session lock
for the duration of the driver wait so the cooler can be polled and so
`abort` can be issued from another thread; `abort` cancels the driver
wait, which unblocks the waiter.
*/

use crate::buffer::{ImageBufferManager, Readout};
use crate::session::{SessionGuard, SessionHandle};
use serde::{Deserialize, Serialize};
use shared::{translate, AcquisitionConfig, AcquisitionMode, ImageFrame, Outcome, StatusCode};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Where the acquisition cycle currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Configured,
    Armed,
    Acquiring,
    Ready,
    Aborted,
    Error,
}

impl SessionState {
    /// Whether acquisition parameters may be changed.
    pub fn accepts_parameters(self) -> bool {
        matches!(self, Self::Idle | Self::Configured)
    }

    /// Whether the hardware may be running an acquisition.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Armed | Self::Acquiring)
    }
}

/// Drives one acquisition cycle at a time on a session.
#[derive(Debug, Clone)]
pub struct AcquisitionStateMachine {
    session: SessionHandle,
    buffers: Arc<ImageBufferManager>,
}

impl AcquisitionStateMachine {
    pub fn new(session: SessionHandle) -> Self {
        Self {
            session,
            buffers: Arc::new(ImageBufferManager::new()),
        }
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    /// Readout buffer bookkeeping for this machine.
    pub fn buffers(&self) -> &ImageBufferManager {
        &self.buffers
    }

    /// Check and apply a complete configuration.
    ///
    /// Valid from `Idle`, `Configured` and `Error`. A rejected configuration
    /// leaves the state as it was; a driver failure while applying it ends
    /// in `Error`.
    pub fn configure(&self, config: &AcquisitionConfig) -> Outcome<()> {
        let result = self.session.lock_open().and_then(|mut guard| {
            let from = guard.state;
            if !matches!(from, SessionState::Idle | SessionState::Configured | SessionState::Error) {
                return Err(reject(from, "configure"));
            }
            guard.check_config(config)?;
            guard.apply_config(config)?;
            transition(&mut guard, SessionState::Configured);
            Ok(())
        });
        result.into()
    }

    /// `Configured -> Armed`.
    pub fn arm(&self) -> Outcome<()> {
        let result = self.session.lock_open().and_then(|mut guard| {
            if guard.state != SessionState::Configured {
                warn!(state = ?guard.state, "arm rejected, not configured");
                return Err(StatusCode::NotConfigured);
            }
            transition(&mut guard, SessionState::Armed);
            Ok(())
        });
        result.into()
    }

    /// `Armed -> Acquiring`. Issues the non-blocking hardware start.
    pub fn start(&self) -> Outcome<()> {
        let result = self.session.lock_open().and_then(|mut guard| {
            if guard.state != SessionState::Armed {
                warn!(state = ?guard.state, "start rejected, not armed");
                return Err(StatusCode::AlreadyAcquiring);
            }
            self.session.clear_abort();
            guard.command("start_acquisition", |api| api.start_acquisition())?;
            transition(&mut guard, SessionState::Acquiring);
            Ok(())
        });
        result.into()
    }

    /// Block until the hardware finishes, `timeout` elapses, or another
    /// thread aborts.
    ///
    /// Completion moves to `Ready`. A kinetic series signals once per frame,
    /// so it only completes once the hardware reports idle after its last
    /// frame. A timeout leaves the cycle in `Acquiring` and reports
    /// `Timeout`, so the caller may wait again. An abort reports `Aborted`,
    /// even if the hardware finished first, unless the abort itself failed:
    /// then the cycle stays in `Error` and the failure is reported.
    pub fn wait(&self, timeout: Duration) -> Outcome<()> {
        self.wait_unlocked(timeout).into()
    }

    fn wait_unlocked(&self, timeout: Duration) -> Result<(), StatusCode> {
        // The driver takes a u32 millisecond timeout.
        let deadline = Instant::now() + timeout.min(Duration::from_millis(u64::from(u32::MAX)));
        {
            let mut guard = self.session.lock_open()?;
            if guard.state != SessionState::Acquiring {
                return Err(reject(guard.state, "wait"));
            }
            if guard.waiting {
                warn!("wait rejected, another thread is already waiting");
                return Err(StatusCode::SessionBusy);
            }
            guard.waiting = true;
        }

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let timeout_ms = u32::try_from(remaining.as_millis()).unwrap_or(u32::MAX);

            // The lock is released here: cooler calls and abort may interleave.
            let raw = self.session.unlocked_api().wait_for_acquisition(timeout_ms);
            let code = translate(raw);
            debug!(call = "wait_for_acquisition", raw, ?code, timeout_ms, "driver call");

            let mut guard = self.session.lock();
            match self.after_wait(&mut guard, code) {
                Some(result) => {
                    guard.waiting = false;
                    return result;
                }
                None if Instant::now() >= deadline => {
                    guard.waiting = false;
                    debug!("series still running at the wait deadline");
                    return Err(StatusCode::Timeout);
                }
                None => {}
            }
        }
    }

    /// Interpret one driver wait. `None` means a series frame arrived and
    /// the hardware is still acquiring the rest.
    fn after_wait(&self, guard: &mut SessionGuard<'_>, code: StatusCode) -> Option<Result<(), StatusCode>> {
        if !guard.open {
            return Some(Err(StatusCode::NotOpen));
        }
        if guard.state == SessionState::Error {
            let failure = guard.last_failure.unwrap_or(StatusCode::InvalidTransition);
            warn!(?failure, "wait ended with the cycle in error");
            return Some(Err(failure));
        }
        if self.session.abort_requested() || guard.state == SessionState::Aborted {
            if guard.state != SessionState::Aborted {
                transition(guard, SessionState::Aborted);
            }
            info!("wait ended by abort");
            return Some(Err(StatusCode::Aborted));
        }
        if guard.state != SessionState::Acquiring {
            return Some(Err(reject(guard.state, "wait")));
        }

        match code {
            StatusCode::Success if guard.config.acquisition_mode.is_some_and(AcquisitionMode::is_series) => {
                match query_status(guard) {
                    Ok(StatusCode::Idle) => {
                        transition(guard, SessionState::Ready);
                        Some(Ok(()))
                    }
                    Ok(status) => {
                        debug!(?status, "series frame acquired, waiting for the rest");
                        None
                    }
                    Err(code) => Some(Err(guard.fail(code))),
                }
            }
            StatusCode::Success => {
                transition(guard, SessionState::Ready);
                Some(Ok(()))
            }
            StatusCode::Timeout => {
                debug!("wait timed out, acquisition still running");
                Some(Err(StatusCode::Timeout))
            }
            code => Some(Err(guard.fail(code))),
        }
    }

    /// Stop an armed or running acquisition. Safe to call at any time: with
    /// nothing to abort it succeeds with `NotAcquiring` and touches no hardware.
    pub fn abort(&self) -> Outcome<()> {
        let mut guard = match self.session.lock_open() {
            Ok(guard) => guard,
            Err(code) => return Outcome::failure(code),
        };
        if !guard.state.is_active() {
            debug!(state = ?guard.state, "abort with nothing to abort");
            return Outcome::informational((), StatusCode::NotAcquiring);
        }

        self.session.request_abort();
        let code = guard.call("abort_acquisition", |api| api.abort_acquisition());
        if guard.waiting {
            guard.call("cancel_wait", |api| api.cancel_wait());
        }
        match code {
            // Idle: the hardware had already stopped.
            StatusCode::Success | StatusCode::Idle => {
                transition(&mut guard, SessionState::Aborted);
                Outcome::success(())
            }
            code => {
                // The hardware may still be running; the cycle is in error, not aborted.
                self.session.clear_abort();
                Outcome::failure(guard.fail(code))
            }
        }
    }

    /// `Aborted -> Configured`, once the hardware reports it has stopped.
    ///
    /// Reports `AcquisitionInProgress` and stays `Aborted` while the
    /// hardware is still busy.
    pub fn recover(&self) -> Outcome<()> {
        let result = self.session.lock_open().and_then(|mut guard| {
            if guard.state != SessionState::Aborted {
                return Err(reject(guard.state, "recover"));
            }
            match query_status(&guard)? {
                StatusCode::Idle => {
                    self.session.clear_abort();
                    transition(&mut guard, SessionState::Configured);
                    Ok(())
                }
                status => {
                    debug!(?status, "hardware not yet stopped after abort");
                    Err(StatusCode::AcquisitionInProgress)
                }
            }
        });
        result.into()
    }

    /// Read out one frame: `Ready -> Configured`.
    ///
    /// A single scan returns the whole readout; other modes return the most
    /// recent image, and a run-till-abort acquisition is stopped after it.
    pub fn retrieve(&self) -> Outcome<ImageFrame> {
        let result = self.readout("retrieve", |guard, buffers| {
            let geometry = guard.frame_geometry()?;
            let mode = guard.config.acquisition_mode.unwrap_or(AcquisitionMode::SingleScan);
            let readout = match mode {
                AcquisitionMode::SingleScan | AcquisitionMode::Accumulate => Readout::Acquired,
                _ => Readout::MostRecent,
            };

            let frames = buffers.retrieve(guard, buffers.allocate(geometry, 1)?, readout)?;
            if mode == AcquisitionMode::RunTillAbort {
                stop_continuous(guard)?;
            }
            frames.into_iter().next().ok_or(StatusCode::InvalidDimensions)
        });
        result.into()
    }

    /// Read out every frame of the acquisition: `Ready -> Configured`.
    pub fn retrieve_series(&self) -> Outcome<Vec<ImageFrame>> {
        let result = self.readout("retrieve_series", |guard, buffers| {
            let geometry = guard.frame_geometry()?;
            if guard.config.acquisition_mode == Some(AcquisitionMode::RunTillAbort) {
                stop_continuous(guard)?;
            }
            let frames = guard.config.frames_per_acquisition();
            buffers.retrieve(guard, buffers.allocate(geometry, frames)?, Readout::Acquired)
        });
        result.into()
    }

    /// Hardware acquisition status: `Idle` or `AcquisitionInProgress`.
    pub fn device_status(&self) -> Outcome<StatusCode> {
        self.session.lock_open().and_then(|guard| query_status(&guard)).into()
    }

    fn readout<T>(
        &self,
        operation: &'static str,
        read: impl FnOnce(&mut SessionGuard<'_>, &ImageBufferManager) -> Result<T, StatusCode>,
    ) -> Result<T, StatusCode> {
        let mut guard = self.session.lock_open()?;
        if guard.state != SessionState::Ready {
            return Err(reject(guard.state, operation));
        }
        match read(&mut guard, &self.buffers) {
            Ok(value) => {
                transition(&mut guard, SessionState::Configured);
                Ok(value)
            }
            Err(code) => Err(guard.fail(code)),
        }
    }
}

fn transition(guard: &mut SessionGuard<'_>, to: SessionState) {
    info!("🔄 {:?} -> {:?}", guard.state, to);
    guard.state = to;
}

fn reject(state: SessionState, operation: &'static str) -> StatusCode {
    warn!(?state, operation, "rejected in current state");
    StatusCode::InvalidTransition
}

fn query_status(guard: &SessionGuard<'_>) -> Result<StatusCode, StatusCode> {
    let mut status = 0;
    guard.require("get_status", |api| api.get_status(&mut status))?;
    Ok(translate(status))
}

/// End a run-till-abort acquisition after its frame has been taken.
fn stop_continuous(guard: &SessionGuard<'_>) -> Result<(), StatusCode> {
    match guard.call("abort_acquisition", |api| api.abort_acquisition()) {
        StatusCode::Success | StatusCode::Idle => Ok(()),
        code => Err(code),
    }
}
