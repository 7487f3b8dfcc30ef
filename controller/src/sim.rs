/*!
In-process simulated camera.

Implements [`VendorApi`] with the same blocking semantics as the real
driver: exposures run on a worker thread that signals once per completed
frame, `wait_for_acquisition` blocks on an event channel until such a
signal or a `cancel_wait` arrives, and readout fails until data is ready. The cooler
drifts towards its target a few degrees on every temperature poll.

Every call is recorded, and any call can be made to fail once with a
chosen raw code, so tests can assert exactly what reached the hardware.
*/

use crate::driver::{RawStatus, VendorApi};
use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use shared::status::codes;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;
use tracing::debug;

/// Default detector size.
pub const DEFAULT_WIDTH: i32 = 1024;
pub const DEFAULT_HEIGHT: i32 = 1024;

/// Cooler limits in whole degrees C.
pub const MIN_TEMPERATURE_C: i32 = -80;
pub const MAX_TEMPERATURE_C: i32 = 50;

/// Longest exposure accepted, in seconds.
pub const MAX_EXPOSURE_S: f32 = 3600.0;

/// Frames the acquisition buffer holds.
pub const BUFFER_FRAMES: i32 = 512;

/// Temperature the sensor relaxes to with the cooler off.
pub const AMBIENT_C: f32 = 20.0;

/// Largest temperature change per poll.
pub const TEMPERATURE_STEP_C: f32 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Event {
    Complete,
    Cancelled,
}

#[derive(Debug)]
struct SimState {
    initialized: bool,
    width: i32,
    height: i32,

    acquisition_mode: i32,
    exposure_s: f32,
    kinetic_count: i32,
    kinetic_cycle_s: f32,
    /// (h_bin, v_bin, h_start, h_end, v_start, v_end)
    image: (i32, i32, i32, i32, i32, i32),

    acquiring: bool,
    data_ready: bool,
    frames_taken: u64,
    /// Bumped on every start and abort so a stale worker cannot complete.
    generation: u64,
    /// Dropping this stops the exposure worker.
    worker_stop: Option<Sender<()>>,

    cooler_on: bool,
    target_c: i32,
    temperature_c: f32,
    fan_mode: i32,
}

impl SimState {
    fn new(width: i32, height: i32) -> Self {
        Self {
            initialized: false,
            width,
            height,
            acquisition_mode: 1,
            exposure_s: 0.0,
            kinetic_count: 1,
            kinetic_cycle_s: 0.0,
            image: (1, 1, 1, width, 1, height),
            acquiring: false,
            data_ready: false,
            frames_taken: 0,
            generation: 0,
            worker_stop: None,
            cooler_on: false,
            target_c: AMBIENT_C as i32,
            temperature_c: AMBIENT_C,
            fan_mode: 0,
        }
    }

    fn frame_len(&self) -> usize {
        let (h_bin, v_bin, h_start, h_end, v_start, v_end) = self.image;
        let width = (h_end - h_start + 1) / h_bin;
        let height = (v_end - v_start + 1) / v_bin;
        (width.max(0) * height.max(0)) as usize
    }

    fn frames_per_acquisition(&self) -> usize {
        match self.acquisition_mode {
            3 | 4 => self.kinetic_count.max(1) as usize,
            _ => 1,
        }
    }

    fn stop_worker(&mut self) {
        self.generation += 1;
        self.acquiring = false;
        self.worker_stop = None;
    }
}

/// Simulated vendor driver.
pub struct SimulatedCamera {
    state: Arc<Mutex<SimState>>,
    calls: Mutex<Vec<&'static str>>,
    faults: Mutex<HashMap<&'static str, RawStatus>>,
    events_tx: Sender<Event>,
    events_rx: Receiver<Event>,
}

impl SimulatedCamera {
    pub fn new() -> Self {
        Self::with_detector(DEFAULT_WIDTH, DEFAULT_HEIGHT)
    }

    /// Camera with a `width` x `height` sensor.
    pub fn with_detector(width: i32, height: i32) -> Self {
        let (events_tx, events_rx) = unbounded();
        Self {
            state: Arc::new(Mutex::new(SimState::new(width, height))),
            calls: Mutex::new(Vec::new()),
            faults: Mutex::new(HashMap::new()),
            events_tx,
            events_rx,
        }
    }

    /// Make the next call to `name` return `raw` without doing anything.
    pub fn fail_next(&self, name: &'static str, raw: RawStatus) {
        lock(&self.faults).insert(name, raw);
    }

    /// Names of the driver calls issued so far, in order.
    pub fn calls(&self) -> Vec<&'static str> {
        lock(&self.calls).clone()
    }

    pub fn clear_calls(&self) {
        lock(&self.calls).clear();
    }

    /// How many times `name` was called.
    pub fn call_count(&self, name: &str) -> usize {
        lock(&self.calls).iter().filter(|call| **call == name).count()
    }

    pub fn is_initialized(&self) -> bool {
        lock(&self.state).initialized
    }

    pub fn is_acquiring(&self) -> bool {
        lock(&self.state).acquiring
    }

    pub fn cooler_is_on(&self) -> bool {
        lock(&self.state).cooler_on
    }

    pub fn fan_mode(&self) -> i32 {
        lock(&self.state).fan_mode
    }

    /// Record the call and return an injected fault, if one is pending.
    fn enter(&self, name: &'static str) -> Option<RawStatus> {
        lock(&self.calls).push(name);
        lock(&self.faults).remove(name)
    }

    /// Record the call, then run `f` against the state of an initialised driver.
    fn with_state(&self, name: &'static str, f: impl FnOnce(&mut SimState) -> RawStatus) -> RawStatus {
        if let Some(raw) = self.enter(name) {
            return raw;
        }
        let mut state = lock(&self.state);
        if !state.initialized {
            return codes::DRV_NOT_INITIALIZED;
        }
        f(&mut state)
    }

    /// Set-up calls are refused while an acquisition runs.
    fn with_idle_state(&self, name: &'static str, f: impl FnOnce(&mut SimState) -> RawStatus) -> RawStatus {
        self.with_state(name, |state| {
            if state.acquiring {
                return codes::DRV_ACQUIRING;
            }
            f(state)
        })
    }

    fn spawn_exposure(&self, state: &mut SimState) {
        let (stop_tx, stop_rx) = bounded::<()>(1);
        state.worker_stop = Some(stop_tx);
        state.generation += 1;

        let generation = state.generation;
        // Run-till-abort keeps taking frames until stopped.
        let frames = (state.acquisition_mode != 5).then(|| state.frames_per_acquisition() as u64);
        let per_frame = Duration::from_secs_f32(state.exposure_s.max(state.kinetic_cycle_s).max(0.0));

        let shared = Arc::clone(&self.state);
        let events = self.events_tx.clone();
        thread::spawn(move || loop {
            match stop_rx.recv_timeout(per_frame) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                    debug!(generation, "simulated exposure stopped");
                    return;
                }
            }

            let mut state = lock(&shared);
            if state.generation != generation {
                return;
            }
            state.data_ready = true;
            state.frames_taken += 1;
            let finished = frames.is_some_and(|total| state.frames_taken >= total);
            if finished {
                state.acquiring = false;
                state.worker_stop = None;
            }
            let taken = state.frames_taken;
            drop(state);

            debug!(generation, frame = taken, finished, "simulated frame complete");
            let _ = events.send(Event::Complete);
            if finished {
                return;
            }
        });
    }
}

impl Default for SimulatedCamera {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SimulatedCamera {
    fn drop(&mut self) {
        lock(&self.state).stop_worker();
    }
}

impl std::fmt::Debug for SimulatedCamera {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedCamera").field("state", &*lock(&self.state)).finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn valid_seconds(seconds: f32) -> bool {
    seconds.is_finite() && seconds >= 0.0
}

impl VendorApi for SimulatedCamera {
    fn initialize(&self, _config_dir: &str) -> RawStatus {
        if let Some(raw) = self.enter("initialize") {
            return raw;
        }
        let mut state = lock(&self.state);
        let (width, height) = (state.width, state.height);
        *state = SimState::new(width, height);
        state.initialized = true;
        codes::DRV_SUCCESS
    }

    fn shut_down(&self) -> RawStatus {
        self.with_state("shut_down", |state| {
            state.stop_worker();
            state.initialized = false;
            codes::DRV_SUCCESS
        })
    }

    fn get_detector(&self, width: &mut i32, height: &mut i32) -> RawStatus {
        self.with_state("get_detector", |state| {
            *width = state.width;
            *height = state.height;
            codes::DRV_SUCCESS
        })
    }

    fn get_maximum_exposure(&self, seconds: &mut f32) -> RawStatus {
        self.with_state("get_maximum_exposure", |_| {
            *seconds = MAX_EXPOSURE_S;
            codes::DRV_SUCCESS
        })
    }

    fn get_size_of_circular_buffer(&self, images: &mut i32) -> RawStatus {
        self.with_state("get_size_of_circular_buffer", |_| {
            *images = BUFFER_FRAMES;
            codes::DRV_SUCCESS
        })
    }

    fn set_read_mode(&self, mode: i32) -> RawStatus {
        self.with_idle_state("set_read_mode", |_| {
            if !(0..=4).contains(&mode) {
                return codes::DRV_P1INVALID;
            }
            codes::DRV_SUCCESS
        })
    }

    fn set_acquisition_mode(&self, mode: i32) -> RawStatus {
        self.with_idle_state("set_acquisition_mode", |state| {
            if !(1..=5).contains(&mode) {
                return codes::DRV_P1INVALID;
            }
            state.acquisition_mode = mode;
            codes::DRV_SUCCESS
        })
    }

    fn set_exposure_time(&self, seconds: f32) -> RawStatus {
        self.with_idle_state("set_exposure_time", |state| {
            if !valid_seconds(seconds) || seconds > MAX_EXPOSURE_S {
                return codes::DRV_P1INVALID;
            }
            state.exposure_s = seconds;
            codes::DRV_SUCCESS
        })
    }

    fn set_number_kinetics(&self, count: i32) -> RawStatus {
        self.with_idle_state("set_number_kinetics", |state| {
            if !(1..=BUFFER_FRAMES).contains(&count) {
                return codes::DRV_P1INVALID;
            }
            state.kinetic_count = count;
            codes::DRV_SUCCESS
        })
    }

    fn set_kinetic_cycle_time(&self, seconds: f32) -> RawStatus {
        self.with_idle_state("set_kinetic_cycle_time", |state| {
            if !valid_seconds(seconds) {
                return codes::DRV_P1INVALID;
            }
            state.kinetic_cycle_s = seconds;
            codes::DRV_SUCCESS
        })
    }

    fn set_image(&self, h_bin: i32, v_bin: i32, h_start: i32, h_end: i32, v_start: i32, v_end: i32) -> RawStatus {
        self.with_idle_state("set_image", |state| {
            if h_bin < 1 {
                return codes::DRV_P1INVALID;
            }
            if v_bin < 1 {
                return codes::DRV_P2INVALID;
            }
            if h_start < 1 || h_start > state.width {
                return codes::DRV_P3INVALID;
            }
            if h_end < h_start || h_end > state.width {
                return codes::DRV_P4INVALID;
            }
            if v_start < 1 || v_start > state.height {
                return codes::DRV_P5INVALID;
            }
            if v_end < v_start || v_end > state.height {
                return codes::DRV_P6INVALID;
            }
            if (h_end - h_start + 1) % h_bin != 0 || (v_end - v_start + 1) % v_bin != 0 {
                return codes::DRV_BINNING_ERROR;
            }
            state.image = (h_bin, v_bin, h_start, h_end, v_start, v_end);
            codes::DRV_SUCCESS
        })
    }

    fn set_shutter(&self, signal: i32, mode: i32, closing_ms: i32, opening_ms: i32) -> RawStatus {
        self.with_idle_state("set_shutter", |_| {
            if !(0..=1).contains(&signal) {
                return codes::DRV_P1INVALID;
            }
            if !(0..=2).contains(&mode) {
                return codes::DRV_P2INVALID;
            }
            if closing_ms < 0 {
                return codes::DRV_P3INVALID;
            }
            if opening_ms < 0 {
                return codes::DRV_P4INVALID;
            }
            codes::DRV_SUCCESS
        })
    }

    fn get_acquisition_timings(&self, exposure: &mut f32, accumulate: &mut f32, kinetic: &mut f32) -> RawStatus {
        self.with_idle_state("get_acquisition_timings", |state| {
            *exposure = state.exposure_s;
            *accumulate = state.exposure_s;
            *kinetic = state.exposure_s.max(state.kinetic_cycle_s);
            codes::DRV_SUCCESS
        })
    }

    fn start_acquisition(&self) -> RawStatus {
        if let Some(raw) = self.enter("start_acquisition") {
            return raw;
        }
        let mut state = lock(&self.state);
        if !state.initialized {
            return codes::DRV_NOT_INITIALIZED;
        }
        if state.acquiring {
            return codes::DRV_ACQUIRING;
        }

        // Events left over from an earlier cycle must not satisfy this one.
        while self.events_rx.try_recv().is_ok() {}

        state.acquiring = true;
        state.data_ready = false;
        state.frames_taken = 0;
        self.spawn_exposure(&mut state);
        codes::DRV_SUCCESS
    }

    fn wait_for_acquisition(&self, timeout_ms: u32) -> RawStatus {
        if let Some(raw) = self.enter("wait_for_acquisition") {
            return raw;
        }
        if !lock(&self.state).initialized {
            return codes::DRV_NOT_INITIALIZED;
        }

        // Blocks without holding the state lock.
        match self.events_rx.recv_timeout(Duration::from_millis(u64::from(timeout_ms))) {
            Ok(Event::Complete) => codes::DRV_SUCCESS,
            Ok(Event::Cancelled) | Err(_) => codes::DRV_NO_NEW_DATA,
        }
    }

    fn cancel_wait(&self) -> RawStatus {
        if let Some(raw) = self.enter("cancel_wait") {
            return raw;
        }
        let _ = self.events_tx.send(Event::Cancelled);
        codes::DRV_SUCCESS
    }

    fn abort_acquisition(&self) -> RawStatus {
        self.with_state("abort_acquisition", |state| {
            if !state.acquiring {
                return codes::DRV_IDLE;
            }
            state.stop_worker();
            codes::DRV_SUCCESS
        })
    }

    fn get_status(&self, status: &mut RawStatus) -> RawStatus {
        self.with_state("get_status", |state| {
            *status = if state.acquiring {
                codes::DRV_ACQUIRING
            } else {
                codes::DRV_IDLE
            };
            codes::DRV_SUCCESS
        })
    }

    fn get_acquired_data(&self, buffer: &mut [i32]) -> RawStatus {
        self.with_idle_state("get_acquired_data", |state| {
            if !state.data_ready {
                return codes::DRV_NO_NEW_DATA;
            }
            if buffer.len() != state.frame_len() * state.frames_per_acquisition() {
                return codes::DRV_P2INVALID;
            }
            for (i, sample) in buffer.iter_mut().enumerate() {
                *sample = i as i32;
            }
            codes::DRV_SUCCESS
        })
    }

    fn get_most_recent_image(&self, buffer: &mut [i32]) -> RawStatus {
        self.with_state("get_most_recent_image", |state| {
            if !state.data_ready {
                return codes::DRV_NO_NEW_DATA;
            }
            if buffer.len() != state.frame_len() {
                return codes::DRV_P2INVALID;
            }
            for (i, sample) in buffer.iter_mut().enumerate() {
                *sample = i as i32;
            }
            codes::DRV_SUCCESS
        })
    }

    fn cooler_on(&self) -> RawStatus {
        self.with_state("cooler_on", |state| {
            state.cooler_on = true;
            codes::DRV_SUCCESS
        })
    }

    fn cooler_off(&self) -> RawStatus {
        self.with_state("cooler_off", |state| {
            state.cooler_on = false;
            codes::DRV_SUCCESS
        })
    }

    fn set_temperature(&self, celsius: i32) -> RawStatus {
        self.with_state("set_temperature", |state| {
            if !(MIN_TEMPERATURE_C..=MAX_TEMPERATURE_C).contains(&celsius) {
                return codes::DRV_P1INVALID;
            }
            state.target_c = celsius;
            codes::DRV_SUCCESS
        })
    }

    fn get_temperature(&self, celsius: &mut f32) -> RawStatus {
        self.with_state("get_temperature", |state| {
            let goal = if state.cooler_on { state.target_c as f32 } else { AMBIENT_C };
            let delta = (goal - state.temperature_c).clamp(-TEMPERATURE_STEP_C, TEMPERATURE_STEP_C);
            state.temperature_c += delta;
            *celsius = state.temperature_c;

            if !state.cooler_on {
                codes::DRV_TEMPERATURE_OFF
            } else if state.temperature_c == goal {
                codes::DRV_TEMPERATURE_STABILIZED
            } else {
                codes::DRV_TEMPERATURE_NOT_REACHED
            }
        })
    }

    fn get_temperature_range(&self, min_c: &mut i32, max_c: &mut i32) -> RawStatus {
        self.with_state("get_temperature_range", |_| {
            *min_c = MIN_TEMPERATURE_C;
            *max_c = MAX_TEMPERATURE_C;
            codes::DRV_SUCCESS
        })
    }

    fn set_fan_mode(&self, mode: i32) -> RawStatus {
        self.with_state("set_fan_mode", |state| {
            if !(0..=2).contains(&mode) {
                return codes::DRV_P1INVALID;
            }
            state.fan_mode = mode;
            codes::DRV_SUCCESS
        })
    }
}
