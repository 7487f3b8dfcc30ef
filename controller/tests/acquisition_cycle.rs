//! End-to-end acquisition cycles against the simulated camera.

use ccd_controller::{
    AcquisitionStateMachine, ConfigurationManager, DeviceSession, SessionState, SimulatedCamera, ThermalController,
};
use shared::{AcquisitionConfig, AcquisitionMode, ReadMode, StatusCode};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

struct Rig {
    sim: Arc<SimulatedCamera>,
    session: DeviceSession,
    machine: AcquisitionStateMachine,
}

fn rig(width: i32, height: i32) -> Rig {
    ccd_controller::init_tracing();
    let sim = Arc::new(SimulatedCamera::with_detector(width, height));
    let mut session = DeviceSession::new(sim.clone());
    let handle = session.open("/usr/local/etc/andor").into_result().unwrap();
    Rig {
        sim,
        machine: AcquisitionStateMachine::new(handle),
        session,
    }
}

fn full_single_scan() -> AcquisitionConfig {
    AcquisitionConfig::new()
        .with_read_mode(ReadMode::FullImage)
        .with_acquisition_mode(AcquisitionMode::SingleScan)
        .with_exposure_time(0.1)
        .with_kinetic_count(1)
}

#[test]
fn single_scan_matches_detector_geometry() {
    let rig = rig(1024, 1024);
    let machine = &rig.machine;

    assert!(machine.configure(&full_single_scan()).is_success());
    assert!(machine.arm().is_success());
    assert!(machine.start().is_success());
    assert!(machine.wait(Duration::from_secs(5)).is_success());
    assert_eq!(machine.state(), SessionState::Ready);

    let frame = machine.retrieve().into_result().unwrap();
    let geometry = rig.session.handle().unwrap().detector_geometry().unwrap();
    assert_eq!(frame.width(), geometry.width() as usize);
    assert_eq!(frame.height(), geometry.height() as usize);
    assert_eq!(frame.samples().len(), frame.width() * frame.height());

    assert_eq!(machine.retrieve().code(), StatusCode::InvalidTransition);
}

#[test]
fn frames_are_row_major_for_non_square_detectors() {
    for (width, height) in [(1, 7), (7, 1), (3, 5), (5, 3), (12, 12), (64, 9)] {
        let rig = rig(width, height);
        let machine = &rig.machine;

        assert!(machine.configure(&AcquisitionConfig::single(0.0)).is_success());
        assert!(machine.arm().is_success());
        assert!(machine.start().is_success());
        assert!(machine.wait(Duration::from_secs(5)).is_success());
        let frame = machine.retrieve().into_result().unwrap();

        let w = width as usize;
        for r in 0..height as usize {
            for c in 0..w {
                // The simulated readout holds its flat index at every position.
                assert_eq!(frame.get(r, c), Some((r * w + c) as i32), "{}x{} at ({}, {})", width, height, r, c);
            }
            assert_eq!(frame.row(r).unwrap().len(), w);
        }
    }
}

#[test]
fn negative_exposure_leaves_state_unchanged() {
    let rig = rig(32, 16);
    let machine = &rig.machine;

    let bad = full_single_scan().with_exposure_time(-1.0);
    assert_eq!(machine.configure(&bad).code(), StatusCode::InvalidArgument);
    assert_eq!(machine.state(), SessionState::Idle);

    assert!(machine.configure(&full_single_scan()).is_success());
    rig.sim.clear_calls();
    assert_eq!(machine.configure(&bad).code(), StatusCode::InvalidArgument);
    assert_eq!(machine.state(), SessionState::Configured);
    assert!(rig.sim.calls().is_empty());

    let manager = ConfigurationManager::new(rig.session.handle().unwrap());
    assert_eq!(manager.set_exposure_time(-1.0).code(), StatusCode::InvalidArgument);
    assert_eq!(manager.current().into_result().unwrap().exposure_time_s, Some(0.1));
}

#[test]
fn no_start_without_intervening_drain() {
    let rig = rig(32, 16);
    let machine = &rig.machine;
    let config = AcquisitionConfig::single(0.01);

    for _ in 0..3 {
        assert!(machine.configure(&config).is_success());
        assert!(machine.arm().is_success());
        assert!(machine.start().is_success());
        assert_eq!(machine.start().code(), StatusCode::AlreadyAcquiring);
        assert!(machine.wait(Duration::from_secs(5)).is_success());
        assert_eq!(machine.start().code(), StatusCode::AlreadyAcquiring);
        assert!(machine.retrieve().is_success());
        assert_eq!(machine.start().code(), StatusCode::AlreadyAcquiring);
    }
    assert_eq!(rig.sim.call_count("start_acquisition"), 3);

    // Abort then recover is the other way back to Configured.
    assert!(machine.arm().is_success());
    assert!(machine.start().is_success());
    assert!(machine.abort().is_success());
    assert_eq!(machine.start().code(), StatusCode::AlreadyAcquiring);
    assert!(machine.recover().is_success());
    assert!(machine.arm().is_success());
    assert!(machine.start().is_success());
    assert_eq!(rig.sim.call_count("start_acquisition"), 4);
    assert!(machine.abort().is_success());
}

#[test]
fn abort_from_another_thread_never_yields_ready() {
    let rig = rig(32, 16);
    let machine = &rig.machine;

    for _ in 0..5 {
        assert!(machine.configure(&AcquisitionConfig::single(30.0)).is_success());
        assert!(machine.arm().is_success());
        assert!(machine.start().is_success());

        let waiter = {
            let machine = machine.clone();
            thread::spawn(move || {
                let started = Instant::now();
                (machine.wait(Duration::from_secs(20)), started.elapsed())
            })
        };
        thread::sleep(Duration::from_millis(100));
        assert!(machine.abort().is_success());

        let (outcome, elapsed) = waiter.join().unwrap();
        assert_eq!(outcome.code(), StatusCode::Aborted);
        assert!(elapsed < Duration::from_secs(5));
        assert_eq!(machine.state(), SessionState::Aborted);
        assert!(machine.recover().is_success());
    }
}

#[test]
fn cooler_runs_alongside_acquisition() {
    let rig = rig(32, 16);
    let thermal = ThermalController::new(rig.session.handle().unwrap());
    let machine = &rig.machine;

    assert!(thermal.set_target(-30.0).is_success());
    assert!(thermal.cooler_on().is_success());
    assert!(machine.configure(&AcquisitionConfig::single(0.2)).is_success());
    assert!(machine.arm().is_success());
    assert!(machine.start().is_success());

    let waiter = {
        let machine = machine.clone();
        thread::spawn(move || machine.wait(Duration::from_secs(5)))
    };
    let polls = (0..5).filter(|_| thermal.get_status().is_success()).count();
    assert_eq!(polls, 5);

    assert!(waiter.join().unwrap().is_success());
    assert!(machine.retrieve().is_success());
    assert_eq!(thermal.get_range().into_result().unwrap().min_c, -80);
}

#[test]
fn closing_mid_acquisition_aborts_and_invalidates_handles() {
    let mut rig = rig(32, 16);
    let machine = rig.machine.clone();

    assert!(machine.configure(&AcquisitionConfig::single(30.0)).is_success());
    assert!(machine.arm().is_success());
    assert!(machine.start().is_success());

    assert!(rig.session.close().is_success());
    assert!(!rig.sim.is_acquiring());
    assert!(!rig.sim.is_initialized());
    assert_eq!(machine.arm().code(), StatusCode::NotOpen);
    assert_eq!(machine.abort().code(), StatusCode::NotOpen);
}
