use crossbeam_channel::{unbounded, Receiver, Sender};
use marker_pose::aruco::{builtins, render};
use marker_pose::core::{GrayImage, PixelFormat};
use marker_pose::{
    CameraIntrinsics, FilteredPose, Frame, FrameProcessor, OwnedImage, SchedulerStats, Submission,
    TrackerConfig, TrackingService,
};
use nalgebra::{UnitQuaternion, Vector3};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(10);

/// Blocks inside every pass until the test releases it; records what it saw.
struct Gate {
    started: Sender<()>,
    release: Receiver<()>,
    log: Arc<Mutex<Vec<String>>>,
}

impl FrameProcessor for Gate {
    fn process_frame(&mut self, frame: &Frame) -> Vec<FilteredPose> {
        self.log.lock().push(format!("frame {}", frame.timestamp));
        let _ = self.started.send(());
        let _ = self.release.recv();
        vec![FilteredPose::from_parts(
            2,
            UnitQuaternion::identity(),
            Vector3::new(0.0, 0.0, -1.0),
        )]
    }

    fn clear_marker(&mut self, marker_id: u32) -> bool {
        self.log.lock().push(format!("clear {marker_id}"));
        true
    }

    fn clear_all(&mut self) {
        self.log.lock().push("clear all".to_string());
    }
}

struct Harness {
    service: TrackingService,
    started: Receiver<()>,
    release: Sender<()>,
    log: Arc<Mutex<Vec<String>>>,
}

fn gated_service() -> Harness {
    let (started_tx, started_rx) = unbounded();
    let (release_tx, release_rx) = unbounded();
    let log = Arc::new(Mutex::new(Vec::new()));
    let service = TrackingService::spawn(Gate {
        started: started_tx,
        release: release_rx,
        log: Arc::clone(&log),
    })
    .expect("spawn");
    Harness {
        service,
        started: started_rx,
        release: release_tx,
        log,
    }
}

fn dummy_frame(timestamp: f64) -> Frame {
    Frame {
        image: OwnedImage::packed(4, 4, PixelFormat::Gray8, vec![128; 16]),
        intrinsics: CameraIntrinsics::new(100.0, 100.0, 2.0, 2.0),
        timestamp,
    }
}

#[test]
fn frames_arriving_while_busy_are_dropped() {
    const N: u64 = 6;
    let h = gated_service();
    let snapshots = h.service.subscribe();

    assert_eq!(h.service.submit(dummy_frame(0.0)), Submission::Accepted);
    h.started.recv_timeout(WAIT).expect("pass started");
    assert!(h.service.scheduler().is_busy());

    for i in 1..N {
        assert_eq!(h.service.submit(dummy_frame(i as f64)), Submission::Dropped);
    }

    // Nothing is published while the pass is in flight.
    assert_eq!(h.service.latest().frame_index, 0);
    assert!(h.service.latest().poses.is_empty());
    assert!(snapshots.try_recv().is_err());

    h.release.send(()).expect("release");
    let snap = snapshots.recv_timeout(WAIT).expect("snapshot");
    assert_eq!(snap.frame_index, 1);
    assert_eq!(snap.timestamp, 0.0);
    assert_eq!(snap.poses.len(), 1);
    assert_eq!(h.service.latest().frame_index, 1);

    assert!(!h.service.scheduler().is_busy());
    assert_eq!(
        h.service.scheduler().stats(),
        SchedulerStats {
            admitted: 1,
            dropped: N - 1
        }
    );
    assert_eq!(h.log.lock().as_slice(), ["frame 0"]);
}

#[test]
fn clear_commands_apply_before_the_next_pass() {
    let h = gated_service();
    let snapshots = h.service.subscribe();
    h.release.send(()).expect("release");

    assert!(h.service.clear_marker(3));
    assert!(h.service.clear_all());
    assert_eq!(h.service.submit(dummy_frame(1.0)), Submission::Accepted);
    snapshots.recv_timeout(WAIT).expect("snapshot");

    assert_eq!(h.log.lock().as_slice(), ["clear 3", "clear all", "frame 1"]);
}

#[test]
fn every_subscriber_sees_every_snapshot() {
    let h = gated_service();
    let a = h.service.subscribe();
    let b = h.service.subscribe();
    for i in 0..3 {
        h.release.send(()).expect("release");
        assert_eq!(h.service.submit(dummy_frame(i as f64)), Submission::Accepted);
        let sa = a.recv_timeout(WAIT).expect("a");
        let sb = b.recv_timeout(WAIT).expect("b");
        assert!(Arc::ptr_eq(&sa, &sb));
        assert_eq!(sa.frame_index, i + 1);
    }
}

#[test]
fn shutdown_finishes_in_flight_frame_then_closes() {
    let mut h = gated_service();
    let snapshots = h.service.subscribe();

    assert_eq!(h.service.submit(dummy_frame(0.5)), Submission::Accepted);
    h.started.recv_timeout(WAIT).expect("pass started");
    h.release.send(()).expect("release");
    h.service.shutdown();

    assert_eq!(h.service.submit(dummy_frame(1.0)), Submission::Closed);
    assert!(!h.service.clear_marker(2));
    assert_eq!(h.service.latest().frame_index, 1);

    let snap = snapshots.recv_timeout(WAIT).expect("in-flight snapshot");
    assert_eq!(snap.timestamp, 0.5);
    assert!(snapshots.recv_timeout(WAIT).is_err());
}

#[test]
fn tracker_service_end_to_end() {
    let service = TrackingService::new(TrackerConfig::default()).expect("service");
    let snapshots = service.subscribe();
    let k = CameraIntrinsics::new(500.0, 500.0, 50.0, 50.0);

    let gray = render::draw_marker(&builtins::DICT_4X4_50, 4, 10, 2).expect("render");
    let marker = OwnedImage::rgb_from_gray(&gray);
    let blank = OwnedImage::rgb_from_gray(&GrayImage::filled(gray.width, gray.height, 255));

    assert_eq!(
        service.submit(Frame {
            image: marker,
            intrinsics: k,
            timestamp: 0.0,
        }),
        Submission::Accepted
    );
    let snap = snapshots.recv_timeout(WAIT).expect("snapshot");
    assert_eq!(snap.poses.len(), 1);
    assert_eq!(snap.poses[0].marker_id, 4);

    // A frame without markers still completes the pass and frees the gate.
    assert_eq!(
        service.submit(Frame {
            image: blank,
            intrinsics: k,
            timestamp: 1.0 / 60.0,
        }),
        Submission::Accepted
    );
    let snap = snapshots.recv_timeout(WAIT).expect("snapshot");
    assert!(snap.poses.is_empty());
    assert!(!service.scheduler().is_busy());
}

#[test]
fn oversized_frame_does_not_stop_the_worker() {
    let service = TrackingService::new(TrackerConfig::default()).expect("service");
    let snapshots = service.subscribe();
    let k = CameraIntrinsics::new(500.0, 500.0, 50.0, 50.0);

    let bogus = OwnedImage {
        width: usize::MAX / 2,
        height: 2,
        stride: usize::MAX / 2,
        format: PixelFormat::Rgb8,
        data: vec![0; 16],
    };
    assert_eq!(
        service.submit(Frame {
            image: bogus,
            intrinsics: k,
            timestamp: 0.0,
        }),
        Submission::Accepted
    );
    let snap = snapshots.recv_timeout(WAIT).expect("snapshot");
    assert!(snap.poses.is_empty());

    let gray = render::draw_marker(&builtins::DICT_4X4_50, 2, 10, 2).expect("render");
    assert_eq!(
        service.submit(Frame {
            image: OwnedImage::rgb_from_gray(&gray),
            intrinsics: k,
            timestamp: 1.0 / 60.0,
        }),
        Submission::Accepted
    );
    let snap = snapshots.recv_timeout(WAIT).expect("snapshot");
    assert_eq!(snap.frame_index, 2);
    assert_eq!(snap.poses.len(), 1);
}

#[test]
fn invalid_config_fails_fast() {
    let cfg = TrackerConfig {
        allowed_ids: Default::default(),
        ..TrackerConfig::default()
    };
    assert!(TrackingService::new(cfg).is_err());
}
