//! Threaded tracking: producers submit frames, one worker processes them,
//! one publisher hands finished snapshots to consumers.
//!
//! ```text
//! submit() ──try_admit──► jobs (cap 1) ──► worker ──► snapshots ──► publisher ──► latest()/subscribers
//!             │                              ▲
//!             └─ busy: dropped               └── clear commands
//! ```
//!
//! The worker is the only owner of the [`FrameProcessor`] and therefore of
//! all filter state. Producers never block: a frame arriving while a pass is
//! running is discarded without side effects.

use crate::config::{ConfigError, TrackerConfig};
use crate::scheduler::{AdmissionGuard, FrameScheduler};
use crate::tracker::MarkerTracker;
use crossbeam_channel::{bounded, never, select, unbounded, Receiver, Sender, TrySendError};
use marker_pose_core::{CameraIntrinsics, FilteredPose, OwnedImage};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// One camera frame handed to the service.
#[derive(Clone, Debug)]
pub struct Frame {
    pub image: OwnedImage,
    /// Intrinsics at the resolution of `image`.
    pub intrinsics: CameraIntrinsics,
    /// Capture time, seconds.
    pub timestamp: f64,
}

/// Outcome of [`TrackingService::submit`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Submission {
    /// The frame is being processed.
    Accepted,
    /// A pass was already running; the frame was discarded.
    Dropped,
    /// The service is shut down.
    Closed,
}

/// Filtered poses of one processed frame.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct PoseSnapshot {
    /// 1-based count of processed frames; 0 before the first pass completes.
    pub frame_index: u64,
    pub timestamp: f64,
    /// Sorted by marker id.
    pub poses: Vec<FilteredPose>,
}

/// The work done for one admitted frame, plus filter-state maintenance.
pub trait FrameProcessor: Send + 'static {
    fn process_frame(&mut self, frame: &Frame) -> Vec<FilteredPose>;
    fn clear_marker(&mut self, marker_id: u32) -> bool;
    fn clear_all(&mut self);
}

impl FrameProcessor for MarkerTracker {
    fn process_frame(&mut self, frame: &Frame) -> Vec<FilteredPose> {
        self.process(&frame.image.view(), &frame.intrinsics, frame.timestamp)
    }

    fn clear_marker(&mut self, marker_id: u32) -> bool {
        MarkerTracker::clear_marker(self, marker_id)
    }

    fn clear_all(&mut self) {
        MarkerTracker::clear_all(self)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ServiceError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to spawn service thread: {0}")]
    Spawn(#[from] std::io::Error),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Command {
    Clear(u32),
    ClearAll,
}

struct Job {
    frame: Frame,
    guard: AdmissionGuard,
}

type Subscribers = Arc<Mutex<Vec<Sender<Arc<PoseSnapshot>>>>>;

/// Snapshots buffered per subscriber before new ones are skipped for it.
pub const SUBSCRIBER_BACKLOG: usize = 16;

/// Background tracker with single-flight frame admission.
///
/// Dropping the service shuts it down and joins its threads.
pub struct TrackingService {
    scheduler: FrameScheduler,
    jobs: Option<Sender<Job>>,
    commands: Option<Sender<Command>>,
    latest: Arc<RwLock<Arc<PoseSnapshot>>>,
    subscribers: Subscribers,
    worker: Option<JoinHandle<()>>,
    publisher: Option<JoinHandle<()>>,
}

impl TrackingService {
    /// Build a [`MarkerTracker`] from `config` and run it in the background.
    pub fn new(config: TrackerConfig) -> Result<Self, ServiceError> {
        Self::spawn(MarkerTracker::new(config)?)
    }

    /// Run an arbitrary processor in the background.
    pub fn spawn<P: FrameProcessor>(processor: P) -> Result<Self, ServiceError> {
        let (job_tx, job_rx) = bounded::<Job>(1);
        let (cmd_tx, cmd_rx) = unbounded::<Command>();
        let (snap_tx, snap_rx) = unbounded::<PoseSnapshot>();
        let latest = Arc::new(RwLock::new(Arc::new(PoseSnapshot::default())));
        let subscribers: Subscribers = Arc::new(Mutex::new(Vec::new()));

        let publisher = {
            let latest = Arc::clone(&latest);
            let subscribers = Arc::clone(&subscribers);
            thread::Builder::new()
                .name("marker-pose-publisher".to_string())
                .spawn(move || run_publisher(snap_rx, latest, subscribers))?
        };
        let worker = thread::Builder::new()
            .name("marker-pose-worker".to_string())
            .spawn(move || run_worker(processor, job_rx, cmd_rx, snap_tx))?;

        log::debug!("tracking service started");
        Ok(Self {
            scheduler: FrameScheduler::new(),
            jobs: Some(job_tx),
            commands: Some(cmd_tx),
            latest,
            subscribers,
            worker: Some(worker),
            publisher: Some(publisher),
        })
    }

    /// Offer a frame. Never blocks.
    pub fn submit(&self, frame: Frame) -> Submission {
        let Some(jobs) = self.jobs.as_ref() else {
            return Submission::Closed;
        };
        let Some(guard) = self.scheduler.try_admit() else {
            return Submission::Dropped;
        };
        match jobs.try_send(Job { frame, guard }) {
            Ok(()) => Submission::Accepted,
            // The guard travels with the job, so the slot is free whenever
            // admission succeeds; dropping the job here releases the gate.
            Err(TrySendError::Full(_)) => Submission::Dropped,
            Err(TrySendError::Disconnected(_)) => {
                log::warn!("worker is gone; frame discarded");
                Submission::Closed
            }
        }
    }

    /// Most recent published snapshot.
    pub fn latest(&self) -> Arc<PoseSnapshot> {
        Arc::clone(&self.latest.read())
    }

    /// Receive the snapshots published from now on.
    ///
    /// At most [`SUBSCRIBER_BACKLOG`] snapshots wait in the queue; while it is
    /// full, further snapshots skip this subscriber (`latest()` still has
    /// them). The receiver disconnects when the service shuts down.
    pub fn subscribe(&self) -> Receiver<Arc<PoseSnapshot>> {
        let (tx, rx) = bounded(SUBSCRIBER_BACKLOG);
        self.subscribers.lock().push(tx);
        rx
    }

    /// Forget the filter state of one marker before the next pass.
    /// Returns `false` once the service is shut down.
    pub fn clear_marker(&self, marker_id: u32) -> bool {
        self.send_command(Command::Clear(marker_id))
    }

    /// Forget all filter state before the next pass.
    pub fn clear_all(&self) -> bool {
        self.send_command(Command::ClearAll)
    }

    #[inline]
    pub fn scheduler(&self) -> &FrameScheduler {
        &self.scheduler
    }

    /// Close the input, finish the frame in flight and join both threads.
    /// Idempotent.
    pub fn shutdown(&mut self) {
        self.jobs.take();
        self.commands.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("tracking worker panicked");
            }
        }
        if let Some(publisher) = self.publisher.take() {
            if publisher.join().is_err() {
                log::error!("snapshot publisher panicked");
            }
            log::debug!("tracking service stopped");
        }
        self.subscribers.lock().clear();
    }

    fn send_command(&self, cmd: Command) -> bool {
        self.commands
            .as_ref()
            .is_some_and(|tx| tx.send(cmd).is_ok())
    }
}

impl Drop for TrackingService {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn apply_command<P: FrameProcessor>(processor: &mut P, cmd: Command) {
    match cmd {
        Command::Clear(id) => {
            processor.clear_marker(id);
        }
        Command::ClearAll => processor.clear_all(),
    }
}

enum Event {
    Job(Job),
    Command(Command),
    JobsClosed,
    CommandsClosed,
}

fn run_worker<P: FrameProcessor>(
    mut processor: P,
    jobs: Receiver<Job>,
    commands: Receiver<Command>,
    snapshots: Sender<PoseSnapshot>,
) {
    let mut commands = commands;
    let mut frame_index = 0u64;
    loop {
        let event = select! {
            recv(jobs) -> msg => msg.map_or(Event::JobsClosed, Event::Job),
            recv(commands) -> msg => msg.map_or(Event::CommandsClosed, Event::Command),
        };
        match event {
            Event::Job(Job { frame, guard }) => {
                // Every clear queued by now applies to this frame, including
                // ones sent after it was submitted.
                while let Ok(cmd) = commands.try_recv() {
                    apply_command(&mut processor, cmd);
                }
                frame_index += 1;
                let poses = processor.process_frame(&frame);
                log::trace!("frame {frame_index}: {} poses", poses.len());
                let snapshot = PoseSnapshot {
                    frame_index,
                    timestamp: frame.timestamp,
                    poses,
                };
                drop(guard);
                if snapshots.send(snapshot).is_err() {
                    break;
                }
            }
            Event::Command(cmd) => apply_command(&mut processor, cmd),
            Event::CommandsClosed => commands = never(),
            Event::JobsClosed => break,
        }
    }
}

fn run_publisher(
    snapshots: Receiver<PoseSnapshot>,
    latest: Arc<RwLock<Arc<PoseSnapshot>>>,
    subscribers: Subscribers,
) {
    for snapshot in snapshots.iter() {
        let snapshot = Arc::new(snapshot);
        *latest.write() = Arc::clone(&snapshot);
        subscribers
            .lock()
            .retain(|tx| match tx.try_send(Arc::clone(&snapshot)) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    log::trace!("subscriber backlog full; frame {} skipped", snapshot.frame_index);
                    true
                }
                Err(TrySendError::Disconnected(_)) => false,
            });
    }
}
