//! Progress reporting: a reporter thread that owns the status and publishes throttled
//! snapshots to an observer, plus a kdam progress bar observer for the CLI.

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError, bounded};
use kdam::{Animation, Bar, BarExt};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::utils::config::PipelineConsts;
use crate::{FeedbackRow, Preview};

/// Immutable copy of the progress status handed to an observer.
#[derive(Clone, Debug, Default)]
pub struct ProgressSnapshot {
    pub job: String,
    /// Files completed when the snapshot was taken. Never decreases between publishes.
    pub index: usize,
    pub total: usize,
    /// Most recent per-file feedback seen by the reporter.
    pub latest: Option<FeedbackRow>,
    /// Most recent preview, if the job produces any.
    pub preview: Option<Arc<Preview>>,
    /// 1-based publish counter.
    pub sequence: u64,
    pub published_at: Option<Instant>,
    /// Set on the closing publish of a run.
    pub is_final: bool,
}

impl ProgressSnapshot {
    pub fn percent(&self) -> f64 {
        (self.index as f64 / self.total.max(1) as f64 * 100.0).min(100.0)
    }
}

/// Receives snapshots. Called from the reporter thread only, one publish at a time.
pub trait ProgressObserver: Send {
    fn publish(&mut self, snapshot: &ProgressSnapshot);
}

impl<F> ProgressObserver for F
where
    F: FnMut(&ProgressSnapshot) + Send,
{
    fn publish(&mut self, snapshot: &ProgressSnapshot) {
        self(snapshot)
    }
}

/// Observer that discards everything.
pub struct NullObserver;

impl ProgressObserver for NullObserver {
    fn publish(&mut self, _snapshot: &ProgressSnapshot) {}
}

const NEVER: u64 = u64::MAX;

/// Lock-free minimum-interval gate shared by many threads.
///
/// [`try_claim`](Throttle::try_claim) first reads the last claim time without synchronising;
/// only when the interval has elapsed does it compare-exchange, so at most one caller wins
/// each interval.
#[derive(Debug)]
pub struct Throttle {
    origin: Instant,
    interval_ms: u64,
    last_ms: AtomicU64,
}

impl Throttle {
    pub fn new(interval: Duration) -> Self {
        Self {
            origin: Instant::now(),
            interval_ms: interval.as_millis() as u64,
            last_ms: AtomicU64::new(NEVER),
        }
    }

    /// Like [`new`](Throttle::new), but the first interval counts from now instead of being
    /// open immediately.
    pub fn starting_now(interval: Duration) -> Self {
        Self {
            origin: Instant::now(),
            interval_ms: interval.as_millis() as u64,
            last_ms: AtomicU64::new(0),
        }
    }

    /// True for exactly one caller per elapsed interval (and for the very first caller).
    pub fn try_claim(&self) -> bool {
        let now = self.origin.elapsed().as_millis() as u64;
        let last = self.last_ms.load(Ordering::Relaxed);
        if last != NEVER && now.saturating_sub(last) < self.interval_ms {
            return false;
        }
        self.last_ms
            .compare_exchange(last, now, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
    }
}

enum ProgressMsg {
    Feedback(FeedbackRow),
    Preview(Preview),
}

/// Worker-side handle: counts completed files and forwards throttled updates to the reporter.
#[derive(Clone)]
pub struct ProgressHandle {
    tx: Sender<ProgressMsg>,
    completed: Arc<AtomicUsize>,
    status: Arc<Throttle>,
    preview: Arc<Throttle>,
}

impl ProgressHandle {
    /// Count one finished file; build and send its feedback only when the status throttle allows.
    /// A count that loses the claim is picked up by the reporter's next tick.
    pub fn file_done(&self, feedback: impl FnOnce() -> FeedbackRow) {
        self.completed.fetch_add(1, Ordering::AcqRel);
        if self.status.try_claim() {
            self.send(ProgressMsg::Feedback(feedback()));
        }
    }

    /// Whether a worker should compose a preview now. Claims the preview interval when true.
    pub fn preview_due(&self) -> bool {
        self.preview.try_claim()
    }

    pub fn send_preview(&self, preview: Preview) {
        self.send(ProgressMsg::Preview(preview));
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::Acquire)
    }

    fn send(&self, msg: ProgressMsg) {
        // A full channel means the reporter is behind; it publishes the newest state anyway.
        if let Err(TrySendError::Disconnected(_)) = self.tx.try_send(msg) {
            log::debug!("progress reporter gone; dropping update");
        }
    }
}

/// Reporter-owned mutable status. Only the reporter thread touches it, so a publish can never
/// overlap another one.
struct ProgressStatus {
    snapshot: ProgressSnapshot,
}

impl ProgressStatus {
    fn apply(&mut self, msg: ProgressMsg) {
        match msg {
            ProgressMsg::Feedback(row) => self.snapshot.latest = Some(row),
            ProgressMsg::Preview(p) => self.snapshot.preview = Some(Arc::new(p)),
        }
    }

    fn publish(&mut self, observer: &mut dyn ProgressObserver, completed: usize) {
        self.snapshot.index = self.snapshot.index.max(completed);
        self.snapshot.sequence += 1;
        self.snapshot.published_at = Some(Instant::now());
        observer.publish(&self.snapshot);
    }
}

/// Returned by the reporter thread when the run ends.
#[derive(Clone, Debug)]
pub struct ReporterSummary {
    pub final_status: ProgressSnapshot,
    pub publishes: u64,
}

/// Shortest reporter wake-up period.
const MIN_TICK: Duration = Duration::from_millis(1);

fn run_reporter(
    rx: Receiver<ProgressMsg>,
    completed: Arc<AtomicUsize>,
    mut status: ProgressStatus,
    mut observer: Box<dyn ProgressObserver>,
    status_interval: Duration,
) -> ReporterSummary {
    let tick = status_interval.max(MIN_TICK);
    loop {
        match rx.recv_timeout(tick) {
            Ok(msg) => {
                status.apply(msg);
                // Coalesce whatever queued up while the previous publish was running.
                while let Ok(msg) = rx.try_recv() {
                    status.apply(msg);
                }
                status.publish(observer.as_mut(), completed.load(Ordering::Acquire));
            }
            Err(RecvTimeoutError::Timeout) => {
                // Completions that lost the throttle claim inside the last interval.
                let done = completed.load(Ordering::Acquire);
                if done > status.snapshot.index {
                    status.publish(observer.as_mut(), done);
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    status.snapshot.is_final = true;
    status.publish(observer.as_mut(), completed.load(Ordering::Acquire));
    ReporterSummary {
        publishes: status.snapshot.sequence,
        final_status: status.snapshot,
    }
}

/// Start the reporter thread for a job over `total` files.
/// The reporter publishes a final snapshot once every [`ProgressHandle`] is dropped.
pub fn spawn_reporter(
    job: &str,
    total: usize,
    observer: Box<dyn ProgressObserver>,
    status_interval: Duration,
    preview_interval: Duration,
) -> (ProgressHandle, JoinHandle<ReporterSummary>) {
    let (tx, rx) = bounded(PipelineConsts::STATUS_CHANNEL_CAP);
    let completed = Arc::new(AtomicUsize::new(0));
    let handle = ProgressHandle {
        tx,
        completed: Arc::clone(&completed),
        status: Arc::new(Throttle::new(status_interval)),
        preview: Arc::new(Throttle::new(preview_interval)),
    };
    let status = ProgressStatus {
        snapshot: ProgressSnapshot {
            job: job.to_string(),
            total,
            ..Default::default()
        },
    };
    let join =
        thread::spawn(move || run_reporter(rx, completed, status, observer, status_interval));
    (handle, join)
}

// ---- CLI progress bar ----

/// Observer that drives a kdam progress bar.
pub struct BarObserver {
    bar: Bar,
}

impl BarObserver {
    pub fn new(desc: &'static str, total: usize) -> Self {
        Self {
            bar: kdam::tqdm!(
                total = total,
                desc = desc,
                animation = Animation::Classic,
                unit = " files"
            ),
        }
    }
}

impl ProgressObserver for BarObserver {
    fn publish(&mut self, snapshot: &ProgressSnapshot) {
        self.bar.total = snapshot.total;
        if let Some(row) = &snapshot.latest {
            self.bar.set_postfix(format!("{}: {}", row.file, row.message));
        }
        let _ = self.bar.update_to(snapshot.index);
        if snapshot.is_final {
            let _ = self.bar.refresh();
            eprintln!();
        }
    }
}

/// Observer that logs feedback rows at debug level (non-verbose CLI).
pub struct LogObserver;

impl ProgressObserver for LogObserver {
    fn publish(&mut self, snapshot: &ProgressSnapshot) {
        if let Some(row) = &snapshot.latest {
            log::debug!(
                "[{}/{}] {}: {}",
                snapshot.index,
                snapshot.total,
                row.file,
                row.message
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;

    #[test]
    fn throttle_admits_one_caller_per_interval() {
        let throttle = Arc::new(Throttle::new(Duration::from_secs(3600)));
        let start = Arc::new(Barrier::new(8));
        let winners: usize = (0..8)
            .map(|_| {
                let throttle = Arc::clone(&throttle);
                let start = Arc::clone(&start);
                thread::spawn(move || {
                    start.wait();
                    (0..1000).filter(|_| throttle.try_claim()).count()
                })
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|h| h.join().unwrap())
            .sum();
        assert_eq!(winners, 1);
    }

    #[test]
    fn throttle_reopens_after_interval() {
        let throttle = Throttle::new(Duration::from_millis(20));
        assert!(throttle.try_claim());
        assert!(!throttle.try_claim());
        thread::sleep(Duration::from_millis(30));
        assert!(throttle.try_claim());
    }

    #[test]
    fn throttle_starting_now_waits_first_interval() {
        let throttle = Throttle::starting_now(Duration::from_millis(20));
        assert!(!throttle.try_claim());
        thread::sleep(Duration::from_millis(30));
        assert!(throttle.try_claim());
    }

    #[test]
    fn reporter_publishes_counts_that_lost_the_claim() {
        let seen: Arc<std::sync::Mutex<Vec<usize>>> = Arc::default();
        let observer = {
            let seen = Arc::clone(&seen);
            move |s: &ProgressSnapshot| seen.lock().unwrap().push(s.index)
        };
        let (handle, join) = spawn_reporter(
            "test",
            3,
            Box::new(observer),
            Duration::from_millis(20),
            Duration::from_secs(3600),
        );
        let row = || FeedbackRow {
            file: "f".into(),
            message: "ok".into(),
        };
        handle.file_done(row);
        handle.file_done(row);
        thread::sleep(Duration::from_millis(200));
        assert!(seen.lock().unwrap().contains(&2));
        drop(handle);
        let summary = join.join().unwrap();
        assert_eq!(summary.final_status.index, 2);
        assert!(summary.final_status.is_final);
    }
}
