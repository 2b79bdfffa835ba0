use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender, TrySendError};

use crate::detection::domain::detection::TrackId;
use crate::recognition::domain::recognizer::{
    AttemptDispatcher, AttemptOutcome, AttemptReport, AttemptRequest, Recognizer,
};

/// Pending jobs allowed per worker before `dispatch` starts refusing.
const QUEUE_SLOTS_PER_WORKER: usize = 2;

/// Runs recognition attempts on a fixed set of worker threads.
///
/// Layout: `resolver → [bounded job queue] → workers → [report channel] → resolver`
///
/// At most one attempt per track id is queued or running at a time. A track
/// leaves the in-flight set only when its report is drained, so the owner
/// sees every result before a new attempt for that id can start.
pub struct RecognitionPool {
    job_tx: Option<Sender<AttemptRequest>>,
    report_rx: Receiver<AttemptReport>,
    in_flight: HashSet<TrackId>,
    workers: Vec<JoinHandle<()>>,
}

impl RecognitionPool {
    pub fn new(recognizer: Recognizer, num_workers: usize) -> Self {
        let num_workers = num_workers.max(1);
        let (job_tx, job_rx) =
            crossbeam_channel::bounded::<AttemptRequest>(num_workers * QUEUE_SLOTS_PER_WORKER);
        let (report_tx, report_rx) = crossbeam_channel::unbounded::<AttemptReport>();

        let workers = (0..num_workers)
            .map(|_| spawn_worker(recognizer.clone(), job_rx.clone(), report_tx.clone()))
            .collect();
        log::debug!("Recognition pool started with {num_workers} workers");

        Self {
            job_tx: Some(job_tx),
            report_rx,
            in_flight: HashSet::new(),
            workers,
        }
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }
}

impl AttemptDispatcher for RecognitionPool {
    fn dispatch(&mut self, request: AttemptRequest) -> bool {
        if self.in_flight.contains(&request.track_id) {
            return false;
        }
        let Some(job_tx) = &self.job_tx else {
            return false;
        };
        let track_id = request.track_id;
        match job_tx.try_send(request) {
            Ok(()) => {
                self.in_flight.insert(track_id);
                true
            }
            Err(TrySendError::Full(_)) => {
                log::debug!("Recognition queue full, deferring track {track_id}");
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    fn drain_completed(&mut self) -> Vec<AttemptReport> {
        let reports: Vec<AttemptReport> = self.report_rx.try_iter().collect();
        for report in &reports {
            self.in_flight.remove(&report.track_id);
        }
        reports
    }
}

impl Drop for RecognitionPool {
    fn drop(&mut self) {
        // Closing the job channel ends each worker's receive loop.
        self.job_tx.take();
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                log::warn!("Recognition worker panicked");
            }
        }
    }
}

fn spawn_worker(
    recognizer: Recognizer,
    jobs: Receiver<AttemptRequest>,
    reports: Sender<AttemptReport>,
) -> JoinHandle<()> {
    std::thread::spawn(move || {
        for request in jobs.iter() {
            // A panicking attempt must still report, or its track stays in flight forever.
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                recognizer.recognize(&request.crop)
            }))
            .unwrap_or_else(|_| {
                log::error!("Recognition worker panicked on track {}", request.track_id);
                AttemptOutcome::Failed("recognition worker panicked".to_string())
            });
            let report = AttemptReport {
                track_id: request.track_id,
                generation: request.generation,
                outcome,
            };
            if reports.send(report).is_err() {
                break;
            }
        }
    })
}
