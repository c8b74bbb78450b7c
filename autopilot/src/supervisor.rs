//! At most one active run, executed on a background thread.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use anyhow::Result;
use tracing::{error, info, warn};

use crate::io::roadmap::is_mvp_reached;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// One pass.
    Once,
    /// Up to `n` passes.
    Iterations(u32),
    /// One pass of a job that loops internally until its own stop condition.
    Continuous,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    pub mode: RunMode,
    pub yolo: bool,
    /// Check the roadmap before every pass and stop once the MVP is reached.
    pub stop_at_mvp: bool,
    pub roadmap_path: PathBuf,
}

impl RunRequest {
    pub fn passes(&self) -> u32 {
        match self.mode {
            RunMode::Iterations(n) => n,
            RunMode::Once | RunMode::Continuous => 1,
        }
    }
}

/// Owns the active-run slot.
///
/// Starting checks and fills the slot under one lock; the worker clears it when
/// it exits, including on error or panic. Each run gets an id so a worker that
/// outlives a `reset` cannot clear a later run's slot.
#[derive(Clone, Default)]
pub struct RunSupervisor {
    slot: Arc<Mutex<RunSlot>>,
}

#[derive(Default)]
struct RunSlot {
    next_id: u64,
    active: Option<(u64, RunRequest)>,
}

fn lock(slot: &Mutex<RunSlot>) -> MutexGuard<'_, RunSlot> {
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

struct ClearOnDrop {
    slot: Arc<Mutex<RunSlot>>,
    id: u64,
}

impl Drop for ClearOnDrop {
    fn drop(&mut self) {
        let mut slot = lock(&self.slot);
        if slot.active.as_ref().is_some_and(|(id, _)| *id == self.id) {
            slot.active = None;
        }
    }
}

impl RunSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start `job` on a worker thread, or return `None` when a run is active.
    pub fn start<F>(&self, request: RunRequest, mut job: F) -> Option<JoinHandle<()>>
    where
        F: FnMut(&RunRequest) -> Result<()> + Send + 'static,
    {
        let id = {
            let mut slot = lock(&self.slot);
            if let Some((_, active)) = slot.active.as_ref() {
                warn!(mode = ?active.mode, "run already in progress, rejecting start");
                return None;
            }
            slot.next_id += 1;
            let id = slot.next_id;
            slot.active = Some((id, request.clone()));
            id
        };
        let guard = ClearOnDrop {
            slot: Arc::clone(&self.slot),
            id,
        };
        let spawned = thread::Builder::new()
            .name("autopilot-run".to_string())
            .spawn(move || {
                let _guard = guard;
                run_passes(&request, &mut job);
            });
        match spawned {
            Ok(handle) => Some(handle),
            Err(err) => {
                error!(err = %err, "failed to spawn run thread");
                None
            }
        }
    }

    pub fn is_running(&self) -> bool {
        lock(&self.slot).active.is_some()
    }

    pub fn current(&self) -> Option<RunRequest> {
        lock(&self.slot).active.as_ref().map(|(_, request)| request.clone())
    }

    /// Clear the slot. A running worker is not interrupted.
    pub fn reset(&self) {
        if lock(&self.slot).active.take().is_some() {
            warn!("run slot reset while a run was recorded as active");
        }
    }
}

fn run_passes(request: &RunRequest, job: &mut dyn FnMut(&RunRequest) -> Result<()>) {
    let passes = request.passes();
    for pass in 1..=passes {
        if request.stop_at_mvp && is_mvp_reached(&request.roadmap_path) {
            info!(pass, "MVP reached, not starting another pass");
            return;
        }
        info!(pass, passes, yolo = request.yolo, "starting run pass");
        if let Err(err) = job(request) {
            error!(pass, err = %format!("{err:#}"), "run pass failed");
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::mpsc;

    fn request(mode: RunMode, roadmap: PathBuf) -> RunRequest {
        RunRequest {
            mode,
            yolo: true,
            stop_at_mvp: false,
            roadmap_path: roadmap,
        }
    }

    #[test]
    fn second_start_is_rejected_while_running() {
        let supervisor = RunSupervisor::new();
        let (release, gate) = mpsc::channel::<()>();
        let handle = supervisor
            .start(request(RunMode::Once, PathBuf::from("ROADMAP.md")), move |_| {
                gate.recv().map_err(|err| anyhow!(err))
            })
            .expect("first start");
        assert!(supervisor.is_running());
        assert_eq!(supervisor.current().map(|r| r.mode), Some(RunMode::Once));
        assert!(supervisor.start(request(RunMode::Once, PathBuf::from("ROADMAP.md")), |_| Ok(())).is_none());

        release.send(()).expect("release");
        handle.join().expect("join");
        assert!(!supervisor.is_running());
    }

    #[test]
    fn iterations_run_n_passes_and_stop_on_error() {
        let supervisor = RunSupervisor::new();
        let count = Arc::new(AtomicU32::new(0));
        let seen = Arc::clone(&count);
        supervisor
            .start(request(RunMode::Iterations(3), PathBuf::from("ROADMAP.md")), move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .expect("start")
            .join()
            .expect("join");
        assert_eq!(count.load(Ordering::SeqCst), 3);

        let seen = Arc::clone(&count);
        supervisor
            .start(request(RunMode::Iterations(3), PathBuf::from("ROADMAP.md")), move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
                Err(anyhow!("model unavailable"))
            })
            .expect("start")
            .join()
            .expect("join");
        assert_eq!(count.load(Ordering::SeqCst), 4);
        assert!(!supervisor.is_running());
    }

    #[test]
    fn panicking_job_still_clears_the_slot() {
        let supervisor = RunSupervisor::new();
        let handle = supervisor
            .start(request(RunMode::Once, PathBuf::from("ROADMAP.md")), |_| panic!("job blew up"))
            .expect("start");
        assert!(handle.join().is_err());
        assert!(!supervisor.is_running());
        assert!(supervisor.start(request(RunMode::Once, PathBuf::from("ROADMAP.md")), |_| Ok(())).is_some());
    }

    #[test]
    fn stop_at_mvp_skips_passes() {
        let temp = tempfile::tempdir().expect("tempdir");
        let roadmap = temp.path().join("ROADMAP.md");
        std::fs::write(&roadmap, "## Launch (MVP)\n- [x] ship\n").expect("write");
        let supervisor = RunSupervisor::new();
        let count = Arc::new(AtomicU32::new(0));
        let seen = Arc::clone(&count);
        let mut req = request(RunMode::Iterations(5), roadmap);
        req.stop_at_mvp = true;
        supervisor
            .start(req, move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .expect("start")
            .join()
            .expect("join");
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn reset_clears_a_stale_slot() {
        let supervisor = RunSupervisor::new();
        lock(&supervisor.slot).active = Some((0, request(RunMode::Continuous, PathBuf::from("ROADMAP.md"))));
        assert!(supervisor.is_running());
        supervisor.reset();
        assert!(supervisor.current().is_none());
    }

    #[test]
    fn reset_run_finishing_late_keeps_the_newer_run_active() {
        let supervisor = RunSupervisor::new();
        let (release_first, first_gate) = mpsc::channel::<()>();
        let first = supervisor
            .start(request(RunMode::Once, PathBuf::from("ROADMAP.md")), move |_| {
                first_gate.recv().map_err(|err| anyhow!(err))
            })
            .expect("first start");
        supervisor.reset();

        let (release_second, second_gate) = mpsc::channel::<()>();
        let second = supervisor
            .start(request(RunMode::Iterations(2), PathBuf::from("ROADMAP.md")), move |_| {
                second_gate.recv().map_err(|err| anyhow!(err))
            })
            .expect("second start");

        release_first.send(()).expect("release first");
        first.join().expect("join first");
        assert!(supervisor.is_running());
        assert_eq!(supervisor.current().map(|r| r.mode), Some(RunMode::Iterations(2)));
        assert!(supervisor.start(request(RunMode::Once, PathBuf::from("ROADMAP.md")), |_| Ok(())).is_none());

        release_second.send(()).expect("release second");
        release_second.send(()).expect("release second pass");
        second.join().expect("join second");
        assert!(!supervisor.is_running());
    }
}
