//! Single background slot for mutating disk operations.

use crate::disk::error::{DiskError, DiskResult};
use crate::disk::session::{DiskOutcome, DiskRequest, DiskSession};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;

#[derive(Debug)]
pub enum WorkerEvent {
    Started { description: String },
    Progress { message: String },
    Finished { result: DiskResult<DiskOutcome> },
}

/// Clears the busy flag however the operation ends.
struct BusyGuard(Arc<AtomicBool>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Runs one request at a time on the blocking pool and streams its events
/// back. A second submission while one is running fails with `Busy`.
#[derive(Clone)]
pub struct DiskWorker {
    session: Arc<DiskSession>,
    busy: Arc<AtomicBool>,
}

impl DiskWorker {
    pub fn new(session: DiskSession) -> Self {
        Self {
            session: Arc::new(session),
            busy: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Must be called from within a tokio runtime.
    pub fn submit(&self, request: DiskRequest) -> DiskResult<mpsc::UnboundedReceiver<WorkerEvent>> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(DiskError::Busy);
        }
        let guard = BusyGuard(self.busy.clone());

        let (tx, rx) = mpsc::unbounded_channel();
        let session = self.session.clone();
        tokio::task::spawn_blocking(move || {
            let _ = tx.send(WorkerEvent::Started {
                description: request.describe(),
            });
            let result = session.execute_with_progress(&request, &mut |message| {
                let _ = tx.send(WorkerEvent::Progress { message });
            });
            // Free the slot before reporting, so a caller reacting to
            // `Finished` can submit the next request right away.
            drop(guard);
            let _ = tx.send(WorkerEvent::Finished { result });
        });
        Ok(rx)
    }

    /// Submit and wait, forwarding events to `on_event`. Returns the final result.
    pub async fn run(
        &self,
        request: DiskRequest,
        mut on_event: impl FnMut(&WorkerEvent),
    ) -> DiskResult<DiskOutcome> {
        let mut events = self.submit(request)?;
        while let Some(event) = events.recv().await {
            on_event(&event);
            if let WorkerEvent::Finished { result } = event {
                return result;
            }
        }
        Err(DiskError::Io(std::io::Error::other(
            "disk worker stopped without reporting a result",
        )))
    }
}
