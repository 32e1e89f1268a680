use std::{
    thread,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    }
};

use crossbeam::channel::{self, Receiver};
use tracing::{debug, warn};

use crate::data::{DataSource, Image, InMemorySource, LabeledBatch};
use crate::error::{CrowdError, Result};

/// Runs the labeled and unlabeled streams of an [`InMemorySource`] on their
/// own worker threads, each keeping up to `depth` batches ready in a bounded
/// channel. Dropping the source stops the workers.
pub struct PrefetchingSource {
    labeled: Receiver<LabeledBatch>,
    unlabeled: Receiver<Vec<Image>>,
    stopped: Arc<AtomicBool>,
}

impl PrefetchingSource {

    pub fn spawn(source: InMemorySource, depth: usize) -> Self {
        let stopped = Arc::new(AtomicBool::new(false));
        let (mut labeled, mut unlabeled) = source.into_streams();
        PrefetchingSource {
            labeled: spawn_stream(
                "labeled",
                move || LabeledBatch::from_examples(labeled.next_batch()),
                depth,
                stopped.clone(),
            ),
            unlabeled: spawn_stream(
                "unlabeled",
                move || unlabeled.next_batch(),
                depth,
                stopped.clone(),
            ),
            stopped,
        }
    }

}

fn spawn_stream<T, F>(name: &'static str, mut produce: F, depth: usize, stopped: Arc<AtomicBool>) -> Receiver<T>
    where T: Send + 'static,
          F: FnMut() -> T + Send + 'static
{
    let (sender, receiver) = channel::bounded(depth.max(1));
    thread::spawn(move || {
        debug!(stream = name, "prefetch worker started");
        while !stopped.load(Ordering::Relaxed) {
            if sender.send(produce()).is_err() {
                // consumer hung up
                break;
            }
        }
        debug!(stream = name, "prefetch worker stopped");
    });
    receiver
}

impl DataSource for PrefetchingSource {

    fn next_labeled_batch(&mut self) -> Result<LabeledBatch> {
        self.labeled.recv().map_err(|_| {
            warn!("labeled prefetch worker is gone");
            CrowdError::SourceDisconnected("labeled")
        })
    }

    fn next_unlabeled_batch(&mut self) -> Result<Vec<Image>> {
        self.unlabeled.recv().map_err(|_| {
            warn!("unlabeled prefetch worker is gone");
            CrowdError::SourceDisconnected("unlabeled")
        })
    }

}

impl Drop for PrefetchingSource {
    fn drop(&mut self) {
        self.stopped.store(true, Ordering::Relaxed);
    }
}
