//! Fixed-size pool of tokio tasks draining a bounded job queue.
//!
//! Jobs are futures producing a [`Response`]. Workers share the receiving
//! half of the input queue; each finished response is published on an
//! unbounded output channel in completion order, with no correlation to the
//! job that produced it. [`WorkerPool::shutdown`] closes the input, lets the
//! workers drain whatever was queued, and joins them. The output channel
//! closes once the last worker exits.

use crate::base::neterror::NetError;
use crate::http::response::Response;
use futures::future::BoxFuture;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

pub const DEFAULT_WORKERS: usize = 100;
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

pub type Job = BoxFuture<'static, Response>;

pub struct WorkerPool {
    input: StdMutex<Option<mpsc::Sender<Job>>>,
    handles: StdMutex<Vec<JoinHandle<()>>>,
    size: usize,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("size", &self.size)
            .field("open", &self.is_open())
            .finish()
    }
}

impl WorkerPool {
    /// Spawn `workers` tasks on the current runtime. Zero values fall back
    /// to the defaults.
    pub fn start(
        workers: usize,
        queue_capacity: usize,
    ) -> Result<(Self, mpsc::UnboundedReceiver<Response>), NetError> {
        let handle = tokio::runtime::Handle::try_current().map_err(|_| NetError::PoolNotStarted)?;
        let size = if workers == 0 { DEFAULT_WORKERS } else { workers };
        let capacity = if queue_capacity == 0 {
            DEFAULT_QUEUE_CAPACITY
        } else {
            queue_capacity
        };

        let (input_tx, input_rx) = mpsc::channel::<Job>(capacity);
        let (output_tx, output_rx) = mpsc::unbounded_channel();
        let input_rx = Arc::new(Mutex::new(input_rx));

        let handles = (0..size)
            .map(|id| handle.spawn(worker_loop(id, input_rx.clone(), output_tx.clone())))
            .collect();
        drop(output_tx);

        debug!(workers = size, capacity, "worker pool started");
        Ok((
            Self {
                input: StdMutex::new(Some(input_tx)),
                handles: StdMutex::new(handles),
                size,
            },
            output_rx,
        ))
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_open(&self) -> bool {
        self.input.lock().map(|g| g.is_some()).unwrap_or(false)
    }

    fn sender(&self) -> Result<mpsc::Sender<Job>, NetError> {
        self.input
            .lock()
            .map_err(|_| NetError::PoolClosed)?
            .clone()
            .ok_or(NetError::PoolClosed)
    }

    /// Queue a job, waiting for room when the queue is full.
    pub async fn submit(&self, job: Job) -> Result<(), NetError> {
        self.sender()?
            .send(job)
            .await
            .map_err(|_| NetError::PoolClosed)
    }

    /// Close the input queue and wait for every worker to finish the jobs
    /// already queued. Calling it twice is harmless.
    pub async fn shutdown(&self) {
        if let Ok(mut input) = self.input.lock() {
            input.take();
        }
        let handles = match self.handles.lock() {
            Ok(mut h) => std::mem::take(&mut *h),
            Err(_) => Vec::new(),
        };
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "worker task panicked");
            }
        }
        debug!(workers = self.size, "worker pool stopped");
    }
}

async fn worker_loop(
    id: usize,
    input: Arc<Mutex<mpsc::Receiver<Job>>>,
    output: mpsc::UnboundedSender<Response>,
) {
    loop {
        let job = {
            let mut rx = input.lock().await;
            rx.recv().await
        };
        let Some(job) = job else {
            trace!(worker = id, "input closed, exiting");
            break;
        };
        let response = job.await;
        if output.send(response).is_err() {
            trace!(worker = id, "output receiver dropped");
        }
    }
}
