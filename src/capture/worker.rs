//! The frame worker and observer fan-out.

use crate::capture::types::{CaptureError, FrameSource, HandPoseExtractor};
use crate::config::CaptureConfig;
use crate::dispatch::ActionDispatcher;
use crate::session::{FrameStatus, SessionController};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Instant;

/// Shared controller handle.
pub type SharedController<D> = Arc<Mutex<SessionController<D>>>;

type ObserverList = Arc<Mutex<Vec<(u64, Sender<FrameStatus>)>>>;

/// An attached observer. Dropping it detaches it from the hub.
pub struct Observer {
    id: u64,
    rx: Receiver<FrameStatus>,
    observers: ObserverList,
}

impl Observer {
    /// Stop receiving statuses.
    pub fn detach(self) {}
}

impl Deref for Observer {
    type Target = Receiver<FrameStatus>;

    fn deref(&self) -> &Self::Target {
        &self.rx
    }
}

impl Drop for Observer {
    fn drop(&mut self) {
        lock(&self.observers).retain(|(id, _)| *id != self.id);
    }
}

/// Runs the frame loop while at least one observer is attached.
pub struct FrameHub<D> {
    controller: SharedController<D>,
    source: Arc<Mutex<Box<dyn FrameSource>>>,
    extractor: Arc<dyn HandPoseExtractor>,
    observers: ObserverList,
    next_observer: AtomicU64,
    worker: Mutex<Option<JoinHandle<()>>>,
    running: Arc<AtomicBool>,
    shutdown: Arc<AtomicBool>,
    config: CaptureConfig,
}

impl<D: ActionDispatcher + 'static> FrameHub<D> {
    pub fn new(
        controller: SharedController<D>,
        source: impl FrameSource + 'static,
        extractor: impl HandPoseExtractor + 'static,
        config: CaptureConfig,
    ) -> Self {
        let source: Box<dyn FrameSource> = Box::new(source);
        let extractor: Arc<dyn HandPoseExtractor> = Arc::new(extractor);
        Self {
            controller,
            source: Arc::new(Mutex::new(source)),
            extractor,
            observers: Arc::new(Mutex::new(Vec::new())),
            next_observer: AtomicU64::new(0),
            worker: Mutex::new(None),
            running: Arc::new(AtomicBool::new(false)),
            shutdown: Arc::new(AtomicBool::new(false)),
            config,
        }
    }

    pub fn controller(&self) -> &SharedController<D> {
        &self.controller
    }

    /// Attach an observer and make sure the worker is running.
    ///
    /// Frames are skipped for this observer while its queue is full. The
    /// worker stops once every observer has been dropped.
    pub fn attach(&self) -> Observer {
        let (tx, rx) = bounded(self.config.observer_capacity.max(1));
        let id = self.next_observer.fetch_add(1, Ordering::SeqCst);
        lock(&self.observers).push((id, tx));
        self.ensure_started();
        Observer {
            id,
            rx,
            observers: Arc::clone(&self.observers),
        }
    }

    pub fn observer_count(&self) -> usize {
        lock(&self.observers).len()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Start the worker unless it is already running. Returns whether a new
    /// worker was spawned.
    pub fn ensure_started(&self) -> bool {
        let mut worker = lock(&self.worker);
        if self.running.load(Ordering::SeqCst) {
            return false;
        }
        if let Some(previous) = worker.take() {
            let _ = previous.join();
        }

        self.shutdown.store(false, Ordering::SeqCst);
        self.running.store(true, Ordering::SeqCst);
        let ctx = WorkerContext {
            controller: Arc::clone(&self.controller),
            source: Arc::clone(&self.source),
            extractor: Arc::clone(&self.extractor),
            observers: Arc::clone(&self.observers),
            running: Arc::clone(&self.running),
            shutdown: Arc::clone(&self.shutdown),
            config: self.config.clone(),
        };
        *worker = Some(std::thread::spawn(move || ctx.run()));
        tracing::info!("Frame worker started");
        true
    }

    /// Stop the worker and wait for it to exit.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = lock(&self.worker).take() {
            let _ = handle.join();
        }
    }

    /// Wait for the worker to exit on its own.
    pub fn join(&self) {
        if let Some(handle) = lock(&self.worker).take() {
            let _ = handle.join();
        }
    }
}

impl<D> Drop for FrameHub<D> {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }
}

struct WorkerContext<D> {
    controller: SharedController<D>,
    source: Arc<Mutex<Box<dyn FrameSource>>>,
    extractor: Arc<dyn HandPoseExtractor>,
    observers: ObserverList,
    running: Arc<AtomicBool>,
    shutdown: Arc<AtomicBool>,
    config: CaptureConfig,
}

impl<D: ActionDispatcher> WorkerContext<D> {
    fn run(self) {
        loop {
            if self.stop_if_unobserved() {
                return;
            }
            if self.shutdown.load(Ordering::SeqCst) {
                break;
            }

            let next = lock(&self.source).next_frame();
            match next {
                Ok(Some(frame)) => {
                    let landmarks = self.extractor.extract(&frame);
                    let status = lock(&self.controller)
                        .process_frame(landmarks.as_ref(), Instant::now());
                    self.broadcast(status);
                    std::thread::sleep(self.config.frame_interval);
                }
                Ok(None) => std::thread::sleep(self.config.empty_frame_backoff),
                Err(CaptureError::Transient(e)) => {
                    tracing::warn!(error = %e, "Capture failed, backing off");
                    std::thread::sleep(self.config.empty_frame_backoff);
                }
                Err(CaptureError::Closed) => {
                    tracing::info!("Frame source closed");
                    break;
                }
            }
        }

        // Dropping the senders disconnects every remaining observer.
        let mut observers = lock(&self.observers);
        observers.clear();
        self.running.store(false, Ordering::SeqCst);
        tracing::info!("Frame worker stopped");
    }

    /// Checked under the observer lock so an attach either sees the worker
    /// still running or lands before it exits.
    fn stop_if_unobserved(&self) -> bool {
        let observers = lock(&self.observers);
        if observers.is_empty() {
            self.running.store(false, Ordering::SeqCst);
            tracing::info!("No observers attached, frame worker stopped");
            return true;
        }
        false
    }

    fn broadcast(&self, status: FrameStatus) {
        lock(&self.observers).retain(|(_, tx)| match tx.try_send(status.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => true,
            Err(TrySendError::Disconnected(_)) => {
                tracing::debug!("Observer disconnected");
                false
            }
        });
    }
}

/// Lock a mutex, recovering the data if a previous holder panicked.
fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
