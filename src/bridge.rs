use crate::error::{CameraError, CameraResult};
use crate::platform::AvailabilityCallback;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Notify};
use tracing::{debug, trace};

/// Resumes a waiting caller exactly once.
///
/// The first `resume` delivers its value; every later call is handed its value
/// back so the caller can dispose of it (e.g. close a device that was opened
/// after the waiter gave up).
pub struct SingleResume<T> {
    sender: Mutex<Option<oneshot::Sender<T>>>,
}

impl<T> SingleResume<T> {
    pub fn resume(&self, value: T) -> Result<(), T> {
        match self.sender.lock().take() {
            Some(sender) => sender.send(value),
            None => Err(value),
        }
    }

    pub fn is_resumed(&self) -> bool {
        self.sender.lock().is_none()
    }
}

/// Receiving half of a [`SingleResume`]
pub struct Pending<T> {
    receiver: oneshot::Receiver<T>,
}

pub fn single_resume<T>() -> (Arc<SingleResume<T>>, Pending<T>) {
    let (sender, receiver) = oneshot::channel();
    (
        Arc::new(SingleResume {
            sender: Mutex::new(Some(sender)),
        }),
        Pending { receiver },
    )
}

impl<T> Pending<T> {
    /// Wait for the resumption, bounded by `timeout`.
    ///
    /// A resumer dropped without firing maps to `CameraUnknown`.
    pub async fn wait(self, operation: &str, timeout: Duration) -> CameraResult<T> {
        match tokio::time::timeout(timeout, self.receiver).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_)) => {
                debug!("{} callback dropped without firing", operation);
                Err(CameraError::CameraUnknown)
            }
            Err(_) => Err(CameraError::timeout(operation, timeout)),
        }
    }
}

/// Run `future` under a deadline, mapping expiry to `OperationTimeout`
pub async fn with_deadline<F, T>(operation: &str, timeout: Duration, future: F) -> CameraResult<T>
where
    F: Future<Output = CameraResult<T>>,
{
    match tokio::time::timeout(timeout, future).await {
        Ok(result) => result,
        Err(_) => Err(CameraError::timeout(operation, timeout)),
    }
}

/// Repeat `poll` until it reports a terminal state or `timeout` passes.
///
/// `poll` returns `Ok(true)` once the terminal state is reached. Between
/// attempts the task sleeps for `interval` so a slow device cannot peg the
/// runtime.
pub async fn poll_until<F, Fut>(
    operation: &str,
    timeout: Duration,
    interval: Duration,
    mut poll: F,
) -> CameraResult<u32>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = CameraResult<bool>>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            return Err(CameraError::timeout(operation, timeout));
        }

        let done = match tokio::time::timeout(remaining, poll()).await {
            Ok(result) => result?,
            Err(_) => return Err(CameraError::timeout(operation, timeout)),
        };
        trace!("{} attempt {} converged={}", operation, attempts, done);
        if done {
            return Ok(attempts);
        }

        if tokio::time::Instant::now() + interval >= deadline {
            return Err(CameraError::timeout(operation, timeout));
        }
        tokio::time::sleep(interval).await;
    }
}

/// Tracks which cameras the platform reports as available.
///
/// Registered as the platform's hot-plug callback; `open` waits on it.
#[derive(Default)]
pub struct AvailabilityTracker {
    available: Mutex<HashSet<String>>,
    changed: Notify,
}

impl AvailabilityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_available(&self, camera_id: &str) -> bool {
        self.available.lock().contains(camera_id)
    }

    /// Wait until `camera_id` is available, polling every `interval` up to `timeout`
    pub async fn wait_available(
        &self,
        camera_id: &str,
        timeout: Duration,
        interval: Duration,
    ) -> CameraResult<()> {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            let notified = self.changed.notified();
            if self.is_available(camera_id) {
                return Ok(());
            }

            let now = tokio::time::Instant::now();
            if now >= deadline {
                debug!("Camera {} not available after {:?}", camera_id, timeout);
                return Err(CameraError::CameraNotAvailable {
                    camera_id: camera_id.to_string(),
                });
            }

            let wait = interval.min(deadline - now);
            let _ = tokio::time::timeout(wait, notified).await;
        }
    }
}

impl AvailabilityCallback for AvailabilityTracker {
    fn on_available(&self, camera_id: &str) {
        trace!("Camera {} available", camera_id);
        self.available.lock().insert(camera_id.to_string());
        self.changed.notify_waiters();
    }

    fn on_unavailable(&self, camera_id: &str) {
        trace!("Camera {} unavailable", camera_id);
        self.available.lock().remove(camera_id);
        self.changed.notify_waiters();
    }
}
