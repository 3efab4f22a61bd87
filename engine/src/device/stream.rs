use std::{
    any::Any,
    fmt,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
};

use parking_lot::{Condvar, Mutex};
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::{EngineErr, Result};

#[derive(Default)]
struct Pending {
    count: Mutex<usize>,
    idle: Condvar,
    fault: Mutex<Option<String>>,
}

impl Pending {
    fn record_fault(&self, detail: String) {
        let mut fault = self.fault.lock();
        if fault.is_none() {
            *fault = Some(detail);
        }
    }

    fn finish(&self) {
        let mut count = self.count.lock();
        *count -= 1;
        if *count == 0 {
            self.idle.notify_all();
        }
    }
}

/// The ordered execution queue of a single device.
///
/// Work submitted to a stream runs on one dedicated thread in submission
/// order. A panic inside stream work faults the stream, and every later
/// call on it reports `DeviceFault`.
pub struct Stream {
    device: usize,
    pool: ThreadPool,
    pending: Arc<Pending>,
}

impl Stream {
    /// Creates a new `Stream` for the given device.
    pub fn new(device: usize) -> Result<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(1)
            .thread_name(move |_| format!("device-{device}-stream"))
            .build()
            .map_err(|e| EngineErr::DeviceFault {
                device,
                detail: e.to_string(),
            })?;

        Ok(Self {
            device,
            pool,
            pending: Arc::default(),
        })
    }

    /// Runs `f` on the stream once every previously enqueued job is done and
    /// blocks until it completes.
    ///
    /// # Arguments
    /// * `f` - The work to run.
    ///
    /// # Returns
    /// The output of `f` or `DeviceFault` if the stream is or becomes faulted.
    pub fn run<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce() -> Result<T> + Send,
        T: Send,
    {
        self.synchronize()?;

        match self.pool.install(|| panic::catch_unwind(AssertUnwindSafe(f))) {
            Ok(result) => result,
            Err(payload) => {
                let detail = panic_detail(payload.as_ref());
                self.pending.record_fault(detail.clone());
                Err(EngineErr::DeviceFault {
                    device: self.device,
                    detail,
                })
            }
        }
    }

    /// Enqueues `f` on the stream without waiting for it.
    ///
    /// Completion is only guaranteed after `synchronize` returns.
    pub fn enqueue<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        *self.pending.count.lock() += 1;

        let pending = Arc::clone(&self.pending);
        self.pool.spawn(move || {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(f)) {
                pending.record_fault(panic_detail(payload.as_ref()));
            }

            pending.finish();
        });
    }

    /// Blocks until every enqueued job has completed.
    ///
    /// # Returns
    /// `DeviceFault` if any work on this stream has ever panicked.
    pub fn synchronize(&self) -> Result<()> {
        let mut count = self.pending.count.lock();
        while *count > 0 {
            self.pending.idle.wait(&mut count);
        }
        drop(count);

        self.check_fault()
    }

    pub fn is_faulted(&self) -> bool {
        self.pending.fault.lock().is_some()
    }

    fn check_fault(&self) -> Result<()> {
        match self.pending.fault.lock().as_ref() {
            Some(detail) => Err(EngineErr::DeviceFault {
                device: self.device,
                detail: detail.clone(),
            }),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stream")
            .field("device", &self.device)
            .field("faulted", &self.is_faulted())
            .finish()
    }
}

fn panic_detail(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "stream work panicked".to_string()
    }
}
