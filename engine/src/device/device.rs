use std::sync::atomic::{AtomicUsize, Ordering};

use super::Stream;
use crate::{EngineErr, Result};

/// A simulated accelerator: a memory budget plus an ordered execution stream.
#[derive(Debug)]
pub struct Device {
    id: usize,
    memory_limit: usize,
    allocated: AtomicUsize,
    stream: Stream,
}

impl Device {
    /// Creates a new `Device`.
    ///
    /// # Arguments
    /// * `id` - The identifier of the device.
    /// * `memory_limit` - The amount of bytes the device can hand out.
    ///
    /// # Returns
    /// A new `Device` or an error if its stream could not be started.
    pub fn new(id: usize, memory_limit: usize) -> Result<Self> {
        Ok(Self {
            id,
            memory_limit,
            allocated: AtomicUsize::new(0),
            stream: Stream::new(id)?,
        })
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn stream(&self) -> &Stream {
        &self.stream
    }

    pub fn memory_limit(&self) -> usize {
        self.memory_limit
    }

    /// The amount of bytes currently held by live buffers.
    pub fn allocated(&self) -> usize {
        self.allocated.load(Ordering::Acquire)
    }

    /// Takes `bytes` out of the device's budget.
    ///
    /// # Returns
    /// `OutOfMemory` if the budget can't satisfy the request.
    pub(crate) fn reserve(&self, bytes: usize) -> Result<()> {
        let mut current = self.allocated.load(Ordering::Acquire);

        loop {
            let available = self.memory_limit.saturating_sub(current);
            if bytes > available {
                return Err(EngineErr::OutOfMemory {
                    device: self.id,
                    requested: bytes,
                    available,
                });
            }

            match self.allocated.compare_exchange_weak(
                current,
                current + bytes,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(()),
                Err(actual) => current = actual,
            }
        }
    }

    /// Gives `bytes` back to the device's budget.
    pub(crate) fn release(&self, bytes: usize) {
        self.allocated.fetch_sub(bytes, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserve_fails_once_the_budget_is_spent() {
        let device = Device::new(3, 100).unwrap();

        device.reserve(60).unwrap();
        let err = device.reserve(50).unwrap_err();

        assert!(matches!(
            err,
            EngineErr::OutOfMemory {
                device: 3,
                requested: 50,
                available: 40
            }
        ));
        assert_eq!(device.allocated(), 60);
    }

    #[test]
    fn released_bytes_can_be_reserved_again() {
        let device = Device::new(0, 64).unwrap();

        device.reserve(64).unwrap();
        device.release(32);
        device.reserve(32).unwrap();

        assert_eq!(device.allocated(), 64);
    }
}
