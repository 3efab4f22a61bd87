use std::{fmt, mem, ops::Range, sync::Arc};

use parking_lot::{
    MappedRwLockReadGuard, MappedRwLockWriteGuard, RwLock, RwLockReadGuard, RwLockWriteGuard,
};

use super::{Element, Precision};
use crate::{
    EngineErr, Result,
    device::{Device, Stream},
};

/// A fixed size allocation on a device.
///
/// The storage sits behind a lock only so that jobs enqueued on a stream can
/// reach it, the buffer itself is never shared: it is neither `Clone` nor
/// handed out to more than one owner. Dropping it returns its bytes to the
/// device's budget.
pub struct Buffer<T: Element> {
    device: Arc<Device>,
    data: Arc<RwLock<Box<[T]>>>,
    len: usize,
}

impl<T: Element> Buffer<T> {
    /// Allocates a zeroed buffer of `len` elements on `device`.
    ///
    /// # Returns
    /// A new `Buffer` or `OutOfMemory` if the device can't hold it.
    pub fn new(device: Arc<Device>, len: usize) -> Result<Self> {
        device.reserve(Self::bytes(len))?;

        Ok(Self {
            device,
            data: Arc::new(RwLock::new(vec![T::default(); len].into_boxed_slice())),
            len,
        })
    }

    /// Allocates a buffer on `device` holding a copy of `values`.
    pub fn from_host(device: Arc<Device>, values: &[T]) -> Result<Self> {
        let mut buffer = Self::new(device, values.len())?;
        buffer.copy_from_host(values)?;
        Ok(buffer)
    }

    fn bytes(len: usize) -> usize {
        len * mem::size_of::<T>()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    pub fn device_id(&self) -> usize {
        self.device.id()
    }

    pub fn precision(&self) -> Precision {
        T::PRECISION
    }

    /// Synchronously overwrites the whole buffer with `src`.
    pub fn copy_from_host(&mut self, src: &[T]) -> Result<()> {
        EngineErr::size_check("host source", src.len(), self.len)?;
        self.data.write().copy_from_slice(src);
        Ok(())
    }

    /// Synchronously copies the whole buffer into `dst`.
    pub fn copy_to_host(&self, dst: &mut [T]) -> Result<()> {
        EngineErr::size_check("host destination", dst.len(), self.len)?;
        dst.copy_from_slice(&self.data.read());
        Ok(())
    }

    pub fn to_host(&self) -> Vec<T> {
        self.data.read().to_vec()
    }

    /// Enqueues a copy of `src` into the buffer on `stream`.
    ///
    /// The copy is only guaranteed to have landed once `stream` is synchronized.
    pub fn copy_from_host_async(&mut self, src: Vec<T>, stream: &Stream) -> Result<()> {
        EngineErr::size_check("host source", src.len(), self.len)?;

        let data = Arc::clone(&self.data);
        stream.enqueue(move || data.write().copy_from_slice(&src));
        Ok(())
    }

    pub fn fill(&mut self, value: T) {
        self.data.write().fill(value);
    }

    /// Borrows the whole buffer for reading.
    pub fn read(&self) -> MappedRwLockReadGuard<'_, [T]> {
        RwLockReadGuard::map(self.data.read(), |data| &**data)
    }

    /// Borrows the whole buffer for writing.
    pub fn write(&mut self) -> MappedRwLockWriteGuard<'_, [T]> {
        RwLockWriteGuard::map(self.data.write(), |data| &mut **data)
    }

    /// Borrows the elements in `range` for reading.
    pub fn view(&self, range: Range<usize>) -> Result<MappedRwLockReadGuard<'_, [T]>> {
        self.check_range(&range)?;
        Ok(RwLockReadGuard::map(self.data.read(), |data| {
            &data[range]
        }))
    }

    /// Borrows the elements in `range` for writing.
    pub fn view_mut(&mut self, range: Range<usize>) -> Result<MappedRwLockWriteGuard<'_, [T]>> {
        self.check_range(&range)?;
        Ok(RwLockWriteGuard::map(self.data.write(), |data| {
            &mut data[range]
        }))
    }

    fn check_range(&self, range: &Range<usize>) -> Result<()> {
        if range.start > range.end || range.end > self.len {
            return Err(EngineErr::InvalidArgument(format!(
                "range {range:?} is out of bounds for a buffer of {} elements",
                self.len
            )));
        }

        Ok(())
    }
}

impl<T: Element> Drop for Buffer<T> {
    fn drop(&mut self) {
        self.device.release(Self::bytes(self.len));
    }
}

impl<T: Element> fmt::Debug for Buffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("device", &self.device.id())
            .field("len", &self.len)
            .field("precision", &T::PRECISION)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use half::f16;

    use super::*;

    fn device(memory_limit: usize) -> Arc<Device> {
        Arc::new(Device::new(0, memory_limit).unwrap())
    }

    #[test]
    fn allocation_is_charged_to_the_device_and_released_on_drop() {
        let device = device(1024);

        let full = Buffer::<f32>::new(Arc::clone(&device), 100).unwrap();
        let half = Buffer::<f16>::new(Arc::clone(&device), 100).unwrap();
        assert_eq!(device.allocated(), 600);
        assert_eq!(half.precision(), Precision::Half);

        drop(full);
        drop(half);
        assert_eq!(device.allocated(), 0);
    }

    #[test]
    fn allocation_past_the_budget_is_out_of_memory() {
        let device = device(64);

        let err = Buffer::<f32>::new(device, 17).unwrap_err();

        assert!(matches!(
            err,
            EngineErr::OutOfMemory {
                requested: 68,
                available: 64,
                ..
            }
        ));
    }

    #[test]
    fn host_copies_check_their_length() {
        let mut buffer = Buffer::<f32>::new(device(64), 4).unwrap();

        assert!(buffer.copy_from_host(&[1., 2., 3.]).is_err());
        buffer.copy_from_host(&[1., 2., 3., 4.]).unwrap();

        let mut out = [0.; 4];
        buffer.copy_to_host(&mut out).unwrap();
        assert_eq!(out, [1., 2., 3., 4.]);
    }

    #[test]
    fn async_copy_lands_after_synchronize() {
        let device = device(64);
        let mut buffer = Buffer::<f32>::new(Arc::clone(&device), 3).unwrap();

        buffer
            .copy_from_host_async(vec![7., 8., 9.], device.stream())
            .unwrap();
        device.stream().synchronize().unwrap();

        assert_eq!(buffer.to_host(), [7., 8., 9.]);
    }

    #[test]
    fn views_address_sub_ranges() {
        let mut buffer = Buffer::<f32>::from_host(device(64), &[0., 1., 2., 3., 4., 5.]).unwrap();

        buffer.view_mut(2..4).unwrap().fill(9.);

        assert_eq!(&*buffer.view(1..5).unwrap(), &[1., 9., 9., 4.]);
        assert!(buffer.view(4..7).is_err());
    }
}
