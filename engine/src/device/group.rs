use std::{collections::HashSet, sync::Arc};

use log::info;
use rayon::prelude::*;
use specs::DeviceSpec;

use super::{Comm, Device};
use crate::{EngineErr, Result};

/// The ordered set of devices a session trains on.
///
/// Shared read-only by every replica once built.
#[derive(Debug)]
pub struct DeviceGroup {
    devices: Vec<Arc<Device>>,
}

impl DeviceGroup {
    /// Creates a new `DeviceGroup`.
    ///
    /// # Arguments
    /// * `specs` - One entry per device, in replica order.
    ///
    /// # Returns
    /// A new `DeviceGroup` or `InvalidArgument` if the list is empty or repeats an id.
    pub fn new(specs: &[DeviceSpec]) -> Result<Self> {
        if specs.is_empty() {
            return Err(EngineErr::InvalidArgument(
                "a device group needs at least one device".into(),
            ));
        }

        let mut seen = HashSet::with_capacity(specs.len());
        if let Some(spec) = specs.iter().find(|spec| !seen.insert(spec.id)) {
            return Err(EngineErr::InvalidArgument(format!(
                "device {} is listed more than once",
                spec.id
            )));
        }

        let devices = specs
            .iter()
            .map(|spec| Device::new(spec.id, spec.memory_limit).map(Arc::new))
            .collect::<Result<Vec<_>>>()?;

        info!(devices = devices.len(); "device group ready");
        Ok(Self { devices })
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn iter(&self) -> impl ExactSizeIterator<Item = &Arc<Device>> {
        self.devices.iter()
    }

    /// The collective communication handle over this group.
    pub fn comm(&self) -> Comm<'_> {
        Comm::new(self)
    }

    /// Blocks until every stream of every device is drained.
    ///
    /// # Returns
    /// The first `DeviceFault` found, if any device is faulted.
    pub fn synchronize(&self) -> Result<()> {
        self.devices
            .par_iter()
            .try_for_each(|device| device.stream().synchronize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(id: usize) -> DeviceSpec {
        DeviceSpec {
            id,
            memory_limit: 1 << 20,
        }
    }

    #[test]
    fn devices_keep_the_configured_order() {
        let group = DeviceGroup::new(&[spec(4), spec(1), spec(7)]).unwrap();

        let ids: Vec<_> = group.iter().map(|device| device.id()).collect();

        assert_eq!(ids, [4, 1, 7]);
        assert_eq!(group.len(), 3);
    }

    #[test]
    fn empty_and_duplicated_groups_are_rejected() {
        assert!(matches!(
            DeviceGroup::new(&[]),
            Err(EngineErr::InvalidArgument(_))
        ));
        assert!(matches!(
            DeviceGroup::new(&[spec(0), spec(0)]),
            Err(EngineErr::InvalidArgument(_))
        ));
    }

    #[test]
    fn synchronize_surfaces_a_faulted_device() {
        let group = DeviceGroup::new(&[spec(0), spec(1)]).unwrap();
        let _ = group.devices[1].stream().run(|| -> Result<()> { panic!("boom") });

        assert!(matches!(
            group.synchronize(),
            Err(EngineErr::DeviceFault { device: 1, .. })
        ));
    }
}
