use std::sync::Arc;

use super::DeviceGroup;
use crate::{EngineErr, Result, storage::Buffer};

/// Collective exchanges between the devices of a group.
#[derive(Debug, Clone, Copy)]
pub struct Comm<'g> {
    group: &'g DeviceGroup,
}

impl<'g> Comm<'g> {
    pub(super) fn new(group: &'g DeviceGroup) -> Self {
        Self { group }
    }

    /// Copies `values` into one buffer per device.
    ///
    /// Every copy is enqueued on the stream of the device owning the target
    /// buffer and the group is synchronized before returning.
    ///
    /// # Arguments
    /// * `values` - The host values to replicate.
    /// * `targets` - One buffer per device, in replica order.
    ///
    /// # Returns
    /// An error if the amount or the size of the targets is wrong, or a device faulted.
    pub fn broadcast(&self, values: &[f32], targets: &mut [&mut Buffer<f32>]) -> Result<()> {
        EngineErr::size_check("broadcast targets", targets.len(), self.group.len())?;

        for target in targets.iter_mut() {
            let device = Arc::clone(target.device());
            target.copy_from_host_async(values.to_vec(), device.stream())?;
        }

        self.group.synchronize()
    }

    /// Hands `outgoing[src][dst]` from every device over to its destination.
    ///
    /// # Arguments
    /// * `outgoing` - For every source device, one payload per destination device.
    ///
    /// # Returns
    /// For every destination device, the payloads it received in source order.
    pub fn all_to_all<T: Send>(&self, outgoing: Vec<Vec<T>>) -> Result<Vec<Vec<T>>> {
        let n = self.group.len();
        EngineErr::size_check("all-to-all sources", outgoing.len(), n)?;

        let mut incoming: Vec<Vec<T>> = (0..n).map(|_| Vec::with_capacity(n)).collect();
        for payloads in outgoing {
            EngineErr::size_check("all-to-all destinations", payloads.len(), n)?;

            for (inbox, payload) in incoming.iter_mut().zip(payloads) {
                inbox.push(payload);
            }
        }

        Ok(incoming)
    }
}

#[cfg(test)]
mod tests {
    use specs::DeviceSpec;

    use super::*;

    fn group(n: usize) -> DeviceGroup {
        let specs: Vec<_> = (0..n)
            .map(|id| DeviceSpec {
                id,
                memory_limit: 1 << 16,
            })
            .collect();
        DeviceGroup::new(&specs).unwrap()
    }

    #[test]
    fn broadcast_fills_every_replica() {
        let group = group(3);
        let mut buffers: Vec<_> = group
            .iter()
            .map(|device| Buffer::<f32>::new(Arc::clone(device), 4).unwrap())
            .collect();

        let mut targets: Vec<_> = buffers.iter_mut().collect();
        group.comm().broadcast(&[1., 2., 3., 4.], &mut targets).unwrap();

        for buffer in &buffers {
            assert_eq!(buffer.to_host(), [1., 2., 3., 4.]);
        }
    }

    #[test]
    fn all_to_all_transposes_the_payloads() {
        let group = group(2);

        let incoming = group
            .comm()
            .all_to_all(vec![vec!["0->0", "0->1"], vec!["1->0", "1->1"]])
            .unwrap();

        assert_eq!(incoming, [["0->0", "1->0"], ["0->1", "1->1"]]);
    }

    #[test]
    fn all_to_all_rejects_ragged_payloads() {
        let group = group(2);

        let err = group.comm().all_to_all(vec![vec![1], vec![2, 3]]);

        assert!(matches!(err, Err(EngineErr::SizeMismatch { .. })));
    }
}
