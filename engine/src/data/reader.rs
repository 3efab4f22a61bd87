use std::{
    mem,
    thread::{self, JoinHandle},
};

use log::{debug, info, warn};
use specs::{DataSpec, ExhaustionSpec, SourceSpec};
use tokio::sync::mpsc::{self, Receiver, Sender};

use super::{Batch, BatchShape, BatchSource, InMemorySource, SyntheticSource};
use crate::{EngineErr, Result, embedding::Key};

type Iteration<K> = Result<Vec<Batch<K>>>;

enum ReaderState<K: Key> {
    Idle(Box<dyn BatchSource<K>>),
    Streaming {
        rx: Receiver<Iteration<K>>,
        handle: JoinHandle<()>,
    },
    Stopped,
}

/// Streams one batch per device and per iteration out of a source.
///
/// Once started, the batches are assembled ahead of time on a dedicated
/// thread and buffered in a bounded channel, so that `next` only blocks while
/// the producer is behind.
pub struct DataReader<K: Key> {
    state: ReaderState<K>,
    devices: usize,
    shape: BatchShape,
    exhaustion: ExhaustionSpec,
    prefetch: usize,
}

impl<K: Key> DataReader<K> {
    /// Creates a new idle `DataReader`.
    ///
    /// # Arguments
    /// * `source` - Where the samples come from.
    /// * `devices` - The amount of batches per iteration.
    /// * `shape` - The shape of every batch.
    /// * `exhaustion` - What to do once the source runs dry.
    /// * `prefetch` - The amount of iterations to buffer.
    pub fn new(
        source: Box<dyn BatchSource<K>>,
        devices: usize,
        shape: BatchShape,
        exhaustion: ExhaustionSpec,
        prefetch: usize,
    ) -> Self {
        Self {
            state: ReaderState::Idle(source),
            devices,
            shape,
            exhaustion,
            prefetch: prefetch.max(1),
        }
    }

    /// Creates a new idle `DataReader` given its specification.
    pub fn from_spec(spec: &DataSpec, devices: usize, shape: BatchShape) -> Result<Self> {
        let source: Box<dyn BatchSource<K>> = match &spec.source {
            SourceSpec::Synthetic {
                samples,
                key_range,
                nnz_per_slot,
                seed,
            } => Box::new(SyntheticSource::new(
                *samples,
                *key_range,
                *nnz_per_slot,
                *seed,
                shape.dense_dim,
                shape.slots.clone(),
            )?),
            SourceSpec::Inline { samples } => Box::new(InMemorySource::from_specs(samples)?),
        };

        Ok(Self::new(
            source,
            devices,
            shape,
            spec.exhaustion,
            spec.prefetch.get(),
        ))
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self.state, ReaderState::Streaming { .. })
    }

    /// Starts prefetching, a reader that is already streaming is left untouched.
    pub fn start(&mut self) -> Result<()> {
        let source = match mem::replace(&mut self.state, ReaderState::Stopped) {
            ReaderState::Idle(source) => source,
            state => {
                debug!("data reader already started");
                self.state = state;
                return Ok(());
            }
        };

        let (tx, rx) = mpsc::channel(self.prefetch);
        let producer = Producer {
            source,
            tx,
            devices: self.devices,
            shape: self.shape.clone(),
            exhaustion: self.exhaustion,
        };

        let handle = thread::Builder::new()
            .name("data-reader".into())
            .spawn(move || producer.run())?;

        info!(
            devices = self.devices,
            batch_size = self.shape.batch_size;
            "data reader streaming"
        );
        self.state = ReaderState::Streaming { rx, handle };
        Ok(())
    }

    /// Pulls the batches of the next iteration, one per device.
    ///
    /// # Returns
    /// `NotReady` before `start`, `EndOfData` once an ending source is exhausted.
    pub fn next(&mut self) -> Result<Vec<Batch<K>>> {
        match &mut self.state {
            ReaderState::Idle(_) => Err(EngineErr::NotReady("data reading has not started")),
            ReaderState::Streaming { rx, .. } => rx
                .blocking_recv()
                .unwrap_or_else(|| Err(EngineErr::EndOfData)),
            ReaderState::Stopped => Err(EngineErr::EndOfData),
        }
    }
}

impl<K: Key> Drop for DataReader<K> {
    fn drop(&mut self) {
        if let ReaderState::Streaming { rx, handle } =
            mem::replace(&mut self.state, ReaderState::Stopped)
        {
            drop(rx);
            if handle.join().is_err() {
                warn!("data reader thread panicked");
            }
        }
    }
}

struct Producer<K: Key> {
    source: Box<dyn BatchSource<K>>,
    tx: Sender<Iteration<K>>,
    devices: usize,
    shape: BatchShape,
    exhaustion: ExhaustionSpec,
}

impl<K: Key> Producer<K> {
    fn run(mut self) {
        loop {
            let iteration = match self.next_iteration() {
                Ok(Some(batches)) => Ok(batches),
                Ok(None) => {
                    debug!("data source exhausted");
                    return;
                }
                Err(e) => Err(e),
            };

            let failed = iteration.is_err();
            if self.tx.blocking_send(iteration).is_err() || failed {
                return;
            }
        }
    }

    fn next_iteration(&mut self) -> Result<Option<Vec<Batch<K>>>> {
        let mut batches = Vec::with_capacity(self.devices);

        for _ in 0..self.devices {
            let mut samples = Vec::with_capacity(self.shape.batch_size);
            let mut rewound = false;

            while samples.len() < self.shape.batch_size {
                match self.source.next_sample() {
                    Some(sample) => {
                        samples.push(sample?);
                        rewound = false;
                    }
                    None if self.exhaustion == ExhaustionSpec::End => return Ok(None),
                    None if rewound => {
                        return Err(EngineErr::InvalidArgument(
                            "the data source has no samples".into(),
                        ));
                    }
                    None => {
                        self.source.rewind();
                        rewound = true;
                    }
                }
            }

            batches.push(self.shape.assemble(samples)?);
        }

        Ok(Some(batches))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Sample;

    fn samples(n: usize) -> Vec<Sample<u32>> {
        (0..n)
            .map(|i| Sample {
                label: (i % 2) as f32,
                dense: vec![i as f32],
                keys: vec![vec![vec![i as u32]]],
            })
            .collect()
    }

    fn reader(n: usize, devices: usize, exhaustion: ExhaustionSpec) -> DataReader<u32> {
        let shape = BatchShape {
            batch_size: 2,
            dense_dim: 1,
            slots: vec![1],
        };
        DataReader::new(
            Box::new(InMemorySource::new(samples(n))),
            devices,
            shape,
            exhaustion,
            2,
        )
    }

    #[test]
    fn next_before_start_is_not_ready() {
        let mut reader = reader(4, 1, ExhaustionSpec::Loop);

        assert!(matches!(reader.next(), Err(EngineErr::NotReady(_))));
        assert!(!reader.is_streaming());
    }

    #[test]
    fn one_batch_per_device_in_source_order() {
        let mut reader = reader(4, 2, ExhaustionSpec::Loop);
        reader.start().unwrap();

        let batches = reader.next().unwrap();

        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].dense.as_slice().unwrap(), [0., 1.]);
        assert_eq!(batches[1].sparse[0].keys(), [2, 3]);
    }

    #[test]
    fn looping_source_wraps_around() {
        let mut reader = reader(3, 1, ExhaustionSpec::Loop);
        reader.start().unwrap();

        reader.next().unwrap();
        let wrapped = reader.next().unwrap();

        assert_eq!(wrapped[0].labels, [0., 0.]);
        assert_eq!(wrapped[0].sparse[0].keys(), [2, 0]);
    }

    #[test]
    fn ending_source_reports_end_of_data() {
        let mut reader = reader(5, 1, ExhaustionSpec::End);
        reader.start().unwrap();

        reader.next().unwrap();
        reader.next().unwrap();

        assert!(matches!(reader.next(), Err(EngineErr::EndOfData)));
        assert!(matches!(reader.next(), Err(EngineErr::EndOfData)));
    }

    #[test]
    fn empty_looping_source_fails_instead_of_spinning() {
        let mut reader = reader(0, 1, ExhaustionSpec::Loop);
        reader.start().unwrap();

        assert!(matches!(reader.next(), Err(EngineErr::InvalidArgument(_))));
    }
}
