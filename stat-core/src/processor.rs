//! `Processor`: binds `Storage`, `Computer`, and the registered publishers,
//! and drives exactly one segment through the pipeline.

use log::{debug, info, warn};

use crate::computer::{calc_bins, Computer};
use crate::errors::{Result, StatError};
use crate::publisher::Publisher;
use crate::segment::Segment;
use crate::storage::Storage;
use crate::stream_config::StreamConfig;

/// Owns `Storage` and `Computer` outright (single ownership, per the
/// cyclic-ownership redesign note) and holds a borrowed handle into each
/// call rather than sharing reference-counted pointers.
pub struct Processor {
    storage: Storage,
    computer: Computer,
    publishers: Vec<Box<dyn Publisher + Send>>,
    config: StreamConfig,
    req_time_bins: u32,
    req_freq_bins: u32,
}

impl Processor {
    pub fn new(storage: Storage, config: StreamConfig, req_time_bins: u32, req_freq_bins: u32) -> Self {
        Processor {
            storage,
            computer: Computer::new(),
            publishers: Vec::new(),
            config,
            req_time_bins,
            req_freq_bins,
        }
    }

    pub fn register_publisher(&mut self, publisher: Box<dyn Publisher + Send>) {
        self.publishers.push(publisher);
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Signal the in-flight `compute` to terminate at the next heap
    /// boundary.
    pub fn interrupt(&self) {
        self.computer.interrupt();
    }

    /// Validate, resize/reset `Storage`, compute, and publish for one
    /// segment. Returns whether the segment completed (and was published).
    pub fn process(&mut self, segment: &Segment<'_>) -> Result<bool> {
        let data_resolution = self.config.heap_resolution() as usize;
        let weights_resolution =
            (self.config.packets_per_heap() * self.config.weights_packet_stride()) as usize;

        if segment.data.is_empty() || segment.weights.is_empty() {
            return Err(StatError::ShapeError("segment has an empty block".into()));
        }

        let mut data_len = segment.data.len();
        if data_resolution == 0 || data_len % data_resolution != 0 {
            warn!("segment data length {data_len} is not heap-aligned to {data_resolution}; truncating");
            data_len -= data_len % data_resolution.max(1);
        }
        let num_data_heaps = if data_resolution > 0 { data_len / data_resolution } else { 0 };
        let num_weights_heaps = if weights_resolution > 0 {
            segment.weights.len() / weights_resolution
        } else {
            0
        };

        if num_data_heaps != num_weights_heaps {
            return Err(StatError::ShapeError(format!(
                "data carries {num_data_heaps} heaps but weights carry {num_weights_heaps}"
            )));
        }

        let truncated = Segment {
            data: &segment.data[..num_data_heaps * data_resolution],
            weights: segment.weights,
        };

        let time_sample_resolution = self.config.time_sample_resolution() as usize;
        let nsamp_block = num_data_heaps * data_resolution / time_sample_resolution.max(1);

        let ntime_bins = calc_bins(nsamp_block as u64, self.req_time_bins as u64).max(1) as usize;
        let nfreq_bins = calc_bins(self.config.nchan as u64, self.req_freq_bins as u64).max(1) as usize;

        self.storage.resize(ntime_bins, nfreq_bins);
        self.storage.reset();
        self.computer.initialise(self.config.clone(), &self.storage)?;

        debug!("processing segment: {num_data_heaps} heaps, ntime_bins={ntime_bins}, nfreq_bins={nfreq_bins}");
        let complete = self.computer.compute(&truncated, &mut self.storage)?;

        if complete {
            for publisher in &mut self.publishers {
                publisher.publish(&self.storage)?;
            }
            info!("segment processed and published ({num_data_heaps} heaps)");
        } else {
            info!("segment processing did not complete; skipping publish");
        }

        Ok(complete)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::AsciiHeader;
    use crate::storage::StorageShape;
    use ndarray::Array1;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct RecordingPublisher {
        calls: Arc<Mutex<u32>>,
    }

    impl Publisher for RecordingPublisher {
        fn publish(&mut self, _storage: &Storage) -> Result<()> {
            *self.calls.lock().unwrap() += 1;
            Ok(())
        }
    }

    fn small_config() -> StreamConfig {
        let data = AsciiHeader::parse(
            "NPOL 2\nNDIM 2\nNCHAN 1\nNBIT 16\nUDP_NSAMP 8\nUDP_NCHAN 1\nTSAMP 1.0\nFREQ 1284.0\nBW 4.0\n",
        );
        let weights = AsciiHeader::parse("WEIGHTS_NBIT 8\nUDP_NSAMP_PER_WEIGHT 8\n");
        StreamConfig::from_headers(&data, &weights).unwrap()
    }

    #[test]
    fn processes_one_heap_and_publishes() {
        let config = small_config();
        let shape = StorageShape { nchan: 1, nbit: 16, nrebin: 4 };
        let storage = Storage::new(shape, Array1::zeros(1), vec![false]);
        let mut processor = Processor::new(storage, config.clone(), 1, 1);

        let recorder = RecordingPublisher::default();
        processor.register_publisher(Box::new(recorder.clone()));

        let data = vec![0u8; config.heap_resolution() as usize];
        let weights = vec![0u8; (config.packets_per_heap() * config.weights_packet_stride()) as usize];
        let segment = Segment { data: &data, weights: &weights };

        let complete = processor.process(&segment).unwrap();
        assert!(complete);
        assert_eq!(*recorder.calls.lock().unwrap(), 1);
    }

    #[test]
    fn mismatched_heap_counts_fail_with_shape_error() {
        let config = small_config();
        let shape = StorageShape { nchan: 1, nbit: 16, nrebin: 4 };
        let storage = Storage::new(shape, Array1::zeros(1), vec![false]);
        let mut processor = Processor::new(storage, config.clone(), 1, 1);

        let data = vec![0u8; config.heap_resolution() as usize];
        let weights = vec![0u8; 1];
        let segment = Segment { data: &data, weights: &weights };

        assert!(matches!(processor.process(&segment), Err(StatError::ShapeError(_))));
    }
}
