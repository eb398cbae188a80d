//! `ScalarPublisher`: a thread-safe snapshot of the scalar statistic subset
//! exposed to the monitoring RPC, independent of the HDF5 write path.

use std::sync::{Arc, RwLock};

use ndarray::Array2;

use crate::errors::Result;
use crate::publisher::Publisher;
use crate::storage::Storage;

/// The scalar subset, deep-copied out of `Storage` at publish time.
#[derive(Debug, Clone, Default)]
pub struct ScalarSnapshot {
    pub mean_frequency_avg: Array2<f32>,
    pub mean_frequency_avg_masked: Array2<f32>,
    pub variance_frequency_avg: Array2<f32>,
    pub variance_frequency_avg_masked: Array2<f32>,
    pub num_clipped_samples: Array2<u32>,
    pub num_clipped_samples_masked: Array2<u32>,
}

/// Holds the latest scalar snapshot behind a reader/writer lock so monitor
/// calls never observe a torn update mid-`publish`.
#[derive(Clone)]
pub struct ScalarPublisher {
    snapshot: Arc<RwLock<Option<ScalarSnapshot>>>,
}

impl ScalarPublisher {
    pub fn new() -> Self {
        ScalarPublisher { snapshot: Arc::new(RwLock::new(None)) }
    }

    /// Deep copy of the current snapshot, or `None` if nothing has been
    /// published yet.
    pub fn get(&self) -> Option<ScalarSnapshot> {
        self.snapshot.read().expect("scalar publisher lock poisoned").clone()
    }

    pub fn reset(&self) {
        *self.snapshot.write().expect("scalar publisher lock poisoned") = None;
    }
}

impl Default for ScalarPublisher {
    fn default() -> Self {
        Self::new()
    }
}

impl Publisher for ScalarPublisher {
    fn publish(&mut self, storage: &Storage) -> Result<()> {
        let snapshot = ScalarSnapshot {
            mean_frequency_avg: storage.mean_frequency_avg.clone(),
            mean_frequency_avg_masked: storage.mean_frequency_avg_masked.clone(),
            variance_frequency_avg: storage.variance_frequency_avg.clone(),
            variance_frequency_avg_masked: storage.variance_frequency_avg_masked.clone(),
            num_clipped_samples: storage.num_clipped_samples.clone(),
            num_clipped_samples_masked: storage.num_clipped_samples_masked.clone(),
        };

        *self.snapshot.write().expect("scalar publisher lock poisoned") = Some(snapshot);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StorageShape;
    use ndarray::Array1;

    #[test]
    fn get_after_publish_matches_storage_scalars() {
        let shape = StorageShape { nchan: 2, nbit: 16, nrebin: 4 };
        let mut storage = Storage::new(shape, Array1::zeros(2), vec![false, true]);
        storage.resize(1, 1);
        storage.reset();
        storage.mean_frequency_avg[[0, 0]] = 1.5;
        storage.num_clipped_samples_masked[[0, 0]] = 3;

        let mut publisher = ScalarPublisher::new();
        publisher.publish(&storage).unwrap();

        let snapshot = publisher.get().unwrap();
        assert_eq!(snapshot.mean_frequency_avg[[0, 0]], 1.5);
        assert_eq!(snapshot.num_clipped_samples_masked[[0, 0]], 3);
    }

    #[test]
    fn reset_clears_snapshot() {
        let publisher = ScalarPublisher::new();
        publisher.reset();
        assert!(publisher.get().is_none());
    }
}
