//! `Storage`: the statistics grid. Owns every aggregate array described in
//! the data model, with explicit resize/reset invariants that `Computer`
//! relies on before it will touch the arrays.

use ndarray::{Array1, Array2, Array3};

const NPOL: usize = 2;
const NDIM: usize = 2;

/// Fixed per-scan shape parameters that don't change segment to segment;
/// `ntime_bins`/`nfreq_bins` are supplied separately to each `resize`.
#[derive(Debug, Clone)]
pub struct StorageShape {
    pub nchan: usize,
    pub nbit: u32,
    pub nrebin: usize,
}

impl StorageShape {
    pub fn nbin(&self) -> usize {
        1usize << self.nbit
    }
}

/// Owns every statistic array. Constructed empty at scan-configure, then
/// `resize`d and `reset` once per segment before `Computer::compute` runs.
#[derive(Debug, Clone)]
pub struct Storage {
    shape: StorageShape,

    pub channel_centre_frequencies: Array1<f64>,
    pub rfi_mask_lut: Vec<bool>,

    pub frequency_bins: Array1<f64>,
    pub timeseries_bins: Array1<f64>,

    pub mean_frequency_avg: Array2<f32>,
    pub mean_frequency_avg_masked: Array2<f32>,
    pub variance_frequency_avg: Array2<f32>,
    pub variance_frequency_avg_masked: Array2<f32>,

    pub mean_spectrum: Array3<f32>,
    pub variance_spectrum: Array3<f32>,

    pub mean_spectral_power: Array2<f32>,
    pub max_spectral_power: Array2<f32>,

    pub histogram_1d_freq_avg: Array3<u32>,
    pub histogram_1d_freq_avg_masked: Array3<u32>,
    pub rebinned_histogram_1d_freq_avg: Array3<u32>,
    pub rebinned_histogram_1d_freq_avg_masked: Array3<u32>,
    pub rebinned_histogram_2d_freq_avg: Vec<Array2<u32>>,
    pub rebinned_histogram_2d_freq_avg_masked: Vec<Array2<u32>>,

    pub num_clipped_samples: Array2<u32>,
    pub num_clipped_samples_masked: Array2<u32>,
    pub num_clipped_samples_spectrum: Array3<u32>,

    pub spectrogram: Array3<f32>,
    pub timeseries: Array3<f32>,
    pub timeseries_masked: Array3<f32>,

    ntime_bins: usize,
    nfreq_bins: usize,
    storage_resized: bool,
    storage_reset: bool,
}

impl Storage {
    /// Construct an empty `Storage` bound to a fixed channel layout. Must
    /// still be `resize`d and `reset` before `Computer::compute` will accept
    /// it.
    pub fn new(shape: StorageShape, channel_centre_frequencies: Array1<f64>, rfi_mask_lut: Vec<bool>) -> Self {
        assert_eq!(channel_centre_frequencies.len(), shape.nchan);
        assert_eq!(rfi_mask_lut.len(), shape.nchan);
        let nchan = shape.nchan;
        Storage {
            shape,
            channel_centre_frequencies,
            rfi_mask_lut,
            frequency_bins: Array1::zeros(0),
            timeseries_bins: Array1::zeros(0),
            mean_frequency_avg: Array2::zeros((NPOL, NDIM)),
            mean_frequency_avg_masked: Array2::zeros((NPOL, NDIM)),
            variance_frequency_avg: Array2::zeros((NPOL, NDIM)),
            variance_frequency_avg_masked: Array2::zeros((NPOL, NDIM)),
            mean_spectrum: Array3::zeros((NPOL, NDIM, nchan)),
            variance_spectrum: Array3::zeros((NPOL, NDIM, nchan)),
            mean_spectral_power: Array2::zeros((NPOL, nchan)),
            max_spectral_power: Array2::zeros((NPOL, nchan)),
            histogram_1d_freq_avg: Array3::zeros((NPOL, NDIM, 0)),
            histogram_1d_freq_avg_masked: Array3::zeros((NPOL, NDIM, 0)),
            rebinned_histogram_1d_freq_avg: Array3::zeros((NPOL, NDIM, 0)),
            rebinned_histogram_1d_freq_avg_masked: Array3::zeros((NPOL, NDIM, 0)),
            rebinned_histogram_2d_freq_avg: Vec::new(),
            rebinned_histogram_2d_freq_avg_masked: Vec::new(),
            num_clipped_samples: Array2::zeros((NPOL, NDIM)),
            num_clipped_samples_masked: Array2::zeros((NPOL, NDIM)),
            num_clipped_samples_spectrum: Array3::zeros((NPOL, NDIM, nchan)),
            spectrogram: Array3::zeros((NPOL, 0, 0)),
            timeseries: Array3::zeros((NPOL, 0, 3)),
            timeseries_masked: Array3::zeros((NPOL, 0, 3)),
            ntime_bins: 0,
            nfreq_bins: 0,
            storage_resized: false,
            storage_reset: false,
        }
    }

    pub fn nchan(&self) -> usize {
        self.shape.nchan
    }

    pub fn nbin(&self) -> usize {
        self.shape.nbin()
    }

    pub fn nrebin(&self) -> usize {
        self.shape.nrebin
    }

    pub fn ntime_bins(&self) -> usize {
        self.ntime_bins
    }

    pub fn nfreq_bins(&self) -> usize {
        self.nfreq_bins
    }

    pub fn is_resized(&self) -> bool {
        self.storage_resized
    }

    pub fn is_reset(&self) -> bool {
        self.storage_reset
    }

    /// Allocate every per-segment array to the tabulated shape for the given
    /// bin counts. Marks the storage resized but not reset; `reset()` must
    /// be called before `Computer::compute` will accept it.
    pub fn resize(&mut self, ntime_bins: usize, nfreq_bins: usize) {
        let nchan = self.shape.nchan;
        let nbin = self.shape.nbin();
        let nrebin = self.shape.nrebin;

        self.ntime_bins = ntime_bins;
        self.nfreq_bins = nfreq_bins;

        self.frequency_bins = Array1::zeros(nfreq_bins);
        self.timeseries_bins = Array1::zeros(ntime_bins);

        self.histogram_1d_freq_avg = Array3::zeros((NPOL, NDIM, nbin));
        self.histogram_1d_freq_avg_masked = Array3::zeros((NPOL, NDIM, nbin));
        self.rebinned_histogram_1d_freq_avg = Array3::zeros((NPOL, NDIM, nrebin));
        self.rebinned_histogram_1d_freq_avg_masked = Array3::zeros((NPOL, NDIM, nrebin));
        self.rebinned_histogram_2d_freq_avg =
            (0..NPOL).map(|_| Array2::zeros((nrebin, nrebin))).collect();
        self.rebinned_histogram_2d_freq_avg_masked =
            (0..NPOL).map(|_| Array2::zeros((nrebin, nrebin))).collect();

        self.mean_spectrum = Array3::zeros((NPOL, NDIM, nchan));
        self.variance_spectrum = Array3::zeros((NPOL, NDIM, nchan));
        self.mean_spectral_power = Array2::zeros((NPOL, nchan));
        self.max_spectral_power = Array2::zeros((NPOL, nchan));
        self.num_clipped_samples_spectrum = Array3::zeros((NPOL, NDIM, nchan));

        self.spectrogram = Array3::zeros((NPOL, nfreq_bins, ntime_bins));
        self.timeseries = Array3::zeros((NPOL, ntime_bins, 3));
        self.timeseries_masked = Array3::zeros((NPOL, ntime_bins, 3));

        self.mean_frequency_avg = Array2::zeros((NPOL, NDIM));
        self.mean_frequency_avg_masked = Array2::zeros((NPOL, NDIM));
        self.variance_frequency_avg = Array2::zeros((NPOL, NDIM));
        self.variance_frequency_avg_masked = Array2::zeros((NPOL, NDIM));
        self.num_clipped_samples = Array2::zeros((NPOL, NDIM));
        self.num_clipped_samples_masked = Array2::zeros((NPOL, NDIM));

        self.storage_resized = true;
        self.storage_reset = false;
    }

    /// Zero every numeric cell without changing shape. Required before
    /// `Computer::compute` runs.
    pub fn reset(&mut self) {
        self.frequency_bins.fill(0.0);
        self.timeseries_bins.fill(0.0);
        self.mean_frequency_avg.fill(0.0);
        self.mean_frequency_avg_masked.fill(0.0);
        self.variance_frequency_avg.fill(0.0);
        self.variance_frequency_avg_masked.fill(0.0);
        self.mean_spectrum.fill(0.0);
        self.variance_spectrum.fill(0.0);
        self.mean_spectral_power.fill(0.0);
        self.max_spectral_power.fill(0.0);
        self.histogram_1d_freq_avg.fill(0);
        self.histogram_1d_freq_avg_masked.fill(0);
        self.rebinned_histogram_1d_freq_avg.fill(0);
        self.rebinned_histogram_1d_freq_avg_masked.fill(0);
        for a in &mut self.rebinned_histogram_2d_freq_avg {
            a.fill(0);
        }
        for a in &mut self.rebinned_histogram_2d_freq_avg_masked {
            a.fill(0);
        }
        self.num_clipped_samples.fill(0);
        self.num_clipped_samples_masked.fill(0);
        self.num_clipped_samples_spectrum.fill(0);
        self.spectrogram.fill(0.0);
        self.timeseries.fill(0.0);
        self.timeseries_masked.fill(0.0);

        self.storage_reset = true;
    }
}
