//! `Hdf5Publisher`: serialises a complete `Storage` snapshot, plus a header
//! record, to an HDF5 file. File path construction is external (see the
//! CLI/filename-builder collaborator); this publisher only writes to an
//! already-resolved path.

use hdf5::File as H5File;

use crate::errors::{Result, StatError};
use crate::publisher::Publisher;
use crate::storage::Storage;

/// Scan-level metadata written alongside the statistic arrays, mirroring
/// the header record of the HDF5 monitoring-stats file.
#[derive(Debug, Clone)]
pub struct Hdf5HeaderRecord {
    pub eb_id: String,
    pub scan_id: String,
    pub beam_id: String,
    pub utc_start: String,
    pub t_min: f64,
    pub t_max: f64,
    pub freq: f64,
    pub bandwidth: f64,
    pub start_chan: u32,
    pub npol: u32,
    pub ndim: u32,
    pub nchan: u32,
    pub nfreq_bins: u32,
    pub ntime_bins: u32,
    pub nbin: u32,
    pub nrebin: u32,
}

/// Writes one HDF5 file per `publish` call. The HDF5 C library is
/// single-threaded; callers must only invoke this from the scan thread.
pub struct Hdf5Publisher {
    path: std::path::PathBuf,
    header: Hdf5HeaderRecord,
}

impl Hdf5Publisher {
    pub fn new(path: impl Into<std::path::PathBuf>, header: Hdf5HeaderRecord) -> Self {
        Hdf5Publisher { path: path.into(), header }
    }

    fn write_header(&self, file: &H5File) -> Result<()> {
        let group = file.create_group("header").map_err(io_err(&self.path))?;
        write_scalar_str(&group, "eb_id", &self.header.eb_id)?;
        write_scalar_str(&group, "scan_id", &self.header.scan_id)?;
        write_scalar_str(&group, "beam_id", &self.header.beam_id)?;
        write_scalar_str(&group, "utc_start", &self.header.utc_start)?;
        write_scalar_f64(&group, "t_min", self.header.t_min)?;
        write_scalar_f64(&group, "t_max", self.header.t_max)?;
        write_scalar_f64(&group, "freq", self.header.freq)?;
        write_scalar_f64(&group, "bandwidth", self.header.bandwidth)?;
        write_scalar_u32(&group, "start_chan", self.header.start_chan)?;
        write_scalar_u32(&group, "npol", self.header.npol)?;
        write_scalar_u32(&group, "ndim", self.header.ndim)?;
        write_scalar_u32(&group, "nchan", self.header.nchan)?;
        write_scalar_u32(&group, "nfreq_bins", self.header.nfreq_bins)?;
        write_scalar_u32(&group, "ntime_bins", self.header.ntime_bins)?;
        write_scalar_u32(&group, "nbin", self.header.nbin)?;
        write_scalar_u32(&group, "nrebin", self.header.nrebin)?;
        Ok(())
    }
}

fn io_err(path: &std::path::Path) -> impl Fn(hdf5::Error) -> StatError + '_ {
    move |e| StatError::IoError { path: path.display().to_string(), cause: e.to_string() }
}

fn write_scalar_str(group: &hdf5::Group, name: &str, value: &str) -> Result<()> {
    group
        .new_dataset::<hdf5::types::VarLenUnicode>()
        .shape(())
        .create(name)
        .and_then(|ds| ds.write_scalar(&value.parse::<hdf5::types::VarLenUnicode>().unwrap()))
        .map_err(|e| StatError::IoError { path: name.to_string(), cause: e.to_string() })
}

fn write_scalar_f64(group: &hdf5::Group, name: &str, value: f64) -> Result<()> {
    group
        .new_dataset::<f64>()
        .shape(())
        .create(name)
        .and_then(|ds| ds.write_scalar(&value))
        .map_err(|e| StatError::IoError { path: name.to_string(), cause: e.to_string() })
}

fn write_scalar_u32(group: &hdf5::Group, name: &str, value: u32) -> Result<()> {
    group
        .new_dataset::<u32>()
        .shape(())
        .create(name)
        .and_then(|ds| ds.write_scalar(&value))
        .map_err(|e| StatError::IoError { path: name.to_string(), cause: e.to_string() })
}

fn write_array<A, D>(group: &hdf5::Group, name: &str, array: &ndarray::ArrayBase<ndarray::OwnedRepr<A>, D>) -> Result<()>
where
    A: hdf5::H5Type,
    D: ndarray::Dimension,
{
    group
        .new_dataset_builder()
        .with_data(array)
        .create(name)
        .map_err(|e| StatError::IoError { path: name.to_string(), cause: e.to_string() })
        .map(|_| ())
}

impl Publisher for Hdf5Publisher {
    fn publish(&mut self, storage: &Storage) -> Result<()> {
        let file = H5File::create(&self.path).map_err(io_err(&self.path))?;

        self.write_header(&file)?;

        write_array(&file, "channel_centre_frequencies", &storage.channel_centre_frequencies)?;
        write_array(&file, "frequency_bins", &storage.frequency_bins)?;
        write_array(&file, "timeseries_bins", &storage.timeseries_bins)?;

        write_array(&file, "mean_frequency_avg", &storage.mean_frequency_avg)?;
        write_array(&file, "mean_frequency_avg_masked", &storage.mean_frequency_avg_masked)?;
        write_array(&file, "variance_frequency_avg", &storage.variance_frequency_avg)?;
        write_array(&file, "variance_frequency_avg_masked", &storage.variance_frequency_avg_masked)?;

        write_array(&file, "mean_spectrum", &storage.mean_spectrum)?;
        write_array(&file, "variance_spectrum", &storage.variance_spectrum)?;
        write_array(&file, "mean_spectral_power", &storage.mean_spectral_power)?;
        write_array(&file, "max_spectral_power", &storage.max_spectral_power)?;

        write_array(&file, "histogram_1d_freq_avg", &storage.histogram_1d_freq_avg)?;
        write_array(&file, "histogram_1d_freq_avg_masked", &storage.histogram_1d_freq_avg_masked)?;
        write_array(&file, "rebinned_histogram_1d_freq_avg", &storage.rebinned_histogram_1d_freq_avg)?;
        write_array(
            &file,
            "rebinned_histogram_1d_freq_avg_masked",
            &storage.rebinned_histogram_1d_freq_avg_masked,
        )?;
        for (pol, array) in storage.rebinned_histogram_2d_freq_avg.iter().enumerate() {
            write_array(&file, &format!("rebinned_histogram_2d_freq_avg_pol{pol}"), array)?;
        }
        for (pol, array) in storage.rebinned_histogram_2d_freq_avg_masked.iter().enumerate() {
            write_array(&file, &format!("rebinned_histogram_2d_freq_avg_masked_pol{pol}"), array)?;
        }

        write_array(&file, "num_clipped_samples", &storage.num_clipped_samples)?;
        write_array(&file, "num_clipped_samples_masked", &storage.num_clipped_samples_masked)?;
        write_array(&file, "num_clipped_samples_spectrum", &storage.num_clipped_samples_spectrum)?;

        write_array(&file, "spectrogram", &storage.spectrogram)?;
        write_array(&file, "timeseries", &storage.timeseries)?;
        write_array(&file, "timeseries_masked", &storage.timeseries_masked)?;

        file.close().map_err(io_err(&self.path))?;
        Ok(())
    }
}
