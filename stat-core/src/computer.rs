//! `Computer`: the algorithmic core. Walks a segment's heaps/packets,
//! applies per-channel weights and the RFI mask, and accumulates every
//! `Storage` aggregate in a single pass.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ndarray::{Array1, Array2};

use crate::errors::{Result, StatError};
use crate::segment::Segment;
use crate::storage::Storage;
use crate::stream_config::StreamConfig;

/// Largest divisor of `n` that is `<= n / floor(n / r)`. Walks down from
/// `floor(n/r)` seeking the first factor of `n`; falls back to `n` itself
/// when `r == 0` or `n <= r`.
pub fn calc_bins(n: u64, r: u64) -> u64 {
    if n == 0 {
        return 0;
    }
    if r == 0 {
        return n;
    }
    let mut f = n / r;
    if f == 0 {
        return n;
    }
    while f > 1 {
        if n % f == 0 {
            return f;
        }
        f -= 1;
    }
    1
}

fn clip_bounds(nbit: u32) -> (i64, i64) {
    let min = -(1i64 << (nbit - 1));
    let max = (1i64 << (nbit - 1)) - 1;
    (min, max)
}

fn to_bin(x: i64, nbit: u32) -> usize {
    (x + (1i64 << (nbit - 1))) as usize
}

fn read_signed_sample(bytes: &[u8], offset: usize, nbit: u32) -> i64 {
    match nbit {
        8 => bytes[offset] as i8 as i64,
        16 => i16::from_le_bytes([bytes[offset], bytes[offset + 1]]) as i64,
        _ => unreachable!("StreamConfig only admits nbit 8 or 16"),
    }
}

fn read_unsigned_weight(bytes: &[u8], offset: usize, weights_nbit: u32) -> u32 {
    let nbytes = ((weights_nbit + 7) / 8).max(1) as usize;
    match nbytes {
        1 => bytes[offset] as u32,
        2 => u16::from_le_bytes([bytes[offset], bytes[offset + 1]]) as u32,
        4 => u32::from_le_bytes([
            bytes[offset],
            bytes[offset + 1],
            bytes[offset + 2],
            bytes[offset + 3],
        ]),
        n => bytes[offset..offset + n]
            .iter()
            .rev()
            .fold(0u32, |acc, &b| (acc << 8) | b as u32),
    }
}

/// Binds a cancellation flag and the stream layout derived for one scan;
/// `initialise` must run once per segment after `Storage::resize`/`reset`.
pub struct Computer {
    config: Option<StreamConfig>,
    interrupt_flag: Arc<AtomicBool>,
}

impl Computer {
    pub fn new() -> Self {
        Computer {
            config: None,
            interrupt_flag: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn initialise(&mut self, config: StreamConfig, storage: &Storage) -> Result<()> {
        if !storage.is_resized() || !storage.is_reset() {
            return Err(StatError::ShapeError(
                "storage must be resized and reset before Computer::initialise".into(),
            ));
        }
        self.interrupt_flag.store(false, Ordering::SeqCst);
        self.config = Some(config);
        Ok(())
    }

    /// Request the in-flight `compute` call terminate at the next heap
    /// boundary.
    pub fn interrupt(&self) {
        self.interrupt_flag.store(true, Ordering::SeqCst);
    }

    fn is_interrupted(&self) -> bool {
        self.interrupt_flag.load(Ordering::SeqCst)
    }

    /// Accumulate every statistic for `segment` into `storage`. Returns
    /// `Ok(false)` (no publish should follow) if the segment was empty or
    /// the computation was interrupted before completion.
    pub fn compute(&mut self, segment: &Segment<'_>, storage: &mut Storage) -> Result<bool> {
        let config = self
            .config
            .as_ref()
            .ok_or_else(|| StatError::ShapeError("Computer not initialised".into()))?
            .clone();

        if !storage.is_resized() || !storage.is_reset() {
            return Err(StatError::ShapeError(
                "storage must be resized and reset before Computer::compute".into(),
            ));
        }

        let npol = config.npol as usize;
        let ndim = config.ndim as usize;
        let nchan = config.nchan as usize;
        let nbit = config.nbit;
        let weights_nbit = config.weights_nbit;
        let nsamp_per_packet = config.nsamp_per_packet as usize;
        let nchan_per_packet = config.nchan_per_packet as usize;
        let bytes_per_sample = config.bytes_per_sample() as usize;
        let packets_per_heap = config.packets_per_heap() as usize;
        let data_resolution = config.heap_resolution() as usize;
        let weights_resolution = (packets_per_heap * config.weights_packet_stride() as usize) as usize;
        let packet_resolution = config.packet_resolution() as usize;
        let weights_packet_stride = config.weights_packet_stride() as usize;
        let time_sample_resolution = config.time_sample_resolution() as usize;

        let num_heaps = if data_resolution == 0 {
            0
        } else {
            segment.data.len() / data_resolution
        };
        if num_heaps == 0 {
            return Ok(false);
        }

        let ntime_bins = storage.ntime_bins();
        let nfreq_bins = storage.nfreq_bins();
        let nbin = storage.nbin();
        let nrebin = storage.nrebin();
        let nsamp_block = num_heaps * data_resolution / time_sample_resolution;
        let (clip_min, clip_max) = clip_bounds(nbit);

        let mask = storage.rfi_mask_lut.clone();

        // raw (unweighted) per-channel accumulators feeding mean/variance spectrum
        let mut raw_sum = vec![0f64; npol * ndim * nchan];
        let mut raw_sumsq = vec![0f64; npol * ndim * nchan];
        let mut raw_count = vec![0u64; nchan];

        // weight-gated per-channel accumulators feeding the frequency-pooled stats
        let mut w_sum = vec![0f64; npol * ndim * nchan];
        let mut w_sumsq = vec![0f64; npol * ndim * nchan];
        let mut w_count = vec![0u64; nchan];

        let mut pow_sum = Array2::<f64>::zeros((npol, nchan));
        let mut pow_max = Array2::<f32>::from_elem((npol, nchan), f32::MIN);
        let mut pow_count = Array1::<u64>::zeros(nchan);

        let mut ts_sum = Array2::<f64>::zeros((npol, ntime_bins.max(1)));
        let mut ts_max = Array2::<f32>::from_elem((npol, ntime_bins.max(1)), f32::MIN);
        let mut ts_min = Array2::<f32>::from_elem((npol, ntime_bins.max(1)), f32::MAX);
        let mut ts_count = Array2::<u64>::zeros((npol, ntime_bins.max(1)));

        let mut ts_sum_masked = Array2::<f64>::zeros((npol, ntime_bins.max(1)));
        let mut ts_max_masked = Array2::<f32>::from_elem((npol, ntime_bins.max(1)), f32::MIN);
        let mut ts_min_masked = Array2::<f32>::from_elem((npol, ntime_bins.max(1)), f32::MAX);
        let mut ts_count_masked = Array2::<u64>::zeros((npol, ntime_bins.max(1)));

        let idx3 = |pol: usize, dim: usize, chan: usize| (pol * ndim + dim) * nchan + chan;

        for h in 0..num_heaps {
            if self.is_interrupted() {
                return Ok(false);
            }

            let heap_data = &segment.data[h * data_resolution..(h + 1) * data_resolution];
            let heap_weights = if weights_resolution > 0 && (h + 1) * weights_resolution <= segment.weights.len() {
                &segment.weights[h * weights_resolution..(h + 1) * weights_resolution]
            } else {
                &segment.weights[0..0]
            };

            for p in 0..packets_per_heap {
                let packet = &heap_data[p * packet_resolution..(p + 1) * packet_resolution];
                let weights_packet_start = p * weights_packet_stride;
                let (scale, weights_packet) = if weights_packet_start + weights_packet_stride <= heap_weights.len() {
                    let wp = &heap_weights[weights_packet_start..weights_packet_start + weights_packet_stride];
                    let scale = f32::from_le_bytes([wp[0], wp[1], wp[2], wp[3]]);
                    (scale, &wp[4..])
                } else {
                    (0f32, &heap_weights[0..0])
                };

                for ci in 0..nchan_per_packet {
                    let chan = p * nchan_per_packet + ci;
                    if chan >= nchan {
                        continue;
                    }
                    let raw_weight = if !weights_packet.is_empty() {
                        let bytes_per_weight = ((weights_nbit + 7) / 8).max(1) as usize;
                        read_unsigned_weight(weights_packet, ci * bytes_per_weight, weights_nbit)
                    } else {
                        1
                    };
                    let weight = scale * raw_weight as f32;

                    for si in 0..nsamp_per_packet {
                        raw_count[chan] += 1;
                        if weight != 0.0 {
                            w_count[chan] += 1;
                        }

                        let mut values = [[0i64; 2]; 2];
                        for pol in 0..npol {
                            for dim in 0..ndim {
                                let offset =
                                    ((ci * nsamp_per_packet + si) * npol + pol) * ndim * bytes_per_sample
                                        + dim * bytes_per_sample;
                                let x = read_signed_sample(packet, offset, nbit);
                                values[pol][dim] = x;

                                raw_sum[idx3(pol, dim, chan)] += x as f64;
                                raw_sumsq[idx3(pol, dim, chan)] += (x * x) as f64;
                                if weight != 0.0 {
                                    w_sum[idx3(pol, dim, chan)] += x as f64;
                                    w_sumsq[idx3(pol, dim, chan)] += (x * x) as f64;
                                }

                                if x == clip_min || x == clip_max {
                                    storage.num_clipped_samples_spectrum[[pol, dim, chan]] += 1;
                                    storage.num_clipped_samples[[pol, dim]] += 1;
                                    if !mask[chan] {
                                        storage.num_clipped_samples_masked[[pol, dim]] += 1;
                                    }
                                }

                                let bin = to_bin(x, nbit);
                                storage.histogram_1d_freq_avg[[pol, dim, bin]] += 1;
                                if !mask[chan] {
                                    storage.histogram_1d_freq_avg_masked[[pol, dim, bin]] += 1;
                                }

                                let rbin = (bin * nrebin) / nbin;
                                storage.rebinned_histogram_1d_freq_avg[[pol, dim, rbin]] += 1;
                                if !mask[chan] {
                                    storage.rebinned_histogram_1d_freq_avg_masked[[pol, dim, rbin]] += 1;
                                }
                            }
                        }

                        for pol in 0..npol {
                            let i_val = values[pol][0];
                            let q_val = values[pol][1];
                            let pow = (i_val * i_val + q_val * q_val) as f64;

                            pow_sum[[pol, chan]] += pow;
                            pow_count[chan] += 1;
                            if pow as f32 > pow_max[[pol, chan]] {
                                pow_max[[pol, chan]] = pow as f32;
                            }

                            let global_sample_index = h * nsamp_per_packet + si;
                            let t_bin = if ntime_bins > 0 {
                                (global_sample_index * ntime_bins) / nsamp_block
                            } else {
                                0
                            };
                            let t_bin = t_bin.min(ntime_bins.saturating_sub(1));

                            ts_sum[[pol, t_bin]] += pow;
                            ts_count[[pol, t_bin]] += 1;
                            if pow as f32 > ts_max[[pol, t_bin]] {
                                ts_max[[pol, t_bin]] = pow as f32;
                            }
                            if (pow as f32) < ts_min[[pol, t_bin]] {
                                ts_min[[pol, t_bin]] = pow as f32;
                            }

                            if !mask[chan] {
                                ts_sum_masked[[pol, t_bin]] += pow;
                                ts_count_masked[[pol, t_bin]] += 1;
                                if pow as f32 > ts_max_masked[[pol, t_bin]] {
                                    ts_max_masked[[pol, t_bin]] = pow as f32;
                                }
                                if (pow as f32) < ts_min_masked[[pol, t_bin]] {
                                    ts_min_masked[[pol, t_bin]] = pow as f32;
                                }
                            }

                            let f_bin = if nfreq_bins > 0 { (chan * nfreq_bins) / nchan } else { 0 };
                            let f_bin = f_bin.min(nfreq_bins.saturating_sub(1));
                            if nfreq_bins > 0 && ntime_bins > 0 {
                                storage.spectrogram[[pol, f_bin, t_bin]] += pow as f32;
                            }

                            let r_bin_i = (to_bin(i_val, nbit) * nrebin) / nbin;
                            let r_bin_q = (to_bin(q_val, nbit) * nrebin) / nbin;
                            storage.rebinned_histogram_2d_freq_avg[pol][[r_bin_i, r_bin_q]] += 1;
                            if !mask[chan] {
                                storage.rebinned_histogram_2d_freq_avg_masked[pol][[r_bin_i, r_bin_q]] += 1;
                            }
                        }
                    }
                }
            }
        }

        // raw per-channel finalisation: mean/variance spectrum, spectral power
        for pol in 0..npol {
            for chan in 0..nchan {
                for dim in 0..ndim {
                    let count = raw_count[chan];
                    let sum = raw_sum[idx3(pol, dim, chan)];
                    let sumsq = raw_sumsq[idx3(pol, dim, chan)];
                    if count > 0 {
                        let mean = sum / count as f64;
                        storage.mean_spectrum[[pol, dim, chan]] = mean as f32;
                        if count > 1 {
                            let var = (sumsq - sum * sum / count as f64) / (count as f64 - 1.0);
                            storage.variance_spectrum[[pol, dim, chan]] = var as f32;
                        }
                    }
                }

                if pow_count[chan] > 0 {
                    storage.mean_spectral_power[[pol, chan]] = (pow_sum[[pol, chan]] / pow_count[chan] as f64) as f32;
                    storage.max_spectral_power[[pol, chan]] = pow_max[[pol, chan]];
                }
            }
        }

        // frequency-pooled means/variances: weight-gated sum/count over channels
        for pol in 0..npol {
            for dim in 0..ndim {
                let mut all_sum = 0f64;
                let mut all_sumsq = 0f64;
                let mut all_count = 0u64;
                let mut masked_sum = 0f64;
                let mut masked_sumsq = 0f64;
                let mut masked_count = 0u64;

                for chan in 0..nchan {
                    let sum = w_sum[idx3(pol, dim, chan)];
                    let sumsq = w_sumsq[idx3(pol, dim, chan)];
                    let count = w_count[chan];

                    all_sum += sum;
                    all_sumsq += sumsq;
                    all_count += count;
                    if !mask[chan] {
                        masked_sum += sum;
                        masked_sumsq += sumsq;
                        masked_count += count;
                    }
                }

                if all_count > 0 {
                    storage.mean_frequency_avg[[pol, dim]] = (all_sum / all_count as f64) as f32;
                    if all_count > 1 {
                        storage.variance_frequency_avg[[pol, dim]] =
                            ((all_sumsq - all_sum * all_sum / all_count as f64) / (all_count as f64 - 1.0)) as f32;
                    }
                }
                if masked_count > 0 {
                    storage.mean_frequency_avg_masked[[pol, dim]] = (masked_sum / masked_count as f64) as f32;
                    if masked_count > 1 {
                        storage.variance_frequency_avg_masked[[pol, dim]] = ((masked_sumsq
                            - masked_sum * masked_sum / masked_count as f64)
                            / (masked_count as f64 - 1.0)) as f32;
                    }
                }
            }
        }

        // timeseries finalisation
        for pol in 0..npol {
            for t in 0..ntime_bins {
                if ts_count[[pol, t]] > 0 {
                    storage.timeseries[[pol, t, 0]] = ts_max[[pol, t]];
                    storage.timeseries[[pol, t, 1]] = ts_min[[pol, t]];
                    storage.timeseries[[pol, t, 2]] = (ts_sum[[pol, t]] / ts_count[[pol, t]] as f64) as f32;
                }
                if ts_count_masked[[pol, t]] > 0 {
                    storage.timeseries_masked[[pol, t, 0]] = ts_max_masked[[pol, t]];
                    storage.timeseries_masked[[pol, t, 1]] = ts_min_masked[[pol, t]];
                    storage.timeseries_masked[[pol, t, 2]] =
                        (ts_sum_masked[[pol, t]] / ts_count_masked[[pol, t]] as f64) as f32;
                }
            }
        }

        // bin centre axes
        for c in 0..nchan {
            storage.channel_centre_frequencies[c] = config.channel_centre_frequency(c as u32);
        }
        let shifted_freq = config.freq - (config.start_chan as f64 / nchan as f64) * config.bandwidth;
        for b in 0..nfreq_bins {
            storage.frequency_bins[b] =
                (shifted_freq - config.bandwidth / 2.0) + (config.bandwidth / nfreq_bins as f64) * (b as f64 + 0.5);
        }
        let total_sample_time = config.tsamp * 1e-6 * nsamp_block as f64;
        for t in 0..ntime_bins {
            storage.timeseries_bins[t] = total_sample_time * (t as f64 + 0.5) / ntime_bins as f64;
        }

        Ok(true)
    }
}

impl Default for Computer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::AsciiHeader;
    use crate::storage::StorageShape;
    use ndarray::Array1;

    fn config_1chan() -> StreamConfig {
        let data = AsciiHeader::parse(
            "NPOL 2\nNDIM 2\nNCHAN 1\nNBIT 16\nUDP_NSAMP 32\nUDP_NCHAN 1\nTSAMP 1.0\nFREQ 1284.0\nBW 4.0\n",
        );
        let weights = AsciiHeader::parse("WEIGHTS_NBIT 8\nUDP_NSAMP_PER_WEIGHT 32\n");
        StreamConfig::from_headers(&data, &weights).unwrap()
    }

    fn s1_samples_pol_a_real() -> Vec<i16> {
        vec![
            -4, 19, 17, 6, -2, 2, 0, 15, 15, 3, 15, 8, -11, -21, -18, 2, -11, 9, -3, 5, -4, -13, 12, -1, 5, 10, 21, 0,
            25, -2, 0, 12,
        ]
    }

    fn encode_packet(config: &StreamConfig, samples: &[[[i16; 2]; 2]]) -> Vec<u8> {
        let nsamp = config.nsamp_per_packet as usize;
        let npol = config.npol as usize;
        let ndim = config.ndim as usize;
        let mut buf = vec![0u8; config.packet_resolution() as usize];
        for si in 0..nsamp {
            for pol in 0..npol {
                for dim in 0..ndim {
                    let offset = (si * npol + pol) * ndim * 2 + dim * 2;
                    let bytes = samples[si][pol][dim].to_le_bytes();
                    buf[offset] = bytes[0];
                    buf[offset + 1] = bytes[1];
                }
            }
        }
        buf
    }

    fn encode_weights(config: &StreamConfig, scale: f32, raw_weight: u8) -> Vec<u8> {
        let mut buf = vec![0u8; config.weights_packet_stride() as usize];
        buf[0..4].copy_from_slice(&scale.to_le_bytes());
        buf[4] = raw_weight;
        buf
    }

    #[test]
    fn s1_reference_means_and_variance() {
        let config = config_1chan();
        let real = s1_samples_pol_a_real();
        // pol 1 (B) set to a constant so mean_frequency_avg[1][1] == 6.0
        let mut samples = [[[0i16; 2]; 2]; 32];
        for si in 0..32 {
            samples[si][0][0] = real[si];
            samples[si][0][1] = 0;
            samples[si][1][0] = 6;
            samples[si][1][1] = 6;
        }

        let data_packet = encode_packet(&config, &samples);
        let weights_packet = encode_weights(&config, 1.0, 1);

        let shape = StorageShape { nchan: 1, nbit: 16, nrebin: 256 };
        let mut storage = Storage::new(shape, Array1::zeros(1), vec![false]);
        storage.resize(1, 1);
        storage.reset();

        let mut computer = Computer::new();
        computer.initialise(config, &storage).unwrap();

        let segment = Segment { data: &data_packet, weights: &weights_packet };
        let complete = computer.compute(&segment, &mut storage).unwrap();
        assert!(complete);

        assert!((storage.mean_frequency_avg[[0, 0]] - 3.46875).abs() < 1e-4);
        assert!((storage.variance_frequency_avg[[0, 0]] - 124.773185).abs() < 1e-2);
        assert_eq!(storage.mean_frequency_avg[[1, 1]], 6.0);
        assert!(storage.num_clipped_samples.iter().all(|&v| v == 0));
    }

    #[test]
    fn zero_heaps_returns_false_without_mutating_storage() {
        let config = config_1chan();
        let shape = StorageShape { nchan: 1, nbit: 16, nrebin: 256 };
        let mut storage = Storage::new(shape, Array1::zeros(1), vec![false]);
        storage.resize(1, 1);
        storage.reset();

        let mut computer = Computer::new();
        computer.initialise(config, &storage).unwrap();

        let segment = Segment { data: &[], weights: &[] };
        let complete = computer.compute(&segment, &mut storage).unwrap();
        assert!(!complete);
        assert!(storage.mean_spectrum.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn calc_bins_always_divides_n_and_is_bounded() {
        for n in 1u64..40 {
            for r in 1u64..10 {
                let bins = calc_bins(n, r);
                assert_eq!(n % bins, 0, "calc_bins({n},{r}) = {bins} must divide {n}");
                assert!(bins <= n);
            }
        }
    }
}
