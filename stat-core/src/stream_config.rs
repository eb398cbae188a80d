//! `StreamConfig`: the derived, immutable description of one data+weights
//! stream pair, built once per scan from the merged beam/scan headers and
//! the upstream producer's in-band headers.

use crate::errors::{Result, StatError};
use crate::header::AsciiHeader;

/// An inclusive `[lo, hi]` MHz frequency range contributing to the RFI mask.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaskRange {
    pub lo: f64,
    pub hi: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StreamConfig {
    pub npol: u32,
    pub ndim: u32,
    pub nchan: u32,
    pub nbit: u32,
    pub weights_nbit: u32,
    pub nsamp_per_packet: u32,
    pub nchan_per_packet: u32,
    pub nsamp_per_weight: u32,
    pub tsamp: f64,
    pub freq: f64,
    pub bandwidth: f64,
    pub start_chan: u32,
    pub rfi_mask: Vec<MaskRange>,
}

impl StreamConfig {
    /// Build a `StreamConfig` from the data and weights headers obtained
    /// from the `SegmentProducer`, validating cross-header consistency.
    pub fn from_headers(data: &AsciiHeader, weights: &AsciiHeader) -> Result<Self> {
        let npol = data.get_uint32("NPOL")?;
        let ndim = data.get_uint32("NDIM")?;
        if npol != 2 || ndim != 2 {
            return Err(StatError::ValidationError(vec![format!(
                "NPOL/NDIM must both be 2, got npol={npol} ndim={ndim}"
            )]));
        }

        if weights.has("NPOL") {
            let weights_npol = weights.get_uint32("NPOL")?;
            if weights_npol != npol {
                return Err(StatError::ValidationError(vec![format!(
                    "data NPOL={npol} disagrees with weights NPOL={weights_npol}"
                )]));
            }
        }

        let nchan = data.get_uint32("NCHAN")?;
        if nchan == 0 {
            return Err(StatError::ValidationError(vec!["NCHAN must be > 0".into()]));
        }
        let nbit = data.get_uint32("NBIT")?;
        if nbit != 8 && nbit != 16 {
            return Err(StatError::ValidationError(vec![format!(
                "unsupported NBIT={nbit}, expected 8 or 16"
            )]));
        }
        let weights_nbit = weights.get_uint32("WEIGHTS_NBIT")?;

        let nsamp_per_packet = data.get_uint32("UDP_NSAMP")?;
        let nchan_per_packet = data.get_uint32("UDP_NCHAN")?;
        let nsamp_per_weight = weights.get_uint32("UDP_NSAMP_PER_WEIGHT")?;

        let tsamp = data.get_double("TSAMP")?;
        let freq = data.get_double("FREQ")?;
        let bandwidth = data.get_double("BW")?;
        let start_chan = if data.has("START_CHAN") {
            data.get_uint32("START_CHAN")?
        } else {
            0
        };

        let rfi_mask = if data.has("RFI_MASK") {
            parse_rfi_mask(&data.get_val("RFI_MASK")?)?
        } else {
            Vec::new()
        };

        Ok(StreamConfig {
            npol,
            ndim,
            nchan,
            nbit,
            weights_nbit,
            nsamp_per_packet,
            nchan_per_packet,
            nsamp_per_weight,
            tsamp,
            freq,
            bandwidth,
            start_chan,
            rfi_mask,
        })
    }

    /// Byte width of a single scalar component (one `nbit` integer), used
    /// to index within a packet buffer.
    pub fn bytes_per_sample(&self) -> u32 {
        self.nbit / 8
    }

    /// Byte width of one time sample across the whole band: every
    /// channel, both polarisations, both dimensions. `nsamp_block`
    /// divides total segment bytes by this, not by `bytes_per_sample`.
    pub fn time_sample_resolution(&self) -> u32 {
        self.nchan * self.npol * self.ndim * self.nbit / 8
    }

    pub fn packet_resolution(&self) -> u32 {
        self.nsamp_per_packet * self.nchan_per_packet * self.npol * self.ndim * self.nbit / 8
    }

    pub fn heap_resolution(&self) -> u32 {
        self.nsamp_per_packet * self.nchan * self.npol * self.ndim * self.nbit / 8
    }

    pub fn packets_per_heap(&self) -> u32 {
        self.heap_resolution() / self.packet_resolution()
    }

    pub fn weights_packet_stride(&self) -> u32 {
        4 + self.nchan_per_packet * self.weights_nbit / 8
    }

    /// Per-channel boolean lookup, `true` where the channel falls inside any
    /// configured RFI mask range. Channel centre frequencies follow the same
    /// `start_chan`-shifted formula the `Computer` uses for `Storage`.
    pub fn rfi_mask_lut(&self) -> Vec<bool> {
        (0..self.nchan)
            .map(|c| {
                let freq_c = self.channel_centre_frequency(c);
                self.rfi_mask.iter().any(|r| freq_c >= r.lo && freq_c <= r.hi)
            })
            .collect()
    }

    pub fn channel_centre_frequency(&self, chan: u32) -> f64 {
        let shifted_freq = self.freq - (self.start_chan as f64 / self.nchan as f64) * self.bandwidth;
        (shifted_freq - self.bandwidth / 2.0) + (self.bandwidth / self.nchan as f64) * (chan as f64 + 0.5)
    }
}

fn parse_rfi_mask(raw: &str) -> Result<Vec<MaskRange>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|range| {
            let (lo, hi) = range
                .split_once(':')
                .ok_or_else(|| StatError::ParseError("RFI_MASK".to_string()))?;
            let lo: f64 = lo
                .trim()
                .parse()
                .map_err(|_| StatError::ParseError("RFI_MASK".to_string()))?;
            let hi: f64 = hi
                .trim()
                .parse()
                .map_err(|_| StatError::ParseError("RFI_MASK".to_string()))?;
            Ok(MaskRange { lo, hi })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_headers() -> (AsciiHeader, AsciiHeader) {
        let data = AsciiHeader::parse(
            "NPOL 2\nNDIM 2\nNCHAN 4\nNBIT 16\nUDP_NSAMP 8\nUDP_NCHAN 1\nTSAMP 1.0\nFREQ 1284.0\nBW 4.0\nSTART_CHAN 0\nRFI_MASK 1285.0:1286.0\n",
        );
        let weights = AsciiHeader::parse("WEIGHTS_NBIT 2\nUDP_NSAMP_PER_WEIGHT 8\n");
        (data, weights)
    }

    #[test]
    fn derives_resolutions() {
        let (data, weights) = sample_headers();
        let cfg = StreamConfig::from_headers(&data, &weights).unwrap();
        assert_eq!(cfg.packet_resolution(), 8 * 1 * 2 * 2 * 16 / 8);
        assert_eq!(cfg.heap_resolution(), 8 * 4 * 2 * 2 * 16 / 8);
        assert_eq!(cfg.packets_per_heap(), 4);
        assert_eq!(cfg.weights_packet_stride(), 4 + (1 * 2 / 8));
        assert_eq!(cfg.time_sample_resolution(), 4 * 2 * 2 * 16 / 8);
    }

    #[test]
    fn rejects_mismatched_npol() {
        let (data, mut weights) = sample_headers();
        weights.set("NPOL", "4");
        assert!(StreamConfig::from_headers(&data, &weights).is_err());
    }

    #[test]
    fn rfi_mask_lut_flags_only_masked_channel() {
        let (data, weights) = sample_headers();
        let cfg = StreamConfig::from_headers(&data, &weights).unwrap();
        let lut = cfg.rfi_mask_lut();
        assert_eq!(lut.len(), 4);
        assert!(lut.iter().filter(|&&m| m).count() >= 1);
    }
}
