//! End-to-end `Computer`/`Storage` scenarios exercising channel pooling,
//! the RFI mask, and clip detection across multiple channels.

use ndarray::Array1;
use stat_core::computer::Computer;
use stat_core::header::AsciiHeader;
use stat_core::segment::Segment;
use stat_core::storage::{Storage, StorageShape};
use stat_core::stream_config::StreamConfig;

fn four_channel_config() -> StreamConfig {
    let data = AsciiHeader::parse(
        "NPOL 2\nNDIM 2\nNCHAN 4\nNBIT 16\nUDP_NSAMP 8\nUDP_NCHAN 4\nTSAMP 1.0\nFREQ 1284.0\nBW 4.0\n",
    );
    let weights = AsciiHeader::parse("WEIGHTS_NBIT 8\nUDP_NSAMP_PER_WEIGHT 8\n");
    StreamConfig::from_headers(&data, &weights).unwrap()
}

/// One packet covering all 4 channels, 8 samples, 2 pol x 2 dim. `per_chan`
/// supplies the 8 `(pol0 dim0, pol1 dim1)` sample pairs for each channel;
/// the other two (pol,dim) combinations are held at a constant so only the
/// pooled pol0/dim0 and pol1/dim1 statistics are exercised.
fn encode_segment(config: &StreamConfig, per_chan: &[[i16; 8]; 4]) -> (Vec<u8>, Vec<u8>) {
    let nsamp = config.nsamp_per_packet as usize;
    let nchan_per_packet = config.nchan_per_packet as usize;
    let npol = config.npol as usize;
    let ndim = config.ndim as usize;
    let bytes_per_sample = 2usize;

    let mut data = vec![0u8; config.packet_resolution() as usize];
    for (chan, samples) in per_chan.iter().enumerate().take(nchan_per_packet) {
        for si in 0..nsamp {
            for pol in 0..npol {
                for dim in 0..ndim {
                    let value: i16 = if pol == 0 && dim == 0 {
                        samples[si]
                    } else {
                        6
                    };
                    let offset = ((chan * nsamp + si) * npol + pol) * ndim * bytes_per_sample + dim * bytes_per_sample;
                    let bytes = value.to_le_bytes();
                    data[offset] = bytes[0];
                    data[offset + 1] = bytes[1];
                }
            }
        }
    }

    let mut weights = vec![0u8; config.weights_packet_stride() as usize];
    weights[0..4].copy_from_slice(&1.0f32.to_le_bytes());
    for ci in 0..nchan_per_packet {
        weights[4 + ci] = 1;
    }

    (data, weights)
}

fn fresh_storage(config: &StreamConfig) -> Storage {
    let shape = StorageShape { nchan: config.nchan as usize, nbit: config.nbit, nrebin: 16 };
    let channel_freqs = Array1::from_iter((0..config.nchan).map(|c| config.channel_centre_frequency(c)));
    Storage::new(shape, channel_freqs, vec![false, false, false, true])
}

#[test]
fn masked_channel_is_excluded_from_pooled_average_only() {
    let config = four_channel_config();
    let per_chan = [
        [0, 0, 0, 0, 0, 0, 0, 8], // chan0: mean 1.0
        [4; 8],                   // chan1: mean 4.0
        [2; 8],                   // chan2: mean 2.0
        [100; 8],                 // chan3 (masked): mean 100.0
    ];
    let (data, weights) = encode_segment(&config, &per_chan);

    let mut storage = fresh_storage(&config);
    storage.resize(1, 1);
    storage.reset();

    let mut computer = Computer::new();
    computer.initialise(config, &storage).unwrap();
    let segment = Segment { data: &data, weights: &weights };
    assert!(computer.compute(&segment, &mut storage).unwrap());

    assert!((storage.mean_spectrum[[0, 0, 0]] - 1.0).abs() < 1e-6);
    assert!((storage.mean_spectrum[[0, 0, 1]] - 4.0).abs() < 1e-6);
    assert!((storage.mean_spectrum[[0, 0, 3]] - 100.0).abs() < 1e-6);

    // pooled over all 4 channels: (8 + 32 + 16 + 800) / 32
    assert!((storage.mean_frequency_avg[[0, 0]] - 26.75).abs() < 1e-4);
    // pooled over unmasked channels only: (8 + 32 + 16) / 24
    assert!((storage.mean_frequency_avg_masked[[0, 0]] - 56.0 / 24.0).abs() < 1e-4);
}

#[test]
fn clip_values_are_counted_per_channel_and_totalled() {
    let config = four_channel_config();
    let mut per_chan = [[1i16; 8]; 4];
    per_chan[0][0] = -32768; // pol0/dim0, chan 0, clip min
    let (mut data, weights) = encode_segment(&config, &per_chan);

    // pol1/dim1 of chan3, sample 7: force a clip too.
    let offset = ((3 * 8 + 7) * 2 + 1) * 2 * 2 + 1 * 2;
    let bytes = (-32768i16).to_le_bytes();
    data[offset] = bytes[0];
    data[offset + 1] = bytes[1];

    let mut storage = fresh_storage(&config);
    storage.resize(1, 1);
    storage.reset();

    let mut computer = Computer::new();
    computer.initialise(config, &storage).unwrap();
    let segment = Segment { data: &data, weights: &weights };
    assert!(computer.compute(&segment, &mut storage).unwrap());

    assert_eq!(storage.num_clipped_samples_spectrum[[0, 0, 0]], 1);
    assert_eq!(storage.num_clipped_samples_spectrum[[1, 1, 3]], 1);
    assert_eq!(storage.num_clipped_samples[[0, 0]], 1);
    assert_eq!(storage.num_clipped_samples[[1, 1]], 1);
}
