//! Real-time voltage-statistics compute pipeline for a single pulsar/timing
//! beam: header parsing, the statistics computer, storage model, scalar and
//! HDF5 publishers, the segment-producer contract, and the lifecycle state
//! machine that sequences them.

pub mod computer;
pub mod errors;
pub mod hdf5_publisher;
pub mod header;
pub mod processor;
pub mod publisher;
pub mod scalar_publisher;
pub mod segment;
pub mod state_machine;
pub mod storage;
pub mod stream_config;

pub use computer::Computer;
pub use errors::{Result, StatError};
pub use header::AsciiHeader;
pub use hdf5_publisher::Hdf5Publisher;
pub use processor::Processor;
pub use publisher::Publisher;
pub use scalar_publisher::ScalarPublisher;
pub use segment::{Segment, SegmentProducer};
pub use state_machine::ApplicationManager;
pub use storage::Storage;
pub use stream_config::StreamConfig;
