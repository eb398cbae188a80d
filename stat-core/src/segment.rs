//! `SegmentProducer`: the contract the core consumes to pull synchronised
//! data+weights segments from a ring-buffer transport. The transport itself
//! is external; this module only specifies the trait and a small in-memory
//! test double used by the integration tests.

use crate::errors::Result;
use crate::header::AsciiHeader;

/// One synchronised pair of borrowed data/weights buffers. Valid only until
/// the next call to `next_segment`.
pub struct Segment<'a> {
    pub data: &'a [u8],
    pub weights: &'a [u8],
}

/// Producer contract consumed by `Processor`. Implementations own the
/// ring-buffer attachment; `next_segment` returning `Ok(None)` signals
/// end-of-data.
pub trait SegmentProducer {
    fn connect(&mut self, timeout_secs: u64) -> Result<()>;
    fn open(&mut self) -> Result<()>;
    fn close(&mut self) -> Result<()>;
    fn disconnect(&mut self) -> Result<()>;

    fn data_header(&self) -> &AsciiHeader;
    fn weights_header(&self) -> &AsciiHeader;

    fn next_segment(&mut self) -> Result<Option<Segment<'_>>>;
}

/// In-memory test double: replays a fixed queue of data/weights buffer
/// pairs in order, then signals end-of-data.
pub struct InMemorySegmentProducer {
    data_header: AsciiHeader,
    weights_header: AsciiHeader,
    segments: std::collections::VecDeque<(Vec<u8>, Vec<u8>)>,
    last: Option<(Vec<u8>, Vec<u8>)>,
    connected: bool,
}

impl InMemorySegmentProducer {
    pub fn new(data_header: AsciiHeader, weights_header: AsciiHeader) -> Self {
        InMemorySegmentProducer {
            data_header,
            weights_header,
            segments: std::collections::VecDeque::new(),
            last: None,
            connected: false,
        }
    }

    pub fn push_segment(&mut self, data: Vec<u8>, weights: Vec<u8>) {
        self.segments.push_back((data, weights));
    }
}

impl SegmentProducer for InMemorySegmentProducer {
    fn connect(&mut self, _timeout_secs: u64) -> Result<()> {
        self.connected = true;
        Ok(())
    }

    fn open(&mut self) -> Result<()> {
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }

    fn disconnect(&mut self) -> Result<()> {
        self.connected = false;
        Ok(())
    }

    fn data_header(&self) -> &AsciiHeader {
        &self.data_header
    }

    fn weights_header(&self) -> &AsciiHeader {
        &self.weights_header
    }

    fn next_segment(&mut self) -> Result<Option<Segment<'_>>> {
        match self.segments.pop_front() {
            Some((data, weights)) => {
                // held in `last` so the returned slice can borrow from self
                self.last = Some((data, weights));
                let (d, w) = self.last.as_ref().unwrap();
                Ok(Some(Segment { data: d, weights: w }))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replays_segments_then_signals_end_of_data() {
        let mut producer = InMemorySegmentProducer::new(AsciiHeader::new(), AsciiHeader::new());
        producer.push_segment(vec![1, 2, 3], vec![4, 5]);
        producer.connect(5).unwrap();

        let first = producer.next_segment().unwrap().unwrap();
        assert_eq!(first.data, &[1, 2, 3]);
        assert_eq!(first.weights, &[4, 5]);

        assert!(producer.next_segment().unwrap().is_none());
    }
}
