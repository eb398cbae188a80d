//! `ApplicationManager`: the lifecycle state machine. A single table-driven
//! transition function replaces the base-class state machine the original
//! subclassed; validation is a set of free functions reused by both dry-run
//! calls and the real transitions.

use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crossbeam::channel::{self, Sender};
use log::{error, info, warn};

use crate::errors::{Result, StatError};
use crate::header::AsciiHeader;
use crate::processor::Processor;
use crate::publisher::Publisher;
use crate::segment::SegmentProducer;
use crate::storage::{Storage, StorageShape};
use crate::stream_config::StreamConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Idle,
    BeamConfigured,
    ScanConfigured,
    Scanning,
    RuntimeError,
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            State::Idle => "Idle",
            State::BeamConfigured => "BeamConfigured",
            State::ScanConfigured => "ScanConfigured",
            State::Scanning => "Scanning",
            State::RuntimeError => "RuntimeError",
        };
        write!(f, "{name}")
    }
}

/// Accumulates field-level validation issues, mirroring the
/// accumulate-then-report shape used elsewhere in this codebase for
/// multi-field checks.
#[derive(Debug, Default)]
pub struct ValidationContext {
    errors: Vec<String>,
}

impl ValidationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn into_result(self) -> Result<()> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(StatError::ValidationError(self.errors))
        }
    }
}

fn require_fields(header: &AsciiHeader, keys: &[&str]) -> ValidationContext {
    let mut ctx = ValidationContext::new();
    for key in keys {
        if !header.has(key) {
            ctx.add_error(format!("missing required field {key}"));
        }
    }
    ctx
}

pub fn validate_configure_beam(header: &AsciiHeader) -> ValidationContext {
    require_fields(header, &["DATA_KEY", "WEIGHTS_KEY"])
}

pub fn validate_configure_scan(header: &AsciiHeader) -> ValidationContext {
    require_fields(
        header,
        &[
            "EB_ID",
            "STAT_PROC_DELAY_MS",
            "STAT_REQ_TIME_BINS",
            "STAT_REQ_FREQ_BINS",
            "STAT_NREBIN",
        ],
    )
}

pub fn validate_start_scan(header: &AsciiHeader) -> ValidationContext {
    require_fields(header, &["SCAN_ID"])
}

type FaultHandler = Box<dyn Fn(&StatError) + Send + Sync>;

/// Lifecycle state machine gating access to `SegmentProducer`/`Processor`.
/// Callers driving this from multiple threads (an RPC server, a signal
/// handler) are expected to hold it behind a single `Mutex`, matching the
/// "one mutex serialises all transitions" concurrency rule.
pub struct ApplicationManager<P: SegmentProducer + Send + 'static> {
    state: State,
    beam_header: AsciiHeader,
    scan_header: AsciiHeader,
    producer: Option<P>,
    processor: Option<Arc<Mutex<Processor>>>,
    stop_tx: Option<Sender<()>>,
    scan_thread: Option<JoinHandle<()>>,
    fault_cause: Option<String>,
    fault_handler: Option<FaultHandler>,
    connect_timeout_secs: u64,
}

impl<P: SegmentProducer + Send + 'static> ApplicationManager<P> {
    pub fn new(producer: P) -> Self {
        ApplicationManager {
            state: State::Idle,
            beam_header: AsciiHeader::new(),
            scan_header: AsciiHeader::new(),
            producer: Some(producer),
            processor: None,
            stop_tx: None,
            scan_thread: None,
            fault_cause: None,
            fault_handler: None,
            connect_timeout_secs: 10,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn fault_cause(&self) -> Option<&str> {
        self.fault_cause.as_deref()
    }

    pub fn set_fault_handler(&mut self, handler: impl Fn(&StatError) + Send + Sync + 'static) {
        self.fault_handler = Some(Box::new(handler));
    }

    fn invalid_transition(&self, command: &str) -> StatError {
        StatError::InvalidTransition { from: self.state.to_string(), command: command.to_string() }
    }

    fn enter_fault(&mut self, cause: StatError) -> StatError {
        error!("internal fault, promoting to RuntimeError: {cause}");
        self.fault_cause = Some(cause.to_string());
        self.state = State::RuntimeError;
        if let Some(handler) = &self.fault_handler {
            handler(&cause);
        }
        cause
    }

    pub fn configure_beam(&mut self, header: AsciiHeader) -> Result<()> {
        if self.state != State::Idle {
            return Err(self.invalid_transition("configure_beam"));
        }
        validate_configure_beam(&header).into_result()?;

        let connect_result = self
            .producer
            .as_mut()
            .expect("producer present while Idle")
            .connect(self.connect_timeout_secs);
        if let Err(e) = connect_result {
            return Err(self.enter_fault(e));
        }
        let open_result = self.producer.as_mut().expect("producer present while Idle").open();
        if let Err(e) = open_result {
            return Err(self.enter_fault(e));
        }

        self.beam_header = header;
        self.state = State::BeamConfigured;
        info!("configure_beam complete");
        Ok(())
    }

    pub fn dry_run_configure_beam(&self, header: &AsciiHeader) -> Result<()> {
        validate_configure_beam(header).into_result()
    }

    pub fn dry_run_configure_scan(&self, header: &AsciiHeader) -> Result<()> {
        validate_configure_scan(header).into_result()
    }

    pub fn dry_run_start_scan(&self, header: &AsciiHeader) -> Result<()> {
        validate_start_scan(header).into_result()
    }

    pub fn deconfigure_beam(&mut self) -> Result<()> {
        if self.state != State::BeamConfigured {
            return Err(self.invalid_transition("deconfigure_beam"));
        }
        let close_result = self.producer.as_mut().expect("producer present while BeamConfigured").close();
        if let Err(e) = close_result {
            return Err(self.enter_fault(e));
        }
        let disconnect_result = self.producer.as_mut().expect("producer present while BeamConfigured").disconnect();
        if let Err(e) = disconnect_result {
            return Err(self.enter_fault(e));
        }
        self.state = State::Idle;
        info!("deconfigure_beam complete");
        Ok(())
    }

    pub fn configure_scan(&mut self, header: AsciiHeader, nrebin_default: usize) -> Result<()> {
        if self.state != State::BeamConfigured {
            return Err(self.invalid_transition("configure_scan"));
        }
        validate_configure_scan(&header).into_result()?;

        let producer = self.producer.as_ref().expect("producer present while BeamConfigured");
        let data_header = producer.data_header().clone();
        let weights_header = producer.weights_header().clone();
        let mut merged = self.beam_header.clone();
        merged.append_header(&data_header);
        merged.append_header(&weights_header);
        merged.append_header(&header);

        let config = StreamConfig::from_headers(&merged, &weights_header).map_err(|e| self.enter_fault(e))?;

        let nrebin = header
            .get_uint32("STAT_NREBIN")
            .map(|v| v as usize)
            .unwrap_or(nrebin_default);
        let shape = StorageShape { nchan: config.nchan as usize, nbit: config.nbit, nrebin };
        let rfi_mask_lut = config.rfi_mask_lut();
        let channel_freqs =
            ndarray::Array1::from_iter((0..config.nchan).map(|c| config.channel_centre_frequency(c)));
        let storage = Storage::new(shape, channel_freqs, rfi_mask_lut);

        let req_time_bins = header.get_uint32("STAT_REQ_TIME_BINS").unwrap_or(1);
        let req_freq_bins = header.get_uint32("STAT_REQ_FREQ_BINS").unwrap_or(1);

        self.processor = Some(Arc::new(Mutex::new(Processor::new(storage, config, req_time_bins, req_freq_bins))));
        self.scan_header = header;
        self.state = State::ScanConfigured;
        info!("configure_scan complete");
        Ok(())
    }

    pub fn register_publisher(&mut self, publisher: Box<dyn Publisher + Send>) -> Result<()> {
        let processor = self
            .processor
            .as_ref()
            .ok_or_else(|| self.invalid_transition("register_publisher"))?;
        processor.lock().expect("processor lock poisoned").register_publisher(publisher);
        Ok(())
    }

    pub fn deconfigure_scan(&mut self) -> Result<()> {
        if self.state != State::ScanConfigured {
            return Err(self.invalid_transition("deconfigure_scan"));
        }
        self.processor = None;
        self.state = State::BeamConfigured;
        info!("deconfigure_scan complete");
        Ok(())
    }

    /// Spawns the scan thread. `segment_source` is called on the scan
    /// thread to obtain successive segments from the producer; kept generic
    /// over a closure rather than moving `self.producer` so the manager
    /// stays usable for monitoring calls while scanning.
    pub fn start_scan<F>(&mut self, header: AsciiHeader, mut next_segment: F) -> Result<()>
    where
        F: FnMut() -> Result<Option<(Vec<u8>, Vec<u8>)>> + Send + 'static,
    {
        if self.state != State::ScanConfigured {
            return Err(self.invalid_transition("start_scan"));
        }
        validate_start_scan(&header).into_result()?;

        let processor = self.processor.clone().expect("processor present while ScanConfigured");
        let (stop_tx, stop_rx) = channel::bounded::<()>(1);

        let handle = std::thread::spawn(move || {
            while stop_rx.try_recv().is_err() {
                match next_segment() {
                    Ok(Some((data, weights))) => {
                        let segment = crate::segment::Segment { data: &data, weights: &weights };
                        let mut guard = processor.lock().expect("processor lock poisoned");
                        if let Err(e) = guard.process(&segment) {
                            warn!("segment processing failed: {e}");
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!("segment source failed: {e}");
                        break;
                    }
                }
            }
        });

        self.stop_tx = Some(stop_tx);
        self.scan_thread = Some(handle);
        self.scan_header.append_header(&header);
        self.state = State::Scanning;
        info!("start_scan complete");
        Ok(())
    }

    /// Signals the scan thread and `Computer::interrupt`, then joins before
    /// returning to `ScanConfigured`.
    pub fn stop_scan(&mut self) -> Result<()> {
        if self.state != State::Scanning {
            return Err(self.invalid_transition("stop_scan"));
        }
        if let Some(tx) = &self.stop_tx {
            let _ = tx.send(());
        }
        if let Some(processor) = &self.processor {
            processor.lock().expect("processor lock poisoned").interrupt();
        }
        if let Some(handle) = self.scan_thread.take() {
            let _ = handle.join();
        }
        self.stop_tx = None;
        self.state = State::ScanConfigured;
        info!("stop_scan complete");
        Ok(())
    }

    pub fn reset(&mut self) -> Result<()> {
        if self.state != State::RuntimeError {
            return Err(self.invalid_transition("reset"));
        }
        self.fault_cause = None;
        self.state = State::Idle;
        info!("reset complete");
        Ok(())
    }
}
