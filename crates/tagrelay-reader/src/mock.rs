//! Mock RFID reader implementation for testing and development.
//!
//! Simulates a UHF reader module that can be controlled programmatically:
//! tags are "presented" through a handle, configuration calls are recorded
//! for assertions, and faults and stalls can be injected per operation.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tagrelay_core::{EpcFilterSpec, Error, FrequencyMode, MemoryBank, RawDetection, Result};
use tokio::sync::mpsc;

use crate::traits::RfidReader;

#[derive(Debug)]
struct MockState {
    initialized: bool,
    inventory_running: bool,
    power: i32,
    frequency_mode: FrequencyMode,
    read_bank: MemoryBank,
    applied_filters: Vec<EpcFilterSpec>,
    written_epcs: Vec<(EpcFilterSpec, String)>,
    single_reads: VecDeque<RawDetection>,
    fail_next: Option<String>,
    hang_next: Option<Duration>,
}

/// Mock UHF reader.
///
/// Construction takes the detection sender the hardware channel drains;
/// [`MockReaderHandle::present_tag`] plays the role of the vendor callback
/// thread pushing detections into it.
///
/// # Examples
///
/// ```
/// use tagrelay_reader::mock::MockReader;
/// use tagrelay_reader::RfidReader;
/// use tokio::sync::mpsc;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> tagrelay_core::Result<()> {
/// let (raw_tx, mut raw_rx) = mpsc::channel(8);
/// let (mut reader, handle) = MockReader::new(raw_tx);
///
/// reader.init().await?;
/// reader.start_inventory().await?;
///
/// handle.present_tag("E28011606000", "3000ABCD", -48.5, 915.25).await;
/// let detection = raw_rx.recv().await.unwrap();
/// assert_eq!(detection.tid, "E28011606000");
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct MockReader {
    state: Arc<Mutex<MockState>>,
}

/// Control handle for scripting the mock reader from tests.
#[derive(Debug, Clone)]
pub struct MockReaderHandle {
    state: Arc<Mutex<MockState>>,
    detections_tx: mpsc::Sender<RawDetection>,
}

impl MockReader {
    /// Create a mock reader and its control handle.
    ///
    /// `detections_tx` is where presented tags land; it is the same channel
    /// a real backend would feed from its vendor callback.
    pub fn new(detections_tx: mpsc::Sender<RawDetection>) -> (Self, MockReaderHandle) {
        let state = Arc::new(Mutex::new(MockState {
            initialized: false,
            inventory_running: false,
            power: 0,
            frequency_mode: FrequencyMode::Auto,
            read_bank: MemoryBank::Epc,
            applied_filters: Vec::new(),
            written_epcs: Vec::new(),
            single_reads: VecDeque::new(),
            fail_next: None,
            hang_next: None,
        }));

        let handle = MockReaderHandle {
            state: Arc::clone(&state),
            detections_tx,
        };

        (Self { state }, handle)
    }

    /// Consume any injected fault or stall before running `op`.
    async fn gate(&self) -> Result<()> {
        let (fail, hang) = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            (state.fail_next.take(), state.hang_next.take())
        };

        if let Some(delay) = hang {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = fail {
            return Err(Error::hardware(message));
        }
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl RfidReader for MockReader {
    async fn init(&mut self) -> Result<()> {
        self.gate().await?;
        self.lock().initialized = true;
        Ok(())
    }

    async fn free(&mut self) -> Result<()> {
        self.gate().await?;
        let mut state = self.lock();
        state.initialized = false;
        state.inventory_running = false;
        Ok(())
    }

    async fn set_power(&mut self, dbm: i32) -> Result<()> {
        self.gate().await?;
        self.lock().power = dbm;
        Ok(())
    }

    async fn set_frequency_mode(&mut self, mode: FrequencyMode) -> Result<()> {
        self.gate().await?;
        self.lock().frequency_mode = mode;
        Ok(())
    }

    async fn set_read_bank(&mut self, bank: MemoryBank) -> Result<()> {
        self.gate().await?;
        self.lock().read_bank = bank;
        Ok(())
    }

    async fn apply_filter(&mut self, spec: &EpcFilterSpec) -> Result<()> {
        self.gate().await?;
        self.lock().applied_filters.push(spec.clone());
        Ok(())
    }

    async fn start_inventory(&mut self) -> Result<()> {
        self.gate().await?;
        let mut state = self.lock();
        if !state.initialized {
            return Err(Error::not_ready("start_inventory before init"));
        }
        state.inventory_running = true;
        Ok(())
    }

    async fn stop_inventory(&mut self) -> Result<()> {
        self.gate().await?;
        self.lock().inventory_running = false;
        Ok(())
    }

    async fn read_single_tag(&mut self) -> Result<Option<RawDetection>> {
        self.gate().await?;
        let mut state = self.lock();
        if !state.initialized {
            return Err(Error::not_ready("read_single_tag before init"));
        }
        Ok(state.single_reads.pop_front())
    }

    async fn write_epc(&mut self, target: &EpcFilterSpec, new_epc_hex: &str) -> Result<()> {
        self.gate().await?;
        let mut state = self.lock();
        if !state.initialized {
            return Err(Error::not_ready("write_epc before init"));
        }
        state
            .written_epcs
            .push((target.clone(), new_epc_hex.to_string()));
        Ok(())
    }
}

impl MockReaderHandle {
    /// Present a tag to the antenna; lands on the detection channel the way
    /// a vendor callback would.
    pub async fn present_tag(&self, tid: &str, epc: &str, rssi: f64, frequency: f32) {
        let _ = self
            .detections_tx
            .send(RawDetection {
                tid: tid.to_string(),
                epc: epc.to_string(),
                rssi,
                frequency,
            })
            .await;
    }

    /// Queue the answer for the next `read_single_tag` call.
    pub fn queue_single_read(&self, detection: RawDetection) {
        self.lock().single_reads.push_back(detection);
    }

    /// Make the next operation fail with a hardware error.
    pub fn fail_next_op(&self, message: impl Into<String>) {
        self.lock().fail_next = Some(message.into());
    }

    /// Make the next operation stall for `delay` before completing.
    pub fn hang_next_op(&self, delay: Duration) {
        self.lock().hang_next = Some(delay);
    }

    /// Whether continuous inventory is currently running.
    #[must_use]
    pub fn inventory_running(&self) -> bool {
        self.lock().inventory_running
    }

    /// Whether `init` has succeeded and `free` has not.
    #[must_use]
    pub fn initialized(&self) -> bool {
        self.lock().initialized
    }

    /// Transmit power last applied.
    #[must_use]
    pub fn power(&self) -> i32 {
        self.lock().power
    }

    /// Frequency plan last applied.
    #[must_use]
    pub fn frequency_mode(&self) -> FrequencyMode {
        self.lock().frequency_mode
    }

    /// Every filter applied so far, in order (clears included).
    #[must_use]
    pub fn applied_filters(&self) -> Vec<EpcFilterSpec> {
        self.lock().applied_filters.clone()
    }

    /// Every EPC write performed so far, in order.
    #[must_use]
    pub fn written_epcs(&self) -> Vec<(EpcFilterSpec, String)> {
        self.lock().written_epcs.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}
