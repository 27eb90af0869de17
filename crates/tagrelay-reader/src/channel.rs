//! Single-worker hardware channel.
//!
//! Exactly one task owns the physical reader handle. Every public operation
//! is a message carrying a `oneshot` reply sender; the worker executes
//! commands in submission order (FIFO), so "stop scanning" submitted after
//! "start scanning" always observes the started state. Vendor detections
//! arrive on a separate channel and are drained by the same task, so no
//! hardware-touching logic ever runs on a driver thread.
//!
//! Every operation is bounded by a deadline (default 5 s). On expiry the
//! caller gets [`Error::Timeout`] and the operation is abandoned from the
//! caller's perspective; the worker still finishes it, so the hardware is
//! never left mid-operation.
//!
//! # Examples
//!
//! ```no_run
//! use tagrelay_reader::{ReaderChannel, ReaderChannelConfig, AnyReader};
//! use tagrelay_reader::mock::MockReader;
//! use tokio::sync::mpsc;
//!
//! # #[tokio::main]
//! # async fn main() -> tagrelay_core::Result<()> {
//! let (raw_tx, raw_rx) = mpsc::channel(256);
//! let (reader, mock) = MockReader::new(raw_tx);
//!
//! let (handle, mut streams, _worker) =
//!     ReaderChannel::spawn(AnyReader::Mock(reader), raw_rx, ReaderChannelConfig::default());
//!
//! handle.initialize().await?;
//! handle.start_continuous_scan(None).await?;
//!
//! mock.present_tag("E28011606000", "3000ABCD", -48.5, 915.25).await;
//! let event = streams.first_seen.recv().await.unwrap();
//! assert_eq!(event.seen_count, 1);
//!
//! handle.stop_continuous_scan().await?;
//! handle.shutdown().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use tagrelay_core::constants::DEFAULT_OP_TIMEOUT_MS;
use tagrelay_core::{
    EpcFilterSpec, Error, FrequencyMode, MemoryBank, RawDetection, ReaderState, Result, TagEvent,
};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::filter::{clear_filter, filter_for_value};
use crate::processor::{TagEventProcessor, TagStreams};
use crate::state::ReaderStateMachine;
use crate::traits::{AnyReader, RfidReader};

/// Commands the worker executes FIFO. Each carries its reply slot.
enum Command {
    Initialize(oneshot::Sender<Result<()>>),
    Shutdown(oneshot::Sender<Result<()>>),
    ReadSingleTag(oneshot::Sender<Result<Option<TagEvent>>>),
    WriteTagEpc {
        target: EpcFilterSpec,
        new_epc_hex: String,
        reply: oneshot::Sender<Result<()>>,
    },
    ConfigureFilter {
        spec: EpcFilterSpec,
        reply: oneshot::Sender<Result<()>>,
    },
    SetPower {
        dbm: i32,
        reply: oneshot::Sender<Result<()>>,
    },
    StartScan {
        kind: ScanKind,
        reply: oneshot::Sender<Result<()>>,
    },
    StopScan(oneshot::Sender<Result<()>>),
    Suspend(oneshot::Sender<Result<()>>),
}

/// Flavor of continuous scanning session.
#[derive(Debug, Clone)]
enum ScanKind {
    /// Continuous TID-keyed scanning, optional select filter.
    Continuous(Option<EpcFilterSpec>),

    /// Hunt for one specific tag by partial identifier.
    TagHunt(EpcFilterSpec),

    /// EPC-bank inventory sweep, filter cleared.
    Inventory,
}

/// Configuration for the reader channel.
#[derive(Debug, Clone)]
pub struct ReaderChannelConfig {
    /// Deadline for each submitted operation.
    pub op_timeout: Duration,

    /// Transmit power applied during initialization, dBm.
    pub power_dbm: i32,

    /// Regulatory frequency plan applied during initialization.
    pub frequency_mode: FrequencyMode,

    /// Capacity of the lossy every-read stream.
    pub every_read_capacity: usize,

    /// Capacity of the must-deliver first-seen stream.
    pub first_seen_capacity: usize,
}

impl Default for ReaderChannelConfig {
    fn default() -> Self {
        Self {
            op_timeout: Duration::from_millis(DEFAULT_OP_TIMEOUT_MS),
            power_dbm: 26,
            frequency_mode: FrequencyMode::Auto,
            every_read_capacity: 256,
            first_seen_capacity: 64,
        }
    }
}

/// Spawns the worker that exclusively owns the reader handle.
pub struct ReaderChannel;

impl ReaderChannel {
    /// Start the worker task for `reader`.
    ///
    /// `detections` is the channel the reader backend feeds from its vendor
    /// callback. Returns the cloneable operations handle, the two tag-event
    /// streams, and the worker's join handle.
    pub fn spawn(
        reader: AnyReader,
        detections: mpsc::Receiver<RawDetection>,
        config: ReaderChannelConfig,
    ) -> (ReaderHandle, TagStreams, JoinHandle<()>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let (state_tx, state_rx) = watch::channel(ReaderState::Init);
        let (processor, streams) =
            TagEventProcessor::new(config.every_read_capacity, config.first_seen_capacity);
        let processor = Arc::new(processor);

        let handle = ReaderHandle {
            cmd_tx,
            state_rx,
            processor: Arc::clone(&processor),
            op_timeout: config.op_timeout,
        };

        let worker = Worker {
            reader,
            machine: ReaderStateMachine::new(),
            commands: cmd_rx,
            detections,
            processor,
            state_tx,
            power: config.power_dbm,
            config,
        };
        let join = tokio::spawn(worker.run());

        (handle, streams, join)
    }
}

/// Cloneable handle submitting operations to the reader worker.
///
/// All operations suspend the caller until the worker completes them (or
/// the deadline expires); none touch the hardware handle directly.
#[derive(Clone)]
pub struct ReaderHandle {
    cmd_tx: mpsc::Sender<Command>,
    state_rx: watch::Receiver<ReaderState>,
    processor: Arc<TagEventProcessor>,
    op_timeout: Duration,
}

impl ReaderHandle {
    /// Bring the reader from `Init` (or `Sleeping`) to `Ready`: SDK init,
    /// transmit power, frequency plan.
    pub async fn initialize(&self) -> Result<()> {
        self.request(Command::Initialize).await
    }

    /// Tear the reader down to `Sleeping`. Subsequent operations other than
    /// `initialize` fail fast with [`Error::NotReady`].
    pub async fn shutdown(&self) -> Result<()> {
        self.request(Command::Shutdown).await
    }

    /// One single-shot read. `None` when no tag answered.
    pub async fn read_single_tag(&self) -> Result<Option<TagEvent>> {
        self.request(Command::ReadSingleTag).await
    }

    /// Write a new EPC to the tag addressed by `target`.
    pub async fn write_tag_epc(&self, target: EpcFilterSpec, new_epc_hex: &str) -> Result<()> {
        let new_epc_hex = new_epc_hex.to_string();
        self.request(|reply| Command::WriteTagEpc {
            target,
            new_epc_hex,
            reply,
        })
        .await
    }

    /// Apply a select filter outside a scan session.
    pub async fn configure_filter(&self, spec: EpcFilterSpec) -> Result<()> {
        self.request(|reply| Command::ConfigureFilter { spec, reply })
            .await
    }

    /// Change transmit power.
    pub async fn set_power(&self, dbm: i32) -> Result<()> {
        self.request(|reply| Command::SetPower { dbm, reply }).await
    }

    /// Start continuous TID-keyed scanning; resets the scanning round.
    /// `filter: None` clears any previous select filter.
    pub async fn start_continuous_scan(&self, filter: Option<EpcFilterSpec>) -> Result<()> {
        self.request(|reply| Command::StartScan {
            kind: ScanKind::Continuous(filter),
            reply,
        })
        .await
    }

    /// Stop continuous scanning; the reader returns to `Ready`.
    pub async fn stop_continuous_scan(&self) -> Result<()> {
        self.request(Command::StopScan).await
    }

    /// Hunt for a specific tag by partial identifier on the given bank.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidFilter`] before touching the worker when
    /// `partial_hex` is empty or not hex.
    pub async fn start_tag_hunt(&self, bank: MemoryBank, partial_hex: &str) -> Result<()> {
        let target = filter_for_value(bank, partial_hex)?;
        self.request(|reply| Command::StartScan {
            kind: ScanKind::TagHunt(target),
            reply,
        })
        .await
    }

    /// Stop a tag hunt. Same wire operation as stopping a scan.
    pub async fn stop_tag_hunt(&self) -> Result<()> {
        self.request(Command::StopScan).await
    }

    /// Start an EPC-bank inventory sweep with the filter cleared.
    pub async fn start_inventory_scan(&self) -> Result<()> {
        self.request(|reply| Command::StartScan {
            kind: ScanKind::Inventory,
            reply,
        })
        .await
    }

    /// Stop an inventory sweep.
    pub async fn stop_inventory_scan(&self) -> Result<()> {
        self.request(Command::StopScan).await
    }

    /// Lifecycle pause: stops any scanning/hunt/inventory session but keeps
    /// the worker and the hardware session alive. No-op when idle.
    pub async fn suspend(&self) -> Result<()> {
        self.request(Command::Suspend).await
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ReaderState {
        *self.state_rx.borrow()
    }

    /// Observable state stream for UI rendering.
    #[must_use]
    pub fn state_stream(&self) -> watch::Receiver<ReaderState> {
        self.state_rx.clone()
    }

    /// The processor backing the event streams; exposes round snapshots.
    #[must_use]
    pub fn processor(&self) -> &Arc<TagEventProcessor> {
        &self.processor
    }

    /// Submit one command and await its reply under the deadline.
    ///
    /// The deadline covers the whole round trip: when the command queue is
    /// backed up behind a wedged hardware op, waiting for queue space
    /// counts against the same budget as waiting for the reply.
    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<T>>) -> Command,
    ) -> Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let command = build(reply_tx);

        let round_trip = async {
            self.cmd_tx
                .send(command)
                .await
                .map_err(|_| Error::not_ready("reader worker has shut down"))?;
            match reply_rx.await {
                Ok(result) => result,
                Err(_) => Err(Error::not_ready("reader worker dropped the operation")),
            }
        };

        match tokio::time::timeout(self.op_timeout, round_trip).await {
            Ok(result) => result,
            Err(_) => Err(Error::timeout(self.op_timeout.as_millis() as u64)),
        }
    }
}

/// The one task allowed to touch the reader handle.
struct Worker {
    reader: AnyReader,
    machine: ReaderStateMachine,
    commands: mpsc::Receiver<Command>,
    detections: mpsc::Receiver<RawDetection>,
    processor: Arc<TagEventProcessor>,
    state_tx: watch::Sender<ReaderState>,
    power: i32,
    config: ReaderChannelConfig,
}

impl Worker {
    async fn run(mut self) {
        info!("reader worker started");
        let mut detections_open = true;
        loop {
            tokio::select! {
                // Commands win over detections so "stop scanning" is not
                // starved by a hot callback stream.
                biased;

                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },

                detection = self.detections.recv(), if detections_open => match detection {
                    Some(detection) => self.handle_detection(detection).await,
                    None => {
                        debug!("detection channel closed");
                        detections_open = false;
                    }
                },
            }
        }

        // All handles gone: best-effort release so the radio is not left
        // transmitting.
        if self.machine.current() == ReaderState::Scanning {
            let _ = self.reader.stop_inventory().await;
        }
        let _ = self.reader.free().await;
        info!("reader worker stopped");
    }

    async fn handle_detection(&mut self, detection: RawDetection) {
        if self.machine.current() != ReaderState::Scanning {
            trace!(tid = %detection.tid, "detection outside scanning session dropped");
            return;
        }
        self.processor.on_detection(detection, self.power).await;
    }

    async fn handle_command(&mut self, command: Command) {
        // A completed shutdown leaves the worker alive in Sleeping so the
        // reader can be re-initialized; everything else fails fast.
        if self.machine.current() == ReaderState::Sleeping
            && !matches!(command, Command::Initialize(_))
        {
            self.reply_not_ready(command);
            return;
        }

        match command {
            Command::Initialize(reply) => {
                let result = self.initialize().await;
                let _ = reply.send(result);
            }
            Command::Shutdown(reply) => {
                let result = self.shutdown().await;
                let _ = reply.send(result);
            }
            Command::ReadSingleTag(reply) => {
                let result = self.read_single_tag().await;
                let _ = reply.send(result);
            }
            Command::WriteTagEpc {
                target,
                new_epc_hex,
                reply,
            } => {
                let result = self.write_tag_epc(&target, &new_epc_hex).await;
                let _ = reply.send(result);
            }
            Command::ConfigureFilter { spec, reply } => {
                let result = self.configure_filter(&spec).await;
                let _ = reply.send(result);
            }
            Command::SetPower { dbm, reply } => {
                let result = self.set_power(dbm).await;
                let _ = reply.send(result);
            }
            Command::StartScan { kind, reply } => {
                let result = self.start_scan(kind).await;
                let _ = reply.send(result);
            }
            Command::StopScan(reply) => {
                let result = self.stop_scan().await;
                let _ = reply.send(result);
            }
            Command::Suspend(reply) => {
                let result = self.suspend().await;
                let _ = reply.send(result);
            }
        }
    }

    fn reply_not_ready(&self, command: Command) {
        let message = "reader is sleeping; initialize first";
        match command {
            Command::Initialize(reply) | Command::Shutdown(reply) => {
                let _ = reply.send(Err(Error::not_ready(message)));
            }
            Command::ReadSingleTag(reply) => {
                let _ = reply.send(Err(Error::not_ready(message)));
            }
            Command::WriteTagEpc { reply, .. }
            | Command::ConfigureFilter { reply, .. }
            | Command::SetPower { reply, .. }
            | Command::StartScan { reply, .. }
            | Command::StopScan(reply)
            | Command::Suspend(reply) => {
                let _ = reply.send(Err(Error::not_ready(message)));
            }
        }
    }

    /// Apply a transition and mirror it on the observable state.
    fn transition(&mut self, to: ReaderState) -> bool {
        if self.machine.request_transition(to) {
            let _ = self.state_tx.send(to);
            true
        } else {
            false
        }
    }

    /// Map a hardware failure: record `Error` state, pass the fault up.
    fn fault(&mut self, error: Error) -> Error {
        self.transition(ReaderState::Error);
        error
    }

    async fn initialize(&mut self) -> Result<()> {
        if !self.transition(ReaderState::Configuring) {
            return Err(Error::lifecycle(format!(
                "cannot initialize from {}",
                self.machine.current()
            )));
        }

        let power = self.config.power_dbm;
        let mode = self.config.frequency_mode;
        let result: Result<()> = async {
            self.reader.init().await?;
            self.reader.set_power(power).await?;
            self.reader.set_frequency_mode(mode).await?;
            Ok(())
        }
        .await;

        match result {
            Ok(()) => {
                self.power = power;
                self.transition(ReaderState::Ready);
                info!(power, ?mode, "reader initialized");
                Ok(())
            }
            Err(e) => Err(self.fault(e)),
        }
    }

    async fn shutdown(&mut self) -> Result<()> {
        if !self.transition(ReaderState::ShuttingDown) {
            return Err(Error::lifecycle(format!(
                "cannot shut down from {}",
                self.machine.current()
            )));
        }

        // Best-effort teardown; the reader goes to sleep regardless.
        if let Err(e) = self.reader.stop_inventory().await {
            warn!(error = %e, "stop_inventory during shutdown failed");
        }
        if let Err(e) = self.reader.free().await {
            warn!(error = %e, "free during shutdown failed");
        }

        self.transition(ReaderState::Sleeping);
        info!("reader shut down");
        Ok(())
    }

    async fn read_single_tag(&mut self) -> Result<Option<TagEvent>> {
        if !self.transition(ReaderState::Scanning) {
            return Err(Error::lifecycle(format!(
                "cannot read a tag from {}",
                self.machine.current()
            )));
        }

        let result = self.reader.read_single_tag().await;
        match result {
            Ok(detection) => {
                self.transition(ReaderState::Ready);
                Ok(detection.map(|raw| TagEvent {
                    tag_id: raw.tid,
                    epc: raw.epc,
                    rssi: raw.rssi,
                    seen_count: 1,
                    round_id: self.processor.summary().round_id,
                    frequency: raw.frequency,
                    power: self.power,
                }))
            }
            Err(e) => Err(self.fault(e)),
        }
    }

    async fn write_tag_epc(&mut self, target: &EpcFilterSpec, new_epc_hex: &str) -> Result<()> {
        if !self.transition(ReaderState::Writing) {
            return Err(Error::lifecycle(format!(
                "cannot write a tag from {}",
                self.machine.current()
            )));
        }

        let result: Result<()> = async {
            self.reader.apply_filter(target).await?;
            self.reader.write_epc(target, new_epc_hex).await?;
            // Leave no write-target filter behind.
            self.reader.apply_filter(&clear_filter(target.bank)).await?;
            Ok(())
        }
        .await;

        match result {
            Ok(()) => {
                self.transition(ReaderState::Ready);
                info!(tid_filter = %target.value_hex, "EPC written");
                Ok(())
            }
            Err(e) => Err(self.fault(e)),
        }
    }

    async fn configure_filter(&mut self, spec: &EpcFilterSpec) -> Result<()> {
        if !self.transition(ReaderState::Configuring) {
            return Err(Error::lifecycle(format!(
                "cannot configure from {}",
                self.machine.current()
            )));
        }

        match self.reader.apply_filter(spec).await {
            Ok(()) => {
                self.transition(ReaderState::Ready);
                Ok(())
            }
            Err(e) => Err(self.fault(e)),
        }
    }

    async fn set_power(&mut self, dbm: i32) -> Result<()> {
        if !self.transition(ReaderState::Configuring) {
            return Err(Error::lifecycle(format!(
                "cannot set power from {}",
                self.machine.current()
            )));
        }

        match self.reader.set_power(dbm).await {
            Ok(()) => {
                self.power = dbm;
                self.transition(ReaderState::Ready);
                Ok(())
            }
            Err(e) => Err(self.fault(e)),
        }
    }

    async fn start_scan(&mut self, kind: ScanKind) -> Result<()> {
        // Filters are (re)applied while Configuring, then the session moves
        // to Scanning; both edges are validated.
        if !self.transition(ReaderState::Configuring) {
            return Err(Error::lifecycle(format!(
                "cannot start scanning from {}",
                self.machine.current()
            )));
        }

        let result: Result<()> = async {
            match &kind {
                ScanKind::Continuous(filter) => {
                    self.reader.set_read_bank(MemoryBank::Tid).await?;
                    match filter {
                        Some(spec) => self.reader.apply_filter(spec).await?,
                        None => self.reader.apply_filter(&clear_filter(MemoryBank::Epc)).await?,
                    }
                }
                ScanKind::TagHunt(target) => {
                    self.reader.set_read_bank(target.bank).await?;
                    self.reader.apply_filter(target).await?;
                }
                ScanKind::Inventory => {
                    self.reader.set_read_bank(MemoryBank::Epc).await?;
                    self.reader.apply_filter(&clear_filter(MemoryBank::Epc)).await?;
                }
            }
            Ok(())
        }
        .await;
        if let Err(e) = result {
            return Err(self.fault(e));
        }

        if !self.transition(ReaderState::Scanning) {
            return Err(Error::lifecycle("configuration left the reader unscannable"));
        }

        // Fresh round: previously seen tags become first-seen again.
        self.processor.reset_round();

        match self.reader.start_inventory().await {
            Ok(()) => {
                debug!(?kind, "scan session started");
                Ok(())
            }
            Err(e) => Err(self.fault(e)),
        }
    }

    async fn stop_scan(&mut self) -> Result<()> {
        if !self.transition(ReaderState::Ready) {
            return Err(Error::lifecycle(format!(
                "cannot stop scanning from {}",
                self.machine.current()
            )));
        }

        match self.reader.stop_inventory().await {
            Ok(()) => Ok(()),
            Err(e) => Err(self.fault(e)),
        }
    }

    async fn suspend(&mut self) -> Result<()> {
        if self.machine.current() != ReaderState::Scanning {
            return Ok(());
        }

        debug!("lifecycle pause: stopping scan session");
        self.stop_scan().await
    }
}
