//! Continuous-scanning tag-event processor.
//!
//! Consumes raw tag-detected callbacks, maintains a per-round dedup map
//! keyed by TID, keeps the round's summary counters, and publishes two
//! streams:
//!
//! - **every-read**: one event per raw detection, carrying that read's
//!   RSSI, EPC and frequency, sent best-effort (`try_send`, drop-on-full).
//!   This stream exists for live UI feedback; dropping under backpressure
//!   is intentional.
//! - **first-seen**: exactly one event per distinct tag per round, sent with
//!   a blocking `send().await`. This stream feeds outbound delivery and must
//!   not silently drop.
//!
//! The dedup map and the summary counters are guarded by the same mutex so
//! they always update atomically together; readers take snapshots under the
//! lock while the hardware worker mutates between their reads.

use std::collections::HashMap;
use std::sync::Mutex;

use tagrelay_core::{RawDetection, RoundSummary, TagEvent};
use tokio::sync::mpsc;
use tracing::{trace, warn};

/// Consumer ends of the two event streams.
#[derive(Debug)]
pub struct TagStreams {
    /// One event per raw detection; lossy under backpressure.
    pub every_read: mpsc::Receiver<TagEvent>,

    /// One event per distinct tag per round; never dropped by the producer.
    pub first_seen: mpsc::Receiver<TagEvent>,
}

#[derive(Debug)]
struct RoundState {
    dedup: HashMap<String, TagEvent>,
    round_id: i64,
    tag_count: u64,
    last_rssi: f64,
}

impl RoundState {
    fn summary(&self) -> RoundSummary {
        RoundSummary {
            round_id: self.round_id,
            tag_count: self.tag_count,
            unique_count: self.dedup.len(),
            last_rssi: self.last_rssi,
        }
    }
}

/// Deduplicating processor for raw detections within a scanning round.
///
/// One producer (the reader worker forwarding vendor callbacks) and any
/// number of snapshot readers share an instance behind an `Arc`.
///
/// # Examples
///
/// ```
/// use tagrelay_reader::TagEventProcessor;
/// use tagrelay_core::RawDetection;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let (processor, mut streams) = TagEventProcessor::new(16, 16);
///
/// let raw = RawDetection {
///     tid: "E28011606000".into(),
///     epc: "3000ABCD".into(),
///     rssi: -48.5,
///     frequency: 915.25,
///     };
/// processor.on_detection(raw.clone(), 30).await;
/// processor.on_detection(raw, 30).await;
///
/// let summary = processor.summary();
/// assert_eq!(summary.tag_count, 2);
/// assert_eq!(summary.unique_count, 1);
///
/// // One first-seen emission, two every-read emissions.
/// assert!(streams.first_seen.try_recv().is_ok());
/// assert!(streams.first_seen.try_recv().is_err());
/// # }
/// ```
#[derive(Debug)]
pub struct TagEventProcessor {
    round: Mutex<RoundState>,
    every_read_tx: mpsc::Sender<TagEvent>,
    first_seen_tx: mpsc::Sender<TagEvent>,
}

impl TagEventProcessor {
    /// Create a processor together with the consumer ends of its streams.
    ///
    /// `every_read_capacity` bounds the lossy UI stream;
    /// `first_seen_capacity` bounds the must-deliver stream (the producer
    /// blocks when it fills, which backpressures the scan path instead of
    /// losing events).
    pub fn new(every_read_capacity: usize, first_seen_capacity: usize) -> (Self, TagStreams) {
        let (every_read_tx, every_read) = mpsc::channel(every_read_capacity);
        let (first_seen_tx, first_seen) = mpsc::channel(first_seen_capacity);

        let processor = Self {
            round: Mutex::new(RoundState {
                dedup: HashMap::new(),
                round_id: 0,
                tag_count: 0,
                last_rssi: 0.0,
            }),
            every_read_tx,
            first_seen_tx,
        };

        (
            processor,
            TagStreams {
                every_read,
                first_seen,
            },
        )
    }

    /// Process one raw detection.
    ///
    /// Blank TIDs are partial/garbled reads and are discarded silently.
    /// `power` is the transmit power active when the tag was read, stamped
    /// onto the event for delivery.
    pub async fn on_detection(&self, raw: RawDetection, power: i32) {
        if raw.tid.trim().is_empty() {
            trace!("discarding detection with blank TID");
            return;
        }

        // Map and counters must move together; everything up to stream
        // emission happens under the one lock.
        let (every_read_event, first_seen_event) = {
            let mut round = self.round.lock().unwrap_or_else(|e| e.into_inner());

            round.tag_count += 1;
            round.last_rssi = raw.rssi;
            let round_id = round.round_id;

            match round.dedup.get_mut(&raw.tid) {
                Some(existing) => {
                    existing.seen_count += 1;
                    existing.rssi = raw.rssi;
                    let seen_count = existing.seen_count;
                    // The stored entry keeps the first detection's EPC and
                    // frequency; the live stream reports each actual read.
                    (
                        TagEvent {
                            tag_id: raw.tid,
                            epc: raw.epc,
                            rssi: raw.rssi,
                            seen_count,
                            round_id,
                            frequency: raw.frequency,
                            power,
                        },
                        None,
                    )
                }
                None => {
                    let event = TagEvent {
                        tag_id: raw.tid.clone(),
                        epc: raw.epc,
                        rssi: raw.rssi,
                        seen_count: 1,
                        round_id,
                        frequency: raw.frequency,
                        power,
                    };
                    round.dedup.insert(raw.tid, event.clone());
                    (event.clone(), Some(event))
                }
            }
        };

        // Live-feedback stream: drop-on-full is acceptable here.
        if let Err(mpsc::error::TrySendError::Full(_)) =
            self.every_read_tx.try_send(every_read_event)
        {
            trace!("every-read stream full, dropping event");
        }

        // Delivery stream: block until the consumer takes it.
        if let Some(event) = first_seen_event
            && self.first_seen_tx.send(event).await.is_err()
        {
            warn!("first-seen consumer dropped, tag event lost");
        }
    }

    /// Start a new scanning round: clear the dedup map, bump the round id,
    /// zero the summary counters. Called whenever continuous scanning
    /// (re)starts.
    pub fn reset_round(&self) {
        let mut round = self.round.lock().unwrap_or_else(|e| e.into_inner());
        round.dedup.clear();
        round.round_id += 1;
        round.tag_count = 0;
        round.last_rssi = 0.0;
        trace!(round_id = round.round_id, "scanning round reset");
    }

    /// Snapshot of the current round's counters.
    #[must_use]
    pub fn summary(&self) -> RoundSummary {
        self.round
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .summary()
    }

    /// Snapshot of the current round's deduplicated tags.
    ///
    /// Cloned under the lock so consumers can iterate freely while the
    /// worker keeps mutating the live map.
    #[must_use]
    pub fn tags(&self) -> Vec<TagEvent> {
        self.round
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .dedup
            .values()
            .cloned()
            .collect()
    }

    /// Per-tag seen count, if the tag was detected this round.
    #[must_use]
    pub fn seen_count(&self, tid: &str) -> Option<u32> {
        self.round
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .dedup
            .get(tid)
            .map(|event| event.seen_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detection(tid: &str) -> RawDetection {
        RawDetection {
            tid: tid.to_string(),
            epc: format!("3000{tid}"),
            rssi: -50.0,
            frequency: 915.25,
        }
    }

    #[tokio::test]
    async fn dedups_within_a_round() {
        let (processor, mut streams) = TagEventProcessor::new(16, 16);

        processor.on_detection(detection("AAAA"), 30).await;
        processor.on_detection(detection("AAAA"), 30).await;
        processor.on_detection(detection("BBBB"), 30).await;

        let summary = processor.summary();
        assert_eq!(summary.tag_count, 3);
        assert_eq!(summary.unique_count, 2);

        assert_eq!(processor.seen_count("AAAA"), Some(2));
        assert_eq!(processor.seen_count("BBBB"), Some(1));

        // Exactly 2 first-seen emissions, in first-arrival order.
        assert_eq!(streams.first_seen.recv().await.unwrap().tag_id, "AAAA");
        assert_eq!(streams.first_seen.recv().await.unwrap().tag_id, "BBBB");
        assert!(streams.first_seen.try_recv().is_err());

        // Exactly 3 every-read emissions, in arrival order.
        let mut every = Vec::new();
        while let Ok(event) = streams.every_read.try_recv() {
            every.push(event.tag_id);
        }
        assert_eq!(every, vec!["AAAA", "AAAA", "BBBB"]);
    }

    #[tokio::test]
    async fn blank_tid_discarded() {
        let (processor, mut streams) = TagEventProcessor::new(4, 4);

        processor
            .on_detection(
                RawDetection {
                    tid: "   ".into(),
                    epc: "3000".into(),
                    rssi: -60.0,
                    frequency: 915.25,
                },
                30,
            )
            .await;

        assert_eq!(processor.summary().tag_count, 0);
        assert!(streams.every_read.try_recv().is_err());
        assert!(streams.first_seen.try_recv().is_err());
    }

    #[tokio::test]
    async fn every_read_drops_on_full_without_blocking() {
        let (processor, mut streams) = TagEventProcessor::new(1, 16);

        processor.on_detection(detection("AAAA"), 30).await;
        // Stream capacity 1 and nobody consuming: this read is dropped from
        // every-read but still counted and still bumps seen_count.
        processor.on_detection(detection("AAAA"), 30).await;

        assert_eq!(processor.summary().tag_count, 2);
        assert_eq!(processor.seen_count("AAAA"), Some(2));

        assert!(streams.every_read.try_recv().is_ok());
        assert!(streams.every_read.try_recv().is_err());
    }

    #[tokio::test]
    async fn reset_round_makes_tags_first_seen_again() {
        let (processor, mut streams) = TagEventProcessor::new(16, 16);

        processor.on_detection(detection("AAAA"), 30).await;
        let first = streams.first_seen.recv().await.unwrap();

        processor.reset_round();
        assert_eq!(processor.summary().tag_count, 0);
        assert_eq!(processor.summary().unique_count, 0);

        processor.on_detection(detection("AAAA"), 30).await;
        let again = streams.first_seen.recv().await.unwrap();

        assert_eq!(again.tag_id, "AAAA");
        assert_eq!(again.seen_count, 1);
        assert_eq!(again.round_id, first.round_id + 1);
    }

    #[tokio::test]
    async fn reset_round_is_idempotent_for_dedup() {
        let (processor, mut streams) = TagEventProcessor::new(16, 16);

        processor.reset_round();
        processor.reset_round();

        processor.on_detection(detection("AAAA"), 30).await;
        assert!(streams.first_seen.try_recv().is_ok());
        assert_eq!(processor.seen_count("AAAA"), Some(1));
    }

    #[tokio::test]
    async fn every_read_repeat_carries_current_read_values() {
        let (processor, mut streams) = TagEventProcessor::new(16, 16);

        let mut raw = detection("AAAA");
        raw.frequency = 915.25;
        processor.on_detection(raw, 30).await;

        let mut raw = detection("AAAA");
        raw.frequency = 902.75;
        raw.rssi = -41.0;
        processor.on_detection(raw, 30).await;

        let first = streams.every_read.recv().await.unwrap();
        assert_eq!(first.frequency, 915.25);

        // The repeat reflects the read that just happened, not the entry.
        let second = streams.every_read.recv().await.unwrap();
        assert_eq!(second.frequency, 902.75);
        assert_eq!(second.rssi, -41.0);
        assert_eq!(second.seen_count, 2);

        // The dedup entry still pins the first detection's frequency.
        assert_eq!(processor.tags()[0].frequency, 915.25);
    }

    #[tokio::test]
    async fn repeat_detection_updates_rssi_in_place() {
        let (processor, _streams) = TagEventProcessor::new(16, 16);

        let mut raw = detection("AAAA");
        raw.rssi = -70.0;
        processor.on_detection(raw, 30).await;

        let mut raw = detection("AAAA");
        raw.rssi = -41.0;
        processor.on_detection(raw, 30).await;

        let tags = processor.tags();
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].rssi, -41.0);
        assert_eq!(processor.summary().last_rssi, -41.0);
    }
}
