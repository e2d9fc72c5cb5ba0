//! Hand landmarks from an external pose estimator.
//!
//! The estimator runs as a sidecar on the same camera stream and writes one
//! JSON object per frame it processed, numbering frames from 0:
//! `{"frame": 7, "hands": [[{"x":..,"y":..,"z":..}, ... 21 points], ...]}`.
//! Coordinates are in the unmirrored camera image.

use log::{debug, info, warn};
use serde::Deserialize;
use std::{
    cmp::Ordering,
    io::BufRead,
    sync::mpsc::{self, Receiver, Sender},
    thread,
};

use crate::frame::Frame;
use crate::gestures::HandSkeleton;

pub trait LandmarkSource {
    /// Never blocks; no hands when nothing is known for this frame.
    fn detect_hands(&mut self, frame: &Frame) -> Vec<HandSkeleton>;
}

impl<T: LandmarkSource + ?Sized> LandmarkSource for Box<T> {
    fn detect_hands(&mut self, frame: &Frame) -> Vec<HandSkeleton> {
        (**self).detect_hands(frame)
    }
}

/// Used when no estimator feed is configured.
pub struct NoHands;

impl LandmarkSource for NoHands {
    fn detect_hands(&mut self, _frame: &Frame) -> Vec<HandSkeleton> {
        Vec::new()
    }
}

#[derive(Debug, Deserialize)]
pub struct FrameRecord {
    frame: u64,
    #[serde(default)]
    hands: Vec<HandSkeleton>,
}

/// `None` for a line that is not a valid record.
fn parse_record(line: &str) -> Option<FrameRecord> {
    match serde_json::from_str(line) {
        Ok(rec) => Some(rec),
        Err(e) => {
            warn!("dropping malformed landmark record: {e}");
            None
        }
    }
}

/// Runs on its own thread so a slow estimator never stalls the camera loop.
fn read_feed<R: BufRead>(reader: R, tx: Sender<FrameRecord>) {
    for line in reader.lines() {
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                warn!("landmark feed read failed: {e}");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        if let Some(rec) = parse_record(&line) {
            if tx.send(rec).is_err() {
                return;
            }
        }
    }
    info!("landmark feed ended; gesture override disabled");
}

/// Matches NDJSON records to camera frames by sequence number.
pub struct NdjsonLandmarks {
    rx: Receiver<FrameRecord>,
    /// A record for a frame that has not been read yet.
    pending: Option<FrameRecord>,
}

impl NdjsonLandmarks {
    pub fn spawn<R: BufRead + Send + 'static>(reader: R) -> Self {
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || read_feed(reader, tx));
        Self::from_channel(rx)
    }

    pub fn from_channel(rx: Receiver<FrameRecord>) -> Self {
        Self { rx, pending: None }
    }

    fn next_record(&mut self) -> Option<FrameRecord> {
        if let Some(rec) = self.pending.take() {
            return Some(rec);
        }
        self.rx.try_recv().ok()
    }
}

impl LandmarkSource for NdjsonLandmarks {
    fn detect_hands(&mut self, frame: &Frame) -> Vec<HandSkeleton> {
        let want = frame.seq();
        while let Some(rec) = self.next_record() {
            match rec.frame.cmp(&want) {
                Ordering::Less => debug!("dropping stale landmarks for frame {}", rec.frame),
                Ordering::Equal => return rec.hands,
                Ordering::Greater => {
                    self.pending = Some(rec);
                    break;
                }
            }
        }
        Vec::new()
    }
}
