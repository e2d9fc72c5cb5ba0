//! Visual feedback and the user's stop signal.

use anyhow::{Context, Result};
use log::{debug, info, warn};
use signal_hook::consts::{SIGINT, SIGTERM};
use std::{
    fs::OpenOptions,
    io::{BufWriter, Write},
    path::Path,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use crate::frame::Frame;
use crate::gestures::HandSkeleton;
use crate::luminance::BrightnessSample;
use crate::session::DisplayStatus;

/// Bones drawn between landmarks, pose-estimator numbering.
pub const HAND_CONNECTIONS: [(usize, usize); 21] = [
    (0, 1),
    (1, 2),
    (2, 3),
    (3, 4),
    (0, 5),
    (5, 6),
    (6, 7),
    (7, 8),
    (5, 9),
    (9, 10),
    (10, 11),
    (11, 12),
    (9, 13),
    (13, 14),
    (14, 15),
    (15, 16),
    (13, 17),
    (17, 18),
    (18, 19),
    (19, 20),
    (0, 17),
];

/// Ambient change, in whole 0-255 units, that earns an info line.
const AMBIENT_LOG_STEP: u32 = 10;

const BONE: [u8; 3] = [255, 255, 255];
const JOINT: [u8; 3] = [0, 255, 0];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatusReport {
    pub status: DisplayStatus,
    pub ambient: BrightnessSample,
}

pub trait Overlay {
    /// Mark one hand on the frame.
    fn draw(&mut self, frame: &mut Frame, hand: &HandSkeleton);
    /// Present the annotated frame and current status.
    fn show(&mut self, frame: &Frame, report: &StatusReport);
    fn quit_requested(&self) -> bool;
}

impl<T: Overlay + ?Sized> Overlay for Box<T> {
    fn draw(&mut self, frame: &mut Frame, hand: &HandSkeleton) {
        (**self).draw(frame, hand)
    }
    fn show(&mut self, frame: &Frame, report: &StatusReport) {
        (**self).show(frame, report)
    }
    fn quit_requested(&self) -> bool {
        (**self).quit_requested()
    }
}

/// Raised by SIGINT / SIGTERM.
pub fn register_stop_signals() -> Result<Arc<AtomicBool>> {
    let stop = Arc::new(AtomicBool::new(false));
    for sig in [SIGINT, SIGTERM] {
        signal_hook::flag::register(sig, Arc::clone(&stop))
            .with_context(|| format!("failed to install handler for signal {sig}"))?;
    }
    Ok(stop)
}

/// Status and ambient level go to the log; frames optionally to a PPM
/// preview sink. The preview carries only the hand skeletons, no text.
pub struct ConsoleOverlay {
    stop: Arc<AtomicBool>,
    preview: Option<Box<dyn Write>>,
    last_logged: Option<(DisplayStatus, u32)>,
}

impl ConsoleOverlay {
    pub fn new(stop: Arc<AtomicBool>) -> Self {
        Self {
            stop,
            preview: None,
            last_logged: None,
        }
    }

    /// Opening a FIFO blocks until a viewer attaches.
    pub fn with_preview_path(self, path: &Path) -> Result<Self> {
        let f = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .with_context(|| format!("failed to open preview sink {}", path.display()))?;
        info!("preview: writing annotated frames to {}", path.display());
        Ok(self.with_preview(Box::new(BufWriter::new(f))))
    }

    pub fn with_preview(mut self, sink: Box<dyn Write>) -> Self {
        self.preview = Some(sink);
        self
    }
}

impl Overlay for ConsoleOverlay {
    fn draw(&mut self, frame: &mut Frame, hand: &HandSkeleton) {
        draw_hand(frame, hand);
    }

    fn show(&mut self, frame: &Frame, report: &StatusReport) {
        let ambient = report.ambient.value() as u32;
        let changed = match self.last_logged {
            None => true,
            Some((status, logged)) => {
                status != report.status || ambient.abs_diff(logged) >= AMBIENT_LOG_STEP
            }
        };
        if changed {
            info!(
                "status: {} | ambient brightness (0-255): {}",
                report.status.label(),
                report.ambient
            );
            self.last_logged = Some((report.status, ambient));
        } else {
            debug!("ambient brightness: {}", report.ambient);
        }

        if let Some(sink) = self.preview.as_mut() {
            if let Err(e) = frame.write_ppm(sink) {
                warn!("preview sink failed, disabling preview: {e}");
                self.preview = None;
            }
        }
    }

    fn quit_requested(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }
}

/// Normalized point to pixel, pinned to one pixel outside the frame.
fn to_pixel(frame: &Frame, x: f32, y: f32) -> (i64, i64) {
    let (w, h) = (frame.width() as f32, frame.height() as f32);
    let px = (x * w).round().clamp(-1.0, w) as i64;
    let py = (y * h).round().clamp(-1.0, h) as i64;
    (px, py)
}

fn plot(frame: &mut Frame, x: i64, y: i64, color: [u8; 3]) {
    if let (Ok(x), Ok(y)) = (u32::try_from(x), u32::try_from(y)) {
        frame.put_pixel(x, y, color);
    }
}

pub fn draw_hand(frame: &mut Frame, hand: &HandSkeleton) {
    for &(a, b) in &HAND_CONNECTIONS {
        let (pa, pb) = (hand.landmark(a), hand.landmark(b));
        let from = to_pixel(frame, pa.x, pa.y);
        let to = to_pixel(frame, pb.x, pb.y);
        draw_line(frame, from, to, BONE);
    }
    for p in hand.landmarks() {
        let (x, y) = to_pixel(frame, p.x, p.y);
        for dy in -1..=1 {
            for dx in -1..=1 {
                plot(frame, x + dx, y + dy, JOINT);
            }
        }
    }
}

fn draw_line(frame: &mut Frame, (x0, y0): (i64, i64), (x1, y1): (i64, i64), color: [u8; 3]) {
    let steps = (x1 - x0).abs().max((y1 - y0).abs());
    if steps == 0 {
        plot(frame, x0, y0, color);
        return;
    }
    for i in 0..=steps {
        let x = x0 + (x1 - x0) * i / steps;
        let y = y0 + (y1 - y0) * i / steps;
        plot(frame, x, y, color);
    }
}
