use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::{
    fmt, fs, io,
    path::{Path, PathBuf},
};
use thiserror::Error;

use crate::config::BacklightConfig;

/// Display brightness in percent, 0..=100.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Level(u8);

impl Level {
    pub const MAXIMUM: Level = Level(100);
    pub const DEFAULT: Level = Level(50);

    pub fn new(percent: u8) -> Option<Self> {
        (percent <= 100).then_some(Self(percent))
    }

    pub fn percent(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for Level {
    type Error = String;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        Self::new(v).ok_or_else(|| format!("brightness level {v} is out of range 0..=100"))
    }
}

impl From<Level> for u8 {
    fn from(l: Level) -> u8 {
        l.0
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0)
    }
}

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("no backlight device found under {0}")]
    NoDevice(PathBuf),
    #[error("backlight device not found: {0}")]
    UnknownDevice(PathBuf),
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid max_brightness in {path}: {value:?}")]
    BadMaxBrightness { path: PathBuf, value: String },
}

/// Applies a brightness level to the display. A failed call leaves the
/// caller's view of the display untouched.
pub trait BrightnessController {
    fn set_brightness(&mut self, level: Level) -> Result<(), ControllerError>;
}

impl<T: BrightnessController + ?Sized> BrightnessController for Box<T> {
    fn set_brightness(&mut self, level: Level) -> Result<(), ControllerError> {
        (**self).set_brightness(level)
    }
}

pub const SYSFS_ROOT: &str = "/sys/class/backlight";

/// `/sys/class/backlight/<device>` on Linux.
#[derive(Debug)]
pub struct SysfsBacklight {
    name: String,
    dir: PathBuf,
    max: u64,
}

impl SysfsBacklight {
    /// Opens `device`, or the first device in name order.
    pub fn open(root: &Path, device: Option<&str>) -> Result<Self, ControllerError> {
        let name = match device {
            Some(d) => d.to_string(),
            None => list_devices(root)
                .into_iter()
                .next()
                .ok_or_else(|| ControllerError::NoDevice(root.to_path_buf()))?,
        };
        let dir = root.join(&name);
        if !dir.is_dir() {
            return Err(ControllerError::UnknownDevice(dir));
        }
        let max_path = dir.join("max_brightness");
        let max = read_u64(&max_path)?;
        if max == 0 {
            return Err(ControllerError::BadMaxBrightness {
                path: max_path,
                value: "0".into(),
            });
        }
        Ok(Self { name, dir, max })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn max_raw(&self) -> u64 {
        self.max
    }

    /// Nearest raw value for `level`.
    pub fn raw_for(&self, level: Level) -> u64 {
        (level.percent() as u64 * self.max + 50) / 100
    }

    /// Current hardware level, rounded to percent.
    pub fn read_level(&self) -> Result<Level, ControllerError> {
        let path = self.dir.join("brightness");
        let raw = read_u64(&path)?.min(self.max);
        let pct = (raw * 100 + self.max / 2) / self.max;
        Ok(Level(pct as u8))
    }
}

impl BrightnessController for SysfsBacklight {
    fn set_brightness(&mut self, level: Level) -> Result<(), ControllerError> {
        let path = self.dir.join("brightness");
        let raw = self.raw_for(level);
        fs::write(&path, raw.to_string()).map_err(|source| ControllerError::Io {
            path: path.clone(),
            source,
        })?;
        debug!("backlight {}: {} (raw {raw}/{})", self.name, level, self.max);
        Ok(())
    }
}

/// Accepts every level. Stands in when the machine has no backlight.
#[derive(Debug, Default)]
pub struct NoopBacklight;

impl BrightnessController for NoopBacklight {
    fn set_brightness(&mut self, level: Level) -> Result<(), ControllerError> {
        debug!("no-op backlight: {level}");
        Ok(())
    }
}

pub fn list_devices(root: &Path) -> Vec<String> {
    let mut v = Vec::new();
    if let Ok(rd) = fs::read_dir(root) {
        for e in rd.flatten() {
            if let Some(name) = e.file_name().to_str() {
                v.push(name.to_string());
            }
        }
    }
    v.sort();
    v
}

/// Controller for the configured device. Falls back to a no-op sink when no
/// device exists and none was asked for by name.
pub fn open(cfg: &BacklightConfig) -> Result<Box<dyn BrightnessController>, ControllerError> {
    match SysfsBacklight::open(&cfg.sysfs_root, cfg.device.as_deref()) {
        Ok(dev) => {
            info!("backlight: using {} (max {})", dev.name(), dev.max_raw());
            Ok(Box::new(dev))
        }
        Err(ControllerError::NoDevice(root)) => {
            warn!(
                "no backlight under {}; running in NO-OP mode",
                root.display()
            );
            Ok(Box::new(NoopBacklight))
        }
        Err(e) => Err(e),
    }
}

fn read_u64(path: &Path) -> Result<u64, ControllerError> {
    let txt = fs::read_to_string(path).map_err(|source| ControllerError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    txt.trim()
        .parse()
        .map_err(|_| ControllerError::BadMaxBrightness {
            path: path.to_path_buf(),
            value: txt.trim().to_string(),
        })
}
