use anyhow::{Context, Result, anyhow};
use directories::UserDirs;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::backlight::{self, Level, SysfsBacklight};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Thresholds {
    pub drop_ratio: f64,
    pub initial_brightness: f64,
    pub cooldown_secs: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            drop_ratio: 0.7,
            initial_brightness: 128.0,
            cooldown_secs: 3.0,
        }
    }
}

impl Thresholds {
    /// Saturates for values `validate` would have rejected.
    pub fn cooldown(&self) -> Duration {
        Duration::try_from_secs_f64(self.cooldown_secs).unwrap_or(Duration::MAX)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Levels {
    pub maximum: Level,
    pub default: Level,
}

impl Default for Levels {
    fn default() -> Self {
        Self {
            maximum: Level::MAXIMUM,
            default: Level::DEFAULT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CameraConfig {
    /// PPM stream path, `-` for stdin.
    pub source: String,
    pub mirror: bool,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            source: "-".into(),
            mirror: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LandmarkConfig {
    pub source: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BacklightConfig {
    pub device: Option<String>,
    pub sysfs_root: PathBuf,
}

impl Default for BacklightConfig {
    fn default() -> Self {
        Self {
            device: None,
            sysfs_root: PathBuf::from(backlight::SYSFS_ROOT),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PreviewConfig {
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub thresholds: Thresholds,
    pub levels: Levels,
    pub camera: CameraConfig,
    pub landmarks: LandmarkConfig,
    pub backlight: BacklightConfig,
    pub preview: PreviewConfig,
}

/// Settings plus the file they came from, if any.
#[derive(Debug, Clone)]
pub struct LoadedSettings {
    pub settings: Settings,
    pub path: Option<PathBuf>,
}

pub fn config_dir() -> Option<PathBuf> {
    let home = UserDirs::new()?.home_dir().to_path_buf();
    Some(home.join(".config").join("brightctl"))
}

pub fn default_config_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("config.toml"))
}

pub fn reference_config_text() -> &'static str {
    include_str!("../config/default.toml")
}

impl Settings {
    /// An explicit path must exist; the per-user file is optional.
    pub fn load(explicit: Option<&Path>) -> Result<LoadedSettings> {
        if let Some(p) = explicit {
            let settings = Self::from_file(p)?;
            return Ok(LoadedSettings {
                settings,
                path: Some(p.to_path_buf()),
            });
        }
        match default_config_path() {
            Some(p) if p.exists() => {
                let settings = Self::from_file(&p)?;
                Ok(LoadedSettings {
                    settings,
                    path: Some(p),
                })
            }
            _ => Ok(LoadedSettings {
                settings: Settings::default(),
                path: None,
            }),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let txt = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::parse(&txt).with_context(|| format!("failed to parse {}", path.display()))
    }

    pub fn parse(txt: &str) -> Result<Self> {
        let settings: Settings = toml::from_str(txt)?;
        validate(&settings)?;
        Ok(settings)
    }

    pub fn doctor_report(&self, config_path: Option<&Path>) -> serde_json::Value {
        let root = &self.backlight.sysfs_root;
        let selected = SysfsBacklight::open(root, self.backlight.device.as_deref());
        let (selected_name, current_level, backlight_error) = match &selected {
            Ok(dev) => (
                Some(dev.name().to_string()),
                dev.read_level().ok().map(u8::from),
                None,
            ),
            Err(e) => (None, None, Some(e.to_string())),
        };
        let writable = selected_name
            .as_ref()
            .is_some_and(|n| is_writable(&root.join(n).join("brightness")));

        serde_json::json!({
            "config_file": config_path,
            "settings": self,
            "backlight": {
                "devices": backlight::list_devices(root),
                "selected": selected_name,
                "current_level": current_level,
                "writable": writable,
                "error": backlight_error,
            },
            "camera_nodes": list_video_nodes(),
            "video_group_member": check_in_group("video"),
            "hints": {
                "backlight_permissions": "add a udev rule granting the video group write access to /sys/class/backlight/*/brightness",
                "add_user_to_video_group": "sudo usermod -aG video $USER && newgrp video",
                "camera_pipe": "ffmpeg -f v4l2 -i /dev/video0 -f image2pipe -vcodec ppm - | brightctl run"
            }
        })
    }
}

fn validate(s: &Settings) -> Result<()> {
    let t = &s.thresholds;
    if !(t.drop_ratio > 0.0 && t.drop_ratio <= 1.0) {
        return Err(anyhow!("thresholds.drop_ratio must be in (0, 1]"));
    }
    if !(0.0..=255.0).contains(&t.initial_brightness) {
        return Err(anyhow!("thresholds.initial_brightness must be in [0, 255]"));
    }
    if Duration::try_from_secs_f64(t.cooldown_secs).is_err() {
        return Err(anyhow!(
            "thresholds.cooldown_secs must be a non-negative number of seconds that fits a duration"
        ));
    }
    if s.camera.source.trim().is_empty() {
        return Err(anyhow!("camera.source must not be empty"));
    }
    if let Some(d) = &s.backlight.device {
        if d.trim().is_empty() || d.contains('/') {
            return Err(anyhow!("backlight.device '{d}' is not a device name"));
        }
    }
    Ok(())
}

fn is_writable(path: &Path) -> bool {
    fs::OpenOptions::new().write(true).open(path).is_ok()
}

fn list_video_nodes() -> Vec<String> {
    let mut out = vec![];
    if let Ok(rd) = fs::read_dir("/dev") {
        for e in rd.flatten() {
            let p = e.path();
            if p.file_name()
                .and_then(|s| s.to_str())
                .is_some_and(|s| s.starts_with("video"))
            {
                out.push(p.display().to_string());
            }
        }
    }
    out.sort();
    out
}

fn check_in_group(group: &str) -> bool {
    let Ok(s) = fs::read_to_string("/etc/group") else {
        return false;
    };
    group_has_member(&s, group, &whoami::username())
}

fn group_has_member(etc_group: &str, group: &str, user: &str) -> bool {
    etc_group
        .lines()
        .filter(|line| line.split(':').next() == Some(group))
        .any(|line| {
            line.split(':')
                .nth(3)
                .unwrap_or("")
                .split(',')
                .any(|u| u.trim() == user)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_reference_file_matches_defaults() {
        let parsed = Settings::parse(reference_config_text()).unwrap();
        assert_eq!(parsed, Settings::default());
    }

    #[test]
    fn test_defaults_are_the_documented_constants() {
        let s = Settings::default();
        assert_eq!(s.thresholds.drop_ratio, 0.7);
        assert_eq!(s.thresholds.initial_brightness, 128.0);
        assert_eq!(s.thresholds.cooldown(), Duration::from_secs(3));
        assert_eq!(s.levels.maximum.percent(), 100);
        assert_eq!(s.levels.default.percent(), 50);
        assert!(s.landmarks.source.is_none());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let s = Settings::parse(
            r#"
            [thresholds]
            cooldown_secs = 1.5

            [landmarks]
            source = "/tmp/hands"
            "#,
        )
        .unwrap();
        assert_eq!(s.thresholds.cooldown_secs, 1.5);
        assert_eq!(s.thresholds.drop_ratio, 0.7);
        assert_eq!(s.landmarks.source, Some(PathBuf::from("/tmp/hands")));
        assert_eq!(s.camera, CameraConfig::default());
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(Settings::parse("[thresholds]\ndrop_ratio = 0.0").is_err());
        assert!(Settings::parse("[thresholds]\ndrop_ratio = 1.5").is_err());
        assert!(Settings::parse("[thresholds]\ninitial_brightness = 300.0").is_err());
        assert!(Settings::parse("[thresholds]\ncooldown_secs = -1.0").is_err());
        assert!(Settings::parse("[thresholds]\ncooldown_secs = nan").is_err());
        assert!(Settings::parse("[levels]\nmaximum = 120").is_err());
        assert!(Settings::parse("[backlight]\ndevice = \"../etc\"").is_err());
        assert!(Settings::parse("[camera]\nsource = \"\"").is_err());
        assert!(Settings::parse("[cammera]\nsource = \"-\"").is_err());
    }

    #[test]
    fn test_load_explicit_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("brightctl.toml");
        fs::write(&path, "[levels]\ndefault = 40\n").unwrap();

        let loaded = Settings::load(Some(&path)).unwrap();
        assert_eq!(loaded.path.as_deref(), Some(path.as_path()));
        assert_eq!(loaded.settings.levels.default.percent(), 40);

        let missing = dir.path().join("nope.toml");
        assert!(Settings::load(Some(&missing)).is_err());
    }

    #[test]
    fn test_group_membership() {
        let group = "root:x:0:\nvideo:x:44:alice,bob\naudio:x:29:carol\n";
        assert!(group_has_member(group, "video", "bob"));
        assert!(!group_has_member(group, "video", "carol"));
        assert!(!group_has_member(group, "videos", "alice"));
    }

    #[test]
    fn test_doctor_report_with_fake_sysfs() {
        let root = tempdir().unwrap();
        let dev = root.path().join("panel");
        fs::create_dir_all(&dev).unwrap();
        fs::write(dev.join("max_brightness"), "200").unwrap();
        fs::write(dev.join("brightness"), "100").unwrap();

        let mut s = Settings::default();
        s.backlight.sysfs_root = root.path().to_path_buf();
        let report = s.doctor_report(None);
        assert_eq!(report["backlight"]["selected"], "panel");
        assert_eq!(report["backlight"]["current_level"], 50);
        assert_eq!(report["backlight"]["devices"][0], "panel");
        assert!(report["config_file"].is_null());
        assert_eq!(report["settings"]["levels"]["maximum"], 100);
    }

    #[test]
    fn test_huge_cooldown_is_rejected_not_fatal() {
        let err = Settings::parse("[thresholds]\ncooldown_secs = 1e30").unwrap_err();
        assert!(err.to_string().contains("cooldown_secs"));
        assert!(Settings::parse("[thresholds]\ncooldown_secs = inf").is_err());

        let t = Thresholds {
            cooldown_secs: 1e30,
            ..Thresholds::default()
        };
        assert_eq!(t.cooldown(), Duration::MAX);
    }
}
