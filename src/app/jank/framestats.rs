use std::collections::BTreeMap;
use std::sync::Arc;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::app::adb::device::DeviceDriver;
use crate::app::error::AppError;

/// Frame counters for one window, as reported by `dumpsys gfxinfo`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FrameStats {
    pub total_frames: u64,
    pub janky_frames: u64,
    pub jank_pct: f64,
    /// Frame-time percentiles in milliseconds, keyed by percentile rank.
    pub percentile_ms: BTreeMap<u8, u64>,
}

impl FrameStats {
    pub fn percentile(&self, rank: u8) -> Option<u64> {
        self.percentile_ms.get(&rank).copied()
    }
}

pub fn parse_gfxinfo(dump: &str) -> Result<FrameStats, AppError> {
    let total_re = Regex::new(r"Total frames rendered:\s*(\d+)").expect("static regex");
    let janky_re =
        Regex::new(r"Janky frames:\s*(\d+)\s*\(([0-9]+(?:\.[0-9]+)?)%\)").expect("static regex");
    let percentile_re =
        Regex::new(r"(\d+)(?:th|st|nd|rd) percentile:\s*(\d+)ms").expect("static regex");

    let total_frames = total_re
        .captures(dump)
        .and_then(|caps| caps[1].parse::<u64>().ok())
        .ok_or_else(|| {
            AppError::device("Missing 'Total frames rendered' in gfxinfo output", "")
        })?;

    let (janky_frames, jank_pct) = match janky_re.captures(dump) {
        Some(caps) => {
            let count = caps[1].parse::<u64>().unwrap_or(0);
            let pct = caps[2].parse::<f64>().unwrap_or(0.0);
            (count, pct)
        }
        None => (0, 0.0),
    };

    let mut percentile_ms = BTreeMap::new();
    for caps in percentile_re.captures_iter(dump) {
        if let (Ok(rank), Ok(value)) = (caps[1].parse::<u8>(), caps[2].parse::<u64>()) {
            percentile_ms.insert(rank, value);
        }
    }

    Ok(FrameStats {
        total_frames,
        janky_frames,
        jank_pct,
        percentile_ms,
    })
}

/// Frame-stat capture around one harness iteration: `reset` before the body,
/// `collect` after it.
pub trait FrameStatsMonitor: Send + Sync {
    fn reset(&self, trace_id: &str) -> Result<(), AppError>;
    fn collect(&self, trace_id: &str) -> Result<FrameStats, AppError>;
}

/// Monitor backed by `dumpsys gfxinfo <package>` on the device.
pub struct GfxinfoMonitor {
    device: Arc<dyn DeviceDriver>,
    package: String,
}

impl GfxinfoMonitor {
    pub fn new(device: Arc<dyn DeviceDriver>, package: impl Into<String>) -> Self {
        Self {
            device,
            package: package.into(),
        }
    }
}

impl FrameStatsMonitor for GfxinfoMonitor {
    fn reset(&self, trace_id: &str) -> Result<(), AppError> {
        self.device
            .dumpsys(&["gfxinfo", &self.package, "reset"], trace_id)?;
        Ok(())
    }

    fn collect(&self, trace_id: &str) -> Result<FrameStats, AppError> {
        let dump = self.device.dumpsys(&["gfxinfo", &self.package], trace_id)?;
        parse_gfxinfo(&dump)
    }
}
