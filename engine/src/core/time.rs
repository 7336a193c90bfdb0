//! Epoch bookkeeping
//!
//! The engine does not keep its own clock. An external epochs module fires
//! one `EpochInfo` per boundary for each named cadence, and the engine keeps
//! an `EpochTracker` per identifier so every pipeline can gate itself on its
//! own cadence and derive ICA timeouts from the next boundary.

use serde::{Deserialize, Serialize};

pub const NANOS_PER_SECOND: u64 = 1_000_000_000;

/// The cadences the engine reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EpochId {
    /// Drives the unbonding pipeline
    Day,
    /// Drives deposits, delegation, redemption rate and trade routes
    Main,
    /// Drives reward allocation
    Mint,
}

impl EpochId {
    pub fn as_str(&self) -> &'static str {
        match self {
            EpochId::Day => "day",
            EpochId::Main => "main_epoch",
            EpochId::Mint => "mint",
        }
    }

    /// Parse an identifier string; unknown cadences yield `None`
    ///
    /// # Example
    /// ```
    /// use stakeibc_engine::EpochId;
    ///
    /// assert_eq!(EpochId::parse("day"), Some(EpochId::Day));
    /// assert_eq!(EpochId::parse("week"), None);
    /// ```
    pub fn parse(identifier: &str) -> Option<Self> {
        match identifier {
            "day" => Some(EpochId::Day),
            "main_epoch" => Some(EpochId::Main),
            "mint" => Some(EpochId::Mint),
            _ => None,
        }
    }
}

/// Boundary signal delivered by the external epochs module
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochInfo {
    pub identifier: String,
    pub current_epoch: u64,
    /// Unix time (nanos) at which this epoch started
    pub current_epoch_start_time: u64,
    pub duration: u64,
}

impl EpochInfo {
    pub fn new(epoch: EpochId, number: u64, start_time: u64, duration: u64) -> Self {
        Self {
            identifier: epoch.as_str().to_string(),
            current_epoch: number,
            current_epoch_start_time: start_time,
            duration,
        }
    }
}

/// Last observed boundary for one cadence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochTracker {
    pub epoch_identifier: String,
    pub epoch_number: u64,
    /// Epoch length in nanos
    pub duration: u64,
    /// Unix time (nanos) of the next boundary
    pub next_epoch_start_time: u64,
}

impl EpochTracker {
    pub fn from_info(info: &EpochInfo) -> Self {
        Self {
            epoch_identifier: info.identifier.clone(),
            epoch_number: info.current_epoch,
            duration: info.duration,
            next_epoch_start_time: info.current_epoch_start_time.saturating_add(info.duration),
        }
    }

    /// Timeout for packets sent this epoch: the next boundary minus a buffer
    /// of `duration / buffer_size`, so packets land before the next epoch
    /// reprocesses the same records.
    ///
    /// # Example
    /// ```
    /// use stakeibc_engine::EpochTracker;
    ///
    /// let tracker = EpochTracker {
    ///     epoch_identifier: "main_epoch".to_string(),
    ///     epoch_number: 3,
    ///     duration: 100,
    ///     next_epoch_start_time: 1_000,
    /// };
    /// assert_eq!(tracker.ica_timeout(5), Some(980));
    /// ```
    pub fn ica_timeout(&self, buffer_size: u64) -> Option<u64> {
        if buffer_size == 0 {
            return None;
        }
        let buffer = self.duration / buffer_size;
        self.next_epoch_start_time.checked_sub(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracker_from_info() {
        let info = EpochInfo::new(EpochId::Day, 7, 1_000, 500);
        let tracker = EpochTracker::from_info(&info);
        assert_eq!(tracker.epoch_identifier, "day");
        assert_eq!(tracker.epoch_number, 7);
        assert_eq!(tracker.next_epoch_start_time, 1_500);
    }

    #[test]
    fn test_zero_buffer_size_has_no_timeout() {
        let info = EpochInfo::new(EpochId::Main, 1, 0, 100);
        assert_eq!(EpochTracker::from_info(&info).ica_timeout(0), None);
    }

    #[test]
    fn test_identifier_round_trip() {
        for id in [EpochId::Day, EpochId::Main, EpochId::Mint] {
            assert_eq!(EpochId::parse(id.as_str()), Some(id));
        }
    }
}
