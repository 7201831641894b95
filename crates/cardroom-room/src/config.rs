//! Room configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// RoomConfig
// ---------------------------------------------------------------------------

/// Configuration for a room instance.
///
/// Every room created by a [`RoomManager`](crate::RoomManager) starts from
/// the manager's copy of this struct. `max_clients` is only the starting
/// capacity: participants renegotiate it through `setInitData`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoomConfig {
    /// Initial capacity, and the value a capacity declaration is compared
    /// against to decide whether it is the first one.
    pub max_clients: usize,

    /// State patches per second. 0 disables the sync loop.
    pub patch_rate_hz: u32,

    /// How long a dropped participant's record is kept for reconnection.
    pub reconnect_grace: Duration,

    /// How the predecessor link wraps around at turn position 0.
    pub prev_link_rule: PrevLinkRule,

    /// Stop the room once its last participant record is gone.
    pub auto_dispose: bool,

    /// Opaque listing data, reported as-is in [`RoomInfo`](crate::RoomInfo).
    pub metadata: Value,
}

impl RoomConfig {
    pub const DEFAULT_MAX_CLIENTS: usize = 20;
    pub const DEFAULT_PATCH_RATE_HZ: u32 = 20;
    pub const DEFAULT_RECONNECT_GRACE: Duration = Duration::from_secs(10);
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            max_clients: Self::DEFAULT_MAX_CLIENTS,
            patch_rate_hz: Self::DEFAULT_PATCH_RATE_HZ,
            reconnect_grace: Self::DEFAULT_RECONNECT_GRACE,
            prev_link_rule: PrevLinkRule::default(),
            auto_dispose: true,
            metadata: Value::Null,
        }
    }
}

// ---------------------------------------------------------------------------
// PrevLinkRule
// ---------------------------------------------------------------------------

/// Which participant becomes the predecessor of turn position 0.
///
/// ```text
///  Ring:    0 ← 1 ← 2 ← ... ← n-1 ← 0     (prev forms a full cycle)
///  Legacy:  0 ← 1 ← 2 ← ... ← n-1          (position 0 never gets a prev)
/// ```
///
/// `Legacy` reproduces the behavior older clients were built against: the
/// predecessor test only runs for pairs where the successor test failed,
/// and the wraparound looks for position `n` instead of `n-1`, so it never
/// matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrevLinkRule {
    #[default]
    Ring,
    Legacy,
}
