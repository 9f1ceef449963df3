use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static SYNTHETIC_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Build an invocation id for a slot the service left unnamed.
///
/// Slot position and wall-clock millis keep the id readable; the process-wide
/// sequence keeps it unique when two slots land in the same millisecond.
#[must_use]
pub fn synthesize_invocation_id(slot: usize) -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    let seq = SYNTHETIC_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    format!("call_{slot}_{millis}_{seq}")
}
