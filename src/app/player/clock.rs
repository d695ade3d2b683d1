use std::time::{Duration, Instant};

use super::navigation::NavEvent;
use super::{PendingAdvance, PlaybackSession};

/// Every item plays for the same fixed window, polls and questions included.
pub(crate) const ITEM_DURATION_MS: u64 = 15_000;

/// Short hold before acting on a completed item, so a vote finishing on the
/// same tick does not race the advance.
const ADVANCE_DEBOUNCE_MS: u64 = 300;

/// Upper bound on the wall-clock delta one tick may apply. If the host
/// stops ticking (overlay, suspended terminal), the gap is not replayed
/// into elapsed time on resume.
const MAX_TICK_DELTA_MS: u64 = 250;

/// Advances the progress clock to `now`.
///
/// Returns the navigation event the clock wants dispatched, if any. Ticks
/// taken while paused or while a vote is in flight accrue nothing but keep
/// the clock primed, so playback resumes from the preserved elapsed time.
pub(crate) fn tick(session: &mut PlaybackSession, now: Instant) -> Option<NavEvent> {
    if session.closed {
        return None;
    }

    let delta_ms = match session.last_tick {
        Some(previous) => {
            let full = now.saturating_duration_since(previous).as_millis();
            u64::try_from(full).unwrap_or(u64::MAX).min(MAX_TICK_DELTA_MS)
        }
        None => 0,
    };
    session.last_tick = Some(now);

    if session.paused() {
        return None;
    }

    if let Some(pending) = &session.pending_advance {
        if now < pending.due {
            return None;
        }
        let pending_key = pending.key.clone();
        session.pending_advance = None;
        // The stamp normally matches because navigation cancels pending
        // advances; the check still guards a completion racing a reconcile.
        if session.current_key().is_some_and(|key| key == pending_key) {
            return Some(NavEvent::NextItem);
        }
        return None;
    }

    session.elapsed_ms = (session.elapsed_ms + delta_ms).min(ITEM_DURATION_MS);
    if session.elapsed_ms >= ITEM_DURATION_MS
        && let Some(key) = session.current_key()
    {
        session.pending_advance = Some(PendingAdvance {
            key,
            due: now + Duration::from_millis(ADVANCE_DEBOUNCE_MS),
        });
    }
    None
}

impl PlaybackSession {
    /// Progress through the current item as a percentage, clamped to
    /// [0, 100].
    pub(crate) fn progress(&self) -> f64 {
        (self.elapsed_ms as f64 / ITEM_DURATION_MS as f64 * 100.0).clamp(0.0, 100.0)
    }
}
