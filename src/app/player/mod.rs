mod clock;
mod gesture;
mod navigation;
mod vote;

pub(crate) use clock::{ITEM_DURATION_MS, tick};
pub(crate) use gesture::{GestureIntent, SwipeTracker, TouchPoint, decode_gesture};
pub(crate) use navigation::{NavEvent, NavOutcome, apply};
pub(crate) use vote::{
    BeginOutcome, FinishOutcome, InteractionResult, Reconcile, begin_answer, begin_reaction,
    begin_vote, finish_answer, finish_reaction, finish_vote, reconcile_groups,
};

use std::time::Instant;

use super::story::{AuthorGroup, StoryItem};

/// Stable identity of one story item; scheduled effects are stamped with
/// this so they can be discarded once the viewer has moved on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ItemKey {
    pub(crate) author_id: String,
    pub(crate) item_id: String,
}

#[derive(Debug)]
struct PendingAdvance {
    key: ItemKey,
    due: Instant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum PendingKind {
    Vote { option_key: String },
    Answer,
}

#[derive(Debug)]
struct PendingInteraction {
    key: ItemKey,
    kind: PendingKind,
}

#[derive(Debug)]
struct PendingReaction {
    key: ItemKey,
    previous: Option<String>,
    counted: bool,
}

/// Live viewing state for one walkthrough of the feed.
///
/// Fields are private on purpose: elapsed time, pause flags, and indices are
/// only ever mutated by the submodules in this directory, through the
/// contracts they expose.
pub(crate) struct PlaybackSession {
    groups: Vec<AuthorGroup>,
    viewer_id: String,
    started_on_own: bool,
    group_index: usize,
    item_index: usize,
    elapsed_ms: u64,
    manual_paused: bool,
    voting_in_progress: bool,
    overlay_open: bool,
    muted: bool,
    closed: bool,
    last_tick: Option<Instant>,
    pending_advance: Option<PendingAdvance>,
    pending_interaction: Option<PendingInteraction>,
    pending_reaction: Option<PendingReaction>,
}

impl PlaybackSession {
    pub(crate) fn open(
        groups: Vec<AuthorGroup>,
        viewer_id: &str,
        start_group: usize,
    ) -> Option<Self> {
        let start = groups.get(start_group)?;
        if start.items.is_empty() {
            return None;
        }
        let started_on_own = start.author_id == viewer_id;
        Some(Self {
            groups,
            viewer_id: viewer_id.to_string(),
            started_on_own,
            group_index: start_group,
            item_index: 0,
            elapsed_ms: 0,
            manual_paused: false,
            voting_in_progress: false,
            overlay_open: false,
            muted: true,
            closed: false,
            last_tick: None,
            pending_advance: None,
            pending_interaction: None,
            pending_reaction: None,
        })
    }

    // --- position tracker ---

    pub(crate) fn current(&self) -> Option<(&AuthorGroup, &StoryItem)> {
        if self.closed {
            return None;
        }
        let group = self.groups.get(self.group_index)?;
        let item = group.items.get(self.item_index)?;
        Some((group, item))
    }

    pub(crate) fn current_key(&self) -> Option<ItemKey> {
        self.current().map(|(group, item)| ItemKey {
            author_id: group.author_id.clone(),
            item_id: item.id.clone(),
        })
    }

    pub(crate) fn groups(&self) -> &[AuthorGroup] {
        &self.groups
    }

    pub(crate) fn group_index(&self) -> usize {
        self.group_index
    }

    pub(crate) fn item_index(&self) -> usize {
        self.item_index
    }

    /// Moves to an explicit position. Out-of-range requests leave the
    /// session untouched and report `false`; the caller decides whether that
    /// deserves a status-line warning.
    pub(crate) fn set_position(&mut self, group_index: usize, item_index: usize) -> bool {
        if self.closed {
            return false;
        }
        let Some(group) = self.groups.get(group_index) else {
            return false;
        };
        if item_index >= group.items.len() {
            return false;
        }

        let identity_changed = self.current_key().is_none_or(|key| {
            key.author_id != group.author_id || key.item_id != group.items[item_index].id
        });
        self.group_index = group_index;
        self.item_index = item_index;
        if identity_changed {
            self.reset_for_new_item();
        }
        true
    }

    pub(crate) fn resolve_by_identity(
        &self,
        author_id: &str,
        item_id: &str,
    ) -> Option<(usize, usize)> {
        let group_index = self
            .groups
            .iter()
            .position(|group| group.author_id == author_id)?;
        let item_index = self.groups[group_index]
            .items
            .iter()
            .position(|item| item.id == item_id)?;
        Some((group_index, item_index))
    }

    /// New item on screen: elapsed starts over, manual pause lifts, videos
    /// come back muted, and anything scheduled against the old item dies.
    fn reset_for_new_item(&mut self) {
        self.elapsed_ms = 0;
        self.manual_paused = false;
        self.muted = true;
        self.pending_advance = None;
    }

    // --- interaction gate ---

    /// Observable pause state. Voting and overlays imply paused, so the
    /// `voting_in_progress => paused` invariant cannot be broken from
    /// outside.
    pub(crate) fn paused(&self) -> bool {
        self.manual_paused || self.voting_in_progress || self.overlay_open
    }

    pub(crate) fn voting_in_progress(&self) -> bool {
        self.voting_in_progress
    }

    pub(crate) fn muted(&self) -> bool {
        self.muted
    }

    pub(crate) fn closed(&self) -> bool {
        self.closed
    }

    pub(crate) fn elapsed_ms(&self) -> u64 {
        self.elapsed_ms
    }

    pub(crate) fn toggle_pause(&mut self) {
        self.manual_paused = !self.manual_paused;
    }

    pub(crate) fn toggle_mute(&mut self) {
        self.muted = !self.muted;
    }

    pub(crate) fn set_overlay_open(&mut self, open: bool) {
        self.overlay_open = open;
    }

    pub(crate) fn overlay_open(&self) -> bool {
        self.overlay_open
    }

    fn begin_blocking_interaction(&mut self) {
        self.voting_in_progress = true;
        self.pending_advance = None;
    }

    /// Releases the gate. Manual pause is left exactly as the viewer set it,
    /// so a manually paused session stays paused and anything else resumes
    /// from the preserved elapsed time.
    fn end_blocking_interaction(&mut self) {
        self.voting_in_progress = false;
    }

    pub(crate) fn close(&mut self) {
        self.closed = true;
        self.pending_advance = None;
        self.last_tick = None;
    }

    fn item_by_id_mut(&mut self, item_id: &str) -> Option<&mut StoryItem> {
        self.groups
            .iter_mut()
            .flat_map(|group| group.items.iter_mut())
            .find(|item| item.id == item_id)
    }
}
