use std::collections::HashSet;

use super::super::story::{AuthorGroup, StoryContent};
use super::{PendingInteraction, PendingKind, PendingReaction, PlaybackSession};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BeginOutcome {
    Started,
    /// Viewer already voted on this poll / answered this question.
    AlreadyDone,
    /// Another blocking interaction is still in flight.
    Busy,
    /// Item exists but is not a poll / question.
    WrongKind,
    /// Poll has no option under that key.
    UnknownOption,
    /// Item is not the one on screen (or the session is closed).
    NotCurrent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Reconcile {
    /// Current item located in the refreshed data; indices re-pointed.
    Repositioned,
    /// Current group vanished from the refresh; stale snapshot kept.
    KeptStale,
    /// Nothing consistent to show; session terminated.
    Closed,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum FinishOutcome {
    /// Completion no longer matches what is pending; nothing was touched.
    Stale,
    /// Commit failed; the optimistic mutation was reverted.
    RolledBack { detail: String },
    Committed {
        reconcile: Option<Reconcile>,
        refresh_warning: Option<String>,
    },
}

/// What a worker thread reports back once the source calls finish.
/// `refreshed` is `None` when the refresh was skipped (commit failed).
#[derive(Debug)]
pub(crate) struct InteractionResult {
    pub(crate) item_id: String,
    pub(crate) commit_err: Option<String>,
    pub(crate) refreshed: Option<Result<Vec<AuthorGroup>, String>>,
}

/// Step 1-3 of a vote: validate, apply the optimistic tally, close the gate.
pub(crate) fn begin_vote(
    session: &mut PlaybackSession,
    item_id: &str,
    option_key: &str,
) -> BeginOutcome {
    if session.voting_in_progress || session.pending_interaction.is_some() {
        return BeginOutcome::Busy;
    }
    let Some((_, item)) = session.current() else {
        return BeginOutcome::NotCurrent;
    };
    if item.id != item_id {
        return BeginOutcome::NotCurrent;
    }
    match &item.content {
        StoryContent::Poll { viewer_vote, options, .. } => {
            if viewer_vote.is_some() {
                return BeginOutcome::AlreadyDone;
            }
            if !options.iter().any(|option| option.key == option_key) {
                return BeginOutcome::UnknownOption;
            }
        }
        _ => return BeginOutcome::WrongKind,
    }

    let Some(key) = session.current_key() else {
        return BeginOutcome::NotCurrent;
    };
    let Some(item) = session.item_by_id_mut(item_id) else {
        return BeginOutcome::NotCurrent;
    };
    if let StoryContent::Poll { viewer_vote, options, .. } = &mut item.content {
        *viewer_vote = Some(option_key.to_string());
        if let Some(option) = options.iter_mut().find(|option| option.key == option_key) {
            option.votes += 1;
        }
    }

    session.begin_blocking_interaction();
    session.pending_interaction = Some(PendingInteraction {
        key,
        kind: PendingKind::Vote {
            option_key: option_key.to_string(),
        },
    });
    BeginOutcome::Started
}

/// Step 1-3 of answering a question card.
pub(crate) fn begin_answer(session: &mut PlaybackSession, item_id: &str) -> BeginOutcome {
    if session.voting_in_progress || session.pending_interaction.is_some() {
        return BeginOutcome::Busy;
    }
    let Some((_, item)) = session.current() else {
        return BeginOutcome::NotCurrent;
    };
    if item.id != item_id {
        return BeginOutcome::NotCurrent;
    }
    match &item.content {
        StoryContent::Question { viewer_answered, .. } => {
            if *viewer_answered {
                return BeginOutcome::AlreadyDone;
            }
        }
        _ => return BeginOutcome::WrongKind,
    }

    let Some(key) = session.current_key() else {
        return BeginOutcome::NotCurrent;
    };
    let Some(item) = session.item_by_id_mut(item_id) else {
        return BeginOutcome::NotCurrent;
    };
    if let StoryContent::Question { viewer_answered, response_count, .. } = &mut item.content {
        *viewer_answered = true;
        *response_count += 1;
    }

    session.begin_blocking_interaction();
    session.pending_interaction = Some(PendingInteraction {
        key,
        kind: PendingKind::Answer,
    });
    BeginOutcome::Started
}

pub(crate) fn finish_vote(
    session: &mut PlaybackSession,
    result: InteractionResult,
) -> FinishOutcome {
    finish_blocking(session, result, true)
}

pub(crate) fn finish_answer(
    session: &mut PlaybackSession,
    result: InteractionResult,
) -> FinishOutcome {
    finish_blocking(session, result, false)
}

fn finish_blocking(
    session: &mut PlaybackSession,
    result: InteractionResult,
    expect_vote: bool,
) -> FinishOutcome {
    let matches = session.pending_interaction.as_ref().is_some_and(|pending| {
        pending.key.item_id == result.item_id
            && matches!(pending.kind, PendingKind::Vote { .. }) == expect_vote
    });
    if !matches {
        return FinishOutcome::Stale;
    }
    let Some(pending) = session.pending_interaction.take() else {
        return FinishOutcome::Stale;
    };

    if session.closed {
        session.end_blocking_interaction();
        return FinishOutcome::Stale;
    }

    if let Some(detail) = result.commit_err {
        roll_back(session, &pending);
        session.end_blocking_interaction();
        return FinishOutcome::RolledBack { detail };
    }

    let (reconcile, refresh_warning) = match result.refreshed {
        Some(Ok(groups)) => (Some(reconcile_groups(session, groups)), None),
        Some(Err(warning)) => (None, Some(warning)),
        None => (None, None),
    };
    session.end_blocking_interaction();
    FinishOutcome::Committed {
        reconcile,
        refresh_warning,
    }
}

fn roll_back(session: &mut PlaybackSession, pending: &PendingInteraction) {
    let Some(item) = session.item_by_id_mut(&pending.key.item_id) else {
        return;
    };
    match (&pending.kind, &mut item.content) {
        (
            PendingKind::Vote { option_key },
            StoryContent::Poll { viewer_vote, options, .. },
        ) => {
            *viewer_vote = None;
            if let Some(option) = options.iter_mut().find(|option| &option.key == option_key) {
                option.votes = option.votes.saturating_sub(1);
            }
        }
        (PendingKind::Answer, StoryContent::Question { viewer_answered, response_count, .. }) => {
            *viewer_answered = false;
            *response_count = response_count.saturating_sub(1);
        }
        _ => {}
    }
}

/// Optimistically applies a quick reaction. Reactions do not close the gate;
/// they are refused only while a vote is in flight or another reaction is
/// still settling.
pub(crate) fn begin_reaction(
    session: &mut PlaybackSession,
    item_id: &str,
    emoji: &str,
) -> BeginOutcome {
    if session.voting_in_progress || session.pending_reaction.is_some() {
        return BeginOutcome::Busy;
    }
    let Some((_, item)) = session.current() else {
        return BeginOutcome::NotCurrent;
    };
    if item.id != item_id {
        return BeginOutcome::NotCurrent;
    }

    let Some(key) = session.current_key() else {
        return BeginOutcome::NotCurrent;
    };
    let Some(item) = session.item_by_id_mut(item_id) else {
        return BeginOutcome::NotCurrent;
    };
    let previous = item.viewer_reaction.clone();
    let counted = previous.is_none();
    item.viewer_reaction = Some(emoji.to_string());
    if counted {
        item.reaction_count += 1;
    }

    session.pending_reaction = Some(PendingReaction {
        key,
        previous,
        counted,
    });
    BeginOutcome::Started
}

pub(crate) fn finish_reaction(
    session: &mut PlaybackSession,
    result: InteractionResult,
) -> FinishOutcome {
    let matches = session
        .pending_reaction
        .as_ref()
        .is_some_and(|pending| pending.key.item_id == result.item_id);
    if !matches {
        return FinishOutcome::Stale;
    }
    let Some(pending) = session.pending_reaction.take() else {
        return FinishOutcome::Stale;
    };

    if session.closed {
        return FinishOutcome::Stale;
    }

    if let Some(detail) = result.commit_err {
        if let Some(item) = session.item_by_id_mut(&pending.key.item_id) {
            item.viewer_reaction = pending.previous.clone();
            if pending.counted {
                item.reaction_count = item.reaction_count.saturating_sub(1);
            }
        }
        return FinishOutcome::RolledBack { detail };
    }

    // The refresh was scheduled against the reacted item; if the viewer has
    // swiped away since, discard it rather than reshuffle under their feet.
    let still_current = session.current_key().is_some_and(|key| key == pending.key);
    let (reconcile, refresh_warning) = match result.refreshed {
        Some(Ok(groups)) if still_current => (Some(reconcile_groups(session, groups)), None),
        Some(Err(warning)) => (None, Some(warning)),
        _ => (None, None),
    };
    FinishOutcome::Committed {
        reconcile,
        refresh_warning,
    }
}

/// Merges refreshed feed data onto the session without moving the viewer.
///
/// Previously-seen ordering wins: items the viewer has already been shown
/// keep their positions (content updated from the refresh where available,
/// kept as-is where the refresh dropped them), refreshed newcomers are
/// appended, and the indices are re-pointed at the same logical item by
/// identity. A current group missing from the refresh keeps its stale
/// snapshot; only when no consistent position remains does the session
/// close.
pub(crate) fn reconcile_groups(
    session: &mut PlaybackSession,
    refreshed: Vec<AuthorGroup>,
) -> Reconcile {
    let Some(current) = session.current_key() else {
        session.close();
        return Reconcile::Closed;
    };

    let mut merged: Vec<AuthorGroup> = Vec::with_capacity(session.groups.len());
    let mut carried: HashSet<&str> = HashSet::new();
    let mut kept_stale = false;

    for group in &session.groups {
        if let Some(update) = refreshed
            .iter()
            .find(|candidate| candidate.author_id == group.author_id)
        {
            merged.push(merge_group(group, update));
            carried.insert(group.author_id.as_str());
        } else if group.author_id == current.author_id {
            merged.push(group.clone());
            carried.insert(group.author_id.as_str());
            kept_stale = true;
        }
        // Other groups absent from the refresh are gone: the author pulled
        // their stories or they all expired.
    }

    let mut appended: Vec<AuthorGroup> = refreshed
        .iter()
        .filter(|group| !carried.contains(group.author_id.as_str()) && !group.items.is_empty())
        .cloned()
        .collect();
    merged.append(&mut appended);

    session.groups = merged;

    match session.resolve_by_identity(&current.author_id, &current.item_id) {
        Some((group_index, item_index)) => {
            // Direct re-point: the identity is unchanged, so elapsed time
            // and pause state must survive.
            session.group_index = group_index;
            session.item_index = item_index;
            if kept_stale {
                Reconcile::KeptStale
            } else {
                Reconcile::Repositioned
            }
        }
        None => {
            let in_bounds = session
                .groups
                .get(session.group_index)
                .is_some_and(|group| session.item_index < group.items.len());
            if in_bounds {
                Reconcile::KeptStale
            } else {
                session.close();
                Reconcile::Closed
            }
        }
    }
}

fn merge_group(seen: &AuthorGroup, update: &AuthorGroup) -> AuthorGroup {
    let mut items = Vec::with_capacity(seen.items.len());
    for item in &seen.items {
        match update.items.iter().find(|candidate| candidate.id == item.id) {
            Some(updated) => items.push(updated.clone()),
            None => items.push(item.clone()),
        }
    }
    for item in &update.items {
        if !seen.items.iter().any(|existing| existing.id == item.id) {
            items.push(item.clone());
        }
    }

    AuthorGroup {
        author_id: update.author_id.clone(),
        author_handle: update.author_handle.clone(),
        avatar_url: update.avatar_url.clone(),
        items,
    }
}
