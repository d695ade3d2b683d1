use super::PlaybackSession;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NavEvent {
    NextItem,
    PrevItem,
    NextAuthor,
    PrevAuthor,
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NavOutcome {
    Moved,
    Closed,
    Ignored,
}

/// Applies one navigation event to the session.
///
/// `NextItem` past the end of a group becomes `NextAuthor`; `PrevItem`
/// before the start becomes `PrevAuthor`; `NextAuthor` with nowhere
/// eligible to go becomes `Close`. `PrevAuthor` at the first group is a
/// no-op: there is nothing before the first author.
pub(crate) fn apply(session: &mut PlaybackSession, event: NavEvent) -> NavOutcome {
    if session.closed {
        return NavOutcome::Ignored;
    }

    match event {
        NavEvent::NextItem => {
            let Some((group, _)) = session.current() else {
                return apply(session, NavEvent::Close);
            };
            if session.item_index + 1 < group.items.len() {
                let moved = session.set_position(session.group_index, session.item_index + 1);
                debug_assert!(moved);
                NavOutcome::Moved
            } else {
                apply(session, NavEvent::NextAuthor)
            }
        }
        NavEvent::NextAuthor => match next_eligible_group(session) {
            Some(group_index) => {
                let moved = session.set_position(group_index, 0);
                debug_assert!(moved);
                NavOutcome::Moved
            }
            None => apply(session, NavEvent::Close),
        },
        NavEvent::PrevItem => {
            if session.item_index > 0 {
                let moved = session.set_position(session.group_index, session.item_index - 1);
                debug_assert!(moved);
                NavOutcome::Moved
            } else {
                apply(session, NavEvent::PrevAuthor)
            }
        }
        NavEvent::PrevAuthor => {
            if session.group_index == 0 {
                return NavOutcome::Ignored;
            }
            let target = session.group_index - 1;
            let last_item = session.groups[target].items.len().saturating_sub(1);
            let moved = session.set_position(target, last_item);
            debug_assert!(moved);
            NavOutcome::Moved
        }
        NavEvent::Close => {
            session.close();
            NavOutcome::Closed
        }
    }
}

/// Forward scan from the next group, wrapping past the end, never
/// revisiting the current group.
///
/// Sessions opened on someone else's stories skip the viewer's own group
/// unless it is the only candidate left (groups are per-author, so at most
/// one candidate can be self-authored). Sessions opened on the viewer's own
/// group take whatever comes next.
fn next_eligible_group(session: &PlaybackSession) -> Option<usize> {
    let len = session.groups.len();
    if len == 0 {
        return None;
    }

    let mut own_fallback = None;
    for step in 1..len {
        let candidate = (session.group_index + step) % len;
        if session.groups[candidate].items.is_empty() {
            continue;
        }
        let own = session.groups[candidate].author_id == session.viewer_id;
        if session.started_on_own || !own {
            return Some(candidate);
        }
        if own_fallback.is_none() {
            own_fallback = Some(candidate);
        }
    }
    own_fallback
}
