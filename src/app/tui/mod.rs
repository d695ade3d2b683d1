mod actions;
mod render;
mod session;

use std::collections::HashSet;
use std::io;
use std::sync::mpsc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::Utc;
use crossterm::event::{self, Event, KeyCode, KeyEventKind, MouseButton, MouseEventKind};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::Rect;
use ratatui::widgets::TableState;

use crate::db::Database;

use super::player::{
    self, GestureIntent, ItemKey, NavEvent, NavOutcome, PlaybackSession, SwipeTracker, TouchPoint,
};
use super::source::StorySource;
use super::story::{AuthorGroup, StoryContent, roster_order};

use self::actions::{
    TaskOutcome, spawn_answer_commit, spawn_feed_refresh, spawn_reaction_commit, spawn_view_record,
    spawn_vote_commit, status_error, status_info,
};
use self::render::{draw_roster, draw_viewer, poll_widget_rect, viewer_layout};
use self::session::TuiSession;

const TICK_POLL_MS: u64 = 50;
const REACTION_EMOJI: &str = "❤️";

pub(crate) fn run_tui<S>(
    db: &Database,
    source: S,
    viewer_handle: &str,
    open_author: Option<&str>,
    open_item: Option<&str>,
) -> Result<()>
where
    S: StorySource + Clone + Send + 'static,
{
    // Fetch before touching the terminal so a dead feed fails loudly on
    // stderr instead of inside the alternate screen.
    let feed = source.fetch_groups(viewer_handle)?;
    for warning in &feed.warnings {
        eprintln!("Warning: {warning}");
    }
    let viewer_id = feed.viewer_id.clone().unwrap_or_default();
    let mut groups = feed.groups;

    if let Some(handle) = open_author
        && !groups.iter().any(|group| group.author_handle == handle)
        && let Some(extra) = source
            .fetch_author_group(viewer_handle, handle)
            .with_context(|| format!("failed to fetch stories for {handle}"))?
    {
        groups.push(extra);
    }

    let mut tui = TuiSession::enter()?;
    let mut terminal = Terminal::new(CrosstermBackend::new(io::stdout()))
        .context("failed to initialize terminal backend")?;
    terminal.clear()?;

    let mut app = ViewerApp::new(db, source, viewer_handle, viewer_id, groups)?;
    if let Some(handle) = open_author
        && !app.open_author(handle, open_item)
    {
        app.status = status_error(&format!("No active stories for {handle}."));
    }

    let result = app.run(&mut terminal);
    terminal.show_cursor()?;
    tui.leave()?;
    result
}

struct ViewerApp<'a, S> {
    db: &'a Database,
    source: S,
    viewer_handle: String,
    viewer_id: String,
    groups: Vec<AuthorGroup>,
    roster: Vec<usize>,
    table_state: TableState,
    viewed: HashSet<String>,
    session: Option<PlaybackSession>,
    answer_draft: Option<String>,
    swipe: SwipeTracker,
    last_marked: Option<ItemKey>,
    status: String,
    task_tx: mpsc::Sender<TaskOutcome>,
    task_rx: mpsc::Receiver<TaskOutcome>,
}

impl<'a, S> ViewerApp<'a, S>
where
    S: StorySource + Clone + Send + 'static,
{
    fn new(
        db: &'a Database,
        source: S,
        viewer_handle: &str,
        viewer_id: String,
        groups: Vec<AuthorGroup>,
    ) -> Result<Self> {
        let (task_tx, task_rx) = mpsc::channel();
        let roster = roster_order(&groups);
        let mut table_state = TableState::default();
        table_state.select((!roster.is_empty()).then_some(0));
        let status = if roster.is_empty() {
            status_info("No stories in the feed. Press g to refresh or q to quit.")
        } else {
            status_info("Ready. Enter plays the selected author.")
        };
        Ok(Self {
            db,
            source,
            viewer_handle: viewer_handle.to_string(),
            viewer_id,
            groups,
            roster,
            table_state,
            viewed: db.viewed_item_ids()?,
            session: None,
            answer_draft: None,
            swipe: SwipeTracker::default(),
            last_marked: None,
            status,
            task_tx,
            task_rx,
        })
    }

    fn run(&mut self, terminal: &mut Terminal<CrosstermBackend<io::Stdout>>) -> Result<()> {
        loop {
            self.drain_task_outcomes();
            self.advance_clock();
            self.note_current_viewed()?;

            let now = Utc::now();
            terminal.draw(|frame| match &self.session {
                Some(session) => {
                    draw_viewer(frame, session, &self.status, self.answer_draft.as_deref(), now);
                }
                None => draw_roster(
                    frame,
                    &self.groups,
                    &self.roster,
                    &mut self.table_state,
                    &self.viewed,
                    &self.status,
                    now,
                ),
            })?;

            if !event::poll(Duration::from_millis(TICK_POLL_MS))? {
                continue;
            }

            match event::read()? {
                Event::Key(key) if key.kind == KeyEventKind::Press => {
                    if self.session.is_some() {
                        self.handle_viewer_key(key.code);
                    } else if self.handle_roster_key(key.code) {
                        return Ok(());
                    }
                }
                Event::Mouse(mouse) => self.handle_mouse(mouse, terminal)?,
                _ => {}
            }
        }
    }

    // --- background completions ---

    fn drain_task_outcomes(&mut self) {
        while let Ok(outcome) = self.task_rx.try_recv() {
            match outcome {
                TaskOutcome::Vote(result) => self.finish_blocking(result, true),
                TaskOutcome::Answer(result) => self.finish_blocking(result, false),
                TaskOutcome::Reaction(result) => {
                    let Some(session) = &mut self.session else {
                        continue;
                    };
                    match player::finish_reaction(session, result) {
                        player::FinishOutcome::RolledBack { detail } => {
                            self.status = status_error(&format!("Reaction failed: {detail}"));
                        }
                        player::FinishOutcome::Committed { .. } => {
                            self.status = status_info("Reaction sent.");
                        }
                        player::FinishOutcome::Stale => {}
                    }
                    self.drop_session_if_closed();
                }
                TaskOutcome::ViewRecordFailed { detail } => {
                    self.status = status_error(&format!("View ping failed: {detail}"));
                }
                TaskOutcome::FeedRefreshed(result) => {
                    // Roster-level refresh; while a session is open the
                    // reconcile path owns data updates.
                    if self.session.is_some() {
                        continue;
                    }
                    match result {
                        Ok(groups) => {
                            self.groups = groups;
                            self.rebuild_roster(None);
                            self.status = status_info("Feed refreshed.");
                        }
                        Err(detail) => {
                            self.status = status_error(&format!("Refresh failed: {detail}"));
                        }
                    }
                }
            }
        }
    }

    fn finish_blocking(&mut self, result: player::InteractionResult, is_vote: bool) {
        let Some(session) = &mut self.session else {
            return;
        };
        let outcome = if is_vote {
            player::finish_vote(session, result)
        } else {
            player::finish_answer(session, result)
        };
        let noun = if is_vote { "Vote" } else { "Answer" };
        match outcome {
            player::FinishOutcome::Stale => {}
            player::FinishOutcome::RolledBack { detail } => {
                self.status = status_error(&format!("{noun} failed: {detail}"));
            }
            player::FinishOutcome::Committed {
                reconcile,
                refresh_warning,
            } => {
                self.status = match refresh_warning {
                    Some(warning) => {
                        status_info(&format!("{noun} recorded (refresh failed: {warning})."))
                    }
                    None => status_info(&format!("{noun} recorded.")),
                };
                if reconcile == Some(player::Reconcile::Closed) {
                    self.status = status_info("Feed moved on; viewer closed.");
                }
            }
        }
        self.drop_session_if_closed();
    }

    // --- playback ---

    fn advance_clock(&mut self) {
        let Some(session) = &mut self.session else {
            return;
        };
        if let Some(event) = player::tick(session, Instant::now()) {
            let outcome = player::apply(session, event);
            self.after_nav(outcome);
        }
    }

    fn note_current_viewed(&mut self) -> Result<()> {
        let Some(session) = &self.session else {
            return Ok(());
        };
        let Some(key) = session.current_key() else {
            return Ok(());
        };
        if self.last_marked.as_ref() == Some(&key) {
            return Ok(());
        }
        self.last_marked = Some(key.clone());
        self.viewed.insert(key.item_id.clone());
        if let Err(err) = self.db.mark_viewed(&key.item_id, &key.author_id) {
            self.status = status_error(&format!("View log write failed: {err:#}"));
        }
        spawn_view_record(&self.source, &self.viewer_handle, &key.item_id, &self.task_tx);
        Ok(())
    }

    fn nav(&mut self, event: NavEvent) {
        let Some(session) = &mut self.session else {
            return;
        };
        // The gate blocks navigation the same way it blocks gestures.
        if session.voting_in_progress() || session.overlay_open() {
            return;
        }
        let outcome = player::apply(session, event);
        self.after_nav(outcome);
    }

    fn after_nav(&mut self, outcome: NavOutcome) {
        if outcome == NavOutcome::Closed {
            self.leave_session("No more stories.");
        }
    }

    fn drop_session_if_closed(&mut self) {
        if self.session.as_ref().is_some_and(PlaybackSession::closed) {
            self.leave_session("Viewer closed.");
        }
    }

    fn leave_session(&mut self, note: &str) {
        // Adopt whatever the session reconciled while it was open, so the
        // roster reflects fresh tallies and newly posted stories.
        if let Some(session) = self.session.take() {
            self.groups = session.groups().to_vec();
        }
        self.answer_draft = None;
        self.swipe.cancel();
        self.last_marked = None;
        self.rebuild_roster(None);
        self.status = status_info(note);
    }

    fn open_session(&mut self, group_index: usize) {
        match PlaybackSession::open(self.groups.clone(), &self.viewer_id, group_index) {
            Some(session) => {
                let handle = session
                    .current()
                    .map(|(group, _)| group.author_handle.clone())
                    .unwrap_or_default();
                self.session = Some(session);
                self.last_marked = None;
                self.status = status_info(&format!("Playing {handle}."));
            }
            None => {
                self.status = status_error("Nothing to play for that author.");
            }
        }
    }

    fn open_author(&mut self, handle: &str, item_id: Option<&str>) -> bool {
        self.rebuild_roster(None);
        let Some(group_index) = self
            .groups
            .iter()
            .position(|group| group.author_handle == handle)
        else {
            return false;
        };
        self.open_session(group_index);

        if let Some(item_id) = item_id
            && let Some(session) = &mut self.session
            && let Some(author_id) = session.current_key().map(|key| key.author_id)
        {
            match session.resolve_by_identity(&author_id, item_id) {
                Some((group, item)) => {
                    session.set_position(group, item);
                }
                None => {
                    self.status = status_error(&format!("Story {item_id} is gone; starting over."));
                }
            }
        }
        self.session.is_some()
    }

    fn rebuild_roster(&mut self, preferred_author: Option<&str>) {
        self.roster = roster_order(&self.groups);
        if self.roster.is_empty() {
            self.table_state.select(None);
            return;
        }
        if let Some(handle) = preferred_author
            && let Some(position) = self.roster.iter().position(|&idx| {
                self.groups
                    .get(idx)
                    .is_some_and(|group| group.author_handle == handle)
            })
        {
            self.table_state.select(Some(position));
            return;
        }
        match self.table_state.selected() {
            Some(selected) => self
                .table_state
                .select(Some(selected.min(self.roster.len() - 1))),
            None => self.table_state.select(Some(0)),
        }
    }

    // --- input: roster ---

    /// Returns `true` when the app should quit.
    fn handle_roster_key(&mut self, code: KeyCode) -> bool {
        match code {
            KeyCode::Char('q') | KeyCode::Esc => return true,
            KeyCode::Up => {
                if let Some(selected) = self.table_state.selected() {
                    self.table_state.select(Some(selected.saturating_sub(1)));
                }
            }
            KeyCode::Down => {
                if let Some(selected) = self.table_state.selected()
                    && !self.roster.is_empty()
                {
                    let next = (selected + 1).min(self.roster.len() - 1);
                    self.table_state.select(Some(next));
                }
            }
            KeyCode::Char('g') => {
                spawn_feed_refresh(&self.source, &self.viewer_handle, &self.task_tx);
                self.status = status_info("Refreshing feed…");
            }
            KeyCode::Enter => {
                if let Some(selected) = self.table_state.selected()
                    && let Some(&group_index) = self.roster.get(selected)
                {
                    self.open_session(group_index);
                }
            }
            _ => {}
        }
        false
    }

    // --- input: viewer ---

    fn handle_viewer_key(&mut self, code: KeyCode) {
        if self.answer_draft.is_some() {
            self.handle_answer_key(code);
            return;
        }

        match code {
            KeyCode::Char('q') | KeyCode::Esc => {
                if let Some(session) = &mut self.session {
                    player::apply(session, NavEvent::Close);
                }
                self.leave_session("Closed.");
            }
            KeyCode::Char(' ') => {
                if let Some(session) = &mut self.session {
                    session.toggle_pause();
                }
            }
            KeyCode::Char('m') => {
                if let Some(session) = &mut self.session
                    && session
                        .current()
                        .is_some_and(|(_, item)| item.content.is_video())
                {
                    session.toggle_mute();
                }
            }
            KeyCode::Left => self.nav(NavEvent::PrevItem),
            KeyCode::Right => self.nav(NavEvent::NextItem),
            KeyCode::Up => self.nav(NavEvent::PrevAuthor),
            KeyCode::Down => self.nav(NavEvent::NextAuthor),
            KeyCode::Char(digit @ '1'..='3') => {
                self.try_vote(digit as usize - '1' as usize);
            }
            KeyCode::Char('a') => self.try_open_answer(),
            KeyCode::Char('r') => self.try_react(),
            _ => {}
        }
    }

    fn handle_answer_key(&mut self, code: KeyCode) {
        match code {
            KeyCode::Esc => {
                if let Some(session) = &mut self.session {
                    session.set_overlay_open(false);
                }
                self.answer_draft = None;
                self.status = status_info("Answer discarded.");
            }
            KeyCode::Enter => self.submit_answer(),
            KeyCode::Backspace => {
                if let Some(draft) = &mut self.answer_draft {
                    draft.pop();
                }
            }
            KeyCode::Char(ch) => {
                if let Some(draft) = &mut self.answer_draft {
                    draft.push(ch);
                }
            }
            _ => {}
        }
    }

    fn try_vote(&mut self, option_index: usize) {
        let Some(session) = &self.session else {
            return;
        };
        let Some((_, item)) = session.current() else {
            return;
        };
        let StoryContent::Poll { options, .. } = &item.content else {
            return;
        };
        let Some(option) = options.get(option_index) else {
            self.status = status_error("That poll has no such option.");
            return;
        };
        let item_id = item.id.clone();
        let option_key = option.key.clone();

        let Some(session) = &mut self.session else {
            return;
        };
        match player::begin_vote(session, &item_id, &option_key) {
            player::BeginOutcome::Started => {
                spawn_vote_commit(
                    &self.source,
                    &self.viewer_handle,
                    &item_id,
                    &option_key,
                    &self.task_tx,
                );
                self.status = status_info("Casting vote…");
            }
            player::BeginOutcome::AlreadyDone => {
                self.status = status_info("You already voted on this poll.");
            }
            player::BeginOutcome::Busy => {
                self.status = status_info("Another vote is still in flight.");
            }
            player::BeginOutcome::WrongKind
            | player::BeginOutcome::UnknownOption
            | player::BeginOutcome::NotCurrent => {}
        }
    }

    fn try_open_answer(&mut self) {
        let Some(session) = &mut self.session else {
            return;
        };
        let answered = match session.current() {
            Some((_, item)) => match &item.content {
                StoryContent::Question { viewer_answered, .. } => *viewer_answered,
                _ => return,
            },
            None => return,
        };
        if answered {
            self.status = status_info("You already answered this question.");
            return;
        }
        if session.voting_in_progress() {
            self.status = status_info("Another vote is still in flight.");
            return;
        }
        session.set_overlay_open(true);
        self.answer_draft = Some(String::new());
    }

    fn submit_answer(&mut self) {
        let text = self
            .answer_draft
            .as_deref()
            .map(str::trim)
            .unwrap_or_default()
            .to_string();
        if text.is_empty() {
            self.status = status_info("Answer is empty; Esc to cancel.");
            return;
        }
        let Some(session) = &mut self.session else {
            return;
        };
        let Some(item_id) = session.current_key().map(|key| key.item_id) else {
            return;
        };

        session.set_overlay_open(false);
        self.answer_draft = None;
        match player::begin_answer(session, &item_id) {
            player::BeginOutcome::Started => {
                spawn_answer_commit(
                    &self.source,
                    &self.viewer_handle,
                    &item_id,
                    &text,
                    &self.task_tx,
                );
                self.status = status_info("Sending answer…");
            }
            player::BeginOutcome::AlreadyDone => {
                self.status = status_info("You already answered this question.");
            }
            player::BeginOutcome::Busy => {
                self.status = status_info("Another vote is still in flight.");
            }
            player::BeginOutcome::WrongKind
            | player::BeginOutcome::UnknownOption
            | player::BeginOutcome::NotCurrent => {}
        }
    }

    fn try_react(&mut self) {
        let Some(session) = &mut self.session else {
            return;
        };
        let Some(item_id) = session.current_key().map(|key| key.item_id) else {
            return;
        };
        match player::begin_reaction(session, &item_id, REACTION_EMOJI) {
            player::BeginOutcome::Started => {
                spawn_reaction_commit(
                    &self.source,
                    &self.viewer_handle,
                    &item_id,
                    REACTION_EMOJI,
                    &self.task_tx,
                );
                self.status = status_info("Reacting…");
            }
            player::BeginOutcome::Busy => {
                self.status = status_info("Still sending the previous action.");
            }
            _ => {}
        }
    }

    fn handle_mouse(
        &mut self,
        mouse: crossterm::event::MouseEvent,
        terminal: &Terminal<CrosstermBackend<io::Stdout>>,
    ) -> Result<()> {
        if self.session.is_none() || self.answer_draft.is_some() {
            self.swipe.cancel();
            return Ok(());
        }

        match mouse.kind {
            MouseEventKind::Down(MouseButton::Left) => {
                self.swipe.press(TouchPoint {
                    x: mouse.column,
                    y: mouse.row,
                    at: Instant::now(),
                });
            }
            MouseEventKind::Up(MouseButton::Left) => {
                let end = TouchPoint {
                    x: mouse.column,
                    y: mouse.row,
                    at: Instant::now(),
                };
                let Some((start, end)) = self.swipe.release(end) else {
                    return Ok(());
                };

                let size = terminal.size()?;
                let layout = viewer_layout(Rect::new(0, 0, size.width, size.height));
                let mut interactive = vec![layout.controls];
                let gate_closed = {
                    let Some(session) = &self.session else {
                        return Ok(());
                    };
                    if session.current().is_some_and(|(_, item)| {
                        matches!(
                            item.content,
                            StoryContent::Poll { .. } | StoryContent::Question { .. }
                        )
                    }) {
                        interactive.push(poll_widget_rect(layout.content));
                    }
                    session.voting_in_progress()
                };

                if let Some(intent) =
                    player::decode_gesture(start, end, layout.content, &interactive, gate_closed)
                {
                    match intent {
                        GestureIntent::NextItem => self.nav(NavEvent::NextItem),
                        GestureIntent::PrevItem => self.nav(NavEvent::PrevItem),
                        GestureIntent::NextAuthor => self.nav(NavEvent::NextAuthor),
                        GestureIntent::PrevAuthor => self.nav(NavEvent::PrevAuthor),
                        GestureIntent::Close => {
                            if let Some(session) = &mut self.session {
                                player::apply(session, NavEvent::Close);
                            }
                            self.leave_session("Closed.");
                        }
                        GestureIntent::TogglePause => {
                            if let Some(session) = &mut self.session {
                                session.toggle_pause();
                            }
                        }
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }
}
