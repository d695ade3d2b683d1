use std::sync::mpsc;
use std::thread;

use super::super::player::InteractionResult;
use super::super::source::StorySource;
use super::super::story::AuthorGroup;

/// Completions flowing back from worker threads, drained at the top of each
/// loop iteration.
pub(super) enum TaskOutcome {
    Vote(InteractionResult),
    Answer(InteractionResult),
    Reaction(InteractionResult),
    ViewRecordFailed { detail: String },
    FeedRefreshed(Result<Vec<AuthorGroup>, String>),
}

pub(super) fn status_info(msg: &str) -> String {
    format!("INFO: {msg}")
}

pub(super) fn status_error(msg: &str) -> String {
    format!("ERROR: {msg}")
}

fn commit_and_refresh<S, F>(
    source: S,
    viewer: String,
    item_id: String,
    commit: F,
) -> InteractionResult
where
    S: StorySource,
    F: FnOnce(&S, &str) -> anyhow::Result<()>,
{
    match commit(&source, &viewer) {
        Ok(()) => {
            let refreshed = source
                .fetch_groups(&viewer)
                .map(|parse| parse.groups)
                .map_err(|err| format!("{err:#}"));
            InteractionResult {
                item_id,
                commit_err: None,
                refreshed: Some(refreshed),
            }
        }
        Err(err) => InteractionResult {
            item_id,
            commit_err: Some(format!("{err:#}")),
            refreshed: None,
        },
    }
}

pub(super) fn spawn_vote_commit<S>(
    source: &S,
    viewer: &str,
    item_id: &str,
    option_key: &str,
    tx: &mpsc::Sender<TaskOutcome>,
) where
    S: StorySource + Clone + Send + 'static,
{
    let source = source.clone();
    let viewer = viewer.to_string();
    let item_id = item_id.to_string();
    let option_key = option_key.to_string();
    let tx = tx.clone();
    thread::spawn(move || {
        let result = commit_and_refresh(source, viewer, item_id.clone(), |source, viewer| {
            source.record_vote(&item_id, &option_key, viewer)
        });
        let _ = tx.send(TaskOutcome::Vote(result));
    });
}

pub(super) fn spawn_answer_commit<S>(
    source: &S,
    viewer: &str,
    item_id: &str,
    text: &str,
    tx: &mpsc::Sender<TaskOutcome>,
) where
    S: StorySource + Clone + Send + 'static,
{
    let source = source.clone();
    let viewer = viewer.to_string();
    let item_id = item_id.to_string();
    let text = text.to_string();
    let tx = tx.clone();
    thread::spawn(move || {
        let result = commit_and_refresh(source, viewer, item_id.clone(), |source, viewer| {
            source.record_answer(&item_id, &text, viewer)
        });
        let _ = tx.send(TaskOutcome::Answer(result));
    });
}

pub(super) fn spawn_reaction_commit<S>(
    source: &S,
    viewer: &str,
    item_id: &str,
    emoji: &str,
    tx: &mpsc::Sender<TaskOutcome>,
) where
    S: StorySource + Clone + Send + 'static,
{
    let source = source.clone();
    let viewer = viewer.to_string();
    let item_id = item_id.to_string();
    let emoji = emoji.to_string();
    let tx = tx.clone();
    thread::spawn(move || {
        let result = commit_and_refresh(source, viewer, item_id.clone(), |source, viewer| {
            source.record_reaction(&item_id, &emoji, viewer)
        });
        let _ = tx.send(TaskOutcome::Reaction(result));
    });
}

/// Fire-and-forget view beacon; only failures come back, as a status note.
pub(super) fn spawn_view_record<S>(
    source: &S,
    viewer: &str,
    item_id: &str,
    tx: &mpsc::Sender<TaskOutcome>,
) where
    S: StorySource + Clone + Send + 'static,
{
    let source = source.clone();
    let viewer = viewer.to_string();
    let item_id = item_id.to_string();
    let tx = tx.clone();
    thread::spawn(move || {
        if let Err(err) = source.record_view(&item_id, &viewer) {
            let _ = tx.send(TaskOutcome::ViewRecordFailed {
                detail: format!("{err:#}"),
            });
        }
    });
}

pub(super) fn spawn_feed_refresh<S>(source: &S, viewer: &str, tx: &mpsc::Sender<TaskOutcome>)
where
    S: StorySource + Clone + Send + 'static,
{
    let source = source.clone();
    let viewer = viewer.to_string();
    let tx = tx.clone();
    thread::spawn(move || {
        let result = source
            .fetch_groups(&viewer)
            .map(|parse| parse.groups)
            .map_err(|err| format!("{err:#}"));
        let _ = tx.send(TaskOutcome::FeedRefreshed(result));
    });
}
