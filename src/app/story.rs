use chrono::{DateTime, Utc};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TextSize {
    Small,
    Medium,
    Large,
}

impl TextSize {
    pub(crate) fn parse(raw: &str) -> Self {
        match raw.trim() {
            "small" => Self::Small,
            "large" => Self::Large,
            _ => Self::Medium,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PollOption {
    pub(crate) key: String,
    pub(crate) label: String,
    pub(crate) votes: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum StoryContent {
    Image {
        media_url: String,
        caption: Option<String>,
    },
    Video {
        media_url: String,
        caption: Option<String>,
    },
    Text {
        body: String,
        color: Option<String>,
        size: TextSize,
    },
    Poll {
        prompt: String,
        options: Vec<PollOption>,
        viewer_vote: Option<String>,
    },
    Question {
        prompt: String,
        response_count: u64,
        viewer_answered: bool,
    },
}

impl StoryContent {
    pub(crate) fn kind_label(&self) -> &'static str {
        match self {
            Self::Image { .. } => "image",
            Self::Video { .. } => "video",
            Self::Text { .. } => "text",
            Self::Poll { .. } => "poll",
            Self::Question { .. } => "question",
        }
    }

    pub(crate) fn is_video(&self) -> bool {
        matches!(self, Self::Video { .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct StoryItem {
    pub(crate) id: String,
    pub(crate) author_id: String,
    pub(crate) author_handle: String,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) expires_at: DateTime<Utc>,
    pub(crate) location: Option<String>,
    pub(crate) content: StoryContent,
    pub(crate) views: u64,
    pub(crate) reaction_count: u64,
    pub(crate) reply_count: u64,
    pub(crate) viewer_reaction: Option<String>,
    /// Sticker/tag annotations. Opaque to the player; rendered hosts may
    /// interpret them, this one passes them through untouched.
    pub(crate) overlays: Vec<Value>,
}

impl StoryItem {
    pub(crate) fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct AuthorGroup {
    pub(crate) author_id: String,
    pub(crate) author_handle: String,
    pub(crate) avatar_url: Option<String>,
    pub(crate) items: Vec<StoryItem>,
}

impl AuthorGroup {
    pub(crate) fn latest_created_at(&self) -> Option<DateTime<Utc>> {
        self.items.iter().map(|item| item.created_at).max()
    }
}

/// Roster ordering: most recently active author first. Playback order stays
/// whatever the source returned.
pub(crate) fn roster_order(groups: &[AuthorGroup]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..groups.len()).collect();
    order.sort_by(|a, b| {
        let left = groups[*a].latest_created_at();
        let right = groups[*b].latest_created_at();
        right.cmp(&left)
    });
    order
}

pub(crate) fn format_recency(latest: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let seconds = (now - latest).num_seconds().max(0);
    if seconds < 60 {
        return "active now".to_string();
    }
    if seconds < 3600 {
        return format!("active {}m ago", seconds / 60);
    }
    if seconds < 86_400 {
        return format!("active {}h ago", seconds / 3600);
    }
    format!("active {}d ago", seconds / 86_400)
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    let mut out = s.to_string();
    if out.chars().count() > max {
        out = out.chars().take(max.saturating_sub(3)).collect::<String>() + "...";
    }
    out
}
