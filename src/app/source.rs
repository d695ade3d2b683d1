use std::env;
use std::ffi::OsString;

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::http::{RequestPolicy, get_text_with_retries, post_form_with_retries};

use super::story::{AuthorGroup, PollOption, StoryContent, StoryItem, TextSize};

const DEFAULT_API_BASE_URL: &str = "https://feed.storydeck.app";

/// Parsed feed plus whatever was skipped along the way. Malformed entries
/// never abort the fetch; they become warnings for the status line.
#[derive(Debug, Default)]
pub(crate) struct FeedParse {
    /// Canonical account id the server resolved for the requesting viewer;
    /// self-skip during auto-advance keys off this.
    pub(crate) viewer_id: Option<String>,
    pub(crate) groups: Vec<AuthorGroup>,
    pub(crate) warnings: Vec<String>,
}

/// Everything the player needs from the outside world. The engine never
/// cares whether this is the HTTP feed or a test stub.
pub(crate) trait StorySource {
    fn fetch_groups(&self, viewer: &str) -> Result<FeedParse>;
    fn fetch_author_group(&self, viewer: &str, author_handle: &str)
    -> Result<Option<AuthorGroup>>;
    fn record_vote(&self, item_id: &str, option_key: &str, viewer: &str) -> Result<()>;
    fn record_answer(&self, item_id: &str, text: &str, viewer: &str) -> Result<()>;
    fn record_reaction(&self, item_id: &str, emoji: &str, viewer: &str) -> Result<()>;
    fn record_view(&self, item_id: &str, viewer: &str) -> Result<()>;
}

pub(crate) fn resolve_api_base_url() -> String {
    resolve_api_base_url_from_env(env::var_os("STORYDECK_API_URL"))
}

pub(crate) fn resolve_api_base_url_from_env(env_value: Option<OsString>) -> String {
    match env_value {
        Some(value) if !value.is_empty() => value.to_string_lossy().trim_end_matches('/').to_string(),
        _ => DEFAULT_API_BASE_URL.to_string(),
    }
}

#[derive(Debug, Clone)]
pub(crate) struct FeedApiSource {
    base_url: String,
    policy: RequestPolicy,
}

impl FeedApiSource {
    pub(crate) fn new(base_url: String) -> Self {
        Self {
            base_url,
            policy: RequestPolicy::default(),
        }
    }

    fn get(&self, path: &str, query: &[(String, String)]) -> Result<String> {
        let url = format!("{}{path}", self.base_url);
        get_text_with_retries(&url, query, self.policy)
            .map_err(|err| anyhow!(err))
            .with_context(|| format!("GET {path} failed"))
    }

    fn post(&self, path: &str, form: &[(String, String)]) -> Result<()> {
        let url = format!("{}{path}", self.base_url);
        post_form_with_retries(&url, form, self.policy)
            .map_err(|err| anyhow!(err))
            .with_context(|| format!("POST {path} failed"))?;
        Ok(())
    }
}

impl StorySource for FeedApiSource {
    fn fetch_groups(&self, viewer: &str) -> Result<FeedParse> {
        let query = vec![("viewer".to_string(), viewer.to_string())];
        let raw = self.get("/api/stories/feed", &query)?;
        parse_feed_groups(&raw, Utc::now())
    }

    fn fetch_author_group(
        &self,
        viewer: &str,
        author_handle: &str,
    ) -> Result<Option<AuthorGroup>> {
        let query = vec![("viewer".to_string(), viewer.to_string())];
        let raw = self.get(&format!("/api/stories/author/{author_handle}"), &query)?;
        parse_author_group(&raw, Utc::now())
    }

    fn record_vote(&self, item_id: &str, option_key: &str, viewer: &str) -> Result<()> {
        self.post(
            &format!("/api/stories/{item_id}/vote"),
            &[
                ("option".to_string(), option_key.to_string()),
                ("viewer".to_string(), viewer.to_string()),
            ],
        )
    }

    fn record_answer(&self, item_id: &str, text: &str, viewer: &str) -> Result<()> {
        self.post(
            &format!("/api/stories/{item_id}/answer"),
            &[
                ("text".to_string(), text.to_string()),
                ("viewer".to_string(), viewer.to_string()),
            ],
        )
    }

    fn record_reaction(&self, item_id: &str, emoji: &str, viewer: &str) -> Result<()> {
        self.post(
            &format!("/api/stories/{item_id}/reaction"),
            &[
                ("emoji".to_string(), emoji.to_string()),
                ("viewer".to_string(), viewer.to_string()),
            ],
        )
    }

    fn record_view(&self, item_id: &str, viewer: &str) -> Result<()> {
        self.post(
            &format!("/api/stories/{item_id}/view"),
            &[("viewer".to_string(), viewer.to_string())],
        )
    }
}

pub(crate) fn parse_feed_groups(raw: &str, now: DateTime<Utc>) -> Result<FeedParse> {
    let value: Value = serde_json::from_str(raw).context("feed response is not valid JSON")?;
    let groups_value = value
        .pointer("/data/groups")
        .and_then(Value::as_array)
        .context("feed response has no data.groups array")?;

    let mut parse = FeedParse {
        viewer_id: value
            .pointer("/data/viewerId")
            .and_then(Value::as_str)
            .map(str::to_string),
        ..FeedParse::default()
    };
    for group_value in groups_value {
        if let Some(group) = parse_group(group_value, now, &mut parse.warnings) {
            parse.groups.push(group);
        }
    }
    Ok(parse)
}

pub(crate) fn parse_author_group(raw: &str, now: DateTime<Utc>) -> Result<Option<AuthorGroup>> {
    let value: Value = serde_json::from_str(raw).context("author response is not valid JSON")?;
    let group_value = value
        .pointer("/data/group")
        .context("author response has no data.group field")?;
    if group_value.is_null() {
        return Ok(None);
    }
    let mut warnings = Vec::new();
    Ok(parse_group(group_value, now, &mut warnings))
}

fn parse_group(value: &Value, now: DateTime<Utc>, warnings: &mut Vec<String>) -> Option<AuthorGroup> {
    let author_id = non_empty_str(value, "authorId")?;
    let Some(author_handle) = non_empty_str(value, "authorHandle") else {
        warnings.push(format!("group {author_id}: missing author handle, skipped"));
        return None;
    };
    let avatar_url = value
        .get("avatarUrl")
        .and_then(Value::as_str)
        .map(str::to_string);

    let mut items = Vec::new();
    for item_value in value
        .get("stories")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
    {
        let Some(item) = parse_item(item_value, now, warnings) else {
            continue;
        };
        if item.author_id != author_id {
            warnings.push(format!(
                "story {} belongs to {}, found under {author_id}, skipped",
                item.id, item.author_id
            ));
            continue;
        }
        items.push(item);
    }
    if items.is_empty() {
        return None;
    }
    items.sort_by_key(|item| item.created_at);

    Some(AuthorGroup {
        author_id,
        author_handle,
        avatar_url,
        items,
    })
}

fn parse_item(value: &Value, now: DateTime<Utc>, warnings: &mut Vec<String>) -> Option<StoryItem> {
    let Some(id) = non_empty_str(value, "id") else {
        warnings.push("story without id, skipped".to_string());
        return None;
    };
    let Some(author_id) = non_empty_str(value, "authorId") else {
        warnings.push(format!("story {id}: missing authorId, skipped"));
        return None;
    };
    let author_handle = non_empty_str(value, "authorHandle").unwrap_or_else(|| author_id.clone());

    let Some(created_at) = parse_timestamp(value, "createdAt") else {
        warnings.push(format!("story {id}: unparseable createdAt, skipped"));
        return None;
    };
    let Some(expires_at) = parse_timestamp(value, "expiresAt") else {
        warnings.push(format!("story {id}: unparseable expiresAt, skipped"));
        return None;
    };
    if expires_at <= created_at {
        warnings.push(format!("story {id}: expires before it was created, skipped"));
        return None;
    }

    let content = parse_content(value, &id, warnings)?;

    let item = StoryItem {
        id,
        author_id,
        author_handle,
        created_at,
        expires_at,
        location: value
            .get("location")
            .and_then(Value::as_str)
            .map(str::to_string),
        content,
        views: u64_field(value, "views"),
        reaction_count: u64_field(value, "reactionsCount"),
        reply_count: u64_field(value, "repliesCount"),
        viewer_reaction: value
            .get("viewerReaction")
            .and_then(Value::as_str)
            .map(str::to_string),
        overlays: value
            .get("stickers")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default(),
    };
    // Expired items are routine, not worth a warning.
    item.is_active(now).then_some(item)
}

fn parse_content(value: &Value, id: &str, warnings: &mut Vec<String>) -> Option<StoryContent> {
    let media_type = value
        .get("mediaType")
        .and_then(Value::as_str)
        .unwrap_or("image");

    match media_type {
        "image" | "video" => {
            let Some(media_url) = non_empty_str(value, "mediaUrl") else {
                warnings.push(format!("story {id}: {media_type} without mediaUrl, skipped"));
                return None;
            };
            let caption = value.get("text").and_then(Value::as_str).map(str::to_string);
            if media_type == "video" {
                Some(StoryContent::Video { media_url, caption })
            } else {
                Some(StoryContent::Image { media_url, caption })
            }
        }
        "text" => {
            let Some(body) = non_empty_str(value, "text") else {
                warnings.push(format!("story {id}: text card without text, skipped"));
                return None;
            };
            Some(StoryContent::Text {
                body,
                color: value
                    .get("textColor")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                size: value
                    .get("textSize")
                    .and_then(Value::as_str)
                    .map(TextSize::parse)
                    .unwrap_or(TextSize::Medium),
            })
        }
        "poll" => {
            let Some(poll) = value.get("poll") else {
                warnings.push(format!("story {id}: poll without poll payload, skipped"));
                return None;
            };
            let Some(prompt) = non_empty_str(poll, "prompt") else {
                warnings.push(format!("story {id}: poll without prompt, skipped"));
                return None;
            };
            let mut options = Vec::new();
            for option in poll
                .get("options")
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or_default()
            {
                let Some(key) = non_empty_str(option, "key") else {
                    continue;
                };
                let label = non_empty_str(option, "label").unwrap_or_else(|| key.clone());
                options.push(PollOption {
                    key,
                    label,
                    votes: u64_field(option, "votes"),
                });
            }
            if !(2..=3).contains(&options.len()) {
                warnings.push(format!(
                    "story {id}: poll needs 2-3 options, has {}, skipped",
                    options.len()
                ));
                return None;
            }
            Some(StoryContent::Poll {
                prompt,
                options,
                viewer_vote: poll
                    .get("viewerVote")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            })
        }
        "question" => {
            let Some(question) = value.get("question") else {
                warnings.push(format!("story {id}: question without payload, skipped"));
                return None;
            };
            let Some(prompt) = non_empty_str(question, "prompt") else {
                warnings.push(format!("story {id}: question without prompt, skipped"));
                return None;
            };
            Some(StoryContent::Question {
                prompt,
                response_count: u64_field(question, "responsesCount"),
                viewer_answered: question
                    .get("viewerAnswered")
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
            })
        }
        other => {
            warnings.push(format!("story {id}: unknown media type {other}, skipped"));
            None
        }
    }
}

fn non_empty_str(value: &Value, field: &str) -> Option<String> {
    let raw = value.get(field)?.as_str()?.trim();
    if raw.is_empty() {
        return None;
    }
    Some(raw.to_string())
}

fn parse_timestamp(value: &Value, field: &str) -> Option<DateTime<Utc>> {
    let raw = value.get(field)?.as_str()?;
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|parsed| parsed.with_timezone(&Utc))
}

fn u64_field(value: &Value, field: &str) -> u64 {
    value.get(field).and_then(Value::as_u64).unwrap_or(0)
}
