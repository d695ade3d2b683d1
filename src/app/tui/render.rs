use std::collections::HashSet;

use chrono::{DateTime, Utc};
use ratatui::Frame;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{
    Block, BorderType, Borders, Cell, Clear, Gauge, Padding, Paragraph, Row, Table, TableState,
    Wrap,
};

use super::super::player::{ITEM_DURATION_MS, PlaybackSession};
use super::super::story::{AuthorGroup, StoryContent, StoryItem, TextSize, format_recency, truncate};

pub(super) struct ViewerLayout {
    pub(super) progress: Rect,
    pub(super) header: Rect,
    pub(super) content: Rect,
    pub(super) controls: Rect,
    pub(super) status: Rect,
}

pub(super) fn viewer_layout(area: Rect) -> ViewerLayout {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Length(2),
            Constraint::Min(8),
            Constraint::Length(3),
            Constraint::Length(3),
        ])
        .split(area);
    ViewerLayout {
        progress: chunks[0],
        header: chunks[1],
        content: chunks[2],
        controls: chunks[3],
        status: chunks[4],
    }
}

/// Where the poll/question widget sits inside the content area. Gestures
/// starting here belong to the widget, not to navigation.
pub(super) fn poll_widget_rect(content: Rect) -> Rect {
    let width = content.width.saturating_mul(3) / 5;
    let width = width.clamp(1, content.width.max(1));
    let height = (content.height / 2).max(1).min(content.height.max(1));
    let x = content.x + (content.width.saturating_sub(width)) / 2;
    let y = content.y + content.height.saturating_sub(height);
    Rect::new(x, y, width, height)
}

pub(super) fn draw_roster(
    frame: &mut Frame,
    groups: &[AuthorGroup],
    roster: &[usize],
    table_state: &mut TableState,
    viewed: &HashSet<String>,
    status: &str,
    now: DateTime<Utc>,
) {
    let bg = Block::default().style(Style::default().bg(Color::Black));
    frame.render_widget(bg, frame.area());

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(8),
            Constraint::Length(3),
            Constraint::Length(3),
        ])
        .split(frame.area());

    let header = Paragraph::new(Line::from(vec![
        Span::styled(
            "STORYDECK",
            Style::default()
                .fg(Color::Rgb(110, 170, 255))
                .add_modifier(Modifier::BOLD),
        ),
        Span::styled("   ", Style::default()),
        Span::styled(
            format!("{} authors", roster.len()),
            Style::default().fg(Color::Rgb(185, 195, 210)),
        ),
    ]))
    .alignment(Alignment::Center)
    .block(panel_block("Feed"));
    frame.render_widget(header, chunks[0]);

    let body_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(64), Constraint::Percentage(36)])
        .split(chunks[1]);

    let rows: Vec<Row> = roster
        .iter()
        .filter_map(|&idx| groups.get(idx))
        .map(|group| {
            let unseen = unseen_count(group, viewed);
            let activity = group
                .latest_created_at()
                .map(|latest| format_recency(latest, now))
                .unwrap_or_else(|| "-".to_string());
            let marker = if unseen > 0 { "●" } else { " " };
            Row::new(vec![
                Cell::from(format!("{marker} {}", truncate(&group.author_handle, 28))),
                Cell::from(group.items.len().to_string()),
                Cell::from(unseen.to_string()),
                Cell::from(activity),
            ])
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Percentage(46),
            Constraint::Length(9),
            Constraint::Length(8),
            Constraint::Length(20),
        ],
    )
    .header(
        Row::new(vec!["Author", "Stories", "Unseen", "Activity"]).style(
            Style::default()
                .fg(Color::Rgb(110, 170, 255))
                .add_modifier(Modifier::BOLD),
        ),
    )
    .block(panel_block("Authors"))
    .row_highlight_style(
        Style::default()
            .bg(Color::Rgb(110, 170, 255))
            .fg(Color::Black)
            .add_modifier(Modifier::BOLD),
    )
    .highlight_symbol("▸ ");
    frame.render_stateful_widget(table, body_chunks[0], table_state);

    let selection_text = match table_state
        .selected()
        .and_then(|idx| roster.get(idx))
        .and_then(|&group_idx| groups.get(group_idx))
    {
        Some(group) => {
            let unseen = unseen_count(group, viewed);
            let activity = group
                .latest_created_at()
                .map(|latest| format_recency(latest, now))
                .unwrap_or_else(|| "-".to_string());
            let kinds: Vec<&str> = group
                .items
                .iter()
                .map(|item| item.content.kind_label())
                .collect();
            format!(
                "Author\n{}\n\nStories\n{} ({} unseen)\n\nKinds\n{}\n\nActivity\n{}",
                truncate(&group.author_handle, 32),
                group.items.len(),
                unseen,
                truncate(&kinds.join(", "), 40),
                activity,
            )
        }
        None => "No stories in the feed right now.\n\nPress g to refresh.".to_string(),
    };
    let selection = Paragraph::new(selection_text)
        .style(Style::default().fg(Color::Rgb(230, 230, 230)))
        .block(panel_block("Selected"))
        .alignment(Alignment::Left);
    frame.render_widget(selection, body_chunks[1]);

    let controls = Paragraph::new("↑/↓ move  Enter watch  g refresh  q quit")
        .style(Style::default().fg(Color::Rgb(185, 195, 210)))
        .alignment(Alignment::Center)
        .block(panel_block("Controls"));
    frame.render_widget(controls, chunks[2]);

    let status_widget = Paragraph::new(status.to_string())
        .style(status_style(status))
        .block(panel_block("Status"));
    frame.render_widget(status_widget, chunks[3]);
}

fn unseen_count(group: &AuthorGroup, viewed: &HashSet<String>) -> usize {
    group
        .items
        .iter()
        .filter(|item| !viewed.contains(&item.id))
        .count()
}

pub(super) fn draw_viewer(
    frame: &mut Frame,
    session: &PlaybackSession,
    status: &str,
    answer_draft: Option<&str>,
    now: DateTime<Utc>,
) {
    let bg = Block::default().style(Style::default().bg(Color::Black));
    frame.render_widget(bg, frame.area());

    let layout = viewer_layout(frame.area());
    let Some((group, item)) = session.current() else {
        return;
    };

    draw_progress_row(frame, layout.progress, group.items.len(), session);

    let remaining_secs = ITEM_DURATION_MS.saturating_sub(session.elapsed_ms()).div_ceil(1000);
    let mut header_spans = vec![
        Span::styled(
            format!("{}/{}  ", session.group_index() + 1, session.groups().len()),
            Style::default().fg(Color::Rgb(125, 135, 150)),
        ),
        Span::styled(
            group.author_handle.clone(),
            Style::default()
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        ),
        Span::styled(
            format!("  {}", format_recency(item.created_at, now)),
            Style::default().fg(Color::Rgb(185, 195, 210)),
        ),
        Span::styled(
            format!("  {remaining_secs}s"),
            Style::default().fg(Color::Rgb(125, 135, 150)),
        ),
    ];
    if let Some(location) = &item.location {
        header_spans.push(Span::styled(
            format!("  @{location}"),
            Style::default().fg(Color::Rgb(185, 195, 210)),
        ));
    }
    if session.paused() {
        header_spans.push(Span::styled(
            "  ⏸ paused",
            Style::default().fg(Color::Yellow),
        ));
    }
    if session.voting_in_progress() {
        header_spans.push(Span::styled(
            "  sending…",
            Style::default().fg(Color::Rgb(205, 165, 255)),
        ));
    }
    if item.content.is_video() {
        let audio = if session.muted() { "🔇" } else { "🔊" };
        header_spans.push(Span::styled(
            format!("  {audio}"),
            Style::default().fg(Color::Rgb(185, 195, 210)),
        ));
    }
    let counters = format!(
        "{} views  {} reactions  {} replies",
        item.views, item.reaction_count, item.reply_count
    );
    let header = Paragraph::new(vec![
        Line::from(header_spans),
        Line::from(Span::styled(
            counters,
            Style::default().fg(Color::Rgb(125, 135, 150)),
        )),
    ]);
    frame.render_widget(header, layout.header);

    draw_content(frame, layout.content, session.muted(), item);

    let controls = Paragraph::new(controls_line(&item.content))
        .style(Style::default().fg(Color::Rgb(185, 195, 210)))
        .alignment(Alignment::Center)
        .block(panel_block("Controls"));
    frame.render_widget(controls, layout.controls);

    let status_widget = Paragraph::new(status.to_string())
        .style(status_style(status))
        .block(panel_block("Status"));
    frame.render_widget(status_widget, layout.status);

    if let Some(draft) = answer_draft {
        draw_answer_popup(frame, &group.author_handle, draft);
    }
}

fn draw_progress_row(frame: &mut Frame, area: Rect, item_count: usize, session: &PlaybackSession) {
    if item_count == 0 || area.width == 0 {
        return;
    }
    let constraints = vec![Constraint::Ratio(1, item_count as u32); item_count];
    let segments = Layout::default()
        .direction(Direction::Horizontal)
        .constraints(constraints)
        .split(area);
    for (idx, segment) in segments.iter().enumerate() {
        let cell = shrink_right(*segment);
        let ratio = if idx < session.item_index() {
            1.0
        } else if idx == session.item_index() {
            session.progress() / 100.0
        } else {
            0.0
        };
        let gauge = Gauge::default()
            .gauge_style(
                Style::default()
                    .fg(Color::Rgb(130, 190, 255))
                    .bg(Color::Rgb(40, 44, 52)),
            )
            .label("")
            .ratio(ratio.clamp(0.0, 1.0));
        frame.render_widget(gauge, cell);
    }
}

fn shrink_right(area: Rect) -> Rect {
    if area.width > 1 {
        Rect::new(area.x, area.y, area.width - 1, area.height)
    } else {
        area
    }
}

fn draw_content(frame: &mut Frame, area: Rect, muted: bool, item: &StoryItem) {
    match &item.content {
        StoryContent::Image { media_url, caption } => {
            draw_media_card(frame, area, "IMAGE", media_url, caption.as_deref(), item);
        }
        StoryContent::Video { media_url, caption } => {
            let tag = if muted { "VIDEO (muted)" } else { "VIDEO" };
            draw_media_card(frame, area, tag, media_url, caption.as_deref(), item);
        }
        StoryContent::Text { body, color, size } => {
            let style = Style::default()
                .fg(text_card_color(color.as_deref()))
                .add_modifier(match size {
                    TextSize::Large => Modifier::BOLD,
                    TextSize::Small | TextSize::Medium => Modifier::empty(),
                });
            let card = Paragraph::new(body.clone())
                .style(style)
                .alignment(Alignment::Center)
                .wrap(Wrap { trim: true })
                .block(panel_block("Story").padding(Padding::new(4, 4, 2, 2)));
            frame.render_widget(card, area);
        }
        StoryContent::Poll {
            prompt,
            options,
            viewer_vote,
        } => {
            let backdrop = panel_block("Poll");
            frame.render_widget(backdrop, area);

            let widget_area = poll_widget_rect(area);
            let total: u64 = options.iter().map(|option| option.votes).sum();
            let mut lines = vec![
                Line::from(Span::styled(
                    prompt.clone(),
                    Style::default()
                        .fg(Color::White)
                        .add_modifier(Modifier::BOLD),
                )),
                Line::from(""),
            ];
            for (idx, option) in options.iter().enumerate() {
                let share = if total > 0 {
                    (option.votes as f64 / total as f64 * 100.0).round() as u64
                } else {
                    0
                };
                let marker = if viewer_vote.as_deref() == Some(option.key.as_str()) {
                    "✓"
                } else {
                    " "
                };
                let style = if viewer_vote.as_deref() == Some(option.key.as_str()) {
                    Style::default()
                        .fg(Color::Rgb(130, 190, 255))
                        .add_modifier(Modifier::BOLD)
                } else {
                    Style::default().fg(Color::Rgb(230, 230, 230))
                };
                lines.push(Line::from(Span::styled(
                    format!(
                        "{marker} [{}] {}  {} votes ({share}%)",
                        idx + 1,
                        option.label,
                        option.votes
                    ),
                    style,
                )));
            }
            lines.push(Line::from(""));
            let hint = if viewer_vote.is_some() {
                "voted"
            } else {
                "press 1-3 to vote"
            };
            lines.push(Line::from(Span::styled(
                hint,
                Style::default().fg(Color::Rgb(125, 135, 150)),
            )));

            let widget = Paragraph::new(lines)
                .alignment(Alignment::Left)
                .wrap(Wrap { trim: true })
                .block(modal_block("Tap-safe zone"));
            frame.render_widget(Clear, widget_area);
            frame.render_widget(widget, widget_area);
        }
        StoryContent::Question {
            prompt,
            response_count,
            viewer_answered,
        } => {
            let backdrop = panel_block("Question");
            frame.render_widget(backdrop, area);

            let widget_area = poll_widget_rect(area);
            let hint = if *viewer_answered {
                "answered".to_string()
            } else {
                "press a to answer".to_string()
            };
            let lines = vec![
                Line::from(Span::styled(
                    prompt.clone(),
                    Style::default()
                        .fg(Color::White)
                        .add_modifier(Modifier::BOLD),
                )),
                Line::from(""),
                Line::from(Span::styled(
                    format!("{response_count} responses"),
                    Style::default().fg(Color::Rgb(185, 195, 210)),
                )),
                Line::from(Span::styled(
                    hint,
                    Style::default().fg(Color::Rgb(125, 135, 150)),
                )),
            ];
            let widget = Paragraph::new(lines)
                .alignment(Alignment::Left)
                .wrap(Wrap { trim: true })
                .block(modal_block("Tap-safe zone"));
            frame.render_widget(Clear, widget_area);
            frame.render_widget(widget, widget_area);
        }
    }
}

fn draw_media_card(
    frame: &mut Frame,
    area: Rect,
    tag: &str,
    media_url: &str,
    caption: Option<&str>,
    item: &super::super::story::StoryItem,
) {
    let mut lines = vec![
        Line::from(Span::styled(
            format!("[{tag}]"),
            Style::default()
                .fg(Color::Rgb(110, 170, 255))
                .add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from(Span::styled(
            truncate(media_url, 72),
            Style::default().fg(Color::Rgb(125, 135, 150)),
        )),
    ];
    if let Some(caption) = caption {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            caption.to_string(),
            Style::default()
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )));
    }
    if let Some(reaction) = &item.viewer_reaction {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            format!("you reacted {reaction}"),
            Style::default().fg(Color::Rgb(205, 165, 255)),
        )));
    }
    let card = Paragraph::new(lines)
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true })
        .block(panel_block("Story").padding(Padding::new(2, 2, 1, 1)));
    frame.render_widget(card, area);
}

fn text_card_color(raw: Option<&str>) -> Color {
    match raw {
        Some(value) => parse_hex_color(value).unwrap_or(Color::White),
        None => Color::White,
    }
}

fn parse_hex_color(value: &str) -> Option<Color> {
    let hex = value.trim().strip_prefix('#')?;
    if hex.len() != 6 {
        return None;
    }
    let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
    let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
    let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
    Some(Color::Rgb(r, g, b))
}

fn controls_line(content: &StoryContent) -> &'static str {
    match content {
        StoryContent::Poll { .. } => {
            "←/→ story  ↑/↓ author  Space pause  1-3 vote  r react  q close"
        }
        StoryContent::Question { .. } => {
            "←/→ story  ↑/↓ author  Space pause  a answer  r react  q close"
        }
        StoryContent::Video { .. } => {
            "←/→ story  ↑/↓ author  Space pause  m mute  r react  q close"
        }
        _ => "←/→ story  ↑/↓ author  Space pause  r react  q close",
    }
}

fn draw_answer_popup(frame: &mut Frame, author_handle: &str, draft: &str) {
    let text = format!(
        "Reply to {author_handle}\n\n> {draft}_\n\n[Enter] Send   [Esc] Cancel"
    );
    let popup_area = popup_rect_for_text(frame.area(), &text);
    render_popup_shadow(frame, popup_area);
    frame.render_widget(Clear, popup_area);
    let popup = Paragraph::new(text)
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true })
        .block(modal_block("Answer"));
    frame.render_widget(popup, popup_area);
}

fn panel_block(title: &'static str) -> Block<'static> {
    Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(Color::Rgb(125, 135, 150)))
        .title(title)
}

fn modal_block(title: &'static str) -> Block<'static> {
    Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(
            Style::default()
                .fg(Color::Rgb(160, 190, 235))
                .add_modifier(Modifier::BOLD),
        )
        .title(title)
        .padding(Padding::new(2, 2, 1, 1))
}

fn status_style(status: &str) -> Style {
    if status.starts_with("ERROR:") {
        Style::default()
            .fg(Color::Rgb(255, 145, 120))
            .add_modifier(Modifier::BOLD)
    } else if status.starts_with("INFO:") {
        Style::default().fg(Color::Rgb(205, 165, 255))
    } else {
        Style::default().fg(Color::Rgb(230, 235, 242))
    }
}

fn centered_fixed_rect(width: u16, height: u16, area: Rect) -> Rect {
    let clamped_width = width.min(area.width.max(1));
    let clamped_height = height.min(area.height.max(1));
    let x = area.x + area.width.saturating_sub(clamped_width) / 2;
    let y = area.y + area.height.saturating_sub(clamped_height) / 2;
    Rect::new(x, y, clamped_width, clamped_height)
}

fn render_popup_shadow(frame: &mut Frame, popup_area: Rect) {
    let area = frame.area();
    let shadow = Rect::new(
        (popup_area.x + 1).min(area.x + area.width.saturating_sub(1)),
        (popup_area.y + 1).min(area.y + area.height.saturating_sub(1)),
        popup_area.width.saturating_sub(1),
        popup_area.height.saturating_sub(1),
    );
    if shadow.width == 0 || shadow.height == 0 {
        return;
    }
    let shadow_block = Block::default().style(Style::default().bg(Color::Rgb(14, 16, 24)));
    frame.render_widget(shadow_block, shadow);
}

fn popup_rect_for_text(area: Rect, text: &str) -> Rect {
    let max_line_width = text
        .lines()
        .map(|line| line.chars().count() as u16)
        .max()
        .unwrap_or(0);
    let line_count = text.lines().count() as u16;

    let available_width = area.width.saturating_sub(2).max(1);
    let min_width = 48.min(available_width);
    let max_width = 72.min(available_width);
    let desired_width = max_line_width.saturating_add(12);
    let width = desired_width.clamp(min_width, max_width);

    let available_height = area.height.saturating_sub(2).max(1);
    let min_height = 10.min(available_height);
    let max_height = 18.min(available_height);
    let desired_height = line_count.saturating_add(6);
    let height = desired_height.clamp(min_height, max_height);

    centered_fixed_rect(width, height, area)
}
