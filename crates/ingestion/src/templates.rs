//! Ready-made VBML layouts for the producers

use chrono::{DateTime, Utc};
use contracts::{Align, Justify, Position, VbmlComponent, VbmlMessage, VbmlStyle, GRID_COLS};

/// Colour tile codes
pub mod colors {
    pub const RED: u8 = 63;
    pub const YELLOW: u8 = 65;
    pub const GREEN: u8 = 66;
    pub const BLUE: u8 = 67;
}

/// Repository event shown by the webhook producer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepoEvent {
    Star,
    IssueOpened,
    PullRequestClosed,
}

impl RepoEvent {
    fn header(self) -> (&'static str, u8) {
        match self {
            Self::Star => ("STARRED", colors::YELLOW),
            Self::IssueOpened => ("ISSUE OPENED", colors::RED),
            Self::PullRequestClosed => ("PR CLOSED", colors::GREEN),
        }
    }
}

/// Fields of a repository event card
#[derive(Debug, Clone)]
pub struct EventCard {
    pub event: RepoEvent,
    pub timestamp: DateTime<Utc>,
    pub repo: String,
    pub user: String,
    pub content: String,
}

fn line(template: String, style: VbmlStyle) -> VbmlComponent {
    VbmlComponent {
        template: Some(template),
        raw_characters: None,
        style: Some(style),
    }
}

fn at(x: u8, y: u8) -> Option<Position> {
    Some(Position { x, y })
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// Header (event + time), centred body, right-aligned repo and user
pub fn event_message(card: &EventCard) -> VbmlMessage {
    let (label, color) = card.event.header();
    let time = card.timestamp.format("%H:%M").to_string();

    let components = vec![
        line(
            format!("{{{color}}}{label}"),
            VbmlStyle {
                height: Some(1),
                width: Some(12),
                absolute_position: at(0, 0),
                ..VbmlStyle::default()
            },
        ),
        line(
            time,
            VbmlStyle {
                height: Some(1),
                width: Some(10),
                justify: Some(Justify::Right),
                absolute_position: at(12, 0),
                ..VbmlStyle::default()
            },
        ),
        line(
            card.content.clone(),
            VbmlStyle {
                height: Some(3),
                justify: Some(Justify::Center),
                align: Some(Align::Center),
                absolute_position: at(0, 1),
                ..VbmlStyle::default()
            },
        ),
        line(
            card.repo.clone(),
            VbmlStyle {
                height: Some(1),
                justify: Some(Justify::Right),
                absolute_position: at(0, 4),
                ..VbmlStyle::default()
            },
        ),
        line(
            card.user.clone(),
            VbmlStyle {
                height: Some(1),
                justify: Some(Justify::Right),
                absolute_position: at(0, 5),
                ..VbmlStyle::default()
            },
        ),
    ];

    VbmlMessage {
        components,
        ..VbmlMessage::default()
    }
}

/// Social post card: blue tile + name, handle, three lines of text
pub fn social_post(display_name: &str, handle: &str, text: &str) -> VbmlMessage {
    let width = GRID_COLS as u8;
    let left = |height: u8, y: u8| VbmlStyle {
        height: Some(height),
        width: Some(width),
        justify: Some(Justify::Left),
        absolute_position: at(0, y),
        ..VbmlStyle::default()
    };

    VbmlMessage {
        components: vec![
            line(
                format!("{{{}}}{}", colors::BLUE, truncate(display_name, GRID_COLS - 1)),
                left(1, 0),
            ),
            line(format!("@{}", truncate(handle, GRID_COLS - 1)), left(1, 1)),
            line(truncate(text, GRID_COLS * 3), left(3, 3)),
        ],
        ..VbmlMessage::default()
    }
}

/// Telescope drawing shown by the hello producer
pub fn telescope() -> VbmlMessage {
    const B: u8 = colors::BLUE;
    const Y: u8 = colors::YELLOW;
    let rows: Vec<Vec<u8>> = vec![
        vec![0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, Y, Y, 0, 0, 0],
        vec![0, 0, 0, Y, Y, 0, 0, 0, 0, B, B, 0, 0, B, B, 0, 0, Y, Y, 0, 0, 0],
        vec![0, 0, 0, Y, Y, Y, Y, 0, B, B, B, B, B, B, B, B, 0, Y, Y, 0, 0, 0],
        vec![0, 0, 0, Y, Y, Y, Y, 0, B, B, B, Y, Y, Y, B, B, 0, Y, Y, 0, 0, 0],
        vec![0, 0, 0, Y, Y, 0, 0, 0, 0, B, 0, Y, 0, Y, 0, B, 0, Y, Y, 0, 0, 0],
        vec![0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, Y, Y, Y, 0, 0, 0, Y, Y, 0, 0, 0],
    ];

    VbmlMessage {
        components: vec![VbmlComponent {
            template: None,
            raw_characters: Some(rows),
            style: Some(VbmlStyle {
                height: Some(6),
                width: Some(GRID_COLS as u8),
                absolute_position: at(0, 0),
                ..VbmlStyle::default()
            }),
        }],
        ..VbmlMessage::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use contracts::Grid;

    #[test]
    fn test_event_message_header() {
        let card = EventCard {
            event: RepoEvent::IssueOpened,
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 9, 7, 0).unwrap(),
            repo: "board".into(),
            user: "octocat".into(),
            content: "Crash on start".into(),
        };
        let message = event_message(&card);

        assert_eq!(message.components.len(), 5);
        assert_eq!(message.components[0].template.as_deref(), Some("{63}ISSUE OPENED"));
        assert_eq!(message.components[1].template.as_deref(), Some("09:07"));
        assert_eq!(message.components[2].template.as_deref(), Some("Crash on start"));
    }

    #[test]
    fn test_social_post_truncates() {
        let long = "x".repeat(100);
        let message = social_post(&long, &long, &long);
        let name = message.components[0].template.as_deref().unwrap();
        assert_eq!(name, format!("{{67}}{}", "x".repeat(21)));
        assert_eq!(message.components[1].template.as_deref().unwrap().chars().count(), 22);
        assert_eq!(message.components[2].template.as_deref().unwrap().len(), 66);
    }

    #[test]
    fn test_telescope_is_a_valid_grid() {
        let message = telescope();
        let rows = message.components[0].raw_characters.clone().unwrap();
        let rows: Vec<Vec<i64>> = rows
            .into_iter()
            .map(|row| row.into_iter().map(i64::from).collect())
            .collect();
        let grid = Grid::try_from(rows).unwrap();
        assert!(grid.filled_cells() > 0);
    }
}
