//! PayloadFormatter trait and the VBML message model
//!
//! A formatter turns a structured text layout into a board [`Grid`].

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::{FormatError, Grid, GRID_COLS, GRID_ROWS};

/// Horizontal justification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Justify {
    Left,
    Right,
    Center,
    Justified,
}

/// Vertical alignment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Align {
    Top,
    Bottom,
    Center,
    Justified,
}

/// Absolute cell position of a component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub x: u8,
    pub y: u8,
}

/// Component layout style
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VbmlStyle {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub justify: Option<Justify>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub align: Option<Align>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub absolute_position: Option<Position>,
}

/// One layout component: a text template or raw character codes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VbmlComponent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_characters: Option<Vec<Vec<u8>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<VbmlStyle>,
}

/// Structured layout request understood by the formatting service
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VbmlMessage {
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub props: HashMap<String, String>,
    pub components: Vec<VbmlComponent>,
}

impl VbmlMessage {
    /// Full-board text, centered both ways
    pub fn centered(text: impl Into<String>) -> Self {
        Self {
            props: HashMap::new(),
            components: vec![VbmlComponent {
                template: Some(text.into()),
                raw_characters: None,
                style: Some(VbmlStyle {
                    height: Some(GRID_ROWS as u8),
                    width: Some(GRID_COLS as u8),
                    justify: Some(Justify::Center),
                    align: Some(Align::Center),
                    absolute_position: None,
                }),
            }],
        }
    }

    /// Full-board raw character codes
    pub fn raw(grid: &Grid) -> Self {
        Self {
            props: HashMap::new(),
            components: vec![VbmlComponent {
                template: None,
                raw_characters: Some(grid.to_vec()),
                style: Some(VbmlStyle {
                    height: Some(GRID_ROWS as u8),
                    width: Some(GRID_COLS as u8),
                    absolute_position: Some(Position { x: 0, y: 0 }),
                    ..Default::default()
                }),
            }],
        }
    }

    /// Concatenated template text, used for moderation
    pub fn text(&self) -> String {
        self.components
            .iter()
            .filter_map(|c| c.template.as_deref())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Text layout to grid conversion
#[trait_variant::make(PayloadFormatter: Send)]
pub trait LocalPayloadFormatter {
    /// Compose a layout into a grid
    ///
    /// # Errors
    /// Request failures or an invalid layout from the service
    async fn format(&self, message: &VbmlMessage) -> Result<Grid, FormatError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_centered_serializes_camel_case() {
        let msg = VbmlMessage::centered("HELLO");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["components"][0]["template"], "HELLO");
        assert_eq!(json["components"][0]["style"]["justify"], "center");
        assert!(json.get("props").is_none());

        let raw = VbmlMessage::raw(&Grid::blank());
        let json = serde_json::to_value(&raw).unwrap();
        assert!(json["components"][0]["rawCharacters"].is_array());
        assert_eq!(json["components"][0]["style"]["absolutePosition"]["x"], 0);
    }

    #[test]
    fn test_text_joins_templates() {
        let mut msg = VbmlMessage::centered("LINE ONE");
        msg.components.push(VbmlComponent {
            template: Some("LINE TWO".into()),
            ..Default::default()
        });
        assert_eq!(msg.text(), "LINE ONE\nLINE TWO");
    }
}
