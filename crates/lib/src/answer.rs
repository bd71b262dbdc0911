//! Analysis-service answer: wire shape and its validated form.
//!
//! The service replies with a loosely typed JSON object keyed by `answer_type`.
//! [`RawAnswer`] mirrors that object field for field; [`Answer::classify`] turns it
//! into a closed [`Answer`] so rendering never sees an unknown kind.

use serde::{Deserialize, Deserializer, Serialize};

/// Action button attached to a hero card (`type`, `title`, `value` on the wire).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Button {
    /// Bot Framework action type, e.g. `imBack`, `postBack`, `openUrl`.
    #[serde(rename = "type", alias = "kind")]
    pub kind: String,
    pub title: String,
    pub value: String,
}

impl Button {
    pub fn new(kind: impl Into<String>, title: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            title: title.into(),
            value: value.into(),
        }
    }
}

/// Image reference; the service sends it as `{ "img_url": ... }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    #[serde(rename = "img_url", alias = "url")]
    pub url: String,
}

/// Answer exactly as decoded from the analysis service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawAnswer {
    #[serde(default, alias = "answerType", deserialize_with = "null_as_empty")]
    pub answer_type: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub answer: String,
    #[serde(default, alias = "cardData")]
    pub card_data: serde_json::Value,
    #[serde(default)]
    pub buttons: Option<Vec<Button>>,
    #[serde(default)]
    pub images: Option<Vec<ImageRef>>,
    #[serde(default, alias = "unaccounted_text", alias = "unaccountedText")]
    pub unaccounted: Option<String>,
    #[serde(default, alias = "additionButtons")]
    pub addition_buttons: Option<Vec<Button>>,
}

/// The service sends `null` for fields that do not apply to the answer kind.
fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Primary content of an answer, one variant per supported `answer_type`.
#[derive(Debug, Clone, PartialEq)]
pub enum AnswerKind {
    Text(String),
    HeroCard {
        text: String,
        buttons: Vec<Button>,
        images: Vec<ImageRef>,
    },
    /// Card data is opaque and handed to the channel untouched.
    AdaptiveCard(serde_json::Value),
}

impl AnswerKind {
    pub fn name(&self) -> &'static str {
        match self {
            AnswerKind::Text(_) => "text",
            AnswerKind::HeroCard { .. } => "hero_card",
            AnswerKind::AdaptiveCard(_) => "adaptive_card",
        }
    }
}

/// Validated answer: a known primary kind plus the optional trailing parts.
#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    pub kind: AnswerKind,
    pub unaccounted: Option<String>,
    pub addition_buttons: Option<Vec<Button>>,
}

/// The answer declared an `answer_type` with no rendering strategy.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported answer type: {0:?}")]
pub struct UnsupportedAnswerType(pub String);

impl Answer {
    /// Validate the wire answer. Fields that do not belong to the declared kind are dropped.
    pub fn classify(raw: RawAnswer) -> Result<Self, UnsupportedAnswerType> {
        let kind = match raw.answer_type.as_str() {
            "text" => AnswerKind::Text(raw.answer),
            "hero_card" | "heroCard" => AnswerKind::HeroCard {
                text: raw.answer,
                buttons: raw.buttons.unwrap_or_default(),
                images: raw.images.unwrap_or_default(),
            },
            "adaptive_card" | "adaptiveCard" => AnswerKind::AdaptiveCard(raw.card_data),
            other => return Err(UnsupportedAnswerType(other.to_string())),
        };
        Ok(Self {
            kind,
            unaccounted: raw.unaccounted,
            addition_buttons: raw.addition_buttons,
        })
    }
}

impl TryFrom<RawAnswer> for Answer {
    type Error = UnsupportedAnswerType;

    fn try_from(raw: RawAnswer) -> Result<Self, Self::Error> {
        Answer::classify(raw)
    }
}
