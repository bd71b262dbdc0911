//! Outbound message descriptors produced by the dispatcher and consumed by a [`MessageSender`].
//!
//! [`MessageSender`]: crate::channels::MessageSender

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::answer::{Button, ImageRef};

pub const HERO_CARD_CONTENT_TYPE: &str = "application/vnd.microsoft.card.hero";
pub const ADAPTIVE_CARD_CONTENT_TYPE: &str = "application/vnd.microsoft.card.adaptive";

/// Card button as the channel expects it: `{ "type", "title", "value" }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardAction {
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub value: String,
}

impl From<&Button> for CardAction {
    fn from(b: &Button) -> Self {
        Self {
            kind: b.kind.clone(),
            title: b.title.clone(),
            value: b.value.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardImage {
    pub url: String,
}

impl From<&ImageRef> for CardImage {
    fn from(img: &ImageRef) -> Self {
        Self { url: img.url.clone() }
    }
}

/// Hero card content. The title is always empty for bot answers but kept on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeroCard {
    pub title: String,
    pub text: String,
    pub images: Vec<CardImage>,
    pub buttons: Vec<CardAction>,
}

impl HeroCard {
    /// Hero card with an empty title, mapping buttons and images in order.
    pub fn new(text: impl Into<String>, buttons: &[Button], images: &[ImageRef]) -> Self {
        Self {
            title: String::new(),
            text: text.into(),
            images: images.iter().map(CardImage::from).collect(),
            buttons: buttons.iter().map(CardAction::from).collect(),
        }
    }

    /// Attachment content in the connector's hero card shape.
    pub fn content(&self) -> Value {
        let images: Vec<Value> = self.images.iter().map(|i| json!({ "url": i.url })).collect();
        let buttons: Vec<Value> = self
            .buttons
            .iter()
            .map(|b| json!({ "type": b.kind, "title": b.title, "value": b.value }))
            .collect();
        json!({
            "title": self.title,
            "text": self.text,
            "images": images,
            "buttons": buttons,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Card {
    Hero(HeroCard),
    Adaptive(Value),
}

/// Single card attachment (`contentType` + `content`). Inbound file attachments may omit `content`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    #[serde(default)]
    pub content_type: String,
    #[serde(default)]
    pub content: Value,
}

impl Card {
    pub fn attachment(&self) -> Attachment {
        match self {
            Card::Hero(hero) => Attachment {
                content_type: HERO_CARD_CONTENT_TYPE.to_string(),
                content: hero.content(),
            },
            Card::Adaptive(data) => Attachment {
                content_type: ADAPTIVE_CARD_CONTENT_TYPE.to_string(),
                content: data.clone(),
            },
        }
    }
}

/// Trace payload; only the emulator renders it.
#[derive(Debug, Clone, PartialEq)]
pub struct Trace {
    pub name: String,
    pub label: String,
    pub value_type: String,
    pub value: Value,
}

/// One message to deliver to the user, in send order.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundMessage {
    Typing,
    Text(String),
    /// A card is always delivered as a one-item carousel.
    Card(Card),
    Trace(Trace),
}

impl OutboundMessage {
    pub fn text(body: impl Into<String>) -> Self {
        OutboundMessage::Text(body.into())
    }

    pub fn hero(card: HeroCard) -> Self {
        OutboundMessage::Card(Card::Hero(card))
    }

    pub fn adaptive(data: Value) -> Self {
        OutboundMessage::Card(Card::Adaptive(data))
    }

    /// Short kind name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            OutboundMessage::Typing => "typing",
            OutboundMessage::Text(_) => "text",
            OutboundMessage::Card(Card::Hero(_)) => "hero_card",
            OutboundMessage::Card(Card::Adaptive(_)) => "adaptive_card",
            OutboundMessage::Trace(_) => "trace",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hero_attachment_wire_shape() {
        let card = HeroCard::new(
            "Pick one",
            &[Button::new("postBack", "Yes", "y")],
            &[ImageRef { url: "https://example.com/a.png".into() }],
        );
        let att = Card::Hero(card).attachment();
        assert_eq!(att.content_type, HERO_CARD_CONTENT_TYPE);
        assert_eq!(
            att.content,
            json!({
                "title": "",
                "text": "Pick one",
                "images": [{"url": "https://example.com/a.png"}],
                "buttons": [{"type": "postBack", "title": "Yes", "value": "y"}]
            })
        );
    }

    #[test]
    fn hero_content_matches_serialized_card() {
        let card = HeroCard::new(
            "",
            &[Button::new("imBack", "Retry", "retry")],
            &[],
        );
        let serialized = serde_json::to_value(&card).expect("serialize");
        assert_eq!(card.content(), serialized);
        assert_eq!(card.content()["buttons"][0]["type"], "imBack");
    }

    #[test]
    fn adaptive_attachment_is_verbatim() {
        let data = json!({"type": "AdaptiveCard", "version": "1.0", "body": [{"type": "TextBlock", "text": "hi"}]});
        let att = Card::Adaptive(data.clone()).attachment();
        assert_eq!(att.content_type, ADAPTIVE_CARD_CONTENT_TYPE);
        assert_eq!(att.content, data);
        let wire = serde_json::to_string(&att).expect("serialize");
        assert!(wire.contains(r#""contentType":"application/vnd.microsoft.card.adaptive""#));
    }
}
