//! Bot Framework activity envelope (inbound and outbound) and reply rendering.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::message::{Attachment, OutboundMessage};

pub const ACTIVITY_MESSAGE: &str = "message";
pub const ACTIVITY_TYPING: &str = "typing";
pub const ACTIVITY_TRACE: &str = "trace";
pub const ACTIVITY_CONVERSATION_UPDATE: &str = "conversationUpdate";

const CAROUSEL: &str = "carousel";

/// User or bot identity on a channel.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelAccount {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

impl ChannelAccount {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }
}

/// Conversation identity. Channel-specific fields (tenantId, isGroup, ...) are echoed back verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationAccount {
    pub id: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Subset of the Bot Framework activity schema used by this bot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation: Option<ConversationAccount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<ChannelAccount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<ChannelAccount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment_layout: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub members_added: Vec<ChannelAccount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

/// Where replies for one turn go: taken from the inbound activity with from/recipient swapped.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationRef {
    pub channel_id: String,
    pub service_url: String,
    pub conversation: ConversationAccount,
    /// The bot's own account (inbound `recipient`).
    pub bot: ChannelAccount,
    /// The user's account (inbound `from`).
    pub user: ChannelAccount,
    /// Inbound activity id, used as `replyToId`.
    pub activity_id: Option<String>,
}

impl ConversationRef {
    /// None when the activity lacks a service URL or a conversation.
    pub fn from_activity(activity: &Activity) -> Option<Self> {
        let service_url = activity
            .service_url
            .as_ref()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())?;
        let conversation = activity.conversation.clone()?;
        Some(Self {
            channel_id: activity.channel_id.clone().unwrap_or_default(),
            service_url,
            conversation,
            bot: activity.recipient.clone().unwrap_or_default(),
            user: activity.from.clone().unwrap_or_default(),
            activity_id: activity.id.clone(),
        })
    }

    /// Render an outbound message as a reply activity in this conversation.
    pub fn reply(&self, message: &OutboundMessage) -> Activity {
        let mut activity = Activity {
            kind: ACTIVITY_MESSAGE.to_string(),
            channel_id: Some(self.channel_id.clone()),
            service_url: Some(self.service_url.clone()),
            conversation: Some(self.conversation.clone()),
            from: Some(self.bot.clone()),
            recipient: Some(self.user.clone()),
            reply_to_id: self.activity_id.clone(),
            ..Default::default()
        };
        match message {
            OutboundMessage::Typing => {
                activity.kind = ACTIVITY_TYPING.to_string();
            }
            OutboundMessage::Text(text) => {
                activity.text = Some(text.clone());
            }
            OutboundMessage::Card(card) => {
                activity.text = Some(String::new());
                activity.attachment_layout = Some(CAROUSEL.to_string());
                activity.attachments = vec![card.attachment()];
            }
            OutboundMessage::Trace(trace) => {
                activity.kind = ACTIVITY_TRACE.to_string();
                activity.name = Some(trace.name.clone());
                activity.label = Some(trace.label.clone());
                activity.value_type = Some(trace.value_type.clone());
                activity.value = Some(trace.value.clone());
            }
        }
        activity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::answer::Button;
    use crate::message::{HeroCard, Trace, HERO_CARD_CONTENT_TYPE};
    use serde_json::json;

    fn inbound() -> Activity {
        serde_json::from_value(json!({
            "type": "message",
            "id": "act-1",
            "channelId": "msteams",
            "serviceUrl": "https://smba.trafficmanager.net/emea/",
            "conversation": {"id": "a:1x;messageid=9", "tenantId": "t-1", "conversationType": "personal"},
            "from": {"id": "29:user", "name": "Ada"},
            "recipient": {"id": "28:bot", "name": "nlsql"},
            "text": "how many orders last week"
        }))
        .expect("decode activity")
    }

    #[test]
    fn conversation_ref_swaps_accounts() {
        let conv = ConversationRef::from_activity(&inbound()).expect("conversation ref");
        assert_eq!(conv.channel_id, "msteams");
        assert_eq!(conv.bot.id, "28:bot");
        assert_eq!(conv.user.id, "29:user");
        assert_eq!(conv.activity_id.as_deref(), Some("act-1"));
        assert_eq!(conv.conversation.extra.get("tenantId"), Some(&json!("t-1")));
    }

    #[test]
    fn conversation_ref_requires_service_url() {
        let mut a = inbound();
        a.service_url = None;
        assert!(ConversationRef::from_activity(&a).is_none());
        let mut a = inbound();
        a.conversation = None;
        assert!(ConversationRef::from_activity(&a).is_none());
    }

    #[test]
    fn typing_reply() {
        let conv = ConversationRef::from_activity(&inbound()).unwrap();
        let v = serde_json::to_value(conv.reply(&OutboundMessage::Typing)).unwrap();
        assert_eq!(v["type"], "typing");
        assert_eq!(v["from"]["id"], "28:bot");
        assert_eq!(v["recipient"]["id"], "29:user");
        assert_eq!(v["replyToId"], "act-1");
        assert!(v.get("attachments").is_none());
    }

    #[test]
    fn text_reply_echoes_conversation() {
        let conv = ConversationRef::from_activity(&inbound()).unwrap();
        let v = serde_json::to_value(conv.reply(&OutboundMessage::text("42 rows found"))).unwrap();
        assert_eq!(v["type"], "message");
        assert_eq!(v["text"], "42 rows found");
        assert_eq!(v["conversation"], json!({"id": "a:1x;messageid=9", "tenantId": "t-1", "conversationType": "personal"}));
    }

    #[test]
    fn card_reply_is_single_item_carousel() {
        let conv = ConversationRef::from_activity(&inbound()).unwrap();
        let msg = OutboundMessage::hero(HeroCard::new("", &[Button::new("imBack", "Retry", "retry")], &[]));
        let v = serde_json::to_value(conv.reply(&msg)).unwrap();
        assert_eq!(v["attachmentLayout"], "carousel");
        assert_eq!(v["attachments"].as_array().map(|a| a.len()), Some(1));
        assert_eq!(v["attachments"][0]["contentType"], HERO_CARD_CONTENT_TYPE);
        assert_eq!(v["attachments"][0]["content"]["buttons"][0]["type"], "imBack");
    }

    #[test]
    fn adaptive_reply_keeps_card_key_order() {
        let conv = ConversationRef::from_activity(&inbound()).unwrap();
        let data: Value =
            serde_json::from_str(r#"{"version":"1.0","type":"AdaptiveCard","body":[]}"#).unwrap();
        let wire = serde_json::to_string(&conv.reply(&OutboundMessage::adaptive(data))).unwrap();
        assert!(wire.contains(r#""content":{"version":"1.0","type":"AdaptiveCard","body":[]}"#));
    }

    #[test]
    fn trace_reply() {
        let conv = ConversationRef::from_activity(&inbound()).unwrap();
        let msg = OutboundMessage::Trace(Trace {
            name: "OnTurnError Trace".into(),
            label: "TurnError".into(),
            value_type: "https://www.botframework.com/schemas/error".into(),
            value: json!("boom"),
        });
        let v = serde_json::to_value(conv.reply(&msg)).unwrap();
        assert_eq!(v["type"], "trace");
        assert_eq!(v["valueType"], "https://www.botframework.com/schemas/error");
        assert_eq!(v["value"], "boom");
    }

    #[test]
    fn members_added_decodes() {
        let a: Activity = serde_json::from_value(json!({
            "type": "conversationUpdate",
            "membersAdded": [{"id": "28:bot"}, {"id": "29:user"}],
            "recipient": {"id": "28:bot"}
        }))
        .unwrap();
        assert_eq!(a.members_added.len(), 2);
        assert_eq!(a.kind, ACTIVITY_CONVERSATION_UPDATE);
    }
}
