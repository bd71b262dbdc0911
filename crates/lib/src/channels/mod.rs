//! Communication channels (Bot Framework).
//!
//! Activity types for the inbound webhook and the [`MessageSender`] seam the bot
//! uses to deliver its replies. [`BotConnector`] is the Bot Framework implementation.

mod activity;
mod connector;

pub use activity::{
    Activity, ChannelAccount, ConversationAccount, ConversationRef, ACTIVITY_CONVERSATION_UPDATE,
    ACTIVITY_MESSAGE, ACTIVITY_TRACE, ACTIVITY_TYPING,
};
pub use connector::{
    activities_url, AppCredentials, BotConnector, DEFAULT_TRUSTED_SERVICE_HOSTS,
};

use async_trait::async_trait;

use crate::message::OutboundMessage;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("channel request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("channel returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("channel auth failed: {0}")]
    Auth(String),
    #[error("invalid service url: {0}")]
    ServiceUrl(String),
    #[error("service url is not a trusted host: {0}")]
    UntrustedServiceUrl(String),
}

/// Delivers one outbound message to a conversation. Each call is awaited before the next.
#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send(
        &self,
        conversation: &ConversationRef,
        message: &OutboundMessage,
    ) -> Result<(), TransportError>;
}
