//! Bot turn: typing indicator, analysis call, dispatch, then send each message in order.
//! Also handles member-added welcomes and the turn-level error notice.

use std::sync::Arc;

use crate::analysis::{AnalysisClient, AnalysisError};
use crate::channels::{
    Activity, ChannelAccount, ConversationRef, MessageSender, TransportError,
    ACTIVITY_CONVERSATION_UPDATE, ACTIVITY_MESSAGE,
};
use crate::dispatch::{DispatchError, Dispatcher};
use crate::message::{OutboundMessage, Trace};

pub const WELCOME_TEXT: &str = "Hello and welcome!";
pub const TURN_ERROR_TEXT: &str =
    "The bot encountered an error or bug. Please, try again later or contact the support.";

const TURN_ERROR_TRACE_NAME: &str = "OnTurnError Trace";
const TURN_ERROR_TRACE_LABEL: &str = "TurnError";
const ERROR_VALUE_TYPE: &str = "https://www.botframework.com/schemas/error";

/// Anything that aborts the rest of a turn.
#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error(transparent)]
    Analysis(#[from] AnalysisError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// One turn's reply target plus the sender that reaches it.
pub struct TurnContext<'a> {
    pub conversation: ConversationRef,
    sender: &'a dyn MessageSender,
}

impl<'a> TurnContext<'a> {
    pub fn new(conversation: ConversationRef, sender: &'a dyn MessageSender) -> Self {
        Self {
            conversation,
            sender,
        }
    }

    pub async fn send(&self, message: &OutboundMessage) -> Result<(), TransportError> {
        self.sender.send(&self.conversation, message).await
    }
}

/// NL-SQL bot: forwards user text to the analysis service and renders the answer.
pub struct Bot {
    analysis: Arc<dyn AnalysisClient>,
    dispatcher: Dispatcher,
}

impl Bot {
    pub fn new(analysis: Arc<dyn AnalysisClient>, dispatcher: Dispatcher) -> Self {
        Self {
            analysis,
            dispatcher,
        }
    }

    /// Run a turn and route any failure to [`Bot::on_turn_error`].
    pub async fn handle(&self, ctx: &TurnContext<'_>, activity: &Activity) {
        if let Err(e) = self.run(ctx, activity).await {
            self.on_turn_error(ctx, &e).await;
        }
    }

    /// Route one inbound activity. Unhandled activity types are ignored.
    pub async fn run(&self, ctx: &TurnContext<'_>, activity: &Activity) -> Result<(), TurnError> {
        match activity.kind.as_str() {
            ACTIVITY_MESSAGE => {
                let text = activity.text.as_deref().unwrap_or_default();
                self.on_message(ctx, text).await
            }
            ACTIVITY_CONVERSATION_UPDATE if !activity.members_added.is_empty() => {
                self.on_members_added(ctx, &activity.members_added).await
            }
            other => {
                log::debug!("bot: ignoring {} activity", other);
                Ok(())
            }
        }
    }

    /// Typing, analysis, dispatch, then sequential sends. The first failed send aborts the rest.
    pub async fn on_message(&self, ctx: &TurnContext<'_>, text: &str) -> Result<(), TurnError> {
        let trace = self.dispatcher.trace_sink();
        trace.trace("message", "start");
        ctx.send(&OutboundMessage::Typing).await?;

        let answer = self
            .analysis
            .analyze(&ctx.conversation.channel_id, text)
            .await?;
        trace.trace("analysis", &format!("{:?}", answer));

        let messages = self.dispatcher.dispatch(answer)?;
        for message in &messages {
            trace.trace("send", message.kind());
            ctx.send(message).await?;
        }
        log::info!(
            "bot: answered {} in {} message(s)",
            ctx.conversation.channel_id,
            messages.len()
        );
        Ok(())
    }

    /// Welcome every added member except the bot itself.
    pub async fn on_members_added(
        &self,
        ctx: &TurnContext<'_>,
        members: &[ChannelAccount],
    ) -> Result<(), TurnError> {
        for member in members {
            if member.id != ctx.conversation.bot.id {
                ctx.send(&OutboundMessage::text(WELCOME_TEXT)).await?;
            }
        }
        Ok(())
    }

    /// Log the error, emit a trace activity for the emulator and a generic notice for the user.
    pub async fn on_turn_error(&self, ctx: &TurnContext<'_>, error: &TurnError) {
        log::error!("[on_turn_error] unhandled error: {}", error);
        let trace = OutboundMessage::Trace(Trace {
            name: TURN_ERROR_TRACE_NAME.to_string(),
            label: TURN_ERROR_TRACE_LABEL.to_string(),
            value_type: ERROR_VALUE_TYPE.to_string(),
            value: serde_json::Value::String(error.to_string()),
        });
        if let Err(e) = ctx.send(&trace).await {
            log::warn!("bot: sending error trace failed: {}", e);
        }
        if let Err(e) = ctx.send(&OutboundMessage::text(TURN_ERROR_TEXT)).await {
            log::warn!("bot: sending error notice failed: {}", e);
        }
    }
}
