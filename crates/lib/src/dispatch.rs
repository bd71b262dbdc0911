//! Answer dispatch: turn one analysis answer into the ordered list of outbound messages.
//!
//! Order is fixed: primary answer, then the unaccounted-text remainder, then the
//! additional-buttons card. Rendering is pure; sending happens in [`crate::bot`].

use std::sync::Arc;

use crate::answer::{Answer, AnswerKind, RawAnswer, UnsupportedAnswerType};
use crate::message::{HeroCard, OutboundMessage};

/// Receives verbose diagnostics (intermediate values) from the dispatcher and the bot.
pub trait TraceSink: Send + Sync {
    fn trace(&self, stage: &str, detail: &str);
}

/// Forwards traces to `log::debug!` when the debug toggle is on, drops them otherwise.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogTrace {
    pub enabled: bool,
}

impl LogTrace {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }
}

impl TraceSink for LogTrace {
    fn trace(&self, stage: &str, detail: &str) {
        if self.enabled {
            log::debug!("{}: {}", stage, detail);
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error(transparent)]
    UnsupportedAnswerType(#[from] UnsupportedAnswerType),
}

/// Renders answers into message sequences.
#[derive(Clone)]
pub struct Dispatcher {
    trace: Arc<dyn TraceSink>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(Arc::new(LogTrace::default()))
    }
}

impl Dispatcher {
    pub fn new(trace: Arc<dyn TraceSink>) -> Self {
        Self { trace }
    }

    pub fn trace_sink(&self) -> &dyn TraceSink {
        self.trace.as_ref()
    }

    /// Classify then render. Fails before building anything when the answer type is unknown.
    pub fn dispatch(&self, raw: RawAnswer) -> Result<Vec<OutboundMessage>, DispatchError> {
        let answer = Answer::classify(raw).map_err(|e| {
            self.trace.trace("dispatch", &format!("rejected answer: {}", e));
            e
        })?;
        Ok(self.render(&answer))
    }

    /// Render a validated answer. Always yields between one and three messages.
    pub fn render(&self, answer: &Answer) -> Vec<OutboundMessage> {
        let mut out = Vec::with_capacity(3);
        self.trace.trace("dispatch", &format!("{} answer", answer.kind.name()));
        out.push(match &answer.kind {
            AnswerKind::Text(text) => OutboundMessage::text(text.clone()),
            AnswerKind::HeroCard {
                text,
                buttons,
                images,
            } => OutboundMessage::hero(HeroCard::new(text.clone(), buttons, images)),
            AnswerKind::AdaptiveCard(data) => OutboundMessage::adaptive(data.clone()),
        });
        if let Some(ref rest) = answer.unaccounted {
            self.trace.trace("dispatch", "unaccounted text");
            out.push(OutboundMessage::text(rest.clone()));
        }
        // An empty list still produces a (buttonless) card.
        if let Some(ref buttons) = answer.addition_buttons {
            self.trace
                .trace("dispatch", &format!("{} addition button(s)", buttons.len()));
            out.push(OutboundMessage::hero(HeroCard::new("", buttons, &[])));
        }
        out
    }
}
