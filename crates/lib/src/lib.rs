//! NL-SQL bot core library: answer model, dispatcher, Bot Framework channel,
//! analysis client and gateway, used by the CLI.

pub mod analysis;
pub mod answer;
pub mod bot;
pub mod channels;
pub mod config;
pub mod dispatch;
pub mod gateway;
pub mod message;
