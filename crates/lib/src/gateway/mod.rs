//! Gateway: HTTP server hosting the bot.
//!
//! Single port serves the Bot Framework messaging endpoint (`POST /api/messages`)
//! and a health probe (`GET /`).

mod server;

pub use server::{router, run_gateway, GatewayState};
