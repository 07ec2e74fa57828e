//! Multi-provider chat routing: attachment extraction, tool-intent
//! classification, typed provider adapters and streamed replies.

pub mod commands;
pub mod config;
pub mod conversation;
pub mod error;
pub mod extract;
pub mod images;
pub mod intent;
pub mod logging;
pub mod orchestrator;
pub mod rchain;
pub mod registry;
pub mod search;
