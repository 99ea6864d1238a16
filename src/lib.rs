//! mimir-chat - branching conversation engine
//!
//! The core of an AI-assisted study chat: a conversation-tree data model
//! where any prior turn can root a new branch (edit-and-resend), branch
//! reconstruction for display and for the outgoing request, a streaming
//! ingestion state machine that keeps turns durable before they are final,
//! and a multi-session tab manager with a restart-surviving local cache.
//!
//! The engine is UI-free and transport-free: rendering consumes
//! [`controller::ChatEvent`]s, the AI backend sits behind
//! [`transport::ChatTransport`], and the durable store behind
//! [`chat_store::ChatStore`].

#![forbid(unsafe_code)]
#![allow(
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::module_name_repetitions
)]

pub mod branch;
pub mod chat_store;
pub mod controller;
pub mod error;
pub mod frame;
pub mod node;
pub mod store;
pub mod tab_cache;
pub mod tabs;
pub mod title;
pub mod transport;
pub mod tree;

pub use controller::{CancelToken, ChatController, ChatEvent, SendOutcome, SendPhase, SendRequest};
pub use error::{Error, Result};
pub use node::{ChatMeta, ChatNode, Role};
pub use store::NodeStore;
pub use tabs::TabManager;
