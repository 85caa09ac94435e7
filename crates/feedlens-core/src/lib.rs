//! feedlens-core - Core library for feedlens
//!
//! This crate provides the pieces shared by the page scanner, the analysis
//! orchestrator and the control panel:
//!
//! - **dom**: In-process markup tree with selector queries and insertion observers
//! - **extraction**: Cascading content extraction over feed posts
//! - **scheduler**: Debounced rescans driven by document insertions
//! - **injector**: Idempotent trigger injection and activation
//! - **page**: Page scanner wiring extraction, injection and scheduling together
//! - **store**: SQLite-backed single-slot shared state
//! - **client**: Generation service client
//! - **messaging**: Request/ack channel and completion broadcast
//! - **orchestrator**: Runs analysis requests to completion
//! - **presenter**: Insight parsing and control panel state

pub mod client;
pub mod dom;
pub mod error;
pub mod extraction;
pub mod injector;
pub mod messaging;
pub mod orchestrator;
pub mod page;
pub mod presenter;
pub mod scheduler;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use dom::{Document, NodeId, SharedDocument};
pub use error::{Error, Result};
pub use messaging::MessageBus;
pub use orchestrator::Orchestrator;
pub use store::StateStore;
pub use types::*;
