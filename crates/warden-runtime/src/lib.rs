//! # warden-runtime
//!
//! Request pipeline for Warden.
//!
//! `warden-core` decides the guardrail and the prompt; this crate does
//! everything that touches the outside world:
//!
//! - [`store`]: profile and conversation-history collaborators
//! - [`providers`]: guarded inference backends (Bedrock, canned)
//! - [`audit`]: interaction records
//! - [`service`]: the `ask` pipeline wiring them together
//!
//! Collaborators are traits passed in at construction, so tests swap in
//! fakes without any process-wide state.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use warden_runtime::{AskRequest, Caller, MemoryProfileStore, ProviderRegistry, QueryService, RuntimeConfig};
//!
//! let config = RuntimeConfig::load("warden.yaml")?;
//! let provider = ProviderRegistry::with_defaults()
//!     .create(&config.inference.provider, &config.inference.provider_config())?;
//!
//! let service = QueryService::builder()
//!     .config(config)
//!     .provider(provider)
//!     .profiles(Arc::new(MemoryProfileStore::new()))
//!     .build()?;
//!
//! let reply = service.ask(&Caller::new("student-123"), AskRequest::new("wat is gravity")).await?;
//! ```

pub mod audit;
pub mod config;
pub mod providers;
pub mod service;
pub mod store;

pub use audit::{
    AuditSink, InteractionOutcome, InteractionRecord, MemoryAuditSink, TracingAuditSink,
};
pub use config::{ConfigError, RuntimeConfig};
pub use providers::{
    InferenceProvider, InferenceRequest, InferenceResponse, ProviderError, ProviderRegistry,
};
pub use service::{
    AskRequest, AskResponse, Caller, Clock, QueryService, QueryServiceBuilder, ResponseMetadata,
    ServiceError, APOLOGY_MESSAGE, REFUSAL_MESSAGE,
};
pub use store::{HistoryStore, MemoryHistoryStore, MemoryProfileStore, ProfileStore, StoreError};
