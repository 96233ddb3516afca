//! The correlation bridge to the external request engine.
//!
//! | Component | Module | Responsibility |
//! |-----------|--------|----------------|
//! | Frame codec | [`codec`] | 4-byte big-endian length prefix + payload |
//! | Wire messages | [`message`] | JSON payloads in both directions |
//! | Registry | [`registry`] | token → pending caller, resolved once |
//! | Transport | [`transport`] | loopback listener, single engine peer |
//! | Dispatch loop | [`dispatch`] | sole reader; routes replies by token |
//! | Engine | [`engine`] | process launch, output draining, teardown |

pub mod codec;
pub mod dispatch;
pub mod engine;
pub mod message;
pub mod registry;
pub mod transport;

pub use dispatch::{DispatchStats, Dispatcher};
pub use engine::{EngineCommand, EngineConfig, EngineHandle, EngineLauncher, EngineMode, LaunchContext};
pub use message::{HttpVersion, InboundMessage, OutboundMessage, RequestDescriptor, INIT_LABEL};
pub use registry::{CorrelationToken, PendingRegistry, PendingResponse, TokenGenerator};
pub use transport::{EngineListener, TransportReader, TransportWriter};
