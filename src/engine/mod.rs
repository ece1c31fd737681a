//! Cipher engine boundary.
//!
//! Requests are validated, staged into artifact files, handed to the external
//! engine executable, and the results read back.

mod adapter;
pub mod artifacts;
pub mod error;
pub mod request;

pub use adapter::{resolve_executable, CipherEngine, EngineAdapter};
pub use adapter::{INVALID_HEX_MESSAGE, INVALID_IV_MESSAGE, INVALID_KEY_MESSAGE};
pub use adapter::{NO_DATA_MESSAGE, NO_MESSAGE_MESSAGE};
pub use artifacts::{ArtifactKind, ArtifactRegistry, ArtifactSet, SweepOnDrop};
pub use error::EngineError;
pub use request::{
    CipherAction, CipherOutput, CipherRequest, CipherResult, Payload, TraceMode,
    DEFAULT_TRACE_MESSAGE,
};
