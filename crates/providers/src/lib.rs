//! Model gateway for DeskPilot.
//!
//! [`OllamaGateway`] implements the `deskpilot_core::Provider` trait against a
//! local Ollama runtime. All gateways sharing one runtime share one
//! [`RequestGate`], which serializes request setup and absorbs 429 backpressure.

pub mod gate;
pub mod ollama;
pub mod stream;

pub use gate::{BackoffPolicy, RequestGate, Setup};
pub use ollama::OllamaGateway;
pub use stream::{MARKER_LOOKAHEAD, OBSERVATION_MARKER, STOP_SEQUENCES, StreamAccumulator};
