//! Records exchanged with the Baidu ERNIE Bot chat completion API
//!
//! Only the shapes live here. Transport, authentication and retries belong
//! to whatever client sends these over the wire.

pub mod message;
pub mod request;
pub mod response;

pub use message::{ErnieMessage, FunctionCall, MessageRole};
pub use request::{ChatRequest, FunctionParameters, FunctionSchema, PropertySchema};
pub use response::{ChatResponse, FinishReason, StreamAssembler, Usage};
