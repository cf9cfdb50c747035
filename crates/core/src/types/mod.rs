//! Core type definitions for Vox Agent.
//!
//! Request and response shapes shared by the model gateway, the speech
//! engines and the HTTP surface.

pub mod capability;
pub mod invocation;
pub mod request;
pub mod response;

pub use capability::*;
pub use invocation::*;
pub use request::*;
pub use response::*;
