#![deny(unused)]
//! Core types, traits, and error definitions for Vox Agent.
//!
//! This crate provides the request/response model, the collaborator traits
//! for the model endpoint and speech engines, and the shared configuration.

pub mod config;
pub mod error;
pub mod mocks;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
pub use traits::*;
pub use types::*;
