//! Client for the external visual-language encoder service.
//!
//! The encoder is a black box exposing `encode(images[]) -> vectors[]` over
//! HTTP. This crate batches frame PNGs, calls the service, and truncates the
//! returned vectors to the configured target dimension.

pub mod client;
pub mod error;

pub use client::{EncoderClient, EncoderConfig};
pub use error::{EncoderError, EncoderResult};
