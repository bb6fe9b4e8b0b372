//! Client for the Muna control plane.
//!
//! [`MunaClient`] speaks the REST API. Everything above it depends on the [`ControlPlane`] trait
//! instead, so a different transport (or an in-memory fake) can be substituted.

mod client;
mod control;
mod error;

pub mod schemas;

pub use client::{DEFAULT_API_URL, MunaClient, MunaClientBuilder};
pub use control::{ControlPlane, CreatePredictionRequest};
pub use error::ClientError;
