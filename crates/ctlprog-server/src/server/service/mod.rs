//! HTTP service implementation.
//!
//! This module contains the axum handlers and the shared state that connects
//! them to the batch [`Dispatcher`](ctlprog_core::Dispatcher).
//!
//! ## Structure
//!
//! - [`handler`] - routes, envelope validation and error rendering.

pub mod handler;
