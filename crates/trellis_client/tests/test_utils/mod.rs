//! Test utilities for the client integration tests.
//!
//! This module provides a scripted transport and client helpers.

pub mod mock_transport;

#[allow(unused_imports)]
pub use mock_transport::{MockReply, MockTransport, RecordingHooks, client_with, fast_config};
