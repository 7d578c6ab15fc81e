// Shared utilities for Brief Autopilot

pub mod serde_helpers;
