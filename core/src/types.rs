//! Shared primitive types used across the entire core.

/// A match round. Rounds start at 1.
pub type Round = u32;

/// Action points, always non-negative.
pub type ActionPoints = u32;
