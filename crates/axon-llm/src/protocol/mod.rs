//! Provider wire format types
//!
//! Exact serde mappings of each provider's request, response, and stream
//! shapes. No logic lives here; conversions are in [`crate::convert`].

pub mod anthropic;
pub mod google;
pub mod openai;
