//! Conversion between wire formats and the canonical types

pub mod agent;
pub mod anthropic;
pub mod openai;
pub mod responses;
