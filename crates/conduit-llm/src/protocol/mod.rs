//! Wire formats spoken downstream and upstream

pub mod agent;
pub mod anthropic;
pub mod openai;
pub mod responses;
