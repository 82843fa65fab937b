//! Booking Assist — podcast-booking email pipeline.

pub mod config;
pub mod error;
pub mod llm;
pub mod pipeline;
pub mod services;
pub mod session;
pub mod store;
