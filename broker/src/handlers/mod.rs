//! HTTP request handlers
//!
//! This module organizes all API handlers into logical groups:
//! - `api` - Health check endpoint
//! - `plugins` - Plugin listing, details and account initialization
//! - `entities` - Entity ingestion, station listing and the SSE entity stream
//! - `calls` - Call start, call end and active call listing

pub mod api;
pub mod calls;
pub mod entities;
pub mod plugins;
