//! LMS REST integration
//!
//! [`LmsClient`] talks to a Canvas-style course API over HTTPS with bearer
//! token authentication.

pub mod client;
pub mod models;

pub use client::LmsClient;
