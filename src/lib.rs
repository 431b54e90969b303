//! QR code rendering with styling and export, plus smart links: short codes
//! whose destination, password and expiry can change after the code is printed.
//!
//! This module exposes every component for the binary and for integration tests.

pub mod asset;
pub mod color;
pub mod config;
pub mod database;
pub mod encoder;
pub mod error;
pub mod export;
pub mod handler;
pub mod middleware;
pub mod model;
pub mod pipeline;
pub mod qr;
pub mod render;
pub mod route;
pub mod smart_link;
pub mod store;
