//! Gatekeeper - In-process Request Rate Limiting
//!
//! This crate implements a fixed-window rate limiter that sits in an HTTP
//! request path and decides, per client, whether a request may proceed.
//! Expired client records are reclaimed by a periodic background sweep.

pub mod config;
pub mod error;
pub mod http;
pub mod ratelimit;
