//! Mutating admission webhook host for the rightsize engine

pub mod api;
pub mod config;
