//! Business logic services
//!
//! This module contains the network mode logic separated from HTTP concerns.
//! The controller drives the OS exclusively through the command executor
//! and the credentials file writer.

pub mod controller;
pub mod executor;
pub mod marker;
pub mod probe;
pub mod wpa_supplicant;
