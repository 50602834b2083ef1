#![cfg_attr(not(test), no_std)]

#[macro_use]
mod fmt;

pub mod config;
pub mod display;
pub mod sensors;
pub mod state;
pub mod tasks;
pub mod telemetry;

#[cfg(feature = "firmware")]
pub mod board;
#[cfg(feature = "firmware")]
pub mod device;
#[cfg(feature = "firmware")]
pub mod wifi;

#[cfg(test)]
mod test_utils;
