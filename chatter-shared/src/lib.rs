#![cfg_attr(not(test), forbid(unsafe_code))]

//! Wire models, boundary validation, and configuration shared by the chatter
//! console crates.

pub mod config;
pub mod models;
