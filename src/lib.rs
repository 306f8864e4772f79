#![allow(unused_assignments)] // thiserror/miette proc macros trigger false positives

pub mod classify;
pub mod cli;
pub mod command;
pub mod config;
pub mod error;
pub mod executor;
pub mod host;
pub mod inventory;
pub mod logging;
pub mod normalize;
pub mod options;
pub mod paths;
pub mod progress;
pub mod retry;
pub mod timeout;
pub mod util;
pub mod verbs;
pub mod verify;
