//! Subcommand implementations.

pub mod common;
pub mod config;
pub mod list;
pub mod mount;
pub mod register;
pub mod unmount;
