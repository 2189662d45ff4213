pub mod app;
pub mod blob;
pub mod config;
pub mod domain;
pub mod error;
pub mod fs_util;
pub mod output;
pub mod paths;
pub mod query;
pub mod rows;
pub mod tui;
