pub mod config;
pub mod crawler;
pub mod database;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod report;
pub mod util;
pub mod web;
