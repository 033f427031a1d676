#![forbid(unsafe_code)]

pub mod app;
pub mod cli;
pub mod config;
pub mod crawl;
pub mod enhance;
pub mod fetch;
pub mod formats;
pub mod html;
pub mod keywords;
pub mod llm;
pub mod logging;
pub mod openai;
