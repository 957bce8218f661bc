pub mod cli;
pub mod config;
pub mod error;
pub mod network;
pub mod output;
pub mod scanner;
