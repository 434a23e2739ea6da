pub mod cli;
pub mod clients;
pub mod config;
pub mod dataset;
pub mod error;
pub mod http;
pub mod pages;
pub mod session;
pub mod types;
pub mod usage;
pub mod web;
