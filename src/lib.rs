pub mod config;
pub mod dialect;
pub mod exec;
pub mod generator;
pub mod model;
