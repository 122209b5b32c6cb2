// src/services/mod.rs
pub mod process_server;
pub mod runner_service;
