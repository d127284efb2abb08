mod config;
mod memory_store;
