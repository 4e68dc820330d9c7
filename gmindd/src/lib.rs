//! Daemon crate for the greenhouse-minder backend: loads config,
//! sets up tracing, and wires the session registry, the MQTT update
//! feed, and the scheduled-command dispatcher into one process

pub mod config;
pub mod feed;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GminddError {
    #[error("I/O Error")]
    Io(#[from] std::io::Error),
    #[error("Config parse Error")]
    Config(#[from] toml::de::Error),
    #[error("Registry Error")]
    Registry(#[from] gmind_registry::RegistryError),
    #[error("Command store Error")]
    Store(#[from] gmind_sched::CommandStoreError),
}

pub type GminddResult<T> = std::result::Result<T, GminddError>;
