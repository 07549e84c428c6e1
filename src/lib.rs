pub mod adaptive;
pub mod admission;
pub mod config;
pub mod core;
pub mod demo_ports;
pub mod domain;
pub mod error;
pub mod executor;
pub mod health;
pub mod health_registry;
pub mod observability;
pub mod operation_class;
pub mod pipeline;
pub mod ports;
pub mod telemetry;

pub use crate::core::Core;
