//! Corvid Server library.
//!
//! This crate wires the cluster subsystem and the cluster router into a
//! runnable node.

pub mod config;
pub mod error;
pub mod node;

pub use config::{Args, NodeConfig};
pub use error::Error;
pub use node::Node;
