//! A garlic-routing tunnel engine in Rust.
//!
//! This crate implements the tunnel layer of an I2P-style anonymity router:
//! the layered-encryption tunnel build protocol, the per-hop data-plane
//! encryption discipline, and the lifecycle manager that keeps a steady pool
//! of usable tunnels while dispatching inbound traffic by tunnel ID.

#[macro_use]
extern crate arrayref;
#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate log;

mod constants;
pub mod crypto;
pub mod data;
pub mod i2np;
pub mod netdb;
pub mod router;
pub mod tunnel;
mod util;
