//! # vdisp-sim: Simulated Display Server
//!
//! Serves the display server protocol over TCP without rendering
//! anything: modes are acknowledged and broadcast, geometry is served
//! from the configuration, and blits are recorded and logged.
//!
//! Runs in the foreground until a client requests the `quit` mode or
//! the process receives Ctrl-C.

pub mod config;
pub mod service;
