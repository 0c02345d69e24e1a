//! # vdisp-ctl: Display Server Control CLI
//!
//! Connects to a display server over TCP and drives it from the
//! command line: query geometry, switch modes, render masks to disk
//! and push images to the framebuffer.

pub mod commands;
pub mod config;
