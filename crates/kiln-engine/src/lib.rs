//! Kiln engine crate.
//!
//! A producer thread records draw commands into a [`command::CommandBuffer`];
//! the render thread replays it through the tier picked at start-up. The GPU
//! itself sits behind the [`driver`] traits, implemented over wgpu in
//! [`device`].

pub mod backend;
pub mod command;
pub mod config;
pub mod device;
pub mod dispatch;
pub mod driver;
pub mod image;
pub mod logging;
pub mod negotiate;
pub mod resources;
pub mod selftest;
pub mod tiers;
