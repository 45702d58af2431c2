//! A Direct3D 11 interception layer.
//!
//! Devices and contexts created through the hooked entry points are replaced by
//! proxies that forward every call to the driver and tell the attached
//! [`Runtime`]s about draws, copies and the depth-stencil view lifecycle.
//! Embedders attach their runtimes from a [`hook::on_device_created`] hook.

pub mod com;
pub mod common;
pub mod config;
pub mod d3d11;
pub mod dxgi;
pub mod error;
pub mod hook;
pub mod logger;
pub mod patch;
pub mod runtime;

#[cfg(windows)]
mod entry;

#[cfg(test)]
mod testing;

pub use crate::d3d11::{D3D11Device, D3D11DeviceContext};
pub use crate::error::ProxyError;
pub use crate::hook::{on_device_created, DeviceCreatedHandle};
pub use crate::runtime::{DepthStencilView, DeviceContext, Resource, Runtime, RuntimeList};

#[cfg(windows)]
pub use crate::entry::install;
