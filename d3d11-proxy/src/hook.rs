use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::LazyLock;

use indexmap::IndexMap;
use parking_lot::RwLock;

use crate::d3d11::D3D11Device;

pub type FnDeviceCreatedHook = Box<dyn Fn(&D3D11Device) + Send + Sync>;

static DEVICE_CREATED_CHAIN: LazyLock<RwLock<IndexMap<usize, FnDeviceCreatedHook>>> =
    LazyLock::new(|| RwLock::new(IndexMap::new()));

static NEXT_KEY: AtomicUsize = AtomicUsize::new(1);

/// Removes its hook from the device-created chain when dropped.
pub struct DeviceCreatedHandle {
    key: usize,
}

impl DeviceCreatedHandle {
    /// Keeps the hook in the chain for the rest of the process.
    pub fn persist(self) {
        std::mem::forget(self);
    }
}

impl Drop for DeviceCreatedHandle {
    fn drop(&mut self) {
        DEVICE_CREATED_CHAIN.write().shift_remove(&self.key);
    }
}

/// Runs `hook` on every proxy device created from now on, before the device is
/// handed to the application. This is where embedders register their runtimes.
pub fn on_device_created(hook: FnDeviceCreatedHook) -> DeviceCreatedHandle {
    let key = NEXT_KEY.fetch_add(1, Ordering::Relaxed);
    DEVICE_CREATED_CHAIN.write().insert(key, hook);
    DeviceCreatedHandle { key }
}

pub(crate) fn notify_device_created(device: &D3D11Device) {
    let chain = DEVICE_CREATED_CHAIN.read_recursive();
    for hook in chain.values() {
        hook(device);
    }
}
