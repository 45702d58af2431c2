//! Listeners attached to a proxy device.
//!
//! A [`Runtime`] is told about the handful of operations the proxy intercepts.
//! Every callback runs synchronously on the thread that issued the call, in
//! registration order, and has a no-op default so implementors only pick what
//! they need.

use std::ffi::c_void;
use std::ptr::NonNull;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;

use crate::com::Raw;

macro_rules! raw_handle {
    ($(#[$attr:meta])* $name:ident) => {
        $(#[$attr])*
        #[repr(transparent)]
        #[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
        pub struct $name(NonNull<c_void>);

        // Handles are identities only; nothing is dereferenced through them here.
        unsafe impl Send for $name {}
        unsafe impl Sync for $name {}

        impl $name {
            pub fn new(raw: Raw) -> Option<$name> {
                NonNull::new(raw).map($name)
            }

            pub fn as_raw(self) -> Raw {
                self.0.as_ptr()
            }
        }
    };
}

raw_handle!(
    /// The driver context a draw was issued on.
    DeviceContext
);
raw_handle!(
    /// A driver resource (buffer or texture).
    Resource
);
raw_handle!(
    /// A driver depth-stencil view. These are never wrapped.
    DepthStencilView
);

#[allow(unused_variables)]
pub trait Runtime: Send + Sync {
    fn on_draw_call(&self, context: DeviceContext, vertices: u32) {}
    fn on_copy_resource(&self, destination: Option<Resource>, source: Option<Resource>) {}
    fn on_create_depth_stencil_view(&self, resource: Option<Resource>, view: DepthStencilView) {}
    fn on_delete_depth_stencil_view(&self, view: DepthStencilView) {}
    fn on_set_depth_stencil_view(&self, view: DepthStencilView) {}
    fn on_get_depth_stencil_view(&self, view: DepthStencilView) {}
    fn on_clear_depth_stencil_view(&self, view: Option<DepthStencilView>) {}
}

fn runtime_key(runtime: &Arc<dyn Runtime>) -> usize {
    Arc::as_ptr(runtime) as *const () as usize
}

/// Ordered set of runtimes, keyed by allocation so one runtime is never
/// registered twice.
#[derive(Default)]
pub struct RuntimeList {
    runtimes: RwLock<IndexMap<usize, Arc<dyn Runtime>>>,
}

impl RuntimeList {
    pub fn new() -> RuntimeList {
        RuntimeList::default()
    }

    /// Returns `false` if `runtime` was already registered.
    pub fn register(&self, runtime: Arc<dyn Runtime>) -> bool {
        let key = runtime_key(&runtime);
        let mut runtimes = self.runtimes.write();
        if runtimes.contains_key(&key) {
            return false;
        }
        runtimes.insert(key, runtime);
        true
    }

    pub fn unregister(&self, runtime: &Arc<dyn Runtime>) -> bool {
        self.runtimes
            .write()
            .shift_remove(&runtime_key(runtime))
            .is_some()
    }

    pub fn len(&self) -> usize {
        self.runtimes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Calls `f` for every runtime in registration order.
    ///
    /// Callbacks may issue further intercepted calls, which broadcast again, but
    /// must not register or unregister runtimes on the same device.
    pub fn broadcast(&self, mut f: impl FnMut(&dyn Runtime)) {
        let runtimes = self.runtimes.read_recursive();
        for runtime in runtimes.values() {
            f(runtime.as_ref());
        }
    }
}
