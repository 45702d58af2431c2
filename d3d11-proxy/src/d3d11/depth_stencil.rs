//! Ownership tagging of depth-stencil views.
//!
//! Views are handed out unwrapped. To learn when one dies, the creating device
//! stores its own address in the view's private data under
//! [`CLSID_D3D11_DEVICE_PROXY`], takes a reference on itself, and patches the
//! `Release` slot of the driver's view table. The patched `Release` announces
//! the deletion to that device's runtimes and drops the reference once the
//! driver reports the view gone.

use std::ffi::c_void;
use std::mem::size_of;

use log::{error, trace, warn};

use crate::com::iid::CLSID_D3D11_DEVICE_PROXY;
use crate::com::{vtable_of, Raw};
use crate::d3d11::device::D3D11Device;
use crate::d3d11::vtbl::{ID3D11DeviceChild_Vtbl, RELEASE_SLOT};
use crate::patch;
use crate::runtime::DepthStencilView;

type FnRelease = unsafe extern "system" fn(this: Raw) -> u32;

/// Tags `view` as owned by `device` and makes sure its table reports releases.
///
/// SAFETY: `view` must be a live depth-stencil view created by `device`'s driver.
pub unsafe fn attach(device: &D3D11Device, view: Raw) {
    device.add_ref();

    let owner = device.as_raw() as usize;
    let hr = (vtable_of::<ID3D11DeviceChild_Vtbl>(view).SetPrivateData)(
        view,
        &CLSID_D3D11_DEVICE_PROXY,
        size_of::<usize>() as u32,
        &owner as *const usize as *const c_void,
    );
    if hr.is_err() {
        warn!(
            "[dx11] Unable to tag depth-stencil view {:p} with its device: {:?}.",
            view, hr
        );
        D3D11Device::release(device.as_raw() as *mut D3D11Device);
        return;
    }

    if let Err(e) = patch::install(patch::table_of(view), RELEASE_SLOT, release as *const c_void) {
        error!("[dx11] Unable to track releases of depth-stencil view {:p}: {}.", view, e);
    }
}

/// The proxy device that created `view`, if it was tagged.
///
/// SAFETY: `view` must be a live device child.
pub unsafe fn owner(view: Raw) -> Option<*mut D3D11Device> {
    let mut owner = 0usize;
    let mut size = size_of::<usize>() as u32;
    let hr = (vtable_of::<ID3D11DeviceChild_Vtbl>(view).GetPrivateData)(
        view,
        &CLSID_D3D11_DEVICE_PROXY,
        &mut size,
        &mut owner as *mut usize as *mut c_void,
    );
    if hr.is_err() || size as usize != size_of::<usize>() || owner == 0 {
        return None;
    }
    Some(owner as *mut D3D11Device)
}

unsafe extern "system" fn release(this: Raw) -> u32 {
    let owner = owner(this);

    let table = patch::table_of(this) as *const *const c_void;
    let Some(original) = patch::original(table, RELEASE_SLOT) else {
        error!(
            "[dx11] No original 'Release' recorded for table {:p} of depth-stencil view {:p}; leaking the view.",
            table, this
        );
        return 0;
    };
    let original: FnRelease = std::mem::transmute(original);
    let remaining = original(this);

    if remaining == 0 {
        if let Some(device) = owner {
            trace!("[dx11] Depth-stencil view {:p} of device {:p} was destroyed.", this, device);
            if let Some(view) = DepthStencilView::new(this) {
                (*device)
                    .runtimes()
                    .broadcast(|runtime| runtime.on_delete_depth_stencil_view(view));
            }
            D3D11Device::release(device);
        }
    }
    remaining
}
