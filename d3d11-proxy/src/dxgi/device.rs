use std::ptr::null_mut;
use std::sync::atomic::{AtomicPtr, Ordering};
use std::sync::LazyLock;

use log::trace;
use windows::core::{GUID, HRESULT};
use windows::Win32::Foundation::{E_NOINTERFACE, E_POINTER, S_OK};

use crate::com::iid::*;
use crate::com::{self, Forward, Raw, Table};
use crate::common::{InterfaceSlot, RefCount};
use crate::d3d11::{D3D11Device, DEVICE_FAMILY};
use crate::dxgi::{IDXGIDevice3_Vtbl, DXGI_DEVICE_FAMILY};

/// The `IDXGIDevice` face of a proxy device.
///
/// The driver implements both faces on one object, so the application sees a
/// single reference count: `AddRef` and `Release` here go to the owning device.
/// The companion keeps an internal count of its own, moved in step by the
/// device, to hold its reference on the driver's DXGI object.
#[repr(C)]
pub struct DXGIDevice {
    vtbl: &'static IDXGIDevice3_Vtbl,
    orig: InterfaceSlot,
    internal: RefCount,
    device: AtomicPtr<D3D11Device>,
}

unsafe impl Forward for DXGIDevice {
    unsafe fn orig(this: Raw) -> Raw {
        DXGIDevice::from_raw(this).orig.get()
    }
}

static DXGI_DEVICE_VTBL: LazyLock<IDXGIDevice3_Vtbl> = LazyLock::new(|| {
    let mut vtbl = IDXGIDevice3_Vtbl::forwarding::<DXGIDevice>();
    let unknown = &mut vtbl.base__.base__.base__.base__.base__;
    com::set_query_interface(unknown, query_interface);
    unknown.AddRef = add_ref;
    unknown.Release = release;
    vtbl
});

impl DXGIDevice {
    /// SAFETY: `orig` must be a live `IDXGIDevice` whose reference moves into
    /// the companion; `device` must destroy the companion before it goes away.
    pub unsafe fn wrap(orig: Raw, device: *mut D3D11Device) -> *mut DXGIDevice {
        let dxgi = Box::into_raw(Box::new(DXGIDevice {
            vtbl: &*DXGI_DEVICE_VTBL,
            orig: InterfaceSlot::new(orig, &DXGI_DEVICE_FAMILY),
            internal: RefCount::new(),
            device: AtomicPtr::new(device),
        }));
        trace!("[dxgi] Created 'IDXGIDevice' proxy {:p} for {:p}.", dxgi, orig);
        dxgi
    }

    /// SAFETY: `this` must point to a live companion.
    pub unsafe fn from_raw<'a>(this: Raw) -> &'a DXGIDevice {
        &*(this as *const DXGIDevice)
    }

    pub fn as_raw(&self) -> Raw {
        self as *const DXGIDevice as Raw
    }

    pub fn orig(&self) -> Raw {
        self.orig.get()
    }

    pub fn version(&self) -> u32 {
        self.orig.version()
    }

    pub fn internal_ref_count(&self) -> u32 {
        self.internal.get()
    }

    pub fn device(&self) -> Option<&D3D11Device> {
        unsafe { self.device.load(Ordering::Acquire).as_ref() }
    }

    pub(crate) unsafe fn internal_add_ref(&self) -> u32 {
        self.internal.increment();
        com::add_ref(self.orig.get())
    }

    pub(crate) unsafe fn internal_release(&self) -> u32 {
        self.internal.decrement();
        com::release(self.orig.get())
    }

    /// Drops the companion together with the reference it still holds on the
    /// driver object.
    ///
    /// SAFETY: `this` must come from [`DXGIDevice::wrap`] and not be used again.
    pub(crate) unsafe fn destroy(this: *mut DXGIDevice) {
        let dxgi = Box::from_raw(this);
        dxgi.device.store(null_mut(), Ordering::Release);
        com::release(dxgi.orig.get());
        trace!("[dxgi] Destroyed '{}' object {:p}.", dxgi.orig.name(), this);
    }

    /// SAFETY: `object` must be valid for writes.
    pub unsafe fn query_interface(&self, riid: &GUID, object: *mut Raw) -> HRESULT {
        if *riid == IID_IUNKNOWN || *riid == CLSID_D3D11_DEVICE_PROXY || DEVICE_FAMILY.revision_of(riid).is_some() {
            return match self.device() {
                Some(device) => device.query_interface(riid, object),
                None => com::query_interface(self.orig.get(), riid, object),
            };
        }

        let revision = DXGI_DEVICE_FAMILY.revision_of(riid);
        if revision.is_none() && *riid != IID_IDXGI_OBJECT && *riid != CLSID_DXGI_DEVICE_PROXY {
            return com::query_interface(self.orig.get(), riid, object);
        }

        if let Some(revision) = revision {
            if self.orig.upgrade(revision, self.as_raw()).is_err() {
                *object = null_mut();
                return E_NOINTERFACE;
            }
        }
        self.add_ref();
        *object = self.as_raw();
        S_OK
    }

    unsafe fn add_ref(&self) -> u32 {
        match self.device() {
            Some(device) => device.add_ref(),
            None => self.internal_add_ref(),
        }
    }
}

unsafe extern "system" fn query_interface(this: Raw, riid: *const GUID, object: *mut Raw) -> HRESULT {
    if object.is_null() || riid.is_null() {
        return E_POINTER;
    }
    DXGIDevice::from_raw(this).query_interface(&*riid, object)
}

unsafe extern "system" fn add_ref(this: Raw) -> u32 {
    DXGIDevice::from_raw(this).add_ref()
}

unsafe extern "system" fn release(this: Raw) -> u32 {
    let dxgi = DXGIDevice::from_raw(this);
    let device = dxgi.device.load(Ordering::Acquire);
    if device.is_null() {
        return dxgi.internal_release();
    }
    D3D11Device::release(device)
}
