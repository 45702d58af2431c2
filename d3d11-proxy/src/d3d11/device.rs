use std::ptr::null_mut;
use std::sync::atomic::{AtomicPtr, Ordering};
use std::sync::{Arc, LazyLock};

use log::{info, trace, warn};
use windows::core::{GUID, HRESULT};
use windows::Win32::Foundation::{E_INVALIDARG, E_POINTER, S_OK};
use windows::Win32::Graphics::Direct3D11::D3D11_DEPTH_STENCIL_VIEW_DESC;

use crate::com::iid::*;
use crate::com::{self, vtable_of, Forward, Raw, Table};
use crate::common::{reconcile, InterfaceSlot, RefCount, Released};
use crate::d3d11::context::D3D11DeviceContext;
use crate::d3d11::depth_stencil;
use crate::d3d11::vtbl::*;
use crate::d3d11::DEVICE_FAMILY;
use crate::dxgi::{is_dxgi_device_id, DXGIDevice};
use crate::runtime::{DepthStencilView, Resource, Runtime, RuntimeList};

/// Stand-in for a driver device, handed to the application in its place.
///
/// The device is the single owner of its immediate context and of its DXGI
/// companion. Both point back at it without holding a reference, and every
/// `AddRef`/`Release` on the device is mirrored onto them so the three stay in
/// step with the driver's aggregate object.
#[repr(C)]
pub struct D3D11Device {
    vtbl: &'static ID3D11Device3_Vtbl,
    orig: InterfaceSlot,
    refs: RefCount,
    immediate: AtomicPtr<D3D11DeviceContext>,
    dxgi: AtomicPtr<DXGIDevice>,
    runtimes: RuntimeList,
}

unsafe impl Forward for D3D11Device {
    unsafe fn orig(this: Raw) -> Raw {
        D3D11Device::from_raw(this).orig.get()
    }
}

static DEVICE_VTBL: LazyLock<ID3D11Device3_Vtbl> = LazyLock::new(|| {
    let mut vtbl = ID3D11Device3_Vtbl::forwarding::<D3D11Device>();
    com::set_query_interface(&mut vtbl.base__.base__.base__.base__, query_interface);
    vtbl.base__.base__.base__.base__.AddRef = add_ref;
    vtbl.base__.base__.base__.base__.Release = release;
    vtbl.base__.base__.base__.CreateDepthStencilView = create_depth_stencil_view;
    vtbl.base__.base__.base__.CreateDeferredContext = create_deferred_context::<0>;
    vtbl.base__.base__.base__.GetImmediateContext = get_immediate_context::<0>;
    vtbl.base__.base__.GetImmediateContext1 = get_immediate_context::<1>;
    vtbl.base__.base__.CreateDeferredContext1 = create_deferred_context::<1>;
    vtbl.base__.GetImmediateContext2 = get_immediate_context::<2>;
    vtbl.base__.CreateDeferredContext2 = create_deferred_context::<2>;
    vtbl.GetImmediateContext3 = get_immediate_context::<3>;
    vtbl.CreateDeferredContext3 = create_deferred_context::<3>;
    vtbl
});

const CREATE_DEFERRED_CONTEXT: [&str; 4] = [
    "ID3D11Device::CreateDeferredContext",
    "ID3D11Device1::CreateDeferredContext1",
    "ID3D11Device2::CreateDeferredContext2",
    "ID3D11Device3::CreateDeferredContext3",
];

impl D3D11Device {
    /// Wraps a freshly created driver device together with its DXGI side and its
    /// immediate context. The returned proxy starts with one reference, which
    /// takes over the caller's reference on `orig`.
    ///
    /// SAFETY: `orig` must be a live `ID3D11Device`.
    pub unsafe fn wrap(orig: Raw) -> *mut D3D11Device {
        let device = Box::into_raw(Box::new(D3D11Device {
            vtbl: &*DEVICE_VTBL,
            orig: InterfaceSlot::new(orig, &DEVICE_FAMILY),
            refs: RefCount::new(),
            immediate: AtomicPtr::new(null_mut()),
            dxgi: AtomicPtr::new(null_mut()),
            runtimes: RuntimeList::new(),
        }));

        match com::query(orig, &IID_IDXGI_DEVICE) {
            Ok(dxgi) => (*device).dxgi.store(DXGIDevice::wrap(dxgi, device), Ordering::Release),
            Err(hr) => warn!("[dx11] Device {:p} does not expose 'IDXGIDevice': {:?}.", orig, hr),
        }

        let mut context: Raw = null_mut();
        (vtable_of::<ID3D11Device_Vtbl>(orig).GetImmediateContext)(orig, &mut context);
        if context.is_null() {
            warn!("[dx11] Device {:p} has no immediate context.", orig);
        } else {
            (*device)
                .immediate
                .store(D3D11DeviceContext::wrap_immediate(context, device), Ordering::Release);
        }

        trace!("[dx11] Created 'ID3D11Device' proxy {:p} for {:p}.", device, orig);
        device
    }

    /// SAFETY: `this` must point to a live proxy device.
    pub unsafe fn from_raw<'a>(this: Raw) -> &'a D3D11Device {
        &*(this as *const D3D11Device)
    }

    /// Recovers the proxy behind any interface pointer the application holds,
    /// or `None` when `object` is not one of ours.
    ///
    /// SAFETY: `object` must be a live interface pointer. The returned reference
    /// is valid for as long as the caller keeps `object` alive.
    pub unsafe fn from_interface<'a>(object: Raw) -> Option<&'a D3D11Device> {
        let proxy = com::query(object, &CLSID_D3D11_DEVICE_PROXY).ok()?;
        D3D11Device::release(proxy as *mut D3D11Device);
        Some(D3D11Device::from_raw(proxy))
    }

    pub fn as_raw(&self) -> Raw {
        self as *const D3D11Device as Raw
    }

    /// The driver device currently held, at the newest revision queried so far.
    pub fn orig(&self) -> Raw {
        self.orig.get()
    }

    pub fn version(&self) -> u32 {
        self.orig.version()
    }

    pub fn ref_count(&self) -> u32 {
        self.refs.get()
    }

    pub fn runtimes(&self) -> &RuntimeList {
        &self.runtimes
    }

    pub fn register_runtime(&self, runtime: Arc<dyn Runtime>) -> bool {
        self.runtimes.register(runtime)
    }

    pub fn unregister_runtime(&self, runtime: &Arc<dyn Runtime>) -> bool {
        self.runtimes.unregister(runtime)
    }

    pub fn immediate_context(&self) -> Option<&D3D11DeviceContext> {
        unsafe { self.immediate.load(Ordering::Acquire).as_ref() }
    }

    pub fn dxgi_device(&self) -> Option<&DXGIDevice> {
        unsafe { self.dxgi.load(Ordering::Acquire).as_ref() }
    }

    pub(crate) fn detach_immediate_context(&self, context: *mut D3D11DeviceContext) {
        let _ = self
            .immediate
            .compare_exchange(context, null_mut(), Ordering::AcqRel, Ordering::Acquire);
    }

    /// SAFETY: `object` must be valid for writes.
    pub unsafe fn query_interface(&self, riid: &GUID, object: *mut Raw) -> HRESULT {
        if *riid == CLSID_D3D11_DEVICE_PROXY || *riid == IID_IUNKNOWN || DEVICE_FAMILY.revision_of(riid).is_some() {
            if let Some(revision) = DEVICE_FAMILY.revision_of(riid) {
                if let Err(hr) = self.upgrade(revision) {
                    return hr;
                }
            }
            self.add_ref();
            *object = self.as_raw();
            return S_OK;
        }

        if is_dxgi_device_id(riid) {
            if let Some(dxgi) = self.dxgi_device() {
                return dxgi.query_interface(riid, object);
            }
        }

        com::query_interface(self.orig.get(), riid, object)
    }

    unsafe fn upgrade(&self, revision: u32) -> Result<(), HRESULT> {
        self.orig.upgrade(revision, self.as_raw())?;
        if let Some(context) = self.immediate_context() {
            if let Err(hr) = context.upgrade(revision) {
                warn!(
                    "[dx11] Unable to raise immediate context {:p} of device {:p} to revision {}: {:?}.",
                    context.as_raw(),
                    self.as_raw(),
                    revision,
                    hr
                );
            }
        }
        Ok(())
    }

    pub unsafe fn add_ref(&self) -> u32 {
        self.refs.increment();
        if let Some(dxgi) = self.dxgi_device() {
            dxgi.internal_add_ref();
        }
        if let Some(context) = self.immediate_context() {
            context.add_ref();
        }
        com::add_ref(self.orig.get())
    }

    /// Drops one reference. Tears down the proxy, its DXGI companion and its
    /// share of the immediate context once the proxy count reaches zero.
    ///
    /// SAFETY: `this` must point to a live proxy device; it may be freed on return.
    pub unsafe fn release(this: *mut D3D11Device) -> u32 {
        let device = &*this;
        let remaining = device.refs.decrement();

        let dxgi = if remaining == 0 {
            device.dxgi.swap(null_mut(), Ordering::AcqRel)
        } else {
            null_mut()
        };
        if !dxgi.is_null() {
            DXGIDevice::destroy(dxgi);
        } else if let Some(dxgi) = device.dxgi_device() {
            dxgi.internal_release();
        }

        let context = device.immediate.load(Ordering::Acquire);
        if !context.is_null() {
            D3D11DeviceContext::release(context);
        }

        let real = com::release(device.orig.get());
        match reconcile(&device.orig.name(), this as _, remaining, real) {
            Released::Destroyed => {
                D3D11Device::destroy(this);
                0
            }
            Released::Alive(count) => count,
        }
    }

    unsafe fn destroy(this: *mut D3D11Device) {
        let device = Box::from_raw(this);
        if let Some(context) = device.immediate_context() {
            context.detach_device();
        }
        let dxgi = device.dxgi.swap(null_mut(), Ordering::AcqRel);
        if !dxgi.is_null() {
            DXGIDevice::destroy(dxgi);
        }
        trace!("[dx11] Destroyed '{}' object {:p}.", device.orig.name(), this);
    }
}

unsafe extern "system" fn query_interface(this: Raw, riid: *const GUID, object: *mut Raw) -> HRESULT {
    if object.is_null() || riid.is_null() {
        return E_POINTER;
    }
    D3D11Device::from_raw(this).query_interface(&*riid, object)
}

unsafe extern "system" fn add_ref(this: Raw) -> u32 {
    D3D11Device::from_raw(this).add_ref()
}

unsafe extern "system" fn release(this: Raw) -> u32 {
    D3D11Device::release(this as *mut D3D11Device)
}

unsafe extern "system" fn create_depth_stencil_view(
    this: Raw,
    resource: Raw,
    desc: *const D3D11_DEPTH_STENCIL_VIEW_DESC,
    view: *mut Raw,
) -> HRESULT {
    if view.is_null() {
        return E_INVALIDARG;
    }

    let device = D3D11Device::from_raw(this);
    let orig = device.orig.get();
    let hr = (vtable_of::<ID3D11Device_Vtbl>(orig).CreateDepthStencilView)(orig, resource, desc, view);
    if hr.is_err() {
        return hr;
    }
    let Some(created) = DepthStencilView::new(*view) else {
        return hr;
    };

    device
        .runtimes
        .broadcast(|runtime| runtime.on_create_depth_stencil_view(Resource::new(resource), created));
    depth_stencil::attach(device, created.as_raw());

    hr
}

unsafe extern "system" fn create_deferred_context<const REVISION: u32>(this: Raw, context_flags: u32, context: *mut Raw) -> HRESULT {
    let name = CREATE_DEFERRED_CONTEXT[REVISION as usize];
    info!("[dx11] Redirecting '{}({:p}, {}, {:p})' ...", name, this, context_flags, context);

    if context.is_null() {
        return E_INVALIDARG;
    }

    let device = D3D11Device::from_raw(this);
    let orig = device.orig.get();
    let hr = match REVISION {
        0 => (vtable_of::<ID3D11Device_Vtbl>(orig).CreateDeferredContext)(orig, context_flags, context),
        1 => (vtable_of::<ID3D11Device1_Vtbl>(orig).CreateDeferredContext1)(orig, context_flags, context),
        2 => (vtable_of::<ID3D11Device2_Vtbl>(orig).CreateDeferredContext2)(orig, context_flags, context),
        _ => (vtable_of::<ID3D11Device3_Vtbl>(orig).CreateDeferredContext3)(orig, context_flags, context),
    };
    if hr.is_err() {
        warn!("[dx11] > '{}' failed with '{:?}'!", name, hr);
        return hr;
    }
    if (*context).is_null() {
        return hr;
    }

    *context = D3D11DeviceContext::wrap_deferred(*context, this as *mut D3D11Device, REVISION) as Raw;
    hr
}

unsafe extern "system" fn get_immediate_context<const REVISION: u32>(this: Raw, context: *mut Raw) {
    if context.is_null() {
        return;
    }

    let device = D3D11Device::from_raw(this);
    let Some(immediate) = device.immediate_context() else {
        let orig = device.orig.get();
        match REVISION {
            0 => (vtable_of::<ID3D11Device_Vtbl>(orig).GetImmediateContext)(orig, context),
            1 => (vtable_of::<ID3D11Device1_Vtbl>(orig).GetImmediateContext1)(orig, context),
            2 => (vtable_of::<ID3D11Device2_Vtbl>(orig).GetImmediateContext2)(orig, context),
            _ => (vtable_of::<ID3D11Device3_Vtbl>(orig).GetImmediateContext3)(orig, context),
        }
        return;
    };

    if let Err(hr) = immediate.upgrade(REVISION) {
        warn!(
            "[dx11] Unable to raise immediate context {:p} to revision {}: {:?}.",
            immediate.as_raw(),
            REVISION,
            hr
        );
        *context = null_mut();
        return;
    }
    immediate.add_ref();
    *context = immediate.as_raw();
}
