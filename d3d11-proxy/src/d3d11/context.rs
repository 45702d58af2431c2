use std::ptr::null_mut;
use std::sync::atomic::{AtomicPtr, Ordering};
use std::sync::LazyLock;

use log::trace;
use windows::core::{GUID, HRESULT};
use windows::Win32::Foundation::{E_POINTER, S_OK};

use crate::com::iid::*;
use crate::com::{self, vtable_of, Forward, Raw, Table};
use crate::common::{reconcile, InterfaceSlot, RefCount, Released};
use crate::d3d11::device::D3D11Device;
use crate::d3d11::vtbl::*;
use crate::d3d11::CONTEXT_FAMILY;
use crate::runtime::{DepthStencilView, DeviceContext, Resource, Runtime};

/// Stand-in for a driver device context.
///
/// The immediate context is owned by its device and points back at it without a
/// reference. A deferred context holds one reference on its device for its whole
/// lifetime.
#[repr(C)]
pub struct D3D11DeviceContext {
    vtbl: &'static ID3D11DeviceContext3_Vtbl,
    orig: InterfaceSlot,
    refs: RefCount,
    device: AtomicPtr<D3D11Device>,
    deferred: bool,
}

unsafe impl Forward for D3D11DeviceContext {
    unsafe fn orig(this: Raw) -> Raw {
        D3D11DeviceContext::from_raw(this).orig.get()
    }
}

static CONTEXT_VTBL: LazyLock<ID3D11DeviceContext3_Vtbl> = LazyLock::new(|| {
    let mut vtbl = ID3D11DeviceContext3_Vtbl::forwarding::<D3D11DeviceContext>();
    let child = &mut vtbl.base__.base__.base__.base__;
    com::set_query_interface(&mut child.base__, query_interface);
    child.base__.AddRef = add_ref;
    child.base__.Release = release;
    child.GetDevice = get_device;
    let context = &mut vtbl.base__.base__.base__;
    context.DrawIndexed = draw_indexed;
    context.Draw = draw;
    context.DrawIndexedInstanced = draw_indexed_instanced;
    context.DrawInstanced = draw_instanced;
    context.OMSetRenderTargets = om_set_render_targets;
    context.OMSetRenderTargetsAndUnorderedAccessViews = om_set_render_targets_and_unordered_access_views;
    context.CopyResource = copy_resource;
    context.ClearDepthStencilView = clear_depth_stencil_view;
    context.OMGetRenderTargets = om_get_render_targets;
    context.OMGetRenderTargetsAndUnorderedAccessViews = om_get_render_targets_and_unordered_access_views;
    vtbl
});

impl D3D11DeviceContext {
    /// SAFETY: `orig` must be a live `ID3D11DeviceContext`; its reference moves
    /// into the proxy. `device` must outlive the proxy or detach it first.
    pub unsafe fn wrap_immediate(orig: Raw, device: *mut D3D11Device) -> *mut D3D11DeviceContext {
        let context = D3D11DeviceContext::new(orig, device, 0, false);
        trace!("[dx11] Created immediate 'ID3D11DeviceContext' proxy {:p} for {:p}.", context, orig);
        context
    }

    /// Wraps a context created through `CreateDeferredContext{revision}`, which
    /// the driver returns already at that revision.
    ///
    /// SAFETY: as [`D3D11DeviceContext::wrap_immediate`]; `device` must be live.
    pub unsafe fn wrap_deferred(orig: Raw, device: *mut D3D11Device, revision: u32) -> *mut D3D11DeviceContext {
        (*device).add_ref();
        let context = D3D11DeviceContext::new(orig, device, revision, true);
        trace!(
            "[dx11] Created deferred '{}' proxy {:p} for {:p}.",
            CONTEXT_FAMILY.display_name(revision),
            context,
            orig
        );
        context
    }

    fn new(orig: Raw, device: *mut D3D11Device, revision: u32, deferred: bool) -> *mut D3D11DeviceContext {
        Box::into_raw(Box::new(D3D11DeviceContext {
            vtbl: &*CONTEXT_VTBL,
            orig: InterfaceSlot::with_version(orig, &CONTEXT_FAMILY, revision),
            refs: RefCount::new(),
            device: AtomicPtr::new(device),
            deferred,
        }))
    }

    /// SAFETY: `this` must point to a live proxy context.
    pub unsafe fn from_raw<'a>(this: Raw) -> &'a D3D11DeviceContext {
        &*(this as *const D3D11DeviceContext)
    }

    pub fn as_raw(&self) -> Raw {
        self as *const D3D11DeviceContext as Raw
    }

    pub fn orig(&self) -> Raw {
        self.orig.get()
    }

    pub fn version(&self) -> u32 {
        self.orig.version()
    }

    pub fn ref_count(&self) -> u32 {
        self.refs.get()
    }

    pub fn is_deferred(&self) -> bool {
        self.deferred
    }

    /// The owning proxy device, until that device is torn down.
    pub fn device(&self) -> Option<&D3D11Device> {
        unsafe { self.device.load(Ordering::Acquire).as_ref() }
    }

    pub(crate) fn detach_device(&self) {
        self.device.store(null_mut(), Ordering::Release);
    }

    /// SAFETY: the wrapped context must be live.
    pub unsafe fn upgrade(&self, revision: u32) -> Result<(), HRESULT> {
        self.orig.upgrade(revision, self.as_raw())
    }

    pub unsafe fn add_ref(&self) -> u32 {
        self.refs.increment();
        com::add_ref(self.orig.get())
    }

    /// SAFETY: `this` must point to a live proxy context; it may be freed on return.
    pub unsafe fn release(this: *mut D3D11DeviceContext) -> u32 {
        let context = &*this;
        let real = com::release(context.orig.get());
        let remaining = context.refs.decrement();
        match reconcile(&context.orig.name(), this as _, remaining, real) {
            Released::Destroyed => {
                D3D11DeviceContext::destroy(this);
                0
            }
            Released::Alive(count) => count,
        }
    }

    unsafe fn destroy(this: *mut D3D11DeviceContext) {
        let context = Box::from_raw(this);
        let device = context.device.swap(null_mut(), Ordering::AcqRel);
        if !device.is_null() {
            if context.deferred {
                D3D11Device::release(device);
            } else {
                (*device).detach_immediate_context(this);
            }
        }
        trace!("[dx11] Destroyed '{}' object {:p}.", context.orig.name(), this);
    }

    /// SAFETY: `object` must be valid for writes.
    pub unsafe fn query_interface(&self, riid: &GUID, object: *mut Raw) -> HRESULT {
        let revision = CONTEXT_FAMILY.revision_of(riid);
        if revision.is_none()
            && *riid != CLSID_D3D11_CONTEXT_PROXY
            && *riid != IID_IUNKNOWN
            && *riid != IID_ID3D11_DEVICE_CHILD
        {
            return com::query_interface(self.orig.get(), riid, object);
        }

        if let Some(revision) = revision {
            if let Err(hr) = self.upgrade(revision) {
                return hr;
            }
        }
        self.add_ref();
        *object = self.as_raw();
        S_OK
    }

    fn notify(&self, f: impl FnMut(&dyn Runtime)) {
        if let Some(device) = self.device() {
            device.runtimes().broadcast(f);
        }
    }

    /// Runtimes are handed the driver context a draw runs on, not the proxy.
    fn notify_draw(&self, vertices: u32) {
        if let Some(context) = DeviceContext::new(self.orig.get()) {
            self.notify(|runtime| runtime.on_draw_call(context, vertices));
        }
    }

    unsafe fn table(&self) -> (Raw, &ID3D11DeviceContext_Vtbl) {
        let orig = self.orig.get();
        (orig, vtable_of::<ID3D11DeviceContext_Vtbl>(orig))
    }
}

unsafe extern "system" fn query_interface(this: Raw, riid: *const GUID, object: *mut Raw) -> HRESULT {
    if object.is_null() || riid.is_null() {
        return E_POINTER;
    }
    D3D11DeviceContext::from_raw(this).query_interface(&*riid, object)
}

unsafe extern "system" fn add_ref(this: Raw) -> u32 {
    D3D11DeviceContext::from_raw(this).add_ref()
}

unsafe extern "system" fn release(this: Raw) -> u32 {
    D3D11DeviceContext::release(this as *mut D3D11DeviceContext)
}

unsafe extern "system" fn get_device(this: Raw, device: *mut Raw) {
    if device.is_null() {
        return;
    }
    let context = D3D11DeviceContext::from_raw(this);
    match context.device() {
        Some(owner) => {
            owner.add_ref();
            *device = owner.as_raw();
        }
        None => {
            let orig = context.orig.get();
            (vtable_of::<ID3D11DeviceChild_Vtbl>(orig).GetDevice)(orig, device)
        }
    }
}

unsafe extern "system" fn draw_indexed(this: Raw, index_count: u32, start_index_location: u32, base_vertex_location: i32) {
    let context = D3D11DeviceContext::from_raw(this);
    context.notify_draw(index_count);
    let (orig, vtbl) = context.table();
    (vtbl.DrawIndexed)(orig, index_count, start_index_location, base_vertex_location)
}

unsafe extern "system" fn draw(this: Raw, vertex_count: u32, start_vertex_location: u32) {
    let context = D3D11DeviceContext::from_raw(this);
    context.notify_draw(vertex_count);
    let (orig, vtbl) = context.table();
    (vtbl.Draw)(orig, vertex_count, start_vertex_location)
}

unsafe extern "system" fn draw_indexed_instanced(
    this: Raw,
    index_count_per_instance: u32,
    instance_count: u32,
    start_index_location: u32,
    base_vertex_location: i32,
    start_instance_location: u32,
) {
    let context = D3D11DeviceContext::from_raw(this);
    let vertices = index_count_per_instance.saturating_mul(instance_count);
    context.notify_draw(vertices);
    let (orig, vtbl) = context.table();
    (vtbl.DrawIndexedInstanced)(
        orig,
        index_count_per_instance,
        instance_count,
        start_index_location,
        base_vertex_location,
        start_instance_location,
    )
}

unsafe extern "system" fn draw_instanced(
    this: Raw,
    vertex_count_per_instance: u32,
    instance_count: u32,
    start_vertex_location: u32,
    start_instance_location: u32,
) {
    let context = D3D11DeviceContext::from_raw(this);
    let vertices = vertex_count_per_instance.saturating_mul(instance_count);
    context.notify_draw(vertices);
    let (orig, vtbl) = context.table();
    (vtbl.DrawInstanced)(
        orig,
        vertex_count_per_instance,
        instance_count,
        start_vertex_location,
        start_instance_location,
    )
}

unsafe extern "system" fn om_set_render_targets(this: Raw, num_views: u32, render_target_views: *const Raw, depth_stencil_view: Raw) {
    let context = D3D11DeviceContext::from_raw(this);
    if let Some(view) = DepthStencilView::new(depth_stencil_view) {
        context.notify(|runtime| runtime.on_set_depth_stencil_view(view));
    }
    let (orig, vtbl) = context.table();
    (vtbl.OMSetRenderTargets)(orig, num_views, render_target_views, depth_stencil_view)
}

unsafe extern "system" fn om_set_render_targets_and_unordered_access_views(
    this: Raw,
    num_rtvs: u32,
    render_target_views: *const Raw,
    depth_stencil_view: Raw,
    uav_start_slot: u32,
    num_uavs: u32,
    unordered_access_views: *const Raw,
    uav_initial_counts: *const u32,
) {
    let context = D3D11DeviceContext::from_raw(this);
    if let Some(view) = DepthStencilView::new(depth_stencil_view) {
        context.notify(|runtime| runtime.on_set_depth_stencil_view(view));
    }
    let (orig, vtbl) = context.table();
    (vtbl.OMSetRenderTargetsAndUnorderedAccessViews)(
        orig,
        num_rtvs,
        render_target_views,
        depth_stencil_view,
        uav_start_slot,
        num_uavs,
        unordered_access_views,
        uav_initial_counts,
    )
}

unsafe extern "system" fn copy_resource(this: Raw, dst_resource: Raw, src_resource: Raw) {
    let context = D3D11DeviceContext::from_raw(this);
    let (destination, source) = (Resource::new(dst_resource), Resource::new(src_resource));
    context.notify(|runtime| runtime.on_copy_resource(destination, source));
    let (orig, vtbl) = context.table();
    (vtbl.CopyResource)(orig, dst_resource, src_resource)
}

unsafe extern "system" fn clear_depth_stencil_view(this: Raw, depth_stencil_view: Raw, clear_flags: u32, depth: f32, stencil: u8) {
    let context = D3D11DeviceContext::from_raw(this);
    let view = DepthStencilView::new(depth_stencil_view);
    context.notify(|runtime| runtime.on_clear_depth_stencil_view(view));
    let (orig, vtbl) = context.table();
    (vtbl.ClearDepthStencilView)(orig, depth_stencil_view, clear_flags, depth, stencil)
}

unsafe extern "system" fn om_get_render_targets(this: Raw, num_views: u32, render_target_views: *mut Raw, depth_stencil_view: *mut Raw) {
    let context = D3D11DeviceContext::from_raw(this);
    let (orig, vtbl) = context.table();
    (vtbl.OMGetRenderTargets)(orig, num_views, render_target_views, depth_stencil_view);

    if let Some(view) = bound_view(depth_stencil_view) {
        context.notify(|runtime| runtime.on_get_depth_stencil_view(view));
    }
}

unsafe extern "system" fn om_get_render_targets_and_unordered_access_views(
    this: Raw,
    num_rtvs: u32,
    render_target_views: *mut Raw,
    depth_stencil_view: *mut Raw,
    uav_start_slot: u32,
    num_uavs: u32,
    unordered_access_views: *mut Raw,
) {
    let context = D3D11DeviceContext::from_raw(this);
    let (orig, vtbl) = context.table();
    (vtbl.OMGetRenderTargetsAndUnorderedAccessViews)(
        orig,
        num_rtvs,
        render_target_views,
        depth_stencil_view,
        uav_start_slot,
        num_uavs,
        unordered_access_views,
    );

    if let Some(view) = bound_view(depth_stencil_view) {
        context.notify(|runtime| runtime.on_get_depth_stencil_view(view));
    }
}

unsafe fn bound_view(out: *mut Raw) -> Option<DepthStencilView> {
    if out.is_null() {
        return None;
    }
    DepthStencilView::new(*out)
}
