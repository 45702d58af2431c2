//! Test doubles standing in for the driver.
//!
//! Every mock object shares one dispatch table layout with the real interface
//! it imitates. Methods without an override only append `"{name}.{Method}"` to
//! the driver's [`CallLog`]; the overrides below also hand out objects, keep a
//! reference count and store private data. Objects are leaked on purpose so raw
//! pointers stay valid for the whole test.

use std::collections::HashMap;
use std::ffi::c_void;
use std::ptr::null_mut;
use std::sync::atomic::{AtomicBool, AtomicPtr, AtomicU32, Ordering};
use std::sync::{Arc, LazyLock, OnceLock};

use parking_lot::Mutex;
use windows::core::{IUnknown_Vtbl, GUID, HRESULT};
use windows::Win32::Foundation::{E_NOINTERFACE, S_OK};
use windows::Win32::Graphics::Direct3D11::D3D11_DEPTH_STENCIL_VIEW_DESC;
use windows::Win32::Graphics::Dxgi::{DXGI_ERROR_MORE_DATA, DXGI_ERROR_NOT_FOUND};

use crate::com::iid::*;
use crate::com::{self, Raw, Record, Table};
use crate::d3d11::vtbl::{ID3D11DepthStencilView_Vtbl, ID3D11Device3_Vtbl, ID3D11DeviceContext3_Vtbl};
use crate::d3d11::D3D11Device;
use crate::dxgi::{IDXGIAdapter_Vtbl, IDXGIDevice3_Vtbl, IDXGIFactory_Vtbl, DXGI_SWAP_CHAIN_DESC};
use crate::runtime::{DepthStencilView, DeviceContext, Resource, Runtime};

#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn push(&self, entry: String) {
        self.0.lock().push(entry);
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    /// Number of entries starting with `prefix`.
    pub fn count(&self, prefix: &str) -> usize {
        self.0.lock().iter().filter(|entry| entry.starts_with(prefix)).count()
    }
}

pub fn addr(raw: Raw) -> String {
    format!("{:#x}", raw as usize)
}

fn opt(raw: Option<Raw>) -> String {
    raw.map(addr).unwrap_or_else(|| "null".to_string())
}

/// A runtime that writes every callback into a [`CallLog`].
pub struct RecordingRuntime {
    name: &'static str,
    log: CallLog,
}

impl RecordingRuntime {
    pub fn new(name: &'static str, log: &CallLog) -> Arc<RecordingRuntime> {
        Arc::new(RecordingRuntime { name, log: log.clone() })
    }

    fn push(&self, callback: &str, args: String) {
        self.log.push(format!("{}:{}({})", self.name, callback, args));
    }
}

impl Runtime for RecordingRuntime {
    fn on_draw_call(&self, context: DeviceContext, vertices: u32) {
        self.push("on_draw_call", format!("{}, {}", addr(context.as_raw()), vertices));
    }

    fn on_copy_resource(&self, destination: Option<Resource>, source: Option<Resource>) {
        self.push(
            "on_copy_resource",
            format!("{}, {}", opt(destination.map(Resource::as_raw)), opt(source.map(Resource::as_raw))),
        );
    }

    fn on_create_depth_stencil_view(&self, resource: Option<Resource>, view: DepthStencilView) {
        self.push(
            "on_create_depth_stencil_view",
            format!("{}, {}", opt(resource.map(Resource::as_raw)), addr(view.as_raw())),
        );
    }

    fn on_delete_depth_stencil_view(&self, view: DepthStencilView) {
        self.push("on_delete_depth_stencil_view", addr(view.as_raw()));
    }

    fn on_set_depth_stencil_view(&self, view: DepthStencilView) {
        self.push("on_set_depth_stencil_view", addr(view.as_raw()));
    }

    fn on_get_depth_stencil_view(&self, view: DepthStencilView) {
        self.push("on_get_depth_stencil_view", addr(view.as_raw()));
    }

    fn on_clear_depth_stencil_view(&self, view: Option<DepthStencilView>) {
        self.push("on_clear_depth_stencil_view", opt(view.map(DepthStencilView::as_raw)));
    }
}

#[repr(C)]
pub struct MockObject {
    vtbl: *const c_void,
    name: &'static str,
    driver: &'static Driver,
    refs: AtomicU32,
    phantom: AtomicU32,
    destroyed: AtomicBool,
    interfaces: Vec<GUID>,
    redirects: Mutex<Vec<(GUID, &'static MockObject)>>,
    accepted: Mutex<Vec<GUID>>,
    refused: Mutex<Vec<GUID>>,
    queried: Mutex<Vec<GUID>>,
    failures: Mutex<HashMap<&'static str, HRESULT>>,
    private_data: Mutex<Vec<(GUID, Vec<u8>)>>,
    bound_view: AtomicPtr<c_void>,
}

unsafe impl Send for MockObject {}
unsafe impl Sync for MockObject {}

unsafe impl Record for MockObject {
    unsafe fn record(this: Raw, method: &'static str) {
        let object = MockObject::from_raw(this);
        object.driver.log.push(format!("{}.{}", object.name, method));
    }
}

impl MockObject {
    unsafe fn from_raw(this: Raw) -> &'static MockObject {
        &*(this as *const MockObject)
    }

    pub fn raw(&self) -> Raw {
        self as *const MockObject as Raw
    }

    /// Real references held, not counting phantom ones.
    pub fn refs(&self) -> u32 {
        self.refs.load(Ordering::SeqCst)
    }

    pub fn destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    pub fn refuse(&self, riid: GUID) {
        self.refused.lock().push(riid);
    }

    pub fn accept(&self, riid: GUID) {
        self.accepted.lock().push(riid);
    }

    pub fn queried(&self, riid: &GUID) -> usize {
        self.queried.lock().iter().filter(|queried| *queried == riid).count()
    }

    /// Makes the overridden `method` return `hr` from now on.
    pub fn fail(&self, method: &'static str, hr: HRESULT) {
        self.failures.lock().insert(method, hr);
    }

    /// References the object reports on top of the real ones, as if some were
    /// held elsewhere.
    pub fn set_phantom_refs(&self, count: u32) {
        self.phantom.store(count, Ordering::SeqCst);
    }

    pub fn set_bound_view(&self, view: Raw) {
        self.bound_view.store(view, Ordering::SeqCst);
    }

    pub fn add_ref(&self) -> u32 {
        self.refs.fetch_add(1, Ordering::SeqCst) + 1 + self.phantom.load(Ordering::SeqCst)
    }

    pub fn release(&self) -> u32 {
        let previous = self
            .refs
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |refs| Some(refs.saturating_sub(1)))
            .unwrap_or(0);
        let reported = previous.saturating_sub(1) + self.phantom.load(Ordering::SeqCst);
        if reported == 0 {
            self.destroyed.store(true, Ordering::SeqCst);
        }
        reported
    }

    fn failure(&self, method: &str) -> Option<HRESULT> {
        self.failures.lock().get(method).copied()
    }

    fn redirect(&self, from: &[GUID], to: &'static MockObject) {
        self.redirects.lock().extend(from.iter().map(|riid| (*riid, to)));
    }

    fn query(&self, riid: &GUID, out: *mut Raw) -> HRESULT {
        self.queried.lock().push(*riid);
        if self.refused.lock().contains(riid) {
            return E_NOINTERFACE;
        }
        let redirect = self
            .redirects
            .lock()
            .iter()
            .find(|(from, _)| from == riid)
            .map(|(_, to)| *to);
        let target = match redirect {
            Some(target) => target,
            None if self.interfaces.contains(riid) || self.accepted.lock().contains(riid) => self,
            None => return E_NOINTERFACE,
        };
        target.add_ref();
        unsafe { *out = target.raw() };
        S_OK
    }
}

pub struct Driver {
    log: CallLog,
    view_table: usize,
    device: OnceLock<&'static MockObject>,
    context: OnceLock<&'static MockObject>,
    dxgi: OnceLock<&'static MockObject>,
    adapter: OnceLock<&'static MockObject>,
    factory: OnceLock<&'static MockObject>,
    deferred: Mutex<Vec<&'static MockObject>>,
}

#[derive(Clone, Copy)]
pub struct MockDriver(&'static Driver);

impl MockDriver {
    /// A device with its immediate context and DXGI side, an adapter and a
    /// factory. The device starts with the one reference a creation call hands
    /// out; the context and DXGI object only with what the device holds.
    pub fn new() -> MockDriver {
        let view_table = Box::leak(Box::new(view_vtbl())) as *mut ID3D11DepthStencilView_Vtbl as usize;
        let driver: &'static Driver = Box::leak(Box::new(Driver {
            log: CallLog::default(),
            view_table,
            device: OnceLock::new(),
            context: OnceLock::new(),
            dxgi: OnceLock::new(),
            adapter: OnceLock::new(),
            factory: OnceLock::new(),
            deferred: Mutex::new(Vec::new()),
        }));
        let mock = MockDriver(driver);

        let device = mock.spawn(table(&DEVICE_VTBL), "device", 1, device_interfaces());
        let context = mock.spawn(table(&CONTEXT_VTBL), "context", 0, context_interfaces());
        let dxgi = mock.spawn(table(&DXGI_VTBL), "dxgi", 0, dxgi_interfaces());
        let adapter = mock.spawn(table(&ADAPTER_VTBL), "adapter", 1, vec![IID_IUNKNOWN]);
        let factory = mock.spawn(table(&FACTORY_VTBL), "factory", 1, vec![IID_IUNKNOWN, IID_IDXGI_FACTORY]);

        let mut dxgi_ids = dxgi_interfaces();
        dxgi_ids.retain(|riid| *riid != IID_IUNKNOWN);
        device.redirect(&dxgi_ids, dxgi);
        dxgi.redirect(&DEVICE_IDS, device);

        let _ = driver.device.set(device);
        let _ = driver.context.set(context);
        let _ = driver.dxgi.set(dxgi);
        let _ = driver.adapter.set(adapter);
        let _ = driver.factory.set(factory);
        mock
    }

    fn spawn(&self, vtbl: *const c_void, name: &'static str, refs: u32, interfaces: Vec<GUID>) -> &'static MockObject {
        Box::leak(Box::new(MockObject {
            vtbl,
            name,
            driver: self.0,
            refs: AtomicU32::new(refs),
            phantom: AtomicU32::new(0),
            destroyed: AtomicBool::new(false),
            interfaces,
            redirects: Mutex::new(Vec::new()),
            accepted: Mutex::new(Vec::new()),
            refused: Mutex::new(Vec::new()),
            queried: Mutex::new(Vec::new()),
            failures: Mutex::new(HashMap::new()),
            private_data: Mutex::new(Vec::new()),
            bound_view: AtomicPtr::new(null_mut()),
        }))
    }

    pub fn log(&self) -> &CallLog {
        &self.0.log
    }

    pub fn device(&self) -> &'static MockObject {
        self.0.device.get().copied().expect("device")
    }

    pub fn context(&self) -> &'static MockObject {
        self.0.context.get().copied().expect("context")
    }

    pub fn dxgi(&self) -> &'static MockObject {
        self.0.dxgi.get().copied().expect("dxgi")
    }

    pub fn adapter(&self) -> &'static MockObject {
        self.0.adapter.get().copied().expect("adapter")
    }

    pub fn factory(&self) -> &'static MockObject {
        self.0.factory.get().copied().expect("factory")
    }

    pub fn deferred_contexts(&self) -> Vec<&'static MockObject> {
        self.0.deferred.lock().clone()
    }

    pub fn new_resource(&self, name: &'static str) -> &'static MockObject {
        self.spawn(table(&RESOURCE_VTBL), name, 1, vec![IID_IUNKNOWN])
    }

    /// A depth-stencil view. All views of one driver share a writable table.
    pub fn new_view(&self, name: &'static str) -> &'static MockObject {
        self.spawn(self.0.view_table as *const c_void, name, 1, vec![IID_IUNKNOWN, IID_ID3D11_DEVICE_CHILD])
    }

    /// Wraps the mock device in a proxy, handing over its creation reference.
    ///
    /// SAFETY: call at most once per driver.
    pub unsafe fn wrap_device(&self) -> &'static D3D11Device {
        &*D3D11Device::wrap(self.device().raw())
    }
}

fn table<V>(vtbl: &'static LazyLock<V>) -> *const c_void {
    &**vtbl as *const V as *const c_void
}

const DEVICE_IDS: [GUID; 4] = [IID_ID3D11_DEVICE, IID_ID3D11_DEVICE1, IID_ID3D11_DEVICE2, IID_ID3D11_DEVICE3];

fn device_interfaces() -> Vec<GUID> {
    let mut interfaces = vec![IID_IUNKNOWN];
    interfaces.extend(DEVICE_IDS);
    interfaces
}

fn context_interfaces() -> Vec<GUID> {
    vec![
        IID_IUNKNOWN,
        IID_ID3D11_DEVICE_CHILD,
        IID_ID3D11_DEVICE_CONTEXT,
        IID_ID3D11_DEVICE_CONTEXT1,
        IID_ID3D11_DEVICE_CONTEXT2,
        IID_ID3D11_DEVICE_CONTEXT3,
    ]
}

fn dxgi_interfaces() -> Vec<GUID> {
    vec![
        IID_IUNKNOWN,
        IID_IDXGI_OBJECT,
        IID_IDXGI_DEVICE,
        IID_IDXGI_DEVICE1,
        IID_IDXGI_DEVICE2,
        IID_IDXGI_DEVICE3,
    ]
}

unsafe extern "system" fn query_interface(this: Raw, riid: *const GUID, object: *mut Raw) -> HRESULT {
    *object = null_mut();
    MockObject::from_raw(this).query(&*riid, object)
}

unsafe extern "system" fn add_ref(this: Raw) -> u32 {
    MockObject::from_raw(this).add_ref()
}

unsafe extern "system" fn release(this: Raw) -> u32 {
    MockObject::from_raw(this).release()
}

/// Reference counting and interface lookup backed by the [`MockObject`].
fn count_references(vtbl: &mut IUnknown_Vtbl) {
    com::set_query_interface(vtbl, query_interface);
    vtbl.AddRef = add_ref;
    vtbl.Release = release;
}

static RESOURCE_VTBL: LazyLock<IUnknown_Vtbl> = LazyLock::new(|| {
    let mut vtbl = IUnknown_Vtbl::recording::<MockObject>();
    count_references(&mut vtbl);
    vtbl
});

static DEVICE_VTBL: LazyLock<ID3D11Device3_Vtbl> = LazyLock::new(|| {
    let mut vtbl = ID3D11Device3_Vtbl::recording::<MockObject>();
    count_references(&mut vtbl.base__.base__.base__.base__);
    vtbl.base__.base__.base__.CreateDepthStencilView = create_depth_stencil_view;
    vtbl.base__.base__.base__.CreateDeferredContext = create_deferred_context::<0>;
    vtbl.base__.base__.CreateDeferredContext1 = create_deferred_context::<1>;
    vtbl.base__.CreateDeferredContext2 = create_deferred_context::<2>;
    vtbl.CreateDeferredContext3 = create_deferred_context::<3>;
    vtbl.base__.base__.base__.GetImmediateContext = get_immediate_context;
    vtbl.base__.base__.GetImmediateContext1 = get_immediate_context;
    vtbl.base__.GetImmediateContext2 = get_immediate_context;
    vtbl.GetImmediateContext3 = get_immediate_context;
    vtbl
});

unsafe extern "system" fn create_depth_stencil_view(
    this: Raw,
    _resource: Raw,
    _desc: *const D3D11_DEPTH_STENCIL_VIEW_DESC,
    view: *mut Raw,
) -> HRESULT {
    MockObject::record(this, "CreateDepthStencilView");
    let device = MockObject::from_raw(this);
    if let Some(hr) = device.failure("CreateDepthStencilView") {
        return hr;
    }
    *view = MockDriver(device.driver).new_view("view").raw();
    S_OK
}

const CREATE_DEFERRED_CONTEXT: [&str; 4] = [
    "CreateDeferredContext",
    "CreateDeferredContext1",
    "CreateDeferredContext2",
    "CreateDeferredContext3",
];

unsafe extern "system" fn create_deferred_context<const REVISION: usize>(this: Raw, _flags: u32, context: *mut Raw) -> HRESULT {
    let name = CREATE_DEFERRED_CONTEXT[REVISION];
    MockObject::record(this, name);
    let device = MockObject::from_raw(this);
    if let Some(hr) = device.failure(name) {
        return hr;
    }
    let deferred = MockDriver(device.driver).spawn(table(&CONTEXT_VTBL), "deferred", 1, context_interfaces());
    device.driver.deferred.lock().push(deferred);
    *context = deferred.raw();
    S_OK
}

// Called while wrapping, so it stays out of the log.
unsafe extern "system" fn get_immediate_context(this: Raw, context: *mut Raw) {
    let device = MockObject::from_raw(this);
    let immediate = MockDriver(device.driver).context();
    immediate.add_ref();
    *context = immediate.raw();
}

static CONTEXT_VTBL: LazyLock<ID3D11DeviceContext3_Vtbl> = LazyLock::new(|| {
    let mut vtbl = ID3D11DeviceContext3_Vtbl::recording::<MockObject>();
    count_references(&mut vtbl.base__.base__.base__.base__.base__);
    vtbl.base__.base__.base__.base__.GetDevice = get_device;
    let context = &mut vtbl.base__.base__.base__;
    context.DrawInstanced = draw_instanced;
    context.ClearDepthStencilView = clear_depth_stencil_view;
    context.OMGetRenderTargets = om_get_render_targets;
    context.OMGetRenderTargetsAndUnorderedAccessViews = om_get_render_targets_and_unordered_access_views;
    vtbl
});

unsafe extern "system" fn get_device(this: Raw, device: *mut Raw) {
    MockObject::record(this, "GetDevice");
    let owner = MockDriver(MockObject::from_raw(this).driver).device();
    owner.add_ref();
    *device = owner.raw();
}

unsafe extern "system" fn draw_instanced(this: Raw, vertex_count_per_instance: u32, instance_count: u32, start_vertex_location: u32, start_instance_location: u32) {
    let context = MockObject::from_raw(this);
    context.driver.log.push(format!(
        "{}.DrawInstanced({}, {}, {}, {})",
        context.name, vertex_count_per_instance, instance_count, start_vertex_location, start_instance_location
    ));
}

unsafe extern "system" fn clear_depth_stencil_view(this: Raw, view: Raw, clear_flags: u32, depth: f32, stencil: u8) {
    let context = MockObject::from_raw(this);
    context.driver.log.push(format!(
        "{}.ClearDepthStencilView({}, {}, {}, {})",
        context.name,
        addr(view),
        clear_flags,
        depth,
        stencil
    ));
}

unsafe extern "system" fn om_get_render_targets(this: Raw, _num_views: u32, _render_target_views: *mut Raw, depth_stencil_view: *mut Raw) {
    MockObject::record(this, "OMGetRenderTargets");
    if !depth_stencil_view.is_null() {
        *depth_stencil_view = MockObject::from_raw(this).bound_view.load(Ordering::SeqCst);
    }
}

unsafe extern "system" fn om_get_render_targets_and_unordered_access_views(
    this: Raw,
    _num_rtvs: u32,
    _render_target_views: *mut Raw,
    depth_stencil_view: *mut Raw,
    _uav_start_slot: u32,
    _num_uavs: u32,
    _unordered_access_views: *mut Raw,
) {
    MockObject::record(this, "OMGetRenderTargetsAndUnorderedAccessViews");
    if !depth_stencil_view.is_null() {
        *depth_stencil_view = MockObject::from_raw(this).bound_view.load(Ordering::SeqCst);
    }
}

fn view_vtbl() -> ID3D11DepthStencilView_Vtbl {
    let mut vtbl = ID3D11DepthStencilView_Vtbl::recording::<MockObject>();
    count_references(&mut vtbl.base__.base__.base__);
    vtbl.base__.base__.GetPrivateData = get_private_data;
    vtbl.base__.base__.SetPrivateData = set_private_data;
    vtbl
}

unsafe extern "system" fn get_private_data(this: Raw, guid: *const GUID, data_size: *mut u32, data: *mut c_void) -> HRESULT {
    let object = MockObject::from_raw(this);
    let private_data = object.private_data.lock();
    let Some((_, stored)) = private_data.iter().find(|(key, _)| *key == *guid) else {
        *data_size = 0;
        return DXGI_ERROR_NOT_FOUND;
    };
    let available = *data_size as usize;
    *data_size = stored.len() as u32;
    if data.is_null() {
        return S_OK;
    }
    if available < stored.len() {
        return DXGI_ERROR_MORE_DATA;
    }
    std::ptr::copy_nonoverlapping(stored.as_ptr(), data as *mut u8, stored.len());
    S_OK
}

unsafe extern "system" fn set_private_data(this: Raw, guid: *const GUID, data_size: u32, data: *const c_void) -> HRESULT {
    let object = MockObject::from_raw(this);
    if let Some(hr) = object.failure("SetPrivateData") {
        return hr;
    }
    let mut private_data = object.private_data.lock();
    private_data.retain(|(key, _)| *key != *guid);
    if !data.is_null() {
        let bytes = std::slice::from_raw_parts(data as *const u8, data_size as usize);
        private_data.push((*guid, bytes.to_vec()));
    }
    S_OK
}

static DXGI_VTBL: LazyLock<IDXGIDevice3_Vtbl> = LazyLock::new(|| {
    let mut vtbl = IDXGIDevice3_Vtbl::recording::<MockObject>();
    count_references(&mut vtbl.base__.base__.base__.base__.base__);
    vtbl.base__.base__.base__.GetAdapter = get_adapter;
    vtbl
});

unsafe extern "system" fn get_adapter(this: Raw, adapter: *mut Raw) -> HRESULT {
    MockObject::record(this, "GetAdapter");
    let owner = MockDriver(MockObject::from_raw(this).driver).adapter();
    owner.add_ref();
    *adapter = owner.raw();
    S_OK
}

static ADAPTER_VTBL: LazyLock<IDXGIAdapter_Vtbl> = LazyLock::new(|| {
    let mut vtbl = IDXGIAdapter_Vtbl::recording::<MockObject>();
    count_references(&mut vtbl.base__.base__);
    vtbl.base__.GetParent = get_parent;
    vtbl
});

unsafe extern "system" fn get_parent(this: Raw, riid: *const GUID, parent: *mut Raw) -> HRESULT {
    *parent = null_mut();
    if *riid != IID_IDXGI_FACTORY {
        return E_NOINTERFACE;
    }
    let factory = MockDriver(MockObject::from_raw(this).driver).factory();
    factory.add_ref();
    *parent = factory.raw();
    S_OK
}

static FACTORY_VTBL: LazyLock<IDXGIFactory_Vtbl> = LazyLock::new(|| {
    let mut vtbl = IDXGIFactory_Vtbl::recording::<MockObject>();
    count_references(&mut vtbl.base__.base__);
    vtbl.CreateSwapChain = create_swap_chain;
    vtbl
});

unsafe extern "system" fn create_swap_chain(
    this: Raw,
    device: Raw,
    _desc: *const DXGI_SWAP_CHAIN_DESC,
    swap_chain: *mut Raw,
) -> HRESULT {
    let factory = MockObject::from_raw(this);
    factory
        .driver
        .log
        .push(format!("{}.CreateSwapChain({})", factory.name, addr(device)));
    if let Some(hr) = factory.failure("CreateSwapChain") {
        return hr;
    }
    *swap_chain = MockDriver(factory.driver).new_resource("swap_chain").raw();
    S_OK
}
