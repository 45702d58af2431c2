//! DXGI side of a Direct3D 11 device: the companion device proxy and the
//! adapter/factory tables swap-chain creation goes through.

mod device;

use std::mem::size_of;

use static_assertions::const_assert_eq;
use windows::core::{IUnknown_Vtbl, GUID, HRESULT};
pub use windows::Win32::Graphics::Dxgi::{
    IDXGIAdapter_Vtbl, IDXGIDevice1_Vtbl, IDXGIDevice2_Vtbl, IDXGIDevice3_Vtbl, IDXGIDevice_Vtbl, IDXGIFactory_Vtbl,
    IDXGIObject_Vtbl, DXGI_SWAP_CHAIN_DESC,
};

use crate::com::iid::*;
use crate::com::{table, vtable_of, Raw};
use crate::common::InterfaceFamily;

pub use device::DXGIDevice;

pub static DXGI_DEVICE_FAMILY: InterfaceFamily = InterfaceFamily {
    name: "IDXGIDevice",
    revisions: [IID_IDXGI_DEVICE, IID_IDXGI_DEVICE1, IID_IDXGI_DEVICE2, IID_IDXGI_DEVICE3],
};

table!(IDXGIObject_Vtbl: IUnknown_Vtbl {
    SetPrivateData, SetPrivateDataInterface, GetPrivateData, GetParent,
});

table!(IDXGIDevice_Vtbl: IDXGIObject_Vtbl {
    GetAdapter, CreateSurface, QueryResourceResidency, SetGPUThreadPriority, GetGPUThreadPriority,
});

table!(IDXGIDevice1_Vtbl: IDXGIDevice_Vtbl { SetMaximumFrameLatency, GetMaximumFrameLatency });

table!(IDXGIDevice2_Vtbl: IDXGIDevice1_Vtbl { OfferResources, ReclaimResources, EnqueueSetEvent });

table!(IDXGIDevice3_Vtbl: IDXGIDevice2_Vtbl { Trim });

// Only the mock adapter and factory are built from these; the proxy reaches
// the driver's through their own tables.
#[cfg(test)]
table!(IDXGIAdapter_Vtbl: IDXGIObject_Vtbl { EnumOutputs, GetDesc, CheckInterfaceSupport });

#[cfg(test)]
table!(IDXGIFactory_Vtbl: IDXGIObject_Vtbl {
    EnumAdapters, MakeWindowAssociation, GetWindowAssociation, CreateSwapChain, CreateSoftwareAdapter,
});

const_assert_eq!(size_of::<IDXGIObject_Vtbl>(), 7 * size_of::<usize>());
const_assert_eq!(size_of::<IDXGIDevice_Vtbl>(), 12 * size_of::<usize>());
const_assert_eq!(size_of::<IDXGIDevice1_Vtbl>(), 14 * size_of::<usize>());
const_assert_eq!(size_of::<IDXGIDevice2_Vtbl>(), 17 * size_of::<usize>());
const_assert_eq!(size_of::<IDXGIDevice3_Vtbl>(), 18 * size_of::<usize>());
const_assert_eq!(size_of::<IDXGIAdapter_Vtbl>(), 10 * size_of::<usize>());
const_assert_eq!(size_of::<IDXGIFactory_Vtbl>(), 12 * size_of::<usize>());

/// `IDXGIObject` or any `IDXGIDevice` revision.
pub fn is_dxgi_device_id(riid: &GUID) -> bool {
    *riid == IID_IDXGI_OBJECT || DXGI_DEVICE_FAMILY.revision_of(riid).is_some()
}

/// Looks up the factory that owns `adapter`.
///
/// SAFETY: `adapter` must be a live `IDXGIAdapter`.
pub unsafe fn factory_of(adapter: Raw) -> Result<Raw, HRESULT> {
    let mut factory: Raw = std::ptr::null_mut();
    let hr = (vtable_of::<IDXGIObject_Vtbl>(adapter).GetParent)(adapter, &IID_IDXGI_FACTORY, &mut factory);
    if hr.is_err() {
        return Err(hr);
    }
    Ok(factory)
}

/// SAFETY: `factory` must be a live `IDXGIFactory`; `device` a live device
/// interface; `desc` and `swap_chain` as the driver requires.
pub unsafe fn create_swap_chain(
    factory: Raw,
    device: Raw,
    desc: *const DXGI_SWAP_CHAIN_DESC,
    swap_chain: *mut Raw,
) -> HRESULT {
    (vtable_of::<IDXGIFactory_Vtbl>(factory).CreateSwapChain)(factory, device, desc, swap_chain)
}
