//! Device creation.
//!
//! Both creation entry points end up here with a pointer to the driver's own
//! `D3D11CreateDeviceAndSwapChain`. The driver only ever creates the device;
//! the swap chain is created afterwards against the proxy so presentation sees
//! the same device the application does.

use std::ptr::{null, null_mut};

use log::{info, trace, warn};
use windows::core::HRESULT;
use windows::Win32::Foundation::HINSTANCE;
use windows::Win32::Graphics::Direct3D::{D3D_DRIVER_TYPE, D3D_FEATURE_LEVEL, D3D_FEATURE_LEVEL_11_0};
use windows::Win32::Graphics::Direct3D11::D3D11_CREATE_DEVICE_FLAG;
use windows::Win32::Graphics::Dxgi::DXGI_ERROR_UNSUPPORTED;

use crate::com::{self, vtable_of, Raw};
use crate::d3d11::device::D3D11Device;
use crate::dxgi::{create_swap_chain, factory_of, IDXGIDevice_Vtbl, DXGI_SWAP_CHAIN_DESC};
use crate::hook;

pub type FnCreateDeviceAndSwapChain = unsafe extern "system" fn(
    adapter: Raw,
    driver_type: D3D_DRIVER_TYPE,
    software: HINSTANCE,
    flags: D3D11_CREATE_DEVICE_FLAG,
    feature_levels: *const D3D_FEATURE_LEVEL,
    num_feature_levels: u32,
    sdk_version: u32,
    swap_chain_desc: *const DXGI_SWAP_CHAIN_DESC,
    swap_chain: *mut Raw,
    device: *mut Raw,
    feature_level: *mut D3D_FEATURE_LEVEL,
    immediate_context: *mut Raw,
) -> HRESULT;

/// `D3D11CreateDevice`, routed through the swap-chain variant with no swap chain.
///
/// SAFETY: arguments as for the driver's entry point; `real` must be the
/// driver's `D3D11CreateDeviceAndSwapChain`.
pub unsafe fn create_device(
    real: FnCreateDeviceAndSwapChain,
    adapter: Raw,
    driver_type: D3D_DRIVER_TYPE,
    software: HINSTANCE,
    flags: D3D11_CREATE_DEVICE_FLAG,
    feature_levels: *const D3D_FEATURE_LEVEL,
    num_feature_levels: u32,
    sdk_version: u32,
    device: *mut Raw,
    feature_level: *mut D3D_FEATURE_LEVEL,
    immediate_context: *mut Raw,
) -> HRESULT {
    info!(
        "[dx11] Redirecting 'D3D11CreateDevice({:p}, {}, {:#x}, {:#x}, {:p}, {}, {}, {:p}, {:p}, {:p})' ...",
        adapter,
        driver_type.0,
        software.0,
        flags.0,
        feature_levels,
        num_feature_levels,
        sdk_version,
        device,
        feature_level,
        immediate_context
    );
    info!("[dx11] > Passing on to 'D3D11CreateDeviceAndSwapChain':");

    create_device_and_swap_chain(
        real,
        adapter,
        driver_type,
        software,
        flags,
        feature_levels,
        num_feature_levels,
        sdk_version,
        null(),
        null_mut(),
        device,
        feature_level,
        immediate_context,
    )
}

/// `D3D11CreateDeviceAndSwapChain`: creates the driver device into the
/// caller's `device` slot, wraps it, runs the device-created hooks and then
/// creates the requested swap chain against the proxy. A caller that passes no
/// device slot only learns whether creation would succeed, so nothing is
/// wrapped then.
///
/// SAFETY: as [`create_device`].
pub unsafe fn create_device_and_swap_chain(
    real: FnCreateDeviceAndSwapChain,
    adapter: Raw,
    driver_type: D3D_DRIVER_TYPE,
    software: HINSTANCE,
    flags: D3D11_CREATE_DEVICE_FLAG,
    feature_levels: *const D3D_FEATURE_LEVEL,
    num_feature_levels: u32,
    sdk_version: u32,
    swap_chain_desc: *const DXGI_SWAP_CHAIN_DESC,
    swap_chain: *mut Raw,
    device: *mut Raw,
    feature_level: *mut D3D_FEATURE_LEVEL,
    immediate_context: *mut Raw,
) -> HRESULT {
    info!(
        "[dx11] Redirecting 'D3D11CreateDeviceAndSwapChain({:p}, {}, {:#x}, {:#x}, {:p}, {}, {}, {:p}, {:p}, {:p}, {:p}, {:p})' ...",
        adapter,
        driver_type.0,
        software.0,
        flags.0,
        feature_levels,
        num_feature_levels,
        sdk_version,
        swap_chain_desc,
        swap_chain,
        device,
        feature_level,
        immediate_context
    );

    let mut level = D3D_FEATURE_LEVEL_11_0;
    let hr = real(
        adapter,
        driver_type,
        software,
        flags,
        feature_levels,
        num_feature_levels,
        sdk_version,
        null(),
        null_mut(),
        device,
        &mut level,
        null_mut(),
    );
    if hr.is_err() {
        warn!("[dx11] > 'D3D11CreateDeviceAndSwapChain' failed with '{:?}'!", hr);
        return hr;
    }
    if device.is_null() || (*device).is_null() {
        if !immediate_context.is_null() {
            *immediate_context = null_mut();
        }
        if !feature_level.is_null() {
            *feature_level = level;
        }
        return hr;
    }

    let proxy = D3D11Device::wrap(*device);
    hook::notify_device_created(&*proxy);

    let mut hr = hr;
    if !swap_chain_desc.is_null() {
        hr = create_swap_chain_for(&*proxy, adapter, swap_chain_desc, swap_chain);
    }

    if hr.is_ok() {
        if !immediate_context.is_null() {
            *immediate_context = match (*proxy).immediate_context() {
                Some(context) => {
                    context.add_ref();
                    context.as_raw()
                }
                None => null_mut(),
            };
        }
        trace!("[dx11] Returning 'ID3D11Device' object {:p}.", proxy);
        *device = proxy as Raw;
    } else {
        D3D11Device::release(proxy);
        *device = null_mut();
    }

    if !feature_level.is_null() {
        *feature_level = level;
    }
    hr
}

/// Creates a swap chain through the factory of `adapter`, or of the device's
/// own adapter when the caller passed none.
unsafe fn create_swap_chain_for(
    device: &D3D11Device,
    adapter: Raw,
    desc: *const DXGI_SWAP_CHAIN_DESC,
    swap_chain: *mut Raw,
) -> HRESULT {
    let adapter = if adapter.is_null() {
        let Some(dxgi) = device.dxgi_device() else {
            warn!("[dx11] > Device {:p} has no DXGI side to create a swap chain with.", device.as_raw());
            return DXGI_ERROR_UNSUPPORTED;
        };
        let orig = dxgi.orig();
        let mut adapter: Raw = null_mut();
        let hr = (vtable_of::<IDXGIDevice_Vtbl>(orig).GetAdapter)(orig, &mut adapter);
        if hr.is_err() {
            warn!("[dx11] > 'IDXGIDevice::GetAdapter' failed with '{:?}'!", hr);
            return hr;
        }
        adapter
    } else {
        com::add_ref(adapter);
        adapter
    };

    let hr = match factory_of(adapter) {
        Ok(factory) => {
            let hr = create_swap_chain(factory, device.as_raw(), desc, swap_chain);
            com::release(factory);
            hr
        }
        Err(hr) => hr,
    };
    com::release(adapter);

    if hr.is_err() {
        warn!("[dx11] > 'IDXGIFactory::CreateSwapChain' failed with '{:?}'!", hr);
    }
    hr
}
