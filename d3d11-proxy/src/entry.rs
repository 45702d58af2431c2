//! Process attach: detours the device creation exports of the system
//! `d3d11.dll` so every device the application creates comes back wrapped.

use std::error::Error;
use std::ffi::c_void;
use std::panic::catch_unwind;
use std::sync::OnceLock;

use detour::RawDetour;
use log::{error, info};
use windows::core::{HRESULT, PCSTR};
use windows::Win32::Foundation::{BOOL, E_FAIL, HINSTANCE};
use windows::Win32::Graphics::Direct3D::{D3D_DRIVER_TYPE, D3D_FEATURE_LEVEL};
use windows::Win32::Graphics::Direct3D11::D3D11_CREATE_DEVICE_FLAG;
use windows::Win32::System::Console::AllocConsole;
use windows::Win32::System::LibraryLoader::{GetProcAddress, LoadLibraryA};
use windows::Win32::System::SystemServices::DLL_PROCESS_ATTACH;

use crate::com::Raw;
use crate::config::Config;
use crate::d3d11::{self, D3D11Device, FnCreateDeviceAndSwapChain};
use crate::dxgi::DXGI_SWAP_CHAIN_DESC;
use crate::error::ProxyError;
use crate::{hook, logger};

const MODULE: &str = "d3d11.dll";

static CREATE_DEVICE: OnceLock<usize> = OnceLock::new();
static CREATE_DEVICE_AND_SWAP_CHAIN: OnceLock<usize> = OnceLock::new();

fn trampoline() -> Option<FnCreateDeviceAndSwapChain> {
    CREATE_DEVICE_AND_SWAP_CHAIN
        .get()
        .map(|&address| unsafe { std::mem::transmute::<usize, FnCreateDeviceAndSwapChain>(address) })
}

unsafe extern "system" fn create_device(
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
    let Some(real) = trampoline() else {
        return E_FAIL;
    };
    d3d11::create_device(
        real,
        adapter,
        driver_type,
        software,
        flags,
        feature_levels,
        num_feature_levels,
        sdk_version,
        device,
        feature_level,
        immediate_context,
    )
}

unsafe extern "system" fn create_device_and_swap_chain(
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
    let Some(real) = trampoline() else {
        return E_FAIL;
    };
    d3d11::create_device_and_swap_chain(
        real,
        adapter,
        driver_type,
        software,
        flags,
        feature_levels,
        num_feature_levels,
        sdk_version,
        swap_chain_desc,
        swap_chain,
        device,
        feature_level,
        immediate_context,
    )
}

unsafe fn export(module: HINSTANCE, name: &'static str, symbol: &'static [u8]) -> Result<*const (), ProxyError> {
    GetProcAddress(module, PCSTR(symbol.as_ptr()))
        .map(|address| address as *const ())
        .ok_or(ProxyError::MissingExport(MODULE, name))
}

/// Detours `target` for good, recording its trampoline in `slot` before the
/// detour goes live.
unsafe fn attach(slot: &OnceLock<usize>, name: &'static str, target: *const (), replacement: *const ()) -> Result<(), ProxyError> {
    if slot.get().is_some() {
        return Err(ProxyError::AlreadyInstalled(name));
    }
    let detour = RawDetour::new(target, replacement)?;
    slot.set(detour.trampoline() as *const () as usize)
        .map_err(|_| ProxyError::AlreadyInstalled(name))?;
    detour.enable()?;
    std::mem::forget(detour);
    info!("[hook] Installed detour on '{}' at {:p}.", name, target);
    Ok(())
}

/// Hooks both device creation exports.
pub fn install() -> Result<(), ProxyError> {
    unsafe {
        let module = LoadLibraryA(PCSTR(b"d3d11.dll\0".as_ptr())).map_err(|_| ProxyError::ModuleNotLoaded(MODULE))?;

        // The swap-chain variant goes first: the other one forwards to its trampoline.
        let target = export(module, "D3D11CreateDeviceAndSwapChain", b"D3D11CreateDeviceAndSwapChain\0")?;
        attach(
            &CREATE_DEVICE_AND_SWAP_CHAIN,
            "D3D11CreateDeviceAndSwapChain",
            target,
            create_device_and_swap_chain as *const (),
        )?;

        let target = export(module, "D3D11CreateDevice", b"D3D11CreateDevice\0")?;
        attach(&CREATE_DEVICE, "D3D11CreateDevice", target, create_device as *const ())?;
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    let config = Config::from_env();
    if config.console {
        unsafe {
            AllocConsole();
        }
    }
    logger::init(&config)?;
    info!("[dx11] Attached with {:?}.", config);

    hook::on_device_created(Box::new(|device: &D3D11Device| {
        info!("[dx11] Created device proxy {:p} over driver device {:p}.", device.as_raw(), device.orig());
    }))
    .persist();

    if config.hook_entry_points {
        install()?;
    } else {
        info!("[hook] Entry point hooks disabled.");
    }
    Ok(())
}

#[no_mangle]
#[allow(non_snake_case)]
pub extern "system" fn DllMain(_module: HINSTANCE, call_reason: u32, _reserved: *mut c_void) -> BOOL {
    if call_reason == DLL_PROCESS_ATTACH {
        std::thread::spawn(|| {
            let outcome = catch_unwind(|| {
                if let Err(e) = main() {
                    error!("Error occurred when attaching: {}", e);
                    eprintln!("Error occurred when attaching: {}", e);
                }
            });
            if outcome.is_err() {
                eprintln!("Attaching panicked.");
            }
        });
    }
    true.into()
}
