mod context;
mod create;
mod depth_stencil;
mod device;
pub mod vtbl;

use crate::com::iid::*;
use crate::common::InterfaceFamily;

pub use context::D3D11DeviceContext;
pub use create::{create_device, create_device_and_swap_chain, FnCreateDeviceAndSwapChain};
pub use device::D3D11Device;

pub static DEVICE_FAMILY: InterfaceFamily = InterfaceFamily {
    name: "ID3D11Device",
    revisions: [IID_ID3D11_DEVICE, IID_ID3D11_DEVICE1, IID_ID3D11_DEVICE2, IID_ID3D11_DEVICE3],
};

pub static CONTEXT_FAMILY: InterfaceFamily = InterfaceFamily {
    name: "ID3D11DeviceContext",
    revisions: [
        IID_ID3D11_DEVICE_CONTEXT,
        IID_ID3D11_DEVICE_CONTEXT1,
        IID_ID3D11_DEVICE_CONTEXT2,
        IID_ID3D11_DEVICE_CONTEXT3,
    ],
};
