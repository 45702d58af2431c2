use windows::core::{IUnknown, Interface, GUID};
use windows::Win32::Graphics::Direct3D11::{
    ID3D11Device, ID3D11Device1, ID3D11Device2, ID3D11Device3, ID3D11DeviceChild, ID3D11DeviceContext,
    ID3D11DeviceContext1, ID3D11DeviceContext2, ID3D11DeviceContext3,
};
use windows::Win32::Graphics::Dxgi::{IDXGIDevice, IDXGIDevice1, IDXGIDevice2, IDXGIDevice3, IDXGIFactory, IDXGIObject};

pub const IID_IUNKNOWN: GUID = IUnknown::IID;

pub const IID_ID3D11_DEVICE_CHILD: GUID = ID3D11DeviceChild::IID;

pub const IID_ID3D11_DEVICE: GUID = ID3D11Device::IID;
pub const IID_ID3D11_DEVICE1: GUID = ID3D11Device1::IID;
pub const IID_ID3D11_DEVICE2: GUID = ID3D11Device2::IID;
pub const IID_ID3D11_DEVICE3: GUID = ID3D11Device3::IID;

pub const IID_ID3D11_DEVICE_CONTEXT: GUID = ID3D11DeviceContext::IID;
pub const IID_ID3D11_DEVICE_CONTEXT1: GUID = ID3D11DeviceContext1::IID;
pub const IID_ID3D11_DEVICE_CONTEXT2: GUID = ID3D11DeviceContext2::IID;
pub const IID_ID3D11_DEVICE_CONTEXT3: GUID = ID3D11DeviceContext3::IID;

pub const IID_IDXGI_OBJECT: GUID = IDXGIObject::IID;
pub const IID_IDXGI_DEVICE: GUID = IDXGIDevice::IID;
pub const IID_IDXGI_DEVICE1: GUID = IDXGIDevice1::IID;
pub const IID_IDXGI_DEVICE2: GUID = IDXGIDevice2::IID;
pub const IID_IDXGI_DEVICE3: GUID = IDXGIDevice3::IID;
pub const IID_IDXGI_FACTORY: GUID = IDXGIFactory::IID;

/// Class id of the device proxy. Doubles as the private-data key of the
/// depth-stencil view ownership tag.
pub const CLSID_D3D11_DEVICE_PROXY: GUID = GUID::from_u128(0x72299288_2c68_4ad8_945d_2bfb5aa9c609);
pub const CLSID_D3D11_CONTEXT_PROXY: GUID = GUID::from_u128(0x0a8c53c6_8e4b_4a1e_9a3f_27b8e0c4d512);
pub const CLSID_DXGI_DEVICE_PROXY: GUID = GUID::from_u128(0x8c1e0e6a_2d3f_4b7e_a3c1_5f0a9e6b7d24);
