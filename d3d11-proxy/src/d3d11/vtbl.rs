//! Dispatch tables of the wrapped Direct3D 11 interfaces.
//!
//! The layouts are the `windows` crate's. This module only teaches
//! [`Table`](crate::com::Table) which methods each revision adds on top of its
//! base, and pins the slot counts the driver ABI fixes.

use std::mem::{offset_of, size_of};

use static_assertions::const_assert_eq;
use windows::core::IUnknown_Vtbl;
pub use windows::Win32::Graphics::Direct3D11::{
    ID3D11DepthStencilView_Vtbl, ID3D11Device1_Vtbl, ID3D11Device2_Vtbl, ID3D11Device3_Vtbl, ID3D11DeviceChild_Vtbl,
    ID3D11DeviceContext1_Vtbl, ID3D11DeviceContext2_Vtbl, ID3D11DeviceContext3_Vtbl, ID3D11DeviceContext_Vtbl,
    ID3D11Device_Vtbl, ID3D11View_Vtbl,
};

use crate::com::table;

table!(ID3D11Device_Vtbl: IUnknown_Vtbl {
    CreateBuffer, CreateTexture1D, CreateTexture2D, CreateTexture3D, CreateShaderResourceView,
    CreateUnorderedAccessView, CreateRenderTargetView, CreateDepthStencilView, CreateInputLayout,
    CreateVertexShader, CreateGeometryShader, CreateGeometryShaderWithStreamOutput,
    CreatePixelShader, CreateHullShader, CreateDomainShader, CreateComputeShader,
    CreateClassLinkage, CreateBlendState, CreateDepthStencilState, CreateRasterizerState,
    CreateSamplerState, CreateQuery, CreatePredicate, CreateCounter, CreateDeferredContext,
    OpenSharedResource, CheckFormatSupport, CheckMultisampleQualityLevels, CheckCounterInfo,
    CheckCounter, CheckFeatureSupport, GetPrivateData, SetPrivateData, SetPrivateDataInterface,
    GetFeatureLevel, GetCreationFlags, GetDeviceRemovedReason, GetImmediateContext,
    SetExceptionMode, GetExceptionMode,
});

table!(ID3D11Device1_Vtbl: ID3D11Device_Vtbl {
    GetImmediateContext1, CreateDeferredContext1, CreateBlendState1, CreateRasterizerState1,
    CreateDeviceContextState, OpenSharedResource1, OpenSharedResourceByName,
});

table!(ID3D11Device2_Vtbl: ID3D11Device1_Vtbl {
    GetImmediateContext2, CreateDeferredContext2, GetResourceTiling, CheckMultisampleQualityLevels1,
});

table!(ID3D11Device3_Vtbl: ID3D11Device2_Vtbl {
    CreateTexture2D1, CreateTexture3D1, CreateRasterizerState2, CreateShaderResourceView1,
    CreateUnorderedAccessView1, CreateRenderTargetView1, CreateQuery1, GetImmediateContext3,
    CreateDeferredContext3, WriteToSubresource, ReadFromSubresource,
});

table!(ID3D11DeviceChild_Vtbl: IUnknown_Vtbl {
    GetDevice, GetPrivateData, SetPrivateData, SetPrivateDataInterface,
});

table!(ID3D11View_Vtbl: ID3D11DeviceChild_Vtbl {
    GetResource,
});

table!(ID3D11DepthStencilView_Vtbl: ID3D11View_Vtbl {
    GetDesc,
});

table!(ID3D11DeviceContext_Vtbl: ID3D11DeviceChild_Vtbl {
    VSSetConstantBuffers, PSSetShaderResources, PSSetShader, PSSetSamplers, VSSetShader,
    DrawIndexed, Draw, Map, Unmap, PSSetConstantBuffers, IASetInputLayout, IASetVertexBuffers,
    IASetIndexBuffer, DrawIndexedInstanced, DrawInstanced, GSSetConstantBuffers, GSSetShader,
    IASetPrimitiveTopology, VSSetShaderResources, VSSetSamplers, Begin, End, GetData,
    SetPredication, GSSetShaderResources, GSSetSamplers, OMSetRenderTargets,
    OMSetRenderTargetsAndUnorderedAccessViews, OMSetBlendState, OMSetDepthStencilState,
    SOSetTargets, DrawAuto, DrawIndexedInstancedIndirect, DrawInstancedIndirect, Dispatch,
    DispatchIndirect, RSSetState, RSSetViewports, RSSetScissorRects, CopySubresourceRegion,
    CopyResource, UpdateSubresource, CopyStructureCount, ClearRenderTargetView,
    ClearUnorderedAccessViewUint, ClearUnorderedAccessViewFloat, ClearDepthStencilView,
    GenerateMips, SetResourceMinLOD, GetResourceMinLOD, ResolveSubresource, ExecuteCommandList,
    HSSetShaderResources, HSSetShader, HSSetSamplers, HSSetConstantBuffers, DSSetShaderResources,
    DSSetShader, DSSetSamplers, DSSetConstantBuffers, CSSetShaderResources,
    CSSetUnorderedAccessViews, CSSetShader, CSSetSamplers, CSSetConstantBuffers,
    VSGetConstantBuffers, PSGetShaderResources, PSGetShader, PSGetSamplers, VSGetShader,
    PSGetConstantBuffers, IAGetInputLayout, IAGetVertexBuffers, IAGetIndexBuffer,
    GSGetConstantBuffers, GSGetShader, IAGetPrimitiveTopology, VSGetShaderResources, VSGetSamplers,
    GetPredication, GSGetShaderResources, GSGetSamplers, OMGetRenderTargets,
    OMGetRenderTargetsAndUnorderedAccessViews, OMGetBlendState, OMGetDepthStencilState,
    SOGetTargets, RSGetState, RSGetViewports, RSGetScissorRects, HSGetShaderResources, HSGetShader,
    HSGetSamplers, HSGetConstantBuffers, DSGetShaderResources, DSGetShader, DSGetSamplers,
    DSGetConstantBuffers, CSGetShaderResources, CSGetUnorderedAccessViews, CSGetShader,
    CSGetSamplers, CSGetConstantBuffers, ClearState, Flush, GetType, GetContextFlags,
    FinishCommandList,
});

table!(ID3D11DeviceContext1_Vtbl: ID3D11DeviceContext_Vtbl {
    CopySubresourceRegion1, UpdateSubresource1, DiscardResource, DiscardView, VSSetConstantBuffers1,
    HSSetConstantBuffers1, DSSetConstantBuffers1, GSSetConstantBuffers1, PSSetConstantBuffers1,
    CSSetConstantBuffers1, VSGetConstantBuffers1, HSGetConstantBuffers1, DSGetConstantBuffers1,
    GSGetConstantBuffers1, PSGetConstantBuffers1, CSGetConstantBuffers1, SwapDeviceContextState,
    ClearView, DiscardView1,
});

table!(ID3D11DeviceContext2_Vtbl: ID3D11DeviceContext1_Vtbl {
    UpdateTileMappings, CopyTileMappings, CopyTiles, UpdateTiles, ResizeTilePool,
    TiledResourceBarrier, IsAnnotationEnabled, SetMarkerInt, BeginEventInt, EndEvent,
});

table!(ID3D11DeviceContext3_Vtbl: ID3D11DeviceContext2_Vtbl {
    Flush1, SetHardwareProtectionState, GetHardwareProtectionState,
});

/// Slot of `IUnknown::Release` in every table.
pub const RELEASE_SLOT: usize = offset_of!(IUnknown_Vtbl, Release) / size_of::<usize>();

const fn slots(n: usize) -> usize {
    n * size_of::<usize>()
}

const_assert_eq!(RELEASE_SLOT, 2);
const_assert_eq!(size_of::<ID3D11Device_Vtbl>(), slots(43));
const_assert_eq!(size_of::<ID3D11Device1_Vtbl>(), slots(50));
const_assert_eq!(size_of::<ID3D11Device2_Vtbl>(), slots(54));
const_assert_eq!(size_of::<ID3D11Device3_Vtbl>(), slots(65));
const_assert_eq!(size_of::<ID3D11DeviceChild_Vtbl>(), slots(7));
const_assert_eq!(size_of::<ID3D11View_Vtbl>(), slots(8));
const_assert_eq!(size_of::<ID3D11DepthStencilView_Vtbl>(), slots(9));
const_assert_eq!(size_of::<ID3D11DeviceContext_Vtbl>(), slots(115));
const_assert_eq!(size_of::<ID3D11DeviceContext1_Vtbl>(), slots(134));
const_assert_eq!(size_of::<ID3D11DeviceContext2_Vtbl>(), slots(144));
const_assert_eq!(size_of::<ID3D11DeviceContext3_Vtbl>(), slots(147));
