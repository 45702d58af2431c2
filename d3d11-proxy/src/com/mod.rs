//! COM glue shared by every proxy.
//!
//! Table layouts, identifiers and result codes are the `windows` crate's. What
//! lives here builds those tables so that every slot calls the same slot on the
//! wrapped object; a proxy then overrides only the methods it intercepts.

pub mod iid;

use std::ffi::c_void;
use std::mem::{offset_of, transmute};
#[cfg(test)]
use std::mem::MaybeUninit;

use windows::core::{IUnknown_Vtbl, GUID, HRESULT};
use windows::Win32::Foundation::{E_NOINTERFACE, E_POINTER};

/// Any interface pointer crossing the binary boundary.
pub type Raw = *mut c_void;

pub type FnQueryInterface = unsafe extern "system" fn(this: Raw, riid: *const GUID, object: *mut Raw) -> HRESULT;

/// Implemented by proxies whose tables forward into a wrapped object.
///
/// SAFETY: `orig` must return a live interface pointer whose table has at least
/// the layout of the table being forwarded through.
pub unsafe trait Forward {
    unsafe fn orig(this: Raw) -> Raw;
}

/// Implemented by test doubles whose tables only log the method that was hit.
#[cfg(test)]
pub unsafe trait Record {
    unsafe fn record(this: Raw, method: &'static str);
}

/// Reads the dispatch table of `object` as `V`.
///
/// SAFETY: `object` must be a live interface pointer whose table starts with `V`.
pub unsafe fn vtable_of<'a, V>(object: Raw) -> &'a V {
    &**(object as *const *const V)
}

/// SAFETY: `object` must be live and `F` must be the type of the slot stored
/// `offset` bytes into its table.
unsafe fn slot_of<F: Copy>(object: Raw, offset: usize) -> F {
    *((*(object as *const *const u8)).add(offset) as *const F)
}

/// A `windows` dispatch table that can be filled without a driver object.
///
/// SAFETY: implementors must be `#[repr(C)]` tables of `extern "system"`
/// functions taking the interface pointer first, with the table of their base
/// interface at offset 0.
pub unsafe trait Table: Sized + 'static {
    /// Every slot calls the slot at the same offset on `P::orig(this)`.
    fn forwarding<P: Forward>() -> Self;

    /// Every slot reports its method name through `R` and returns zeroes.
    #[cfg(test)]
    fn recording<R: Record>() -> Self;

    #[cfg(test)]
    fn slot_name(offset: usize) -> &'static str;
}

/// A single method slot of a [`Table`].
pub unsafe trait Slot: Copy {
    fn forward<P: Forward, const OFFSET: usize>() -> Self;

    #[cfg(test)]
    fn record<R: Record, V: Table, const OFFSET: usize>() -> Self;
}

macro_rules! slot {
    ($($arg:ident: $ty:ident),*) => {
        unsafe impl<Ret $(, $ty)*> Slot for unsafe extern "system" fn(Raw $(, $ty)*) -> Ret {
            fn forward<P: Forward, const OFFSET: usize>() -> Self {
                unsafe extern "system" fn thunk<P: Forward, Ret $(, $ty)*, const OFFSET: usize>(
                    this: Raw $(, $arg: $ty)*
                ) -> Ret {
                    let orig = P::orig(this);
                    let slot: unsafe extern "system" fn(Raw $(, $ty)*) -> Ret = slot_of(orig, OFFSET);
                    slot(orig $(, $arg)*)
                }
                thunk::<P, Ret $(, $ty)*, OFFSET>
            }

            #[cfg(test)]
            fn record<R: Record, V: Table, const OFFSET: usize>() -> Self {
                #[allow(unused_variables)]
                unsafe extern "system" fn thunk<R: Record, V: Table, Ret $(, $ty)*, const OFFSET: usize>(
                    this: Raw $(, $arg: $ty)*
                ) -> Ret {
                    R::record(this, V::slot_name(OFFSET));
                    MaybeUninit::zeroed().assume_init()
                }
                thunk::<R, V, Ret $(, $ty)*, OFFSET>
            }
        }
    };
}

slot!();
slot!(a1: A1);
slot!(a1: A1, a2: A2);
slot!(a1: A1, a2: A2, a3: A3);
slot!(a1: A1, a2: A2, a3: A3, a4: A4);
slot!(a1: A1, a2: A2, a3: A3, a4: A4, a5: A5);
slot!(a1: A1, a2: A2, a3: A3, a4: A4, a5: A5, a6: A6);
slot!(a1: A1, a2: A2, a3: A3, a4: A4, a5: A5, a6: A6, a7: A7);
slot!(a1: A1, a2: A2, a3: A3, a4: A4, a5: A5, a6: A6, a7: A7, a8: A8);
slot!(a1: A1, a2: A2, a3: A3, a4: A4, a5: A5, a6: A6, a7: A7, a8: A8, a9: A9);
slot!(a1: A1, a2: A2, a3: A3, a4: A4, a5: A5, a6: A6, a7: A7, a8: A8, a9: A9, a10: A10);
slot!(a1: A1, a2: A2, a3: A3, a4: A4, a5: A5, a6: A6, a7: A7, a8: A8, a9: A9, a10: A10, a11: A11);

/// Stores `f` in the `QueryInterface` slot. The `windows` declaration of that
/// slot takes the identifier by reference; the two are the same pointer.
pub fn set_query_interface(vtbl: &mut IUnknown_Vtbl, f: FnQueryInterface) {
    vtbl.QueryInterface = unsafe { transmute(f) };
}

unsafe impl Table for IUnknown_Vtbl {
    fn forwarding<P: Forward>() -> Self {
        unsafe extern "system" fn forward_query_interface<P: Forward>(this: Raw, riid: *const GUID, object: *mut Raw) -> HRESULT {
            query_interface(P::orig(this), riid, object)
        }
        unsafe extern "system" fn forward_add_ref<P: Forward>(this: Raw) -> u32 {
            add_ref(P::orig(this))
        }
        unsafe extern "system" fn forward_release<P: Forward>(this: Raw) -> u32 {
            release(P::orig(this))
        }

        IUnknown_Vtbl {
            QueryInterface: unsafe { transmute::<FnQueryInterface, _>(forward_query_interface::<P>) },
            AddRef: forward_add_ref::<P>,
            Release: forward_release::<P>,
        }
    }

    #[cfg(test)]
    fn recording<R: Record>() -> Self {
        unsafe extern "system" fn record_query_interface<R: Record>(this: Raw, _riid: *const GUID, _object: *mut Raw) -> HRESULT {
            R::record(this, "QueryInterface");
            E_NOINTERFACE
        }
        unsafe extern "system" fn record_add_ref<R: Record>(this: Raw) -> u32 {
            R::record(this, "AddRef");
            1
        }
        unsafe extern "system" fn record_release<R: Record>(this: Raw) -> u32 {
            R::record(this, "Release");
            0
        }

        IUnknown_Vtbl {
            QueryInterface: unsafe { transmute::<FnQueryInterface, _>(record_query_interface::<R>) },
            AddRef: record_add_ref::<R>,
            Release: record_release::<R>,
        }
    }

    #[cfg(test)]
    fn slot_name(offset: usize) -> &'static str {
        if offset == offset_of!(IUnknown_Vtbl, QueryInterface) {
            "QueryInterface"
        } else if offset == offset_of!(IUnknown_Vtbl, AddRef) {
            "AddRef"
        } else {
            "Release"
        }
    }
}

/// Implements [`Table`] for a `windows` table given its base table and the
/// methods it adds. The generated struct literal names every field, so the list
/// cannot drift from the crate's layout without failing to compile.
macro_rules! table {
    ($name:ty: $base:ty { $($method:ident),* $(,)? }) => {
        unsafe impl $crate::com::Table for $name {
            fn forwarding<P: $crate::com::Forward>() -> Self {
                Self {
                    base__: <$base as $crate::com::Table>::forwarding::<P>(),
                    $( $method: $crate::com::Slot::forward::<P, { ::std::mem::offset_of!($name, $method) }>(), )*
                }
            }

            #[cfg(test)]
            fn recording<R: $crate::com::Record>() -> Self {
                Self {
                    base__: <$base as $crate::com::Table>::recording::<R>(),
                    $( $method: $crate::com::Slot::record::<R, Self, { ::std::mem::offset_of!($name, $method) }>(), )*
                }
            }

            #[cfg(test)]
            fn slot_name(offset: usize) -> &'static str {
                $(
                    if offset == ::std::mem::offset_of!($name, $method) {
                        return stringify!($method);
                    }
                )*
                <$base as $crate::com::Table>::slot_name(offset)
            }
        }
    };
}

pub(crate) use table;

/// SAFETY: `object` must be a live interface pointer and `out` valid for writes.
pub unsafe fn query_interface(object: Raw, riid: *const GUID, out: *mut Raw) -> HRESULT {
    if riid.is_null() {
        return E_POINTER;
    }
    (vtable_of::<IUnknown_Vtbl>(object).QueryInterface)(object, &*riid, out.cast())
}

pub unsafe fn add_ref(object: Raw) -> u32 {
    (vtable_of::<IUnknown_Vtbl>(object).AddRef)(object)
}

pub unsafe fn release(object: Raw) -> u32 {
    (vtable_of::<IUnknown_Vtbl>(object).Release)(object)
}

/// Queries `object` for `riid`, returning the new reference or the failure code.
pub unsafe fn query(object: Raw, riid: &GUID) -> Result<Raw, HRESULT> {
    let mut out: Raw = std::ptr::null_mut();
    let hr = query_interface(object, riid, &mut out);
    if hr.is_ok() && !out.is_null() {
        Ok(out)
    } else if hr.is_ok() {
        Err(E_NOINTERFACE)
    } else {
        Err(hr)
    }
}
