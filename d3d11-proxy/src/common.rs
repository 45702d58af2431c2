use std::ffi::c_void;
use std::sync::atomic::{AtomicPtr, AtomicU32, Ordering};

use log::{trace, warn};
use windows::core::{GUID, HRESULT};
use windows::Win32::Foundation::E_NOINTERFACE;

use crate::com::{self, Raw};

/// A family of interface revisions, ordered oldest first.
pub struct InterfaceFamily {
    pub name: &'static str,
    pub revisions: [GUID; 4],
}

impl InterfaceFamily {
    pub fn revision_of(&self, riid: &GUID) -> Option<u32> {
        self.revisions
            .iter()
            .position(|rev| rev == riid)
            .map(|rev| rev as u32)
    }

    /// `ID3D11Device` for revision 0, `ID3D11Device2` for revision 2.
    pub fn display_name(&self, version: u32) -> String {
        if version == 0 {
            self.name.to_string()
        } else {
            format!("{}{}", self.name, version)
        }
    }
}

/// Outcome of a release on a proxy once its own count and the wrapped object's
/// count have been compared.
#[derive(PartialEq, Eq, Debug, Copy, Clone)]
pub enum Released {
    Alive(u32),
    Destroyed,
}

impl Released {
    pub fn count(self) -> u32 {
        match self {
            Released::Alive(count) => count,
            Released::Destroyed => 0,
        }
    }
}

/// The proxy's own reference count. It is kept apart from the wrapped object's
/// count and alone decides when the proxy is torn down.
#[derive(Debug)]
pub struct RefCount(AtomicU32);

impl RefCount {
    pub fn new() -> RefCount {
        RefCount(AtomicU32::new(1))
    }

    pub fn get(&self) -> u32 {
        self.0.load(Ordering::Acquire)
    }

    pub fn increment(&self) -> u32 {
        self.0.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Returns the new count. Never wraps below zero.
    pub fn decrement(&self) -> u32 {
        let prev = self
            .0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| Some(n.saturating_sub(1)))
            .unwrap_or(0);
        prev.saturating_sub(1)
    }
}

impl Default for RefCount {
    fn default() -> Self {
        RefCount::new()
    }
}

/// Compares the proxy count decided by a release with what the wrapped object
/// reported for its own release. Disagreements are logged; the proxy count wins.
pub fn reconcile(name: &str, object: *const c_void, proxy: u32, real: u32) -> Released {
    match (proxy, real) {
        (0, 0) => Released::Destroyed,
        (0, real) => {
            warn!(
                "[dx11] Reference count for '{}' object {:p} is inconsistent: {}, but expected 0.",
                name, object, real
            );
            Released::Destroyed
        }
        (proxy, 0) => {
            warn!(
                "[dx11] Reference count for '{}' object {:p} reached 0 while the proxy still holds {}.",
                name, object, proxy
            );
            Released::Alive(proxy)
        }
        (_, real) => Released::Alive(real),
    }
}

/// The wrapped object pointer together with the newest revision it has been
/// queried for.
pub struct InterfaceSlot {
    orig: AtomicPtr<c_void>,
    version: AtomicU32,
    family: &'static InterfaceFamily,
}

impl InterfaceSlot {
    pub fn new(orig: Raw, family: &'static InterfaceFamily) -> InterfaceSlot {
        InterfaceSlot::with_version(orig, family, 0)
    }

    /// For objects the driver handed out already at a newer revision.
    pub fn with_version(orig: Raw, family: &'static InterfaceFamily, version: u32) -> InterfaceSlot {
        InterfaceSlot {
            orig: AtomicPtr::new(orig),
            version: AtomicU32::new(version),
            family,
        }
    }

    pub fn get(&self) -> Raw {
        self.orig.load(Ordering::Acquire)
    }

    pub fn version(&self) -> u32 {
        self.version.load(Ordering::Acquire)
    }

    pub fn family(&self) -> &'static InterfaceFamily {
        self.family
    }

    pub fn name(&self) -> String {
        self.family.display_name(self.version())
    }

    /// Raises the held object straight to revision `to`. Requests at or below the
    /// current revision succeed without touching anything. On refusal the slot is
    /// left as it was.
    ///
    /// SAFETY: the held pointer must be a live interface of this family.
    pub unsafe fn upgrade(&self, to: u32, owner: *const c_void) -> Result<(), HRESULT> {
        let from = self.version();
        if to <= from {
            return Ok(());
        }
        let riid = self
            .family
            .revisions
            .get(to as usize)
            .ok_or(E_NOINTERFACE)?;

        let upgraded = com::query(self.get(), riid).map_err(|_| E_NOINTERFACE)?;
        let previous = self.orig.swap(upgraded, Ordering::AcqRel);
        com::release(previous);
        self.version.fetch_max(to, Ordering::AcqRel);

        trace!(
            "[dx11] Upgraded '{}' object {:p} to '{}'.",
            self.family.display_name(from),
            owner,
            self.family.display_name(to)
        );
        Ok(())
    }
}
