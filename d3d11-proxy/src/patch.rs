//! Process-wide registry of patched dispatch-table slots.
//!
//! A slot is rewritten at most once; later installs on the same table and slot
//! hand back the original recorded by the first one. Entries are never removed
//! since the patched tables belong to the driver and outlive every proxy.

use std::ffi::c_void;
use std::sync::LazyLock;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use log::trace;

use crate::error::ProxyError;

static PATCHES: LazyLock<DashMap<(usize, usize), usize>> = LazyLock::new(DashMap::new);

/// Reads the dispatch table pointer out of an interface pointer.
///
/// SAFETY: `object` must be a live interface pointer.
pub unsafe fn table_of(object: *mut c_void) -> *mut *const c_void {
    *(object as *const *mut *const c_void)
}

/// Replaces `table[slot]` with `replacement` and returns the function that was
/// there before. Idempotent per table and slot.
///
/// SAFETY: `table` must point to a dispatch table with more than `slot` entries.
pub unsafe fn install(
    table: *mut *const c_void,
    slot: usize,
    replacement: *const c_void,
) -> Result<*const c_void, ProxyError> {
    match PATCHES.entry((table as usize, slot)) {
        Entry::Occupied(entry) => Ok(*entry.get() as *const c_void),
        Entry::Vacant(entry) => {
            let target = table.add(slot);
            let original = target.read();
            if !write_slot(target, replacement) {
                return Err(ProxyError::PageProtection(table as usize, slot));
            }
            entry.insert(original as usize);
            trace!("[hook] Patched table {:p} slot {} ({:p} -> {:p}).", table, slot, original, replacement);
            Ok(original)
        }
    }
}

/// The function that was in `table[slot]` before it was patched.
pub fn original(table: *const *const c_void, slot: usize) -> Option<*const c_void> {
    PATCHES
        .get(&(table as usize, slot))
        .map(|original| *original as *const c_void)
}

#[cfg(windows)]
unsafe fn write_slot(target: *mut *const c_void, value: *const c_void) -> bool {
    use windows::Win32::System::Memory::{VirtualProtect, PAGE_PROTECTION_FLAGS, PAGE_READWRITE};

    let size = std::mem::size_of::<usize>();
    let mut old_protect = PAGE_PROTECTION_FLAGS(0);
    if !VirtualProtect(target as *const c_void, size, PAGE_READWRITE, &mut old_protect).as_bool() {
        return false;
    }
    target.write(value);
    VirtualProtect(target as *const c_void, size, old_protect, &mut old_protect);
    true
}

// Tables outside Windows only come from the test driver, which keeps them in
// writable memory.
#[cfg(not(windows))]
unsafe fn write_slot(target: *mut *const c_void, value: *const c_void) -> bool {
    target.write(value);
    true
}
