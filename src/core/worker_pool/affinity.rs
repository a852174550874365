//! Best-effort CPU pinning.

use crate::core::error::AffinityError;

/// CPU ids the current process may be pinned to. Empty when the platform
/// does not expose them.
#[must_use]
pub fn available_cpus() -> Vec<usize> {
    core_affinity::get_core_ids()
        .map(|ids| ids.into_iter().map(|core| core.id).collect())
        .unwrap_or_default()
}

/// Pin the calling thread to `cpu`.
///
/// # Errors
///
/// Returns an [`AffinityError`] describing why pinning was not possible.
/// Workers log and ignore it.
pub fn pin_current_thread(cpu: usize) -> Result<(), AffinityError> {
    let ids = core_affinity::get_core_ids().ok_or(AffinityError::NoCoreIds)?;
    let core = ids
        .into_iter()
        .find(|core| core.id == cpu)
        .ok_or(AffinityError::CoreNotAvailable(cpu))?;
    if core_affinity::set_for_current(core) {
        Ok(())
    } else {
        Err(AffinityError::Rejected(cpu))
    }
}
