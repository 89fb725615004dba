//! Processor features the bootstrap hierarchy depends on.

use kernel_registers::cpuid::ExtendedFeaturesEdx;
use log::{error, info};

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CpuError {
    #[error("the CPU does not support long mode")]
    NoLongMode,
    #[error("the CPU does not support no-execute pages")]
    NoExecuteDisable,
}

/// Check the `CPUID.80000001H` feature bits before `EFER.NXE` is set.
///
/// `None` means the extended leaf is not implemented, which rules out
/// long mode.
///
/// # Errors
/// - [`CpuError::NoLongMode`] without long mode.
/// - [`CpuError::NoExecuteDisable`] without NX. Setting `EFER.NXE` would
///   fault and every non-executable leaf would be malformed.
pub fn check_cpu(features: Option<ExtendedFeaturesEdx>) -> Result<(), CpuError> {
    let Some(features) = features.filter(|f| f.long_mode()) else {
        error!("CPU does not support long mode");
        return Err(CpuError::NoLongMode);
    };
    if !features.nx() {
        error!("CPU does not support the execute-disable bit");
        return Err(CpuError::NoExecuteDisable);
    }
    info!("CPU supports long mode and NX");
    Ok(())
}
