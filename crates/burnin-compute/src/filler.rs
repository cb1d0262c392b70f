//! VRAM filler sizing

use crate::config::VramTarget;
use burnin_core::GIB;

/// Memory left free for the driver and other processes
pub const RESERVED_BYTES: u64 = GIB;

/// Memory kept back for the matrices and the product
pub const COMPUTE_BUDGET_BYTES: u64 = 2 * GIB;

/// Size of the filler buffer for a device with `total_bytes` installed.
///
/// The allocation target is total memory minus [`RESERVED_BYTES`], capped by
/// an explicit GiB target; the filler is that target minus
/// [`COMPUTE_BUDGET_BYTES`]. Returns zero when total memory is unknown.
pub fn plan_filler_bytes(total_bytes: Option<u64>, target: VramTarget) -> u64 {
    let Some(total) = total_bytes else {
        return 0;
    };

    let available = total.saturating_sub(RESERVED_BYTES);
    let allocation = match target {
        VramTarget::None => return 0,
        VramTarget::Max => available,
        VramTarget::Gigabytes(gb) => available.min((gb * GIB as f64) as u64),
    };

    allocation.saturating_sub(COMPUTE_BUDGET_BYTES)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_on_24_gib_card() {
        assert_eq!(plan_filler_bytes(Some(24 * GIB), VramTarget::Max), 21 * GIB);
    }

    #[test]
    fn test_explicit_target_is_capped() {
        assert_eq!(
            plan_filler_bytes(Some(24 * GIB), VramTarget::Gigabytes(10.0)),
            8 * GIB
        );
        assert_eq!(
            plan_filler_bytes(Some(16 * GIB), VramTarget::Gigabytes(40.0)),
            13 * GIB
        );
    }

    #[test]
    fn test_small_or_unknown_devices_get_no_filler() {
        assert_eq!(plan_filler_bytes(Some(2 * GIB), VramTarget::Max), 0);
        assert_eq!(plan_filler_bytes(Some(24 * GIB), VramTarget::Gigabytes(1.5)), 0);
        assert_eq!(plan_filler_bytes(None, VramTarget::Max), 0);
        assert_eq!(plan_filler_bytes(Some(80 * GIB), VramTarget::None), 0);
    }
}
