//! Detection of the execution context.

/// Returns `true` when called from an interrupt or exception handler.
///
/// On Cortex-M this reads the active vector number, which is zero in thread mode.
/// Targets without such a register always report thread context; their ports override
/// [`crate::kernel::Kernel::is_interrupt_context`] instead.
#[inline]
pub fn is_interrupt_context() -> bool {
    #[cfg(all(target_arch = "arm", target_os = "none"))]
    {
        use cortex_m::peripheral::{SCB, scb::VectActive};

        !matches!(SCB::vect_active(), VectActive::ThreadMode)
    }

    #[cfg(not(all(target_arch = "arm", target_os = "none")))]
    {
        false
    }
}
