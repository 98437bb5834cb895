//! Hardware cycle counter
//!
//! `read_cycles()` returns raw counter ticks: `rdtsc` on x86_64,
//! `cntvct_el0` on aarch64. Other targets fall back to nanoseconds since a
//! process-local epoch. Ticks are never converted; reports show them as-is.

/// Read the cycle counter
#[inline(always)]
pub fn read_cycles() -> u64 {
    #[cfg(target_arch = "x86_64")]
    {
        // SAFETY: rdtsc has no preconditions and is available on every x86_64 CPU.
        unsafe { core::arch::x86_64::_rdtsc() }
    }
    #[cfg(target_arch = "aarch64")]
    {
        let val: u64;
        // SAFETY: cntvct_el0 is readable from EL0 on every aarch64 OS we target.
        unsafe { core::arch::asm!("mrs {}, cntvct_el0", out(reg) val) };
        val
    }
    #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
    {
        use std::sync::OnceLock;
        use std::time::Instant;

        static FALLBACK_EPOCH: OnceLock<Instant> = OnceLock::new();
        let epoch = FALLBACK_EPOCH.get_or_init(Instant::now);
        Instant::now().duration_since(*epoch).as_nanos() as u64
    }
}
