//! # Synchronization Primitives
//!
//! Interrupt-masking critical section for the AVR port. Every mutation
//! of the scheduler's shared state goes through [`critical_section`] —
//! either explicitly here, or implicitly by already running inside an
//! ISR prologue where the hardware has masked interrupts.
//!
//! The real implementation is AVR-specific inline assembly and is only
//! compiled for that target; host builds (`cargo test`) get a
//! single-threaded stand-in below so the scheduler's pure logic can be
//! exercised without a device, the same way the scheduler/task/event
//! unit tests run on the host.

#[cfg(target_arch = "avr")]
pub use avr::critical_section;

#[cfg(not(target_arch = "avr"))]
pub use host::critical_section;

#[cfg(target_arch = "avr")]
pub(crate) use avr::{mask_interrupts, unmask_interrupts};

#[cfg(not(target_arch = "avr"))]
pub(crate) use host::{mask_interrupts, unmask_interrupts};

#[cfg(target_arch = "avr")]
mod avr {
    use core::arch::asm;

    /// Execute a closure with interrupts globally disabled, restoring
    /// the previous interrupt-enable state (the `I` bit of `SREG`) on
    /// exit regardless of how the closure returns.
    ///
    /// This is the kernel's only mechanism for safely touching the
    /// ready queues, the suspended list, or any task descriptor from
    /// code that could otherwise be preempted by the timer tick or a
    /// user ISR. Keep the closure short: every tick's worth of latency
    /// spent here is latency every other task's event response
    /// inherits.
    #[inline]
    pub fn critical_section<F, R>(f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let sreg = read_and_disable_interrupts();
        let result = f();
        restore_interrupts(sreg);
        result
    }

    /// Read `SREG`, then clear the global interrupt-enable bit. Returns
    /// the pre-disable value so it can be restored verbatim — if
    /// interrupts were already off, `restore_interrupts` leaves them
    /// off.
    #[inline(always)]
    fn read_and_disable_interrupts() -> u8 {
        let sreg: u8;
        unsafe {
            asm!(
                "in {sreg}, 0x3f",
                "cli",
                sreg = out(reg) sreg,
                options(nomem, nostack, preserves_flags)
            );
        }
        sreg
    }

    /// Restore a previously saved `SREG` value, including its
    /// interrupt flag.
    #[inline(always)]
    fn restore_interrupts(sreg: u8) {
        unsafe {
            asm!(
                "out 0x3f, {sreg}",
                sreg = in(reg) sreg,
                options(nomem, nostack, preserves_flags)
            );
        }
    }

    /// Raw mask/unmask pair, exposed to `crate::kernel` for the one
    /// place [`critical_section`]'s closure shape doesn't fit: a
    /// syscall that may hand off to `arch::save_context_*` and not
    /// return to its own call site until some later, unrelated resume.
    /// That path must stay masked across "mutate scheduler state" and
    /// "maybe switch" as a single region, but must restore interrupts
    /// itself only on the branch that does *not* switch — the switch
    /// branch's eventual `reti` does that instead (§4.7's interrupt
    /// discipline).
    #[inline(always)]
    pub(crate) fn mask_interrupts() -> u8 {
        read_and_disable_interrupts()
    }

    #[inline(always)]
    pub(crate) fn unmask_interrupts(sreg: u8) {
        restore_interrupts(sreg)
    }
}

#[cfg(not(target_arch = "avr"))]
mod host {
    /// Host stand-in: nothing preempts the single-threaded test
    /// harness, so there is nothing to mask. Exists only so
    /// `crate::scheduler` can call `sync::critical_section` uniformly
    /// under `cargo test`.
    #[inline]
    pub fn critical_section<F, R>(f: F) -> R
    where
        F: FnOnce() -> R,
    {
        f()
    }

    /// Host stand-ins for the raw mask/unmask pair. Nothing to mask
    /// under the single-threaded test harness; the returned token is
    /// meaningless and ignored on unmask.
    #[inline]
    pub(crate) fn mask_interrupts() -> u8 {
        0
    }

    #[inline]
    pub(crate) fn unmask_interrupts(_sreg: u8) {}
}
