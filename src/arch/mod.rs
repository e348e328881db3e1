//! # Architecture Abstraction Layer
//!
//! The scheduler core (`crate::scheduler`) is entirely target-agnostic;
//! this module is the one boundary it crosses. It owns stack
//! preparation (§4.1) and the Context Switch Primitive (§4.7) — the two
//! pieces the design notes call "irreducibly architecture-specific."
//!
//! The real port targets AVR (the 8-bit, ~2ms-tick class of board this
//! kernel is built for). A host fallback below keeps `scheduler.rs`,
//! `task.rs` and `event.rs`'s unit tests running under `cargo test`
//! without a device or cross toolchain; it does not attempt to emulate
//! a real register frame, since the host build never actually performs
//! a stack-pointer swap.

use crate::config::STACK_SENTINEL;
use crate::task::TaskFn;

/// Minimum stack size: a full AVR register-save frame (32 general
/// registers + `SREG`), the one free byte below it the stack pointer
/// itself points at, and the entry/guard return addresses `init_task`
/// prepares above it. `kernel::init_task` rejects anything smaller with
/// `KernelError::StackTooSmall`.
pub const MIN_STACK_BYTES: usize = 33 + 1 + 4;

#[cfg(target_arch = "avr")]
pub mod avr;

#[cfg(target_arch = "avr")]
pub use avr::{prepare_stack, restore_context_maybe_with_retval, save_context_full, save_context_sans_retval};

#[cfg(not(target_arch = "avr"))]
/// Host stand-in for [`avr::prepare_stack`]. Sentinel-fills the stack
/// for `get_stack_reserve` tests and returns a pointer a safe distance
/// from the top — it is never dereferenced as a real frame on this
/// target, since nothing here ever switches a real stack pointer.
pub fn prepare_stack(stack_area: *mut u8, stack_size: usize, _task_fn: TaskFn) -> *mut u8 {
    unsafe {
        core::ptr::write_bytes(stack_area, STACK_SENTINEL, stack_size);
        stack_area.add(stack_size.saturating_sub(MIN_STACK_BYTES))
    }
}

/// Host stand-ins for the AVR context-switch primitives: the pure
/// scheduler logic exercised under `cargo test` never performs a real
/// stack-pointer swap, so these exist only to let `crate::kernel`
/// build uniformly across targets. Calling them on a host build is a
/// logic error in this crate, not a reachable runtime path.
#[cfg(not(target_arch = "avr"))]
pub unsafe fn save_context_full(_out_slot: *mut *mut u8) {
    unreachable!("context switch primitives are AVR-only")
}

#[cfg(not(target_arch = "avr"))]
pub unsafe fn save_context_sans_retval(_out_slot: *mut *mut u8) -> crate::event::EventMask {
    unreachable!("context switch primitives are AVR-only")
}

#[cfg(not(target_arch = "avr"))]
pub unsafe fn restore_context_maybe_with_retval(_sp_in: *mut u8, _retval: Option<crate::event::EventMask>) -> ! {
    unreachable!("context switch primitives are AVR-only")
}
