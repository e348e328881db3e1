//! # Error and Assertion Handling
//!
//! The kernel treats every violation of its invariants as a programming
//! error, not a runtime condition to recover from: a misconfigured task,
//! a zero wait mask, a wait called from idle. [`KernelError`] names
//! these; [`kernel_assert!`] is the single place that turns one into a
//! halt.
//!
//! Timing overruns and lost events are *not* errors in this sense —
//! they're counted (overruns) or silently dropped (lost events) by
//! design, per the kernel's documented behavior, and never reach this
//! module.

/// A programming error in the use of the kernel API. All variants are
/// detected at `init_task`/`wait_for_event` call sites and are fatal —
/// the kernel never attempts to recover from one itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    /// `init_task` was given a null/absent entry point.
    NullTaskFn,
    /// The supplied stack is smaller than the minimum context-switch
    /// frame.
    StackTooSmall,
    /// `init_task` was called more times than `MAX_TASKS` allows.
    TooManyTasks,
    /// `prio_class` is outside `0..NUM_PRIO_CLASSES`.
    InvalidPriorityClass,
    /// `wait_for_event` was called with an empty mask.
    ZeroWaitMask,
    /// `wait_for_event`'s mask set both `EVT_ABSOLUTE_TIMER` and
    /// `EVT_DELAY_TIMER`. Documented as "do not do" and treated here as
    /// undefined behavior at the contract level — rejected outright.
    BothTimerBitsSet,
    /// `init_task` was called after `init_rtos` handed control to
    /// `setup`'s return — i.e. outside the one legal window.
    InitOutsideSetup,
    /// `wait_for_event` was called from the idle task.
    WaitFromIdle,
}

impl KernelError {
    /// A short, `defmt`-friendly label, also used by the plain-halt path.
    pub const fn label(self) -> &'static str {
        match self {
            KernelError::NullTaskFn => "null task function",
            KernelError::StackTooSmall => "stack too small",
            KernelError::TooManyTasks => "too many tasks",
            KernelError::InvalidPriorityClass => "invalid priority class",
            KernelError::ZeroWaitMask => "zero wait mask",
            KernelError::BothTimerBitsSet => "both timer bits set in one wait",
            KernelError::InitOutsideSetup => "init_task called outside setup",
            KernelError::WaitFromIdle => "wait_for_event called from idle",
        }
    }
}

/// Report a fatal kernel misuse and halt.
///
/// With the `defmt` feature enabled this logs the error through
/// `defmt::panic!`; otherwise it falls through to the ordinary `panic!`
/// machinery, which `panic-halt` turns into an infinite loop with
/// interrupts left as the application configured them.
#[cold]
#[inline(never)]
pub fn report(error: KernelError) -> ! {
    #[cfg(feature = "defmt")]
    {
        defmt::panic!("kernel error: {}", error.label());
    }
    #[cfg(not(feature = "defmt"))]
    {
        panic!("kernel error: {}", error.label());
    }
}

/// Assert a kernel invariant, reporting `$err` via [`report`] if it does
/// not hold. Used at API boundaries instead of `assert!` so the failure
/// carries a [`KernelError`] variant rather than a source-line message.
#[macro_export]
macro_rules! kernel_assert {
    ($cond:expr, $err:expr) => {
        if !($cond) {
            $crate::error::report($err);
        }
    };
}
