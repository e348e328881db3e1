//! # Kernel
//!
//! Top-level initialization and the public syscall surface: `init_task`,
//! `init_rtos`, `set_event`, `wait_for_event`, and the two diagnostic
//! reads. Owns the one global [`Scheduler`] instance and is the only
//! module that calls into [`crate::arch`]'s context-switch primitives —
//! everything below it is pure scheduling logic, everything above it
//! (`crate::arch`'s ISR vectors) calls back up into it only through
//! `SCHEDULER_PTR`.
//!
//! ## Startup Sequence
//!
//! ```text
//! reset vector (avr-gcc crt0)
//!   └─► main()
//!         └─► kernel::init_rtos()          ← never returns
//!               ├─► setup()                ← application calls init_task() here
//!               ├─► enable_timer_tick()     ← application arms the hardware timer
//!               ├─► enable_irq_user_00/01() ← only if the matching feature is on
//!               └─► loop { idle() }         ← becomes the idle task's body
//! ```

use crate::arch;
use crate::config::{TickCount, IDLE_TASK, MAX_TASKS, NUM_PRIO_CLASSES, STACK_SENTINEL};
use crate::error::KernelError;
use crate::event::EventMask;
use crate::kernel_assert;
use crate::scheduler::Scheduler;
use crate::sync;
use crate::task::TaskFn;

// ---------------------------------------------------------------------------
// Application hooks
// ---------------------------------------------------------------------------

extern "Rust" {
    /// Called once, from [`init_rtos`], before the timer tick is armed.
    /// The only legal place to call [`init_task`].
    fn setup();

    /// The idle task's body, called in a loop for as long as no
    /// application task is ready. Runs with interrupts enabled and is
    /// preempted like any other task, but owns no descriptor beyond
    /// [`crate::config::IDLE_TASK`]'s slot.
    fn idle();

    /// Arms the hardware timer the application wires to
    /// `crate::arch::avr::__kernel_timer_tick_vector`, at the period
    /// the application chose (nominally [`crate::config::TICK_PERIOD_MS`]).
    fn enable_timer_tick();
}

#[cfg(feature = "isr-user-0")]
extern "Rust" {
    /// Arms the hardware interrupt source the application wires to
    /// `crate::arch::avr::__kernel_user_isr_00_vector`.
    fn enable_irq_user_00();
}

#[cfg(feature = "isr-user-1")]
extern "Rust" {
    /// Arms the hardware interrupt source the application wires to
    /// `crate::arch::avr::__kernel_user_isr_01_vector`.
    fn enable_irq_user_01();
}

// ---------------------------------------------------------------------------
// Global scheduler instance
// ---------------------------------------------------------------------------

/// Global scheduler instance.
///
/// # Safety
/// Accessed via `SCHEDULER_PTR`, set once by `init_rtos`. Every access
/// from task context goes through a masked section in this module;
/// every access from ISR context (`crate::arch::avr`) is already
/// serialized by the hardware having masked interrupts on entry.
static mut SCHEDULER: Scheduler = Scheduler::new();

/// Raw pointer to the global scheduler, read by the arch layer's naked
/// ISR vectors and context-switch helpers, which cannot easily thread a
/// reference through hand-written assembly.
///
/// # Safety
/// Set once, in `init_rtos`, before the timer tick or any user ISR is
/// armed. Never reassigned afterward.
#[no_mangle]
pub static mut SCHEDULER_PTR: *mut Scheduler = core::ptr::null_mut();

/// True only during the application's `setup()` call, the one legal
/// window for [`init_task`]. Plain `static mut`, not an atomic: written
/// only from `init_rtos`'s single-threaded startup sequence, before the
/// timer tick or any user ISR is armed, so nothing can race it.
static mut IN_SETUP: bool = false;

// ---------------------------------------------------------------------------
// Startup
// ---------------------------------------------------------------------------

/// Initialize the scheduler, run the application's `setup()`, arm the
/// timer (and optional user ISRs), then become the idle task. **Does
/// not return.**
///
/// # Safety
/// Must be called exactly once, from `main`, with interrupts globally
/// disabled at entry (the reset state on AVR already satisfies this).
pub fn init_rtos() -> ! {
    unsafe {
        SCHEDULER = Scheduler::new();
        SCHEDULER_PTR = &mut SCHEDULER as *mut Scheduler;
        SCHEDULER.init_idle_descriptor();

        IN_SETUP = true;
        setup();
        IN_SETUP = false;

        enable_timer_tick();
        #[cfg(feature = "isr-user-0")]
        enable_irq_user_00();
        #[cfg(feature = "isr-user-1")]
        enable_irq_user_01();

        // The prepared descriptor frames already carry SREG with the
        // I-bit set (`arch::prepare_stack`), but this stack — the one
        // idle keeps running on below — was never prepared by anyone;
        // its own enable has to happen here, once, by hand.
        #[cfg(target_arch = "avr")]
        core::arch::asm!("sei", options(nomem, nostack));

        loop {
            idle();
        }
    }
}

// ---------------------------------------------------------------------------
// Task registration
// ---------------------------------------------------------------------------

/// Register task `idx`, to be called only from inside `setup()`.
///
/// `stack_area`/`stack_size` describe memory the application owns for
/// the kernel's entire lifetime. If `start_mask` is non-empty the task
/// starts suspended on that condition instead of ready, per the same
/// rules [`crate::scheduler::Scheduler::wait_for_event`] uses for a
/// task suspending itself.
#[allow(clippy::too_many_arguments)]
pub fn init_task(
    idx: usize,
    task_fn: TaskFn,
    prio_class: u8,
    time_round_robin: TickCount,
    stack_area: *mut u8,
    stack_size: usize,
    start_mask: EventMask,
    start_all: bool,
    start_timeout: TickCount,
    name: &'static str,
) -> Result<(), KernelError> {
    if !unsafe { IN_SETUP } {
        return Err(KernelError::InitOutsideSetup);
    }
    if task_fn as usize == 0 {
        return Err(KernelError::NullTaskFn);
    }
    if idx >= MAX_TASKS {
        return Err(KernelError::TooManyTasks);
    }
    if prio_class as usize >= NUM_PRIO_CLASSES {
        return Err(KernelError::InvalidPriorityClass);
    }
    if stack_size < arch::MIN_STACK_BYTES {
        return Err(KernelError::StackTooSmall);
    }
    if start_mask.contains(EventMask::EVT_ABSOLUTE_TIMER) && start_mask.contains(EventMask::EVT_DELAY_TIMER) {
        return Err(KernelError::BothTimerBitsSet);
    }

    let stack_pointer = arch::prepare_stack(stack_area, stack_size, task_fn);

    unsafe {
        (*SCHEDULER_PTR).init_task_descriptor(
            idx,
            task_fn,
            prio_class,
            time_round_robin,
            stack_pointer,
            stack_area,
            stack_size,
            start_mask,
            start_all,
            start_timeout,
            name,
        );
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Post Primitive (§4.5)
// ---------------------------------------------------------------------------

/// Post `vec`. System-timer bits are masked off before posting — they
/// are system-generated only. Never called from `setup()`.
///
/// If posting released a higher-priority task, the caller is
/// descheduled (not suspended) and a context switch runs before this
/// function returns to it.
pub fn set_event(vec: EventMask) {
    let vec = vec.without(EventMask::TIMER_BITS);
    let sreg = sync::mask_interrupts();

    unsafe {
        (*SCHEDULER_PTR).set_event(vec);
    }

    let out_idx = unsafe { (*SCHEDULER_PTR).switch_out_task.take() };
    match out_idx {
        Some(out_idx) => {
            let slot = unsafe { &mut (*SCHEDULER_PTR).tasks[out_idx].stack_pointer as *mut *mut u8 };
            // Diverges from this call's point of view until the
            // scheduler picks this task active again; interrupts are
            // re-enabled by the eventual `reti`, not here.
            unsafe { arch::save_context_full(slot) };
        }
        None => sync::unmask_interrupts(sreg),
    }
}

// ---------------------------------------------------------------------------
// Wait Primitive (§4.4)
// ---------------------------------------------------------------------------

/// Suspend the calling task until `mask`'s release condition holds (any
/// bit, if `all` is false, else every non-timer bit plus either timer
/// bit unconditionally) or `timeout` ticks elapse, whichever is first.
/// Returns the event set that released it. Never called from idle.
///
/// # Panics (via [`crate::error::report`])
/// If `mask` is empty, sets both timer bits at once, or the caller is
/// the idle task.
pub fn wait_for_event(mask: EventMask, all: bool, timeout: TickCount) -> EventMask {
    kernel_assert!(!mask.is_empty(), KernelError::ZeroWaitMask);
    kernel_assert!(
        !(mask.contains(EventMask::EVT_ABSOLUTE_TIMER) && mask.contains(EventMask::EVT_DELAY_TIMER)),
        KernelError::BothTimerBitsSet
    );

    let sreg = sync::mask_interrupts();

    let active = unsafe { (*SCHEDULER_PTR).active_task };
    if active == IDLE_TASK {
        sync::unmask_interrupts(sreg);
        crate::error::report(KernelError::WaitFromIdle);
    }

    let caller = unsafe { (*SCHEDULER_PTR).wait_for_event(mask, !all, timeout) };
    let slot = unsafe { &mut (*SCHEDULER_PTR).tasks[caller].stack_pointer as *mut *mut u8 };

    // Diverges here, too, until released; the releasing event set
    // comes back through the avr-gcc 16-bit return convention, spliced
    // in by `arch::restore_context_maybe_with_retval` at resume time.
    unsafe { arch::save_context_sans_retval(slot) }
}

// ---------------------------------------------------------------------------
// Diagnostics
// ---------------------------------------------------------------------------

/// Read task `idx`'s saturating overrun counter, optionally resetting
/// it to zero in the same masked section.
pub fn get_task_overrun_counter(idx: usize, reset: bool) -> u8 {
    sync::critical_section(|| unsafe {
        let t = &mut (*SCHEDULER_PTR).tasks[idx];
        let value = t.cnt_overrun;
        if reset {
            t.cnt_overrun = 0;
        }
        value
    })
}

/// Count the leading sentinel bytes ([`STACK_SENTINEL`]) in task `idx`'s
/// stack area — a high-water-mark estimate of how much of the stack
/// the task has ever actually used, read from low memory upward to the
/// first byte the task's own execution has overwritten.
pub fn get_stack_reserve(idx: usize) -> u16 {
    let (area, size) = sync::critical_section(|| unsafe {
        let t = &(*SCHEDULER_PTR).tasks[idx];
        (t.stack_area, t.stack_size)
    });

    let mut reserve: u16 = 0;
    for i in 0..size {
        let byte = unsafe { core::ptr::read(area.add(i)) };
        if byte != STACK_SENTINEL {
            break;
        }
        reserve += 1;
    }
    reserve
}
