//! # Kernel Configuration
//!
//! Compile-time constants governing the scheduler's static sizing.
//! Everything here bounds an array at build time — no dynamic
//! allocation occurs anywhere in this crate.

/// Number of application tasks the kernel manages. The task array holds
/// one extra slot beyond this for the idle task (see [`TOTAL_TASKS`]).
/// Increase with care — each task carries its own stack, supplied by
/// the application, not allocated here.
pub const MAX_TASKS: usize = 8;

/// Number of priority classes. Valid `prio_class` values are
/// `0..NUM_PRIO_CLASSES`; higher values are higher priority.
pub const NUM_PRIO_CLASSES: usize = 4;

/// Maximum number of tasks simultaneously ready within one priority
/// class. Bounds the per-class ready queue array.
pub const MAX_TASKS_PER_CLASS: usize = MAX_TASKS;

/// Total number of task slots, application tasks plus the idle task.
/// Index `MAX_TASKS` (the last slot) is always the idle task.
pub const TOTAL_TASKS: usize = MAX_TASKS + 1;

/// Index of the idle task's descriptor within the task array.
pub const IDLE_TASK: usize = MAX_TASKS;

/// Width of the wrapping tick counter. RTuinOS-class boards run a
/// ~2ms SysTick-equivalent; a 16-bit counter wraps after ~131s at that
/// rate, which is ample headroom for the overrun-detection half-range
/// rule in the timer tick handler.
pub type TickCount = u16;

/// Nominal tick period, used only for documentation purposes by the
/// application's `enable_timer_tick` hook; the kernel itself is unitless
/// in ticks.
pub const TICK_PERIOD_MS: u32 = 2;

/// Default per-task stack size in bytes for the demo firmware. Real
/// deployments size each task's stack area individually and pass it to
/// `init_task`.
pub const DEFAULT_STACK_SIZE: usize = 192;

/// Byte pattern used to prefill unused stack space, for later
/// stack-reserve inspection via `get_stack_reserve`.
pub const STACK_SENTINEL: u8 = 0x29;
