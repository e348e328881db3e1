//! # Task Descriptor
//!
//! Defines the per-task state the kernel schedules. Each application
//! task gets one descriptor; a further descriptor (index
//! [`crate::config::IDLE_TASK`]) belongs to the idle task.
//!
//! Descriptors are stored inline in a fixed-size array owned by the
//! scheduler — there is no heap and no dynamic task creation after
//! [`crate::kernel::init_rtos`] starts. Which list a descriptor's index
//! currently lives in (a ready class, or the suspended list) *is* the
//! task's state; the descriptor itself carries no redundant state flag.

use crate::config::TickCount;
use crate::event::EventMask;

/// Task entry point. Invoked exactly once, at first activation; must
/// never return — the guard return address prepared at the base of
/// every stack resets the controller if it does.
pub type TaskFn = extern "C" fn() -> !;

/// Static configuration for a task, fixed at [`crate::kernel::init_task`]
/// time and never mutated afterward.
#[derive(Clone, Copy)]
pub struct TaskDescriptor {
    /// Saved stack pointer. Valid (and meaningful) only while the task
    /// is not active; updated exclusively by the context-switch
    /// primitive.
    pub stack_pointer: *mut u8,

    /// Priority class in `0..NUM_PRIO_CLASSES`. Higher is more
    /// important. Unused (left at 0) for the idle task, which is
    /// scheduled only when every class is empty.
    pub prio_class: u8,

    /// Task entry point. `None` only for a not-yet-initialized slot.
    pub task_fn: Option<TaskFn>,

    /// Absolute-timer target, a tick count compared against the
    /// kernel's wrapping clock.
    pub time_due_at: TickCount,

    /// Round-robin slice length in ticks. Zero disables round-robin
    /// for this task regardless of whether the feature is compiled in.
    pub time_round_robin: TickCount,

    /// Task-owned stack memory, supplied by the application and valid
    /// for the kernel's entire lifetime.
    pub stack_area: *mut u8,
    pub stack_size: usize,

    /// Relative-delay countdown. Zero means inactive.
    pub cnt_delay: TickCount,

    /// Remaining round-robin slice.
    pub cnt_round_robin: TickCount,

    /// Events posted while this descriptor was suspended. Doubles as
    /// the flag that tells the context-switch primitive this task's
    /// next resume must synthesize a return value (see
    /// [`crate::arch`]); cleared only there, never by the scheduler.
    pub posted_event_vec: EventMask,

    /// Events this task is currently suspended waiting for. Zero
    /// whenever the task is not in the suspended list.
    pub event_mask: EventMask,

    /// If `false`, every non-timer bit of `event_mask` must be posted
    /// (the one timer bit present, if any, releases unconditionally on
    /// its own). If `true`, any posted bit releases the task.
    pub wait_for_any: bool,

    /// Missed absolute-timer deadlines, saturating at 255.
    pub cnt_overrun: u8,

    /// Diagnostic label, set once at `init_task` time. Not part of
    /// spec.md's data model — it exists only so the `defmt`-gated
    /// scheduler log lines can name a task instead of an index.
    pub name: &'static str,
}

// Safety: `stack_pointer`/`stack_area` are raw pointers into memory the
// application dedicates to this task for the kernel's lifetime. All
// mutation happens inside a masked critical section or from the
// context-switch primitive itself, never concurrently.
unsafe impl Send for TaskDescriptor {}
unsafe impl Sync for TaskDescriptor {}

impl TaskDescriptor {
    /// An empty, not-yet-initialized descriptor slot.
    pub const fn empty() -> Self {
        Self {
            stack_pointer: core::ptr::null_mut(),
            prio_class: 0,
            task_fn: None,
            time_due_at: 0,
            time_round_robin: 0,
            stack_area: core::ptr::null_mut(),
            stack_size: 0,
            cnt_delay: 0,
            cnt_round_robin: 0,
            posted_event_vec: EventMask::NONE,
            event_mask: EventMask::NONE,
            wait_for_any: false,
            cnt_overrun: 0,
            name: "",
        }
    }

    /// True once [`crate::kernel::init_task`] (or idle setup) has filled
    /// in this slot.
    #[inline]
    pub const fn is_initialized(&self) -> bool {
        self.task_fn.is_some()
    }

    /// Saturating-increment the overrun counter, per the kernel's
    /// timing-overrun error kind: counted, never fatal.
    #[inline]
    pub fn record_overrun(&mut self) {
        self.cnt_overrun = self.cnt_overrun.saturating_add(1);
        #[cfg(feature = "defmt")]
        defmt::warn!(
            "task {=str} missed absolute-timer deadline (cnt_overrun={=u8})",
            self.name,
            self.cnt_overrun
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_descriptor_is_uninitialized() {
        let t = TaskDescriptor::empty();
        assert!(!t.is_initialized());
        assert_eq!(t.event_mask, EventMask::NONE);
        assert_eq!(t.cnt_overrun, 0);
    }

    #[test]
    fn overrun_counter_saturates() {
        let mut t = TaskDescriptor::empty();
        t.cnt_overrun = 254;
        t.record_overrun();
        assert_eq!(t.cnt_overrun, 255);
        t.record_overrun();
        assert_eq!(t.cnt_overrun, 255);
    }
}
