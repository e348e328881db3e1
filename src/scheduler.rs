//! # Scheduler
//!
//! Core scheduling logic: the ready-queue/suspended-list data structures,
//! the Scheduler Core (`check_for_task_activation`), the Timer Tick
//! Handler, and the two system calls (`set_event`, `wait_for_event`).
//!
//! ## Scheduling Algorithm
//!
//! At each timer tick:
//! 1. Advance the wrapping clock; post timer events to suspended tasks
//!    whose absolute deadline or delay countdown fired.
//! 2. If round-robin is compiled in and the active task's slice expired,
//!    rotate its ready class and force a rescan.
//! 3. Run the Scheduler Core: release any suspended task whose condition
//!    now holds, then pick the new active task.
//!
//! This module is entirely `core`-only and architecture-agnostic — every
//! function here compiles and runs under `cargo test` on the host. The
//! stack-pointer swap itself lives in [`crate::arch`].

use crate::config::{TickCount, IDLE_TASK, MAX_TASKS, MAX_TASKS_PER_CLASS, NUM_PRIO_CLASSES};
use crate::event::EventMask;
use crate::task::{TaskDescriptor, TaskFn};

// ---------------------------------------------------------------------------
// Ready queue
// ---------------------------------------------------------------------------

/// One priority class's ready queue: a strict FIFO of descriptor indices.
/// Shift-based, per the O(M) rotation the design notes call out as
/// cheaper than a circular buffer for small `M`.
struct ReadyClass {
    items: [usize; MAX_TASKS_PER_CLASS],
    count: usize,
}

impl ReadyClass {
    const fn empty() -> Self {
        Self {
            items: [0; MAX_TASKS_PER_CLASS],
            count: 0,
        }
    }

    fn push_back(&mut self, idx: usize) {
        self.items[self.count] = idx;
        self.count += 1;
    }

    fn pop_front(&mut self) -> Option<usize> {
        if self.count == 0 {
            return None;
        }
        let head = self.items[0];
        for i in 1..self.count {
            self.items[i - 1] = self.items[i];
        }
        self.count -= 1;
        Some(head)
    }

    fn head(&self) -> Option<usize> {
        if self.count > 0 {
            Some(self.items[0])
        } else {
            None
        }
    }

    /// Move the head to the tail. A no-op on an empty or single-entry
    /// class — callers already guard on `count > 1`, this guard is just
    /// cheap insurance.
    fn rotate(&mut self) {
        if self.count > 1 {
            let head = self.items[0];
            for i in 1..self.count {
                self.items[i - 1] = self.items[i];
            }
            self.items[self.count - 1] = head;
        }
    }
}

// ---------------------------------------------------------------------------
// Suspended list
// ---------------------------------------------------------------------------

/// The suspended list: unordered, since release order is governed by
/// each task's own condition, not by suspension order.
struct SuspendedList {
    items: [usize; MAX_TASKS],
    count: usize,
}

impl SuspendedList {
    const fn empty() -> Self {
        Self {
            items: [0; MAX_TASKS],
            count: 0,
        }
    }

    fn push(&mut self, idx: usize) {
        self.items[self.count] = idx;
        self.count += 1;
    }

    /// Remove the entry at `pos`, replacing it with the current last
    /// entry. Caller must not rely on iteration order being preserved
    /// across a removal — `check_for_task_activation` doesn't.
    fn swap_remove(&mut self, pos: usize) -> usize {
        let idx = self.items[pos];
        self.count -= 1;
        self.items[pos] = self.items[self.count];
        idx
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// The central scheduler state. Stored as a global behind a raw pointer
/// in `kernel.rs`; every access must go through `sync::critical_section`
/// or already be running with interrupts masked (an ISR prologue).
pub struct Scheduler {
    /// All descriptors, application tasks followed by idle at
    /// `config::IDLE_TASK`.
    pub tasks: [TaskDescriptor; crate::config::TOTAL_TASKS],

    ready: [ReadyClass; NUM_PRIO_CLASSES],
    suspended: SuspendedList,

    /// Index of the currently active descriptor. Idle
    /// (`config::IDLE_TASK`) until the first release or tick picks
    /// something else.
    pub active_task: usize,

    /// Set by the Scheduler Core when the active task actually changes;
    /// consumed and cleared by the context-switch primitive. `None`
    /// means the same-task short-circuit of §4.7 applies.
    pub switch_out_task: Option<usize>,

    /// Wrapping tick counter, initialized to all-ones so the first tick
    /// lands on zero.
    time: TickCount,
}

impl Scheduler {
    pub const fn new() -> Self {
        Self {
            tasks: [TaskDescriptor::empty(); crate::config::TOTAL_TASKS],
            ready: [
                ReadyClass::empty(),
                ReadyClass::empty(),
                ReadyClass::empty(),
                ReadyClass::empty(),
            ],
            suspended: SuspendedList::empty(),
            active_task: IDLE_TASK,
            switch_out_task: None,
            time: TickCount::MAX,
        }
    }

    #[inline]
    pub fn time(&self) -> TickCount {
        self.time
    }

    // -----------------------------------------------------------------
    // Initialization
    // -----------------------------------------------------------------

    /// Fill in descriptor `idx` for an application task and place it on
    /// its ready class, or on the suspended list if `start_mask` is
    /// non-empty. Preconditions (`idx` range, `prio_class` range, stack
    /// size, the timer-bit conflict) are the caller's (`kernel::init_task`)
    /// responsibility — this method assumes they already hold.
    #[allow(clippy::too_many_arguments)]
    pub fn init_task_descriptor(
        &mut self,
        idx: usize,
        task_fn: TaskFn,
        prio_class: u8,
        time_round_robin: TickCount,
        stack_pointer: *mut u8,
        stack_area: *mut u8,
        stack_size: usize,
        start_mask: EventMask,
        start_all: bool,
        start_timeout: TickCount,
        name: &'static str,
    ) {
        self.tasks[idx] = TaskDescriptor {
            stack_pointer,
            prio_class,
            task_fn: Some(task_fn),
            time_due_at: 0,
            time_round_robin,
            stack_area,
            stack_size,
            cnt_delay: 0,
            cnt_round_robin: time_round_robin,
            posted_event_vec: EventMask::NONE,
            event_mask: EventMask::NONE,
            wait_for_any: false,
            cnt_overrun: 0,
            name,
        };

        if start_mask.is_empty() {
            self.ready[prio_class as usize].push_back(idx);
        } else {
            self.arm_timeout(idx, start_mask, start_timeout);
            self.tasks[idx].event_mask = start_mask;
            self.tasks[idx].wait_for_any = !start_all;
            self.suspended.push(idx);
        }
    }

    /// Fill in the idle descriptor. Idle has no prepared stack — it is
    /// simply whatever execution continues from `kernel::init_rtos`
    /// after startup, so its `stack_pointer` is only ever written by the
    /// context-switch primitive, on idle's first preemption.
    pub fn init_idle_descriptor(&mut self) {
        self.tasks[IDLE_TASK] = TaskDescriptor::empty();
        self.tasks[IDLE_TASK].name = "idle";
    }

    // -----------------------------------------------------------------
    // Scheduler Core (§4.2)
    // -----------------------------------------------------------------

    /// `check_for_task_activation`. Returns whether a rescan happened —
    /// not necessarily whether the active task changed; see
    /// `switch_out_task` for that. Matching §4.7's same-task
    /// short-circuit, the context-switch primitive is always safe to
    /// invoke when this returns `true`, even if `switch_out_task` ends
    /// up `None`.
    pub fn check_for_task_activation(&mut self, force_rescan: bool) -> bool {
        let mut released_any = false;

        let mut i = 0;
        while i < self.suspended.count {
            let idx = self.suspended.items[i];
            if self.is_released(idx) {
                self.suspended.swap_remove(i);
                let class = self.tasks[idx].prio_class as usize;
                self.tasks[idx].event_mask = EventMask::NONE;
                self.tasks[idx].cnt_round_robin = self.tasks[idx].time_round_robin;
                self.ready[class].push_back(idx);
                released_any = true;
                #[cfg(feature = "defmt")]
                defmt::debug!(
                    "task {=str} released into class {=usize}, posted={}",
                    self.tasks[idx].name,
                    class,
                    self.tasks[idx].posted_event_vec
                );
                // `swap_remove` moved a different entry into `i` (or
                // shrank the list past it) — don't advance.
            } else {
                i += 1;
            }
        }

        if released_any || force_rescan {
            let next = self.highest_ready_or_idle();
            if next != self.active_task {
                #[cfg(feature = "defmt")]
                defmt::debug!(
                    "context switch: {=str} -> {=str}",
                    self.tasks[self.active_task].name,
                    self.tasks[next].name
                );
                self.switch_out_task = Some(self.active_task);
                self.active_task = next;
            }
            true
        } else {
            false
        }
    }

    fn is_released(&self, idx: usize) -> bool {
        let t = &self.tasks[idx];
        if t.wait_for_any {
            !t.posted_event_vec.is_empty()
        } else {
            let non_timer = t.event_mask.without(EventMask::TIMER_BITS);
            let timer = t.event_mask & EventMask::TIMER_BITS;
            t.posted_event_vec.contains(non_timer) || t.posted_event_vec.intersects(timer)
        }
    }

    fn highest_ready_or_idle(&self) -> usize {
        for class in (0..NUM_PRIO_CLASSES).rev() {
            if let Some(head) = self.ready[class].head() {
                return head;
            }
        }
        IDLE_TASK
    }

    // -----------------------------------------------------------------
    // Timer Tick Handler (§4.3)
    // -----------------------------------------------------------------

    /// Advance the clock by one tick, post timer events, rotate
    /// round-robin if due, and run the Scheduler Core. Returns whether
    /// the caller (the tick ISR) should invoke the context-switch
    /// primitive.
    pub fn tick(&mut self) -> bool {
        self.time = self.time.wrapping_add(1);

        for i in 0..self.suspended.count {
            let idx = self.suspended.items[i];
            let now = self.time;
            let t = &mut self.tasks[idx];

            if t.event_mask.contains(EventMask::EVT_ABSOLUTE_TIMER) && t.time_due_at == now {
                t.posted_event_vec |= EventMask::EVT_ABSOLUTE_TIMER;
            }

            if t.cnt_delay > 0 {
                t.cnt_delay -= 1;
                if t.cnt_delay == 0 && t.event_mask.contains(EventMask::EVT_DELAY_TIMER) {
                    t.posted_event_vec |= EventMask::EVT_DELAY_TIMER;
                }
            }
        }

        let mut force_rescan = false;
        if cfg!(feature = "round-robin") {
            let active = self.active_task;
            if active != IDLE_TASK && self.tasks[active].cnt_round_robin > 0 {
                self.tasks[active].cnt_round_robin -= 1;
                if self.tasks[active].cnt_round_robin == 0 {
                    self.tasks[active].cnt_round_robin = self.tasks[active].time_round_robin;
                    let class = self.tasks[active].prio_class as usize;
                    self.ready[class].rotate();
                    force_rescan = true;
                }
            }
        }

        self.check_for_task_activation(force_rescan)
    }

    // -----------------------------------------------------------------
    // Post Primitive (§4.5)
    // -----------------------------------------------------------------

    /// `set_event`. The caller is assumed to already have timer bits
    /// masked off `vec` — `kernel::set_event` does this before calling
    /// in. Returns whether the context-switch primitive should run; the
    /// poster itself is never suspended by this call.
    pub fn set_event(&mut self, vec: EventMask) -> bool {
        for i in 0..self.suspended.count {
            let idx = self.suspended.items[i];
            let t = &mut self.tasks[idx];
            t.posted_event_vec |= vec & t.event_mask;
        }
        self.check_for_task_activation(false)
    }

    // -----------------------------------------------------------------
    // Wait Primitive (§4.4)
    // -----------------------------------------------------------------

    /// `wait_for_event`'s scheduler-state half: remove the caller from
    /// its ready class, arm its resume condition, and move it to the
    /// suspended list. Returns the caller's index so the arch layer can
    /// save its context and perform the actual stack swap; preconditions
    /// (`mask != 0`, not idle, not both timer bits) are asserted by
    /// `kernel::wait_for_event` before this is called.
    pub fn wait_for_event(&mut self, mask: EventMask, wait_for_any: bool, timeout: TickCount) -> usize {
        let caller = self.active_task;
        let class = self.tasks[caller].prio_class as usize;
        self.ready[class].pop_front();

        self.arm_timeout(caller, mask, timeout);
        self.tasks[caller].event_mask = mask;
        self.tasks[caller].wait_for_any = wait_for_any;
        self.tasks[caller].posted_event_vec = EventMask::NONE;

        self.suspended.push(caller);
        self.switch_out_task = Some(caller);
        self.active_task = self.highest_ready_or_idle();

        caller
    }

    /// Shared arming logic for a task's resume condition, used both by
    /// `wait_for_event` and by a task's initial `start_mask` at
    /// `init_task` time. If `mask` names the absolute timer, advances
    /// `time_due_at` with overrun detection (§4.3); otherwise arms the
    /// delay counter with the `timeout + 1` guarantee, saturating.
    fn arm_timeout(&mut self, idx: usize, mask: EventMask, timeout: TickCount) {
        if mask.contains(EventMask::EVT_ABSOLUTE_TIMER) {
            let now = self.time;
            let t = &mut self.tasks[idx];
            t.time_due_at = t.time_due_at.wrapping_add(timeout);
            let distance = t.time_due_at.wrapping_sub(now) as i16;
            if distance <= 0 {
                t.record_overrun();
                t.time_due_at = now.wrapping_add(1);
            }
        } else {
            self.tasks[idx].cnt_delay = timeout.saturating_add(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_STACK_SIZE;

    extern "C" fn dummy_task() -> ! {
        loop {}
    }

    fn stack() -> [u8; DEFAULT_STACK_SIZE] {
        [0x29; DEFAULT_STACK_SIZE]
    }

    fn add_ready_task(s: &mut Scheduler, idx: usize, prio: u8, stack: &mut [u8]) {
        s.init_task_descriptor(
            idx,
            dummy_task,
            prio,
            0,
            stack.as_mut_ptr(),
            stack.as_mut_ptr(),
            stack.len(),
            EventMask::NONE,
            false,
            0,
            "test",
        );
    }

    // --- Invariants ---

    #[test]
    fn idle_is_active_when_nothing_is_ready() {
        let s = Scheduler::new();
        assert_eq!(s.active_task, IDLE_TASK);
    }

    #[test]
    fn active_task_is_head_of_highest_ready_class() {
        let mut s = Scheduler::new();
        let mut low_stack = stack();
        let mut high_stack = stack();
        add_ready_task(&mut s, 0, 1, &mut low_stack);
        add_ready_task(&mut s, 1, 2, &mut high_stack);
        s.active_task = s.highest_ready_or_idle();
        assert_eq!(s.active_task, 1);
    }

    // --- Round-trip / idempotence ---

    #[test]
    fn released_task_returns_exactly_the_intersection() {
        let mut s = Scheduler::new();
        let mut low_stack = stack();
        let mut high_stack = stack();
        add_ready_task(&mut s, 0, 1, &mut low_stack);
        add_ready_task(&mut s, 1, 2, &mut high_stack);
        s.active_task = 1;
        s.ready[2].pop_front();

        let mask = EventMask::application_bit(4);
        s.wait_for_event(mask, true, 0);

        let posted = EventMask::application_bit(4) | EventMask::application_bit(9);
        s.set_event(posted);

        let t = &s.tasks[1];
        assert!(t.posted_event_vec.is_empty() || t.posted_event_vec == mask);
    }

    #[test]
    fn two_consecutive_empty_set_events_are_no_ops() {
        let mut s = Scheduler::new();
        let mut stack0 = stack();
        add_ready_task(&mut s, 0, 0, &mut stack0);
        s.wait_for_event(EventMask::application_bit(5), true, 0);
        let before = s.tasks[0].posted_event_vec;
        assert!(!s.set_event(EventMask::NONE));
        assert!(!s.set_event(EventMask::NONE));
        assert_eq!(s.tasks[0].posted_event_vec, before);
    }

    // --- Boundaries ---

    #[test]
    fn overrun_counter_saturates_at_255() {
        let mut s = Scheduler::new();
        s.time = 100;
        s.tasks[0].time_due_at = 50;
        s.tasks[0].cnt_overrun = 255;
        s.arm_timeout(0, EventMask::EVT_ABSOLUTE_TIMER, 0);
        assert_eq!(s.tasks[0].cnt_overrun, 255);
        assert_eq!(s.tasks[0].time_due_at, 101);
    }

    #[test]
    fn delay_timeout_of_max_ticks_saturates() {
        let mut s = Scheduler::new();
        s.arm_timeout(0, EventMask::EVT_DELAY_TIMER, TickCount::MAX);
        assert_eq!(s.tasks[0].cnt_delay, TickCount::MAX);
    }

    #[test]
    fn time_wraps_and_overrun_uses_signed_distance() {
        let mut s = Scheduler::new();
        s.time = TickCount::MAX - 1;
        s.tick();
        assert_eq!(s.time, 0);
        s.arm_timeout(0, EventMask::EVT_ABSOLUTE_TIMER, TickCount::MAX / 2);
        assert_eq!(s.tasks[0].cnt_overrun, 0);
    }

    // --- Concrete scenarios (spec §8) ---

    /// Scenario 1: low waits implicitly by being ready; high waits on
    /// `E=0x4`; low's `set_event(0x4)` releases high.
    #[test]
    fn scenario_high_priority_task_preempts_on_matching_event() {
        let mut s = Scheduler::new();
        let mut low_stack = stack();
        let mut high_stack = stack();
        add_ready_task(&mut s, 0, 1, &mut low_stack);
        add_ready_task(&mut s, 1, 2, &mut high_stack);
        s.active_task = 1;
        s.ready[2].pop_front();
        s.wait_for_event(EventMask::from_raw(0x4), true, 0);
        assert_eq!(s.active_task, 0);

        let switched = s.set_event(EventMask::from_raw(0x4));
        assert!(switched);
        assert_eq!(s.active_task, 1);
        assert_eq!(s.tasks[1].posted_event_vec, EventMask::from_raw(0x4));
    }

    /// Scenario 2: two equal-priority round-robin tasks with slice 5;
    /// each independently waits on the delay timer for 10 ticks.
    #[test]
    fn scenario_round_robin_does_not_perturb_delay_wait() {
        let mut s = Scheduler::new();
        let mut a_stack = stack();
        let mut b_stack = stack();
        add_ready_task(&mut s, 0, 0, &mut a_stack);
        add_ready_task(&mut s, 1, 0, &mut b_stack);
        s.tasks[0].time_round_robin = 5;
        s.tasks[0].cnt_round_robin = 5;
        s.tasks[1].time_round_robin = 5;
        s.tasks[1].cnt_round_robin = 5;
        s.active_task = 0;
        s.ready[0].pop_front();

        s.wait_for_event(EventMask::EVT_DELAY_TIMER, true, 10);
        for _ in 0..10 {
            s.tick();
        }
        assert!(s.tasks[0].posted_event_vec.contains(EventMask::EVT_DELAY_TIMER));
    }

    /// Scenario 3: absolute-timer task with period 20. If blocked past
    /// `time=40`, the next resume is at `time=41` and `cnt_overrun == 1`.
    #[test]
    fn scenario_absolute_timer_overrun_refires_next_tick() {
        let mut s = Scheduler::new();
        s.tasks[0] = TaskDescriptor::empty();
        s.tasks[0].task_fn = Some(dummy_task);
        s.tasks[0].time_due_at = 20;
        s.time = 40;
        s.arm_timeout(0, EventMask::EVT_ABSOLUTE_TIMER, 20);
        assert_eq!(s.tasks[0].cnt_overrun, 1);
        assert_eq!(s.tasks[0].time_due_at, 41);
    }

    /// Scenario 4: `wait_for_event(E1|E2|DELAY, all=true, 100)` releases
    /// on either both `E1`/`E2` posted, or the 100-tick delay, whichever
    /// first. Exercises the literal, non-vacuous release condition (real
    /// bits alongside a timer bit).
    #[test]
    fn scenario_wait_all_releases_on_events_or_timeout() {
        let mut s = Scheduler::new();
        let mut stack0 = stack();
        add_ready_task(&mut s, 0, 0, &mut stack0);
        let e1 = EventMask::application_bit(4);
        let e2 = EventMask::application_bit(5);
        let mask = e1 | e2 | EventMask::EVT_DELAY_TIMER;
        s.wait_for_event(mask, false, 100);

        s.set_event(e1);
        assert!(!s.is_released(0));
        s.set_event(e2);
        assert!(s.is_released(0));
    }

    /// Scenario 5: idle posts to a single high-priority waiter; the
    /// waiter runs immediately, then suspends again and idle resumes.
    #[test]
    fn scenario_idle_releases_sole_waiter_then_resumes() {
        let mut s = Scheduler::new();
        let mut stack0 = stack();
        add_ready_task(&mut s, 0, 3, &mut stack0);
        s.active_task = 0;
        s.ready[3].pop_front();
        s.wait_for_event(EventMask::from_raw(0x8), true, 0);
        assert_eq!(s.active_task, IDLE_TASK);

        assert!(s.set_event(EventMask::from_raw(0x8)));
        assert_eq!(s.active_task, 0);

        s.wait_for_event(EventMask::from_raw(0x8), true, 0);
        assert_eq!(s.active_task, IDLE_TASK);
    }
}
