//! # AVR Port Layer
//!
//! Hardware-specific code for the classic 8-bit AVR core (e.g.
//! ATmega328P at 16MHz, the RTuinOS-class target this kernel is built
//! for). Implements the Context Switch Primitive of spec §4.7 and the
//! stack preparation of §4.1.
//!
//! ## Why AVR needs no PendSV-style deferral
//!
//! Cortex-M splits "I am an interrupt" (hardware auto-stacks R0-R3,
//! R12, LR, PC, xPSR) from "I am a normal call" (nothing is stacked
//! beyond LR), which is why that architecture needs a dedicated
//! exception (PendSV) to get a uniform save/restore shape for both
//! entry kinds. AVR has no such split: both `call` and an interrupt
//! vector push only the return address (2 bytes on parts with <=128K
//! flash), nothing else. That means the exact same hand-written
//! push-everything/pop-everything sequence is correct whether it runs
//! at the top of an ISR or at the top of `wait_for_event`/`set_event`
//! — there is nothing here analogous to PendSV to trigger.
//!
//! ## Context Switch Mechanism
//!
//! Every suspension point pushes a 33-byte frame (`r0..r31`, `SREG`)
//! onto the *current* stack, then asks the scheduler which task is now
//! active, patches that task's saved frame with a synthesized return
//! value if it is resuming from a `wait_for_event` (§4.7 case B), and
//! pops that task's frame instead — possibly its own, just-pushed one,
//! which is the same-task short circuit of §4.7 falling out of the
//! code for free rather than needing a branch.
//!
//! ```text
//! stack_area (low addr)                          stack_area + stack_size (high addr)
//!   |-- sentinel fill (0x29), shrinks as the task's |
//!   |   low-water mark deepens ------------------> |
//!   |                        stack_pointer -> [ ] [ r0..r31, SREG ]
//!   |                                             [ entry address  ]
//!   |                                             [ guard addr 0x0000 ]
//! ```
//!
//! `push` predecrements SP before writing, so the recorded stack
//! pointer always lands one byte *below* the last-pushed byte (`SREG`)
//! — `SREG` itself is at `stack_pointer + 1`, not at `stack_pointer`.

use core::arch::asm;

use crate::config::STACK_SENTINEL;
use crate::event::EventMask;
use crate::task::TaskFn;

/// Number of AVR general-purpose registers saved per context.
const NUM_GP_REGS: usize = 32;

/// `r0..r31` plus `SREG`: the full frame size pushed by every
/// suspension point, regardless of whether it is the full-context or
/// sans-retval variant (the sans variant reserves the same two bytes
/// it declines to fill, so one restore routine handles both).
const FRAME_BYTES: usize = NUM_GP_REGS + 1;

/// `SREG`'s I/O address on the classic AVR core (same constant
/// `crate::sync::avr` reads/writes for the critical-section save).
const SREG_IO_ADDR: u8 = 0x3f;

/// `SPL`/`SPH`, the 16-bit stack pointer split across two I/O
/// registers on AVR parts whose SRAM needs more than 8 bits to
/// address.
const SPL_IO_ADDR: u8 = 0x3d;
const SPH_IO_ADDR: u8 = 0x3e;

/// Byte offset from the recorded stack pointer to `r25`/`r24` — the
/// 16-bit return-value register pair in the avr-gcc calling convention.
/// `push` predecrements, so after the final `push r16` (`SREG`) the
/// recorded SP points one byte *below* `SREG`, at the next free slot —
/// `SREG` itself lives at `sp_in + 1`. Registers are pushed in ascending
/// order (`r0` first, `SREG` last), so `r_k` lands at
/// `sp_in + 1 + (NUM_GP_REGS - k)`, i.e. offset `NUM_GP_REGS - k + 1`.
const R25_OFFSET: usize = NUM_GP_REGS - 25 + 1;
const R24_OFFSET: usize = NUM_GP_REGS - 24 + 1;

// ---------------------------------------------------------------------------
// Hand-written register frame push/pop, expressed as `asm!` fragments
// ---------------------------------------------------------------------------
//
// A loop over a register-indirect register file isn't expressible on
// AVR without burning a pointer register, so — as in every hand-tuned
// AVR context switch, including RTuinOS's own — the register list is
// just written out.

/// `r0` first (ends up furthest from the recorded SP) through `r31`
/// last (ends up adjacent to `SREG`).
macro_rules! push_all_gp_regs {
    () => {
        concat!(
            "push r0\n", "push r1\n", "push r2\n", "push r3\n", "push r4\n", "push r5\n",
            "push r6\n", "push r7\n", "push r8\n", "push r9\n", "push r10\n", "push r11\n",
            "push r12\n", "push r13\n", "push r14\n", "push r15\n", "push r16\n", "push r17\n",
            "push r18\n", "push r19\n", "push r20\n", "push r21\n", "push r22\n", "push r23\n",
            "push r24\n", "push r25\n", "push r26\n", "push r27\n", "push r28\n", "push r29\n",
            "push r30\n", "push r31\n",
        )
    };
}

/// Mirror of [`push_all_gp_regs`]: pop in the exact reverse order the
/// frame was built in, `r31` first, `r0` last.
macro_rules! pop_all_gp_regs {
    () => {
        concat!(
            "pop r31\n", "pop r30\n", "pop r29\n", "pop r28\n", "pop r27\n", "pop r26\n",
            "pop r25\n", "pop r24\n", "pop r23\n", "pop r22\n", "pop r21\n", "pop r20\n",
            "pop r19\n", "pop r18\n", "pop r17\n", "pop r16\n", "pop r15\n", "pop r14\n",
            "pop r13\n", "pop r12\n", "pop r11\n", "pop r10\n", "pop r9\n", "pop r8\n",
            "pop r7\n", "pop r6\n", "pop r5\n", "pop r4\n", "pop r3\n", "pop r2\n",
            "pop r1\n", "pop r0\n",
        )
    };
}

/// As [`push_all_gp_regs`] but for `r0..r23` only, used by the
/// sans-retval variant ahead of the two reserved/placeholder bytes.
macro_rules! push_r0_to_r23 {
    () => {
        concat!(
            "push r0\n", "push r1\n", "push r2\n", "push r3\n", "push r4\n", "push r5\n",
            "push r6\n", "push r7\n", "push r8\n", "push r9\n", "push r10\n", "push r11\n",
            "push r12\n", "push r13\n", "push r14\n", "push r15\n", "push r16\n", "push r17\n",
            "push r18\n", "push r19\n", "push r20\n", "push r21\n", "push r22\n", "push r23\n",
        )
    };
}

/// As [`push_all_gp_regs`] but for `r26..r31` only, used by the
/// sans-retval variant after the two reserved/placeholder bytes.
macro_rules! push_r26_to_r31 {
    () => {
        concat!("push r26\n", "push r27\n", "push r28\n", "push r29\n", "push r30\n", "push r31\n",)
    };
}

/// With the full frame pushed, `r24:r25` are untouched live registers
/// (`push` copies, never clears, its source) holding an `out_slot`
/// pointer argument. Copy them through `Z` (`r30:r31`) — already
/// safely on the stack by this point — to store the current
/// `SPL`/`SPH` into `*out_slot`.
macro_rules! record_sp_from_r24_r25 {
    () => {
        concat!(
            "movw r30, r24\n",
            "in r18, 0x3d\n",
            "in r19, 0x3e\n",
            "st Z+, r18\n",
            "st Z, r19\n",
        )
    };
}

// ---------------------------------------------------------------------------
// Task Stack Preparation (spec §4.1)
// ---------------------------------------------------------------------------

/// Lay out a fresh task's stack exactly as [`restore_context_maybe_with_retval`]
/// expects to find a suspended one: a guard return address of
/// `0x0000` at the top (resets the controller if the task's `-> !`
/// entry point ever returns), the entry address beneath it as the
/// "return address" the final `reti` lands on, a zeroed register frame
/// with `SREG`'s global-interrupt bit set, and sentinel fill
/// (`STACK_SENTINEL`) for the remainder — read back later by
/// `kernel::get_stack_reserve`.
pub fn prepare_stack(stack_area: *mut u8, stack_size: usize, task_fn: TaskFn) -> *mut u8 {
    unsafe {
        core::ptr::write_bytes(stack_area, STACK_SENTINEL, stack_size);

        let top = stack_area.add(stack_size);

        // Guard return address: jumping to 0x0000 re-enters the reset
        // vector. Topmost two bytes of the prepared region.
        let guard = top.sub(2);
        core::ptr::write(guard, 0u8);
        core::ptr::write(guard.add(1), 0u8);

        // Task entry address, stored PC-order (high byte first, as
        // `call`/interrupt entry push it) immediately below the guard.
        let entry_slot = guard.sub(2);
        let entry = task_fn as usize as u16;
        core::ptr::write(entry_slot, (entry >> 8) as u8);
        core::ptr::write(entry_slot.add(1), entry as u8);

        // Register frame, in the same byte order `pop_frame_and_return_from_interrupt`
        // reads it back: `SREG` at the lowest address (popped first,
        // since it was pushed last), then r31..r0 going up toward
        // `entry_slot` (popped last, since r0 was pushed first). The
        // stack pointer stored in the descriptor sits one byte below
        // `SREG` — the free slot a live `push` sequence would land on
        // next, exactly as `record_sp_from_r24_r25!` captures it.
        let frame = entry_slot.sub(FRAME_BYTES);
        core::ptr::write(frame, 0x80u8); // SREG, global interrupt-enable bit set
        core::ptr::write_bytes(frame.add(1), 0u8, NUM_GP_REGS); // r31..r0, zeroed

        frame.sub(1)
    }
}

// ---------------------------------------------------------------------------
// Context Switch Primitive (spec §4.7, design note's three primitives)
// ---------------------------------------------------------------------------

/// Save the calling task's full context (all 32 GP registers and
/// `SREG`) and hand off to whichever task the scheduler has already
/// chosen active. Used for the outgoing task on every path except a
/// task suspending itself in `wait_for_event` — i.e. preemption by the
/// tick ISR, and the caller side of `set_event`, neither of which owes
/// the outgoing task a synthesized return value (case A of §4.7).
///
/// Does not return in the conventional sense: control resumes at the
/// instruction after this call only once the descriptor recorded in
/// `out_slot` is chosen active again, at which point from this
/// function's point of view it simply returns — same-task or not, the
/// mechanism is identical, so there is no special case in the code for
/// the "scheduler picked the same task" short circuit the spec calls
/// out.
///
/// # Safety
/// Must be called with interrupts masked, with `out_slot` pointing at
/// the `stack_pointer` field of the currently-active task's descriptor.
#[inline(never)]
pub unsafe fn save_context_full(out_slot: *mut *mut u8) {
    push_full_frame(out_slot);
}

/// As [`save_context_full`], but reserves the two bytes that would
/// hold `r24`/`r25` without saving their true values — `wait_for_event`
/// is a voluntary suspension, so those bytes are filled in later with
/// the releasing event mask rather than restored verbatim (case B of
/// §4.7). The reserved slot keeps the frame the same size as the full
/// variant, so one restore routine handles both.
///
/// Returns the event mask [`restore_context_maybe_with_retval`]
/// synthesized for this task when it was released — not by an
/// ordinary `ret` (this task's stack frame is switched out from under
/// it for however long it stays suspended), but because the
/// resumption path pops that mask into the exact `r25:r24` pair the
/// avr-gcc calling convention already uses for a 16-bit return value.
/// The caller sees an ordinary function call that happens to take a
/// long time to return.
///
/// # Safety
/// Same contract as [`save_context_full`]; additionally, the caller
/// must be the task being suspended (not an arbitrary preempted task).
#[inline(never)]
pub unsafe fn save_context_sans_retval(out_slot: *mut *mut u8) -> EventMask {
    EventMask::from_raw(push_sans_retval_frame(out_slot))
}

/// Load `sp_in` as the live stack pointer, optionally patching the
/// `r24`/`r25` slot with `retval`'s bytes first, then pop the full
/// 33-byte frame and `reti`. This is the tail of every switch (called
/// internally once the scheduler's choice of next-active task and its
/// return value, if any, are known) and also the primitive that hands
/// off to the very first task at boot — `kernel::init_rtos` has no
/// outgoing context to save, but the handoff is otherwise identical,
/// which is the entire point of preparing every stack to look like a
/// suspended one (§4.1's rationale).
///
/// # Safety
/// `sp_in` must point at a frame laid out by [`prepare_stack`] or by a
/// prior `save_context_*` call. Never returns.
pub unsafe fn restore_context_maybe_with_retval(sp_in: *mut u8, retval: Option<EventMask>) -> ! {
    if let Some(v) = retval {
        let raw = v.raw();
        core::ptr::write(sp_in.add(R24_OFFSET), raw as u8);
        core::ptr::write(sp_in.add(R25_OFFSET), (raw >> 8) as u8);
    }
    pop_frame_and_return_from_interrupt(sp_in)
}

/// Read the scheduler's choice of active task and its pending
/// synthesized return value, then tail into
/// [`restore_context_maybe_with_retval`]. Shared by every
/// `save_context_*` caller so the "who do we resume, and with what
/// return value" decision lives in one place. Never returns.
///
/// # Safety
/// Called only from the tail of `push_full_frame`/
/// `push_sans_retval_frame`, after the outgoing task's frame is fully
/// written and its `stack_pointer` recorded.
#[no_mangle]
unsafe extern "C" fn complete_context_switch() -> ! {
    let scheduler = &mut *crate::kernel::SCHEDULER_PTR;
    let in_idx = scheduler.active_task;
    let incoming = &mut scheduler.tasks[in_idx];
    let retval = if !incoming.posted_event_vec.is_empty() {
        let v = incoming.posted_event_vec;
        incoming.posted_event_vec = EventMask::NONE;
        Some(v)
    } else {
        None
    };
    let sp_in = incoming.stack_pointer;
    restore_context_maybe_with_retval(sp_in, retval)
}

/// Push `r0..r31` and `SREG`, record the resulting SP into `*out_slot`,
/// then call [`complete_context_switch`]. `out_slot` arrives in
/// `r25:r24` per the avr-gcc calling convention; `push` never clobbers
/// its source register, so it is still valid to read after every
/// register (including `r24`/`r25` themselves) has been pushed.
#[naked]
unsafe extern "C" fn push_full_frame(out_slot: *mut *mut u8) {
    asm!(
        push_all_gp_regs!(),
        "in r16, {sreg}",
        "push r16",
        record_sp_from_r24_r25!(),
        "call {complete}",
        sreg = const SREG_IO_ADDR,
        complete = sym complete_context_switch,
        options(noreturn),
    )
}

/// As [`push_full_frame`], but pushes `r1` (the compiler's zero
/// register) in place of `r24`/`r25` — the two bytes are reserved, not
/// meaningfully saved. This path is only ever taken by a task about to
/// suspend itself in `wait_for_event`, which never observes the
/// placeholder: it only resumes via
/// `restore_context_maybe_with_retval`, which overwrites this exact
/// slot with the releasing event mask before the pop.
///
/// Declared as returning `u16` rather than diverging, even though the
/// asm body below never falls off its own end: the value a caller
/// observes is produced by an entirely different invocation, later,
/// of [`pop_frame_and_return_from_interrupt`] against this same
/// recorded stack slot. Naked functions are raw asm with no
/// Rust-generated prologue/epilogue, so the signature here only needs
/// to describe the calling convention the eventual resume honors.
#[naked]
unsafe extern "C" fn push_sans_retval_frame(out_slot: *mut *mut u8) -> u16 {
    asm!(
        push_r0_to_r23!(),
        "push r1",
        "push r1",
        push_r26_to_r31!(),
        "in r16, {sreg}",
        "push r16",
        record_sp_from_r24_r25!(),
        "call {complete}",
        sreg = const SREG_IO_ADDR,
        complete = sym complete_context_switch,
        options(noreturn),
    )
}

/// Set `SP := sp_in`, pop `SREG` and `r31..r0`, then `reti`. `sp_in`
/// arrives in `r25:r24`.
#[naked]
unsafe extern "C" fn pop_frame_and_return_from_interrupt(sp_in: *mut u8) -> ! {
    asm!(
        "out {spl}, r24",
        "out {sph}, r25",
        "pop r16",
        "out {sreg}, r16",
        pop_all_gp_regs!(),
        "reti",
        spl = const SPL_IO_ADDR,
        sph = const SPH_IO_ADDR,
        sreg = const SREG_IO_ADDR,
        options(noreturn),
    )
}

// ---------------------------------------------------------------------------
// Interrupt vectors
// ---------------------------------------------------------------------------

/// Entry point for the periodic hardware timer the application wires
/// up via its `enable_timer_tick()` hook. Saves full context (the
/// interrupted task is, by definition, merely preempted — §4.7 case
/// A), runs the Timer Tick Handler, and always hands off through
/// [`complete_context_switch`], which is a no-op switch if the active
/// task didn't change.
#[naked]
#[no_mangle]
pub unsafe extern "C" fn __kernel_timer_tick_vector() {
    asm!(
        push_all_gp_regs!(),
        "in r16, {sreg}",
        "push r16",
        "in r24, {spl}",
        "in r25, {sph}",
        "call {tick}",
        "call {complete}",
        sreg = const SREG_IO_ADDR,
        spl = const SPL_IO_ADDR,
        sph = const SPH_IO_ADDR,
        tick = sym run_tick_handler,
        complete = sym complete_context_switch,
        options(noreturn),
    )
}

/// Advance the tick, post timer events, rotate round-robin if due, and
/// run the Scheduler Core (spec §4.3). `sp_now` is the just-interrupted
/// task's stack pointer, captured by the naked vector into `r24:r25`
/// (there's no `out_slot` argument at an interrupt vector, since
/// nothing called this with a pointer in hand) before the tick handler
/// gets a chance to change `active_task`.
#[no_mangle]
unsafe extern "C" fn run_tick_handler(sp_now: *mut u8) {
    let scheduler = &mut *crate::kernel::SCHEDULER_PTR;
    let outgoing = scheduler.active_task;
    scheduler.tasks[outgoing].stack_pointer = sp_now;
    scheduler.tick();
}

/// Entry point for the optional user ISR 0 (`EVT_ISR_USER_00`).
/// Compiled in only behind the `isr-user-0` feature (spec §4.6); the
/// application wires the physical interrupt source via
/// `enable_irq_user_00()` and is responsible for clearing whatever
/// hardware flag triggered it before returning, outside this kernel's
/// concern.
#[cfg(feature = "isr-user-0")]
#[naked]
#[no_mangle]
pub unsafe extern "C" fn __kernel_user_isr_00_vector() {
    asm!(
        push_all_gp_regs!(),
        "in r16, {sreg}",
        "push r16",
        "in r24, {spl}",
        "in r25, {sph}",
        "call {post}",
        "call {complete}",
        sreg = const SREG_IO_ADDR,
        spl = const SPL_IO_ADDR,
        sph = const SPH_IO_ADDR,
        post = sym post_user_isr_00,
        complete = sym complete_context_switch,
        options(noreturn),
    )
}

#[cfg(feature = "isr-user-0")]
#[no_mangle]
unsafe extern "C" fn post_user_isr_00(sp_now: *mut u8) {
    let scheduler = &mut *crate::kernel::SCHEDULER_PTR;
    let outgoing = scheduler.active_task;
    scheduler.tasks[outgoing].stack_pointer = sp_now;
    scheduler.set_event(EventMask::EVT_ISR_USER_00);
}

/// As [`__kernel_user_isr_00_vector`], for `EVT_ISR_USER_01`.
#[cfg(feature = "isr-user-1")]
#[naked]
#[no_mangle]
pub unsafe extern "C" fn __kernel_user_isr_01_vector() {
    asm!(
        push_all_gp_regs!(),
        "in r16, {sreg}",
        "push r16",
        "in r24, {spl}",
        "in r25, {sph}",
        "call {post}",
        "call {complete}",
        sreg = const SREG_IO_ADDR,
        spl = const SPL_IO_ADDR,
        sph = const SPH_IO_ADDR,
        post = sym post_user_isr_01,
        complete = sym complete_context_switch,
        options(noreturn),
    )
}

#[cfg(feature = "isr-user-1")]
#[no_mangle]
unsafe extern "C" fn post_user_isr_01(sp_now: *mut u8) {
    let scheduler = &mut *crate::kernel::SCHEDULER_PTR;
    let outgoing = scheduler.active_task;
    scheduler.tasks[outgoing].stack_pointer = sp_now;
    scheduler.set_event(EventMask::EVT_ISR_USER_01);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_STACK_SIZE;

    extern "C" fn dummy_task() -> ! {
        loop {}
    }

    #[test]
    fn prepared_stack_has_sentinel_reserve_and_entry_address() {
        let mut stack = [0u8; DEFAULT_STACK_SIZE];
        let sp = prepare_stack(stack.as_mut_ptr(), stack.len(), dummy_task);
        assert!(!sp.is_null());
        // The lowest byte of the prepared frame is SREG with the
        // global-interrupt bit set.
        unsafe {
            assert_eq!(core::ptr::read(sp.add(NUM_GP_REGS)), 0x80);
        }
        // Leading bytes of the stack area remain sentinel-filled.
        assert_eq!(stack[0], STACK_SENTINEL);
    }

    #[test]
    fn retval_offsets_land_within_the_frame() {
        assert!(R24_OFFSET < FRAME_BYTES);
        assert!(R25_OFFSET < FRAME_BYTES);
        assert_ne!(R24_OFFSET, R25_OFFSET);
    }
}
