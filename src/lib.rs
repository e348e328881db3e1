//! # tinyrtos — a small preemptive, priority-based kernel for 8-bit AVR
//!
//! A fixed-size, interrupt-driven real-time kernel in the RTuinOS
//! tradition: a handful of statically-sized task descriptors, strict
//! priority scheduling with FIFO ready queues per class, an edge-
//! triggered event mechanism for synchronization, and absolute/relative
//! timers built on the same timer tick that drives preemption. No heap,
//! no dynamic task creation, no cancellation.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │                    Application Tasks                     │
//! ├────────────────────────────────────────────────────────┤
//! │                 Kernel API (kernel.rs)                   │
//! │   init_rtos() · init_task() · set_event() · wait_for_event()
//! ├──────────────┬────────────────────┬────────────────────┤
//! │  Scheduler   │   Event Bitmask    │  Sync Primitives   │
//! │  scheduler.rs│   event.rs         │  sync.rs           │
//! │  ─ tick()    │   ─ EventMask      │  ─ critical_section│
//! │  ─ set_event │                    │  ─ mask_interrupts │
//! │  ─ wait_for_event                  │                   │
//! ├──────────────┴────────────────────┴────────────────────┤
//! │            Task Model (task.rs)                          │
//! │    TaskDescriptor · TaskFn                               │
//! ├────────────────────────────────────────────────────────┤
//! │            Arch Port (arch/avr.rs)                        │
//! │    Context Switch Primitive · Stack Prep · ISR vectors    │
//! ├────────────────────────────────────────────────────────┤
//! │           8-bit AVR Hardware (ATmega-class)                │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Memory Model
//!
//! - **No heap**: all state is statically allocated
//! - **No `alloc`**: pure `core` only
//! - **Fixed-size descriptor array**: `[TaskDescriptor; TOTAL_TASKS]`
//! - **Per-task stack**: application-supplied, passed to `init_task`
//! - **Critical sections**: hand-written AVR `cli`/`SREG`-save/restore
//!   for shared state ([`sync::critical_section`])

#![no_std]
#![cfg_attr(target_arch = "avr", feature(naked_functions))]

pub mod arch;
pub mod config;
pub mod error;
pub mod event;
pub mod kernel;
pub mod scheduler;
pub mod sync;
pub mod task;
