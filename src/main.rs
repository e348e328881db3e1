//! # Demo Firmware
//!
//! A minimal application wiring five tasks onto the kernel, chosen to
//! exercise the concrete scenarios of spec §8 on real hardware:
//!
//! | Task | Priority | Behavior |
//! |------|----------|----------|
//! | `periodic_sensor_task` | 2 | Absolute-timer period of 20 ticks |
//! | `button_watcher_task` | 3 (highest) | Waits indefinitely on `EVT_BUTTON` |
//! | `button_poller_task` | 1 | Delay-waits, then posts `EVT_BUTTON` |
//! | `round_robin_worker_a/b` | 0 (lowest) | Busy background work, time-sliced |
//!
//! `button_watcher_task` and `button_poller_task` together are scenario
//! 1 of spec §8: the poller's `set_event` preempts it mid-call to release
//! the higher-priority watcher. The two round-robin workers are scenario
//! 2: with `round-robin` compiled in and a 5-tick slice each, the active
//! worker alternates every 5 ticks regardless of what either does.

#![no_std]
#![no_main]

use panic_halt as _;

use tinyrtos::config::DEFAULT_STACK_SIZE;
use tinyrtos::event::EventMask;
use tinyrtos::kernel;

// ---------------------------------------------------------------------------
// Task stacks
// ---------------------------------------------------------------------------
//
// One stack per task, owned by the application for the kernel's entire
// lifetime and handed to `kernel::init_task` — the kernel never
// allocates a task's stack itself (spec §1, "no dynamic allocation").

static mut STACK_SENSOR: [u8; DEFAULT_STACK_SIZE] = [0; DEFAULT_STACK_SIZE];
static mut STACK_WATCHER: [u8; DEFAULT_STACK_SIZE] = [0; DEFAULT_STACK_SIZE];
static mut STACK_POLLER: [u8; DEFAULT_STACK_SIZE] = [0; DEFAULT_STACK_SIZE];
static mut STACK_RR_A: [u8; DEFAULT_STACK_SIZE] = [0; DEFAULT_STACK_SIZE];
static mut STACK_RR_B: [u8; DEFAULT_STACK_SIZE] = [0; DEFAULT_STACK_SIZE];

const TASK_SENSOR: usize = 0;
const TASK_WATCHER: usize = 1;
const TASK_POLLER: usize = 2;
const TASK_RR_A: usize = 3;
const TASK_RR_B: usize = 4;

/// Application event, posted by `button_poller_task` and awaited by
/// `button_watcher_task`. Bit 4 is the first free application bit —
/// bits 0-3 are reserved (`EVT_ABSOLUTE_TIMER`, `EVT_DELAY_TIMER`,
/// `EVT_ISR_USER_00/01`).
const EVT_BUTTON: EventMask = EventMask::application_bit(4);

// ---------------------------------------------------------------------------
// Task entry points
// ---------------------------------------------------------------------------

/// Samples a sensor every 20 ticks via the absolute timer. Demonstrates
/// scenario 3: if preempted past its deadline, the next resume lands on
/// the very next tick and `cnt_overrun` increments.
extern "C" fn periodic_sensor_task() -> ! {
    loop {
        sample_sensor();
        kernel::wait_for_event(EventMask::EVT_ABSOLUTE_TIMER, true, 20);
    }
}

fn sample_sensor() {
    // Application-specific sampling goes here.
}

/// Waits indefinitely for a debounced button press and handles it.
/// Highest priority in this demo, so it preempts both the poller and
/// the round-robin pair the instant the event is posted.
extern "C" fn button_watcher_task() -> ! {
    loop {
        let released = kernel::wait_for_event(EVT_BUTTON, true, 0);
        if released.contains(EVT_BUTTON) {
            handle_button_press();
        }
    }
}

fn handle_button_press() {
    // Application-specific button handling goes here.
}

/// Polls a GPIO pin every 5 ticks (a crude debounce window) and posts
/// `EVT_BUTTON` on a detected press. Lowest-but-one priority: this task
/// runs, reaches `set_event`, and may be preempted mid-call by
/// `button_watcher_task` before it gets to resume (spec §8 scenario 1).
extern "C" fn button_poller_task() -> ! {
    loop {
        kernel::wait_for_event(EventMask::EVT_DELAY_TIMER, true, 5);
        if button_pin_is_pressed() {
            kernel::set_event(EVT_BUTTON);
        }
    }
}

fn button_pin_is_pressed() -> bool {
    // Application-specific GPIO read goes here.
    false
}

/// One of a pair of equal-priority, round-robin-sliced background
/// workers. Neither ever calls `wait_for_event` or `set_event`; the
/// only thing that ever takes either off the CPU is round-robin
/// rotation at slice expiry (spec §8 scenario 2).
extern "C" fn round_robin_worker_a() -> ! {
    loop {
        do_background_work_a();
    }
}

fn do_background_work_a() {
    // Application-specific background work goes here.
}

extern "C" fn round_robin_worker_b() -> ! {
    loop {
        do_background_work_b();
    }
}

fn do_background_work_b() {
    // Application-specific background work goes here.
}

// ---------------------------------------------------------------------------
// Application callbacks (kernel::init_rtos's required hooks)
// ---------------------------------------------------------------------------

/// Registers every task. The only legal place to call `kernel::init_task`
/// — `init_rtos` calls this once, before arming the timer tick.
#[no_mangle]
pub fn setup() {
    unsafe {
        kernel::init_task(
            TASK_SENSOR,
            periodic_sensor_task,
            2,
            0,
            STACK_SENSOR.as_mut_ptr(),
            STACK_SENSOR.len(),
            EventMask::NONE,
            false,
            0,
            "sensor",
        )
        .expect("periodic_sensor_task: init_task failed");

        kernel::init_task(
            TASK_WATCHER,
            button_watcher_task,
            3,
            0,
            STACK_WATCHER.as_mut_ptr(),
            STACK_WATCHER.len(),
            EventMask::NONE,
            false,
            0,
            "watcher",
        )
        .expect("button_watcher_task: init_task failed");

        kernel::init_task(
            TASK_POLLER,
            button_poller_task,
            1,
            0,
            STACK_POLLER.as_mut_ptr(),
            STACK_POLLER.len(),
            EventMask::NONE,
            false,
            0,
            "poller",
        )
        .expect("button_poller_task: init_task failed");

        kernel::init_task(
            TASK_RR_A,
            round_robin_worker_a,
            0,
            5,
            STACK_RR_A.as_mut_ptr(),
            STACK_RR_A.len(),
            EventMask::NONE,
            false,
            0,
            "rr-a",
        )
        .expect("round_robin_worker_a: init_task failed");

        kernel::init_task(
            TASK_RR_B,
            round_robin_worker_b,
            0,
            5,
            STACK_RR_B.as_mut_ptr(),
            STACK_RR_B.len(),
            EventMask::NONE,
            false,
            0,
            "rr-b",
        )
        .expect("round_robin_worker_b: init_task failed");
    }
}

/// The idle task's body. Runs for as long as no application task is
/// ready; here it just idles the CPU until the next interrupt.
#[no_mangle]
pub fn idle() {
    unsafe {
        core::arch::asm!("sleep", options(nomem, nostack, preserves_flags));
    }
}

// ---------------------------------------------------------------------------
// Hardware timer setup
// ---------------------------------------------------------------------------
//
// Memory-mapped I/O registers for Timer/Counter1 on the classic
// ATmega328P, configured for CTC mode with a ~2ms period at 16MHz
// (prescaler 256, OCR1A = 124 -> 125 counts @ 62.5kHz = 2.00ms). Wiring
// `TIMER1_COMPA_vect` to `__kernel_timer_tick_vector` is a linker-script
// concern outside this crate's scope (spec §1: hardware-specific timer
// initialization is an integration shim, not part of the hard core).

const TCCR1A: *mut u8 = 0x80 as *mut u8;
const TCCR1B: *mut u8 = 0x81 as *mut u8;
const OCR1AH: *mut u8 = 0x89 as *mut u8;
const OCR1AL: *mut u8 = 0x88 as *mut u8;
const TIMSK1: *mut u8 = 0x6e as *mut u8;

const WGM12: u8 = 1 << 3;
const CS12: u8 = 1 << 2; // prescaler /256
const OCIE1A: u8 = 1 << 1;

/// Arms the hardware timer the kernel's tick ISR is wired to. Called
/// once from `init_rtos`, after `setup()` and before the kernel becomes
/// the idle task.
#[no_mangle]
pub fn enable_timer_tick() {
    unsafe {
        core::ptr::write_volatile(TCCR1A, 0x00);
        core::ptr::write_volatile(OCR1AH, 0x00);
        core::ptr::write_volatile(OCR1AL, 124);
        core::ptr::write_volatile(TCCR1B, WGM12 | CS12);
        core::ptr::write_volatile(TIMSK1, OCIE1A);
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// avr-gcc's `crt0` calls `main` after `.data`/`.bss` init. Interrupts
/// are globally disabled at reset, satisfying `init_rtos`'s precondition.
#[no_mangle]
pub extern "C" fn main() -> ! {
    kernel::init_rtos()
}
