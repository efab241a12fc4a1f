//! PIT channel 0: the scheduler heartbeat.
//!
//! Programmed to a fixed rate at boot; the timer ISR calls
//! [`on_timer_interrupt`], which bumps the tick counter and forwards to the
//! hook the task kernel registered.

use core::sync::atomic::{AtomicU64, Ordering};

use spin::Once;

/// Milliseconds per tick falls out of this; 1000 Hz keeps the sleep math in
/// whole milliseconds.
pub const PIT_FREQUENCY_HZ: u32 = 1000;

static TICKS: AtomicU64 = AtomicU64::new(0);
static ON_TICK: Once<fn(u64)> = Once::new();

#[cfg(target_os = "none")]
fn program_channel0(hz: u32) {
    use phobos_lib::ports::outb;

    const PIT_BASE_HZ: u32 = 1_193_182;
    let divisor = (PIT_BASE_HZ / hz).clamp(1, 0xFFFF) as u16;
    unsafe {
        outb(0x43, 0x36); // channel 0, lo/hi access, rate generator
        outb(0x40, (divisor & 0xFF) as u8);
        outb(0x40, (divisor >> 8) as u8);
    }
}

#[cfg(not(target_os = "none"))]
fn program_channel0(_hz: u32) {}

pub fn init() {
    program_channel0(PIT_FREQUENCY_HZ);
}

/// The task kernel registers its tick handler here, once.
pub fn set_on_tick(hook: fn(u64)) {
    ON_TICK.call_once(|| hook);
}

/// Called from the IRQ0 vector with interrupts off.
pub fn on_timer_interrupt() {
    let now = TICKS.fetch_add(1, Ordering::Relaxed) + 1;
    if let Some(hook) = ON_TICK.get() {
        hook(now);
    }
}

pub fn ticks() -> u64 {
    TICKS.load(Ordering::Relaxed)
}

pub const fn frequency_hz() -> u32 {
    PIT_FREQUENCY_HZ
}

pub fn uptime_ms() -> u64 {
    ticks() * 1000 / PIT_FREQUENCY_HZ as u64
}

/// Busy-wait delay for pre-scheduler code paths.
pub fn poll_delay_ms(ms: u32) {
    let target = ticks() + ms as u64 * PIT_FREQUENCY_HZ as u64 / 1000;
    while ticks() < target {
        phobos_lib::cpu::halt_once();
    }
}
