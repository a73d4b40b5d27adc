//! # Cortex-M4 Port Layer
//!
//! SysTick as the kernel tick source and a cycle-counting [`Board`].
//!
//! ## Tick Source
//!
//! SysTick runs from the core clock and wraps every `1 / TICK_HZ` seconds.
//! Its interrupt is left disabled: the executor's idle loop polls the
//! COUNTFLAG bit and advances the kernel by one tick per wrap, so all
//! scheduling happens in thread mode.
//!
//! ## Busy Delay
//!
//! `busy_wait_ms` burns core cycles with `cortex_m::asm::delay`. It does not
//! give control back to the executor; ticks that elapse meanwhile are
//! collapsed into one when the executor next polls SysTick.

use core::sync::atomic::{AtomicU8, Ordering};

use cortex_m::peripheral::syst::SystClkSource;
use cortex_m::peripheral::SYST;

use crate::board::{Board, Led};
use crate::config::{SYSTEM_CLOCK_HZ, TICK_HZ};

// ---------------------------------------------------------------------------
// SysTick configuration
// ---------------------------------------------------------------------------

/// Configure SysTick to wrap at `TICK_HZ` using the processor clock.
pub fn configure_systick(syst: &mut SYST) {
    let reload = SYSTEM_CLOCK_HZ / TICK_HZ - 1;
    syst.set_reload(reload);
    syst.clear_current();
    syst.set_clock_source(SystClkSource::Core);
    syst.disable_interrupt();
    syst.enable_counter();
}

/// Sleep-free wait for the next SysTick wrap.
///
/// Reading COUNTFLAG clears it, so each wrap is reported once.
pub fn wait_for_tick(syst: &mut SYST) {
    while !syst.has_wrapped() {
        cortex_m::asm::nop();
    }
}

// ---------------------------------------------------------------------------
// Board
// ---------------------------------------------------------------------------

/// Board backed by the core clock. LED state is tracked in memory; wiring
/// it to GPIO is left to the board support crate of the actual part.
pub struct CycleBoard {
    leds: AtomicU8,
}

impl CycleBoard {
    pub const fn new() -> Self {
        Self {
            leds: AtomicU8::new(0),
        }
    }

    /// Bit 0 is LED1, bit 1 is LED2.
    pub fn led_state(&self) -> u8 {
        self.leds.load(Ordering::Relaxed)
    }
}

impl Default for CycleBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl Board for CycleBoard {
    fn toggle(&self, led: Led) {
        let mask = match led {
            Led::Led1 => 0b01,
            Led::Led2 => 0b10,
        };
        // Thread mode only; a plain read-modify-write is enough.
        let state = self.leds.load(Ordering::Relaxed);
        self.leds.store(state ^ mask, Ordering::Relaxed);
    }

    fn busy_wait_ms(&self, ms: u32) {
        let cycles_per_ms = SYSTEM_CLOCK_HZ / 1000;
        for _ in 0..ms {
            cortex_m::asm::delay(cycles_per_ms);
        }
    }
}
