//! # Arenos Example Firmware
//!
//! Boots the three-task demo on an STM32F4 (Cortex-M4):
//!
//! | Task      | Priority | Behavior                                             |
//! |-----------|----------|------------------------------------------------------|
//! | `mytask1` | 2        | LED1, mutex, recursive mutex, queue and stream burst |
//! | `mytask2` | 1        | Suspended at start; resumed by task1, then LED2      |
//! | `mytask3` | 1        | Drains the stream buffer three bytes at a time       |
//!
//! Startup:
//!
//! 1. `initialize` builds the primitives, then the tasks, from `RESOURCES`.
//! 2. On failure the core halts; the debugger can read the exit code from
//!    the `code` local.
//! 3. SysTick is configured as a polled 1 kHz tick and the executor takes
//!    over for good.

#![no_std]
#![no_main]

use cortex_m_rt::entry;
use panic_halt as _;

use arenos::arch::cortex_m4::{self, CycleBoard};
use arenos::coordinator::{exit_code, initialize, StaticResources};

static RESOURCES: StaticResources = StaticResources::new();
static BOARD: CycleBoard = CycleBoard::new();

#[entry]
fn main() -> ! {
    let Some(peripherals) = cortex_m::Peripherals::take() else {
        halt(-1);
    };

    let result = initialize(&RESOURCES, &BOARD);
    let code = exit_code(&result);
    let Ok(mut system) = result else {
        halt(code);
    };

    let mut syst = peripherals.SYST;
    cortex_m4::configure_systick(&mut syst);
    system.executor.run_forever(|| cortex_m4::wait_for_tick(&mut syst))
}

/// Park the core after a failed boot.
fn halt(code: i32) -> ! {
    let _code = code;
    loop {
        cortex_m::asm::wfi();
    }
}
