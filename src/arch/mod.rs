//! # Architecture Abstraction Layer
//!
//! Tick source and board support for the firmware target. The kernel
//! itself is target-independent; only the code here touches hardware, and
//! it is compiled for bare-metal ARM only.

#[cfg(all(target_arch = "arm", target_os = "none"))]
pub mod cortex_m4;
