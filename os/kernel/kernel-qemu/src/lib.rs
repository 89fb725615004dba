//! # Debug Port Logging
//!
//! A `log` backend for both boot stages. Records are formatted straight to
//! an x86 I/O port, one byte at a time, without allocating:
//!
//! * **`0x402`**: QEMU's debug console (`-debugcon stdio`), the default.
//! * **`0x3F8`**: the first serial port, used by the loader which runs
//!   before any console driver exists.
//!
//! ```rust,no_run
//! use kernel_qemu::{DebugPort, QemuLogger};
//! use log::{LevelFilter, info};
//!
//! QemuLogger::new(LevelFilter::Debug)
//!     .with_port(DebugPort::Com1)
//!     .init()
//!     .expect("logger initialization");
//! info!("memory map parsed");
//! ```
//!
//! With the `enabled` feature off, every write is a no-op and the port is
//! never touched.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod logger;

pub use logger::QemuLogger;

/// I/O port a [`QemuLogger`] writes to.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum DebugPort {
    /// QEMU `-debugcon` port.
    Qemu,
    /// COM1 data register.
    Com1,
    Other(u16),
}

impl DebugPort {
    #[must_use]
    pub const fn number(self) -> u16 {
        match self {
            Self::Qemu => 0x402,
            Self::Com1 => 0x3F8,
            Self::Other(port) => port,
        }
    }
}

#[doc(hidden)]
pub mod qemu_fmt {
    use crate::DebugPort;
    use core::fmt::{self, Write};

    /// `fmt::Write` adapter over a single output port.
    pub struct PortSink(pub DebugPort);

    impl Write for PortSink {
        #[inline]
        fn write_str(&mut self, s: &str) -> fmt::Result {
            let port = self.0.number();
            for b in s.bytes() {
                putc(port, b);
            }
            Ok(())
        }
    }

    #[cfg(feature = "enabled")]
    #[allow(clippy::inline_always)]
    #[inline(always)]
    fn putc(port: u16, val: u8) {
        unsafe {
            core::arch::asm!(
                "out dx, al",
                in("dx") port,
                in("al") val,
                options(nomem, nostack, preserves_flags)
            );
        }
    }

    #[cfg(not(feature = "enabled"))]
    #[inline]
    const fn putc(_port: u16, _val: u8) {}

    #[doc(hidden)]
    #[inline]
    pub fn qemu_write(port: DebugPort, args: fmt::Arguments) {
        // Best-effort; there is nowhere to report a failed debug write.
        let _ = fmt::write(&mut PortSink(port), args);
    }
}

/// Format directly to QEMU's debug console, bypassing the logger.
#[macro_export]
macro_rules! qemu_trace {
    ($($arg:tt)*) => {{
        $crate::qemu_fmt::qemu_write($crate::DebugPort::Qemu, core::format_args!($($arg)*));
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_numbers() {
        assert_eq!(DebugPort::Qemu.number(), 0x402);
        assert_eq!(DebugPort::Com1.number(), 0x3F8);
        assert_eq!(DebugPort::Other(0x2F8).number(), 0x2F8);
    }
}
