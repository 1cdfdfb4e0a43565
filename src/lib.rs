//! Interrupt-driven DMX512 and DMX512-A (ANSI E1.11) engine for
//! microcontrollers with hardware uarts, using interchangeable drivers.
//! This library features no-std support and keeps heap use down to the
//! responder table, which only exists while responders are registered.
//!
//! The engine is split into hardware-agnostic state machines and a small
//! driver surface. A [uart_driver::DmxUartDriver] implementation adapts one
//! SoC uart; a [timer::OneShotTimer] adapts a microsecond timer channel.
//! The platform's interrupt handlers forward uart events to the
//! [registry] trampolines, which dispatch to the
//! [receiver::Receiver] or [sender::Sender] registered for that uart.
//!
//! Received packets are timing-validated against the DMX512 minimums
//! (88 us break, 8 us mark after break, 1196 us break to break) and
//! published through an atomically swapped double buffer. Transmission
//! generates the break by switching the uart to a slower baud rate for one
//! character and times the mark after break with the one-shot timer.
//!
//! # Receiving
//!
//! ```no_run
//! use dmx_engine::receiver::Receiver;
//! use dmx_engine::registry::{self, PortCell};
//! use dmx_engine::timer::OneShotTimer;
//! use dmx_engine::uart_driver::{DmxUartDriver, IdleLineType, SerialFormat};
//!
//! // Register access for one uart port and one timer channel.
//! struct SocUart;
//! struct SocTimer;
//!
//! impl DmxUartDriver for SocUart {
//!     type Error = core::convert::Infallible;
//!
//!     fn configure(&mut self, _baud: u32, _format: SerialFormat) -> Result<(), Self::Error> {
//!         Ok(())
//!     }
//!     fn rx_enable(&mut self, _enable: bool) {}
//!     fn tx_enable(&mut self, _enable: bool) {}
//!     fn set_tx_not_rx(&mut self, _tx: bool) {}
//!     fn rx_pending(&self) -> bool {
//!         false
//!     }
//!     fn read_byte(&mut self) -> u8 {
//!         0
//!     }
//!     fn tx_write_byte(&mut self, _b: u8) {}
//!     fn tx_raw(&mut self, _frame: &[u8]) -> Result<(), Self::Error> {
//!         Ok(())
//!     }
//!     fn tx_break(&mut self, _break_us: u32, _mab_us: u32) -> Result<(), Self::Error> {
//!         Ok(())
//!     }
//!     fn tx_enable_data_interrupt(&mut self, _enable: bool) {}
//!     fn tx_enable_complete_interrupt(&mut self, _enable: bool) {}
//!     fn set_idle_line_type(&mut self, _idle_type: IdleLineType) {}
//!     fn now_us(&self) -> u32 {
//!         0
//!     }
//!     fn now_ms(&self) -> u32 {
//!         0
//!     }
//! }
//!
//! impl OneShotTimer for SocTimer {
//!     fn arm(&mut self, _delay_us: u32) {}
//!     fn cancel(&mut self) {}
//! }
//!
//! static DMX_RX: PortCell<Receiver<SocUart, SocTimer>> = PortCell::new();
//!
//! // The uart interrupt handlers forward their events, e.g.
//! // registry::rx_byte_received(0, byte, eop_time_us) from the status
//! // interrupt and registry::rx_framing_error(0, eop_time_us) from the
//! // error interrupt.
//!
//! fn main() {
//!     DMX_RX.install(Receiver::new(SocUart, SocTimer));
//!     DMX_RX.with(|rx| rx.begin()).unwrap().unwrap();
//!     registry::register_receiver(0, &DMX_RX).unwrap();
//!
//!     let mut slots = [0u8; 512];
//!     loop {
//!         // channel 1 onward; channel 0 would be the start code
//!         if let Some(n) = DMX_RX.with(|rx| rx.read_packet(&mut slots, 1, None)).flatten() {
//!             let _ = &slots[..n];
//!         }
//!     }
//! }
//! ```
//!
//! Transmitting mirrors this: install a [sender::Sender] in a
//! [registry::PortCell], call `begin`, register it with
//! [registry::register_sender], and forward the transmit interrupts.
//! Channel writes through [sender::Sender::set] are latched per packet, so
//! the wire always carries a consistent snapshot.

#![cfg_attr(not(feature = "std"), no_std)]
#![cfg_attr(docsrs, feature(doc_cfg))]

extern crate alloc;

mod buffers;
pub mod consts;
/// Module for building DMX receivers.
pub mod receiver;
/// Instance registry and interrupt trampolines.
pub mod registry;
/// Responder hook for in-interrupt turnaround replies.
pub mod responder;
/// Module for building DMX transmitters.
pub mod sender;
pub mod timer;
/// Module for implementing new drivers/hardware that behave like direct
/// uart devices.
pub mod uart_driver;
