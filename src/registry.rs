//! Maps each uart index to at most one receiver or sender so plain-function
//! interrupt trampolines can locate the owning state machine.
//!
//! A [Receiver](crate::receiver::Receiver) or
//! [Sender](crate::sender::Sender) lives inside a static [PortCell]. The
//! application reaches it through [PortCell::with]; the platform's
//! interrupt handlers reach it through the dispatch functions below. Both
//! paths run inside a `critical-section` critical section, which is the
//! "disable this uart's IRQs" guard the engine's sharing model requires:
//! acquired on entry, restored on every exit path.

use core::cell::RefCell;

use critical_section::Mutex;

use crate::receiver::Receiver;
use crate::sender::Sender;
use crate::timer::OneShotTimer;
use crate::uart_driver::DmxUartDriver;

/// Number of uart ports the registry can dispatch for.
pub const UART_PORT_COUNT: usize = 8;

/// Errors raised while registering a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RegistryError {
    /// The uart index is not below [UART_PORT_COUNT].
    IndexOutOfRange,
}

impl core::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            RegistryError::IndexOutOfRange => write!(f, "uart index out of range"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for RegistryError {}

/// Interrupt-shared home of one receiver or sender.
///
/// `with` runs the closure inside a critical section with exclusive access
/// to the inhabitant, returning `None` while the cell is empty.
pub struct PortCell<P> {
    inner: Mutex<RefCell<Option<P>>>,
}

impl<P> PortCell<P> {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(None)),
        }
    }

    /// Move `port` into the cell, returning the displaced inhabitant.
    pub fn install(&self, port: P) -> Option<P> {
        critical_section::with(|cs| self.inner.borrow_ref_mut(cs).replace(port))
    }

    /// Take the inhabitant out of the cell.
    pub fn uninstall(&self) -> Option<P> {
        critical_section::with(|cs| self.inner.borrow_ref_mut(cs).take())
    }

    /// Run `f` on the inhabitant inside a critical section.
    pub fn with<R>(&self, f: impl FnOnce(&mut P) -> R) -> Option<R> {
        critical_section::with(|cs| self.inner.borrow_ref_mut(cs).as_mut().map(f))
    }
}

impl<P> Default for PortCell<P> {
    fn default() -> Self {
        Self::new()
    }
}

/// Receive-side event surface the trampolines dispatch into.
pub trait RxPort: Sync {
    fn byte_received(&self, b: u8, eop_time: u32);
    fn framing_error(&self, eop_time: u32);
    fn line_idle(&self, event_time: u32);
    fn timer_expired(&self, now: u32);
    fn rx_pin_rising(&self, event_time: u32);
    /// Shut the port down; called on the previous owner when a
    /// registration supersedes it.
    fn detach(&self);
}

/// Transmit-side event surface the trampolines dispatch into.
pub trait TxPort: Sync {
    fn data_ready(&self, now: u32);
    fn transmit_complete(&self, now: u32);
    fn timer_expired(&self, now: u32);
    fn detach(&self);
}

impl<D, T> RxPort for PortCell<Receiver<D, T>>
where
    D: DmxUartDriver + Send,
    T: OneShotTimer + Send,
{
    fn byte_received(&self, b: u8, eop_time: u32) {
        self.with(|rx| rx.receive_byte(b, eop_time));
    }

    fn framing_error(&self, eop_time: u32) {
        self.with(|rx| rx.receive_potential_break(eop_time));
    }

    fn line_idle(&self, event_time: u32) {
        self.with(|rx| rx.receive_idle(event_time));
    }

    fn timer_expired(&self, now: u32) {
        self.with(|rx| rx.receive_timer_expired(now));
    }

    fn rx_pin_rising(&self, event_time: u32) {
        self.with(|rx| rx.receive_rx_pin_rising(event_time));
    }

    fn detach(&self) {
        self.with(|rx| rx.end());
    }
}

impl<D, T> TxPort for PortCell<Sender<D, T>>
where
    D: DmxUartDriver + Send,
    T: OneShotTimer + Send,
{
    fn data_ready(&self, now: u32) {
        self.with(|tx| tx.transmit_data_ready(now));
    }

    fn transmit_complete(&self, now: u32) {
        self.with(|tx| tx.transmit_complete(now));
    }

    fn timer_expired(&self, now: u32) {
        self.with(|tx| tx.timer_expired(now));
    }

    fn detach(&self) {
        self.with(|tx| tx.end());
    }
}

struct Slots {
    rx: [Option<&'static dyn RxPort>; UART_PORT_COUNT],
    tx: [Option<&'static dyn TxPort>; UART_PORT_COUNT],
}

const NO_RX: Option<&'static dyn RxPort> = None;
const NO_TX: Option<&'static dyn TxPort> = None;

static PORTS: Mutex<RefCell<Slots>> = Mutex::new(RefCell::new(Slots {
    rx: [NO_RX; UART_PORT_COUNT],
    tx: [NO_TX; UART_PORT_COUNT],
}));

fn same_object<T: ?Sized>(a: &T, b: &T) -> bool {
    core::ptr::eq(a as *const T as *const (), b as *const T as *const ())
}

/// Claim `index` for a receiver. At most one instance owns a uart at any
/// time: a previously registered receiver or sender on the same index is
/// detached first.
pub fn register_receiver(
    index: usize,
    port: &'static dyn RxPort,
) -> Result<(), RegistryError> {
    if index >= UART_PORT_COUNT {
        return Err(RegistryError::IndexOutOfRange);
    }
    let (old_rx, old_tx) = critical_section::with(|cs| {
        let mut slots = PORTS.borrow_ref_mut(cs);
        let old_tx = slots.tx[index].take();
        let old_rx = slots.rx[index].replace(port);
        (old_rx, old_tx)
    });
    if let Some(old) = old_tx {
        old.detach();
    }
    if let Some(old) = old_rx {
        if !same_object(old, port) {
            old.detach();
        }
    }
    Ok(())
}

/// Claim `index` for a sender. See [register_receiver].
pub fn register_sender(index: usize, port: &'static dyn TxPort) -> Result<(), RegistryError> {
    if index >= UART_PORT_COUNT {
        return Err(RegistryError::IndexOutOfRange);
    }
    let (old_rx, old_tx) = critical_section::with(|cs| {
        let mut slots = PORTS.borrow_ref_mut(cs);
        let old_rx = slots.rx[index].take();
        let old_tx = slots.tx[index].replace(port);
        (old_rx, old_tx)
    });
    if let Some(old) = old_rx {
        old.detach();
    }
    if let Some(old) = old_tx {
        if !same_object(old, port) {
            old.detach();
        }
    }
    Ok(())
}

/// Detach and clear the receiver slot at `index`.
pub fn unregister_receiver(index: usize) {
    if index >= UART_PORT_COUNT {
        return;
    }
    let old = critical_section::with(|cs| PORTS.borrow_ref_mut(cs).rx[index].take());
    if let Some(old) = old {
        old.detach();
    }
}

/// Detach and clear the sender slot at `index`.
pub fn unregister_sender(index: usize) {
    if index >= UART_PORT_COUNT {
        return;
    }
    let old = critical_section::with(|cs| PORTS.borrow_ref_mut(cs).tx[index].take());
    if let Some(old) = old {
        old.detach();
    }
}

fn rx_port(index: usize) -> Option<&'static dyn RxPort> {
    if index >= UART_PORT_COUNT {
        return None;
    }
    critical_section::with(|cs| PORTS.borrow_ref(cs).rx[index])
}

fn tx_port(index: usize) -> Option<&'static dyn TxPort> {
    if index >= UART_PORT_COUNT {
        return None;
    }
    critical_section::with(|cs| PORTS.borrow_ref(cs).tx[index])
}

// ---------------------------------------------------------------------
//  Interrupt trampolines. Call these from the platform's handlers.
// ---------------------------------------------------------------------

pub fn rx_byte_received(index: usize, b: u8, eop_time: u32) {
    if let Some(port) = rx_port(index) {
        port.byte_received(b, eop_time);
    }
}

pub fn rx_framing_error(index: usize, eop_time: u32) {
    if let Some(port) = rx_port(index) {
        port.framing_error(eop_time);
    }
}

pub fn rx_line_idle(index: usize, event_time: u32) {
    if let Some(port) = rx_port(index) {
        port.line_idle(event_time);
    }
}

pub fn rx_timer_expired(index: usize, now: u32) {
    if let Some(port) = rx_port(index) {
        port.timer_expired(now);
    }
}

pub fn rx_pin_rising(index: usize, event_time: u32) {
    if let Some(port) = rx_port(index) {
        port.rx_pin_rising(event_time);
    }
}

pub fn tx_data_ready(index: usize, now: u32) {
    if let Some(port) = tx_port(index) {
        port.data_ready(now);
    }
}

pub fn tx_transmit_complete(index: usize, now: u32) {
    if let Some(port) = tx_port(index) {
        port.transmit_complete(now);
    }
}

pub fn tx_timer_expired(index: usize, now: u32) {
    if let Some(port) = tx_port(index) {
        port.timer_expired(now);
    }
}
