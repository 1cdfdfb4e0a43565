//! Hardware abstraction consumed by [crate::receiver::Receiver] and
//! [crate::sender::Sender]. Implement [DmxUartDriver] once per SoC family;
//! the state machines themselves stay hardware agnostic.

/// Parity of a uart character.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Parity {
    None,
    Even,
    Odd,
}

/// Character format of a uart port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SerialFormat {
    pub data_bits: u8,
    pub parity: Parity,
    pub stop_bits: u8,
}

/// 8 data bits, no parity, 1 stop bit. Used for break generation.
pub const SERIAL_8N1: SerialFormat = SerialFormat {
    data_bits: 8,
    parity: Parity::None,
    stop_bits: 1,
};

/// 8 data bits, no parity, 2 stop bits. The DMX512 slot format.
pub const SERIAL_8N2: SerialFormat = SerialFormat {
    data_bits: 8,
    parity: Parity::None,
    stop_bits: 2,
};

/// Which line condition raises the idle event.
///
/// While hunting for the mark after break the receiver wants the idle event
/// as soon as the line has been high for one start bit. Once slots are
/// streaming it wants the event one character after the last stop bit, so
/// the idle watchdog doesn't fire inside a start bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum IdleLineType {
    AfterStartBit,
    AfterStopBit,
}

/// Per-SoC timing descriptor reported by a driver.
///
/// The timer adjust compensates for the latency of arming the one-shot MAB
/// timer and is subtracted from the requested MAB. The break limits bound
/// what the device can generate by baud switching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct UartCapabilities {
    pub mab_timer_adjust_us: u32,
    pub min_break_time_us: u32,
    pub max_break_time_us: u32,
}

impl Default for UartCapabilities {
    fn default() -> Self {
        Self {
            mab_timer_adjust_us: 0,
            min_break_time_us: crate::consts::MIN_BREAK_TIME_US,
            max_break_time_us: crate::consts::MAX_PACKET_TIME_US,
        }
    }
}

/// Object to implement access to one hardware uart.
///
/// Receive events (byte, framing error, line idle) are not part of this
/// trait: the driver's interrupt handlers deliver them through the
/// [crate::registry] trampolines together with a hardware timestamp, in
/// strict hardware order.
pub trait DmxUartDriver {
    /// A driver specific error.
    type Error;

    /// Timing descriptor for this port.
    fn capabilities(&self) -> UartCapabilities {
        UartCapabilities::default()
    }

    /// Set baud rate and character format.
    fn configure(&mut self, baud: u32, format: SerialFormat) -> Result<(), Self::Error>;

    fn rx_enable(&mut self, enable: bool);

    fn tx_enable(&mut self, enable: bool);

    /// Drive the transceiver direction (high = transmit). Implementations
    /// without a direction pin may ignore this.
    fn set_tx_not_rx(&mut self, tx: bool);

    /// True if the receive FIFO holds bytes that arrived ahead of the most
    /// recent status event.
    fn rx_pending(&self) -> bool;

    /// Pop one byte from the receive FIFO.
    fn read_byte(&mut self) -> u8;

    /// Write one byte to the transmit data register. Only valid after a
    /// data-ready interrupt.
    fn tx_write_byte(&mut self, b: u8);

    /// Write synchronously, blocking until the FIFO has drained. Used for
    /// responder replies only.
    fn tx_raw(&mut self, frame: &[u8]) -> Result<(), Self::Error>;

    /// Emit a break plus mark-after-break synchronously using raw level
    /// control, bypassing the transmit state machine. Used for responder
    /// replies only.
    fn tx_break(&mut self, break_time_us: u32, mab_time_us: u32) -> Result<(), Self::Error>;

    /// Enable the transmit-data-register-empty interrupt.
    fn tx_enable_data_interrupt(&mut self, enable: bool);

    /// Enable the transmit-complete interrupt, raised once the stop bits of
    /// the last character have left the shift register.
    fn tx_enable_complete_interrupt(&mut self, enable: bool);

    fn set_idle_line_type(&mut self, idle_type: IdleLineType);

    /// Arm a rising-edge interrupt on the RX input pin, reported through
    /// [crate::registry::rx_pin_rising]. Returns false if the device has no
    /// such pin interrupt.
    fn watch_rx_pin(&mut self, enable: bool) -> bool {
        let _ = enable;
        false
    }

    /// Microsecond timestamp from the hardware timebase. Wraps.
    fn now_us(&self) -> u32;

    /// Millisecond timestamp from the hardware timebase. Wraps.
    fn now_ms(&self) -> u32;
}
