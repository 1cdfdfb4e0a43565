/// Start code for null/dimmer packets.
pub const DMX_NULL_START: u8 = 0x00;
/// Start code reserved for RDM (ANSI E1.20).
pub const SC_RDM: u8 = 0xCC;
/// Start code for ASCII text packets.
pub const SC_ASCII_TEXT: u8 = 0x17;

/// start code + 512 slots
pub const DMX_MAX_PACKET_SIZE: usize = 513;
/// Smallest packet that still satisfies the minimum break-to-break time
/// when sent back to back at full speed.
pub const DMX_MIN_PACKET_SIZE: usize = 25;

pub const DMX_SLOTS_BAUD: u32 = 250_000;
pub const DMX_BREAK_BAUD: u32 = 50_000;

/// One bit on the wire at 250 kbaud.
pub const BIT_TIME_US: u32 = 4;
/// start bit + 8 data bits + 2 stop bits
pub const CHAR_TIME_US: u32 = 11 * BIT_TIME_US;

pub const MIN_BREAK_TIME_US: u32 = 88;
pub const MIN_MAB_TIME_US: u32 = 8;

/// Minimum break-to-break time of a valid packet.
pub const MIN_PACKET_TIME_US: u32 = 1196;
/// Maximum break-to-break time.
pub const MAX_PACKET_TIME_US: u32 = 1_000_000;
/// Maximum mark time between slots (ANSI E1.11 recommendation).
pub const MAX_IDLE_TIME_US: u32 = 1_000_000;

/// Low pulse produced by one 0x00 character at [DMX_BREAK_BAUD], 8N1:
/// nine bit times of space.
pub const SERIAL_BREAK_TIME_US: u32 = 1_000_000 / DMX_BREAK_BAUD * 9;
/// Mark produced by the stop bit of the break character.
pub const SERIAL_MAB_TIME_US: u32 = 1_000_000 / DMX_BREAK_BAUD;
