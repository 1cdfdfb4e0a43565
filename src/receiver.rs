//! The receive state machine: classifies uart events into break, mark after
//! break and slot boundaries, validates their timing, double-buffers
//! packets and dispatches registered [Responder]s.

use alloc::boxed::Box;

use crate::buffers::PacketBuffers;
use crate::consts::{
    CHAR_TIME_US, MAX_IDLE_TIME_US, MAX_PACKET_TIME_US, MIN_BREAK_TIME_US, MIN_MAB_TIME_US,
    MIN_PACKET_TIME_US, DMX_SLOTS_BAUD,
};
use crate::responder::{Responder, ResponderError, ResponderTable};
use crate::timer::OneShotTimer;
use crate::uart_driver::{DmxUartDriver, IdleLineType, SERIAL_8N2};

/// Timing and size measurements of the most recently received packet.
///
/// The private `next_*` fields collect measurements for the packet still on
/// the wire; they are promoted into the public fields when that packet
/// completes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PacketStats {
    /// Number of slots including the start code.
    pub size: usize,
    /// Millisecond timestamp of packet completion.
    pub timestamp_ms: u32,
    /// Break start to the end of the last slot.
    pub packet_time_us: u32,
    /// Distance from the previous packet's break to this packet's break.
    /// Zero for the first packet after the receiver started.
    pub break_to_break_time_us: u32,
    /// Break start to the start bit of the first slot.
    pub break_plus_mab_time_us: u32,
    /// Break duration. Zero when no mark-after-break edge was observed.
    pub break_time_us: u32,
    /// Mark-after-break duration. Zero when no edge was observed.
    pub mab_time_us: u32,
    /// True if the packet was kept despite a break-to-break distance below
    /// the minimum.
    pub is_short: bool,
    next_break_to_break_time_us: u32,
    next_break_plus_mab_time_us: u32,
    next_break_time_us: u32,
    next_mab_time_us: u32,
}

/// Monotone counters for timing and framing anomalies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ErrorStats {
    pub packet_timeout_count: u32,
    pub framing_error_count: u32,
    pub short_packet_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
enum RecvState {
    /// Waiting for a break.
    Idle,
    /// A break candidate has been observed, the first slot hasn't.
    Break,
    /// Slots are streaming.
    Data,
}

/// Reply parameters captured from a responder before the turnaround.
struct ReplyPlan {
    len: usize,
    send_break: bool,
    break_time_us: u32,
    mab_time_us: u32,
    pre_delay_us: u32,
    pre_data_delay_us: u32,
}

/// A DMX receiver for one uart port.
///
/// Event methods (`receive_*`) are called at interrupt priority through the
/// [crate::registry] trampolines; everything else runs at thread priority
/// inside the same [crate::registry::PortCell] critical section, which is
/// what keeps the two sides serialized.
pub struct Receiver<D: DmxUartDriver, T: OneShotTimer> {
    driver: D,
    timer: T,
    began: bool,
    state: RecvState,
    buffers: PacketBuffers,
    /// Size visible to readers; forced to zero by an eaten packet.
    published_size: usize,
    packet_avail: bool,
    packet_count: u32,
    packet_stats: PacketStats,
    error_stats: ErrorStats,
    connected: bool,
    connect_change_fn: Option<fn(bool)>,
    keep_short_packets: bool,
    tx_enabled: bool,
    break_start_time: u32,
    last_break_start_time: u32,
    have_last_break: bool,
    mab_start_time: u32,
    seen_mab_start: bool,
    last_slot_end_time: u32,
    responders: Option<ResponderTable>,
}

impl<D: DmxUartDriver, T: OneShotTimer> Receiver<D, T> {
    pub fn new(driver: D, timer: T) -> Self {
        Self {
            driver,
            timer,
            began: false,
            state: RecvState::Idle,
            buffers: PacketBuffers::new(),
            published_size: 0,
            packet_avail: false,
            packet_count: 0,
            packet_stats: PacketStats::default(),
            error_stats: ErrorStats::default(),
            connected: false,
            connect_change_fn: None,
            keep_short_packets: false,
            tx_enabled: false,
            break_start_time: 0,
            last_break_start_time: 0,
            have_last_break: false,
            mab_start_time: 0,
            seen_mab_start: false,
            last_slot_end_time: 0,
            responders: None,
        }
    }

    /// Configure the uart for 250 kbaud 8N2 and start receiving. All
    /// statistics are reset.
    pub fn begin(&mut self) -> Result<(), D::Error> {
        if self.began {
            return Ok(());
        }
        self.state = RecvState::Idle;
        self.buffers.clear_active();
        self.published_size = 0;
        self.packet_avail = false;
        self.packet_count = 0;
        self.packet_stats = PacketStats::default();
        self.error_stats = ErrorStats::default();
        self.connected = false;
        self.have_last_break = false;
        self.seen_mab_start = false;

        self.driver.configure(DMX_SLOTS_BAUD, SERIAL_8N2)?;
        self.driver.set_idle_line_type(IdleLineType::AfterStartBit);
        self.driver.rx_enable(true);
        self.began = true;
        Ok(())
    }

    /// Stop receiving. Interrupt sources are disabled before any state is
    /// torn down, so no event fires after this returns.
    pub fn end(&mut self) {
        if !self.began {
            return;
        }
        self.began = false;
        self.driver.rx_enable(false);
        self.driver.watch_rx_pin(false);
        self.timer.cancel();
        self.state = RecvState::Idle;
    }

    // -----------------------------------------------------------------
    //  Interrupt-side event handlers
    // -----------------------------------------------------------------

    /// A stop bit was sampled for `b` at `eop_time`.
    pub fn receive_byte(&mut self, b: u8, eop_time: u32) {
        match self.state {
            RecvState::Idle => {},
            RecvState::Break => {
                if !self.break_and_mab_valid(eop_time) {
                    self.receive_bad_break();
                    return;
                }
                self.accept_break(eop_time);
                self.buffers.clear_active();
                self.buffers.push(b);
                self.last_slot_end_time = eop_time;
                self.set_connected(true);
                self.state = RecvState::Data;
                self.arm_idle_watchdog();
                self.dispatch_process_byte(eop_time);
            },
            RecvState::Data => {
                // A byte arriving earlier than the accumulated minimum
                // frame time can only come from an invalid break.
                let filled = self.buffers.active_len() as u32;
                let earliest =
                    MIN_BREAK_TIME_US + MIN_MAB_TIME_US + CHAR_TIME_US + CHAR_TIME_US * filled;
                if eop_time.wrapping_sub(self.break_start_time) < earliest {
                    self.receive_bad_break();
                    return;
                }
                if !self.buffers.push(b) {
                    return;
                }
                self.last_slot_end_time = eop_time;
                self.dispatch_process_byte(eop_time);
                if self.state == RecvState::Data {
                    if self.buffers.is_full() {
                        self.complete_packet(false);
                        self.state = RecvState::Idle;
                    } else {
                        self.arm_idle_watchdog();
                    }
                }
            },
        }
    }

    /// A framing error was raised at `eop_time`: the start of a new break,
    /// which also delimits whatever packet was in progress.
    pub fn receive_potential_break(&mut self, eop_time: u32) {
        // Bytes still queued in the FIFO arrived before the error and
        // belong to the old packet.
        while self.driver.rx_pending() {
            let b = self.driver.read_byte();
            self.receive_byte(b, eop_time);
        }

        let new_break_start = eop_time.wrapping_sub(CHAR_TIME_US);
        match self.state {
            RecvState::Idle => {},
            RecvState::Break => {
                // Recursive break: the candidate collected nothing.
                self.complete_packet(false);
            },
            RecvState::Data => {
                let inter_break = new_break_start.wrapping_sub(self.break_start_time);
                if inter_break > MAX_PACKET_TIME_US {
                    self.error_stats.packet_timeout_count =
                        self.error_stats.packet_timeout_count.wrapping_add(1);
                }
                self.complete_packet(inter_break < MIN_PACKET_TIME_US);
            },
        }
        self.break_start_time = new_break_start;
        self.seen_mab_start = false;
        self.state = RecvState::Break;
    }

    /// The receive line has been idle per the configured
    /// [IdleLineType].
    pub fn receive_idle(&mut self, event_time: u32) {
        match self.state {
            RecvState::Idle => {},
            RecvState::Break => {
                if self.seen_mab_start {
                    if self.mab_start_time.wrapping_sub(self.break_start_time) < MIN_BREAK_TIME_US
                    {
                        self.receive_bad_break();
                    }
                } else if event_time.wrapping_sub(self.break_start_time)
                    < MIN_BREAK_TIME_US + CHAR_TIME_US
                {
                    self.receive_bad_break();
                } else {
                    self.mab_start_time = event_time.wrapping_sub(CHAR_TIME_US);
                    self.seen_mab_start = true;
                    self.driver.set_idle_line_type(IdleLineType::AfterStopBit);
                }
            },
            RecvState::Data => {
                if event_time.wrapping_sub(self.break_start_time) > MAX_PACKET_TIME_US
                    || event_time.wrapping_sub(self.last_slot_end_time) >= MAX_IDLE_TIME_US
                {
                    self.receive_timeout();
                }
            },
        }
    }

    /// The idle watchdog armed from the data state expired.
    pub fn receive_timer_expired(&mut self, _now: u32) {
        if self.state == RecvState::Data {
            self.receive_timeout();
        }
    }

    /// Rising edge on the watched RX pin: a precise mark-after-break start.
    pub fn receive_rx_pin_rising(&mut self, event_time: u32) {
        if self.state == RecvState::Break && !self.seen_mab_start {
            self.mab_start_time = event_time;
            self.seen_mab_start = true;
            self.driver.set_idle_line_type(IdleLineType::AfterStopBit);
        }
    }

    // -----------------------------------------------------------------
    //  Application-side API
    // -----------------------------------------------------------------

    /// Read all or part of the latest packet into `buf`, starting at
    /// `start_channel` (channel zero is the start code). `stats`, when
    /// given, is always filled in.
    ///
    /// Returns `None` if no new packet arrived since the last successful
    /// read, `Some(0)` if the requested range lies outside the packet
    /// (the packet stays available), and otherwise the number of bytes
    /// copied, consuming the packet.
    pub fn read_packet(
        &mut self,
        buf: &mut [u8],
        start_channel: usize,
        stats: Option<&mut PacketStats>,
    ) -> Option<usize> {
        if let Some(stats) = stats {
            *stats = self.packet_stats;
        }
        if !self.packet_avail {
            return None;
        }
        if buf.is_empty() || start_channel >= self.published_size {
            return Some(0);
        }
        let count = buf.len().min(self.published_size - start_channel);
        buf[..count]
            .copy_from_slice(&self.buffers.published()[start_channel..start_channel + count]);
        self.packet_avail = false;
        Some(count)
    }

    /// Value of one channel in the latest packet, or `None` outside the
    /// published size. The start code is channel zero.
    pub fn get(&self, channel: usize) -> Option<u8> {
        if channel >= self.published_size {
            return None;
        }
        Some(self.buffers.published()[channel])
    }

    /// Big-endian 16-bit value spanning `channel` and `channel + 1`.
    pub fn get_16bit(&self, channel: usize) -> Option<u16> {
        if channel.checked_add(1)? >= self.published_size {
            return None;
        }
        let published = self.buffers.published();
        Some(u16::from_be_bytes([published[channel], published[channel + 1]]))
    }

    /// Install or remove (`None`) the responder for one start code,
    /// returning the displaced one. The table and its shared reply buffer
    /// are the only heap allocations in the crate; a failed allocation
    /// leaves everything as it was.
    pub fn set_responder(
        &mut self,
        start_code: u8,
        responder: Option<Box<dyn Responder>>,
    ) -> Result<Option<Box<dyn Responder>>, ResponderError> {
        match responder {
            Some(responder) => {
                let table = match self.responders.as_mut() {
                    Some(table) => table,
                    None => self.responders.insert(ResponderTable::try_new()?),
                };
                table.insert(start_code, responder)
            },
            None => {
                let Some(table) = self.responders.as_mut() else {
                    return Ok(None);
                };
                let previous = table.remove(start_code);
                if table.is_empty() {
                    self.responders = None;
                }
                Ok(previous)
            },
        }
    }

    /// Callback invoked exactly once per connection state change.
    pub fn set_connect_change_callback(&mut self, callback: Option<fn(bool)>) {
        self.connect_change_fn = callback;
    }

    /// Keep packets whose break-to-break distance is below the minimum
    /// instead of discarding them. Default false.
    pub fn set_keep_short_packets(&mut self, keep: bool) {
        self.keep_short_packets = keep;
    }

    pub fn keep_short_packets(&self) -> bool {
        self.keep_short_packets
    }

    /// Watch the RX input pin for the rising edge that starts the mark
    /// after break. Returns true if the pin watch is now active.
    pub fn set_rx_watch_pin(&mut self, enable: bool) -> bool {
        self.driver.watch_rx_pin(enable) && enable
    }

    /// Allow responder replies to drive the transmitter. Off by default so
    /// a plain receiver never touches the half-duplex direction.
    pub fn set_tx_enabled(&mut self, enable: bool) {
        self.tx_enabled = enable;
        self.driver.tx_enable(enable);
    }

    /// True after a valid break and first slot, false after a bad break or
    /// a timeout.
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn packet_count(&self) -> u32 {
        self.packet_count
    }

    pub fn packet_stats(&self) -> PacketStats {
        self.packet_stats
    }

    pub fn error_stats(&self) -> ErrorStats {
        self.error_stats
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    /// Tear down and hand back the hardware resources.
    pub fn release(mut self) -> (D, T) {
        self.end();
        (self.driver, self.timer)
    }

    // -----------------------------------------------------------------
    //  Internals
    // -----------------------------------------------------------------

    fn break_and_mab_valid(&self, eop_time: u32) -> bool {
        if self.seen_mab_start {
            let break_len = self.mab_start_time.wrapping_sub(self.break_start_time);
            let mab_len = eop_time
                .wrapping_sub(CHAR_TIME_US)
                .wrapping_sub(self.mab_start_time);
            break_len >= MIN_BREAK_TIME_US && mab_len >= MIN_MAB_TIME_US
        } else {
            eop_time.wrapping_sub(self.break_start_time)
                >= MIN_BREAK_TIME_US + MIN_MAB_TIME_US + CHAR_TIME_US
        }
    }

    /// The break candidate validated against its first byte: stage the
    /// timing measurements that commit when this packet completes.
    fn accept_break(&mut self, eop_time: u32) {
        let first_byte_start = eop_time.wrapping_sub(CHAR_TIME_US);
        let stats = &mut self.packet_stats;
        stats.next_break_to_break_time_us = if self.have_last_break {
            self.break_start_time.wrapping_sub(self.last_break_start_time)
        } else {
            0
        };
        stats.next_break_plus_mab_time_us = first_byte_start.wrapping_sub(self.break_start_time);
        if self.seen_mab_start {
            stats.next_break_time_us = self.mab_start_time.wrapping_sub(self.break_start_time);
            stats.next_mab_time_us = first_byte_start.wrapping_sub(self.mab_start_time);
        } else {
            stats.next_break_time_us = 0;
            stats.next_mab_time_us = 0;
        }
        self.last_break_start_time = self.break_start_time;
        self.have_last_break = true;
    }

    /// A break candidate turned out to be line noise. Noise is
    /// indistinguishable from a lost line, so the connection drops.
    fn receive_bad_break(&mut self) {
        self.error_stats.framing_error_count =
            self.error_stats.framing_error_count.wrapping_add(1);
        self.timer.cancel();
        self.buffers.clear_active();
        self.seen_mab_start = false;
        self.driver.set_idle_line_type(IdleLineType::AfterStartBit);
        self.state = RecvState::Idle;
        self.set_connected(false);
    }

    fn receive_timeout(&mut self) {
        self.error_stats.packet_timeout_count =
            self.error_stats.packet_timeout_count.wrapping_add(1);
        self.complete_packet(false);
        self.state = RecvState::Idle;
        self.set_connected(false);
    }

    /// Publish the collected packet. The buffer flip is the linearization
    /// point: a reader either sees the complete new packet or the old one.
    fn complete_packet(&mut self, is_short: bool) {
        self.timer.cancel();
        self.driver.set_idle_line_type(IdleLineType::AfterStartBit);
        self.seen_mab_start = false;

        let size = self.buffers.active_len();
        if size == 0 {
            return;
        }

        if is_short {
            self.error_stats.short_packet_count =
                self.error_stats.short_packet_count.wrapping_add(1);
            if !self.keep_short_packets {
                self.buffers.clear_active();
                return;
            }
        }

        self.buffers.publish();

        let stats = &mut self.packet_stats;
        stats.size = size;
        stats.is_short = is_short;
        stats.timestamp_ms = self.driver.now_ms();
        stats.packet_time_us = self.last_slot_end_time.wrapping_sub(self.break_start_time);
        stats.break_to_break_time_us = stats.next_break_to_break_time_us;
        stats.break_plus_mab_time_us = stats.next_break_plus_mab_time_us;
        stats.break_time_us = stats.next_break_time_us;
        stats.mab_time_us = stats.next_mab_time_us;
        self.packet_count = self.packet_count.wrapping_add(1);

        let mut published = size;
        if let Some(table) = self.responders.as_mut() {
            let frame = self.buffers.published();
            if let Some(responder) = table.get_mut(frame[0]) {
                responder.receive_packet(frame);
                if responder.eat_packet() {
                    published = 0;
                }
            }
        }
        self.published_size = published;
        self.packet_avail = published > 0;
    }

    /// Run the registered responder's byte hook and, if it produced a
    /// reply, abort reception and send the reply inside this interrupt.
    fn dispatch_process_byte(&mut self, eop_time: u32) {
        let Some(mut table) = self.responders.take() else {
            return;
        };
        let mut plan = None;
        if let Some((responder, reply_buf)) =
            table.responder_and_reply(self.buffers.active_slice()[0])
        {
            let count = responder.process_byte(self.buffers.active_slice(), reply_buf);
            if count > 0 {
                plan = Some(ReplyPlan {
                    len: count.min(reply_buf.len()),
                    send_break: responder.is_send_break_for_last_packet(),
                    break_time_us: responder.break_time(),
                    mab_time_us: responder.mab_time(),
                    pre_delay_us: if responder.is_send_break_for_last_packet() {
                        responder.pre_break_delay()
                    } else {
                        responder.pre_no_break_delay()
                    },
                    pre_data_delay_us: responder.pre_data_delay(),
                });
            }
        }
        self.responders = Some(table);

        if let Some(plan) = plan {
            self.complete_packet(false);
            self.state = RecvState::Idle;
            self.send_reply(eop_time, plan);
        }
    }

    fn send_reply(&mut self, eop_time: u32, plan: ReplyPlan) {
        if !self.tx_enabled || plan.len == 0 {
            return;
        }
        self.driver.set_tx_not_rx(true);
        if plan.send_break {
            self.wait_from(eop_time, plan.pre_delay_us);
            let _ = self.driver.tx_break(plan.break_time_us, plan.mab_time_us);
            let break_end = self.driver.now_us();
            self.wait_from(break_end, plan.pre_data_delay_us);
        } else {
            self.wait_from(eop_time, plan.pre_delay_us);
        }
        if let Some(table) = self.responders.as_ref() {
            let _ = self.driver.tx_raw(&table.reply_buf()[..plan.len]);
        }
        self.driver.set_tx_not_rx(false);
    }

    fn wait_from(&self, since: u32, delay_us: u32) {
        while self.driver.now_us().wrapping_sub(since) < delay_us {}
    }

    fn arm_idle_watchdog(&mut self) {
        self.timer.arm(MAX_IDLE_TIME_US - CHAR_TIME_US);
    }

    fn set_connected(&mut self, connected: bool) {
        if self.connected != connected {
            self.connected = connected;
            if let Some(callback) = self.connect_change_fn {
                callback(connected);
            }
        }
    }
}
