//! RX byte pump → frame → dispatch queueing, and the TX flush loop (spec
//! §4.9).
//!
//! Grounded on
//! `examples/original_source/faraabin/faraabin_link_handler.c`: the
//! override-on-unconsumed-frame check, the RX-oversize guard, and the
//! high/low priority split (synchronous dispatch vs. deferred-to-`Run()`)
//! are preserved; `ClientFrame`'s borrow of a scratch buffer is resolved
//! into an owned, fixed-capacity [`PendingFrame`] so it can be held across
//! the `on_byte` call that decoded it and the later `Run()` call that
//! dispatches it.

use crate::chrono::Chrono;
use crate::error::{DecodeError, TxError};
use crate::mcu::{Mcu, McuEventId};
use crate::port::Port;
use crate::ring_buffer::RingBuffer;
use crate::wire::control::InboundControl;
use crate::wire::{codec, PropertyByte};
use crate::EOF;

/// A fully decoded inbound frame, owned (no borrow of the RX scratch),
/// truncated to `PAYLOAD` bytes if the original payload was larger.
#[derive(Debug, Clone, Copy)]
pub struct PendingFrame<const PAYLOAD: usize> {
    /// Decoded control byte.
    pub control: InboundControl,
    /// Decoded fobject-property byte.
    pub fobject_prop: PropertyByte,
    /// Opaque handle, or [`crate::MCU_HANDLE`].
    pub fobject_handle: u32,
    payload: [u8; PAYLOAD],
    payload_len: usize,
}

impl<const PAYLOAD: usize> PendingFrame<PAYLOAD> {
    /// Builds a frame directly, truncating `payload` to `PAYLOAD` bytes.
    /// Used by callers that construct a frame outside the RX byte pump,
    /// e.g. loopback tests or a runtime injecting a synthetic command.
    pub fn new(
        control: InboundControl,
        fobject_prop: PropertyByte,
        fobject_handle: u32,
        payload: &[u8],
    ) -> Self {
        let mut buf = [0u8; PAYLOAD];
        let n = payload.len().min(PAYLOAD);
        buf[..n].copy_from_slice(&payload[..n]);
        Self {
            control,
            fobject_prop,
            fobject_handle,
            payload: buf,
            payload_len: n,
        }
    }

    /// The payload bytes actually carried (`<= PAYLOAD`).
    pub fn payload(&self) -> &[u8] {
        &self.payload[..self.payload_len]
    }
}

/// Outcome of one [`LinkHandler::on_byte`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnByteOutcome {
    /// Nothing to act on yet.
    Nothing,
    /// A high-priority frame decoded; the caller must dispatch it
    /// synchronously, before returning from `on_byte` (spec §4.9 RX path).
    HighPriority,
    /// A low-priority frame decoded and was queued for the next `Run()`.
    Queued,
}

/// RX accumulation plus one-deep low-priority frame queue. `RXLEN` bounds
/// the raw (still-stuffed) scratch; `PAYLOAD` bounds a queued frame's
/// payload.
pub struct LinkHandler<const RXLEN: usize, const PAYLOAD: usize> {
    rx_scratch: [u8; RXLEN],
    rx_len: usize,
    decode_scratch: [u8; RXLEN],
    pending: Option<PendingFrame<PAYLOAD>>,
    byte_time_ms: u32,
}

/// Default per-byte transmit time used to size the blocking-flush timeout
/// (`bytes * BYTE_TIME_MS * 2`, spec §4.9 TX path). A firmware integrator
/// running at a different baud rate should call
/// [`LinkHandler::set_byte_time_ms`].
pub const DEFAULT_BYTE_TIME_MS: u32 = 1;

impl<const RXLEN: usize, const PAYLOAD: usize> LinkHandler<RXLEN, PAYLOAD> {
    /// An armed link handler with an empty RX scratch and no queued frame.
    pub const fn new() -> Self {
        Self {
            rx_scratch: [0u8; RXLEN],
            rx_len: 0,
            decode_scratch: [0u8; RXLEN],
            pending: None,
            byte_time_ms: DEFAULT_BYTE_TIME_MS,
        }
    }

    /// Overrides the per-byte transmit time used by [`LinkHandler::flush`]'s
    /// blocking timeout.
    pub fn set_byte_time_ms(&mut self, ms: u32) {
        self.byte_time_ms = ms;
    }

    /// Takes the queued low-priority frame, if any, for the caller to
    /// dispatch during `Run()`.
    pub fn take_pending(&mut self) -> Option<PendingFrame<PAYLOAD>> {
        self.pending.take()
    }

    /// Feeds one received byte through the RX state machine (spec §4.9 RX
    /// path). May be called from a preemptor per spec §5's scheduling
    /// model; only appends to the scratch or decodes a complete frame, no
    /// suspension.
    pub fn on_byte(&mut self, mcu: &mut Mcu, byte: u8) -> OnByteOutcome {
        if self.pending.is_some() {
            mcu.note_rx_error(McuEventId::RxFrameBeforeEndOfPrevious);
            self.rx_len = 0;
            return OnByteOutcome::Nothing;
        }
        mcu.note_rx_byte();
        if byte != EOF {
            if self.rx_len >= RXLEN {
                self.rx_len = 0;
                mcu.note_rx_error(McuEventId::RxFrameBigSize);
            } else {
                self.rx_scratch[self.rx_len] = byte;
                self.rx_len += 1;
            }
            return OnByteOutcome::Nothing;
        }

        if self.rx_len == 0 {
            return OnByteOutcome::Nothing;
        }
        let raw_len = self.rx_len;
        self.rx_len = 0;
        match codec::decode(&self.rx_scratch[..raw_len], &mut self.decode_scratch) {
            Ok(frame) => {
                mcu.note_rx_frame();
                let mut payload = [0u8; PAYLOAD];
                let n = frame.payload.len().min(PAYLOAD);
                payload[..n].copy_from_slice(&frame.payload[..n]);
                let control = InboundControl::new(frame.control);
                let pending = PendingFrame {
                    control,
                    fobject_prop: PropertyByte::new(frame.fobject_prop),
                    fobject_handle: frame.fobject_handle,
                    payload,
                    payload_len: n,
                };
                if control.is_high_priority() {
                    self.pending = Some(pending);
                    OnByteOutcome::HighPriority
                } else {
                    self.pending = Some(pending);
                    OnByteOutcome::Queued
                }
            }
            Err(e) => {
                mcu.note_rx_error(decode_error_event(e));
                OnByteOutcome::Nothing
            }
        }
    }

    /// Drains `ring`, handing contiguous regions to `port.send`. Returns
    /// immediately if the transport is still busy and `blocking` is false;
    /// otherwise spins up to `bytes * BYTE_TIME_MS * 2` ms before giving up
    /// with [`TxError::SendTimeout`] (spec §4.9 TX path, §5 "Suspension
    /// points").
    pub fn flush<P: Port, const N: usize>(
        &self,
        port: &mut P,
        ring: &mut RingBuffer<N>,
        blocking: bool,
        mcu: &mut Mcu,
    ) -> Result<(), TxError> {
        loop {
            if port.is_sending() {
                if !blocking {
                    return Ok(());
                }
                let timeout_ms = ring.len() as u32 * self.byte_time_ms * 2;
                let mut wait = Chrono::new();
                wait.start(port);
                while port.is_sending() {
                    if wait.is_expired_ms(port, timeout_ms) {
                        mcu.note_rx_error(McuEventId::TxFrameTimeout);
                        return Err(TxError::SendTimeout);
                    }
                }
            }
            let Some(chunk) = ring.flush_chunk() else {
                return Ok(());
            };
            match port.send(chunk) {
                Ok(()) => mcu.note_tx_frame(chunk.len() as u32),
                Err(()) => {
                    mcu.note_rx_error(McuEventId::TxFrameSend);
                    return Err(TxError::SendFail);
                }
            }
        }
    }
}

impl<const RXLEN: usize, const PAYLOAD: usize> Default for LinkHandler<RXLEN, PAYLOAD> {
    fn default() -> Self {
        Self::new()
    }
}

fn decode_error_event(e: DecodeError) -> McuEventId {
    match e {
        DecodeError::EscapeError => McuEventId::RxFrameDescape,
        DecodeError::ChecksumError => McuEventId::RxFrameChecksum,
        DecodeError::MinimumSize => McuEventId::RxFrameSmallSize,
        DecodeError::OverrunBeforeEOF | DecodeError::MemoryError => McuEventId::RxFrameBigSize,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::codec::{EncodeSink, FrameWriter};
    use crate::wire::control::PropertyGroup;

    struct FakePort {
        tick: core::cell::Cell<u32>,
        sending: bool,
        sent: Vec<u8>,
    }
    impl Port for FakePort {
        fn fw_name(&self) -> &str {
            "t"
        }
        fn fw_info(&self) -> &str {
            ""
        }
        fn send(&mut self, b: &[u8]) -> Result<(), ()> {
            self.sent.extend_from_slice(b);
            Ok(())
        }
        fn is_sending(&self) -> bool {
            self.sending
        }
        fn reset_mcu(&mut self) -> ! {
            panic!()
        }
        fn tick(&self) -> u32 {
            self.tick.get()
        }
        fn tick_to_ns(&self) -> u32 {
            1_000_000
        }
        fn boot_time_ms(&self) -> u32 {
            0
        }
    }

    fn encode(control: u8, prop: u8, handle: u32, payload: &[u8]) -> Vec<u8> {
        struct VecSink(Vec<u8>);
        impl EncodeSink for VecSink {
            fn push(&mut self, byte: u8) {
                self.0.push(byte);
            }
        }
        let mut sink = VecSink(Vec::new());
        {
            let mut w = FrameWriter::new(&mut sink);
            w.write_u8(control);
            w.write_u8(prop);
            w.write_u32(handle);
            w.write_bytes(payload);
            w.finish();
        }
        sink.0
    }

    #[test]
    fn low_priority_frame_is_queued_not_dispatched_immediately() {
        let mut link: LinkHandler<64, 16> = LinkHandler::new();
        let mut mcu = Mcu::new();
        let control = 0b0000_0000; // low priority, read, req_seq 0
        let prop = PropertyByte::from_parts(PropertyGroup::Monitoring, 1).raw;
        let wire = encode(control, prop, crate::MCU_HANDLE, &[0xAB]);
        let mut outcome = OnByteOutcome::Nothing;
        for &b in &wire {
            outcome = link.on_byte(&mut mcu, b);
        }
        assert_eq!(outcome, OnByteOutcome::Queued);
        let frame = link.take_pending().unwrap();
        assert_eq!(frame.fobject_handle, crate::MCU_HANDLE);
        assert_eq!(frame.payload(), &[0xAB]);
        assert_eq!(mcu.stats().rx_frames, 1);
    }

    #[test]
    fn high_priority_frame_reports_immediate_dispatch() {
        let mut link: LinkHandler<64, 16> = LinkHandler::new();
        let mut mcu = Mcu::new();
        let control = 1 << 5; // high priority
        let prop = PropertyByte::from_parts(PropertyGroup::Command, 2).raw;
        let wire = encode(control, prop, 7, &[]);
        let mut outcome = OnByteOutcome::Nothing;
        for &b in &wire {
            outcome = link.on_byte(&mut mcu, b);
        }
        assert_eq!(outcome, OnByteOutcome::HighPriority);
        assert!(link.take_pending().is_some());
    }

    #[test]
    fn checksum_error_is_counted_and_scratch_resets() {
        let mut link: LinkHandler<64, 16> = LinkHandler::new();
        let mut mcu = Mcu::new();
        let mut wire = encode(0, 0, 1, &[0x10]);
        wire[0] ^= 0xFF;
        for &b in &wire {
            link.on_byte(&mut mcu, b);
        }
        assert_eq!(mcu.stats().rx_checksum_errors, 1);
        assert!(link.take_pending().is_none());
    }

    #[test]
    fn oversized_run_resets_scratch_and_counts_error() {
        let mut link: LinkHandler<4, 16> = LinkHandler::new();
        let mut mcu = Mcu::new();
        for _ in 0..10 {
            link.on_byte(&mut mcu, 0x01);
        }
        assert_eq!(mcu.stats().rx_min_size_errors, 1);
    }

    #[test]
    fn flush_drains_ring_into_port() {
        let link: LinkHandler<64, 16> = LinkHandler::new();
        let mut mcu = Mcu::new();
        let mut ring: RingBuffer<16> = RingBuffer::new();
        ring.put(b"hello");
        let mut port = FakePort {
            tick: core::cell::Cell::new(0),
            sending: false,
            sent: Vec::new(),
        };
        link.flush(&mut port, &mut ring, false, &mut mcu).unwrap();
        assert_eq!(port.sent, b"hello");
        assert_eq!(mcu.stats().tx_frames, 1);
    }

    #[test]
    fn non_blocking_flush_returns_immediately_while_busy() {
        let link: LinkHandler<64, 16> = LinkHandler::new();
        let mut mcu = Mcu::new();
        let mut ring: RingBuffer<16> = RingBuffer::new();
        ring.put(b"x");
        let mut port = FakePort {
            tick: core::cell::Cell::new(0),
            sending: true,
            sent: Vec::new(),
        };
        link.flush(&mut port, &mut ring, false, &mut mcu).unwrap();
        assert!(port.sent.is_empty());
        assert_eq!(ring.len(), 1);
    }
}
