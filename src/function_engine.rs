//! Cooperative multi-slot command execution (spec §3 "FunctionEngineItem",
//! §4.8).
//!
//! Grounded on
//! `examples/original_source/faraabin/faraabin_function_engine.h/.c`: up to
//! `MAX_CONCURRENT_FUNCTION` slots, `(function, object)` pair identity, and
//! the `CONTINUE`/`TERMINATE_OK`/`ERROR_PARAM_QTY` handler result
//! convention, here as [`HandlerResult`] instead of the source's bare
//! `uint8_t` sentinels.

use crate::chrono::Chrono;
use crate::error::FunctionError;
use crate::fobject::FobjectId;
use crate::port::Port;

/// Sentinel values a function handler returns, matching the source's
/// `FB_FENGINE_*`/handler-result constants on the wire but modeled as a
/// closed enum here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerResult {
    /// Looping function: leave the slot running, call again next `Run()`.
    Continue,
    /// Successful completion.
    TerminateOk,
    /// The function rejected its argument text.
    ErrorParamQty,
}

impl HandlerResult {
    /// `true` for [`HandlerResult::Continue`].
    pub const fn is_continue(self) -> bool {
        matches!(self, HandlerResult::Continue)
    }
}

/// Function-lifecycle event ids emitted against the function's own handle,
/// with the bound object carried as the outbound frame's extended handle
/// (spec §4.8 "Run()").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum FunctionEventId {
    /// `start` accepted; the function is now running against its object.
    Run = 0,
    /// The slot stopped, either by request or by completing.
    Stop = 1,
    /// `pause` accepted.
    Pause = 2,
    /// `resume` accepted.
    Resume = 3,
    /// The handler rejected its argument text.
    ParamError = 4,
}

/// Bound `(function, object)` identity occupying a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SlotKey {
    function: FobjectId,
    object: FobjectId,
}

const ARG_BUF_LEN: usize = 64;

/// One concurrent execution slot (spec §3 "FunctionEngineItem").
struct Slot {
    key: Option<SlotKey>,
    arg_buf: [u8; ARG_BUF_LEN],
    arg_len: usize,
    is_first_run: bool,
    chrono: Chrono,
    busy: bool,
    running: bool,
}

impl Slot {
    const fn empty() -> Self {
        Self {
            key: None,
            arg_buf: [0u8; ARG_BUF_LEN],
            arg_len: 0,
            is_first_run: false,
            chrono: Chrono::new(),
            busy: false,
            running: false,
        }
    }
}

/// Result of a completed invocation, handed to the caller so it can emit
/// the `EVENT_INFO_STOP`-style extended system event (spec §4.8 "Run()").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completion {
    /// The function that completed.
    pub function: FobjectId,
    /// The object it ran against.
    pub object: FobjectId,
    /// Why it stopped.
    pub result: HandlerResult,
    /// Elapsed microseconds since the slot's first run.
    pub elapsed_us: u32,
}

/// Fixed set of `N` concurrent function slots.
pub struct FunctionEngine<const N: usize> {
    slots: [Slot; N],
}

impl<const N: usize> FunctionEngine<N> {
    /// An engine with all slots free. `Slot::empty()` is not `const` due to
    /// `Chrono`'s non-`Copy` array initialization path, so this builds the
    /// array with [`core::array::from_fn`].
    pub fn new() -> Self {
        Self {
            slots: core::array::from_fn(|_| Slot::empty()),
        }
    }

    /// Number of slots currently running (spec §11 supplement
    /// `GetQtyOfRunningFunctions`).
    pub fn running_count(&self) -> usize {
        self.slots.iter().filter(|s| s.running).count()
    }

    /// Iterates `(function, object)` for every running slot (spec §11
    /// supplement `GetPtrsOfRunningFunction`).
    pub fn running_iter(&self) -> impl Iterator<Item = (FobjectId, FobjectId)> + '_ {
        self.slots.iter().filter_map(|s| {
            if s.running {
                s.key.map(|k| (k.function, k.object))
            } else {
                None
            }
        })
    }

    /// Starts `(function, object)` with `args`, rejecting a duplicate
    /// running pair or a full slot table (spec §4.8 `start`).
    pub fn start(
        &mut self,
        function: FobjectId,
        object: FobjectId,
        args: &[u8],
    ) -> Result<(), FunctionError> {
        let key = SlotKey { function, object };
        if self
            .slots
            .iter()
            .any(|s| s.running && s.key == Some(key))
        {
            return Err(FunctionError::AlreadyRunning);
        }
        let slot = self
            .slots
            .iter_mut()
            .find(|s| !s.busy)
            .ok_or(FunctionError::MaxConcurrentReached)?;
        let n = args.len().min(ARG_BUF_LEN - 1);
        slot.arg_buf[..n].copy_from_slice(&args[..n]);
        slot.arg_buf[n] = 0; // zero terminator, spec §4.8
        slot.arg_len = n;
        slot.is_first_run = true;
        slot.busy = true;
        slot.running = true;
        slot.key = Some(key);
        Ok(())
    }

    fn find_slot_mut(&mut self, function: FobjectId, object: FobjectId) -> Option<&mut Slot> {
        let key = SlotKey { function, object };
        self.slots.iter_mut().find(|s| s.busy && s.key == Some(key))
    }

    /// Stops `(function, object)` immediately, freeing its slot.
    pub fn stop(&mut self, function: FobjectId, object: FobjectId) -> Result<(), FunctionError> {
        let slot = self
            .find_slot_mut(function, object)
            .ok_or(FunctionError::NotFound)?;
        slot.running = false;
        slot.busy = false;
        slot.key = None;
        Ok(())
    }

    /// Pauses a running slot: `running=false`, `busy` preserved.
    pub fn pause(&mut self, function: FobjectId, object: FobjectId) -> Result<(), FunctionError> {
        let slot = self
            .find_slot_mut(function, object)
            .ok_or(FunctionError::NotFound)?;
        slot.running = false;
        Ok(())
    }

    /// Resumes a paused slot: `running=true`.
    pub fn resume(&mut self, function: FobjectId, object: FobjectId) -> Result<(), FunctionError> {
        let slot = self
            .find_slot_mut(function, object)
            .ok_or(FunctionError::NotFound)?;
        slot.running = true;
        Ok(())
    }

    /// Drives every running slot once, invoking `handler(object, arg_bytes,
    /// is_first_run) -> HandlerResult`. Returns completions for slots that
    /// stopped this call, for the caller to turn into system events (spec
    /// §4.8 "Run()").
    pub fn run<P: Port>(
        &mut self,
        port: &P,
        mut handler: impl FnMut(FobjectId, FobjectId, &[u8], bool) -> HandlerResult,
        mut on_complete: impl FnMut(Completion),
    ) {
        for slot in self.slots.iter_mut() {
            if !slot.running {
                continue;
            }
            let Some(key) = slot.key else { continue };
            if slot.is_first_run {
                slot.chrono.start(port);
            }
            let result = handler(
                key.function,
                key.object,
                &slot.arg_buf[..slot.arg_len],
                slot.is_first_run,
            );
            slot.is_first_run = false;
            if !result.is_continue() {
                let elapsed_us = slot.chrono.elapsed_us(port);
                slot.running = false;
                slot.busy = false;
                slot.key = None;
                on_complete(Completion {
                    function: key.function,
                    object: key.object,
                    result,
                    elapsed_us,
                });
            }
        }
    }

    /// RAM footprint of this engine in bytes (spec §11 supplement).
    pub const fn ram_usage(&self) -> usize {
        core::mem::size_of::<Self>()
    }
}

impl<const N: usize> Default for FunctionEngine<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakePort {
        tick: core::cell::Cell<u32>,
    }
    impl Port for FakePort {
        fn fw_name(&self) -> &str {
            "t"
        }
        fn fw_info(&self) -> &str {
            ""
        }
        fn send(&mut self, _b: &[u8]) -> Result<(), ()> {
            Ok(())
        }
        fn is_sending(&self) -> bool {
            false
        }
        fn reset_mcu(&mut self) -> ! {
            panic!()
        }
        fn tick(&self) -> u32 {
            self.tick.get()
        }
        fn tick_to_ns(&self) -> u32 {
            1_000
        }
        fn boot_time_ms(&self) -> u32 {
            0
        }
    }

    #[test]
    fn double_start_is_rejected_until_stopped() {
        let mut e: FunctionEngine<2> = FunctionEngine::new();
        let f = FobjectId(1);
        let o = FobjectId(2);
        e.start(f, o, b"42 7").unwrap();
        assert_eq!(e.start(f, o, b""), Err(FunctionError::AlreadyRunning));
        e.stop(f, o).unwrap();
        assert!(e.start(f, o, b"").is_ok());
    }

    #[test]
    fn max_concurrent_is_enforced() {
        let mut e: FunctionEngine<1> = FunctionEngine::new();
        e.start(FobjectId(1), FobjectId(1), b"").unwrap();
        assert_eq!(
            e.start(FobjectId(2), FobjectId(2), b""),
            Err(FunctionError::MaxConcurrentReached)
        );
    }

    #[test]
    fn continue_keeps_slot_running_terminate_frees_it() {
        let mut e: FunctionEngine<2> = FunctionEngine::new();
        let port = FakePort { tick: core::cell::Cell::new(0) };
        e.start(FobjectId(1), FobjectId(1), b"").unwrap();

        let mut calls = 0;
        e.run(&port, |_, _, _, _| { calls += 1; HandlerResult::Continue }, |_| panic!("should not complete"));
        assert_eq!(calls, 1);
        assert_eq!(e.running_count(), 1);

        port.tick.set(500);
        let mut completed = None;
        e.run(
            &port,
            |_, _, _, _| HandlerResult::TerminateOk,
            |c| completed = Some(c),
        );
        assert_eq!(e.running_count(), 0);
        let c = completed.unwrap();
        assert_eq!(c.result, HandlerResult::TerminateOk);
        assert!(e.start(FobjectId(1), FobjectId(1), b"").is_ok());
    }

    #[test]
    fn pause_stops_dispatch_without_freeing_slot() {
        let mut e: FunctionEngine<1> = FunctionEngine::new();
        let port = FakePort { tick: core::cell::Cell::new(0) };
        let f = FobjectId(1);
        let o = FobjectId(1);
        e.start(f, o, b"").unwrap();
        e.pause(f, o).unwrap();
        e.run(&port, |_, _, _, _| panic!("paused slot must not run"), |_| {});
        assert_eq!(e.start(f, o, b""), Err(FunctionError::MaxConcurrentReached));
        e.resume(f, o).unwrap();
        let mut ran = false;
        e.run(&port, |_, _, _, _| { ran = true; HandlerResult::Continue }, |_| {});
        assert!(ran);
    }
}
