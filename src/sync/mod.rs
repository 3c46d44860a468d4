//! Critical-section abstraction used by the RX ISR path.
//!
//! Spec §5: `on_byte` may run from an interrupt or equivalent preemptor;
//! the only other code allowed to touch shared state from that context is
//! wrapped in one of these sections. Sections are leaf operations — they
//! save and disable one preemption source and restore it, never nest.

pub mod critical_section;

pub use critical_section::{CriticalSection, NoopCriticalSection};
