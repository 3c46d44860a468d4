//! Trigger configuration and edge detection (spec §4.7 "Trigger
//! detection").

use crate::databus::channel::CaptureSample;
use crate::vartype::PrimitiveId;

/// What last armed the trigger (spec §11 supplement: the original's
/// `eFaraabinFobjectDataBus_TrigSource` has three non-`None` sources, which
/// the distilled spec only mentions in passing).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrigSource {
    /// No trigger armed / not yet fired.
    None,
    /// Fired by [`crate::databus::DataBus::force_trigger`] (application
    /// API call).
    Api,
    /// Fired by [`crate::databus::DataBus::force_manual_trigger`] (desktop
    /// tool "manual trigger" button).
    Manual,
    /// Fired by the configured trigger channel crossing its threshold.
    Channel,
}

/// Edge condition evaluated against a channel's sampled value (spec §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrigType {
    /// Fires when the sampled value differs from the previous sample.
    /// Not meaningful for floating-point channels (spec §9 open
    /// question — behavior preserved, not "improved").
    Change,
    /// Fires on `value > threshold && last_value <= threshold`.
    Rising,
    /// Fires on `value < threshold && last_value >= threshold`.
    Falling,
}

/// Trigger configuration plus the edge-detection state carried across
/// `Run()` calls.
#[derive(Debug, Clone, Copy)]
pub struct TriggerConfig {
    /// Index into the channel table providing the trigger's source value.
    pub source_channel: usize,
    /// Edge condition.
    pub trig_type: TrigType,
    /// Raw threshold bytes, interpreted per the source channel's
    /// primitive id.
    pub threshold: [u8; 8],
    /// Last sampled value, used for edge detection.
    pub last_value: [u8; 8],
    /// `true` if [`crate::databus::DataBus::force_trigger`] is permitted
    /// (API source enabled).
    pub api_trigger_enabled: bool,
    /// Set once the trigger has fired for the current `TrigWait`/
    /// `TrigWindow` cycle.
    pub is_triggered: bool,
    /// What fired the trigger.
    pub source: TrigSource,
    /// Tick timestamp at the moment the trigger fired.
    pub trig_timestamp: u32,
}

impl TriggerConfig {
    /// An un-armed trigger pointing at channel 0.
    pub const fn new() -> Self {
        Self {
            source_channel: 0,
            trig_type: TrigType::Rising,
            threshold: [0u8; 8],
            last_value: [0u8; 8],
            api_trigger_enabled: false,
            is_triggered: false,
            source: TrigSource::None,
            trig_timestamp: 0,
        }
    }

    /// Re-arms the trigger: clears `is_triggered` and resets `last_value`
    /// to `current`, matching the original's `reset_trigger` behavior of
    /// re-baselining the edge detector every time the DataBus enters
    /// `TrigWait`.
    pub fn reset(&mut self, current: [u8; 8]) {
        self.is_triggered = false;
        self.source = TrigSource::None;
        self.last_value = current;
    }

    /// Evaluates the configured edge condition against `sample`, updating
    /// `last_value` regardless of outcome. Returns `true` exactly once per
    /// qualifying edge (spec §8 invariant 3).
    pub fn evaluate(&mut self, sample: &CaptureSample, primitive: PrimitiveId) -> bool {
        let fired = match self.trig_type {
            TrigType::Change => {
                if primitive.is_float() {
                    false
                } else {
                    sample.value != self.last_value
                }
            }
            TrigType::Rising => self.compare_edge(sample, primitive, true),
            TrigType::Falling => self.compare_edge(sample, primitive, false),
        };
        self.last_value = sample.value;
        fired
    }

    fn compare_edge(&self, sample: &CaptureSample, primitive: PrimitiveId, rising: bool) -> bool {
        let (value, last, threshold) = if primitive.is_float() {
            let v = f32::from_le_bytes([
                sample.value[0],
                sample.value[1],
                sample.value[2],
                sample.value[3],
            ]) as f64;
            let l = f32::from_le_bytes([
                self.last_value[0],
                self.last_value[1],
                self.last_value[2],
                self.last_value[3],
            ]) as f64;
            let t = f32::from_le_bytes([
                self.threshold[0],
                self.threshold[1],
                self.threshold[2],
                self.threshold[3],
            ]) as f64;
            (v, l, t)
        } else if primitive.is_signed() {
            (
                i32::from_le_bytes([
                    sample.value[0],
                    sample.value[1],
                    sample.value[2],
                    sample.value[3],
                ]) as f64,
                i32::from_le_bytes([
                    self.last_value[0],
                    self.last_value[1],
                    self.last_value[2],
                    self.last_value[3],
                ]) as f64,
                i32::from_le_bytes([
                    self.threshold[0],
                    self.threshold[1],
                    self.threshold[2],
                    self.threshold[3],
                ]) as f64,
            )
        } else {
            (
                u32::from_le_bytes([
                    sample.value[0],
                    sample.value[1],
                    sample.value[2],
                    sample.value[3],
                ]) as f64,
                u32::from_le_bytes([
                    self.last_value[0],
                    self.last_value[1],
                    self.last_value[2],
                    self.last_value[3],
                ]) as f64,
                u32::from_le_bytes([
                    self.threshold[0],
                    self.threshold[1],
                    self.threshold[2],
                    self.threshold[3],
                ]) as f64,
            )
        };
        if rising {
            value > threshold && last <= threshold
        } else {
            value < threshold && last >= threshold
        }
    }
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fobject::{FobjectId, FobjectKind};

    fn sample(v: i32) -> CaptureSample {
        CaptureSample {
            fobject_kind: FobjectKind::EntityNumerical,
            fobject_handle: FobjectId(1),
            timestamp: 0,
            value: {
                let mut b = [0u8; 8];
                b[..4].copy_from_slice(&v.to_le_bytes());
                b
            },
        }
    }

    #[test]
    fn rising_edge_fires_once_on_crossing() {
        let mut t = TriggerConfig::new();
        t.trig_type = TrigType::Rising;
        t.threshold[..4].copy_from_slice(&10i32.to_le_bytes());
        t.reset(sample(0).value);

        assert!(!t.evaluate(&sample(5), PrimitiveId::I32));
        assert!(!t.evaluate(&sample(9), PrimitiveId::I32));
        assert!(t.evaluate(&sample(12), PrimitiveId::I32));
        assert!(!t.evaluate(&sample(12), PrimitiveId::I32));
    }

    #[test]
    fn rising_edge_never_fires_if_already_above() {
        let mut t = TriggerConfig::new();
        t.trig_type = TrigType::Rising;
        t.threshold[..4].copy_from_slice(&10i32.to_le_bytes());
        t.reset(sample(20).value);
        assert!(!t.evaluate(&sample(20), PrimitiveId::I32));
    }

    #[test]
    fn change_fires_on_any_difference() {
        let mut t = TriggerConfig::new();
        t.trig_type = TrigType::Change;
        t.reset(sample(1).value);
        assert!(!t.evaluate(&sample(1), PrimitiveId::U8));
        assert!(t.evaluate(&sample(2), PrimitiveId::U8));
    }
}
