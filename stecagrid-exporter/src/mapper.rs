//! Maps measurement records onto the sink registry.
//!
//! Records are matched by their `Type` label, never by position: firmware
//! versions differ in which measurements they report and in what order.

use tracing::{trace, warn};

use crate::document::MeasurementDocument;
use crate::registry::{MeasurementKind, SinkRegistry};

/// Apply a document to the registry and return the number of sinks updated.
///
/// - Recognized records with a value overwrite their sink.
/// - Recognized records without a value, or with a value that is not a
///   number, leave their sink untouched.
/// - Unrecognized records are ignored.
///
/// All updates from one document become visible to readers at once.
pub fn apply(document: &MeasurementDocument, registry: &SinkRegistry) -> usize {
    let mut readings = Vec::with_capacity(document.records.len());

    for record in &document.records {
        let Some(kind) = MeasurementKind::from_label(&record.label) else {
            trace!(label = %record.label, "Ignoring unknown measurement type");
            continue;
        };

        match record.reading() {
            Ok(Some(value)) => readings.push((kind, value)),
            Ok(None) => {
                trace!(measurement = kind.label(), "Measurement has no value");
            }
            Err(e) => {
                warn!(
                    measurement = kind.label(),
                    raw = %e.raw,
                    error = %e,
                    "Skipping unparseable measurement value"
                );
                registry.record_conversion_error();
            }
        }
    }

    registry.store(&readings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{DeviceIdentity, MeasurementRecord};

    fn doc(records: Vec<MeasurementRecord>) -> MeasurementDocument {
        MeasurementDocument {
            device: DeviceIdentity::default(),
            records,
        }
    }

    #[test]
    fn test_apply_sets_present_values() {
        let registry = SinkRegistry::new("stecagrid");
        let document = doc(vec![
            MeasurementRecord::new("AC_Voltage", Some("232.8"), "V"),
            MeasurementRecord::new("AC_Frequency", Some("50.131"), "Hz"),
        ]);

        assert_eq!(apply(&document, &registry), 2);
        assert_eq!(registry.get(MeasurementKind::AcVoltage), Some(232.8));
        assert_eq!(registry.get(MeasurementKind::AcFrequency), Some(50.131));
    }

    #[test]
    fn test_apply_keeps_value_when_absent() {
        let registry = SinkRegistry::new("stecagrid");
        apply(
            &doc(vec![MeasurementRecord::new("AC_Power", Some("1450"), "W")]),
            &registry,
        );

        let updated = apply(
            &doc(vec![MeasurementRecord::new("AC_Power", None, "W")]),
            &registry,
        );

        assert_eq!(updated, 0);
        assert_eq!(registry.get(MeasurementKind::AcPower), Some(1450.0));
    }

    #[test]
    fn test_apply_absent_never_creates_zero() {
        let registry = SinkRegistry::new("stecagrid");
        apply(
            &doc(vec![MeasurementRecord::new("DC_Current", None, "A")]),
            &registry,
        );
        assert_eq!(registry.get(MeasurementKind::DcCurrent), None);
    }

    #[test]
    fn test_apply_ignores_unknown_types() {
        let registry = SinkRegistry::new("stecagrid");
        let document = doc(vec![
            MeasurementRecord::new("AC_Energy", Some("12.3"), "kWh"),
            MeasurementRecord::new("", Some("1"), ""),
        ]);

        assert_eq!(apply(&document, &registry), 0);
        assert_eq!(registry.observed_count(), 0);
        assert_eq!(registry.stats().conversion_errors, 0);
    }

    #[test]
    fn test_apply_is_order_independent() {
        let forward = doc(vec![
            MeasurementRecord::new("DC_Voltage", Some("310.2"), "V"),
            MeasurementRecord::new("Temp", Some("41.0"), "°C"),
            MeasurementRecord::new("Derating", Some("100.0"), "%"),
        ]);
        let mut reversed = forward.clone();
        reversed.records.reverse();

        let a = SinkRegistry::new("stecagrid");
        let b = SinkRegistry::new("stecagrid");
        apply(&forward, &a);
        apply(&reversed, &b);

        assert_eq!(a.snapshot(), b.snapshot());
        assert_eq!(a.get(MeasurementKind::Temperature), Some(41.0));
    }

    #[test]
    fn test_apply_missing_channel_does_not_shift_values() {
        // AC_Current is not reported at all; everything after it must still
        // land on the right gauge.
        let registry = SinkRegistry::new("stecagrid");
        let document = doc(vec![
            MeasurementRecord::new("AC_Voltage", Some("230.1"), "V"),
            MeasurementRecord::new("AC_Power", Some("900"), "W"),
        ]);

        apply(&document, &registry);

        assert_eq!(registry.get(MeasurementKind::AcVoltage), Some(230.1));
        assert_eq!(registry.get(MeasurementKind::AcPower), Some(900.0));
        assert_eq!(registry.get(MeasurementKind::AcCurrent), None);
    }

    #[test]
    fn test_apply_is_idempotent() {
        let registry = SinkRegistry::new("stecagrid");
        let document = doc(vec![
            MeasurementRecord::new("GridPower", Some("-35.5"), "W"),
            MeasurementRecord::new("AC_Current", None, "A"),
        ]);

        apply(&document, &registry);
        let once = registry.snapshot();
        apply(&document, &registry);

        assert_eq!(registry.snapshot(), once);
    }

    #[test]
    fn test_apply_skips_unparseable_value() {
        let registry = SinkRegistry::new("stecagrid");
        apply(
            &doc(vec![MeasurementRecord::new("Temp", Some("38.5"), "°C")]),
            &registry,
        );

        let document = doc(vec![
            MeasurementRecord::new("Temp", Some("---"), "°C"),
            MeasurementRecord::new("AC_Voltage", Some("231.0"), "V"),
        ]);
        let updated = apply(&document, &registry);

        assert_eq!(updated, 1);
        assert_eq!(registry.get(MeasurementKind::Temperature), Some(38.5));
        assert_eq!(registry.get(MeasurementKind::AcVoltage), Some(231.0));
        assert_eq!(registry.stats().conversion_errors, 1);
    }

    #[test]
    fn test_apply_duplicate_label_last_wins() {
        let registry = SinkRegistry::new("stecagrid");
        let document = doc(vec![
            MeasurementRecord::new("AC_Voltage", Some("229.0"), "V"),
            MeasurementRecord::new("AC_Voltage", Some("233.4"), "V"),
        ]);

        assert_eq!(apply(&document, &registry), 1);
        assert_eq!(registry.get(MeasurementKind::AcVoltage), Some(233.4));
    }

    #[test]
    fn test_apply_preserves_out_of_range_values() {
        let registry = SinkRegistry::new("stecagrid");
        let document = doc(vec![MeasurementRecord::new("Derating", Some("140"), "%")]);

        apply(&document, &registry);
        assert_eq!(registry.get(MeasurementKind::Derating), Some(140.0));
    }
}
