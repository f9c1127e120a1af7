//! Closed set of inverter measurements and the gauges that hold them.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;

use crate::document::DeviceIdentity;
use crate::error::PollError;
use crate::exposition::{
    MetricType, format_value, metric_name, sanitize_metric_name, write_header, write_sample,
};

/// A measurement type the exporter knows how to publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MeasurementKind {
    AcPower,
    AcCurrent,
    Temperature,
    AcVoltage,
    AcFrequency,
    GridPower,
    DcVoltage,
    DcCurrent,
    Derating,
}

impl MeasurementKind {
    /// Every known kind, in export order. `ALL[k.index()] == k`.
    pub const ALL: [MeasurementKind; 9] = [
        MeasurementKind::AcPower,
        MeasurementKind::AcCurrent,
        MeasurementKind::Temperature,
        MeasurementKind::AcVoltage,
        MeasurementKind::AcFrequency,
        MeasurementKind::GridPower,
        MeasurementKind::DcVoltage,
        MeasurementKind::DcCurrent,
        MeasurementKind::Derating,
    ];

    pub const COUNT: usize = Self::ALL.len();

    /// Look up a `Type` attribute value.
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "AC_Power" => Some(MeasurementKind::AcPower),
            "AC_Current" => Some(MeasurementKind::AcCurrent),
            "Temp" => Some(MeasurementKind::Temperature),
            "AC_Voltage" => Some(MeasurementKind::AcVoltage),
            "AC_Frequency" => Some(MeasurementKind::AcFrequency),
            "GridPower" => Some(MeasurementKind::GridPower),
            "DC_Voltage" => Some(MeasurementKind::DcVoltage),
            "DC_Current" => Some(MeasurementKind::DcCurrent),
            "Derating" => Some(MeasurementKind::Derating),
            _ => None,
        }
    }

    /// The `Type` attribute value the device uses.
    pub fn label(&self) -> &'static str {
        match self {
            MeasurementKind::AcPower => "AC_Power",
            MeasurementKind::AcCurrent => "AC_Current",
            MeasurementKind::Temperature => "Temp",
            MeasurementKind::AcVoltage => "AC_Voltage",
            MeasurementKind::AcFrequency => "AC_Frequency",
            MeasurementKind::GridPower => "GridPower",
            MeasurementKind::DcVoltage => "DC_Voltage",
            MeasurementKind::DcCurrent => "DC_Current",
            MeasurementKind::Derating => "Derating",
        }
    }

    /// Metric name without the prefix.
    pub fn metric_suffix(&self) -> &'static str {
        match self {
            MeasurementKind::AcPower => "ac_power",
            MeasurementKind::AcCurrent => "ac_current",
            MeasurementKind::Temperature => "temp",
            MeasurementKind::AcVoltage => "ac_voltage",
            MeasurementKind::AcFrequency => "ac_frequency",
            MeasurementKind::GridPower => "grid_power",
            MeasurementKind::DcVoltage => "dc_voltage",
            MeasurementKind::DcCurrent => "dc_current",
            MeasurementKind::Derating => "derating",
        }
    }

    pub fn help(&self) -> &'static str {
        match self {
            MeasurementKind::AcPower => "AC Power (W)",
            MeasurementKind::AcCurrent => "AC Current (A)",
            MeasurementKind::Temperature => "Temperature (°C)",
            MeasurementKind::AcVoltage => "AC Voltage (V)",
            MeasurementKind::AcFrequency => "AC Frequency (Hz)",
            MeasurementKind::GridPower => "Grid Power (W)",
            MeasurementKind::DcVoltage => "DC Voltage (V)",
            MeasurementKind::DcCurrent => "DC Current (A)",
            MeasurementKind::Derating => "Derating (%)",
        }
    }

    /// Slot of this kind in the sink table.
    pub fn index(self) -> usize {
        self as usize
    }
}

/// Exporter self-statistics.
#[derive(Debug, Clone, Default)]
pub struct ExporterStats {
    /// Ticks attempted.
    pub polls_total: u64,
    /// Ticks where fetch and parse both succeeded.
    pub polls_succeeded: u64,
    pub fetch_errors: u64,
    pub parse_errors: u64,
    /// Recognized measurements whose value was not a number.
    pub conversion_errors: u64,
    /// Sinks updated by the last successful tick.
    pub last_updated_sinks: usize,
    /// Unix time of the last successful tick.
    pub last_success_unix_secs: Option<f64>,
}

/// Last observed value of every known measurement.
///
/// A single lock guards the whole table, so a scrape never sees half of a
/// tick's updates.
pub struct SinkRegistry {
    prefix: String,
    sinks: RwLock<[Option<f64>; MeasurementKind::COUNT]>,
    device: RwLock<Option<DeviceIdentity>>,
    stats: RwLock<ExporterStats>,
}

/// Create a shareable registry handle.
pub type SharedRegistry = Arc<SinkRegistry>;

impl SinkRegistry {
    /// Create a registry with every sink unset.
    pub fn new(prefix: &str) -> Self {
        let prefix = if prefix.is_empty() {
            String::new()
        } else {
            sanitize_metric_name(prefix)
        };

        Self {
            prefix,
            sinks: RwLock::new([None; MeasurementKind::COUNT]),
            device: RwLock::new(None),
            stats: RwLock::new(ExporterStats::default()),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Current value of one sink.
    pub fn get(&self, kind: MeasurementKind) -> Option<f64> {
        self.sinks.read()[kind.index()]
    }

    /// Copy of every sink, indexed by [`MeasurementKind::index`].
    pub fn snapshot(&self) -> [Option<f64>; MeasurementKind::COUNT] {
        *self.sinks.read()
    }

    /// Number of sinks that hold a value.
    pub fn observed_count(&self) -> usize {
        self.sinks.read().iter().filter(|v| v.is_some()).count()
    }

    /// Overwrite sinks with new readings under one lock.
    ///
    /// Later readings for the same kind win. Returns the number of distinct
    /// sinks written.
    pub fn store(&self, readings: &[(MeasurementKind, f64)]) -> usize {
        if readings.is_empty() {
            return 0;
        }

        let mut touched = [false; MeasurementKind::COUNT];
        let mut sinks = self.sinks.write();
        for &(kind, value) in readings {
            sinks[kind.index()] = Some(value);
            touched[kind.index()] = true;
        }

        touched.iter().filter(|t| **t).count()
    }

    pub fn set_device(&self, identity: DeviceIdentity) {
        *self.device.write() = Some(identity);
    }

    pub fn device(&self) -> Option<DeviceIdentity> {
        self.device.read().clone()
    }

    /// Get exporter statistics.
    pub fn stats(&self) -> ExporterStats {
        self.stats.read().clone()
    }

    pub(crate) fn record_poll_started(&self) {
        self.stats.write().polls_total += 1;
    }

    pub(crate) fn record_success(&self, updated: usize) {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or_default();

        let mut stats = self.stats.write();
        stats.polls_succeeded += 1;
        stats.last_updated_sinks = updated;
        stats.last_success_unix_secs = Some(now);
    }

    pub(crate) fn record_failure(&self, error: &PollError) {
        let mut stats = self.stats.write();
        match error {
            PollError::Fetch(_) => stats.fetch_errors += 1,
            PollError::Parse(_) => stats.parse_errors += 1,
        }
    }

    pub(crate) fn record_conversion_error(&self) {
        self.stats.write().conversion_errors += 1;
    }

    /// Render metrics in Prometheus exposition format.
    ///
    /// Sinks that were never observed are left out entirely.
    pub fn render(&self) -> String {
        let mut output = String::with_capacity(2048);
        let sinks = self.snapshot();

        for kind in MeasurementKind::ALL {
            if let Some(value) = sinks[kind.index()] {
                let name = metric_name(&self.prefix, kind.metric_suffix());
                write_header(&mut output, &name, MetricType::Gauge, kind.help());
                write_sample(&mut output, &name, &[], &format_value(value));
            }
        }

        if let Some(device) = self.device() {
            self.render_device_info(&mut output, &device);
        }

        self.render_stats(&mut output);
        output
    }

    fn render_device_info(&self, output: &mut String, device: &DeviceIdentity) {
        // DateTime changes every poll and would churn the series.
        let labels: Vec<(&str, &str)> = [
            ("name", &device.name),
            ("nominal_power", &device.nominal_power),
            ("type", &device.device_type),
            ("serial", &device.serial),
            ("bus_address", &device.bus_address),
            ("netbios_name", &device.netbios_name),
            ("ip_address", &device.ip_address),
        ]
        .into_iter()
        .filter_map(|(key, value)| value.as_deref().map(|v| (key, v)))
        .collect();

        let name = metric_name(&self.prefix, "device_info");
        write_header(
            output,
            &name,
            MetricType::Gauge,
            "Inverter identity reported by the device",
        );
        write_sample(output, &name, &labels, "1");
    }

    fn render_stats(&self, output: &mut String) {
        let stats = self.stats();

        let name = metric_name(&self.prefix, "exporter_polls_total");
        write_header(output, &name, MetricType::Counter, "Polls of the inverter attempted");
        write_sample(output, &name, &[], &stats.polls_total.to_string());

        let name = metric_name(&self.prefix, "exporter_poll_errors_total");
        write_header(output, &name, MetricType::Counter, "Failed polls by error kind");
        write_sample(output, &name, &[("kind", "fetch")], &stats.fetch_errors.to_string());
        write_sample(output, &name, &[("kind", "parse")], &stats.parse_errors.to_string());

        let name = metric_name(&self.prefix, "exporter_conversion_errors_total");
        write_header(
            output,
            &name,
            MetricType::Counter,
            "Measurement values that could not be parsed as numbers",
        );
        write_sample(output, &name, &[], &stats.conversion_errors.to_string());

        let name = metric_name(&self.prefix, "exporter_last_updated_sinks");
        write_header(
            output,
            &name,
            MetricType::Gauge,
            "Gauges updated by the last successful poll",
        );
        write_sample(output, &name, &[], &stats.last_updated_sinks.to_string());

        if let Some(ts) = stats.last_success_unix_secs {
            let name = metric_name(&self.prefix, "exporter_last_success_timestamp_seconds");
            write_header(
                output,
                &name,
                MetricType::Gauge,
                "Unix time of the last successful poll",
            );
            write_sample(output, &name, &[], &format_value(ts));
        }
    }
}
