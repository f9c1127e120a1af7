//! The inverter's `measurements.xml` document.
//!
//! A typical response looks like this:
//!
//! ```xml
//! <root>
//!   <Device Name="StecaGrid 2000" NominalPower="2000" Type="Inverter" Serial="123456"
//!           BusAddress="1" NetBiosName="INVERTER" IpAddress="192.168.50.144"
//!           DateTime="2021-08-03T21:39:21">
//!     <Measurements>
//!       <Measurement Value="232.8" Unit="V" Type="AC_Voltage"/>
//!       <Measurement Unit="A" Type="AC_Current"/>
//!       <Measurement Value="100.0" Unit="%" Type="Derating"/>
//!     </Measurements>
//!   </Device>
//! </root>
//! ```
//!
//! The firmware omits `Value` when a channel has no reading, and the set and
//! order of `Measurement` elements varies between firmware versions.

use quick_xml::Reader;
use quick_xml::events::Event;
use serde::Deserialize;

use crate::error::{ConversionError, ParseError};

const ROOT_ELEMENT: &[u8] = b"root";

/// One parsed poll response.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementDocument {
    pub device: DeviceIdentity,
    /// Measurement records in document order.
    pub records: Vec<MeasurementRecord>,
}

/// Identity attributes of the `Device` element.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub name: Option<String>,
    pub nominal_power: Option<String>,
    pub device_type: Option<String>,
    pub serial: Option<String>,
    pub bus_address: Option<String>,
    pub netbios_name: Option<String>,
    pub ip_address: Option<String>,
    pub date_time: Option<String>,
}

/// A single `Measurement` element.
///
/// `value` keeps the attribute text so that one bad number only costs that
/// one field; use [`MeasurementRecord::reading`] to get the decimal value.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MeasurementRecord {
    /// The `Type` attribute, e.g. `AC_Voltage`.
    #[serde(rename = "@Type", default)]
    pub label: String,

    #[serde(rename = "@Value", default)]
    pub value: Option<String>,

    #[serde(rename = "@Unit", default)]
    pub unit: String,
}

impl MeasurementRecord {
    pub fn new(label: impl Into<String>, value: Option<&str>, unit: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: value.map(str::to_string),
            unit: unit.into(),
        }
    }

    /// The numeric reading, or `None` when the device sent no value.
    ///
    /// An empty or whitespace-only `Value` counts as no value.
    pub fn reading(&self) -> Result<Option<f64>, ConversionError> {
        let Some(raw) = self.value.as_deref() else {
            return Ok(None);
        };

        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }

        trimmed
            .parse::<f64>()
            .map(Some)
            .map_err(|source| ConversionError {
                label: self.label.clone(),
                raw: raw.to_string(),
                source,
            })
    }
}

#[derive(Debug, Deserialize)]
struct RawRoot {
    #[serde(rename = "Device")]
    device: RawDevice,
}

#[derive(Debug, Deserialize)]
struct RawDevice {
    #[serde(rename = "@Name", default)]
    name: Option<String>,
    #[serde(rename = "@NominalPower", default)]
    nominal_power: Option<String>,
    #[serde(rename = "@Type", default)]
    device_type: Option<String>,
    #[serde(rename = "@Serial", default)]
    serial: Option<String>,
    #[serde(rename = "@BusAddress", default)]
    bus_address: Option<String>,
    #[serde(rename = "@NetBiosName", default)]
    netbios_name: Option<String>,
    #[serde(rename = "@IpAddress", default)]
    ip_address: Option<String>,
    #[serde(rename = "@DateTime", default)]
    date_time: Option<String>,

    #[serde(rename = "Measurements")]
    measurements: RawMeasurements,
}

#[derive(Debug, Deserialize)]
struct RawMeasurements {
    #[serde(rename = "Measurement", default)]
    records: Vec<MeasurementRecord>,
}

impl MeasurementDocument {
    /// Parse a response body.
    ///
    /// The body is decoded as lossy UTF-8 and must be a single well-formed
    /// `<root>` element. A document without a `Device` element holding a
    /// `Measurements` list is rejected.
    pub fn parse(body: &[u8]) -> Result<Self, ParseError> {
        let text = String::from_utf8_lossy(body);
        if text.trim().is_empty() {
            return Err(ParseError::Empty);
        }

        check_well_formed(&text)?;

        let raw: RawRoot = quick_xml::de::from_str(&text)?;
        let device = raw.device;

        Ok(Self {
            device: DeviceIdentity {
                name: device.name,
                nominal_power: device.nominal_power,
                device_type: device.device_type,
                serial: device.serial,
                bus_address: device.bus_address,
                netbios_name: device.netbios_name,
                ip_address: device.ip_address,
                date_time: device.date_time,
            },
            records: device.measurements.records,
        })
    }
}

/// Walk the whole body and check it holds exactly one `<root>` element.
///
/// The deserializer stops at the end of the first element and ignores its
/// name, so anything after it would otherwise go unnoticed.
fn check_well_formed(text: &str) -> Result<(), ParseError> {
    let mut reader = Reader::from_str(text);
    let mut depth = 0usize;
    let mut seen_root = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                if depth == 0 {
                    check_root(e.name().as_ref(), seen_root)?;
                    seen_root = true;
                }
                depth += 1;
            }
            Event::Empty(e) => {
                if depth == 0 {
                    check_root(e.name().as_ref(), seen_root)?;
                    seen_root = true;
                }
            }
            Event::End(_) => depth = depth.saturating_sub(1),
            Event::Text(t) => {
                if depth == 0 && !t.iter().all(u8::is_ascii_whitespace) {
                    return Err(ParseError::ContentOutsideRoot);
                }
            }
            Event::CData(_) if depth == 0 => return Err(ParseError::ContentOutsideRoot),
            Event::Eof => break,
            // Declaration, comments, processing instructions, doctype.
            _ => {}
        }
    }

    if depth > 0 {
        return Err(ParseError::Truncated);
    }
    if !seen_root {
        return Err(ParseError::MissingRoot);
    }
    Ok(())
}

fn check_root(name: &[u8], seen_root: bool) -> Result<(), ParseError> {
    if seen_root {
        return Err(ParseError::ContentOutsideRoot);
    }
    if name != ROOT_ELEMENT {
        return Err(ParseError::UnexpectedRoot(
            String::from_utf8_lossy(name).into_owned(),
        ));
    }
    Ok(())
}
