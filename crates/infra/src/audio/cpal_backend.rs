//! CPAL-based output device discovery
//!
//! Finds output devices and negotiates an `f32` stream configuration for
//! them. Devices are identified by their host-reported name.

use cpal::traits::{DeviceTrait, HostTrait};
use std::fmt;
use tracing::{debug, info, warn};
use modradio_core::domain::audio::{AudioError, DeviceId, DeviceInfo, Result};

/// Host-reported name of a device
pub(crate) fn device_name(device: &cpal::Device) -> String {
    #[allow(deprecated)]
    device
        .name()
        .unwrap_or_else(|_| "Unknown Device".to_string())
}

/// Output side of the default CPAL host
pub struct CpalOutputHost {
    host: cpal::Host,
}

impl Default for CpalOutputHost {
    fn default() -> Self {
        Self::new()
    }
}

impl CpalOutputHost {
    pub fn new() -> Self {
        let host = cpal::default_host();
        debug!("Using audio host: {:?}", host.id());
        Self { host }
    }

    fn describe(device: &cpal::Device, default_name: Option<&str>) -> DeviceInfo {
        let name = device_name(device);
        let default_config = device.default_output_config().ok();
        DeviceInfo {
            id: DeviceId::new(name.clone()),
            is_default: default_name == Some(name.as_str()),
            default_sample_rate: default_config.as_ref().map(|c| c.sample_rate()),
            default_channels: default_config.as_ref().map(|c| c.channels()),
            name,
        }
    }

    /// Enumerate every output device the host exposes
    pub fn output_devices(&self) -> Result<Vec<DeviceInfo>> {
        info!("Enumerating output devices");
        let default_name = self.host.default_output_device().map(|d| device_name(&d));

        let devices: Vec<DeviceInfo> = self
            .host
            .output_devices()
            .map_err(|e| AudioError::StreamError(e.to_string()))?
            .map(|device| Self::describe(&device, default_name.as_deref()))
            .collect();

        info!("Found {} output devices", devices.len());
        Ok(devices)
    }

    pub fn default_output_device(&self) -> Result<DeviceInfo> {
        let device = self
            .host
            .default_output_device()
            .ok_or_else(|| AudioError::DeviceNotFound("No default output device".to_string()))?;
        let name = device_name(&device);
        Ok(Self::describe(&device, Some(&name)))
    }

    /// Resolve a device by name, or the default device for `None`
    ///
    /// An exact name wins; otherwise a unique case-insensitive substring
    /// match is accepted.
    pub fn find_output_device(&self, name: Option<&str>) -> Result<cpal::Device> {
        let Some(name) = name else {
            return self
                .host
                .default_output_device()
                .ok_or_else(|| AudioError::DeviceNotFound("No default output device".to_string()));
        };

        let devices: Vec<cpal::Device> = self
            .host
            .output_devices()
            .map_err(|e| AudioError::StreamError(e.to_string()))?
            .collect();

        if let Some(device) = devices.iter().find(|d| device_name(d) == name) {
            return Ok(device.clone());
        }

        let needle = name.to_lowercase();
        let mut matches: Vec<&cpal::Device> = devices
            .iter()
            .filter(|d| device_name(d).to_lowercase().contains(&needle))
            .collect();

        match matches.len() {
            1 => Ok(matches.remove(0).clone()),
            0 => Err(AudioError::DeviceNotFound(name.to_string())),
            n => Err(AudioError::DeviceNotFound(format!(
                "{name} is ambiguous ({n} devices match)"
            ))),
        }
    }

    /// Pick an `f32` output configuration, preferring `sample_rate`
    pub fn output_config(
        &self,
        device: &cpal::Device,
        sample_rate: u32,
    ) -> Result<cpal::SupportedStreamConfig> {
        let ranges: Vec<cpal::SupportedStreamConfigRange> = device
            .supported_output_configs()
            .map_err(|e| AudioError::UnsupportedConfiguration(e.to_string()))?
            .filter(|range| range.sample_format() == cpal::SampleFormat::F32)
            .collect();

        if let Some(range) = ranges.iter().find(|r| {
            (r.min_sample_rate()..=r.max_sample_rate()).contains(&sample_rate)
        }) {
            return Ok(range.with_sample_rate(sample_rate));
        }

        if let Ok(default) = device.default_output_config() {
            if default.sample_format() == cpal::SampleFormat::F32 {
                warn!(
                    requested = sample_rate,
                    actual = default.sample_rate(),
                    "Requested sample rate unavailable, using device default"
                );
                return Ok(default);
            }
        }

        ranges
            .first()
            .map(|range| range.with_max_sample_rate())
            .ok_or_else(|| {
                AudioError::UnsupportedConfiguration(format!(
                    "{} has no f32 output configuration",
                    device_name(device)
                ))
            })
    }
}

impl fmt::Debug for CpalOutputHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CpalOutputHost")
            .field("host", &self.host.id())
            .finish()
    }
}

/// List output devices of the default host
pub fn list_output_devices() -> Result<Vec<DeviceInfo>> {
    CpalOutputHost::new().output_devices()
}
