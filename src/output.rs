// Output Module - Hardware channel buffer and DDP transmission to WLED devices
use anyhow::{anyhow, Context, Result};
use ddp_rs::connection::DDPConnection;
use ddp_rs::protocol::{PixelConfig, ID};
use std::net::UdpSocket;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::config::WledDeviceConfig;
use crate::types::Rgb;

// WLED drops DDP realtime mode after ~1s of silence
const KEEPALIVE_INTERVAL: Duration = Duration::from_millis(500);
const DDP_PORT: u16 = 4048;

/// Physically ordered 1D LED channels. `set_channel` only stages a color;
/// `commit` pushes the whole buffer to the hardware.
pub trait LedOutput: Send {
    fn channel_count(&self) -> usize;

    /// Out-of-range indices are ignored
    fn set_channel(&mut self, index: usize, color: Rgb);

    fn commit(&mut self) -> Result<()>;

    /// Re-send the committed buffer if the hardware would otherwise time out.
    /// Called while nothing new is being rendered.
    fn keepalive(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Reject overlapping device ranges and ranges past the channel buffer
pub fn validate_devices(devices: &[WledDeviceConfig], channel_count: usize) -> Result<()> {
    let enabled: Vec<&WledDeviceConfig> = devices.iter().filter(|d| d.enabled).collect();
    if enabled.is_empty() {
        anyhow::bail!("No WLED devices enabled");
    }

    for (i, dev1) in enabled.iter().enumerate() {
        let dev1_end = dev1.led_offset + dev1.led_count;
        if dev1.led_count == 0 {
            anyhow::bail!("Device {} has no LEDs", dev1.ip);
        }
        if dev1_end > channel_count {
            anyhow::bail!(
                "Device {} range exceeds mesh size: LEDs {}-{}, mesh has {} channels",
                dev1.ip,
                dev1.led_offset,
                dev1_end - 1,
                channel_count
            );
        }

        for dev2 in &enabled[i + 1..] {
            let dev2_end = dev2.led_offset + dev2.led_count;
            if dev1.led_offset < dev2_end && dev1_end > dev2.led_offset {
                anyhow::bail!(
                    "Overlapping LED ranges: Device {} ({}-{}) overlaps with Device {} ({}-{})",
                    dev1.ip,
                    dev1.led_offset,
                    dev1_end - 1,
                    dev2.ip,
                    dev2.led_offset,
                    dev2_end - 1
                );
            }
        }
    }

    Ok(())
}

/// Scale raw RGB bytes by a brightness in [0, 1], rounding
pub fn apply_brightness(buffer: &[u8], brightness: f64) -> Vec<u8> {
    let brightness = brightness.clamp(0.0, 1.0);
    buffer.iter().map(|&val| (val as f64 * brightness).round() as u8).collect()
}

fn keepalive_due(last_send: Option<Instant>, now: Instant) -> bool {
    last_send.map_or(true, |last| now.saturating_duration_since(last) >= KEEPALIVE_INTERVAL)
}

// Changed content always goes out. An unchanged slice is repeated while lit,
// and while black only as a keepalive.
fn needs_send(frame: &[u8], sent: &[u8], last_send: Option<Instant>, now: Instant) -> bool {
    frame != sent || frame.iter().any(|&b| b != 0) || keepalive_due(last_send, now)
}

struct DeviceConnection {
    config: WledDeviceConfig,
    connection: DDPConnection,
    last_send: Option<Instant>,
    // Last slice that reached the device
    sent: Vec<u8>,
}

impl DeviceConnection {
    fn new(config: WledDeviceConfig) -> Result<Self> {
        let dest_addr = format!("{}:{}", config.ip, DDP_PORT);
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        let connection = DDPConnection::try_new(&dest_addr, PixelConfig::default(), ID::Default, socket)
            .map_err(|e| anyhow!("DDP connection to {} failed: {}", dest_addr, e))?;

        Ok(DeviceConnection {
            config,
            connection,
            last_send: None,
            sent: Vec::new(),
        })
    }
}

/// Channel buffer split across one or more WLED devices over DDP
pub struct DdpOutput {
    buffer: Vec<u8>,
    devices: Vec<DeviceConnection>,
    brightness: f64,
}

impl DdpOutput {
    pub fn new(devices: &[WledDeviceConfig], channel_count: usize, brightness: f64) -> Result<Self> {
        validate_devices(devices, channel_count)?;

        let mut connections = Vec::new();
        for device in devices.iter().filter(|d| d.enabled) {
            match DeviceConnection::new(device.clone()) {
                Ok(conn) => {
                    info!(
                        "Connected to WLED {} (LEDs {}-{})",
                        device.ip,
                        device.led_offset,
                        device.led_offset + device.led_count - 1
                    );
                    connections.push(conn);
                }
                Err(e) => warn!("Failed to connect to {}: {}", device.ip, e),
            }
        }

        if connections.is_empty() {
            anyhow::bail!("No WLED devices connected successfully");
        }

        Ok(DdpOutput {
            buffer: vec![0; channel_count * 3],
            devices: connections,
            brightness,
        })
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }
}

impl LedOutput for DdpOutput {
    fn channel_count(&self) -> usize {
        self.buffer.len() / 3
    }

    fn set_channel(&mut self, index: usize, color: Rgb) {
        if let Some(slot) = self.buffer.get_mut(index * 3..index * 3 + 3) {
            slot.copy_from_slice(&[color.r, color.g, color.b]);
        }
    }

    fn commit(&mut self) -> Result<()> {
        self.send(false)
    }

    fn keepalive(&mut self) -> Result<()> {
        self.send(true)
    }
}

impl DdpOutput {
    fn send(&mut self, keepalive_only: bool) -> Result<()> {
        let now = Instant::now();
        let scaled;
        let frame: &[u8] = if self.brightness < 1.0 {
            scaled = apply_brightness(&self.buffer, self.brightness);
            &scaled
        } else {
            &self.buffer
        };

        let mut errors = Vec::new();
        for device in &mut self.devices {
            let byte_offset = device.config.led_offset * 3;
            let byte_count = device.config.led_count * 3;
            let Some(device_frame) = frame.get(byte_offset..byte_offset + byte_count) else {
                errors.push(format!("Device {} range exceeds channel buffer", device.config.ip));
                continue;
            };

            let due = if keepalive_only {
                keepalive_due(device.last_send, now)
            } else {
                needs_send(device_frame, &device.sent, device.last_send, now)
            };
            if !due {
                continue;
            }

            match device.connection.write(device_frame) {
                Ok(_) => {
                    device.last_send = Some(now);
                    device.sent.clear();
                    device.sent.extend_from_slice(device_frame);
                }
                Err(e) => errors.push(format!("Failed to send to {}: {}", device.config.ip, e)),
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(anyhow!(errors.join("; ")))
        }
    }
}

/// Dry-run sink: keeps the channel buffer and counts commits
pub struct NullOutput {
    channels: Vec<Rgb>,
    commits: u64,
}

impl NullOutput {
    pub fn new(channel_count: usize) -> Self {
        NullOutput {
            channels: vec![Rgb::BLACK; channel_count],
            commits: 0,
        }
    }

    #[cfg(test)]
    pub fn commits(&self) -> u64 {
        self.commits
    }

    #[cfg(test)]
    pub fn channels(&self) -> &[Rgb] {
        &self.channels
    }
}

impl LedOutput for NullOutput {
    fn channel_count(&self) -> usize {
        self.channels.len()
    }

    fn set_channel(&mut self, index: usize, color: Rgb) {
        if let Some(slot) = self.channels.get_mut(index) {
            *slot = color;
        }
    }

    fn commit(&mut self) -> Result<()> {
        self.commits += 1;
        Ok(())
    }
}

impl Drop for NullOutput {
    fn drop(&mut self) {
        info!("Dry run finished after {} frames", self.commits);
    }
}

/// Build the configured output: DDP devices, or a null sink for dry runs
pub fn open_output(
    devices: &[WledDeviceConfig],
    channel_count: usize,
    brightness: f64,
    dry_run: bool,
) -> Result<Box<dyn LedOutput>> {
    if dry_run {
        info!("Dry run: frames are rendered but not transmitted");
        return Ok(Box::new(NullOutput::new(channel_count)));
    }
    let output = DdpOutput::new(devices, channel_count, brightness).context("Failed to open WLED output")?;
    info!("Sending DDP to {} device(s)", output.device_count());
    Ok(Box::new(output))
}

impl<T: LedOutput + ?Sized> LedOutput for Box<T> {
    fn channel_count(&self) -> usize {
        (**self).channel_count()
    }

    fn set_channel(&mut self, index: usize, color: Rgb) {
        (**self).set_channel(index, color)
    }

    fn commit(&mut self) -> Result<()> {
        (**self).commit()
    }

    fn keepalive(&mut self) -> Result<()> {
        (**self).keepalive()
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// Records every committed channel buffer and counts keepalives
    #[derive(Clone)]
    pub struct RecordingOutput {
        channels: Vec<Rgb>,
        pub commits: Arc<Mutex<Vec<Vec<Rgb>>>>,
        keepalives: Arc<AtomicUsize>,
    }

    impl RecordingOutput {
        pub fn new(channel_count: usize) -> Self {
            RecordingOutput {
                channels: vec![Rgb::BLACK; channel_count],
                commits: Arc::new(Mutex::new(Vec::new())),
                keepalives: Arc::new(AtomicUsize::new(0)),
            }
        }

        pub fn keepalive_count(&self) -> usize {
            self.keepalives.load(Ordering::SeqCst)
        }

        pub fn commit_count(&self) -> usize {
            self.commits.lock().unwrap().len()
        }

        pub fn last(&self) -> Option<Vec<Rgb>> {
            self.commits.lock().unwrap().last().cloned()
        }

        pub fn history(&self) -> Vec<Vec<Rgb>> {
            self.commits.lock().unwrap().clone()
        }
    }

    impl LedOutput for RecordingOutput {
        fn channel_count(&self) -> usize {
            self.channels.len()
        }

        fn set_channel(&mut self, index: usize, color: Rgb) {
            if let Some(slot) = self.channels.get_mut(index) {
                *slot = color;
            }
        }

        fn commit(&mut self) -> Result<()> {
            self.commits.lock().unwrap().push(self.channels.clone());
            Ok(())
        }

        fn keepalive(&mut self) -> Result<()> {
            self.keepalives.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }
}
