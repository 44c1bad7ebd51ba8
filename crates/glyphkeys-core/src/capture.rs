// Glyphkeys Device Capture
// The grabbed keyboard set and its poll loop.

use crate::hook::{EventOrigin, RawKeyEvent};
use crate::input::{looks_like_keyboard, matches_device_filter};
use evdev::Device;
use std::os::unix::io::AsRawFd;

/// Errors from device enumeration, grabbing, and polling.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("no keyboard devices found")]
    NoDevices,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Identity of an available keyboard, for listing.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub index: usize,
    pub name: String,
    pub path: String,
}

/// The set of grabbed physical keyboards.
///
/// While grabbed, their events reach only us; nothing leaks to the OS
/// until the hook forwards it. Dropping the capture releases every grab,
/// so an unwind cannot leave the machine deaf to its own keyboard.
pub struct DeviceCapture {
    devices: Vec<Device>,
    poll_fds: Vec<libc::pollfd>,
    grabbed: bool,
}

impl DeviceCapture {
    /// Enumerate, filter, and grab. Issues a defensive ungrab first in
    /// case a previous process died while holding the grab.
    pub fn grab_keyboards(device_filter: &[String]) -> Result<Self, CaptureError> {
        let mut devices = Self::find_keyboards(device_filter)?;
        for device in devices.iter_mut() {
            let _ = device.ungrab();
        }
        for device in devices.iter_mut() {
            device.grab()?;
            log::debug!("grabbed {}", device.name().unwrap_or("unnamed device"));
        }
        let poll_fds = devices
            .iter()
            .map(|device| libc::pollfd {
                fd: device.as_raw_fd(),
                events: libc::POLLIN,
                revents: 0,
            })
            .collect();
        Ok(Self {
            devices,
            poll_fds,
            grabbed: true,
        })
    }

    fn find_keyboards(device_filter: &[String]) -> Result<Vec<Device>, CaptureError> {
        let mut keyboards = Vec::new();
        for (path, device) in evdev::enumerate() {
            let name = device.name().unwrap_or("Unknown").to_string();
            let path_str = path.to_string_lossy().into_owned();
            let is_keyboard = looks_like_keyboard(&device);
            if matches_device_filter(&name, &path_str, device_filter, is_keyboard) {
                log::debug!("selected {} ({})", name, path_str);
                keyboards.push(device);
            }
        }
        if keyboards.is_empty() {
            return Err(CaptureError::NoDevices);
        }
        Ok(keyboards)
    }

    /// Every device that currently looks like a keyboard, grabbed or not.
    pub fn list_devices() -> Result<Vec<DeviceInfo>, CaptureError> {
        let mut infos = Vec::new();
        for (path, device) in evdev::enumerate() {
            if !looks_like_keyboard(&device) {
                continue;
            }
            infos.push(DeviceInfo {
                index: infos.len(),
                name: device.name().unwrap_or("Unknown").to_string(),
                path: path.to_string_lossy().into_owned(),
            });
        }
        Ok(infos)
    }

    /// Poll all grabbed devices once, translating whatever is pending.
    /// A timeout yields an empty batch. EINTR also yields an empty batch:
    /// signal delivery must not kill the loop, the caller's running flag
    /// decides that.
    pub fn poll(&mut self, timeout_ms: i32) -> Result<Vec<RawKeyEvent>, CaptureError> {
        let mut events = Vec::new();
        let ready = unsafe {
            libc::poll(
                self.poll_fds.as_mut_ptr(),
                self.poll_fds.len() as libc::nfds_t,
                timeout_ms,
            )
        };
        if ready < 0 {
            let err = std::io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EINTR) {
                return Ok(events);
            }
            return Err(CaptureError::Io(err));
        }
        if ready == 0 {
            return Ok(events);
        }
        for (i, device) in self.devices.iter_mut().enumerate() {
            if self.poll_fds[i].revents & libc::POLLIN == 0 {
                continue;
            }
            let device_name = device.name().unwrap_or("unnamed device").to_string();
            match device.fetch_events() {
                Ok(fetched) => {
                    for event in fetched {
                        events.push(RawKeyEvent::new(
                            event.event_type().0,
                            event.code(),
                            event.value(),
                            EventOrigin::Physical,
                        ));
                    }
                }
                Err(err) => {
                    log::warn!("fetch failed on {}: {}", device_name, err);
                }
            }
        }
        Ok(events)
    }

    /// Release every grab. Idempotent.
    pub fn ungrab_all(&mut self) {
        if !self.grabbed {
            return;
        }
        for device in self.devices.iter_mut() {
            if let Err(err) = device.ungrab() {
                log::warn!(
                    "ungrab failed on {}: {}",
                    device.name().unwrap_or("unnamed device"),
                    err
                );
            }
        }
        self.grabbed = false;
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    pub fn device_names(&self) -> Vec<String> {
        self.devices
            .iter()
            .map(|device| device.name().unwrap_or("Unknown").to_string())
            .collect()
    }
}

impl Drop for DeviceCapture {
    /// Releasing the grab here is what makes a panic survivable: without
    /// it the keyboards would stay captured by a dead process.
    fn drop(&mut self) {
        self.ungrab_all();
    }
}
