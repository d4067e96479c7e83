//! Camera device enumeration and selection

use crate::error::Result;
use crate::observable::{Observable, ObservableReader};
use crate::stream::MediaPlatform;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Kind of media device reported by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaDeviceKind {
    VideoInput,
    AudioInput,
    AudioOutput,
}

/// Raw device entry as the platform reports it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaDeviceInfo {
    pub device_id: String,
    pub label: String,
    pub kind: MediaDeviceKind,
}

impl MediaDeviceInfo {
    pub fn video(device_id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            label: label.into(),
            kind: MediaDeviceKind::VideoInput,
        }
    }
}

/// A camera the user can pick
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    pub id: String,
    pub label: String,
}

/// Lists cameras and holds the selected device id (`""` = none)
pub struct DeviceEnumerator {
    platform: Arc<dyn MediaPlatform>,
    devices: RwLock<Vec<DeviceDescriptor>>,
    selected: Observable<String>,
}

impl DeviceEnumerator {
    pub fn new(platform: Arc<dyn MediaPlatform>, capacity: usize) -> Self {
        Self {
            platform,
            devices: RwLock::new(Vec::new()),
            selected: Observable::with_capacity(String::new(), capacity),
        }
    }

    /// Enumerate video inputs. May trigger the platform permission prompt.
    ///
    /// On a non-empty result the selection defaults to `preferred` when it is
    /// in the list, otherwise to the first camera. An empty result leaves the
    /// selection at `""`.
    pub async fn list_video_input_devices(
        &self,
        preferred: Option<&str>,
    ) -> Result<Vec<DeviceDescriptor>> {
        let entries = self.platform.enumerate_devices().await?;

        let cameras: Vec<DeviceDescriptor> = entries
            .into_iter()
            .filter(|entry| entry.kind == MediaDeviceKind::VideoInput)
            .enumerate()
            .map(|(index, entry)| DeviceDescriptor {
                label: if entry.label.trim().is_empty() {
                    format!("Camera {}", index + 1)
                } else {
                    entry.label
                },
                id: entry.device_id,
            })
            .collect();

        info!("Found {} video input device(s)", cameras.len());
        *self.devices.write() = cameras.clone();

        let default = match preferred {
            Some(id) if cameras.iter().any(|d| d.id == id) => Some(id.to_string()),
            Some(id) => {
                warn!(device_id = %id, "Preferred camera not found, using first available");
                cameras.first().map(|d| d.id.clone())
            }
            None => cameras.first().map(|d| d.id.clone()),
        };

        if let Some(id) = default {
            debug!(device_id = %id, "Selecting default camera");
            self.selected.set(id);
        }

        Ok(cameras)
    }

    pub fn devices(&self) -> Vec<DeviceDescriptor> {
        self.devices.read().clone()
    }

    pub fn selected_id(&self) -> String {
        self.selected.get()
    }

    pub fn select(&self, device_id: &str) {
        self.selected.set(device_id.to_string());
    }

    pub fn selected(&self) -> ObservableReader<String> {
        self.selected.reader()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TangibleError;
    use crate::stream::{MediaStream, VideoConstraints};
    use async_trait::async_trait;

    struct ListedDevices(Vec<MediaDeviceInfo>);

    #[async_trait]
    impl MediaPlatform for ListedDevices {
        async fn enumerate_devices(&self) -> Result<Vec<MediaDeviceInfo>> {
            Ok(self.0.clone())
        }

        async fn open_stream(
            &self,
            device_id: &str,
            _constraints: &VideoConstraints,
        ) -> Result<Box<dyn MediaStream>> {
            Err(TangibleError::StreamOpenFailed(device_id.to_string()))
        }
    }

    fn enumerator(devices: Vec<MediaDeviceInfo>) -> DeviceEnumerator {
        DeviceEnumerator::new(Arc::new(ListedDevices(devices)), 4)
    }

    #[tokio::test]
    async fn test_only_video_inputs_listed() {
        let enumerator = enumerator(vec![
            MediaDeviceInfo {
                device_id: "mic".to_string(),
                label: "Microphone".to_string(),
                kind: MediaDeviceKind::AudioInput,
            },
            MediaDeviceInfo::video("front", "Front Camera"),
            MediaDeviceInfo::video("back", ""),
        ]);

        let cameras = enumerator.list_video_input_devices(None).await.unwrap();

        assert_eq!(cameras.len(), 2);
        assert_eq!(cameras[0].label, "Front Camera");
        assert_eq!(cameras[1].label, "Camera 2");
        assert_eq!(enumerator.selected_id(), "front");
        assert_eq!(enumerator.devices(), cameras);
    }

    #[tokio::test]
    async fn test_preferred_device_selected() {
        let enumerator = enumerator(vec![
            MediaDeviceInfo::video("front", "Front"),
            MediaDeviceInfo::video("back", "Back"),
        ]);

        enumerator.list_video_input_devices(Some("back")).await.unwrap();
        assert_eq!(enumerator.selected_id(), "back");

        enumerator.list_video_input_devices(Some("gone")).await.unwrap();
        assert_eq!(enumerator.selected_id(), "front");
    }

    #[tokio::test]
    async fn test_empty_list_leaves_selection_empty() {
        let enumerator = enumerator(Vec::new());
        let mut changes = enumerator.selected().subscribe();

        let cameras = enumerator.list_video_input_devices(None).await.unwrap();

        assert!(cameras.is_empty());
        assert_eq!(enumerator.selected_id(), "");
        assert!(changes.try_recv().is_err());
    }
}
