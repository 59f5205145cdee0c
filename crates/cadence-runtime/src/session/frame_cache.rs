//! Latest camera frames and joint state for one session.
//!
//! One writer per transport subscription, one reader (the inference loop).
//! Writers take the write lock only long enough to swap a slot in.

use std::collections::{BTreeMap, HashMap};

use cadence_core::{FrameError, ImageFrame, JointTable, JointValue};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use thiserror::Error;

use crate::session::types::DataStatus;

/// Why a frame was not stored.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FrameRejection {
    /// The camera is not part of the session.
    #[error("unknown camera: {0}")]
    UnknownCamera(String),
    /// The frame failed validation.
    #[error(transparent)]
    Invalid(#[from] FrameError),
}

/// Immutable copy of the inputs for one inference call.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameSnapshot {
    /// Camera name → latest frame.
    pub images: HashMap<String, ImageFrame>,
    /// Camera name → when its latest frame arrived.
    pub image_times: HashMap<String, DateTime<Utc>>,
    /// Complete joint vector, canonical order.
    pub joint_state: Vec<f32>,
    /// When the last joint reading arrived.
    pub joints_updated_at: DateTime<Utc>,
}

/// Result of [`JointFrameCache::snapshot`].
#[derive(Clone, Debug, PartialEq)]
pub enum SnapshotResult {
    /// Every input has been populated.
    Ready(FrameSnapshot),
    /// Some input has never arrived; the tick should be skipped.
    Incomplete {
        /// Cameras with no frame yet, in configuration order.
        missing_cameras: Vec<String>,
        /// No joint reading yet.
        missing_joints: bool,
    },
}

struct CameraSlot {
    frame: ImageFrame,
    updated_at: DateTime<Utc>,
}

struct CacheInner {
    slots: HashMap<String, CameraSlot>,
    frame_counts: HashMap<String, u64>,
    joint_state: Vec<f32>,
    joints_updated_at: Option<DateTime<Utc>>,
}

/// Most-recent frames per camera plus the complete joint state.
pub struct JointFrameCache {
    cameras: Vec<String>,
    table: &'static JointTable,
    inner: RwLock<CacheInner>,
}

impl JointFrameCache {
    /// Cache for `cameras`, remapping joints through `table`.
    pub fn new(cameras: Vec<String>, table: &'static JointTable) -> Self {
        let inner = CacheInner {
            slots: HashMap::with_capacity(cameras.len()),
            frame_counts: HashMap::with_capacity(cameras.len()),
            joint_state: vec![0.0; table.len()],
            joints_updated_at: None,
        };
        Self {
            cameras,
            table,
            inner: RwLock::new(inner),
        }
    }

    /// Configured cameras.
    pub fn cameras(&self) -> &[String] {
        &self.cameras
    }

    /// Store the latest frame for `camera`.
    pub fn update_image(
        &self,
        camera: &str,
        frame: ImageFrame,
        received_at: DateTime<Utc>,
    ) -> Result<(), FrameRejection> {
        if !self.cameras.iter().any(|c| c == camera) {
            return Err(FrameRejection::UnknownCamera(camera.to_owned()));
        }
        frame.validate()?;

        let mut inner = self.inner.write();
        let _ = inner.slots.insert(
            camera.to_owned(),
            CameraSlot {
                frame,
                updated_at: received_at,
            },
        );
        *inner.frame_counts.entry(camera.to_owned()).or_insert(0) += 1;
        Ok(())
    }

    /// Fold a joint reading into the joint state.
    ///
    /// Returns how many joints matched the table; a reading that matches
    /// nothing does not count as a joint update.
    pub fn update_joints(&self, reading: &[JointValue], received_at: DateTime<Utc>) -> usize {
        let mut inner = self.inner.write();
        let matched = self.table.remap(
            reading.iter().map(|j| (j.name.as_str(), j.value)),
            &mut inner.joint_state,
        );
        if matched > 0 {
            inner.joints_updated_at = Some(received_at);
        }
        matched
    }

    /// Copy out the inputs, or report what is missing.
    pub fn snapshot(&self) -> SnapshotResult {
        let inner = self.inner.read();
        let missing_cameras: Vec<String> = self
            .cameras
            .iter()
            .filter(|c| !inner.slots.contains_key(c.as_str()))
            .cloned()
            .collect();

        match inner.joints_updated_at {
            Some(joints_updated_at) if missing_cameras.is_empty() => {
                let mut images = HashMap::with_capacity(inner.slots.len());
                let mut image_times = HashMap::with_capacity(inner.slots.len());
                for (name, slot) in &inner.slots {
                    let _ = images.insert(name.clone(), slot.frame.clone());
                    let _ = image_times.insert(name.clone(), slot.updated_at);
                }
                SnapshotResult::Ready(FrameSnapshot {
                    images,
                    image_times,
                    joint_state: inner.joint_state.clone(),
                    joints_updated_at,
                })
            }
            joints => SnapshotResult::Incomplete {
                missing_cameras,
                missing_joints: joints.is_none(),
            },
        }
    }

    /// Current joint vector, canonical order.
    pub fn joint_state(&self) -> Vec<f32> {
        self.inner.read().joint_state.clone()
    }

    /// Which inputs have arrived.
    pub fn data_status(&self) -> DataStatus {
        let inner = self.inner.read();
        let cameras_populated: BTreeMap<String, bool> = self
            .cameras
            .iter()
            .map(|c| (c.clone(), inner.slots.contains_key(c.as_str())))
            .collect();
        let frame_counts: BTreeMap<String, u64> = self
            .cameras
            .iter()
            .map(|c| (c.clone(), inner.frame_counts.get(c).copied().unwrap_or(0)))
            .collect();
        DataStatus {
            has_joint_data: inner.joints_updated_at.is_some(),
            cameras_populated,
            frame_counts,
        }
    }

    /// Forget camera frames so the next snapshot waits for fresh ones.
    ///
    /// The joint state is kept.
    pub fn clear_frames(&self) {
        let mut inner = self.inner.write();
        inner.slots.clear();
        inner.frame_counts.clear();
    }

    /// Forget everything: frames, counts, and joint state (back to zeros).
    pub fn reset(&self) {
        let mut inner = self.inner.write();
        inner.slots.clear();
        inner.frame_counts.clear();
        inner.joint_state.iter_mut().for_each(|v| *v = 0.0);
        inner.joints_updated_at = None;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use assert_matches::assert_matches;
    use cadence_core::SO100_TABLE;

    use super::*;

    fn cache(cameras: &[&str]) -> JointFrameCache {
        JointFrameCache::new(
            cameras.iter().map(|c| (*c).to_owned()).collect(),
            &SO100_TABLE,
        )
    }

    fn frame() -> ImageFrame {
        ImageFrame::rgb24(2, 2, vec![0u8; 12])
    }

    fn reading(pairs: &[(&str, f32)]) -> Vec<JointValue> {
        pairs
            .iter()
            .map(|(n, v)| JointValue {
                name: (*n).to_owned(),
                value: *v,
            })
            .collect()
    }

    #[test]
    fn two_of_three_cameras_is_incomplete() {
        let c = cache(&["front", "wrist", "top"]);
        c.update_image("front", frame(), Utc::now()).unwrap();
        c.update_image("wrist", frame(), Utc::now()).unwrap();
        let _ = c.update_joints(&reading(&[("shoulder_pan", 1.0)]), Utc::now());

        assert_matches!(
            c.snapshot(),
            SnapshotResult::Incomplete { missing_cameras, missing_joints: false }
                if missing_cameras == vec!["top".to_owned()]
        );
    }

    #[test]
    fn joints_are_required() {
        let c = cache(&["front"]);
        c.update_image("front", frame(), Utc::now()).unwrap();
        assert_matches!(
            c.snapshot(),
            SnapshotResult::Incomplete { missing_joints: true, .. }
        );
    }

    #[test]
    fn complete_snapshot_copies_inputs() {
        let c = cache(&["front", "wrist"]);
        c.update_image("front", frame(), Utc::now()).unwrap();
        c.update_image("wrist", frame(), Utc::now()).unwrap();
        let _ = c.update_joints(&reading(&[("Rotation", 12.5), ("Jaw", 40.0)]), Utc::now());

        let SnapshotResult::Ready(snap) = c.snapshot() else {
            panic!("expected a ready snapshot");
        };
        assert_eq!(snap.images.len(), 2);
        assert_eq!(snap.image_times.len(), 2);
        assert_eq!(snap.joint_state, vec![12.5, 0.0, 0.0, 0.0, 0.0, 40.0]);
    }

    #[test]
    fn missing_joints_keep_last_value() {
        let c = cache(&["front"]);
        let _ = c.update_joints(&reading(&[("elbow_flex", 5.0), ("gripper", 9.0)]), Utc::now());
        let _ = c.update_joints(&reading(&[("Elbow", -3.0)]), Utc::now());
        assert_eq!(c.joint_state(), vec![0.0, 0.0, -3.0, 0.0, 0.0, 9.0]);
    }

    #[test]
    fn unmatched_reading_is_not_an_update() {
        let c = cache(&["front"]);
        assert_eq!(c.update_joints(&reading(&[("tail", 1.0)]), Utc::now()), 0);
        assert!(!c.data_status().has_joint_data);
    }

    #[test]
    fn rejects_unknown_camera_and_bad_frames() {
        let c = cache(&["front"]);
        assert_matches!(
            c.update_image("rear", frame(), Utc::now()),
            Err(FrameRejection::UnknownCamera(name)) if name == "rear"
        );
        let short = ImageFrame::rgb24(4, 4, vec![0u8; 10]);
        assert_matches!(
            c.update_image("front", short, Utc::now()),
            Err(FrameRejection::Invalid(FrameError::SizeMismatch { .. }))
        );
        assert_eq!(c.data_status().frame_counts["front"], 0);
    }

    #[test]
    fn data_status_counts_frames() {
        let c = cache(&["front", "wrist"]);
        for _ in 0..3 {
            c.update_image("front", frame(), Utc::now()).unwrap();
        }
        let status = c.data_status();
        assert_eq!(status.frame_counts["front"], 3);
        assert_eq!(status.frame_counts["wrist"], 0);
        assert!(status.cameras_populated["front"]);
        assert!(!status.cameras_populated["wrist"]);
    }

    #[test]
    fn clear_frames_keeps_joints() {
        let c = cache(&["front"]);
        c.update_image("front", frame(), Utc::now()).unwrap();
        let _ = c.update_joints(&reading(&[("Pitch", 7.0)]), Utc::now());
        c.clear_frames();

        assert_matches!(
            c.snapshot(),
            SnapshotResult::Incomplete { missing_joints: false, .. }
        );
        assert_eq!(c.joint_state()[1], 7.0);
    }

    #[test]
    fn reset_zeroes_joint_state() {
        let c = cache(&["front"]);
        let _ = c.update_joints(&reading(&[("Pitch", 7.0)]), Utc::now());
        c.reset();
        assert_eq!(c.joint_state(), vec![0.0; 6]);
        assert!(!c.data_status().has_joint_data);
    }

    #[test]
    fn concurrent_writers() {
        let c = Arc::new(cache(&["front", "wrist"]));
        let handles: Vec<_> = ["front", "wrist"]
            .into_iter()
            .map(|cam| {
                let c = Arc::clone(&c);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        c.update_image(cam, frame(), Utc::now()).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let status = c.data_status();
        assert_eq!(status.frame_counts["front"], 100);
        assert_eq!(status.frame_counts["wrist"], 100);
    }
}
