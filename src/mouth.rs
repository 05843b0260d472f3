//! Edge-triggered mouth open/close detection.

use serde::{Deserialize, Serialize};

use crate::config::{LandmarkLayout, MouthConfig};
use crate::error::Result;
use crate::types::PointSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MouthEvent {
    /// Closed to open: start looping the asset's sound.
    Start,
    /// Open to closed: stop the sound.
    Stop,
}

/// Lip gap relative to face height, or `None` when the face height is not
/// positive.
pub fn mouth_ratio(landmarks: &PointSet, layout: &LandmarkLayout) -> Result<Option<f64>> {
    let upper = landmarks.get(layout.upper_lip)?;
    let lower = landmarks.get(layout.lower_lip)?;
    let chin = landmarks.get(layout.chin)?;
    let forehead = landmarks.get(layout.forehead)?;

    let face_height = chin.y as f64 - forehead.y as f64;
    if face_height <= 0.0 {
        return Ok(None);
    }
    Ok(Some((lower.y as f64 - upper.y as f64) / face_height))
}

/// Open/closed state with a single threshold comparison per frame.
#[derive(Debug, Clone, PartialEq)]
pub struct MouthTracker {
    is_open: bool,
    threshold: f64,
}

impl MouthTracker {
    pub fn new(threshold: f64) -> Self {
        Self {
            is_open: false,
            threshold,
        }
    }

    pub fn from_config(config: &MouthConfig) -> Self {
        Self::new(config.open_threshold)
    }

    pub fn is_open(&self) -> bool {
        self.is_open
    }

    /// Feed one ratio; returns an event only on a state change.
    pub fn observe(&mut self, ratio: f64) -> Option<MouthEvent> {
        let open_now = ratio > self.threshold;
        if open_now == self.is_open {
            return None;
        }
        self.is_open = open_now;
        Some(if open_now {
            MouthEvent::Start
        } else {
            MouthEvent::Stop
        })
    }

    /// Evaluate one frame's landmarks. Frames with a non-positive face height
    /// leave the state untouched.
    pub fn update(
        &mut self,
        landmarks: &PointSet,
        layout: &LandmarkLayout,
    ) -> Result<Option<MouthEvent>> {
        Ok(mouth_ratio(landmarks, layout)?.and_then(|ratio| self.observe(ratio)))
    }

    /// Back to closed. Reports `Stop` if the mouth was open so the caller can
    /// silence any playing sound.
    pub fn reset(&mut self) -> Option<MouthEvent> {
        let was_open = std::mem::replace(&mut self.is_open, false);
        was_open.then_some(MouthEvent::Stop)
    }
}

impl Default for MouthTracker {
    fn default() -> Self {
        Self::from_config(&MouthConfig::default())
    }
}
