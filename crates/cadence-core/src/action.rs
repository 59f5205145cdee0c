//! Action steps and chunks produced by a policy.

use serde::{Deserialize, Serialize};

use crate::joints::JointTable;

/// A single joint value keyed by canonical name.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JointValue {
    /// Canonical joint name.
    pub name: String,
    /// Normalized value.
    pub value: f32,
}

/// One predicted control step: canonical joint name → normalized value.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionStep {
    joints: Vec<JointValue>,
}

impl ActionStep {
    /// Build a step from explicit joint values.
    pub fn new(joints: Vec<JointValue>) -> Self {
        Self { joints }
    }

    /// Build a step from values in the table's canonical order.
    ///
    /// Short vectors are padded with zeros, long ones truncated.
    pub fn from_values(table: &JointTable, values: &[f32]) -> Self {
        let joints = table
            .canonical_names()
            .enumerate()
            .map(|(i, name)| JointValue {
                name: name.to_owned(),
                value: values.get(i).copied().unwrap_or(0.0),
            })
            .collect();
        Self { joints }
    }

    /// Value of a joint by canonical name.
    pub fn get(&self, name: &str) -> Option<f32> {
        self.joints.iter().find(|j| j.name == name).map(|j| j.value)
    }

    /// All joint values in stored order.
    pub fn joints(&self) -> &[JointValue] {
        &self.joints
    }

    /// Values in stored order.
    pub fn values(&self) -> Vec<f32> {
        self.joints.iter().map(|j| j.value).collect()
    }

    /// Number of joints in the step.
    pub fn len(&self) -> usize {
        self.joints.len()
    }

    /// Whether the step carries no joints.
    pub fn is_empty(&self) -> bool {
        self.joints.is_empty()
    }
}

/// Ordered sequence of steps returned by one policy call.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionChunk {
    steps: Vec<ActionStep>,
}

impl ActionChunk {
    /// Wrap a list of steps.
    pub fn new(steps: Vec<ActionStep>) -> Self {
        Self { steps }
    }

    /// Build a chunk from rows of canonical-order values.
    pub fn from_rows(table: &JointTable, rows: &[Vec<f32>]) -> Self {
        Self {
            steps: rows.iter().map(|r| ActionStep::from_values(table, r)).collect(),
        }
    }

    /// Number of steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether the chunk has no steps.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Borrow the steps.
    pub fn steps(&self) -> &[ActionStep] {
        &self.steps
    }

    /// Keep only the first `n` steps.
    pub fn truncate(&mut self, n: usize) {
        self.steps.truncate(n);
    }

    /// Take ownership of the steps.
    pub fn into_steps(self) -> Vec<ActionStep> {
        self.steps
    }
}

impl From<Vec<ActionStep>> for ActionChunk {
    fn from(steps: Vec<ActionStep>) -> Self {
        Self::new(steps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::joints::SO100_TABLE;

    #[test]
    fn from_values_pads_and_truncates() {
        let short = ActionStep::from_values(&SO100_TABLE, &[1.0, 2.0]);
        assert_eq!(short.values(), vec![1.0, 2.0, 0.0, 0.0, 0.0, 0.0]);

        let long = ActionStep::from_values(&SO100_TABLE, &[1.0; 9]);
        assert_eq!(long.len(), 6);
    }

    #[test]
    fn get_by_canonical_name() {
        let step = ActionStep::from_values(&SO100_TABLE, &[0.0, 0.0, 0.0, 0.0, 0.0, 42.0]);
        assert_eq!(step.get("gripper"), Some(42.0));
        assert_eq!(step.get("Jaw"), None);
    }

    #[test]
    fn chunk_truncate_keeps_prefix() {
        let mut chunk = ActionChunk::from_rows(
            &SO100_TABLE,
            &[vec![1.0], vec![2.0], vec![3.0]],
        );
        chunk.truncate(2);
        assert_eq!(chunk.len(), 2);
        assert_eq!(chunk.steps()[1].get("shoulder_pan"), Some(2.0));
    }
}
