//! Per-robot joint tables.
//!
//! A [`JointTable`] is pure data: the canonical joint order, the robot-side
//! name of each joint, and the normalized range its commands are clamped to.
//! Incoming joint readings may use either name; outgoing commands always use
//! the robot name so the robot side never has to translate.

use serde::{Deserialize, Serialize};

use crate::action::ActionStep;

/// Inclusive range of a normalized joint value.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct JointRange {
    /// Lower bound.
    pub min: f32,
    /// Upper bound.
    pub max: f32,
}

impl JointRange {
    /// Create a range.
    pub const fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    /// Clamp a value into the range. NaN maps to the lower bound.
    pub fn clamp(&self, value: f32) -> f32 {
        if value.is_nan() {
            return self.min;
        }
        value.clamp(self.min, self.max)
    }
}

/// One joint entry in a table.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct JointSpec {
    /// Canonical (training data) name.
    pub canonical: &'static str,
    /// Name used by the robot on the transport.
    pub robot: &'static str,
    /// Normalized command range.
    pub range: JointRange,
}

/// A joint command as sent on the joint-output room.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JointCommand {
    /// Robot-side joint name.
    pub name: String,
    /// Clamped normalized value.
    pub value: f32,
    /// Position of the joint in the canonical order.
    pub index: usize,
}

/// Static mapping between robot joint names and the canonical joint order.
#[derive(Debug, PartialEq)]
pub struct JointTable {
    /// Table identifier (robot model).
    pub name: &'static str,
    /// Joints in canonical order.
    pub joints: &'static [JointSpec],
}

const ARM_RANGE: JointRange = JointRange::new(-100.0, 100.0);
const GRIPPER_RANGE: JointRange = JointRange::new(0.0, 100.0);

/// Six-joint SO-100 arm.
pub static SO100_TABLE: JointTable = JointTable {
    name: "so100",
    joints: &[
        JointSpec { canonical: "shoulder_pan", robot: "Rotation", range: ARM_RANGE },
        JointSpec { canonical: "shoulder_lift", robot: "Pitch", range: ARM_RANGE },
        JointSpec { canonical: "elbow_flex", robot: "Elbow", range: ARM_RANGE },
        JointSpec { canonical: "wrist_flex", robot: "Wrist_Pitch", range: ARM_RANGE },
        JointSpec { canonical: "wrist_roll", robot: "Wrist_Roll", range: ARM_RANGE },
        JointSpec { canonical: "gripper", robot: "Jaw", range: GRIPPER_RANGE },
    ],
};

impl JointTable {
    /// Number of joints.
    pub fn len(&self) -> usize {
        self.joints.len()
    }

    /// Whether the table has no joints.
    pub fn is_empty(&self) -> bool {
        self.joints.is_empty()
    }

    /// Canonical joint names in order.
    pub fn canonical_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.joints.iter().map(|j| j.canonical)
    }

    /// Canonical index of a joint given either its canonical or robot name.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.joints
            .iter()
            .position(|j| j.canonical == name)
            .or_else(|| self.joints.iter().position(|j| j.robot == name))
    }

    /// Fold a joint reading into the complete joint state.
    ///
    /// Joints the table does not know are ignored; joints absent from the
    /// reading keep their previous value. Returns how many joints matched.
    pub fn remap<'a>(
        &self,
        reading: impl IntoIterator<Item = (&'a str, f32)>,
        state: &mut [f32],
    ) -> usize {
        let mut matched = 0;
        for (name, value) in reading {
            if let Some(idx) = self.index_of(name) {
                if let Some(slot) = state.get_mut(idx) {
                    *slot = value;
                    matched += 1;
                }
            }
        }
        matched
    }

    /// Bring a step into canonical order with every value clamped.
    ///
    /// Joints missing from the step are treated as zero before clamping.
    pub fn clamp_step(&self, step: &ActionStep) -> ActionStep {
        let values: Vec<f32> = self
            .joints
            .iter()
            .map(|j| j.range.clamp(step.get(j.canonical).unwrap_or(0.0)))
            .collect();
        ActionStep::from_values(self, &values)
    }

    /// Build the outgoing command list for a step, clamped and robot-named.
    pub fn to_commands(&self, step: &ActionStep) -> Vec<JointCommand> {
        self.joints
            .iter()
            .enumerate()
            .map(|(index, j)| JointCommand {
                name: j.robot.to_owned(),
                value: j.range.clamp(step.get(j.canonical).unwrap_or(0.0)),
                index,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn so100_canonical_order() {
        let names: Vec<_> = SO100_TABLE.canonical_names().collect();
        assert_eq!(
            names,
            [
                "shoulder_pan",
                "shoulder_lift",
                "elbow_flex",
                "wrist_flex",
                "wrist_roll",
                "gripper"
            ]
        );
    }

    #[test]
    fn index_of_accepts_both_names() {
        assert_eq!(SO100_TABLE.index_of("gripper"), Some(5));
        assert_eq!(SO100_TABLE.index_of("Jaw"), Some(5));
        assert_eq!(SO100_TABLE.index_of("Pitch"), Some(1));
        assert_eq!(SO100_TABLE.index_of("tail"), None);
    }

    #[test]
    fn remap_keeps_missing_joints() {
        let mut state = vec![1.0; 6];
        let matched = SO100_TABLE.remap(
            [("Rotation", 10.0), ("gripper", 55.0), ("antenna", 3.0)],
            &mut state,
        );
        assert_eq!(matched, 2);
        assert_eq!(state, vec![10.0, 1.0, 1.0, 1.0, 1.0, 55.0]);
    }

    #[test]
    fn commands_use_robot_names_and_clamp() {
        let step = ActionStep::from_values(&SO100_TABLE, &[150.0, -150.0, 0.0, 5.0, -5.0, -20.0]);
        let cmds = SO100_TABLE.to_commands(&step);
        assert_eq!(cmds.len(), 6);
        assert_eq!(cmds[0].name, "Rotation");
        assert!((cmds[0].value - 100.0).abs() < f32::EPSILON);
        assert!((cmds[1].value + 100.0).abs() < f32::EPSILON);
        assert_eq!(cmds[5].name, "Jaw");
        assert_eq!(cmds[5].index, 5);
        assert!(cmds[5].value.abs() < f32::EPSILON);
    }

    #[test]
    fn nan_clamps_to_lower_bound() {
        assert!((ARM_RANGE.clamp(f32::NAN) + 100.0).abs() < f32::EPSILON);
    }

    proptest! {
        #[test]
        fn clamped_steps_stay_in_range(values in proptest::collection::vec(-1000.0f32..1000.0, 0..10)) {
            let step = ActionStep::from_values(&SO100_TABLE, &values);
            let clamped = SO100_TABLE.clamp_step(&step);
            prop_assert_eq!(clamped.len(), SO100_TABLE.len());
            for (spec, jv) in SO100_TABLE.joints.iter().zip(clamped.joints()) {
                prop_assert!(jv.value >= spec.range.min && jv.value <= spec.range.max);
            }
        }
    }
}
