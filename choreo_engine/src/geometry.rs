//! Stand positions and stance classification.
//!
//! Every angle and magnitude below was fitted by hand against the arrest
//! clips. They are data, not geometry: small deviations leave the two actors
//! visibly misaligned once the clip starts.

use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};

/// Where the officer stands relative to the subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stance {
    Back,
    Front,
}

impl Stance {
    /// Integer encoding used by the relayed scene payload.
    pub fn wire_value(self) -> i32 {
        match self {
            Stance::Back => 0,
            Stance::Front => 1,
        }
    }

    pub fn from_wire(value: i32) -> Self {
        if value == 1 {
            Stance::Front
        } else {
            Stance::Back
        }
    }
}

/// Which side of the interaction an animation command drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Officer,
    Subject,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StandPose {
    pub position: Vec3,
    pub heading: f32,
}

impl StandPose {
    /// Rotation for an actor adopting this pose, keeping its pitch and roll.
    pub fn rotation_from(&self, current: Vec3) -> Vec3 {
        Vec3::new(current.x, current.y, self.heading)
    }
}

pub const FRONT_OFFICER_VECTOR_ANGLE: f64 = 8.569;
pub const FRONT_OFFICER_MAGNITUDE: f64 = 0.9405;
pub const FRONT_OFFICER_HEADING_OFFSET: f32 = 167.0;

pub const BACK_OFFICER_X_ANGLE: f64 = 68.202_97;
pub const BACK_OFFICER_Y_ANGLE: f64 = -21.802;
pub const BACK_OFFICER_MAGNITUDE: f64 = 0.5385;
pub const BACK_OFFICER_HEADING_OFFSET: f32 = 53.0;

/// Subject heading offsets that leave the subject facing its pre-scene heading
/// once the clip releases it.
pub const FRONT_SUBJECT_HEADING_OFFSET: f32 = -65.567;
pub const BACK_SUBJECT_HEADING_OFFSET: f32 = -38.8;

pub const STANCE_PROBE_DISTANCE: f32 = 0.5;
pub const STANCE_BACK_BIAS: f32 = 0.1;

pub const UNCUFF_STAND_OFFSET: Vec3 = Vec3::new(-0.1, -0.575, 0.0);
pub const FRISK_STAND_DISTANCE: f32 = 0.5;
pub const FRISK_FRONT_HEADING_OFFSET: f32 = 180.0;

pub fn compute_stand_position(
    subject_position: Vec3,
    subject_heading: f32,
    stance: Stance,
    role: Role,
) -> StandPose {
    match (role, stance) {
        (Role::Officer, Stance::Front) => {
            let angle = (f64::from(subject_heading) + FRONT_OFFICER_VECTOR_ANGLE).to_radians();
            let dx = (FRONT_OFFICER_MAGNITUDE * angle.cos()) as f32;
            let dy = (FRONT_OFFICER_MAGNITUDE * angle.sin()) as f32;
            StandPose {
                position: subject_position + Vec3::new(dx, dy, 0.0),
                heading: subject_heading + FRONT_OFFICER_HEADING_OFFSET,
            }
        }
        (Role::Officer, Stance::Back) => {
            let heading = f64::from(subject_heading);
            let sin_x = (heading + BACK_OFFICER_X_ANGLE).to_radians().sin();
            let sin_y = (heading + BACK_OFFICER_Y_ANGLE).to_radians().sin();
            let dx = (BACK_OFFICER_MAGNITUDE * sin_x) as f32;
            let dy = (BACK_OFFICER_MAGNITUDE * sin_y) as f32;
            StandPose {
                position: subject_position + Vec3::new(dx, dy, 0.0),
                heading: subject_heading + BACK_OFFICER_HEADING_OFFSET,
            }
        }
        (Role::Subject, Stance::Front) => StandPose {
            position: subject_position,
            heading: subject_heading + FRONT_SUBJECT_HEADING_OFFSET,
        },
        (Role::Subject, Stance::Back) => StandPose {
            position: subject_position,
            heading: subject_heading + BACK_SUBJECT_HEADING_OFFSET,
        },
    }
}

/// Translates a local offset (x right, y forward, z up) of an entity facing
/// `heading` into world coordinates.
pub fn offset_in_world(position: Vec3, heading: f32, local: Vec3) -> Vec3 {
    let (sin, cos) = heading.to_radians().sin_cos();
    Vec3::new(
        position.x + local.x * cos - local.y * sin,
        position.y + local.x * sin + local.y * cos,
        position.z + local.z,
    )
}

pub fn distance_squared_2d(a: Vec3, b: Vec3) -> f32 {
    Vec2::new(a.x, a.y).distance_squared(Vec2::new(b.x, b.y))
}

pub fn classify_stance(controller_position: Vec3, subject_position: Vec3, subject_heading: f32) -> Stance {
    let back = offset_in_world(
        subject_position,
        subject_heading,
        Vec3::new(0.0, -STANCE_PROBE_DISTANCE, 0.0),
    );
    let front = offset_in_world(
        subject_position,
        subject_heading,
        Vec3::new(0.0, STANCE_PROBE_DISTANCE, 0.0),
    );

    let back_distance = distance_squared_2d(controller_position, back);
    let front_distance = distance_squared_2d(controller_position, front);

    if back_distance - STANCE_BACK_BIAS <= front_distance {
        Stance::Back
    } else {
        Stance::Front
    }
}

pub fn uncuff_stand_pose(subject_position: Vec3, subject_heading: f32) -> StandPose {
    StandPose {
        position: offset_in_world(subject_position, subject_heading, UNCUFF_STAND_OFFSET),
        heading: subject_heading,
    }
}

/// The frisking officer stands half a unit behind (or in front of) the
/// subject and faces the same way (or the subject).
pub fn frisk_stand_pose(subject_position: Vec3, subject_heading: f32, stance: Stance) -> StandPose {
    let (forward, heading_offset) = match stance {
        Stance::Back => (-FRISK_STAND_DISTANCE, 0.0),
        Stance::Front => (FRISK_STAND_DISTANCE, FRISK_FRONT_HEADING_OFFSET),
    };
    StandPose {
        position: offset_in_world(subject_position, subject_heading, Vec3::new(0.0, forward, 0.0)),
        heading: subject_heading + heading_offset,
    }
}
