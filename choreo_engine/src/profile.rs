//! Per-scene timing profiles and the frisk step list.

use std::time::Duration;

use serde::Serialize;

use crate::geometry::{Role, Stance};

pub const BLEND_IN: f32 = 8.0;
pub const BLEND_OUT: f32 = -8.0;
pub const APPROACH_SPEED: f32 = 1.0;
pub const APPROACH_TIMEOUT_MS: i32 = 5000;
pub const ROTATION_ORDER: i32 = 2;

pub const RESTRAINED_IDLE_SET: &str = "mp_arresting";
pub const RESTRAINED_IDLE_CLIP: &str = "idle";

/// Constants for one single-animation scene type.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SceneTimingProfile {
    pub name: &'static str,
    pub anim_set: &'static str,
    pub officer_clip: &'static str,
    pub subject_clip: Option<&'static str>,
    pub front_start_time: f32,
    pub back_start_time: f32,
    pub side_effect_time: f32,
    pub stop_time: f32,
    pub duration_ms: u64,
    pub settle_ms: u64,
    pub accel_radius: f32,
}

impl SceneTimingProfile {
    pub fn start_time(&self, stance: Stance) -> f32 {
        match stance {
            Stance::Front => self.front_start_time,
            Stance::Back => self.back_start_time,
        }
    }

    /// Clip for the given role; profiles without a subject clip fall back to
    /// the officer clip.
    pub fn clip(&self, role: Role) -> &'static str {
        match role {
            Role::Officer => self.officer_clip,
            Role::Subject => self.subject_clip.unwrap_or(self.officer_clip),
        }
    }

    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

pub const CUFF_PROFILE: SceneTimingProfile = SceneTimingProfile {
    name: "cuff",
    anim_set: "rcmpaparazzo_3",
    officer_clip: "poppy_arrest_cop",
    subject_clip: Some("poppy_arrest_popm"),
    front_start_time: 0.56,
    back_start_time: 0.6,
    side_effect_time: 0.635,
    stop_time: 0.64,
    duration_ms: 5250,
    settle_ms: 600,
    accel_radius: 6.0,
};

pub const UNCUFF_PROFILE: SceneTimingProfile = SceneTimingProfile {
    name: "uncuff",
    anim_set: "mp_arresting",
    officer_clip: "a_uncuff",
    subject_clip: None,
    front_start_time: 0.45,
    back_start_time: 0.45,
    side_effect_time: 0.45,
    stop_time: 1.0,
    duration_ms: 1400,
    settle_ms: 750,
    accel_radius: 4.0,
};

/// Squared 2D distance under which the officer may start a cuff scene.
pub const CUFF_GUARD_DISTANCE_SQ: f32 = 10.0;
/// Squared 2D distance above which uncuff and frisk scenes refuse to start.
pub const CLOSE_GUARD_DISTANCE_SQ: f32 = 3.0;

/// Action tied to a step's identity, applied just before the step plays.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum StepCue {
    Turn { degrees: f32 },
    ResetAndTurn { degrees: f32 },
}

/// One clip of a multi-step sequence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SceneAnimation {
    pub anim_set: &'static str,
    pub clip: &'static str,
    pub wait_ms: u64,
    pub cue: Option<StepCue>,
}

impl SceneAnimation {
    pub const fn new(anim_set: &'static str, clip: &'static str, wait_ms: u64) -> Self {
        Self {
            anim_set,
            clip,
            wait_ms,
            cue: None,
        }
    }

    pub const fn with_cue(mut self, cue: StepCue) -> Self {
        self.cue = Some(cue);
        self
    }

    pub fn wait(&self) -> Duration {
        Duration::from_millis(self.wait_ms)
    }
}

pub const FRISK_BLEND_IN: f32 = 1.5;
pub const FRISK_SETTLE_MS: u64 = 750;
pub const FRISK_ACCEL_RADIUS: f32 = 4.0;
pub const FRISK_FINAL_TURN: f32 = -20.0;

pub const FRISK_STEPS: [SceneAnimation; 7] = [
    SceneAnimation::new("anim@heists@load_box", "idle", 850),
    SceneAnimation::new("anim@heists@box_carry@", "idle", 600),
    SceneAnimation::new("missfam5_yoga", "start_pose", 750),
    SceneAnimation::new("missbigscore2aig_7@driver", "boot_r_loop", 1000)
        .with_cue(StepCue::Turn { degrees: -20.0 }),
    SceneAnimation::new("mini@yoga", "outro_2", 1500),
    SceneAnimation::new("missbigscore2aig_7@driver", "boot_l_loop", 1000)
        .with_cue(StepCue::ResetAndTurn { degrees: 40.0 }),
    SceneAnimation::new("mini@yoga", "outro_2", 1500),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cuff_thresholds_are_ordered() {
        for stance in [Stance::Front, Stance::Back] {
            let start = CUFF_PROFILE.start_time(stance);
            assert!(start < CUFF_PROFILE.side_effect_time);
        }
        assert!(CUFF_PROFILE.side_effect_time < CUFF_PROFILE.stop_time);
    }

    #[test]
    fn uncuff_profile_reuses_officer_clip() {
        assert_eq!(UNCUFF_PROFILE.clip(Role::Subject), "a_uncuff");
        assert_eq!(CUFF_PROFILE.clip(Role::Subject), "poppy_arrest_popm");
    }

    #[test]
    fn frisk_cues_sit_on_boot_clips() {
        let cued: Vec<&str> = FRISK_STEPS
            .iter()
            .filter(|step| step.cue.is_some())
            .map(|step| step.clip)
            .collect();
        assert_eq!(cued, vec!["boot_r_loop", "boot_l_loop"]);
        let total: u64 = FRISK_STEPS.iter().map(|step| step.wait_ms).sum();
        assert_eq!(total, 7200);
    }
}
