//! Single-animation scenes: approach, play, fire a side effect at a fixed
//! point of the clip, stop.

use std::cell::RefCell;
use std::collections::BTreeSet;

use serde::Serialize;
use tokio::time::{sleep, Instant};

use crate::config::EngineConfig;
use crate::error::SceneError;
use crate::geometry::{Role, StandPose};
use crate::host::{ActorHandle, AdvancedPlayback, ApproachCommand, PlaybackFlags, SceneHost};
use crate::profile::{
    SceneTimingProfile, APPROACH_SPEED, APPROACH_TIMEOUT_MS, BLEND_IN, BLEND_OUT, ROTATION_ORDER,
};
use crate::restraint::PropLifecycle;

/// Remembers which animation sets are resident so each loads once per engine.
#[derive(Debug, Default)]
pub struct AnimSetLoader {
    loaded: RefCell<BTreeSet<String>>,
}

impl AnimSetLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_cached(&self, anim_set: &str) -> bool {
        self.loaded.borrow().contains(anim_set)
    }

    pub async fn ensure_loaded(
        &self,
        host: &SceneHost,
        config: &EngineConfig,
        anim_set: &str,
    ) -> Result<(), SceneError> {
        if self.is_cached(anim_set) {
            return Ok(());
        }

        let started = Instant::now();
        while !host.animation.is_set_loaded(anim_set) {
            if started.elapsed() >= config.anim_load_budget() {
                return Err(SceneError::ResourceTimeout {
                    resource: format!("animation set {anim_set}"),
                    budget_ms: config.anim_load_budget_ms,
                });
            }
            host.animation.request_set(anim_set);
            sleep(config.anim_load_retry()).await;
        }

        log::debug!("animation set {anim_set} loaded");
        self.loaded.borrow_mut().insert(anim_set.to_string());
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimelinePhase {
    Idle,
    Approaching,
    Playing,
    SideEffectFired,
    Completed,
}

/// Where the controller's playback rotation comes from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerRotation {
    /// The heading of the computed stand pose.
    #[default]
    StandPose,
    /// Whatever rotation the controller ended the approach with.
    Settled,
}

/// What happens when playback crosses the side-effect threshold.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SceneSideEffect {
    pub sound: Option<String>,
    /// Actor that receives the restraint prop.
    pub restrain: Option<ActorHandle>,
}

#[derive(Debug, Clone)]
pub struct TimelinePlan {
    pub profile: SceneTimingProfile,
    pub controller: ActorHandle,
    pub approach: ApproachCommand,
    pub playbacks: Vec<(ActorHandle, AdvancedPlayback)>,
    /// Clip whose playback position on the controller drives the timeline.
    pub poll_clip: &'static str,
    pub start_time: f32,
    pub side_effect: SceneSideEffect,
    pub controller_rotation: ControllerRotation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    StopThreshold,
    DurationBudget,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimelineReport {
    pub phases: Vec<TimelinePhase>,
    pub ticks: u64,
    pub side_effect_fired: bool,
    pub stopped_by: StopReason,
}

pub fn approach_command(profile: &SceneTimingProfile, pose: &StandPose) -> ApproachCommand {
    ApproachCommand {
        target: pose.position,
        heading: pose.heading,
        speed: APPROACH_SPEED,
        timeout_ms: APPROACH_TIMEOUT_MS,
        accel_radius: profile.accel_radius,
    }
}

/// Locked-in-place playback of the role's clip at `pose`.
pub fn scene_playback(
    profile: &SceneTimingProfile,
    role: Role,
    pose: &StandPose,
    current_rotation: glam::Vec3,
    start_time: f32,
) -> AdvancedPlayback {
    AdvancedPlayback {
        anim_set: profile.anim_set.to_string(),
        clip: profile.clip(role).to_string(),
        position: pose.position,
        rotation: pose.rotation_from(current_rotation),
        blend_in: BLEND_IN,
        blend_out: BLEND_OUT,
        duration_ms: i32::try_from(profile.duration_ms).unwrap_or(i32::MAX),
        flags: PlaybackFlags::SCENE_LOCKED,
        start_time,
        rotation_order: ROTATION_ORDER,
        ik_flags: 0,
    }
}

pub struct TimelineController<'a> {
    host: &'a SceneHost,
    config: &'a EngineConfig,
    props: PropLifecycle<'a>,
}

impl<'a> TimelineController<'a> {
    pub fn new(host: &'a SceneHost, config: &'a EngineConfig, props: PropLifecycle<'a>) -> Self {
        Self {
            host,
            config,
            props,
        }
    }

    pub async fn run(&self, plan: &TimelinePlan) -> Result<TimelineReport, SceneError> {
        let mut phases = vec![TimelinePhase::Idle];

        self.enter(&mut phases, plan, TimelinePhase::Approaching);
        self.host
            .animation
            .go_straight_to(plan.controller, &plan.approach)?;
        sleep(plan.profile.settle()).await;

        for (actor, playback) in &plan.playbacks {
            if *actor == plan.controller && plan.controller_rotation == ControllerRotation::Settled {
                let mut settled = playback.clone();
                if let Some(rotation) = self.host.actors.rotation(*actor) {
                    settled.rotation = rotation;
                }
                self.host.animation.play_advanced(*actor, &settled)?;
            } else {
                self.host.animation.play_advanced(*actor, playback)?;
            }
        }
        self.enter(&mut phases, plan, TimelinePhase::Playing);

        self.poll(plan, phases).await
    }

    /// Samples the controller's clip each tick until the stop threshold or
    /// the duration budget, firing the side effect once.
    pub async fn poll(
        &self,
        plan: &TimelinePlan,
        mut phases: Vec<TimelinePhase>,
    ) -> Result<TimelineReport, SceneError> {
        let profile = &plan.profile;
        let max_ticks = (profile.duration_ms / self.config.tick_ms.max(1)).max(1);
        let mut current = plan.start_time;
        let mut ticks = 0u64;
        let mut fired = false;
        let mut stopped_by = StopReason::StopThreshold;

        while current < profile.stop_time {
            if ticks >= max_ticks {
                log::debug!(
                    "{} scene: duration budget spent at playback position {current:.3}",
                    profile.name
                );
                stopped_by = StopReason::DurationBudget;
                break;
            }

            current = self
                .host
                .animation
                .elapsed(plan.controller, profile.anim_set, plan.poll_clip)?;
            if !fired && current >= profile.side_effect_time {
                self.fire(&plan.side_effect).await;
                fired = true;
                self.enter(&mut phases, plan, TimelinePhase::SideEffectFired);
            }

            ticks += 1;
            sleep(self.config.tick()).await;
        }

        self.enter(&mut phases, plan, TimelinePhase::Completed);
        Ok(TimelineReport {
            phases,
            ticks,
            side_effect_fired: fired,
            stopped_by,
        })
    }

    async fn fire(&self, effect: &SceneSideEffect) {
        if let Some(wearer) = effect.restrain {
            self.props.attach_restraint_prop(wearer).await;
        }
        if let Some(sound) = &effect.sound {
            self.host.sound.play_within_distance(
                sound,
                self.config.sound_distance,
                self.config.sound_volume,
            );
        }
    }

    fn enter(&self, phases: &mut Vec<TimelinePhase>, plan: &TimelinePlan, phase: TimelinePhase) {
        log::debug!("{} scene on {}: {phase:?}", plan.profile.name, plan.controller);
        phases.push(phase);
    }
}
