//! Multi-step sequences that stop as soon as the controller is disturbed.

use serde::Serialize;
use tokio::time::{sleep, Instant};

use crate::error::SceneError;
use crate::host::{ActorHandle, PlaybackFlags, SceneHost, SimplePlayback};
use crate::profile::{SceneAnimation, StepCue, BLEND_OUT, FRISK_BLEND_IN};

/// Health floor that only ever rises. Healing during a sequence is not an
/// interruption; any drop below the best value seen is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HealthBaseline {
    value: i32,
}

impl HealthBaseline {
    pub fn new(value: i32) -> Self {
        Self { value }
    }

    pub fn value(&self) -> i32 {
        self.value
    }

    /// Folds in a health reading; returns true when it is below the baseline.
    pub fn observe(&mut self, health: i32) -> bool {
        if health > self.value {
            self.value = health;
        }
        health < self.value
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum InterruptReason {
    MovementHeld,
    Damaged { health: i32, baseline: i32 },
    Ragdoll,
}

impl std::fmt::Display for InterruptReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InterruptReason::MovementHeld => write!(f, "movement input held"),
            InterruptReason::Damaged { health, baseline } => {
                write!(f, "health dropped to {health} (baseline {baseline})")
            }
            InterruptReason::Ragdoll => write!(f, "controller ragdolled"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SequenceOutcome {
    Completed {
        steps: usize,
    },
    Interrupted {
        /// Zero-based index of the step that was playing.
        step: usize,
        clip: String,
        reason: InterruptReason,
    },
}

pub struct InterruptionMonitor<'a> {
    host: &'a SceneHost,
    controller: ActorHandle,
    tick: std::time::Duration,
    baseline: HealthBaseline,
}

impl<'a> InterruptionMonitor<'a> {
    /// Captures the controller's current health as the starting baseline.
    pub fn new(host: &'a SceneHost, tick: std::time::Duration) -> Self {
        let controller = host.player;
        let baseline = HealthBaseline::new(host.actors.health(controller));
        Self {
            host,
            controller,
            tick,
            baseline,
        }
    }

    pub fn baseline(&self) -> HealthBaseline {
        self.baseline
    }

    pub async fn run(&mut self, steps: &[SceneAnimation]) -> Result<SequenceOutcome, SceneError> {
        for (index, step) in steps.iter().enumerate() {
            if let Some(cue) = step.cue {
                self.apply_cue(cue)?;
            }

            let playback = SimplePlayback {
                anim_set: step.anim_set.to_string(),
                clip: step.clip.to_string(),
                blend_in: FRISK_BLEND_IN,
                blend_out: BLEND_OUT,
                duration_ms: -1,
                flags: PlaybackFlags::NONE,
            };
            self.host.animation.play(self.controller, &playback)?;
            log::debug!("sequence step {index}: {}/{}", step.anim_set, step.clip);

            if let Some(reason) = self.wait_interruptible(step).await {
                log::info!("sequence interrupted at step {index} ({}): {reason}", step.clip);
                return Ok(SequenceOutcome::Interrupted {
                    step: index,
                    clip: step.clip.to_string(),
                    reason,
                });
            }
        }

        Ok(SequenceOutcome::Completed { steps: steps.len() })
    }

    fn apply_cue(&self, cue: StepCue) -> Result<(), SceneError> {
        let animation = &self.host.animation;
        let heading = self.host.player_rotation().z;
        match cue {
            StepCue::Turn { degrees } => animation.set_heading(self.controller, heading + degrees)?,
            StepCue::ResetAndTurn { degrees } => {
                animation.clear_tasks(self.controller);
                animation.set_heading(self.controller, heading + degrees)?;
            }
        }
        Ok(())
    }

    async fn wait_interruptible(&mut self, step: &SceneAnimation) -> Option<InterruptReason> {
        let started = Instant::now();
        loop {
            if let Some(reason) = self.check() {
                return Some(reason);
            }
            if started.elapsed() >= step.wait() {
                return None;
            }
            sleep(self.tick).await;
        }
    }

    fn check(&mut self) -> Option<InterruptReason> {
        if self.host.controls.movement_held() {
            return Some(InterruptReason::MovementHeld);
        }
        let health = self.host.actors.health(self.controller);
        if self.baseline.observe(health) {
            return Some(InterruptReason::Damaged {
                health,
                baseline: self.baseline.value(),
            });
        }
        if self.host.actors.is_ragdoll(self.controller) {
            return Some(InterruptReason::Ragdoll);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;
    use std::time::Duration;

    use glam::Vec3;

    use super::*;
    use crate::profile::FRISK_STEPS;
    use crate::sim::{SimAction, SimWorld};
    use crate::sound_bridge::RecordingSoundBroadcaster;

    fn world_with_player() -> (SimWorld, SceneHost) {
        let world = SimWorld::new();
        let player = world.spawn_actor(Vec3::ZERO, 90.0);
        world.set_health(player, 100);
        let host = world.host(player, Rc::new(RecordingSoundBroadcaster::new()));
        (world, host)
    }

    #[test]
    fn baseline_rises_and_flags_drops_below_best() {
        let mut baseline = HealthBaseline::new(100);
        assert!(!baseline.observe(150));
        assert_eq!(baseline.value(), 150);
        assert!(baseline.observe(140));
        assert_eq!(baseline.value(), 150);
        assert!(!baseline.observe(150));
    }

    #[tokio::test(start_paused = true)]
    async fn uninterrupted_sequence_plays_every_step_in_order() {
        let (world, host) = world_with_player();
        let mut monitor = InterruptionMonitor::new(&host, Duration::from_millis(10));

        let outcome = monitor.run(&FRISK_STEPS).await.expect("sequence");

        assert_eq!(outcome, SequenceOutcome::Completed { steps: 7 });
        let expected: Vec<String> = FRISK_STEPS.iter().map(|s| s.clip.to_string()).collect();
        assert_eq!(world.played_clips(host.player), expected);
        // boot_l_loop resets the controller before turning.
        assert_eq!(world.clear_count(host.player), 1);
        // -20 then +40 from a 90 degree start.
        assert_eq!(world.actor_heading(host.player), Some(110.0));
    }

    #[tokio::test(start_paused = true)]
    async fn healing_then_damage_interrupts() {
        let (world, host) = world_with_player();
        world.on_clip_start("anim@heists@box_carry@", "idle", SimAction::SetHealth(150));
        world.on_clip_start("missfam5_yoga", "start_pose", SimAction::SetHealth(140));
        let mut monitor = InterruptionMonitor::new(&host, Duration::from_millis(10));

        let outcome = monitor.run(&FRISK_STEPS).await.expect("sequence");

        assert_eq!(
            outcome,
            SequenceOutcome::Interrupted {
                step: 2,
                clip: "start_pose".to_string(),
                reason: InterruptReason::Damaged {
                    health: 140,
                    baseline: 150,
                },
            }
        );
        assert_eq!(monitor.baseline().value(), 150);
    }

    #[tokio::test(start_paused = true)]
    async fn ragdoll_interrupts_current_step() {
        let (world, host) = world_with_player();
        world.on_clip_start("mini@yoga", "outro_2", SimAction::Ragdoll);
        let mut monitor = InterruptionMonitor::new(&host, Duration::from_millis(10));

        let outcome = monitor.run(&FRISK_STEPS).await.expect("sequence");

        assert!(matches!(
            outcome,
            SequenceOutcome::Interrupted {
                step: 4,
                reason: InterruptReason::Ragdoll,
                ..
            }
        ));
        assert_eq!(world.played_clips(host.player).len(), 5);
    }
}
