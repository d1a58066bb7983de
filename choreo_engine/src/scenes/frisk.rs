use tokio::time::sleep;

use super::ChoreographyEngine;
use crate::error::{SceneError, SceneOutcome};
use crate::geometry::{classify_stance, distance_squared_2d, frisk_stand_pose};
use crate::host::{ActorHandle, ApproachCommand};
use crate::profile::{
    APPROACH_SPEED, APPROACH_TIMEOUT_MS, CLOSE_GUARD_DISTANCE_SQ, FRISK_ACCEL_RADIUS,
    FRISK_FINAL_TURN, FRISK_SETTLE_MS, FRISK_STEPS,
};
use crate::sequence::{InterruptionMonitor, SequenceOutcome};

impl ChoreographyEngine {
    /// Pats down `subject`; any movement input, damage or ragdoll on the
    /// player ends the search early.
    pub async fn play_frisk_scene(&self, subject: ActorHandle) -> SceneOutcome {
        let result = self.run_frisk(subject).await;
        self.conclude("frisk", result)
    }

    async fn run_frisk(&self, subject: ActorHandle) -> Result<SceneOutcome, SceneError> {
        let player = self.host.player;
        let actors = &self.host.actors;
        if !actors.exists(subject) {
            return Err(SceneError::ActorMissing(subject));
        }
        if actors.is_ragdoll(subject) || actors.is_dead(subject) || actors.is_incapacitated(subject) {
            return Err(SceneError::Precondition(format!("{subject} is down")));
        }

        let position = actors
            .position(subject)
            .ok_or(SceneError::ActorMissing(subject))?;
        let heading = actors.rotation(subject).map(|r| r.z).unwrap_or_default();
        let player_position = self
            .host
            .player_position()
            .ok_or(SceneError::ActorMissing(player))?;

        let stance = classify_stance(player_position, position, heading);
        let pose = frisk_stand_pose(position, heading, stance);
        let distance_sq = distance_squared_2d(player_position, pose.position);
        if distance_sq > CLOSE_GUARD_DISTANCE_SQ {
            return Err(SceneError::TooFar { distance_sq });
        }

        for step in &FRISK_STEPS {
            self.anim_sets
                .ensure_loaded(&self.host, &self.config, step.anim_set)
                .await?;
        }

        let guard = self.task_guard(player);
        let mut monitor = InterruptionMonitor::new(&self.host, self.config.tick());

        let approach = ApproachCommand {
            target: pose.position,
            heading: pose.heading,
            speed: APPROACH_SPEED,
            timeout_ms: APPROACH_TIMEOUT_MS,
            accel_radius: FRISK_ACCEL_RADIUS,
        };
        self.host.animation.go_straight_to(player, &approach)?;
        sleep(std::time::Duration::from_millis(FRISK_SETTLE_MS)).await;

        match monitor.run(&FRISK_STEPS).await? {
            SequenceOutcome::Interrupted { step, clip, reason } => {
                guard.release();
                Ok(SceneOutcome::Aborted(format!(
                    "step {} of {} ({clip}): {reason}",
                    step + 1,
                    FRISK_STEPS.len()
                )))
            }
            SequenceOutcome::Completed { steps } => {
                guard.release();
                let heading = self.host.player_rotation().z;
                self.host
                    .animation
                    .set_heading(player, heading + FRISK_FINAL_TURN)?;
                log::debug!("frisk scene: {steps} steps played");
                Ok(SceneOutcome::Completed)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use glam::Vec3;

    use super::*;
    use crate::config::EngineConfig;
    use crate::sim::{SimAction, SimWorld};
    use crate::sound_bridge::RecordingSoundBroadcaster;

    fn engine(player_at: Vec3) -> (SimWorld, ChoreographyEngine, ActorHandle) {
        let world = SimWorld::new();
        let player = world.spawn_actor(player_at, 0.0);
        let subject = world.spawn_actor(Vec3::new(0.0, 1.0, 0.0), 0.0);
        let host = world.host(player, Rc::new(RecordingSoundBroadcaster::new()));
        (world, ChoreographyEngine::new(host, EngineConfig::default()), subject)
    }

    #[tokio::test(start_paused = true)]
    async fn full_frisk_ends_with_final_turn() {
        let (world, engine, subject) = engine(Vec3::ZERO);
        let player = engine.host().player;

        let outcome = engine.play_frisk_scene(subject).await;

        assert_eq!(outcome, SceneOutcome::Completed);
        assert_eq!(world.played_clips(player).len(), 7);
        // One reset on boot_l_loop plus the release at the end.
        assert_eq!(world.clear_count(player), 2);
        // Back stance faces the subject's heading, then -20, +40, -20.
        assert_eq!(world.actor_heading(player), Some(0.0));
    }

    #[tokio::test(start_paused = true)]
    async fn movement_at_third_step_aborts_once() {
        let (world, engine, subject) = engine(Vec3::ZERO);
        let player = engine.host().player;
        world.on_clip_start("missfam5_yoga", "start_pose", SimAction::HoldMovement);

        let outcome = engine.play_frisk_scene(subject).await;

        assert!(matches!(outcome, SceneOutcome::Aborted(_)));
        assert_eq!(
            world.played_clips(player),
            vec!["idle".to_string(), "idle".to_string(), "start_pose".to_string()]
        );
        assert_eq!(world.clear_count(player), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn downed_subject_is_not_frisked() {
        let (world, engine, subject) = engine(Vec3::ZERO);
        world.set_incapacitated(subject, true);

        let outcome = engine.play_frisk_scene(subject).await;

        assert!(matches!(outcome, SceneOutcome::Skipped(_)));
        assert!(world.events().is_empty());
    }
}
