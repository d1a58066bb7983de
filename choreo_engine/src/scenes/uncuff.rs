use super::ChoreographyEngine;
use crate::error::{SceneError, SceneOutcome};
use crate::geometry::{distance_squared_2d, uncuff_stand_pose, Role, Stance};
use crate::host::ActorHandle;
use crate::profile::{
    CLOSE_GUARD_DISTANCE_SQ, RESTRAINED_IDLE_CLIP, RESTRAINED_IDLE_SET, UNCUFF_PROFILE,
};
use crate::restraint::CuffState;
use crate::timeline::{
    approach_command, scene_playback, ControllerRotation, SceneSideEffect, TimelinePlan,
};

impl ChoreographyEngine {
    /// Walks up behind a restrained subject and plays the uncuff clip.
    pub async fn play_uncuff_scene(&self, subject: ActorHandle) -> SceneOutcome {
        let result = self.run_uncuff(subject).await;
        self.conclude("uncuff", result)
    }

    /// Uncuffs a subject this client also controls: the subject is released
    /// from the idle loop and loses its prop.
    pub async fn play_local_uncuff_scene(&self, subject: ActorHandle) -> SceneOutcome {
        let result = self.run_local_uncuff(subject).await;
        self.conclude("uncuff", result)
    }

    async fn run_local_uncuff(&self, subject: ActorHandle) -> Result<SceneOutcome, SceneError> {
        let outcome = self.run_uncuff(subject).await?;
        self.host.animation.clear_tasks(subject);
        self.restraints.set_cuff_state(subject, CuffState::Uncuffed);
        self.props().release_restraint_prop(subject)?;
        Ok(outcome)
    }

    async fn run_uncuff(&self, subject: ActorHandle) -> Result<SceneOutcome, SceneError> {
        let player = self.host.player;
        let actors = &self.host.actors;
        let position = actors
            .position(subject)
            .ok_or(SceneError::ActorMissing(subject))?;
        if !actors.is_playing(subject, RESTRAINED_IDLE_SET, RESTRAINED_IDLE_CLIP) {
            return Err(SceneError::Precondition(format!("{subject} is not restrained")));
        }
        let heading = actors.rotation(subject).map(|r| r.z).unwrap_or_default();

        let pose = uncuff_stand_pose(position, heading);
        let player_position = self
            .host
            .player_position()
            .ok_or(SceneError::ActorMissing(player))?;
        let distance_sq = distance_squared_2d(player_position, pose.position);
        if distance_sq > CLOSE_GUARD_DISTANCE_SQ {
            return Err(SceneError::TooFar { distance_sq });
        }

        self.anim_sets
            .ensure_loaded(&self.host, &self.config, UNCUFF_PROFILE.anim_set)
            .await?;

        let guard = self.task_guard(player);
        let profile = UNCUFF_PROFILE;
        let start_time = profile.start_time(Stance::Back);
        let playback = scene_playback(
            &profile,
            Role::Officer,
            &pose,
            self.host.player_rotation(),
            start_time,
        );
        let plan = TimelinePlan {
            profile,
            controller: player,
            approach: approach_command(&profile, &pose),
            playbacks: vec![(player, playback)],
            poll_clip: profile.officer_clip,
            start_time,
            side_effect: SceneSideEffect {
                sound: Some(self.config.uncuff_sound.clone()),
                restrain: None,
            },
            controller_rotation: ControllerRotation::Settled,
        };

        let report = self.timeline().run(&plan).await?;
        log::debug!("uncuff scene: {} ticks, stopped by {:?}", report.ticks, report.stopped_by);
        guard.release();
        Ok(SceneOutcome::Completed)
    }
}
