use choreo_stream::CuffScene;
use glam::Vec3;
use serde::Serialize;

use super::ChoreographyEngine;
use crate::error::{SceneError, SceneOutcome};
use crate::geometry::{classify_stance, compute_stand_position, distance_squared_2d, Role, Stance};
use crate::host::{ActorHandle, AdvancedPlayback, PlaybackFlags, SimplePlayback};
use crate::profile::{
    BLEND_IN, BLEND_OUT, CUFF_GUARD_DISTANCE_SQ, CUFF_PROFILE, RESTRAINED_IDLE_CLIP,
    RESTRAINED_IDLE_SET,
};
use crate::restraint::CuffState;
use crate::timeline::{
    approach_command, scene_playback, ControllerRotation, SceneSideEffect, TimelinePlan,
};

/// Subject pose captured when the scene was requested.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SubjectPose {
    pub position: Vec3,
    pub rotation: Vec3,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CuffSceneRequest {
    pub subject: SubjectPose,
    pub stance: Stance,
    pub role: Role,
    /// Subject actor driven by this client as well (single-client scenes).
    pub local_subject: Option<ActorHandle>,
}

impl CuffSceneRequest {
    /// Payload sent to the subject's client so it can play its half.
    pub fn to_relay(&self) -> CuffScene {
        CuffScene {
            perp_pos: self.subject.position.to_array(),
            perp_rot: self.subject.rotation.to_array(),
            scene_pos: self.stance.wire_value(),
        }
    }

    pub fn from_relay(relay: &CuffScene) -> Self {
        Self {
            subject: SubjectPose {
                position: Vec3::from_array(relay.perp_pos),
                rotation: Vec3::from_array(relay.perp_rot),
            },
            stance: Stance::from_wire(relay.scene_pos),
            role: Role::Subject,
            local_subject: None,
        }
    }
}

fn restrained_idle() -> SimplePlayback {
    SimplePlayback {
        anim_set: RESTRAINED_IDLE_SET.to_string(),
        clip: RESTRAINED_IDLE_CLIP.to_string(),
        blend_in: BLEND_IN,
        blend_out: BLEND_OUT,
        duration_ms: -1,
        flags: PlaybackFlags::RESTRAINED_LOOP,
    }
}

impl ChoreographyEngine {
    /// Plays the local player's half of a cuff scene.
    pub async fn play_cuff_scene(&self, request: &CuffSceneRequest) -> SceneOutcome {
        let result = self.run_cuff(request).await;
        self.conclude("cuff", result)
    }

    /// Entry point on the subject's client for a relayed scene.
    pub async fn play_relayed_cuff_scene(&self, relay: &CuffScene) -> SceneOutcome {
        self.play_cuff_scene(&CuffSceneRequest::from_relay(relay)).await
    }

    /// Officer-side request for `subject`, with the stance read from where the
    /// player stands right now.
    pub fn plan_cuff_request(&self, subject: ActorHandle) -> Result<CuffSceneRequest, SceneError> {
        let actors = &self.host.actors;
        let position = actors
            .position(subject)
            .ok_or(SceneError::ActorMissing(subject))?;
        let rotation = actors.rotation(subject).unwrap_or(Vec3::ZERO);
        let player_position = self
            .host
            .player_position()
            .ok_or(SceneError::ActorMissing(self.host.player))?;

        Ok(CuffSceneRequest {
            subject: SubjectPose { position, rotation },
            stance: classify_stance(player_position, position, rotation.z),
            role: Role::Officer,
            local_subject: None,
        })
    }

    /// Drives both actors from this client and leaves the subject cuffed in
    /// the restrained idle.
    pub async fn play_local_cuff_scene(&self, subject: ActorHandle) -> SceneOutcome {
        let result = self.run_local_cuff(subject).await;
        self.conclude("cuff", result)
    }

    async fn run_local_cuff(&self, subject: ActorHandle) -> Result<SceneOutcome, SceneError> {
        let mut request = self.plan_cuff_request(subject)?;
        request.local_subject = Some(subject);
        let outcome = self.run_cuff(&request).await?;

        self.restraints.set_cuff_state(subject, CuffState::Cuffed);
        self.host.animation.play(subject, &restrained_idle())?;
        Ok(outcome)
    }

    async fn run_cuff(&self, request: &CuffSceneRequest) -> Result<SceneOutcome, SceneError> {
        let player = self.host.player;
        self.should_perform(request.role)?;
        self.anim_sets
            .ensure_loaded(&self.host, &self.config, CUFF_PROFILE.anim_set)
            .await?;

        let player_position = self
            .host
            .player_position()
            .ok_or(SceneError::ActorMissing(player))?;
        let distance_sq = distance_squared_2d(player_position, request.subject.position);
        if distance_sq >= CUFF_GUARD_DISTANCE_SQ {
            return Err(SceneError::TooFar { distance_sq });
        }

        if request.role == Role::Subject {
            self.host.animation.clear_tasks_immediately(player);
        }

        let guard = self.task_guard(player);
        let subject_guard = request.local_subject.map(|subject| self.task_guard(subject));

        let plan = self.cuff_plan(request);
        let report = self.timeline().run(&plan).await?;
        log::debug!(
            "cuff scene: {} ticks, side effect fired: {}, stopped by {:?}",
            report.ticks,
            report.side_effect_fired,
            report.stopped_by
        );

        if let Some(subject_guard) = subject_guard {
            subject_guard.release();
        }
        guard.release();
        Ok(SceneOutcome::Completed)
    }

    fn cuff_plan(&self, request: &CuffSceneRequest) -> TimelinePlan {
        let player = self.host.player;
        let profile = CUFF_PROFILE;
        let start_time = profile.start_time(request.stance);
        let subject = request.subject;
        let heading = subject.rotation.z;

        let subject_pose =
            compute_stand_position(subject.position, heading, request.stance, Role::Subject);
        let subject_playback = |actor: ActorHandle| -> (ActorHandle, AdvancedPlayback) {
            let playback =
                scene_playback(&profile, Role::Subject, &subject_pose, subject.rotation, start_time);
            (actor, playback)
        };

        let sound = Some(self.config.cuff_sound.clone());
        let (controller_pose, playbacks, side_effect) = match request.role {
            Role::Officer => {
                let pose =
                    compute_stand_position(subject.position, heading, request.stance, Role::Officer);
                let playback = scene_playback(
                    &profile,
                    Role::Officer,
                    &pose,
                    self.host.player_rotation(),
                    start_time,
                );
                let officer = (player, playback);
                match request.local_subject {
                    Some(local) => (
                        pose,
                        vec![subject_playback(local), officer],
                        SceneSideEffect {
                            sound,
                            restrain: Some(local),
                        },
                    ),
                    None => (
                        pose,
                        vec![officer],
                        SceneSideEffect {
                            sound,
                            restrain: None,
                        },
                    ),
                }
            }
            Role::Subject => (
                subject_pose,
                vec![subject_playback(player)],
                SceneSideEffect {
                    sound: None,
                    restrain: Some(player),
                },
            ),
        };

        TimelinePlan {
            profile,
            controller: player,
            approach: approach_command(&profile, &controller_pose),
            playbacks,
            poll_clip: profile.clip(request.role),
            start_time,
            side_effect,
            controller_rotation: ControllerRotation::StandPose,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::config::EngineConfig;
    use crate::sim::{SimEvent, SimWorld};
    use crate::sound_bridge::RecordingSoundBroadcaster;

    struct Fixture {
        world: SimWorld,
        sounds: RecordingSoundBroadcaster,
        engine: ChoreographyEngine,
    }

    fn fixture(player_at: Vec3) -> Fixture {
        let world = SimWorld::new();
        let player = world.spawn_actor(player_at, 0.0);
        let sounds = RecordingSoundBroadcaster::new();
        let host = world.host(player, Rc::new(sounds.clone()));
        Fixture {
            world,
            sounds,
            engine: ChoreographyEngine::new(host, EngineConfig::default()),
        }
    }

    fn request(role: Role) -> CuffSceneRequest {
        CuffSceneRequest {
            subject: SubjectPose {
                position: Vec3::new(0.0, 1.0, 0.0),
                rotation: Vec3::new(0.0, 0.0, 0.0),
            },
            stance: Stance::Back,
            role,
            local_subject: None,
        }
    }

    #[test]
    fn relay_payload_carries_pose_and_stance() {
        let mut original = request(Role::Officer);
        original.stance = Stance::Front;
        let relay = original.to_relay();
        assert_eq!(relay.scene_pos, 1);
        assert_eq!(relay.perp_pos, [0.0, 1.0, 0.0]);

        let received = CuffSceneRequest::from_relay(&relay);
        assert_eq!(received.subject, original.subject);
        assert_eq!(received.stance, Stance::Front);
        assert_eq!(received.role, Role::Subject);
    }

    #[tokio::test(start_paused = true)]
    async fn remote_officer_plays_sound_only() {
        let fx = fixture(Vec3::ZERO);
        let outcome = fx.engine.play_cuff_scene(&request(Role::Officer)).await;

        assert_eq!(outcome, SceneOutcome::Completed);
        assert_eq!(fx.sounds.events().len(), 1);
        assert_eq!(fx.sounds.events()[0].sound, "handcuffsPutOn");
        assert_eq!(fx.world.attach_count(), 0);
        assert_eq!(fx.world.clear_count(fx.engine.host().player), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn subject_role_restrains_self_silently() {
        let fx = fixture(Vec3::new(0.0, 1.0, 0.0));
        let player = fx.engine.host().player;
        fx.engine.restraints().set_cuff_state(player, CuffState::Cuffed);

        let outcome = fx.engine.play_cuff_scene(&request(Role::Subject)).await;

        assert_eq!(outcome, SceneOutcome::Completed);
        assert!(fx.sounds.events().is_empty());
        assert_eq!(fx.world.attach_count(), 1);
        assert!(fx.engine.restraints().tracked_prop(player).is_some());
        assert!(fx
            .world
            .events()
            .contains(&SimEvent::ClearTasks { actor: player, immediate: true }));
    }

    #[tokio::test(start_paused = true)]
    async fn distant_subject_is_skipped_without_touching_tasks() {
        let fx = fixture(Vec3::new(5.0, 5.0, 0.0));
        let outcome = fx.engine.play_cuff_scene(&request(Role::Officer)).await;

        assert!(matches!(outcome, SceneOutcome::Skipped(_)));
        assert!(fx.world.events().is_empty());
        assert!(fx.sounds.events().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn fault_mid_scene_releases_control() {
        let fx = fixture(Vec3::ZERO);
        fx.world.fail_call("elapsed");
        let player = fx.engine.host().player;

        let outcome = fx.engine.play_cuff_scene(&request(Role::Officer)).await;

        assert!(matches!(outcome, SceneOutcome::Faulted(_)));
        assert_eq!(fx.world.clear_count(player), 1);
        assert!(fx
            .world
            .events()
            .contains(&SimEvent::WeaponWheel { enabled: true }));
    }
}
