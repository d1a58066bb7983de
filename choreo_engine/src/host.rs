//! Collaborator interfaces the engine drives but does not own.
//!
//! The live simulation sits behind these traits. Queries are infallible and
//! answer with the current state; commands return [`HostError`] so a failing
//! native call surfaces at the orchestrator boundary instead of unwinding.

use std::fmt;
use std::rc::Rc;

use glam::Vec3;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Opaque handle of a live actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ActorHandle(pub i32);

/// Opaque handle of a spawned entity (props).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityHandle(pub i32);

impl fmt::Display for ActorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "actor#{}", self.0)
    }
}

impl fmt::Display for EntityHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "entity#{}", self.0)
    }
}

#[derive(Debug, Error)]
pub enum HostError {
    #[error("{0} no longer exists")]
    EntityMissing(EntityHandle),
    #[error("{0} no longer exists")]
    ActorMissing(ActorHandle),
    #[error("native call {call} failed: {reason}")]
    Native { call: &'static str, reason: String },
}

/// Skeleton bones the engine attaches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Bone {
    RightHand,
}

impl Bone {
    pub fn id(self) -> i32 {
        match self {
            Bone::RightHand => 57005,
        }
    }
}

/// Playback flag word forwarded verbatim to the animation service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackFlags(pub u32);

impl PlaybackFlags {
    pub const NONE: PlaybackFlags = PlaybackFlags(0);
    /// Locks the actor in place for the clip, no looping.
    pub const SCENE_LOCKED: PlaybackFlags = PlaybackFlags(262_152);
    /// Loop, upper body only, player keeps control.
    pub const RESTRAINED_LOOP: PlaybackFlags = PlaybackFlags(49);
}

/// Positioned playback of a clip at an explicit pose.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdvancedPlayback {
    pub anim_set: String,
    pub clip: String,
    pub position: Vec3,
    pub rotation: Vec3,
    pub blend_in: f32,
    pub blend_out: f32,
    pub duration_ms: i32,
    pub flags: PlaybackFlags,
    pub start_time: f32,
    pub rotation_order: i32,
    pub ik_flags: i32,
}

/// Playback of a clip wherever the actor currently stands.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimplePlayback {
    pub anim_set: String,
    pub clip: String,
    pub blend_in: f32,
    pub blend_out: f32,
    pub duration_ms: i32,
    pub flags: PlaybackFlags,
}

/// "Go straight to this point and face this way".
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApproachCommand {
    pub target: Vec3,
    pub heading: f32,
    pub speed: f32,
    pub timeout_ms: i32,
    pub accel_radius: f32,
}

/// Rigid attachment of an entity to an actor bone.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttachSpec {
    pub bone: Bone,
    pub offset: Vec3,
    pub rotation: Vec3,
    pub soft_pinning: bool,
    pub collision: bool,
    pub is_ped: bool,
    pub rotation_order: i32,
    pub fixed_rotation: bool,
}

/// Where a model resource stands after a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ModelStatus {
    /// Unknown to the content image or not a valid model.
    Invalid,
    Loading,
    Loaded,
}

pub trait ActorQuery {
    fn exists(&self, actor: ActorHandle) -> bool;
    fn position(&self, actor: ActorHandle) -> Option<Vec3>;
    fn rotation(&self, actor: ActorHandle) -> Option<Vec3>;
    fn health(&self, actor: ActorHandle) -> i32;
    fn is_ragdoll(&self, actor: ActorHandle) -> bool;
    fn is_dead(&self, actor: ActorHandle) -> bool;
    fn is_in_vehicle(&self, actor: ActorHandle) -> bool;
    fn is_incapacitated(&self, actor: ActorHandle) -> bool;
    fn is_playing(&self, actor: ActorHandle, anim_set: &str, clip: &str) -> bool;
    /// Entity currently attached to the actor, if any.
    fn attachment_of(&self, actor: ActorHandle) -> Option<EntityHandle>;
}

pub trait AnimationService {
    fn is_set_loaded(&self, anim_set: &str) -> bool;
    fn request_set(&self, anim_set: &str);
    fn play_advanced(&self, actor: ActorHandle, playback: &AdvancedPlayback)
        -> Result<(), HostError>;
    fn play(&self, actor: ActorHandle, playback: &SimplePlayback) -> Result<(), HostError>;
    /// Normalised playback position of the clip (0.0 when not playing).
    fn elapsed(&self, actor: ActorHandle, anim_set: &str, clip: &str) -> Result<f32, HostError>;
    fn go_straight_to(&self, actor: ActorHandle, command: &ApproachCommand)
        -> Result<(), HostError>;
    fn set_heading(&self, actor: ActorHandle, heading: f32) -> Result<(), HostError>;
    fn clear_tasks(&self, actor: ActorHandle);
    fn clear_tasks_immediately(&self, actor: ActorHandle);
}

pub trait EntityService {
    fn request_model(&self, model: &str);
    fn model_status(&self, model: &str) -> ModelStatus;
    fn mark_model_unneeded(&self, model: &str);
    fn bone_position(&self, actor: ActorHandle, bone: Bone, offset: Vec3) -> Option<Vec3>;
    fn spawn_prop(
        &self,
        model: &str,
        position: Vec3,
        networked: bool,
        dynamic: bool,
    ) -> Result<EntityHandle, HostError>;
    fn entity_exists(&self, entity: EntityHandle) -> bool;
    /// Actor the entity is attached to, if any.
    fn attached_to(&self, entity: EntityHandle) -> Option<ActorHandle>;
    fn attach(&self, entity: EntityHandle, actor: ActorHandle, spec: &AttachSpec)
        -> Result<(), HostError>;
    fn detach(&self, entity: EntityHandle) -> Result<(), HostError>;
    fn set_position(&self, entity: EntityHandle, position: Vec3) -> Result<(), HostError>;
    fn set_persistent(&self, entity: EntityHandle, persistent: bool) -> Result<(), HostError>;
    fn mark_unneeded(&self, entity: EntityHandle) -> Result<(), HostError>;
    fn delete(&self, entity: EntityHandle) -> Result<(), HostError>;
    /// Props of `model` within `radius` of `center`, nearest first.
    fn find_props_near(&self, model: &str, center: Vec3, radius: f32) -> Vec<EntityHandle>;
}

/// Fire-and-forget "play sound near position" notification.
pub trait SoundBroadcaster {
    fn play_within_distance(&self, sound: &str, distance_threshold: f32, volume: f32);
}

pub trait ControlState {
    /// Any directional movement control held this tick.
    fn movement_held(&self) -> bool;
    fn enable_weapon_wheel(&self, enabled: bool);
}

/// Bundle of collaborators plus the locally controlled actor.
#[derive(Clone)]
pub struct SceneHost {
    pub actors: Rc<dyn ActorQuery>,
    pub animation: Rc<dyn AnimationService>,
    pub entities: Rc<dyn EntityService>,
    pub sound: Rc<dyn SoundBroadcaster>,
    pub controls: Rc<dyn ControlState>,
    pub player: ActorHandle,
}

impl SceneHost {
    pub fn player_position(&self) -> Option<Vec3> {
        self.actors.position(self.player)
    }

    pub fn player_rotation(&self) -> Vec3 {
        self.actors.rotation(self.player).unwrap_or(Vec3::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn right_hand_bone_id_is_stable() {
        assert_eq!(Bone::RightHand.id(), 57005);
    }
}
