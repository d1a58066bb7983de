//! Scene orchestrators: each operation composes classification, positioning
//! and one of the two playback controllers, and always hands control back.

mod cuff;
mod frisk;
mod uncuff;

use std::rc::Rc;

pub use cuff::{CuffSceneRequest, SubjectPose};

use crate::config::EngineConfig;
use crate::error::{SceneError, SceneOutcome};
use crate::geometry::Role;
use crate::host::{ActorHandle, AnimationService, EntityHandle, SceneHost};
use crate::profile::{RESTRAINED_IDLE_CLIP, RESTRAINED_IDLE_SET};
use crate::restraint::{CuffState, PropLifecycle, RestraintRegistry};
use crate::timeline::{AnimSetLoader, TimelineController};

pub struct ChoreographyEngine {
    host: SceneHost,
    config: EngineConfig,
    restraints: Rc<RestraintRegistry>,
    anim_sets: AnimSetLoader,
}

impl ChoreographyEngine {
    pub fn new(host: SceneHost, config: EngineConfig) -> Self {
        Self::with_registry(host, config, Rc::new(RestraintRegistry::new()))
    }

    /// Builds an engine that shares restraint state with the host.
    pub fn with_registry(
        host: SceneHost,
        config: EngineConfig,
        restraints: Rc<RestraintRegistry>,
    ) -> Self {
        Self {
            host,
            config,
            restraints,
            anim_sets: AnimSetLoader::new(),
        }
    }

    pub fn host(&self) -> &SceneHost {
        &self.host
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn restraints(&self) -> &Rc<RestraintRegistry> {
        &self.restraints
    }

    pub fn props(&self) -> PropLifecycle<'_> {
        PropLifecycle::new(&self.host, &self.restraints, &self.config)
    }

    fn timeline(&self) -> TimelineController<'_> {
        TimelineController::new(&self.host, &self.config, self.props())
    }

    /// Releases the restraint prop worn by the local player.
    pub fn release_restraint_prop(&self) -> Option<EntityHandle> {
        match self.props().release_restraint_prop(self.host.player) {
            Ok(prop) => prop,
            Err(err) => {
                log::warn!("failed to release restraint prop: {err}");
                None
            }
        }
    }

    /// Whether the local player may take part in a cuff scene in `role`.
    pub fn should_perform(&self, role: Role) -> Result<(), SceneError> {
        let player = self.host.player;
        let actors = &self.host.actors;
        if !actors.exists(player) {
            return Err(SceneError::ActorMissing(player));
        }
        if actors.is_in_vehicle(player) {
            return Err(SceneError::Precondition("player is in a vehicle".to_string()));
        }
        if actors.is_ragdoll(player) || actors.is_dead(player) {
            return Err(SceneError::Precondition("player is down".to_string()));
        }
        if role == Role::Subject {
            if self.restraints.cuff_state(player) != CuffState::Cuffed {
                return Err(SceneError::Precondition("player is not cuffed".to_string()));
            }
            if actors.is_playing(player, RESTRAINED_IDLE_SET, RESTRAINED_IDLE_CLIP) {
                return Err(SceneError::Precondition(
                    "player is already in the restrained idle".to_string(),
                ));
            }
        }
        Ok(())
    }

    fn task_guard(&self, actor: ActorHandle) -> TaskGuard<'_> {
        TaskGuard::new(&*self.host.animation, actor)
    }

    /// Collapses a scene result into an outcome, logging failures at the
    /// level their kind warrants.
    fn conclude(&self, scene: &str, result: Result<SceneOutcome, SceneError>) -> SceneOutcome {
        let err = match result {
            Ok(outcome) => {
                log::debug!("{scene} scene finished: {outcome:?}");
                return outcome;
            }
            Err(err) => err,
        };

        match &err {
            SceneError::TooFar { .. } | SceneError::Precondition(_) => {
                log::info!("{scene} scene skipped: {err}");
            }
            SceneError::ResourceTimeout { .. } | SceneError::ActorMissing(_) => {
                log::warn!("{scene} scene skipped: {err}");
            }
            SceneError::Host(_) => {
                log::error!("{scene} scene faulted: {err}");
                self.host.controls.enable_weapon_wheel(true);
            }
        }
        SceneOutcome::from_error(&err)
    }
}

/// Clears an actor's tasks when dropped unless already released.
pub(crate) struct TaskGuard<'a> {
    animation: &'a dyn AnimationService,
    actor: ActorHandle,
    armed: bool,
}

impl<'a> TaskGuard<'a> {
    fn new(animation: &'a dyn AnimationService, actor: ActorHandle) -> Self {
        Self {
            animation,
            actor,
            armed: true,
        }
    }

    pub(crate) fn release(mut self) {
        self.animation.clear_tasks(self.actor);
        self.armed = false;
    }
}

impl Drop for TaskGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.animation.clear_tasks(self.actor);
        }
    }
}
