//! Restraint state per subject and the lifecycle of the handcuff prop.

use std::cell::RefCell;
use std::collections::BTreeMap;

use glam::Vec3;
use serde::Serialize;
use tokio::time::{sleep, Instant};

use crate::config::EngineConfig;
use crate::error::SceneError;
use crate::host::{ActorHandle, AttachSpec, Bone, EntityHandle, HostError, ModelStatus, SceneHost};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum CuffState {
    #[default]
    Uncuffed,
    Cuffed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct RestraintRecord {
    pub state: CuffState,
    pub prop: Option<EntityHandle>,
}

/// Cuff status and tracked prop, one record per subject.
#[derive(Debug, Default)]
pub struct RestraintRegistry {
    records: RefCell<BTreeMap<ActorHandle, RestraintRecord>>,
}

impl RestraintRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, subject: ActorHandle) -> RestraintRecord {
        self.records
            .borrow()
            .get(&subject)
            .copied()
            .unwrap_or_default()
    }

    pub fn cuff_state(&self, subject: ActorHandle) -> CuffState {
        self.record(subject).state
    }

    pub fn set_cuff_state(&self, subject: ActorHandle, state: CuffState) {
        self.records.borrow_mut().entry(subject).or_default().state = state;
    }

    pub fn tracked_prop(&self, subject: ActorHandle) -> Option<EntityHandle> {
        self.record(subject).prop
    }

    pub fn track_prop(&self, subject: ActorHandle, prop: EntityHandle) {
        self.records.borrow_mut().entry(subject).or_default().prop = Some(prop);
    }

    /// Subject whose record tracks `prop`.
    pub fn tracking_subject(&self, prop: EntityHandle) -> Option<ActorHandle> {
        self.records
            .borrow()
            .iter()
            .find(|(_, record)| record.prop == Some(prop))
            .map(|(subject, _)| *subject)
    }

    pub fn clear_prop(&self, subject: ActorHandle) {
        if let Some(record) = self.records.borrow_mut().get_mut(&subject) {
            record.prop = None;
        }
    }
}

pub const CUFF_ATTACH: AttachSpec = AttachSpec {
    bone: Bone::RightHand,
    offset: Vec3::new(0.01, 0.075, 0.0),
    rotation: Vec3::new(10.0, 45.0, 80.0),
    soft_pinning: true,
    collision: false,
    is_ped: true,
    rotation_order: 1,
    fixed_rotation: true,
};

/// Released props are parked here before deletion.
pub const DEAD_ZONE: Vec3 = Vec3::new(-1705.096, -5812.861, 0.0);

pub struct PropLifecycle<'a> {
    host: &'a SceneHost,
    registry: &'a RestraintRegistry,
    config: &'a EngineConfig,
}

impl<'a> PropLifecycle<'a> {
    pub fn new(host: &'a SceneHost, registry: &'a RestraintRegistry, config: &'a EngineConfig) -> Self {
        Self {
            host,
            registry,
            config,
        }
    }

    /// Spawns the configured prop and attaches it to `wearer`'s right hand.
    ///
    /// Returns the already-tracked prop when it is still live. Failures are
    /// logged and yield `None`.
    pub async fn attach_restraint_prop(&self, wearer: ActorHandle) -> Option<EntityHandle> {
        if let Some(existing) = self.live_tracked(wearer) {
            log::debug!("{wearer} already wears {existing}; skipping attach");
            return Some(existing);
        }

        match self.spawn_and_attach(wearer).await {
            Ok(prop) => Some(prop),
            Err(err) => {
                log::warn!("restraint prop for {wearer} not attached: {err}");
                None
            }
        }
    }

    async fn spawn_and_attach(&self, wearer: ActorHandle) -> Result<EntityHandle, SceneError> {
        let model = self.config.prop_model.as_str();
        self.load_model(model).await?;

        let entities = &self.host.entities;
        let spawn_at = entities
            .bone_position(wearer, Bone::RightHand, Vec3::ZERO)
            .ok_or(SceneError::ActorMissing(wearer))?;
        let prop = entities.spawn_prop(model, spawn_at, false, false)?;
        entities.mark_model_unneeded(model);

        if let Err(err) = entities.attach(prop, wearer, &CUFF_ATTACH) {
            destroy(self.host, prop);
            return Err(err.into());
        }

        // Another attach may have finished while this one was loading.
        if let Some(existing) = self.live_tracked(wearer) {
            log::debug!("{wearer} gained {existing} during attach; dropping {prop}");
            destroy(self.host, prop);
            return Ok(existing);
        }

        self.registry.track_prop(wearer, prop);
        log::debug!("attached {prop} to {wearer}");
        Ok(prop)
    }

    async fn load_model(&self, model: &str) -> Result<(), SceneError> {
        let entities = &self.host.entities;
        let tick = self.config.tick();

        entities.request_model(model);
        let requested = Instant::now();
        while entities.model_status(model) == ModelStatus::Loading {
            if requested.elapsed() >= self.config.model_request_budget() {
                break;
            }
            sleep(tick).await;
        }

        let loading = Instant::now();
        loop {
            match entities.model_status(model) {
                ModelStatus::Loaded => return Ok(()),
                ModelStatus::Invalid => {
                    return Err(SceneError::Precondition(format!(
                        "model {model} is not a valid prop model"
                    )))
                }
                ModelStatus::Loading => {
                    if loading.elapsed() >= self.config.model_load_budget() {
                        return Err(SceneError::ResourceTimeout {
                            resource: format!("model {model}"),
                            budget_ms: self.config.model_load_budget_ms,
                        });
                    }
                    sleep(tick).await;
                }
            }
        }
    }

    /// Detaches and deletes the prop worn by `wearer`.
    ///
    /// Resolution order: tracked handle, the entity attached to the wearer,
    /// then the nearest prop of the configured model that no other subject
    /// wears or tracks. Nothing found is a no-op.
    pub fn release_restraint_prop(&self, wearer: ActorHandle) -> Result<Option<EntityHandle>, HostError> {
        let Some(prop) = self.resolve(wearer) else {
            log::debug!("no restraint prop found for {wearer}");
            self.registry.clear_prop(wearer);
            return Ok(None);
        };

        let entities = &self.host.entities;
        entities.detach(prop)?;
        entities.set_position(prop, DEAD_ZONE)?;
        entities.set_persistent(prop, false)?;
        entities.mark_unneeded(prop)?;
        entities.delete(prop)?;
        self.registry.clear_prop(wearer);
        log::debug!("released {prop} from {wearer}");
        Ok(Some(prop))
    }

    fn resolve(&self, wearer: ActorHandle) -> Option<EntityHandle> {
        if let Some(prop) = self.live_tracked(wearer) {
            return Some(prop);
        }
        if let Some(prop) = self.host.actors.attachment_of(wearer) {
            if self.host.entities.entity_exists(prop) {
                return Some(prop);
            }
        }
        let center = self.host.actors.position(wearer)?;
        self.host
            .entities
            .find_props_near(&self.config.prop_model, center, self.config.prop_search_radius)
            .into_iter()
            .find(|prop| self.is_unclaimed_or_worn_by(*prop, wearer))
    }

    fn is_unclaimed_or_worn_by(&self, prop: EntityHandle, wearer: ActorHandle) -> bool {
        let owner = self.host.entities.attached_to(prop);
        let tracker = self.registry.tracking_subject(prop);
        owner.map_or(true, |owner| owner == wearer)
            && tracker.map_or(true, |subject| subject == wearer)
    }

    fn live_tracked(&self, wearer: ActorHandle) -> Option<EntityHandle> {
        self.registry
            .tracked_prop(wearer)
            .filter(|prop| self.host.entities.entity_exists(*prop))
    }
}

fn destroy(host: &SceneHost, prop: EntityHandle) {
    if let Err(err) = host.entities.delete(prop) {
        log::warn!("failed to destroy {prop}: {err}");
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::host::EntityService;
    use crate::sim::SimWorld;
    use crate::sound_bridge::RecordingSoundBroadcaster;

    struct Fixture {
        world: SimWorld,
        host: SceneHost,
        registry: RestraintRegistry,
        config: EngineConfig,
        wearer: ActorHandle,
    }

    fn fixture() -> Fixture {
        let world = SimWorld::new();
        let player = world.spawn_actor(Vec3::new(10.0, 10.0, 0.0), 0.0);
        let wearer = world.spawn_actor(Vec3::new(10.0, 11.0, 0.0), 0.0);
        let host = world.host(player, Rc::new(RecordingSoundBroadcaster::new()));
        Fixture {
            world,
            host,
            registry: RestraintRegistry::new(),
            config: EngineConfig::default(),
            wearer,
        }
    }

    #[test]
    fn registry_defaults_to_uncuffed() {
        let registry = RestraintRegistry::new();
        let subject = ActorHandle(4);
        assert_eq!(registry.cuff_state(subject), CuffState::Uncuffed);
        registry.set_cuff_state(subject, CuffState::Cuffed);
        registry.track_prop(subject, EntityHandle(1001));
        assert_eq!(registry.cuff_state(ActorHandle(5)), CuffState::Uncuffed);
        assert_eq!(
            registry.record(subject),
            RestraintRecord {
                state: CuffState::Cuffed,
                prop: Some(EntityHandle(1001)),
            }
        );
        registry.clear_prop(subject);
        assert_eq!(registry.tracked_prop(subject), None);
        assert_eq!(registry.cuff_state(subject), CuffState::Cuffed);
    }

    #[tokio::test(start_paused = true)]
    async fn attach_tracks_one_prop_per_wearer() {
        let fx = fixture();
        let props = PropLifecycle::new(&fx.host, &fx.registry, &fx.config);

        let first = props.attach_restraint_prop(fx.wearer).await.expect("attached");
        let second = props.attach_restraint_prop(fx.wearer).await.expect("reused");

        assert_eq!(first, second);
        assert_eq!(fx.world.attach_count(), 1);
        assert_eq!(fx.world.live_props(), vec![first]);
        assert_eq!(fx.world.prop_attached_to(first), Some(fx.wearer));
        assert_eq!(fx.registry.tracked_prop(fx.wearer), Some(first));
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_model_attaches_nothing() {
        let fx = fixture();
        fx.world.mark_model_invalid(&fx.config.prop_model);
        let props = PropLifecycle::new(&fx.host, &fx.registry, &fx.config);

        assert_eq!(props.attach_restraint_prop(fx.wearer).await, None);
        assert!(fx.world.live_props().is_empty());
        assert_eq!(fx.registry.tracked_prop(fx.wearer), None);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_attach_destroys_spawned_prop() {
        let fx = fixture();
        fx.world.fail_call("attach");
        let props = PropLifecycle::new(&fx.host, &fx.registry, &fx.config);

        assert_eq!(props.attach_restraint_prop(fx.wearer).await, None);
        assert!(fx.world.live_props().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn release_deletes_tracked_prop() {
        let fx = fixture();
        let props = PropLifecycle::new(&fx.host, &fx.registry, &fx.config);
        let prop = props.attach_restraint_prop(fx.wearer).await.expect("attached");

        assert_eq!(props.release_restraint_prop(fx.wearer).unwrap(), Some(prop));
        assert!(fx.world.live_props().is_empty());
        assert_eq!(fx.registry.tracked_prop(fx.wearer), None);
    }

    #[test]
    fn release_falls_back_to_proximity_search() {
        let fx = fixture();
        let stray = fx
            .world
            .spawn_loose_prop(&fx.config.prop_model, Vec3::new(11.0, 12.0, 0.0));
        let props = PropLifecycle::new(&fx.host, &fx.registry, &fx.config);

        assert_eq!(props.release_restraint_prop(fx.wearer).unwrap(), Some(stray));
        assert!(fx.world.live_props().is_empty());
    }

    #[test]
    fn release_without_any_prop_is_a_no_op() {
        let fx = fixture();
        let far = fx
            .world
            .spawn_loose_prop(&fx.config.prop_model, Vec3::new(50.0, 50.0, 0.0));
        let props = PropLifecycle::new(&fx.host, &fx.registry, &fx.config);

        assert_eq!(props.release_restraint_prop(fx.wearer).unwrap(), None);
        assert_eq!(fx.world.live_props(), vec![far]);
        assert!(fx.world.events().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn release_leaves_a_neighbours_cuffs_alone() {
        let fx = fixture();
        let neighbour = fx.world.spawn_actor(Vec3::new(11.5, 11.0, 0.0), 0.0);
        let props = PropLifecycle::new(&fx.host, &fx.registry, &fx.config);
        let worn = props.attach_restraint_prop(neighbour).await.expect("attached");

        assert_eq!(props.release_restraint_prop(fx.wearer).unwrap(), None);
        assert_eq!(fx.world.live_props(), vec![worn]);
        assert_eq!(fx.world.prop_attached_to(worn), Some(neighbour));
        assert_eq!(fx.registry.tracked_prop(neighbour), Some(worn));

        // Still tracked for the neighbour once it slips off.
        fx.world.detach(worn).unwrap();
        assert_eq!(props.release_restraint_prop(fx.wearer).unwrap(), None);
        assert_eq!(fx.world.live_props(), vec![worn]);
    }

    #[tokio::test(start_paused = true)]
    async fn release_prefers_the_worn_prop_over_a_closer_loose_one() {
        let fx = fixture();
        let props = PropLifecycle::new(&fx.host, &fx.registry, &fx.config);
        let worn = props.attach_restraint_prop(fx.wearer).await.expect("attached");
        fx.registry.clear_prop(fx.wearer);
        let loose = fx
            .world
            .spawn_loose_prop(&fx.config.prop_model, Vec3::new(10.0, 11.0, 0.1));

        assert_eq!(props.release_restraint_prop(fx.wearer).unwrap(), Some(worn));
        assert_eq!(fx.world.live_props(), vec![loose]);
    }
}
