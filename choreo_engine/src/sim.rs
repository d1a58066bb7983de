//! In-memory simulation host.
//!
//! `SimWorld` stands in for the live game so scenes can run headless: approach
//! commands teleport, clips advance against the tokio clock, and every command
//! lands in a journal that tests and the demo binary inspect.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::rc::Rc;
use std::time::Duration;

use glam::Vec3;
use serde::Serialize;
use tokio::time::Instant;

use crate::host::{
    ActorHandle, ActorQuery, AdvancedPlayback, AnimationService, ApproachCommand, AttachSpec,
    Bone, ControlState, EntityHandle, EntityService, HostError, ModelStatus, SceneHost,
    SimplePlayback, SoundBroadcaster,
};

const DEFAULT_CLIP_LENGTH: Duration = Duration::from_secs(10);
const HAND_HEIGHT: f32 = 0.9;

/// Journal entry for one command issued against the simulation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SimEvent {
    Approach {
        actor: ActorHandle,
        target: [f32; 3],
        heading: f32,
        accel_radius: f32,
    },
    PlayAdvanced {
        actor: ActorHandle,
        anim_set: String,
        clip: String,
        start_time: f32,
        heading: f32,
    },
    Play {
        actor: ActorHandle,
        anim_set: String,
        clip: String,
    },
    Heading {
        actor: ActorHandle,
        heading: f32,
    },
    ClearTasks {
        actor: ActorHandle,
        immediate: bool,
    },
    Spawn {
        entity: EntityHandle,
        model: String,
    },
    Attach {
        entity: EntityHandle,
        actor: ActorHandle,
        bone: i32,
    },
    Detach {
        entity: EntityHandle,
    },
    Delete {
        entity: EntityHandle,
    },
    WeaponWheel {
        enabled: bool,
    },
}

/// State change applied when a matching clip starts playing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SimAction {
    HoldMovement,
    SetHealth(i32),
    Ragdoll,
}

#[derive(Debug, Clone)]
struct SimClip {
    anim_set: String,
    clip: String,
    start_time: f32,
    started_at: Instant,
}

#[derive(Debug, Clone)]
struct SimActor {
    position: Vec3,
    rotation: Vec3,
    health: i32,
    ragdoll: bool,
    dead: bool,
    in_vehicle: bool,
    incapacitated: bool,
    playing: Option<SimClip>,
    attachment: Option<EntityHandle>,
}

#[derive(Debug, Clone)]
struct SimProp {
    model: String,
    position: Vec3,
    attached_to: Option<ActorHandle>,
    persistent: bool,
}

#[derive(Debug)]
struct SimState {
    actors: BTreeMap<ActorHandle, SimActor>,
    props: BTreeMap<EntityHandle, SimProp>,
    next_actor: i32,
    next_entity: i32,
    loaded_sets: BTreeSet<String>,
    set_delays: BTreeMap<String, u32>,
    invalid_models: BTreeSet<String>,
    models: BTreeMap<String, ModelStatus>,
    clip_lengths: BTreeMap<String, Duration>,
    scripted_elapsed: BTreeMap<(ActorHandle, String), VecDeque<f32>>,
    clip_triggers: Vec<(String, String, SimAction)>,
    failing_calls: BTreeSet<&'static str>,
    movement_held: bool,
    approach_heading_drift: f32,
    events: Vec<SimEvent>,
}

impl Default for SimState {
    fn default() -> Self {
        Self {
            actors: BTreeMap::new(),
            props: BTreeMap::new(),
            next_actor: 1,
            next_entity: 1000,
            loaded_sets: BTreeSet::new(),
            set_delays: BTreeMap::new(),
            invalid_models: BTreeSet::new(),
            models: BTreeMap::new(),
            clip_lengths: BTreeMap::new(),
            scripted_elapsed: BTreeMap::new(),
            clip_triggers: Vec::new(),
            failing_calls: BTreeSet::new(),
            movement_held: false,
            approach_heading_drift: 0.0,
            events: Vec::new(),
        }
    }
}

impl SimState {
    fn actor_mut(&mut self, actor: ActorHandle) -> Result<&mut SimActor, HostError> {
        self.actors
            .get_mut(&actor)
            .ok_or(HostError::ActorMissing(actor))
    }

    fn check(&self, call: &'static str) -> Result<(), HostError> {
        if self.failing_calls.contains(call) {
            return Err(HostError::Native {
                call,
                reason: "simulated failure".to_string(),
            });
        }
        Ok(())
    }

    fn start_clip(&mut self, actor: ActorHandle, anim_set: &str, clip: &str, start_time: f32) {
        if let Some(state) = self.actors.get_mut(&actor) {
            state.playing = Some(SimClip {
                anim_set: anim_set.to_string(),
                clip: clip.to_string(),
                start_time,
                started_at: Instant::now(),
            });
        }

        let actions: Vec<SimAction> = self
            .clip_triggers
            .iter()
            .filter(|(set, name, _)| set == anim_set && name == clip)
            .map(|(_, _, action)| *action)
            .collect();
        for action in actions {
            match action {
                SimAction::HoldMovement => self.movement_held = true,
                SimAction::SetHealth(health) => {
                    if let Some(state) = self.actors.get_mut(&actor) {
                        state.health = health;
                    }
                }
                SimAction::Ragdoll => {
                    if let Some(state) = self.actors.get_mut(&actor) {
                        state.ragdoll = true;
                    }
                }
            }
        }
    }

    fn clock_elapsed(&self, actor: ActorHandle, anim_set: &str, clip: &str) -> f32 {
        let Some(playing) = self.actors.get(&actor).and_then(|a| a.playing.as_ref()) else {
            return 0.0;
        };
        if playing.anim_set != anim_set || playing.clip != clip {
            return 0.0;
        }
        let length = self
            .clip_lengths
            .get(clip)
            .copied()
            .unwrap_or(DEFAULT_CLIP_LENGTH);
        let progressed = playing.started_at.elapsed().as_secs_f32() / length.as_secs_f32();
        (playing.start_time + progressed).min(1.0)
    }
}

#[derive(Clone, Default)]
pub struct SimWorld {
    state: Rc<RefCell<SimState>>,
}

impl SimWorld {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assembles a host around this world with `player` as the controller.
    pub fn host(&self, player: ActorHandle, sound: Rc<dyn SoundBroadcaster>) -> SceneHost {
        let world = Rc::new(self.clone());
        SceneHost {
            actors: world.clone(),
            animation: world.clone(),
            entities: world.clone(),
            sound,
            controls: world,
            player,
        }
    }

    pub fn spawn_actor(&self, position: Vec3, heading: f32) -> ActorHandle {
        let mut state = self.state.borrow_mut();
        let handle = ActorHandle(state.next_actor);
        state.next_actor += 1;
        state.actors.insert(
            handle,
            SimActor {
                position,
                rotation: Vec3::new(0.0, 0.0, heading),
                health: 200,
                ragdoll: false,
                dead: false,
                in_vehicle: false,
                incapacitated: false,
                playing: None,
                attachment: None,
            },
        );
        handle
    }

    pub fn spawn_loose_prop(&self, model: &str, position: Vec3) -> EntityHandle {
        let mut state = self.state.borrow_mut();
        let handle = EntityHandle(state.next_entity);
        state.next_entity += 1;
        state.props.insert(
            handle,
            SimProp {
                model: model.to_string(),
                position,
                attached_to: None,
                persistent: true,
            },
        );
        handle
    }

    pub fn set_position(&self, actor: ActorHandle, position: Vec3) {
        if let Some(state) = self.state.borrow_mut().actors.get_mut(&actor) {
            state.position = position;
        }
    }

    pub fn set_health(&self, actor: ActorHandle, health: i32) {
        if let Some(state) = self.state.borrow_mut().actors.get_mut(&actor) {
            state.health = health;
        }
    }

    pub fn set_ragdoll(&self, actor: ActorHandle, ragdoll: bool) {
        if let Some(state) = self.state.borrow_mut().actors.get_mut(&actor) {
            state.ragdoll = ragdoll;
        }
    }

    pub fn set_dead(&self, actor: ActorHandle, dead: bool) {
        if let Some(state) = self.state.borrow_mut().actors.get_mut(&actor) {
            state.dead = dead;
        }
    }

    pub fn set_in_vehicle(&self, actor: ActorHandle, in_vehicle: bool) {
        if let Some(state) = self.state.borrow_mut().actors.get_mut(&actor) {
            state.in_vehicle = in_vehicle;
        }
    }

    pub fn set_incapacitated(&self, actor: ActorHandle, incapacitated: bool) {
        if let Some(state) = self.state.borrow_mut().actors.get_mut(&actor) {
            state.incapacitated = incapacitated;
        }
    }

    /// Approaches end `degrees` off the commanded heading.
    pub fn drift_approach_heading(&self, degrees: f32) {
        self.state.borrow_mut().approach_heading_drift = degrees;
    }

    pub fn hold_movement(&self, held: bool) {
        self.state.borrow_mut().movement_held = held;
    }

    /// Starts `clip` on `actor` as if some other script had done so.
    pub fn force_clip(&self, actor: ActorHandle, anim_set: &str, clip: &str) {
        self.state
            .borrow_mut()
            .start_clip(actor, anim_set, clip, 0.0);
    }

    pub fn set_clip_length(&self, clip: &str, length: Duration) {
        self.state
            .borrow_mut()
            .clip_lengths
            .insert(clip.to_string(), length);
    }

    /// Replaces clock-driven elapsed time for `clip` with fixed readings, one
    /// per query; the last reading repeats.
    pub fn script_elapsed<I>(&self, actor: ActorHandle, clip: &str, readings: I)
    where
        I: IntoIterator<Item = f32>,
    {
        self.state
            .borrow_mut()
            .scripted_elapsed
            .insert((actor, clip.to_string()), readings.into_iter().collect());
    }

    pub fn on_clip_start(&self, anim_set: &str, clip: &str, action: SimAction) {
        self.state
            .borrow_mut()
            .clip_triggers
            .push((anim_set.to_string(), clip.to_string(), action));
    }

    /// Makes an animation set need `requests` load requests before it loads.
    pub fn delay_set_load(&self, anim_set: &str, requests: u32) {
        self.state
            .borrow_mut()
            .set_delays
            .insert(anim_set.to_string(), requests);
    }

    pub fn mark_model_invalid(&self, model: &str) {
        self.state
            .borrow_mut()
            .invalid_models
            .insert(model.to_string());
    }

    pub fn fail_call(&self, call: &'static str) {
        self.state.borrow_mut().failing_calls.insert(call);
    }

    pub fn events(&self) -> Vec<SimEvent> {
        self.state.borrow().events.clone()
    }

    pub fn clear_count(&self, actor: ActorHandle) -> usize {
        self.state
            .borrow()
            .events
            .iter()
            .filter(|event| matches!(event, SimEvent::ClearTasks { actor: a, .. } if *a == actor))
            .count()
    }

    pub fn attach_count(&self) -> usize {
        self.state
            .borrow()
            .events
            .iter()
            .filter(|event| matches!(event, SimEvent::Attach { .. }))
            .count()
    }

    /// Clips played on `actor`, in order.
    pub fn played_clips(&self, actor: ActorHandle) -> Vec<String> {
        self.state
            .borrow()
            .events
            .iter()
            .filter_map(|event| match event {
                SimEvent::Play { actor: a, clip, .. } if *a == actor => Some(clip.clone()),
                SimEvent::PlayAdvanced { actor: a, clip, .. } if *a == actor => {
                    Some(clip.clone())
                }
                _ => None,
            })
            .collect()
    }

    pub fn live_props(&self) -> Vec<EntityHandle> {
        self.state.borrow().props.keys().copied().collect()
    }

    pub fn prop_attached_to(&self, entity: EntityHandle) -> Option<ActorHandle> {
        self.state
            .borrow()
            .props
            .get(&entity)
            .and_then(|prop| prop.attached_to)
    }

    pub fn actor_heading(&self, actor: ActorHandle) -> Option<f32> {
        self.state
            .borrow()
            .actors
            .get(&actor)
            .map(|state| state.rotation.z)
    }

    fn record(&self, event: SimEvent) {
        self.state.borrow_mut().events.push(event);
    }
}

impl ActorQuery for SimWorld {
    fn exists(&self, actor: ActorHandle) -> bool {
        self.state.borrow().actors.contains_key(&actor)
    }

    fn position(&self, actor: ActorHandle) -> Option<Vec3> {
        self.state.borrow().actors.get(&actor).map(|a| a.position)
    }

    fn rotation(&self, actor: ActorHandle) -> Option<Vec3> {
        self.state.borrow().actors.get(&actor).map(|a| a.rotation)
    }

    fn health(&self, actor: ActorHandle) -> i32 {
        self.state
            .borrow()
            .actors
            .get(&actor)
            .map(|a| a.health)
            .unwrap_or(0)
    }

    fn is_ragdoll(&self, actor: ActorHandle) -> bool {
        self.state
            .borrow()
            .actors
            .get(&actor)
            .is_some_and(|a| a.ragdoll)
    }

    fn is_dead(&self, actor: ActorHandle) -> bool {
        self.state
            .borrow()
            .actors
            .get(&actor)
            .is_some_and(|a| a.dead)
    }

    fn is_in_vehicle(&self, actor: ActorHandle) -> bool {
        self.state
            .borrow()
            .actors
            .get(&actor)
            .is_some_and(|a| a.in_vehicle)
    }

    fn is_incapacitated(&self, actor: ActorHandle) -> bool {
        self.state
            .borrow()
            .actors
            .get(&actor)
            .is_some_and(|a| a.incapacitated)
    }

    fn is_playing(&self, actor: ActorHandle, anim_set: &str, clip: &str) -> bool {
        self.state
            .borrow()
            .actors
            .get(&actor)
            .and_then(|a| a.playing.as_ref())
            .is_some_and(|playing| playing.anim_set == anim_set && playing.clip == clip)
    }

    fn attachment_of(&self, actor: ActorHandle) -> Option<EntityHandle> {
        self.state
            .borrow()
            .actors
            .get(&actor)
            .and_then(|a| a.attachment)
    }
}

impl AnimationService for SimWorld {
    fn is_set_loaded(&self, anim_set: &str) -> bool {
        self.state.borrow().loaded_sets.contains(anim_set)
    }

    fn request_set(&self, anim_set: &str) {
        let mut state = self.state.borrow_mut();
        let remaining = state.set_delays.get(anim_set).copied().unwrap_or(0);
        if remaining > 1 {
            state.set_delays.insert(anim_set.to_string(), remaining - 1);
            return;
        }
        if remaining == 1 || !state.set_delays.contains_key(anim_set) {
            state.set_delays.remove(anim_set);
            state.loaded_sets.insert(anim_set.to_string());
        }
    }

    fn play_advanced(
        &self,
        actor: ActorHandle,
        playback: &AdvancedPlayback,
    ) -> Result<(), HostError> {
        {
            let mut state = self.state.borrow_mut();
            state.check("play_advanced")?;
            let target = state.actor_mut(actor)?;
            target.position = playback.position;
            target.rotation = playback.rotation;
            state.start_clip(actor, &playback.anim_set, &playback.clip, playback.start_time);
        }
        self.record(SimEvent::PlayAdvanced {
            actor,
            anim_set: playback.anim_set.clone(),
            clip: playback.clip.clone(),
            start_time: playback.start_time,
            heading: playback.rotation.z,
        });
        Ok(())
    }

    fn play(&self, actor: ActorHandle, playback: &SimplePlayback) -> Result<(), HostError> {
        {
            let mut state = self.state.borrow_mut();
            state.check("play")?;
            state.actor_mut(actor)?;
            state.start_clip(actor, &playback.anim_set, &playback.clip, 0.0);
        }
        self.record(SimEvent::Play {
            actor,
            anim_set: playback.anim_set.clone(),
            clip: playback.clip.clone(),
        });
        Ok(())
    }

    fn elapsed(&self, actor: ActorHandle, anim_set: &str, clip: &str) -> Result<f32, HostError> {
        let mut state = self.state.borrow_mut();
        state.check("elapsed")?;
        if let Some(readings) = state.scripted_elapsed.get_mut(&(actor, clip.to_string())) {
            let reading = if readings.len() > 1 {
                readings.pop_front()
            } else {
                readings.front().copied()
            };
            return Ok(reading.unwrap_or(0.0));
        }
        Ok(state.clock_elapsed(actor, anim_set, clip))
    }

    fn go_straight_to(&self, actor: ActorHandle, command: &ApproachCommand) -> Result<(), HostError> {
        {
            let mut state = self.state.borrow_mut();
            state.check("go_straight_to")?;
            let drift = state.approach_heading_drift;
            let target = state.actor_mut(actor)?;
            target.position = command.target;
            target.rotation.z = command.heading + drift;
        }
        self.record(SimEvent::Approach {
            actor,
            target: command.target.to_array(),
            heading: command.heading,
            accel_radius: command.accel_radius,
        });
        Ok(())
    }

    fn set_heading(&self, actor: ActorHandle, heading: f32) -> Result<(), HostError> {
        {
            let mut state = self.state.borrow_mut();
            state.check("set_heading")?;
            state.actor_mut(actor)?.rotation.z = heading;
        }
        self.record(SimEvent::Heading { actor, heading });
        Ok(())
    }

    fn clear_tasks(&self, actor: ActorHandle) {
        if let Some(state) = self.state.borrow_mut().actors.get_mut(&actor) {
            state.playing = None;
        }
        self.record(SimEvent::ClearTasks {
            actor,
            immediate: false,
        });
    }

    fn clear_tasks_immediately(&self, actor: ActorHandle) {
        if let Some(state) = self.state.borrow_mut().actors.get_mut(&actor) {
            state.playing = None;
        }
        self.record(SimEvent::ClearTasks {
            actor,
            immediate: true,
        });
    }
}

impl EntityService for SimWorld {
    fn request_model(&self, model: &str) {
        let mut state = self.state.borrow_mut();
        let status = if state.invalid_models.contains(model) {
            ModelStatus::Invalid
        } else {
            ModelStatus::Loaded
        };
        state.models.insert(model.to_string(), status);
    }

    fn model_status(&self, model: &str) -> ModelStatus {
        let state = self.state.borrow();
        if state.invalid_models.contains(model) {
            return ModelStatus::Invalid;
        }
        state
            .models
            .get(model)
            .copied()
            .unwrap_or(ModelStatus::Loading)
    }

    fn mark_model_unneeded(&self, model: &str) {
        self.state.borrow_mut().models.remove(model);
    }

    fn bone_position(&self, actor: ActorHandle, _bone: Bone, offset: Vec3) -> Option<Vec3> {
        self.state
            .borrow()
            .actors
            .get(&actor)
            .map(|a| a.position + Vec3::new(0.0, 0.0, HAND_HEIGHT) + offset)
    }

    fn spawn_prop(
        &self,
        model: &str,
        position: Vec3,
        _networked: bool,
        _dynamic: bool,
    ) -> Result<EntityHandle, HostError> {
        self.state.borrow().check("spawn_prop")?;
        let handle = self.spawn_loose_prop(model, position);
        self.record(SimEvent::Spawn {
            entity: handle,
            model: model.to_string(),
        });
        Ok(handle)
    }

    fn entity_exists(&self, entity: EntityHandle) -> bool {
        self.state.borrow().props.contains_key(&entity)
    }

    fn attached_to(&self, entity: EntityHandle) -> Option<ActorHandle> {
        self.state
            .borrow()
            .props
            .get(&entity)
            .and_then(|prop| prop.attached_to)
    }

    fn attach(
        &self,
        entity: EntityHandle,
        actor: ActorHandle,
        spec: &AttachSpec,
    ) -> Result<(), HostError> {
        {
            let mut state = self.state.borrow_mut();
            state.check("attach")?;
            state.actor_mut(actor)?.attachment = Some(entity);
            let prop = state
                .props
                .get_mut(&entity)
                .ok_or(HostError::EntityMissing(entity))?;
            prop.attached_to = Some(actor);
        }
        self.record(SimEvent::Attach {
            entity,
            actor,
            bone: spec.bone.id(),
        });
        Ok(())
    }

    fn detach(&self, entity: EntityHandle) -> Result<(), HostError> {
        {
            let mut state = self.state.borrow_mut();
            let prop = state
                .props
                .get_mut(&entity)
                .ok_or(HostError::EntityMissing(entity))?;
            let owner = prop.attached_to.take();
            if let Some(owner) = owner {
                if let Some(actor) = state.actors.get_mut(&owner) {
                    if actor.attachment == Some(entity) {
                        actor.attachment = None;
                    }
                }
            }
        }
        self.record(SimEvent::Detach { entity });
        Ok(())
    }

    fn set_position(&self, entity: EntityHandle, position: Vec3) -> Result<(), HostError> {
        let mut state = self.state.borrow_mut();
        let prop = state
            .props
            .get_mut(&entity)
            .ok_or(HostError::EntityMissing(entity))?;
        prop.position = position;
        Ok(())
    }

    fn set_persistent(&self, entity: EntityHandle, persistent: bool) -> Result<(), HostError> {
        let mut state = self.state.borrow_mut();
        let prop = state
            .props
            .get_mut(&entity)
            .ok_or(HostError::EntityMissing(entity))?;
        prop.persistent = persistent;
        Ok(())
    }

    fn mark_unneeded(&self, entity: EntityHandle) -> Result<(), HostError> {
        if self.entity_exists(entity) {
            Ok(())
        } else {
            Err(HostError::EntityMissing(entity))
        }
    }

    fn delete(&self, entity: EntityHandle) -> Result<(), HostError> {
        {
            let mut state = self.state.borrow_mut();
            state.check("delete")?;
            let prop = state
                .props
                .remove(&entity)
                .ok_or(HostError::EntityMissing(entity))?;
            if let Some(owner) = prop.attached_to {
                if let Some(actor) = state.actors.get_mut(&owner) {
                    if actor.attachment == Some(entity) {
                        actor.attachment = None;
                    }
                }
            }
        }
        self.record(SimEvent::Delete { entity });
        Ok(())
    }

    fn find_props_near(&self, model: &str, center: Vec3, radius: f32) -> Vec<EntityHandle> {
        let state = self.state.borrow();
        let mut hits: Vec<(f32, EntityHandle)> = state
            .props
            .iter()
            .filter(|(_, prop)| prop.model == model)
            .map(|(handle, prop)| (prop.position.distance(center), *handle))
            .filter(|(distance, _)| *distance <= radius)
            .collect();
        hits.sort_by(|a, b| a.0.total_cmp(&b.0));
        hits.into_iter().map(|(_, handle)| handle).collect()
    }
}

impl ControlState for SimWorld {
    fn movement_held(&self) -> bool {
        self.state.borrow().movement_held
    }

    fn enable_weapon_wheel(&self, enabled: bool) {
        self.record(SimEvent::WeaponWheel { enabled });
    }
}
