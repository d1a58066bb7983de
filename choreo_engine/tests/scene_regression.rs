use std::rc::Rc;

use choreo_engine::geometry::Stance;
use choreo_engine::host::{ActorHandle, SceneHost};
use choreo_engine::sim::{SimAction, SimEvent, SimWorld};
use choreo_engine::sound_bridge::RecordingSoundBroadcaster;
use choreo_engine::{ChoreographyEngine, CuffState, EngineConfig, SceneOutcome};
use glam::Vec3;

const SUBJECT_AT: Vec3 = Vec3::new(10.0, 20.0, 1.0);

struct Scene {
    world: SimWorld,
    sounds: RecordingSoundBroadcaster,
    officer: ActorHandle,
    subject: ActorHandle,
}

impl Scene {
    fn officer_behind_subject() -> Self {
        let world = SimWorld::new();
        let officer = world.spawn_actor(SUBJECT_AT + Vec3::new(0.0, -1.0, 0.0), 0.0);
        let subject = world.spawn_actor(SUBJECT_AT, 0.0);
        Scene {
            world,
            sounds: RecordingSoundBroadcaster::new(),
            officer,
            subject,
        }
    }

    fn host_for(&self, player: ActorHandle) -> SceneHost {
        self.world.host(player, Rc::new(self.sounds.clone()))
    }

    fn engine_for(&self, player: ActorHandle) -> ChoreographyEngine {
        ChoreographyEngine::new(self.host_for(player), EngineConfig::default())
    }
}

fn advanced_plays(world: &SimWorld, actor: ActorHandle) -> Vec<(String, f32, f32)> {
    world
        .events()
        .into_iter()
        .filter_map(|event| match event {
            SimEvent::PlayAdvanced {
                actor: a,
                clip,
                start_time,
                heading,
                ..
            } if a == actor => Some((clip, start_time, heading)),
            _ => None,
        })
        .collect()
}

#[tokio::test(start_paused = true)]
async fn back_stance_cuff_places_both_actors_and_restrains_once() {
    let scene = Scene::officer_behind_subject();
    let engine = scene.engine_for(scene.officer);

    let request = engine.plan_cuff_request(scene.subject).expect("plan");
    assert_eq!(request.stance, Stance::Back);

    let outcome = engine.play_local_cuff_scene(scene.subject).await;
    assert_eq!(outcome, SceneOutcome::Completed);

    let approach = scene
        .world
        .events()
        .into_iter()
        .find_map(|event| match event {
            SimEvent::Approach {
                actor,
                target,
                heading,
                accel_radius,
            } if actor == scene.officer => Some((target, heading, accel_radius)),
            _ => None,
        })
        .expect("officer approached");
    let expected_x = SUBJECT_AT.x + 0.5385 * 68.202_97f32.to_radians().sin();
    let expected_y = SUBJECT_AT.y + 0.5385 * (-21.802f32).to_radians().sin();
    assert!((approach.0[0] - expected_x).abs() < 1e-4);
    assert!((approach.0[1] - expected_y).abs() < 1e-4);
    assert_eq!(approach.0[2], SUBJECT_AT.z);
    assert_eq!(approach.1, 53.0);
    assert_eq!(approach.2, 6.0);

    assert_eq!(
        advanced_plays(&scene.world, scene.officer),
        vec![("poppy_arrest_cop".to_string(), 0.6, 53.0)]
    );
    assert_eq!(
        advanced_plays(&scene.world, scene.subject),
        vec![("poppy_arrest_popm".to_string(), 0.6, -38.8)]
    );

    assert_eq!(scene.world.attach_count(), 1);
    let props = scene.world.live_props();
    assert_eq!(props.len(), 1);
    assert_eq!(scene.world.prop_attached_to(props[0]), Some(scene.subject));

    let sounds = scene.sounds.events();
    assert_eq!(sounds.len(), 1);
    assert_eq!(sounds[0].sound, "handcuffsPutOn");
    assert_eq!(sounds[0].distance_threshold, 0.2);

    assert_eq!(
        engine.restraints().cuff_state(scene.subject),
        CuffState::Cuffed
    );
    assert_eq!(
        scene.world.played_clips(scene.subject).last().map(String::as_str),
        Some("idle")
    );
    assert_eq!(scene.world.clear_count(scene.officer), 1);
}

#[tokio::test(start_paused = true)]
async fn relayed_scene_runs_alongside_the_officer() {
    let scene = Scene::officer_behind_subject();
    let officer_engine = scene.engine_for(scene.officer);
    let subject_engine = scene.engine_for(scene.subject);
    subject_engine
        .restraints()
        .set_cuff_state(scene.subject, CuffState::Cuffed);

    let request = officer_engine.plan_cuff_request(scene.subject).expect("plan");
    let relay = request.to_relay();

    let (officer_outcome, subject_outcome) = tokio::join!(
        officer_engine.play_cuff_scene(&request),
        subject_engine.play_relayed_cuff_scene(&relay)
    );

    assert_eq!(officer_outcome, SceneOutcome::Completed);
    assert_eq!(subject_outcome, SceneOutcome::Completed);
    // Officer plays the sound; the subject's client attaches its own cuffs.
    assert_eq!(scene.sounds.events().len(), 1);
    assert_eq!(scene.world.attach_count(), 1);
    let prop = subject_engine
        .restraints()
        .tracked_prop(scene.subject)
        .expect("subject tracks its cuffs");
    assert_eq!(scene.world.prop_attached_to(prop), Some(scene.subject));

    assert_eq!(subject_engine.release_restraint_prop(), Some(prop));
    assert!(scene.world.live_props().is_empty());
    assert_eq!(subject_engine.release_restraint_prop(), None);
}

#[tokio::test(start_paused = true)]
async fn frisk_interrupted_at_third_step_skips_the_rest() {
    let scene = Scene::officer_behind_subject();
    scene
        .world
        .on_clip_start("missfam5_yoga", "start_pose", SimAction::HoldMovement);
    let engine = scene.engine_for(scene.officer);

    let outcome = engine.play_frisk_scene(scene.subject).await;

    match outcome {
        SceneOutcome::Aborted(reason) => assert!(reason.starts_with("step 3 of 7")),
        other => panic!("expected an aborted frisk, got {other:?}"),
    }
    let played = scene.world.played_clips(scene.officer);
    assert_eq!(played.len(), 3);
    assert!(!played.iter().any(|clip| clip.starts_with("boot_")));
    assert_eq!(scene.world.clear_count(scene.officer), 1);
}

#[tokio::test(start_paused = true)]
async fn frisk_survives_healing_but_not_damage() {
    let scene = Scene::officer_behind_subject();
    scene.world.set_health(scene.officer, 100);
    scene
        .world
        .on_clip_start("anim@heists@box_carry@", "idle", SimAction::SetHealth(150));
    scene
        .world
        .on_clip_start("missfam5_yoga", "start_pose", SimAction::SetHealth(140));
    let engine = scene.engine_for(scene.officer);

    let outcome = engine.play_frisk_scene(scene.subject).await;

    match outcome {
        SceneOutcome::Aborted(reason) => {
            assert!(reason.contains("health dropped to 140 (baseline 150)"), "{reason}")
        }
        other => panic!("expected an aborted frisk, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn full_cycle_cuff_frisk_uncuff() {
    let scene = Scene::officer_behind_subject();
    let engine = scene.engine_for(scene.officer);

    assert!(engine.play_local_cuff_scene(scene.subject).await.is_completed());
    assert!(engine.play_frisk_scene(scene.subject).await.is_completed());
    assert!(engine.play_local_uncuff_scene(scene.subject).await.is_completed());

    assert_eq!(
        engine.restraints().cuff_state(scene.subject),
        CuffState::Uncuffed
    );
    assert!(scene.world.live_props().is_empty());
    let sounds: Vec<String> = scene.sounds.events().into_iter().map(|e| e.sound).collect();
    assert_eq!(sounds, vec!["handcuffsPutOn", "handcuffsTakenOff"]);
}
