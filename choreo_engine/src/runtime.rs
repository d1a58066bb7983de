use std::{fs, rc::Rc};

use anyhow::{Context, Result};
use choreo_engine::host::{ActorHandle, SoundBroadcaster};
use choreo_engine::profile::FRISK_STEPS;
use choreo_engine::scheduler::{DemoScene, SceneQueue};
use choreo_engine::sim::{SimAction, SimEvent, SimWorld};
use choreo_engine::sound_bridge::{BroadcastFanout, RecordingSoundBroadcaster, SoundEvent};
use choreo_engine::stream::StreamServer;
use choreo_engine::{ChoreographyEngine, EngineConfig, SceneOutcome};
use glam::Vec3;
use serde::Serialize;
use tokio::time::Instant;

use crate::cli::DemoArgs;

/// The officer starts just behind the subject.
const OFFICER_START: Vec3 = Vec3::new(0.0, -0.6, 0.0);
const SUBJECT_START: Vec3 = Vec3::ZERO;

#[derive(Debug, Serialize)]
struct SceneRecord {
    scene: DemoScene,
    started_ms: u128,
    finished_ms: u128,
    #[serde(flatten)]
    outcome: SceneOutcome,
}

#[derive(Debug, Serialize)]
struct DemoLog<'a> {
    scenes: &'a [SceneRecord],
    sounds: Vec<SoundEvent>,
    host_commands: Vec<SimEvent>,
}

pub fn execute(args: DemoArgs) -> Result<()> {
    let config =
        EngineConfig::from_json_file(args.config.as_deref()).context("loading engine config")?;
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .context("building scene runtime")?;
    runtime.block_on(run_demo(args, config))
}

async fn run_demo(args: DemoArgs, config: EngineConfig) -> Result<()> {
    let DemoArgs {
        scenes,
        config: _,
        event_log_json,
        interrupt_frisk_step,
        stream_bind,
    } = args;

    let world = SimWorld::new();
    let player = world.spawn_actor(OFFICER_START, 0.0);
    let subject = world.spawn_actor(SUBJECT_START, 0.0);

    if let Some(step) = interrupt_frisk_step {
        if let Some(target) = FRISK_STEPS.get(step) {
            log::info!(
                "movement will be held when frisk step {} ({}) starts",
                step + 1,
                target.clip
            );
            world.on_clip_start(target.anim_set, target.clip, SimAction::HoldMovement);
        }
    }

    let stream = match stream_bind.as_deref() {
        Some(addr) => {
            let server = StreamServer::bind(addr, Some(env!("CARGO_PKG_VERSION").to_string()))
                .with_context(|| format!("binding stream server on {addr}"))?;
            log::info!("streaming scene events on {addr}");
            Some(Rc::new(server))
        }
        None => None,
    };

    let recorder = RecordingSoundBroadcaster::new();
    let mut fanout = BroadcastFanout::new().with_sink(Rc::new(recorder.clone()));
    if let Some(server) = stream.as_ref() {
        fanout = fanout.with_sink(server.clone() as Rc<dyn SoundBroadcaster>);
    }

    let engine = ChoreographyEngine::new(world.host(player, Rc::new(fanout)), config);
    let mut queue = SceneQueue::new(scenes);
    log::info!("staging {} scene(s)", queue.len());
    let started = Instant::now();
    let mut records = Vec::new();

    while let Some(scene) = queue.next() {
        let scene_start = started.elapsed().as_millis();
        let outcome = play_scene(&engine, &world, stream.as_deref(), subject, scene).await;
        println!("{:<7} {}", scene.label(), describe(&outcome));

        if let Some(server) = stream.as_ref() {
            if let Err(err) = server.send_mark(scene.label(), "finished", &outcome) {
                log::warn!("scene mark dropped: {err}");
            }
        }
        records.push(SceneRecord {
            scene,
            started_ms: scene_start,
            finished_ms: started.elapsed().as_millis(),
            outcome,
        });
    }

    let sounds = recorder.events();
    let staged: Vec<&str> = queue.history().iter().map(|scene| scene.label()).collect();
    println!(
        "{} scene(s) [{}], {} sound broadcast(s), subject {:?}",
        staged.len(),
        staged.join(", "),
        sounds.len(),
        engine.restraints().cuff_state(subject)
    );

    if let Some(path) = event_log_json.as_ref() {
        let demo_log = DemoLog {
            scenes: &records,
            sounds,
            host_commands: world.events(),
        };
        let json = serde_json::to_string_pretty(&demo_log).context("serializing demo log to JSON")?;
        fs::write(path, json)
            .with_context(|| format!("writing demo log JSON to {}", path.display()))?;
        println!("Saved demo log to {}", path.display());
    }

    Ok(())
}

async fn play_scene(
    engine: &ChoreographyEngine,
    world: &SimWorld,
    stream: Option<&StreamServer>,
    subject: ActorHandle,
    scene: DemoScene,
) -> SceneOutcome {
    match scene {
        DemoScene::Cuff => {
            if let (Some(server), Ok(request)) = (stream, engine.plan_cuff_request(subject)) {
                if let Err(err) = server.send_cuff_scene(&request.to_relay()) {
                    log::warn!("cuff scene relay dropped: {err}");
                }
            }
            engine.play_local_cuff_scene(subject).await
        }
        DemoScene::Frisk => {
            let outcome = engine.play_frisk_scene(subject).await;
            world.hold_movement(false);
            outcome
        }
        DemoScene::Uncuff => engine.play_local_uncuff_scene(subject).await,
        DemoScene::All => SceneOutcome::Skipped("scene groups expand when queued".to_string()),
    }
}

fn describe(outcome: &SceneOutcome) -> String {
    match outcome {
        SceneOutcome::Completed => "completed".to_string(),
        SceneOutcome::Skipped(reason) => format!("skipped: {reason}"),
        SceneOutcome::Aborted(reason) => format!("aborted: {reason}"),
        SceneOutcome::Faulted(message) => format!("faulted: {message}"),
    }
}
