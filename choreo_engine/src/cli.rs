use std::path::PathBuf;

use anyhow::{bail, Result};
use choreo_engine::profile::FRISK_STEPS;
use choreo_engine::scheduler::DemoScene;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    about = "Runs cuff, frisk and uncuff scenes against the in-memory simulation",
    version
)]
pub struct Args {
    /// Scene to stage; repeat to queue several (default: all)
    #[arg(long = "scene", value_enum)]
    pub scenes: Vec<DemoScene>,

    /// Optional JSON engine config (sounds, prop model, poll intervals)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Path to write scene outcomes, sound broadcasts and host commands as JSON
    #[arg(long)]
    pub event_log_json: Option<PathBuf>,

    /// Press a movement key when this frisk step (1-based) starts
    #[arg(long, value_name = "STEP")]
    pub interrupt_frisk_step: Option<usize>,

    /// Bind address for the ChoreoStream broadcaster (e.g. 127.0.0.1:17400)
    #[arg(long)]
    pub stream_bind: Option<String>,
}

#[derive(Debug)]
pub struct DemoArgs {
    pub scenes: Vec<DemoScene>,
    pub config: Option<PathBuf>,
    pub event_log_json: Option<PathBuf>,
    /// Zero-based index into the frisk steps.
    pub interrupt_frisk_step: Option<usize>,
    pub stream_bind: Option<String>,
}

pub fn parse() -> Result<DemoArgs> {
    let args = Args::parse();
    args.into_demo_args()
}

impl Args {
    fn into_demo_args(self) -> Result<DemoArgs> {
        let interrupt_frisk_step = match self.interrupt_frisk_step {
            Some(step) if step == 0 || step > FRISK_STEPS.len() => {
                bail!(
                    "--interrupt-frisk-step must be between 1 and {}",
                    FRISK_STEPS.len()
                );
            }
            Some(step) => Some(step - 1),
            None => None,
        };

        let scenes = if self.scenes.is_empty() {
            vec![DemoScene::All]
        } else {
            self.scenes
        };

        if interrupt_frisk_step.is_some()
            && !scenes
                .iter()
                .any(|scene| matches!(scene, DemoScene::Frisk | DemoScene::All))
        {
            bail!("--interrupt-frisk-step requires a frisk scene");
        }

        Ok(DemoArgs {
            scenes,
            config: self.config,
            event_log_json: self.event_log_json,
            interrupt_frisk_step,
            stream_bind: self.stream_bind,
        })
    }
}
