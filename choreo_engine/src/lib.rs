//! Two-actor scene choreography: stand positions, threshold-triggered side
//! effects inside clip playback, interruptible multi-step sequences and the
//! restraint prop lifecycle.

pub mod config;
pub mod error;
pub mod geometry;
pub mod host;
pub mod profile;
pub mod restraint;
pub mod scenes;
pub mod scheduler;
pub mod sequence;
pub mod sim;
pub mod sound_bridge;
pub mod stream;
pub mod timeline;

pub use config::EngineConfig;
pub use error::{SceneError, SceneOutcome};
pub use geometry::{classify_stance, compute_stand_position, Role, Stance, StandPose};
pub use host::{ActorHandle, EntityHandle, HostError, SceneHost};
pub use restraint::{CuffState, RestraintRegistry};
pub use scenes::{ChoreographyEngine, CuffSceneRequest, SubjectPose};
