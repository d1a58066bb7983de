use std::collections::VecDeque;

use clap::ValueEnum;
use serde::Serialize;

/// Scene kinds the demo runtime knows how to stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum DemoScene {
    Cuff,
    Uncuff,
    Frisk,
    /// Expands to cuff, frisk, uncuff.
    All,
}

impl DemoScene {
    fn expand(self) -> Vec<DemoScene> {
        match self {
            DemoScene::All => vec![DemoScene::Cuff, DemoScene::Frisk, DemoScene::Uncuff],
            scene => vec![scene],
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            DemoScene::Cuff => "cuff",
            DemoScene::Uncuff => "uncuff",
            DemoScene::Frisk => "frisk",
            DemoScene::All => "all",
        }
    }
}

/// Requested demo scenes in execution order.
#[derive(Debug, Clone, Serialize)]
pub struct SceneQueue {
    pending: VecDeque<DemoScene>,
    history: Vec<DemoScene>,
}

impl SceneQueue {
    pub fn new<S>(scenes: S) -> Self
    where
        S: IntoIterator<Item = DemoScene>,
    {
        let pending: VecDeque<DemoScene> = scenes.into_iter().flat_map(DemoScene::expand).collect();
        SceneQueue {
            pending,
            history: Vec::new(),
        }
    }

    pub fn next(&mut self) -> Option<DemoScene> {
        let scene = self.pending.pop_front()?;
        self.history.push(scene);
        Some(scene)
    }

    /// Scenes not yet handed out.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn history(&self) -> &[DemoScene] {
        &self.history
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_preserves_order_and_history() {
        let mut queue = SceneQueue::new([DemoScene::Frisk, DemoScene::Cuff]);
        assert_eq!(queue.len(), 2);

        assert_eq!(queue.next(), Some(DemoScene::Frisk));
        assert_eq!(queue.next(), Some(DemoScene::Cuff));
        assert_eq!(queue.len(), 0);
        assert_eq!(queue.next(), None);
        assert_eq!(queue.history(), &[DemoScene::Frisk, DemoScene::Cuff]);
    }

    #[test]
    fn all_expands_in_story_order() {
        let queue = SceneQueue::new([DemoScene::All]);
        assert_eq!(queue.len(), 3);
        let mut queue = queue;
        assert_eq!(queue.next(), Some(DemoScene::Cuff));
        assert_eq!(queue.next(), Some(DemoScene::Frisk));
        assert_eq!(queue.next(), Some(DemoScene::Uncuff));
    }
}
