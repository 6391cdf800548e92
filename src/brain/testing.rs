//! Scripted [`Inference`] double for brain and supervisor tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use super::Inference;

pub struct ScriptedInference {
    /// Popped once per call; the last entry repeats.
    replies: Mutex<VecDeque<Result<String, String>>>,
    prompts: Mutex<Vec<(String, String)>>,
}

impl ScriptedInference {
    pub fn replying(replies: &[Result<&str, &str>]) -> Self {
        Self {
            replies: Mutex::new(
                replies
                    .iter()
                    .map(|r| r.map(str::to_string).map_err(str::to_string))
                    .collect(),
            ),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Every `(system, user)` pair received so far.
    pub fn prompts(&self) -> Vec<(String, String)> {
        self.prompts.lock().unwrap().clone()
    }
}

/// A complete reply carrying `direction` with fixed levels.
pub fn reply(direction: &str) -> String {
    format!(
        r#"{{"direction":"{direction}","rationale":"scripted","stop_loss":60000,"take_profit":70000,"confidence":"HIGH"}}"#
    )
}

#[async_trait]
impl Inference for ScriptedInference {
    async fn complete(&self, system: &str, user: &str) -> anyhow::Result<String> {
        self.prompts.lock().unwrap().push((system.to_string(), user.to_string()));

        let mut queue = self.replies.lock().unwrap();
        let next = if queue.len() > 1 { queue.pop_front() } else { queue.front().cloned() };
        match next {
            Some(Ok(text)) => Ok(text),
            Some(Err(msg)) => Err(anyhow::anyhow!(msg)),
            None => Err(anyhow::anyhow!("no scripted reply")),
        }
    }
}
