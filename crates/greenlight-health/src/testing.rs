//! Scripted health monitor for tests.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use greenlight_core::{BoxFuture, Environment, HealthVerdict};

use crate::monitor::HealthMonitor;

/// One scripted answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scripted {
    Verdict(HealthVerdict),
    /// Never answer.
    Stall,
}

#[derive(Default)]
struct Script {
    queue: VecDeque<Scripted>,
    calls: u32,
}

/// Monitor that replays queued answers per environment, then falls back
/// to a default verdict.
pub struct ScriptedMonitor {
    default: Mutex<HealthVerdict>,
    blue: Mutex<Script>,
    green: Mutex<Script>,
}

impl ScriptedMonitor {
    pub fn new(default: HealthVerdict) -> Self {
        Self {
            default: Mutex::new(default),
            blue: Mutex::new(Script::default()),
            green: Mutex::new(Script::default()),
        }
    }

    fn script(&self, env: Environment) -> MutexGuard<'_, Script> {
        let slot = match env {
            Environment::Blue => &self.blue,
            Environment::Green => &self.green,
        };
        slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn default_verdict(&self) -> HealthVerdict {
        *self.default.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queue an answer for `env`.
    pub fn push(&self, env: Environment, answer: Scripted) {
        self.script(env).queue.push_back(answer);
    }

    /// Queue `count` copies of `verdict` for `env`.
    pub fn push_n(&self, env: Environment, verdict: HealthVerdict, count: usize) {
        let mut script = self.script(env);
        for _ in 0..count {
            script.queue.push_back(Scripted::Verdict(verdict));
        }
    }

    /// Change the verdict used once the queue is drained.
    pub fn set_default(&self, verdict: HealthVerdict) {
        *self.default.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = verdict;
    }

    /// Number of checks made against `env`.
    pub fn calls(&self, env: Environment) -> u32 {
        self.script(env).calls
    }
}

impl HealthMonitor for ScriptedMonitor {
    fn check_health(&self, env: Environment) -> BoxFuture<'_, HealthVerdict> {
        let answer = {
            let mut script = self.script(env);
            script.calls += 1;
            script.queue.pop_front()
        };
        let default = self.default_verdict();
        Box::pin(async move {
            match answer {
                Some(Scripted::Verdict(verdict)) => verdict,
                Some(Scripted::Stall) => std::future::pending().await,
                None => default,
            }
        })
    }
}
