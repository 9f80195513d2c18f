//! Stage specifications and the executor seam.
//!
//! The pipeline topology never varies, so it is written down once as
//! [`PIPELINE`]: four specs in execution order, each naming the artifacts it
//! consumes and the artifacts it must produce.

use greenlight_core::{Artifact, BoxFuture, RunId, SourceTrigger, StageName};

use crate::error::StageFailure;

pub const SOURCE_ARTIFACT: &str = "SourceArtifact";
pub const BUILD_ARTIFACT: &str = "BuildArtifact";

/// Declared inputs and outputs of one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageSpec {
    pub name: StageName,
    pub inputs: &'static [&'static str],
    pub outputs: &'static [&'static str],
}

/// Source → Test → Build → Deploy.
pub const PIPELINE: [StageSpec; 4] = [
    StageSpec {
        name: StageName::Source,
        inputs: &[],
        outputs: &[SOURCE_ARTIFACT],
    },
    StageSpec {
        name: StageName::Test,
        inputs: &[SOURCE_ARTIFACT],
        outputs: &[],
    },
    StageSpec {
        name: StageName::Build,
        inputs: &[SOURCE_ARTIFACT],
        outputs: &[BUILD_ARTIFACT],
    },
    StageSpec {
        name: StageName::Deploy,
        inputs: &[BUILD_ARTIFACT],
        outputs: &[],
    },
];

impl StageSpec {
    /// Pick this stage's inputs out of everything earlier stages produced.
    pub fn select_inputs(&self, produced: &[Artifact]) -> Result<Vec<Artifact>, StageFailure> {
        self.inputs
            .iter()
            .map(|name| {
                produced
                    .iter()
                    .rev()
                    .find(|a| a.name == *name)
                    .cloned()
                    .ok_or_else(|| {
                        StageFailure::Artifact(format!("{} requires {name}, which no earlier stage produced", self.name))
                    })
            })
            .collect()
    }

    /// A stage succeeds only if every declared output was produced by it.
    pub fn check_outputs(&self, artifacts: &[Artifact]) -> Result<(), StageFailure> {
        for name in self.outputs {
            if !artifacts.iter().any(|a| a.name == *name && a.producer == self.name) {
                return Err(StageFailure::Artifact(format!(
                    "{} did not produce {name}",
                    self.name
                )));
            }
        }
        Ok(())
    }
}

/// What an executor knows about the run it is part of.
#[derive(Debug, Clone)]
pub struct StageContext {
    pub run_id: RunId,
    pub trigger: SourceTrigger,
}

/// Runs one stage. Implementations hold no per-run state; every call is
/// independent.
pub trait StageExecutor: Send + Sync {
    fn execute<'a>(
        &'a self,
        ctx: &'a StageContext,
        inputs: &'a [Artifact],
    ) -> BoxFuture<'a, Result<Vec<Artifact>, StageFailure>>;
}

/// Find a named input.
pub fn input<'a>(inputs: &'a [Artifact], name: &str) -> Result<&'a Artifact, StageFailure> {
    inputs
        .iter()
        .find(|a| a.name == name)
        .ok_or_else(|| StageFailure::Artifact(format!("missing input {name}")))
}
