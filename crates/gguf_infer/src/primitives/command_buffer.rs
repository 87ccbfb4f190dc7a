//! A thin recorded-then-submitted command buffer. `candle_core` executes
//! tensor ops eagerly, so "recording" here means labelling each step for
//! introspection and funnelling its failure through one place rather than
//! deferring actual execution; the ordering and failure semantics the
//! engine depends on (serial per queue, abort-on-first-failure) still hold.

use tracing::trace;

use crate::error::{EngineError, ExecutionError};

pub struct CommandBuffer {
    steps_recorded: usize,
}

impl CommandBuffer {
    pub fn new() -> Self {
        CommandBuffer { steps_recorded: 0 }
    }

    /// Records and immediately executes `op`, labelling it `step` for error
    /// reporting. A failure here is what the engine treats as aborting the
    /// whole forward pass.
    pub fn record<T>(
        &mut self,
        step: impl Into<String>,
        op: impl FnOnce() -> candle_core::Result<T>,
    ) -> Result<T, EngineError> {
        let step = step.into();
        trace!(step = %step, "recording command buffer step");
        self.steps_recorded += 1;
        op().map_err(|source| ExecutionError::CommandFailed { step, source }.into())
    }

    pub fn steps_recorded(&self) -> usize {
        self.steps_recorded
    }
}

impl Default for CommandBuffer {
    fn default() -> Self {
        Self::new()
    }
}
