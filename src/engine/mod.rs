//! Command Engine
//!
//! Executes one batch of display commands against a [`ComposerHal`]:
//!
//! - `display` sequences per-display work and layer dispatch
//! - `layer` applies the populated fields of a layer command
//! - `buffer` resolves buffer descriptors through the resource cache
//! - `present` implements validate / accept / present and present-or-validate
//!
//! Failures never abort a batch. Each one is recorded against the index of the
//! display command that caused it and the engine moves on.

mod buffer;
mod display;
mod layer;
mod present;

#[cfg(test)]
mod tests;

use std::collections::HashMap;

use composer_ipc::{CommandResult, DisplayCommand, DisplayId, LayerId};
use tracing::{debug, error, info, warn};

use crate::hal::{ComposerHal, HwcError, HwcResult};
use crate::resources::{ComposerResources, ResourceError};
use crate::writer::ComposerServiceWriter;

/// Where a display stands in the present/validate protocol
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PresentState {
    /// Properties changed since the last validate or present
    #[default]
    Unvalidated,
    Validated,
    Presented,
    /// The last validate or present attempt failed
    Failed,
}

/// Batch-scoped state threaded through dispatch
pub(crate) struct CommandContext<'a> {
    index: u32,
    display: DisplayId,
    writer: &'a mut ComposerServiceWriter,
}

impl<'a> CommandContext<'a> {
    fn new(index: u32, display: DisplayId, writer: &'a mut ComposerServiceWriter) -> Self {
        Self {
            index,
            display,
            writer,
        }
    }

    /// Record `result` against the current command if it failed
    fn record(&mut self, op: &str, result: HwcResult) {
        if let Err(err) = result {
            self.fail(op, err);
        }
    }

    fn fail(&mut self, op: &str, err: HwcError) {
        error!(
            "{} failed on display {} (command {}): {}",
            op, self.display, self.index, err
        );
        self.writer.set_error(self.index, self.display, err);
    }

    fn fail_resolve(&mut self, op: &str, err: ResourceError) {
        error!(
            "{} could not resolve buffer on display {} (command {}): {}",
            op, self.display, self.index, err
        );
        self.writer.set_error(self.index, self.display, err.into());
    }
}

/// Wire index for the command at `position` in a batch
fn command_index(position: usize) -> Option<u32> {
    u32::try_from(position).ok()
}

pub struct ComposerCommandEngine<H, R> {
    hal: H,
    resources: R,
    states: HashMap<DisplayId, PresentState>,
    batches_executed: u64,
}

impl<H, R> ComposerCommandEngine<H, R>
where
    H: ComposerHal,
    R: ComposerResources,
{
    pub fn new(hal: H, resources: R) -> Self {
        Self {
            hal,
            resources,
            states: HashMap::new(),
            batches_executed: 0,
        }
    }

    pub fn hal(&self) -> &H {
        &self.hal
    }

    pub fn hal_mut(&mut self) -> &mut H {
        &mut self.hal
    }

    pub fn resources(&self) -> &R {
        &self.resources
    }

    pub fn resources_mut(&mut self) -> &mut R {
        &mut self.resources
    }

    pub fn batches_executed(&self) -> u64 {
        self.batches_executed
    }

    pub fn present_state(&self, display: DisplayId) -> PresentState {
        self.states.get(&display).copied().unwrap_or_default()
    }

    fn set_state(&mut self, display: DisplayId, state: PresentState) {
        self.states.insert(display, state);
    }

    /// Execute a batch and return the results keyed by command index.
    ///
    /// Indices start at 0 for every batch and follow the order of `commands`.
    pub fn execute(&mut self, commands: &[DisplayCommand]) -> Vec<CommandResult> {
        let mut writer = ComposerServiceWriter::new();

        for (position, command) in commands.iter().enumerate() {
            let Some(index) = command_index(position) else {
                error!(
                    "Batch of {} commands overflows the command index; {} left unexecuted",
                    commands.len(),
                    commands.len() - position
                );
                break;
            };
            let mut cx = CommandContext::new(index, command.display, &mut writer);
            self.dispatch_display_command(&mut cx, command);
        }

        self.batches_executed += 1;
        let results = writer.take_results();
        debug!(
            "Executed batch of {} command(s), {} result(s)",
            commands.len(),
            results.len()
        );
        results
    }

    /// Create a layer in hardware and give it `buffer_slots` cache slots
    pub fn create_layer(&mut self, display_id: DisplayId, buffer_slots: u32) -> HwcResult<LayerId> {
        let layer = self.hal.create_layer(display_id)?;
        if let Err(err) = self.resources.add_layer(display_id, layer, buffer_slots) {
            warn!("Failed to register layer {} on display {}: {}", layer, display_id, err);
            if let Err(destroy_err) = self.hal.destroy_layer(display_id, layer) {
                warn!("Failed to roll back layer {}: {}", layer, destroy_err);
            }
            return Err(err.into());
        }
        debug!("Created layer {} on display {}", layer, display_id);
        Ok(layer)
    }

    pub fn destroy_layer(&mut self, display_id: DisplayId, layer: LayerId) -> HwcResult {
        self.hal.destroy_layer(display_id, layer)?;
        if let Err(err) = self.resources.remove_layer(display_id, layer) {
            warn!("Layer {} had no cached resources: {}", layer, err);
        }
        self.set_state(display_id, PresentState::Unvalidated);
        debug!("Destroyed layer {} on display {}", layer, display_id);
        Ok(())
    }

    /// The display's content or configuration changed outside of a batch.
    /// The next present-or-validate goes through validate.
    pub fn refresh(&mut self, display_id: DisplayId) {
        info!("Refresh requested for display {}", display_id);
        self.resources.set_display_must_validate_state(display_id, true);
        self.set_state(display_id, PresentState::Unvalidated);
    }
}
