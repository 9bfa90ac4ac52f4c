use composer_ipc::{DisplayBrightness, DisplayCommand, DisplayId};
use tracing::debug;

use super::{CommandContext, ComposerCommandEngine, PresentState};
use crate::hal::ComposerHal;
use crate::resources::ComposerResources;

impl<H, R> ComposerCommandEngine<H, R>
where
    H: ComposerHal,
    R: ComposerResources,
{
    /// Layers first, then display fields in a fixed order. Validate, present and
    /// present-or-validate are not assumed to be exclusive; whichever are set run.
    pub(super) fn dispatch_display_command(&mut self, cx: &mut CommandContext<'_>, command: &DisplayCommand) {
        let display_id = command.display;
        debug!(
            "Command {}: display {} with {} layer command(s)",
            cx.index,
            display_id,
            command.layers.len()
        );

        let mut touched = 0;
        for layer_command in &command.layers {
            touched += self.dispatch_layer_command(cx, display_id, layer_command);
        }

        if let Some(matrix) = &command.color_transform_matrix {
            self.execute_set_color_transform(cx, display_id, matrix);
            touched += 1;
        }
        if let Some(target) = &command.client_target {
            self.execute_set_client_target(cx, display_id, target);
            touched += 1;
        }
        if let Some(buffer) = &command.virtual_display_output_buffer {
            self.execute_set_output_buffer(cx, display_id, buffer);
            touched += 1;
        }
        if let Some(brightness) = &command.brightness {
            self.execute_set_display_brightness(cx, display_id, brightness);
            touched += 1;
        }
        if touched > 0 {
            self.set_state(display_id, PresentState::Unvalidated);
        }

        if command.validate_display {
            self.execute_validate_display(cx, display_id, command.expected_present_time);
        }
        if command.accept_display_changes {
            self.execute_accept_display_changes(cx, display_id);
        }
        if command.present_display {
            self.execute_present_display(cx, display_id);
        }
        if command.present_or_validate_display {
            self.execute_present_or_validate_display(cx, display_id, command.expected_present_time);
        }
    }

    fn execute_set_color_transform(&mut self, cx: &mut CommandContext<'_>, display: DisplayId, matrix: &[f32]) {
        let result = self.hal.set_color_transform(display, matrix);
        cx.record("set_color_transform", result);
    }

    fn execute_set_display_brightness(
        &mut self,
        cx: &mut CommandContext<'_>,
        display: DisplayId,
        brightness: &DisplayBrightness,
    ) {
        let result = self.hal.set_display_brightness(display, brightness.brightness);
        cx.record("set_display_brightness", result);
    }
}
