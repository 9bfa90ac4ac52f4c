use composer_ipc::{
    BlendMode, Color, Composition, Dataspace, DisplayId, FRect, LayerCommand, LayerId, PerFrameMetadata,
    PerFrameMetadataBlob, Point, Rect, Transform,
};

use super::{CommandContext, ComposerCommandEngine};
use crate::hal::ComposerHal;
use crate::resources::ComposerResources;

/// Run `handler` for every populated field, in the order listed. Evaluates to the
/// number of fields applied.
macro_rules! dispatch_layer_fields {
    ($engine:ident, $cx:ident, $display:expr, $command:expr; $($field:ident => $handler:ident),+ $(,)?) => {{
        let mut applied = 0usize;
        $(
            if let Some(value) = &$command.$field {
                $engine.$handler($cx, $display, $command.layer, value);
                applied += 1;
            }
        )+
        applied
    }};
}

impl<H, R> ComposerCommandEngine<H, R>
where
    H: ComposerHal,
    R: ComposerResources,
{
    /// Apply one layer command. Returns how many fields were applied.
    pub(super) fn dispatch_layer_command(
        &mut self,
        cx: &mut CommandContext<'_>,
        display: DisplayId,
        command: &LayerCommand,
    ) -> usize {
        dispatch_layer_fields!(self, cx, display, command;
            cursor_position => execute_set_layer_cursor_position,
            buffer => execute_set_layer_buffer,
            damage => execute_set_layer_surface_damage,
            blend_mode => execute_set_layer_blend_mode,
            color => execute_set_layer_color,
            composition => execute_set_layer_composition,
            dataspace => execute_set_layer_dataspace,
            display_frame => execute_set_layer_display_frame,
            plane_alpha => execute_set_layer_plane_alpha,
            sideband_stream => execute_set_layer_sideband_stream,
            source_crop => execute_set_layer_source_crop,
            transform => execute_set_layer_transform,
            visible_region => execute_set_layer_visible_region,
            z => execute_set_layer_z_order,
            color_transform => execute_set_layer_color_transform,
            per_frame_metadata => execute_set_layer_per_frame_metadata,
            per_frame_metadata_blob => execute_set_layer_per_frame_metadata_blobs,
        )
    }

    fn execute_set_layer_cursor_position(
        &mut self,
        cx: &mut CommandContext<'_>,
        display: DisplayId,
        layer: LayerId,
        position: &Point,
    ) {
        let result = self.hal.set_layer_cursor_position(display, layer, position.x, position.y);
        cx.record("set_layer_cursor_position", result);
    }

    fn execute_set_layer_surface_damage(
        &mut self,
        cx: &mut CommandContext<'_>,
        display: DisplayId,
        layer: LayerId,
        damage: &[Option<Rect>],
    ) {
        let result = self.hal.set_layer_surface_damage(display, layer, damage);
        cx.record("set_layer_surface_damage", result);
    }

    fn execute_set_layer_blend_mode(
        &mut self,
        cx: &mut CommandContext<'_>,
        display: DisplayId,
        layer: LayerId,
        mode: &BlendMode,
    ) {
        let result = self.hal.set_layer_blend_mode(display, layer, *mode);
        cx.record("set_layer_blend_mode", result);
    }

    fn execute_set_layer_color(&mut self, cx: &mut CommandContext<'_>, display: DisplayId, layer: LayerId, color: &Color) {
        let result = self.hal.set_layer_color(display, layer, *color);
        cx.record("set_layer_color", result);
    }

    fn execute_set_layer_composition(
        &mut self,
        cx: &mut CommandContext<'_>,
        display: DisplayId,
        layer: LayerId,
        composition: &Composition,
    ) {
        let result = self.hal.set_layer_composition_type(display, layer, *composition);
        cx.record("set_layer_composition_type", result);
    }

    fn execute_set_layer_dataspace(
        &mut self,
        cx: &mut CommandContext<'_>,
        display: DisplayId,
        layer: LayerId,
        dataspace: &Dataspace,
    ) {
        let result = self.hal.set_layer_dataspace(display, layer, *dataspace);
        cx.record("set_layer_dataspace", result);
    }

    fn execute_set_layer_display_frame(
        &mut self,
        cx: &mut CommandContext<'_>,
        display: DisplayId,
        layer: LayerId,
        frame: &Rect,
    ) {
        let result = self.hal.set_layer_display_frame(display, layer, *frame);
        cx.record("set_layer_display_frame", result);
    }

    fn execute_set_layer_plane_alpha(&mut self, cx: &mut CommandContext<'_>, display: DisplayId, layer: LayerId, alpha: &f32) {
        let result = self.hal.set_layer_plane_alpha(display, layer, *alpha);
        cx.record("set_layer_plane_alpha", result);
    }

    fn execute_set_layer_source_crop(
        &mut self,
        cx: &mut CommandContext<'_>,
        display: DisplayId,
        layer: LayerId,
        crop: &FRect,
    ) {
        let result = self.hal.set_layer_source_crop(display, layer, *crop);
        cx.record("set_layer_source_crop", result);
    }

    fn execute_set_layer_transform(
        &mut self,
        cx: &mut CommandContext<'_>,
        display: DisplayId,
        layer: LayerId,
        transform: &Transform,
    ) {
        let result = self.hal.set_layer_transform(display, layer, *transform);
        cx.record("set_layer_transform", result);
    }

    fn execute_set_layer_visible_region(
        &mut self,
        cx: &mut CommandContext<'_>,
        display: DisplayId,
        layer: LayerId,
        region: &[Option<Rect>],
    ) {
        let result = self.hal.set_layer_visible_region(display, layer, region);
        cx.record("set_layer_visible_region", result);
    }

    fn execute_set_layer_z_order(&mut self, cx: &mut CommandContext<'_>, display: DisplayId, layer: LayerId, z: &u32) {
        let result = self.hal.set_layer_z_order(display, layer, *z);
        cx.record("set_layer_z_order", result);
    }

    fn execute_set_layer_color_transform(
        &mut self,
        cx: &mut CommandContext<'_>,
        display: DisplayId,
        layer: LayerId,
        matrix: &[f32],
    ) {
        let result = self.hal.set_layer_color_transform(display, layer, matrix);
        cx.record("set_layer_color_transform", result);
    }

    fn execute_set_layer_per_frame_metadata(
        &mut self,
        cx: &mut CommandContext<'_>,
        display: DisplayId,
        layer: LayerId,
        metadata: &[Option<PerFrameMetadata>],
    ) {
        let result = self.hal.set_layer_per_frame_metadata(display, layer, metadata);
        cx.record("set_layer_per_frame_metadata", result);
    }

    fn execute_set_layer_per_frame_metadata_blobs(
        &mut self,
        cx: &mut CommandContext<'_>,
        display: DisplayId,
        layer: LayerId,
        blobs: &[Option<PerFrameMetadataBlob>],
    ) {
        let result = self.hal.set_layer_per_frame_metadata_blobs(display, layer, blobs);
        cx.record("set_layer_per_frame_metadata_blobs", result);
    }
}
