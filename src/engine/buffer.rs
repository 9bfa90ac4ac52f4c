//! Buffer descriptor resolution.
//!
//! Client target, output buffer, layer buffer and sideband stream all go through
//! the same steps: resolve through the cache, hand the result to one hardware call,
//! release whatever the cache displaced once that call has returned.

use composer_ipc::{Buffer, ClientTarget, DisplayId, LayerId, NativeHandle};

use super::{CommandContext, ComposerCommandEngine};
use crate::hal::{ComposerHal, HwcResult};
use crate::resources::{BufferHandle, BufferScope, ComposerResources};

impl<H, R> ComposerCommandEngine<H, R>
where
    H: ComposerHal,
    R: ComposerResources,
{
    /// Resolve `scope` and run `apply` with the resolved handle.
    ///
    /// A resolution failure is recorded and `apply` is skipped. The releaser
    /// lives until `apply` returns, whether or not it succeeded.
    fn apply_resolved<F>(
        &mut self,
        cx: &mut CommandContext<'_>,
        op: &str,
        scope: BufferScope,
        handle: Option<&NativeHandle>,
        apply: F,
    ) where
        F: FnOnce(&mut H, &BufferHandle) -> HwcResult,
    {
        let resolved = match self.resources.resolve(scope, handle) {
            Ok(resolved) => resolved,
            Err(err) => {
                cx.fail_resolve(op, err);
                return;
            }
        };
        let result = apply(&mut self.hal, &resolved.handle);
        cx.record(op, result);
    }

    pub(super) fn execute_set_client_target(
        &mut self,
        cx: &mut CommandContext<'_>,
        display: DisplayId,
        target: &ClientTarget,
    ) {
        let scope = BufferScope::ClientTarget {
            display,
            slot: target.buffer.slot,
        };
        self.apply_resolved(cx, "set_client_target", scope, target.buffer.handle.as_ref(), |hal, handle| {
            hal.set_client_target(display, handle, target.buffer.fence, target.dataspace, &target.damage)
        });
    }

    pub(super) fn execute_set_output_buffer(
        &mut self,
        cx: &mut CommandContext<'_>,
        display: DisplayId,
        buffer: &Buffer,
    ) {
        let scope = BufferScope::OutputBuffer {
            display,
            slot: buffer.slot,
        };
        self.apply_resolved(cx, "set_output_buffer", scope, buffer.handle.as_ref(), |hal, handle| {
            hal.set_output_buffer(display, handle, buffer.fence)
        });
    }

    pub(super) fn execute_set_layer_buffer(
        &mut self,
        cx: &mut CommandContext<'_>,
        display: DisplayId,
        layer: LayerId,
        buffer: &Buffer,
    ) {
        let scope = BufferScope::LayerBuffer {
            display,
            layer,
            slot: buffer.slot,
        };
        self.apply_resolved(cx, "set_layer_buffer", scope, buffer.handle.as_ref(), |hal, handle| {
            hal.set_layer_buffer(display, layer, handle, buffer.fence)
        });
    }

    /// Sideband streams have no slot; the stream is issued only once the cache
    /// has adopted it.
    pub(super) fn execute_set_layer_sideband_stream(
        &mut self,
        cx: &mut CommandContext<'_>,
        display: DisplayId,
        layer: LayerId,
        stream: &NativeHandle,
    ) {
        let scope = BufferScope::SidebandStream { display, layer };
        self.apply_resolved(cx, "set_layer_sideband_stream", scope, Some(stream), |hal, handle| {
            hal.set_layer_sideband_stream(display, layer, handle)
        });
    }
}
