//! Result accumulator for one batch execution.
//!
//! Everything is keyed by command index so the client can match outcomes back to
//! the commands it sent. Entries come out ordered by index no matter the order
//! they were recorded in.

use std::collections::BTreeMap;

use composer_ipc::{
    ChangedCompositionLayer, ClientTargetProperty, CommandResult, DisplayId, DisplayRequest, Fence,
    PresentOrValidateResult, ReleaseFence,
};

use crate::hal::HwcError;

#[derive(Debug, Default)]
pub struct ComposerServiceWriter {
    pending: BTreeMap<u32, CommandResult>,
}

impl ComposerServiceWriter {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&mut self, index: u32, display: DisplayId) -> &mut CommandResult {
        self.pending
            .entry(index)
            .or_insert_with(|| CommandResult::new(index, display))
    }

    pub fn set_error(&mut self, index: u32, display: DisplayId, err: HwcError) {
        self.entry(index, display).errors.push(err.code());
    }

    pub fn set_changed_composition_types(
        &mut self,
        index: u32,
        display: DisplayId,
        changes: Vec<ChangedCompositionLayer>,
    ) {
        self.entry(index, display).changed_composition_types = Some(changes);
    }

    pub fn set_display_requests(&mut self, index: u32, display: DisplayId, request: DisplayRequest) {
        self.entry(index, display).display_request = Some(request);
    }

    pub fn set_client_target_property(
        &mut self,
        index: u32,
        display: DisplayId,
        property: ClientTargetProperty,
    ) {
        self.entry(index, display).client_target_property = Some(property);
    }

    pub fn set_present_fence(&mut self, index: u32, display: DisplayId, fence: Fence) {
        self.entry(index, display).present_fence = Some(fence);
    }

    pub fn set_release_fences(&mut self, index: u32, display: DisplayId, fences: Vec<ReleaseFence>) {
        self.entry(index, display).release_fences = Some(fences);
    }

    pub fn set_present_or_validate_result(
        &mut self,
        index: u32,
        display: DisplayId,
        result: PresentOrValidateResult,
    ) {
        self.entry(index, display).present_or_validate = Some(result);
    }

    /// Hand over everything recorded so far, leaving the writer empty
    pub fn take_results(&mut self) -> Vec<CommandResult> {
        std::mem::take(&mut self.pending).into_values().collect()
    }
}
