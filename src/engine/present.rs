//! Present/validate protocol.
//!
//! A display must be validated before it can be presented. Present-or-validate
//! skips the validate round trip when nothing changed since the last frame and
//! falls back to validate (and, where the hardware allows it, accept + present)
//! otherwise.

use composer_ipc::{ClockMonotonicTimestamp, DisplayId, PresentOrValidateResult};
use tracing::{debug, warn};

use super::{CommandContext, ComposerCommandEngine, PresentState};
use crate::hal::{ComposerHal, HwcResult, ValidateStatus};
use crate::resources::ComposerResources;

impl<H, R> ComposerCommandEngine<H, R>
where
    H: ComposerHal,
    R: ComposerResources,
{
    fn set_expected_present_time(&mut self, display_id: DisplayId, expected: Option<ClockMonotonicTimestamp>) {
        // Only a scheduling hint
        if let Err(err) = self.hal.set_expected_present_time(display_id, expected) {
            warn!("set_expected_present_time on display {}: {}", display_id, err);
        }
    }

    pub(super) fn execute_validate_display(
        &mut self,
        cx: &mut CommandContext<'_>,
        display: DisplayId,
        expected: Option<ClockMonotonicTimestamp>,
    ) {
        self.set_expected_present_time(display, expected);
        // Failures are already recorded
        let _ = self.validate_display_internal(cx, display);
    }

    /// Validate and publish the reported changes. A hard failure is recorded
    /// against the command and returned.
    fn validate_display_internal(&mut self, cx: &mut CommandContext<'_>, display_id: DisplayId) -> HwcResult<ValidateStatus> {
        // Cleared whatever validate reports
        self.resources.set_display_must_validate_state(display_id, false);
        let outcome = match self.hal.validate_display(display_id) {
            Ok(outcome) => outcome,
            Err(err) => {
                cx.fail("validate_display", err);
                self.set_state(display_id, PresentState::Failed);
                return Err(err);
            }
        };

        self.set_state(display_id, PresentState::Validated);

        let changes = outcome.changes;
        debug!(
            "Display {} validated ({:?}, {} composition change(s))",
            display_id,
            outcome.status,
            changes.changed_compositions.len()
        );
        cx.writer
            .set_changed_composition_types(cx.index, display_id, changes.changed_compositions);
        cx.writer
            .set_display_requests(cx.index, display_id, changes.display_request);
        cx.writer
            .set_client_target_property(cx.index, display_id, changes.client_target_property);
        Ok(outcome.status)
    }

    pub(super) fn execute_accept_display_changes(&mut self, cx: &mut CommandContext<'_>, display: DisplayId) {
        let result = self.hal.accept_display_changes(display);
        cx.record("accept_display_changes", result);
    }

    /// Present and publish the fences. The status goes back to the caller
    /// unrecorded.
    fn present_display_internal(&mut self, cx: &mut CommandContext<'_>, display_id: DisplayId) -> HwcResult {
        match self.hal.present_display(display_id) {
            Ok(outcome) => {
                if outcome.present_fence.is_valid() {
                    cx.writer
                        .set_present_fence(cx.index, display_id, outcome.present_fence);
                }
                cx.writer
                    .set_release_fences(cx.index, display_id, outcome.release_fences);
                self.set_state(display_id, PresentState::Presented);
                Ok(())
            }
            Err(err) => {
                debug!("present_display on display {}: {}", display_id, err);
                self.set_state(display_id, PresentState::Failed);
                Err(err)
            }
        }
    }

    /// A standalone present flag has no fallback, so a failure is an error.
    pub(super) fn execute_present_display(&mut self, cx: &mut CommandContext<'_>, display: DisplayId) {
        let result = self.present_display_internal(cx, display);
        cx.record("present_display", result);
    }

    pub(super) fn execute_present_or_validate_display(
        &mut self,
        cx: &mut CommandContext<'_>,
        display: DisplayId,
        expected: Option<ClockMonotonicTimestamp>,
    ) {
        self.set_expected_present_time(display, expected);

        // First try to present as is
        let presented = !self.resources.must_validate_display(display)
            && self.present_display_internal(cx, display).is_ok();
        if presented {
            cx.writer
                .set_present_or_validate_result(cx.index, display, PresentOrValidateResult::Presented);
            return;
        }

        // Fall back to validate. A hard failure leaves no outcome.
        let Ok(status) = self.validate_display_internal(cx, display) else {
            return;
        };

        let cannot_present_directly = status == ValidateStatus::HasChanges
            || matches!(self.hal.has_client_composition(display), Ok(true));
        if cannot_present_directly {
            cx.writer
                .set_present_or_validate_result(cx.index, display, PresentOrValidateResult::Validated);
            return;
        }

        self.execute_accept_display_changes(cx, display);
        if self.present_display_internal(cx, display).is_ok() {
            cx.writer
                .set_present_or_validate_result(cx.index, display, PresentOrValidateResult::Presented);
        }
    }
}
