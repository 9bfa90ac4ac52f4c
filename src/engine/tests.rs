use std::collections::{HashSet, VecDeque};

use composer_ipc::*;

use super::*;
use crate::hal::{DisplayChanges, PresentOutcome, ValidateOutcome, ValidateStatus};
use crate::resources::{BufferHandle, ResourceCache};

#[derive(Debug, Clone, PartialEq)]
enum Call {
    CreateLayer(DisplayId),
    DestroyLayer(DisplayId, LayerId),
    SetColorTransform(DisplayId),
    SetClientTarget(DisplayId, NativeHandle),
    SetOutputBuffer(DisplayId, NativeHandle),
    SetBrightness(DisplayId, f32),
    SetExpectedPresentTime(DisplayId),
    Validate(DisplayId),
    Accept(DisplayId),
    Present(DisplayId),
    HasClientComposition(DisplayId),
    SetLayerBuffer(DisplayId, LayerId, NativeHandle),
    SetLayerSidebandStream(DisplayId, LayerId, NativeHandle),
    SetLayerZOrder(DisplayId, LayerId, u32),
    Layer(&'static str, DisplayId, LayerId),
}

/// Records every call and answers from a script
#[derive(Default)]
struct ScriptedHal {
    calls: Vec<Call>,
    validate: VecDeque<HwcResult<ValidateOutcome>>,
    present: VecDeque<HwcResult<PresentOutcome>>,
    client_composition: bool,
    failing: HashSet<&'static str>,
    next_layer: LayerId,
}

impl ScriptedHal {
    fn status(&self, op: &'static str) -> HwcResult {
        if self.failing.contains(op) {
            Err(HwcError::BadParameter)
        } else {
            Ok(())
        }
    }

    fn layer(&mut self, op: &'static str, display: DisplayId, layer: LayerId) -> HwcResult {
        self.calls.push(Call::Layer(op, display, layer));
        self.status(op)
    }

    fn count(&self, wanted: impl Fn(&Call) -> bool) -> usize {
        self.calls.iter().filter(|call| wanted(call)).count()
    }
}

fn no_changes() -> HwcResult<ValidateOutcome> {
    Ok(ValidateOutcome {
        status: ValidateStatus::NoChanges,
        changes: DisplayChanges::default(),
    })
}

fn has_changes(layer: LayerId) -> HwcResult<ValidateOutcome> {
    Ok(ValidateOutcome {
        status: ValidateStatus::HasChanges,
        changes: DisplayChanges {
            changed_compositions: vec![ChangedCompositionLayer {
                layer,
                composition: Composition::Client,
            }],
            ..Default::default()
        },
    })
}

fn presented(fence: i32) -> HwcResult<PresentOutcome> {
    Ok(PresentOutcome {
        present_fence: Fence(fence),
        release_fences: vec![ReleaseFence {
            layer: 10,
            fence: Fence(fence + 1),
        }],
    })
}

impl ComposerHal for ScriptedHal {
    fn create_layer(&mut self, display: DisplayId) -> HwcResult<LayerId> {
        self.calls.push(Call::CreateLayer(display));
        self.next_layer += 1;
        Ok(self.next_layer)
    }

    fn destroy_layer(&mut self, display: DisplayId, layer: LayerId) -> HwcResult {
        self.calls.push(Call::DestroyLayer(display, layer));
        Ok(())
    }

    fn set_color_transform(&mut self, display: DisplayId, _matrix: &[f32]) -> HwcResult {
        self.calls.push(Call::SetColorTransform(display));
        self.status("set_color_transform")
    }

    fn set_client_target(
        &mut self,
        display: DisplayId,
        target: &BufferHandle,
        _fence: Fence,
        _dataspace: Dataspace,
        _damage: &[Option<Rect>],
    ) -> HwcResult {
        self.calls.push(Call::SetClientTarget(display, target.native().clone()));
        self.status("set_client_target")
    }

    fn set_output_buffer(&mut self, display: DisplayId, buffer: &BufferHandle, _fence: Fence) -> HwcResult {
        self.calls.push(Call::SetOutputBuffer(display, buffer.native().clone()));
        self.status("set_output_buffer")
    }

    fn set_display_brightness(&mut self, display: DisplayId, brightness: f32) -> HwcResult {
        self.calls.push(Call::SetBrightness(display, brightness));
        self.status("set_display_brightness")
    }

    fn set_expected_present_time(
        &mut self,
        display: DisplayId,
        _expected: Option<ClockMonotonicTimestamp>,
    ) -> HwcResult {
        self.calls.push(Call::SetExpectedPresentTime(display));
        Ok(())
    }

    fn validate_display(&mut self, display: DisplayId) -> HwcResult<ValidateOutcome> {
        self.calls.push(Call::Validate(display));
        self.validate.pop_front().unwrap_or_else(no_changes)
    }

    fn accept_display_changes(&mut self, display: DisplayId) -> HwcResult {
        self.calls.push(Call::Accept(display));
        self.status("accept_display_changes")
    }

    fn present_display(&mut self, display: DisplayId) -> HwcResult<PresentOutcome> {
        self.calls.push(Call::Present(display));
        self.present
            .pop_front()
            .unwrap_or_else(|| Ok(PresentOutcome::default()))
    }

    fn has_client_composition(&mut self, display: DisplayId) -> HwcResult<bool> {
        self.calls.push(Call::HasClientComposition(display));
        Ok(self.client_composition)
    }

    fn set_layer_cursor_position(&mut self, display: DisplayId, layer: LayerId, _x: i32, _y: i32) -> HwcResult {
        self.layer("set_layer_cursor_position", display, layer)
    }

    fn set_layer_buffer(&mut self, display: DisplayId, layer: LayerId, buffer: &BufferHandle, _fence: Fence) -> HwcResult {
        self.calls
            .push(Call::SetLayerBuffer(display, layer, buffer.native().clone()));
        self.status("set_layer_buffer")
    }

    fn set_layer_surface_damage(&mut self, display: DisplayId, layer: LayerId, _damage: &[Option<Rect>]) -> HwcResult {
        self.layer("set_layer_surface_damage", display, layer)
    }

    fn set_layer_blend_mode(&mut self, display: DisplayId, layer: LayerId, _mode: BlendMode) -> HwcResult {
        self.layer("set_layer_blend_mode", display, layer)
    }

    fn set_layer_color(&mut self, display: DisplayId, layer: LayerId, _color: Color) -> HwcResult {
        self.layer("set_layer_color", display, layer)
    }

    fn set_layer_composition_type(&mut self, display: DisplayId, layer: LayerId, _composition: Composition) -> HwcResult {
        self.layer("set_layer_composition_type", display, layer)
    }

    fn set_layer_dataspace(&mut self, display: DisplayId, layer: LayerId, _dataspace: Dataspace) -> HwcResult {
        self.layer("set_layer_dataspace", display, layer)
    }

    fn set_layer_display_frame(&mut self, display: DisplayId, layer: LayerId, _frame: Rect) -> HwcResult {
        self.layer("set_layer_display_frame", display, layer)
    }

    fn set_layer_plane_alpha(&mut self, display: DisplayId, layer: LayerId, _alpha: f32) -> HwcResult {
        self.layer("set_layer_plane_alpha", display, layer)
    }

    fn set_layer_sideband_stream(&mut self, display: DisplayId, layer: LayerId, stream: &BufferHandle) -> HwcResult {
        self.calls
            .push(Call::SetLayerSidebandStream(display, layer, stream.native().clone()));
        self.status("set_layer_sideband_stream")
    }

    fn set_layer_source_crop(&mut self, display: DisplayId, layer: LayerId, _crop: FRect) -> HwcResult {
        self.layer("set_layer_source_crop", display, layer)
    }

    fn set_layer_transform(&mut self, display: DisplayId, layer: LayerId, _transform: Transform) -> HwcResult {
        self.layer("set_layer_transform", display, layer)
    }

    fn set_layer_visible_region(&mut self, display: DisplayId, layer: LayerId, _region: &[Option<Rect>]) -> HwcResult {
        self.layer("set_layer_visible_region", display, layer)
    }

    fn set_layer_z_order(&mut self, display: DisplayId, layer: LayerId, z: u32) -> HwcResult {
        self.calls.push(Call::SetLayerZOrder(display, layer, z));
        self.status("set_layer_z_order")
    }

    fn set_layer_color_transform(&mut self, display: DisplayId, layer: LayerId, _matrix: &[f32]) -> HwcResult {
        self.layer("set_layer_color_transform", display, layer)
    }

    fn set_layer_per_frame_metadata(
        &mut self,
        display: DisplayId,
        layer: LayerId,
        _metadata: &[Option<PerFrameMetadata>],
    ) -> HwcResult {
        self.layer("set_layer_per_frame_metadata", display, layer)
    }

    fn set_layer_per_frame_metadata_blobs(
        &mut self,
        display: DisplayId,
        layer: LayerId,
        _blobs: &[Option<PerFrameMetadataBlob>],
    ) -> HwcResult {
        self.layer("set_layer_per_frame_metadata_blobs", display, layer)
    }
}

type TestEngine = ComposerCommandEngine<ScriptedHal, ResourceCache>;

/// Display 1 (physical, layer 10) and display 2 (virtual)
fn engine() -> TestEngine {
    let mut resources = ResourceCache::new();
    resources.add_display(1, 2, false).unwrap();
    resources.add_display(2, 1, true).unwrap();
    resources.add_layer(1, 10, 3).unwrap();
    ComposerCommandEngine::new(ScriptedHal::default(), resources)
}

fn handle(fd: i32) -> NativeHandle {
    NativeHandle {
        fds: vec![fd],
        ints: vec![],
    }
}

fn present_or_validate(display: DisplayId) -> DisplayCommand {
    let mut command = DisplayCommand::new(display);
    command.present_or_validate_display = true;
    command
}

fn calls(engine: &TestEngine) -> &[Call] {
    &engine.hal().calls
}

#[test]
fn test_z_order_then_validate() {
    let mut engine = engine();
    engine.hal_mut().validate.push_back(has_changes(10));

    let mut layer = LayerCommand::new(10);
    layer.z = Some(5);
    let mut command = DisplayCommand::new(1);
    command.validate_display = true;
    command.layers.push(layer);

    let results = engine.execute(&[command]);

    let hal = engine.hal();
    assert_eq!(hal.count(|c| *c == Call::SetLayerZOrder(1, 10, 5)), 1);
    assert_eq!(hal.count(|c| *c == Call::Validate(1)), 1);
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].command_index, 0);
    assert_eq!(
        results[0].changed_composition_types,
        Some(vec![ChangedCompositionLayer {
            layer: 10,
            composition: Composition::Client,
        }])
    );
    assert!(!results[0].is_error());
    assert_eq!(engine.present_state(1), PresentState::Validated);
}

#[test]
fn test_empty_layer_command_makes_no_calls() {
    let mut engine = engine();
    let mut command = DisplayCommand::new(1);
    command.layers.push(LayerCommand::new(10));

    let results = engine.execute(&[command]);

    assert!(calls(&engine).is_empty());
    assert!(results.is_empty());
}

#[test]
fn test_layer_fields_dispatched_in_fixed_order() {
    let mut engine = engine();
    let command = DisplayCommand {
        display: 1,
        layers: vec![LayerCommand {
            layer: 10,
            cursor_position: Some(Point { x: 1, y: 2 }),
            buffer: Some(Buffer {
                slot: 0,
                handle: Some(handle(7)),
                fence: Fence::NO_FENCE,
            }),
            damage: Some(vec![None]),
            blend_mode: Some(BlendMode::Premultiplied),
            color: Some(Color::default()),
            composition: Some(Composition::Device),
            dataspace: Some(Dataspace::SRGB),
            display_frame: Some(Rect::new(0, 0, 10, 10)),
            plane_alpha: Some(0.5),
            sideband_stream: Some(handle(8)),
            source_crop: Some(FRect::default()),
            transform: Some(Transform::Rot90),
            visible_region: Some(vec![Some(Rect::new(0, 0, 10, 10))]),
            z: Some(3),
            color_transform: Some(vec![1.0; 16]),
            per_frame_metadata: Some(vec![Some(PerFrameMetadata {
                key: PerFrameMetadataKey::MaxLuminance,
                value: 500.0,
            })]),
            per_frame_metadata_blob: Some(vec![None]),
        }],
        ..Default::default()
    };

    let results = engine.execute(&[command]);

    assert!(results.is_empty());
    assert_eq!(
        calls(&engine),
        &[
            Call::Layer("set_layer_cursor_position", 1, 10),
            Call::SetLayerBuffer(1, 10, handle(7)),
            Call::Layer("set_layer_surface_damage", 1, 10),
            Call::Layer("set_layer_blend_mode", 1, 10),
            Call::Layer("set_layer_color", 1, 10),
            Call::Layer("set_layer_composition_type", 1, 10),
            Call::Layer("set_layer_dataspace", 1, 10),
            Call::Layer("set_layer_display_frame", 1, 10),
            Call::Layer("set_layer_plane_alpha", 1, 10),
            Call::SetLayerSidebandStream(1, 10, handle(8)),
            Call::Layer("set_layer_source_crop", 1, 10),
            Call::Layer("set_layer_transform", 1, 10),
            Call::Layer("set_layer_visible_region", 1, 10),
            Call::SetLayerZOrder(1, 10, 3),
            Call::Layer("set_layer_color_transform", 1, 10),
            Call::Layer("set_layer_per_frame_metadata", 1, 10),
            Call::Layer("set_layer_per_frame_metadata_blobs", 1, 10),
        ]
    );
}

#[test]
fn test_failures_recorded_without_aborting() {
    let mut engine = engine();
    engine.hal_mut().failing.insert("set_layer_blend_mode");
    engine.hal_mut().failing.insert("set_display_brightness");

    let mut first = DisplayCommand::new(1);
    let mut layer = LayerCommand::new(10);
    layer.blend_mode = Some(BlendMode::Coverage);
    layer.z = Some(1);
    first.layers.push(layer);
    first.brightness = Some(DisplayBrightness { brightness: 0.3 });
    first.validate_display = true;

    let mut second = DisplayCommand::new(1);
    second.color_transform_matrix = Some(vec![0.0; 16]);

    let mut third = DisplayCommand::new(1);
    third.brightness = Some(DisplayBrightness { brightness: 0.4 });

    let results = engine.execute(&[first, second, third]);

    // The failing setters did not stop the z order, validate or later commands
    let hal = engine.hal();
    assert_eq!(hal.count(|c| *c == Call::SetLayerZOrder(1, 10, 1)), 1);
    assert_eq!(hal.count(|c| *c == Call::Validate(1)), 1);
    assert_eq!(hal.count(|c| *c == Call::SetColorTransform(1)), 1);
    assert_eq!(hal.count(|c| matches!(c, Call::SetBrightness(1, _))), 2);

    let bad_parameter = HwcError::BadParameter.code();
    let indices: Vec<u32> = results.iter().map(|r| r.command_index).collect();
    assert_eq!(indices, vec![0, 2]);
    assert_eq!(results[0].errors, vec![bad_parameter, bad_parameter]);
    assert!(results[0].changed_composition_types.is_some());
    assert_eq!(results[1].errors, vec![bad_parameter]);
}

#[test]
fn test_result_indices_increase_and_stay_in_range() {
    let mut engine = engine();
    engine.hal_mut().failing.insert("set_color_transform");

    let mut batch = Vec::new();
    for i in 0..6 {
        let mut command = DisplayCommand::new(1);
        if i % 2 == 0 {
            command.color_transform_matrix = Some(vec![0.0; 16]);
        }
        batch.push(command);
    }

    for _ in 0..2 {
        let results = engine.execute(&batch);
        let indices: Vec<u32> = results.iter().map(|r| r.command_index).collect();
        assert_eq!(indices, vec![0, 2, 4]);
        assert!(indices.windows(2).all(|pair| pair[0] < pair[1]));
        assert!(indices.iter().all(|&index| (index as usize) < batch.len()));
    }
    assert_eq!(engine.batches_executed(), 2);
}

#[test]
fn test_buffer_resolution_failure_skips_hal_call() {
    let mut engine = engine();
    let mut layer = LayerCommand::new(10);
    layer.buffer = Some(Buffer {
        slot: 1,
        handle: None,
        fence: Fence::NO_FENCE,
    });
    let mut command = DisplayCommand::new(1);
    command.layers.push(layer);

    let results = engine.execute(&[command]);

    assert!(calls(&engine).is_empty());
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].errors, vec![HwcError::BadParameter.code()]);
}

#[test]
fn test_cached_buffer_reused_across_batches() {
    let mut engine = engine();
    let frame = |handle: Option<NativeHandle>| {
        let mut layer = LayerCommand::new(10);
        layer.buffer = Some(Buffer {
            slot: 2,
            handle,
            fence: Fence(3),
        });
        let mut command = DisplayCommand::new(1);
        command.layers.push(layer);
        command
    };

    assert!(engine.execute(&[frame(Some(handle(21)))]).is_empty());
    assert!(engine.execute(&[frame(None)]).is_empty());

    assert_eq!(
        calls(&engine),
        &[
            Call::SetLayerBuffer(1, 10, handle(21)),
            Call::SetLayerBuffer(1, 10, handle(21)),
        ]
    );
}

#[test]
fn test_client_target_and_output_buffer() {
    let mut engine = engine();

    let mut physical = DisplayCommand::new(1);
    physical.client_target = Some(ClientTarget {
        buffer: Buffer {
            slot: 1,
            handle: Some(handle(30)),
            fence: Fence::NO_FENCE,
        },
        dataspace: Dataspace::SRGB,
        damage: vec![],
    });
    // Physical displays have no output buffer
    physical.virtual_display_output_buffer = Some(Buffer {
        slot: 0,
        handle: Some(handle(31)),
        fence: Fence::NO_FENCE,
    });

    let mut virtual_display = DisplayCommand::new(2);
    virtual_display.virtual_display_output_buffer = Some(Buffer {
        slot: 0,
        handle: Some(handle(32)),
        fence: Fence::NO_FENCE,
    });

    let results = engine.execute(&[physical, virtual_display]);

    assert_eq!(
        calls(&engine),
        &[
            Call::SetClientTarget(1, handle(30)),
            Call::SetOutputBuffer(2, handle(32)),
        ]
    );
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].command_index, 0);
    assert_eq!(results[0].errors, vec![HwcError::Unsupported.code()]);
}

#[test]
fn test_sideband_stream_needs_a_valid_handle() {
    let mut engine = engine();
    let mut layer = LayerCommand::new(10);
    layer.sideband_stream = Some(NativeHandle::default());
    let mut command = DisplayCommand::new(1);
    command.layers.push(layer);

    let results = engine.execute(&[command]);

    assert!(calls(&engine).is_empty());
    assert_eq!(results[0].errors, vec![HwcError::BadParameter.code()]);
}

#[test]
fn test_present_or_validate_presents_directly() {
    let mut engine = engine();
    engine.resources_mut().set_display_must_validate_state(1, false);
    engine.hal_mut().present.push_back(presented(40));

    let results = engine.execute(&[present_or_validate(1)]);

    let hal = engine.hal();
    assert_eq!(hal.count(|c| matches!(c, Call::Validate(_))), 0);
    assert_eq!(hal.count(|c| matches!(c, Call::Accept(_))), 0);
    assert_eq!(hal.count(|c| matches!(c, Call::Present(_))), 1);
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].present_or_validate, Some(PresentOrValidateResult::Presented));
    assert_eq!(results[0].present_fence, Some(Fence(40)));
    assert_eq!(
        results[0].release_fences,
        Some(vec![ReleaseFence {
            layer: 10,
            fence: Fence(41),
        }])
    );
    assert_eq!(engine.present_state(1), PresentState::Presented);
}

#[test]
fn test_present_or_validate_with_changes_stops_at_validated() {
    let mut engine = engine();
    engine.hal_mut().validate.push_back(has_changes(10));

    let results = engine.execute(&[present_or_validate(1)]);

    let hal = engine.hal();
    assert_eq!(hal.count(|c| matches!(c, Call::Validate(1))), 1);
    assert_eq!(hal.count(|c| matches!(c, Call::Present(_))), 0);
    assert_eq!(hal.count(|c| matches!(c, Call::Accept(_))), 0);
    assert_eq!(results[0].present_or_validate, Some(PresentOrValidateResult::Validated));
    assert!(results[0].changed_composition_types.is_some());
    assert!(!engine.resources().must_validate_display(1));
}

#[test]
fn test_present_or_validate_accepts_then_presents() {
    let mut engine = engine();
    engine.hal_mut().validate.push_back(no_changes());
    engine.hal_mut().present.push_back(presented(50));

    let results = engine.execute(&[present_or_validate(1)]);

    assert_eq!(
        calls(&engine),
        &[
            Call::SetExpectedPresentTime(1),
            Call::Validate(1),
            Call::HasClientComposition(1),
            Call::Accept(1),
            Call::Present(1),
        ]
    );
    assert_eq!(results[0].present_or_validate, Some(PresentOrValidateResult::Presented));
    assert_eq!(results[0].present_fence, Some(Fence(50)));
}

#[test]
fn test_present_or_validate_client_composition_stops_at_validated() {
    let mut engine = engine();
    engine.hal_mut().client_composition = true;

    let results = engine.execute(&[present_or_validate(1)]);

    let hal = engine.hal();
    assert_eq!(hal.count(|c| matches!(c, Call::Accept(_))), 0);
    assert_eq!(hal.count(|c| matches!(c, Call::Present(_))), 0);
    assert_eq!(results[0].present_or_validate, Some(PresentOrValidateResult::Validated));
}

#[test]
fn test_present_or_validate_falls_back_when_direct_present_fails() {
    let mut engine = engine();
    engine.resources_mut().set_display_must_validate_state(1, false);
    engine.hal_mut().present.push_back(Err(HwcError::NotValidated));
    engine.hal_mut().present.push_back(presented(60));

    let results = engine.execute(&[present_or_validate(1)]);

    let hal = engine.hal();
    assert_eq!(hal.count(|c| matches!(c, Call::Present(1))), 2);
    assert_eq!(hal.count(|c| matches!(c, Call::Validate(1))), 1);
    assert_eq!(results[0].present_or_validate, Some(PresentOrValidateResult::Presented));
    // The failed first attempt is not an error
    assert!(!results[0].is_error());
}

#[test]
fn test_present_or_validate_validate_failure_leaves_no_outcome() {
    let mut engine = engine();
    engine.hal_mut().validate.push_back(Err(HwcError::BadDisplay));

    let results = engine.execute(&[present_or_validate(1)]);

    assert_eq!(engine.hal().count(|c| matches!(c, Call::Present(_))), 0);
    assert_eq!(results[0].errors, vec![HwcError::BadDisplay.code()]);
    assert_eq!(results[0].present_or_validate, None);
    assert_eq!(engine.present_state(1), PresentState::Failed);
    assert!(!engine.resources().must_validate_display(1));
}

#[test]
fn test_failed_validate_still_clears_must_validate() {
    let mut engine = engine();
    engine.hal_mut().validate.push_back(Err(HwcError::BadDisplay));
    assert!(engine.resources().must_validate_display(1));

    let mut command = DisplayCommand::new(1);
    command.validate_display = true;
    let results = engine.execute(&[command]);

    assert_eq!(results[0].errors, vec![HwcError::BadDisplay.code()]);
    assert_eq!(results[0].changed_composition_types, None);
    assert!(!engine.resources().must_validate_display(1));
    assert_eq!(engine.present_state(1), PresentState::Failed);
}

#[test]
fn test_present_or_validate_second_present_failure_leaves_no_outcome() {
    let mut engine = engine();
    engine.hal_mut().present.push_back(Err(HwcError::NoResources));

    let results = engine.execute(&[present_or_validate(1)]);

    assert_eq!(engine.hal().count(|c| matches!(c, Call::Present(1))), 1);
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].present_or_validate, None);
    assert!(results[0].errors.is_empty());
    assert_eq!(engine.present_state(1), PresentState::Failed);
}

#[test]
fn test_validate_clears_must_validate_for_next_frame() {
    let mut engine = engine();
    engine.execute(&[present_or_validate(1)]);
    engine.hal_mut().calls.clear();

    let results = engine.execute(&[present_or_validate(1)]);

    assert_eq!(engine.hal().count(|c| matches!(c, Call::Validate(_))), 0);
    assert_eq!(results[0].present_or_validate, Some(PresentOrValidateResult::Presented));

    engine.refresh(1);
    engine.hal_mut().calls.clear();
    engine.execute(&[present_or_validate(1)]);
    assert_eq!(engine.hal().count(|c| matches!(c, Call::Validate(1))), 1);
}

#[test]
fn test_protocol_flags_all_run_in_order() {
    let mut engine = engine();
    let mut command = DisplayCommand::new(1);
    command.brightness = Some(DisplayBrightness { brightness: 1.0 });
    command.validate_display = true;
    command.accept_display_changes = true;
    command.present_display = true;

    engine.execute(&[command]);

    assert_eq!(
        calls(&engine),
        &[
            Call::SetBrightness(1, 1.0),
            Call::SetExpectedPresentTime(1),
            Call::Validate(1),
            Call::Accept(1),
            Call::Present(1),
        ]
    );
}

#[test]
fn test_standalone_present_failure_is_recorded() {
    let mut engine = engine();
    engine.hal_mut().present.push_back(Err(HwcError::NotValidated));
    let mut command = DisplayCommand::new(1);
    command.present_display = true;

    let results = engine.execute(&[command]);

    assert_eq!(results[0].errors, vec![HwcError::NotValidated.code()]);
}

#[test]
fn test_invalid_present_fence_not_published() {
    let mut engine = engine();
    let mut command = DisplayCommand::new(1);
    command.present_display = true;

    let results = engine.execute(&[command]);

    assert_eq!(results[0].present_fence, None);
    assert_eq!(results[0].release_fences, Some(vec![]));
}

#[test]
fn test_property_change_resets_present_state() {
    let mut engine = engine();
    engine.execute(&[present_or_validate(1)]);
    assert_eq!(engine.present_state(1), PresentState::Presented);

    let mut command = DisplayCommand::new(1);
    let mut layer = LayerCommand::new(10);
    layer.plane_alpha = Some(0.5);
    command.layers.push(layer);
    engine.execute(&[command]);

    assert_eq!(engine.present_state(1), PresentState::Unvalidated);
    assert_eq!(engine.present_state(2), PresentState::Unvalidated);
}

#[test]
fn test_create_and_destroy_layer() {
    let mut engine = engine();
    let layer = engine.create_layer(1, 2).unwrap();

    let mut command = DisplayCommand::new(1);
    let mut layer_command = LayerCommand::new(layer);
    layer_command.buffer = Some(Buffer {
        slot: 1,
        handle: Some(handle(5)),
        fence: Fence::NO_FENCE,
    });
    command.layers.push(layer_command);
    assert!(engine.execute(&[command]).is_empty());

    engine.destroy_layer(1, layer).unwrap();
    assert_eq!(engine.resources().released_count(), 1);

    // Unknown display: the cache refuses and the hardware layer is rolled back
    assert_eq!(engine.create_layer(9, 1), Err(HwcError::BadDisplay));
    assert!(calls(&engine).contains(&Call::DestroyLayer(9, layer + 1)));
}

#[test]
fn test_command_index_range() {
    assert_eq!(command_index(0), Some(0));
    assert_eq!(command_index(u32::MAX as usize), Some(u32::MAX));
    #[cfg(target_pointer_width = "64")]
    assert_eq!(command_index(u32::MAX as usize + 1), None);
}
