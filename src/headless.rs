//! Headless display backend
//!
//! A software stand-in for display hardware. It keeps per-layer state, decides
//! which layers it could scan out directly and hands out fences, so the composer
//! can run end to end without a driver.

use std::collections::{BTreeMap, HashMap};

use composer_ipc::{
    BlendMode, ChangedCompositionLayer, ClientTargetProperty, ClockMonotonicTimestamp, Color,
    Composition, Dataspace, DisplayId, DisplayRequest, DisplayRequestFlags, FRect, Fence, LayerId,
    LayerRequest, LayerRequestFlags, PerFrameMetadata, PerFrameMetadataBlob, PixelFormat, Point,
    Rect, ReleaseFence, Transform,
};
use tracing::{debug, info};

use crate::config::DisplayConfig;
use crate::hal::{
    ComposerHal, DisplayChanges, HwcError, HwcResult, PresentOutcome, ValidateOutcome, ValidateStatus,
};
use crate::resources::BufferHandle;

const COLOR_MATRIX_LEN: usize = 16;

#[derive(Debug, Clone)]
struct HeadlessLayer {
    composition: Composition,
    z: u32,
    buffer: Option<BufferHandle>,
    sideband: Option<BufferHandle>,
    plane_alpha: f32,
    display_frame: Rect,
    cursor: Point,
}

impl Default for HeadlessLayer {
    fn default() -> Self {
        Self {
            composition: Composition::Device,
            z: 0,
            buffer: None,
            sideband: None,
            plane_alpha: 1.0,
            display_frame: Rect::default(),
            cursor: Point::default(),
        }
    }
}

#[derive(Debug)]
struct HeadlessDisplay {
    config: DisplayConfig,
    layers: BTreeMap<LayerId, HeadlessLayer>,
    validated: bool,
    pending_changes: Vec<ChangedCompositionLayer>,
    client_target: Option<BufferHandle>,
    output_buffer: Option<BufferHandle>,
    brightness: f32,
    frames_presented: u64,
}

impl HeadlessDisplay {
    fn new(config: DisplayConfig) -> Self {
        Self {
            config,
            layers: BTreeMap::new(),
            validated: false,
            pending_changes: Vec::new(),
            client_target: None,
            output_buffer: None,
            brightness: 1.0,
            frames_presented: 0,
        }
    }

    fn layer_mut(&mut self, layer: LayerId) -> HwcResult<&mut HeadlessLayer> {
        self.layers.get_mut(&layer).ok_or(HwcError::BadLayer)
    }

    /// Decide the composition each layer actually gets. Device layers beneath the
    /// lowest client-composed layer also ask the client to clear the target there.
    fn plan(&self) -> (Vec<ChangedCompositionLayer>, Vec<LayerRequest>) {
        let mut by_z: Vec<(&LayerId, &HeadlessLayer)> = self.layers.iter().collect();
        by_z.sort_by_key(|(id, layer)| (layer.z, **id));

        let mut device_layers = 0;
        let mut planned = Vec::with_capacity(by_z.len());
        let mut changes = Vec::new();
        for (&id, layer) in by_z {
            let composition = match layer.composition {
                Composition::Device | Composition::Cursor => {
                    if device_layers < self.config.max_device_layers {
                        device_layers += 1;
                        layer.composition
                    } else {
                        Composition::Client
                    }
                }
                // No sideband or decoration planes on a headless display
                Composition::Sideband
                | Composition::DisplayDecoration
                | Composition::RefreshRateIndicator
                | Composition::Invalid => Composition::Client,
                Composition::Client | Composition::SolidColor => layer.composition,
            };
            if composition != layer.composition {
                changes.push(ChangedCompositionLayer { layer: id, composition });
            }
            planned.push((id, composition));
        }

        let requests = if planned.iter().any(|&(_, c)| c == Composition::Client) {
            planned
                .iter()
                .take_while(|&&(_, c)| c != Composition::Client)
                .filter(|&&(_, c)| c == Composition::Device)
                .map(|&(layer, _)| LayerRequest {
                    layer,
                    mask: LayerRequestFlags::CLEAR_CLIENT_TARGET.bits(),
                })
                .collect()
        } else {
            Vec::new()
        };
        (changes, requests)
    }

    fn uses_client_composition(&self) -> bool {
        self.layers
            .values()
            .any(|layer| layer.composition == Composition::Client)
    }
}

/// What the backend currently holds for a layer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayerSnapshot {
    pub composition: Composition,
    pub z: u32,
    pub plane_alpha: f32,
    pub display_frame: Rect,
    pub cursor: Point,
    pub has_buffer: bool,
    pub has_sideband: bool,
}

/// Software [`ComposerHal`]
#[derive(Debug)]
pub struct HeadlessHal {
    displays: HashMap<DisplayId, HeadlessDisplay>,
    next_layer: LayerId,
    next_fence: i32,
}

impl HeadlessHal {
    pub fn new(displays: &[DisplayConfig]) -> Self {
        let displays = displays
            .iter()
            .map(|config| {
                info!(
                    "Headless display {}: {}x{}{}",
                    config.id,
                    config.width,
                    config.height,
                    if config.is_virtual { " (virtual)" } else { "" }
                );
                (config.id, HeadlessDisplay::new(config.clone()))
            })
            .collect();
        Self {
            displays,
            next_layer: 1,
            next_fence: 3,
        }
    }

    pub fn frames_presented(&self, display: DisplayId) -> Option<u64> {
        self.displays.get(&display).map(|d| d.frames_presented)
    }

    pub fn layer(&self, display: DisplayId, layer: LayerId) -> Option<LayerSnapshot> {
        self.displays
            .get(&display)
            .and_then(|d| d.layers.get(&layer))
            .map(|layer| LayerSnapshot {
                composition: layer.composition,
                z: layer.z,
                plane_alpha: layer.plane_alpha,
                display_frame: layer.display_frame,
                cursor: layer.cursor,
                has_buffer: layer.buffer.is_some(),
                has_sideband: layer.sideband.is_some(),
            })
    }

    pub fn brightness(&self, display: DisplayId) -> Option<f32> {
        self.displays.get(&display).map(|d| d.brightness)
    }

    fn display_mut(&mut self, display: DisplayId) -> HwcResult<&mut HeadlessDisplay> {
        self.displays.get_mut(&display).ok_or(HwcError::BadDisplay)
    }

    fn fence(&mut self) -> Fence {
        let fence = Fence(self.next_fence);
        self.next_fence = self.next_fence.checked_add(1).unwrap_or(3);
        fence
    }

    /// Apply `f` to a layer and drop the display's validation
    fn update_layer<F>(&mut self, display: DisplayId, layer: LayerId, f: F) -> HwcResult
    where
        F: FnOnce(&mut HeadlessLayer),
    {
        let target = self.display_mut(display)?;
        f(target.layer_mut(layer)?);
        target.validated = false;
        Ok(())
    }

    fn touch_layer(&mut self, display: DisplayId, layer: LayerId) -> HwcResult {
        self.update_layer(display, layer, |_| {})
    }
}

fn check_matrix(matrix: &[f32]) -> HwcResult {
    if matrix.len() != COLOR_MATRIX_LEN {
        return Err(HwcError::BadParameter);
    }
    Ok(())
}

impl ComposerHal for HeadlessHal {
    fn create_layer(&mut self, display: DisplayId) -> HwcResult<LayerId> {
        let layer = self.next_layer;
        let target = self.display_mut(display)?;
        target.layers.insert(layer, HeadlessLayer::default());
        target.validated = false;
        self.next_layer += 1;
        Ok(layer)
    }

    fn destroy_layer(&mut self, display: DisplayId, layer: LayerId) -> HwcResult {
        let target = self.display_mut(display)?;
        target.layers.remove(&layer).ok_or(HwcError::BadLayer)?;
        target.validated = false;
        Ok(())
    }

    fn set_color_transform(&mut self, display: DisplayId, matrix: &[f32]) -> HwcResult {
        check_matrix(matrix)?;
        self.display_mut(display)?.validated = false;
        Ok(())
    }

    fn set_client_target(
        &mut self,
        display: DisplayId,
        target: &BufferHandle,
        _fence: Fence,
        _dataspace: Dataspace,
        _damage: &[Option<Rect>],
    ) -> HwcResult {
        self.display_mut(display)?.client_target = Some(target.clone());
        Ok(())
    }

    fn set_output_buffer(&mut self, display: DisplayId, buffer: &BufferHandle, _fence: Fence) -> HwcResult {
        let target = self.display_mut(display)?;
        if !target.config.is_virtual {
            return Err(HwcError::Unsupported);
        }
        target.output_buffer = Some(buffer.clone());
        Ok(())
    }

    fn set_display_brightness(&mut self, display: DisplayId, brightness: f32) -> HwcResult {
        let target = self.display_mut(display)?;
        if target.config.is_virtual {
            return Err(HwcError::Unsupported);
        }
        if !((0.0..=1.0).contains(&brightness) || brightness == -1.0) {
            return Err(HwcError::BadParameter);
        }
        target.brightness = brightness;
        Ok(())
    }

    fn set_expected_present_time(
        &mut self,
        display_id: DisplayId,
        expected: Option<ClockMonotonicTimestamp>,
    ) -> HwcResult {
        self.display_mut(display_id)?;
        if let Some(expected) = expected {
            debug!("Display {} expects present at {}ns", display_id, expected.timestamp_nanos);
        }
        Ok(())
    }

    fn validate_display(&mut self, display_id: DisplayId) -> HwcResult<ValidateOutcome> {
        let target = self.display_mut(display_id)?;
        let (changes, layer_requests) = target.plan();
        let status = if changes.is_empty() {
            ValidateStatus::NoChanges
        } else {
            ValidateStatus::HasChanges
        };

        let client_composed = target.uses_client_composition()
            || changes.iter().any(|c| c.composition == Composition::Client);
        let mut flags = DisplayRequestFlags::empty();
        if target.config.is_virtual && client_composed {
            flags |= DisplayRequestFlags::WRITE_CLIENT_TARGET_TO_OUTPUT;
        }

        target.pending_changes = changes.clone();
        target.validated = true;
        debug!("Headless display {} validated: {:?}", display_id, status);

        Ok(ValidateOutcome {
            status,
            changes: DisplayChanges {
                changed_compositions: changes,
                display_request: DisplayRequest {
                    mask: flags.bits(),
                    layer_requests,
                },
                client_target_property: ClientTargetProperty {
                    pixel_format: PixelFormat::RGBA_8888,
                    dataspace: Dataspace::SRGB,
                },
            },
        })
    }

    fn accept_display_changes(&mut self, display: DisplayId) -> HwcResult {
        let target = self.display_mut(display)?;
        if !target.validated {
            return Err(HwcError::NotValidated);
        }
        for change in std::mem::take(&mut target.pending_changes) {
            if let Some(layer) = target.layers.get_mut(&change.layer) {
                layer.composition = change.composition;
            }
        }
        Ok(())
    }

    fn present_display(&mut self, display: DisplayId) -> HwcResult<PresentOutcome> {
        let target = self.display_mut(display)?;
        if !target.validated || !target.pending_changes.is_empty() {
            return Err(HwcError::NotValidated);
        }
        if target.config.is_virtual && target.output_buffer.is_none() {
            return Err(HwcError::NoResources);
        }
        if target.uses_client_composition() && target.client_target.is_none() {
            return Err(HwcError::NoResources);
        }
        target.frames_presented += 1;

        let buffered: Vec<LayerId> = target
            .layers
            .iter()
            .filter(|(_, layer)| layer.buffer.is_some())
            .map(|(&id, _)| id)
            .collect();

        let present_fence = self.fence();
        let release_fences = buffered
            .into_iter()
            .map(|layer| ReleaseFence {
                layer,
                fence: self.fence(),
            })
            .collect();

        Ok(PresentOutcome {
            present_fence,
            release_fences,
        })
    }

    fn has_client_composition(&mut self, display: DisplayId) -> HwcResult<bool> {
        Ok(self.display_mut(display)?.uses_client_composition())
    }

    fn set_layer_cursor_position(&mut self, display: DisplayId, layer: LayerId, x: i32, y: i32) -> HwcResult {
        // Cursor moves do not need a new validate
        let target = self.display_mut(display)?.layer_mut(layer)?;
        if target.composition != Composition::Cursor {
            return Err(HwcError::BadLayer);
        }
        target.cursor = Point { x, y };
        Ok(())
    }

    fn set_layer_buffer(&mut self, display: DisplayId, layer: LayerId, buffer: &BufferHandle, _fence: Fence) -> HwcResult {
        // A new buffer with unchanged geometry keeps the display validated
        self.display_mut(display)?.layer_mut(layer)?.buffer = Some(buffer.clone());
        Ok(())
    }

    fn set_layer_surface_damage(&mut self, display: DisplayId, layer: LayerId, _damage: &[Option<Rect>]) -> HwcResult {
        self.display_mut(display)?.layer_mut(layer)?;
        Ok(())
    }

    fn set_layer_blend_mode(&mut self, display: DisplayId, layer: LayerId, mode: BlendMode) -> HwcResult {
        if mode == BlendMode::Invalid {
            return Err(HwcError::BadParameter);
        }
        self.touch_layer(display, layer)
    }

    fn set_layer_color(&mut self, display: DisplayId, layer: LayerId, _color: Color) -> HwcResult {
        self.touch_layer(display, layer)
    }

    fn set_layer_composition_type(&mut self, display: DisplayId, layer: LayerId, composition: Composition) -> HwcResult {
        if composition == Composition::Invalid {
            return Err(HwcError::BadParameter);
        }
        self.update_layer(display, layer, |target| target.composition = composition)
    }

    fn set_layer_dataspace(&mut self, display: DisplayId, layer: LayerId, _dataspace: Dataspace) -> HwcResult {
        self.touch_layer(display, layer)
    }

    fn set_layer_display_frame(&mut self, display: DisplayId, layer: LayerId, frame: Rect) -> HwcResult {
        if frame.width() < 0 || frame.height() < 0 {
            return Err(HwcError::BadParameter);
        }
        self.update_layer(display, layer, |target| target.display_frame = frame)
    }

    fn set_layer_plane_alpha(&mut self, display: DisplayId, layer: LayerId, alpha: f32) -> HwcResult {
        if !(0.0..=1.0).contains(&alpha) {
            return Err(HwcError::BadParameter);
        }
        self.update_layer(display, layer, |target| target.plane_alpha = alpha)
    }

    fn set_layer_sideband_stream(&mut self, display: DisplayId, layer: LayerId, stream: &BufferHandle) -> HwcResult {
        let stream = stream.clone();
        self.update_layer(display, layer, |target| target.sideband = Some(stream))
    }

    fn set_layer_source_crop(&mut self, display: DisplayId, layer: LayerId, crop: FRect) -> HwcResult {
        if crop.right < crop.left || crop.bottom < crop.top {
            return Err(HwcError::BadParameter);
        }
        self.touch_layer(display, layer)
    }

    fn set_layer_transform(&mut self, display: DisplayId, layer: LayerId, _transform: Transform) -> HwcResult {
        self.touch_layer(display, layer)
    }

    fn set_layer_visible_region(&mut self, display: DisplayId, layer: LayerId, _region: &[Option<Rect>]) -> HwcResult {
        self.touch_layer(display, layer)
    }

    fn set_layer_z_order(&mut self, display: DisplayId, layer: LayerId, z: u32) -> HwcResult {
        self.update_layer(display, layer, |target| target.z = z)
    }

    fn set_layer_color_transform(&mut self, display: DisplayId, layer: LayerId, matrix: &[f32]) -> HwcResult {
        check_matrix(matrix)?;
        self.touch_layer(display, layer)
    }

    fn set_layer_per_frame_metadata(
        &mut self,
        display: DisplayId,
        layer: LayerId,
        _metadata: &[Option<PerFrameMetadata>],
    ) -> HwcResult {
        self.touch_layer(display, layer)
    }

    fn set_layer_per_frame_metadata_blobs(
        &mut self,
        display: DisplayId,
        layer: LayerId,
        _blobs: &[Option<PerFrameMetadataBlob>],
    ) -> HwcResult {
        self.touch_layer(display, layer)
    }
}
