//! Display Hardware Abstraction
//!
//! The primitive operations the command engine drives. Each returns
//! `Result<_, HwcError>`; the integer codes follow the hwcomposer2 numbering so
//! they can be handed back to clients unchanged.

use composer_ipc::{
    BlendMode, ChangedCompositionLayer, ClientTargetProperty, ClockMonotonicTimestamp, Color,
    Composition, Dataspace, DisplayId, DisplayRequest, FRect, Fence, LayerId, PerFrameMetadata,
    PerFrameMetadataBlob, Rect, ReleaseFence, Transform,
};
use thiserror::Error;

use crate::resources::BufferHandle;

/// Failure status of a hardware call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum HwcError {
    #[error("invalid display configuration")]
    BadConfig,
    #[error("unknown display")]
    BadDisplay,
    #[error("unknown layer")]
    BadLayer,
    #[error("invalid parameter")]
    BadParameter,
    #[error("out of hardware resources")]
    NoResources,
    #[error("display has not been validated")]
    NotValidated,
    #[error("operation not supported")]
    Unsupported,
}

impl HwcError {
    /// Wire error code
    pub fn code(self) -> i32 {
        match self {
            HwcError::BadConfig => 1,
            HwcError::BadDisplay => 2,
            HwcError::BadLayer => 3,
            HwcError::BadParameter => 4,
            HwcError::NoResources => 6,
            HwcError::NotValidated => 7,
            HwcError::Unsupported => 8,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(HwcError::BadConfig),
            2 => Some(HwcError::BadDisplay),
            3 => Some(HwcError::BadLayer),
            4 => Some(HwcError::BadParameter),
            6 => Some(HwcError::NoResources),
            7 => Some(HwcError::NotValidated),
            8 => Some(HwcError::Unsupported),
            _ => None,
        }
    }
}

/// Non-error outcomes of validate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidateStatus {
    NoChanges,
    HasChanges,
}

/// Everything validate reports besides its status
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DisplayChanges {
    pub changed_compositions: Vec<ChangedCompositionLayer>,
    pub display_request: DisplayRequest,
    pub client_target_property: ClientTargetProperty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidateOutcome {
    pub status: ValidateStatus,
    pub changes: DisplayChanges,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PresentOutcome {
    /// `Fence::NO_FENCE` when the display did not produce one
    pub present_fence: Fence,
    pub release_fences: Vec<ReleaseFence>,
}

pub type HwcResult<T = ()> = Result<T, HwcError>;

/// Primitive display hardware operations.
///
/// Calls may block (for example present waiting on acquire fences).
pub trait ComposerHal {
    // Lifecycle, driven outside of command batches
    fn create_layer(&mut self, display: DisplayId) -> HwcResult<LayerId>;
    fn destroy_layer(&mut self, display: DisplayId, layer: LayerId) -> HwcResult;

    // Display state
    fn set_color_transform(&mut self, display: DisplayId, matrix: &[f32]) -> HwcResult;
    fn set_client_target(
        &mut self,
        display: DisplayId,
        target: &BufferHandle,
        fence: Fence,
        dataspace: Dataspace,
        damage: &[Option<Rect>],
    ) -> HwcResult;
    fn set_output_buffer(&mut self, display: DisplayId, buffer: &BufferHandle, fence: Fence) -> HwcResult;
    fn set_display_brightness(&mut self, display: DisplayId, brightness: f32) -> HwcResult;
    fn set_expected_present_time(
        &mut self,
        display: DisplayId,
        expected: Option<ClockMonotonicTimestamp>,
    ) -> HwcResult;

    // Present/validate protocol
    fn validate_display(&mut self, display: DisplayId) -> HwcResult<ValidateOutcome>;
    fn accept_display_changes(&mut self, display: DisplayId) -> HwcResult;
    fn present_display(&mut self, display: DisplayId) -> HwcResult<PresentOutcome>;
    fn has_client_composition(&mut self, display: DisplayId) -> HwcResult<bool>;

    // Layer state
    fn set_layer_cursor_position(&mut self, display: DisplayId, layer: LayerId, x: i32, y: i32) -> HwcResult;
    fn set_layer_buffer(&mut self, display: DisplayId, layer: LayerId, buffer: &BufferHandle, fence: Fence) -> HwcResult;
    fn set_layer_surface_damage(&mut self, display: DisplayId, layer: LayerId, damage: &[Option<Rect>]) -> HwcResult;
    fn set_layer_blend_mode(&mut self, display: DisplayId, layer: LayerId, mode: BlendMode) -> HwcResult;
    fn set_layer_color(&mut self, display: DisplayId, layer: LayerId, color: Color) -> HwcResult;
    fn set_layer_composition_type(&mut self, display: DisplayId, layer: LayerId, composition: Composition) -> HwcResult;
    fn set_layer_dataspace(&mut self, display: DisplayId, layer: LayerId, dataspace: Dataspace) -> HwcResult;
    fn set_layer_display_frame(&mut self, display: DisplayId, layer: LayerId, frame: Rect) -> HwcResult;
    fn set_layer_plane_alpha(&mut self, display: DisplayId, layer: LayerId, alpha: f32) -> HwcResult;
    fn set_layer_sideband_stream(&mut self, display: DisplayId, layer: LayerId, stream: &BufferHandle) -> HwcResult;
    fn set_layer_source_crop(&mut self, display: DisplayId, layer: LayerId, crop: FRect) -> HwcResult;
    fn set_layer_transform(&mut self, display: DisplayId, layer: LayerId, transform: Transform) -> HwcResult;
    fn set_layer_visible_region(&mut self, display: DisplayId, layer: LayerId, region: &[Option<Rect>]) -> HwcResult;
    fn set_layer_z_order(&mut self, display: DisplayId, layer: LayerId, z: u32) -> HwcResult;
    fn set_layer_color_transform(&mut self, display: DisplayId, layer: LayerId, matrix: &[f32]) -> HwcResult;
    fn set_layer_per_frame_metadata(
        &mut self,
        display: DisplayId,
        layer: LayerId,
        metadata: &[Option<PerFrameMetadata>],
    ) -> HwcResult;
    fn set_layer_per_frame_metadata_blobs(
        &mut self,
        display: DisplayId,
        layer: LayerId,
        blobs: &[Option<PerFrameMetadataBlob>],
    ) -> HwcResult;
}
