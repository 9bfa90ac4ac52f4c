//! Per-command results returned after a batch executes.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::commands::{Composition, Dataspace, DisplayId, Fence, LayerId, PixelFormat};

bitflags! {
    /// Display-wide requests reported by validate
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DisplayRequestFlags: u32 {
        const FLIP_CLIENT_TARGET             = 1 << 0;
        const WRITE_CLIENT_TARGET_TO_OUTPUT  = 1 << 1;
    }
}

bitflags! {
    /// Per-layer requests reported by validate
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct LayerRequestFlags: u32 {
        const CLEAR_CLIENT_TARGET = 1 << 0;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangedCompositionLayer {
    pub layer: LayerId,
    pub composition: Composition,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerRequest {
    pub layer: LayerId,
    pub mask: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayRequest {
    pub mask: u32,
    pub layer_requests: Vec<LayerRequest>,
}

impl DisplayRequest {
    pub fn flags(&self) -> DisplayRequestFlags {
        DisplayRequestFlags::from_bits_truncate(self.mask)
    }
}

/// Format hint for the buffer the client should render into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientTargetProperty {
    pub pixel_format: PixelFormat,
    pub dataspace: Dataspace,
}

impl Default for ClientTargetProperty {
    fn default() -> Self {
        Self {
            pixel_format: PixelFormat::RGBA_8888,
            dataspace: Dataspace::UNKNOWN,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseFence {
    pub layer: LayerId,
    pub fence: Fence,
}

/// Outcome of the combined present-or-validate operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PresentOrValidateResult {
    /// The client must compose and retry on the next frame
    Validated,
    Presented,
}

/// Everything recorded against one command index.
///
/// A command that failed carries one or more error codes; it may still carry data
/// from sub-operations that succeeded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandResult {
    pub command_index: u32,
    pub display: DisplayId,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changed_composition_types: Option<Vec<ChangedCompositionLayer>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_request: Option<DisplayRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_target_property: Option<ClientTargetProperty>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub present_fence: Option<Fence>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_fences: Option<Vec<ReleaseFence>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub present_or_validate: Option<PresentOrValidateResult>,
}

impl CommandResult {
    pub fn new(command_index: u32, display: DisplayId) -> Self {
        Self {
            command_index,
            display,
            errors: Vec::new(),
            changed_composition_types: None,
            display_request: None,
            client_target_property: None,
            present_fence: None,
            release_fences: None,
            present_or_validate: None,
        }
    }

    pub fn is_error(&self) -> bool {
        !self.errors.is_empty()
    }
}
