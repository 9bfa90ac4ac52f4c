//! Command batch types.
//!
//! A batch is an ordered list of [`DisplayCommand`]s. Every optional field that is
//! populated maps to exactly one operation on the display hardware; absent fields
//! are skipped.

use serde::{Deserialize, Serialize};

/// Stable display identifier for the lifetime of a session
pub type DisplayId = i64;

/// Layer identifier, unique within its display
pub type LayerId = i64;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

/// Integer rectangle, right/bottom exclusive
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    pub fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self { left, top, right, bottom }
    }

    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }
}

/// Sub-pixel rectangle used for source crops
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FRect {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

/// Solid color, components 0.0-1.0
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlendMode {
    Invalid,
    #[default]
    None,
    Premultiplied,
    Coverage,
}

/// How a layer is composed onto its display
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Composition {
    Invalid,
    /// Composed by the client into the client target
    Client,
    /// Scanned out by the display hardware
    #[default]
    Device,
    SolidColor,
    Cursor,
    Sideband,
    DisplayDecoration,
    RefreshRateIndicator,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Transform {
    #[default]
    None,
    FlipH,
    FlipV,
    Rot90,
    Rot180,
    Rot270,
}

/// Opaque color space tag, forwarded verbatim to the hardware
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Dataspace(pub i32);

impl Dataspace {
    pub const UNKNOWN: Dataspace = Dataspace(0);
    pub const SRGB: Dataspace = Dataspace(142_671_872);
}

/// Opaque pixel format tag
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PixelFormat(pub i32);

impl PixelFormat {
    pub const RGBA_8888: PixelFormat = PixelFormat(1);
}

/// Synchronization handle. `-1` means "no fence".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fence(pub i32);

impl Fence {
    pub const NO_FENCE: Fence = Fence(-1);

    pub fn is_valid(&self) -> bool {
        self.0 >= 0
    }
}

impl Default for Fence {
    fn default() -> Self {
        Self::NO_FENCE
    }
}

/// Native buffer or stream handle as transmitted on the wire
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NativeHandle {
    pub fds: Vec<i32>,
    pub ints: Vec<i32>,
}

/// Buffer descriptor.
///
/// `handle` is only sent when the slot's cached buffer must change; a missing
/// handle means "use whatever is cached in `slot`".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Buffer {
    pub slot: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handle: Option<NativeHandle>,
    #[serde(default)]
    pub fence: Fence,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientTarget {
    pub buffer: Buffer,
    #[serde(default)]
    pub dataspace: Dataspace,
    #[serde(default)]
    pub damage: Vec<Option<Rect>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DisplayBrightness {
    /// 0.0-1.0, or -1.0 to turn the backlight off
    pub brightness: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockMonotonicTimestamp {
    pub timestamp_nanos: i64,
}

/// HDR static/dynamic metadata keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PerFrameMetadataKey {
    DisplayRedPrimaryX,
    DisplayRedPrimaryY,
    DisplayGreenPrimaryX,
    DisplayGreenPrimaryY,
    DisplayBluePrimaryX,
    DisplayBluePrimaryY,
    WhitePointX,
    WhitePointY,
    MaxLuminance,
    MinLuminance,
    MaxContentLightLevel,
    MaxFrameAverageLightLevel,
    Hdr10PlusSei,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PerFrameMetadata {
    pub key: PerFrameMetadataKey,
    pub value: f32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerFrameMetadataBlob {
    pub key: PerFrameMetadataKey,
    pub blob: Vec<u8>,
}

/// Per-layer property changes for one frame
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayerCommand {
    pub layer: LayerId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor_position: Option<Point>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buffer: Option<Buffer>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub damage: Option<Vec<Option<Rect>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blend_mode: Option<BlendMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<Color>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub composition: Option<Composition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dataspace: Option<Dataspace>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_frame: Option<Rect>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plane_alpha: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sideband_stream: Option<NativeHandle>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_crop: Option<FRect>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transform: Option<Transform>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visible_region: Option<Vec<Option<Rect>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub z: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color_transform: Option<Vec<f32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub per_frame_metadata: Option<Vec<Option<PerFrameMetadata>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub per_frame_metadata_blob: Option<Vec<Option<PerFrameMetadataBlob>>>,
}

impl LayerCommand {
    pub fn new(layer: LayerId) -> Self {
        Self {
            layer,
            ..Default::default()
        }
    }
}

/// Per-display work for one frame.
///
/// Layer commands run first, then the display fields in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayCommand {
    pub display: DisplayId,
    pub layers: Vec<LayerCommand>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color_transform_matrix: Option<Vec<f32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_target: Option<ClientTarget>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub virtual_display_output_buffer: Option<Buffer>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brightness: Option<DisplayBrightness>,
    /// Shared by `validate_display` and `present_or_validate_display`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_present_time: Option<ClockMonotonicTimestamp>,
    pub validate_display: bool,
    pub accept_display_changes: bool,
    pub present_display: bool,
    pub present_or_validate_display: bool,
}

impl DisplayCommand {
    pub fn new(display: DisplayId) -> Self {
        Self {
            display,
            ..Default::default()
        }
    }
}
