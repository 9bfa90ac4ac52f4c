//! Area Composer
//!
//! Display composer service: executes batches of layer and display commands
//! against a hardware abstraction and reports per-command results back to the
//! client.

pub mod config;
pub mod engine;
pub mod hal;
pub mod headless;
pub mod resources;
pub mod server;
pub mod writer;

pub use config::ComposerConfig;
pub use engine::{ComposerCommandEngine, PresentState};
pub use hal::{ComposerHal, HwcError, HwcResult};
pub use headless::HeadlessHal;
pub use resources::{ComposerResources, ResourceCache, ResourceError};
