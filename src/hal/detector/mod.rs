//! Detector-side HAL: the DMA ring buffer (spec §4.6) and the vendor
//! plugin loader (spec §4.5).

pub mod plugin;
pub mod ring_buffer;

pub use plugin::{
    DetectorConfig, DetectorHandle, DetectorManifestInfo, DetectorPluginLoader,
    LoadedDetectorPlugin,
};
pub use ring_buffer::{DmaRingBuffer, OverwritePolicy};
