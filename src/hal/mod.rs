//! Hardware abstraction layer: generator command queue, safety interlock
//! aggregation, AEC-terminated exposure, and the detector's DMA ring
//! buffer and plugin loader (spec §4.3-§4.7).

pub mod aec;
pub mod command_queue;
pub mod detector;
pub mod generator;
pub mod interlock;

pub use aec::AecController;
pub use command_queue::CommandQueue;
pub use detector::{DetectorPluginLoader, DmaRingBuffer, LoadedDetectorPlugin, OverwritePolicy};
pub use generator::{Generator, GeneratorTransport};
pub use interlock::SafetyInterlockAggregator;
