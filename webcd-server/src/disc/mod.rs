//! Disc access: TOC reading, fingerprinting, drive discovery and eject

pub mod devices;
pub mod eject;
pub mod fingerprint;
pub mod reader;

pub use devices::{DeviceInfo, DeviceProber};
pub use fingerprint::{DiscIdRecord, Fingerprint, Fingerprinter};
pub use reader::{DiscReader, TableOfContents, TocSource};
