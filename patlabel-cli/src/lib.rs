//! # Pattern labelling front end (patlabel-cli)
//!
//! Session context, background persistence and the decoded-image cache that
//! sit between the core engine in `patlabel-common` and a user interface. The
//! `patlabel` binary drives every operation headlessly.

pub mod image_cache;
pub mod last_run;
pub mod save_worker;
pub mod session;

pub use image_cache::{DecodedImage, FileBytesDecoder, ImageCache, ImageDecoder};
pub use last_run::LastRunInfo;
pub use save_worker::{SaveRequest, SaveWorker};
pub use session::{ImportReport, Session};
