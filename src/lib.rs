//! frameplayer: a tick-driven media player over native decode engines
//!
//! An engine decodes and times media on its own threads and reports what it
//! does through an event sink. A [`MediaPlayer`] drains those events once per
//! tick on the consumer's thread, turns them into [`PlayerEvent`]s and hands
//! out the current frame either as a locked GPU texture or as a CPU
//! [`Surface`].
//!
//! ```no_run
//! use frameplayer::{MediaFormat, MediaPlayer, MediaSource, UpdateSignal};
//!
//! let player = MediaPlayer::create(MediaSource::file("clip.mp4"), MediaFormat::default())
//!     .expect("player");
//! let _sub = player.subscribe(|event| println!("{}", event));
//! player.play();
//! loop {
//!     UpdateSignal::global().emit();
//!     if player.check_new_frame() {
//!         let lease = player.texture();
//!         // draw lease.texture() ...
//!         drop(lease);
//!     }
//! #   break;
//! }
//! ```

pub mod engine;
pub mod player;
pub mod render;
pub mod utils;

pub use engine::{EngineFactory, FfmpegEngineFactory, MediaSource, SyntheticEngineFactory};
pub use player::{
    error_to_string, Bounds, ErrorCode, EventSubscription, MediaFormat, MediaPlayer,
    MediaPlayerBuilder, MediaPlayerRef, PlayerEvent, UpdateSignal,
};
pub use render::{FrameLease, Surface};
pub use utils::error::{PlayerError, Result};
