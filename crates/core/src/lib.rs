#![deny(warnings)]

pub mod config;
pub mod conversation;
pub mod emotion;
pub mod playback;
pub mod profile;
pub mod selector;
pub mod tts;
pub mod util;
