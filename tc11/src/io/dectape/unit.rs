use std::path::PathBuf;

use delegate::delegate;
use log::debug;

use super::geometry::{Format, Geometry, END_ZONE_LINES};
use super::image::TapeImage;
use super::motion::{advance_position, OffTape, Pending, Regime, Timing};

pub(super) struct Media {
    pub(super) image: TapeImage,
    pub(super) file: Option<PathBuf>,
}

/// One TU56 transport.
pub struct Unit {
    pub(super) position: u32,
    pub(super) regime: Regime,
    pub(super) pending: Pending,
    pub(super) last_update: u64,
    pub(super) write_locked: bool,
    pub(super) media: Option<Media>,
    format: Format,
    geometry: Geometry,
}

impl Unit {
    pub fn new() -> Self {
        let format = Format::default();
        Unit {
            position: 0,
            regime: Regime::Stopped,
            pending: Pending::none(),
            last_update: 0,
            write_locked: false,
            media: None,
            format,
            geometry: format.geometry(),
        }
    }

    delegate! {
        to self.geometry {
            pub fn block_of(&self, pos: u32) -> u32;
            pub fn offset_in_block(&self, pos: u32) -> u32;
            pub fn word_index(&self, pos: u32) -> u32;
            pub fn block_start_line(&self, block: u32) -> u32;
            pub fn in_end_zone(&self, pos: u32) -> bool;
            pub fn in_reverse_end_zone(&self, pos: u32) -> bool;
            pub fn in_forward_end_zone(&self, pos: u32) -> bool;
            pub fn in_data_zone(&self, offset: u32) -> bool;
            pub fn lines_per_block(&self) -> u32;
            pub fn forward_end_zone_line(&self) -> u32;
            pub fn last_line(&self) -> u32;
        }
    }

    pub fn position(&self) -> u32 {
        self.position
    }

    pub fn regime(&self) -> Regime {
        self.regime
    }

    pub fn pending(&self) -> Pending {
        self.pending
    }

    pub fn format(&self) -> Format {
        self.format
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    pub fn is_attached(&self) -> bool {
        self.media.is_some()
    }

    pub fn is_write_locked(&self) -> bool {
        self.write_locked
    }

    pub fn image(&self) -> Option<&TapeImage> {
        self.media.as_ref().map(|m| &m.image)
    }

    // Block size in words.
    pub fn block_words(&self) -> u32 {
        self.geometry.block_words
    }

    /// Brings `position` up to date with the clock. The unit itself is left
    /// alone if it ran off the reel; that's for the controller to handle.
    pub fn update_position(&mut self, now: u64, timing: &Timing) -> Result<(), OffTape> {
        let elapsed = now - self.last_update;
        if elapsed == 0 {
            return Ok(());
        }
        self.last_update = now;
        self.position =
            advance_position(self.position, self.regime, elapsed, timing, &self.geometry)?;
        Ok(())
    }

    pub(super) fn mount(&mut self, media: Media, write_locked: bool, now: u64) {
        self.format = media.image.format();
        self.geometry = self.format.geometry();
        self.media = Some(media);
        self.write_locked = write_locked;
        self.position = END_ZONE_LINES;
        self.regime = Regime::Stopped;
        self.pending = Pending::none();
        self.last_update = now;
    }

    pub(super) fn unmount(&mut self) -> Option<Media> {
        debug!("unit unmounted at line {} while {:?}", self.position, self.regime);
        self.position = 0;
        self.regime = Regime::Stopped;
        self.pending = Pending::none();
        self.media.take()
    }

    pub(super) fn word(&self, index: usize) -> u32 {
        self.media.as_ref().map_or(0, |m| m.image.words()[index])
    }

    pub(super) fn set_word(&mut self, index: usize, val: u32) {
        if let Some(media) = self.media.as_mut() {
            media.image.words_mut()[index] = val;
        }
    }

    pub(super) fn block_data(&self, block: u32) -> &[u32] {
        match &self.media {
            Some(media) => media.image.block(block),
            None => &[],
        }
    }
}

impl Default for Unit {
    fn default() -> Self {
        Self::new()
    }
}
