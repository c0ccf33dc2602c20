//! Backing images. In memory a tape is always a flat array of 18-bit words;
//! on disk it is one of three encodings.
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use common::constants::{WORD12_MASK, WORD18_MASK, WORD_MASK};
use common::mem::{u16s_from_le_bytes, u16s_to_le_bytes, u32s_from_le_bytes, u32s_to_le_bytes};
use log::info;
use thiserror::Error;

use super::geometry::Format;

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{len} bytes is more than a {format} tape holds ({max} bytes)")]
    TooLarge { len: usize, format: Format, max: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TapeImage {
    format: Format,
    words: Vec<u32>,
}

impl TapeImage {
    pub fn blank(format: Format) -> Self {
        TapeImage {
            format,
            words: vec![0; format.geometry().capacity()],
        }
    }

    pub fn from_bytes(bytes: &[u8], format: Option<Format>) -> Result<Self, ImageError> {
        let format = format.unwrap_or_else(|| Format::from_file_size(bytes.len()));
        let max = format.file_bytes();
        if bytes.len() > max {
            return Err(ImageError::TooLarge { len: bytes.len(), format, max });
        }

        let mut words = match format {
            Format::Bits12 => pack_12(&u16s_from_le_bytes(bytes)),
            Format::Bits16 => u16s_from_le_bytes(bytes).into_iter().map(u32::from).collect(),
            Format::Bits18 => u32s_from_le_bytes(bytes)
                .into_iter()
                .map(|w| w & WORD18_MASK)
                .collect(),
        };
        words.resize(format.geometry().capacity(), 0);
        Ok(TapeImage { format, words })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        match self.format {
            Format::Bits12 => u16s_to_le_bytes(&unpack_12(&self.words)),
            Format::Bits16 => {
                let cells: Vec<u16> = self.words.iter().map(|w| (w & WORD_MASK) as u16).collect();
                u16s_to_le_bytes(&cells)
            }
            Format::Bits18 => u32s_to_le_bytes(&self.words),
        }
    }

    // A missing file is a fresh tape.
    pub fn load(path: &Path, format: Option<Format>) -> Result<Self, ImageError> {
        match fs::read(path) {
            Ok(bytes) => Self::from_bytes(&bytes, format),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                let format = format.unwrap_or_default();
                info!("{}: not found, creating a blank {format} tape", path.display());
                Ok(Self::blank(format))
            }
            Err(source) => Err(ImageError::Io { path: path.to_path_buf(), source }),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), ImageError> {
        fs::write(path, self.to_bytes()).map_err(|source| ImageError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    // Re-encodes word for word; the result is padded or cut to the new size.
    pub fn convert(&self, to: Format) -> TapeImage {
        if to == self.format {
            return self.clone();
        }
        let mut words = self.words.clone();
        if to == Format::Bits16 {
            words.iter_mut().for_each(|w| *w &= WORD_MASK);
        }
        words.resize(to.geometry().capacity(), 0);
        TapeImage { format: to, words }
    }

    pub fn format(&self) -> Format {
        self.format
    }

    pub fn words(&self) -> &[u32] {
        &self.words
    }

    pub fn words_mut(&mut self) -> &mut [u32] {
        &mut self.words
    }

    pub fn block(&self, block: u32) -> &[u32] {
        let size = self.format.geometry().block_words as usize;
        let start = block as usize * size;
        &self.words[start..start + size]
    }
}

// Three 12-bit words make two 18-bit words.
pub fn pack_12(cells: &[u16]) -> Vec<u32> {
    cells
        .chunks(3)
        .flat_map(|chunk| {
            let cell = |i: usize| chunk.get(i).copied().unwrap_or(0) as u32 & WORD12_MASK;
            let (a, b, c) = (cell(0), cell(1), cell(2));
            [(a << 6) | (b >> 6), ((b & 0o77) << 12) | c]
        })
        .collect()
}

pub fn unpack_12(words: &[u32]) -> Vec<u16> {
    words
        .chunks(2)
        .flat_map(|chunk| {
            let w0 = chunk[0];
            let w1 = chunk.get(1).copied().unwrap_or(0);
            [
                ((w0 >> 6) & WORD12_MASK) as u16,
                (((w0 & 0o77) << 6) | ((w1 >> 12) & 0o77)) as u16,
                (w1 & WORD12_MASK) as u16,
            ]
        })
        .collect()
}
