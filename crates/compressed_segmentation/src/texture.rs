//! Packing encoded buffers into 2D textures.
//!
//! Each 32-bit word becomes one RGBA8 texel (`r` = least significant byte),
//! laid out row-major. Word offset `o` lives at texel
//! `(o % width, o / width)`.
//!
//! Layouts are computed per chunk through
//! [`TextureLayoutCache::get_or_compute`], keyed by the chunk's data size,
//! block size and encoded length. [`compute_layout`] is the uncached core:
//! the grid depends only on the word count and the maximum texture dimension.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::core::{ChunkGeometry, MAX_OFFSET};
use crate::error::FormatCapacityError;

/// Texel grid holding one encoded buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureLayout {
    pub width: u32,
    pub height: u32,
    /// Valid words; texels past this are zero padding.
    pub word_length: usize,
    /// `[1 / width, 1 / (width * height)]`.
    pub texture_access_coefficients: [f32; 2],
}

impl TextureLayout {
    pub fn texel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Integer texel `[x, y]` holding word `offset`.
    pub fn texel_position(&self, offset: usize) -> [u32; 2] {
        let width = self.width as usize;
        [(offset % width) as u32, (offset / width) as u32]
    }

    /// Normalized texture coordinates for word `offset`:
    /// `(fract(offset / width), offset / (width * height))`.
    ///
    /// The result addresses the texel's lower corner; samplers should use
    /// nearest filtering.
    pub fn normalized_coordinates(&self, offset: usize) -> [f32; 2] {
        let offset = offset as f32;
        let [cx, cy] = self.texture_access_coefficients;
        [(offset * cx).fract(), offset * cy]
    }
}

/// Choose a texel grid for `word_length` words.
///
/// `width = ceil(word_length / max_texture_dimension)` and
/// `height = ceil(word_length / width)`, so `height` never exceeds the
/// maximum; a chunk whose `width` would exceed it does not fit.
pub fn compute_layout(
    word_length: usize,
    max_texture_dimension: u32,
) -> Result<TextureLayout, FormatCapacityError> {
    // Offsets past 2^24 are neither encodable nor exact in f32 arithmetic.
    if word_length > MAX_OFFSET + 1 {
        return Err(FormatCapacityError::OffsetOverflow {
            field: "texture",
            offset: word_length,
        });
    }
    let max_dimension = max_texture_dimension.max(1) as usize;
    let width = word_length.div_ceil(max_dimension).max(1);
    if width > max_dimension {
        return Err(FormatCapacityError::TextureTooLarge {
            word_length,
            width,
            max_dimension: max_texture_dimension,
        });
    }
    let height = word_length.div_ceil(width).max(1);

    Ok(TextureLayout {
        width: width as u32,
        height: height as u32,
        word_length,
        texture_access_coefficients: [1.0 / width as f32, 1.0 / (width * height) as f32],
    })
}

/// Texel bytes for `buffer`, zero-padded to the full grid.
pub fn pack_texels(buffer: &[u32], layout: &TextureLayout) -> Vec<u8> {
    debug_assert!(buffer.len() <= layout.texel_count());
    let mut texels: Vec<u8> = buffer.iter().flat_map(|word| word.to_le_bytes()).collect();
    texels.resize(layout.texel_count() * 4, 0);
    texels
}

/// Cache key: one layout per chunk shape and buffer length.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LayoutKey {
    pub data_size: [u32; 3],
    pub block_size: [u32; 3],
    pub word_length: usize,
}

impl LayoutKey {
    pub fn new(geometry: &ChunkGeometry, word_length: usize) -> Self {
        Self {
            data_size: geometry.data_size.to_array(),
            block_size: geometry.block_size.to_array(),
            word_length,
        }
    }
}

/// Memoized texture layouts, owned by whoever owns the rendering context.
///
/// Concurrent misses on the same key may both compute the layout; the first
/// insert wins and both callers see equal values. Eviction is left to the
/// owner ([`remove`](Self::remove), [`clear`](Self::clear)).
pub struct TextureLayoutCache {
    max_texture_dimension: u32,
    entries: RwLock<HashMap<LayoutKey, Arc<TextureLayout>>>,
}

impl TextureLayoutCache {
    pub fn new(max_texture_dimension: u32) -> Self {
        Self {
            max_texture_dimension,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn max_texture_dimension(&self) -> u32 {
        self.max_texture_dimension
    }

    /// Layout for an encoded chunk of `geometry` spanning `word_length`
    /// words, computed on first use and shared afterwards.
    ///
    /// ```
    /// use compressed_segmentation::{
    ///     encode_chunk, ChunkGeometry, DataType, EncodeOptions, TextureLayoutCache,
    /// };
    ///
    /// let geometry = ChunkGeometry::new([8, 8, 8], [4, 4, 4], 1, DataType::Uint32);
    /// let values: Vec<u32> = (0..512).map(|i| i % 5).collect();
    /// let encoded = encode_chunk(&values, &geometry, &EncodeOptions::default())?;
    ///
    /// let cache = TextureLayoutCache::new(64);
    /// let layout = cache.get_or_compute(&geometry, encoded.len())?;
    /// assert!(layout.texel_count() >= encoded.len());
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn get_or_compute(
        &self,
        geometry: &ChunkGeometry,
        word_length: usize,
    ) -> Result<Arc<TextureLayout>, FormatCapacityError> {
        let key = LayoutKey::new(geometry, word_length);
        if let Some(layout) = self.entries.read().get(&key) {
            return Ok(Arc::clone(layout));
        }

        let layout = Arc::new(compute_layout(word_length, self.max_texture_dimension)?);
        log::debug!(
            "texture layout {}x{} for {} words ({:?} / {:?})",
            layout.width,
            layout.height,
            word_length,
            key.data_size,
            key.block_size
        );
        let mut entries = self.entries.write();
        Ok(Arc::clone(entries.entry(key).or_insert(layout)))
    }

    pub fn remove(&self, key: &LayoutKey) -> Option<Arc<TextureLayout>> {
        self.entries.write().remove(key)
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
