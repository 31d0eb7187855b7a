//! Encoder producing the block-compressed layout read by [`crate::decode`]
//! and [`crate::texel_decode`].
//!
//! Per channel, starting at the channel's base word:
//!
//! ```text
//! base + 0               next-channel link (absolute offset, low 24 bits)
//! base + 1 ..            2 header words per block, fortran block order
//!                          word 0: value table offset | bits << 24
//!                          word 1: code table offset (0 when bits == 0)
//! ...                    per block: code table, then value table
//! ```
//!
//! Table offsets are relative to the channel base. Code tables cover the full
//! block extent so a decoder never needs clipped block sizes; value tables
//! hold only values that occur inside the chunk.

use std::collections::HashMap;

use glam::UVec3;

use crate::core::{
    ChunkGeometry, EncodedValue, HEADER_TABLE_OFFSET, MAX_ENCODING_BITS, MAX_OFFSET,
};
use crate::error::{EncodeError, FormatCapacityError, GeometryError};
use crate::packing::{encoding_bits, required_words, set_code};

#[derive(Debug, Clone)]
pub struct EncodeOptions {
    /// Point blocks with identical value tables at a single stored copy.
    pub share_value_tables: bool,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            share_value_tables: true,
        }
    }
}

fn check_offset(field: &'static str, offset: usize) -> Result<u32, FormatCapacityError> {
    if offset > MAX_OFFSET {
        return Err(FormatCapacityError::OffsetOverflow { field, offset });
    }
    Ok(offset as u32)
}

fn check_value_type<V: EncodedValue>(geometry: &ChunkGeometry) -> Result<(), GeometryError> {
    if geometry.data_type != V::DATA_TYPE {
        return Err(GeometryError::DataTypeMismatch {
            declared: geometry.data_type.name(),
            supplied: V::DATA_TYPE.name(),
        });
    }
    Ok(())
}

/// Encode every channel of a chunk.
///
/// `values` holds `num_channels` channels back to back, each in fortran
/// (x-fastest) order: the `[channel, z, y, x]` array layout.
///
/// # Examples
/// ```
/// use compressed_segmentation::{decode_single_voxel, encode_chunk, ChunkGeometry, DataType, EncodeOptions};
///
/// let geometry = ChunkGeometry::new([4, 4, 1], [2, 2, 1], 1, DataType::Uint32);
/// let values: Vec<u32> = (0..16).map(|i| i / 2).collect();
/// let encoded = encode_chunk(&values, &geometry, &EncodeOptions::default()).unwrap();
///
/// let value: u32 = decode_single_voxel(&encoded, 0, &geometry, [3, 2, 0].into());
/// assert_eq!(value, values[3 + 4 * 2]);
/// ```
pub fn encode_chunk<V: EncodedValue>(
    values: &[V],
    geometry: &ChunkGeometry,
    options: &EncodeOptions,
) -> Result<Vec<u32>, EncodeError> {
    geometry.validate()?;
    check_value_type::<V>(geometry)?;
    let per_channel = geometry.num_voxels();
    let expected = per_channel * geometry.num_channels as usize;
    if values.len() != expected {
        return Err(GeometryError::ValueCountMismatch {
            expected,
            actual: values.len(),
        }
        .into());
    }

    let mut out = Vec::new();
    for channel_values in values.chunks_exact(per_channel) {
        encode_channel(&mut out, channel_values, geometry, options)?;
    }
    log::debug!(
        "encoded {} channel(s) of {:?} {} voxels into {} words",
        geometry.num_channels,
        geometry.data_size.to_array(),
        geometry.data_type,
        out.len()
    );
    Ok(out)
}

/// Append one channel to `out`; the channel's base is `out.len()` on entry.
///
/// Returns the channel's base offset.
pub fn encode_channel<V: EncodedValue>(
    out: &mut Vec<u32>,
    values: &[V],
    geometry: &ChunkGeometry,
    options: &EncodeOptions,
) -> Result<usize, EncodeError> {
    geometry.validate()?;
    check_value_type::<V>(geometry)?;
    if values.len() != geometry.num_voxels() {
        return Err(GeometryError::ValueCountMismatch {
            expected: geometry.num_voxels(),
            actual: values.len(),
        }
        .into());
    }

    let base = out.len();
    let grid = geometry.grid_size();
    let num_blocks = geometry.num_blocks();
    let block_voxels = geometry.block_voxels();
    let block_size = geometry.block_size;

    // Every table lands after the headers, so their end must be addressable.
    check_offset("header table", HEADER_TABLE_OFFSET + 2 * num_blocks)?;

    // Link word, patched once the channel's length is known.
    out.push(0);
    let header_start = base + HEADER_TABLE_OFFSET;
    out.resize(header_start + 2 * num_blocks, 0);

    let mut shared_tables: HashMap<Vec<u32>, u32> = HashMap::new();
    let mut block_values: Vec<(usize, V)> = Vec::with_capacity(block_voxels);
    let mut distinct: Vec<V> = Vec::with_capacity(block_voxels);
    let mut table_words: Vec<u32> = Vec::new();
    let mut shared_count = 0usize;

    let mut block_index = 0usize;
    for bz in 0..grid.z {
        for by in 0..grid.y {
            for bx in 0..grid.x {
                let origin = UVec3::new(bx, by, bz) * block_size;
                let extent = block_size.min(geometry.data_size - origin);

                block_values.clear();
                for z in 0..extent.z {
                    for y in 0..extent.y {
                        for x in 0..extent.x {
                            let within = x as usize
                                + block_size.x as usize
                                    * (y as usize + block_size.y as usize * z as usize);
                            let position = origin + UVec3::new(x, y, z);
                            block_values.push((within, values[geometry.voxel_index(position)]));
                        }
                    }
                }

                distinct.clear();
                distinct.extend(block_values.iter().map(|&(_, value)| value));
                distinct.sort_unstable();
                distinct.dedup();

                let bits = encoding_bits(distinct.len());
                if bits > MAX_ENCODING_BITS {
                    return Err(FormatCapacityError::TooManyDistinctValues {
                        distinct: distinct.len(),
                        max_bits: MAX_ENCODING_BITS,
                    }
                    .into());
                }

                let mut code_offset = 0u32;
                if bits > 0 {
                    let code_start = out.len();
                    code_offset = check_offset("code table", code_start - base)?;
                    out.resize(code_start + required_words(block_voxels, bits), 0);
                    let codes = &mut out[code_start..];
                    for &(within, value) in &block_values {
                        // `distinct` holds every value of the block, so the search hits.
                        let code = distinct.binary_search(&value).unwrap_or(0) as u32;
                        set_code(codes, within, code, bits);
                    }
                }

                table_words.clear();
                for &value in &distinct {
                    value.push_words(&mut table_words);
                }
                let value_offset = match shared_tables.get(&table_words) {
                    Some(&offset) if options.share_value_tables => {
                        shared_count += 1;
                        offset
                    }
                    _ => {
                        let offset = check_offset("value table", out.len() - base)?;
                        out.extend_from_slice(&table_words);
                        if options.share_value_tables {
                            shared_tables.insert(table_words.clone(), offset);
                        }
                        offset
                    }
                };

                let header = header_start + 2 * block_index;
                out[header] = value_offset | (bits << 24);
                out[header + 1] = code_offset;
                block_index += 1;
            }
        }
    }

    out[base] = check_offset("channel link", out.len())?;
    log::debug!(
        "encoded channel at word {}: {} blocks, {} shared value tables, {} words",
        base,
        num_blocks,
        shared_count,
        out.len() - base
    );
    Ok(base)
}
