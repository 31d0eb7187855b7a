//! CPU random-access decoding.
//!
//! A single voxel costs a fixed number of word reads regardless of chunk
//! size: the channel link chain, one block header, at most two code words
//! and one value table entry. Reads outside the buffer yield zero, so a
//! corrupt buffer produces unspecified values but never panics.

use glam::UVec3;

use crate::core::{ChunkGeometry, DataType, EncodedValue, VoxelValue, HEADER_TABLE_OFFSET};
use crate::packing::get_code;
use crate::uint64::Uint64;

const OFFSET_MASK: u32 = 0x00ff_ffff;

#[inline]
fn word(buffer: &[u32], offset: usize) -> u32 {
    buffer.get(offset).copied().unwrap_or(0)
}

/// Word offset of `channel`, found by following the link stored at the
/// base of each preceding channel.
pub fn channel_base_offset(buffer: &[u32], channel: usize) -> usize {
    let mut offset = 0usize;
    for _ in 0..channel {
        offset = (word(buffer, offset) & OFFSET_MASK) as usize;
    }
    offset
}

/// Word offset of the value table entry holding the value at `position`.
fn value_entry_offset(
    buffer: &[u32],
    base_offset: usize,
    geometry: &ChunkGeometry,
    words_per_value: usize,
    position: UVec3,
) -> usize {
    debug_assert!(
        position.cmplt(geometry.data_size).all(),
        "position {position} outside chunk {}",
        geometry.data_size
    );

    let block_size = geometry.block_size;
    let grid = geometry.grid_size();
    let block = position / block_size;
    let block_index =
        block.x as usize + grid.x as usize * (block.y as usize + grid.y as usize * block.z as usize);

    let header = base_offset + HEADER_TABLE_OFFSET + 2 * block_index;
    let header0 = word(buffer, header);
    let value_offset = base_offset + (header0 & OFFSET_MASK) as usize;
    let bits = header0 >> 24;
    if bits == 0 {
        return value_offset;
    }

    let code_offset = base_offset + (word(buffer, header + 1) & OFFSET_MASK) as usize;
    let within = (position - block * block_size).min(block_size - UVec3::ONE);
    let within_index = within.x as usize
        + block_size.x as usize * (within.y as usize + block_size.y as usize * within.z as usize);
    let codes = buffer.get(code_offset..).unwrap_or(&[]);
    let code = get_code(codes, within_index, bits.min(32)) as usize;
    value_offset.saturating_add(code.saturating_mul(words_per_value))
}

/// Decode the value at `position` into `out` without allocating.
pub fn decode_value_into<V: EncodedValue>(
    out: &mut V,
    buffer: &[u32],
    base_offset: usize,
    geometry: &ChunkGeometry,
    position: UVec3,
) {
    let entry = value_entry_offset(buffer, base_offset, geometry, V::WORDS, position);
    out.read_into(buffer, entry);
}

/// Decode one voxel of the channel starting at `base_offset`.
pub fn decode_single_voxel<V: EncodedValue>(
    buffer: &[u32],
    base_offset: usize,
    geometry: &ChunkGeometry,
    position: UVec3,
) -> V {
    let mut value = V::default();
    decode_value_into(&mut value, buffer, base_offset, geometry, position);
    value
}

/// Decode one voxel of `channel`, dispatching on `geometry.data_type`.
pub fn decode_voxel(
    buffer: &[u32],
    geometry: &ChunkGeometry,
    channel: usize,
    position: UVec3,
) -> VoxelValue {
    let base = channel_base_offset(buffer, channel);
    match geometry.data_type {
        DataType::Uint32 => {
            decode_single_voxel::<u32>(buffer, base, geometry, position).into_voxel_value()
        }
        DataType::Uint64 => {
            decode_single_voxel::<Uint64>(buffer, base, geometry, position).into_voxel_value()
        }
    }
}

/// Decode a whole channel into fortran order.
pub fn decode_channel<V: EncodedValue>(buffer: &[u32], geometry: &ChunkGeometry, channel: usize) -> Vec<V> {
    let base = channel_base_offset(buffer, channel);
    let size = geometry.data_size;
    let mut values = Vec::with_capacity(geometry.num_voxels());
    for z in 0..size.z {
        for y in 0..size.y {
            for x in 0..size.x {
                values.push(decode_single_voxel(buffer, base, geometry, UVec3::new(x, y, z)));
            }
        }
    }
    values
}
