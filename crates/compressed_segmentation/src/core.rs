use std::fmt;
use std::hash::Hash;
use std::str::FromStr;

use glam::UVec3;

use crate::error::GeometryError;
use crate::uint64::Uint64;

/// Word offset of the block header table relative to a channel's base.
/// The word at the base itself links to the next channel.
pub const HEADER_TABLE_OFFSET: usize = 1;

/// Offsets and the next-channel link are stored in the low 3 bytes of a word.
pub const OFFSET_BITS: u32 = 24;
pub const MAX_OFFSET: usize = (1 << OFFSET_BITS) - 1;

/// Widest code the encoder produces. A wider code could index a value table
/// longer than a 24-bit offset can address.
pub const MAX_ENCODING_BITS: u32 = 24;

/// Element width of the per-voxel values.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DataType {
    Uint32,
    Uint64,
}

impl DataType {
    pub const fn words_per_value(self) -> usize {
        match self {
            DataType::Uint32 => 1,
            DataType::Uint64 => 2,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            DataType::Uint32 => "uint32",
            DataType::Uint64 => "uint64",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DataType {
    type Err = GeometryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "uint32" => Ok(DataType::Uint32),
            "uint64" => Ok(DataType::Uint64),
            other => Err(GeometryError::UnknownDataType(other.to_string())),
        }
    }
}

/// Shape of one encoded chunk.
///
/// `block_size` tiles `data_size`; the last block along an axis may extend
/// past the chunk and is clipped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChunkGeometry {
    pub data_size: UVec3,
    pub block_size: UVec3,
    pub num_channels: u32,
    pub data_type: DataType,
}

impl ChunkGeometry {
    pub fn new(data_size: [u32; 3], block_size: [u32; 3], num_channels: u32, data_type: DataType) -> Self {
        Self {
            data_size: UVec3::from_array(data_size),
            block_size: UVec3::from_array(block_size),
            num_channels,
            data_type,
        }
    }

    pub fn validate(&self) -> Result<(), GeometryError> {
        if self.data_size.min_element() == 0 {
            return Err(GeometryError::EmptyDataSize(self.data_size.to_array()));
        }
        if self.block_size.min_element() == 0 {
            return Err(GeometryError::EmptyBlockSize(self.block_size.to_array()));
        }
        if self.num_channels == 0 {
            return Err(GeometryError::NoChannels);
        }
        Ok(())
    }

    pub fn check_channel(&self, channel: u32) -> Result<(), GeometryError> {
        if channel >= self.num_channels {
            return Err(GeometryError::ChannelOutOfRange {
                channel,
                num_channels: self.num_channels,
            });
        }
        Ok(())
    }

    /// Blocks per axis, `ceil(data_size / block_size)`. Exact for every
    /// extent up to `u32::MAX`.
    pub fn grid_size(&self) -> UVec3 {
        let (data, block) = (self.data_size, self.block_size);
        UVec3::new(
            data.x.div_ceil(block.x),
            data.y.div_ceil(block.y),
            data.z.div_ceil(block.z),
        )
    }

    pub fn num_blocks(&self) -> usize {
        let grid = self.grid_size();
        grid.x as usize * grid.y as usize * grid.z as usize
    }

    pub fn num_voxels(&self) -> usize {
        self.data_size.x as usize * self.data_size.y as usize * self.data_size.z as usize
    }

    pub fn block_voxels(&self) -> usize {
        self.block_size.x as usize * self.block_size.y as usize * self.block_size.z as usize
    }

    /// Fortran-order index of `position` within the chunk.
    pub fn voxel_index(&self, position: UVec3) -> usize {
        let size = self.data_size;
        position.x as usize
            + size.x as usize * (position.y as usize + size.y as usize * position.z as usize)
    }
}

mod sealed {
    pub trait Sealed {}
    impl Sealed for u32 {}
    impl Sealed for crate::uint64::Uint64 {}
}

/// Per-voxel value type that can be stored in a value table.
///
/// Implemented for `u32` (one word per entry) and [`Uint64`] (two words,
/// low then high). The codec is generic over this trait instead of branching
/// on the element width at every call site.
pub trait EncodedValue: Copy + Default + Eq + Ord + Hash + fmt::Debug + sealed::Sealed {
    const DATA_TYPE: DataType;
    const WORDS: usize = Self::DATA_TYPE.words_per_value();

    fn push_words(self, out: &mut Vec<u32>);

    /// Reconstruct from consecutive words; missing words read as zero.
    fn from_words(words: &[u32]) -> Self;

    fn into_voxel_value(self) -> VoxelValue;

    fn read_into(&mut self, buffer: &[u32], offset: usize) {
        *self = Self::from_words(buffer.get(offset..).unwrap_or(&[]));
    }
}

impl EncodedValue for u32 {
    const DATA_TYPE: DataType = DataType::Uint32;

    fn push_words(self, out: &mut Vec<u32>) {
        out.push(self);
    }

    fn from_words(words: &[u32]) -> Self {
        words.first().copied().unwrap_or(0)
    }

    fn into_voxel_value(self) -> VoxelValue {
        VoxelValue::Narrow(self)
    }
}

impl EncodedValue for Uint64 {
    const DATA_TYPE: DataType = DataType::Uint64;

    fn push_words(self, out: &mut Vec<u32>) {
        out.push(self.low);
        out.push(self.high);
    }

    fn from_words(words: &[u32]) -> Self {
        Uint64::new(
            words.first().copied().unwrap_or(0),
            words.get(1).copied().unwrap_or(0),
        )
    }

    fn into_voxel_value(self) -> VoxelValue {
        VoxelValue::Wide(self)
    }

    fn read_into(&mut self, buffer: &[u32], offset: usize) {
        self.low = buffer.get(offset).copied().unwrap_or(0);
        self.high = offset
            .checked_add(1)
            .and_then(|next| buffer.get(next))
            .copied()
            .unwrap_or(0);
    }
}

/// A decoded value of either element width.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VoxelValue {
    Narrow(u32),
    Wide(Uint64),
}

impl VoxelValue {
    pub fn data_type(&self) -> DataType {
        match self {
            VoxelValue::Narrow(_) => DataType::Uint32,
            VoxelValue::Wide(_) => DataType::Uint64,
        }
    }

    /// Widen to 64 bits; narrow values become `Uint64 { low, high: 0 }`.
    pub fn to_uint64(self) -> Uint64 {
        match self {
            VoxelValue::Narrow(value) => Uint64::new(value, 0),
            VoxelValue::Wide(value) => value,
        }
    }
}

impl fmt::Display for VoxelValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VoxelValue::Narrow(value) => value.fmt(f),
            VoxelValue::Wide(value) => value.fmt(f),
        }
    }
}
