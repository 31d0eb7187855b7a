//! Compressed segmentation chunks: block encoding, random-access decoding and
//! GPU texture decoding.
//!
//! Chunks are encoded with [`encode_chunk`] and read back per voxel with
//! [`decode_voxel`]. For GPU decoding, a chunk's texture layout comes from
//! [`TextureLayoutCache::get_or_compute`], its texels from [`pack_texels`] and
//! its uniforms from [`DecodeUniforms::new`].

pub mod core;
pub mod decode;
pub mod encode;
pub mod error;
pub mod gpu;
pub mod packing;
pub mod texel_decode;
pub mod texture;
pub mod uint64;

pub use crate::core::{ChunkGeometry, DataType, EncodedValue, VoxelValue};
pub use crate::decode::{
    channel_base_offset, decode_channel, decode_single_voxel, decode_value_into, decode_voxel,
};
pub use crate::encode::{encode_channel, encode_chunk, EncodeOptions};
pub use crate::error::{EncodeError, FormatCapacityError, GeometryError, ParseUint64Error};
pub use crate::gpu::{GpuChunkDecoder, GpuDecodeError, GpuDecoderConfig};
pub use crate::texel_decode::{decode_voxel_from_texture, DecodeUniforms, PackedTexture, TexelFetch};
pub use crate::texture::{compute_layout, pack_texels, LayoutKey, TextureLayout, TextureLayoutCache};
pub use crate::uint64::Uint64;
