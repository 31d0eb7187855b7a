//! Float-only decoding over packed texels.
//!
//! This is the decode routine of [`crate::gpu::shaders::DECODE_ROUTINE_WGSL`]
//! written out in Rust, function for function. Every intermediate is an `f32`
//! holding an integer below 2^24, and the only memory access is a texel read
//! returning four bytes. Running it on the CPU over a [`PackedTexture`] gives
//! exactly the values the shader produces, which is how the two decoders are
//! checked against each other.
//!
//! Divisions go through [`floor_div`], which corrects the quotient with an
//! exact remainder test, so the result does not depend on how precisely the
//! target rounds `a / b`. Powers of two come from `ldexp` in the shader and
//! `powi` here; both are exact.

use bytemuck::{Pod, Zeroable};
use glam::UVec3;

use crate::core::{ChunkGeometry, EncodedValue, HEADER_TABLE_OFFSET};
use crate::texture::{pack_texels, TextureLayout};

/// Per-draw uniform block consumed by the decode routine.
///
/// Field order and padding match `DecodeUniforms` in the WGSL source.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct DecodeUniforms {
    pub chunk_data_size: [f32; 4],
    pub subchunk_size: [f32; 4],
    pub subchunk_grid_size: [f32; 4],
    pub texture_size: [f32; 2],
    pub texture_access_coefficients: [f32; 2],
    pub channel: f32,
    pub words_per_value: f32,
    pub _pad0: [f32; 2],
}

impl DecodeUniforms {
    pub fn new(geometry: &ChunkGeometry, layout: &TextureLayout, channel: u32) -> Self {
        let vec4 = |v: UVec3| [v.x as f32, v.y as f32, v.z as f32, 0.0];
        Self {
            chunk_data_size: vec4(geometry.data_size),
            subchunk_size: vec4(geometry.block_size),
            subchunk_grid_size: vec4(geometry.grid_size()),
            texture_size: [layout.width as f32, layout.height as f32],
            texture_access_coefficients: layout.texture_access_coefficients,
            channel: channel as f32,
            words_per_value: geometry.data_type.words_per_value() as f32,
            _pad0: [0.0; 2],
        }
    }
}

/// Texel read primitive: the four bytes of texel `(x, y)` as floats in
/// `0.0..=255.0`.
pub trait TexelFetch {
    fn load(&self, x: u32, y: u32) -> [f32; 4];
}

/// An encoded buffer packed into texels, read the way the shader reads its
/// texture. Texels outside the grid read as zero.
#[derive(Debug, Clone)]
pub struct PackedTexture {
    width: u32,
    height: u32,
    texels: Vec<u8>,
}

impl PackedTexture {
    pub fn new(buffer: &[u32], layout: &TextureLayout) -> Self {
        Self {
            width: layout.width,
            height: layout.height,
            texels: pack_texels(buffer, layout),
        }
    }

    pub fn texels(&self) -> &[u8] {
        &self.texels
    }
}

impl TexelFetch for PackedTexture {
    fn load(&self, x: u32, y: u32) -> [f32; 4] {
        if x >= self.width || y >= self.height {
            return [0.0; 4];
        }
        let start = (y as usize * self.width as usize + x as usize) * 4;
        match self.texels.get(start..start + 4) {
            Some(b) => [b[0] as f32, b[1] as f32, b[2] as f32, b[3] as f32],
            None => [0.0; 4],
        }
    }
}

/// `floor(a / b)` for non-negative integer-valued `a` and positive `b`.
#[inline]
pub fn floor_div(a: f32, b: f32) -> f32 {
    let q = (a / b).floor();
    let r = a - q * b;
    if r < 0.0 {
        q - 1.0
    } else if r >= b {
        q + 1.0
    } else {
        q
    }
}

#[inline]
fn pow2(exponent: f32) -> f32 {
    2f32.powi(exponent as i32)
}

/// `a mod 2^exponent`.
#[inline]
fn mod_pow2(a: f32, exponent: f32) -> f32 {
    let m = pow2(exponent);
    a - m * (a * pow2(-exponent)).floor()
}

/// Low 24 bits of a word, from its first three bytes.
#[inline]
pub fn read24(texel: [f32; 4]) -> f32 {
    texel[0] + texel[1] * 256.0 + texel[2] * 65536.0
}

/// Bytes of the word at linear `offset`.
pub fn fetch_word<T: TexelFetch + ?Sized>(texture: &T, u: &DecodeUniforms, offset: f32) -> [f32; 4] {
    let [width, height] = u.texture_size;
    let mut row = (offset * u.texture_access_coefficients[0]).floor();
    let mut col = offset - row * width;
    if col < 0.0 {
        row -= 1.0;
        col += width;
    } else if col >= width {
        row += 1.0;
        col -= width;
    }
    if row >= height {
        return [0.0; 4];
    }
    texture.load(col as u32, row as u32)
}

/// Offset of the channel selected in `u`, by following link words from 0.
pub fn channel_base<T: TexelFetch + ?Sized>(texture: &T, u: &DecodeUniforms) -> f32 {
    let mut base = 0.0;
    let mut channel = 0.0;
    while channel < u.channel {
        base = read24(fetch_word(texture, u, base));
        channel += 1.0;
    }
    base
}

/// The `bits`-wide code starting `bit_shift` bits into the 64-bit window
/// formed by words `w0` (low) and `w1` (high).
fn extract_code(w0: [f32; 4], w1: [f32; 4], bit_shift: f32, bits: f32) -> f32 {
    let window = [w0[0], w0[1], w0[2], w0[3], w1[0], w1[1], w1[2], w1[3]];
    let k = floor_div(bit_shift, 8.0);
    let s = bit_shift - 8.0 * k;
    let k = k as usize;
    let low24 = window[k] + window[k + 1] * 256.0 + window[k + 2] * 65536.0;
    let low_bits = 24.0 - s;
    let low = mod_pow2((low24 * pow2(-s)).floor(), bits.min(low_bits));
    let high = mod_pow2(window[k + 3], (bits - low_bits).max(0.0));
    low + high * pow2(low_bits)
}

/// Decode the voxel at `position` (integer-valued) of the channel selected
/// in `u`. Returns the low and high words as bytes; the high word is only
/// meaningful for two-word values.
pub fn decode_texel_words<T: TexelFetch + ?Sized>(
    texture: &T,
    u: &DecodeUniforms,
    position: [f32; 3],
) -> [[f32; 4]; 2] {
    let base = channel_base(texture, u);

    let mut block = [0.0f32; 3];
    let mut within = [0.0f32; 3];
    for axis in 0..3 {
        let size = u.subchunk_size[axis];
        block[axis] = floor_div(position[axis], size);
        within[axis] = (position[axis] - block[axis] * size).min(size - 1.0);
    }
    let grid = u.subchunk_grid_size;
    let block_index = block[0] + grid[0] * (block[1] + grid[1] * block[2]);

    let header = base + HEADER_TABLE_OFFSET as f32 + 2.0 * block_index;
    let header0 = fetch_word(texture, u, header);
    let value_offset = base + read24(header0);
    let bits = header0[3];

    let mut entry = value_offset;
    if bits > 0.0 {
        let code_offset = base + read24(fetch_word(texture, u, header + 1.0));
        let size = u.subchunk_size;
        let within_index = within[0] + size[0] * (within[1] + size[1] * within[2]);

        // within_index * bits may exceed 2^24; split off whole groups of 32
        // codes, which always end on a word boundary.
        let group = floor_div(within_index, 32.0);
        let group_bits = (within_index - 32.0 * group) * bits;
        let word_in_group = floor_div(group_bits, 32.0);
        let word_offset = group * bits + word_in_group;
        let bit_shift = group_bits - 32.0 * word_in_group;

        let w0 = fetch_word(texture, u, code_offset + word_offset);
        let w1 = fetch_word(texture, u, code_offset + word_offset + 1.0);
        entry += extract_code(w0, w1, bit_shift, bits) * u.words_per_value;
    }

    let low = fetch_word(texture, u, entry);
    let high = if u.words_per_value > 1.0 {
        fetch_word(texture, u, entry + 1.0)
    } else {
        [0.0; 4]
    };
    [low, high]
}

/// Reassemble a word from the four byte values of a texel.
#[inline]
pub fn texel_to_word(texel: [f32; 4]) -> u32 {
    u32::from_le_bytes(texel.map(|byte| byte as u8))
}

/// Float-only decode of one voxel, converted back to `V`.
pub fn decode_voxel_from_texture<V: EncodedValue, T: TexelFetch + ?Sized>(
    texture: &T,
    u: &DecodeUniforms,
    position: UVec3,
) -> V {
    let [low, high] = decode_texel_words(texture, u, position.as_vec3().to_array());
    V::from_words(&[texel_to_word(low), texel_to_word(high)][..V::WORDS])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::DataType;
    use crate::decode::decode_channel;
    use crate::encode::{encode_chunk, EncodeOptions};
    use crate::texture::compute_layout;
    use crate::uint64::Uint64;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    /// Every voxel of every channel decodes identically through both paths.
    fn assert_agreement<V: EncodedValue>(values: &[V], geometry: &ChunkGeometry, max_dimension: u32) {
        let encoded = encode_chunk(values, geometry, &EncodeOptions::default()).expect("encode");
        let layout = compute_layout(encoded.len(), max_dimension).expect("layout");
        let texture = PackedTexture::new(&encoded, &layout);
        let size = geometry.data_size;

        for channel in 0..geometry.num_channels {
            let uniforms = DecodeUniforms::new(geometry, &layout, channel);
            let expected: Vec<V> = decode_channel(&encoded, geometry, channel as usize);
            let mut index = 0;
            for z in 0..size.z {
                for y in 0..size.y {
                    for x in 0..size.x {
                        let position = UVec3::new(x, y, z);
                        let actual: V = decode_voxel_from_texture(&texture, &uniforms, position);
                        assert_eq!(
                            actual, expected[index],
                            "channel {channel} position {position} layout {}x{}",
                            layout.width, layout.height
                        );
                        index += 1;
                    }
                }
            }
        }
    }

    fn random_values<V: Copy, F>(count: usize, palette: usize, seed: u64, mut make: F) -> Vec<V>
    where
        F: FnMut(&mut StdRng) -> V,
    {
        let mut rng = StdRng::seed_from_u64(seed);
        let palette: Vec<V> = (0..palette).map(|_| make(&mut rng)).collect();
        (0..count).map(|_| palette[rng.gen_range(0..palette.len())]).collect()
    }

    #[test]
    fn uniforms_match_shader_layout() {
        assert_eq!(std::mem::size_of::<DecodeUniforms>(), 80);
        let geometry = ChunkGeometry::new([10, 6, 4], [4, 4, 4], 2, DataType::Uint64);
        let layout = compute_layout(300, 128).expect("layout");
        let u = DecodeUniforms::new(&geometry, &layout, 1);
        assert_eq!(u.subchunk_grid_size, [3.0, 2.0, 1.0, 0.0]);
        assert_eq!(u.texture_size, [3.0, 100.0]);
        assert_eq!(u.words_per_value, 2.0);
        assert_eq!(u.channel, 1.0);
    }

    #[test]
    fn floor_div_is_exact() {
        for a in [0.0f32, 1.0, 31.0, 32.0, 33.0, 16_777_215.0] {
            for b in [1.0f32, 3.0, 7.0, 8.0, 32.0, 100.0, 2047.0] {
                assert_eq!(floor_div(a, b), (a as u32 / b as u32) as f32, "{a} / {b}");
            }
        }
    }

    #[test]
    fn fetch_word_addresses_every_texel() {
        let buffer: Vec<u32> = (0..1000u32).map(|i| i.wrapping_mul(0x0101_0101)).collect();
        let geometry = ChunkGeometry::new([1, 1, 1], [1, 1, 1], 1, DataType::Uint32);
        // 91 gives width 11, whose reciprocal is inexact in f32.
        assert_eq!(compute_layout(buffer.len(), 91).expect("layout").width, 11);
        for max_dimension in [100, 91, 1000, 32] {
            let layout = compute_layout(buffer.len(), max_dimension).expect("layout");
            let texture = PackedTexture::new(&buffer, &layout);
            let u = DecodeUniforms::new(&geometry, &layout, 0);
            for (offset, &word) in buffer.iter().enumerate() {
                assert_eq!(texel_to_word(fetch_word(&texture, &u, offset as f32)), word);
            }
            let past = (layout.texel_count()) as f32;
            assert_eq!(fetch_word(&texture, &u, past), [0.0; 4]);
        }
    }

    #[test]
    fn extracts_codes_spanning_words() {
        // 0xAB_CDEF at bit 28: nibble in w0, remaining 20 bits in w1.
        let code = 0x00ab_cdefu64 << 28;
        let w0 = (code as u32).to_le_bytes().map(f32::from);
        let w1 = ((code >> 32) as u32).to_le_bytes().map(f32::from);
        assert_eq!(extract_code(w0, w1, 28.0, 24.0), 0x00ab_cdef as f32);
        assert_eq!(extract_code(w0, w1, 28.0, 4.0), 0xf as f32);
        assert_eq!(extract_code(w0, w1, 0.0, 1.0), 0.0);
    }

    #[test]
    fn agrees_on_uniform_and_low_width_blocks() {
        let geometry = ChunkGeometry::new([8, 8, 8], [4, 4, 4], 1, DataType::Uint32);
        let uniform: Vec<u32> = (0..geometry.num_voxels())
            .map(|i| ((i % 8) / 4 + 2 * ((i / 64) / 4)) as u32 + 17)
            .collect();
        assert_agreement(&uniform, &geometry, 2048);

        for (palette, seed) in [(2, 1), (3, 2), (5, 3), (9, 4)] {
            let values = random_values(geometry.num_voxels(), palette, seed, |rng| rng.gen::<u32>());
            assert_agreement(&values, &geometry, 16);
        }
    }

    #[test]
    fn agrees_on_partial_blocks_and_multiple_channels() {
        let geometry = ChunkGeometry::new([7, 5, 6], [3, 4, 5], 3, DataType::Uint32);
        let values = random_values(geometry.num_voxels() * 3, 11, 5, |rng| rng.gen::<u32>());
        assert_agreement(&values, &geometry, 37);
    }

    #[test]
    fn agrees_on_wide_values() {
        let geometry = ChunkGeometry::new([6, 6, 6], [4, 2, 3], 2, DataType::Uint64);
        let values = random_values(geometry.num_voxels() * 2, 6, 6, |rng| Uint64::random_with(rng));
        assert_agreement(&values, &geometry, 64);

        let geometry = ChunkGeometry::new([4, 4, 4], [4, 4, 4], 1, DataType::Uint64);
        let values = vec![Uint64::MAX; geometry.num_voxels()];
        assert_agreement(&values, &geometry, 4);
    }

    #[test]
    fn agrees_on_wide_codes() {
        // Every value distinct: 8192 voxels need 13-bit codes.
        let geometry = ChunkGeometry::new([32, 32, 8], [32, 32, 8], 1, DataType::Uint32);
        let values: Vec<u32> = (0..geometry.num_voxels() as u32)
            .map(|i| i.wrapping_mul(2_654_435_761))
            .collect();
        let encoded = encode_chunk(&values, &geometry, &EncodeOptions::default()).expect("encode");
        assert_eq!(encoded[HEADER_TABLE_OFFSET] >> 24, 13);
        assert_agreement(&values, &geometry, 512);
    }
}
