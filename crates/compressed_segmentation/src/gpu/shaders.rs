/// Embeddable decode routine.
///
/// Declares `DecodeUniforms` and `DecodedValue` plus `cs_*` helper
/// functions; the host shader binds the packed texture (`Rgba8Unorm`, one
/// word per texel) and the uniform block, then calls
/// `cs_decode_voxel(texture, uniforms, position)`. Integers appear only as
/// texel coordinates and `ldexp` exponents.
pub const DECODE_ROUTINE_WGSL: &str = r#"
struct DecodeUniforms {
  chunk_data_size: vec4<f32>,
  subchunk_size: vec4<f32>,
  subchunk_grid_size: vec4<f32>,
  texture_size: vec2<f32>,
  texture_access_coefficients: vec2<f32>,
  channel: f32,
  words_per_value: f32,
  _pad0: vec2<f32>,
};

struct DecodedValue {
  low: vec4<f32>,
  high: vec4<f32>,
};

const CS_HEADER_TABLE_OFFSET: f32 = 1.0;

fn cs_floor_div(a: f32, b: f32) -> f32 {
  let q = floor(a / b);
  let r = a - q * b;
  if (r < 0.0) {
    return q - 1.0;
  }
  if (r >= b) {
    return q + 1.0;
  }
  return q;
}

fn cs_pow2(e: f32) -> f32 {
  return ldexp(1.0, i32(e));
}

fn cs_mod_pow2(a: f32, e: f32) -> f32 {
  return a - cs_pow2(e) * floor(a * cs_pow2(-e));
}

fn cs_read24(t: vec4<f32>) -> f32 {
  return t.x + t.y * 256.0 + t.z * 65536.0;
}

fn cs_load_bytes(tex: texture_2d<f32>, col: f32, row: f32) -> vec4<f32> {
  let texel = textureLoad(tex, vec2<i32>(i32(col), i32(row)), 0);
  return floor(texel * 255.0 + vec4<f32>(0.5));
}

fn cs_fetch_word(tex: texture_2d<f32>, u: DecodeUniforms, offset: f32) -> vec4<f32> {
  let width = u.texture_size.x;
  var row = floor(offset * u.texture_access_coefficients.x);
  var col = offset - row * width;
  if (col < 0.0) {
    row -= 1.0;
    col += width;
  } else if (col >= width) {
    row += 1.0;
    col -= width;
  }
  if (row >= u.texture_size.y) {
    return vec4<f32>(0.0);
  }
  return cs_load_bytes(tex, col, row);
}

fn cs_channel_base(tex: texture_2d<f32>, u: DecodeUniforms) -> f32 {
  var base = 0.0;
  for (var channel = 0.0; channel < u.channel; channel += 1.0) {
    base = cs_read24(cs_fetch_word(tex, u, base));
  }
  return base;
}

fn cs_extract_code(w0: vec4<f32>, w1: vec4<f32>, bit_shift: f32, bits: f32) -> f32 {
  var window = array<f32, 8>(w0.x, w0.y, w0.z, w0.w, w1.x, w1.y, w1.z, w1.w);
  let k = cs_floor_div(bit_shift, 8.0);
  let s = bit_shift - 8.0 * k;
  let i = i32(k);
  let low24 = window[i] + window[i + 1] * 256.0 + window[i + 2] * 65536.0;
  let low_bits = 24.0 - s;
  let low = cs_mod_pow2(floor(low24 * cs_pow2(-s)), min(bits, low_bits));
  let high = cs_mod_pow2(window[i + 3], max(bits - low_bits, 0.0));
  return low + high * cs_pow2(low_bits);
}

fn cs_decode_voxel(tex: texture_2d<f32>, u: DecodeUniforms, position: vec3<f32>) -> DecodedValue {
  let base = cs_channel_base(tex, u);

  let size = u.subchunk_size.xyz;
  let block = vec3<f32>(
    cs_floor_div(position.x, size.x),
    cs_floor_div(position.y, size.y),
    cs_floor_div(position.z, size.z),
  );
  let within = min(position - block * size, size - vec3<f32>(1.0));
  let grid = u.subchunk_grid_size.xyz;
  let block_index = block.x + grid.x * (block.y + grid.y * block.z);

  let header = base + CS_HEADER_TABLE_OFFSET + 2.0 * block_index;
  let header0 = cs_fetch_word(tex, u, header);
  var entry = base + cs_read24(header0);
  let bits = header0.w;

  if (bits > 0.0) {
    let code_offset = base + cs_read24(cs_fetch_word(tex, u, header + 1.0));
    let within_index = within.x + size.x * (within.y + size.y * within.z);
    let group = cs_floor_div(within_index, 32.0);
    let group_bits = (within_index - 32.0 * group) * bits;
    let word_in_group = cs_floor_div(group_bits, 32.0);
    let word_offset = group * bits + word_in_group;
    let bit_shift = group_bits - 32.0 * word_in_group;

    let w0 = cs_fetch_word(tex, u, code_offset + word_offset);
    let w1 = cs_fetch_word(tex, u, code_offset + word_offset + 1.0);
    entry += cs_extract_code(w0, w1, bit_shift, bits) * u.words_per_value;
  }

  var result: DecodedValue;
  result.low = cs_fetch_word(tex, u, entry);
  result.high = vec4<f32>(0.0);
  if (u.words_per_value > 1.0) {
    result.high = cs_fetch_word(tex, u, entry + 1.0);
  }
  return result;
}
"#;

/// Compute entry point decoding one channel into `decoded`, `words_per_value`
/// words per voxel in fortran order. Dispatched as a 2D grid of workgroups
/// when one dimension is not enough.
///
/// Expects a `WORKGROUP_SIZE` const ahead of it; see [`chunk_decode_wgsl`].
pub const CHUNK_DECODE_ENTRY_WGSL: &str = r#"
@group(0) @binding(0) var encoded_texture: texture_2d<f32>;
@group(0) @binding(1) var<uniform> decode_uniforms: DecodeUniforms;
@group(0) @binding(2) var<storage, read_write> decoded: array<u32>;

fn pack_word(t: vec4<f32>) -> u32 {
  let b = vec4<u32>(t);
  return b.x | (b.y << 8u) | (b.z << 16u) | (b.w << 24u);
}

@compute @workgroup_size(WORKGROUP_SIZE)
fn main(
  @builtin(global_invocation_id) gid: vec3<u32>,
  @builtin(num_workgroups) groups: vec3<u32>,
) {
  let index = gid.x + gid.y * groups.x * WORKGROUP_SIZE;
  let size = vec3<u32>(decode_uniforms.chunk_data_size.xyz);
  if (index >= size.x * size.y * size.z) {
    return;
  }
  let x = index % size.x;
  let y = (index / size.x) % size.y;
  let z = index / (size.x * size.y);

  let value = cs_decode_voxel(
    encoded_texture,
    decode_uniforms,
    vec3<f32>(f32(x), f32(y), f32(z)),
  );
  let words = u32(decode_uniforms.words_per_value);
  decoded[index * words] = pack_word(value.low);
  if (words > 1u) {
    decoded[index * words + 1u] = pack_word(value.high);
  }
}
"#;

/// Full compute shader: the workgroup size, the decode routine, then the
/// chunk entry. `@workgroup_size` does not accept override expressions, so
/// the size is baked in as a const.
pub fn chunk_decode_wgsl(workgroup_size: u32) -> String {
    format!(
        "const WORKGROUP_SIZE: u32 = {workgroup_size}u;\n{DECODE_ROUTINE_WGSL}\n{CHUNK_DECODE_ENTRY_WGSL}"
    )
}
