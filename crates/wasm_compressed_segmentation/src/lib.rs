//! WASM bindings for compressed segmentation chunks.
//!
//! Encoding, single-voxel decoding and 64-bit id formatting for JavaScript,
//! plus the texture layout and uniforms a WebGL/WebGPU renderer needs to run
//! the decode routine itself. 64-bit values cross the boundary as
//! `[low, high]` word pairs.

use std::rc::Rc;

use glam::UVec3;
use js_sys::{Object, Reflect, Uint32Array};
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::future_to_promise;

use compressed_segmentation::gpu::shaders::DECODE_ROUTINE_WGSL;
use compressed_segmentation::{
    compute_layout, decode_voxel as decode_voxel_value, encode_chunk, pack_texels, ChunkGeometry,
    DataType, DecodeUniforms, EncodeOptions, GpuChunkDecoder, GpuDecoderConfig, TextureLayout,
    Uint64, VoxelValue,
};

thread_local! {
    static LOG_ENABLED: std::cell::Cell<bool> = std::cell::Cell::new(false);
}

fn log(message: &str) {
    if LOG_ENABLED.with(|enabled| enabled.get()) {
        web_sys::console::log_1(&message.into());
    }
}

#[wasm_bindgen]
pub fn init_logging() {
    console_error_panic_hook::set_once();
}

/// Enable or disable console logging.
#[wasm_bindgen]
pub fn set_log_enabled(enabled: bool) {
    LOG_ENABLED.with(|flag| flag.set(enabled));
    log(&format!(
        "[wasm_compressed_segmentation] logging {}",
        if enabled { "on" } else { "off" }
    ));
}

fn to_js(err: String) -> JsValue {
    JsValue::from_str(&err)
}

fn vec3_arg(name: &str, values: &[u32]) -> Result<[u32; 3], String> {
    match values {
        [x, y, z] => Ok([*x, *y, *z]),
        _ => Err(format!("{name} must have length 3 (got {})", values.len())),
    }
}

fn geometry_from(
    data_size: &[u32],
    block_size: &[u32],
    num_channels: u32,
    data_type: &str,
) -> Result<ChunkGeometry, String> {
    let data_type: DataType = data_type.parse().map_err(|e| format!("{e}"))?;
    let geometry = ChunkGeometry::new(
        vec3_arg("data_size", data_size)?,
        vec3_arg("block_size", block_size)?,
        num_channels,
        data_type,
    );
    geometry.validate().map_err(|e| e.to_string())?;
    Ok(geometry)
}

fn pairs_to_uint64(words: &[u32]) -> Result<Vec<Uint64>, String> {
    if words.len() % 2 != 0 {
        return Err(format!("uint64 values need an even word count (got {})", words.len()));
    }
    Ok(words.chunks_exact(2).map(|pair| Uint64::new(pair[0], pair[1])).collect())
}

fn value_words(value: VoxelValue) -> Vec<u32> {
    match value {
        VoxelValue::Narrow(value) => vec![value],
        VoxelValue::Wide(value) => vec![value.low, value.high],
    }
}

fn encode_inner(
    values: &[u32],
    data_size: &[u32],
    block_size: &[u32],
    num_channels: u32,
    data_type: &str,
) -> Result<Vec<u32>, String> {
    let geometry = geometry_from(data_size, block_size, num_channels, data_type)?;
    let options = EncodeOptions::default();
    let encoded = match geometry.data_type {
        DataType::Uint32 => encode_chunk(values, &geometry, &options),
        DataType::Uint64 => encode_chunk(&pairs_to_uint64(values)?, &geometry, &options),
    }
    .map_err(|e| e.to_string())?;
    log(&format!(
        "[wasm_compressed_segmentation] encoded {:?} {} x{} into {} words",
        geometry.data_size.to_array(),
        geometry.data_type,
        num_channels,
        encoded.len()
    ));
    Ok(encoded)
}

/// Encode a chunk. `values` is `[channel, z, y, x]` order; for `"uint64"`
/// each value is a `low, high` word pair.
///
/// # Example (JavaScript)
/// ```javascript
/// const values = new Uint32Array(64).fill(7);
/// const encoded = encode_chunk_values(values, [4, 4, 4], [2, 2, 2], 1, "uint32");
/// ```
#[wasm_bindgen]
pub fn encode_chunk_values(
    values: &[u32],
    data_size: &[u32],
    block_size: &[u32],
    num_channels: u32,
    data_type: &str,
) -> Result<Vec<u32>, JsValue> {
    encode_inner(values, data_size, block_size, num_channels, data_type).map_err(to_js)
}

fn decode_voxel_inner(
    buffer: &[u32],
    data_size: &[u32],
    block_size: &[u32],
    num_channels: u32,
    data_type: &str,
    channel: u32,
    position: &[u32],
) -> Result<Vec<u32>, String> {
    let geometry = geometry_from(data_size, block_size, num_channels, data_type)?;
    let position = UVec3::from_array(vec3_arg("position", position)?);
    geometry.check_channel(channel).map_err(|e| e.to_string())?;
    if !position.cmplt(geometry.data_size).all() {
        return Err(format!("position {position} outside chunk {}", geometry.data_size));
    }
    let value = decode_voxel_value(buffer, &geometry, channel as usize, position);
    Ok(value_words(value))
}

/// Decode one voxel; returns `[value]` for `"uint32"` and `[low, high]` for
/// `"uint64"`.
#[wasm_bindgen]
pub fn decode_voxel(
    buffer: &[u32],
    data_size: &[u32],
    block_size: &[u32],
    num_channels: u32,
    data_type: &str,
    channel: u32,
    position: &[u32],
) -> Result<Vec<u32>, JsValue> {
    decode_voxel_inner(buffer, data_size, block_size, num_channels, data_type, channel, position)
        .map_err(to_js)
}

fn uint64_to_string_inner(low: u32, high: u32, base: u32) -> Result<String, String> {
    if !(2..=36).contains(&base) {
        return Err(format!("base {base} is outside 2..=36"));
    }
    Ok(Uint64::new(low, high).to_string_radix(base))
}

/// Format a 64-bit id given as two words.
#[wasm_bindgen]
pub fn uint64_to_string(low: u32, high: u32, base: u32) -> Result<String, JsValue> {
    uint64_to_string_inner(low, high, base).map_err(to_js)
}

/// Parse a 64-bit id into `[low, high]`, or `undefined` if `text` is not a
/// valid numeral in `base`.
#[wasm_bindgen]
pub fn parse_uint64(text: &str, base: u32) -> Option<Vec<u32>> {
    Uint64::parse_radix(text, base)
        .ok()
        .map(|value| vec![value.low, value.high])
}

/// A uniformly random 64-bit id as `[low, high]`.
#[wasm_bindgen]
pub fn random_uint64() -> Vec<u32> {
    let value = Uint64::random();
    vec![value.low, value.high]
}

/// Texel grid for an encoded buffer.
#[wasm_bindgen]
pub struct WasmTextureLayout {
    inner: TextureLayout,
}

#[wasm_bindgen]
impl WasmTextureLayout {
    #[wasm_bindgen(constructor)]
    pub fn new(word_length: usize, max_texture_dimension: u32) -> Result<WasmTextureLayout, JsValue> {
        compute_layout(word_length, max_texture_dimension)
            .map(|inner| WasmTextureLayout { inner })
            .map_err(|e| to_js(e.to_string()))
    }

    #[wasm_bindgen(getter)]
    pub fn width(&self) -> u32 {
        self.inner.width
    }

    #[wasm_bindgen(getter)]
    pub fn height(&self) -> u32 {
        self.inner.height
    }

    /// `[1 / width, 1 / (width * height)]`.
    #[wasm_bindgen(getter)]
    pub fn texture_access_coefficients(&self) -> Vec<f32> {
        self.inner.texture_access_coefficients.to_vec()
    }

    /// RGBA8 texel bytes for `buffer`, ready for `texImage2D`/`writeTexture`.
    pub fn pack(&self, buffer: &[u32]) -> Result<Vec<u8>, JsValue> {
        if buffer.len() > self.inner.texel_count() {
            return Err(to_js(format!(
                "buffer of {} words does not fit a {}x{} layout",
                buffer.len(),
                self.inner.width,
                self.inner.height
            )));
        }
        Ok(pack_texels(buffer, &self.inner))
    }

    /// Uniform block for the decode routine, as 20 floats.
    pub fn decode_uniforms(
        &self,
        data_size: &[u32],
        block_size: &[u32],
        num_channels: u32,
        data_type: &str,
        channel: u32,
    ) -> Result<Vec<f32>, JsValue> {
        decode_uniforms_inner(&self.inner, data_size, block_size, num_channels, data_type, channel)
            .map_err(to_js)
    }
}

fn decode_uniforms_inner(
    layout: &TextureLayout,
    data_size: &[u32],
    block_size: &[u32],
    num_channels: u32,
    data_type: &str,
    channel: u32,
) -> Result<Vec<f32>, String> {
    let geometry = geometry_from(data_size, block_size, num_channels, data_type)?;
    geometry.check_channel(channel).map_err(|e| e.to_string())?;
    let uniforms = DecodeUniforms::new(&geometry, layout, channel);
    Ok(bytemuck::cast::<DecodeUniforms, [f32; 20]>(uniforms).to_vec())
}

/// WGSL source of the embeddable decode routine.
#[wasm_bindgen]
pub fn decode_routine_wgsl() -> String {
    DECODE_ROUTINE_WGSL.to_string()
}

#[wasm_bindgen]
pub struct WasmGpuDecoder {
    inner: Rc<GpuChunkDecoder>,
}

#[wasm_bindgen]
impl WasmGpuDecoder {
    #[wasm_bindgen]
    pub fn new() -> js_sys::Promise {
        future_to_promise(async {
            log("[wasm_compressed_segmentation] gpu init");
            let decoder = GpuChunkDecoder::new(GpuDecoderConfig::default())
                .await
                .map_err(|err| to_js(err.to_string()))?;
            log(&format!(
                "[wasm_compressed_segmentation] gpu workgroup size {}",
                decoder.workgroup_size()
            ));
            Ok(JsValue::from(WasmGpuDecoder {
                inner: Rc::new(decoder),
            }))
        })
    }

    /// Decode a whole channel on the GPU. Resolves to
    /// `{ values: Uint32Array, words_per_value }`.
    #[wasm_bindgen]
    pub fn decode_channel(
        &self,
        buffer: Uint32Array,
        data_size: Uint32Array,
        block_size: Uint32Array,
        num_channels: u32,
        data_type: String,
        channel: u32,
    ) -> js_sys::Promise {
        let buffer = buffer.to_vec();
        let data_size = data_size.to_vec();
        let block_size = block_size.to_vec();
        let inner = self.inner.clone();
        future_to_promise(async move {
            let geometry =
                geometry_from(&data_size, &block_size, num_channels, &data_type).map_err(to_js)?;
            let words: Vec<u32> = match geometry.data_type {
                DataType::Uint32 => inner
                    .decode_channel::<u32>(&buffer, &geometry, channel)
                    .await
                    .map_err(|e| to_js(e.to_string()))?,
                DataType::Uint64 => inner
                    .decode_channel::<Uint64>(&buffer, &geometry, channel)
                    .await
                    .map_err(|e| to_js(e.to_string()))?
                    .into_iter()
                    .flat_map(|value| [value.low, value.high])
                    .collect(),
            };

            let object = Object::new();
            let values = Uint32Array::from(words.as_slice());
            Reflect::set(&object, &JsValue::from_str("values"), &values).ok();
            Reflect::set(
                &object,
                &JsValue::from_str("words_per_value"),
                &JsValue::from(geometry.data_type.words_per_value() as u32),
            )
            .ok();
            Ok(JsValue::from(object))
        })
    }
}

/// Get the version of the codec library.
#[wasm_bindgen]
pub fn get_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}
