//! GPU decoding using wgpu compute shaders.
//!
//! [`GpuChunkDecoder`] uploads an encoded buffer as a texture and runs the
//! float-only decode routine from [`shaders`] over every voxel of a channel.

use thiserror::Error;

use crate::error::{FormatCapacityError, GeometryError};
use crate::texture::TextureLayoutCache;

mod buffers;
mod decode_chunk;
mod pipelines;
pub mod shaders;

use pipelines::create_decode_pipeline;

const DEFAULT_WORKGROUP_SIZE: u32 = 64;

#[derive(Debug, Error)]
pub enum GpuDecodeError {
    #[error("no GPU adapter available")]
    NoAdapter,
    #[error("failed to request device: {0}")]
    RequestDevice(String),
    #[error("pipeline validation error: {0}")]
    Validation(String),
    #[error("failed to map buffer: {0}")]
    Map(String),
    #[error("device limit exceeded: {0}")]
    Limit(String),
    #[error(transparent)]
    Geometry(#[from] GeometryError),
    #[error(transparent)]
    Capacity(#[from] FormatCapacityError),
}

/// Configuration for the GPU decoder.
#[derive(Debug, Clone)]
pub struct GpuDecoderConfig {
    /// Workgroup size for the decode shader (0 = auto-detect).
    pub workgroup_size: u32,
    /// Cap on texture width and height; `None` uses the device limit.
    pub max_texture_dimension: Option<u32>,
}

impl Default for GpuDecoderConfig {
    fn default() -> Self {
        Self {
            workgroup_size: 0,
            max_texture_dimension: None,
        }
    }
}

/// Headless wgpu decoder for encoded chunks.
pub struct GpuChunkDecoder {
    pub(crate) device: wgpu::Device,
    pub(crate) queue: wgpu::Queue,
    pub(crate) pipeline: wgpu::ComputePipeline,
    pub(crate) bind_group_layout: wgpu::BindGroupLayout,
    pub(crate) layouts: TextureLayoutCache,
    pub(crate) workgroup_size: u32,
    pub(crate) max_storage_buffer_binding_size: u64,
    pub(crate) max_compute_workgroups_per_dimension: u32,
}

impl GpuChunkDecoder {
    pub async fn new(config: GpuDecoderConfig) -> Result<Self, GpuDecodeError> {
        let instance = wgpu::Instance::default();
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions::default())
            .await
            .ok_or(GpuDecodeError::NoAdapter)?;

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor::default(), None)
            .await
            .map_err(|e| GpuDecodeError::RequestDevice(e.to_string()))?;

        let limits = device.limits();
        let workgroup_size = compute_workgroup_size(
            &config,
            limits.max_compute_invocations_per_workgroup,
            limits.max_compute_workgroup_size_x,
        );
        let max_texture_dimension = match config.max_texture_dimension {
            Some(requested) => requested.clamp(1, limits.max_texture_dimension_2d),
            None => limits.max_texture_dimension_2d,
        };

        let pipeline = create_decode_pipeline(&device, workgroup_size).await?;
        log::info!(
            "gpu decoder ready on {:?}: workgroup size {}, max texture dimension {}",
            adapter.get_info().name,
            workgroup_size,
            max_texture_dimension
        );

        Ok(Self {
            device,
            queue,
            pipeline: pipeline.pipeline,
            bind_group_layout: pipeline.bind_group_layout,
            layouts: TextureLayoutCache::new(max_texture_dimension),
            workgroup_size,
            max_storage_buffer_binding_size: limits.max_storage_buffer_binding_size as u64,
            max_compute_workgroups_per_dimension: limits.max_compute_workgroups_per_dimension,
        })
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Texture layouts computed so far, keyed by chunk shape and length.
    pub fn layouts(&self) -> &TextureLayoutCache {
        &self.layouts
    }

    pub fn workgroup_size(&self) -> u32 {
        self.workgroup_size
    }

    pub(crate) fn ensure_storage_fits(&self, bytes: u64, label: &str) -> Result<(), GpuDecodeError> {
        if bytes > self.max_storage_buffer_binding_size {
            return Err(GpuDecodeError::Limit(format!(
                "{label}: buffer size {} bytes exceeds max {} bytes",
                bytes, self.max_storage_buffer_binding_size
            )));
        }
        Ok(())
    }
}

fn compute_workgroup_size(config: &GpuDecoderConfig, max_invocations: u32, max_size_x: u32) -> u32 {
    let requested = if config.workgroup_size == 0 {
        DEFAULT_WORKGROUP_SIZE
    } else {
        config.workgroup_size
    };
    requested.min(max_invocations).min(max_size_x).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ChunkGeometry, DataType, EncodedValue};
    use crate::decode::decode_channel;
    use crate::encode::{encode_chunk, EncodeOptions};
    use crate::uint64::Uint64;
    use futures::executor::block_on;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn init_logging() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn decoder(config: GpuDecoderConfig) -> Option<GpuChunkDecoder> {
        match block_on(GpuChunkDecoder::new(config)) {
            Ok(decoder) => Some(decoder),
            Err(GpuDecodeError::NoAdapter) | Err(GpuDecodeError::RequestDevice(_)) => {
                log::warn!("skipping gpu test: no usable adapter");
                None
            }
            Err(err) => panic!("decoder init failed: {err}"),
        }
    }

    fn assert_gpu_matches_cpu<V: EncodedValue>(
        decoder: &GpuChunkDecoder,
        values: &[V],
        geometry: &ChunkGeometry,
    ) {
        let encoded = encode_chunk(values, geometry, &EncodeOptions::default()).expect("encode");
        for channel in 0..geometry.num_channels {
            let expected: Vec<V> = decode_channel(&encoded, geometry, channel as usize);
            let actual: Vec<V> =
                block_on(decoder.decode_channel(&encoded, geometry, channel)).expect("gpu decode");
            assert_eq!(actual, expected, "channel {channel}");
        }
    }

    #[test]
    fn workgroup_size_respects_limits() {
        let auto = GpuDecoderConfig::default();
        assert_eq!(compute_workgroup_size(&auto, 256, 256), 64);
        assert_eq!(compute_workgroup_size(&auto, 32, 256), 32);
        let fixed = GpuDecoderConfig {
            workgroup_size: 512,
            ..Default::default()
        };
        assert_eq!(compute_workgroup_size(&fixed, 1024, 256), 256);
    }

    #[test]
    fn gpu_decode_matches_cpu_for_narrow_values() {
        init_logging();
        let Some(decoder) = decoder(GpuDecoderConfig {
            max_texture_dimension: Some(64),
            ..Default::default()
        }) else {
            return;
        };
        let geometry = ChunkGeometry::new([13, 9, 7], [4, 4, 4], 2, DataType::Uint32);
        let mut rng = StdRng::seed_from_u64(21);
        let values: Vec<u32> = (0..geometry.num_voxels() * 2)
            .map(|_| rng.gen_range(0..40u32) * 1_000_003)
            .collect();
        assert_gpu_matches_cpu(&decoder, &values, &geometry);
        assert_eq!(decoder.layouts().len(), 1);
    }

    #[test]
    fn gpu_decode_matches_cpu_for_wide_values() {
        init_logging();
        let Some(decoder) = decoder(GpuDecoderConfig::default()) else {
            return;
        };
        let geometry = ChunkGeometry::new([8, 8, 8], [8, 4, 2], 1, DataType::Uint64);
        let mut rng = StdRng::seed_from_u64(22);
        let palette: Vec<Uint64> = (0..300).map(|_| Uint64::random_with(&mut rng)).collect();
        let values: Vec<Uint64> = (0..geometry.num_voxels())
            .map(|_| palette[rng.gen_range(0..palette.len())])
            .collect();
        assert_gpu_matches_cpu(&decoder, &values, &geometry);
    }

    #[test]
    fn gpu_decode_rejects_mismatched_width() {
        init_logging();
        let Some(decoder) = decoder(GpuDecoderConfig::default()) else {
            return;
        };
        let geometry = ChunkGeometry::new([2, 2, 2], [2, 2, 2], 1, DataType::Uint32);
        let result = block_on(decoder.decode_channel::<Uint64>(&[0; 8], &geometry, 0));
        assert!(matches!(
            result,
            Err(GpuDecodeError::Geometry(GeometryError::DataTypeMismatch { .. }))
        ));
    }

    #[test]
    fn gpu_decode_rejects_out_of_range_channel() {
        init_logging();
        let Some(decoder) = decoder(GpuDecoderConfig::default()) else {
            return;
        };
        let geometry = ChunkGeometry::new([2, 2, 2], [2, 2, 2], 1, DataType::Uint32);
        let encoded = encode_chunk(&[5u32; 8], &geometry, &EncodeOptions::default()).expect("encode");
        let result = block_on(decoder.decode_channel::<u32>(&encoded, &geometry, 3));
        assert!(matches!(
            result,
            Err(GpuDecodeError::Geometry(GeometryError::ChannelOutOfRange {
                channel: 3,
                num_channels: 1
            }))
        ));
    }
}
