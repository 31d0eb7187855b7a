use wgpu::util::DeviceExt;

use crate::core::{ChunkGeometry, EncodedValue};
use crate::error::GeometryError;
use crate::texel_decode::DecodeUniforms;
use crate::texture::pack_texels;

use super::buffers::map_buffer_u32;
use super::{GpuChunkDecoder, GpuDecodeError};

impl GpuChunkDecoder {
    /// Decode every voxel of `channel` on the GPU, in fortran order.
    ///
    /// The buffer is uploaded as an `Rgba8Unorm` texture laid out by the
    /// decoder's layout cache and decoded with the float-only routine.
    pub async fn decode_channel<V: EncodedValue>(
        &self,
        buffer: &[u32],
        geometry: &ChunkGeometry,
        channel: u32,
    ) -> Result<Vec<V>, GpuDecodeError> {
        geometry.validate()?;
        if geometry.data_type != V::DATA_TYPE {
            return Err(GeometryError::DataTypeMismatch {
                declared: geometry.data_type.name(),
                supplied: V::DATA_TYPE.name(),
            }
            .into());
        }
        geometry.check_channel(channel)?;

        let layout = self.layouts.get_or_compute(geometry, buffer.len())?;
        let num_voxels = geometry.num_voxels();
        let output_words = num_voxels * V::WORDS;
        let output_bytes = (output_words as u64).saturating_mul(4);
        self.ensure_storage_fits(output_bytes, "decoded output")?;

        let texture = self.device.create_texture_with_data(
            &self.queue,
            &wgpu::TextureDescriptor {
                label: Some("compressed_segmentation.encoded_texture"),
                size: wgpu::Extent3d {
                    width: layout.width,
                    height: layout.height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::Rgba8Unorm,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            },
            wgpu::util::TextureDataOrder::LayerMajor,
            &pack_texels(buffer, &layout),
        );
        let texture_view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let uniforms = DecodeUniforms::new(geometry, &layout, channel);
        let uniforms_buf = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("compressed_segmentation.uniforms"),
            contents: bytemuck::bytes_of(&uniforms),
            usage: wgpu::BufferUsages::UNIFORM,
        });

        let output_buf = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("compressed_segmentation.decoded"),
            size: output_bytes,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("compressed_segmentation.bind_group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&texture_view),
                },
                wgpu::BindGroupEntry { binding: 1, resource: uniforms_buf.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 2, resource: output_buf.as_entire_binding() },
            ],
        });

        let (groups_x, groups_y) = self.dispatch_size(num_voxels)?;

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("compressed_segmentation.encoder"),
        });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("compressed_segmentation.decode_pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(groups_x, groups_y, 1);
        }

        let read_buf = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("compressed_segmentation.read_decoded"),
            size: output_bytes,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        encoder.copy_buffer_to_buffer(&output_buf, 0, &read_buf, 0, output_bytes);

        self.queue.submit([encoder.finish()]);
        self.device.poll(wgpu::Maintain::Wait);

        let words = map_buffer_u32(&read_buf, &self.device).await?;
        log::debug!(
            "gpu decoded channel {} of {:?}: {} voxels via {}x{} texture, {}x{} workgroups",
            channel,
            geometry.data_size.to_array(),
            num_voxels,
            layout.width,
            layout.height,
            groups_x,
            groups_y
        );
        Ok(words.chunks_exact(V::WORDS).map(V::from_words).collect())
    }

    /// Workgroup grid covering `num_voxels` invocations, folded into a
    /// second dimension past the per-dimension limit.
    pub(crate) fn dispatch_size(&self, num_voxels: usize) -> Result<(u32, u32), GpuDecodeError> {
        let groups = num_voxels.div_ceil(self.workgroup_size as usize).max(1);
        let max = self.max_compute_workgroups_per_dimension as usize;
        let groups_x = groups.min(max);
        let groups_y = groups.div_ceil(groups_x);
        if groups_y > max {
            return Err(GpuDecodeError::Limit(format!(
                "{num_voxels} voxels need {groups_y} workgroup rows, max {max}"
            )));
        }
        Ok((groups_x as u32, groups_y as u32))
    }
}
