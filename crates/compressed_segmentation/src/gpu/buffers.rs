use super::GpuDecodeError;

pub async fn map_buffer_u32(
    buffer: &wgpu::Buffer,
    device: &wgpu::Device,
) -> Result<Vec<u32>, GpuDecodeError> {
    let slice = buffer.slice(..);
    let (sender, receiver) = futures::channel::oneshot::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = sender.send(result);
    });
    device.poll(wgpu::Maintain::Wait);
    receiver
        .await
        .map_err(|_| GpuDecodeError::Map("map callback dropped".to_string()))?
        .map_err(|e| GpuDecodeError::Map(e.to_string()))?;
    let data = slice.get_mapped_range();
    let result = bytemuck::cast_slice(&data).to_vec();
    drop(data);
    buffer.unmap();
    Ok(result)
}
