//! Per-frame CPU staging of vertex, index, instance and uniform data.
//!
//! Everything a frame pushes lands in two growing byte vectors and reaches the GPU in one
//! `flush`. Views handed out before the flush stay valid: they reference the shared GPU
//! buffers by offset.

use std::sync::Arc;

use tracing::trace;

use crate::gpu::{BufferUsage, BufferView, GpuBuffer, GpuDevice};

const STAGE_DEFAULT_BUFFER_SIZE: usize = 1024;

pub struct HwStageBuffer {
    gpu_buffer: Arc<dyn GpuBuffer>,
    gpu_index_buffer: Arc<dyn GpuBuffer>,
    stage: Vec<u8>,
    stage_index: Vec<u8>,
    ubo_alignment: usize,
    writing_offset: Option<usize>,
}

impl HwStageBuffer {
    pub fn new(device: &dyn GpuDevice) -> Self {
        Self {
            gpu_buffer: device.create_buffer(BufferUsage::VERTEX | BufferUsage::UNIFORM),
            gpu_index_buffer: device.create_buffer(BufferUsage::INDEX),
            stage: Vec::with_capacity(STAGE_DEFAULT_BUFFER_SIZE),
            stage_index: Vec::with_capacity(STAGE_DEFAULT_BUFFER_SIZE),
            ubo_alignment: device.buffer_alignment().max(4) as usize,
            writing_offset: None,
        }
    }

    fn view(&self, offset: usize, size: usize) -> BufferView {
        BufferView {
            buffer: Some(self.gpu_buffer.clone()),
            offset: offset as u64,
            size: size as u64,
        }
    }

    /// Pads the stage so the next write starts at a multiple of `align`.
    fn align_to(&mut self, align: usize) {
        let rem = self.stage.len() % align;
        if rem != 0 {
            self.stage.resize(self.stage.len() + align - rem, 0);
        }
    }

    /// Copies `data` into the stage. With `align_offset` the data starts at a uniform
    /// buffer offset boundary, as bind groups require.
    pub fn push(&mut self, data: &[u8], align_offset: bool) -> BufferView {
        debug_assert!(self.writing_offset.is_none(), "push while writing an instance");
        self.align_to(if align_offset { self.ubo_alignment } else { 4 });
        let offset = self.stage.len();
        self.stage.extend_from_slice(data);
        self.view(offset, data.len())
    }

    pub fn push_vertex(&mut self, data: &[u8]) -> BufferView {
        self.push(data, false)
    }

    pub fn push_uniform(&mut self, data: &[u8]) -> BufferView {
        self.push(data, true)
    }

    pub fn push_index(&mut self, data: &[u8]) -> BufferView {
        let offset = self.stage_index.len();
        self.stage_index.extend_from_slice(data);
        BufferView {
            buffer: Some(self.gpu_index_buffer.clone()),
            offset: offset as u64,
            size: data.len() as u64,
        }
    }

    /// Reserves `size` zeroed bytes and returns their view and storage.
    pub fn allocate(&mut self, size: usize, align_offset: bool) -> (BufferView, &mut [u8]) {
        self.align_to(if align_offset { self.ubo_alignment } else { 4 });
        let offset = self.stage.len();
        self.stage.resize(offset + size, 0);
        let view = self.view(offset, size);
        (view, &mut self.stage[offset..])
    }

    /// Starts a run of per-instance records that end up in one contiguous view.
    pub fn begin_writing_instance(&mut self, estimate_size: usize, align: usize) {
        debug_assert!(self.writing_offset.is_none(), "nested instance writing");
        self.align_to(align.max(4));
        self.stage.reserve(estimate_size);
        self.writing_offset = Some(self.stage.len());
    }

    pub fn append_instance(&mut self, data: &[u8]) {
        debug_assert!(self.writing_offset.is_some(), "append outside begin/end");
        self.stage.extend_from_slice(data);
    }

    pub fn end_writing_instance(&mut self) -> BufferView {
        let offset = self.writing_offset.take().unwrap_or(self.stage.len());
        self.view(offset, self.stage.len() - offset)
    }

    /// Bytes staged since the last flush.
    pub fn len(&self) -> usize {
        self.stage.len()
    }

    pub fn index_len(&self) -> usize {
        self.stage_index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stage.is_empty() && self.stage_index.is_empty()
    }

    /// Uploads everything staged and starts over.
    pub fn flush(&mut self) {
        trace!(bytes = self.stage.len(), index_bytes = self.stage_index.len(), "flush stage buffer");
        self.gpu_buffer.upload_data(&self.stage);
        self.gpu_index_buffer.upload_data(&self.stage_index);
        self.stage.clear();
        self.stage_index.clear();
    }
}

impl std::fmt::Debug for HwStageBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HwStageBuffer")
            .field("staged", &self.stage.len())
            .field("staged_index", &self.stage_index.len())
            .field("ubo_alignment", &self.ubo_alignment)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::headless::{HeadlessBuffer, HeadlessDevice};

    #[test]
    fn uniforms_start_on_alignment_boundaries() {
        let device = HeadlessDevice::default();
        let mut stage = HwStageBuffer::new(&device);
        let vertex = stage.push_vertex(&[1, 2, 3]);
        assert_eq!(vertex.offset, 0);
        let uniform = stage.push_uniform(&[0; 16]);
        assert_eq!(uniform.offset, 256);
        let next = stage.push_vertex(&[0; 8]);
        assert_eq!(next.offset, 272);
    }

    #[test]
    fn instances_form_one_contiguous_view() {
        let device = HeadlessDevice::default();
        let mut stage = HwStageBuffer::new(&device);
        stage.push_vertex(&[9; 6]);
        stage.begin_writing_instance(32, 16);
        stage.append_instance(&[1; 8]);
        stage.append_instance(&[2; 8]);
        let view = stage.end_writing_instance();
        assert_eq!(view.offset, 16);
        assert_eq!(view.size, 16);
    }

    #[test]
    fn flush_uploads_and_resets() {
        let device = HeadlessDevice::default();
        let mut stage = HwStageBuffer::new(&device);
        let view = stage.push_vertex(&[7, 7, 7, 7]);
        let index = stage.push_index(&[1, 0, 0, 0]);
        stage.flush();
        assert!(stage.is_empty());

        let buffer = view.buffer.unwrap();
        let headless = buffer.as_any().downcast_ref::<HeadlessBuffer>().unwrap();
        assert_eq!(headless.contents(), vec![7, 7, 7, 7]);
        assert!(index.buffer.is_some());
    }
}
