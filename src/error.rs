use thiserror::Error;

/// Errors surfaced by construction-time APIs.
///
/// Per-frame failures (an invalid pipeline, an oversized layer, a full atlas) never show up
/// here: they are logged and the affected draw is skipped.
#[derive(Debug, Error)]
pub enum TesseraError {
    /// The generated WGSL failed to parse or validate.
    #[error("shader `{name}` failed to compile: {message}")]
    ShaderCompile { name: String, message: String },
    /// Reflection could not derive bind groups from a shader module.
    #[error("shader `{name}` could not be reflected: {message}")]
    ShaderReflect { name: String, message: String },
    /// Vertex and fragment stages disagree on the layout of a bind group.
    #[error("vertex and fragment stages declare incompatible entries in bind group {group}")]
    BindGroupConflict { group: u32 },
    #[error("texture size {width}x{height} exceeds the device limit {max}")]
    InvalidTextureSize { width: u32, height: u32, max: u32 },
    #[error("no suitable GPU adapter is available")]
    AdapterUnavailable,
    #[error(transparent)]
    RequestDevice(#[from] wgpu::RequestDeviceError),
    #[error("surface error: {0}")]
    Surface(String),
    #[error("texture {0} is not registered")]
    TextureNotFound(u64),
    #[error("pixel readback failed: {0}")]
    ReadPixels(String),
}

pub type Result<T, E = TesseraError> = std::result::Result<T, E>;
