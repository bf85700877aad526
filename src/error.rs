//! Error taxonomy for the stroke rendering core.
//!
//! Most of these kinds are recoverable: the renderer absorbs them and keeps the stroke
//! visible in a degraded form rather than failing the draw call. Only backend creation and
//! shader compilation are propagated as hard errors.

use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum RenderError {
    /// GPU context creation failed, the device lacks a required feature, or the context
    /// was lost. Recovery is "fall back to the software backend" / "rebuild on restore".
    #[error("resource unavailable: {0}")]
    ResourceUnavailable(String),

    /// A GPU-side buffer (path/instance/line) needs more capacity than it has.
    /// Recovery is always "grow it", never "drop the work".
    #[error("buffer `{buffer}` overflowed: requested {requested} bytes")]
    Overflow {
        buffer: &'static str,
        requested: usize,
    },

    /// Fewer than 3 vertices passed to `fill_path`/`fill_triangles`, or a 0-sample stroke.
    /// Recovery is "ignore, draw nothing".
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// A style id, grain texture, or stamp texture was not found/ready.
    /// Recovery is a documented per-site fallback (§7).
    #[error("missing resource: {0}")]
    MissingResource(String),

    /// A tile worker received an unrecognized message, or (fatal) dropped a reply.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// Shader link/compile failure during backend initialization. Not recoverable within
    /// the core; the host must choose to fall back or abort.
    #[error("fatal internal error: {0}")]
    FatalInternal(String),
}

pub type RenderResult<T> = Result<T, RenderError>;
