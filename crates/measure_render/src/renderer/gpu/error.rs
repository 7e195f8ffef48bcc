use glow::HasContext;
use std::fmt;
use thiserror::Error;

/// GL error codes drained from one call site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlErrors {
    pub reason: String,
    pub api: &'static str,
    pub codes: Vec<u32>,
}

impl fmt::Display for GlErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}: ", self.reason, self.api)?;
        for (i, code) in self.codes.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{} ({:#06x})", error_name(*code), code)?;
        }
        Ok(())
    }
}

/// Errors from creating, updating or drawing GPU objects.
#[derive(Debug, Error)]
pub enum GpuError {
    #[error("{0}")]
    Gl(GlErrors),
    #[error("failed to create {what}: {message}")]
    Create { what: &'static str, message: String },
    #[error("shader compilation failed:\n{0}")]
    Compile(String),
    #[error("shader link failed:\n{0}")]
    Link(String),
    #[error("error setting uniform `{name}`")]
    Uniform {
        name: String,
        #[source]
        source: Box<GpuError>,
    },
    #[error("{bytes} bytes is not a whole number of {entry_bytes}-byte entries")]
    Misaligned { bytes: usize, entry_bytes: usize },
    #[error(
        "vertex buffers have mismatching numbers of vertices ([0] has {expected} but [{index}] has {actual})"
    )]
    VertexCountMismatch {
        expected: usize,
        index: usize,
        actual: usize,
    },
    #[error("{width}x{height} image needs {expected} samples but has {actual}")]
    ImageSize {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
    #[error("tried to use a freed {0}")]
    Freed(&'static str),
    #[error("framebuffer incomplete: status {0:#06x}")]
    FramebufferIncomplete(u32),
    #[error("failed to load asset `{name}`")]
    Asset {
        name: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode image: {0}")]
    Image(#[from] image::ImageError),
}

/// Symbolic name of a `glGetError` code.
pub fn error_name(code: u32) -> &'static str {
    match code {
        glow::INVALID_ENUM => "GL_INVALID_ENUM",
        glow::INVALID_VALUE => "GL_INVALID_VALUE",
        glow::INVALID_OPERATION => "GL_INVALID_OPERATION",
        glow::INVALID_FRAMEBUFFER_OPERATION => "GL_INVALID_FRAMEBUFFER_OPERATION",
        glow::OUT_OF_MEMORY => "GL_OUT_OF_MEMORY",
        _ => "UNKNOWN",
    }
}

/// Pops every pending GL error.
pub fn drain_gl_errors(gl: &glow::Context) -> Vec<u32> {
    let mut codes = Vec::new();
    loop {
        let code = unsafe { gl.get_error() };
        if code == glow::NO_ERROR {
            return codes;
        }
        codes.push(code);
    }
}

/// Fails with every pending GL error attributed to `api`.
pub fn check_gl_error(gl: &glow::Context, reason: &str, api: &'static str) -> Result<(), GpuError> {
    let codes = drain_gl_errors(gl);
    if codes.is_empty() {
        Ok(())
    } else {
        Err(GpuError::Gl(GlErrors {
            reason: reason.to_string(),
            api,
            codes,
        }))
    }
}

/// Logs pending GL errors at `level` and carries on.
pub fn log_gl_errors(gl: &glow::Context, level: log::Level, reason: &str, api: &'static str) {
    let codes = drain_gl_errors(gl);
    if !codes.is_empty() {
        let errors = GlErrors {
            reason: reason.to_string(),
            api,
            codes,
        };
        log::log!(level, "{errors}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gl_errors_format() {
        let errors = GlErrors {
            reason: "Failed to populate buffer".into(),
            api: "glBufferData",
            codes: vec![glow::INVALID_VALUE, glow::OUT_OF_MEMORY],
        };
        assert_eq!(
            errors.to_string(),
            "Failed to populate buffer: glBufferData: GL_INVALID_VALUE (0x0501), GL_OUT_OF_MEMORY (0x0505)"
        );
    }

    #[test]
    fn test_uniform_error_names_source() {
        let err = GpuError::Uniform {
            name: "u_Color".into(),
            source: Box::new(GpuError::Freed("Texture")),
        };
        assert_eq!(err.to_string(), "error setting uniform `u_Color`");
    }
}
