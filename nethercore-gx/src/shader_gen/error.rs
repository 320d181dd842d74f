use std::fmt;

/// Error type for shader generation failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShaderGenError {
    /// Programs cannot be specialized for an empty framebuffer
    EmptyFramebuffer { width: u32, height: u32 },
    /// A template marker survived substitution
    UnreplacedPlaceholder { label: String, placeholder: String },
}

impl fmt::Display for ShaderGenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderGenError::EmptyFramebuffer { width, height } => {
                write!(f, "Cannot build programs for a {}x{} framebuffer", width, height)
            }
            ShaderGenError::UnreplacedPlaceholder { label, placeholder } => {
                write!(f, "Shader {} has unreplaced placeholder '{}'", label, placeholder)
            }
        }
    }
}

impl std::error::Error for ShaderGenError {}
