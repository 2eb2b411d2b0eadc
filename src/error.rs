pub type TexflowResult<T> = Result<T, TexflowError>;

#[derive(thiserror::Error, Debug)]
pub enum TexflowError {
    #[error("allocation error: {0}")]
    Allocation(String),

    #[error("attachment error: {0}")]
    Attachment(String),

    #[error("kernel compile error: {0}")]
    Compile(String),

    #[error("kernel link error: {0}")]
    Link(String),

    #[error("device error: {0}")]
    Runtime(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl TexflowError {
    pub fn allocation(msg: impl Into<String>) -> Self {
        Self::Allocation(msg.into())
    }

    pub fn attachment(msg: impl Into<String>) -> Self {
        Self::Attachment(msg.into())
    }

    pub fn compile(msg: impl Into<String>) -> Self {
        Self::Compile(msg.into())
    }

    pub fn link(msg: impl Into<String>) -> Self {
        Self::Link(msg.into())
    }

    pub fn runtime(msg: impl Into<String>) -> Self {
        Self::Runtime(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes_are_stable() {
        assert!(
            TexflowError::allocation("x")
                .to_string()
                .contains("allocation error:")
        );
        assert!(
            TexflowError::attachment("x")
                .to_string()
                .contains("attachment error:")
        );
        assert!(
            TexflowError::compile("x")
                .to_string()
                .contains("kernel compile error:")
        );
        assert!(
            TexflowError::link("x")
                .to_string()
                .contains("kernel link error:")
        );
        assert!(
            TexflowError::runtime("x")
                .to_string()
                .contains("device error:")
        );
    }

    #[test]
    fn other_preserves_source() {
        let base = std::io::Error::other("boom");
        let err = TexflowError::Other(anyhow::Error::new(base));
        assert!(err.to_string().contains("boom"));
    }
}
