use super::models::Config;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Rate limiter window must be positive")]
    ZeroLimiterWindow,

    #[error("Rate limiter max_requests must be at least 1")]
    ZeroLimiterCapacity,

    #[error("Retrieval max_attempts must be at least 1")]
    ZeroMaxAttempts,

    #[error("Timeout must be positive: {field}")]
    ZeroTimeout { field: &'static str },

    #[error("Program must not be empty: {field}")]
    EmptyProgram { field: &'static str },

    #[error("Provider base_url must start with http:// or https://, got '{url}'")]
    InvalidBaseUrl { url: String },

    #[error("Workspace root and output directory must not contain each other ({workspace} / {output})")]
    WorkspaceOverlapsOutputDir { workspace: String, output: String },

    #[error("max_body_bytes must be positive")]
    ZeroBodyLimit,
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_limiter(config)?;
    validate_retrieval(config)?;
    validate_programs(config)?;
    validate_storage(config)?;
    validate_server(config)?;
    Ok(())
}

fn validate_limiter(config: &Config) -> Result<(), ValidationError> {
    if config.limiter.window.0 == Duration::ZERO {
        return Err(ValidationError::ZeroLimiterWindow);
    }
    if config.limiter.max_requests == 0 {
        return Err(ValidationError::ZeroLimiterCapacity);
    }
    Ok(())
}

fn validate_retrieval(config: &Config) -> Result<(), ValidationError> {
    if config.retrieval.max_attempts == 0 {
        return Err(ValidationError::ZeroMaxAttempts);
    }
    Ok(())
}

/// Both external tools need a program and a positive timeout
fn validate_programs(config: &Config) -> Result<(), ValidationError> {
    if config.extractor.program.trim().is_empty() {
        return Err(ValidationError::EmptyProgram {
            field: "extractor.program",
        });
    }
    if config.extractor.timeout.0 == Duration::ZERO {
        return Err(ValidationError::ZeroTimeout {
            field: "extractor.timeout",
        });
    }
    if config.provider.program.trim().is_empty() {
        return Err(ValidationError::EmptyProgram {
            field: "provider.program",
        });
    }
    if config.provider.timeout.0 == Duration::ZERO {
        return Err(ValidationError::ZeroTimeout {
            field: "provider.timeout",
        });
    }

    let url = &config.provider.base_url;
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(ValidationError::InvalidBaseUrl { url: url.clone() });
    }
    Ok(())
}

/// Cleanup of a workspace must never be able to touch served files
fn validate_storage(config: &Config) -> Result<(), ValidationError> {
    let workspace = &config.storage.workspace_root;
    let output = &config.storage.output_dir;
    if workspace.starts_with(output) || output.starts_with(workspace) {
        return Err(ValidationError::WorkspaceOverlapsOutputDir {
            workspace: workspace.display().to_string(),
            output: output.display().to_string(),
        });
    }
    Ok(())
}

fn validate_server(config: &Config) -> Result<(), ValidationError> {
    if config.server.max_body_bytes.as_u64() == 0 {
        return Err(ValidationError::ZeroBodyLimit);
    }
    Ok(())
}
