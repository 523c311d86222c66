use super::{AppConfig, ConfigError};

/// Validate the full application config, returning an error if any rule is violated.
///
/// # Errors
///
/// Returns [`ConfigError::Validation`] when any configuration invariant is violated.
pub fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    validate_log_level(config)?;
    validate_log_format(config)?;
    validate_softcall(config)?;
    validate_stream(config)?;
    validate_generation(config)?;
    Ok(())
}

fn validation_err(msg: impl Into<String>) -> ConfigError {
    ConfigError::Validation(msg.into())
}

fn validate_log_level(config: &AppConfig) -> Result<(), ConfigError> {
    let valid_levels = ["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL", "DISABLED"];
    if !valid_levels.contains(&config.features.log_level.to_uppercase().as_str()) {
        return Err(validation_err(format!(
            "log_level must be one of {valid_levels:?}"
        )));
    }
    Ok(())
}

fn validate_log_format(config: &AppConfig) -> Result<(), ConfigError> {
    let format = config.features.log_format.to_lowercase();
    if format != "text" && format != "json" {
        return Err(validation_err("log_format must be 'text' or 'json'"));
    }
    Ok(())
}

fn validate_softcall(config: &AppConfig) -> Result<(), ConfigError> {
    if config.softcall.max_block_bytes == 0 {
        return Err(validation_err(
            "softcall.max_block_bytes must be greater than 0",
        ));
    }
    Ok(())
}

fn validate_stream(config: &AppConfig) -> Result<(), ConfigError> {
    if config.stream.buffer_capacity == 0 {
        return Err(validation_err(
            "stream.buffer_capacity must be greater than 0",
        ));
    }
    Ok(())
}

fn validate_generation(config: &AppConfig) -> Result<(), ConfigError> {
    let generation = &config.generation;
    if let Some(temperature) = generation.temperature {
        if !(0.0..=2.0).contains(&temperature) {
            return Err(validation_err(
                "generation.temperature must be between 0 and 2",
            ));
        }
    }
    if let Some(top_p) = generation.top_p {
        if !(top_p > 0.0 && top_p <= 1.0) {
            return Err(validation_err(
                "generation.top_p must be greater than 0 and at most 1",
            ));
        }
    }
    if generation.top_k == Some(0) {
        return Err(validation_err(
            "generation.top_k must be greater than 0 when set",
        ));
    }
    if generation.max_output_tokens == Some(0) {
        return Err(validation_err(
            "generation.max_output_tokens must be greater than 0 when set",
        ));
    }
    if generation.stop_sequences.iter().any(String::is_empty) {
        return Err(validation_err(
            "generation.stop_sequences contains an empty sequence",
        ));
    }
    if let Some(thinking) = generation.thinking {
        if thinking.thinking_budget == Some(0) && thinking.include_thoughts {
            return Err(validation_err(
                "generation.thinking.thinking_budget must be greater than 0 when thoughts are included",
            ));
        }
    }
    Ok(())
}
