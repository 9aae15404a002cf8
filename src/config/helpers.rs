use std::str::FromStr;

use crate::error::ConfigError;

/// Read an environment variable, treating unset and empty as `None`.
pub(crate) fn optional_env(key: &str) -> Result<Option<String>, ConfigError> {
    match std::env::var(key) {
        Ok(val) if val.trim().is_empty() => Ok(None),
        Ok(val) => Ok(Some(val)),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(std::env::VarError::NotUnicode(_)) => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: "value is not valid UTF-8".to_string(),
        }),
    }
}

/// Parse an optional environment variable, falling back to `default`.
pub(crate) fn parse_optional_env<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match optional_env(key)? {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            }),
        None => Ok(default),
    }
}

/// Parse a boolean environment variable. Accepts `true/false`, `1/0`, `yes/no`.
pub(crate) fn parse_bool_env(key: &str, default: bool) -> Result<bool, ConfigError> {
    match optional_env(key)? {
        Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            other => Err(ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("must be 'true' or 'false', got '{other}'"),
            }),
        },
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_optional_env_unset_is_none() {
        assert!(
            optional_env("KIDGUARD_TEST_DEFINITELY_UNSET_VAR")
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn test_parse_optional_env_default_and_value() {
        assert_eq!(
            parse_optional_env("KIDGUARD_TEST_UNSET_NUMBER", 16u32).unwrap(),
            16
        );

        // SAFETY: the variable name is unique to this test.
        unsafe { std::env::set_var("KIDGUARD_TEST_PARSE_NUMBER", " 42 ") };
        assert_eq!(
            parse_optional_env("KIDGUARD_TEST_PARSE_NUMBER", 0u32).unwrap(),
            42
        );
    }

    #[test]
    fn test_parse_optional_env_rejects_garbage() {
        // SAFETY: the variable name is unique to this test.
        unsafe { std::env::set_var("KIDGUARD_TEST_PARSE_GARBAGE", "many") };
        let err = parse_optional_env("KIDGUARD_TEST_PARSE_GARBAGE", 0u32).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "KIDGUARD_TEST_PARSE_GARBAGE"));
    }

    #[test]
    fn test_parse_bool_env_variants() {
        // SAFETY: the variable names are unique to this test.
        unsafe {
            std::env::set_var("KIDGUARD_TEST_BOOL_YES", "yes");
            std::env::set_var("KIDGUARD_TEST_BOOL_ZERO", "0");
            std::env::set_var("KIDGUARD_TEST_BOOL_BAD", "maybe");
        }
        assert!(parse_bool_env("KIDGUARD_TEST_BOOL_YES", false).unwrap());
        assert!(!parse_bool_env("KIDGUARD_TEST_BOOL_ZERO", true).unwrap());
        assert!(parse_bool_env("KIDGUARD_TEST_BOOL_UNSET", true).unwrap());
        assert!(parse_bool_env("KIDGUARD_TEST_BOOL_BAD", true).is_err());
    }
}
