//! Deployment stage and the per-stage service defaults

use std::env;

/// Deployment stage the worker runs in
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    /// Live deployment
    Production,
    /// Pre-production deployment
    Staging,
    /// Local development against local broker and services
    Development,
}

impl Environment {
    /// Reads the deployment stage from `APP_ENV`
    ///
    /// Falls back to development when the variable is unset. Matching is
    /// case-insensitive and ignores surrounding whitespace.
    ///
    /// # Panics
    ///
    /// Panics when `APP_ENV` holds an unrecognized stage name
    #[must_use]
    pub fn from_env() -> Self {
        match env::var("APP_ENV").as_deref().map(str::trim) {
            Err(_) => Self::Development,
            Ok(stage) if stage.eq_ignore_ascii_case("production") => Self::Production,
            Ok(stage) if stage.eq_ignore_ascii_case("staging") => Self::Staging,
            Ok(stage) if stage.eq_ignore_ascii_case("development") => Self::Development,
            Ok(other) => panic!("Unknown APP_ENV value: {other}"),
        }
    }

    /// Returns the AMQP broker URL for this stage
    #[must_use]
    pub fn amqp_url(&self) -> &'static str {
        match self {
            Self::Production => "amqp://rabbitmq.internal:5672/%2f",
            Self::Staging => "amqp://rabbitmq.staging.internal:5672/%2f",
            Self::Development => "amqp://localhost:5672/%2f",
        }
    }

    /// Returns the platform API base URL used for user and activity lookups
    #[must_use]
    pub fn platform_api_url(&self) -> &'static str {
        match self {
            Self::Production => "https://platform-api.internal",
            Self::Staging => "https://platform-api.staging.internal",
            Self::Development => "http://localhost:8006",
        }
    }

    /// Returns the email delivery service base URL
    #[must_use]
    pub fn email_api_url(&self) -> &'static str {
        match self {
            Self::Production => "https://email-api.internal",
            Self::Staging => "https://email-api.staging.internal",
            Self::Development => "http://localhost:8007",
        }
    }

    /// Returns the public base URL embedded into unsubscribe links
    #[must_use]
    pub fn frontend_base_url(&self) -> &'static str {
        match self {
            Self::Production => "https://platform.example.com",
            Self::Staging => "https://staging.platform.example.com",
            Self::Development => "http://localhost:3000",
        }
    }

    /// Returns the default admin address for admin-strategy notifications
    #[must_use]
    pub fn default_admin_email(&self) -> &'static str {
        match self {
            Self::Production => "refunds@platform.example.com",
            Self::Staging | Self::Development => "refunds-staging@platform.example.com",
        }
    }

    /// Returns the default HTTP port for the service surface
    #[must_use]
    pub const fn default_service_port(&self) -> u16 {
        match self {
            Self::Production | Self::Staging => 8005,
            Self::Development => 8015,
        }
    }
}

#[cfg(test)]
mod tests {
    use serial_test::serial;

    use super::*;

    #[test]
    #[serial]
    fn app_env_selects_the_stage() {
        let cases = [
            (None, Environment::Development),
            (Some("development"), Environment::Development),
            (Some("staging"), Environment::Staging),
            (Some("production"), Environment::Production),
            (Some("  Production "), Environment::Production),
            (Some("STAGING"), Environment::Staging),
        ];

        for (value, expected) in cases {
            match value {
                Some(value) => env::set_var("APP_ENV", value),
                None => env::remove_var("APP_ENV"),
            }
            assert_eq!(Environment::from_env(), expected, "APP_ENV={value:?}");
        }

        env::remove_var("APP_ENV");
    }

    #[test]
    #[serial]
    #[should_panic(expected = "Unknown APP_ENV value")]
    fn unknown_stage_is_refused() {
        env::set_var("APP_ENV", "qa");
        let _ = Environment::from_env();
    }
}
