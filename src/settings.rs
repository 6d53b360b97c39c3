use serde::Deserialize;
use std::{error::Error, fs};

const SETTINGS_FILENAME: &str = "settings.json";

/// Process configuration. Loaded exactly once in main and shared through
/// AppState — nothing else reads settings.json.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub tcp_socket_binding: String,
    pub tcp_socket_port: u16,
    pub database_path: String,
    /// CORS origin. "*" allows any origin.
    pub allowed_origin: String,
    pub jwt_secret: String,
    pub jwt_expiration_hours: i64,
    /// Registration with this token grants the admin role. Empty disables it.
    #[serde(default)]
    pub admin_invite_token: String,
    pub default_admin_name: String,
    pub default_admin_email: String,
    pub default_admin_password: String,
}

impl Settings {
    pub fn load() -> Result<Settings, Box<dyn Error>> {
        let content = fs::read_to_string(SETTINGS_FILENAME)?;
        let settings = serde_json::from_str(&content)?;
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_settings_file() {
        let json = r#"{
            "tcp_socket_binding": "127.0.0.1",
            "tcp_socket_port": 5000,
            "database_path": "test.redb",
            "allowed_origin": "http://localhost:5173",
            "jwt_secret": "secret",
            "jwt_expiration_hours": 24,
            "admin_invite_token": "invite",
            "default_admin_name": "Admin",
            "default_admin_email": "admin@example.com",
            "default_admin_password": "admin"
        }"#;
        let settings: Settings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.tcp_socket_port, 5000);
        assert_eq!(settings.allowed_origin, "http://localhost:5173");
        assert_eq!(settings.admin_invite_token, "invite");
    }

    #[test]
    fn invite_token_defaults_empty() {
        let json = r#"{
            "tcp_socket_binding": "0.0.0.0",
            "tcp_socket_port": 5000,
            "database_path": "test.redb",
            "allowed_origin": "*",
            "jwt_secret": "secret",
            "jwt_expiration_hours": 24,
            "default_admin_name": "Admin",
            "default_admin_email": "admin@example.com",
            "default_admin_password": "admin"
        }"#;
        let settings: Settings = serde_json::from_str(json).unwrap();
        assert!(settings.admin_invite_token.is_empty());
    }
}
