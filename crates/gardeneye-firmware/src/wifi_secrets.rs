//! Credentials baked in at build time from `.env`

pub const WIFI_SSID: &str = env!("WIFI_SSID");
pub const WIFI_PASSWORD: &str = env!("WIFI_PASSWORD");
pub const SERVER_HOSTNAME: &str = env!("SERVER_HOSTNAME");
pub const API_KEY: &str = env!("API_KEY");
