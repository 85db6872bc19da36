//! Bakes the network credentials into the binary.
//!
//! Values come from a `.env` file next to this crate (or any parent
//! directory) and may be overridden by the build environment.

const REQUIRED: [&str; 4] = ["WIFI_SSID", "WIFI_PASSWORD", "SERVER_HOSTNAME", "API_KEY"];

fn main() {
    if let Ok(path) = dotenvy::dotenv() {
        println!("cargo:rerun-if-changed={}", path.display());
    }

    for key in REQUIRED {
        println!("cargo:rerun-if-env-changed={key}");
        match std::env::var(key) {
            Ok(value) => println!("cargo:rustc-env={key}={value}"),
            Err(_) => panic!("{key} is not set; add it to .env or the build environment"),
        }
    }

    println!("cargo:rustc-link-arg=-Tlinkall.x");
}
