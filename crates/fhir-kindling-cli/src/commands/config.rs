use colored::Colorize;
use fhir_kindling::{Auth, KindlingConfig};

pub fn show(cfg: &KindlingConfig) {
    let server = &cfg.server;
    println!(
        "{}: {}",
        "Server".cyan(),
        server.api_url.as_deref().unwrap_or("(not set)")
    );
    println!("{}: {}", "Format".cyan(), server.format);
    let auth = match server.auth() {
        Some(Auth::Basic { username, .. }) => format!("basic ({username})"),
        Some(Auth::Bearer { .. }) => "bearer token".to_string(),
        None => "none".to_string(),
    };
    println!("{}: {}", "Auth".cyan(), auth);
    println!(
        "{}: {}",
        "Timeout".cyan(),
        server
            .timeout_secs
            .map(|s| format!("{s}s"))
            .unwrap_or_else(|| "(none)".to_string())
    );
    println!("{}: {}", "Log level".cyan(), cfg.logging.level);
}
