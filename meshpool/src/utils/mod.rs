use colored::*;

pub fn print_error(message: &str) {
    eprintln!("{prefix} {message}", prefix = "Error:".red().bold());
}

pub fn print_success(message: &str) {
    eprintln!("{prefix} {message}", prefix = "✓".green().bold());
}

pub fn print_warning(message: &str) {
    eprintln!("{prefix} {message}", prefix = "⚠".yellow().bold());
}

pub fn print_info(message: &str) {
    eprintln!("{prefix} {message}", prefix = "ℹ".blue().bold());
}

pub fn format_snr(snr: Option<f32>) -> String {
    snr.map(|s| format!("{s:.1}")).unwrap_or_else(|| "?".to_string())
}

pub fn format_hops(hops: Option<u32>) -> String {
    hops.map(|h| h.to_string()).unwrap_or_else(|| "?".to_string())
}

pub fn format_timestamp(timestamp: &chrono::DateTime<chrono::Utc>) -> String {
    timestamp.format("%Y-%m-%d %H:%M:%S").to_string()
}
