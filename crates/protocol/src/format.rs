//! Human-readable byte and throughput formatting.

const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

/// Formats a byte count using base-1024 units, e.g. `1.5 KB`.
///
/// Up to two decimals are kept; trailing zeros are dropped.
pub fn format_bytes(bytes: u64) -> String {
    if bytes == 0 {
        return "0 B".to_string();
    }
    let exp = ((bytes as f64).ln() / 1024f64.ln()).floor() as usize;
    let exp = exp.min(UNITS.len() - 1);
    let value = bytes as f64 / 1024f64.powi(exp as i32);
    let text = format!("{value:.2}");
    let text = text.trim_end_matches('0').trim_end_matches('.');
    format!("{text} {}", UNITS[exp])
}

/// Formats a throughput in bytes/second as `KB/s` or `MB/s`.
pub fn format_speed(bytes_per_sec: f64) -> String {
    if bytes_per_sec <= 0.0 {
        return "0 MB/s".to_string();
    }
    let mb = bytes_per_sec / (1024.0 * 1024.0);
    if mb < 0.1 {
        format!("{:.1} KB/s", bytes_per_sec / 1024.0)
    } else {
        format!("{mb:.1} MB/s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_zero() {
        assert_eq!(format_bytes(0), "0 B");
    }

    #[test]
    fn bytes_units() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1024), "1 KB");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(10 * 1024 * 1024), "10 MB");
        assert_eq!(format_bytes(1_288_490_189), "1.2 GB");
    }

    #[test]
    fn bytes_caps_at_terabytes() {
        let pb = 1024u64.pow(5);
        assert_eq!(format_bytes(pb), "1024 TB");
    }

    #[test]
    fn speed_zero() {
        assert_eq!(format_speed(0.0), "0 MB/s");
    }

    #[test]
    fn speed_kilobytes() {
        assert_eq!(format_speed(50.0 * 1024.0), "50.0 KB/s");
    }

    #[test]
    fn speed_megabytes() {
        assert_eq!(format_speed(2.5 * 1024.0 * 1024.0), "2.5 MB/s");
    }

    #[test]
    fn speed_threshold_is_tenth_of_megabyte() {
        assert!(format_speed(0.099 * 1024.0 * 1024.0).ends_with("KB/s"));
        assert!(format_speed(0.1 * 1024.0 * 1024.0).ends_with("MB/s"));
    }
}
