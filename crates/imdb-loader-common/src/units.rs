//! Byte-size conversions shared by file listings and log lines

/// Bytes in one mebibyte; listings report "MB" in this binary sense.
pub const BYTES_PER_MB: u64 = 1024 * 1024;

const SIZE_UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

/// Size in megabytes rounded to two decimals
pub fn bytes_to_mb(bytes: u64) -> f64 {
    let mb = bytes as f64 / BYTES_PER_MB as f64;
    (mb * 100.0).round() / 100.0
}

/// Human-readable size such as "1.50 MB"
pub fn format_file_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0 B".to_string();
    }

    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < SIZE_UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }

    format!("{:.2} {}", size, SIZE_UNITS[unit])
}
