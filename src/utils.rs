use colored::Colorize;

/// Format a timestamp in human-readable form
pub fn format_timestamp(timestamp: &chrono::DateTime<chrono::Utc>) -> String {
    timestamp.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

/// Format an entity id truncated for display
pub fn format_id(id: &str) -> String {
    if id.len() <= 12 {
        id.to_string()
    } else {
        format!("{}...{}", &id[..6], &id[id.len() - 6..])
    }
}

/// Format a distance in meters, switching to kilometers past 1 km
pub fn format_distance(meters: f64) -> String {
    if meters < 1_000.0 {
        format!("{:.0} m", meters)
    } else {
        format!("{:.1} km", meters / 1_000.0)
    }
}

/// Format a points amount with color
pub fn format_points(amount: i64) -> String {
    let s = format!("{:+} pts", amount);
    if amount >= 0 {
        s.green().to_string()
    } else {
        s.red().to_string()
    }
}

/// Prompt user for yes/no confirmation
pub fn confirm_action(prompt: &str) -> bool {
    use std::io::{self, Write};

    print!("{} (y/N): ", prompt);
    io::stdout().flush().unwrap();

    let mut input = String::new();
    io::stdin().read_line(&mut input).unwrap();

    matches!(input.trim().to_lowercase().as_str(), "y" | "yes")
}

/// Print a formatted table border
pub fn print_table_border(width: usize) {
    println!("{}", "=".repeat(width));
}

/// Print a table row with columns
pub fn print_table_row(columns: &[&str], widths: &[usize]) {
    let mut row = String::new();
    for (i, col) in columns.iter().enumerate() {
        if i < widths.len() {
            row.push_str(&format!("{:<width$}  ", col, width = widths[i]));
        }
    }
    println!("{}", row.trim_end());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_id_truncation() {
        assert_eq!(format_id("short-id"), "short-id");
        let long = "0f8fad5b-d9cb-469f-a165-70867728950e";
        let formatted = format_id(long);
        assert!(formatted.starts_with("0f8fad"));
        assert!(formatted.ends_with("28950e"));
    }

    #[test]
    fn test_format_distance_units() {
        assert_eq!(format_distance(850.0), "850 m");
        assert_eq!(format_distance(2_400.0), "2.4 km");
    }
}
