//! CLI command implementations.

pub mod model;
pub mod ota;
pub mod version;

use std::io::{BufRead, Write};

/// Width of the `=` rules framing report sections.
pub const RULE_WIDTH: usize = 70;

// ============================================================================
// Display Helpers
// ============================================================================

/// Group the digits of `n` in threes: `1234567` becomes `"1,234,567"`.
pub fn thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Size in bytes followed by its value in MiB, e.g. `"2,097,152 bytes (2.00 MB)"`.
pub fn format_size_mb(bytes: u64) -> String {
    format!(
        "{} bytes ({:.2} MB)",
        thousands(bytes),
        bytes as f64 / (1024.0 * 1024.0)
    )
}

/// Print a report section title between two rules.
pub fn print_banner(title: &str) {
    let rule = "=".repeat(RULE_WIDTH);
    println!("{}", rule);
    println!("{}", title);
    println!("{}", rule);
}

/// Flush stdout and stderr, ignoring errors.
///
/// Used to ensure output is visible before blocking operations.
pub fn flush_output() {
    let _ = std::io::stdout().flush();
    let _ = std::io::stderr().flush();
}

/// Ask a yes/no question on stdin. Anything but `y`/`yes` is a no.
pub fn confirm(prompt: &str) -> bool {
    print!("{} [y/N]: ", prompt);
    flush_output();
    let mut answer = String::new();
    match std::io::stdin().lock().read_line(&mut answer) {
        Ok(_) => is_yes(&answer),
        Err(_) => false,
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}
