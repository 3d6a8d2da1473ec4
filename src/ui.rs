use colored::*;
use terminal_size::{Width, Height, terminal_size};

pub fn print_banner(subtitle: &str) {
    let (width, _) = terminal_size().unwrap_or((Width(80), Height(24)));
    let line = "─".repeat((width.0 as usize).min(100));
    println!("{}", line.black().bold());

    let name = "xsignin".cyan().bold();
    let version = format!("v{}", env!("CARGO_PKG_VERSION")).black().bold();
    println!("  {} {}  {}", name, version, subtitle);

    println!("{}", line.black().bold());
}

pub fn print_step(msg: &str) {
    println!("  {} {}", "•".green(), msg);
}

pub fn print_success(msg: &str) {
    println!("  {} {}", "✓".green().bold(), msg.green());
}

pub fn print_warning(msg: &str) {
    println!("  {} {}", "⚠️ ".yellow().bold(), msg.yellow());
}

pub fn print_error(msg: &str) {
    println!("  {} {}", "✗".red().bold(), msg.red());
}

pub fn print_thinking(msg: &str) {
    println!("  {} {}...", "∴".magenta(), msg);
}

/// Render a duration in milliseconds as "3h 12m"
pub fn format_remaining(ms: i64) -> String {
    let minutes = ms.max(0) / 60_000;
    let (hours, minutes) = (minutes / 60, minutes % 60);
    if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else {
        format!("{}m", minutes)
    }
}
