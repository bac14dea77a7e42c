// Terminal UI utilities

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

use crate::domain::deploy::DeploySummary;

pub fn print_header(title: &str) {
    println!();
    println!(
        "{}",
        "╔════════════════════════════════════════════════════════════╗".bright_blue()
    );
    println!("{}", format!("║  {:<58}║", title).bright_blue());
    println!(
        "{}",
        "╚════════════════════════════════════════════════════════════╝".bright_blue()
    );
    println!();
}

pub fn print_success(message: &str) {
    println!("{}", format!("✅ {}", message).bright_green().bold());
}

pub fn print_error(message: &str) {
    eprintln!("{}", format!("❌ {}", message).bright_red().bold());
}

pub fn print_info(message: &str) {
    println!("{}", format!("ℹ️  {}", message).bright_cyan());
}

pub fn print_warning(message: &str) {
    println!("{}", format!("⚠️  {}", message).bright_yellow());
}

/// Steady-ticking spinner for captured, quiet collaborator calls
pub fn spinner(message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

pub fn print_deploy_summary(summary: &DeploySummary) {
    println!();
    for note in &summary.notes {
        print_warning(note);
    }

    if summary.self_update {
        print_success("Self-update dispatched; the CI deployment continues in the background");
        return;
    }

    print_success("DEPLOY SUCCESSFUL");
    println!();
    println!("  {} {}", "URL:".bright_white().bold(), summary.url.bright_green());
    println!("  {} {}", "Username:".bright_white().bold(), summary.username);
    println!("  {} {}", "Password:".bright_white().bold(), summary.password);
    println!();
    print_info(&summary.credentials_hint);
}
