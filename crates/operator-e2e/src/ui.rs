//! Console output for the e2e CLI.

use colored::Colorize;

use crate::runner::{ScenarioOutcome, SuiteReport};
use crate::scenarios::Scenario;

/// Print a section header.
pub fn print_section(title: &str) {
    println!();
    println!("{}", "═".repeat(70).bright_black());
    println!("{}", title.cyan().bold());
    println!("{}", "═".repeat(70).bright_black());
    println!();
}

/// Print a step indicator with message.
pub fn print_step(message: &str) {
    println!("{} {}", "▶".cyan(), message.bold());
}

pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message.green());
}

pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message.yellow());
}

pub fn print_error(message: &str) {
    println!("{} {}", "✗".red().bold(), message.red());
}

pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// List available scenarios with the config keys they touch.
pub fn print_scenarios(scenarios: &[Box<dyn Scenario>]) {
    print_section("Scenarios");
    for scenario in scenarios {
        println!(
            "  {:<26} {}",
            scenario.name().cyan(),
            scenario.description()
        );
        if !scenario.config_keys().is_empty() {
            println!(
                "  {:<26} {}",
                "",
                format!("config: {}", scenario.config_keys().join(", ")).bright_black()
            );
        }
    }
    println!();
}

/// Print one line per scenario followed by totals.
pub fn print_report(report: &SuiteReport) {
    print_section("Results");
    for result in &report.results {
        let elapsed = format!("({:.0}s)", result.elapsed_secs).bright_black();
        match &result.outcome {
            ScenarioOutcome::Passed => {
                println!("  {} {} {elapsed}", "✓".green(), result.name);
            }
            ScenarioOutcome::Failed {
                error,
                diagnostics,
                fatal,
            } => {
                let marker = if *fatal { "✗ fatal".red().bold() } else { "✗".red() };
                println!("  {marker} {} {elapsed}", result.name);
                println!("      {}", error.red());
                if let Some(log) = diagnostics {
                    println!("      {}", "operator log tail:".bright_black());
                    for line in log.lines() {
                        println!("        {}", line.bright_black());
                    }
                }
            }
            ScenarioOutcome::Skipped { reason } => {
                println!("  {} {} {}", "-".yellow(), result.name, reason.yellow());
            }
        }
    }
    println!();

    let summary = format!(
        "{} passed, {} failed, {} skipped",
        report.passed(),
        report.failed(),
        report.skipped()
    );
    if report.all_passed() {
        print_success(&summary);
    } else {
        print_error(&summary);
    }
}
