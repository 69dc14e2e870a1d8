use console::{Emoji, style};

use crate::core::metadata::StructuredMetadataEntry;
use crate::core::types::{Message, Role};

pub static SUCCESS_ICON: Emoji<'_, '_> = Emoji("✅ ", "");
pub static INFO_ICON: Emoji<'_, '_> = Emoji("ℹ️  ", "");
pub static WARN_ICON: Emoji<'_, '_> = Emoji("⚠️  ", "");
pub static ERROR_ICON: Emoji<'_, '_> = Emoji("❌ ", "");
pub static GEAR: Emoji<'_, '_> = Emoji("⚙️  ", "");
pub static BOOK: Emoji<'_, '_> = Emoji("📚 ", "");

pub fn print_success(msg: &str) {
    println!("{} {}", SUCCESS_ICON, style(msg).green());
}

pub fn print_info(msg: &str) {
    println!("{} {}", INFO_ICON, style(msg).blue());
}

pub fn print_warn(msg: &str) {
    println!("{} {}", WARN_ICON, style(msg).yellow());
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", ERROR_ICON, style(msg).red().bold());
}

pub fn print_message(message: &Message) {
    let label = match message.role {
        Role::User => style("you").bold().green(),
        Role::Assistant => style("assistant").bold().magenta(),
    };
    println!("{} {}", label, message.content);
}

pub fn print_sources(entries: &[StructuredMetadataEntry]) {
    if entries.is_empty() {
        return;
    }
    println!("\n{} {}", BOOK, style("Sources").bold());
    for entry in entries {
        println!(
            "  {}. {} {}",
            entry.index,
            style(&entry.title).bold(),
            style(&entry.link).underlined().cyan()
        );
        if !entry.authors.is_empty() {
            println!("     {}", style(entry.authors.join(", ")).dim());
        }
    }
}

/// A titled block of aligned lines for help and status output.
pub struct GuideSection {
    title: String,
    lines: Vec<String>,
}

impl GuideSection {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            lines: Vec::new(),
        }
    }

    pub fn command(mut self, name: &str, about: &str) -> Self {
        self.lines
            .push(format!("  {} {}", style(format!("{:<28}", name)).green(), style(about).dim()));
        self
    }

    pub fn status(mut self, label: &str, value: &str) -> Self {
        self.lines
            .push(format!("  {} {}: {}", GEAR, style(label).bold().cyan(), value));
        self
    }

    pub fn text(mut self, text: &str) -> Self {
        self.lines.push(format!("  {}", text));
        self
    }

    pub fn blank(mut self) -> Self {
        self.lines.push(String::new());
        self
    }

    pub fn print(&self) {
        println!("\n {}", style(&self.title).bold().underlined());
        for line in &self.lines {
            println!("{}", line);
        }
    }
}

pub fn print_banner() {
    println!(
        "\n {} {}",
        style("mevchat").bold().magenta(),
        style(env!("CARGO_PKG_VERSION")).dim()
    );
    println!(" {}\n", style("Ask questions about MEV research.").cyan());
}
