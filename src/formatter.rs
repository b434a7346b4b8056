// file: src/formatter.rs
// description: terminal rendering of live events for the CLI binary

use crate::types::{
    EVENT_AGENT_DIALOGUE_UPDATE, EVENT_AGENT_STATUS_CHANGED, EVENT_CONTENT_GENERATED,
    EVENT_TASK_PROGRESS, Event, StatusChange, TaskProgress,
};

// ANSI color codes
pub struct Colors;

impl Colors {
    pub const RESET: &'static str = "\x1b[0m";
    pub const BOLD: &'static str = "\x1b[1m";
    pub const DIM: &'static str = "\x1b[2m";

    pub const GREEN: &'static str = "\x1b[32m";
    pub const YELLOW: &'static str = "\x1b[33m";
    pub const CYAN: &'static str = "\x1b[36m";
    pub const GRAY: &'static str = "\x1b[90m";
    pub const BRIGHT_MAGENTA: &'static str = "\x1b[95m";
}

#[derive(Debug, Clone)]
pub enum OutputFormat {
    Table,
    Json,
    Minimal,
}

impl From<&str> for OutputFormat {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => OutputFormat::Json,
            "minimal" => OutputFormat::Minimal,
            _ => OutputFormat::Table,
        }
    }
}

pub struct EventFormatter {
    format: OutputFormat,
    colored: bool,
}

impl EventFormatter {
    pub fn new(format: OutputFormat, colored: bool) -> Self {
        Self { format, colored }
    }

    fn paint(&self, color: &str, text: &str) -> String {
        if self.colored {
            format!("{}{}{}", color, text, Colors::RESET)
        } else {
            text.to_string()
        }
    }

    pub fn print_header(&self) {
        if let OutputFormat::Table = self.format {
            println!(
                "{}",
                self.paint(
                    Colors::BOLD,
                    &format!(
                        "{:<8} {:<24} {:<16} {}",
                        "TIME", "TYPE", "AGENT", "DETAIL"
                    )
                )
            );
        }
    }

    pub fn print_event(&self, event: &Event) {
        match self.format {
            OutputFormat::Json => {
                if let Ok(line) = serde_json::to_string(event) {
                    println!("{}", line);
                }
            }
            OutputFormat::Minimal => {
                println!("{} {}", event.event_type, self.detail(event));
            }
            OutputFormat::Table => {
                let time = event.timestamp_local().format("%H:%M:%S").to_string();
                let agent = event.agent_id.as_deref().unwrap_or("-");
                println!(
                    "{} {} {:<16} {}",
                    self.paint(Colors::GRAY, &format!("{:<8}", time)),
                    self.paint(self.type_color(&event.event_type), &format!("{:<24}", event.event_type)),
                    agent,
                    self.detail(event),
                );
            }
        }
    }

    fn type_color(&self, event_type: &str) -> &'static str {
        match event_type {
            EVENT_TASK_PROGRESS => Colors::CYAN,
            EVENT_AGENT_STATUS_CHANGED => Colors::YELLOW,
            EVENT_AGENT_DIALOGUE_UPDATE => Colors::GREEN,
            EVENT_CONTENT_GENERATED => Colors::BRIGHT_MAGENTA,
            _ => Colors::GRAY,
        }
    }

    /// One-line summary of the payload for the common event shapes.
    fn detail(&self, event: &Event) -> String {
        match event.event_type.as_str() {
            EVENT_TASK_PROGRESS => {
                match serde_json::from_value::<TaskProgress>(event.data.clone()) {
                    Ok(p) => format!(
                        "{:>5.1}% [{}] {}",
                        p.progress_percentage, p.current_phase, p.message
                    ),
                    Err(_) => event.data.to_string(),
                }
            }
            EVENT_AGENT_STATUS_CHANGED => {
                match serde_json::from_value::<StatusChange>(event.data.clone()) {
                    Ok(c) => format!("{} -> {}", c.old_status, c.new_status),
                    Err(_) => event.data.to_string(),
                }
            }
            _ => {
                let raw = event.data.to_string();
                if raw.len() > 120 {
                    format!("{}...", raw.chars().take(117).collect::<String>())
                } else {
                    raw
                }
            }
        }
    }

    pub fn print_status(&self, label: &str, detail: &str) {
        println!(
            "{} {}",
            self.paint(Colors::DIM, &format!("[{}]", label)),
            detail
        );
    }
}
