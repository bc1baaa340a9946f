use owo_colors::OwoColorize;
use threadcard_core::{ForwardNode, OutboundMessage, Segment};

use crate::VERSION;

/// Print a styled banner for verbose mode
pub fn print_banner() {
    eprintln!("\n{} {} {}", "Threadcard".bold().bright_blue(), "v".dimmed(), VERSION.dimmed());
    eprintln!("{}", "Forum link cards for chat\n".dimmed());
}

/// Print a success message
pub fn print_success(message: &str) {
    eprintln!("{} {}", "✓".green(), message.bright_green());
}

/// Print an info message
pub fn print_info(message: &str) {
    eprintln!("{} {}", "ℹ".blue(), message.bright_blue());
}

/// Print a warning message
pub fn print_warning(message: &str) {
    eprintln!("{} {}", "⚠".yellow(), message.bright_yellow());
}

/// Print one outbound message to stdout
pub fn print_message(message: &OutboundMessage) {
    match message {
        OutboundMessage::Chain(segments) => {
            println!("{} {}", "▶".bright_cyan(), "message".bold());
            for segment in segments {
                print_segment(segment, 2);
            }
        }
        OutboundMessage::Forward(nodes) => {
            println!("{} {} {}", "▶".bright_cyan(), "forward".bold(), format!("({} nodes)", nodes.len()).dimmed());
            for (i, node) in nodes.iter().enumerate() {
                print_node(i + 1, node);
            }
        }
    }
}

fn print_node(index: usize, node: &ForwardNode) {
    println!(
        "  {} {} {}",
        format!("[{}]", index).dimmed(),
        node.sender_name.bright_white(),
        format!("({})", node.sender_id).dimmed()
    );
    for segment in &node.content {
        print_segment(segment, 6);
    }
}

fn print_segment(segment: &Segment, indent: usize) {
    let pad = " ".repeat(indent);
    match segment {
        Segment::Text { text } => {
            for (i, line) in text.lines().enumerate() {
                let label = if i == 0 { "text:" } else { "     " };
                println!("{}{} {}", pad, label.dimmed(), line);
            }
        }
        Segment::Image { path } => println!("{}{} {}", pad, "image:".dimmed(), path.display().bright_white()),
        Segment::Video { path, cover } => {
            println!("{}{} {}", pad, "video:".dimmed(), path.display().bright_white());
            if let Some(cover) = cover {
                println!("{}{} {}", pad, "cover:".dimmed(), cover.display());
            }
        }
        Segment::Audio { path } => println!("{}{} {}", pad, "audio:".dimmed(), path.display().bright_white()),
        Segment::File { path, name } => {
            let name = name.as_deref().unwrap_or_default();
            println!("{}{} {} {}", pad, "file:".dimmed(), path.display().bright_white(), name.dimmed());
        }
    }
}

/// Print the run summary
pub fn print_summary(handled: usize, delivered: usize) {
    eprintln!("\n{}", "═".repeat(60).dimmed());
    eprintln!(
        "  {} {}   {} {}",
        "Messages:".dimmed(),
        handled.to_string().bright_white(),
        "Delivered:".dimmed(),
        delivered.to_string().bright_white()
    );
    eprintln!("{}", "═".repeat(60).dimmed());
}
