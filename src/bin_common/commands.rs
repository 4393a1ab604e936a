//! Operator commands read from stdin by the hub server
//!
//! ```text
//! all <title> <text...>          broadcast to every session
//! to <id,id,...> <title> <text>  send to the listed identities
//! ```

use wshub::Message;

/// Sender identity used for messages published by the hub operator
pub const HUB_SENDER: &str = "hub";

/// Parse one stdin line into a message
///
/// Returns `None` for blank lines and unknown commands. The text may contain
/// spaces; it runs to the end of the line.
pub fn parse_command(line: &str) -> Option<Message> {
    let line = line.trim();
    let (command, rest) = line.split_once(' ')?;

    match command {
        "all" => {
            let (title, text) = split_title(rest)?;
            Some(Message::broadcast(HUB_SENDER, text).with_title(title))
        }
        "to" => {
            let (recipients, rest) = rest.trim_start().split_once(' ')?;
            let recipients: Vec<&str> = recipients
                .split(',')
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .collect();
            if recipients.is_empty() {
                return None;
            }
            let (title, text) = split_title(rest)?;
            Some(Message::targeted(HUB_SENDER, recipients, text).with_title(title))
        }
        _ => None,
    }
}

fn split_title(rest: &str) -> Option<(&str, &str)> {
    let rest = rest.trim_start();
    match rest.split_once(' ') {
        Some((title, text)) => Some((title, text.trim())),
        None if !rest.is_empty() => Some((rest, "")),
        None => None,
    }
}
