// Command Module - JSON command messages accepted from the network
use anyhow::{Context, Result};
use serde_json::{Map, Value};
use time::macros::format_description;
use time::Time;

use crate::types::Rgb;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    FixedColor(Rgb),
    Rainbow,
    Patterns,
    AddPattern,
    Music,
    Notification(Rgb),
    Alarm(Time),
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::FixedColor(_) => "fixed-color",
            Command::Rainbow => "rainbow",
            Command::Patterns => "patterns",
            Command::AddPattern => "add-pattern",
            Command::Music => "music",
            Command::Notification(_) => "notification",
            Command::Alarm(_) => "alarm",
        }
    }

    /// Parse the last complete `{...}` object found in `message`
    pub fn parse(message: &str) -> Result<Command> {
        let json = last_object(message).context("No complete JSON object in message")?;
        let value: Value = serde_json::from_str(json).context("Invalid JSON")?;
        let object = value.as_object().context("Message is not a JSON object")?;

        let command = object
            .get("command")
            .and_then(Value::as_str)
            .context("Missing \"command\" field")?;

        match command {
            "fixed-color" => Ok(Command::FixedColor(color_from(object)?)),
            "rainbow" => Ok(Command::Rainbow),
            "patterns" => Ok(Command::Patterns),
            "add-pattern" => Ok(Command::AddPattern),
            "music" => Ok(Command::Music),
            "notification" => Ok(Command::Notification(color_from(object)?)),
            "alarm" => {
                let time = object
                    .get("time")
                    .and_then(Value::as_str)
                    .context("Alarm command without a \"time\" field")?;
                Ok(Command::Alarm(parse_time_of_day(time)?))
            }
            other => anyhow::bail!("Unknown command '{}'", other),
        }
    }
}

/// Find the last balanced top-level object by brace depth
pub(crate) fn last_object(message: &str) -> Option<&str> {
    let mut depth = 0usize;
    let mut start = 0;
    let mut last = None;

    for (i, c) in message.char_indices() {
        match c {
            '{' => {
                if depth == 0 {
                    start = i;
                }
                depth += 1;
            }
            '}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    last = Some(&message[start..=i]);
                }
            }
            _ => {}
        }
    }

    last
}

// Integer red/green/blue fields, clamped to 0..=255
fn color_from(object: &Map<String, Value>) -> Result<Rgb> {
    let channel = |name: &str| -> Result<i64> {
        object
            .get(name)
            .and_then(Value::as_i64)
            .with_context(|| format!("Missing or non-integer \"{}\" field", name))
    };
    Ok(Rgb::clamped(channel("red")?, channel("green")?, channel("blue")?))
}

/// `HH:MM:SS` or `HH:MM`
pub fn parse_time_of_day(text: &str) -> Result<Time> {
    let text = text.trim();
    Time::parse(text, format_description!("[hour]:[minute]:[second]"))
        .or_else(|_| Time::parse(text, format_description!("[hour]:[minute]")))
        .with_context(|| format!("Invalid alarm time '{}'", text))
}
