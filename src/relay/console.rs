//! Companion configuration console
//!
//! ```text
//! wifi ssid=<ssid> pass=<password>
//! mqtt broker=<host> port=<port> [user=<user> pass=<pass>]
//! status
//! reset
//! help
//! ```

use thiserror::Error;

const DEFAULT_BROKER_PORT: u16 = 1883;

pub const WIFI_USAGE: &str = "wifi ssid=<ssid> pass=<password>";
pub const MQTT_USAGE: &str = "mqtt broker=<host> port=<port> [user=<user> pass=<pass>]";

pub const HELP_LINES: [&str; 6] = [
    "Available commands:",
    "  wifi ssid=<ssid> pass=<password>",
    "  mqtt broker=<host> port=<port> [user=<user> pass=<pass>]",
    "  status",
    "  reset",
    "  help",
];

#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    Wifi {
        ssid: String,
        pass: String,
    },
    Mqtt {
        host: String,
        port: u16,
        user: Option<String>,
        pass: Option<String>,
    },
    Status,
    Reset,
    Help,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConsoleError {
    #[error("Usage: {0}")]
    Usage(&'static str),
    #[error("Unknown command. Type 'help' for usage.")]
    Unknown,
}

/// Parse one console line; blank lines yield `None`
pub fn parse_console_line(line: &str) -> Result<Option<ConsoleCommand>, ConsoleError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let command = match line {
        "help" => ConsoleCommand::Help,
        "status" => ConsoleCommand::Status,
        "reset" => ConsoleCommand::Reset,
        _ => {
            if let Some(params) = line.strip_prefix("wifi ") {
                parse_wifi(params)?
            } else if let Some(params) = line.strip_prefix("mqtt ") {
                parse_mqtt(params)?
            } else {
                return Err(ConsoleError::Unknown);
            }
        }
    };
    Ok(Some(command))
}

/// The ssid runs up to `pass=` so it may contain spaces
fn parse_wifi(params: &str) -> Result<ConsoleCommand, ConsoleError> {
    let usage = ConsoleError::Usage(WIFI_USAGE);
    let ssid_at = params.find("ssid=").ok_or(usage.clone())?;
    let pass_at = params.find("pass=").ok_or(usage.clone())?;
    if pass_at < ssid_at {
        return Err(usage);
    }

    let ssid = params[ssid_at + 5..pass_at].trim();
    let pass = params[pass_at + 5..].trim();
    if ssid.is_empty() {
        return Err(usage);
    }

    Ok(ConsoleCommand::Wifi {
        ssid: ssid.to_string(),
        pass: pass.to_string(),
    })
}

/// `pass=` takes the rest of the line; other keys end at whitespace
fn parse_mqtt(params: &str) -> Result<ConsoleCommand, ConsoleError> {
    let usage = ConsoleError::Usage(MQTT_USAGE);
    let (head, pass) = match params.find("pass=") {
        Some(at) => (&params[..at], non_empty(&params[at + 5..])),
        None => (params, None),
    };

    let mut host = None;
    let mut port = DEFAULT_BROKER_PORT;
    let mut user = None;
    for token in head.split_whitespace() {
        if let Some(value) = token.strip_prefix("broker=") {
            host = non_empty(value);
        } else if let Some(value) = token.strip_prefix("port=") {
            port = value
                .parse::<u16>()
                .ok()
                .filter(|p| *p != 0)
                .ok_or(usage.clone())?;
        } else if let Some(value) = token.strip_prefix("user=") {
            user = non_empty(value);
        }
    }

    let host = host.ok_or(usage)?;
    Ok(ConsoleCommand::Mqtt {
        host,
        port,
        user,
        pass,
    })
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}
