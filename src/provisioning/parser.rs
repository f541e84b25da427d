//! Parsers for untrusted provisioning input
//!
//! Each parser returns a fully populated value or the first violation found.
//! Nothing is partially applied.

use crate::error::UplinkError;
use thiserror::Error;

/// Largest accepted provisioning write
pub const MAX_PROVISIONING_PAYLOAD: usize = 256;

#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("payload is empty")]
    Empty,
    #[error("payload exceeds {max} bytes")]
    TooLong { max: usize },
    #[error("payload is not valid UTF-8")]
    NotUtf8,
    #[error("missing '{0}' separator")]
    MissingSeparator(char),
    #[error("{0} is empty")]
    EmptyField(&'static str),
    #[error("invalid port '{0}'")]
    InvalidPort(String),
    #[error("unknown control opcode 0x{0:02X}")]
    UnknownOpcode(u8),
}

impl From<ParseError> for UplinkError {
    fn from(error: ParseError) -> Self {
        UplinkError::config_invalid(error.to_string())
    }
}

/// `identity|secret`
#[derive(Debug, Clone, PartialEq)]
pub struct CredentialsWrite {
    pub identity: String,
    pub secret: String,
}

/// `host:port|username|password`
#[derive(Debug, Clone, PartialEq)]
pub struct BrokerWrite {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ControlOpcode {
    EnableLink = 0x01,
    DisableLink = 0x02,
    EnableBroker = 0x03,
    DisableBroker = 0x04,
    TestConnection = 0x05,
    GetStatus = 0x06,
}

impl TryFrom<u8> for ControlOpcode {
    type Error = ParseError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            0x01 => Ok(ControlOpcode::EnableLink),
            0x02 => Ok(ControlOpcode::DisableLink),
            0x03 => Ok(ControlOpcode::EnableBroker),
            0x04 => Ok(ControlOpcode::DisableBroker),
            0x05 => Ok(ControlOpcode::TestConnection),
            0x06 => Ok(ControlOpcode::GetStatus),
            other => Err(ParseError::UnknownOpcode(other)),
        }
    }
}

/// Bounds and UTF-8 check shared by both string writes
pub fn decode_payload(raw: &[u8]) -> Result<&str, ParseError> {
    if raw.is_empty() {
        return Err(ParseError::Empty);
    }
    if raw.len() > MAX_PROVISIONING_PAYLOAD {
        return Err(ParseError::TooLong {
            max: MAX_PROVISIONING_PAYLOAD,
        });
    }
    std::str::from_utf8(raw).map_err(|_| ParseError::NotUtf8)
}

pub fn parse_credentials(input: &str) -> Result<CredentialsWrite, ParseError> {
    let (identity, secret) = input
        .split_once('|')
        .ok_or(ParseError::MissingSeparator('|'))?;

    let identity = identity.trim();
    let secret = secret.trim();
    if identity.is_empty() {
        return Err(ParseError::EmptyField("identity"));
    }
    if secret.is_empty() {
        return Err(ParseError::EmptyField("secret"));
    }

    Ok(CredentialsWrite {
        identity: identity.to_string(),
        secret: secret.to_string(),
    })
}

/// A missing auth section, or one without its second `|`, means no auth
pub fn parse_broker_config(input: &str) -> Result<BrokerWrite, ParseError> {
    let (endpoint, auth) = match input.split_once('|') {
        Some((endpoint, auth)) => (endpoint, Some(auth)),
        None => (input, None),
    };

    let (host, port) = endpoint
        .split_once(':')
        .ok_or(ParseError::MissingSeparator(':'))?;
    let host = host.trim();
    if host.is_empty() {
        return Err(ParseError::EmptyField("host"));
    }
    let port = parse_port(port.trim())?;

    let (username, password) = match auth.and_then(|auth| auth.split_once('|')) {
        Some((username, password)) => (non_empty(username), non_empty(password)),
        None => (None, None),
    };

    Ok(BrokerWrite {
        host: host.to_string(),
        port,
        username,
        password,
    })
}

pub fn parse_control(raw: &[u8]) -> Result<ControlOpcode, ParseError> {
    let byte = raw.first().copied().ok_or(ParseError::Empty)?;
    ControlOpcode::try_from(byte)
}

fn parse_port(raw: &str) -> Result<u16, ParseError> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ParseError::InvalidPort(raw.to_string()));
    }
    match raw.parse::<u16>() {
        Ok(port) if port != 0 => Ok(port),
        _ => Err(ParseError::InvalidPort(raw.to_string())),
    }
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}
