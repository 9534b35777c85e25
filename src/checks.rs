use serde::{Deserialize, Serialize};

use crate::error::CheckError;
use crate::types::RecordResult;

/// A single request/response diagnostic (everything except the email-auth scan).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Check {
    Nslookup {
        domain: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        server: Option<String>,
    },
    PortConnect {
        host: String,
        port: u16,
    },
    Ping {
        host: String,
    },
    Traceroute {
        host: String,
    },
    Whois {
        query: String,
    },
}

/// Unvalidated form fields as typed by the user.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct CheckInput {
    pub kind: String,
    #[serde(default)]
    pub target: String,
    #[serde(default)]
    pub port: Option<String>,
    #[serde(default)]
    pub server: Option<String>,
}

/// What the engine answered for a check.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "reply", content = "data", rename_all = "snake_case")]
pub enum CheckReply {
    Records(Vec<RecordResult>),
    Text(String),
    Failure(String),
}

impl TryFrom<CheckInput> for Check {
    type Error = CheckError;

    fn try_from(input: CheckInput) -> Result<Self, Self::Error> {
        let target = input.target.trim().to_string();
        let kind = input.kind.trim().to_ascii_lowercase();
        let check = match kind.as_str() {
            "nslookup" | "dns" => {
                if target.is_empty() {
                    return Err(CheckError::MissingDomain);
                }
                let server = input
                    .server
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty());
                Check::Nslookup {
                    domain: target,
                    server,
                }
            }
            "port" | "port_connect" => {
                let raw_port = input.port.as_deref().map(str::trim).unwrap_or("");
                if target.is_empty() || raw_port.is_empty() {
                    return Err(CheckError::MissingPort);
                }
                Check::PortConnect {
                    host: target,
                    port: parse_port(raw_port)?,
                }
            }
            "ping" => Check::Ping {
                host: require_host(target)?,
            },
            "traceroute" => Check::Traceroute {
                host: require_host(target)?,
            },
            "whois" => {
                if target.is_empty() {
                    return Err(CheckError::MissingQuery);
                }
                Check::Whois { query: target }
            }
            _ => return Err(CheckError::UnknownKind(input.kind)),
        };
        Ok(check)
    }
}

impl Check {
    /// Subcommand name understood by the engine.
    pub fn name(&self) -> &'static str {
        match self {
            Check::Nslookup { .. } => "nslookup",
            Check::PortConnect { .. } => "port",
            Check::Ping { .. } => "ping",
            Check::Traceroute { .. } => "traceroute",
            Check::Whois { .. } => "whois",
        }
    }

    /// Arguments passed to the engine, subcommand first.
    pub fn engine_args(&self) -> Vec<String> {
        let mut args = vec![self.name().to_string()];
        match self {
            Check::Nslookup { domain, server } => {
                args.push(domain.clone());
                args.extend(server.clone());
            }
            Check::PortConnect { host, port } => {
                args.push(host.clone());
                args.push(port.to_string());
            }
            Check::Ping { host } | Check::Traceroute { host } => args.push(host.clone()),
            Check::Whois { query } => args.push(query.clone()),
        }
        args
    }
}

fn require_host(target: String) -> Result<String, CheckError> {
    if target.is_empty() {
        Err(CheckError::MissingHost)
    } else {
        Ok(target)
    }
}

/// Parse a TCP port (1..=65535).
pub fn parse_port(s: &str) -> Result<u16, CheckError> {
    let s = s.trim();
    match s.parse::<u32>() {
        Ok(val) if (1..=65535).contains(&val) => Ok(val as u16),
        _ => Err(CheckError::InvalidPort(s.to_string())),
    }
}
