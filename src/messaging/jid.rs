//! Messaging addresses (`user[:device]@server`) and log masking

use crate::error::WagptError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Server of one-to-one user addresses
pub const USER_SERVER: &str = "s.whatsapp.net";

/// Server of group chat addresses
pub const GROUP_SERVER: &str = "g.us";

/// Address of a user, device or group
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Jid {
    pub user: String,
    /// Linked device number; 0 is the primary device
    pub device: u16,
    pub server: String,
}

impl Jid {
    /// Build a primary-device address
    pub fn new(user: impl Into<String>, server: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            device: 0,
            server: server.into(),
        }
    }

    /// Group chats live on [`GROUP_SERVER`]
    pub fn is_group(&self) -> bool {
        self.server == GROUP_SERVER
    }

    /// Drop the device number, keeping user and server
    pub fn to_non_device(&self) -> Jid {
        Jid {
            device: 0,
            ..self.clone()
        }
    }

    /// True if both addresses belong to the same account, ignoring device
    pub fn same_user(&self, other: &Jid) -> bool {
        self.user == other.user && self.server == other.server
    }

    /// Masked form safe for logs
    pub fn masked(&self) -> String {
        mask_identifier(&self.to_non_device().to_string())
    }
}

impl fmt::Display for Jid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.user.is_empty(), self.device) {
            (true, _) => write!(f, "{}", self.server),
            (false, 0) => write!(f, "{}@{}", self.user, self.server),
            (false, device) => write!(f, "{}:{}@{}", self.user, device, self.server),
        }
    }
}

impl FromStr for Jid {
    type Err = WagptError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(WagptError::Connection("empty address".to_string()));
        }

        let Some((user_part, server)) = s.split_once('@') else {
            return Ok(Jid::new("", s));
        };
        if server.is_empty() {
            return Err(WagptError::Connection(format!("address without server: {}", s)));
        }

        let (user, device) = match user_part.split_once(':') {
            Some((user, device)) => {
                let device = device
                    .parse()
                    .map_err(|_| WagptError::Connection(format!("invalid device in {}", s)))?;
                (user, device)
            }
            None => (user_part, 0),
        };

        Ok(Jid {
            user: user.to_string(),
            device,
            server: server.to_string(),
        })
    }
}

impl TryFrom<String> for Jid {
    type Error = WagptError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Jid> for String {
    fn from(jid: Jid) -> Self {
        jid.to_string()
    }
}

/// Replace the last four characters of an identifier's leading number
///
/// Group ids (`<creator>-<timestamp>@g.us`) mask the part before the first
/// `-`; other ids mask the part before `@`. The rest is kept verbatim.
///
/// # Examples
///
/// ```
/// use wagpt::messaging::mask_identifier;
///
/// assert_eq!(mask_identifier("6281234567890@s.whatsapp.net"), "628123456xxxx@s.whatsapp.net");
/// assert_eq!(mask_identifier("6281234567890-1612345678@g.us"), "628123456xxxx-1612345678@g.us");
/// ```
pub fn mask_identifier(id: &str) -> String {
    let split = id
        .split_once('-')
        .map(|(head, tail)| (head, '-', tail))
        .or_else(|| id.split_once('@').map(|(head, tail)| (head, '@', tail)));

    match split {
        Some((head, separator, tail)) => format!("{}{}{}", mask_tail(head), separator, tail),
        None => mask_tail(id),
    }
}

fn mask_tail(value: &str) -> String {
    let count = value.chars().count();
    if count <= 4 {
        return "xxxx".to_string();
    }
    let keep: String = value.chars().take(count - 4).collect();
    format!("{}xxxx", keep)
}
