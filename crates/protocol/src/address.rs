//! Register addressing: `P<pool>.<chan><idx>`, e.g. `P1.v66`, `P5.s19`.

use std::fmt;
use std::str::FromStr;

use sa_domain::Error;

/// The five register channels a parameter family can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Channel {
    Value,
    Status,
    Unit,
    Min,
    Max,
}

impl Channel {
    /// The single-letter tag used on the wire (`v`, `s`, `u`, `n`, `x`).
    pub fn tag(self) -> char {
        match self {
            Channel::Value => 'v',
            Channel::Status => 's',
            Channel::Unit => 'u',
            Channel::Min => 'n',
            Channel::Max => 'x',
        }
    }

    pub fn from_tag(c: char) -> Option<Self> {
        match c.to_ascii_lowercase() {
            'v' => Some(Channel::Value),
            's' => Some(Channel::Status),
            'u' => Some(Channel::Unit),
            'n' => Some(Channel::Min),
            'x' => Some(Channel::Max),
            _ => None,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}

/// A fully resolved register address: pool, channel, and index.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address {
    pub pool: String,
    pub chan: Channel,
    pub idx: u32,
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}.{}{}", self.pool, self.chan.tag(), self.idx)
    }
}

impl FromStr for Address {
    type Err = Error;

    /// Parses `P<pool>.<chan><idx>`, e.g. `P1.v66`.
    fn from_str(s: &str) -> Result<Self, Error> {
        let rest = s
            .strip_prefix('P')
            .ok_or_else(|| Error::Parse(format!("address missing 'P' prefix: {s}")))?;
        let (pool, tail) = rest
            .split_once('.')
            .ok_or_else(|| Error::Parse(format!("address missing '.': {s}")))?;
        let mut chars = tail.chars();
        let chan_char = chars
            .next()
            .ok_or_else(|| Error::Parse(format!("address missing channel: {s}")))?;
        let chan = Channel::from_tag(chan_char)
            .ok_or_else(|| Error::Parse(format!("unknown channel tag '{chan_char}' in {s}")))?;
        let idx: u32 = chars
            .as_str()
            .parse()
            .map_err(|_| Error::Parse(format!("address index is not numeric: {s}")))?;
        Ok(Address {
            pool: pool.to_string(),
            chan,
            idx,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_value_address() {
        let addr: Address = "P1.v66".parse().unwrap();
        assert_eq!(addr.pool, "1");
        assert_eq!(addr.chan, Channel::Value);
        assert_eq!(addr.idx, 66);
    }

    #[test]
    fn round_trips_through_display() {
        let addr: Address = "P5.s19".parse().unwrap();
        assert_eq!(addr.to_string(), "P5.s19");
    }

    #[test]
    fn rejects_malformed_addresses() {
        assert!("Q1.v66".parse::<Address>().is_err());
        assert!("P1v66".parse::<Address>().is_err());
        assert!("P1.z66".parse::<Address>().is_err());
        assert!("P1.vNaN".parse::<Address>().is_err());
    }
}
