//! Signal name parsing.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{KeelError, KeelResult};

/// Linux signal names (without the `SIG` prefix) and their numbers.
const SIGNALS: &[(&str, i32)] = &[
    ("ABRT", 6),
    ("ALRM", 14),
    ("BUS", 7),
    ("CHLD", 17),
    ("CLD", 17),
    ("CONT", 18),
    ("FPE", 8),
    ("HUP", 1),
    ("ILL", 4),
    ("INT", 2),
    ("IO", 29),
    ("IOT", 6),
    ("KILL", 9),
    ("PIPE", 13),
    ("POLL", 29),
    ("PROF", 27),
    ("PWR", 30),
    ("QUIT", 3),
    ("SEGV", 11),
    ("STKFLT", 16),
    ("STOP", 19),
    ("SYS", 31),
    ("TERM", 15),
    ("TRAP", 5),
    ("TSTP", 20),
    ("TTIN", 21),
    ("TTOU", 22),
    ("URG", 23),
    ("USR1", 10),
    ("USR2", 12),
    ("VTALRM", 26),
    ("WINCH", 28),
    ("XCPU", 24),
    ("XFSZ", 25),
];

const SIGRTMIN: i32 = 34;
const SIGRTMAX: i32 = 64;

/// A validated signal number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Signal(i32);

impl Signal {
    /// SIGTERM, the default stop signal.
    pub const SIGTERM: Self = Self(15);
    /// SIGKILL.
    pub const SIGKILL: Self = Self(9);

    /// Parse a signal given as a number ("15"), a name ("TERM") or a
    /// prefixed name ("SIGTERM", case-insensitive). Realtime signals are
    /// accepted as `RTMIN+n` / `RTMAX-n`.
    pub fn parse(raw: &str) -> KeelResult<Self> {
        let invalid = || KeelError::InvalidSignal {
            value: raw.to_string(),
        };

        if let Ok(number) = raw.parse::<i32>() {
            return if (1..=SIGRTMAX).contains(&number) {
                Ok(Self(number))
            } else {
                Err(invalid())
            };
        }

        let upper = raw.to_ascii_uppercase();
        let name = upper.strip_prefix("SIG").unwrap_or(&upper);

        if let Some(&(_, number)) = SIGNALS.iter().find(|(n, _)| *n == name) {
            return Ok(Self(number));
        }

        let realtime = if name == "RTMIN" {
            Some(SIGRTMIN)
        } else if name == "RTMAX" {
            Some(SIGRTMAX)
        } else if let Some(offset) = name.strip_prefix("RTMIN+") {
            offset.parse::<i32>().ok().map(|n| SIGRTMIN + n)
        } else if let Some(offset) = name.strip_prefix("RTMAX-") {
            offset.parse::<i32>().ok().map(|n| SIGRTMAX - n)
        } else {
            None
        };

        match realtime {
            Some(number) if (SIGRTMIN..=SIGRTMAX).contains(&number) => Ok(Self(number)),
            _ => Err(invalid()),
        }
    }

    /// The raw signal number.
    #[must_use]
    pub const fn number(self) -> i32 {
        self.0
    }

    /// Canonical name ("SIGTERM"), if the number has one.
    #[must_use]
    pub fn name(self) -> Option<String> {
        if let Some(&(name, _)) = SIGNALS
            .iter()
            .filter(|(n, _)| !matches!(*n, "CLD" | "IOT" | "POLL"))
            .find(|(_, number)| *number == self.0)
        {
            return Some(format!("SIG{name}"));
        }
        match self.0 {
            SIGRTMIN => Some("SIGRTMIN".to_string()),
            SIGRTMAX => Some("SIGRTMAX".to_string()),
            n if n > SIGRTMIN && n < SIGRTMAX => Some(format!("SIGRTMIN+{}", n - SIGRTMIN)),
            _ => None,
        }
    }
}

impl Default for Signal {
    fn default() -> Self {
        Self::SIGTERM
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{name}"),
            None => write!(f, "{}", self.0),
        }
    }
}

impl FromStr for Signal {
    type Err = KeelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
