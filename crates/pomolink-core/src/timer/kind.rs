use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// The category of a countdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    Work,
    ShortBreak,
    LongBreak,
}

impl SessionKind {
    pub const ALL: [SessionKind; 3] = [
        SessionKind::Work,
        SessionKind::ShortBreak,
        SessionKind::LongBreak,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            SessionKind::Work => "Work",
            SessionKind::ShortBreak => "Short Break",
            SessionKind::LongBreak => "Long Break",
        }
    }

    pub fn default_minutes(&self) -> u32 {
        match self {
            SessionKind::Work => 25,
            SessionKind::ShortBreak => 5,
            SessionKind::LongBreak => 15,
        }
    }

    pub fn is_break(&self) -> bool {
        !matches!(self, SessionKind::Work)
    }

    /// Kind that follows `self` once it completes or is skipped.
    ///
    /// `completed_work` is the tally *after* any increment for this session,
    /// so a skipped work session routes on the unchanged tally.
    pub fn next(&self, completed_work: u32, sessions_until_long_break: u32) -> SessionKind {
        match self {
            SessionKind::Work => {
                let cycle = sessions_until_long_break.max(1);
                if completed_work > 0 && completed_work % cycle == 0 {
                    SessionKind::LongBreak
                } else {
                    SessionKind::ShortBreak
                }
            }
            SessionKind::ShortBreak | SessionKind::LongBreak => SessionKind::Work,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionKind::Work => "work",
            SessionKind::ShortBreak => "short_break",
            SessionKind::LongBreak => "long_break",
        }
    }
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for SessionKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "work" => Ok(SessionKind::Work),
            "short_break" | "shortbreak" => Ok(SessionKind::ShortBreak),
            "long_break" | "longbreak" => Ok(SessionKind::LongBreak),
            other => Err(ValidationError::InvalidValue {
                field: "kind".into(),
                message: format!("unknown session kind '{other}'"),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn work_routes_to_long_break_every_fourth() {
        let routed: Vec<_> = (1..=5).map(|n| SessionKind::Work.next(n, 4)).collect();
        assert_eq!(
            routed,
            vec![
                SessionKind::ShortBreak,
                SessionKind::ShortBreak,
                SessionKind::ShortBreak,
                SessionKind::LongBreak,
                SessionKind::ShortBreak,
            ]
        );
    }

    #[test]
    fn zero_tally_never_routes_to_long_break() {
        assert_eq!(SessionKind::Work.next(0, 4), SessionKind::ShortBreak);
    }

    #[test]
    fn parses_cli_spellings() {
        assert_eq!("short-break".parse::<SessionKind>().unwrap(), SessionKind::ShortBreak);
        assert_eq!("LongBreak".parse::<SessionKind>().unwrap(), SessionKind::LongBreak);
        assert!("nap".parse::<SessionKind>().is_err());
    }

    proptest! {
        #[test]
        fn breaks_always_return_to_work(n in 0u32..1000, cycle in 2u32..12) {
            prop_assert_eq!(SessionKind::ShortBreak.next(n, cycle), SessionKind::Work);
            prop_assert_eq!(SessionKind::LongBreak.next(n, cycle), SessionKind::Work);
        }

        #[test]
        fn long_break_exactly_on_cycle_multiples(n in 1u32..1000, cycle in 2u32..12) {
            let next = SessionKind::Work.next(n, cycle);
            prop_assert_eq!(next == SessionKind::LongBreak, n % cycle == 0);
        }
    }
}
