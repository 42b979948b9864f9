//! Origin state machine.
//!
//! # State Transitions
//! ```text
//! ACTIVE   --unhealthy--> INACTIVE
//! INACTIVE --healthy----> ACTIVE
//! ACTIVE   --disable----> DISABLED
//! INACTIVE --disable----> DISABLED
//! DISABLED --enable-----> INACTIVE
//! anything else: no change
//! ```

use std::fmt;

use serde::Serialize;

/// Lifecycle state of a monitored origin.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OriginState {
    /// Eligible for load balancing, health monitored.
    Active = 0,
    /// Excluded from load balancing, health monitored.
    Inactive = 1,
    /// Excluded from load balancing, not monitored.
    Disabled = 2,
}

impl From<u8> for OriginState {
    fn from(val: u8) -> Self {
        match val {
            0 => OriginState::Active,
            1 => OriginState::Inactive,
            _ => OriginState::Disabled,
        }
    }
}

impl OriginState {
    /// Value exported by the `origin_status` gauge.
    pub fn gauge_value(self) -> f64 {
        match self {
            OriginState::Active => 1.0,
            OriginState::Inactive => 0.0,
            OriginState::Disabled => -1.0,
        }
    }

    pub fn is_monitored(self) -> bool {
        self != OriginState::Disabled
    }
}

impl fmt::Display for OriginState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OriginState::Active => "ACTIVE",
            OriginState::Inactive => "INACTIVE",
            OriginState::Disabled => "DISABLED",
        })
    }
}

/// Something that may move an origin between states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OriginEvent {
    Healthy,
    Unhealthy,
    Enable,
    Disable,
}

/// The state `event` leads to, or `None` when it does not apply.
pub fn transition(state: OriginState, event: OriginEvent) -> Option<OriginState> {
    use OriginEvent::*;
    use OriginState::*;

    match (state, event) {
        (Active, Unhealthy) => Some(Inactive),
        (Inactive, Healthy) => Some(Active),
        (Active, Disable) | (Inactive, Disable) => Some(Disabled),
        (Disabled, Enable) => Some(Inactive),
        (Active, Healthy | Enable)
        | (Inactive, Unhealthy | Enable)
        | (Disabled, Healthy | Unhealthy | Disable) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STATES: [OriginState; 3] = [OriginState::Active, OriginState::Inactive, OriginState::Disabled];
    const EVENTS: [OriginEvent; 4] = [
        OriginEvent::Healthy,
        OriginEvent::Unhealthy,
        OriginEvent::Enable,
        OriginEvent::Disable,
    ];

    #[test]
    fn transition_table() {
        use OriginEvent::*;
        use OriginState::*;

        let applicable = [
            (Active, Unhealthy, Inactive),
            (Inactive, Healthy, Active),
            (Active, Disable, Disabled),
            (Inactive, Disable, Disabled),
            (Disabled, Enable, Inactive),
        ];

        for state in STATES {
            for event in EVENTS {
                let expected = applicable
                    .iter()
                    .find(|(s, e, _)| *s == state && *e == event)
                    .map(|(_, _, next)| *next);
                assert_eq!(transition(state, event), expected, "{state} on {event:?}");
            }
        }
    }

    #[test]
    fn any_event_sequence_stays_in_table() {
        // Walk every sequence of four events from every state.
        for start in STATES {
            for a in EVENTS {
                for b in EVENTS {
                    for c in EVENTS {
                        for d in EVENTS {
                            let mut state = start;
                            for event in [a, b, c, d] {
                                if let Some(next) = transition(state, event) {
                                    assert_ne!(next, state);
                                    state = next;
                                }
                            }
                            assert!(STATES.contains(&state));
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn repr_round_trips() {
        for state in STATES {
            assert_eq!(OriginState::from(state as u8), state);
        }
    }

    #[test]
    fn gauge_values() {
        assert_eq!(OriginState::Active.gauge_value(), 1.0);
        assert_eq!(OriginState::Inactive.gauge_value(), 0.0);
        assert_eq!(OriginState::Disabled.gauge_value(), -1.0);
    }
}
