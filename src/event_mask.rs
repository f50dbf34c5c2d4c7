//! Event-mask encoding for the `Events` and `Login` actions.
//!
//! `all`/`none` encode as the literal `on`/`off` regardless of API version.
//! A non-trivial subset of categories encodes as a comma-list on the new
//! API; on the old API, which can only select one category at a time, the
//! encoder falls back to the highest-priority member of the subset.

/// One category in an AMI event mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventCategory {
    Call,
    Cdr,
    System,
    Agent,
    Log,
    User,
}

impl EventCategory {
    fn as_str(self) -> &'static str {
        match self {
            EventCategory::Call => "call",
            EventCategory::Cdr => "cdr",
            EventCategory::System => "system",
            EventCategory::Agent => "agent",
            EventCategory::Log => "log",
            EventCategory::User => "user",
        }
    }

    fn parse(name: &str) -> Option<EventCategory> {
        match name {
            "call" => Some(EventCategory::Call),
            "cdr" => Some(EventCategory::Cdr),
            "system" => Some(EventCategory::System),
            "agent" => Some(EventCategory::Agent),
            "log" => Some(EventCategory::Log),
            "user" => Some(EventCategory::User),
            _ => None,
        }
    }
}

/// Old-API single-category fallback priority, highest first.
const OLD_API_PRIORITY: &[EventCategory] = &[
    EventCategory::User,
    EventCategory::Log,
    EventCategory::Agent,
    EventCategory::System,
    EventCategory::Cdr,
    EventCategory::Call,
];

/// An event mask as the caller specifies it, before version-dependent
/// encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventMask {
    None,
    All,
    Categories(Vec<EventCategory>),
}

impl EventMask {
    /// Render the mask for the wire, per the negotiated API version's
    /// encoding rule.
    pub fn encode(&self, new_api: bool) -> String {
        match self {
            EventMask::None => "off".to_owned(),
            EventMask::All => "on".to_owned(),
            EventMask::Categories(categories) => {
                if categories.is_empty() {
                    return "off".to_owned();
                }
                if new_api {
                    OLD_API_PRIORITY
                        .iter()
                        .filter(|c| categories.contains(c))
                        .map(|c| c.as_str())
                        .collect::<Vec<_>>()
                        .join(",")
                } else {
                    OLD_API_PRIORITY
                        .iter()
                        .find(|c| categories.contains(c))
                        .map(|c| c.as_str().to_owned())
                        .unwrap_or_else(|| "off".to_owned())
                }
            }
        }
    }

    /// Parse a mask back out of its wire encoding. The inverse of
    /// [`EventMask::encode`], except that an encoding can't distinguish
    /// `None` from an originally-empty `Categories([])` (both encode as
    /// `"off"`) and, on the old API, can't recover any category besides the
    /// single highest-priority one `encode` kept.
    pub fn decode(encoded: &str) -> EventMask {
        let encoded = encoded.trim();
        match encoded {
            "off" => EventMask::None,
            "on" => EventMask::All,
            _ => EventMask::Categories(
                encoded
                    .split(',')
                    .filter_map(|name| EventCategory::parse(name.trim()))
                    .collect(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_and_none_are_on_off_on_both_api_versions() {
        assert_eq!(EventMask::All.encode(true), "on");
        assert_eq!(EventMask::All.encode(false), "on");
        assert_eq!(EventMask::None.encode(true), "off");
        assert_eq!(EventMask::None.encode(false), "off");
    }

    #[test]
    fn new_api_encodes_a_subset_as_a_comma_list() {
        let mask = EventMask::Categories(vec![EventCategory::Call, EventCategory::User]);
        assert_eq!(mask.encode(true), "user,call");
    }

    #[test]
    fn old_api_picks_the_highest_priority_category() {
        let mask = EventMask::Categories(vec![EventCategory::Call, EventCategory::Agent]);
        assert_eq!(mask.encode(false), "agent");
    }

    #[test]
    fn old_api_falls_back_to_off_for_an_empty_subset() {
        let mask = EventMask::Categories(vec![]);
        assert_eq!(mask.encode(false), "off");
    }

    #[test]
    fn decode_inverts_encode_for_on_and_off_on_both_api_versions() {
        for new_api in [true, false] {
            assert_eq!(EventMask::decode(&EventMask::All.encode(new_api)), EventMask::All);
            assert_eq!(EventMask::decode(&EventMask::None.encode(new_api)), EventMask::None);
        }
    }

    #[test]
    fn new_api_decode_of_encode_round_trips_a_subset_as_a_set() {
        use std::collections::HashSet;

        let subsets = [
            vec![EventCategory::Call],
            vec![EventCategory::Call, EventCategory::User],
            vec![EventCategory::Cdr, EventCategory::System, EventCategory::Log],
            vec![
                EventCategory::Call,
                EventCategory::Cdr,
                EventCategory::System,
                EventCategory::Agent,
                EventCategory::Log,
                EventCategory::User,
            ],
        ];
        for subset in subsets {
            let mask = EventMask::Categories(subset.clone());
            match EventMask::decode(&mask.encode(true)) {
                EventMask::Categories(got) => {
                    let got: HashSet<_> = got.into_iter().collect();
                    let want: HashSet<_> = subset.into_iter().collect();
                    assert_eq!(got, want);
                }
                other => panic!("expected Categories, got {other:?}"),
            }
        }
    }

    #[test]
    fn old_api_decode_of_encode_collapses_to_the_highest_priority_member() {
        let mask = EventMask::Categories(vec![
            EventCategory::Call,
            EventCategory::Agent,
            EventCategory::User,
        ]);
        assert_eq!(
            EventMask::decode(&mask.encode(false)),
            EventMask::Categories(vec![EventCategory::User])
        );
    }

    #[test]
    fn decode_of_an_empty_subsets_encoding_collapses_to_none() {
        let mask = EventMask::Categories(vec![]);
        assert_eq!(EventMask::decode(&mask.encode(true)), EventMask::None);
    }
}
