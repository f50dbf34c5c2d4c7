//! The action catalog: a static binding of action name to response shape.
//!
//! This table is data, not design — it exists only so the action surface
//! can pick a sensible default shape for a bare action name; callers
//! needing a different shape (or calling an action this table doesn't know
//! about) supply a [`crate::shape::ShapeSpec`] directly.
//!
//! `Ping` and `Events` are deliberately absent: their ack literal depends on
//! the negotiated API version (and, for `Events`, on whether the call is
//! disabling the mask), so `Session` resolves those two before falling back
//! to this table.

use crate::shape::ShapeSpec;

pub fn lookup(action: &str) -> Option<ShapeSpec> {
    let spec = match_name(action)?;
    Some(spec)
}

fn match_name(action: &str) -> Option<ShapeSpec> {
    let eq = |name: &str| action.eq_ignore_ascii_case(name);

    if eq("Login") {
        return Some(ShapeSpec::Ack { expected: "Success" });
    }
    if eq("Logoff") {
        return Some(ShapeSpec::Ack { expected: "Goodbye" });
    }
    if eq("Challenge") {
        return Some(ShapeSpec::StringField { field: "Challenge" });
    }
    if eq("GetVar") {
        return Some(ShapeSpec::StringField { field: "Value" });
    }
    if eq("DBGet") {
        return Some(ShapeSpec::StringField { field: "Val" });
    }
    if [
        "MailboxCount",
        "MailboxStatus",
        "CoreStatus",
        "CoreSettings",
        "SIPShowPeer",
        "ExtensionState",
        "ListCommands",
        "ListCategories",
        "GetConfig",
        "GetConfigJSON",
    ]
    .iter()
    .any(|n| eq(n))
    {
        return Some(ShapeSpec::Map);
    }
    if eq("Status") {
        return Some(ShapeSpec::List {
            item_event: "Status",
            terminator_event: "StatusComplete",
            count_field: None,
        });
    }
    if eq("Agents") {
        return Some(ShapeSpec::List {
            item_event: "Agents",
            terminator_event: "AgentsComplete",
            count_field: None,
        });
    }
    if eq("ParkedCalls") {
        return Some(ShapeSpec::List {
            item_event: "ParkedCall",
            terminator_event: "ParkedCallsComplete",
            count_field: None,
        });
    }
    if eq("MeetmeList") {
        return Some(ShapeSpec::List {
            item_event: "MeetmeList",
            terminator_event: "MeetmeListComplete",
            count_field: Some("ListItems"),
        });
    }
    if eq("SIPpeers") || eq("IAXpeerlist") {
        return Some(ShapeSpec::List {
            item_event: "PeerEntry",
            terminator_event: "PeerlistComplete",
            count_field: Some("ListItems"),
        });
    }
    if eq("SIPshowregistry") {
        return Some(ShapeSpec::List {
            item_event: "RegistryEntry",
            terminator_event: "RegistrationsComplete",
            count_field: Some("ListItems"),
        });
    }
    if eq("CoreShowChannels") {
        return Some(ShapeSpec::List {
            item_event: "CoreShowChannel",
            terminator_event: "CoreShowChannelsComplete",
            count_field: Some("ListItems"),
        });
    }
    if eq("ZapShowChannels") {
        return Some(ShapeSpec::List {
            item_event: "ZapShowChannels",
            terminator_event: "ZapShowChannelsComplete",
            count_field: None,
        });
    }
    if eq("DAHDIShowChannels") {
        return Some(ShapeSpec::List {
            item_event: "DAHDIShowChannels",
            terminator_event: "DAHDIShowChannelsComplete",
            count_field: Some("Items"),
        });
    }
    if eq("QueueSummary") {
        return Some(ShapeSpec::List {
            item_event: "QueueSummary",
            terminator_event: "QueueSummaryComplete",
            count_field: None,
        });
    }
    if eq("QueueStatus") {
        return Some(ShapeSpec::QueueStatus);
    }
    if eq("VoicemailUsersList") {
        return Some(ShapeSpec::List {
            item_event: "VoicemailUserEntry",
            terminator_event: "VoicemailUserEntryComplete",
            count_field: None,
        });
    }
    if eq("Queues") {
        return Some(ShapeSpec::Queues);
    }
    if eq("Command") {
        return Some(ShapeSpec::Text);
    }
    None
}

/// The default for "all other named actions": a plain `Response: Success`
/// acknowledgement.
pub fn default_shape() -> ShapeSpec {
    ShapeSpec::Ack { expected: "Success" }
}
