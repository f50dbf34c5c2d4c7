//! Response shapers: per response-shape, accumulate one or more
//! packets into the typed result and complete the waiter.
//!
//! Shapes are pure state machines with at most a small accumulator — they
//! never touch the network and never block.

use crate::error::AmiError;
use crate::packet::Packet;

/// The sum type a shaped result can take: callers switch on the expected
/// shape rather than inspecting a dynamic type tag.
#[derive(Debug, Clone, PartialEq)]
pub enum AmiValue {
    Ack,
    Str(String),
    Map(Vec<(String, String)>),
    List(Vec<Vec<(String, String)>>),
    Text(String),
    QueueStatus(Vec<QueueStatusEntry>),
}

/// One `(QueueParams, [QueueMember])` pair from a `QueueStatus` response.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueueStatusEntry {
    pub params: Vec<(String, String)>,
    pub members: Vec<Vec<(String, String)>>,
}

/// Which packet pattern a shape expects, bound per action in the catalog
/// (see `catalog.rs`) but also overridable per call.
#[derive(Debug, Clone, Copy)]
pub enum ShapeSpec {
    Ack {
        expected: &'static str,
    },
    StringField {
        field: &'static str,
    },
    Map,
    List {
        item_event: &'static str,
        terminator_event: &'static str,
        count_field: Option<&'static str>,
    },
    Text,
    QueueStatus,
    Queues,
}

const STANDARD_HEADERS: &[&str] = &["Response", "Message", "Privilege", "ActionID"];

/// Outcome of feeding one packet to a [`ShapeState`].
pub enum ShapeOutcome {
    NeedMore,
    Done(Result<AmiValue, AmiError>),
}

/// A shape's accumulator. Constructed once per pending action and fed every
/// packet the correlator routes to that action, in arrival order.
pub struct ShapeState {
    spec: ShapeSpec,
    acked: bool,
    list_items: Vec<Vec<(String, String)>>,
    queue_entries: Vec<QueueStatusEntry>,
    text_chunks: Vec<String>,
}

impl ShapeState {
    pub fn new(spec: ShapeSpec) -> Self {
        ShapeState {
            spec,
            acked: false,
            list_items: Vec::new(),
            queue_entries: Vec::new(),
            text_chunks: Vec::new(),
        }
    }

    /// Whether an `Event` packet with no `ActionID` could plausibly belong
    /// to this pending action — used by the correlator's current-slot
    /// fallback for servers that omit `ActionID` on list-item events.
    pub fn interested_in_event(&self, event_name: &str) -> bool {
        match self.spec {
            ShapeSpec::List {
                item_event,
                terminator_event,
                ..
            } => event_name == item_event || event_name == terminator_event,
            ShapeSpec::QueueStatus => matches!(
                event_name,
                "QueueParams" | "QueueMember" | "QueueStatusComplete"
            ),
            _ => false,
        }
    }

    pub fn feed(&mut self, packet: &Packet) -> ShapeOutcome {
        match self.spec {
            ShapeSpec::Ack { expected } => feed_ack(packet, expected),
            ShapeSpec::StringField { field } => feed_string(packet, field),
            ShapeSpec::Map => feed_map(packet),
            ShapeSpec::List {
                item_event,
                terminator_event,
                count_field,
            } => self.feed_list(packet, item_event, terminator_event, count_field),
            ShapeSpec::Text => ShapeOutcome::Done(Ok(AmiValue::Text(strip_text(packet)))),
            ShapeSpec::QueueStatus => self.feed_queue_status(packet),
            ShapeSpec::Queues => self.feed_queues(packet),
        }
    }

    fn feed_list(
        &mut self,
        packet: &Packet,
        item_event: &str,
        terminator_event: &str,
        count_field: Option<&str>,
    ) -> ShapeOutcome {
        if !self.acked {
            return match packet.response() {
                Some(resp) if resp == "Success" => {
                    self.acked = true;
                    ShapeOutcome::NeedMore
                }
                Some(_) => ShapeOutcome::Done(Err(action_failed(packet))),
                None => ShapeOutcome::Done(Err(AmiError::Protocol(
                    "list shape expects an ack packet first".to_owned(),
                ))),
            };
        }
        let Some(event) = packet.event() else {
            // Ignore unexpected non-event packets during accumulation.
            return ShapeOutcome::NeedMore;
        };
        if event == terminator_event {
            if let Some(field) = count_field {
                if let Some(reported) = packet.header(field).and_then(|v| v.parse::<usize>().ok())
                {
                    if reported != self.list_items.len() {
                        tracing::warn!(
                            reported,
                            actual = self.list_items.len(),
                            field,
                            "list terminator count field disagrees with accumulated item count"
                        );
                    }
                }
            }
            ShapeOutcome::Done(Ok(AmiValue::List(std::mem::take(&mut self.list_items))))
        } else if event == item_event {
            self.list_items.push(packet.headers_excluding(&["Event"]));
            ShapeOutcome::NeedMore
        } else {
            // Unknown/unexpected event during list accumulation: ignore,
            // don't abort the list.
            ShapeOutcome::NeedMore
        }
    }

    fn feed_queue_status(&mut self, packet: &Packet) -> ShapeOutcome {
        if !self.acked {
            return match packet.response() {
                Some(resp) if resp == "Success" => {
                    self.acked = true;
                    ShapeOutcome::NeedMore
                }
                Some(_) => ShapeOutcome::Done(Err(action_failed(packet))),
                None => ShapeOutcome::Done(Err(AmiError::Protocol(
                    "queue-status shape expects an ack packet first".to_owned(),
                ))),
            };
        }
        match packet.event() {
            Some("QueueParams") => {
                self.queue_entries.push(QueueStatusEntry {
                    params: packet.headers_excluding(&["Event"]),
                    members: Vec::new(),
                });
                ShapeOutcome::NeedMore
            }
            Some("QueueMember") => match self.queue_entries.last_mut() {
                Some(entry) => {
                    entry.members.push(packet.headers_excluding(&["Event"]));
                    ShapeOutcome::NeedMore
                }
                None => ShapeOutcome::Done(Err(AmiError::Protocol(
                    "QueueMember event arrived before any QueueParams".to_owned(),
                ))),
            },
            Some("QueueStatusComplete") => ShapeOutcome::Done(Ok(AmiValue::QueueStatus(
                std::mem::take(&mut self.queue_entries),
            ))),
            _ => ShapeOutcome::NeedMore,
        }
    }

    fn feed_queues(&mut self, packet: &Packet) -> ShapeOutcome {
        if packet.raw().trim().is_empty() {
            ShapeOutcome::Done(Ok(AmiValue::Text(self.text_chunks.join("\r\n\r\n"))))
        } else {
            self.text_chunks.push(packet.raw().to_owned());
            ShapeOutcome::NeedMore
        }
    }
}

fn feed_ack(packet: &Packet, expected: &str) -> ShapeOutcome {
    match packet.response() {
        Some(resp) if resp == expected => ShapeOutcome::Done(Ok(AmiValue::Ack)),
        Some(_) => ShapeOutcome::Done(Err(action_failed(packet))),
        None => ShapeOutcome::Done(Err(AmiError::Protocol(
            "ack shape expects a Response packet".to_owned(),
        ))),
    }
}

fn feed_string(packet: &Packet, field: &str) -> ShapeOutcome {
    match packet.response() {
        Some("Success") => match packet.header(field) {
            Some(v) if !v.is_empty() => ShapeOutcome::Done(Ok(AmiValue::Str(v.to_owned()))),
            _ => ShapeOutcome::Done(Err(action_failed(packet))),
        },
        Some(_) => ShapeOutcome::Done(Err(action_failed(packet))),
        None => ShapeOutcome::Done(Err(AmiError::Protocol(
            "string shape expects a Response packet".to_owned(),
        ))),
    }
}

fn feed_map(packet: &Packet) -> ShapeOutcome {
    match packet.response() {
        Some("Success") => ShapeOutcome::Done(Ok(AmiValue::Map(
            packet.headers_excluding(&["Response", "Message", "ActionID"]),
        ))),
        Some(_) => ShapeOutcome::Done(Err(action_failed(packet))),
        None => ShapeOutcome::Done(Err(AmiError::Protocol(
            "map shape expects a Response packet".to_owned(),
        ))),
    }
}

fn action_failed(packet: &Packet) -> AmiError {
    AmiError::action_failed(packet.header("Message").map(str::to_owned))
}

/// Strip the standard header lines and the trailing `--END COMMAND--`
/// marker from a `Response: Follows` packet's raw body.
fn strip_text(packet: &Packet) -> String {
    let lines: Vec<&str> = packet.raw().split("\r\n").collect();
    let mut start = 0;
    while start < lines.len() {
        let is_standard_header = lines[start]
            .find(": ")
            .map(|idx| &lines[start][..idx])
            .is_some_and(|name| STANDARD_HEADERS.iter().any(|h| h.eq_ignore_ascii_case(name)));
        if is_standard_header {
            start += 1;
        } else {
            break;
        }
    }
    let mut end = lines.len();
    if end > start && lines[end - 1].trim() == "--END COMMAND--" {
        end -= 1;
    }
    lines[start..end].join("\n")
}
