//! Building outbound stanzas and sorting inbound ones.

use minidom::Element;

use super::constants::{NS_COMPONENT, NS_STANZAS};
use crate::application::dto::ProfileReply;
use crate::application::services::VCARD_NS;
use crate::domain::entities::{QueryId, UserIdentifier};

/// `<iq type='get'/>` asking `to` for their vCard.
#[must_use]
pub fn profile_query(id: &QueryId, from: &str, to: &UserIdentifier) -> Element {
    Element::builder("iq", NS_COMPONENT)
        .attr("type", "get")
        .attr("id", id.as_str())
        .attr("from", from)
        .attr("to", to.as_str())
        .append(Element::builder("vCard", VCARD_NS).build())
        .build()
}

/// Addressing attributes of an inbound stanza.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StanzaHeader {
    pub name: String,
    pub kind: Option<String>,
    pub id: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
}

impl StanzaHeader {
    #[must_use]
    pub fn of(stanza: &Element) -> Self {
        Self {
            name: stanza.name().to_string(),
            kind: stanza.attr("type").map(str::to_string),
            id: stanza.attr("id").map(str::to_string),
            from: stanza.attr("from").map(str::to_string),
            to: stanza.attr("to").map(str::to_string),
        }
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        self.kind.as_deref() == Some("error")
    }
}

/// An inbound stanza sorted by what the session does with it.
#[derive(Debug)]
pub enum Inbound {
    /// An IQ result or error that may answer one of our queries.
    Reply(StanzaHeader, ProfileReply),
    /// Anything else.
    Stray(StanzaHeader),
}

impl Inbound {
    #[must_use]
    pub fn classify(stanza: Element) -> Self {
        let header = StanzaHeader::of(&stanza);

        let Some(id) = header.id.clone() else {
            return Self::Stray(header);
        };
        if header.name != "iq" {
            return Self::Stray(header);
        }

        let reply = match header.kind.as_deref() {
            Some("result") => {
                let vcard = stanza.get_child("vCard", VCARD_NS).cloned();
                ProfileReply::profile(id.as_str(), vcard)
            }
            Some("error") => ProfileReply::error(id.as_str(), error_condition(&stanza)),
            _ => return Self::Stray(header),
        };

        let reply = match &header.from {
            Some(from) => reply.with_from(from.clone()),
            None => reply,
        };
        Self::Reply(header, reply)
    }
}

/// Name of the defined condition inside the stanza's `<error/>` child.
#[must_use]
pub fn error_condition(stanza: &Element) -> Option<String> {
    let error = stanza.children().find(|child| child.name() == "error")?;
    error
        .children()
        .find(|child| child.name() != "text")
        .map(|condition| condition.name().to_string())
}

/// Answer to a stanza nobody asked for.
///
/// Returns `None` for stanzas that are themselves errors.
#[must_use]
pub fn courtesy_error(header: &StanzaHeader) -> Option<Element> {
    if header.is_error() {
        return None;
    }

    let condition = Element::builder("feature-not-implemented", NS_STANZAS).build();
    let error = Element::builder("error", NS_COMPONENT)
        .attr("type", "cancel")
        .append(condition)
        .build();

    Some(
        Element::builder(header.name.as_str(), NS_COMPONENT)
            .attr("type", "error")
            .attr("id", header.id.clone())
            .attr("from", header.to.clone())
            .attr("to", header.from.clone())
            .append(error)
            .build(),
    )
}
