//! Correlated vCard replies handed from the session to the gateway.

use minidom::Element;

use crate::domain::entities::QueryId;

/// What the remote party answered.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplyOutcome {
    /// `type='result'`, with the `vCard` element if there was one.
    Profile(Option<Element>),
    /// `type='error'`, with the defined condition if one could be read.
    Error { condition: Option<String> },
}

/// An IQ reply carrying an `id` that may belong to one of our queries.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileReply {
    /// Echoed `id` attribute.
    pub query_id: QueryId,
    /// Sender, as declared by the stanza.
    pub from: Option<String>,
    pub outcome: ReplyOutcome,
}

impl ProfileReply {
    #[must_use]
    pub fn profile(query_id: impl Into<QueryId>, vcard: Option<Element>) -> Self {
        Self {
            query_id: query_id.into(),
            from: None,
            outcome: ReplyOutcome::Profile(vcard),
        }
    }

    #[must_use]
    pub fn error(query_id: impl Into<QueryId>, condition: Option<String>) -> Self {
        Self {
            query_id: query_id.into(),
            from: None,
            outcome: ReplyOutcome::Error { condition },
        }
    }

    #[must_use]
    pub fn with_from(mut self, from: impl Into<String>) -> Self {
        self.from = Some(from.into());
        self
    }
}
