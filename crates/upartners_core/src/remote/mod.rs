//! Messaging platform client contract.
//!
//! # Responsibility
//! - Define the remote calls the case store relies on (groups, labels,
//!   messages, contacts, labelling flow).
//! - Keep wire/transport details behind [`MessagingClient`].
//!
//! # Invariants
//! - Message paging is driven by a caller-owned [`Pager`].
//! - A missing object is reported as [`RemoteError::NoSuchObject`] so callers
//!   can treat it as an expected outcome.

use crate::model::org::Org;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

pub mod http;

pub use http::{HttpClientProvider, TembaHttpClient};

/// System label the platform applies to flagged messages.
pub const SYSTEM_LABEL_FLAGGED: &str = "Flagged";

pub type RemoteResult<T> = Result<T, RemoteError>;

#[derive(Debug)]
pub enum RemoteError {
    /// Requested object does not exist on the platform.
    NoSuchObject { kind: &'static str, key: String },
    /// Platform answered with a non-success status.
    Http { status: u16, endpoint: String },
    /// Request never completed (DNS, TLS, timeout, ...).
    Transport(String),
    /// Response body could not be decoded.
    Decode(String),
    /// A listing still had more pages after the page cap.
    TooManyPages { endpoint: String, pages: u32 },
}

impl Display for RemoteError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoSuchObject { kind, key } => write!(f, "no such {kind}: {key}"),
            Self::Http { status, endpoint } => {
                write!(f, "platform returned status {status} for {endpoint}")
            }
            Self::Transport(message) => write!(f, "platform transport error: {message}"),
            Self::Decode(message) => write!(f, "cannot decode platform response: {message}"),
            Self::TooManyPages { endpoint, pages } => {
                write!(f, "{endpoint} listing did not end after {pages} pages")
            }
        }
    }
}

impl Error for RemoteError {}

/// Contact group as reported by the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteGroup {
    pub uuid: String,
    pub name: String,
    pub size: u64,
}

/// Message label as reported by the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteLabel {
    pub uuid: String,
    pub name: String,
    pub count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    #[serde(rename = "I")]
    Incoming,
    #[serde(rename = "O")]
    Outgoing,
}

impl Direction {
    pub fn code(self) -> &'static str {
        match self {
            Self::Incoming => "I",
            Self::Outgoing => "O",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteMessage {
    pub id: i64,
    /// Contact uuid.
    pub contact: String,
    pub text: String,
    pub created_on: DateTime<Utc>,
    /// Label names, including system labels such as `Flagged`.
    pub labels: Vec<String>,
    pub direction: Direction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteContact {
    pub uuid: String,
    pub name: Option<String>,
    /// Contact field values keyed by field key. Unset values are `None`.
    pub fields: BTreeMap<String, Option<String>>,
}

/// Filter for [`MessagingClient::get_messages`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageFilter {
    pub labels: Vec<String>,
    pub groups: Vec<String>,
    pub direction: Option<Direction>,
    pub text: Option<String>,
    pub after: Option<DateTime<Utc>>,
    pub before: Option<DateTime<Utc>>,
    pub reverse: bool,
}

/// Caller-owned cursor over a paginated endpoint.
///
/// Starts at page 1; each fetch records whether another page follows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pager {
    page: u32,
    has_more: bool,
}

impl Default for Pager {
    fn default() -> Self {
        Self::new()
    }
}

impl Pager {
    pub fn new() -> Self {
        Self {
            page: 1,
            has_more: false,
        }
    }

    /// Page number the next fetch should request.
    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    /// Records the outcome of fetching the current page.
    pub fn record_fetch(&mut self, has_next_page: bool) {
        self.has_more = has_next_page;
        if has_next_page {
            self.page += 1;
        }
    }
}

/// Keyword rule pushed to the platform's labelling flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelRule {
    pub label: String,
    pub keywords: Vec<String>,
}

/// Remote calls made against one org's platform account.
pub trait MessagingClient {
    /// Fetches groups by uuid. Unknown uuids are omitted from the result.
    fn get_groups(&self, uuids: &[String]) -> RemoteResult<Vec<RemoteGroup>>;
    /// Fetches all message labels of the account.
    fn get_labels(&self) -> RemoteResult<Vec<RemoteLabel>>;
    /// Fetches the page `pager` points at and advances it.
    fn get_messages(
        &self,
        pager: &mut Pager,
        filter: &MessageFilter,
    ) -> RemoteResult<Vec<RemoteMessage>>;
    /// Fetches contacts by uuid. Unknown uuids are omitted from the result.
    fn get_contacts(&self, uuids: &[String]) -> RemoteResult<Vec<RemoteContact>>;
    /// Fetches one contact, or `NoSuchObject` when it does not exist.
    fn get_contact(&self, uuid: &str) -> RemoteResult<RemoteContact>;
    /// Replaces the keyword rules of the account's labelling flow.
    fn update_labelling_flow(&self, rules: &[LabelRule]) -> RemoteResult<()>;
}

/// Resolves the platform client for an org.
pub trait ClientProvider {
    fn client_for(&self, org: &Org) -> Arc<dyn MessagingClient>;
}
