//! HTTP implementation of [`MessagingClient`] for the platform's v1 JSON API.
//!
//! # Invariants
//! - Every request carries `Authorization: Token <org api token>`.
//! - List endpoints follow the `next` link until it is null, except
//!   messages, which are paged by the caller's [`Pager`].
//! - Log events carry endpoint, status and timing only, never payloads.

use super::{
    ClientProvider, Direction, LabelRule, MessageFilter, MessagingClient, Pager, RemoteContact,
    RemoteError, RemoteGroup, RemoteLabel, RemoteMessage, RemoteResult,
};
use crate::model::org::Org;
use chrono::{DateTime, SecondsFormat, Utc};
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

const API_PREFIX: &str = "/api/v1";
const LABELLING_FLOW_NAME: &str = "Labelling";
const MAX_LIST_PAGES: u32 = 1_000;

#[derive(Debug, Deserialize)]
struct Page<T> {
    #[serde(default)]
    next: Option<String>,
    results: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct GroupWire {
    uuid: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    size: u64,
}

#[derive(Debug, Deserialize)]
struct LabelWire {
    uuid: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    count: u64,
}

#[derive(Debug, Deserialize)]
struct MessageWire {
    id: i64,
    contact: String,
    #[serde(default)]
    text: String,
    created_on: DateTime<Utc>,
    #[serde(default)]
    labels: Vec<String>,
    direction: Direction,
}

#[derive(Debug, Deserialize)]
struct ContactWire {
    uuid: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    fields: BTreeMap<String, Value>,
}

impl From<ContactWire> for RemoteContact {
    fn from(value: ContactWire) -> Self {
        let fields = value
            .fields
            .into_iter()
            .map(|(key, raw)| {
                let text = match raw {
                    Value::Null => None,
                    Value::String(s) => Some(s),
                    other => Some(other.to_string()),
                };
                (key, text)
            })
            .collect();
        Self {
            uuid: value.uuid,
            name: value.name,
            fields,
        }
    }
}

/// Blocking platform client bound to one org's api token.
pub struct TembaHttpClient {
    agent: ureq::Agent,
    base_url: String,
    token: String,
}

impl TembaHttpClient {
    pub fn new(agent: ureq::Agent, base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            agent,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    fn endpoint(&self, name: &str) -> String {
        format!("{}{API_PREFIX}/{name}.json", self.base_url)
    }

    fn fetch_page<T: DeserializeOwned>(
        &self,
        name: &str,
        query: &[(&str, String)],
        page: u32,
    ) -> RemoteResult<Page<T>> {
        let url = self.endpoint(name);
        let started_at = Instant::now();
        let mut request = self
            .agent
            .get(&url)
            .set("Authorization", &format!("Token {}", self.token))
            .set("Accept", "application/json")
            .query("page", &page.to_string());
        for (key, value) in query {
            request = request.query(key, value);
        }

        let response = request.call().map_err(|err| map_ureq_error(name, err))?;
        let decoded = response
            .into_json::<Page<T>>()
            .map_err(|err| RemoteError::Decode(format!("{name}: {err}")))?;
        debug!(
            "event=remote_fetch module=remote status=ok endpoint={} page={} results={} duration_ms={}",
            name,
            page,
            decoded.results.len(),
            started_at.elapsed().as_millis()
        );
        Ok(decoded)
    }

    fn fetch_all<T: DeserializeOwned>(
        &self,
        name: &str,
        query: &[(&str, String)],
    ) -> RemoteResult<Vec<T>> {
        collect_pages(name, MAX_LIST_PAGES, |page| {
            self.fetch_page::<T>(name, query, page)
        })
    }
}

/// Follows `next` links until the listing ends.
///
/// A listing longer than `max_pages` is an error rather than a partial result.
fn collect_pages<T>(
    name: &str,
    max_pages: u32,
    mut fetch: impl FnMut(u32) -> RemoteResult<Page<T>>,
) -> RemoteResult<Vec<T>> {
    let mut items = Vec::new();
    let mut page = 1;
    loop {
        let fetched = fetch(page)?;
        items.extend(fetched.results);
        if fetched.next.is_none() {
            return Ok(items);
        }
        if page >= max_pages {
            warn!(
                "event=remote_fetch module=remote status=error endpoint={} pages={} reason=page_cap",
                name, page
            );
            return Err(RemoteError::TooManyPages {
                endpoint: name.to_string(),
                pages: page,
            });
        }
        page += 1;
    }
}

impl MessagingClient for TembaHttpClient {
    fn get_groups(&self, uuids: &[String]) -> RemoteResult<Vec<RemoteGroup>> {
        let query = repeated("uuid", uuids);
        let groups = self.fetch_all::<GroupWire>("groups", &query)?;
        Ok(groups
            .into_iter()
            .map(|g| RemoteGroup {
                uuid: g.uuid,
                name: g.name,
                size: g.size,
            })
            .collect())
    }

    fn get_labels(&self) -> RemoteResult<Vec<RemoteLabel>> {
        let labels = self.fetch_all::<LabelWire>("labels", &[])?;
        Ok(labels
            .into_iter()
            .map(|l| RemoteLabel {
                uuid: l.uuid,
                name: l.name.unwrap_or_default(),
                count: l.count,
            })
            .collect())
    }

    fn get_messages(
        &self,
        pager: &mut Pager,
        filter: &MessageFilter,
    ) -> RemoteResult<Vec<RemoteMessage>> {
        let query = message_query(filter);
        let fetched = self.fetch_page::<MessageWire>("messages", &query, pager.page())?;
        pager.record_fetch(fetched.next.is_some());
        Ok(fetched
            .results
            .into_iter()
            .map(|m| RemoteMessage {
                id: m.id,
                contact: m.contact,
                text: m.text,
                created_on: m.created_on,
                labels: m.labels,
                direction: m.direction,
            })
            .collect())
    }

    fn get_contacts(&self, uuids: &[String]) -> RemoteResult<Vec<RemoteContact>> {
        if uuids.is_empty() {
            return Ok(Vec::new());
        }
        let query = repeated("uuid", uuids);
        let contacts = self.fetch_all::<ContactWire>("contacts", &query)?;
        Ok(contacts.into_iter().map(RemoteContact::from).collect())
    }

    fn get_contact(&self, uuid: &str) -> RemoteResult<RemoteContact> {
        let query = [("uuid", uuid.to_string())];
        let fetched = self.fetch_page::<ContactWire>("contacts", &query, 1)?;
        fetched
            .results
            .into_iter()
            .find(|c| c.uuid == uuid)
            .map(RemoteContact::from)
            .ok_or_else(|| RemoteError::NoSuchObject {
                kind: "contact",
                key: uuid.to_string(),
            })
    }

    fn update_labelling_flow(&self, rules: &[LabelRule]) -> RemoteResult<()> {
        let url = self.endpoint("flow_definition");
        let body = json!({
            "name": LABELLING_FLOW_NAME,
            "rules": rules,
        });
        self.agent
            .post(&url)
            .set("Authorization", &format!("Token {}", self.token))
            .set("Accept", "application/json")
            .send_json(body)
            .map_err(|err| map_ureq_error("flow_definition", err))?;
        debug!(
            "event=remote_flow_update module=remote status=ok rules={}",
            rules.len()
        );
        Ok(())
    }
}

/// Builds per-org [`TembaHttpClient`]s sharing one connection pool.
pub struct HttpClientProvider {
    agent: ureq::Agent,
    base_url: String,
}

impl HttpClientProvider {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(timeout)
            .timeout_read(timeout)
            .timeout_write(timeout)
            .user_agent(concat!("upartners/", env!("CARGO_PKG_VERSION")))
            .build();
        Self {
            agent,
            base_url: base_url.into(),
        }
    }
}

impl ClientProvider for HttpClientProvider {
    fn client_for(&self, org: &Org) -> Arc<dyn MessagingClient> {
        Arc::new(TembaHttpClient::new(
            self.agent.clone(),
            self.base_url.clone(),
            org.api_token.clone(),
        ))
    }
}

fn repeated(key: &'static str, values: &[String]) -> Vec<(&'static str, String)> {
    values.iter().map(|v| (key, v.clone())).collect()
}

fn message_query(filter: &MessageFilter) -> Vec<(&'static str, String)> {
    let mut query = repeated("label", &filter.labels);
    query.extend(repeated("group_uuids", &filter.groups));
    if let Some(direction) = filter.direction {
        query.push(("direction", direction.code().to_string()));
    }
    if let Some(text) = filter.text.as_ref().filter(|t| !t.trim().is_empty()) {
        query.push(("text", text.clone()));
    }
    if let Some(after) = filter.after {
        query.push(("after", format_time(after)));
    }
    if let Some(before) = filter.before {
        query.push(("before", format_time(before)));
    }
    if filter.reverse {
        query.push(("reverse", "true".to_string()));
    }
    query
}

fn format_time(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn map_ureq_error(endpoint: &str, err: ureq::Error) -> RemoteError {
    match err {
        ureq::Error::Status(status, _) => {
            warn!(
                "event=remote_fetch module=remote status=error endpoint={} http_status={}",
                endpoint, status
            );
            RemoteError::Http {
                status,
                endpoint: endpoint.to_string(),
            }
        }
        ureq::Error::Transport(transport) => {
            warn!(
                "event=remote_fetch module=remote status=error endpoint={} error_code=transport",
                endpoint
            );
            RemoteError::Transport(transport.to_string())
        }
    }
}
