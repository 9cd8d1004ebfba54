#![allow(dead_code)]

use chrono::{TimeZone, Utc};
use rusqlite::Connection;
use std::sync::{Arc, Mutex};
use upartners_core::mail::{MailResult, Mailer, OutgoingEmail};
use upartners_core::model::org::{Org, OrgRole, User};
use upartners_core::model::partner::Partner;
use upartners_core::remote::{
    ClientProvider, Direction, LabelRule, MessageFilter, MessagingClient, Pager, RemoteContact,
    RemoteError, RemoteGroup, RemoteLabel, RemoteMessage, RemoteResult,
};
use upartners_core::repo::org_repo::{NewOrg, OrgRepository, SqliteOrgRepository};
use upartners_core::repo::partner_repo::{PartnerRepository, SqlitePartnerRepository};
use upartners_core::repo::user_repo::{SqliteUserRepository, UserRepository};

/// In-memory platform double that records every call.
#[derive(Default)]
pub struct FakeClient {
    pub groups: Vec<RemoteGroup>,
    pub labels: Vec<RemoteLabel>,
    pub message_pages: Vec<Vec<RemoteMessage>>,
    pub contacts: Vec<RemoteContact>,
    pub calls: Mutex<Vec<String>>,
    pub contact_batches: Mutex<Vec<Vec<String>>>,
    pub filters: Mutex<Vec<MessageFilter>>,
    pub flow_updates: Mutex<Vec<Vec<LabelRule>>>,
}

impl FakeClient {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }
}

impl MessagingClient for FakeClient {
    fn get_groups(&self, uuids: &[String]) -> RemoteResult<Vec<RemoteGroup>> {
        self.record(format!("get_groups:{}", uuids.join(",")));
        Ok(self
            .groups
            .iter()
            .filter(|g| uuids.contains(&g.uuid))
            .cloned()
            .collect())
    }

    fn get_labels(&self) -> RemoteResult<Vec<RemoteLabel>> {
        self.record("get_labels");
        Ok(self.labels.clone())
    }

    fn get_messages(
        &self,
        pager: &mut Pager,
        filter: &MessageFilter,
    ) -> RemoteResult<Vec<RemoteMessage>> {
        let index = (pager.page() - 1) as usize;
        self.record(format!("get_messages:{}", pager.page()));
        self.filters.lock().unwrap().push(filter.clone());
        let page = self.message_pages.get(index).cloned().unwrap_or_default();
        pager.record_fetch(index + 1 < self.message_pages.len());
        Ok(page)
    }

    fn get_contacts(&self, uuids: &[String]) -> RemoteResult<Vec<RemoteContact>> {
        self.record("get_contacts");
        self.contact_batches.lock().unwrap().push(uuids.to_vec());
        Ok(self
            .contacts
            .iter()
            .filter(|c| uuids.contains(&c.uuid))
            .cloned()
            .collect())
    }

    fn get_contact(&self, uuid: &str) -> RemoteResult<RemoteContact> {
        self.record(format!("get_contact:{uuid}"));
        self.contacts
            .iter()
            .find(|c| c.uuid == uuid)
            .cloned()
            .ok_or_else(|| RemoteError::NoSuchObject {
                kind: "contact",
                key: uuid.to_string(),
            })
    }

    fn update_labelling_flow(&self, rules: &[LabelRule]) -> RemoteResult<()> {
        self.record("update_labelling_flow");
        self.flow_updates.lock().unwrap().push(rules.to_vec());
        Ok(())
    }
}

pub struct FakeProvider {
    pub client: Arc<FakeClient>,
}

impl FakeProvider {
    pub fn new(client: FakeClient) -> Self {
        Self {
            client: Arc::new(client),
        }
    }
}

impl ClientProvider for FakeProvider {
    fn client_for(&self, _org: &Org) -> Arc<dyn MessagingClient> {
        self.client.clone()
    }
}

#[derive(Default)]
pub struct RecordingMailer {
    pub sent: Mutex<Vec<OutgoingEmail>>,
}

impl Mailer for RecordingMailer {
    fn send(&self, email: &OutgoingEmail) -> MailResult<()> {
        self.sent.lock().unwrap().push(email.clone());
        Ok(())
    }
}

pub fn create_org(conn: &Connection, contact_fields: &[&str]) -> Org {
    SqliteOrgRepository::new(conn)
        .create_org(&NewOrg {
            name: "UNICEF".to_string(),
            api_token: "token-1".to_string(),
            timezone: "Africa/Kampala".to_string(),
            contact_fields: contact_fields.iter().map(|f| f.to_string()).collect(),
        })
        .unwrap()
}

pub fn create_partner(conn: &Connection, org: &Org, name: &str) -> Partner {
    SqlitePartnerRepository::new(conn)
        .create_partner(org.id, name)
        .unwrap()
}

/// Creates a user with optional org role and partner profile, reloaded so
/// memberships are populated.
pub fn create_user(
    conn: &Connection,
    username: &str,
    org: &Org,
    role: Option<OrgRole>,
    partner: Option<&Partner>,
) -> User {
    let users = SqliteUserRepository::new(conn);
    let user = users.create_user(username, username).unwrap();
    if let Some(role) = role {
        users.grant_role(user.id, org.id, role).unwrap();
    }
    if let Some(partner) = partner {
        users.set_profile_partner(user.id, Some(partner.id)).unwrap();
    }
    users.get_user(user.id).unwrap().unwrap()
}

pub fn message(id: i64, contact: &str, text: &str, labels: &[&str]) -> RemoteMessage {
    RemoteMessage {
        id,
        contact: contact.to_string(),
        text: text.to_string(),
        created_on: Utc.with_ymd_and_hms(2015, 4, 2, 10, 0, 0).unwrap(),
        labels: labels.iter().map(|l| l.to_string()).collect(),
        direction: Direction::Incoming,
    }
}
