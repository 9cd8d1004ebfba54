//! Message export use-case service.
//!
//! # Responsibility
//! - Record export requests and hand them to the task queue.
//! - Run an export: page messages, resolve contacts, write the workbook,
//!   store it and notify the requester.
//!
//! # Invariants
//! - Only inbound messages are exported.
//! - Contacts are fetched in batches of [`CONTACT_BATCH_SIZE`], each uuid once.
//! - `filename` is persisted only after the file is stored.

use crate::db::now_epoch_ms;
use crate::export::{
    build_rows, export_columns, sheet_count, write_workbook, CONTACT_BATCH_SIZE,
    EXPORT_FILE_EXTENSION,
};
use crate::mail::{EmailTemplate, Mailer, OutgoingEmail};
use crate::model::export::{ExportId, MessageExport, MessageSearch};
use crate::model::label::Label;
use crate::model::org::{Org, User};
use crate::remote::{
    ClientProvider, Direction, MessageFilter, MessagingClient, Pager, RemoteContact,
    RemoteMessage,
};
use crate::repo::export_repo::ExportRepository;
use crate::service::{ServiceError, ServiceResult};
use crate::storage::FileStore;
use crate::tasks::{Task, TaskQueue};
use log::info;
use std::collections::{HashMap, HashSet};
use std::time::Instant;
use uuid::Uuid;

pub const EXPORT_EMAIL_SUBJECT: &str = "Your messages export is ready";

/// Download link mailed to the export requester.
pub fn download_link(hostname: &str, id: ExportId) -> String {
    format!("https://{hostname}/messageexport/read/{id}/")
}

pub struct ExportService<'a, R: ExportRepository> {
    repo: R,
    clients: &'a dyn ClientProvider,
    tasks: &'a dyn TaskQueue,
    store: &'a dyn FileStore,
    mailer: &'a dyn Mailer,
    hostname: &'a str,
}

impl<'a, R: ExportRepository> ExportService<'a, R> {
    pub fn new(
        repo: R,
        clients: &'a dyn ClientProvider,
        tasks: &'a dyn TaskQueue,
        store: &'a dyn FileStore,
        mailer: &'a dyn Mailer,
        hostname: &'a str,
    ) -> Self {
        Self {
            repo,
            clients,
            tasks,
            store,
            mailer,
            hostname,
        }
    }

    /// Persists the request and enqueues the export task.
    pub fn create(
        &self,
        org: &Org,
        user: &User,
        search: &MessageSearch,
    ) -> ServiceResult<MessageExport> {
        let search_json = serde_json::to_string(search)
            .map_err(|err| ServiceError::Validation(format!("cannot encode search: {err}")))?;
        let export = self
            .repo
            .create_export(org.id, user.id, &search_json, now_epoch_ms())?;
        let task_id = self.tasks.enqueue(&Task::MessageExport {
            export_id: export.id,
        })?;
        info!(
            "event=export_create module=service status=ok org_id={} export_id={} task_id={}",
            org.id, export.id, task_id
        );
        Ok(export)
    }

    pub fn get_export(&self, id: ExportId) -> ServiceResult<MessageExport> {
        self.repo
            .get_export(id)?
            .ok_or_else(|| ServiceError::not_found("message export", id))
    }

    pub fn get_search(&self, export: &MessageExport) -> ServiceResult<MessageSearch> {
        export
            .get_search()
            .map_err(|err| ServiceError::Validation(format!("cannot decode search: {err}")))
    }

    /// Reads the generated workbook of a finished export.
    pub fn read_file(&self, export: &MessageExport) -> ServiceResult<Vec<u8>> {
        if !export.is_complete() {
            return Err(ServiceError::InvalidState(format!(
                "export {} has not run yet",
                export.id
            )));
        }
        Ok(self.store.open(&export.filename)?)
    }

    /// Runs the export and returns it with its stored filename.
    ///
    /// # Contract
    /// - `labels` are the org's active labels; only their names appear in
    ///   the Labels column.
    /// - `creator` receives the download link by email.
    pub fn do_export(
        &self,
        export: &MessageExport,
        org: &Org,
        creator: &User,
        labels: &[Label],
    ) -> ServiceResult<MessageExport> {
        if export.org_id != org.id {
            return Err(ServiceError::Validation(format!(
                "export {} belongs to another org",
                export.id
            )));
        }
        let started_at = Instant::now();
        let search = self.get_search(export)?;
        let client = self.clients.client_for(org);

        let messages = fetch_inbound_messages(client.as_ref(), &search)?;
        let contacts = fetch_contacts(client.as_ref(), &messages)?;
        let known_labels: HashSet<String> = labels.iter().map(|l| l.name.clone()).collect();
        let rows = build_rows(&messages, &contacts, &known_labels, &org.contact_fields);
        let content = write_workbook(&export_columns(&org.contact_fields), &rows)?;

        let name = format!(
            "orgs/{}/message_exports/{}.{EXPORT_FILE_EXTENSION}",
            org.id,
            Uuid::new_v4().simple()
        );
        let filename = self.store.save(&name, &content)?;
        self.repo.set_filename(export.id, &filename)?;

        let email = OutgoingEmail::from_template(
            &creator.username,
            EXPORT_EMAIL_SUBJECT,
            &EmailTemplate::MessageExport {
                link: download_link(self.hostname, export.id),
            },
        );
        self.mailer.send(&email)?;

        info!(
            "event=export_run module=service status=ok org_id={} export_id={} rows={} sheets={} contacts={} duration_ms={}",
            org.id,
            export.id,
            rows.len(),
            sheet_count(rows.len()),
            contacts.len(),
            started_at.elapsed().as_millis()
        );
        Ok(MessageExport {
            filename,
            ..export.clone()
        })
    }
}

fn fetch_inbound_messages(
    client: &dyn MessagingClient,
    search: &MessageSearch,
) -> ServiceResult<Vec<RemoteMessage>> {
    let filter = MessageFilter {
        labels: search.labels.clone(),
        groups: search.groups.clone(),
        direction: Some(Direction::Incoming),
        text: search.text.clone(),
        after: search.after,
        before: search.before,
        reverse: search.reverse,
    };
    let mut pager = Pager::new();
    let mut messages = Vec::new();
    loop {
        messages.extend(client.get_messages(&mut pager, &filter)?);
        if !pager.has_more() {
            break;
        }
    }
    Ok(messages)
}

fn fetch_contacts(
    client: &dyn MessagingClient,
    messages: &[RemoteMessage],
) -> ServiceResult<HashMap<String, RemoteContact>> {
    let mut seen = HashSet::new();
    let uuids: Vec<String> = messages
        .iter()
        .filter(|m| seen.insert(m.contact.as_str()))
        .map(|m| m.contact.clone())
        .collect();

    let mut contacts = HashMap::with_capacity(uuids.len());
    for batch in uuids.chunks(CONTACT_BATCH_SIZE) {
        for contact in client.get_contacts(batch)? {
            contacts.insert(contact.uuid.clone(), contact);
        }
    }
    Ok(contacts)
}
