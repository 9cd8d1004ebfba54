mod common;

use common::{create_org, create_partner, create_user, message, FakeClient, FakeProvider};
use upartners_core::db::open_db_in_memory;
use upartners_core::model::org::OrgRole;
use upartners_core::remote::{LabelRule, RemoteLabel};
use upartners_core::repo::case_repo::SqliteCaseRepository;
use upartners_core::repo::label_repo::{LabelCaseCounts, SqliteLabelRepository};
use upartners_core::service::case_service::CaseService;
use upartners_core::service::label_service::{LabelInput, LabelService};
use upartners_core::service::ServiceError;
use upartners_core::{SqliteTaskQueue, Task, TaskRunner};

fn input(name: &str, keywords: &[&str]) -> LabelInput {
    LabelInput {
        name: name.to_string(),
        description: format!("Messages about {name}"),
        keywords: keywords.iter().map(|k| k.to_string()).collect(),
    }
}

#[test]
fn create_normalizes_keywords_links_partners_and_enqueues_flow() {
    let conn = open_db_in_memory().unwrap();
    let provider = FakeProvider::new(FakeClient::default());
    let queue = SqliteTaskQueue::new(&conn);
    let org = create_org(&conn, &[]);
    let moh = create_partner(&conn, &org, "MOH");
    let service = LabelService::new(SqliteLabelRepository::new(&conn), &provider, &queue);

    let label = service
        .create(&org, &input(" AIDS ", &["HIV", " aids ", "hiv", ""]), &[moh.clone()], true)
        .unwrap();

    assert_eq!(label.name, "AIDS");
    assert_eq!(label.keywords, "hiv,aids");
    assert_eq!(label.get_keywords(), vec!["hiv", "aids"]);
    assert_eq!(service.get_partners(label.id).unwrap(), vec![moh]);

    let queued = queue.claim_next().unwrap().unwrap();
    assert_eq!(queued.task, Task::UpdateLabellingFlow { org_id: org.id });
    assert!(provider.client.calls().is_empty());
}

#[test]
fn create_without_flow_update_enqueues_nothing() {
    let conn = open_db_in_memory().unwrap();
    let provider = FakeProvider::new(FakeClient::default());
    let queue = SqliteTaskQueue::new(&conn);
    let org = create_org(&conn, &[]);
    let service = LabelService::new(SqliteLabelRepository::new(&conn), &provider, &queue);

    service.create(&org, &input("AIDS", &["hiv"]), &[], false).unwrap();
    assert_eq!(queue.pending_count().unwrap(), 0);
}

#[test]
fn invalid_input_is_rejected_before_storage() {
    let conn = open_db_in_memory().unwrap();
    let provider = FakeProvider::new(FakeClient::default());
    let queue = SqliteTaskQueue::new(&conn);
    let org = create_org(&conn, &[]);
    let other_org = create_org(&conn, &[]);
    let foreign = create_partner(&conn, &other_org, "Elsewhere");
    let service = LabelService::new(SqliteLabelRepository::new(&conn), &provider, &queue);

    for (label_input, partners) in [
        (input("", &["hiv"]), vec![]),
        (input(&"x".repeat(33), &[]), vec![]),
        (input("AIDS", &["hiv,aids"]), vec![]),
        (input("AIDS", &["-hiv"]), vec![]),
        (input("AIDS", &["hiv"]), vec![foreign.clone()]),
    ] {
        let err = service.create(&org, &label_input, &partners, true).unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)), "{label_input:?}");
    }
    assert!(service.get_all(org.id).unwrap().is_empty());
    assert_eq!(queue.pending_count().unwrap(), 0);
}

#[test]
fn get_all_lists_active_labels_by_name() {
    let conn = open_db_in_memory().unwrap();
    let provider = FakeProvider::new(FakeClient::default());
    let queue = SqliteTaskQueue::new(&conn);
    let org = create_org(&conn, &[]);
    let service = LabelService::new(SqliteLabelRepository::new(&conn), &provider, &queue);

    let pregnancy = service.create(&org, &input("Pregnancy", &[]), &[], false).unwrap();
    let aids = service.create(&org, &input("AIDS", &[]), &[], false).unwrap();
    let spam = service.create(&org, &input("Spam", &[]), &[], false).unwrap();
    service.release(&spam).unwrap();

    assert_eq!(service.get_all(org.id).unwrap(), vec![aids, pregnancy]);
    let queued = queue.claim_next().unwrap().unwrap();
    assert_eq!(queued.task, Task::UpdateLabellingFlow { org_id: org.id });
}

#[test]
fn update_replaces_keywords_and_partners() {
    let conn = open_db_in_memory().unwrap();
    let provider = FakeProvider::new(FakeClient::default());
    let queue = SqliteTaskQueue::new(&conn);
    let org = create_org(&conn, &[]);
    let moh = create_partner(&conn, &org, "MOH");
    let who = create_partner(&conn, &org, "WHO");
    let service = LabelService::new(SqliteLabelRepository::new(&conn), &provider, &queue);

    let label = service
        .create(&org, &input("AIDS", &["hiv"]), &[moh], false)
        .unwrap();
    let updated = service
        .update(&org, label.id, &input("HIV/AIDS", &["hiv", "arv"]), &[who.clone()], true)
        .unwrap();

    assert_eq!(updated.name, "HIV/AIDS");
    assert_eq!(updated.get_keywords(), vec!["hiv", "arv"]);
    assert_eq!(service.get_partners(label.id).unwrap(), vec![who]);
    assert_eq!(queue.pending_count().unwrap(), 1);
}

#[test]
fn message_counts_default_to_zero_and_skip_empty_input() {
    let conn = open_db_in_memory().unwrap();
    let client = FakeClient {
        labels: vec![
            RemoteLabel {
                uuid: "L-1".to_string(),
                name: "AIDS".to_string(),
                count: 12,
            },
            RemoteLabel {
                uuid: "L-2".to_string(),
                name: String::new(),
                count: 99,
            },
        ],
        ..FakeClient::default()
    };
    let provider = FakeProvider::new(client);
    let queue = SqliteTaskQueue::new(&conn);
    let org = create_org(&conn, &[]);
    let service = LabelService::new(SqliteLabelRepository::new(&conn), &provider, &queue);
    let aids = service.create(&org, &input("AIDS", &[]), &[], false).unwrap();
    let pregnancy = service.create(&org, &input("Pregnancy", &[]), &[], false).unwrap();

    assert!(service.get_message_counts(&org, &[]).unwrap().is_empty());
    assert!(provider.client.calls().is_empty());

    let counts = service
        .get_message_counts(&org, &[aids.clone(), pregnancy.clone()])
        .unwrap();
    assert_eq!(counts[&aids.id], 12);
    assert_eq!(counts[&pregnancy.id], 0);
    assert_eq!(provider.client.calls(), vec!["get_labels"]);

    assert_eq!(service.get_count(&org, &aids).unwrap(), 12);
    assert_eq!(aids.as_json(Some(12))["count"], 12);
}

#[test]
fn case_counts_track_open_and_total_cases() {
    let conn = open_db_in_memory().unwrap();
    let provider = FakeProvider::new(FakeClient::default());
    let queue = SqliteTaskQueue::new(&conn);
    let org = create_org(&conn, &[]);
    let moh = create_partner(&conn, &org, "MOH");
    let admin = create_user(&conn, "admin@unicef.org", &org, Some(OrgRole::Admin), None);
    let labels = LabelService::new(SqliteLabelRepository::new(&conn), &provider, &queue);
    let cases = CaseService::new(SqliteCaseRepository::new(&conn), &provider);
    let aids = labels.create(&org, &input("AIDS", &[]), &[], false).unwrap();
    let pregnancy = labels.create(&org, &input("Pregnancy", &[]), &[], false).unwrap();

    cases
        .open(&org, &admin, &[aids.clone()], &moh, &message(1, "C-1", "a", &[]))
        .unwrap();
    let closed = cases
        .open(&org, &admin, &[aids.clone()], &moh, &message(2, "C-2", "b", &[]))
        .unwrap();
    cases.close(&closed, &admin, None).unwrap();

    let counts = labels.get_case_counts(&[aids.clone(), pregnancy.clone()]).unwrap();
    assert_eq!(counts[&aids.id], LabelCaseCounts { open: 1, total: 2 });
    assert_eq!(counts[&pregnancy.id], LabelCaseCounts::default());
    assert!(labels.get_case_counts(&[]).unwrap().is_empty());
}

#[test]
fn labelling_flow_task_pushes_keyword_rules() {
    let conn = open_db_in_memory().unwrap();
    let provider = FakeProvider::new(FakeClient::default());
    let queue = SqliteTaskQueue::new(&conn);
    let org = create_org(&conn, &[]);
    let store = upartners_core::storage::LocalFileStore::new(tempfile::tempdir().unwrap().path());
    let mailer = common::RecordingMailer::default();
    let service = LabelService::new(SqliteLabelRepository::new(&conn), &provider, &queue);
    service.create(&org, &input("AIDS", &["hiv", "aids"]), &[], true).unwrap();
    service.create(&org, &input("Other", &[]), &[], true).unwrap();

    let runner = TaskRunner::new(&conn, &provider, &store, &mailer, "example.org");
    let report = runner.run_pending(10).unwrap();
    assert_eq!(report.succeeded, 2);
    assert_eq!(report.failed, 0);

    let pushed = provider.client.flow_updates.lock().unwrap().clone();
    assert_eq!(pushed.len(), 2);
    assert_eq!(
        pushed[1],
        vec![LabelRule {
            label: "AIDS".to_string(),
            keywords: vec!["hiv".to_string(), "aids".to_string()],
        }]
    );
}
