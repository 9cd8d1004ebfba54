mod common;

use common::{create_org, create_partner, create_user, message, FakeClient, FakeProvider};
use std::collections::BTreeMap;
use upartners_core::db::open_db_in_memory;
use upartners_core::model::case::CaseActionKind;
use upartners_core::model::label::Label;
use upartners_core::model::org::{Org, OrgRole};
use upartners_core::remote::RemoteContact;
use upartners_core::repo::case_repo::{
    CaseChange, CaseRepository, NewCaseAction, SqliteCaseRepository,
};
use upartners_core::repo::RepoError;
use upartners_core::repo::label_repo::{LabelDraft, LabelRepository, SqliteLabelRepository};
use upartners_core::service::case_service::CaseService;
use upartners_core::service::ServiceError;

fn label(conn: &rusqlite::Connection, org: &Org, name: &str) -> Label {
    SqliteLabelRepository::new(conn)
        .create_label(&LabelDraft {
            org_id: org.id,
            name: name.to_string(),
            description: String::new(),
            keywords: String::new(),
            partner_ids: Vec::new(),
        })
        .unwrap()
}

#[test]
fn open_records_summary_labels_and_open_action() {
    let conn = open_db_in_memory().unwrap();
    let provider = FakeProvider::new(FakeClient::default());
    let org = create_org(&conn, &[]);
    let moh = create_partner(&conn, &org, "MOH");
    let user = create_user(&conn, "admin@unicef.org", &org, Some(OrgRole::Admin), None);
    let aids = label(&conn, &org, "AIDS");
    let service = CaseService::new(SqliteCaseRepository::new(&conn), &provider);

    let long_text = "x".repeat(300);
    let case = service
        .open(&org, &user, &[aids.clone()], &moh, &message(101, "C-1", &long_text, &[]))
        .unwrap();

    assert_eq!(case.assignee_id, moh.id);
    assert_eq!(case.contact_uuid, "C-1");
    assert_eq!(case.message_id, 101);
    assert_eq!(case.summary.chars().count(), 255);
    assert!(case.summary.ends_with("..."));
    assert!(case.closed_on.is_none());
    assert_eq!(service.get_labels(&case).unwrap(), vec![aids]);

    let actions = service.get_actions(&case).unwrap();
    assert_eq!(actions.len(), 1);
    assert_eq!(actions[0].action, CaseActionKind::Open);
    assert_eq!(actions[0].assignee_id, Some(moh.id));
    assert_eq!(actions[0].created_by, user.id);
}

#[test]
fn second_case_for_same_message_is_a_conflict() {
    let conn = open_db_in_memory().unwrap();
    let provider = FakeProvider::new(FakeClient::default());
    let org = create_org(&conn, &[]);
    let moh = create_partner(&conn, &org, "MOH");
    let user = create_user(&conn, "admin@unicef.org", &org, Some(OrgRole::Admin), None);
    let service = CaseService::new(SqliteCaseRepository::new(&conn), &provider);
    let msg = message(101, "C-1", "Hello", &[]);

    service.open(&org, &user, &[], &moh, &msg).unwrap();
    let err = service.open(&org, &user, &[], &moh, &msg).unwrap_err();
    assert!(matches!(err, ServiceError::Conflict(_)));
    assert_eq!(service.get_all(org.id, None).unwrap().len(), 1);
}

#[test]
fn transitions_append_one_action_each_in_order() {
    let conn = open_db_in_memory().unwrap();
    let provider = FakeProvider::new(FakeClient::default());
    let org = create_org(&conn, &[]);
    let moh = create_partner(&conn, &org, "MOH");
    let who = create_partner(&conn, &org, "WHO");
    let admin = create_user(&conn, "admin@unicef.org", &org, Some(OrgRole::Admin), None);
    let worker = create_user(&conn, "bob@moh.org", &org, Some(OrgRole::Editor), Some(&moh));
    let service = CaseService::new(SqliteCaseRepository::new(&conn), &provider);

    let case = service
        .open(&org, &admin, &[], &moh, &message(101, "C-1", "Hello", &[]))
        .unwrap();

    service.note(&case, &worker, "Called the contact").unwrap();
    let case = service.close(&case, &worker, Some("Resolved")).unwrap();
    assert!(case.is_closed());
    let case = service.reopen(&case, &worker, None).unwrap();
    assert!(case.closed_on.is_none());
    let case = service.reassign(&case, &admin, &who, Some("Over to WHO")).unwrap();
    assert_eq!(case.assignee_id, who.id);

    let actions = service.get_actions(&case).unwrap();
    let kinds: Vec<_> = actions.iter().map(|a| a.action).collect();
    assert_eq!(
        kinds,
        vec![
            CaseActionKind::Open,
            CaseActionKind::Note,
            CaseActionKind::Close,
            CaseActionKind::Reopen,
            CaseActionKind::Reassign,
        ]
    );
    assert!(actions.windows(2).all(|w| w[0].id < w[1].id));
    assert_eq!(actions[1].note.as_deref(), Some("Called the contact"));
    assert_eq!(actions[2].note.as_deref(), Some("Resolved"));
    assert_eq!(actions[3].note, None);
    assert_eq!(actions[4].assignee_id, Some(who.id));
}

#[test]
fn permission_denial_changes_nothing() {
    let conn = open_db_in_memory().unwrap();
    let provider = FakeProvider::new(FakeClient::default());
    let org = create_org(&conn, &[]);
    let moh = create_partner(&conn, &org, "MOH");
    let who = create_partner(&conn, &org, "WHO");
    let admin = create_user(&conn, "admin@unicef.org", &org, Some(OrgRole::Admin), None);
    let outsider = create_user(&conn, "carol@who.org", &org, Some(OrgRole::Editor), Some(&who));
    let service = CaseService::new(SqliteCaseRepository::new(&conn), &provider);
    let case = service
        .open(&org, &admin, &[], &moh, &message(101, "C-1", "Hello", &[]))
        .unwrap();

    assert!(!service.can_edit(&outsider, &case));
    for result in [
        service.close(&case, &outsider, None),
        service.reassign(&case, &outsider, &who, None),
    ] {
        assert!(matches!(result, Err(ServiceError::PermissionDenied)));
    }

    let reloaded = service.get_case(case.id).unwrap();
    assert_eq!(reloaded, case);
    assert_eq!(service.get_actions(&case).unwrap().len(), 1);

    // Notes need no edit permission.
    service.note(&case, &outsider, "FYI").unwrap();
    assert_eq!(service.get_actions(&case).unwrap().len(), 2);
}

#[test]
fn invalid_transitions_are_rejected() {
    let conn = open_db_in_memory().unwrap();
    let provider = FakeProvider::new(FakeClient::default());
    let org = create_org(&conn, &[]);
    let moh = create_partner(&conn, &org, "MOH");
    let admin = create_user(&conn, "admin@unicef.org", &org, Some(OrgRole::Admin), None);
    let service = CaseService::new(SqliteCaseRepository::new(&conn), &provider);
    let case = service
        .open(&org, &admin, &[], &moh, &message(101, "C-1", "Hello", &[]))
        .unwrap();

    assert!(matches!(
        service.reopen(&case, &admin, None),
        Err(ServiceError::InvalidState(_))
    ));
    let closed = service.close(&case, &admin, None).unwrap();
    assert!(matches!(
        service.close(&closed, &admin, None),
        Err(ServiceError::InvalidState(_))
    ));
    assert!(matches!(
        service.note(&closed, &admin, "   "),
        Err(ServiceError::Validation(_))
    ));
}

#[test]
fn stale_copy_cannot_close_a_case_twice() {
    let conn = open_db_in_memory().unwrap();
    let provider = FakeProvider::new(FakeClient::default());
    let org = create_org(&conn, &[]);
    let moh = create_partner(&conn, &org, "MOH");
    let admin = create_user(&conn, "admin@unicef.org", &org, Some(OrgRole::Admin), None);
    let service = CaseService::new(SqliteCaseRepository::new(&conn), &provider);
    let stale = service
        .open(&org, &admin, &[], &moh, &message(101, "C-1", "Hello", &[]))
        .unwrap();

    service.close(&stale, &admin, None).unwrap();
    assert!(matches!(
        service.close(&stale, &admin, None),
        Err(ServiceError::InvalidState(_))
    ));

    let kinds: Vec<_> = service
        .get_actions(&stale)
        .unwrap()
        .iter()
        .map(|a| a.action)
        .collect();
    assert_eq!(kinds, vec![CaseActionKind::Open, CaseActionKind::Close]);
}

#[test]
fn stale_copy_does_not_grant_edit_after_reassign() {
    let conn = open_db_in_memory().unwrap();
    let provider = FakeProvider::new(FakeClient::default());
    let org = create_org(&conn, &[]);
    let moh = create_partner(&conn, &org, "MOH");
    let who = create_partner(&conn, &org, "WHO");
    let admin = create_user(&conn, "admin@unicef.org", &org, Some(OrgRole::Admin), None);
    let worker = create_user(&conn, "bob@moh.org", &org, Some(OrgRole::Editor), Some(&moh));
    let service = CaseService::new(SqliteCaseRepository::new(&conn), &provider);
    let stale = service
        .open(&org, &admin, &[], &moh, &message(101, "C-1", "Hello", &[]))
        .unwrap();
    assert!(service.can_edit(&worker, &stale));

    let moved = service.reassign(&stale, &admin, &who, None).unwrap();
    assert!(!service.can_edit(&worker, &moved));

    for result in [
        service.close(&stale, &worker, None),
        service.reassign(&stale, &worker, &moh, None),
    ] {
        assert!(matches!(result, Err(ServiceError::PermissionDenied)));
    }
    let current = service.get_case(stale.id).unwrap();
    assert_eq!(current.assignee_id, who.id);
    assert!(!current.is_closed());
    assert_eq!(service.get_actions(&stale).unwrap().len(), 2);
}

#[test]
fn repository_refuses_change_against_moved_row() {
    let conn = open_db_in_memory().unwrap();
    let provider = FakeProvider::new(FakeClient::default());
    let org = create_org(&conn, &[]);
    let moh = create_partner(&conn, &org, "MOH");
    let who = create_partner(&conn, &org, "WHO");
    let admin = create_user(&conn, "admin@unicef.org", &org, Some(OrgRole::Admin), None);
    let service = CaseService::new(SqliteCaseRepository::new(&conn), &provider);
    let stale = service
        .open(&org, &admin, &[], &moh, &message(101, "C-1", "Hello", &[]))
        .unwrap();
    service.reassign(&stale, &admin, &who, None).unwrap();

    let repo = SqliteCaseRepository::new(&conn);
    let action = NewCaseAction {
        action: CaseActionKind::Close,
        created_by: admin.id,
        created_on: 1,
        assignee_id: None,
        note: None,
    };
    let err = repo
        .apply_change(&stale, CaseChange::Close { closed_on: 1 }, &action)
        .unwrap_err();
    assert!(matches!(err, RepoError::Conflict(_)));
    assert!(repo.get_case(stale.id).unwrap().unwrap().closed_on.is_none());
    assert_eq!(repo.list_actions(stale.id).unwrap().len(), 2);
}

#[test]
fn reassign_to_foreign_partner_is_rejected() {
    let conn = open_db_in_memory().unwrap();
    let provider = FakeProvider::new(FakeClient::default());
    let org = create_org(&conn, &[]);
    let other_org = create_org(&conn, &[]);
    let moh = create_partner(&conn, &org, "MOH");
    let foreign = create_partner(&conn, &other_org, "Elsewhere");
    let admin = create_user(&conn, "admin@unicef.org", &org, Some(OrgRole::Admin), None);
    let service = CaseService::new(SqliteCaseRepository::new(&conn), &provider);
    let case = service
        .open(&org, &admin, &[], &moh, &message(101, "C-1", "Hello", &[]))
        .unwrap();

    assert!(matches!(
        service.reassign(&case, &admin, &foreign, None),
        Err(ServiceError::Validation(_))
    ));
    assert_eq!(service.get_actions(&case).unwrap().len(), 1);
}

#[test]
fn case_lists_filter_by_state_label_and_contact() {
    let conn = open_db_in_memory().unwrap();
    let provider = FakeProvider::new(FakeClient::default());
    let org = create_org(&conn, &[]);
    let moh = create_partner(&conn, &org, "MOH");
    let admin = create_user(&conn, "admin@unicef.org", &org, Some(OrgRole::Admin), None);
    let aids = label(&conn, &org, "AIDS");
    let pregnancy = label(&conn, &org, "Pregnancy");
    let service = CaseService::new(SqliteCaseRepository::new(&conn), &provider);

    let first = service
        .open(&org, &admin, &[aids.clone()], &moh, &message(1, "C-1", "a", &[]))
        .unwrap();
    let second = service
        .open(&org, &admin, &[pregnancy.clone()], &moh, &message(2, "C-2", "b", &[]))
        .unwrap();
    service.close(&second, &admin, None).unwrap();

    assert_eq!(service.get_all(org.id, None).unwrap().len(), 2);
    assert_eq!(service.get_open(org.id, None).unwrap(), vec![first.clone()]);
    let closed = service.get_closed(org.id, None).unwrap();
    assert_eq!(closed.len(), 1);
    assert_eq!(closed[0].id, second.id);
    assert_eq!(service.get_all(org.id, Some(aids.id)).unwrap(), vec![first.clone()]);
    assert!(service.get_open(org.id, Some(pregnancy.id)).unwrap().is_empty());
    assert_eq!(service.get_for_contact(org.id, "C-1").unwrap(), vec![first]);
}

#[test]
fn update_labels_replaces_the_set() {
    let conn = open_db_in_memory().unwrap();
    let provider = FakeProvider::new(FakeClient::default());
    let org = create_org(&conn, &[]);
    let moh = create_partner(&conn, &org, "MOH");
    let admin = create_user(&conn, "admin@unicef.org", &org, Some(OrgRole::Admin), None);
    let aids = label(&conn, &org, "AIDS");
    let pregnancy = label(&conn, &org, "Pregnancy");
    let service = CaseService::new(SqliteCaseRepository::new(&conn), &provider);
    let case = service
        .open(&org, &admin, &[aids], &moh, &message(1, "C-1", "a", &[]))
        .unwrap();

    service.update_labels(&case, &[pregnancy.clone()]).unwrap();
    assert_eq!(service.get_labels(&case).unwrap(), vec![pregnancy]);

    service.update_labels(&case, &[]).unwrap();
    assert!(service.get_labels(&case).unwrap().is_empty());
}

#[test]
fn fetch_contact_maps_missing_contact_to_none() {
    let conn = open_db_in_memory().unwrap();
    let client = FakeClient {
        contacts: vec![RemoteContact {
            uuid: "C-1".to_string(),
            name: Some("Ann".to_string()),
            fields: BTreeMap::new(),
        }],
        ..FakeClient::default()
    };
    let provider = FakeProvider::new(client);
    let org = create_org(&conn, &[]);
    let moh = create_partner(&conn, &org, "MOH");
    let admin = create_user(&conn, "admin@unicef.org", &org, Some(OrgRole::Admin), None);
    let service = CaseService::new(SqliteCaseRepository::new(&conn), &provider);

    let known = service
        .open(&org, &admin, &[], &moh, &message(1, "C-1", "a", &[]))
        .unwrap();
    let gone = service
        .open(&org, &admin, &[], &moh, &message(2, "C-gone", "b", &[]))
        .unwrap();

    let contact = service.fetch_contact(&org, &known).unwrap().unwrap();
    assert_eq!(contact.name.as_deref(), Some("Ann"));
    assert!(service.fetch_contact(&org, &gone).unwrap().is_none());
}

#[test]
fn as_json_resolves_assignee_and_labels() {
    let conn = open_db_in_memory().unwrap();
    let provider = FakeProvider::new(FakeClient::default());
    let org = create_org(&conn, &[]);
    let moh = create_partner(&conn, &org, "MOH");
    let admin = create_user(&conn, "admin@unicef.org", &org, Some(OrgRole::Admin), None);
    let aids = label(&conn, &org, "AIDS");
    let service = CaseService::new(SqliteCaseRepository::new(&conn), &provider);
    let case = service
        .open(&org, &admin, &[aids.clone()], &moh, &message(1, "C-1", "Hello", &[]))
        .unwrap();

    let json = service.as_json(&case).unwrap();
    assert_eq!(json["id"], case.id);
    assert_eq!(json["assignee"]["name"], "MOH");
    assert_eq!(json["labels"][0]["name"], "AIDS");
    assert_eq!(json["summary"], "Hello");
    assert_eq!(json["is_closed"], false);

    // The repository keeps audit rows even when queried directly.
    let repo = SqliteCaseRepository::new(&conn);
    assert_eq!(repo.list_actions(case.id).unwrap().len(), 1);
}
