//! Purchase request state machine scenarios, driven through the public managers.

mod common;

use chrono::{Duration, Utc};
use uuid::Uuid;

use common::Harness;
use procurement_core::domain::{AuditKind, NotificationKind, NotificationStatus};
use procurement_core::ports::MailTemplate;
use procurement_core::{
    DraftPurchaseRequest, NotificationPayload, ProcurementError, PurchaseRequestStatus,
    Visibility,
};

#[tokio::test]
async fn full_creation_links_every_attachment() {
    let h = Harness::new().await;
    let spec_sheet = h.store.add_document("spec-sheet.pdf").await;
    let drawing = h.store.add_document("drawing.dwg").await;
    let mut input = h.new_request(Visibility::Public);
    input.visibility = None;
    input.attachments = vec![spec_sheet.id, drawing.id];

    let created = h.requests.create(h.buyer.id, input).await.unwrap();

    assert_eq!(created.status, PurchaseRequestStatus::WaitingForApproval);
    assert_eq!(created.visibility, Visibility::Public);
    assert!(created.request_code.starts_with("PR-"));
    assert!(!created.request_code.starts_with("PR-DRAFT-"));
    assert_eq!(created.documents.len(), 2);
    assert!(created.documents.iter().all(|d| d.is_linked));
    assert!(h.store.document(drawing.id).await.unwrap().is_linked);
    assert_eq!(h.store.audit_entries().await.len(), 1);
    assert_eq!(h.store.audit_entries().await[0].kind, AuditKind::PurchaseRequest);
}

#[tokio::test]
async fn an_unknown_attachment_rolls_the_creation_back() {
    let h = Harness::new().await;
    let spec_sheet = h.store.add_document("spec-sheet.pdf").await;
    let mut input = h.new_request(Visibility::Public);
    input.attachments = vec![spec_sheet.id, Uuid::new_v4()];

    let err = h.requests.create(h.buyer.id, input).await.unwrap_err();

    assert_eq!(
        err,
        ProcurementError::BadRequest("One or more documents not found".to_string())
    );
    assert!(h.requests.list_owned(h.buyer.id, None).await.unwrap().is_empty());
    assert!(!h.store.document(spec_sheet.id).await.unwrap().is_linked);
    assert!(h.store.audit_entries().await.is_empty());
}

#[tokio::test]
async fn full_creation_validates_deadline_and_department() {
    let h = Harness::new().await;

    let mut past = h.new_request(Visibility::Public);
    past.bidding_deadline = Utc::now() - Duration::minutes(5);
    let err = h.requests.create(h.buyer.id, past).await.unwrap_err();
    assert!(matches!(err, ProcurementError::BadRequest(_)));

    let mut orphan = h.new_request(Visibility::Public);
    orphan.department_id = Uuid::new_v4();
    let err = h.requests.create(h.buyer.id, orphan).await.unwrap_err();
    assert!(matches!(err, ProcurementError::NotFound(_)));
}

#[tokio::test]
async fn commit_failure_leaves_nothing_behind() {
    let h = Harness::new().await;
    h.store.fail_next_commit();

    let err = h
        .requests
        .create(h.buyer.id, h.new_request(Visibility::Public))
        .await
        .unwrap_err();

    assert!(matches!(err, ProcurementError::Internal(_)));
    assert!(h.requests.list_owned(h.buyer.id, None).await.unwrap().is_empty());
    assert!(h.store.audit_entries().await.is_empty());
    assert!(h.store.notifications().await.is_empty());
}

#[tokio::test]
async fn drafts_tolerate_missing_fields() {
    let h = Harness::new().await;
    let known = h.store.add_document("notes.txt").await;
    let draft = h
        .requests
        .create_draft(
            h.buyer.id,
            DraftPurchaseRequest {
                department_id: Some(Uuid::new_v4()),
                attachments: vec![known.id, Uuid::new_v4()],
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(draft.status, PurchaseRequestStatus::Draft);
    assert!(draft.request_code.starts_with("PR-DRAFT-"));
    assert_eq!(draft.title, "No title");
    assert_eq!(draft.department_id, None);
    assert_eq!(draft.bidding_deadline, None);
    assert_eq!(draft.documents.len(), 1);

    let drafts = h.requests.list_drafts(h.buyer.id).await.unwrap();
    assert_eq!(drafts.len(), 1);
    let by_code = h.requests.get_by_code(&draft.request_code).await.unwrap();
    assert_eq!(by_code.id, draft.id);
}

#[tokio::test]
async fn publishing_a_draft_only_works_once() {
    let h = Harness::new().await;
    let draft = h
        .requests
        .create_draft(h.buyer.id, Default::default())
        .await
        .unwrap();

    let published = h.requests.publish_draft(draft.id, h.buyer.id).await.unwrap();
    assert_eq!(published.status, PurchaseRequestStatus::Scheduled);

    let err = h
        .requests
        .publish_draft(draft.id, h.buyer.id)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        ProcurementError::BadRequest("Only draft purchase requests can be published".to_string())
    );
}

#[tokio::test]
async fn only_the_owner_can_publish_a_draft() {
    let h = Harness::new().await;
    let stranger = h.store.add_user("stranger@example.com", None).await;
    let draft = h
        .requests
        .create_draft(h.buyer.id, Default::default())
        .await
        .unwrap();

    let err = h
        .requests
        .publish_draft(draft.id, stranger.id)
        .await
        .unwrap_err();
    assert!(matches!(err, ProcurementError::NotFound(_)));
}

#[tokio::test]
async fn status_changes_respect_the_origin_guard() {
    let h = Harness::new().await;
    let request = h.open_request(Visibility::Public).await;

    let err = h
        .requests
        .set_status(request.id, h.buyer.id, PurchaseRequestStatus::Rejected)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        ProcurementError::BadRequest(
            "Cannot transition from PUBLISHED to REJECTED. Purchase request must be in DRAFT or WAITING_FOR_APPROVAL state."
                .to_string()
        )
    );

    let finished = h
        .requests
        .set_status(request.id, h.buyer.id, PurchaseRequestStatus::Finished)
        .await
        .unwrap();
    assert_eq!(finished.status, PurchaseRequestStatus::Finished);
}

#[tokio::test]
async fn unsupported_targets_are_rejected() {
    let h = Harness::new().await;
    let created = h
        .requests
        .create(h.buyer.id, h.new_request(Visibility::Public))
        .await
        .unwrap();

    for target in [
        PurchaseRequestStatus::Draft,
        PurchaseRequestStatus::WaitingForApproval,
    ] {
        let err = h
            .requests
            .set_status(created.id, h.buyer.id, target)
            .await
            .unwrap_err();
        assert!(matches!(err, ProcurementError::BadRequest(_)));
    }
}

#[tokio::test]
async fn publishing_notifies_the_owner_but_rejecting_does_not() {
    let h = Harness::new().await;
    let first = h
        .requests
        .create(h.buyer.id, h.new_request(Visibility::Public))
        .await
        .unwrap();
    let second = h
        .requests
        .create(h.buyer.id, h.new_request(Visibility::Public))
        .await
        .unwrap();

    h.requests
        .set_status(first.id, h.buyer.id, PurchaseRequestStatus::Published)
        .await
        .unwrap();
    h.requests
        .set_status(second.id, h.buyer.id, PurchaseRequestStatus::Rejected)
        .await
        .unwrap();

    let updates: Vec<_> = h
        .push
        .direct()
        .into_iter()
        .filter(|(_, n)| n.kind == NotificationKind::PurchaseRequestUpdate)
        .collect();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].0, h.buyer.id);
    assert_eq!(updates[0].1.purchase_request_id, Some(first.id));
}

#[tokio::test]
async fn only_drafts_can_be_deleted() {
    let h = Harness::new().await;
    let request = h
        .requests
        .create(h.buyer.id, h.new_request(Visibility::Public))
        .await
        .unwrap();
    let err = h.requests.delete(request.id, h.buyer.id).await.unwrap_err();
    assert!(matches!(err, ProcurementError::BadRequest(_)));

    let draft = h
        .requests
        .create_draft(h.buyer.id, Default::default())
        .await
        .unwrap();
    h.requests.delete(draft.id, h.buyer.id).await.unwrap();
    assert!(h.store.purchase_request(draft.id).await.is_none());
    assert!(matches!(
        h.requests.get(draft.id).await.unwrap_err(),
        ProcurementError::NotFound(_)
    ));
}

#[tokio::test]
async fn deadlines_can_be_moved_into_the_past_unless_rejected() {
    let h = Harness::new().await;
    let request = h
        .requests
        .create(h.buyer.id, h.new_request(Visibility::Public))
        .await
        .unwrap();
    let yesterday = Utc::now() - Duration::days(1);

    let updated = h
        .requests
        .update_bidding_deadline(request.id, h.buyer.id, yesterday)
        .await
        .unwrap();
    assert_eq!(updated.bidding_deadline, Some(yesterday));
    let audit = h.store.audit_entries().await;
    assert!(audit
        .last()
        .unwrap()
        .message
        .contains(&yesterday.to_rfc3339()));

    h.requests
        .set_status(request.id, h.buyer.id, PurchaseRequestStatus::Rejected)
        .await
        .unwrap();
    let err = h
        .requests
        .update_bidding_deadline(request.id, h.buyer.id, Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(err, ProcurementError::BadRequest(_)));
}

#[tokio::test]
async fn inviting_companies_is_all_or_nothing() {
    let h = Harness::new().await;
    let acme = h.supplier("Acme").await;
    let request = h.open_request(Visibility::Private).await;

    let err = h
        .requests
        .invite_companies(request.id, h.buyer.id, &[acme.company.id, Uuid::new_v4()])
        .await
        .unwrap_err();
    assert_eq!(
        err,
        ProcurementError::BadRequest("One or more companies not found".to_string())
    );
    let unchanged = h.requests.get(request.id).await.unwrap();
    assert!(unchanged.invited_companies.is_empty());
    assert!(h
        .store
        .notifications()
        .await
        .iter()
        .all(|n| n.kind != NotificationKind::BidInvitation));
}

#[tokio::test]
async fn invitations_reach_active_members_of_new_invitees_only() {
    let h = Harness::new().await;
    let acme = h.supplier("Acme").await;
    let dormant = h.supplier("Dormant").await;
    h.store.deactivate_user(dormant.member.id).await;
    let request = h.open_request(Visibility::Private).await;

    let invited = h
        .requests
        .invite_companies(request.id, h.buyer.id, &[acme.company.id, dormant.company.id])
        .await
        .unwrap();
    assert_eq!(invited.len(), 2);

    let invitations = |push: &procurement_core::memory::RecordingPush| {
        push.direct()
            .into_iter()
            .filter(|(_, n)| n.kind == NotificationKind::BidInvitation)
            .map(|(user, _)| user)
            .collect::<Vec<_>>()
    };
    assert_eq!(invitations(&h.push), vec![acme.member.id]);

    // Re-inviting leaves the set alone and does not notify again.
    h.requests
        .invite_companies(request.id, h.buyer.id, &[acme.company.id])
        .await
        .unwrap();
    assert_eq!(invitations(&h.push).len(), 1);
    let stored = h.requests.get(request.id).await.unwrap();
    assert_eq!(stored.invited_companies.len(), 2);
}

#[tokio::test]
async fn empty_invitation_lists_are_rejected() {
    let h = Harness::new().await;
    let request = h.open_request(Visibility::Private).await;
    let err = h
        .requests
        .invite_companies(request.id, h.buyer.id, &[])
        .await
        .unwrap_err();
    assert!(matches!(err, ProcurementError::BadRequest(_)));
}

#[tokio::test]
async fn agents_are_invited_by_the_owner_and_told_about_it() {
    let h = Harness::new().await;
    let agent = h.store.add_user("agent@example.com", None).await;
    let request = h.open_request(Visibility::Public).await;

    let updated = h
        .requests
        .invite_agent(request.id, h.buyer.id, agent.id)
        .await
        .unwrap();
    assert!(updated.has_agent(agent.id));

    assert!(h
        .push
        .direct()
        .iter()
        .any(|(user, n)| *user == agent.id && n.kind == NotificationKind::ManageInvitation));
    let mail = h.mail.sent();
    assert_eq!(mail.len(), 1);
    assert_eq!(mail[0].template, MailTemplate::InvitedToManagePurchaseRequest);
    assert_eq!(mail[0].recipient_id, agent.id);

    let again = h
        .requests
        .invite_agent(request.id, h.buyer.id, agent.id)
        .await
        .unwrap_err();
    assert_eq!(
        again,
        ProcurementError::BadRequest("Agent is already managing this purchase request".to_string())
    );
}

#[tokio::test]
async fn agent_invitations_are_guarded() {
    let h = Harness::new().await;
    let agent = h.store.add_user("agent@example.com", None).await;
    let created = h
        .requests
        .create(h.buyer.id, h.new_request(Visibility::Public))
        .await
        .unwrap();

    let err = h
        .requests
        .invite_agent(created.id, agent.id, agent.id)
        .await
        .unwrap_err();
    assert!(matches!(err, ProcurementError::BadRequest(_)));

    let err = h
        .requests
        .invite_agent(created.id, h.buyer.id, Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, ProcurementError::NotFound(_)));

    h.requests
        .set_status(created.id, h.buyer.id, PurchaseRequestStatus::Rejected)
        .await
        .unwrap();
    let err = h
        .requests
        .invite_agent(created.id, h.buyer.id, agent.id)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        ProcurementError::BadRequest("Cannot invite agents to a rejected purchase request".to_string())
    );
    assert!(h.mail.sent().is_empty());
}

#[tokio::test]
async fn inbox_and_mark_all_read() {
    let h = Harness::new().await;
    let agent = h.store.add_user("agent@example.com", None).await;
    let request = h.open_request(Visibility::Public).await;
    h.requests
        .invite_agent(request.id, h.buyer.id, agent.id)
        .await
        .unwrap();

    let notifications = &h.notifications;
    assert_eq!(notifications.unread(agent.id).await.unwrap().len(), 1);
    assert_eq!(notifications.mark_all_read(agent.id).await.unwrap(), 1);
    assert!(notifications.unread(agent.id).await.unwrap().is_empty());
    assert_eq!(notifications.inbox(agent.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn each_recipient_reads_an_invitation_independently() {
    let h = Harness::new().await;
    let acme = h.supplier("Acme").await;
    let colleague = h
        .store
        .add_user("buyer@acme.example.com", Some(acme.company.id))
        .await;
    let request = h.open_request(Visibility::Private).await;
    h.requests
        .invite_companies(request.id, h.buyer.id, &[acme.company.id])
        .await
        .unwrap();

    let notifications = &h.notifications;
    assert_eq!(notifications.unread(acme.member.id).await.unwrap().len(), 1);
    assert_eq!(notifications.unread(colleague.id).await.unwrap().len(), 1);

    assert_eq!(notifications.mark_all_read(acme.member.id).await.unwrap(), 1);

    assert!(notifications.unread(acme.member.id).await.unwrap().is_empty());
    let left = notifications.unread(colleague.id).await.unwrap();
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].kind, NotificationKind::BidInvitation);
    assert_eq!(notifications.mark_all_read(acme.member.id).await.unwrap(), 0);
}

#[tokio::test]
async fn reading_a_broadcast_does_not_clear_it_for_others() {
    let h = Harness::new().await;
    let reader = h.store.add_user("reader@example.com", None).await;
    let other = h.store.add_user("other@example.com", None).await;
    h.notifications
        .create_and_send(
            NotificationPayload::new(NotificationKind::NewPurchaseRequest, "New tender").public(),
        )
        .await
        .unwrap();

    assert_eq!(h.notifications.mark_all_read(reader.id).await.unwrap(), 1);

    let reader_inbox = h.notifications.inbox(reader.id).await.unwrap();
    assert_eq!(reader_inbox[0].status, NotificationStatus::Read);
    let other_inbox = h.notifications.inbox(other.id).await.unwrap();
    assert_eq!(other_inbox[0].status, NotificationStatus::Unread);
}
