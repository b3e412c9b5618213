use request_manager::storage::models::{NewRequest, RequestFilter, RequestPatch};
use request_manager::storage::{Database, RequestError};

fn test_db() -> (tempfile::TempDir, Database) {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open(dir.path().join("data")).unwrap();
    (dir, db)
}

fn sample_request(student_id: &str, document_type: &str) -> NewRequest {
    NewRequest {
        student_name: "Juan Dela Cruz".to_string(),
        document_type: document_type.to_string(),
        status: "Pending".to_string(),
        student_id: student_id.to_string(),
        email: "juan@example.com".to_string(),
        request_date: "2023-10-05".to_string(),
    }
}

#[test]
fn test_submit_and_get_request() {
    let (_dir, db) = test_db();

    let record = db.submit_request(sample_request("S1", "Form 137")).unwrap();
    assert!(!record.id.is_empty());
    assert_eq!(record.composite_key, "S1_Form 137");

    let retrieved = db.get_request(&record.id).unwrap();
    assert_eq!(retrieved.student_name, "Juan Dela Cruz");
    assert_eq!(retrieved.document_type, "Form 137");
    assert_eq!(retrieved.status, "Pending");
    assert_eq!(retrieved.student_id, "S1");
}

#[test]
fn test_duplicate_submission_rejected() {
    let (_dir, db) = test_db();

    db.submit_request(sample_request("S1", "Form 137")).unwrap();
    let second = db.submit_request(sample_request("S1", "Form 137"));

    assert!(matches!(second, Err(RequestError::Duplicate(_))));
    // The failed submission wrote nothing
    assert_eq!(db.list_requests(&RequestFilter::default()).unwrap().len(), 1);
}

/// Two writers racing on the same (student_id, document_type) pair: the
/// writer serialization inside the database means exactly one submission
/// lands and the other observes the committed key.
#[test]
fn test_concurrent_duplicate_submissions_single_winner() {
    use std::sync::{Arc, Barrier};

    let (_dir, db) = test_db();
    let barrier = Arc::new(Barrier::new(2));

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let db = db.clone();
            let barrier = Arc::clone(&barrier);
            std::thread::spawn(move || {
                barrier.wait();
                db.submit_request(sample_request("S1", "Form 137"))
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let winners = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1);
    assert!(results
        .iter()
        .any(|r| matches!(r, Err(RequestError::Duplicate(_)))));
    assert_eq!(db.list_requests(&RequestFilter::default()).unwrap().len(), 1);
}

#[test]
fn test_same_student_different_document_type_allowed() {
    let (_dir, db) = test_db();

    db.submit_request(sample_request("S1", "Form 137")).unwrap();
    db.submit_request(sample_request("S1", "Transcript")).unwrap();
    db.submit_request(sample_request("S2", "Form 137")).unwrap();

    assert_eq!(db.list_requests(&RequestFilter::default()).unwrap().len(), 3);
}

#[test]
fn test_get_request_not_found() {
    let (_dir, db) = test_db();
    assert!(matches!(
        db.get_request("nonexistent"),
        Err(RequestError::NotFound(_))
    ));
}

#[test]
fn test_get_requests_by_student() {
    let (_dir, db) = test_db();

    db.submit_request(sample_request("S1", "Form 137")).unwrap();
    db.submit_request(sample_request("S1", "Transcript")).unwrap();
    db.submit_request(sample_request("S2", "Form 137")).unwrap();

    let s1 = db.get_requests_by_student("S1").unwrap();
    assert_eq!(s1.len(), 2);

    let s2 = db.get_requests_by_student("S2").unwrap();
    assert_eq!(s2.len(), 1);

    assert!(db.get_requests_by_student("S3").unwrap().is_empty());
}

#[test]
fn test_list_requests_filter_by_document_type() {
    let (_dir, db) = test_db();

    db.submit_request(sample_request("S1", "Form 137")).unwrap();
    db.submit_request(sample_request("S2", "Transcript")).unwrap();

    let filter = RequestFilter {
        document_type: Some("Form 137".to_string()),
        search: None,
    };
    let form137 = db.list_requests(&filter).unwrap();
    assert_eq!(form137.len(), 1);
    assert_eq!(form137[0].student_id, "S1");
}

#[test]
fn test_list_requests_search_is_case_insensitive_substring() {
    let (_dir, db) = test_db();

    let mut new = sample_request("S1", "Form 137");
    new.student_name = "Maria Clara".to_string();
    db.submit_request(new).unwrap();

    let mut new = sample_request("S2", "Form 137");
    new.student_name = "Crisostomo Ibarra".to_string();
    new.status = "Processing".to_string();
    db.submit_request(new).unwrap();

    // Substring of student_name, any case
    let filter = RequestFilter {
        document_type: None,
        search: Some("MARIA".to_string()),
    };
    let hits = db.list_requests(&filter).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].student_name, "Maria Clara");

    // Substring of status
    let filter = RequestFilter {
        document_type: None,
        search: Some("process".to_string()),
    };
    assert_eq!(db.list_requests(&filter).unwrap().len(), 1);

    // Substring of request_date matches both
    let filter = RequestFilter {
        document_type: None,
        search: Some("2023-10".to_string()),
    };
    assert_eq!(db.list_requests(&filter).unwrap().len(), 2);

    // No match is an empty list, not an error
    let filter = RequestFilter {
        document_type: None,
        search: Some("zzz".to_string()),
    };
    assert!(db.list_requests(&filter).unwrap().is_empty());
}

#[test]
fn test_list_requests_empty_search_returns_all() {
    let (_dir, db) = test_db();

    db.submit_request(sample_request("S1", "Form 137")).unwrap();
    db.submit_request(sample_request("S2", "Transcript")).unwrap();

    let filter = RequestFilter {
        document_type: None,
        search: Some(String::new()),
    };
    assert_eq!(db.list_requests(&filter).unwrap().len(), 2);
}

#[test]
fn test_update_request_fields() {
    let (_dir, db) = test_db();
    let record = db.submit_request(sample_request("S1", "Form 137")).unwrap();

    let patch = RequestPatch {
        status: Some("Completed".to_string()),
        student_name: Some("Juan D. Cruz".to_string()),
        ..Default::default()
    };
    let updated = db.update_request(&record.id, &patch).unwrap();
    assert_eq!(updated.status, "Completed");
    assert_eq!(updated.student_name, "Juan D. Cruz");
    // Untouched fields survive
    assert_eq!(updated.email, "juan@example.com");
    assert!(updated.updated_at >= record.updated_at);
}

#[test]
fn test_update_request_recomputes_composite_key() {
    let (_dir, db) = test_db();
    let record = db.submit_request(sample_request("S1", "Form 137")).unwrap();

    let patch = RequestPatch {
        document_type: Some("Transcript".to_string()),
        ..Default::default()
    };
    let updated = db.update_request(&record.id, &patch).unwrap();
    assert_eq!(updated.composite_key, "S1_Transcript");

    // The old pair is free for resubmission again
    db.submit_request(sample_request("S1", "Form 137")).unwrap();
    // The new pair is now taken
    assert!(matches!(
        db.submit_request(sample_request("S1", "Transcript")),
        Err(RequestError::Duplicate(_))
    ));
}

#[test]
fn test_update_request_key_collision_rejected() {
    let (_dir, db) = test_db();
    db.submit_request(sample_request("S1", "Form 137")).unwrap();
    let other = db.submit_request(sample_request("S2", "Form 137")).unwrap();

    // Editing S2's request onto S1's pair collides
    let patch = RequestPatch {
        student_id: Some("S1".to_string()),
        ..Default::default()
    };
    assert!(matches!(
        db.update_request(&other.id, &patch),
        Err(RequestError::Duplicate(_))
    ));

    // Nothing was written
    let unchanged = db.get_request(&other.id).unwrap();
    assert_eq!(unchanged.student_id, "S2");
}

#[test]
fn test_update_request_moves_student_index() {
    let (_dir, db) = test_db();
    let record = db.submit_request(sample_request("S1", "Form 137")).unwrap();

    let patch = RequestPatch {
        student_id: Some("S9".to_string()),
        ..Default::default()
    };
    db.update_request(&record.id, &patch).unwrap();

    assert!(db.get_requests_by_student("S1").unwrap().is_empty());
    let moved = db.get_requests_by_student("S9").unwrap();
    assert_eq!(moved.len(), 1);
    assert_eq!(moved[0].id, record.id);
}

#[test]
fn test_update_request_not_found() {
    let (_dir, db) = test_db();
    let patch = RequestPatch {
        status: Some("Completed".to_string()),
        ..Default::default()
    };
    assert!(matches!(
        db.update_request("nonexistent", &patch),
        Err(RequestError::NotFound(_))
    ));
}

#[test]
fn test_delete_request() {
    let (_dir, db) = test_db();
    let record = db.submit_request(sample_request("S1", "Form 137")).unwrap();

    db.delete_request(&record.id).unwrap();
    assert!(matches!(
        db.get_request(&record.id),
        Err(RequestError::NotFound(_))
    ));
    assert!(db.get_requests_by_student("S1").unwrap().is_empty());

    // Second delete is not idempotent
    assert!(matches!(
        db.delete_request(&record.id),
        Err(RequestError::NotFound(_))
    ));
}

#[test]
fn test_delete_request_frees_composite_key() {
    let (_dir, db) = test_db();
    let record = db.submit_request(sample_request("S1", "Form 137")).unwrap();
    db.delete_request(&record.id).unwrap();

    // The pair can be submitted again
    db.submit_request(sample_request("S1", "Form 137")).unwrap();
}

#[test]
fn test_forward_for_approval() {
    let (_dir, db) = test_db();
    let record = db.submit_request(sample_request("S1", "Form 137")).unwrap();

    let approval = db.forward_for_approval(&record.id).unwrap();
    assert_eq!(approval.request_id, record.id);
    assert_eq!(approval.student_name, record.student_name);
    assert_ne!(approval.id, record.id);

    // The record left the active set entirely
    assert!(matches!(
        db.get_request(&record.id),
        Err(RequestError::NotFound(_))
    ));
    assert!(db.get_requests_by_student("S1").unwrap().is_empty());
    assert_eq!(db.list_approvals().unwrap().len(), 1);
}

#[test]
fn test_forward_frees_composite_key_for_resubmission() {
    let (_dir, db) = test_db();
    let record = db.submit_request(sample_request("S1", "Form 137")).unwrap();
    db.forward_for_approval(&record.id).unwrap();

    // Uniqueness does not span the approval store
    db.submit_request(sample_request("S1", "Form 137")).unwrap();
}

#[test]
fn test_forward_not_found() {
    let (_dir, db) = test_db();
    assert!(matches!(
        db.forward_for_approval("nonexistent"),
        Err(RequestError::NotFound(_))
    ));
}

#[test]
fn test_forward_then_decline_discards_request() {
    let (_dir, db) = test_db();
    let record = db.submit_request(sample_request("S1", "Form 137")).unwrap();
    let approval = db.forward_for_approval(&record.id).unwrap();

    db.decline_approval(&approval.id).unwrap();

    assert!(db.list_requests(&RequestFilter::default()).unwrap().is_empty());
    assert!(db.list_approvals().unwrap().is_empty());
    assert!(db.list_completed().unwrap().is_empty());
}

#[test]
fn test_decline_approval_not_found() {
    let (_dir, db) = test_db();
    assert!(matches!(
        db.decline_approval("nonexistent"),
        Err(RequestError::NotFound(_))
    ));
}

#[test]
fn test_forward_then_complete() {
    let (_dir, db) = test_db();
    let record = db.submit_request(sample_request("S1", "Form 137")).unwrap();
    let approval = db.forward_for_approval(&record.id).unwrap();

    let completed = db.complete_request(&approval.id).unwrap();
    assert_eq!(completed.request_id, record.id);
    assert!(completed.completed_at > approval.forwarded_at);

    assert!(db.list_requests(&RequestFilter::default()).unwrap().is_empty());
    assert!(db.list_approvals().unwrap().is_empty());

    let ledger = db.list_completed().unwrap();
    assert_eq!(ledger.len(), 1);
    assert_eq!(ledger[0].student_name, "Juan Dela Cruz");
}

#[test]
fn test_complete_directly_from_active_request() {
    let (_dir, db) = test_db();
    let record = db.submit_request(sample_request("S1", "Form 137")).unwrap();

    // Completion without a forward step removes the active record too
    let completed = db.complete_request(&record.id).unwrap();
    assert_eq!(completed.request_id, record.id);

    assert!(db.list_requests(&RequestFilter::default()).unwrap().is_empty());
    assert!(db.get_requests_by_student("S1").unwrap().is_empty());
    assert_eq!(db.list_completed().unwrap().len(), 1);
}

#[test]
fn test_complete_not_found() {
    let (_dir, db) = test_db();
    assert!(matches!(
        db.complete_request("nonexistent"),
        Err(RequestError::NotFound(_))
    ));
}

#[test]
fn test_completed_timestamps_strictly_monotonic() {
    let (_dir, db) = test_db();

    for i in 0..5 {
        let record = db
            .submit_request(sample_request(&format!("S{i}"), "Form 137"))
            .unwrap();
        db.complete_request(&record.id).unwrap();
    }

    let mut times: Vec<_> = db
        .list_completed()
        .unwrap()
        .into_iter()
        .map(|c| c.completed_at)
        .collect();
    times.sort();
    for pair in times.windows(2) {
        assert!(pair[0] < pair[1], "completion timestamps must never tie");
    }
}

#[test]
fn test_completed_ledger_survives_resubmission_cycles() {
    let (_dir, db) = test_db();

    // Same pair submitted and completed twice produces two ledger entries
    for _ in 0..2 {
        let record = db.submit_request(sample_request("S1", "Form 137")).unwrap();
        let approval = db.forward_for_approval(&record.id).unwrap();
        db.complete_request(&approval.id).unwrap();
    }

    assert_eq!(db.list_completed().unwrap().len(), 2);
}

#[test]
fn test_purge_all() {
    let (_dir, db) = test_db();

    db.submit_request(sample_request("S1", "Form 137")).unwrap();
    let r2 = db.submit_request(sample_request("S2", "Form 137")).unwrap();
    let r3 = db.submit_request(sample_request("S3", "Form 137")).unwrap();
    db.forward_for_approval(&r2.id).unwrap();
    db.complete_request(&r3.id).unwrap();

    let stats = db.purge_all().unwrap();
    assert_eq!(stats.requests, 1);
    assert_eq!(stats.approvals, 1);
    assert_eq!(stats.completed, 1);

    assert!(db.list_requests(&RequestFilter::default()).unwrap().is_empty());
    assert!(db.list_approvals().unwrap().is_empty());
    assert!(db.list_completed().unwrap().is_empty());

    // Purge also frees composite keys
    db.submit_request(sample_request("S1", "Form 137")).unwrap();
}
