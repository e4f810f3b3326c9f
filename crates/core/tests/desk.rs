//! End-to-end desk scenarios against in-memory SQLite tables.

use std::sync::Arc;

use querydesk_core::{Desk, DeskError, Session, StaticCredentials, TicketDraft};
use querydesk_models::{Role, STATUS_OPEN, StatusFilter, TicketFilter};
use sqlx::SqlitePool;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// A table without auto-increment or remarks, holding one closed ticket with id 5.
async fn legacy_pool() -> SqlitePool {
    let pool = querydesk_db::connect_in_memory().await.expect("failed to open db");
    sqlx::query(
        "CREATE TABLE customer_data (query_id INT PRIMARY KEY, name TEXT, email TEXT, \
         mobile TEXT, query_heading TEXT, query_description TEXT, status TEXT, \
         created_at DATETIME, closed_at DATETIME)",
    )
    .execute(&pool)
    .await
    .expect("failed to create table");
    sqlx::query(
        "INSERT INTO customer_data VALUES \
         (5, 'Old', 'old@x.com', '555', 'Old', 'Old', 'escalated', '2024-01-01 10:00:00', NULL)",
    )
    .execute(&pool)
    .await
    .expect("failed to seed");
    pool
}

async fn migrated_pool() -> SqlitePool {
    let pool = querydesk_db::connect_in_memory().await.expect("failed to open db");
    querydesk_db::migrate(&pool).await.expect("failed to migrate");
    pool
}

async fn desk(pool: SqlitePool) -> Desk {
    Desk::new(pool, Arc::new(StaticCredentials::demo())).await
}

fn client_session(desk: &Desk) -> Session {
    let mut session = Session::default();
    desk.authenticate(&mut session, Role::Client, "selva", "1111")
        .expect("client login should succeed");
    session
}

fn support_session(desk: &Desk) -> Session {
    let mut session = Session::default();
    desk.authenticate(&mut session, Role::Support, "Support", "1234")
        .expect("support login should succeed");
    session
}

fn draft() -> TicketDraft {
    TicketDraft {
        name: "A".into(),
        email: "a@x.com".into(),
        mobile: "111".into(),
        query_heading: "H".into(),
        query_description: "D".into(),
        confirmed: true,
    }
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn ticket_lifecycle_on_legacy_table() {
    let desk = desk(legacy_pool().await).await;
    let mut client = client_session(&desk);
    let mut support = support_session(&desk);

    let created = desk
        .create_ticket(&mut client, draft())
        .await
        .expect("create should succeed");
    assert_eq!(created.query_id, 6);
    assert_eq!(created.open_tickets.len(), 1);
    assert_eq!(created.open_tickets[0].status, STATUS_OPEN);
    assert_eq!(created.open_tickets[0].closed_at, None);
    assert_eq!(client.client.draft, TicketDraft::default());

    let t = desk
        .update_status(&mut support, 6, "In Progress", "checking")
        .await
        .expect("update should succeed");
    assert_eq!(t.status, "In Progress");
    assert_eq!(t.closed_at, None);
    // No remarks column: nothing written, nothing failed.
    assert_eq!(t.remarks, None);

    let t = desk
        .update_status(&mut support, 6, "closed", "fixed")
        .await
        .expect("update should succeed");
    assert_eq!(t.status, "closed");
    assert!(t.closed_at.is_some());
    assert_eq!(support.support.selected_id, Some(6));

    let all = desk.find_tickets(&TicketFilter::default()).await.expect("lookup");
    assert!(all.iter().any(|t| t.query_id == 6));
    let closed = desk
        .find_tickets(&TicketFilter {
            status: StatusFilter::Only("closed".into()),
            ..Default::default()
        })
        .await
        .expect("lookup");
    assert_eq!(closed.iter().map(|t| t.query_id).collect::<Vec<_>>(), vec![6]);
}

#[tokio::test]
async fn remarks_round_trip_when_column_exists() {
    let desk = desk(migrated_pool().await).await;
    let mut client = client_session(&desk);
    let mut support = support_session(&desk);
    let id = desk.create_ticket(&mut client, draft()).await.expect("create").query_id;

    let t = desk
        .update_status(&mut support, id, "In Progress", "checking")
        .await
        .expect("update");

    assert_eq!(t.remarks.as_deref(), Some("checking"));
}

// ---------------------------------------------------------------------------
// Auth and validation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failed_login_leaves_session_untouched() {
    let desk = desk(migrated_pool().await).await;
    let mut session = Session::default();

    let err = desk
        .authenticate(&mut session, Role::Client, "selva", "wrong")
        .expect_err("login should fail");

    assert_eq!(err.to_string(), "Invalid username or password.");
    assert_eq!(session, Session::default());
}

#[tokio::test]
async fn actions_require_the_matching_role() {
    let desk = desk(migrated_pool().await).await;
    let mut client = client_session(&desk);
    let mut support = support_session(&desk);

    assert!(matches!(
        desk.create_ticket(&mut support, draft()).await,
        Err(DeskError::Unauthorized(_))
    ));
    assert!(matches!(
        desk.update_status(&mut client, 1, "closed", "").await,
        Err(DeskError::Unauthorized(_))
    ));
    assert!(matches!(
        desk.support_board(&mut client, None).await,
        Err(DeskError::Unauthorized(_))
    ));
}

#[tokio::test]
async fn invalid_draft_is_kept_and_nothing_is_inserted() {
    let desk = desk(migrated_pool().await).await;
    let mut client = client_session(&desk);
    let mut bad = draft();
    bad.query_heading = "   ".into();
    bad.confirmed = false;

    let err = desk
        .create_ticket(&mut client, bad.clone())
        .await
        .expect_err("create should be rejected");

    match err {
        DeskError::Validation(violations) => assert_eq!(violations.len(), 2),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(client.client.draft, bad);
    assert!(desk.list_all().await.expect("list").is_empty());
}

#[tokio::test]
async fn updating_unknown_ticket_is_not_found() {
    let desk = desk(migrated_pool().await).await;
    let mut support = support_session(&desk);

    let err = desk
        .update_status(&mut support, 42, "closed", "")
        .await
        .expect_err("update should fail");

    assert!(matches!(err, DeskError::NotFound(42)));
}

// ---------------------------------------------------------------------------
// Client lookup
// ---------------------------------------------------------------------------

#[tokio::test]
async fn check_status_is_scoped_to_the_logged_in_contact() {
    let desk = desk(migrated_pool().await).await;
    let mut client = client_session(&desk);
    let mine = TicketDraft {
        email: "selva@gmail.com".into(),
        mobile: "9000000001".into(),
        ..draft()
    };
    let first = desk.create_ticket(&mut client, mine.clone()).await.expect("create").query_id;
    let second = desk.create_ticket(&mut client, mine).await.expect("create").query_id;
    desk.create_ticket(&mut client, draft()).await.expect("create");

    let tickets = desk
        .check_status(&mut client, StatusFilter::All, "")
        .await
        .expect("lookup");
    let mut ids: Vec<i64> = tickets.iter().map(|t| t.query_id).collect();
    ids.sort();
    assert_eq!(ids, vec![first, second]);

    let one = desk
        .check_status(&mut client, StatusFilter::All, &second.to_string())
        .await
        .expect("lookup");
    assert_eq!(one.len(), 1);
    assert_eq!(one[0].query_id, second);
    assert_eq!(client.client.check.complaint_id, second.to_string());
}

#[tokio::test]
async fn non_numeric_complaint_id_is_a_validation_error() {
    let desk = desk(migrated_pool().await).await;
    let mut client = client_session(&desk);

    let err = desk
        .check_status(&mut client, StatusFilter::Only("open".into()), "abc")
        .await
        .expect_err("lookup should be rejected");

    assert_eq!(
        err.to_string(),
        "Complaint ID must be a number. Please enter a valid numeric ID."
    );
    assert_eq!(client.client.check.status, StatusFilter::Only("open".into()));

    desk.clear_check_filters(&mut client);
    assert_eq!(client.client.check.status, StatusFilter::All);
    assert_eq!(client.client.check.complaint_id, "");
}

// ---------------------------------------------------------------------------
// Support board
// ---------------------------------------------------------------------------

#[tokio::test]
async fn support_board_offers_statuses_found_in_data() {
    let desk = desk(legacy_pool().await).await;
    let mut client = client_session(&desk);
    let mut support = support_session(&desk);
    desk.create_ticket(&mut client, draft()).await.expect("create");

    let board = desk.support_board(&mut support, None).await.expect("board");
    assert_eq!(board.status_options, vec!["escalated", "open"]);
    assert_eq!(board.tickets.len(), 2);
    assert_eq!(board.selected_id, Some(6));

    let board = desk
        .support_board(&mut support, Some(StatusFilter::Only("escalated".into())))
        .await
        .expect("board");
    assert_eq!(board.tickets.iter().map(|t| t.query_id).collect::<Vec<_>>(), vec![5]);
    assert_eq!(board.selected_id, Some(5));

    // Remembered filter is reused when none is given.
    let board = desk.support_board(&mut support, None).await.expect("board");
    assert_eq!(board.status_filter, StatusFilter::Only("escalated".into()));

    // A filter that matches nothing in the data falls back to all.
    let board = desk
        .support_board(&mut support, Some(StatusFilter::Only("gone".into())))
        .await
        .expect("board");
    assert_eq!(board.status_filter, StatusFilter::All);
    assert_eq!(board.tickets.len(), 2);
}

#[tokio::test]
async fn selecting_a_custom_status_ticket_lists_it_first() {
    let desk = desk(legacy_pool().await).await;
    let mut support = support_session(&desk);

    let selected = desk.select_ticket(&mut support, 5).await.expect("select");

    assert_eq!(selected.ticket.status, "escalated");
    assert_eq!(
        selected.status_menu,
        vec!["escalated", "open", "In Progress", "closed"]
    );
    assert_eq!(support.support.selected_id, Some(5));
}

// ---------------------------------------------------------------------------
// Capabilities
// ---------------------------------------------------------------------------

#[tokio::test]
async fn refresh_picks_up_a_new_remarks_column() {
    let pool = legacy_pool().await;
    let desk = desk(pool.clone()).await;
    assert!(!desk.capabilities().has_remarks_column);

    sqlx::query("ALTER TABLE customer_data ADD COLUMN remarks TEXT")
        .execute(&pool)
        .await
        .expect("alter");
    let caps = desk.refresh_capabilities().await;

    assert!(caps.has_remarks_column);
    assert!(!caps.has_auto_increment_id);
    let t = desk.set_status(5, "closed", "done").await.expect("update");
    assert_eq!(t.remarks.as_deref(), Some("done"));
}

#[tokio::test]
async fn dropped_remarks_column_degrades_on_the_spot() {
    let pool = migrated_pool().await;
    let desk = desk(pool.clone()).await;
    let mut client = client_session(&desk);
    let mut support = support_session(&desk);
    let created = desk.create_ticket(&mut client, draft()).await.expect("create");
    assert!(desk.capabilities().has_remarks_column);

    sqlx::query("ALTER TABLE customer_data DROP COLUMN remarks")
        .execute(&pool)
        .await
        .expect("drop column");

    let board = desk.support_board(&mut support, None).await.expect("board");
    assert_eq!(board.tickets.len(), 1);
    assert_eq!(board.tickets[0].remarks, None);
    assert!(!desk.capabilities().has_remarks_column);

    let t = desk
        .update_status(&mut support, created.query_id, "closed", "fixed")
        .await
        .expect("update");
    assert_eq!(t.status, "closed");
    assert_eq!(t.remarks, None);
}

#[tokio::test]
async fn update_retries_without_remarks_column() {
    let pool = migrated_pool().await;
    let desk = desk(pool.clone()).await;
    let id = desk.submit(&draft()).await.expect("submit");

    sqlx::query("ALTER TABLE customer_data DROP COLUMN remarks")
        .execute(&pool)
        .await
        .expect("drop column");

    let t = desk.set_status(id, "In Progress", "checking").await.expect("update");
    assert_eq!(t.status, "In Progress");
    assert_eq!(t.closed_at, None);
}

#[tokio::test]
async fn committed_ticket_is_reported_even_if_follow_up_lookup_fails() {
    // No closed_at column: inserts work, every SELECT fails.
    let pool = querydesk_db::connect_in_memory().await.expect("failed to open db");
    sqlx::query(
        "CREATE TABLE customer_data (query_id INTEGER PRIMARY KEY, name TEXT, email TEXT, \
         mobile TEXT, query_heading TEXT, query_description TEXT, status TEXT, created_at TEXT)",
    )
    .execute(&pool)
    .await
    .expect("failed to create table");
    let desk = desk(pool.clone()).await;
    let mut client = client_session(&desk);

    let created = desk
        .create_ticket(&mut client, draft())
        .await
        .expect("insert succeeded, so the action succeeds");

    assert_eq!(created.query_id, 1);
    assert!(created.open_tickets.is_empty());
    assert_eq!(client.client.draft, TicketDraft::default());
    let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM customer_data")
        .fetch_one(&pool)
        .await
        .expect("count");
    assert_eq!(rows, 1);
}

#[tokio::test]
async fn blank_status_is_listed_but_not_offered_as_a_filter() {
    let pool = legacy_pool().await;
    sqlx::query(
        "INSERT INTO customer_data VALUES \
         (6, 'N', 'n@x.com', '666', 'H', 'D', NULL, '2024-01-02 10:00:00', NULL), \
         (7, 'E', 'e@x.com', '777', 'H', 'D', '', '2024-01-03 10:00:00', NULL)",
    )
    .execute(&pool)
    .await
    .expect("seed");
    let desk = desk(pool).await;
    let mut support = support_session(&desk);

    let board = desk.support_board(&mut support, None).await.expect("board");

    assert_eq!(board.status_options, vec!["escalated"]);
    assert_eq!(board.tickets.iter().map(|t| t.query_id).collect::<Vec<_>>(), vec![7, 6, 5]);
    assert!(board.tickets[..2].iter().all(|t| t.status.is_empty()));
}
