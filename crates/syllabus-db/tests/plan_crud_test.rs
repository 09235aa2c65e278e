//! Integration tests for the plan and task query functions.

use uuid::Uuid;

use syllabus_db::models::{Milestone, Plan};
use syllabus_db::queries::{plans, tasks};
use syllabus_test_utils::{create_test_db, drop_test_db};

fn plan(goal: &str, weeks: u32) -> Plan {
    Plan {
        goal: goal.to_string(),
        weeks,
        milestones: (1..=weeks)
            .map(|week| Milestone {
                week,
                title: format!("Week {week}"),
                objectives: vec![],
                resources: vec![],
                daily_tasks: vec![format!("task for week {week}")],
            })
            .collect(),
    }
}

// -----------------------------------------------------------------------
// Plans
// -----------------------------------------------------------------------

#[tokio::test]
async fn insert_and_fetch_plan() {
    let (pool, db_name) = create_test_db().await;

    let saved = plans::insert_plan_if_absent(&pool, "alice", "  Learn Rust ", 2, &plan("Learn Rust", 2))
        .await
        .unwrap()
        .expect("first insert should create a row");

    assert_eq!(saved.owner_id, "alice");
    assert_eq!(saved.goal, "Learn Rust", "goal is stored trimmed");
    assert_eq!(saved.weeks, 2);
    assert_eq!(saved.plan.0.milestones.len(), 2);

    let fetched = plans::get_plan(&pool, saved.id).await.unwrap().unwrap();
    assert_eq!(fetched.id, saved.id);
    assert_eq!(fetched.plan.0, saved.plan.0);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn insert_same_slot_returns_none() {
    let (pool, db_name) = create_test_db().await;

    plans::insert_plan_if_absent(&pool, "alice", "Learn Rust", 4, &plan("Learn Rust", 4))
        .await
        .unwrap()
        .unwrap();
    let second = plans::insert_plan_if_absent(&pool, "alice", "learn rust", 4, &plan("learn rust", 4))
        .await
        .unwrap();
    assert!(second.is_none(), "case-insensitive goal should collide");

    // Different weeks, different owner: both fine.
    assert!(
        plans::insert_plan_if_absent(&pool, "alice", "Learn Rust", 6, &plan("Learn Rust", 6))
            .await
            .unwrap()
            .is_some()
    );
    assert!(
        plans::insert_plan_if_absent(&pool, "bob", "Learn Rust", 4, &plan("Learn Rust", 4))
            .await
            .unwrap()
            .is_some()
    );

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn find_duplicate_ignores_case_and_whitespace() {
    let (pool, db_name) = create_test_db().await;

    let saved = plans::insert_plan_if_absent(&pool, "alice", "Learn Rust", 4, &plan("Learn Rust", 4))
        .await
        .unwrap()
        .unwrap();

    let dup = plans::find_duplicate(&pool, "alice", "  LEARN rust ", 4)
        .await
        .unwrap()
        .expect("should find the plan");
    assert_eq!(dup.id, saved.id);

    assert!(plans::find_duplicate(&pool, "alice", "Learn Rust", 5).await.unwrap().is_none());
    assert!(plans::find_duplicate(&pool, "bob", "Learn Rust", 4).await.unwrap().is_none());

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn owner_scoped_lookups_hide_other_owners() {
    let (pool, db_name) = create_test_db().await;

    let saved = plans::insert_plan_if_absent(&pool, "alice", "Go", 1, &plan("Go", 1))
        .await
        .unwrap()
        .unwrap();

    assert!(plans::get_plan_for_owner(&pool, saved.id, "alice").await.unwrap().is_some());
    assert!(plans::get_plan_for_owner(&pool, saved.id, "bob").await.unwrap().is_none());
    assert!(!plans::delete_plan(&pool, saved.id, "bob").await.unwrap());
    assert!(plans::delete_plan(&pool, saved.id, "alice").await.unwrap());
    assert!(plans::get_plan(&pool, saved.id).await.unwrap().is_none());

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn list_plans_newest_first() {
    let (pool, db_name) = create_test_db().await;

    let first = plans::insert_plan_if_absent(&pool, "alice", "First", 1, &plan("First", 1))
        .await
        .unwrap()
        .unwrap();
    let second = plans::insert_plan_if_absent(&pool, "alice", "Second", 1, &plan("Second", 1))
        .await
        .unwrap()
        .unwrap();
    plans::insert_plan_if_absent(&pool, "bob", "Other", 1, &plan("Other", 1))
        .await
        .unwrap()
        .unwrap();

    let listed = plans::list_plans_for_owner(&pool, "alice").await.unwrap();
    let ids: Vec<Uuid> = listed.iter().map(|p| p.id).collect();
    assert_eq!(ids, vec![second.id, first.id]);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn update_plan_content_rewrites_goal_and_data() {
    let (pool, db_name) = create_test_db().await;

    let saved = plans::insert_plan_if_absent(&pool, "alice", "Go", 1, &plan("Go", 1))
        .await
        .unwrap()
        .unwrap();
    let updated = plans::update_plan_content(&pool, saved.id, "alice", "Go deeper", 2, &plan("Go deeper", 2))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.goal, "Go deeper");
    assert_eq!(updated.weeks, 2);
    assert!(updated.updated_at >= saved.updated_at);

    let missing = plans::update_plan_content(&pool, saved.id, "bob", "x", 1, &plan("x", 1))
        .await
        .unwrap();
    assert!(missing.is_none());

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn delete_plans_for_owner_counts_rows() {
    let (pool, db_name) = create_test_db().await;

    for goal in ["A", "B", "C"] {
        plans::insert_plan_if_absent(&pool, "alice", goal, 1, &plan(goal, 1))
            .await
            .unwrap()
            .unwrap();
    }
    plans::insert_plan_if_absent(&pool, "bob", "A", 1, &plan("A", 1))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(plans::delete_plans_for_owner(&pool, "alice").await.unwrap(), 3);
    assert_eq!(plans::list_plans_for_owner(&pool, "bob").await.unwrap().len(), 1);

    pool.close().await;
    drop_test_db(&db_name).await;
}

// -----------------------------------------------------------------------
// Tasks
// -----------------------------------------------------------------------

#[tokio::test]
async fn insert_task_is_idempotent_per_key() {
    let (pool, db_name) = create_test_db().await;

    let saved = plans::insert_plan_if_absent(&pool, "alice", "Go", 1, &plan("Go", 1))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(tasks::insert_task_if_absent(&pool, saved.id, 1, 1, "read").await.unwrap(), 1);
    assert_eq!(tasks::insert_task_if_absent(&pool, saved.id, 1, 1, "read").await.unwrap(), 0);
    assert_eq!(tasks::insert_task_if_absent(&pool, saved.id, 1, 2, "read").await.unwrap(), 1);
    assert_eq!(tasks::count_tasks_for_plan(&pool, saved.id).await.unwrap(), 2);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn tasks_list_in_week_then_day_order() {
    let (pool, db_name) = create_test_db().await;

    let saved = plans::insert_plan_if_absent(&pool, "alice", "Go", 2, &plan("Go", 2))
        .await
        .unwrap()
        .unwrap();
    for (week, day, text) in [(2, 1, "c"), (1, 2, "b"), (1, 1, "a"), (2, 2, "d")] {
        tasks::insert_task_if_absent(&pool, saved.id, week, day, text).await.unwrap();
    }

    let listed = tasks::list_tasks_for_plan(&pool, saved.id).await.unwrap();
    let texts: Vec<&str> = listed.iter().map(|t| t.text.as_str()).collect();
    assert_eq!(texts, vec!["a", "b", "c", "d"]);
    assert!(listed.iter().all(|t| !t.completed && t.completed_at.is_none()));

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn set_task_completion_stamps_and_clears() {
    let (pool, db_name) = create_test_db().await;

    let saved = plans::insert_plan_if_absent(&pool, "alice", "Go", 1, &plan("Go", 1))
        .await
        .unwrap()
        .unwrap();
    tasks::insert_task_if_absent(&pool, saved.id, 1, 1, "read").await.unwrap();
    let task = tasks::list_tasks_for_plan(&pool, saved.id).await.unwrap().remove(0);

    let done = tasks::set_task_completion(&pool, saved.id, task.id, "alice", true)
        .await
        .unwrap()
        .unwrap();
    assert!(done.completed);
    assert!(done.completed_at.is_some());

    let undone = tasks::set_task_completion(&pool, saved.id, task.id, "alice", false)
        .await
        .unwrap()
        .unwrap();
    assert!(!undone.completed);
    assert!(undone.completed_at.is_none());

    let fetched = tasks::get_task(&pool, task.id).await.unwrap().unwrap();
    assert!(!fetched.completed);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn set_task_completion_requires_owner_and_plan() {
    let (pool, db_name) = create_test_db().await;

    let a = plans::insert_plan_if_absent(&pool, "alice", "Go", 1, &plan("Go", 1))
        .await
        .unwrap()
        .unwrap();
    let b = plans::insert_plan_if_absent(&pool, "alice", "Zig", 1, &plan("Zig", 1))
        .await
        .unwrap()
        .unwrap();
    tasks::insert_task_if_absent(&pool, a.id, 1, 1, "read").await.unwrap();
    let task = tasks::list_tasks_for_plan(&pool, a.id).await.unwrap().remove(0);

    let wrong_owner = tasks::set_task_completion(&pool, a.id, task.id, "bob", true)
        .await
        .unwrap();
    assert!(wrong_owner.is_none());

    let wrong_plan = tasks::set_task_completion(&pool, b.id, task.id, "alice", true)
        .await
        .unwrap();
    assert!(wrong_plan.is_none());

    let unchanged = tasks::get_task(&pool, task.id).await.unwrap().unwrap();
    assert!(!unchanged.completed);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn delete_tasks_not_in_keeps_listed_keys() {
    let (pool, db_name) = create_test_db().await;

    let saved = plans::insert_plan_if_absent(&pool, "alice", "Go", 1, &plan("Go", 1))
        .await
        .unwrap()
        .unwrap();
    for (day, text) in [(1, "keep"), (2, "drop"), (3, "also keep")] {
        tasks::insert_task_if_absent(&pool, saved.id, 1, day, text).await.unwrap();
    }

    let removed = tasks::delete_tasks_not_in(
        &pool,
        saved.id,
        &[1, 1],
        &[1, 3],
        &["keep".to_string(), "also keep".to_string()],
    )
    .await
    .unwrap();
    assert_eq!(removed, 1);

    let texts: Vec<String> = tasks::list_tasks_for_plan(&pool, saved.id)
        .await
        .unwrap()
        .into_iter()
        .map(|t| t.text)
        .collect();
    assert_eq!(texts, vec!["keep", "also keep"]);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn delete_tasks_not_in_with_empty_keys_clears_plan() {
    let (pool, db_name) = create_test_db().await;

    let saved = plans::insert_plan_if_absent(&pool, "alice", "Go", 1, &plan("Go", 1))
        .await
        .unwrap()
        .unwrap();
    tasks::insert_task_if_absent(&pool, saved.id, 1, 1, "read").await.unwrap();

    let removed = tasks::delete_tasks_not_in(&pool, saved.id, &[], &[], &[])
        .await
        .unwrap();
    assert_eq!(removed, 1);

    pool.close().await;
    drop_test_db(&db_name).await;
}
