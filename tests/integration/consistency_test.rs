// tests/integration/consistency_test.rs

//! A session spread across several replica groups must observe one ordered history.

use super::test_helpers::{TestContext, unreachable_addr};
use cortado::client::demo::courses_scenario;
use cortado::client::ReplicaGroup;
use cortado::core::protocol::Encoding;
use cortado::core::types::{ResultSet, Statement};

fn assert_courses(rows: &ResultSet) {
    assert_eq!(rows.field_names, vec!["id", "name"]);
    let cells: Vec<Vec<&str>> = rows
        .tuples
        .iter()
        .map(|t| t.cells.iter().map(String::as_str).collect())
        .collect();
    assert_eq!(
        cells,
        vec![
            vec!["6.831", "UID"],
            vec!["6.830", "Databases"],
            vec!["6.824", "Distributed Systems"],
        ]
    );
}

async fn run_scenario(encoding: Encoding) {
    let ctx = TestContext::with_nodes(5).await;
    let clerk = ctx.clerk(encoding);
    let g1 = ctx.group(&[0, 1], encoding);
    let g2 = ctx.group(&[2, 3], encoding);
    let g3 = ctx.group(&[4], encoding);

    let rows = courses_scenario(&clerk, &g1, &g2, &g3).await.unwrap();
    assert_eq!(rows.len(), 3);
    assert_courses(&rows);
    assert_eq!(ctx.backend.open_sessions(), 0);
}

#[tokio::test]
async fn test_courses_across_groups_binary() {
    run_scenario(Encoding::Binary).await;
}

#[tokio::test]
async fn test_courses_across_groups_json() {
    run_scenario(Encoding::Json).await;
}

#[tokio::test]
async fn test_courses_with_plain_create_and_dead_first_members() {
    let ctx = TestContext::with_nodes(3).await;
    let clerk = ctx.clerk(Encoding::Binary);
    let dead = unreachable_addr().await;
    let group = |i: usize| ReplicaGroup::new([dead.clone(), ctx.nodes[i].binary_addr.clone()]);
    let (g1, g2, g3) = (group(0), group(1), group(2));

    let mut conn = clerk.open_connection(&g1).await.unwrap();
    let steps = [
        (&g2, "CREATE TABLE courses(id text, name text)"),
        (&g3, "DELETE FROM courses"),
        (&g1, "INSERT INTO courses VALUES ('6.831','UID')"),
        (&g2, "INSERT INTO courses VALUES ('6.830','Databases')"),
        (&g1, "INSERT INTO courses VALUES ('6.824','Distributed Systems')"),
    ];
    for (group, sql) in steps {
        clerk
            .execute_sql(group, &mut conn, Statement::new(sql))
            .await
            .unwrap();
    }
    let rows = clerk
        .execute_sql(&g1, &mut conn, Statement::new("SELECT * FROM courses"))
        .await
        .unwrap();
    assert_courses(&rows);
    assert_eq!(conn.seq_id.as_u64(), 7);
}

#[tokio::test]
async fn test_writes_via_one_encoding_are_visible_via_the_other() {
    let ctx = TestContext::with_nodes(2).await;
    let writer = ctx.clerk(Encoding::Binary);
    let reader = ctx.clerk(Encoding::Json);

    let mut w = writer
        .open_connection(&ctx.group(&[0], Encoding::Binary))
        .await
        .unwrap();
    for sql in [
        "CREATE TABLE kv (k text, v text)",
        "INSERT INTO kv VALUES ('color', 'blue')",
    ] {
        writer
            .execute_sql(&ctx.group(&[0], Encoding::Binary), &mut w, Statement::new(sql))
            .await
            .unwrap();
    }

    let json_group = ctx.group(&[1], Encoding::Json);
    let mut r = reader.open_connection(&json_group).await.unwrap();
    let rows = reader
        .execute_sql(&json_group, &mut r, Statement::new("SELECT v FROM kv"))
        .await
        .unwrap();
    assert_eq!(rows.tuples[0].cells, vec!["blue"]);
}
