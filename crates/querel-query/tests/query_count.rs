//! Statement-count guarantees: one query per association, and no
//! statement at all when there is nothing to run.

mod common;

use asupersync::runtime::RuntimeBuilder;
use asupersync::{Cx, Outcome};
use common::{row, MockConnection};
use querel_core::{Row, StaticSchema, Value};
use querel_query::{Assignment, Association, ConflictResolution, Expr, Relation};

fn schema() -> StaticSchema {
    StaticSchema::new()
        .table("teams", &["id", "name"], &["id"])
        .table("players", &["id", "team_id", "name"], &["id"])
        .table("stadiums", &["id", "team_id", "city"], &["id"])
        .foreign_key("players", &[("team_id", "id")], "teams")
        .foreign_key("stadiums", &[("team_id", "id")], "teams")
}

fn many_teams(count: i64) -> Vec<Row> {
    (1..=count)
        .map(|id| {
            row(
                &["id", "name"],
                vec![Value::BigInt(id), Value::Text(format!("team {id}"))],
            )
        })
        .collect()
}

#[test]
fn one_query_per_association_regardless_of_parent_count() {
    let conn = MockConnection::new(vec![many_teams(50), Vec::new(), Vec::new()]);
    let relation = Relation::table("teams")
        .include_all(Association::has_many("players", "players"))
        .include_all(Association::has_many("stadiums", "stadiums"));

    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();

    let rows = rt.block_on(async {
        match relation.fetch_all(&cx, &conn, &schema()).await {
            Outcome::Ok(rows) => rows,
            other => panic!("fetch failed: {other:?}"),
        }
    });

    assert_eq!(rows.len(), 50);
    // Every parent got both groups attached, all empty.
    for team in &rows {
        assert_eq!(team.prefetched("players"), Some(&[] as &[Row]));
        assert_eq!(team.prefetched("stadiums"), Some(&[] as &[Row]));
    }

    let executed = conn.executed();
    assert_eq!(executed.len(), 3);
    // The IN list carries all fifty keys in one statement.
    assert_eq!(executed[1].1.len(), 50);
    assert_eq!(executed[2].1.len(), 50);
}

#[test]
fn update_without_assignments_runs_no_statement() {
    let conn = MockConnection::new(Vec::new());
    let relation = Relation::table("teams").filter(Expr::col("id").eq(1));

    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();

    let affected = rt.block_on(async {
        match relation
            .update_all(&cx, &conn, &[], ConflictResolution::Abort)
            .await
        {
            Outcome::Ok(n) => n,
            other => panic!("update failed: {other:?}"),
        }
    });

    assert_eq!(affected, 0);
    assert!(conn.executed().is_empty());
}

#[test]
fn update_and_delete_pass_the_engine_count_through() {
    // The double reports two affected rows for each statement.
    let affected_marker = vec![many_teams(2), many_teams(2)];
    let conn = MockConnection::new(affected_marker);
    let relation = Relation::table("teams").filter(Expr::col("name").eq("old"));

    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();

    rt.block_on(async {
        let updated = match relation
            .update_all(
                &cx,
                &conn,
                &[Assignment::set("name", "new")],
                ConflictResolution::Abort,
            )
            .await
        {
            Outcome::Ok(n) => n,
            other => panic!("update failed: {other:?}"),
        };
        assert_eq!(updated, 2);

        let deleted = match relation.delete_all(&cx, &conn).await {
            Outcome::Ok(n) => n,
            other => panic!("delete failed: {other:?}"),
        };
        assert_eq!(deleted, 2);
    });

    let executed = conn.executed();
    assert_eq!(executed.len(), 2);
    assert_eq!(
        executed[0].0,
        "UPDATE teams SET \"name\" = $1 WHERE \"name\" = $2"
    );
    assert_eq!(executed[1].0, "DELETE FROM teams WHERE \"name\" = $1");
}

#[test]
fn count_and_exists_wrap_the_relation() {
    let conn = MockConnection::new(vec![
        vec![row(&["count"], vec![Value::BigInt(7)])],
        vec![row(&["exists"], vec![Value::Bool(true)])],
    ]);
    let relation = Relation::table("teams").filter(Expr::col("name").eq("reds"));

    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();

    rt.block_on(async {
        let count = match relation.fetch_count(&cx, &conn, &schema()).await {
            Outcome::Ok(n) => n,
            other => panic!("count failed: {other:?}"),
        };
        assert_eq!(count, 7);

        let found = match relation.exists(&cx, &conn, &schema()).await {
            Outcome::Ok(b) => b,
            other => panic!("exists failed: {other:?}"),
        };
        assert!(found);
    });

    let executed = conn.executed();
    assert_eq!(
        executed[0].0,
        "SELECT COUNT(*) FROM (SELECT * FROM teams WHERE \"name\" = $1)"
    );
    assert_eq!(
        executed[1].0,
        "SELECT EXISTS (SELECT * FROM teams WHERE \"name\" = $1)"
    );
}
