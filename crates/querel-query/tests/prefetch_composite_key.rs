//! Prefetching over a composite foreign key via the keys CTE.

mod common;

use asupersync::runtime::RuntimeBuilder;
use asupersync::{Cx, Outcome};
use common::{row, MockConnection};
use querel_core::{Row, StaticSchema, Value};
use querel_query::{Association, Expr, Relation};

fn schema() -> StaticSchema {
    StaticSchema::new()
        .table(
            "passports",
            &["country", "number", "owner"],
            &["country", "number"],
        )
        .table(
            "stamps",
            &["id", "passport_country", "passport_number", "city"],
            &["id"],
        )
        .foreign_key(
            "stamps",
            &[
                ("passport_country", "country"),
                ("passport_number", "number"),
            ],
            "passports",
        )
}

fn passport_rows() -> Vec<Row> {
    let columns = ["country", "number", "owner"];
    vec![
        row(
            &columns,
            vec![
                Value::Text("br".into()),
                Value::BigInt(1),
                Value::Text("kim".into()),
            ],
        ),
        row(
            &columns,
            vec![
                Value::Text("br".into()),
                Value::BigInt(2),
                Value::Text("kim".into()),
            ],
        ),
        row(
            &columns,
            vec![
                Value::Text("ca".into()),
                Value::BigInt(1),
                Value::Text("kim".into()),
            ],
        ),
    ]
}

fn stamp_rows() -> Vec<Row> {
    let columns = [
        "id",
        "passport_country",
        "passport_number",
        "city",
        "querel_passport_country",
        "querel_passport_number",
    ];
    let stamp = |id: i64, country: &str, number: i64, city: &str| {
        row(
            &columns,
            vec![
                Value::BigInt(id),
                Value::Text(country.into()),
                Value::BigInt(number),
                Value::Text(city.into()),
                Value::Text(country.into()),
                Value::BigInt(number),
            ],
        )
    };
    vec![
        stamp(1, "br", 1, "lima"),
        stamp(2, "br", 1, "quito"),
        stamp(3, "ca", 1, "oslo"),
    ]
}

#[test]
fn follow_up_attaches_the_reduced_origin_as_a_cte() {
    let conn = MockConnection::new(vec![passport_rows(), stamp_rows()]);
    let relation = Relation::table("passports")
        .filter(Expr::col("owner").eq("kim"))
        .include_all(Association::has_many("stamps", "stamps"));

    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();

    rt.block_on(async {
        match relation.fetch_all(&cx, &conn, &schema()).await {
            Outcome::Ok(_) => {}
            other => panic!("fetch failed: {other:?}"),
        }
    });

    let executed = conn.executed();
    assert_eq!(executed.len(), 2);
    assert_eq!(
        executed[0].0,
        "SELECT * FROM passports WHERE \"owner\" = $1"
    );
    assert_eq!(
        executed[1].0,
        "WITH querel_keys AS (SELECT \"passports\".\"country\", \"passports\".\"number\" \
         FROM passports WHERE \"owner\" = $1) \
         SELECT stamps.*, \
         \"stamps\".\"passport_country\" AS querel_passport_country, \
         \"stamps\".\"passport_number\" AS querel_passport_number \
         FROM stamps \
         WHERE (\"stamps\".\"passport_country\", \"stamps\".\"passport_number\") IN querel_keys"
    );
    assert_eq!(executed[1].1, vec![Value::Text("kim".into())]);
}

#[test]
fn grouping_matches_naive_per_parent_filtering() {
    let conn = MockConnection::new(vec![passport_rows(), stamp_rows()]);
    let relation = Relation::table("passports")
        .include_all(Association::has_many("stamps", "stamps"));

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

    let children = stamp_rows();
    for parent in &rows {
        let country = parent.get_by_name("country").unwrap();
        let number = parent.get_by_name("number").unwrap();
        let expected: Vec<&Row> = children
            .iter()
            .filter(|c| {
                c.get_by_name("passport_country") == Some(country)
                    && c.get_by_name("passport_number") == Some(number)
            })
            .collect();

        let attached = parent.prefetched("stamps").expect("prefetched group");
        assert_eq!(attached.len(), expected.len());
        for (got, want) in attached.iter().zip(expected) {
            assert_eq!(got.get_by_name("id"), want.get_by_name("id"));
        }
    }
}

#[test]
fn null_key_components_group_by_value_equality() {
    let passports = vec![row(
        &["country", "number", "owner"],
        vec![Value::Text("xx".into()), Value::Null, Value::Text("nia".into())],
    )];
    let columns = [
        "id",
        "passport_country",
        "passport_number",
        "city",
        "querel_passport_country",
        "querel_passport_number",
    ];
    let stamps = vec![row(
        &columns,
        vec![
            Value::BigInt(9),
            Value::Text("xx".into()),
            Value::Null,
            Value::Text("pori".into()),
            Value::Text("xx".into()),
            Value::Null,
        ],
    )];
    let conn = MockConnection::new(vec![passports, stamps]);
    let relation = Relation::table("passports")
        .include_all(Association::has_many("stamps", "stamps"));

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

    let attached = rows[0].prefetched("stamps").expect("prefetched group");
    assert_eq!(attached.len(), 1);
    assert_eq!(attached[0].get_named::<i64>("id").unwrap(), 9);
}
