//! Shared test doubles for the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;

use asupersync::{Cx, Outcome};
use querel_core::{Connection, Error, Row, Value};

/// Connection double that replays canned responses in order and records
/// every statement it receives.
pub struct MockConnection {
    responses: Mutex<VecDeque<Vec<Row>>>,
    log: Mutex<Vec<(String, Vec<Value>)>>,
}

impl MockConnection {
    pub fn new(responses: Vec<Vec<Row>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            log: Mutex::new(Vec::new()),
        }
    }

    /// Every executed statement with its parameters, in execution order.
    pub fn executed(&self) -> Vec<(String, Vec<Value>)> {
        self.log.lock().unwrap().clone()
    }

    fn next_response(&self, sql: &str, params: &[Value]) -> Vec<Row> {
        self.log
            .lock()
            .unwrap()
            .push((sql.to_string(), params.to_vec()));
        self.responses.lock().unwrap().pop_front().unwrap_or_default()
    }
}

impl Connection for MockConnection {
    fn query(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send {
        let rows = self.next_response(sql, params);
        async move { Outcome::Ok(rows) }
    }

    fn query_one(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Option<Row>, Error>> + Send {
        let rows = self.next_response(sql, params);
        async move { Outcome::Ok(rows.into_iter().next()) }
    }

    fn execute(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<u64, Error>> + Send {
        let rows = self.next_response(sql, params);
        async move { Outcome::Ok(rows.len() as u64) }
    }
}

/// Build a row from column names and values.
pub fn row(columns: &[&str], values: Vec<Value>) -> Row {
    Row::new(columns.iter().map(|&c| c.to_string()).collect(), values)
}
