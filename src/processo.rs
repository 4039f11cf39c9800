//! Sequential process numbers for protocolos.
//!
//! A process number reads `month/sequence/yy`. The sequence continues from the
//! most recently inserted protocolo and starts over at 1 once the year suffix
//! of that row no longer matches the current year.

use chrono::{Datelike, NaiveDate};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::sql_types::BigInt;

use crate::schema::protocolos;

/// Advisory lock key held while a number is allocated and its row inserted.
const ALLOCATION_LOCK_KEY: i64 = 0x5347_5000_0001;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessNumber {
    pub sequence: i32,
    pub processo: String,
}

/// The last stored protocolo as seen by the allocator.
#[derive(Debug, Clone, Copy)]
pub struct LastProcess<'a> {
    pub processo: &'a str,
    pub sequence: i32,
}

pub fn year_suffix(date: NaiveDate) -> String {
    format!("{:02}", date.year().rem_euclid(100))
}

fn stored_year_suffix(processo: &str) -> Option<u32> {
    processo.split('/').nth(2)?.trim().parse().ok()
}

pub fn next_process_number(last: Option<LastProcess<'_>>, today: NaiveDate) -> ProcessNumber {
    let suffix = year_suffix(today);
    let current_year = today.year().rem_euclid(100) as u32;

    let sequence = match last {
        None => 1,
        Some(last) => match stored_year_suffix(last.processo) {
            Some(year) if year != current_year => 1,
            // Unparseable suffixes keep counting rather than risk a repeat.
            _ => last.sequence.saturating_add(1),
        },
    };

    ProcessNumber {
        sequence,
        processo: format!("{}/{}/{}", today.month(), sequence, suffix),
    }
}

/// Computes the next number from the newest row.
///
/// Must run inside a transaction: the advisory lock taken here is released on
/// commit, which keeps concurrent inserts from reading the same last row.
pub fn allocate(conn: &mut PgConnection, today: NaiveDate) -> QueryResult<ProcessNumber> {
    diesel::sql_query("SELECT pg_advisory_xact_lock($1)")
        .bind::<BigInt, _>(ALLOCATION_LOCK_KEY)
        .execute(conn)?;

    let last: Option<(String, i32)> = protocolos::table
        .order(protocolos::id.desc())
        .select((protocolos::processo, protocolos::num_processo))
        .first(conn)
        .optional()?;

    Ok(next_process_number(
        last.as_ref().map(|(processo, sequence)| LastProcess {
            processo,
            sequence: *sequence,
        }),
        today,
    ))
}
