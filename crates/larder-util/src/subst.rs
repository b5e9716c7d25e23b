//! `$name` / `${name}` substitution for message templates

use chrono::{DateTime, Datelike, Local, Timelike};
use regex::{Captures, Regex};
use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;
use uuid::Uuid;

use crate::irc_lower;

static VARIABLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([^}]+)\}|\$([a-zA-Z][a-zA-Z0-9]*)").expect("variable pattern is valid")
});

/// A substitution value: either fixed text or produced on each use
pub enum Var {
    Value(String),
    Producer(Box<dyn Fn() -> String + Send + Sync>),
}

impl Var {
    pub fn producer(f: impl Fn() -> String + Send + Sync + 'static) -> Self {
        Self::Producer(Box::new(f))
    }

    fn render(&self) -> String {
        match self {
            Self::Value(s) => s.clone(),
            Self::Producer(f) => f(),
        }
    }
}

impl fmt::Debug for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(s) => f.debug_tuple("Value").field(s).finish(),
            Self::Producer(_) => f.write_str("Producer(..)"),
        }
    }
}

impl From<String> for Var {
    fn from(s: String) -> Self {
        Self::Value(s)
    }
}

impl From<&str> for Var {
    fn from(s: &str) -> Self {
        Self::Value(s.to_string())
    }
}

/// Variable table; names are case-insensitive
#[derive(Debug, Default)]
pub struct Vars {
    vars: HashMap<String, Var>,
}

impl Vars {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, value: impl Into<Var>) {
        self.vars.insert(irc_lower(name), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Var> {
        self.vars.get(&irc_lower(name))
    }

    /// Add every entry of `other`, replacing existing names
    pub fn extend(&mut self, other: Vars) {
        self.vars.extend(other.vars);
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

/// Replace `$name` and `${name}` in `text`. Unknown names are left as written.
pub fn substitute(vars: &Vars, text: &str) -> String {
    VARIABLE_RE
        .replace_all(text, |caps: &Captures<'_>| {
            let (name, braced) = match (caps.get(1), caps.get(2)) {
                (Some(m), _) => (m.as_str(), true),
                (None, Some(m)) => (m.as_str(), false),
                (None, None) => return caps[0].to_string(),
            };
            match vars.get(name) {
                Some(var) => var.render(),
                None if braced => format!("${{{}}}", name),
                None => format!("${}", name),
            }
        })
        .into_owned()
}

const CTIME_FORMAT: &str = "%a %b %e %H:%M:%S %Y";

/// 53 random bits, taken from the random part of a v4 uuid
fn random_bits() -> u64 {
    Uuid::new_v4().as_u64_pair().1 & ((1 << 53) - 1)
}

/// A whole number in `-1000..=1000`
fn random_int() -> String {
    ((random_bits() % 2001) as i64 - 1000).to_string()
}

/// A ctime date somewhere from a quarter of `now` since the epoch up to
/// 2^30 seconds after that
fn random_date(now_secs: i64) -> String {
    let fraction = random_bits() as f64 / (1u64 << 53) as f64;
    let secs = now_secs / 4 + (fraction * (1u64 << 30) as f64) as i64;
    match DateTime::from_timestamp(secs, 0) {
        Some(t) => t.with_timezone(&Local).format(CTIME_FORMAT).to_string(),
        None => String::new(),
    }
}

/// Date, time and random variables every template can use
pub fn standard_vars(now: DateTime<Local>) -> Vars {
    let mut vars = Vars::new();
    let ctime = now.format(CTIME_FORMAT).to_string();

    vars.insert("now", ctime.clone());
    vars.insert("ctime", ctime);
    vars.insert("today", now.format("%d %b %Y").to_string());
    vars.insert("year", now.year().to_string());
    vars.insert("month", now.month().to_string());
    vars.insert("monthname", now.format("%b").to_string());
    vars.insert("date", now.day().to_string());
    vars.insert("day", now.format("%A").to_string());
    for name in ["h", "hr", "hour"] {
        vars.insert(name, now.hour().to_string());
    }
    for name in ["m", "min", "minute"] {
        vars.insert(name, now.minute().to_string());
    }
    for name in ["s", "sec", "second"] {
        vars.insert(name, now.second().to_string());
    }
    vars.insert("tz", now.format("%Z").to_string());
    for name in ["rand", "randint", "randomint"] {
        vars.insert(name, Var::producer(random_int));
    }
    let now_secs = now.timestamp();
    for name in ["randdate", "randomdate"] {
        vars.insert(name, Var::producer(move || random_date(now_secs)));
    }

    vars
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn substitutes_plain_and_braced() {
        let mut vars = Vars::new();
        vars.insert("who", "jemfinch");
        vars.insert("channel", "#rust");

        let out = substitute(&vars, "$who joined ${channel}!");
        assert_eq!(out, "jemfinch joined #rust!");
    }

    #[test]
    fn unknown_variables_are_kept() {
        let vars = Vars::new();
        assert_eq!(substitute(&vars, "cost: $5 or ${price}"), "cost: $5 or ${price}");
        assert_eq!(substitute(&vars, "$nobody"), "$nobody");
    }

    #[test]
    fn names_are_case_insensitive() {
        let mut vars = Vars::new();
        vars.insert("Nick", "bob");
        assert_eq!(substitute(&vars, "$NICK/$nick"), "bob/bob");
    }

    #[test]
    fn producers_run_per_use() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut vars = Vars::new();
        vars.insert(
            "tick",
            Var::producer(move || (counter.fetch_add(1, Ordering::SeqCst) + 1).to_string()),
        );

        assert_eq!(substitute(&vars, "$tick $tick"), "1 2");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn standard_vars_describe_the_given_time() {
        let now = Local.with_ymd_and_hms(2025, 12, 25, 14, 30, 5).unwrap();
        let mut vars = standard_vars(now);
        vars.insert("who", "alice");

        let out = substitute(&vars, "$who at $hour:$min on $day, $today ($year)");
        assert_eq!(out, "alice at 14:30 on Thursday, 25 Dec 2025 (2025)");
    }

    #[test]
    fn random_vars_are_drawn_per_use() {
        let now = Local.with_ymd_and_hms(2025, 12, 25, 14, 30, 5).unwrap();
        let vars = standard_vars(now);

        let ints: Vec<i64> = substitute(&vars, &"$rand ".repeat(50))
            .split_whitespace()
            .map(|n| n.parse().unwrap())
            .collect();
        assert_eq!(ints.len(), 50);
        assert!(ints.iter().all(|n| (-1000..=1000).contains(n)));
        assert!(ints.iter().any(|n| *n != ints[0]));

        for name in ["randint", "RandomInt"] {
            let n: i64 = substitute(&vars, &format!("${}", name)).parse().unwrap();
            assert!((-1000..=1000).contains(&n));
        }

        let low = DateTime::from_timestamp(now.timestamp() / 4, 0).unwrap();
        let high = low + chrono::Duration::seconds(1 << 30);
        for name in ["randdate", "randomdate"] {
            let text = substitute(&vars, &format!("${{{}}}", name));
            let date = chrono::NaiveDateTime::parse_from_str(&text, CTIME_FORMAT).unwrap();
            let date = Local.from_local_datetime(&date).earliest().unwrap().to_utc();
            // local time drops the offset; allow a day either side
            assert!(date >= low - chrono::Duration::days(1));
            assert!(date <= high + chrono::Duration::days(1));
        }
    }
}
