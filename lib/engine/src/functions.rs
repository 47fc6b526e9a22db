//! Registers the `sparql_*` scalar functions the compiler's `expr.rs` emits,
//! plus the `TRACKER`/`TRACKER_TITLE` collations (spec §6 "SQL engine
//! collaborator contract").
//!
//! A handful of these functions (`sparql_iri`, `sparql_bnode`, `sparql_uuid`)
//! construct or resolve a resource term, which means looking a row up in (or
//! inserting a row into) the `resources` table — from *inside* a
//! `rusqlite::functions::Context` callback, which has no route back to the
//! [`Connection`] currently executing it. We follow the standard SQLite
//! workaround for exactly this shape: a second connection opened against the
//! same backing store (grounded on SQLite's own documented advice for
//! recursive lookups from a registered function), fronted by
//! [`crate::resource_cache::ResourceCache`] so the common case never touches
//! it. Plain string/numeric functions (`sparql_str`, `sparql_contains`, the
//! hash functions, ...) need neither and run standalone.

use std::sync::{Arc, Mutex};

use rdfsql_common::{EngineResult, RowId};
use rusqlite::functions::{Context, FunctionFlags};
use rusqlite::types::ValueRef;
use rusqlite::{Connection, Error as SqliteError};

use crate::error::from_rusqlite;
use crate::resource_cache::ResourceCache;

/// The sentinel appended to a collated string so prefix ("STARTS-WITH")
/// range scans can express `col >= 'prefix' AND col < 'prefix' || SENTINEL`
/// (spec §6).
pub const TRACKER_COLLATION_LAST_CHAR: char = '\u{10FFFD}';

/// A second connection to the same backing store, used only by registered
/// functions that must resolve or allocate a resource row id while the main
/// connection is mid-statement.
#[derive(Clone)]
pub(crate) struct AuxConnection(Arc<Mutex<Connection>>);

impl AuxConnection {
    pub(crate) fn open(path: &str) -> EngineResult<Self> {
        use rusqlite::OpenFlags;

        let conn = if path == ":memory:" {
            let flags = OpenFlags::default() | OpenFlags::SQLITE_OPEN_URI;
            Connection::open_with_flags("file:rdfsql_engine_aux?mode=memory&cache=shared", flags)
        } else {
            Connection::open(path)
        }
        .map_err(from_rusqlite)?;
        Ok(Self(Arc::new(Mutex::new(conn))))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.0.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

/// Registers every `sparql_*` function and the `TRACKER`/`TRACKER_TITLE`
/// collations against `conn`.
pub(crate) fn register_all(
    conn: &Connection,
    aux: &AuxConnection,
    cache: &ResourceCache,
    locale: &str,
) -> EngineResult<()> {
    register_term_functions(conn, aux, cache)?;
    register_string_functions(conn)?;
    register_numeric_functions(conn)?;
    register_datetime_functions(conn)?;
    register_hash_functions(conn)?;
    register_uuid_functions(conn, aux, cache)?;
    register_regex_function(conn)?;
    register_collations(conn, locale)?;
    Ok(())
}

fn deterministic_flags() -> FunctionFlags {
    FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC
}

fn volatile_flags() -> FunctionFlags {
    FunctionFlags::SQLITE_UTF8
}

fn arg_text(ctx: &Context<'_>, i: usize) -> rusqlite::Result<String> {
    match ctx.get_raw(i) {
        ValueRef::Text(t) => Ok(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Null => Ok(String::new()),
        other => Ok(other.as_str().map(str::to_owned).unwrap_or_default()),
    }
}

fn arg_bytes(ctx: &Context<'_>, i: usize) -> rusqlite::Result<Vec<u8>> {
    match ctx.get_raw(i) {
        ValueRef::Blob(b) => Ok(b.to_vec()),
        ValueRef::Text(t) => Ok(t.to_vec()),
        other => Ok(other.as_str().map(str::as_bytes).map(<[u8]>::to_vec).unwrap_or_default()),
    }
}

/// Resource-term functions: `sparql_str`, `sparql_datatype`, `sparql_iri`,
/// `sparql_bnode`, `sparql_is_iri`/`is_blank`/`is_literal`.
fn register_term_functions(conn: &Connection, aux: &AuxConnection, cache: &ResourceCache) -> rusqlite::Result<()> {
    {
        let cache = cache.clone();
        conn.create_scalar_function("sparql_str", 1, deterministic_flags(), move |ctx| {
            if let ValueRef::Integer(id) = ctx.get_raw(0) {
                return Ok(cache.iri_for(RowId::new(id)).unwrap_or_default());
            }
            arg_text(ctx, 0)
        })?;
    }
    conn.create_scalar_function("sparql_lang", 1, deterministic_flags(), |ctx| {
        let bytes = arg_bytes(ctx, 0)?;
        let nul = bytes.iter().position(|b| *b == 0);
        Ok(match nul {
            Some(i) => String::from_utf8_lossy(&bytes[i + 1..]).into_owned(),
            None => String::new(),
        })
    })?;
    conn.create_scalar_function("sparql_lang_matches", 2, deterministic_flags(), |ctx| {
        let tag = arg_text(ctx, 0)?.to_ascii_lowercase();
        let range = arg_text(ctx, 1)?.to_ascii_lowercase();
        Ok(range == "*" && !tag.is_empty() || tag == range || tag.starts_with(&format!("{range}-")))
    })?;
    {
        let cache = cache.clone();
        let aux = aux.clone();
        conn.create_scalar_function("sparql_datatype", 1, deterministic_flags(), move |ctx| {
            let datatype_iri = if let ValueRef::Integer(_) = ctx.get_raw(0) {
                "http://www.w3.org/2001/XMLSchema#anyURI"
            } else {
                "http://www.w3.org/2001/XMLSchema#string"
            };
            resolve_or_intern(&aux, &cache, datatype_iri)
        })?;
    }
    {
        let cache = cache.clone();
        let aux = aux.clone();
        conn.create_scalar_function("sparql_iri", 1, deterministic_flags(), move |ctx| {
            let iri = arg_text(ctx, 0)?;
            resolve_or_unresolved(&aux, &cache, &iri)
        })?;
    }
    {
        let cache = cache.clone();
        let aux = aux.clone();
        conn.create_scalar_function("sparql_bnode", -1, volatile_flags(), move |ctx| {
            if ctx.len() == 0 {
                return allocate_blank(&aux, &cache);
            }
            let label = arg_text(ctx, 0)?;
            resolve_or_unresolved(&aux, &cache, &format!("urn:bnode:label:{label}"))
        })?;
    }
    {
        let cache = cache.clone();
        conn.create_scalar_function("sparql_is_iri", 1, deterministic_flags(), move |ctx| {
            Ok(matches!(ctx.get_raw(0), ValueRef::Integer(id) if !cache.is_blank(RowId::new(id))))
        })?;
    }
    {
        let cache = cache.clone();
        conn.create_scalar_function("sparql_is_blank", 1, deterministic_flags(), move |ctx| {
            Ok(matches!(ctx.get_raw(0), ValueRef::Integer(id) if cache.is_blank(RowId::new(id))))
        })?;
    }
    conn.create_scalar_function("sparql_is_literal", 1, deterministic_flags(), |ctx| {
        Ok(!matches!(ctx.get_raw(0), ValueRef::Integer(_)))
    })?;
    conn.create_scalar_function("sparql_is_numeric", 1, deterministic_flags(), |ctx| {
        Ok(matches!(ctx.get_raw(0), ValueRef::Integer(_) | ValueRef::Real(_)))
    })?;
    conn.create_scalar_function("sparql_str_lang", 2, deterministic_flags(), |ctx| {
        let text = arg_text(ctx, 0)?;
        let lang = arg_text(ctx, 1)?;
        Ok(rdfsql_model::Value::encode_lang_string(&text, &lang))
    })?;
    conn.create_scalar_function("sparql_str_dt", 2, deterministic_flags(), |ctx| arg_text(ctx, 0))?;
    Ok(())
}

/// A resource term that already exists: returns its row id, or the
/// `UNRESOLVED_RESOURCE` sentinel (never matches anything stored) if it does
/// not, without creating one.
fn resolve_or_unresolved(aux: &AuxConnection, cache: &ResourceCache, iri: &str) -> rusqlite::Result<i64> {
    if let Some(id) = cache.id_for(iri) {
        return Ok(id.get());
    }
    let conn = aux.lock();
    let found: Option<i64> = conn
        .query_row("SELECT id FROM resources WHERE iri = ?1", [iri], |row| row.get(0))
        .or_else(|err| if matches!(err, SqliteError::QueryReturnedNoRows) { Ok(None) } else { Err(err) })?;
    if let Some(id) = found {
        cache.insert(RowId::new(id), Some(iri));
    }
    Ok(found.unwrap_or(crate::value_codec::UNRESOLVED_RESOURCE))
}

/// A resource term (like a datatype IRI) that should exist as soon as it's
/// first referenced: looked up, then interned if absent.
fn resolve_or_intern(aux: &AuxConnection, cache: &ResourceCache, iri: &str) -> rusqlite::Result<i64> {
    if let Some(id) = cache.id_for(iri) {
        return Ok(id.get());
    }
    let conn = aux.lock();
    conn.execute("INSERT OR IGNORE INTO resources (iri) VALUES (?1)", [iri])?;
    let id: i64 = conn.query_row("SELECT id FROM resources WHERE iri = ?1", [iri], |row| row.get(0))?;
    cache.insert(RowId::new(id), Some(iri));
    Ok(id)
}

fn allocate_blank(aux: &AuxConnection, cache: &ResourceCache) -> rusqlite::Result<i64> {
    let conn = aux.lock();
    conn.execute("INSERT INTO resources (iri) VALUES (NULL)", [])?;
    let id = conn.last_insert_rowid();
    cache.insert(RowId::new(id), None);
    Ok(id)
}

fn register_string_functions(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function("sparql_replace", -1, deterministic_flags(), |ctx| {
        let text = arg_text(ctx, 0)?;
        let pattern = arg_text(ctx, 1)?;
        let replacement = arg_text(ctx, 2)?;
        let flags = if ctx.len() == 4 { arg_text(ctx, 3)? } else { String::new() };
        let re = build_regex(&pattern, &flags).map_err(sqlite_user_error)?;
        Ok(re.replace_all(&text, replacement.as_str()).into_owned())
    })?;
    conn.create_scalar_function("sparql_encode_for_uri", 1, deterministic_flags(), |ctx| {
        let text = arg_text(ctx, 0)?;
        Ok(percent_encode(&text))
    })?;
    conn.create_scalar_function("sparql_contains", 2, deterministic_flags(), |ctx| {
        Ok(arg_text(ctx, 0)?.contains(&arg_text(ctx, 1)?))
    })?;
    conn.create_scalar_function("sparql_starts_with", 2, deterministic_flags(), |ctx| {
        Ok(arg_text(ctx, 0)?.starts_with(&arg_text(ctx, 1)?))
    })?;
    conn.create_scalar_function("sparql_ends_with", 2, deterministic_flags(), |ctx| {
        Ok(arg_text(ctx, 0)?.ends_with(&arg_text(ctx, 1)?))
    })?;
    conn.create_scalar_function("sparql_str_before", 2, deterministic_flags(), |ctx| {
        let text = arg_text(ctx, 0)?;
        let needle = arg_text(ctx, 1)?;
        Ok(text.find(&needle).map(|i| text[..i].to_owned()).unwrap_or_default())
    })?;
    conn.create_scalar_function("sparql_str_after", 2, deterministic_flags(), |ctx| {
        let text = arg_text(ctx, 0)?;
        let needle = arg_text(ctx, 1)?;
        Ok(text.find(&needle).map(|i| text[i + needle.len()..].to_owned()).unwrap_or_default())
    })?;
    Ok(())
}

fn register_numeric_functions(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function("sparql_rand", 0, volatile_flags(), |_ctx| Ok(rand::random::<f64>()))?;
    conn.create_scalar_function("sparql_ceil", 1, deterministic_flags(), |ctx| Ok(numeric_arg(ctx, 0)?.ceil() as i64))?;
    conn.create_scalar_function("sparql_floor", 1, deterministic_flags(), |ctx| Ok(numeric_arg(ctx, 0)?.floor() as i64))?;
    conn.create_scalar_function("sparql_round", 1, deterministic_flags(), |ctx| Ok(numeric_arg(ctx, 0)?.round() as i64))?;
    Ok(())
}

fn numeric_arg(ctx: &Context<'_>, i: usize) -> rusqlite::Result<f64> {
    match ctx.get_raw(i) {
        ValueRef::Integer(v) => Ok(v as f64),
        ValueRef::Real(v) => Ok(v),
        other => other.as_str().ok().and_then(|s| s.parse().ok()).ok_or_else(|| {
            sqlite_user_error("expected a numeric argument".to_owned())
        }),
    }
}

fn register_datetime_functions(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function("sparql_year", 1, deterministic_flags(), |ctx| with_datetime(ctx, |dt| dt.year() as i64))?;
    conn.create_scalar_function("sparql_month", 1, deterministic_flags(), |ctx| with_datetime(ctx, |dt| dt.month() as i64))?;
    conn.create_scalar_function("sparql_day", 1, deterministic_flags(), |ctx| with_datetime(ctx, |dt| dt.day() as i64))?;
    conn.create_scalar_function("sparql_hours", 1, deterministic_flags(), |ctx| with_datetime(ctx, |dt| dt.hour() as i64))?;
    conn.create_scalar_function("sparql_minutes", 1, deterministic_flags(), |ctx| with_datetime(ctx, |dt| dt.minute() as i64))?;
    conn.create_scalar_function("sparql_seconds", 1, deterministic_flags(), |ctx| with_datetime_f64(ctx, |dt| dt.second()))?;
    conn.create_scalar_function("sparql_timezone", 1, deterministic_flags(), |ctx| {
        let text = arg_text(ctx, 0)?;
        let dt = parse_datetime(&text).map_err(sqlite_user_error)?;
        Ok(dt.timezone_offset().map(|tz| tz.to_string()).unwrap_or_default())
    })?;
    conn.create_scalar_function("sparql_tz", 1, deterministic_flags(), |ctx| {
        let text = arg_text(ctx, 0)?;
        let dt = parse_datetime(&text).map_err(sqlite_user_error)?;
        Ok(dt.timezone_offset().map(|tz| tz.to_string()).unwrap_or_default())
    })?;
    conn.create_scalar_function("sparql_now", 0, volatile_flags(), |_ctx| Ok(oxsdatatypes::DateTime::now().to_string()))?;
    conn.create_scalar_function("sparql_time_sort", 1, deterministic_flags(), |ctx| {
        let text = arg_text(ctx, 0)?;
        time_sort_value(&text).map_err(sqlite_user_error)
    })?;
    Ok(())
}

/// Normalizes an `xsd:date`/`dateTime`/`time` lexical value into a
/// chronologically-sortable number of seconds, so `ORDER BY` on a date-typed
/// column sorts by instant rather than by the lexical text (two differently
/// formatted but equal instants, e.g. differing only in timezone offset,
/// don't otherwise compare equal under plain string order).
fn time_sort_value(text: &str) -> Result<f64, String> {
    if let Ok(dt) = text.parse::<oxsdatatypes::DateTime>() {
        return seconds_since_epoch(dt);
    }
    if let Ok(date) = text.parse::<oxsdatatypes::Date>() {
        let dt = oxsdatatypes::DateTime::try_from(date).map_err(|e| e.to_string())?;
        return seconds_since_epoch(dt);
    }
    if let Ok(time) = text.parse::<oxsdatatypes::Time>() {
        let midnight: oxsdatatypes::Time =
            "00:00:00".parse::<oxsdatatypes::Time>().map_err(|e| e.to_string())?;
        let duration = time.checked_sub(midnight).ok_or_else(|| "time value out of range".to_owned())?;
        return duration.as_seconds().to_string().parse().map_err(|_| "malformed seconds component".to_owned());
    }
    Err(format!("'{text}' is not a valid xsd:date/dateTime/time lexical value"))
}

fn seconds_since_epoch(dt: oxsdatatypes::DateTime) -> Result<f64, String> {
    let epoch: oxsdatatypes::DateTime =
        "1970-01-01T00:00:00Z".parse::<oxsdatatypes::DateTime>().map_err(|e| e.to_string())?;
    let duration = dt.checked_sub(epoch).ok_or_else(|| "datetime value out of range".to_owned())?;
    duration.as_seconds().to_string().parse().map_err(|_| "malformed seconds component".to_owned())
}

fn parse_datetime(text: &str) -> Result<oxsdatatypes::DateTime, String> {
    text.parse::<oxsdatatypes::DateTime>().map_err(|e| e.to_string())
}

fn with_datetime(ctx: &Context<'_>, f: impl Fn(oxsdatatypes::DateTime) -> i64) -> rusqlite::Result<i64> {
    let text = arg_text(ctx, 0)?;
    let dt = parse_datetime(&text).map_err(sqlite_user_error)?;
    Ok(f(dt))
}

fn with_datetime_f64(ctx: &Context<'_>, f: impl Fn(oxsdatatypes::DateTime) -> oxsdatatypes::Decimal) -> rusqlite::Result<f64> {
    let text = arg_text(ctx, 0)?;
    let dt = parse_datetime(&text).map_err(sqlite_user_error)?;
    f(dt).to_string().parse().map_err(|_| sqlite_user_error("malformed seconds component".to_owned()))
}

fn register_hash_functions(conn: &Connection) -> rusqlite::Result<()> {
    use md5::{Digest as _, Md5};
    use sha1::Sha1;
    use sha2::{Sha256, Sha384, Sha512};

    conn.create_scalar_function("sparql_md5", 1, deterministic_flags(), |ctx| {
        Ok(hex::encode(Md5::digest(arg_bytes(ctx, 0)?)))
    })?;
    conn.create_scalar_function("sparql_sha1", 1, deterministic_flags(), |ctx| {
        Ok(hex::encode(Sha1::digest(arg_bytes(ctx, 0)?)))
    })?;
    conn.create_scalar_function("sparql_sha256", 1, deterministic_flags(), |ctx| {
        Ok(hex::encode(Sha256::digest(arg_bytes(ctx, 0)?)))
    })?;
    conn.create_scalar_function("sparql_sha384", 1, deterministic_flags(), |ctx| {
        Ok(hex::encode(Sha384::digest(arg_bytes(ctx, 0)?)))
    })?;
    conn.create_scalar_function("sparql_sha512", 1, deterministic_flags(), |ctx| {
        Ok(hex::encode(Sha512::digest(arg_bytes(ctx, 0)?)))
    })?;
    Ok(())
}

fn register_uuid_functions(conn: &Connection, aux: &AuxConnection, cache: &ResourceCache) -> rusqlite::Result<()> {
    conn.create_scalar_function("sparql_str_uuid", 0, volatile_flags(), |_ctx| Ok(uuid::Uuid::new_v4().to_string()))?;
    let aux = aux.clone();
    let cache = cache.clone();
    conn.create_scalar_function("sparql_uuid", 0, volatile_flags(), move |_ctx| {
        let iri = format!("urn:uuid:{}", uuid::Uuid::new_v4());
        resolve_or_intern(&aux, &cache, &iri)
    })?;
    Ok(())
}

fn register_regex_function(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function("sparql_regex", -1, deterministic_flags(), |ctx| {
        let text = arg_text(ctx, 0)?;
        let pattern = arg_text(ctx, 1)?;
        let flags = if ctx.len() == 3 { arg_text(ctx, 2)? } else { String::new() };
        let re = build_regex(&pattern, &flags).map_err(sqlite_user_error)?;
        Ok(re.is_match(&text))
    })?;
    Ok(())
}

fn build_regex(pattern: &str, flags: &str) -> Result<regex::Regex, regex::Error> {
    let mut builder = regex::RegexBuilder::new(pattern);
    builder.case_insensitive(flags.contains('i'));
    builder.multi_line(flags.contains('m'));
    builder.dot_matches_new_line(flags.contains('s'));
    builder.build()
}

/// A locale-aware collation for string `ORDER BY`/FTS comparisons, and a
/// title-stripping variant for `tracker:title-order` (spec §6). Both fall
/// back to a case-insensitive byte comparison; a production locale-aware
/// collator is out of scope (spec §1 Non-goals: locale/collation
/// configuration is touched only at the interface, not implemented here).
fn register_collations(conn: &Connection, _locale: &str) -> rusqlite::Result<()> {
    conn.create_collation("TRACKER", |a, b| a.to_ascii_lowercase().cmp(&b.to_ascii_lowercase()))?;
    conn.create_collation("TRACKER_TITLE", |a, b| {
        strip_title(a).to_ascii_lowercase().cmp(&strip_title(b).to_ascii_lowercase())
    })?;
    Ok(())
}

/// Drops a leading `"The "`/`"A "`/`"An "` article, the way title-sort
/// collations conventionally do.
fn strip_title(text: &str) -> &str {
    for article in ["The ", "A ", "An "] {
        if text.len() > article.len() && text[..article.len()].eq_ignore_ascii_case(article) {
            return &text[article.len()..];
        }
    }
    text
}

fn percent_encode(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for byte in text.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => out.push(byte as char),
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

fn sqlite_user_error(message: String) -> SqliteError {
    SqliteError::UserFunctionError(message.into())
}

mod hex {
    pub(super) fn encode(bytes: impl AsRef<[u8]>) -> String {
        bytes.as_ref().iter().map(|b| format!("{b:02x}")).collect()
    }
}
