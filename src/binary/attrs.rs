use std::borrow::Cow;
use std::str::FromStr;

use crate::binary::error::{BinaryError, Result};
use crate::binary::node::{Attrs, Node, NodeValue};
use crate::types::jid::Jid;
use chrono::{DateTime, TimeZone, Utc};

/// Error-accumulating attribute getter. Required getters push an error and
/// return a default instead of failing fast, so a handler can read every
/// attribute it needs and check `ok()`/`finish()` once at the end.
pub struct AttrParser<'a> {
    attrs: &'a Attrs,
    pub errors: Vec<BinaryError>,
}

impl<'a> AttrParser<'a> {
    pub fn new(node: &'a Node) -> Self {
        Self {
            attrs: &node.attrs,
            errors: Vec::new(),
        }
    }

    pub fn ok(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn finish(&self) -> Result<()> {
        if self.ok() {
            Ok(())
        } else {
            Err(BinaryError::AttrList(self.errors.clone()))
        }
    }

    fn get_raw(&mut self, key: &str, require: bool) -> Option<&'a NodeValue> {
        let val = self.attrs.get(key);
        if require && val.is_none() {
            self.errors.push(BinaryError::MissingAttr(key.to_string()));
        }
        val
    }

    fn get_string_value(&mut self, key: &str, require: bool) -> Option<Cow<'a, str>> {
        self.get_raw(key, require).map(|v| match v {
            NodeValue::String(s) => Cow::Borrowed(s.as_str()),
            other => Cow::Owned(other.to_string()),
        })
    }

    pub fn optional_string(&mut self, key: &str) -> Option<&'a str> {
        self.get_raw(key, false).and_then(|v| v.as_str())
    }

    pub fn string(&mut self, key: &str) -> String {
        self.get_string_value(key, true)
            .map(|s| s.into_owned())
            .unwrap_or_default()
    }

    pub fn optional_jid(&mut self, key: &str) -> Option<Jid> {
        self.get_raw(key, false).and_then(|v| match v {
            NodeValue::Jid(j) => Some(j.clone()),
            NodeValue::String(s) => match Jid::from_str(s) {
                Ok(jid) => Some(jid),
                Err(e) => {
                    self.errors.push(BinaryError::InvalidJid(e.to_string()));
                    None
                }
            },
            other => {
                self.errors
                    .push(BinaryError::InvalidJid(other.to_string()));
                None
            }
        })
    }

    pub fn jid(&mut self, key: &str) -> Jid {
        self.get_raw(key, true);
        self.optional_jid(key).unwrap_or_default()
    }

    pub fn non_ad_jid(&mut self, key: &str) -> Jid {
        self.jid(key).to_non_ad()
    }

    fn get_u64(&mut self, key: &str, require: bool) -> Option<u64> {
        let raw = self.get_raw(key, require)?;
        match raw {
            NodeValue::UInt(u) => Some(*u),
            NodeValue::Int(i) if *i >= 0 => Some(*i as u64),
            other => match other.to_string().parse::<u64>() {
                Ok(val) => Some(val),
                Err(e) => {
                    self.errors.push(BinaryError::AttrParse(format!(
                        "failed to parse u64 from '{other}' for key '{key}': {e}"
                    )));
                    None
                }
            },
        }
    }

    pub fn optional_u64(&mut self, key: &str) -> Option<u64> {
        self.get_u64(key, false)
    }

    pub fn u64(&mut self, key: &str) -> u64 {
        self.get_u64(key, true).unwrap_or_default()
    }

    fn get_i64(&mut self, key: &str, require: bool) -> Option<i64> {
        let raw = self.get_raw(key, require)?;
        match raw {
            NodeValue::Int(i) => Some(*i),
            NodeValue::UInt(u) => Some(*u as i64),
            other => match other.to_string().parse::<i64>() {
                Ok(val) => Some(val),
                Err(e) => {
                    self.errors.push(BinaryError::AttrParse(format!(
                        "failed to parse i64 from '{other}' for key '{key}': {e}"
                    )));
                    None
                }
            },
        }
    }

    pub fn optional_i64(&mut self, key: &str) -> Option<i64> {
        self.get_i64(key, false)
    }

    fn get_bool(&mut self, key: &str, require: bool) -> Option<bool> {
        let raw = self.get_raw(key, require)?;
        match raw {
            NodeValue::Bool(b) => Some(*b),
            other => match other.to_string().parse::<bool>() {
                Ok(val) => Some(val),
                Err(e) => {
                    self.errors.push(BinaryError::AttrParse(format!(
                        "failed to parse bool from '{other}' for key '{key}': {e}"
                    )));
                    None
                }
            },
        }
    }

    pub fn optional_bool(&mut self, key: &str) -> bool {
        self.get_bool(key, false).unwrap_or(false)
    }

    pub fn bool(&mut self, key: &str) -> bool {
        self.get_bool(key, true).unwrap_or(false)
    }

    /// Required unix-seconds timestamp.
    pub fn unix_time(&mut self, key: &str) -> DateTime<Utc> {
        let secs = self.get_i64(key, true).unwrap_or_default();
        Utc.timestamp_opt(secs, 0).single().unwrap_or_default()
    }

    pub fn optional_unix_time(&mut self, key: &str) -> Option<DateTime<Utc>> {
        self.get_i64(key, false)
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
    }
}
