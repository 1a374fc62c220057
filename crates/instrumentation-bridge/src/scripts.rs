//! Helper functions the bridge runs inside the page. Every name and value reaches them as a
//! call argument; none is spliced into the source text.

const JSON_WRAP_PREFIX: &str = "JSON.stringify((function() { ";
const JSON_WRAP_SUFFIX: &str = " })())";

/// Returns the buffer as JSON text, or `"[]"` when the collector was never installed.
pub const READ_BUFFER: &str = r#"function (slot) {
  var root = globalThis;
  if (!root[slot.marker]) {
    return '[]';
  }
  var buffer = root[slot.buffer];
  return JSON.stringify(Array.isArray(buffer) ? buffer : []);
}"#;

pub const CLEAR_BUFFER: &str = r#"function (slot) {
  var root = globalThis;
  if (root[slot.marker]) {
    root[slot.buffer] = [];
  }
  return null;
}"#;

pub const IS_INSTALLED: &str = r#"function (slot) {
  return Boolean(globalThis[slot.marker]);
}"#;

pub const STORAGE_ITEMS: &str = r#"function (area) {
  var store = area === 'session' ? globalThis.sessionStorage : globalThis.localStorage;
  var items = {};
  for (var i = 0; i < store.length; i++) {
    var key = store.key(i);
    items[key] = store.getItem(key);
  }
  return items;
}"#;

pub const STORAGE_SET: &str = r#"function (area, key, value) {
  var store = area === 'session' ? globalThis.sessionStorage : globalThis.localStorage;
  store.setItem(key, value);
  return null;
}"#;

pub const STORAGE_REMOVE: &str = r#"function (area, key) {
  var store = area === 'session' ? globalThis.sessionStorage : globalThis.localStorage;
  store.removeItem(key);
  return null;
}"#;

pub const STORAGE_CLEAR: &str = r#"function (area) {
  var store = area === 'session' ? globalThis.sessionStorage : globalThis.localStorage;
  store.clear();
  return null;
}"#;

/// Wrap a function body so the page serializes its return value to JSON text.
pub fn wrap_json_probe(code: &str) -> String {
    format!("{JSON_WRAP_PREFIX}{code}{JSON_WRAP_SUFFIX}")
}

/// Inverse of [`wrap_json_probe`].
pub fn unwrap_json_probe(source: &str) -> Option<&str> {
    source
        .strip_prefix(JSON_WRAP_PREFIX)?
        .strip_suffix(JSON_WRAP_SUFFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_body_in_serializing_iife() {
        let wrapped = wrap_json_probe("return 1");
        assert_eq!(wrapped, "JSON.stringify((function() { return 1 })())");
        assert_eq!(unwrap_json_probe(&wrapped), Some("return 1"));
        assert_eq!(unwrap_json_probe("1 + 1"), None);
    }
}
