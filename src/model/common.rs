use serde::de::{self, Deserializer, Visitor};
use std::fmt;

pub type CommodityCode = i64;

/// Accepts strings, numbers, booleans or null and keeps the textual form.
pub fn deserialize_flexible_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    struct FlexibleTextVisitor;
    impl<'de> Visitor<'de> for FlexibleTextVisitor {
        type Value = String;
        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("string, number or null")
        }
        #[inline]
        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(v.to_string())
        }
        #[inline]
        fn visit_string<E>(self, v: String) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(v)
        }
        #[inline]
        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E> {
            Ok(v.to_string())
        }
        #[inline]
        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E> {
            Ok(v.to_string())
        }
        #[inline]
        fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E> {
            Ok(v.to_string())
        }
        #[inline]
        fn visit_bool<E>(self, v: bool) -> Result<Self::Value, E> {
            Ok(v.to_string())
        }
        #[inline]
        fn visit_none<E>(self) -> Result<Self::Value, E> {
            Ok(String::new())
        }
        #[inline]
        fn visit_unit<E>(self) -> Result<Self::Value, E> {
            Ok(String::new())
        }
    }
    deserializer.deserialize_any(FlexibleTextVisitor)
}

/// `"0440000"` -> 440000, `"0000000"` and `""` -> 0.
pub fn normalize_commodity_code(raw: &str) -> Option<CommodityCode> {
    let stripped = raw.trim().trim_start_matches('0');
    if stripped.is_empty() {
        return Some(0);
    }
    stripped.parse::<CommodityCode>().ok()
}

pub fn strip_whitespace(s: &str) -> String {
    s.chars().filter(|c| !c.is_whitespace()).collect()
}
