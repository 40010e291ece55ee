//! Province vocabulary
//!
//! Provinces are only a partition key for the candidate vocabulary. The
//! matching core receives already-normalized names; this module is used at
//! the HTTP/CLI boundary to normalize aliases such as `广西壮族自治区` or
//! `上海市` to their short form.

use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Provincial-level administrative regions (short form)
pub const PROVINCES: [&str; 34] = [
    "北京", "天津", "上海", "重庆",
    "河北", "山西", "辽宁", "吉林", "黑龙江",
    "江苏", "浙江", "安徽", "福建", "江西", "山东",
    "河南", "湖北", "湖南", "广东", "海南",
    "四川", "贵州", "云南", "陕西", "甘肃", "青海", "台湾",
    "内蒙古", "广西", "西藏", "宁夏", "新疆",
    "香港", "澳门",
];

static ALIASES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    let mut aliases: HashMap<&'static str, &'static str> =
        PROVINCES.iter().map(|p| (*p, *p)).collect();
    for (alias, short) in [
        ("内蒙古自治区", "内蒙古"),
        ("广西壮族自治区", "广西"),
        ("西藏自治区", "西藏"),
        ("宁夏回族自治区", "宁夏"),
        ("新疆维吾尔自治区", "新疆"),
        ("香港特别行政区", "香港"),
        ("澳门特别行政区", "澳门"),
    ] {
        aliases.insert(alias, short);
    }
    aliases
});

/// Suffixes stripped before alias lookup, longest first
const SUFFIXES: [&str; 3] = ["特别行政区", "省", "市"];

/// Normalize a province name to its short form
///
/// Returns `None` when the input is not a known province.
pub fn normalize_province(raw: &str) -> Option<&'static str> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Some(short) = ALIASES.get(trimmed) {
        return Some(short);
    }

    SUFFIXES
        .iter()
        .filter_map(|suffix| trimmed.strip_suffix(suffix))
        .find_map(|stem| ALIASES.get(stem).copied())
}

/// Whether the name is a known province (short or alias form)
pub fn is_valid_province(raw: &str) -> bool {
    normalize_province(raw).is_some()
}

/// Find the first province mentioned in free text (e.g. a file name)
///
/// Longer names are tried first so `黑龙江` is not shadowed by shorter entries.
pub fn extract_province(text: &str) -> Option<&'static str> {
    let mut names: Vec<&'static str> = ALIASES.keys().copied().collect();
    names.sort_by(|a, b| b.chars().count().cmp(&a.chars().count()).then(a.cmp(b)));
    names
        .into_iter()
        .find(|name| text.contains(name))
        .and_then(|name| ALIASES.get(name).copied())
}
