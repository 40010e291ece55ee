//! Shape checks on incoming full names
//!
//! Rejects blanks, out-of-range lengths and obvious placeholders before any
//! lookup or resolver call.

/// Inclusive length bounds, in characters
pub const MIN_FULL_NAME_CHARS: usize = 2;
pub const MAX_FULL_NAME_CHARS: usize = 200;

const PLACEHOLDER_PREFIXES: &[&str] = &["测试", "test", "待定", "tbd"];
const PLACEHOLDER_EXACT: &[&str] = &["无", "空白"];

/// `Err` carries the reason shown to the caller
pub fn check_full_name(full_name: &str) -> Result<(), String> {
    let name = full_name.trim();
    if name.is_empty() {
        return Err("full name is empty".to_string());
    }

    let chars = name.chars().count();
    if chars < MIN_FULL_NAME_CHARS {
        return Err(format!("full name is too short ({} chars)", chars));
    }
    if chars > MAX_FULL_NAME_CHARS {
        return Err(format!("full name is too long ({} chars)", chars));
    }

    let lower = name.to_lowercase();
    let placeholder = PLACEHOLDER_PREFIXES.iter().any(|p| lower.starts_with(p))
        || PLACEHOLDER_EXACT.contains(&lower.as_str())
        || lower.chars().all(|c| c == '-');
    if placeholder {
        return Err(format!("full name '{}' is a placeholder", name));
    }

    Ok(())
}

pub fn check_province(province: &str) -> Result<(), String> {
    if province.trim().is_empty() {
        Err("province is empty".to_string())
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_real_names() {
        assert!(check_full_name("四川老百姓大药房连锁有限公司").is_ok());
        assert!(check_full_name("一心堂").is_ok());
        // Contains but does not start with a placeholder word
        assert!(check_full_name("成都测试路大药房").is_ok());
    }

    #[test]
    fn test_rejects_placeholders() {
        for name in ["测试药房", "TEST pharmacy", "Tbd", "待定", "无", "空白", "---", "-"] {
            assert!(check_full_name(name).is_err(), "{} should be rejected", name);
        }
    }

    #[test]
    fn test_length_bounds_count_chars() {
        assert!(check_full_name("药").is_err());
        assert!(check_full_name("药房").is_ok());
        assert!(check_full_name(&"药".repeat(200)).is_ok());
        assert!(check_full_name(&"药".repeat(201)).is_err());
        assert!(check_full_name("   ").is_err());
    }

    #[test]
    fn test_province_blank() {
        assert!(check_province("四川").is_ok());
        assert!(check_province(" ").is_err());
    }
}
