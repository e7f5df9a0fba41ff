/// Parse a boolean flag from a string value, or return the given default value otherwise.
pub fn parse_boolean_flag(value: Option<String>, default: bool) -> bool {
    let value = match value {
        Some(v) => v,
        None => return default,
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => default,
    }
}

/// Masks an account number for logs and user-facing error messages, keeping the last four
/// characters. Anything shorter than five characters is fully masked.
pub fn mask_account(account_number: &str) -> String {
    let n = account_number.chars().count();
    if n <= 4 {
        return "****".to_string();
    }
    let tail: String = account_number.chars().skip(n - 4).collect();
    format!("{}{}", "*".repeat(n - 4), tail)
}
