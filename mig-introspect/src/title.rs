//! Human-readable titles from snake_case identifiers.

/// Words that are written in capitals when they appear as a name part.
pub const INITIALISMS: &[&str] = &[
    "ACL", "AMQP", "API", "ASCII", "CPU", "CSS", "DB", "DNS", "EOF", "GID", "GUID", "HTML",
    "HTTP", "HTTPS", "ID", "IP", "JSON", "QPS", "RAM", "RPC", "RTP", "SIP", "SLA", "SMTP", "SQL",
    "SSH", "TCP", "TLS", "TS", "TTL", "UDP", "UI", "UID", "UUID", "URI", "URL", "UTF8", "VM",
    "XML", "XMPP", "XSRF", "XSS",
];

/// Turn a column or table name into a title.
///
/// A trailing camel-case `Id` is treated as `_id`, parts are split on `_`,
/// initialisms are upper-cased and other words get a capital first letter.
///
/// ```rust
/// use mig_introspect::title;
///
/// assert_eq!(title("user_id"), "User ID");
/// assert_eq!(title("showId"), "Show ID");
/// assert_eq!(title("api_url"), "API URL");
/// ```
pub fn title(input: &str) -> String {
    let input = match input.strip_suffix("Id") {
        Some(head) if input.len() > 2 => format!("{head}_id"),
        _ => input.to_string(),
    };

    input
        .split('_')
        .map(|word| {
            let upper = word.to_uppercase();
            if INITIALISMS.contains(&upper.as_str()) {
                return upper;
            }
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
