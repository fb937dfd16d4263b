//! Parses an `xcp` positional operand into a local path or a
//! `[user@]host:path` remote reference (spec §6).

use xcp_config::Endpoint;

/// Parses one positional operand.
///
/// A bare string with no unbracketed colon is always local. A bracketed
/// IPv6 host (`[::1]:path`) is always remote. Otherwise, the text before
/// the first colon is the host (optionally `user@host`) and the rest is
/// the path — unless that prefix is exactly one ASCII letter, in which
/// case the whole string is a Windows drive-letter path (`C:\data`) and
/// stays local, per spec §6's drive-letter carve-out.
#[must_use]
pub fn parse_operand(raw: &str) -> Endpoint {
    if let Some(after_bracket) = raw.strip_prefix('[') {
        if let Some(close) = after_bracket.find(']') {
            let host = &after_bracket[..close];
            let rest = &after_bracket[close + 1..];
            if let Some(path) = rest.strip_prefix(':') {
                return Endpoint::Remote {
                    user: None,
                    host: format!("[{host}]"),
                    path: path.to_string(),
                };
            }
        }
        return Endpoint::Local(raw.to_string());
    }

    match first_unbracketed_colon(raw) {
        None => Endpoint::Local(raw.to_string()),
        Some(idx) => {
            let prefix = &raw[..idx];
            let path = &raw[idx + 1..];
            if is_drive_letter(prefix) {
                return Endpoint::Local(raw.to_string());
            }
            let (user, host) = match prefix.split_once('@') {
                Some((user, host)) => (Some(user.to_string()), host.to_string()),
                None => (None, prefix.to_string()),
            };
            Endpoint::Remote {
                user,
                host,
                path: path.to_string(),
            }
        }
    }
}

fn is_drive_letter(prefix: &str) -> bool {
    let mut chars = prefix.chars();
    matches!((chars.next(), chars.next()), (Some(c), None) if c.is_ascii_alphabetic())
}

/// Finds the first `:` that is not nested inside a `[...]` host literal.
fn first_unbracketed_colon(s: &str) -> Option<usize> {
    let mut depth = 0i32;
    for (i, c) in s.char_indices() {
        match c {
            '[' => depth += 1,
            ']' => depth = (depth - 1).max(0),
            ':' if depth == 0 => return Some(i),
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_path_is_local() {
        assert_eq!(parse_operand("/tmp/a"), Endpoint::Local("/tmp/a".to_string()));
    }

    #[test]
    fn windows_drive_letter_stays_local() {
        assert_eq!(
            parse_operand("C:\\data\\a"),
            Endpoint::Local("C:\\data\\a".to_string())
        );
    }

    #[test]
    fn host_path_is_remote() {
        assert_eq!(
            parse_operand("server:/tmp/a"),
            Endpoint::Remote {
                user: None,
                host: "server".to_string(),
                path: "/tmp/a".to_string(),
            }
        );
    }

    #[test]
    fn user_host_path_is_remote() {
        assert_eq!(
            parse_operand("alice@server:reports/q3.dat"),
            Endpoint::Remote {
                user: Some("alice".to_string()),
                host: "server".to_string(),
                path: "reports/q3.dat".to_string(),
            }
        );
    }

    #[test]
    fn bracketed_ipv6_host_is_remote() {
        assert_eq!(
            parse_operand("[::1]:/tmp/a"),
            Endpoint::Remote {
                user: None,
                host: "[::1]".to_string(),
                path: "/tmp/a".to_string(),
            }
        );
    }

    #[test]
    fn relative_local_path_with_no_colon_is_local() {
        assert_eq!(parse_operand("a/b/c"), Endpoint::Local("a/b/c".to_string()));
    }
}
