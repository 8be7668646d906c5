// Save-path templates such as "/upload/image/{yyyy}{mm}{dd}/{time}{rand:6}"

use std::fmt::Display;

use chrono::{DateTime, Local, TimeZone};
use rand::Rng;

const DEFAULT_RAND_DIGITS: usize = 6;

/// Expands a save-path template against the current local time.
pub fn expand(template: &str, file_name: Option<&str>) -> String {
    expand_at(template, file_name, &Local::now(), &mut rand::thread_rng())
}

/// Expands `{token}` placeholders. Unknown tokens are kept verbatim.
pub fn expand_at<Tz, R>(
    template: &str,
    file_name: Option<&str>,
    now: &DateTime<Tz>,
    rng: &mut R,
) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
    R: Rng + ?Sized,
{
    let mut output = String::with_capacity(template.len() + 16);
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        output.push_str(&rest[..open]);
        let after = &rest[open + 1..];

        let Some(close) = after.find('}') else {
            output.push_str(&rest[open..]);
            return output;
        };

        let token = &after[..close];
        match expand_token(token, file_name, now, rng) {
            Some(value) => output.push_str(&value),
            None => {
                output.push('{');
                output.push_str(token);
                output.push('}');
            }
        }

        rest = &after[close + 1..];
    }

    output.push_str(rest);
    output
}

fn expand_token<Tz, R>(
    token: &str,
    file_name: Option<&str>,
    now: &DateTime<Tz>,
    rng: &mut R,
) -> Option<String>
where
    Tz: TimeZone,
    Tz::Offset: Display,
    R: Rng + ?Sized,
{
    let lowered = token.trim().to_ascii_lowercase();

    let value = match lowered.as_str() {
        "time" => now.timestamp_millis().to_string(),
        "yyyy" => now.format("%Y").to_string(),
        "yy" => now.format("%y").to_string(),
        "mm" => now.format("%m").to_string(),
        "dd" => now.format("%d").to_string(),
        "hh" => now.format("%H").to_string(),
        "ii" => now.format("%M").to_string(),
        "ss" => now.format("%S").to_string(),
        "filename" => sanitize_file_name(file_name.unwrap_or_default()),
        other => {
            let digits = other.strip_prefix("rand")?;
            let count = match digits.strip_prefix(':') {
                Some(count) => count.trim().parse().unwrap_or(DEFAULT_RAND_DIGITS),
                None if digits.is_empty() => DEFAULT_RAND_DIGITS,
                None => return None,
            };
            random_digits(count, rng)
        }
    };

    Some(value)
}

fn random_digits<R: Rng + ?Sized>(count: usize, rng: &mut R) -> String {
    (0..count)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect()
}

/// Drops characters that cannot appear in a path segment.
pub fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .filter(|c| !matches!(c, '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|'))
        .collect()
}

/// Uses forward slashes and collapses repeated separators.
pub fn normalize(path: &str) -> String {
    let mut output = String::with_capacity(path.len());

    for ch in path.chars().map(|c| if c == '\\' { '/' } else { c }) {
        if ch == '/' && output.ends_with('/') {
            continue;
        }
        output.push(ch);
    }

    output
}
