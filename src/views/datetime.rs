//! PHP `date()` format strings rendered with chrono

use chrono::{DateTime, Datelike, FixedOffset, Local, NaiveDate, Timelike};

/// Current local time with its UTC offset
pub fn now() -> DateTime<FixedOffset> {
    let local = Local::now();
    local.with_timezone(local.offset())
}

/// Format `time` using PHP `date()` format characters
///
/// Unknown characters are copied verbatim; a backslash escapes the next one.
pub fn format(time: &DateTime<FixedOffset>, pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() * 2);
    let mut chars = pattern.chars();

    while let Some(ch) = chars.next() {
        match ch {
            '\\' => {
                if let Some(escaped) = chars.next() {
                    out.push(escaped);
                }
            }
            'd' => out.push_str(&format!("{:02}", time.day())),
            'D' => out.push_str(&time.format("%a").to_string()),
            'j' => out.push_str(&time.day().to_string()),
            'l' => out.push_str(&time.format("%A").to_string()),
            'N' => out.push_str(&time.weekday().number_from_monday().to_string()),
            'S' => out.push_str(ordinal_suffix(time.day())),
            'w' => out.push_str(&time.weekday().num_days_from_sunday().to_string()),
            'z' => out.push_str(&time.ordinal0().to_string()),
            'W' => out.push_str(&format!("{:02}", time.iso_week().week())),
            'F' => out.push_str(&time.format("%B").to_string()),
            'm' => out.push_str(&format!("{:02}", time.month())),
            'M' => out.push_str(&time.format("%b").to_string()),
            'n' => out.push_str(&time.month().to_string()),
            't' => out.push_str(&days_in_month(time.year(), time.month()).to_string()),
            'L' => out.push(if is_leap_year(time.year()) { '1' } else { '0' }),
            'o' => out.push_str(&time.iso_week().year().to_string()),
            'Y' => out.push_str(&time.year().to_string()),
            'y' => out.push_str(&format!("{:02}", time.year().rem_euclid(100))),
            'a' => out.push_str(if time.hour() < 12 { "am" } else { "pm" }),
            'A' => out.push_str(if time.hour() < 12 { "AM" } else { "PM" }),
            'g' => out.push_str(&twelve_hour(time.hour()).to_string()),
            'G' => out.push_str(&time.hour().to_string()),
            'h' => out.push_str(&format!("{:02}", twelve_hour(time.hour()))),
            'H' => out.push_str(&format!("{:02}", time.hour())),
            'i' => out.push_str(&format!("{:02}", time.minute())),
            's' => out.push_str(&format!("{:02}", time.second())),
            'u' => out.push_str(&format!("{:06}", time.nanosecond() / 1_000 % 1_000_000)),
            'v' => out.push_str(&format!("{:03}", time.nanosecond() / 1_000_000 % 1_000)),
            'e' | 'T' => {
                if time.offset().local_minus_utc() == 0 {
                    out.push_str("UTC");
                } else {
                    out.push_str(&time.format("%:z").to_string());
                }
            }
            'P' => out.push_str(&time.format("%:z").to_string()),
            'p' => {
                if time.offset().local_minus_utc() == 0 {
                    out.push('Z');
                } else {
                    out.push_str(&time.format("%:z").to_string());
                }
            }
            'O' => out.push_str(&time.format("%z").to_string()),
            'Z' => out.push_str(&time.offset().local_minus_utc().to_string()),
            'c' => out.push_str(&time.format("%Y-%m-%dT%H:%M:%S%:z").to_string()),
            'r' => out.push_str(&time.format("%a, %d %b %Y %H:%M:%S %z").to_string()),
            'U' => out.push_str(&time.timestamp().to_string()),
            other => out.push(other),
        }
    }

    out
}

fn twelve_hour(hour: u32) -> u32 {
    match hour % 12 {
        0 => 12,
        h => h,
    }
}

fn ordinal_suffix(day: u32) -> &'static str {
    match (day % 10, day % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    }
}

fn is_leap_year(year: i32) -> bool {
    NaiveDate::from_ymd_opt(year, 2, 29).is_some()
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|first| first.pred_opt())
        .map(|last| last.day())
        .unwrap_or(31)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339("2024-03-01T14:05:09+02:00").unwrap()
    }

    #[test]
    fn test_fixed_directive_formats() {
        let time = sample();
        assert_eq!(format(&time, "Y"), "2024");
        assert_eq!(format(&time, "F"), "March");
        assert_eq!(format(&time, "Y-m-d"), "2024-03-01");
        assert_eq!(format(&time, "H:i:s"), "14:05:09");
    }

    #[test]
    fn test_textual_and_escapes() {
        let time = sample();
        assert_eq!(format(&time, "D, jS M"), "Fri, 1st Mar");
        assert_eq!(format(&time, "g:i A"), "2:05 PM");
        assert_eq!(format(&time, "\\Y\\e\\a\\r: Y"), "Year: 2024");
        assert_eq!(format(&time, "t L"), "31 1");
        assert_eq!(format(&time, "P"), "+02:00");
    }

    #[test]
    fn test_ordinal_suffixes() {
        assert_eq!(ordinal_suffix(2), "nd");
        assert_eq!(ordinal_suffix(11), "th");
        assert_eq!(ordinal_suffix(23), "rd");
    }
}
